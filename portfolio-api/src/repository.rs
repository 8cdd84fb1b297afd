//! The storage collaborator the batch loaders fetch from.
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use tower::BoxError;

use crate::domain::Customer;
use crate::domain::CustomerId;
use crate::domain::Order;
use crate::domain::OrderId;
use crate::domain::OrderStatus;
use crate::domain::PageRequest;

/// Bulk reads over customers and orders.
///
/// Methods block: callers run them on the compute pool.
#[cfg_attr(test, mockall::automock)]
pub trait Repository: Send + Sync + 'static {
    /// Orders of any of `customer_ids`, optionally restricted to `status`, ordered by id.
    ///
    /// `page` windows the combined result, not each customer's share of it.
    fn find_orders_by_customer_ids_and_optional_status(
        &self,
        customer_ids: &HashSet<CustomerId>,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Vec<Order>, BoxError>;

    /// Customers whose id is in `ids`. Unknown ids are ignored.
    fn find_customers_by_ids(&self, ids: &HashSet<CustomerId>) -> Result<Vec<Customer>, BoxError>;
}

/// A [`Repository`] held in memory, counting the bulk reads it serves.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    customers: RwLock<Vec<Customer>>,
    orders: RwLock<Vec<Order>>,
    order_fetches: AtomicUsize,
    customer_fetches: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Five customers, each with one order per status.
    pub fn seeded() -> Self {
        let repository = Self::new();
        let people = [
            ("Ada", "Lovelace"),
            ("Grace", "Hopper"),
            ("Alan", "Turing"),
            ("Edsger", "Dijkstra"),
            ("Barbara", "Liskov"),
        ];
        let mut next_order_id = 1;
        for (index, (first_name, last_name)) in people.into_iter().enumerate() {
            let customer_id = CustomerId(index as i64 + 1);
            repository.insert_customer(Customer {
                id: customer_id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: format!(
                    "{}.{}@example.com",
                    first_name.to_lowercase(),
                    last_name.to_lowercase()
                ),
            });
            for (day, status) in OrderStatus::ALL.into_iter().enumerate() {
                repository.insert_order(Order {
                    id: OrderId(next_order_id),
                    customer_id,
                    order_date: format!("2024-0{}-1{day}T10:00:00Z", index + 1),
                    status,
                    total_amount: 25.0 * (next_order_id as f64),
                });
                next_order_id += 1;
            }
        }
        repository
    }

    pub fn insert_customer(&self, customer: Customer) {
        let mut customers = self.customers.write();
        customers.push(customer);
        customers.sort_by_key(|customer| customer.id);
    }

    pub fn insert_order(&self, order: Order) {
        let mut orders = self.orders.write();
        orders.push(order);
        orders.sort_by_key(|order| order.id);
    }

    /// Number of calls to [`Repository::find_orders_by_customer_ids_and_optional_status`].
    pub fn order_fetch_count(&self) -> usize {
        self.order_fetches.load(Ordering::SeqCst)
    }

    /// Number of calls to [`Repository::find_customers_by_ids`].
    pub fn customer_fetch_count(&self) -> usize {
        self.customer_fetches.load(Ordering::SeqCst)
    }
}

impl Repository for InMemoryRepository {
    fn find_orders_by_customer_ids_and_optional_status(
        &self,
        customer_ids: &HashSet<CustomerId>,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Vec<Order>, BoxError> {
        self.order_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .orders
            .read()
            .iter()
            .filter(|order| customer_ids.contains(&order.customer_id))
            .filter(|order| status.is_none_or(|status| order.status == status))
            .skip(page.offset())
            .take(page.limit())
            .cloned()
            .collect())
    }

    fn find_customers_by_ids(&self, ids: &HashSet<CustomerId>) -> Result<Vec<Customer>, BoxError> {
        self.customer_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .customers
            .read()
            .iter()
            .filter(|customer| ids.contains(&customer.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ids(ids: &[i64]) -> HashSet<CustomerId> {
        ids.iter().copied().map(CustomerId).collect()
    }

    #[test]
    fn seeded_data() {
        let repository = InMemoryRepository::seeded();
        let customers = repository
            .find_customers_by_ids(&ids(&[1, 2, 3, 4, 5, 6]))
            .unwrap();
        assert_eq!(customers.len(), 5);
        let orders = repository
            .find_orders_by_customer_ids_and_optional_status(
                &ids(&[1, 2, 3, 4, 5]),
                None,
                PageRequest::new(0, 100).unwrap(),
            )
            .unwrap();
        assert_eq!(orders.len(), 25);
        assert_eq!(repository.customer_fetch_count(), 1);
        assert_eq!(repository.order_fetch_count(), 1);
    }

    #[test]
    fn status_filter() {
        let repository = InMemoryRepository::seeded();
        let shipped = repository
            .find_orders_by_customer_ids_and_optional_status(
                &ids(&[1, 2]),
                Some(OrderStatus::Shipped),
                PageRequest::default(),
            )
            .unwrap();
        assert_eq!(shipped.len(), 2);
        assert!(
            shipped
                .iter()
                .all(|order| order.status == OrderStatus::Shipped)
        );
    }

    #[test]
    fn page_window_applies_to_the_combined_result() {
        let repository = InMemoryRepository::seeded();
        let orders = repository
            .find_orders_by_customer_ids_and_optional_status(
                &ids(&[1, 2]),
                None,
                PageRequest::new(1, 3).unwrap(),
            )
            .unwrap();
        let order_ids: Vec<i64> = orders.iter().map(|order| order.id.0).collect();
        assert_eq!(order_ids, vec![4, 5, 6]);
    }
}
