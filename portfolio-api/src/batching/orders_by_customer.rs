use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use itertools::Itertools;
use tower::BoxError;

use super::BatchFetch;
use super::BatchLoader;
use crate::domain::CustomerId;
use crate::domain::Order;
use crate::domain::OrderStatus;
use crate::domain::PageRequest;
use crate::error::FetchError;
use crate::repository::Repository;

/// The orders of one customer, as selected by the arguments of a `Customer.orders` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrdersByCustomerKey {
    pub customer_id: CustomerId,
    pub status: Option<OrderStatus>,
    pub page: PageRequest,
}

/// Loads the orders of many customers with one repository call.
///
/// The repository applies one status filter and one page window to the whole call, so a batch
/// takes them from an arbitrary one of its keys. Keys of one batch usually come from the same
/// field of the same query and agree on them. With `partition_by_arguments`, keys are grouped
/// by status and page first and each group is fetched separately.
pub struct OrdersByCustomerFetch {
    repository: Arc<dyn Repository>,
    partition_by_arguments: bool,
}

impl OrdersByCustomerFetch {
    pub fn new(repository: Arc<dyn Repository>, partition_by_arguments: bool) -> Self {
        Self {
            repository,
            partition_by_arguments,
        }
    }

    fn fetch_window(
        &self,
        keys: Vec<OrdersByCustomerKey>,
    ) -> Result<HashMap<OrdersByCustomerKey, Vec<Order>>, BoxError> {
        let Some(arguments) = keys.first().copied() else {
            return Ok(HashMap::new());
        };
        let customer_ids: HashSet<CustomerId> = keys.iter().map(|key| key.customer_id).collect();
        tracing::debug!(
            "batch-loading orders for {} customer ids (status: {:?}, page: {}, size: {})",
            customer_ids.len(),
            arguments.status,
            arguments.page.page(),
            arguments.page.size()
        );

        let orders = self
            .repository
            .find_orders_by_customer_ids_and_optional_status(
                &customer_ids,
                arguments.status,
                arguments.page,
            )
            .inspect_err(|err| {
                tracing::error!(
                    "error batch-loading orders for {} customer ids: {err}",
                    customer_ids.len()
                )
            })?;
        let order_count = orders.len();
        let by_customer = orders
            .into_iter()
            .into_group_map_by(|order| order.customer_id);
        tracing::debug!(
            "batch result: {order_count} orders across {} customers",
            by_customer.len()
        );

        Ok(keys
            .into_iter()
            .map(|key| {
                let orders = by_customer
                    .get(&key.customer_id)
                    .cloned()
                    .unwrap_or_default();
                (key, orders)
            })
            .collect())
    }
}

impl BatchFetch for OrdersByCustomerFetch {
    type Key = OrdersByCustomerKey;
    type Value = Vec<Order>;

    const NAME: &'static str = "ordersByCustomer";

    fn fetch(
        &self,
        keys: HashSet<OrdersByCustomerKey>,
    ) -> Result<HashMap<OrdersByCustomerKey, Vec<Order>>, BoxError> {
        if !self.partition_by_arguments {
            return self.fetch_window(keys.into_iter().collect());
        }
        let mut result = HashMap::with_capacity(keys.len());
        for partition in keys
            .into_iter()
            .into_group_map_by(|key| (key.status, key.page))
            .into_values()
        {
            result.extend(self.fetch_window(partition)?);
        }
        Ok(result)
    }
}

/// Request-scoped loader of `Customer.orders`.
pub struct OrdersByCustomerLoader(BatchLoader<OrdersByCustomerFetch>);

impl OrdersByCustomerLoader {
    pub fn new(repository: Arc<dyn Repository>, partition_by_arguments: bool) -> Self {
        Self(BatchLoader::new(OrdersByCustomerFetch::new(
            repository,
            partition_by_arguments,
        )))
    }

    /// Registers `key` right away; the future resolves to the orders of `key.customer_id` once
    /// dispatched, empty when there are none.
    pub fn load(
        &self,
        key: OrdersByCustomerKey,
    ) -> impl Future<Output = Result<Vec<Order>, FetchError>> + use<> {
        let pending = self.0.load(key);
        async move { pending.await.map(Option::unwrap_or_default) }
    }

    pub async fn dispatch(&self) {
        self.0.dispatch().await
    }

    pub fn pending_len(&self) -> usize {
        self.0.pending_len()
    }
}
