//! Resolvers of the association fields, one resolution tick per list of parents.
//!
//! Each resolver registers one key per parent, ends the tick, then hands every parent its own
//! result. Resolvers polled together on one context share a single dispatch. A failure is attributed to the field of the parent it concerns
//! and leaves the other parents untouched.

use futures::future::join_all;

use crate::batching::OrdersByCustomerKey;
use crate::context::RequestContext;
use crate::domain::Customer;
use crate::domain::Order;
use crate::domain::OrderStatus;
use crate::domain::PageRequest;
use crate::error::FetchError;
use crate::graphql;
use crate::json_ext::Path;

/// Arguments of `Customer.orders(status, page, size)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrdersArguments {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl OrdersArguments {
    /// The requested window, defaulting to the first page of ten.
    pub fn page_request(&self) -> Result<PageRequest, FetchError> {
        PageRequest::new(
            self.page.unwrap_or(PageRequest::DEFAULT_PAGE),
            self.size.unwrap_or(PageRequest::DEFAULT_SIZE),
        )
    }
}

/// Resolve `orders` for every customer of `customers`, found at the paired response paths.
pub async fn customer_orders(
    ctx: &RequestContext,
    customers: &[(Path, Customer)],
    arguments: OrdersArguments,
) -> Vec<Result<Vec<Order>, graphql::Error>> {
    let page = match arguments.page_request() {
        Ok(page) => page,
        Err(error) => {
            return customers
                .iter()
                .map(|(path, _)| Err(error.to_field_error(&path.key("orders"))))
                .collect();
        }
    };

    let pending: Vec<_> = customers
        .iter()
        .map(|(_, customer)| {
            ctx.orders_by_customer().load(OrdersByCustomerKey {
                customer_id: customer.id,
                status: arguments.status,
                page,
            })
        })
        .collect();
    ctx.end_tick().await;

    join_all(pending)
        .await
        .into_iter()
        .zip(customers)
        .map(|(result, (path, _))| result.map_err(|error| error.to_field_error(&path.key("orders"))))
        .collect()
}

/// Resolve `customer` for every order of `orders`, found at the paired response paths.
pub async fn order_customers(
    ctx: &RequestContext,
    orders: &[(Path, Order)],
) -> Vec<Result<Customer, graphql::Error>> {
    let pending: Vec<_> = orders
        .iter()
        .map(|(_, order)| ctx.customer_by_id().load(order.customer_id))
        .collect();
    ctx.end_tick().await;

    join_all(pending)
        .await
        .into_iter()
        .zip(orders)
        .map(|(result, (path, order))| {
            result
                .and_then(|customer| {
                    customer.ok_or_else(|| FetchError::NotFound {
                        entity: "Customer",
                        id: order.customer_id.to_string(),
                    })
                })
                .map_err(|error| error.to_field_error(&path.key("customer")))
        })
        .collect()
}
