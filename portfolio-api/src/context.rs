//! Per-request execution state.
use std::sync::Arc;

use crate::batching::CustomerByIdLoader;
use crate::batching::OrdersByCustomerLoader;
use crate::configuration::BatchingConfig;
use crate::repository::Repository;

/// State shared by the resolvers of one operation.
///
/// Build one per incoming request; clones share the same loaders and go away with the request.
#[derive(Clone)]
pub struct RequestContext {
    loaders: Arc<Loaders>,
}

struct Loaders {
    orders_by_customer: OrdersByCustomerLoader,
    customer_by_id: CustomerByIdLoader,
}

impl RequestContext {
    pub fn new(repository: Arc<dyn Repository>, config: &BatchingConfig) -> Self {
        Self {
            loaders: Arc::new(Loaders {
                orders_by_customer: OrdersByCustomerLoader::new(
                    repository.clone(),
                    config.partition_by_arguments,
                ),
                customer_by_id: CustomerByIdLoader::new(repository),
            }),
        }
    }

    pub fn orders_by_customer(&self) -> &OrdersByCustomerLoader {
        &self.loaders.orders_by_customer
    }

    pub fn customer_by_id(&self) -> &CustomerByIdLoader {
        &self.loaders.customer_by_id
    }

    /// End of a resolution tick, as seen by one resolver.
    ///
    /// Yields once first, so that sibling resolvers polled alongside this one register their keys
    /// too. The first of them to resume dispatches the whole tick; the others find nothing pending
    /// and wait for their share.
    pub async fn end_tick(&self) {
        tokio::task::yield_now().await;
        self.dispatch_all().await;
    }

    /// Dispatch every loader with pending keys.
    pub async fn dispatch_all(&self) {
        futures::join!(
            self.loaders.orders_by_customer.dispatch(),
            self.loaders.customer_by_id.dispatch()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::OrdersByCustomerKey;
    use crate::domain::CustomerId;
    use crate::domain::PageRequest;
    use crate::repository::InMemoryRepository;

    #[tokio::test]
    async fn dispatch_all_flushes_both_loaders() {
        let repository = Arc::new(InMemoryRepository::seeded());
        let context = RequestContext::new(repository.clone(), &BatchingConfig::default());

        let orders = context.orders_by_customer().load(OrdersByCustomerKey {
            customer_id: CustomerId(1),
            status: None,
            page: PageRequest::default(),
        });
        let customer = context.clone().customer_by_id().load(CustomerId(2));
        context.dispatch_all().await;

        assert_eq!(orders.await.unwrap().len(), 5);
        assert_eq!(customer.await.unwrap().unwrap().first_name, "Grace");
        assert_eq!(repository.order_fetch_count(), 1);
        assert_eq!(repository.customer_fetch_count(), 1);
    }

    #[tokio::test]
    async fn sibling_registrations_share_one_tick() {
        let repository = Arc::new(InMemoryRepository::seeded());
        let context = RequestContext::new(repository.clone(), &BatchingConfig::default());
        let resolve = |id: i64| {
            let context = context.clone();
            async move {
                let customer = context.customer_by_id().load(CustomerId(id));
                context.end_tick().await;
                customer.await
            }
        };

        let (first, second) = futures::join!(resolve(1), resolve(2));

        assert_eq!(first.unwrap().unwrap().first_name, "Ada");
        assert_eq!(second.unwrap().unwrap().first_name, "Grace");
        assert_eq!(repository.customer_fetch_count(), 1);
    }

    #[tokio::test]
    async fn contexts_do_not_share_loaders() {
        let repository = Arc::new(InMemoryRepository::seeded());
        let first = RequestContext::new(repository.clone(), &BatchingConfig::default());
        let second = RequestContext::new(repository, &BatchingConfig::default());

        let _pending = first.customer_by_id().load(CustomerId(1));
        assert_eq!(first.customer_by_id().pending_len(), 1);
        assert_eq!(second.customer_by_id().pending_len(), 0);
    }
}
