use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tower::BoxError;

use super::BatchFetch;
use super::BatchLoader;
use crate::domain::Customer;
use crate::domain::CustomerId;
use crate::error::FetchError;
use crate::repository::Repository;

/// Loads customers by id with one repository call. Unknown ids have no value.
pub struct CustomerByIdFetch {
    repository: Arc<dyn Repository>,
}

impl CustomerByIdFetch {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

impl BatchFetch for CustomerByIdFetch {
    type Key = CustomerId;
    type Value = Customer;

    const NAME: &'static str = "customerById";

    fn fetch(&self, ids: HashSet<CustomerId>) -> Result<HashMap<CustomerId, Customer>, BoxError> {
        tracing::debug!("batch-loading {} customers by id", ids.len());
        let customers = self
            .repository
            .find_customers_by_ids(&ids)
            .inspect_err(|err| {
                tracing::error!("error batch-loading {} customers by id: {err}", ids.len())
            })?;
        tracing::debug!(
            "batch result: {} of {} customers found",
            customers.len(),
            ids.len()
        );
        Ok(customers
            .into_iter()
            .map(|customer| (customer.id, customer))
            .collect())
    }
}

/// Request-scoped loader of `Order.customer`.
pub struct CustomerByIdLoader(BatchLoader<CustomerByIdFetch>);

impl CustomerByIdLoader {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self(BatchLoader::new(CustomerByIdFetch::new(repository)))
    }

    /// Registers `id` right away; the future resolves to the customer, if it exists, once
    /// dispatched.
    pub fn load(
        &self,
        id: CustomerId,
    ) -> impl Future<Output = Result<Option<Customer>, FetchError>> + use<> {
        self.0.load(id)
    }

    pub async fn dispatch(&self) {
        self.0.dispatch().await
    }

    pub fn pending_len(&self) -> usize {
        self.0.pending_len()
    }
}
