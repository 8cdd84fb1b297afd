//! Request-scoped batch loading.
//!
//! Resolvers register the keys they need with a [`BatchLoader`] while a resolution pass walks the
//! parents of a list. The pass ends with a single [`BatchLoader::dispatch`], which fetches every
//! distinct key with one bulk call and hands each registered key its share of the result.
//!
//! Loaders are created per request and dropped with it: nothing is cached across requests.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tower::BoxError;

mod customer_by_id;
mod orders_by_customer;

pub use customer_by_id::CustomerByIdFetch;
pub use customer_by_id::CustomerByIdLoader;
pub use orders_by_customer::OrdersByCustomerFetch;
pub use orders_by_customer::OrdersByCustomerKey;
pub use orders_by_customer::OrdersByCustomerLoader;

use crate::compute_job;
use crate::compute_job::ComputeJobType;
use crate::error::FetchError;

/// One bulk fetch per batch of keys.
pub trait BatchFetch: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + 'static;
    type Value: Clone + Send + 'static;

    /// Loader name, used in logs and errors.
    const NAME: &'static str;

    /// Fetch every key of `keys` at once. Keys without a value may be left out of the result.
    fn fetch(&self, keys: HashSet<Self::Key>) -> Result<HashMap<Self::Key, Self::Value>, BoxError>;
}

type Waiter<V> = oneshot::Sender<Result<Option<V>, FetchError>>;

/// Keys registered since the last dispatch, each with everyone waiting for it.
struct PendingBatch<K, V> {
    waiters: HashMap<K, Vec<Waiter<V>>>,
}

impl<K, V> Default for PendingBatch<K, V> {
    fn default() -> Self {
        Self {
            waiters: HashMap::new(),
        }
    }
}

pub struct BatchLoader<F: BatchFetch> {
    fetcher: Arc<F>,
    pending: Mutex<PendingBatch<F::Key, F::Value>>,
}

impl<F: BatchFetch> BatchLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            pending: Mutex::new(PendingBatch::default()),
        }
    }

    /// Register `key` for the next dispatch.
    ///
    /// Loading a key that is already pending shares its slot: it is fetched once.
    pub fn load(&self, key: F::Key) -> LoadFuture<F::Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().waiters.entry(key).or_default().push(tx);
        LoadFuture {
            loader: F::NAME,
            receiver: rx,
        }
    }

    /// Number of distinct keys waiting for the next dispatch.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    /// Fetch every pending key with one bulk call and resolve their futures.
    ///
    /// Keys loaded while the fetch runs wait for the next dispatch.
    pub async fn dispatch(&self) {
        let waiters = std::mem::take(&mut self.pending.lock().waiters);
        if waiters.is_empty() {
            return;
        }
        let keys: HashSet<F::Key> = waiters.keys().cloned().collect();
        let key_count = keys.len();
        tracing::debug!(loader = F::NAME, keys = key_count, "dispatching batch");

        let fetcher = self.fetcher.clone();
        let outcome = compute_job::execute(
            ComputeJobType::BatchFetch,
            AssertUnwindSafe(move || fetcher.fetch(keys)),
        )
        .await;
        let values = match outcome {
            Ok(Ok(values)) => values,
            Ok(Err(error)) => return fail(F::NAME, waiters, error.to_string()),
            Err(_) => return fail(F::NAME, waiters, "bulk fetch panicked".to_string()),
        };
        tracing::debug!(
            loader = F::NAME,
            keys = key_count,
            values = values.len(),
            "batch resolved"
        );

        for (key, senders) in waiters {
            let value = values.get(&key);
            for sender in senders {
                // The caller may have stopped waiting
                let _ = sender.send(Ok(value.cloned()));
            }
        }
    }
}

fn fail<K, V>(loader: &'static str, waiters: HashMap<K, Vec<Waiter<V>>>, reason: String) {
    tracing::error!(
        loader,
        keys = waiters.len(),
        "batch load failed: {reason}"
    );
    let error = FetchError::BatchDispatchFailure { loader, reason };
    for sender in waiters.into_values().flatten() {
        let _ = sender.send(Err(error.clone()));
    }
}

/// Resolves once the batch holding its key was dispatched, to the value fetched for that key.
#[must_use = "futures do nothing unless polled"]
pub struct LoadFuture<V> {
    loader: &'static str,
    receiver: oneshot::Receiver<Result<Option<V>, FetchError>>,
}

impl<V> Future for LoadFuture<V> {
    type Output = Result<Option<V>, FetchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let loader = self.loader;
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            // The loader went away before dispatching our key
            received.unwrap_or(Err(FetchError::BatchCancelled { loader }))
        })
    }
}
