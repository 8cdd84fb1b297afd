//! Admission of operations: every request is sanitized and costed before execution.
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::Poll;

use futures::future::BoxFuture;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;

use crate::compute_job;
use crate::compute_job::ComputeJobType;
use crate::configuration::Configuration;
use crate::demand_control::DemandControl;
use crate::error::ErrorExtension;
use crate::error::INTERNAL_ERROR_MESSAGE;
use crate::error::QueryRejection;
use crate::graphql;
use crate::sanitizer::QuerySanitizer;
use crate::spec::FieldCatalog;
use crate::spec::Query;

/// An operation that may be executed.
#[derive(Clone, Debug)]
pub struct Admitted {
    /// The trimmed query, parsed.
    pub query: Query,
    pub depth: u32,
    /// `None` when demand control is disabled.
    pub cost: Option<u64>,
}

/// Sanitizer and demand control, applied in that order.
#[derive(Clone, Debug)]
pub struct AdmissionGuard {
    sanitizer: QuerySanitizer,
    demand_control: DemandControl,
}

impl AdmissionGuard {
    pub fn new(configuration: &Configuration, catalog: Arc<FieldCatalog>) -> Self {
        Self {
            sanitizer: QuerySanitizer::new(&configuration.limits),
            demand_control: DemandControl::new(configuration.demand_control.clone(), catalog),
        }
    }

    pub fn check(&self, request: &graphql::Request) -> Result<Admitted, QueryRejection> {
        let sanitized = self.sanitizer.sanitize(request)?;
        let cost = if self.demand_control.is_enabled() {
            Some(self.demand_control.check(&sanitized.query)?)
        } else {
            None
        };
        Ok(Admitted {
            query: sanitized.query,
            depth: sanitized.depth,
            cost,
        })
    }
}

/// [`Layer`] placing an [`AdmissionService`] in front of an executor.
#[derive(Clone)]
pub struct AdmissionLayer {
    guard: AdmissionGuard,
}

impl AdmissionLayer {
    pub fn new(guard: AdmissionGuard) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Answers refused operations with a single error, without calling the executor.
///
/// Admitted operations are forwarded with their trimmed query.
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    guard: AdmissionGuard,
}

impl<S> Service<graphql::Request> for AdmissionService<S>
where
    S: Service<graphql::Request, Response = graphql::Response, Error = BoxError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = graphql::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: graphql::Request) -> Self::Future {
        let guard = self.guard.clone();
        // https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if compute_job::is_full() {
                tracing::debug!("compute pool saturated, admission check will queue");
            }
            let checked = compute_job::execute(
                ComputeJobType::QueryParsing,
                AssertUnwindSafe(move || {
                    let admission = guard.check(&request);
                    (request, admission)
                }),
            )
            .await;

            match checked {
                Ok((mut request, Ok(admitted))) => {
                    tracing::debug!(
                        depth = admitted.depth,
                        cost = admitted.cost,
                        "operation admitted"
                    );
                    request.query = Some(admitted.query.as_str().to_string());
                    inner.oneshot(request).await
                }
                Ok((_, Err(rejection))) => Ok(rejection.to_response()),
                Err(_) => {
                    tracing::error!("admission check panicked");
                    Ok(graphql::Response::builder()
                        .error(
                            graphql::Error::builder()
                                .message(INTERNAL_ERROR_MESSAGE)
                                .extension_code("INTERNAL_ERROR")
                                .http_status(500u16)
                                .build(),
                        )
                        .build())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use insta::assert_json_snapshot;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;
    use tower::ServiceBuilder;
    use tower::service_fn;

    use super::*;

    fn guard(configuration: &Configuration) -> AdmissionGuard {
        AdmissionGuard::new(configuration, Arc::new(FieldCatalog::portfolio()))
    }

    fn request(query: &str) -> graphql::Request {
        graphql::Request::builder().query(query).build()
    }

    #[test]
    fn guard_reports_depth_and_cost() {
        let admitted = guard(&Configuration::default())
            .check(&request("{ customers { content { orders { id } } } }"))
            .unwrap();
        assert_eq!(admitted.depth, 4);
        assert_eq!(admitted.cost, Some(210));
    }

    #[test]
    fn sanitizer_runs_before_costing() {
        let rejection = guard(&Configuration::default())
            .check(&request("{ customers { content { orders { id } } } } -- x"))
            .unwrap_err();
        assert_eq!(rejection, QueryRejection::ForbiddenPattern);
    }

    #[test]
    fn disabled_demand_control_skips_costing() {
        let mut configuration = Configuration::default();
        configuration.demand_control.enabled = false;
        configuration.demand_control.max_query_cost = 1;
        let admitted = guard(&configuration)
            .check(&request("{ customers { content { orders { id } } } }"))
            .unwrap();
        assert_eq!(admitted.cost, None);
    }

    #[tokio::test]
    async fn rejected_operations_never_reach_the_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let executor_calls = calls.clone();
        let executor = service_fn(move |_request: graphql::Request| {
            executor_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, BoxError>(graphql::Response::builder().data(json!({})).build()) }
        });
        let service = ServiceBuilder::new()
            .layer(AdmissionLayer::new(guard(&Configuration::default())))
            .service(executor);

        let query = "{ customers { content { orders { id orderDate status totalAmount a b c d } } } }";
        let response = service.oneshot(request(query)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.http_status(), 400);
        assert_json_snapshot!(response, @r###"
        {
          "errors": [
            {
              "message": "Query cost 910 exceeds maximum of 850",
              "extensions": {
                "code": "BAD_REQUEST",
                "httpStatus": 400
              }
            }
          ]
        }
        "###);
    }

    #[tokio::test]
    async fn admitted_operations_are_forwarded_trimmed() {
        let executor = service_fn(|request: graphql::Request| async move {
            Ok::<_, BoxError>(
                graphql::Response::builder()
                    .data(json!({ "query": request.query.unwrap_or_default() }))
                    .build(),
            )
        });
        let service = AdmissionLayer::new(guard(&Configuration::default())).layer(executor);

        let response = service
            .oneshot(request("   { customers { content { id } } }\n"))
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(json!({ "query": "{ customers { content { id } } }" }))
        );
        assert!(response.errors.is_empty());
    }
}
