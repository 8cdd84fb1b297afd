//! Main entry point for the CLI command checking operations against the admission rules.

use std::io::IsTerminal;
use std::io::Read;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use clap::Parser;
use futures::future::join_all;
use serde_json_bytes::Value;
use serde_json_bytes::json;
use tower::BoxError;
use tower::Layer;
use tower::ServiceExt;
use tower::service_fn;
use tracing_subscriber::EnvFilter;

use crate::compute_job;
use crate::compute_job::ComputeJobType;
use crate::configuration::Configuration;
use crate::configuration::generate_config_schema;
use crate::context::RequestContext;
use crate::domain::CustomerId;
use crate::fetchers;
use crate::fetchers::OrdersArguments;
use crate::graphql;
use crate::graphql::ErrorEnhancer;
use crate::json_ext::Path;
use crate::repository::InMemoryRepository;
use crate::repository::Repository;
use crate::services::AdmissionGuard;
use crate::services::AdmissionLayer;
use crate::spec::FieldCatalog;

/// The operation answered by `--demo`.
const DEMO_QUERY: &str = r#"{
  customers {
    content {
      id
      firstName
      orders(size: 100) {
        id
        status
        customer { firstName }
      }
    }
  }
}"#;

const DEMO_CUSTOMERS: i64 = 5;

const DEMO_ORDERS_ARGUMENTS: OrdersArguments = OrdersArguments {
    status: None,
    page: None,
    size: Some(100),
};

/// Options for the admission checker
#[derive(Parser, Debug)]
#[clap(
    name = "portfolio",
    about = "Check GraphQL operations against the portfolio API admission rules"
)]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[clap(long = "log", default_value = "info", env = "PORTFOLIO_LOG")]
    log_level: String,

    /// Configuration file location.
    #[clap(short, long = "config", env = "PORTFOLIO_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Prints the configuration schema.
    #[clap(long)]
    schema: bool,

    /// Admit and resolve a demo operation against seeded in-memory data.
    #[clap(long)]
    demo: bool,

    /// File holding the operation to check, `-` for stdin.
    query_path: Option<PathBuf>,
}

/// Entry point of the `portfolio` binary.
pub fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(start(Opt::parse()))
}

async fn start(opt: Opt) -> Result<()> {
    if opt.schema {
        let schema = generate_config_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    // stdout carries the verdict, logs go to stderr
    let builder = tracing_subscriber::fmt::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
        );
    if std::io::stderr().is_terminal() {
        builder.try_init()
    } else {
        builder.json().try_init()
    }
    .map_err(|err| anyhow!(err))?;
    setup_panic_handler();

    let configuration = load_configuration(opt.config_path.as_ref())?;
    if let Some(threads) = configuration.worker_pool.threads {
        compute_job::set_thread_pool_size(threads);
    }
    let catalog = Arc::new(
        FieldCatalog::from_configuration(&configuration.demand_control)
            .context("could not load the field catalog")?,
    );
    let guard = AdmissionGuard::new(&configuration, catalog.clone());

    if opt.demo {
        return run_demo(&configuration, guard, catalog).await;
    }

    let query = match opt.query_path {
        Some(path) if path.as_os_str() == "-" => {
            let mut query = String::new();
            std::io::stdin()
                .read_to_string(&mut query)
                .context("could not read the query from stdin")?;
            query
        }
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("could not read the query from {}", path.display()))?,
        None => bail!("a query file, or '-' for stdin, is required unless --demo is given"),
    };
    let request = graphql::Request::builder().query(query).build();

    let admission = compute_job::execute(
        ComputeJobType::QueryParsing,
        AssertUnwindSafe(move || guard.check(&request)),
    )
    .await
    .map_err(|_| anyhow!("admission check panicked"))?;

    match admission {
        Ok(admitted) => {
            let verdict = serde_json::json!({
                "accepted": true,
                "depth": admitted.depth,
                "cost": admitted.cost,
            });
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
        Err(rejection) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&rejection.to_response())?
            );
            Err(anyhow!("operation rejected: {rejection}"))
        }
    }
}

fn load_configuration(path: Option<&PathBuf>) -> Result<Configuration> {
    // Overrides from the environment still apply without a file
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("could not read configuration {}", path.display()))?,
        None => String::new(),
    };
    Ok(raw.parse::<Configuration>()?)
}

async fn run_demo(
    configuration: &Configuration,
    guard: AdmissionGuard,
    catalog: Arc<FieldCatalog>,
) -> Result<()> {
    let repository = Arc::new(InMemoryRepository::seeded());
    let executor_repository: Arc<dyn Repository> = repository.clone();
    let batching = configuration.batching.clone();
    let executor = service_fn(move |_request: graphql::Request| {
        let ctx = RequestContext::new(executor_repository.clone(), &batching);
        async move { Ok::<_, BoxError>(resolve_demo(ctx).await) }
    });

    let response = AdmissionLayer::new(guard)
        .layer(executor)
        .oneshot(graphql::Request::builder().query(DEMO_QUERY).build())
        .await
        .map_err(|err| anyhow!(err))?;
    let response = ErrorEnhancer::new(catalog).enhance(response);

    tracing::info!(
        orders_fetches = repository.order_fetch_count(),
        customer_fetches = repository.customer_fetch_count(),
        "demo operation resolved"
    );
    let report = serde_json::json!({
        "response": response,
        "repositoryCalls": {
            "ordersByCustomer": repository.order_fetch_count(),
            "customerById": repository.customer_fetch_count(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Resolves the shape of [`DEMO_QUERY`], one resolution tick per level.
async fn resolve_demo(ctx: RequestContext) -> graphql::Response {
    let mut errors = Vec::new();
    let content_path = Path::from("customers/content");

    let pending: Vec<_> = (1..=DEMO_CUSTOMERS)
        .map(|id| ctx.customer_by_id().load(CustomerId(id)))
        .collect();
    ctx.end_tick().await;
    let mut customers = Vec::new();
    for result in join_all(pending).await {
        match result {
            Ok(Some(customer)) => customers.push((content_path.index(customers.len()), customer)),
            Ok(None) => {}
            Err(error) => errors.push(error.to_field_error(&content_path)),
        }
    }

    let orders_per_customer =
        fetchers::customer_orders(&ctx, &customers, DEMO_ORDERS_ARGUMENTS).await;
    let mut orders = Vec::new();
    let mut orders_len = Vec::with_capacity(customers.len());
    for ((path, _), result) in customers.iter().zip(orders_per_customer) {
        match result {
            Ok(customer_orders) => {
                orders_len.push(Some(customer_orders.len()));
                let orders_path = path.key("orders");
                orders.extend(
                    customer_orders
                        .into_iter()
                        .enumerate()
                        .map(|(index, order)| (orders_path.index(index), order)),
                );
            }
            Err(error) => {
                orders_len.push(None);
                errors.push(error);
            }
        }
    }

    let owners = fetchers::order_customers(&ctx, &orders).await;
    let mut resolved_orders = orders.into_iter().zip(owners).map(|((_, order), owner)| {
        let customer = match owner {
            Ok(customer) => json!({ "firstName": customer.first_name }),
            Err(error) => {
                errors.push(error);
                Value::Null
            }
        };
        json!({
            "id": order.id.0,
            "status": order.status.as_str(),
            "customer": customer,
        })
    });

    let mut content = Vec::with_capacity(customers.len());
    for ((_, customer), len) in customers.iter().zip(orders_len) {
        let orders = match len {
            Some(len) => Value::Array(resolved_orders.by_ref().take(len).collect()),
            None => Value::Null,
        };
        content.push(json!({
            "id": customer.id.0,
            "firstName": customer.first_name,
            "orders": orders,
        }));
    }
    drop(resolved_orders);

    graphql::Response::builder()
        .data(json!({ "customers": { "content": content } }))
        .errors(errors)
        .build()
}

fn setup_panic_handler() {
    // Redirect panics to the logs.
    std::panic::set_hook(Box::new(move |e| tracing::error!("{}", e)));
}
