//! Demand control: refuse queries whose estimated cost exceeds a budget.
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

mod cost_calculator;

pub use cost_calculator::CostNode;
pub use cost_calculator::StaticCostCalculator;

use crate::error::QueryRejection;
use crate::spec::FieldCatalog;
use crate::spec::Query;

/// What happens to a query over budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub enum Mode {
    /// Log the overrun and let the query through.
    Measure,
    /// Reject the query.
    #[default]
    Enforce,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct DemandControlConfig {
    /// Estimate query costs at all.
    pub enabled: bool,
    pub mode: Mode,
    /// Queries whose estimated cost is strictly greater are over budget.
    pub max_query_cost: u64,
    /// Fields that return a list of parents: `10 + 10 * children`.
    pub fan_out_fields: Vec<String>,
    /// Fields that only wrap a list and cost what their children cost.
    pub wrapper_fields: Vec<String>,
}

impl Default for DemandControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: Mode::Enforce,
            max_query_cost: 850,
            fan_out_fields: vec!["customers".to_string(), "orders".to_string()],
            wrapper_fields: vec!["content".to_string()],
        }
    }
}

#[derive(Clone, Debug)]
pub struct DemandControl {
    config: DemandControlConfig,
    cost_calculator: StaticCostCalculator,
}

impl DemandControl {
    pub fn new(config: DemandControlConfig, catalog: Arc<FieldCatalog>) -> Self {
        Self {
            config,
            cost_calculator: StaticCostCalculator::new(catalog),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the estimated cost of `query`, or a rejection when it is over budget and enforced.
    pub fn check(&self, query: &Query) -> Result<u64, QueryRejection> {
        let cost = self.cost_calculator.estimated(query);
        let max = self.config.max_query_cost;
        if cost <= max {
            return Ok(cost);
        }
        match self.config.mode {
            Mode::Measure => {
                tracing::info!(cost, max, "query cost exceeds maximum, measure mode");
                Ok(cost)
            }
            Mode::Enforce => {
                tracing::warn!(cost, max, "rejected query: cost exceeds maximum");
                Err(QueryRejection::TooCostly { cost, max })
            }
        }
    }
}
