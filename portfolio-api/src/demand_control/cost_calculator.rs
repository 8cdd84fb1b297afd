use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::ast;

use crate::spec::FieldCatalog;
use crate::spec::FieldClassification;
use crate::spec::Query;

/// Cost of a fan-out root, before its children are multiplied in.
const FAN_OUT_BASE_COST: u64 = 10;
/// Expected number of parents returned by a fan-out root.
const FAN_OUT_MULTIPLIER: u64 = 10;
/// Cost of any other field.
const PLAIN_FIELD_COST: u64 = 1;

/// A selected field and the fields selected beneath it, with fragments already flattened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CostNode {
    pub field_name: String,
    pub children: Vec<CostNode>,
}

impl CostNode {
    fn children_cost(&self, catalog: &FieldCatalog) -> u64 {
        self.children
            .iter()
            .map(|child| child.cost(catalog))
            .fold(0, u64::saturating_add)
    }

    /// Cost of this field, including its children.
    pub fn cost(&self, catalog: &FieldCatalog) -> u64 {
        let children_cost = self.children_cost(catalog);
        let cost = match catalog.classify(&self.field_name) {
            FieldClassification::FanOutRoot => {
                FAN_OUT_BASE_COST.saturating_add(children_cost.saturating_mul(FAN_OUT_MULTIPLIER))
            }
            FieldClassification::StructuralWrapper => children_cost,
            FieldClassification::Plain => PLAIN_FIELD_COST.saturating_add(children_cost),
        };
        tracing::trace!(
            "Field {} cost breakdown: (children) {} = {}",
            self.field_name,
            children_cost,
            cost
        );
        cost
    }
}

/// Estimates the cost of a query from its shape alone.
#[derive(Clone, Debug)]
pub struct StaticCostCalculator {
    catalog: Arc<FieldCatalog>,
}

impl StaticCostCalculator {
    pub fn new(catalog: Arc<FieldCatalog>) -> Self {
        Self { catalog }
    }

    /// Sum of the costs of the root fields of every operation in `query`.
    pub fn estimated(&self, query: &Query) -> u64 {
        let cost = Self::cost_tree(query)
            .iter()
            .map(|root| root.cost(&self.catalog))
            .fold(0, u64::saturating_add);
        tracing::debug!("estimated query cost: {cost}");
        cost
    }

    /// The root fields of every operation in `query`.
    pub fn cost_tree(query: &Query) -> Vec<CostNode> {
        let fragments = query.fragments();
        let mut visiting = Vec::new();
        query
            .operations()
            .flat_map(|operation| {
                collect_nodes(&operation.selection_set, &fragments, &mut visiting)
            })
            .collect()
    }
}

fn collect_nodes<'doc>(
    selection_set: &'doc [ast::Selection],
    fragments: &HashMap<&str, &'doc ast::FragmentDefinition>,
    visiting: &mut Vec<&'doc str>,
) -> Vec<CostNode> {
    let mut nodes = Vec::new();
    for selection in selection_set {
        match selection {
            ast::Selection::Field(field) => {
                if skipped_by_directives(&field.directives) {
                    continue;
                }
                nodes.push(CostNode {
                    field_name: field.name.to_string(),
                    children: collect_nodes(&field.selection_set, fragments, visiting),
                });
            }
            ast::Selection::InlineFragment(inline) => {
                if skipped_by_directives(&inline.directives) {
                    continue;
                }
                nodes.extend(collect_nodes(&inline.selection_set, fragments, visiting));
            }
            ast::Selection::FragmentSpread(spread) => {
                if skipped_by_directives(&spread.directives) {
                    continue;
                }
                let name = spread.fragment_name.as_str();
                if visiting.contains(&name) {
                    tracing::debug!("fragment {name} spreads itself, ignoring the cycle");
                    continue;
                }
                let Some(fragment) = fragments.get(name) else {
                    tracing::debug!("no definition for fragment {name}");
                    continue;
                };
                visiting.push(name);
                nodes.extend(collect_nodes(&fragment.selection_set, fragments, visiting));
                visiting.pop();
            }
        }
    }
    nodes
}

/// `@skip(if: true)` or `@include(if: false)` with a literal argument.
fn skipped_by_directives(directives: &ast::DirectiveList) -> bool {
    let literal_if = |name: &str| {
        directives
            .get(name)
            .and_then(|directive| directive.specified_argument_by_name("if"))
            .and_then(|value| value.to_bool())
    };
    literal_if("skip") == Some(true) || literal_if("include") == Some(false)
}
