use std::collections::HashMap;
use std::collections::HashSet;

use apollo_compiler::Schema;
use apollo_compiler::schema::ExtendedType;

use super::SpecError;
use crate::demand_control::DemandControlConfig;

/// The SDL of the portfolio API.
pub const PORTFOLIO_SCHEMA: &str = include_str!("../../schema/portfolio.graphql");

/// How a field name weighs in the cost of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldClassification {
    /// A field that returns a list of parents, each of which may fetch children.
    FanOutRoot,
    /// A field that only wraps a list, such as the `content` of a page.
    StructuralWrapper,
    /// Everything else.
    Plain,
}

/// Static lookup tables derived from the schema and the demand control configuration.
#[derive(Clone, Debug)]
pub struct FieldCatalog {
    fan_out_fields: HashSet<String>,
    wrapper_fields: HashSet<String>,
    enums: HashMap<String, Vec<String>>,
}

impl FieldCatalog {
    pub fn new(
        sdl: &str,
        fan_out_fields: impl IntoIterator<Item = impl Into<String>>,
        wrapper_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, SpecError> {
        let schema = Schema::parse_and_validate(sdl, "schema.graphql").map_err(|with_errors| {
            SpecError::SchemaError(
                with_errors
                    .errors
                    .iter()
                    .next()
                    .map(|diagnostic| diagnostic.error.to_string())
                    .unwrap_or_else(|| "invalid schema".to_string()),
            )
        })?;

        let enums = schema
            .types
            .iter()
            .filter_map(|(name, ty)| match ty {
                ExtendedType::Enum(enum_type) => Some((
                    name.to_string(),
                    enum_type.values.keys().map(|value| value.to_string()).collect(),
                )),
                _ => None,
            })
            .collect();
        let declared_fields: HashSet<&str> = schema
            .types
            .values()
            .filter_map(|ty| match ty {
                ExtendedType::Object(object) => Some(object.fields.keys()),
                _ => None,
            })
            .flatten()
            .map(|name| name.as_str())
            .collect();

        let fan_out_fields: HashSet<String> = fan_out_fields.into_iter().map(Into::into).collect();
        let wrapper_fields: HashSet<String> = wrapper_fields.into_iter().map(Into::into).collect();
        for field in fan_out_fields.iter().chain(&wrapper_fields) {
            if !declared_fields.contains(field.as_str()) {
                tracing::warn!("field '{field}' is classified for costing but no type declares it");
            }
        }

        Ok(Self {
            fan_out_fields,
            wrapper_fields,
            enums,
        })
    }

    /// The catalog of the bundled schema, classified as configured.
    pub fn from_configuration(config: &DemandControlConfig) -> Result<Self, SpecError> {
        Self::new(
            PORTFOLIO_SCHEMA,
            config.fan_out_fields.iter().cloned(),
            config.wrapper_fields.iter().cloned(),
        )
    }

    #[cfg(test)]
    pub(crate) fn portfolio() -> Self {
        Self::from_configuration(&DemandControlConfig::default()).expect("bundled schema is valid")
    }

    pub fn classify(&self, field_name: &str) -> FieldClassification {
        if self.fan_out_fields.contains(field_name) {
            FieldClassification::FanOutRoot
        } else if self.wrapper_fields.contains(field_name) {
            FieldClassification::StructuralWrapper
        } else {
            FieldClassification::Plain
        }
    }

    /// The values of the enum type `name`, in declaration order.
    pub fn enum_values(&self, name: &str) -> Option<Vec<String>> {
        self.enums.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_classification() {
        let catalog = FieldCatalog::portfolio();
        assert_eq!(catalog.classify("customers"), FieldClassification::FanOutRoot);
        assert_eq!(catalog.classify("orders"), FieldClassification::FanOutRoot);
        assert_eq!(
            catalog.classify("content"),
            FieldClassification::StructuralWrapper
        );
        assert_eq!(catalog.classify("customer"), FieldClassification::Plain);
        assert_eq!(catalog.classify("id"), FieldClassification::Plain);
    }

    #[test]
    fn enum_values_come_from_the_schema() {
        let catalog = FieldCatalog::portfolio();
        assert_eq!(
            catalog.enum_values("OrderStatus"),
            Some(vec![
                "PENDING".to_string(),
                "PROCESSING".to_string(),
                "SHIPPED".to_string(),
                "DELIVERED".to_string(),
                "CANCELLED".to_string(),
            ])
        );
        assert_eq!(catalog.enum_values("Colour"), None);
    }

    #[test]
    fn classification_is_configurable() {
        let catalog = FieldCatalog::new(PORTFOLIO_SCHEMA, ["orders"], Vec::<String>::new()).unwrap();
        assert_eq!(catalog.classify("customers"), FieldClassification::Plain);
        assert_eq!(catalog.classify("content"), FieldClassification::Plain);
        assert_eq!(catalog.classify("orders"), FieldClassification::FanOutRoot);
    }

    #[test]
    fn invalid_schema_is_an_error() {
        let error = FieldCatalog::new("type Query {", ["customers"], ["content"]).unwrap_err();
        assert!(matches!(error, SpecError::SchemaError(_)));
    }
}
