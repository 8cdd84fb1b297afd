use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use super::Error;
use super::Response;
use crate::spec::FieldCatalog;

/// Enum coercion failures name the enum type and the rejected literal, but not the valid ones.
static ENUM_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Invalid input for enum '(\w+)'\. No value found for name '(\w+)'")
        .expect("enum error pattern is valid")
});

/// Rewrites enum coercion errors so that they list the values the enum accepts.
///
/// ```text
/// Invalid input for enum 'OrderStatus'. No value found for name 'SxHIPPED'
/// ```
/// becomes
/// ```text
/// Invalid value 'SxHIPPED' for enum 'OrderStatus'. Valid values are: [CANCELLED, DELIVERED, PENDING, PROCESSING, SHIPPED]
/// ```
///
/// Any other error, or an enum the catalog does not know, is left as it is.
#[derive(Clone, Debug)]
pub struct ErrorEnhancer {
    catalog: Arc<FieldCatalog>,
}

impl ErrorEnhancer {
    pub fn new(catalog: Arc<FieldCatalog>) -> Self {
        Self { catalog }
    }

    /// Enhance every error of `response`, keeping its data untouched.
    pub fn enhance(&self, mut response: Response) -> Response {
        if response.errors.is_empty() {
            return response;
        }
        response.errors = response
            .errors
            .into_iter()
            .map(|error| self.enhance_error(error))
            .collect();
        response
    }

    fn enhance_error(&self, error: Error) -> Error {
        let captures = ENUM_ERROR_PATTERN
            .captures(&error.message)
            .map(|captures| (captures[1].to_string(), captures[2].to_string()));
        let Some((enum_name, invalid_value)) = captures else {
            return error;
        };

        let Some(mut valid_values) = self.catalog.enum_values(&enum_name) else {
            tracing::debug!("enum type '{enum_name}' not found in schema; keeping original error");
            return error;
        };
        valid_values.sort();

        let message = format!(
            "Invalid value '{invalid_value}' for enum '{enum_name}'. Valid values are: [{}]",
            valid_values.join(", ")
        );
        tracing::debug!("enhanced enum error: {message}");
        Error { message, ..error }
    }
}
