//! Portfolio API errors.
use displaydoc::Display;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql;
use crate::json_ext::Path;

/// Public message of errors whose detail must stay in the logs.
pub(crate) const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Machine-readable metadata attached to every error surfaced to a client.
pub trait ErrorExtension: std::fmt::Display {
    /// The `extensions.code` value.
    fn extension_code(&self) -> String;

    /// The HTTP status suggested to the transport layer.
    fn http_status(&self) -> u16;

    /// The message shown to the client.
    fn public_message(&self) -> String {
        self.to_string()
    }

    /// Convert the error to a GraphQL error, optionally attributed to a response path.
    fn to_graphql_error(&self, path: Option<Path>) -> graphql::Error {
        graphql::Error::builder()
            .message(self.public_message())
            .and_path(path)
            .extension_code(self.extension_code())
            .http_status(self.http_status())
            .build()
    }
}

/// Reasons an operation is refused before any resolver runs.
///
/// Rejections never reach execution: the whole operation is answered with a single error.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryRejection {
    /// Query must not be blank
    Blank,

    /// Query exceeds maximum allowed length of {max} characters
    TooLong {
        /// Length of the trimmed query, in characters.
        length: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Query contains forbidden patterns
    ForbiddenPattern,

    /// Query contains invalid syntax: {reason}
    InvalidSyntax {
        /// First diagnostic reported by the parser.
        reason: String,
    },

    /// Query nesting depth {depth} exceeds maximum of {max}
    TooDeep { depth: u32, max: u32 },

    /// Query cost {cost} exceeds maximum of {max}
    TooCostly { cost: u64, max: u64 },
}

impl QueryRejection {
    /// Convert the rejection to a complete response: no data, one error.
    pub fn to_response(&self) -> graphql::Response {
        graphql::Response::builder()
            .error(self.to_graphql_error(None))
            .build()
    }
}

impl ErrorExtension for QueryRejection {
    fn extension_code(&self) -> String {
        "BAD_REQUEST".to_string()
    }

    fn http_status(&self) -> u16 {
        400
    }
}

/// Errors raised while resolving data during execution.
///
/// These are attributed to the field that triggered them and leave sibling fields untouched.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchError {
    /// batch load '{loader}' failed: {reason}
    BatchDispatchFailure {
        /// The loader whose bulk fetch failed.
        loader: &'static str,
        /// The reason the bulk fetch failed.
        reason: String,
    },

    /// batch load '{loader}' was dropped before it was dispatched
    BatchCancelled { loader: &'static str },

    /// {entity} not found with id: {id}
    NotFound { entity: &'static str, id: String },

    /// {reason}
    InvalidArgument { reason: String },
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::BatchDispatchFailure { .. } | FetchError::BatchCancelled { .. } => {
                "INTERNAL_ERROR"
            }
            FetchError::NotFound { .. } => "NOT_FOUND",
            FetchError::InvalidArgument { .. } => "BAD_REQUEST",
        }
        .to_string()
    }

    fn http_status(&self) -> u16 {
        match self {
            FetchError::BatchDispatchFailure { .. } | FetchError::BatchCancelled { .. } => 500,
            FetchError::NotFound { .. } => 404,
            FetchError::InvalidArgument { .. } => 400,
        }
    }

    fn public_message(&self) -> String {
        match self {
            FetchError::BatchDispatchFailure { .. } | FetchError::BatchCancelled { .. } => {
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error attributed to `path`, logging it on the way.
    pub(crate) fn to_field_error(&self, path: &Path) -> graphql::Error {
        match self {
            FetchError::NotFound { .. } | FetchError::InvalidArgument { .. } => {
                tracing::warn!(%path, "{self}");
            }
            _ => {
                tracing::error!(%path, "unexpected error during data fetch: {self}");
            }
        }
        self.to_graphql_error(Some(path.clone()))
    }
}
