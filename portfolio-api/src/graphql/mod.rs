//! Types related to GraphQL requests, responses, etc.

mod enhancer;

pub use enhancer::ErrorEnhancer;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::json_ext::Path;

/// JSON object, as used for variables and error extensions.
pub type Object = JsonMap<ByteString, Value>;

/// A GraphQL request as received from the transport layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    /// The GraphQL operation (e.g., query, mutation) string.
    pub query: Option<String>,

    /// The (optional) GraphQL operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// The (optional) GraphQL variables in the form of a JSON object.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub variables: Object,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        query: Option<String>,
        operation_name: Option<String>,
        // Spelled out rather than `Object` so that buildstructor treats it as a map
        variables: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
        }
    }
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Error {
    /// The error message.
    pub message: String,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// `extension_code` and `http_status` become the `code` and `httpStatus` extensions,
    /// in that order.
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        path: Option<Path>,
        extension_code: Option<String>,
        http_status: Option<u16>,
    ) -> Self {
        let mut extensions = Object::new();
        if let Some(code) = extension_code {
            extensions.insert("code", Value::String(code.into()));
        }
        if let Some(status) = http_status {
            extensions.insert("httpStatus", Value::Number(status.into()));
        }
        Self {
            message,
            path,
            extensions,
        }
    }

    /// The `code` extension, if any.
    pub fn extension_code(&self) -> Option<String> {
        self.extensions
            .get("code")
            .and_then(|code| code.as_str())
            .map(str::to_string)
    }

    /// The `httpStatus` extension, if any.
    pub fn http_status(&self) -> Option<u16> {
        self.extensions
            .get("httpStatus")
            .and_then(|status| status.as_u64())
            .and_then(|status| u16::try_from(status).ok())
    }
}

/// A GraphQL response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>) -> Self {
        Self { data, errors }
    }

    /// The status the transport should answer with: the first error's `httpStatus`
    /// when nothing was resolved, 200 otherwise.
    pub fn http_status(&self) -> u16 {
        if self.data.is_none() {
            self.errors
                .iter()
                .find_map(Error::http_status)
                .unwrap_or(200)
        } else {
            200
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn error_builder_sets_extensions_in_order() {
        let error = Error::builder()
            .message("Customer not found with id: 7")
            .path(Path::from("customer"))
            .extension_code("NOT_FOUND")
            .http_status(404u16)
            .build();

        assert_eq!(error.extension_code().as_deref(), Some("NOT_FOUND"));
        assert_eq!(error.http_status(), Some(404));
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({
                "message": "Customer not found with id: 7",
                "path": ["customer"],
                "extensions": { "code": "NOT_FOUND", "httpStatus": 404 }
            })
        );
    }

    #[test]
    fn request_deserializes_from_transport_body() {
        let request: Request = serde_json::from_str(
            r#"{"query":"{ customers { content { id } } }","operationName":null,"variables":{"status":"SHIPPED"}}"#,
        )
        .unwrap();
        assert_eq!(
            request.query.as_deref(),
            Some("{ customers { content { id } } }")
        );
        assert_eq!(request.operation_name, None);
        assert_eq!(request.variables.get("status"), Some(&json!("SHIPPED")));
    }

    #[test]
    fn partial_responses_are_successful() {
        let error = Error::builder()
            .message("boom")
            .extension_code("INTERNAL_ERROR")
            .http_status(500u16)
            .build();
        let partial = Response::builder()
            .data(json!({ "customers": null }))
            .error(error.clone())
            .build();
        assert_eq!(partial.http_status(), 200);

        let rejected = Response::builder().error(error).build();
        assert_eq!(rejected.http_status(), 500);
    }
}
