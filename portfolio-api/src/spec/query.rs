use std::collections::HashMap;

use apollo_compiler::ast;

use super::SpecError;

/// A parsed GraphQL executable document.
///
/// Only the syntax is checked: nothing is validated against the schema.
#[derive(Debug, Clone)]
pub struct Query {
    string: String,
    document: ast::Document,
}

impl Query {
    pub fn parse(query: impl Into<String>) -> Result<Self, SpecError> {
        let string = query.into();
        let document = ast::Document::parse(string.as_str(), "query.graphql").map_err(
            |with_errors| {
                let reason = with_errors
                    .errors
                    .iter()
                    .next()
                    .map(|diagnostic| diagnostic.error.to_string())
                    .unwrap_or_else(|| "unknown parsing error".to_string());
                SpecError::ParsingError(reason)
            },
        )?;
        Ok(Self { string, document })
    }

    /// The query text, as parsed.
    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub fn document(&self) -> &ast::Document {
        &self.document
    }

    pub(crate) fn operations(&self) -> impl Iterator<Item = &ast::OperationDefinition> {
        self.document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => Some(&**operation),
                _ => None,
            })
    }

    pub(crate) fn fragments(&self) -> HashMap<&str, &ast::FragmentDefinition> {
        self.document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::FragmentDefinition(fragment) => {
                    Some((fragment.name.as_str(), &**fragment))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operations_and_fragments() {
        let query = Query::parse(
            "query Q { customers { content { ...names } } } \
             fragment names on Customer { firstName lastName }",
        )
        .unwrap();
        assert_eq!(query.operations().count(), 1);
        assert!(query.fragments().contains_key("names"));
    }

    #[test]
    fn unbalanced_braces_are_a_parsing_error() {
        let error = Query::parse("{ customers { content { id } }").unwrap_err();
        assert!(matches!(error, SpecError::ParsingError(_)));
    }

    #[test]
    fn garbage_is_a_parsing_error() {
        assert!(Query::parse("this is not graphql").is_err());
    }
}
