//! First line of admission: refuse malformed, oversized, suspicious or overly nested queries.
use std::sync::LazyLock;

use regex::Regex;

use crate::configuration::Limits;
use crate::error::QueryRejection;
use crate::graphql;
use crate::spec::Query;
use crate::spec::SpecError;
use crate::spec::operation_limits;

static FORBIDDEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(<script|javascript:|on\w+\s*=|--|;\s*(drop|insert|update|delete)\s)")
        .expect("forbidden pattern is valid")
});

/// A query that passed every sanitizer check.
#[derive(Clone, Debug)]
pub struct SanitizedQuery {
    /// The trimmed query, parsed.
    pub query: Query,
    pub depth: u32,
}

#[derive(Clone, Debug)]
pub struct QuerySanitizer {
    max_query_length: usize,
    max_query_depth: u32,
}

impl QuerySanitizer {
    pub fn new(limits: &Limits) -> Self {
        Self {
            max_query_length: limits.max_query_length,
            max_query_depth: limits.max_query_depth,
        }
    }

    /// Checks run in order and the first failure wins: blank, length, forbidden patterns,
    /// syntax, depth.
    pub fn sanitize(&self, request: &graphql::Request) -> Result<SanitizedQuery, QueryRejection> {
        let query = request.query.as_deref().unwrap_or_default();
        if query.trim().is_empty() {
            tracing::warn!("rejected query: blank");
            return Err(QueryRejection::Blank);
        }
        let query = query.trim();

        let length = query.chars().count();
        if length > self.max_query_length {
            tracing::warn!(
                length,
                max = self.max_query_length,
                "rejected query: exceeds maximum length"
            );
            return Err(QueryRejection::TooLong {
                length,
                max: self.max_query_length,
            });
        }

        if FORBIDDEN_PATTERN.is_match(query) {
            tracing::warn!("rejected query: contains forbidden patterns");
            return Err(QueryRejection::ForbiddenPattern);
        }

        let parsed = Query::parse(query).map_err(|err| {
            tracing::warn!("rejected query: {err}");
            let reason = match err {
                SpecError::ParsingError(reason) => reason,
                other => other.to_string(),
            };
            QueryRejection::InvalidSyntax { reason }
        })?;

        let depth = operation_limits::depth(parsed.document());
        if depth > self.max_query_depth {
            tracing::warn!(
                depth,
                max = self.max_query_depth,
                "rejected query: exceeds maximum depth"
            );
            return Err(QueryRejection::TooDeep {
                depth,
                max: self.max_query_depth,
            });
        }

        tracing::debug!(length, depth, "query sanitized");
        Ok(SanitizedQuery {
            query: parsed,
            depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sanitize(query: &str) -> Result<SanitizedQuery, QueryRejection> {
        QuerySanitizer::new(&Limits::default())
            .sanitize(&graphql::Request::builder().query(query).build())
    }

    fn nested(levels: usize) -> String {
        let mut query = "{ ".to_string();
        for level in 0..levels - 1 {
            query.push_str(&format!("f{level} {{ "));
        }
        query.push_str("leaf");
        query.push_str(&" }".repeat(levels));
        query
    }

    #[test]
    fn blank_queries() {
        assert_eq!(sanitize("").unwrap_err(), QueryRejection::Blank);
        assert_eq!(sanitize(" \n\t ").unwrap_err(), QueryRejection::Blank);
        assert_eq!(
            QuerySanitizer::new(&Limits::default())
                .sanitize(&graphql::Request::default())
                .unwrap_err(),
            QueryRejection::Blank
        );
    }

    #[test]
    fn queries_are_trimmed() {
        let sanitized = sanitize("\n  { customers { content { id } } }  \n").unwrap();
        assert_eq!(sanitized.query.as_str(), "{ customers { content { id } } }");
        assert_eq!(sanitized.depth, 3);
    }

    #[test]
    fn length_limit_is_inclusive() {
        let limits = Limits {
            max_query_length: 10,
            ..Default::default()
        };
        let sanitizer = QuerySanitizer::new(&limits);
        let request = |query: &str| graphql::Request::builder().query(query).build();

        // exactly ten characters once trimmed
        assert!(sanitizer.sanitize(&request("  { a { b }}  ")).is_ok());
        assert_eq!(
            sanitizer.sanitize(&request("{ a { bc }}")).unwrap_err(),
            QueryRejection::TooLong {
                length: 11,
                max: 10
            }
        );
    }

    #[test]
    fn length_is_counted_in_characters() {
        let limits = Limits {
            max_query_length: 16,
            ..Default::default()
        };
        let request = graphql::Request::builder()
            .query(r#"{ a(s: "éééé") }"#)
            .build();
        assert!(QuerySanitizer::new(&limits).sanitize(&request).is_ok());
    }

    #[test]
    fn length_is_checked_before_patterns() {
        let query = format!("{{ a }} <script>{}", " ".repeat(10_000));
        let query = format!("{query}x");
        assert!(matches!(
            sanitize(&query).unwrap_err(),
            QueryRejection::TooLong { .. }
        ));
    }

    #[test]
    fn forbidden_patterns() {
        for query in [
            "{ customers { content { id } } } <script>alert(1)</script>",
            "{ customers { content { id } } } <SCRIPT>",
            r#"{ customer(id: "javascript:alert(1)") { id } }"#,
            r#"{ customer(id: "x onclick = y") { id } }"#,
            "{ customers { content { id } } } -- comment",
            r#"{ customer(id: "1; DROP table") { id } }"#,
            r#"{ customer(id: "1;delete from") { id } }"#,
        ] {
            assert_eq!(
                sanitize(query).unwrap_err(),
                QueryRejection::ForbiddenPattern,
                "{query}"
            );
        }
    }

    #[test]
    fn patterns_are_checked_before_syntax() {
        assert_eq!(
            sanitize("{ customers { -- ").unwrap_err(),
            QueryRejection::ForbiddenPattern
        );
    }

    #[test]
    fn invalid_syntax() {
        let rejection = sanitize("{ customers { content { id } }").unwrap_err();
        let QueryRejection::InvalidSyntax { reason } = &rejection else {
            panic!("expected a syntax rejection, got {rejection:?}");
        };
        assert!(!reason.is_empty());
        assert!(
            rejection
                .to_string()
                .starts_with("Query contains invalid syntax: ")
        );
    }

    #[test]
    fn depth_limit_is_inclusive() {
        assert_eq!(sanitize(&nested(10)).unwrap().depth, 10);
        assert_eq!(
            sanitize(&nested(11)).unwrap_err(),
            QueryRejection::TooDeep { depth: 11, max: 10 }
        );
    }
}
