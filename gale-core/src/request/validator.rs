//! Response validation rules
//!
//! An optional, composable pipeline of predicates over (status, headers,
//! body). When no validator is configured, success is defined purely by the
//! 2xx status range.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Borrowed view of a received response, as seen by validation rules
pub struct ResponseView<'a> {
    pub status: u16,
    pub headers: &'a HashMap<String, String>,
    pub body: &'a str,
}

/// Rule categories, reported with each failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    StatusRange,
    BodyContains,
    BodyMatches,
    HeaderEquals,
    SizeRange,
    Custom,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::StatusRange => "status-range",
            RuleKind::BodyContains => "body-contains",
            RuleKind::BodyMatches => "body-matches",
            RuleKind::HeaderEquals => "header-equals",
            RuleKind::SizeRange => "size-range",
            RuleKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// One failed rule: its kind and human-readable description
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub kind: RuleKind,
    pub description: String,
}

/// Outcome of running the full pipeline
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationOutcome {
    /// All failure descriptions joined for log lines
    pub fn describe(&self) -> String {
        if self.failures.is_empty() {
            return "no validation failures".to_string();
        }
        self.failures
            .iter()
            .map(|f| f.description.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

type RuleCheck = Box<dyn Fn(&ResponseView<'_>) -> bool + Send + Sync>;

struct Rule {
    kind: RuleKind,
    description: String,
    check: RuleCheck,
}

/// Composable response validator; rules are evaluated in insertion order and
/// every failing rule is reported
#[derive(Default)]
pub struct ResponseValidator {
    rules: Vec<Rule>,
}

impl ResponseValidator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Require the status code to fall in `[min, max]` inclusive
    pub fn with_status_range(mut self, min: u16, max: u16) -> Self {
        self.rules.push(Rule {
            kind: RuleKind::StatusRange,
            description: format!("status code must be between {min} and {max}"),
            check: Box::new(move |response| (min..=max).contains(&response.status)),
        });
        self
    }

    /// Require the body to contain `expected`
    pub fn with_body_containing(mut self, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        self.rules.push(Rule {
            kind: RuleKind::BodyContains,
            description: format!("response body must contain '{expected}'"),
            check: Box::new(move |response| response.body.contains(&expected)),
        });
        self
    }

    /// Require the body to match `pattern`
    pub fn with_body_matching(mut self, pattern: Regex) -> Self {
        self.rules.push(Rule {
            kind: RuleKind::BodyMatches,
            description: format!("response body must match pattern '{pattern}'"),
            check: Box::new(move |response| pattern.is_match(response.body)),
        });
        self
    }

    /// Require header `name` to equal `value` (name compared
    /// case-insensitively, as header names are)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        self.rules.push(Rule {
            kind: RuleKind::HeaderEquals,
            description: format!("response must have header '{name}' with value '{value}'"),
            check: Box::new(move |response| {
                response
                    .headers
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case(&name) && v == &value)
            }),
        });
        self
    }

    /// Require the body byte length to fall in `[min, max]` inclusive
    pub fn with_size_range(mut self, min: usize, max: usize) -> Self {
        self.rules.push(Rule {
            kind: RuleKind::SizeRange,
            description: format!("response size must be between {min} and {max} bytes"),
            check: Box::new(move |response| {
                let size = response.body.len();
                size >= min && size <= max
            }),
        });
        self
    }

    /// Add an arbitrary predicate
    pub fn with_custom_rule<F>(mut self, description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ResponseView<'_>) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            kind: RuleKind::Custom,
            description: description.into(),
            check: Box::new(check),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule; the outcome is ok only when all rules pass
    pub fn validate(&self, response: &ResponseView<'_>) -> ValidationOutcome {
        let failures: Vec<ValidationFailure> = self
            .rules
            .iter()
            .filter(|rule| !(rule.check)(response))
            .map(|rule| ValidationFailure {
                kind: rule.kind,
                description: rule.description.clone(),
            })
            .collect();
        ValidationOutcome {
            ok: failures.is_empty(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(status: u16, headers: &'a HashMap<String, String>, body: &'a str) -> ResponseView<'a> {
        ResponseView { status, headers, body }
    }

    #[test]
    fn test_empty_validator_passes_everything() {
        let validator = ResponseValidator::new();
        let headers = HashMap::new();
        assert!(validator.validate(&view(500, &headers, "boom")).ok);
    }

    #[test]
    fn test_status_range_rule() {
        let validator = ResponseValidator::new().with_status_range(200, 299);
        let headers = HashMap::new();
        assert!(validator.validate(&view(204, &headers, "")).ok);
        let outcome = validator.validate(&view(404, &headers, ""));
        assert!(!outcome.ok);
        assert_eq!(outcome.failures[0].kind, RuleKind::StatusRange);
    }

    #[test]
    fn test_body_contains_rule() {
        let validator = ResponseValidator::new().with_body_containing("\"ok\":true");
        let headers = HashMap::new();
        assert!(validator.validate(&view(200, &headers, "{\"ok\":true}")).ok);
        assert!(!validator.validate(&view(200, &headers, "{\"ok\":false}")).ok);
    }

    #[test]
    fn test_body_matching_rule() {
        let validator =
            ResponseValidator::new().with_body_matching(Regex::new(r"id-\d{4}").unwrap());
        let headers = HashMap::new();
        assert!(validator.validate(&view(200, &headers, "created id-1234")).ok);
        assert!(!validator.validate(&view(200, &headers, "created id-12")).ok);
    }

    #[test]
    fn test_header_rule_is_name_case_insensitive() {
        let validator = ResponseValidator::new().with_header("Content-Type", "application/json");
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        assert!(validator.validate(&view(200, &headers, "")).ok);

        headers.insert("content-type".to_string(), "text/html".to_string());
        assert!(!validator.validate(&view(200, &headers, "")).ok);
    }

    #[test]
    fn test_size_range_rule() {
        let validator = ResponseValidator::new().with_size_range(2, 5);
        let headers = HashMap::new();
        assert!(validator.validate(&view(200, &headers, "abc")).ok);
        assert!(!validator.validate(&view(200, &headers, "a")).ok);
        assert!(!validator.validate(&view(200, &headers, "abcdef")).ok);
    }

    #[test]
    fn test_custom_rule() {
        let validator = ResponseValidator::new()
            .with_custom_rule("body must be valid JSON", |response| {
                serde_json::from_str::<serde_json::Value>(response.body).is_ok()
            });
        let headers = HashMap::new();
        assert!(validator.validate(&view(200, &headers, "{\"a\":1}")).ok);
        assert!(!validator.validate(&view(200, &headers, "not json")).ok);
    }

    #[test]
    fn test_all_failures_reported() {
        let validator = ResponseValidator::new()
            .with_status_range(200, 299)
            .with_body_containing("hello")
            .with_size_range(0, 3);
        let headers = HashMap::new();
        let outcome = validator.validate(&view(500, &headers, "goodbye"));
        assert!(!outcome.ok);
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.describe().contains("status code"));
    }
}
