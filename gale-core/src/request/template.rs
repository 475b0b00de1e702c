//! HTTP request templates
//!
//! A template is an HTTP request skeleton whose URL, header values, and body
//! may contain `${name}` placeholders. Placeholders are resolved
//! left-to-right against the parameter bag; names with no binding are left
//! literal.

use crate::error::{Error, Result};
use reqwest::{Method, Url};
use serde::Deserialize;
use std::collections::HashMap;

/// Request skeleton loaded from the test spec
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    pub name: String,

    /// Relative selection weight among the spec's templates
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// HTTP method; any token accepted by the HTTP layer is allowed
    pub method: String,

    pub url_template: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body_template: Option<String>,
}

fn default_weight() -> u32 {
    1
}

/// A fully materialized request, ready to be sent
#[derive(Debug, Clone)]
pub struct GeneratedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestTemplate {
    /// Materialize this template with the given parameters.
    ///
    /// Body rules: GET and DELETE never carry a body; POST and PUT always
    /// carry the substituted body (empty when no template is given); any
    /// other method carries the body only when a template exists.
    pub fn generate(&self, parameters: &HashMap<String, String>) -> Result<GeneratedRequest> {
        let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|_| Error::Request(format!("invalid HTTP method '{}'", self.method)))?;

        let url_str = substitute(&self.url_template, parameters);
        let url = Url::parse(&url_str)
            .map_err(|e| Error::Request(format!("invalid URL '{url_str}': {e}")))?;

        let body = if method == Method::GET || method == Method::DELETE {
            None
        } else if method == Method::POST || method == Method::PUT {
            Some(
                self.body_template
                    .as_deref()
                    .map(|t| substitute(t, parameters))
                    .unwrap_or_default(),
            )
        } else {
            self.body_template.as_deref().map(|t| substitute(t, parameters))
        };

        let headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), substitute(value, parameters)))
            .collect();

        Ok(GeneratedRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

/// Replace each `${name}` occurrence with its bound value, scanning left to
/// right. Unbound names stay literal; substituted values are not re-scanned.
pub fn substitute(template: &str, parameters: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match parameters.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder: keep the remainder literally
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
