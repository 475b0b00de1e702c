//! Request generator
//!
//! Owns the template set and the parameter sources. Each call picks a
//! template by weight, assembles the parameter bag (reserved keys first,
//! then source values), and materializes the request.

use crate::config::TestSpec;
use crate::error::{Error, Result};
use crate::request::source::{self, ParameterSource};
use crate::request::template::{GeneratedRequest, RequestTemplate};
use crate::request::{RESERVED_ELAPSED_TIME, RESERVED_REQUEST_ID, RESERVED_TIMESTAMP};
use crate::timing;
use rand::Rng;
use std::collections::HashMap;

pub struct RequestGenerator {
    templates: Vec<RequestTemplate>,
    /// Prefix sums of template weights for the weighted draw
    cumulative_weights: Vec<u64>,
    total_weight: u64,
    /// Sources ordered by name so parameter assembly is deterministic
    sources: Vec<(String, Box<dyn ParameterSource>)>,
}

impl RequestGenerator {
    /// Build the generator, constructing every parameter source up front.
    /// Source construction failures are fatal.
    pub fn new(spec: &TestSpec) -> Result<Self> {
        if spec.request_templates.is_empty() {
            return Err(Error::Config(
                "requestTemplates must contain at least one template".into(),
            ));
        }

        let mut sources = Vec::with_capacity(spec.parameter_sources.len());
        let mut names: Vec<&String> = spec.parameter_sources.keys().collect();
        names.sort();
        for name in names {
            let config = &spec.parameter_sources[name];
            let built = source::build(name, config)?;
            tracing::info!("Initialized {} parameter source for '{name}'", built.kind());
            sources.push((name.clone(), built));
        }

        let mut cumulative_weights = Vec::with_capacity(spec.request_templates.len());
        let mut total_weight = 0u64;
        for template in &spec.request_templates {
            total_weight += u64::from(template.weight);
            cumulative_weights.push(total_weight);
        }

        tracing::info!(
            "Initialized request generator with {} templates and {} parameter sources",
            spec.request_templates.len(),
            sources.len()
        );

        Ok(Self {
            templates: spec.request_templates.clone(),
            cumulative_weights,
            total_weight,
            sources,
        })
    }

    /// Synthesize one request. Failures surface as `Error::Request`; the
    /// caller records them as skipped.
    pub fn generate(&self, request_id: u64, elapsed_ms: u64) -> Result<GeneratedRequest> {
        let template = self.select_template();
        let parameters = self.assemble_parameters(request_id, elapsed_ms);
        template.generate(&parameters)
    }

    /// Weighted selection: draw uniformly over the total weight and take the
    /// first template whose prefix sum exceeds the draw.
    fn select_template(&self) -> &RequestTemplate {
        if self.templates.len() == 1 {
            return &self.templates[0];
        }
        let draw = rand::rng().random_range(0..self.total_weight);
        let index = self
            .cumulative_weights
            .partition_point(|&prefix| prefix <= draw);
        &self.templates[index]
    }

    /// Reserved keys are inserted first; user sources override on collision.
    fn assemble_parameters(&self, request_id: u64, elapsed_ms: u64) -> HashMap<String, String> {
        let mut parameters = HashMap::with_capacity(3 + self.sources.len());
        parameters.insert(RESERVED_REQUEST_ID.to_string(), request_id.to_string());
        parameters.insert(RESERVED_TIMESTAMP.to_string(), timing::epoch_ms().to_string());
        parameters.insert(RESERVED_ELAPSED_TIME.to_string(), elapsed_ms.to_string());

        for (name, source) in &self.sources {
            match source.next_value() {
                Ok(value) => {
                    parameters.insert(name.clone(), value);
                }
                Err(e) => {
                    tracing::warn!("Failed to get value for parameter '{name}': {e}");
                    parameters.insert(name.clone(), "error".to_string());
                }
            }
        }
        parameters
    }

    /// Configured parameter names, sorted
    pub fn parameter_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(name, _)| name.as_str()).collect()
    }
}
