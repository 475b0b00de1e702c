//! Request synthesis pipeline
//!
//! Weighted template selection, parameter substitution from pluggable value
//! sources, and materialization into an HTTP request ready for the worker.

pub mod generator;
pub mod source;
pub mod template;
pub mod validator;

pub use generator::RequestGenerator;
pub use source::ParameterSource;
pub use template::{GeneratedRequest, RequestTemplate};
pub use validator::{ResponseValidator, ResponseView};

/// Reserved parameter names populated on every request. User-defined sources
/// with the same name override these values.
pub const RESERVED_REQUEST_ID: &str = "requestId";
pub const RESERVED_TIMESTAMP: &str = "timestamp";
pub const RESERVED_ELAPSED_TIME: &str = "elapsedTime";
