//! Gale CLI library
//!
//! Exposes the result export and summary formatting used by the `gale`
//! binary, so integration tests can drive them directly.

pub mod output;
