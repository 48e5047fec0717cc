//! Reducer registry — the fixed name → implementation table
//!
//! Mirrors the extractor registry: built once at startup, passed by
//! reference, duplicate registration panics, unknown lookups are fatal
//! configuration errors.

use crate::extract::ExtractionData;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Open key → value parameters forwarded verbatim to a reducer.
/// Recognized keys are reducer-specific; the driver does not validate them.
pub type Keywords = Map<String, Value>;

/// What one reducer invocation produced.
///
/// `Many` fans out into one reduction row per element; some reducers
/// report each independent consensus cluster as its own record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerOutput {
    One(ExtractionData),
    Many(Vec<ExtractionData>),
}

/// Ways a reducer invocation can fail. Fatal to the run.
#[derive(Debug, Error)]
pub enum ReducerError {
    #[error("keyword '{key}' is invalid: {reason}")]
    BadKeyword { key: String, reason: String },

    #[error("malformed extraction data: {0}")]
    MalformedExtraction(String),
}

/// A reducer: many annotators' extractions for one subject/task in, one
/// or more consensus records out.
pub type ReducerFn = fn(&[ExtractionData], &Keywords) -> Result<ReducerOutput, ReducerError>;

/// The derived reducer name has no registered implementation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no reducer registered under '{0}'")]
pub struct UnknownReducer(pub String);

/// Immutable name → reducer table.
pub struct ReducerRegistry {
    reducers: BTreeMap<&'static str, ReducerFn>,
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ReducerRegistry {
    /// An empty registry, for tests that bring their own reducers.
    pub fn empty() -> Self {
        Self { reducers: BTreeMap::new() }
    }

    /// The registry of all built-in reducers.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("poly_line_text_reducer", super::poly_line_text_reducer);
        registry.register("question_reducer", super::question_reducer);
        registry
    }

    pub fn register(&mut self, name: &'static str, reducer: ReducerFn) {
        let previous = self.reducers.insert(name, reducer);
        assert!(previous.is_none(), "reducer '{}' registered twice", name);
    }

    pub fn get(&self, name: &str) -> Result<ReducerFn, UnknownReducer> {
        self.reducers.get(name).copied().ok_or_else(|| UnknownReducer(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.reducers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}
