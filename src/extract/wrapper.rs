//! Extractor wrapper — the uniform shell every extractor runs inside
//!
//! The wrapper is explicit function composition: it takes a raw transform
//! and a classification, performs shape validation up front, and keys any
//! failure to the offending record. Batch drivers report the error and
//! move on; nothing in the extraction stage panics on volunteer data.

use crate::annotation::Classification;
use serde_json::{Map, Value};
use thiserror::Error;

/// The normalized envelope every extractor produces: a flat map, keyed by
/// `frame{N}` for spatial tools or by answer for question tools.
pub type ExtractionData = Map<String, Value>;

/// A raw extractor transform, before wrapping.
pub type ExtractorFn = fn(&Classification) -> Result<ExtractionData, ExtractError>;

/// Ways a single classification can fail extraction.
///
/// These are data errors, scoped to one record; the batch continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("classification has no annotations")]
    NoAnnotations,

    #[error("annotation value is not a mark list")]
    NotMarks,

    #[error("mark is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unsupported answer shape: {0}")]
    UnsupportedAnswer(String),
}

/// A per-record extraction failure, keyed to the classification that
/// produced it.
#[derive(Debug, Error)]
#[error("{extractor} failed for subject {subject_id}, user '{user_name}': {source}")]
pub struct RecordError {
    pub extractor: &'static str,
    pub subject_id: i64,
    pub user_name: String,
    #[source]
    pub source: ExtractError,
}

/// A named extractor wrapped with validation and error capture.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    name: &'static str,
    inner: ExtractorFn,
}

impl Extractor {
    pub fn new(name: &'static str, inner: ExtractorFn) -> Self {
        Self { name, inner }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the wrapped transform on one classification.
    ///
    /// Validates that the classification carries annotations before the
    /// transform sees it, and keys any failure to the record so callers
    /// can report it and continue the batch.
    pub fn extract(&self, classification: &Classification) -> Result<ExtractionData, RecordError> {
        if classification.annotations.is_empty() {
            return Err(self.record_error(classification, ExtractError::NoAnnotations));
        }
        (self.inner)(classification).map_err(|source| self.record_error(classification, source))
    }

    fn record_error(&self, classification: &Classification, source: ExtractError) -> RecordError {
        RecordError {
            extractor: self.name,
            subject_id: classification.subject_id,
            user_name: classification.user_name.clone(),
            source,
        }
    }
}
