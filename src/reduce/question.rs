//! Question reducer — majority-vote consensus
//!
//! Each extraction is one annotator's vote map; the consensus is the
//! key-wise sum. Downstream consumers read the totals off the reduction
//! row directly.

use super::registry::{Keywords, ReducerError, ReducerOutput};
use crate::extract::ExtractionData;
use serde_json::Value;

/// Sum per-annotator vote maps into one consensus vote-count map.
pub fn question_reducer(
    extractions: &[ExtractionData],
    _keywords: &Keywords,
) -> Result<ReducerOutput, ReducerError> {
    let mut totals = ExtractionData::new();
    for extraction in extractions {
        for (choice, votes) in extraction {
            let votes = votes.as_i64().ok_or_else(|| {
                ReducerError::MalformedExtraction(format!(
                    "vote count for '{}' is not an integer",
                    choice
                ))
            })?;
            let current = totals.get(choice).and_then(Value::as_i64).unwrap_or(0);
            totals.insert(choice.clone(), Value::from(current + votes));
        }
    }
    Ok(ReducerOutput::One(totals))
}
