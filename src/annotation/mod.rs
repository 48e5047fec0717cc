//! Classification and annotation data model
//!
//! One `Classification` is one volunteer's complete submission for one
//! subject. Its `annotations` list carries one entry per workflow task,
//! and each entry's `value` is polymorphic: drawing tasks produce a list
//! of tool-marks, question tasks produce a bare string or list answer.
//! The polymorphism is resolved once, at the parse boundary; the rest of
//! the pipeline pattern-matches on [`AnnotationValue`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parse a platform export timestamp.
///
/// Exports carry either RFC 3339 (`2024-05-31T11:46:57Z`) or the older
/// `2024-05-31 11:46:57 UTC` form.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let trimmed = text.trim_end_matches(" UTC");
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
}

/// One volunteer's submission for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub subject_id: i64,
    pub workflow_id: i64,
    /// Annotator identity; anonymous sessions get a platform-assigned name.
    pub user_name: String,
    /// Submission timestamp, used for first/last annotator selection.
    pub created_at: DateTime<Utc>,
    /// Per-task annotation entries, in submission order.
    pub annotations: Vec<Annotation>,
}

/// One task's portion of a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Task identifier, e.g. `T0`.
    pub task: String,
    /// Human-readable task prompt. Carried through dispatch only when the
    /// caller asks for human-readable output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_label: Option<String>,
    pub value: AnnotationValue,
}

/// The polymorphic payload of an annotation entry.
///
/// Deserialization tries the mark-list shape first, so drawing-task values
/// (including an empty mark list) become `Marks`; anything else (a string
/// answer, a list of selected options, a free-form payload) becomes
/// `Answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    /// Drawing-tool output: one mark per placed tool.
    Marks(Vec<ToolMark>),
    /// Question-task output, kept opaque until an extractor interprets it.
    Answer(Value),
}

impl AnnotationValue {
    /// The marks of a drawing-task value, if this is one.
    pub fn as_marks(&self) -> Option<&[ToolMark]> {
        match self {
            AnnotationValue::Marks(marks) => Some(marks),
            AnnotationValue::Answer(_) => None,
        }
    }
}

/// One placed tool-mark inside a drawing-task value.
///
/// Only the routing fields (`tool`, `tool_label`) are lifted out; every
/// shape-specific field (`x`/`y`, `x1`..`y2`, `frame`, `points`, `details`,
/// transcription payloads, …) stays in `fields` so marks round-trip through
/// the dispatcher without the framework knowing their shape family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMark {
    /// Tool index within the task's tool palette. Marks without a tool
    /// index (e.g. transcription segments) never match a tool-routed
    /// config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_label: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ToolMark {
    /// The frame index this mark was placed on.
    pub fn frame(&self) -> Option<u64> {
        self.fields.get("frame").and_then(Value::as_u64)
    }

    /// The ordered point list of a multi-point mark.
    pub fn points(&self) -> Option<&Vec<Value>> {
        self.fields.get("points").and_then(Value::as_array)
    }

    /// The transcribed text of the mark's first detail sub-task.
    pub fn first_detail_text(&self) -> Option<&str> {
        self.fields
            .get("details")
            .and_then(Value::as_array)
            .and_then(|details| details.first())
            .and_then(|detail| detail.get("value"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drawing_value_parses_as_marks() {
        let value: AnnotationValue = serde_json::from_value(json!([
            {"tool": 0, "frame": 0, "x": 261, "y": 266, "details": []},
            {"tool": 1, "frame": 0, "x1": 714.84, "y1": 184.78, "x2": 446.35, "y2": 278.33}
        ]))
        .unwrap();

        let marks = value.as_marks().unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].tool, Some(0));
        assert_eq!(marks[1].fields["x1"], json!(714.84));
    }

    #[test]
    fn question_value_parses_as_answer() {
        let single: AnnotationValue = serde_json::from_value(json!("Yes")).unwrap();
        assert_eq!(single, AnnotationValue::Answer(json!("Yes")));

        let multi: AnnotationValue = serde_json::from_value(json!(["Blue", "Green"])).unwrap();
        assert_eq!(multi, AnnotationValue::Answer(json!(["Blue", "Green"])));
    }

    #[test]
    fn empty_value_list_is_an_empty_mark_list() {
        let value: AnnotationValue = serde_json::from_value(json!([])).unwrap();
        assert_eq!(value, AnnotationValue::Marks(vec![]));
    }

    #[test]
    fn mark_round_trips_unchanged() {
        let raw = json!({
            "tool": 2,
            "frame": 0,
            "x": 270,
            "y": 341,
            "details": [{"value": 1}, {"value": [0, 1]}]
        });
        let mark: ToolMark = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&mark).unwrap(), raw);
    }

    #[test]
    fn both_export_timestamp_forms_parse() {
        let rfc = parse_timestamp("2024-05-31T11:46:57Z").unwrap();
        let platform = parse_timestamp("2024-05-31 11:46:57 UTC").unwrap();
        assert_eq!(rfc, platform);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn transcription_mark_accessors() {
        let mark: ToolMark = serde_json::from_value(json!({
            "frame": 1,
            "points": [{"x": 756, "y": 197}],
            "details": [{"value": "Cipher"}]
        }))
        .unwrap();

        assert_eq!(mark.frame(), Some(1));
        assert_eq!(mark.points().unwrap().len(), 1);
        assert_eq!(mark.first_detail_text(), Some("Cipher"));
        assert_eq!(mark.tool, None);
    }
}
