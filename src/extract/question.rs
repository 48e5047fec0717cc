//! Question extractor — vote maps from question-task answers
//!
//! Single-choice answers become a one-key vote map; multiple-choice
//! answers contribute one vote per selected option. Keys are slugged so
//! they survive the flat-column round trip regardless of prompt wording.

use crate::extract::{ExtractError, ExtractionData};
use crate::Classification;
use serde_json::Value;

/// Extract a vote map from a question-task answer.
pub fn question_extractor(classification: &Classification) -> Result<ExtractionData, ExtractError> {
    let annotation = classification.annotations.first().ok_or(ExtractError::NoAnnotations)?;

    let answer = match &annotation.value {
        crate::annotation::AnnotationValue::Answer(answer) => answer,
        crate::annotation::AnnotationValue::Marks(_) => {
            return Err(ExtractError::UnsupportedAnswer("mark list".into()))
        }
    };

    let mut votes = ExtractionData::new();
    match answer {
        Value::String(choice) => {
            add_vote(&mut votes, choice);
        }
        Value::Array(choices) => {
            for choice in choices {
                let choice = choice
                    .as_str()
                    .ok_or_else(|| ExtractError::UnsupportedAnswer(choice.to_string()))?;
                add_vote(&mut votes, choice);
            }
        }
        other => return Err(ExtractError::UnsupportedAnswer(other.to_string())),
    }
    Ok(votes)
}

fn add_vote(votes: &mut ExtractionData, choice: &str) {
    let key = slugify(choice);
    let count = votes.get(&key).and_then(Value::as_i64).unwrap_or(0);
    votes.insert(key, Value::from(count + 1));
}

/// Lowercase, alphanumeric-and-dashes form of an answer string.
fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn classification(value: serde_json::Value) -> Classification {
        Classification {
            subject_id: 1,
            workflow_id: 1,
            user_name: "volunteer-1".into(),
            created_at: Utc::now(),
            annotations: serde_json::from_value(json!([{"task": "T1", "value": value}])).unwrap(),
        }
    }

    #[test]
    fn single_answer_is_one_vote() {
        let votes = question_extractor(&classification(json!("Yes"))).unwrap();
        assert_eq!(serde_json::to_value(&votes).unwrap(), json!({"yes": 1}));
    }

    #[test]
    fn multi_answer_is_one_vote_per_option() {
        let votes = question_extractor(&classification(json!(["Blue", "Green"]))).unwrap();
        assert_eq!(serde_json::to_value(&votes).unwrap(), json!({"blue": 1, "green": 1}));
    }

    #[test]
    fn answers_are_slugged() {
        let votes = question_extractor(&classification(json!("A Galaxy, maybe?"))).unwrap();
        assert_eq!(serde_json::to_value(&votes).unwrap(), json!({"a-galaxy-maybe": 1}));
    }

    #[test]
    fn numeric_answer_is_unsupported() {
        let err = question_extractor(&classification(json!(42))).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedAnswer(_)));
    }
}
