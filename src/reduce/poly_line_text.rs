//! Polygon-as-line text reducer — consensus transcription lines
//!
//! Input: every annotator's `{frameN: {points: {x, y}, text, slope}}`
//! extraction for one subject/task. Lines that sit on the same row of the
//! document are clustered by the vertical position of their midpoints,
//! within a tolerance of `eps` pixels (keyword, default 15). Each cluster
//! becomes one consensus line: averaged endpoints, averaged slope, and
//! the plurality word at each position among the aligned transcriptions.
//!
//! Output: `{frameN: {clusters: [{x, y, slope, text, count}, ...]}}`, one
//! cluster list per frame, ordered top to bottom.

use super::registry::{Keywords, ReducerError, ReducerOutput};
use crate::extract::ExtractionData;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const DEFAULT_EPS: f64 = 15.0;

#[derive(Debug, Deserialize)]
struct FrameLines {
    points: FramePoints,
    #[serde(default)]
    text: Vec<Vec<String>>,
    #[serde(default)]
    slope: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct FramePoints {
    #[serde(default)]
    x: Vec<Vec<f64>>,
    #[serde(default)]
    y: Vec<Vec<f64>>,
}

/// One annotator's transcription line, ready for clustering.
#[derive(Debug, Clone)]
struct Line {
    x_first: f64,
    x_last: f64,
    y_first: f64,
    y_last: f64,
    mid_y: f64,
    slope: f64,
    words: Vec<String>,
}

/// Cluster transcription lines across annotators into consensus lines.
pub fn poly_line_text_reducer(
    extractions: &[ExtractionData],
    keywords: &Keywords,
) -> Result<ReducerOutput, ReducerError> {
    let eps = match keywords.get("eps") {
        None => DEFAULT_EPS,
        Some(value) => value.as_f64().ok_or_else(|| ReducerError::BadKeyword {
            key: "eps".into(),
            reason: format!("expected a number, got {}", value),
        })?,
    };

    let mut frames: BTreeMap<String, Vec<Line>> = BTreeMap::new();
    for extraction in extractions {
        for (frame_key, frame_value) in extraction {
            let frame: FrameLines = serde_json::from_value(frame_value.clone())
                .map_err(|e| ReducerError::MalformedExtraction(format!("{}: {}", frame_key, e)))?;
            let lines = frames.entry(frame_key.clone()).or_default();
            for (index, x) in frame.points.x.iter().enumerate() {
                let y = match frame.points.y.get(index) {
                    Some(y) if y.len() == x.len() && !x.is_empty() => y,
                    _ => {
                        return Err(ReducerError::MalformedExtraction(format!(
                            "{}: point list {} has mismatched x/y",
                            frame_key, index
                        )))
                    }
                };
                lines.push(Line {
                    x_first: x[0],
                    x_last: x[x.len() - 1],
                    y_first: y[0],
                    y_last: y[y.len() - 1],
                    mid_y: y.iter().sum::<f64>() / y.len() as f64,
                    slope: frame.slope.get(index).copied().unwrap_or(0.0),
                    words: frame.text.get(index).cloned().unwrap_or_default(),
                });
            }
        }
    }

    let mut consensus = ExtractionData::new();
    for (frame_key, mut lines) in frames {
        lines.sort_by(|a, b| a.mid_y.total_cmp(&b.mid_y));
        let clusters: Vec<Value> = cluster_by_row(&lines, eps)
            .into_iter()
            .map(|cluster| consensus_line(cluster))
            .collect();
        consensus.insert(frame_key, json!({ "clusters": clusters }));
    }
    Ok(ReducerOutput::One(consensus))
}

/// Split mid-y-sorted lines into row clusters: a gap wider than `eps`
/// starts a new row.
fn cluster_by_row(lines: &[Line], eps: f64) -> Vec<Vec<&Line>> {
    let mut clusters: Vec<Vec<&Line>> = Vec::new();
    for line in lines {
        match clusters.last_mut() {
            Some(cluster) if line.mid_y - cluster.last().unwrap().mid_y <= eps => {
                cluster.push(line)
            }
            _ => clusters.push(vec![line]),
        }
    }
    clusters
}

fn consensus_line(cluster: Vec<&Line>) -> Value {
    let n = cluster.len() as f64;
    let mean = |pick: fn(&Line) -> f64| cluster.iter().map(|l| pick(l)).sum::<f64>() / n;

    json!({
        "x": [mean(|l| l.x_first), mean(|l| l.x_last)],
        "y": [mean(|l| l.y_first), mean(|l| l.y_last)],
        "slope": mean(|l| l.slope),
        "text": consensus_text(&cluster),
        "count": cluster.len(),
    })
}

/// Plurality word per position, among the cluster's transcriptions of the
/// most common length. Ties go to the earliest-seen candidate.
fn consensus_text(cluster: &[&Line]) -> Vec<String> {
    let length = plurality(cluster.iter().map(|l| l.words.len()));
    let Some(length) = length else { return Vec::new() };

    let aligned: Vec<&Vec<String>> = cluster
        .iter()
        .map(|l| &l.words)
        .filter(|words| words.len() == length)
        .collect();

    (0..length)
        .map(|position| {
            plurality(aligned.iter().map(|words| words[position].clone()))
                .expect("aligned transcriptions are non-empty")
        })
        .collect()
}

/// Most frequent item, first-seen winning ties. None on empty input.
fn plurality<T: PartialEq>(items: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }
    let best = counts.iter().map(|(_, count)| *count).max()?;
    let winner = counts.into_iter().find(|(_, count)| *count == best);
    winner.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extraction(value: serde_json::Value) -> ExtractionData {
        value.as_object().unwrap().clone()
    }

    /// Three annotators transcribe the same two document rows; one of them
    /// disagrees on a word and one drew the top line slightly lower.
    fn three_annotators() -> Vec<ExtractionData> {
        vec![
            extraction(json!({"frame0": {
                "points": {"x": [[0.0, 100.0], [0.0, 100.0]], "y": [[10.0, 10.0], [60.0, 60.0]]},
                "text": [["the", "cipher"], ["second", "row"]],
                "slope": [0.0, 0.0]
            }})),
            extraction(json!({"frame0": {
                "points": {"x": [[2.0, 98.0]], "y": [[14.0, 14.0]]},
                "text": [["the", "cipher"]],
                "slope": [0.0]
            }})),
            extraction(json!({"frame0": {
                "points": {"x": [[4.0, 102.0]], "y": [[12.0, 12.0]]},
                "text": [["the", "cypher"]],
                "slope": [0.0]
            }})),
        ]
    }

    #[test]
    fn rows_cluster_and_words_take_plurality() {
        let output = poly_line_text_reducer(&three_annotators(), &Keywords::new()).unwrap();
        let ReducerOutput::One(consensus) = output else { panic!("expected one record") };

        let clusters = consensus["frame0"]["clusters"].as_array().unwrap();
        assert_eq!(clusters.len(), 2);

        let top = &clusters[0];
        assert_eq!(top["count"], json!(3));
        assert_eq!(top["text"], json!(["the", "cipher"]));
        assert!((top["x"][0].as_f64().unwrap() - 2.0).abs() < 1e-9);
        assert!((top["y"][0].as_f64().unwrap() - 12.0).abs() < 1e-9);

        let bottom = &clusters[1];
        assert_eq!(bottom["count"], json!(1));
        assert_eq!(bottom["text"], json!(["second", "row"]));
    }

    #[test]
    fn eps_keyword_controls_row_tolerance() {
        let mut keywords = Keywords::new();
        keywords.insert("eps".into(), json!(1.0));
        let output = poly_line_text_reducer(&three_annotators(), &keywords).unwrap();
        let ReducerOutput::One(consensus) = output else { panic!("expected one record") };

        // With a 1px tolerance the three top lines no longer merge.
        let clusters = consensus["frame0"]["clusters"].as_array().unwrap();
        assert_eq!(clusters.len(), 4);
    }

    #[test]
    fn bad_eps_is_rejected() {
        let mut keywords = Keywords::new();
        keywords.insert("eps".into(), json!("wide"));
        let err = poly_line_text_reducer(&[], &keywords).unwrap_err();
        assert!(matches!(err, ReducerError::BadKeyword { .. }));
    }

    #[test]
    fn empty_input_reduces_to_empty_consensus() {
        let output = poly_line_text_reducer(&[], &Keywords::new()).unwrap();
        assert_eq!(output, ReducerOutput::One(ExtractionData::new()));
    }

    #[test]
    fn mismatched_points_are_malformed() {
        let bad = vec![extraction(json!({"frame0": {
            "points": {"x": [[0.0, 1.0]], "y": [[0.0]]},
            "text": [["word"]],
            "slope": [0.0]
        }}))];
        let err = poly_line_text_reducer(&bad, &Keywords::new()).unwrap_err();
        assert!(matches!(err, ReducerError::MalformedExtraction(_)));
    }
}
