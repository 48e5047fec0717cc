//! Polygon-as-line text extractor
//!
//! For projects that mark each transcribed word of a document with one
//! point of a polygon line and attach the transcription as a detail
//! sub-task. Produces, per frame, the word lists, the matching x/y point
//! lists, and the slope (in degrees) of each drawn line.

use crate::annotation::ToolMark;
use crate::extract::{ExtractError, ExtractionData};
use crate::Classification;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Default)]
struct FrameLines {
    x: Vec<Vec<f64>>,
    y: Vec<Vec<f64>>,
    text: Vec<Vec<String>>,
    slope: Vec<f64>,
}

/// Extract transcription lines from a polygon tool with a text sub-task.
///
/// Each mark contributes one line to its frame: the transcription split on
/// single spaces, the ordered point coordinates, and the slope of a
/// first-degree least-squares fit through the points. A mark whose word
/// count does not match its point count is dropped whole: the platform
/// convention is one point per transcribed word, and a misaligned mark
/// cannot be trusted. Single-point marks get slope 0.
pub fn poly_line_text_extractor(
    classification: &Classification,
) -> Result<ExtractionData, ExtractError> {
    let annotation = classification.annotations.first().ok_or(ExtractError::NoAnnotations)?;
    let marks = annotation.value.as_marks().ok_or(ExtractError::NotMarks)?;

    let mut frames: BTreeMap<u64, FrameLines> = BTreeMap::new();
    for mark in marks {
        let frame = mark.frame().ok_or(ExtractError::MissingField("frame"))?;
        let text = mark.first_detail_text().ok_or(ExtractError::MissingField("details"))?;
        let words: Vec<String> = text.split(' ').map(str::to_string).collect();
        let (x, y) = mark_points(mark)?;

        let slope = if x.len() > 1 { line_slope_degrees(&x, &y) } else { 0.0 };

        // One point per word, or the whole mark is unusable.
        if words.len() == x.len() {
            let lines = frames.entry(frame).or_default();
            lines.text.push(words);
            lines.x.push(x);
            lines.y.push(y);
            lines.slope.push(slope);
        }
    }

    let mut extraction = ExtractionData::new();
    for (frame, lines) in frames {
        extraction.insert(
            format!("frame{}", frame),
            json!({
                "points": {"x": lines.x, "y": lines.y},
                "text": lines.text,
                "slope": lines.slope,
            }),
        );
    }
    Ok(extraction)
}

fn mark_points(mark: &ToolMark) -> Result<(Vec<f64>, Vec<f64>), ExtractError> {
    let points = mark.points().ok_or(ExtractError::MissingField("points"))?;
    let mut x = Vec::with_capacity(points.len());
    let mut y = Vec::with_capacity(points.len());
    for point in points {
        x.push(coordinate(point, "x")?);
        y.push(coordinate(point, "y")?);
    }
    Ok((x, y))
}

fn coordinate(point: &Value, axis: &'static str) -> Result<f64, ExtractError> {
    point
        .get(axis)
        .and_then(Value::as_f64)
        .ok_or(ExtractError::MissingField(axis))
}

/// Slope, in degrees, of the least-squares line through `(x, y)`.
///
/// The fit is evaluated at the first and last x, and the angle is
/// `atan2(Δy_fit, Δx)`, so the direction the line was drawn in decides
/// which of the two 180°-apart angles is reported. A degenerate fit (all
/// x equal) falls back to 0, like the single-point case.
fn line_slope_degrees(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let sx: f64 = x.iter().sum();
    let sy: f64 = y.iter().sum();
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();

    let denom = n * sxx - sx * sx;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    let gradient = (n * sxy - sx * sy) / denom;

    let dx = x[x.len() - 1] - x[0];
    let dy = gradient * dx;
    dy.atan2(dx).to_degrees()
}
