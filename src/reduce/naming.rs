//! Extractor → reducer naming convention
//!
//! Reducers are looked up by rewriting the extractor name's suffix, with a
//! small exception table for families that share a reducer.

/// Derive the reducer responsible for an extractor's rows.
///
/// The general rule substitutes `reducer` for `extractor`. Exceptions:
/// both transcription families produce the same line-with-text geometry
/// as the polygon text tool, so they collapse onto its reducer, and the
/// transcription graphic family reduces like plain rectangles.
pub fn reducer_for(extractor: &str) -> String {
    let name = extractor.replace("extractor", "reducer");
    match name.as_str() {
        "sw_reducer" | "line_text_reducer" => "poly_line_text_reducer".to_string(),
        "sw_graphic_reducer" => "rectangle_reducer".to_string(),
        _ => name,
    }
}
