//! End-to-end: classification export → extract → reduce.

mod common;

use common::{read_csv, write_csv};
use quorum::dispatch::DispatchConfig;
use quorum::extract::{extract_csv, ExtractOptions, ExtractorRegistry};
use quorum::reduce::{reduce_csv, ReduceOptions, ReducerRegistry};
use std::path::Path;

const EXPORT_HEADERS: [&str; 6] = [
    "classification_id",
    "user_name",
    "workflow_id",
    "created_at",
    "subject_ids",
    "annotations",
];

fn export_row(id: i64, user: &str, minute: u32, subject: i64, annotations: &str) -> Vec<String> {
    vec![
        id.to_string(),
        user.to_string(),
        "10".to_string(),
        format!("2024-05-01T09:{:02}:00Z", minute),
        subject.to_string(),
        annotations.to_string(),
    ]
}

fn transcription_config() -> DispatchConfig {
    serde_yaml::from_str(
        "
T0: question_extractor
T2: poly_line_text_extractor
",
    )
    .unwrap()
}

fn transcription_annotations(y: f64, word: &str) -> String {
    serde_json::json!([
        {"task": "T0", "value": "Yes"},
        {"task": "T2", "value": [{
            "frame": 0,
            "points": [{"x": 0.0, "y": y}, {"x": 100.0, "y": y}],
            "details": [{"value": format!("the {}", word)}]
        }]}
    ])
    .to_string()
}

fn run_extract(dir: &Path) -> Vec<std::path::PathBuf> {
    let export = dir.join("classifications.csv");
    write_csv(
        &export,
        &EXPORT_HEADERS,
        &[
            export_row(100, "ann", 0, 1, &transcription_annotations(10.0, "cipher")),
            export_row(101, "bob", 1, 1, &transcription_annotations(12.0, "cipher")),
            export_row(102, "cat", 2, 1, &transcription_annotations(14.0, "cypher")),
        ],
    );
    let registry = ExtractorRegistry::builtin();
    let opts = ExtractOptions {
        config: transcription_config(),
        output: dir.join("extractions"),
        human: false,
    };
    extract_csv(&export, &registry, &opts).unwrap()
}

#[test]
fn extract_writes_one_table_per_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = run_extract(dir.path());

    assert_eq!(
        outputs,
        vec![
            dir.path().join("poly_line_text_extractor_extractions.csv"),
            dir.path().join("question_extractor_extractions.csv"),
        ]
    );

    let questions = read_csv(&outputs[1]);
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[0]["task"], "T0");
    assert_eq!(questions[0]["extractor"], "question_extractor");
    assert_eq!(questions[0]["data.yes"], "1");

    let lines = read_csv(&outputs[0]);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["subject_id"], "1");
    assert_eq!(lines[0]["data.frame0.points.x"], "[[0.0,100.0]]");
    assert_eq!(lines[0]["data.frame0.text"], "[[\"the\",\"cipher\"]]");
}

#[test]
fn extracted_lines_reduce_to_a_consensus_transcription() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = run_extract(dir.path());

    let registry = ReducerRegistry::builtin();
    let opts = ReduceOptions { output: dir.path().join("reductions"), ..Default::default() };
    let reduced = reduce_csv(&outputs[0], &registry, &opts).unwrap();
    assert_eq!(reduced, dir.path().join("poly_line_text_reducer_reductions.csv"));

    let rows = read_csv(&reduced);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["reducer"], "poly_line_text_reducer");

    let clusters: serde_json::Value =
        serde_json::from_str(&rows[0]["data.frame0.clusters"]).unwrap();
    let clusters = clusters.as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["count"], serde_json::json!(3));
    assert_eq!(clusters[0]["text"], serde_json::json!(["the", "cipher"]));
    let mid_y = clusters[0]["y"][0].as_f64().unwrap();
    assert!((mid_y - 12.0).abs() < 1e-9);
}

#[test]
fn malformed_classification_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("classifications.csv");
    // The second classification answers the drawing task with a bare
    // string; its extraction fails, is reported, and the batch goes on.
    write_csv(
        &export,
        &EXPORT_HEADERS,
        &[
            export_row(100, "ann", 0, 1, &transcription_annotations(10.0, "cipher")),
            export_row(
                101,
                "bob",
                1,
                1,
                &serde_json::json!([{"task": "T2", "value": "not a drawing"}]).to_string(),
            ),
        ],
    );
    let registry = ExtractorRegistry::builtin();
    let opts = ExtractOptions {
        config: transcription_config(),
        output: dir.path().join("extractions"),
        human: false,
    };
    let outputs = extract_csv(&export, &registry, &opts).unwrap();

    let lines = read_csv(&dir.path().join("poly_line_text_extractor_extractions.csv"));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["classification_id"], "100");
    assert!(outputs.contains(&dir.path().join("question_extractor_extractions.csv")));
}

#[test]
fn extracted_votes_reduce_to_totals() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = run_extract(dir.path());

    let registry = ReducerRegistry::builtin();
    let opts = ReduceOptions { output: dir.path().join("reductions"), ..Default::default() };
    let reduced = reduce_csv(&outputs[1], &registry, &opts).unwrap();

    let rows = read_csv(&reduced);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["data.yes"], "3");
}
