//! Shared fixtures for pipeline integration tests
//!
//! Builders for the small delimited tables the drivers consume, and a
//! reader that loads a written table back as header-keyed rows.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

/// Write a delimited table from string cells.
pub fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<String>]) {
    let mut writer = csv::Writer::from_path(path).expect("create csv");
    writer.write_record(headers).expect("write header");
    for row in rows {
        writer.write_record(row).expect("write row");
    }
    writer.flush().expect("flush csv");
}

/// Read a delimited table back as one map per row, keyed by header.
pub fn read_csv(path: &Path) -> Vec<BTreeMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    let headers: Vec<String> =
        reader.headers().expect("headers").iter().map(String::from).collect();
    reader
        .records()
        .map(|record| {
            let record = record.expect("record");
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(String::from))
                .collect::<BTreeMap<String, String>>()
        })
        .collect()
}

/// An extraction table of question votes: one row per
/// `(subject_id, user_name, created_at, "yes"/"no")`.
pub fn question_extraction_csv(path: &Path, votes: &[(i64, &str, &str, &str)]) {
    let headers = [
        "subject_id",
        "workflow_id",
        "created_at",
        "user_name",
        "task",
        "extractor",
        "data.yes",
        "data.no",
    ];
    let rows: Vec<Vec<String>> = votes
        .iter()
        .map(|(subject, user, created, vote)| {
            let (yes, no) = if *vote == "yes" { ("1", "") } else { ("", "1") };
            vec![
                subject.to_string(),
                "10".to_string(),
                created.to_string(),
                user.to_string(),
                "T1".to_string(),
                "question_extractor".to_string(),
                yes.to_string(),
                no.to_string(),
            ]
        })
        .collect();
    write_csv(path, &headers, &rows);
}
