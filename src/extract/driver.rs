//! Extraction batch driver — classification export → extraction tables
//!
//! Reads a classification export (one row per classification, annotations
//! as a JSON column), routes each classification's annotations through the
//! dispatcher, runs the matching extractors, and writes one extraction
//! table per destination extractor, named `{extractor}_{base}.csv`.
//!
//! Per-record extraction failures are reported and skipped; an extractor
//! name in the config with no registered implementation is fatal.

use crate::annotation::{parse_timestamp, Annotation, Classification};
use crate::dispatch::{filter_annotations, DispatchConfig};
use crate::extract::{ExtractorRegistry, UnknownExtractor};
use crate::table::{flatten_data, prefixed_output};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Columns every extraction table starts with; `data.*` columns follow.
const BASE_COLUMNS: [&str; 7] = [
    "classification_id",
    "user_name",
    "workflow_id",
    "created_at",
    "subject_id",
    "extractor",
    "task",
];

/// Errors that abort an extraction run.
#[derive(Debug, Error)]
pub enum ExtractRunError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("classification table is missing column '{0}'")]
    MissingColumn(String),

    #[error("row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("classification {id}: malformed annotations JSON: {source}")]
    BadAnnotations {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    UnknownExtractor(#[from] UnknownExtractor),
}

/// Caller-facing knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Task → extractor routing table.
    pub config: DispatchConfig,
    /// Base name the per-extractor output names derive from.
    pub output: PathBuf,
    /// Keep `task_label`/`tool_label` in the routed annotations.
    pub human: bool,
}

/// One destination extractor's accumulating output table.
#[derive(Default)]
struct OutputTable {
    rows: Vec<BTreeMap<String, String>>,
    data_columns: Vec<String>,
    seen_columns: HashSet<String>,
}

impl OutputTable {
    fn push(&mut self, row: BTreeMap<String, String>) {
        for column in row.keys() {
            if column.starts_with("data.") && self.seen_columns.insert(column.clone()) {
                self.data_columns.push(column.clone());
            }
        }
        self.rows.push(row);
    }
}

/// Run the dispatch + extraction stages over a classification export.
///
/// Returns the paths of the written extraction tables, one per
/// destination extractor, in name order.
pub fn extract_csv(
    input: &Path,
    registry: &ExtractorRegistry,
    opts: &ExtractOptions,
) -> Result<Vec<PathBuf>, ExtractRunError> {
    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| -> Result<usize, ExtractRunError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ExtractRunError::MissingColumn(name.to_string()))
    };
    let id_col = col("classification_id")?;
    let user_col = col("user_name")?;
    let workflow_col = col("workflow_id")?;
    let created_col = col("created_at")?;
    let subject_col = col("subject_ids")?;
    let annotations_col = col("annotations")?;

    let mut tables: BTreeMap<String, OutputTable> = BTreeMap::new();
    let mut total = 0usize;

    for (row_index, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |index: usize| record.get(index).unwrap_or("");
        let malformed = |reason: String| ExtractRunError::MalformedRow {
            row: row_index + 1,
            reason,
        };

        let classification_id: i64 = cell(id_col)
            .parse()
            .map_err(|_| malformed(format!("bad classification id '{}'", cell(id_col))))?;
        let subject_id: i64 = cell(subject_col)
            .parse()
            .map_err(|_| malformed(format!("bad subject id '{}'", cell(subject_col))))?;
        let workflow_id: i64 = cell(workflow_col)
            .parse()
            .map_err(|_| malformed(format!("bad workflow id '{}'", cell(workflow_col))))?;
        let created_at = parse_timestamp(cell(created_col))
            .map_err(|e| malformed(format!("bad timestamp '{}': {}", cell(created_col), e)))?;

        let annotations: Vec<Annotation> = serde_json::from_str(cell(annotations_col))
            .map_err(|source| ExtractRunError::BadAnnotations { id: classification_id, source })?;

        let buckets = filter_annotations(&annotations, &opts.config, opts.human);
        for (extractor_name, batch) in buckets {
            let extractor = registry.get(&extractor_name)?;
            for (task, task_annotations) in group_by_task(batch.annotations) {
                let classification = Classification {
                    subject_id,
                    workflow_id,
                    user_name: cell(user_col).to_string(),
                    created_at,
                    annotations: task_annotations,
                };
                let data = match extractor.extract(&classification) {
                    Ok(data) => data,
                    Err(error) => {
                        warn!(classification_id, %error, "extraction skipped");
                        continue;
                    }
                };

                let mut row: BTreeMap<String, String> = flatten_data("data", &data);
                row.insert("classification_id".into(), classification_id.to_string());
                row.insert("user_name".into(), classification.user_name.clone());
                row.insert("workflow_id".into(), workflow_id.to_string());
                row.insert("created_at".into(), cell(created_col).to_string());
                row.insert("subject_id".into(), subject_id.to_string());
                row.insert("extractor".into(), extractor_name.clone());
                row.insert("task".into(), task);
                tables.entry(extractor_name.clone()).or_default().push(row);
                total += 1;
            }
        }
        debug!(classification_id, "classification dispatched");
    }

    info!(rows = total, tables = tables.len(), "extraction complete");

    let mut outputs = Vec::with_capacity(tables.len());
    for (extractor_name, table) in &tables {
        let path = prefixed_output(&opts.output, extractor_name);
        write_table(&path, table)?;
        info!(path = %path.display(), rows = table.rows.len(), "extraction table written");
        outputs.push(path);
    }
    Ok(outputs)
}

/// Group a batch's annotations by task, preserving first-seen task order.
fn group_by_task(annotations: Vec<Annotation>) -> Vec<(String, Vec<Annotation>)> {
    let mut groups: Vec<(String, Vec<Annotation>)> = Vec::new();
    for annotation in annotations {
        match groups.iter_mut().find(|(task, _)| *task == annotation.task) {
            Some((_, group)) => group.push(annotation),
            None => groups.push((annotation.task.clone(), vec![annotation])),
        }
    }
    groups
}

fn write_table(path: &Path, table: &OutputTable) -> Result<(), ExtractRunError> {
    let mut columns: Vec<&str> = BASE_COLUMNS.to_vec();
    let mut data_columns = table.data_columns.clone();
    data_columns.sort();
    columns.extend(data_columns.iter().map(String::as_str));

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;
    for row in &table.rows {
        let record: Vec<&str> =
            columns.iter().map(|c| row.get(*c).map(String::as_str).unwrap_or("")).collect();
        writer.write_record(&record)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tasks_grouped_in_first_seen_order() {
        let annotations: Vec<Annotation> = serde_json::from_value(json!([
            {"task": "T1", "value": "Yes"},
            {"task": "T2", "value": ["Blue"]},
            {"task": "T1", "value": "No"}
        ]))
        .unwrap();

        let groups = group_by_task(annotations);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "T1");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "T2");
    }
}
