//! Reduction batch driver — extraction table → consensus table
//!
//! Sequential, single-writer batch process. The whole extraction table is
//! loaded once and sorted by `(subject_id, created_at)`; subjects are then
//! reduced one at a time, one task at a time. In streaming mode each
//! subject's reductions are appended to the output as soon as they exist,
//! so peak memory is one subject's worth of rows and an interrupted run
//! can resume: the partial file's subjects are subtracted from the work
//! queue and never reduced twice.
//!
//! The stored `data` column is JSON, written and re-read with a strict
//! parser, so the round trip through the sink is lossless.

use crate::annotation::parse_timestamp;
use crate::extract::ExtractionData;
use crate::reduce::{
    reducer_for, Keywords, ReducerError, ReducerOutput, ReducerRegistry, UnknownReducer,
};
use crate::table::{flatten_data, order_columns, prefixed_output, unflatten_data, UnflattenError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Columns of the streaming (pre-finalization) reduction table.
const STREAM_COLUMNS: [&str; 5] = ["subject_id", "workflow_id", "task", "reducer", "data"];

/// Columns pinned to the front when alphabetical ordering is requested.
const FRONT_COLUMNS: [&str; 3] = ["choice", "total_vote_count", "choice_count"];

/// Which of an annotator's repeat submissions for one subject/task count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPolicy {
    /// Earliest submission per annotator.
    #[default]
    First,
    /// Latest submission per annotator.
    Last,
    /// Every submission.
    All,
}

#[derive(Debug, Clone, Error)]
#[error("unknown filter policy '{0}' (expected first, last, or all)")]
pub struct ParseFilterPolicyError(String);

impl FromStr for FilterPolicy {
    type Err = ParseFilterPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "all" => Ok(Self::All),
            other => Err(ParseFilterPolicyError(other.to_string())),
        }
    }
}

impl std::fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Last => write!(f, "last"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Caller-facing knobs for one reduction run.
#[derive(Debug, Clone)]
pub struct ReduceOptions {
    pub filter: FilterPolicy,
    /// Forwarded verbatim to the reducer.
    pub keywords: Keywords,
    /// Base name the output name derives from.
    pub output: PathBuf,
    /// Alphabetical data columns, vote-count columns first.
    pub order: bool,
    /// Flush after every subject; makes the run resumable.
    pub stream: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            filter: FilterPolicy::First,
            keywords: Keywords::new(),
            output: PathBuf::from("reductions"),
            order: false,
            stream: false,
        }
    }
}

/// Errors that abort a reduction run. Where a subject was being processed,
/// the error says which one; the run is otherwise silent and long.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction table {path} has no rows")]
    EmptyInput { path: PathBuf },

    #[error("extraction table is missing column '{0}'")]
    MissingColumn(String),

    #[error("row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("subject {subject_id} task {task}: malformed extraction data: {source}")]
    MalformedData {
        subject_id: i64,
        task: String,
        #[source]
        source: UnflattenError,
    },

    #[error("subject {subject_id} task {task}: reducer failed: {source}")]
    Reducer {
        subject_id: i64,
        task: String,
        #[source]
        source: ReducerError,
    },

    #[error(transparent)]
    UnknownReducer(#[from] UnknownReducer),

    #[error("cannot resume from {path}: {reason}")]
    Resume { path: PathBuf, reason: String },

    #[error("bad stored reduction in {path}, row {row}: {reason}")]
    StoredRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },
}

/// One row of the extraction table. The `cells` map carries every column
/// beyond the fixed six: the `data.*` columns plus any passthrough
/// columns the extraction stage kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExtractionRow {
    subject_id: i64,
    workflow_id: i64,
    created_at: DateTime<Utc>,
    user_name: String,
    task: String,
    extractor: String,
    cells: BTreeMap<String, String>,
}

/// One consensus record, pre-finalization.
struct ReductionRow {
    subject_id: i64,
    workflow_id: i64,
    task: String,
    reducer: String,
    data: ExtractionData,
}

/// Reduce an extraction table into a consensus table.
///
/// Returns the output path, derived as `{reducer_name}_{base}.csv` from
/// `opts.output`. With `opts.stream`, an existing file at that path is a
/// prior partial run and triggers resume instead of overwrite.
pub fn reduce_csv(
    input: &Path,
    registry: &ReducerRegistry,
    opts: &ReduceOptions,
) -> Result<PathBuf, ReduceError> {
    let mut rows = read_extraction_rows(input)?;
    if rows.is_empty() {
        return Err(ReduceError::EmptyInput { path: input.to_path_buf() });
    }
    rows.sort_by(|a, b| (a.subject_id, a.created_at).cmp(&(b.subject_id, b.created_at)));

    let workflow_id = rows[0].workflow_id;
    let reducer_name = reducer_for(&rows[0].extractor);
    let reduce = registry.get(&reducer_name)?;

    let mut subjects = unique_in_order(rows.iter().map(|r| r.subject_id));
    let tasks = unique_in_order(rows.iter().map(|r| r.task.clone()));
    let output_name = prefixed_output(&opts.output, &reducer_name);

    info!(
        rows = rows.len(),
        subjects = subjects.len(),
        reducer = %reducer_name,
        "reducing extraction table"
    );

    let mut resume = false;
    if opts.stream && output_name.exists() {
        info!(path = %output_name.display(), "resuming from last run");
        resume = true;
        let done = resumed_subjects(&output_name)?;
        subjects.retain(|subject| !done.contains(subject));
    }

    let mut buffer: Vec<ReductionRow> = Vec::new();
    for (sdx, subject) in subjects.iter().enumerate() {
        for task in &tasks {
            let mut group: Vec<&ExtractionRow> = rows
                .iter()
                .filter(|row| row.subject_id == *subject && row.task == *task)
                .collect();
            dedup_exact(&mut group);
            apply_policy(&mut group, opts.filter);

            let mut extractions: Vec<ExtractionData> = Vec::with_capacity(group.len());
            for row in &group {
                let data = unflatten_data(&row.cells).map_err(|source| {
                    ReduceError::MalformedData { subject_id: *subject, task: task.clone(), source }
                })?;
                extractions.push(data);
            }

            let output = reduce(&extractions, &opts.keywords).map_err(|source| {
                ReduceError::Reducer { subject_id: *subject, task: task.clone(), source }
            })?;
            let records = match output {
                ReducerOutput::One(data) => vec![data],
                ReducerOutput::Many(records) => records,
            };
            for data in records {
                buffer.push(ReductionRow {
                    subject_id: *subject,
                    workflow_id,
                    task: task.clone(),
                    reducer: reducer_name.clone(),
                    data,
                });
            }
        }

        if opts.stream {
            let fresh = sdx == 0 && !resume;
            append_stream_rows(&output_name, &buffer, fresh)?;
            buffer.clear();
        }
        debug!(subject = *subject, "subject reduced");
    }

    let final_rows =
        if opts.stream { read_stream_rows(&output_name)? } else { std::mem::take(&mut buffer) };
    write_final_table(&output_name, &final_rows, opts.order)?;
    info!(path = %output_name.display(), rows = final_rows.len(), "reduction table written");
    Ok(output_name)
}

fn unique_in_order<T: Clone + Eq + std::hash::Hash>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            unique.push(item);
        }
    }
    unique
}

/// Drop exact duplicate rows, keeping first occurrences.
fn dedup_exact(group: &mut Vec<&ExtractionRow>) {
    let mut seen: HashSet<&ExtractionRow> = HashSet::new();
    group.retain(|row| seen.insert(*row));
}

/// Keep, per annotator, the submissions the policy selects. Timestamp ties
/// within one annotator all survive.
fn apply_policy(group: &mut Vec<&ExtractionRow>, policy: FilterPolicy) {
    if policy == FilterPolicy::All {
        return;
    }
    let mut extreme: HashMap<String, DateTime<Utc>> = HashMap::new();
    for row in group.iter() {
        extreme
            .entry(row.user_name.clone())
            .and_modify(|current| {
                let keep = match policy {
                    FilterPolicy::First => row.created_at < *current,
                    FilterPolicy::Last => row.created_at > *current,
                    FilterPolicy::All => unreachable!(),
                };
                if keep {
                    *current = row.created_at;
                }
            })
            .or_insert(row.created_at);
    }
    group.retain(|row| extreme[&row.user_name] == row.created_at);
}

fn read_extraction_rows(input: &Path) -> Result<Vec<ExtractionRow>, ReduceError> {
    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| -> Result<usize, ReduceError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReduceError::MissingColumn(name.to_string()))
    };
    let subject_col = col("subject_id")?;
    let workflow_col = col("workflow_id")?;
    let created_col = col("created_at")?;
    let user_col = col("user_name")?;
    let task_col = col("task")?;
    let extractor_col = col("extractor")?;
    let fixed = [subject_col, workflow_col, created_col, user_col, task_col, extractor_col];

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");
        let malformed =
            |reason: String| ReduceError::MalformedRow { row: index + 1, reason };

        let mut cells = BTreeMap::new();
        for (idx, value) in record.iter().enumerate() {
            if !fixed.contains(&idx) {
                if let Some(header) = headers.get(idx) {
                    cells.insert(header.to_string(), value.to_string());
                }
            }
        }

        rows.push(ExtractionRow {
            subject_id: cell(subject_col)
                .parse()
                .map_err(|_| malformed(format!("bad subject id '{}'", cell(subject_col))))?,
            workflow_id: cell(workflow_col)
                .parse()
                .map_err(|_| malformed(format!("bad workflow id '{}'", cell(workflow_col))))?,
            created_at: parse_timestamp(cell(created_col)).map_err(|e| {
                malformed(format!("bad timestamp '{}': {}", cell(created_col), e))
            })?,
            user_name: cell(user_col).to_string(),
            task: cell(task_col).to_string(),
            extractor: cell(extractor_col).to_string(),
            cells,
        });
    }
    Ok(rows)
}

/// Subjects already present in a partial streaming output.
///
/// Resume requires the streaming schema. Anything else at the output path
/// (a finalized table, a foreign file) is rejected rather than appended
/// to: a resumed run must only ever extend rows it wrote itself.
fn resumed_subjects(path: &Path) -> Result<HashSet<i64>, ReduceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<&str> = reader.headers()?.iter().collect();
    if headers != STREAM_COLUMNS {
        return Err(ReduceError::Resume {
            path: path.to_path_buf(),
            reason: format!(
                "expected streaming columns {:?}, found {:?}; move the file aside",
                STREAM_COLUMNS, headers
            ),
        });
    }
    let mut done = HashSet::new();
    for record in reader.records() {
        let record = record?;
        let cell = record.get(0).unwrap_or("");
        let subject = cell.parse().map_err(|_| ReduceError::Resume {
            path: path.to_path_buf(),
            reason: format!("bad subject id '{}'", cell),
        })?;
        done.insert(subject);
    }
    Ok(done)
}

fn append_stream_rows(
    path: &Path,
    rows: &[ReductionRow],
    fresh: bool,
) -> Result<(), ReduceError> {
    let io_err = |source| ReduceError::Io { path: path.to_path_buf(), source };
    let file = if fresh {
        File::create(path).map_err(io_err)?
    } else {
        OpenOptions::new().append(true).open(path).map_err(io_err)?
    };
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if fresh {
        writer.write_record(STREAM_COLUMNS)?;
    }
    for row in rows {
        // Serializing a Map cannot fail.
        let data = serde_json::to_string(&row.data).unwrap();
        writer.write_record([
            row.subject_id.to_string(),
            row.workflow_id.to_string(),
            row.task.clone(),
            row.reducer.clone(),
            data,
        ])?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Re-read a streaming output for finalization, strictly parsing the
/// stored JSON `data` column back into structured form.
fn read_stream_rows(path: &Path) -> Result<Vec<ReductionRow>, ReduceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let bad = |reason: String| ReduceError::StoredRow {
            path: path.to_path_buf(),
            row: index + 1,
            reason,
        };
        let cell = |idx: usize| record.get(idx).unwrap_or("");
        rows.push(ReductionRow {
            subject_id: cell(0).parse().map_err(|_| bad(format!("bad subject id '{}'", cell(0))))?,
            workflow_id: cell(1)
                .parse()
                .map_err(|_| bad(format!("bad workflow id '{}'", cell(1))))?,
            task: cell(2).to_string(),
            reducer: cell(3).to_string(),
            data: serde_json::from_str(cell(4)).map_err(|e| bad(e.to_string()))?,
        });
    }
    Ok(rows)
}

/// Reshape one-row-per-record into the flat final table and persist it.
fn write_final_table(path: &Path, rows: &[ReductionRow], order: bool) -> Result<(), ReduceError> {
    let mut data_columns: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut flat_rows: Vec<(&ReductionRow, BTreeMap<String, String>)> =
        Vec::with_capacity(rows.len());
    for row in rows {
        let flat = flatten_data("data", &row.data);
        for column in flat.keys() {
            if seen.insert(column.clone()) {
                data_columns.push(column.clone());
            }
        }
        flat_rows.push((row, flat));
    }
    data_columns.sort();
    if order {
        data_columns = order_columns(&data_columns, &FRONT_COLUMNS);
    }

    let mut columns: Vec<&str> = vec!["subject_id", "workflow_id", "task", "reducer"];
    columns.extend(data_columns.iter().map(String::as_str));

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;
    for (row, flat) in &flat_rows {
        let mut record = vec![
            row.subject_id.to_string(),
            row.workflow_id.to_string(),
            row.task.clone(),
            row.reducer.clone(),
        ];
        for column in &data_columns {
            record.push(flat.get(column).cloned().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
