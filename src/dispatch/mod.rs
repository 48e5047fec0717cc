//! Annotation filter/dispatcher — routes annotations to extractors
//!
//! A [`DispatchConfig`] is the declarative routing table for one workflow:
//! each task maps to an extractor name, a list of names (fan-out with the
//! value unchanged), or a tool-routed sub-config that splits a drawing
//! task's marks between extractors by tool index. Tasks missing from the
//! config, and marks whose tool index no destination claims, are dropped
//! silently: the config decides what the pipeline sees.

use crate::annotation::{Annotation, AnnotationValue, ToolMark};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Task → route table for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchConfig {
    pub tasks: BTreeMap<String, TaskRoute>,
}

impl DispatchConfig {
    /// Load a routing table from a YAML (or JSON; YAML is a superset)
    /// config file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, DispatchConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| DispatchConfigError::Io { path: path.to_path_buf(), source })?;
        let config = serde_yaml::from_str(&text)
            .map_err(|source| DispatchConfigError::Parse { path: path.to_path_buf(), source })?;
        Ok(config)
    }
}

/// Errors loading a dispatch config file.
#[derive(Debug, thiserror::Error)]
pub enum DispatchConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Where one task's annotations go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRoute {
    /// Whole annotation to a single extractor.
    Name(String),
    /// Whole annotation to each listed extractor, value unchanged.
    Names(Vec<String>),
    /// Marks split between extractors by tool index.
    Tools(BTreeMap<String, ToolRoute>),
}

/// One destination of a tool-routed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRoute {
    /// Tool indices this destination claims.
    #[serde(default)]
    pub tool: Vec<i64>,
    /// Sub-extractor assignments for detail fields, forwarded verbatim to
    /// the destination as its side-channel config.
    #[serde(default)]
    pub details: BTreeMap<String, Vec<String>>,
}

/// Side-channel config a tool-routed destination receives alongside its
/// annotations. Assumed uniform across one classification, so the last
/// contributing annotation wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Vec<String>>,
}

/// One destination extractor's slice of a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorBatch {
    pub annotations: Vec<Annotation>,
    /// Present exactly when the destination was tool-routed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BatchConfig>,
}

/// Bucket one classification's annotations by destination extractor.
///
/// Annotations are visited in submission order, so each bucket preserves
/// source order; within a tool-filtered value the marks keep their relative
/// order too. A destination appears in the result only if at least one
/// annotation contributed to it; zero-match destinations are absent, not
/// empty. With `human` unset, `task_label` and `tool_label` are stripped.
pub fn filter_annotations(
    annotations: &[Annotation],
    config: &DispatchConfig,
    human: bool,
) -> BTreeMap<String, ExtractorBatch> {
    let mut buckets: BTreeMap<String, ExtractorBatch> = BTreeMap::new();

    for annotation in annotations {
        let route = match config.tasks.get(&annotation.task) {
            Some(route) => route,
            None => continue,
        };

        match route {
            TaskRoute::Name(name) => {
                push_whole(&mut buckets, name, annotation, human);
            }
            TaskRoute::Names(names) => {
                for name in names {
                    push_whole(&mut buckets, name, annotation, human);
                }
            }
            TaskRoute::Tools(destinations) => {
                let marks = match annotation.value.as_marks() {
                    Some(marks) => marks,
                    None => continue,
                };
                for (name, tool_route) in destinations {
                    let kept: Vec<ToolMark> = marks
                        .iter()
                        .filter(|mark| {
                            mark.tool.is_some_and(|tool| tool_route.tool.contains(&tool))
                        })
                        .map(|mark| strip_mark(mark, human))
                        .collect();
                    if kept.is_empty() {
                        continue;
                    }
                    let bucket = buckets.entry(name.clone()).or_insert_with(|| ExtractorBatch {
                        annotations: Vec::new(),
                        config: None,
                    });
                    bucket.annotations.push(Annotation {
                        task: annotation.task.clone(),
                        task_label: if human { annotation.task_label.clone() } else { None },
                        value: AnnotationValue::Marks(kept),
                    });
                    // Last write wins across annotations targeting the same
                    // destination.
                    bucket.config = Some(BatchConfig { details: tool_route.details.clone() });
                }
            }
        }
    }

    buckets
}

fn push_whole(
    buckets: &mut BTreeMap<String, ExtractorBatch>,
    name: &str,
    annotation: &Annotation,
    human: bool,
) {
    let bucket = buckets
        .entry(name.to_string())
        .or_insert_with(|| ExtractorBatch { annotations: Vec::new(), config: None });
    bucket.annotations.push(strip_annotation(annotation, human));
}

/// Clone an annotation, dropping labels unless `human` output was asked for.
fn strip_annotation(annotation: &Annotation, human: bool) -> Annotation {
    let value = match &annotation.value {
        AnnotationValue::Marks(marks) => {
            AnnotationValue::Marks(marks.iter().map(|mark| strip_mark(mark, human)).collect())
        }
        answer => answer.clone(),
    };
    Annotation {
        task: annotation.task.clone(),
        task_label: if human { annotation.task_label.clone() } else { None },
        value,
    }
}

fn strip_mark(mark: &ToolMark, human: bool) -> ToolMark {
    let mut mark = mark.clone();
    if !human {
        mark.tool_label = None;
    }
    mark
}
