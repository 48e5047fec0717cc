//! Quorum: consensus engine for crowd-sourced classifications
//!
//! Aggregates the annotations that many independent volunteers submit for
//! the same subject on a citizen-science platform into per-subject
//! consensus results.
//!
//! # Pipeline
//!
//! - **Dispatch**: a declarative per-task config routes each annotation to
//!   the extractor(s) responsible for its tool family
//! - **Extract**: type-specific extractors normalize one classification's
//!   annotations into a flat extraction record
//! - **Reduce**: a streaming, resumable batch driver groups extractions by
//!   subject and task and combines them into consensus reductions
//!
//! # Example
//!
//! ```
//! use quorum::extract::ExtractorRegistry;
//! use quorum::reduce::ReducerRegistry;
//!
//! let extractors = ExtractorRegistry::builtin();
//! let reducers = ReducerRegistry::builtin();
//! assert!(extractors.get("poly_line_text_extractor").is_ok());
//! assert!(reducers.get("poly_line_text_reducer").is_ok());
//! ```

pub mod annotation;
pub mod dispatch;
pub mod extract;
pub mod reduce;
pub mod table;

pub use annotation::{Annotation, AnnotationValue, Classification, ToolMark};
pub use dispatch::{filter_annotations, DispatchConfig, ExtractorBatch, TaskRoute, ToolRoute};
pub use extract::{ExtractError, Extractor, ExtractorRegistry};
pub use reduce::{FilterPolicy, ReduceError, ReduceOptions, ReducerRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
