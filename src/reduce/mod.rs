//! Reduction stage — extractions → per-subject consensus
//!
//! The driver reads a table of extractions, groups rows by subject and
//! task, applies a per-annotator submission filter, and hands each group
//! to the reducer derived from the table's extractor name. Reducers
//! combine many volunteers' extractions into consensus records, by
//! clustering for spatial tools and by vote counting for questions.
//!
//! In streaming mode output is flushed after every subject and a partial
//! output file doubles as a resume point: a restarted run subtracts the
//! subjects already on disk and never reduces a subject twice.

mod driver;
mod naming;
mod poly_line_text;
mod question;
mod registry;

pub use driver::{reduce_csv, FilterPolicy, ParseFilterPolicyError, ReduceError, ReduceOptions};
pub use naming::reducer_for;
pub use poly_line_text::poly_line_text_reducer;
pub use question::question_reducer;
pub use registry::{
    Keywords, ReducerError, ReducerFn, ReducerOutput, ReducerRegistry, UnknownReducer,
};
