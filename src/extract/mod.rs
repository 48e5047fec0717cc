//! Extraction stage — normalize classifications into extraction records
//!
//! Every extractor is a pure function from one (already dispatched)
//! classification to a flat extraction map. Extractors run inside a
//! uniform [`Extractor`] wrapper that validates input shape and converts
//! per-record failures into reported errors so one malformed submission
//! never aborts a batch. The [`ExtractorRegistry`] is the fixed name →
//! implementation table the drivers dispatch through.

mod driver;
mod poly_line_text;
mod question;
mod registry;
mod wrapper;

pub use driver::{extract_csv, ExtractOptions, ExtractRunError};
pub use poly_line_text::poly_line_text_extractor;
pub use question::question_extractor;
pub use registry::{ExtractorRegistry, UnknownExtractor};
pub use wrapper::{ExtractError, ExtractionData, Extractor, ExtractorFn, RecordError};
