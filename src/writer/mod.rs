//! PDF serialization.
//!
//! `DocumentWriter` turns a semantic document back into bytes: a
//! deterministic topological numbering from the catalog, object bodies,
//! an xref table or xref stream, and the trailer. The writer never
//! mutates its input; pre-write passes (font subsetting, PDF/A
//! enforcement) run on an internal clone.

mod pdf_writer;
pub mod serializer;

pub use pdf_writer::DocumentWriter;
pub use serializer::ObjectSerializer;
