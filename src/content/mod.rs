//! Content-stream engine.
//!
//! Parses page content into `(operator, operands)` pairs, detects inline
//! images, analyses which resources a stream actually uses, and rewrites
//! show-text strings when a font has been subsetted.

mod operation;
mod parser;
mod rewrite;
mod usage;

pub use operation::{INLINE_IMAGE_OPERATOR, InlineImage, Operand, Operation, serialize_operations};
pub use parser::parse_operations;
pub use rewrite::{CidRemaps, remap_content};
pub use usage::{ResourceUsage, analyze_usage};
