// Allow some clippy lints that are too pedantic for this codebase
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::match_like_matches_macro)]
#![allow(clippy::manual_range_contains)]

//! # PDF Forge
//!
//! A round-trip PDF object engine: parse an arbitrary PDF byte stream
//! into a cross-referenced object graph, lift it into a typed semantic
//! document, mutate it, and rewrite a standards-conforming PDF. Around
//! that core: TrueType font subsetting (composite-glyph and GSUB
//! closure), a streaming event emitter, and PDF/A / PDF/VT compliance
//! enforcement.
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> reader -> lexer -> parser <- xref -> RawDocument
//!       -> lift -> SemanticDocument -> (mutations) -> subsetter
//!       -> content rewrite -> writer -> bytes
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_forge::{CancelToken, LenientPolicy, WriteConfig, DocumentWriter};
//!
//! # fn main() -> pdf_forge::Result<()> {
//! let bytes = std::fs::read("input.pdf")?;
//! let policy = LenientPolicy::new();
//! let cancel = CancelToken::new();
//!
//! let doc = pdf_forge::load_document(bytes, &policy, &cancel)?;
//!
//! let config = WriteConfig::default()
//!     .with_deterministic(true)
//!     .with_subset_fonts(true);
//! let output = DocumentWriter::new(config).write(&doc, &cancel)?;
//! std::fs::write("output.pdf", output)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license
//! at your option.

#![warn(missing_docs)]

// Error handling and policies
pub mod cancel;
pub mod error;
pub mod recovery;

// Raw object layer
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod reader;
pub mod xref;

// Stream decoders
pub mod decoders;

// Semantic model and lift
pub mod semantic;

// Content-stream engine
pub mod content;

// Font machinery and subsetting
pub mod fonts;

// Serialization
pub mod config;
pub mod writer;

// Compliance enforcement
pub mod compliance;

// Streaming emitter
pub mod streaming;

// Re-exports
pub use cancel::CancelToken;
pub use compliance::{PdfAEnforcer, PdfALevel, PdfVtEnforcer};
pub use config::WriteConfig;
pub use document::RawDocument;
pub use error::{Error, Result};
pub use object::{Dict, Object, ObjectRef};
pub use recovery::{Action, FaultSite, LenientPolicy, RecoveryPolicy, StrictPolicy};
pub use semantic::{SemanticDocument, lift_document};
pub use writer::DocumentWriter;

use crate::recovery::RecoveryPolicy as Policy;

/// Parse and lift in one step: bytes to a semantic document.
pub fn load_document(
    bytes: Vec<u8>,
    policy: &dyn Policy,
    cancel: &CancelToken,
) -> Result<SemanticDocument> {
    let raw = RawDocument::parse(bytes, policy, cancel)?;
    lift_document(&raw, policy, cancel)
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
