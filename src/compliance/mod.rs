//! Compliance validation and enforcement.
//!
//! Small rule sets over the semantic document. Each rule contributes a
//! coded violation; `validate` reports, `enforce` mutates the document
//! until the rules hold or returns `ComplianceViolation` when it cannot.

mod pdf_a;
mod pdf_vt;
mod types;

pub use pdf_a::PdfAEnforcer;
pub use pdf_vt::PdfVtEnforcer;
pub use types::{ComplianceReport, PdfALevel, Violation, ViolationCode};
