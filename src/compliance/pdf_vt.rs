//! PDF/VT rule set.
//!
//! Three rules: encryption is forbidden, an output intent with subtype
//! `GTS_PDFVT` is required, and a DPart hierarchy root must exist.

use crate::compliance::types::{ComplianceReport, Violation, ViolationCode};
use crate::object::{Dict, Object};
use crate::semantic::{OutputIntent, SemanticDocument};

/// The output-intent subtype PDF/VT requires.
pub const PDFVT_INTENT: &str = "GTS_PDFVT";

/// Validator and enforcer for PDF/VT.
#[derive(Debug, Default)]
pub struct PdfVtEnforcer;

impl PdfVtEnforcer {
    /// Create an enforcer.
    pub fn new() -> Self {
        Self
    }

    /// Check the rules without mutating.
    pub fn validate(&self, doc: &SemanticDocument) -> ComplianceReport {
        let mut violations = Vec::new();

        if doc.encrypted {
            violations.push(Violation::new(
                ViolationCode::EncryptionForbidden,
                "PDF/VT forbids encryption",
            ));
        }
        if !doc.has_output_intent(PDFVT_INTENT) {
            violations.push(Violation::new(
                ViolationCode::MissingPdfVtIntent,
                format!("no output intent with subtype {}", PDFVT_INTENT),
            ));
        }
        if doc.dpart_root.is_none() {
            violations.push(Violation::new(
                ViolationCode::MissingDPartRoot,
                "no DPart hierarchy root",
            ));
        }

        ComplianceReport::from_violations(violations)
    }

    /// Mutate the document until the rules hold.
    ///
    /// Encryption is stripped with permissions zeroed, a GTS_PDFVT intent
    /// is appended when missing, and an empty DPart root is installed.
    pub fn enforce(&self, doc: &mut SemanticDocument) {
        doc.encrypted = false;
        doc.permissions = 0;

        if !doc.has_output_intent(PDFVT_INTENT) {
            let mut dict = Dict::new();
            dict.insert("Type".to_string(), Object::Name("OutputIntent".to_string()));
            dict.insert("S".to_string(), Object::Name(PDFVT_INTENT.to_string()));
            dict.insert(
                "OutputConditionIdentifier".to_string(),
                Object::String(b"Unknown".to_vec()),
            );
            doc.output_intents.push(OutputIntent {
                subtype: PDFVT_INTENT.to_string(),
                dict,
            });
        }

        if doc.dpart_root.is_none() {
            let mut node = Dict::new();
            node.insert("Type".to_string(), Object::Name("DPart".to_string()));
            let mut root = Dict::new();
            root.insert("Type".to_string(), Object::Name("DPartRoot".to_string()));
            root.insert("DPartRootNode".to_string(), Object::Dictionary(node));
            doc.dpart_root = Some(root);
        }
    }
}
