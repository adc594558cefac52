//! PDF/A rule set.
//!
//! The level-gated rules this engine checks and enforces: encryption is
//! forbidden, an XMP metadata packet with a PDF/A identification is
//! required, every used font must be embedded, JavaScript is forbidden,
//! and the Unicode levels additionally require ToUnicode on every font.
//!
//! Enforcement can strip encryption and JavaScript and synthesise the
//! identification packet, but it cannot conjure missing font programs:
//! an unembedded font makes `enforce` fail.

use crate::compliance::types::{ComplianceReport, PdfALevel, Violation, ViolationCode};
use crate::error::{Error, Result};
use crate::semantic::{FontSubtype, SemanticDocument};

/// Validator and enforcer for one PDF/A level.
#[derive(Debug)]
pub struct PdfAEnforcer {
    level: PdfALevel,
}

impl PdfAEnforcer {
    /// Create an enforcer for `level`.
    pub fn new(level: PdfALevel) -> Self {
        Self { level }
    }

    /// Check the rules without mutating.
    pub fn validate(&self, doc: &SemanticDocument) -> ComplianceReport {
        let mut violations = Vec::new();

        if doc.encrypted {
            violations.push(Violation::new(
                ViolationCode::EncryptionForbidden,
                format!("{} forbids encryption", self.level),
            ));
        }

        if doc.xmp_metadata.is_none() {
            violations.push(Violation::new(
                ViolationCode::MissingXmpMetadata,
                "no XMP metadata packet",
            ));
        }

        if !doc.javascript.is_empty() {
            violations.push(Violation::new(
                ViolationCode::JavaScriptForbidden,
                format!("{} JavaScript names-tree entries", doc.javascript.len()),
            ));
        }

        for (page_index, page) in doc.pages.iter().enumerate() {
            for (name, font) in &page.resources.fonts {
                // Type3 glyphs are self-contained content streams
                if font.subtype == FontSubtype::Type3 {
                    continue;
                }
                if font.embedded_descriptor().is_none() {
                    violations.push(
                        Violation::new(
                            ViolationCode::FontNotEmbedded,
                            format!("font {} ({}) is not embedded", name, font.base_font),
                        )
                        .at(format!("page {}", page_index + 1)),
                    );
                }
                if self.level.requires_unicode() && font.to_unicode.is_none() {
                    violations.push(
                        Violation::new(
                            ViolationCode::FontMissingToUnicode,
                            format!("font {} has no ToUnicode mapping", name),
                        )
                        .at(format!("page {}", page_index + 1)),
                    );
                }
            }
        }

        ComplianceReport::from_violations(violations)
    }

    /// Mutate the document to satisfy the rules.
    ///
    /// # Errors
    ///
    /// `Error::ComplianceViolation` when a violation cannot be repaired
    /// (a font whose program is simply absent).
    pub fn enforce(&self, doc: &mut SemanticDocument) -> Result<()> {
        doc.encrypted = false;
        doc.permissions = 0;
        doc.javascript.clear();

        if doc.xmp_metadata.is_none() {
            doc.xmp_metadata = Some(self.identification_packet(doc));
        }

        // What cannot be synthesised makes enforcement fail: missing
        // font programs and missing Unicode mappings
        let report = self.validate(doc);
        if let Some(fatal) = report.violations.iter().find(|v| {
            matches!(
                v.code,
                ViolationCode::FontNotEmbedded | ViolationCode::FontMissingToUnicode
            )
        }) {
            return Err(Error::ComplianceViolation(fatal.to_string()));
        }
        Ok(())
    }

    /// Minimal XMP packet carrying the pdfaid identification and the
    /// document title when one is present.
    fn identification_packet(&self, doc: &SemanticDocument) -> Vec<u8> {
        let title = doc
            .info
            .get("Title")
            .and_then(|o| o.as_string())
            .map(|s| String::from_utf8_lossy(s).to_string())
            .unwrap_or_default();

        let mut xmp = String::new();
        xmp.push_str("<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
        xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
        xmp.push_str(" <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
        xmp.push_str("  <rdf:Description rdf:about=\"\" xmlns:pdfaid=\"http://www.aiim.org/pdfa/ns/id/\">\n");
        xmp.push_str(&format!("   <pdfaid:part>{}</pdfaid:part>\n", self.level.xmp_part()));
        xmp.push_str(&format!(
            "   <pdfaid:conformance>{}</pdfaid:conformance>\n",
            self.level.xmp_conformance()
        ));
        xmp.push_str("  </rdf:Description>\n");
        if !title.is_empty() {
            xmp.push_str("  <rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
            xmp.push_str(&format!(
                "   <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:title>\n",
                title
            ));
            xmp.push_str("  </rdf:Description>\n");
        }
        xmp.push_str(" </rdf:RDF>\n</x:xmpmeta>\n<?xpacket end=\"w\"?>");
        xmp.into_bytes()
    }
}
