//! Compliance types: conformance levels, violations, reports.

use std::fmt;

/// PDF/A conformance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdfALevel {
    /// PDF/A-1b: basic conformance, PDF 1.4 based
    A1b,
    /// PDF/A-2b: basic conformance, PDF 1.7 based
    A2b,
    /// PDF/A-2u: A2b plus Unicode mapping
    A2u,
    /// PDF/A-3b: A2b plus embedded files
    A3b,
}

impl PdfALevel {
    /// XMP `pdfaid:part` value.
    pub fn xmp_part(&self) -> &'static str {
        match self {
            PdfALevel::A1b => "1",
            PdfALevel::A2b | PdfALevel::A2u => "2",
            PdfALevel::A3b => "3",
        }
    }

    /// XMP `pdfaid:conformance` value.
    pub fn xmp_conformance(&self) -> &'static str {
        match self {
            PdfALevel::A2u => "U",
            _ => "B",
        }
    }

    /// Whether every font needs a ToUnicode mapping.
    pub fn requires_unicode(&self) -> bool {
        matches!(self, PdfALevel::A2u)
    }
}

impl fmt::Display for PdfALevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PdfALevel::A1b => "PDF/A-1b",
            PdfALevel::A2b => "PDF/A-2b",
            PdfALevel::A2u => "PDF/A-2u",
            PdfALevel::A3b => "PDF/A-3b",
        };
        write!(f, "{}", name)
    }
}

/// Coded violation kinds across the rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationCode {
    /// Document is encrypted
    EncryptionForbidden,
    /// No XMP metadata packet
    MissingXmpMetadata,
    /// A font is not embedded
    FontNotEmbedded,
    /// A font lacks a ToUnicode mapping (Unicode levels)
    FontMissingToUnicode,
    /// JavaScript present in the names tree
    JavaScriptForbidden,
    /// No /GTS_PDFVT output intent
    MissingPdfVtIntent,
    /// No /DPartRoot
    MissingDPartRoot,
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ViolationCode::EncryptionForbidden => "ENC-001",
            ViolationCode::MissingXmpMetadata => "XMP-001",
            ViolationCode::FontNotEmbedded => "FONT-001",
            ViolationCode::FontMissingToUnicode => "FONT-002",
            ViolationCode::JavaScriptForbidden => "JS-001",
            ViolationCode::MissingPdfVtIntent => "VT-001",
            ViolationCode::MissingDPartRoot => "VT-002",
        };
        write!(f, "{}", code)
    }
}

/// One rule violation.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Rule code
    pub code: ViolationCode,
    /// Human-readable description
    pub description: String,
    /// Location in the document, when known
    pub location: Option<String>,
}

impl Violation {
    /// Build a violation without a location.
    pub fn new(code: ViolationCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            location: None,
        }
    }

    /// Attach a location.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.description)?;
        if let Some(ref loc) = self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}

/// Validation outcome for one rule set.
#[derive(Debug, Clone, Default)]
pub struct ComplianceReport {
    /// Whether all rules hold
    pub compliant: bool,
    /// Violations found, in rule order
    pub violations: Vec<Violation>,
}

impl ComplianceReport {
    /// Build a report from gathered violations.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            compliant: violations.is_empty(),
            violations,
        }
    }
}
