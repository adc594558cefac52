//! Semantic document model and the lift from the raw object graph.
//!
//! The raw layer deals in objects and references; this layer deals in
//! pages, resources, fonts and document-level structures. Lifting resolves
//! indirect references and classifies subtypes into closed enums; writing
//! turns the semantic tree back into objects.

mod font;
mod lift;
mod page;

pub use font::{
    CidSystemInfo, CidToGid, Font, FontDescriptor, FontEncoding, FontFileKind, FontSubtype,
};
pub use lift::lift_document;
pub use page::{
    Annotation, ColorSpace, Page, Rect, Resources, XObject, XObjectKind, normalize_rotation,
};

use crate::object::{Dict, Object};

/// An outline (bookmark) tree node.
#[derive(Debug, Clone, Default)]
pub struct OutlineItem {
    /// Title bytes (PDFDocEncoding or UTF-16BE)
    pub title: Vec<u8>,
    /// /Dest or /A value, kept raw
    pub destination: Option<Object>,
    /// Child items in sibling order
    pub children: Vec<OutlineItem>,
}

/// One member of the catalog's /OutputIntents array.
#[derive(Debug, Clone)]
pub struct OutputIntent {
    /// /S subtype, e.g. "GTS_PDFA1" or "GTS_PDFVT"
    pub subtype: String,
    /// The full intent dictionary
    pub dict: Dict,
}

/// The lifted document.
#[derive(Debug, Clone, Default)]
pub struct SemanticDocument {
    /// Header version carried over from the raw document
    pub version: String,
    /// Pages in document order
    pub pages: Vec<Page>,
    /// /AcroForm dictionary, kept raw
    pub acro_form: Option<Dict>,
    /// /StructTreeRoot dictionary, kept raw (tagged PDF)
    pub structure_tree: Option<Dict>,
    /// Outline tree roots
    pub outlines: Vec<OutlineItem>,
    /// /PageLabels number-tree leaves: (start page index, label dict)
    pub page_labels: Vec<(i64, Dict)>,
    /// /Info dictionary
    pub info: Dict,
    /// /Metadata XMP packet bytes, not re-parsed
    pub xmp_metadata: Option<Vec<u8>>,
    /// /OutputIntents members
    pub output_intents: Vec<OutputIntent>,
    /// /DPartRoot dictionary (PDF/VT)
    pub dpart_root: Option<Dict>,
    /// Whether the source document was encrypted
    pub encrypted: bool,
    /// /P permission bits from the encryption dictionary
    pub permissions: i64,
    /// Names-tree JavaScript entries: (name, script bytes)
    pub javascript: Vec<(String, Vec<u8>)>,
}

impl SemanticDocument {
    /// Whether any output intent carries the given /S subtype.
    pub fn has_output_intent(&self, subtype: &str) -> bool {
        self.output_intents.iter().any(|oi| oi.subtype == subtype)
    }
}
