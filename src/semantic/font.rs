//! Semantic font model.
//!
//! Fonts are the most structured resource kind: composite Type0 fonts
//! carry a descendant CIDFont, descriptors carry embedded font programs,
//! and the optional ToUnicode CMap maps character codes to runes.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::semantic::page::Rect;

/// Font subtype tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSubtype {
    /// Composite font with a CIDFont descendant
    Type0,
    /// Simple PostScript font
    Type1,
    /// Glyphs drawn by content-stream procedures
    Type3,
    /// Simple TrueType font
    TrueType,
    /// CIDFont with CFF outlines
    CIDFontType0,
    /// CIDFont with TrueType outlines
    CIDFontType2,
    /// Unrecognised subtype
    Unknown,
}

impl FontSubtype {
    /// Classify a /Subtype name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Type0" => FontSubtype::Type0,
            "Type1" | "MMType1" => FontSubtype::Type1,
            "Type3" => FontSubtype::Type3,
            "TrueType" => FontSubtype::TrueType,
            "CIDFontType0" => FontSubtype::CIDFontType0,
            "CIDFontType2" => FontSubtype::CIDFontType2,
            _ => FontSubtype::Unknown,
        }
    }
}

/// Which descriptor key carried the embedded font program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFileKind {
    /// /FontFile: Type1 program
    FontFile,
    /// /FontFile2: TrueType program
    FontFile2,
    /// /FontFile3: CFF or OpenType program
    FontFile3,
}

/// Font descriptor with the metrics the writer and subsetter need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontDescriptor {
    /// /FontBBox
    pub font_bbox: Option<Rect>,
    /// /Ascent
    pub ascent: Option<f64>,
    /// /Descent
    pub descent: Option<f64>,
    /// /ItalicAngle
    pub italic_angle: Option<f64>,
    /// /StemV
    pub stem_v: Option<f64>,
    /// /Flags
    pub flags: Option<i64>,
    /// Embedded font program: format tag plus decoded bytes
    pub font_file: Option<(FontFileKind, Vec<u8>)>,
}

/// Font encoding: a named base encoding or a differences table.
#[derive(Debug, Clone, PartialEq)]
pub enum FontEncoding {
    /// No /Encoding entry
    Default,
    /// A bare name, e.g. WinAnsiEncoding or Identity-H
    Named(String),
    /// An encoding dictionary with /Differences
    Differences {
        /// /BaseEncoding when present
        base: Option<String>,
        /// (code, glyph name) pairs expanded from the differences array
        differences: Vec<(u32, String)>,
    },
}

impl FontEncoding {
    /// Whether this is the Identity-H CID encoding.
    pub fn is_identity_h(&self) -> bool {
        matches!(self, FontEncoding::Named(name) if name == "Identity-H")
    }
}

/// /CIDSystemInfo of a CIDFont.
#[derive(Debug, Clone, PartialEq)]
pub struct CidSystemInfo {
    /// Registry string, e.g. "Adobe"
    pub registry: String,
    /// Ordering string, e.g. "Identity"
    pub ordering: String,
    /// Supplement number
    pub supplement: i64,
}

/// /CIDToGIDMap of a CIDFontType2.
#[derive(Debug, Clone, PartialEq)]
pub enum CidToGid {
    /// CID equals GID
    Identity,
    /// Explicit 2-bytes-per-CID map
    Map(Vec<u8>),
}

impl CidToGid {
    /// Map a CID to its glyph id.
    pub fn gid(&self, cid: u16) -> u16 {
        match self {
            CidToGid::Identity => cid,
            CidToGid::Map(bytes) => {
                let index = cid as usize * 2;
                if index + 1 < bytes.len() {
                    u16::from_be_bytes([bytes[index], bytes[index + 1]])
                } else {
                    0
                }
            },
        }
    }
}

/// A lifted font.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    /// Subtype tag
    pub subtype: FontSubtype,
    /// /BaseFont name, possibly already subset-tagged
    pub base_font: String,
    /// /Encoding
    pub encoding: FontEncoding,
    /// Decoded ToUnicode mapping: code to runes
    pub to_unicode: Option<HashMap<u32, Vec<char>>>,
    /// Font descriptor
    pub descriptor: Option<FontDescriptor>,
    /// Type0: /CIDSystemInfo of the descendant
    pub cid_system_info: Option<CidSystemInfo>,
    /// Type0: the descendant CIDFont
    pub descendant: Option<Box<Font>>,
    /// CIDFontType2: /CIDToGIDMap
    pub cid_to_gid: Option<CidToGid>,
    /// Type3: /CharProcs content streams by glyph name
    pub char_procs: IndexMap<String, Vec<u8>>,
    /// Type3: /FontMatrix mapping glyph space to text space
    pub font_matrix: Option<[f64; 6]>,
    /// /Widths or /W array, kept raw for the writer
    pub widths: Option<crate::object::Object>,
    /// /FirstChar, for simple fonts
    pub first_char: Option<i64>,
    /// /LastChar, for simple fonts
    pub last_char: Option<i64>,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            subtype: FontSubtype::Unknown,
            base_font: String::new(),
            encoding: FontEncoding::Default,
            to_unicode: None,
            descriptor: None,
            cid_system_info: None,
            descendant: None,
            cid_to_gid: None,
            char_procs: IndexMap::new(),
            font_matrix: None,
            widths: None,
            first_char: None,
            last_char: None,
        }
    }
}

impl Font {
    /// The descriptor that carries the embedded program: the font's own,
    /// or for Type0 the descendant's.
    pub fn embedded_descriptor(&self) -> Option<&FontDescriptor> {
        if let Some(desc) = self.descriptor.as_ref() {
            if desc.font_file.is_some() {
                return Some(desc);
            }
        }
        self.descendant.as_ref().and_then(|d| d.embedded_descriptor())
    }

    /// Mutable access to the descriptor carrying the embedded program.
    pub fn embedded_descriptor_mut(&mut self) -> Option<&mut FontDescriptor> {
        if self
            .descriptor
            .as_ref()
            .is_some_and(|d| d.font_file.is_some())
        {
            return self.descriptor.as_mut();
        }
        self.descendant
            .as_mut()
            .and_then(|d| d.embedded_descriptor_mut())
    }

    /// Whether the subsetter may touch this font: an Identity-H Type0 font
    /// whose descendant is a CIDFontType2 with an embedded TrueType file.
    pub fn is_subsettable(&self) -> bool {
        self.subtype == FontSubtype::Type0
            && self.encoding.is_identity_h()
            && self
                .descendant
                .as_ref()
                .is_some_and(|d| d.subtype == FontSubtype::CIDFontType2)
            && self
                .embedded_descriptor()
                .and_then(|d| d.font_file.as_ref())
                .is_some_and(|(kind, _)| *kind == FontFileKind::FontFile2)
    }
}
