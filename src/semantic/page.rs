//! Semantic page model: geometry, resources and annotations.

use bytes::Bytes;
use indexmap::IndexMap;

use crate::object::{Dict, Object};
use crate::semantic::font::Font;

/// A rectangle in default user space, stored `llx lly urx ury`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Lower-left x
    pub llx: f64,
    /// Lower-left y
    pub lly: f64,
    /// Upper-right x
    pub urx: f64,
    /// Upper-right y
    pub ury: f64,
}

impl Rect {
    /// US Letter media box, the conventional fallback.
    pub const LETTER: Rect = Rect {
        llx: 0.0,
        lly: 0.0,
        urx: 612.0,
        ury: 792.0,
    };

    /// Read from a 4-element PDF array, normalising a flipped box.
    pub fn from_array(array: &[Object]) -> Option<Rect> {
        if array.len() != 4 {
            return None;
        }
        let values: Vec<f64> = array.iter().filter_map(|o| o.as_number()).collect();
        if values.len() != 4 {
            return None;
        }
        Some(Rect {
            llx: values[0].min(values[2]),
            lly: values[1].min(values[3]),
            urx: values[0].max(values[2]),
            ury: values[1].max(values[3]),
        })
    }

    /// The PDF array form.
    pub fn to_object(self) -> Object {
        Object::Array(vec![
            Object::Real(self.llx),
            Object::Real(self.lly),
            Object::Real(self.urx),
            Object::Real(self.ury),
        ])
    }

    /// Box width.
    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    /// Box height.
    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

/// Colour space, a closed tagged enumeration.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    /// DeviceGray, DeviceRGB or DeviceCMYK
    Device(String),
    /// ICC profile based, with the declared component count
    ICCBased {
        /// Number of components (/N)
        components: i64,
        /// Decoded profile bytes
        profile: Vec<u8>,
    },
    /// Indexed palette over a base space
    Indexed {
        /// The base colour space
        base: Box<ColorSpace>,
        /// Highest palette index
        hival: i64,
        /// Palette bytes
        lookup: Vec<u8>,
    },
    /// Separation with a named colourant
    Separation {
        /// Colourant name
        name: String,
    },
    /// DeviceN with multiple colourants
    DeviceN {
        /// Colourant names
        names: Vec<String>,
    },
    /// Pattern colour space
    Pattern,
    /// Anything this engine does not model further
    Unknown(String),
}

/// XObject kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XObjectKind {
    /// Raster image
    Image,
    /// Form (self-contained content fragment)
    Form,
    /// Unrecognised subtype
    Unknown,
}

/// An XObject: classified subtype plus its dictionary and raw bytes.
///
/// Form resources are left as raw dictionary entries; recursing into them
/// at lift time would chase cycles through the object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct XObject {
    /// Image, Form or Unknown
    pub kind: XObjectKind,
    /// The stream dictionary
    pub dict: Dict,
    /// Stored stream bytes, still filtered
    pub data: Bytes,
}

/// Page resources by kind, resource names in document order.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    /// Fonts by resource name
    pub fonts: IndexMap<String, Font>,
    /// XObjects by resource name
    pub xobjects: IndexMap<String, XObject>,
    /// Pattern dictionaries/streams, kept raw
    pub patterns: IndexMap<String, Object>,
    /// Shading dictionaries, kept raw
    pub shadings: IndexMap<String, Object>,
    /// Extended graphics states
    pub ext_g_states: IndexMap<String, Dict>,
    /// Colour spaces
    pub color_spaces: IndexMap<String, ColorSpace>,
    /// Property lists for marked content
    pub properties: IndexMap<String, Dict>,
}

/// An annotation: classified subtype, rectangle, full dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// /Subtype value ("Link", "Widget", ...)
    pub subtype: String,
    /// /Rect when present and well-formed
    pub rect: Option<Rect>,
    /// The complete annotation dictionary
    pub dict: Dict,
}

/// A lifted page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Media box, inherited from the page tree when absent on the leaf
    pub media_box: Option<Rect>,
    /// Crop box, when present
    pub crop_box: Option<Rect>,
    /// Rotation normalised into {0, 90, 180, 270}
    pub rotation: u16,
    /// Resources, inherited entries merged in
    pub resources: Resources,
    /// Decoded content streams in order
    pub contents: Vec<Bytes>,
    /// Annotations in array order
    pub annotations: Vec<Annotation>,
    /// Key of the page object in the source document, for retargeting
    /// destinations that point at this page
    pub source_ref: Option<crate::object::ObjectRef>,
}

impl Page {
    /// Media box with the Letter fallback applied.
    pub fn effective_media_box(&self) -> Rect {
        self.media_box.unwrap_or(Rect::LETTER)
    }

    /// All content-stream bytes concatenated, the form the content parser
    /// takes (streams split mid-operation must be joined).
    pub fn joined_contents(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, stream) in self.contents.iter().enumerate() {
            if i > 0 {
                out.push(b'\n');
            }
            out.extend_from_slice(stream);
        }
        out
    }
}

/// Normalise a /Rotate value into {0, 90, 180, 270}.
pub fn normalize_rotation(value: i64) -> u16 {
    (((value % 360) + 360) % 360) as u16
}
