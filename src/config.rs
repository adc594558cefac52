//! Writer configuration.

use crate::compliance::PdfALevel;

/// Options governing serialization.
#[derive(Debug, Clone)]
pub struct WriteConfig {
    /// Header version written ("1.4".."2.0"); gates version-dependent
    /// features (object streams need 1.5 or later)
    pub version: String,
    /// Flate level 0-9 for stream objects (0 = store raw)
    pub compression: u32,
    /// Pack eligible objects into /ObjStm streams (version >= 1.5 only)
    pub object_streams: bool,
    /// Canonical ordering and zero timestamps for byte-stable output
    pub deterministic: bool,
    /// Run the TrueType subsetter before writing
    pub subset_fonts: bool,
    /// Enforce a PDF/A level before writing
    pub pdfa_level: Option<PdfALevel>,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            version: "1.7".to_string(),
            compression: 6,
            object_streams: false,
            deterministic: false,
            subset_fonts: false,
            pdfa_level: None,
        }
    }
}

impl WriteConfig {
    /// Set the header version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the Flate level for stream objects.
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = level.min(9);
        self
    }

    /// Enable object-stream packing.
    pub fn with_object_streams(mut self, enabled: bool) -> Self {
        self.object_streams = enabled;
        self
    }

    /// Force canonical ordering and zeroed timestamps.
    pub fn with_deterministic(mut self, enabled: bool) -> Self {
        self.deterministic = enabled;
        self
    }

    /// Subset embedded TrueType fonts before writing.
    pub fn with_subset_fonts(mut self, enabled: bool) -> Self {
        self.subset_fonts = enabled;
        self
    }

    /// Enforce a PDF/A level before writing.
    pub fn with_pdfa_level(mut self, level: PdfALevel) -> Self {
        self.pdfa_level = Some(level);
        self
    }

    /// Numeric form of the header version, for feature gating.
    pub fn numeric_version(&self) -> f32 {
        self.version.parse().unwrap_or(1.7)
    }

    /// Whether /ObjStm packing is both requested and version-legal.
    pub fn object_streams_enabled(&self) -> bool {
        self.object_streams && self.numeric_version() >= 1.5
    }
}
