//! Document writer: semantic tree to PDF bytes.
//!
//! Object numbers are assigned by a topological walk from the catalog:
//! root, pages, then per page its contents, resources, fonts and their
//! descriptors, followed by document-level structures. In deterministic
//! mode resource maps and dictionary entries sort lexicographically and
//! timestamps are stripped, making the output a function of the document
//! alone.
//!
//! Streams are Flate-encoded at the configured level; when encoding does
//! not shrink a stream the raw bytes are kept and `/Filter` omitted.
//! `/Length` always reflects the stored bytes. With object streams
//! enabled (and version 1.5+) eligible non-stream objects are packed into
//! a single `/ObjStm` and the file gets an xref stream instead of a
//! table.

use std::collections::HashMap;
use std::io::Write;

use crate::cancel::CancelToken;
use crate::compliance::PdfAEnforcer;
use crate::config::WriteConfig;
use crate::decoders::encode_flate;
use crate::error::{Error, Result};
use crate::fonts::subset_document_fonts;
use crate::object::{Dict, Object, ObjectRef};
use crate::semantic::{
    CidToGid, ColorSpace, Font, FontDescriptor, FontEncoding, FontFileKind, FontSubtype,
    OutlineItem, Page, SemanticDocument,
};
use crate::writer::serializer::ObjectSerializer;

/// Streams shorter than this are never worth a Flate header.
const MIN_COMPRESS_LEN: usize = 32;

/// Writer for semantic documents.
#[derive(Debug, Default)]
pub struct DocumentWriter {
    config: WriteConfig,
}

impl DocumentWriter {
    /// Writer with the given configuration.
    pub fn new(config: WriteConfig) -> Self {
        Self { config }
    }

    /// Serialize a document to PDF bytes.
    ///
    /// Runs the configured pre-write passes (font subsetting, PDF/A
    /// enforcement) on an internal clone; the input is left untouched.
    pub fn write(&self, doc: &SemanticDocument, cancel: &CancelToken) -> Result<Vec<u8>> {
        let preprocessed = if self.config.subset_fonts || self.config.pdfa_level.is_some() {
            let mut working = doc.clone();
            if self.config.subset_fonts {
                subset_document_fonts(&mut working, cancel)?;
            }
            if let Some(level) = self.config.pdfa_level {
                PdfAEnforcer::new(level).enforce(&mut working)?;
            }
            Some(working)
        } else {
            None
        };
        let doc = preprocessed.as_ref().unwrap_or(doc);

        let mut builder = Builder::new(&self.config);
        builder.build(doc, cancel)?;
        builder.emit(cancel)
    }
}

/// Object table under construction. Ids are contiguous from 1; object 0
/// is the free-list head and never stored.
struct Builder<'a> {
    config: &'a WriteConfig,
    objects: Vec<Object>,
    page_map: HashMap<ObjectRef, u32>,
    root_id: u32,
    info_id: Option<u32>,
}

impl<'a> Builder<'a> {
    fn new(config: &'a WriteConfig) -> Self {
        Self {
            config,
            objects: Vec::new(),
            page_map: HashMap::new(),
            root_id: 0,
            info_id: None,
        }
    }

    fn alloc(&mut self) -> u32 {
        self.objects.push(Object::Null);
        self.objects.len() as u32
    }

    fn set(&mut self, id: u32, obj: Object) {
        self.objects[id as usize - 1] = obj;
    }

    fn add(&mut self, obj: Object) -> u32 {
        let id = self.alloc();
        self.set(id, obj);
        id
    }

    fn reference(id: u32) -> Object {
        Object::Reference(ObjectRef::new(id, 0))
    }

    // ------------------------------------------------------------------
    // Graph construction
    // ------------------------------------------------------------------

    fn build(&mut self, doc: &SemanticDocument, cancel: &CancelToken) -> Result<()> {
        let catalog_id = self.alloc();
        self.root_id = catalog_id;
        let pages_root_id = self.alloc();

        // Page ids first, so destinations can retarget to them
        let page_ids: Vec<u32> = doc.pages.iter().map(|_| self.alloc()).collect();
        for (page, &id) in doc.pages.iter().zip(&page_ids) {
            if let Some(source) = page.source_ref {
                self.page_map.insert(source, id);
            }
        }

        for (page, &page_id) in doc.pages.iter().zip(&page_ids) {
            cancel.check()?;
            let page_obj = self.build_page(page, page_id, pages_root_id)?;
            self.set(page_id, page_obj);
        }

        let mut pages_root = Dict::new();
        pages_root.insert("Type".to_string(), Object::Name("Pages".to_string()));
        pages_root.insert(
            "Kids".to_string(),
            Object::Array(page_ids.iter().map(|&id| Self::reference(id)).collect()),
        );
        pages_root.insert("Count".to_string(), Object::Integer(doc.pages.len() as i64));
        self.set(pages_root_id, Object::Dictionary(pages_root));

        let catalog = self.build_catalog(doc, pages_root_id)?;
        self.set(catalog_id, Object::Dictionary(catalog));

        if !doc.info.is_empty() {
            let mut info = self.ingest_dict(&doc.info);
            if self.config.deterministic {
                // Zeroed timestamps: the entries simply disappear
                info.shift_remove("CreationDate");
                info.shift_remove("ModDate");
            }
            if !info.is_empty() {
                self.info_id = Some(self.add(Object::Dictionary(info)));
            }
        }

        Ok(())
    }

    fn build_catalog(&mut self, doc: &SemanticDocument, pages_root_id: u32) -> Result<Dict> {
        let mut catalog = Dict::new();
        catalog.insert("Type".to_string(), Object::Name("Catalog".to_string()));
        catalog.insert("Pages".to_string(), Self::reference(pages_root_id));

        if let Some(root_id) = self.build_outlines(&doc.outlines) {
            catalog.insert("Outlines".to_string(), Self::reference(root_id));
        }

        if let Some(xmp) = &doc.xmp_metadata {
            let mut dict = Dict::new();
            dict.insert("Type".to_string(), Object::Name("Metadata".to_string()));
            dict.insert("Subtype".to_string(), Object::Name("XML".to_string()));
            // XMP stays uncompressed so metadata scanners can read it
            let id = self.add(Object::Stream {
                dict,
                data: bytes::Bytes::from(xmp.clone()),
            });
            catalog.insert("Metadata".to_string(), Self::reference(id));
        }

        if let Some(acro_form) = &doc.acro_form {
            let ingested = self.ingest_dict(acro_form);
            let id = self.add(Object::Dictionary(ingested));
            catalog.insert("AcroForm".to_string(), Self::reference(id));
        }
        if let Some(tree) = &doc.structure_tree {
            let ingested = self.ingest_dict(tree);
            let id = self.add(Object::Dictionary(ingested));
            catalog.insert("StructTreeRoot".to_string(), Self::reference(id));
        }
        if let Some(dpart) = &doc.dpart_root {
            let ingested = self.ingest_dict(dpart);
            let id = self.add(Object::Dictionary(ingested));
            catalog.insert("DPartRoot".to_string(), Self::reference(id));
        }

        if !doc.output_intents.is_empty() {
            let intents: Vec<Object> = doc
                .output_intents
                .iter()
                .map(|intent| {
                    let ingested = self.ingest_dict(&intent.dict);
                    Object::Dictionary(ingested)
                })
                .collect();
            catalog.insert("OutputIntents".to_string(), Object::Array(intents));
        }

        if !doc.page_labels.is_empty() {
            let mut nums = Vec::new();
            for (index, label) in &doc.page_labels {
                nums.push(Object::Integer(*index));
                nums.push(Object::Dictionary(self.ingest_dict(label)));
            }
            let mut labels = Dict::new();
            labels.insert("Nums".to_string(), Object::Array(nums));
            catalog.insert("PageLabels".to_string(), Object::Dictionary(labels));
        }

        if !doc.javascript.is_empty() {
            let mut entries = Vec::new();
            for (name, script) in &doc.javascript {
                let mut action = Dict::new();
                action.insert("S".to_string(), Object::Name("JavaScript".to_string()));
                action.insert("JS".to_string(), Object::String(script.clone()));
                let action_id = self.add(Object::Dictionary(action));
                entries.push(Object::String(name.as_bytes().to_vec()));
                entries.push(Self::reference(action_id));
            }
            let mut js_tree = Dict::new();
            js_tree.insert("Names".to_string(), Object::Array(entries));
            let mut names = Dict::new();
            names.insert("JavaScript".to_string(), Object::Dictionary(js_tree));
            catalog.insert("Names".to_string(), Object::Dictionary(names));
        }

        Ok(catalog)
    }

    fn build_page(&mut self, page: &Page, page_id: u32, pages_root_id: u32) -> Result<Object> {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("Page".to_string()));
        dict.insert("Parent".to_string(), Self::reference(pages_root_id));
        dict.insert("MediaBox".to_string(), page.effective_media_box().to_object());
        if let Some(crop) = page.crop_box {
            dict.insert("CropBox".to_string(), crop.to_object());
        }
        if page.rotation != 0 {
            dict.insert("Rotate".to_string(), Object::Integer(page.rotation as i64));
        }

        dict.insert(
            "Resources".to_string(),
            Object::Dictionary(self.build_resources(page)?),
        );

        let content_ids: Vec<u32> = page
            .contents
            .iter()
            .map(|data| {
                let stream = self.prepare_stream(Dict::new(), data.to_vec());
                self.add(stream)
            })
            .collect();
        match content_ids.as_slice() {
            [] => {},
            [single] => {
                dict.insert("Contents".to_string(), Self::reference(*single));
            },
            many => {
                dict.insert(
                    "Contents".to_string(),
                    Object::Array(many.iter().map(|&id| Self::reference(id)).collect()),
                );
            },
        }

        if !page.annotations.is_empty() {
            let mut annots = Vec::new();
            for annotation in &page.annotations {
                let mut ingested = self.ingest_dict(&annotation.dict);
                ingested
                    .entry("Type".to_string())
                    .or_insert_with(|| Object::Name("Annot".to_string()));
                ingested.insert("P".to_string(), Self::reference(page_id));
                let id = self.add(Object::Dictionary(ingested));
                annots.push(Self::reference(id));
            }
            dict.insert("Annots".to_string(), Object::Array(annots));
        }

        Ok(Object::Dictionary(dict))
    }

    /// Resource-name iteration order: canonical in deterministic mode.
    fn resource_order<'m, T>(&self, map: &'m indexmap::IndexMap<String, T>) -> Vec<&'m String> {
        let mut names: Vec<&String> = map.keys().collect();
        if self.config.deterministic {
            names.sort();
        }
        names
    }

    fn build_resources(&mut self, page: &Page) -> Result<Dict> {
        let resources = &page.resources;
        let mut dict = Dict::new();

        if !resources.fonts.is_empty() {
            let mut fonts = Dict::new();
            for name in self.resource_order(&resources.fonts) {
                let font_id = self.build_font(&resources.fonts[name.as_str()])?;
                fonts.insert(name.clone(), Self::reference(font_id));
            }
            dict.insert("Font".to_string(), Object::Dictionary(fonts));
        }

        if !resources.xobjects.is_empty() {
            let mut xobjects = Dict::new();
            for name in self.resource_order(&resources.xobjects) {
                let xobject = &resources.xobjects[name.as_str()];
                let ingested = self.ingest_dict(&xobject.dict);
                let id = self.add(Object::Stream {
                    dict: ingested,
                    data: xobject.data.clone(),
                });
                xobjects.insert(name.clone(), Self::reference(id));
            }
            dict.insert("XObject".to_string(), Object::Dictionary(xobjects));
        }

        if !resources.patterns.is_empty() {
            let mut patterns = Dict::new();
            for name in self.resource_order(&resources.patterns) {
                let value = self.ingest(&resources.patterns[name.as_str()]);
                patterns.insert(name.clone(), value);
            }
            dict.insert("Pattern".to_string(), Object::Dictionary(patterns));
        }

        if !resources.shadings.is_empty() {
            let mut shadings = Dict::new();
            for name in self.resource_order(&resources.shadings) {
                let value = self.ingest(&resources.shadings[name.as_str()]);
                shadings.insert(name.clone(), value);
            }
            dict.insert("Shading".to_string(), Object::Dictionary(shadings));
        }

        if !resources.ext_g_states.is_empty() {
            let mut states = Dict::new();
            for name in self.resource_order(&resources.ext_g_states) {
                let ingested = self.ingest_dict(&resources.ext_g_states[name.as_str()]);
                states.insert(name.clone(), Object::Dictionary(ingested));
            }
            dict.insert("ExtGState".to_string(), Object::Dictionary(states));
        }

        if !resources.color_spaces.is_empty() {
            let mut spaces = Dict::new();
            for name in self.resource_order(&resources.color_spaces) {
                let value = self.color_space_object(&resources.color_spaces[name.as_str()]);
                spaces.insert(name.clone(), value);
            }
            dict.insert("ColorSpace".to_string(), Object::Dictionary(spaces));
        }

        if !resources.properties.is_empty() {
            let mut properties = Dict::new();
            for name in self.resource_order(&resources.properties) {
                let ingested = self.ingest_dict(&resources.properties[name.as_str()]);
                properties.insert(name.clone(), Object::Dictionary(ingested));
            }
            dict.insert("Properties".to_string(), Object::Dictionary(properties));
        }

        Ok(dict)
    }

    fn color_space_object(&mut self, space: &ColorSpace) -> Object {
        match space {
            ColorSpace::Device(name) | ColorSpace::Unknown(name) => Object::Name(name.clone()),
            ColorSpace::Pattern => Object::Name("Pattern".to_string()),
            ColorSpace::ICCBased {
                components,
                profile,
            } => {
                let mut dict = Dict::new();
                dict.insert("N".to_string(), Object::Integer(*components));
                let stream = self.prepare_stream(dict, profile.clone());
                let id = self.add(stream);
                Object::Array(vec![
                    Object::Name("ICCBased".to_string()),
                    Self::reference(id),
                ])
            },
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => Object::Array(vec![
                Object::Name("Indexed".to_string()),
                self.color_space_object(base),
                Object::Integer(*hival),
                Object::String(lookup.clone()),
            ]),
            ColorSpace::Separation { name } => Object::Array(vec![
                Object::Name("Separation".to_string()),
                Object::Name(name.clone()),
                Object::Name("DeviceGray".to_string()),
                identity_tint_transform(1),
            ]),
            ColorSpace::DeviceN { names } => Object::Array(vec![
                Object::Name("DeviceN".to_string()),
                Object::Array(names.iter().map(|n| Object::Name(n.clone())).collect()),
                Object::Name("DeviceGray".to_string()),
                identity_tint_transform(names.len()),
            ]),
        }
    }

    // ------------------------------------------------------------------
    // Fonts
    // ------------------------------------------------------------------

    fn build_font(&mut self, font: &Font) -> Result<u32> {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("Font".to_string()));
        dict.insert("Subtype".to_string(), Object::Name(subtype_name(font.subtype).to_string()));
        if !font.base_font.is_empty() {
            dict.insert("BaseFont".to_string(), Object::Name(font.base_font.clone()));
        }

        if let Some(encoding) = self.encoding_object(&font.encoding) {
            dict.insert("Encoding".to_string(), encoding);
        }

        match font.subtype {
            FontSubtype::Type0 => {
                if let Some(descendant) = &font.descendant {
                    let descendant_id = self.build_cid_font(descendant)?;
                    dict.insert(
                        "DescendantFonts".to_string(),
                        Object::Array(vec![Self::reference(descendant_id)]),
                    );
                }
            },
            FontSubtype::Type3 => {
                let matrix = font.font_matrix.unwrap_or([0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);
                dict.insert(
                    "FontMatrix".to_string(),
                    Object::Array(matrix.iter().map(|&v| Object::Real(v)).collect()),
                );
                if let Some(descriptor) = &font.descriptor {
                    if let Some(bbox) = descriptor.font_bbox {
                        dict.insert("FontBBox".to_string(), bbox.to_object());
                    }
                }
                if !font.char_procs.is_empty() {
                    let mut procs = Dict::new();
                    for (glyph, body) in &font.char_procs {
                        let stream = self.prepare_stream(Dict::new(), body.clone());
                        let id = self.add(stream);
                        procs.insert(glyph.clone(), Self::reference(id));
                    }
                    dict.insert("CharProcs".to_string(), Object::Dictionary(procs));
                }
            },
            _ => {
                if let Some(descriptor) = &font.descriptor {
                    let descriptor_id = self.build_descriptor(descriptor, &font.base_font)?;
                    dict.insert("FontDescriptor".to_string(), Self::reference(descriptor_id));
                }
            },
        }

        if let Some(first) = font.first_char {
            dict.insert("FirstChar".to_string(), Object::Integer(first));
        }
        if let Some(last) = font.last_char {
            dict.insert("LastChar".to_string(), Object::Integer(last));
        }
        if font.subtype != FontSubtype::Type0 {
            if let Some(widths) = &font.widths {
                dict.insert("Widths".to_string(), self.ingest(widths));
            }
        }

        if let Some(to_unicode) = &font.to_unicode {
            let cmap = generate_to_unicode_cmap(to_unicode);
            let stream = self.prepare_stream(Dict::new(), cmap.into_bytes());
            let id = self.add(stream);
            dict.insert("ToUnicode".to_string(), Self::reference(id));
        }

        Ok(self.add(Object::Dictionary(dict)))
    }

    fn build_cid_font(&mut self, font: &Font) -> Result<u32> {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("Font".to_string()));
        dict.insert("Subtype".to_string(), Object::Name(subtype_name(font.subtype).to_string()));
        if !font.base_font.is_empty() {
            dict.insert("BaseFont".to_string(), Object::Name(font.base_font.clone()));
        }

        let mut system_info = Dict::new();
        match &font.cid_system_info {
            Some(info) => {
                system_info.insert("Registry".to_string(), Object::String(info.registry.clone().into_bytes()));
                system_info.insert("Ordering".to_string(), Object::String(info.ordering.clone().into_bytes()));
                system_info.insert("Supplement".to_string(), Object::Integer(info.supplement));
            },
            None => {
                system_info.insert("Registry".to_string(), Object::String(b"Adobe".to_vec()));
                system_info.insert("Ordering".to_string(), Object::String(b"Identity".to_vec()));
                system_info.insert("Supplement".to_string(), Object::Integer(0));
            },
        }
        dict.insert("CIDSystemInfo".to_string(), Object::Dictionary(system_info));

        if let Some(descriptor) = &font.descriptor {
            let descriptor_id = self.build_descriptor(descriptor, &font.base_font)?;
            dict.insert("FontDescriptor".to_string(), Self::reference(descriptor_id));
        }
        if let Some(widths) = &font.widths {
            dict.insert("W".to_string(), self.ingest(widths));
        }
        match &font.cid_to_gid {
            Some(CidToGid::Identity) | None => {
                dict.insert("CIDToGIDMap".to_string(), Object::Name("Identity".to_string()));
            },
            Some(CidToGid::Map(bytes)) => {
                let stream = self.prepare_stream(Dict::new(), bytes.clone());
                let id = self.add(stream);
                dict.insert("CIDToGIDMap".to_string(), Self::reference(id));
            },
        }

        Ok(self.add(Object::Dictionary(dict)))
    }

    fn build_descriptor(&mut self, descriptor: &FontDescriptor, base_font: &str) -> Result<u32> {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("FontDescriptor".to_string()));
        if !base_font.is_empty() {
            dict.insert("FontName".to_string(), Object::Name(base_font.to_string()));
        }
        if let Some(bbox) = descriptor.font_bbox {
            dict.insert("FontBBox".to_string(), bbox.to_object());
        }
        if let Some(flags) = descriptor.flags {
            dict.insert("Flags".to_string(), Object::Integer(flags));
        }
        if let Some(ascent) = descriptor.ascent {
            dict.insert("Ascent".to_string(), Object::Real(ascent));
        }
        if let Some(descent) = descriptor.descent {
            dict.insert("Descent".to_string(), Object::Real(descent));
        }
        if let Some(angle) = descriptor.italic_angle {
            dict.insert("ItalicAngle".to_string(), Object::Real(angle));
        }
        if let Some(stem_v) = descriptor.stem_v {
            dict.insert("StemV".to_string(), Object::Real(stem_v));
        }

        if let Some((kind, bytes)) = &descriptor.font_file {
            let key = match kind {
                FontFileKind::FontFile => "FontFile",
                FontFileKind::FontFile2 => "FontFile2",
                FontFileKind::FontFile3 => "FontFile3",
            };
            let mut stream_dict = Dict::new();
            if *kind == FontFileKind::FontFile3 {
                stream_dict.insert("Subtype".to_string(), Object::Name("Type1C".to_string()));
            }
            let stream = self.prepare_stream(stream_dict, bytes.clone());
            let id = self.add(stream);
            dict.insert(key.to_string(), Self::reference(id));
        }

        Ok(self.add(Object::Dictionary(dict)))
    }

    fn encoding_object(&mut self, encoding: &FontEncoding) -> Option<Object> {
        match encoding {
            FontEncoding::Default => None,
            FontEncoding::Named(name) => Some(Object::Name(name.clone())),
            FontEncoding::Differences {
                base,
                differences,
            } => {
                let mut dict = Dict::new();
                dict.insert("Type".to_string(), Object::Name("Encoding".to_string()));
                if let Some(base) = base {
                    dict.insert("BaseEncoding".to_string(), Object::Name(base.clone()));
                }
                if !differences.is_empty() {
                    let mut array = Vec::new();
                    let mut previous_code: Option<u32> = None;
                    for (code, glyph) in differences {
                        if previous_code != Some(code.wrapping_sub(1)) {
                            array.push(Object::Integer(*code as i64));
                        }
                        array.push(Object::Name(glyph.clone()));
                        previous_code = Some(*code);
                    }
                    dict.insert("Differences".to_string(), Object::Array(array));
                }
                Some(Object::Dictionary(dict))
            },
        }
    }

    // ------------------------------------------------------------------
    // Outlines
    // ------------------------------------------------------------------

    fn build_outlines(&mut self, outlines: &[OutlineItem]) -> Option<u32> {
        if outlines.is_empty() {
            return None;
        }
        let root_id = self.alloc();
        let (first, last, count) = self.build_outline_level(outlines, root_id);

        let mut root = Dict::new();
        root.insert("Type".to_string(), Object::Name("Outlines".to_string()));
        if let (Some(first), Some(last)) = (first, last) {
            root.insert("First".to_string(), Self::reference(first));
            root.insert("Last".to_string(), Self::reference(last));
        }
        root.insert("Count".to_string(), Object::Integer(count));
        self.set(root_id, Object::Dictionary(root));
        Some(root_id)
    }

    fn build_outline_level(
        &mut self,
        items: &[OutlineItem],
        parent_id: u32,
    ) -> (Option<u32>, Option<u32>, i64) {
        // Canonical child order in deterministic mode
        let mut order: Vec<&OutlineItem> = items.iter().collect();
        if self.config.deterministic {
            order.sort_by(|a, b| a.title.cmp(&b.title));
        }

        let ids: Vec<u32> = order.iter().map(|_| self.alloc()).collect();
        let mut total = ids.len() as i64;

        for (index, item) in order.iter().enumerate() {
            let id = ids[index];
            let mut dict = Dict::new();
            dict.insert("Title".to_string(), Object::String(item.title.clone()));
            dict.insert("Parent".to_string(), Self::reference(parent_id));
            if index > 0 {
                dict.insert("Prev".to_string(), Self::reference(ids[index - 1]));
            }
            if index + 1 < ids.len() {
                dict.insert("Next".to_string(), Self::reference(ids[index + 1]));
            }
            if let Some(destination) = &item.destination {
                let ingested = self.ingest(destination);
                if !ingested.is_null() {
                    dict.insert("Dest".to_string(), ingested);
                }
            }
            if !item.children.is_empty() {
                let (first, last, count) = self.build_outline_level(&item.children, id);
                if let (Some(first), Some(last)) = (first, last) {
                    dict.insert("First".to_string(), Self::reference(first));
                    dict.insert("Last".to_string(), Self::reference(last));
                }
                dict.insert("Count".to_string(), Object::Integer(count));
                total += count;
            }
            self.set(id, Object::Dictionary(dict));
        }

        (ids.first().copied(), ids.last().copied(), total)
    }

    // ------------------------------------------------------------------
    // Value ingestion
    // ------------------------------------------------------------------

    /// Bring a semantic-origin value into the new object graph: page
    /// references retarget to the rebuilt pages, any other leftover
    /// reference resolves to Null, and nested streams hoist into their
    /// own indirect objects (streams are always indirect in PDF).
    fn ingest(&mut self, obj: &Object) -> Object {
        match obj {
            Object::Reference(r) => match self.page_map.get(r) {
                Some(&page_id) => Self::reference(page_id),
                None => Object::Null,
            },
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.ingest(item)).collect())
            },
            Object::Dictionary(dict) => Object::Dictionary(self.ingest_dict(dict)),
            Object::Stream { dict, data } => {
                let ingested = self.ingest_dict(dict);
                let id = self.add(Object::Stream {
                    dict: ingested,
                    data: data.clone(),
                });
                Self::reference(id)
            },
            other => other.clone(),
        }
    }

    fn ingest_dict(&mut self, dict: &Dict) -> Dict {
        let mut out = Dict::with_capacity(dict.len());
        for (key, value) in dict {
            // Stale /Length values would fight the serializer's own
            if key == "Length" {
                continue;
            }
            out.insert(key.clone(), self.ingest(value));
        }
        out
    }

    /// Wrap stream bytes, Flate-compressing when it pays.
    ///
    /// Streams that already carry a /Filter and /Metadata streams are
    /// stored as given.
    fn prepare_stream(&mut self, dict: Dict, data: Vec<u8>) -> Object {
        let already_filtered = dict.contains_key("Filter");
        let is_metadata = dict.get("Type").and_then(|o| o.as_name()) == Some("Metadata");

        if self.config.compression > 0
            && !already_filtered
            && !is_metadata
            && data.len() >= MIN_COMPRESS_LEN
        {
            let encoded = encode_flate(&data, self.config.compression);
            if encoded.len() < data.len() {
                let mut dict = dict;
                dict.insert("Filter".to_string(), Object::Name("FlateDecode".to_string()));
                return Object::Stream {
                    dict,
                    data: bytes::Bytes::from(encoded),
                };
            }
        }

        Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn emit(&mut self, cancel: &CancelToken) -> Result<Vec<u8>> {
        if self.root_id == 0 {
            return Err(Error::Malformed {
                entity: "Writer".to_string(),
                field: "Root".to_string(),
            });
        }

        if self.config.object_streams_enabled() {
            self.emit_with_object_streams(cancel)
        } else {
            self.emit_classic(cancel)
        }
    }

    fn serializer(&self) -> ObjectSerializer {
        if self.config.deterministic {
            ObjectSerializer::deterministic()
        } else {
            ObjectSerializer::new()
        }
    }

    fn header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        writeln!(out, "%PDF-{}", self.config.version).unwrap();
        // Binary marker so transfer tools treat the file as binary
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        out
    }

    fn trailer_dict(&self, size: u32) -> Dict {
        let mut trailer = Dict::new();
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("Root".to_string(), Self::reference(self.root_id));
        if let Some(info_id) = self.info_id {
            trailer.insert("Info".to_string(), Self::reference(info_id));
        }
        trailer
    }

    /// Classic layout: bodies, an ASCII xref table, `trailer`.
    fn emit_classic(&mut self, cancel: &CancelToken) -> Result<Vec<u8>> {
        let serializer = self.serializer();
        let mut out = self.header();
        let mut offsets: Vec<usize> = Vec::with_capacity(self.objects.len());

        for (index, obj) in self.objects.iter().enumerate() {
            cancel.check()?;
            offsets.push(out.len());
            out.extend_from_slice(&serializer.serialize_indirect(index as u32 + 1, 0, obj));
        }

        let xref_start = out.len();
        writeln!(out, "xref")?;
        writeln!(out, "0 {}", self.objects.len() + 1)?;
        writeln!(out, "0000000000 65535 f ")?;
        for offset in &offsets {
            writeln!(out, "{:010} 00000 n ", offset)?;
        }

        let trailer = self.trailer_dict(self.objects.len() as u32 + 1);
        writeln!(out, "trailer")?;
        out.extend_from_slice(&serializer.serialize(&Object::Dictionary(trailer)));
        writeln!(out)?;
        writeln!(out, "startxref")?;
        writeln!(out, "{}", xref_start)?;
        write!(out, "%%EOF")?;

        Ok(out)
    }

    /// Modern layout: eligible objects packed into one /ObjStm, stream
    /// objects written directly, and a /Type /XRef stream as the trailer.
    fn emit_with_object_streams(&mut self, cancel: &CancelToken) -> Result<Vec<u8>> {
        let serializer = self.serializer();
        let total = self.objects.len() as u32;
        let objstm_id = total + 1;
        let xref_stream_id = total + 2;

        // Streams must stay outside; the catalog root stays addressable
        // without unpacking a container
        let mut packed: Vec<u32> = Vec::new();
        for (index, obj) in self.objects.iter().enumerate() {
            let id = index as u32 + 1;
            if id != self.root_id && !matches!(obj, Object::Stream { .. }) {
                packed.push(id);
            }
        }

        // ObjStm payload: header pairs then the bodies
        let mut pairs = Vec::new();
        let mut bodies = Vec::new();
        for &id in &packed {
            write!(pairs, "{} {} ", id, bodies.len())?;
            bodies.extend_from_slice(&serializer.serialize(&self.objects[id as usize - 1]));
            bodies.push(b'\n');
        }
        let first = pairs.len();
        let mut payload = pairs;
        payload.extend_from_slice(&bodies);

        let mut objstm_dict = Dict::new();
        objstm_dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        objstm_dict.insert("N".to_string(), Object::Integer(packed.len() as i64));
        objstm_dict.insert("First".to_string(), Object::Integer(first as i64));
        let objstm = self.prepare_stream(objstm_dict, payload);

        // Lay out the file: direct objects, then the ObjStm
        let mut out = self.header();
        let mut offsets: HashMap<u32, usize> = HashMap::new();
        for (index, obj) in self.objects.iter().enumerate() {
            cancel.check()?;
            let id = index as u32 + 1;
            if packed.contains(&id) {
                continue;
            }
            offsets.insert(id, out.len());
            out.extend_from_slice(&serializer.serialize_indirect(id, 0, obj));
        }
        offsets.insert(objstm_id, out.len());
        out.extend_from_slice(&serializer.serialize_indirect(objstm_id, 0, &objstm));

        // Xref stream: W [1 4 2], entries for 0..=xref_stream_id
        let xref_start = out.len();
        let size = xref_stream_id + 1;
        let mut entries: Vec<u8> = Vec::with_capacity(size as usize * 7);
        // Entry 0: free-list head
        entries.push(0);
        entries.extend_from_slice(&0u32.to_be_bytes());
        entries.extend_from_slice(&0xFFFFu16.to_be_bytes());
        for id in 1..=xref_stream_id {
            if let Some(position) = packed.iter().position(|&p| p == id) {
                entries.push(2);
                entries.extend_from_slice(&objstm_id.to_be_bytes());
                entries.extend_from_slice(&(position as u16).to_be_bytes());
            } else {
                let offset = if id == xref_stream_id {
                    xref_start
                } else {
                    offsets[&id]
                };
                entries.push(1);
                entries.extend_from_slice(&(offset as u32).to_be_bytes());
                entries.extend_from_slice(&0u16.to_be_bytes());
            }
        }

        let mut xref_dict = self.trailer_dict(size);
        xref_dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        xref_dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(4),
                Object::Integer(2),
            ]),
        );
        xref_dict.insert(
            "Index".to_string(),
            Object::Array(vec![Object::Integer(0), Object::Integer(size as i64)]),
        );
        let xref_stream = self.prepare_stream(xref_dict, entries);
        out.extend_from_slice(&serializer.serialize_indirect(xref_stream_id, 0, &xref_stream));

        writeln!(out, "startxref")?;
        writeln!(out, "{}", xref_start)?;
        write!(out, "%%EOF")?;

        Ok(out)
    }
}

fn subtype_name(subtype: FontSubtype) -> &'static str {
    match subtype {
        FontSubtype::Type0 => "Type0",
        FontSubtype::Type1 => "Type1",
        FontSubtype::Type3 => "Type3",
        FontSubtype::TrueType => "TrueType",
        FontSubtype::CIDFontType0 => "CIDFontType0",
        FontSubtype::CIDFontType2 => "CIDFontType2",
        FontSubtype::Unknown => "Type1",
    }
}

/// Degree-1 exponential function standing in for a lost tint transform.
fn identity_tint_transform(inputs: usize) -> Object {
    let mut dict = Dict::new();
    dict.insert("FunctionType".to_string(), Object::Integer(2));
    dict.insert(
        "Domain".to_string(),
        Object::Array(
            (0..inputs)
                .flat_map(|_| [Object::Integer(0), Object::Integer(1)])
                .collect(),
        ),
    );
    dict.insert("C0".to_string(), Object::Array(vec![Object::Integer(0)]));
    dict.insert("C1".to_string(), Object::Array(vec![Object::Integer(1)]));
    dict.insert("N".to_string(), Object::Integer(1));
    Object::Dictionary(dict)
}

/// Generate a ToUnicode CMap mapping 2-byte codes to their runes.
fn generate_to_unicode_cmap(map: &HashMap<u32, Vec<char>>) -> String {
    let mut cmap = String::new();
    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo <<\n");
    cmap.push_str("  /Registry (Adobe)\n");
    cmap.push_str("  /Ordering (UCS)\n");
    cmap.push_str("  /Supplement 0\n");
    cmap.push_str(">> def\n");
    cmap.push_str("/CMapName /Adobe-Identity-UCS def\n");
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    let mut mappings: Vec<(&u32, &Vec<char>)> = map.iter().collect();
    mappings.sort_by_key(|(code, _)| **code);

    // At most 100 mappings per section
    for chunk in mappings.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (code, runes) in chunk {
            let mut dst = String::new();
            for rune in runes.iter() {
                let mut buf = [0u16; 2];
                for unit in rune.encode_utf16(&mut buf) {
                    dst.push_str(&format!("{:04X}", unit));
                }
            }
            cmap.push_str(&format!("<{:04X}> <{}>\n", code, dst));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\nend\n");
    cmap
}
