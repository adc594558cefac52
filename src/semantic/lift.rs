//! Semantic lift: raw object graph to typed document tree.
//!
//! The lift traverses catalog, page tree, resources and fonts, resolving
//! indirect references as it goes. It never panics on bad input: a missing
//! required key is reported through the recovery policy as
//! `Malformed(entity, field)` and, unless the policy says Fail, replaced
//! by a default or `Unknown` variant. Inheritance of MediaBox, Resources
//! and Rotate flows down the page tree to each leaf.

use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::HashSet;

use crate::cancel::CancelToken;
use crate::document::RawDocument;
use crate::error::{Error, Result};
use crate::fonts::to_unicode::parse_to_unicode;
use crate::object::{Dict, Object, ObjectRef};
use crate::recovery::{Action, FaultSite, RecoveryPolicy};
use crate::semantic::font::{
    CidSystemInfo, CidToGid, Font, FontDescriptor, FontEncoding, FontFileKind, FontSubtype,
};
use crate::semantic::page::{
    Annotation, ColorSpace, Page, Rect, Resources, XObject, XObjectKind, normalize_rotation,
};
use crate::semantic::{OutlineItem, OutputIntent, SemanticDocument};

/// Bound on page-tree depth; deeper trees are cyclic or hostile.
const MAX_TREE_DEPTH: usize = 64;

/// Bound on outline items, against self-referencing sibling chains.
const MAX_OUTLINE_ITEMS: usize = 100_000;

/// Lift a raw document into the semantic model.
pub fn lift_document(
    raw: &RawDocument,
    policy: &dyn RecoveryPolicy,
    cancel: &CancelToken,
) -> Result<SemanticDocument> {
    Lifter {
        raw,
        policy,
        cancel,
    }
    .lift()
}

struct Lifter<'a> {
    raw: &'a RawDocument,
    policy: &'a dyn RecoveryPolicy,
    cancel: &'a CancelToken,
}

impl<'a> Lifter<'a> {
    fn lift(&self) -> Result<SemanticDocument> {
        let mut doc = SemanticDocument {
            version: self.raw.version.clone(),
            encrypted: self.raw.encrypted,
            ..Default::default()
        };

        if self.raw.encrypted {
            doc.permissions = self
                .raw
                .trailer
                .get("Encrypt")
                .and_then(|o| self.raw.resolve(o).ok())
                .and_then(|o| o.as_dict())
                .and_then(|d| d.get("P"))
                .and_then(|o| o.as_integer())
                .unwrap_or(-1);
        }

        if let Some(info) = self
            .raw
            .trailer
            .get("Info")
            .and_then(|o| self.raw.resolve(o).ok())
            .and_then(|o| o.as_dict())
        {
            doc.info = info.clone();
        }

        let catalog = match self.raw.catalog() {
            Ok(catalog) => catalog.clone(),
            Err(e) => {
                // A broken catalog still leaves trailer-level state usable
                self.report(e, None)?;
                return Ok(doc);
            },
        };

        self.lift_catalog_extras(&catalog, &mut doc);

        match self.resolve_entry(&catalog, "Pages") {
            Some(Object::Dictionary(pages_root)) => {
                let pages_root = pages_root.clone();
                let mut visited = HashSet::new();
                self.walk_page_tree(&pages_root, Inherited::default(), 0, &mut visited, &mut doc.pages)?;
            },
            _ => {
                self.report(malformed("Catalog", "Pages"), None)?;
            },
        }

        Ok(doc)
    }

    /// Document-level structures hanging off the catalog.
    fn lift_catalog_extras(&self, catalog: &Dict, doc: &mut SemanticDocument) {
        if let Some(Object::Dictionary(d)) = self.resolve_entry(catalog, "AcroForm") {
            doc.acro_form = Some(self.embedded_dict(&d.clone()));
        }
        if let Some(Object::Dictionary(d)) = self.resolve_entry(catalog, "StructTreeRoot") {
            doc.structure_tree = Some(self.embedded_dict(&d.clone()));
        }
        if let Some(Object::Dictionary(d)) = self.resolve_entry(catalog, "DPartRoot") {
            doc.dpart_root = Some(self.embedded_dict(&d.clone()));
        }

        if let Some(metadata) = self.resolve_entry(catalog, "Metadata") {
            if matches!(metadata, Object::Stream { .. }) {
                match metadata.decode_stream_data() {
                    Ok(bytes) => doc.xmp_metadata = Some(bytes),
                    Err(e) => {
                        log::warn!("XMP metadata stream undecodable: {}", e);
                    },
                }
            }
        }

        if let Some(Object::Array(intents)) = self.resolve_entry(catalog, "OutputIntents") {
            let intents = intents.clone();
            for intent in &intents {
                if let Some(Object::Dictionary(d)) = self.resolve_opt(intent) {
                    let subtype = d
                        .get("S")
                        .and_then(|o| o.as_name())
                        .unwrap_or("")
                        .to_string();
                    doc.output_intents.push(OutputIntent {
                        subtype,
                        dict: self.embedded_dict(&d.clone()),
                    });
                }
            }
        }

        if let Some(Object::Dictionary(outlines)) = self.resolve_entry(catalog, "Outlines") {
            let outlines = outlines.clone();
            let mut budget = MAX_OUTLINE_ITEMS;
            let mut visited = HashSet::new();
            doc.outlines = self.walk_outline_siblings(&outlines, &mut visited, &mut budget, 0);
        }

        if let Some(Object::Dictionary(labels)) = self.resolve_entry(catalog, "PageLabels") {
            let labels = labels.clone();
            self.collect_number_tree(&labels, &mut doc.page_labels, 0);
        }

        doc.javascript = self.lift_javascript_names(catalog);
    }

    /// /Names /JavaScript name tree: (name, script bytes) pairs.
    fn lift_javascript_names(&self, catalog: &Dict) -> Vec<(String, Vec<u8>)> {
        let mut scripts = Vec::new();

        let Some(Object::Dictionary(names)) = self.resolve_entry(catalog, "Names") else {
            return scripts;
        };
        let names = names.clone();
        let Some(Object::Dictionary(js_tree)) = self.resolve_entry(&names, "JavaScript") else {
            return scripts;
        };
        let js_tree = js_tree.clone();

        let mut leaves: Vec<(i64, Dict)> = Vec::new();
        self.collect_name_tree(&js_tree, &mut scripts, &mut leaves, 0);
        scripts
    }

    fn collect_name_tree(
        &self,
        node: &Dict,
        scripts: &mut Vec<(String, Vec<u8>)>,
        _leaves: &mut Vec<(i64, Dict)>,
        depth: usize,
    ) {
        if depth > MAX_TREE_DEPTH {
            return;
        }

        if let Some(Object::Array(pairs)) = self.resolve_entry(node, "Names") {
            let pairs = pairs.clone();
            for pair in pairs.chunks(2) {
                if pair.len() != 2 {
                    continue;
                }
                let Some(name) = pair[0].as_string() else {
                    continue;
                };
                let name = String::from_utf8_lossy(name).to_string();
                if let Some(action) = self.resolve_opt(&pair[1]).and_then(|o| o.as_dict()) {
                    if let Some(js) = action.get("JS") {
                        match self.resolve_opt(js) {
                            Some(Object::String(s)) => scripts.push((name, s.clone())),
                            Some(obj @ Object::Stream { .. }) => {
                                if let Ok(bytes) = obj.decode_stream_data() {
                                    scripts.push((name, bytes));
                                }
                            },
                            _ => {},
                        }
                    }
                }
            }
        }

        if let Some(Object::Array(kids)) = self.resolve_entry(node, "Kids") {
            let kids = kids.clone();
            for kid in &kids {
                if let Some(Object::Dictionary(kid_dict)) = self.resolve_opt(kid) {
                    let kid_dict = kid_dict.clone();
                    self.collect_name_tree(&kid_dict, scripts, _leaves, depth + 1);
                }
            }
        }
    }

    /// /PageLabels number tree: flattened /Nums leaves.
    fn collect_number_tree(&self, node: &Dict, out: &mut Vec<(i64, Dict)>, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            return;
        }

        if let Some(Object::Array(nums)) = self.resolve_entry(node, "Nums") {
            let nums = nums.clone();
            for pair in nums.chunks(2) {
                if pair.len() != 2 {
                    continue;
                }
                let Some(index) = pair[0].as_integer() else {
                    continue;
                };
                if let Some(Object::Dictionary(label)) = self.resolve_opt(&pair[1]) {
                    out.push((index, self.embedded_dict(&label.clone())));
                }
            }
        }

        if let Some(Object::Array(kids)) = self.resolve_entry(node, "Kids") {
            let kids = kids.clone();
            for kid in &kids {
                if let Some(Object::Dictionary(kid_dict)) = self.resolve_opt(kid) {
                    let kid_dict = kid_dict.clone();
                    self.collect_number_tree(&kid_dict, out, depth + 1);
                }
            }
        }
    }

    fn walk_outline_siblings(
        &self,
        parent: &Dict,
        visited: &mut HashSet<ObjectRef>,
        budget: &mut usize,
        depth: usize,
    ) -> Vec<OutlineItem> {
        let mut items = Vec::new();
        if depth > MAX_TREE_DEPTH {
            return items;
        }

        let mut current = parent.get("First").cloned();
        while let Some(node_obj) = current {
            if *budget == 0 {
                break;
            }
            if let Some(r) = node_obj.as_reference() {
                if !visited.insert(r) {
                    log::warn!("outline sibling chain loops at {}", r);
                    break;
                }
            }
            let Some(Object::Dictionary(node)) = self.resolve_opt(&node_obj) else {
                break;
            };
            let node = node.clone();
            *budget -= 1;

            let title = node
                .get("Title")
                .and_then(|o| self.resolve_opt(o))
                .and_then(|o| o.as_string().map(|s| s.to_vec()))
                .unwrap_or_default();
            let destination = node.get("Dest").or_else(|| node.get("A")).cloned();
            let children = self.walk_outline_siblings(&node, visited, budget, depth + 1);

            items.push(OutlineItem {
                title,
                destination,
                children,
            });

            current = node.get("Next").cloned();
        }

        items
    }

    /// Page-tree DFS carrying inheritable attributes down to the leaves.
    fn walk_page_tree(
        &self,
        node: &Dict,
        inherited: Inherited,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        pages: &mut Vec<Page>,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            self.report(malformed("Pages", "Kids"), None)?;
            return Ok(());
        }

        let inherited = inherited.absorb(self, node);

        let kids = match self.resolve_entry(node, "Kids") {
            Some(Object::Array(kids)) => kids.clone(),
            _ => {
                self.report(malformed("Pages", "Kids"), None)?;
                return Ok(());
            },
        };

        for kid in &kids {
            self.cancel.check()?;
            let kid_ref = kid.as_reference();
            if let Some(r) = kid_ref {
                if !visited.insert(r) {
                    log::warn!("page tree revisits {}, skipping", r);
                    continue;
                }
            }
            let kid_dict = match self.resolve_opt(kid) {
                Some(Object::Dictionary(d)) => d.clone(),
                _ => {
                    self.report(malformed("Pages", "Kids"), kid_ref)?;
                    continue;
                },
            };

            match kid_dict.get("Type").and_then(|o| o.as_name()) {
                Some("Pages") => {
                    self.walk_page_tree(&kid_dict, inherited.clone(), depth + 1, visited, pages)?;
                },
                // Leaves without /Type are treated as pages
                _ => {
                    let page = self.lift_page(&kid_dict, &inherited, kid_ref)?;
                    pages.push(page);
                },
            }
        }

        Ok(())
    }

    fn lift_page(&self, dict: &Dict, inherited: &Inherited, page_ref: Option<ObjectRef>) -> Result<Page> {
        let mut page = Page {
            source_ref: page_ref,
            ..Default::default()
        };

        page.media_box = self
            .rect_entry(dict, "MediaBox")
            .or(inherited.media_box);
        if page.media_box.is_none() {
            self.report(malformed("Page", "MediaBox"), page_ref)?;
        }
        page.crop_box = self.rect_entry(dict, "CropBox").or(inherited.crop_box);

        let rotate = dict
            .get("Rotate")
            .and_then(|o| self.resolve_opt(o))
            .and_then(|o| o.as_integer())
            .or(inherited.rotation)
            .unwrap_or(0);
        page.rotation = normalize_rotation(rotate);

        let resources_dict = match self.resolve_entry(dict, "Resources") {
            Some(Object::Dictionary(d)) => Some(d.clone()),
            _ => inherited.resources.clone(),
        };
        if let Some(res) = resources_dict {
            page.resources = self.lift_resources(&res, page_ref)?;
        }

        // Contents: a single stream or an array of streams
        match self.resolve_entry(dict, "Contents") {
            Some(Object::Array(parts)) => {
                let parts = parts.clone();
                for part in &parts {
                    if let Some(bytes) = self.decode_content_stream(part, page_ref)? {
                        page.contents.push(bytes);
                    }
                }
            },
            Some(obj @ Object::Stream { .. }) => {
                let obj = obj.clone();
                if let Some(bytes) = self.decode_content_stream(&obj, page_ref)? {
                    page.contents.push(bytes);
                }
            },
            Some(_) => self.report(malformed("Page", "Contents"), page_ref)?,
            None => {},
        }

        if let Some(Object::Array(annots)) = self.resolve_entry(dict, "Annots") {
            let annots = annots.clone();
            for annot in &annots {
                if let Some(Object::Dictionary(d)) = self.resolve_opt(annot) {
                    let subtype = d
                        .get("Subtype")
                        .and_then(|o| o.as_name())
                        .unwrap_or("Unknown")
                        .to_string();
                    let rect = self.rect_entry(d, "Rect");
                    page.annotations.push(Annotation {
                        subtype,
                        rect,
                        dict: self.embedded_dict(&d.clone()),
                    });
                }
            }
        }

        Ok(page)
    }

    /// Decode one content stream. A filter fault goes through the policy:
    /// Warn/Fix falls back to the stored bytes, Skip drops the stream.
    fn decode_content_stream(
        &self,
        obj: &Object,
        page_ref: Option<ObjectRef>,
    ) -> Result<Option<Bytes>> {
        let resolved = match self.resolve_opt(obj) {
            Some(resolved) => resolved.clone(),
            None => {
                self.report(malformed("Page", "Contents"), page_ref)?;
                return Ok(None);
            },
        };
        match &resolved {
            Object::Stream { data, .. } => {
                // Without a decryptor the stored bytes are ciphertext;
                // running filters over them only manufactures garbage
                if self.raw.encrypted {
                    let e = Error::UnsupportedEncryption;
                    let site = FaultSite::component("filter");
                    return match self.policy.on_error(&e, &site) {
                        Action::Fail => Err(e),
                        Action::Skip => Ok(None),
                        Action::Warn | Action::Fix => Ok(Some(data.clone())),
                    };
                }
                match resolved.decode_stream_data() {
                    Ok(bytes) => Ok(Some(Bytes::from(bytes))),
                    Err(e) => {
                        let site = FaultSite::component("filter");
                        match self.policy.on_error(&e, &site) {
                            Action::Fail => Err(e),
                            Action::Skip => Ok(None),
                            Action::Warn | Action::Fix => Ok(Some(data.clone())),
                        }
                    },
                }
            },
            _ => {
                self.report(malformed("Page", "Contents"), page_ref)?;
                Ok(None)
            },
        }
    }

    fn lift_resources(&self, dict: &Dict, page_ref: Option<ObjectRef>) -> Result<Resources> {
        let mut resources = Resources::default();

        if let Some(Object::Dictionary(fonts)) = self.resolve_entry(dict, "Font") {
            let fonts = fonts.clone();
            for (name, font_obj) in &fonts {
                match self.resolve_opt(font_obj).and_then(|o| o.as_dict().cloned()) {
                    Some(font_dict) => {
                        let font = self.lift_font(&font_dict, 0)?;
                        resources.fonts.insert(name.clone(), font);
                    },
                    None => self.report(malformed("Font", name), page_ref)?,
                }
            }
        }

        if let Some(Object::Dictionary(xobjects)) = self.resolve_entry(dict, "XObject") {
            let xobjects = xobjects.clone();
            for (name, obj) in &xobjects {
                if let Some(Object::Stream { dict, data }) = self.resolve_opt(obj) {
                    let kind = match dict.get("Subtype").and_then(|o| o.as_name()) {
                        Some("Image") => XObjectKind::Image,
                        Some("Form") => XObjectKind::Form,
                        _ => XObjectKind::Unknown,
                    };
                    resources.xobjects.insert(
                        name.clone(),
                        XObject {
                            kind,
                            dict: self.embedded_dict(&dict.clone()),
                            data: data.clone(),
                        },
                    );
                }
            }
        }

        if let Some(Object::Dictionary(patterns)) = self.resolve_entry(dict, "Pattern") {
            let patterns = patterns.clone();
            for (name, obj) in &patterns {
                if let Some(resolved) = self.resolve_opt(obj) {
                    let embedded = self.deep_embed(&resolved.clone(), 0, &mut Vec::new());
                    resources.patterns.insert(name.clone(), embedded);
                }
            }
        }

        if let Some(Object::Dictionary(shadings)) = self.resolve_entry(dict, "Shading") {
            let shadings = shadings.clone();
            for (name, obj) in &shadings {
                if let Some(resolved) = self.resolve_opt(obj) {
                    let embedded = self.deep_embed(&resolved.clone(), 0, &mut Vec::new());
                    resources.shadings.insert(name.clone(), embedded);
                }
            }
        }

        if let Some(Object::Dictionary(states)) = self.resolve_entry(dict, "ExtGState") {
            let states = states.clone();
            for (name, obj) in &states {
                if let Some(Object::Dictionary(d)) = self.resolve_opt(obj) {
                    resources.ext_g_states.insert(name.clone(), self.embedded_dict(&d.clone()));
                }
            }
        }

        if let Some(Object::Dictionary(spaces)) = self.resolve_entry(dict, "ColorSpace") {
            let spaces = spaces.clone();
            for (name, obj) in &spaces {
                let space = self.lift_color_space(obj, 0);
                resources.color_spaces.insert(name.clone(), space);
            }
        }

        if let Some(Object::Dictionary(properties)) = self.resolve_entry(dict, "Properties") {
            let properties = properties.clone();
            for (name, obj) in &properties {
                if let Some(Object::Dictionary(d)) = self.resolve_opt(obj) {
                    resources.properties.insert(name.clone(), self.embedded_dict(&d.clone()));
                }
            }
        }

        Ok(resources)
    }

    fn lift_color_space(&self, obj: &Object, depth: usize) -> ColorSpace {
        if depth > 8 {
            return ColorSpace::Unknown("nested too deep".to_string());
        }
        let Some(resolved) = self.resolve_opt(obj) else {
            return ColorSpace::Unknown("unresolvable".to_string());
        };

        match resolved {
            Object::Name(name) => match name.as_str() {
                "DeviceGray" | "DeviceRGB" | "DeviceCMYK" => ColorSpace::Device(name.clone()),
                "Pattern" => ColorSpace::Pattern,
                other => ColorSpace::Unknown(other.to_string()),
            },
            Object::Array(parts) => {
                let parts = parts.clone();
                let family = parts.first().and_then(|o| o.as_name()).unwrap_or("");
                match family {
                    "ICCBased" => {
                        let stream = parts.get(1).and_then(|o| self.resolve_opt(o));
                        let components = stream
                            .and_then(|o| o.as_dict())
                            .and_then(|d| d.get("N").and_then(|o| o.as_integer()))
                            .unwrap_or(3);
                        let profile = stream
                            .filter(|o| matches!(o, Object::Stream { .. }))
                            .and_then(|o| o.decode_stream_data().ok())
                            .unwrap_or_default();
                        ColorSpace::ICCBased {
                            components,
                            profile,
                        }
                    },
                    "Indexed" => {
                        let base = parts
                            .get(1)
                            .map(|o| Box::new(self.lift_color_space(o, depth + 1)))
                            .unwrap_or_else(|| {
                                Box::new(ColorSpace::Device("DeviceRGB".to_string()))
                            });
                        let hival = parts.get(2).and_then(|o| o.as_integer()).unwrap_or(0);
                        let lookup = match parts.get(3).and_then(|o| self.resolve_opt(o)) {
                            Some(Object::String(s)) => s.clone(),
                            Some(obj @ Object::Stream { .. }) => {
                                obj.decode_stream_data().unwrap_or_default()
                            },
                            _ => Vec::new(),
                        };
                        ColorSpace::Indexed {
                            base,
                            hival,
                            lookup,
                        }
                    },
                    "Separation" => {
                        let name = parts
                            .get(1)
                            .and_then(|o| o.as_name())
                            .unwrap_or("All")
                            .to_string();
                        ColorSpace::Separation { name }
                    },
                    "DeviceN" => {
                        let names = parts
                            .get(1)
                            .and_then(|o| self.resolve_opt(o))
                            .and_then(|o| o.as_array().cloned())
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|o| o.as_name().map(str::to_string))
                                    .collect()
                            })
                            .unwrap_or_default();
                        ColorSpace::DeviceN { names }
                    },
                    "Pattern" => ColorSpace::Pattern,
                    "CalGray" | "CalRGB" | "Lab" => ColorSpace::Device(family.to_string()),
                    other => ColorSpace::Unknown(other.to_string()),
                }
            },
            _ => ColorSpace::Unknown(resolved.type_name().to_string()),
        }
    }

    fn lift_font(&self, dict: &Dict, depth: usize) -> Result<Font> {
        let mut font = Font::default();
        if depth > 2 {
            return Ok(font);
        }

        font.subtype = dict
            .get("Subtype")
            .and_then(|o| o.as_name())
            .map(FontSubtype::from_name)
            .unwrap_or(FontSubtype::Unknown);
        font.base_font = dict
            .get("BaseFont")
            .and_then(|o| o.as_name())
            .unwrap_or("")
            .to_string();
        if font.base_font.is_empty() && font.subtype != FontSubtype::Type3 {
            self.report(malformed("Font", "BaseFont"), None)?;
        }

        font.encoding = match dict.get("Encoding").and_then(|o| self.resolve_opt(o)) {
            Some(Object::Name(name)) => FontEncoding::Named(name.clone()),
            Some(Object::Dictionary(enc)) => {
                let base = enc
                    .get("BaseEncoding")
                    .and_then(|o| o.as_name())
                    .map(str::to_string);
                let mut differences = Vec::new();
                if let Some(Object::Array(diff)) = enc.get("Differences") {
                    let mut code = 0u32;
                    for item in diff {
                        match item {
                            Object::Integer(i) => code = *i as u32,
                            Object::Name(glyph) => {
                                differences.push((code, glyph.clone()));
                                code += 1;
                            },
                            _ => {},
                        }
                    }
                }
                FontEncoding::Differences {
                    base,
                    differences,
                }
            },
            _ => FontEncoding::Default,
        };

        if let Some(obj) = self.resolve_entry(dict, "ToUnicode") {
            if matches!(obj, Object::Stream { .. }) {
                match obj.decode_stream_data() {
                    Ok(bytes) => font.to_unicode = Some(parse_to_unicode(&bytes)),
                    Err(e) => log::warn!("ToUnicode stream undecodable: {}", e),
                }
            }
        }

        font.widths = dict.get("Widths").or_else(|| dict.get("W")).cloned();
        font.first_char = dict.get("FirstChar").and_then(|o| o.as_integer());
        font.last_char = dict.get("LastChar").and_then(|o| o.as_integer());

        if let Some(Object::Dictionary(desc)) = self.resolve_entry(dict, "FontDescriptor") {
            let desc = desc.clone();
            font.descriptor = Some(self.lift_descriptor(&desc)?);
        }

        match font.subtype {
            FontSubtype::Type0 => {
                let descendant = self
                    .resolve_entry(dict, "DescendantFonts")
                    .and_then(|o| o.as_array().cloned())
                    .and_then(|arr| arr.first().cloned())
                    .and_then(|o| self.resolve_opt(&o).and_then(|r| r.as_dict().cloned()));
                match descendant {
                    Some(descendant_dict) => {
                        let lifted = self.lift_font(&descendant_dict, depth + 1)?;
                        font.cid_system_info = lifted.cid_system_info.clone();
                        font.descendant = Some(Box::new(lifted));
                    },
                    None => self.report(malformed("Type0", "DescendantFonts"), None)?,
                }
            },
            FontSubtype::CIDFontType0 | FontSubtype::CIDFontType2 => {
                if let Some(Object::Dictionary(info)) = self.resolve_entry(dict, "CIDSystemInfo") {
                    font.cid_system_info = Some(CidSystemInfo {
                        registry: info
                            .get("Registry")
                            .and_then(|o| o.as_string())
                            .map(|s| String::from_utf8_lossy(s).to_string())
                            .unwrap_or_default(),
                        ordering: info
                            .get("Ordering")
                            .and_then(|o| o.as_string())
                            .map(|s| String::from_utf8_lossy(s).to_string())
                            .unwrap_or_default(),
                        supplement: info
                            .get("Supplement")
                            .and_then(|o| o.as_integer())
                            .unwrap_or(0),
                    });
                }
                font.cid_to_gid = match self.resolve_entry(dict, "CIDToGIDMap") {
                    Some(Object::Name(n)) if n == "Identity" => Some(CidToGid::Identity),
                    Some(obj @ Object::Stream { .. }) => {
                        obj.decode_stream_data().ok().map(CidToGid::Map)
                    },
                    None => Some(CidToGid::Identity),
                    _ => None,
                };
            },
            FontSubtype::Type3 => {
                if let Some(Object::Array(matrix)) = self.resolve_entry(dict, "FontMatrix") {
                    let values: Vec<f64> = matrix.iter().filter_map(|o| o.as_number()).collect();
                    if values.len() == 6 {
                        font.font_matrix =
                            Some([values[0], values[1], values[2], values[3], values[4], values[5]]);
                    }
                }
                if let Some(Object::Dictionary(procs)) = self.resolve_entry(dict, "CharProcs") {
                    let procs = procs.clone();
                    let mut char_procs = IndexMap::new();
                    for (glyph, proc_obj) in &procs {
                        if let Some(obj @ Object::Stream { .. }) = self.resolve_opt(proc_obj) {
                            if let Ok(bytes) = obj.decode_stream_data() {
                                char_procs.insert(glyph.clone(), bytes);
                            }
                        }
                    }
                    font.char_procs = char_procs;
                } else {
                    self.report(malformed("Type3", "CharProcs"), None)?;
                }
            },
            _ => {},
        }

        Ok(font)
    }

    fn lift_descriptor(&self, desc: &Dict) -> Result<FontDescriptor> {
        let mut descriptor = FontDescriptor {
            font_bbox: self.rect_entry(desc, "FontBBox"),
            ascent: desc.get("Ascent").and_then(|o| o.as_number()),
            descent: desc.get("Descent").and_then(|o| o.as_number()),
            italic_angle: desc.get("ItalicAngle").and_then(|o| o.as_number()),
            stem_v: desc.get("StemV").and_then(|o| o.as_number()),
            flags: desc.get("Flags").and_then(|o| o.as_integer()),
            font_file: None,
        };

        let candidates = [
            ("FontFile", FontFileKind::FontFile),
            ("FontFile2", FontFileKind::FontFile2),
            ("FontFile3", FontFileKind::FontFile3),
        ];
        for (key, kind) in candidates {
            if let Some(obj) = self.resolve_entry(desc, key) {
                if matches!(obj, Object::Stream { .. }) {
                    match obj.decode_stream_data() {
                        Ok(bytes) => {
                            descriptor.font_file = Some((kind, bytes));
                            break;
                        },
                        Err(e) => {
                            let site = FaultSite::component("filter");
                            match self.policy.on_error(&e, &site) {
                                Action::Fail => return Err(e),
                                _ => {},
                            }
                        },
                    }
                }
            }
        }

        Ok(descriptor)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Flatten a kept-raw object: indirect references resolve into direct
    /// values so the semantic tree never carries the source document's
    /// object numbering. Cycles resolve to Null; structural back-pointers
    /// (/Parent, /P and sibling links) are dropped instead of flattened,
    /// since inlining them would duplicate whole subtrees.
    fn deep_embed(&self, obj: &Object, depth: usize, chain: &mut Vec<ObjectRef>) -> Object {
        if depth > 16 {
            return Object::Null;
        }
        match obj {
            Object::Reference(r) => {
                if chain.contains(r) {
                    return Object::Null;
                }
                match self.raw.get(*r) {
                    Some(target) => {
                        // Page references stay symbolic; the writer
                        // retargets them to the rebuilt page objects
                        let is_page_node = target
                            .as_dict()
                            .and_then(|d| d.get("Type"))
                            .and_then(|t| t.as_name())
                            .is_some_and(|t| t == "Page" || t == "Pages");
                        if is_page_node {
                            return Object::Reference(*r);
                        }
                        chain.push(*r);
                        let embedded = self.deep_embed(target, depth + 1, chain);
                        chain.pop();
                        embedded
                    },
                    None => Object::Null,
                }
            },
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.deep_embed(item, depth + 1, chain))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.embed_dict(dict, depth, chain)),
            Object::Stream { dict, data } => Object::Stream {
                dict: self.embed_dict(dict, depth, chain),
                data: data.clone(),
            },
            other => other.clone(),
        }
    }

    fn embed_dict(&self, dict: &Dict, depth: usize, chain: &mut Vec<ObjectRef>) -> Dict {
        let mut out = Dict::with_capacity(dict.len());
        for (key, value) in dict {
            let back_pointer = matches!(value, Object::Reference(_))
                && matches!(
                    key.as_str(),
                    "Parent" | "P" | "Prev" | "Next" | "First" | "Last" | "Pg"
                );
            if back_pointer {
                continue;
            }
            out.insert(key.clone(), self.deep_embed(value, depth + 1, chain));
        }
        out
    }

    /// Flatten a dictionary the model keeps raw.
    fn embedded_dict(&self, dict: &Dict) -> Dict {
        self.embed_dict(dict, 0, &mut Vec::new())
    }

    /// Canonical lift-side policy consultation.
    fn report(&self, error: Error, object: Option<ObjectRef>) -> Result<()> {
        let mut site = FaultSite::component("lift");
        if let Some(r) = object {
            site = site.in_object(r);
        }
        match self.policy.on_error(&error, &site) {
            Action::Fail => Err(error),
            _ => Ok(()),
        }
    }

    fn resolve_opt<'b>(&'b self, obj: &'b Object) -> Option<&'b Object> {
        self.raw.resolve(obj).ok()
    }

    fn resolve_entry<'b>(&'b self, dict: &'b Dict, key: &str) -> Option<&'b Object> {
        dict.get(key).and_then(|o| self.resolve_opt(o))
    }

    fn rect_entry(&self, dict: &Dict, key: &str) -> Option<Rect> {
        match self.resolve_entry(dict, key) {
            Some(Object::Array(arr)) => Rect::from_array(arr),
            _ => None,
        }
    }
}

fn malformed(entity: &str, field: &str) -> Error {
    Error::Malformed {
        entity: entity.to_string(),
        field: field.to_string(),
    }
}

/// Attributes that flow down the page tree.
#[derive(Debug, Clone, Default)]
struct Inherited {
    media_box: Option<Rect>,
    crop_box: Option<Rect>,
    rotation: Option<i64>,
    resources: Option<Dict>,
}

impl Inherited {
    /// Pick up inheritable attributes present on this tree node.
    fn absorb(mut self, lifter: &Lifter<'_>, node: &Dict) -> Self {
        if let Some(rect) = lifter.rect_entry(node, "MediaBox") {
            self.media_box = Some(rect);
        }
        if let Some(rect) = lifter.rect_entry(node, "CropBox") {
            self.crop_box = Some(rect);
        }
        if let Some(rotate) = node
            .get("Rotate")
            .and_then(|o| lifter.resolve_opt(o))
            .and_then(|o| o.as_integer())
        {
            self.rotation = Some(rotate);
        }
        if let Some(Object::Dictionary(res)) = lifter.resolve_entry(node, "Resources") {
            self.resources = Some(res.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{LenientPolicy, StrictPolicy};

    fn parse_and_lift(pdf: &[u8]) -> SemanticDocument {
        let raw =
            RawDocument::parse(pdf.to_vec(), &StrictPolicy, &CancelToken::new()).unwrap();
        lift_document(&raw, &StrictPolicy, &CancelToken::new()).unwrap()
    }

    /// A 2-page PDF exercising inheritance: MediaBox and Resources sit on
    /// the Pages node; page 2 overrides rotation.
    fn two_page_pdf() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.6\n");
        let mut offsets = Vec::new();
        let bodies: Vec<String> = vec![
            "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".into(),
            "2 0 obj\n<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 \
             /MediaBox [0 0 595 842] /Rotate 90 \
             /Resources << /Font << /F1 5 0 R >> >> >>\nendobj\n"
                .into(),
            "3 0 obj\n<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>\nendobj\n".into(),
            "4 0 obj\n<< /Type /Page /Parent 2 0 R /Rotate -90 >>\nendobj\n".into(),
            "5 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>\nendobj\n".into(),
            "6 0 obj\n<< /Length 26 >>\nstream\nBT /F1 12 Tf (Hello) Tj ET\nendstream\nendobj\n"
                .into(),
        ];
        for body in &bodies {
            offsets.push(out.len());
            out.extend_from_slice(body.as_bytes());
        }
        let xref_start = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for off in &offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
                offsets.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_page_tree_inheritance() {
        let doc = parse_and_lift(&two_page_pdf());
        assert_eq!(doc.version, "1.6");
        assert_eq!(doc.pages.len(), 2);

        let page1 = &doc.pages[0];
        let media = page1.media_box.unwrap();
        assert_eq!(media.width(), 595.0);
        assert_eq!(page1.rotation, 90);
        assert!(page1.resources.fonts.contains_key("F1"));

        // Page 2 overrides rotation; -90 normalises to 270
        assert_eq!(doc.pages[1].rotation, 270);
        assert!(doc.pages[1].resources.fonts.contains_key("F1"));
    }

    #[test]
    fn test_content_stream_decoded() {
        let doc = parse_and_lift(&two_page_pdf());
        let contents = doc.pages[0].joined_contents();
        assert_eq!(contents, b"BT /F1 12 Tf (Hello) Tj ET");
        assert!(doc.pages[1].contents.is_empty());
    }

    #[test]
    fn test_font_lift() {
        let doc = parse_and_lift(&two_page_pdf());
        let font = &doc.pages[0].resources.fonts["F1"];
        assert_eq!(font.subtype, FontSubtype::Type1);
        assert_eq!(font.base_font, "Helvetica");
        assert_eq!(font.encoding, FontEncoding::Default);
    }

    #[test]
    fn test_color_space_variants() {
        let raw = RawDocument::default();
        let lifter = Lifter {
            raw: &raw,
            policy: &StrictPolicy,
            cancel: &CancelToken::new(),
        };

        assert_eq!(
            lifter.lift_color_space(&Object::Name("DeviceRGB".to_string()), 0),
            ColorSpace::Device("DeviceRGB".to_string())
        );
        assert_eq!(
            lifter.lift_color_space(&Object::Name("Pattern".to_string()), 0),
            ColorSpace::Pattern
        );
        let separation = Object::Array(vec![
            Object::Name("Separation".to_string()),
            Object::Name("Spot1".to_string()),
        ]);
        assert_eq!(
            lifter.lift_color_space(&separation, 0),
            ColorSpace::Separation {
                name: "Spot1".to_string()
            }
        );
        let device_n = Object::Array(vec![
            Object::Name("DeviceN".to_string()),
            Object::Array(vec![
                Object::Name("Cyan".to_string()),
                Object::Name("Magenta".to_string()),
            ]),
        ]);
        assert_eq!(
            lifter.lift_color_space(&device_n, 0),
            ColorSpace::DeviceN {
                names: vec!["Cyan".to_string(), "Magenta".to_string()]
            }
        );
        assert!(matches!(
            lifter.lift_color_space(&Object::Name("Exotic".to_string()), 0),
            ColorSpace::Unknown(_)
        ));
    }

    #[test]
    fn test_encoding_differences() {
        let raw = RawDocument::default();
        let lifter = Lifter {
            raw: &raw,
            policy: &StrictPolicy,
            cancel: &CancelToken::new(),
        };

        let mut enc = Dict::new();
        enc.insert(
            "BaseEncoding".to_string(),
            Object::Name("WinAnsiEncoding".to_string()),
        );
        enc.insert(
            "Differences".to_string(),
            Object::Array(vec![
                Object::Integer(65),
                Object::Name("Alpha".to_string()),
                Object::Name("Beta".to_string()),
                Object::Integer(100),
                Object::Name("Delta".to_string()),
            ]),
        );
        let mut font_dict = Dict::new();
        font_dict.insert("Subtype".to_string(), Object::Name("Type1".to_string()));
        font_dict.insert("BaseFont".to_string(), Object::Name("F".to_string()));
        font_dict.insert("Encoding".to_string(), Object::Dictionary(enc));

        let font = lifter.lift_font(&font_dict, 0).unwrap();
        match font.encoding {
            FontEncoding::Differences {
                base,
                differences,
            } => {
                assert_eq!(base.as_deref(), Some("WinAnsiEncoding"));
                assert_eq!(
                    differences,
                    vec![
                        (65, "Alpha".to_string()),
                        (66, "Beta".to_string()),
                        (100, "Delta".to_string())
                    ]
                );
            },
            other => panic!("expected differences encoding, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_fails_on_missing_pages() {
        let pdf = String::from_utf8(two_page_pdf()).unwrap();
        let broken = pdf.replace("/Type /Catalog /Pages 2 0 R", "/Type /Catalog /Nope 2 0 R");
        let raw = RawDocument::parse(
            broken.into_bytes(),
            &LenientPolicy::new(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(lift_document(&raw, &StrictPolicy, &CancelToken::new()).is_err());
    }

    #[test]
    fn test_lenient_yields_empty_pages_and_warnings() {
        let pdf = String::from_utf8(two_page_pdf()).unwrap();
        let broken = pdf.replace("/Type /Catalog /Pages 2 0 R", "/Type /Catalog /Nope 2 0 R");
        let raw = RawDocument::parse(
            broken.into_bytes(),
            &LenientPolicy::new(),
            &CancelToken::new(),
        )
        .unwrap();
        let policy = LenientPolicy::new();
        let doc = lift_document(&raw, &policy, &CancelToken::new()).unwrap();
        assert!(doc.pages.is_empty());
        assert!(!policy.warnings().is_empty());
    }

    #[test]
    fn test_output_intents_and_dpart() {
        let pdf = String::from_utf8(two_page_pdf()).unwrap();
        let extended = pdf.replace(
            "/Type /Catalog /Pages 2 0 R",
            "/Type /Catalog /Pages 2 0 R \
             /OutputIntents [<< /Type /OutputIntent /S /GTS_PDFVT >>] \
             /DPartRoot << /DPartRootNode null >>",
        );
        let raw = RawDocument::parse(
            extended.into_bytes(),
            &LenientPolicy::new(),
            &CancelToken::new(),
        )
        .unwrap();
        let doc = lift_document(&raw, &LenientPolicy::new(), &CancelToken::new()).unwrap();
        assert!(doc.has_output_intent("GTS_PDFVT"));
        assert!(doc.dpart_root.is_some());
    }
}
