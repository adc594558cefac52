//! Font machinery: sfnt parsing, GSUB closure, TrueType subsetting, the
//! ToUnicode CMap decoder, and the document-level subsetting driver.
//!
//! Per PDF convention, subset fonts are renamed with a 6-letter tag prefix
//! (`ABCDEF+FontName`); the tag derives deterministically from the kept
//! glyph set so equal subsets get equal names.

pub mod gsub;
pub mod sfnt;
pub mod subset;
pub mod to_unicode;

pub use sfnt::SfntDirectory;
pub use subset::{SubsetResult, subset};

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;

use crate::cancel::CancelToken;
use crate::content::{CidRemaps, analyze_usage, parse_operations, remap_content, serialize_operations};
use crate::error::Result;
use crate::object::Object;
use crate::semantic::{CidToGid, SemanticDocument};

/// Derive the 6-letter uppercase subset tag from the kept glyph set.
pub fn subset_tag(gids: &BTreeSet<u16>) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for gid in gids {
        gid.hash(&mut hasher);
    }
    let mut h = hasher.finish();
    let mut tag = String::with_capacity(6);
    for _ in 0..6 {
        tag.push(((h % 26) as u8 + b'A') as char);
        h /= 26;
    }
    tag
}

/// Prefix a base font name with a subset tag, once.
fn tagged_name(tag: &str, base_font: &str) -> String {
    match base_font.split_once('+') {
        Some((_, bare)) => format!("{}+{}", tag, bare),
        None => format!("{}+{}", tag, base_font),
    }
}

/// Subset every subsettable TrueType embedded in the document.
///
/// Glyph usage is gathered across all pages so fonts shared between pages
/// subset once with the union of their glyphs. Descriptor bytes are
/// replaced in place, fonts renamed with the subset tag, CID widths and
/// ToUnicode retargeted, and every affected content stream rewritten
/// through the CID remap.
pub fn subset_document_fonts(doc: &mut SemanticDocument, cancel: &CancelToken) -> Result<()> {
    // Font identity across pages: base name plus embedded file length
    type GroupKey = (String, usize);

    struct Group {
        gids: BTreeSet<u16>,
        font_bytes: Vec<u8>,
    }

    // Pass 1: parse contents, gather used GIDs per font group
    let mut page_ops = Vec::with_capacity(doc.pages.len());
    let mut groups: HashMap<GroupKey, Group> = HashMap::new();

    for page in &doc.pages {
        cancel.check()?;
        if page.contents.is_empty() {
            page_ops.push(None);
            continue;
        }
        let ops = parse_operations(&page.joined_contents())?;
        let usage = analyze_usage(&ops);

        for name in &usage.fonts {
            let Some(font) = page.resources.fonts.get(name) else {
                continue;
            };
            if !font.is_subsettable() {
                continue;
            }
            let Some((_, bytes)) = font
                .embedded_descriptor()
                .and_then(|d| d.font_file.as_ref())
            else {
                continue;
            };

            let cid_to_gid = font
                .descendant
                .as_ref()
                .and_then(|d| d.cid_to_gid.clone())
                .unwrap_or(CidToGid::Identity);

            let group = groups
                .entry((font.base_font.clone(), bytes.len()))
                .or_insert_with(|| Group {
                    gids: BTreeSet::new(),
                    font_bytes: bytes.clone(),
                });
            for pair in usage.shown_bytes(name).chunks_exact(2) {
                let cid = u16::from_be_bytes([pair[0], pair[1]]);
                group.gids.insert(cid_to_gid.gid(cid));
            }
        }

        page_ops.push(Some(ops));
    }

    // Pass 2: subset each group once
    let mut results: HashMap<GroupKey, (SubsetResult, String)> = HashMap::new();
    for (key, group) in &groups {
        cancel.check()?;
        if group.gids.is_empty() {
            continue;
        }
        match subset(&group.font_bytes, &group.gids) {
            Ok(result) if result.subsetted => {
                let kept: BTreeSet<u16> = result.gid_map.keys().copied().collect();
                let tag = subset_tag(&kept);
                results.insert(key.clone(), (result, tag));
            },
            Ok(_) => {},
            Err(e) => {
                // A malformed embedded program is not worth failing the
                // whole write over; the original bytes stay in place
                log::warn!("subsetting {} failed: {}", key.0, e);
            },
        }
    }

    if results.is_empty() {
        return Ok(());
    }

    // Pass 3: patch fonts and rewrite the affected content streams
    for (page, ops) in doc.pages.iter_mut().zip(page_ops) {
        cancel.check()?;
        let mut remaps = CidRemaps::new();

        for (name, font) in page.resources.fonts.iter_mut() {
            if !font.is_subsettable() {
                continue;
            }
            let Some((_, bytes)) = font
                .embedded_descriptor()
                .and_then(|d| d.font_file.as_ref())
            else {
                continue;
            };
            let key = (font.base_font.clone(), bytes.len());
            let Some((result, tag)) = results.get(&key) else {
                continue;
            };

            let cid_to_gid = font
                .descendant
                .as_ref()
                .and_then(|d| d.cid_to_gid.clone())
                .unwrap_or(CidToGid::Identity);
            let cid_remap = build_cid_remap(&result.gid_map, &cid_to_gid);

            // Descriptor bytes swap in place; names pick up the tag
            if let Some(descriptor) = font.embedded_descriptor_mut() {
                if let Some((_, file_bytes)) = descriptor.font_file.as_mut() {
                    *file_bytes = result.data.clone();
                }
            }
            font.base_font = tagged_name(tag, &font.base_font);
            if let Some(descendant) = font.descendant.as_mut() {
                descendant.base_font = tagged_name(tag, &descendant.base_font);
                descendant.cid_to_gid = Some(CidToGid::Identity);
                descendant.widths = descendant
                    .widths
                    .as_ref()
                    .map(|w| rebuild_cid_widths(w, &cid_remap));
            }
            if let Some(to_unicode) = font.to_unicode.take() {
                let retargeted = to_unicode
                    .into_iter()
                    .filter_map(|(code, runes)| {
                        u16::try_from(code)
                            .ok()
                            .and_then(|cid| cid_remap.get(&cid))
                            .map(|&new_cid| (new_cid as u32, runes))
                    })
                    .collect();
                font.to_unicode = Some(retargeted);
            }

            remaps.insert(name.clone(), cid_remap);
        }

        if remaps.is_empty() {
            continue;
        }
        if let Some(ops) = ops {
            let rewritten = remap_content(&ops, &remaps);
            page.contents = vec![Bytes::from(serialize_operations(&rewritten))];
        }
    }

    Ok(())
}

/// Old CID to new CID, through the old CIDToGID map and the GID renumber.
fn build_cid_remap(
    gid_map: &std::collections::BTreeMap<u16, u16>,
    cid_to_gid: &CidToGid,
) -> HashMap<u16, u16> {
    match cid_to_gid {
        CidToGid::Identity => gid_map.iter().map(|(&old, &new)| (old, new)).collect(),
        CidToGid::Map(bytes) => {
            let mut remap = HashMap::new();
            for cid in 0..(bytes.len() / 2) as u16 {
                let gid = cid_to_gid.gid(cid);
                if let Some(&new_gid) = gid_map.get(&gid) {
                    remap.insert(cid, new_gid);
                }
            }
            remap
        },
    }
}

/// Rebuild a CIDFont /W array for renumbered CIDs.
///
/// The old array's `c [w1 w2 ...]` and `c_first c_last w` groups are
/// flattened to per-CID widths, retargeted, and re-emitted as compact
/// consecutive runs.
fn rebuild_cid_widths(widths: &Object, cid_remap: &HashMap<u16, u16>) -> Object {
    let Some(items) = widths.as_array() else {
        return widths.clone();
    };

    // Flatten old W into cid -> width
    let mut old_widths: HashMap<u16, f64> = HashMap::new();
    let mut i = 0;
    while i < items.len() {
        let Some(start) = items[i].as_integer() else {
            break;
        };
        match items.get(i + 1) {
            Some(Object::Array(run)) => {
                for (offset, w) in run.iter().enumerate() {
                    if let Some(width) = w.as_number() {
                        old_widths.insert(start as u16 + offset as u16, width);
                    }
                }
                i += 2;
            },
            Some(end_obj) => {
                let (Some(end), Some(width)) =
                    (end_obj.as_integer(), items.get(i + 2).and_then(|o| o.as_number()))
                else {
                    break;
                };
                for cid in start..=end {
                    old_widths.insert(cid as u16, width);
                }
                i += 3;
            },
            None => break,
        }
    }

    // Retarget and sort by new CID
    let mut new_widths: Vec<(u16, f64)> = old_widths
        .into_iter()
        .filter_map(|(cid, w)| cid_remap.get(&cid).map(|&new_cid| (new_cid, w)))
        .collect();
    new_widths.sort_by_key(|(cid, _)| *cid);

    // Emit consecutive runs as `start [w...]`
    let mut out: Vec<Object> = Vec::new();
    let mut run_start: Option<u16> = None;
    let mut run: Vec<Object> = Vec::new();
    let mut prev: Option<u16> = None;

    for (cid, width) in new_widths {
        if prev.is_some_and(|p| cid == p + 1) {
            run.push(Object::Real(width));
        } else {
            if let Some(start) = run_start.take() {
                out.push(Object::Integer(start as i64));
                out.push(Object::Array(std::mem::take(&mut run)));
            }
            run_start = Some(cid);
            run.push(Object::Real(width));
        }
        prev = Some(cid);
    }
    if let Some(start) = run_start {
        out.push(Object::Integer(start as i64));
        out.push(Object::Array(run));
    }

    Object::Array(out)
}
