//! Raw document: the cross-referenced object graph.
//!
//! `RawDocument` owns every parsed object keyed by `(object number,
//! generation)`, the trailer, the list of xref sections that were walked,
//! and the encrypted/linearized flags. Objects referenced from object
//! streams are unpacked during load; the object-stream container is parsed
//! once and its members taken from the cached result.
//!
//! The graph is reference-laced and cyclic (pages point at their parent
//! tree node, resources at XObjects that carry resources); nodes hold only
//! `ObjectRef` keys, which makes cycles safe and cloning cheap. Resolution
//! walks keys with an explicit chain so loops surface as `CircularRef`.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_object;
use crate::reader::ByteReader;
use crate::recovery::{Action, FaultSite, RecoveryPolicy};
use crate::xref::{XRefEntryType, XrefSection, resolve_xref};

/// Bound on reference-resolution chains; longer chains are loops.
const MAX_RESOLVE_DEPTH: usize = 32;

/// A parsed PDF file as a cross-referenced object graph.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    /// Header version string, e.g. "1.7"
    pub version: String,
    /// Every loaded object in xref order
    pub objects: IndexMap<ObjectRef, Object>,
    /// Trailer dictionary (for xref streams, the stream dictionary)
    pub trailer: Dict,
    /// Xref sections walked during load, newest first
    pub xref_sections: Vec<XrefSection>,
    /// Whether the trailer carries an /Encrypt dictionary
    pub encrypted: bool,
    /// Whether the first object declares /Linearized
    pub linearized: bool,
}

impl RawDocument {
    /// Parse a PDF byte stream into a raw document.
    ///
    /// The recovery policy is consulted when an individual object fails to
    /// parse at its xref offset (the canonical C2/C3 site) and when the
    /// xref chain itself is unusable (the canonical C4 site, where a
    /// non-Fail answer triggers the reconstruction scan).
    pub fn parse(bytes: Vec<u8>, policy: &dyn RecoveryPolicy, cancel: &CancelToken) -> Result<Self> {
        let reader = ByteReader::new(bytes);
        let version = parse_header(&reader)?;

        let (xref, sections) = match reader
            .find_startxref()
            .and_then(|start| resolve_xref(&reader, start, cancel))
        {
            Ok(resolved) => resolved,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                match policy.on_error(&e, &FaultSite::component("xref")) {
                    Action::Fail => return Err(e),
                    _ => {
                        log::warn!("xref chain unusable ({}), reconstructing by scan", e);
                        (reconstruct_xref(&reader)?, Vec::new())
                    },
                }
            },
        };

        let trailer = xref.trailer().cloned().unwrap_or_default();
        let encrypted = trailer.get("Encrypt").is_some();

        let mut doc = RawDocument {
            version,
            objects: IndexMap::new(),
            trailer,
            xref_sections: sections,
            encrypted,
            linearized: false,
        };

        // Uncompressed objects first, in object-number order for a stable map
        let mut numbers: Vec<u32> = xref.object_numbers().collect();
        numbers.sort_unstable();

        let mut compressed: Vec<(u32, u32, u16)> = Vec::new();
        for num in &numbers {
            cancel.check()?;
            let entry = xref.get(*num).copied().unwrap();
            match entry.entry_type {
                XRefEntryType::Free => {},
                XRefEntryType::Uncompressed => {
                    let key = ObjectRef::new(*num, entry.generation);
                    match load_object_at(&reader, entry.offset as usize, *num) {
                        Ok(obj) => {
                            doc.objects.insert(key, obj);
                        },
                        Err(e) => {
                            let site = FaultSite::component("parser")
                                .at_offset(entry.offset as usize)
                                .in_object(key);
                            match policy.on_error(&e, &site) {
                                Action::Fail => return Err(e),
                                Action::Skip => {},
                                Action::Warn | Action::Fix => {
                                    doc.objects.insert(key, Object::Null);
                                },
                            }
                        },
                    }
                },
                XRefEntryType::Compressed => {
                    compressed.push((*num, entry.offset as u32, entry.generation));
                },
            }
        }

        // Compressed objects, grouped so each container is parsed once
        let mut containers: HashMap<u32, HashMap<u32, Object>> = HashMap::new();
        for (num, container, _index) in compressed {
            cancel.check()?;
            let members = match containers.entry(container) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(slot) => {
                    let stream = doc
                        .get(ObjectRef::new(container, 0))
                        .cloned()
                        .ok_or(Error::MissingObject(container, 0))?;
                    slot.insert(parse_object_stream(&stream)?)
                },
            };
            let key = ObjectRef::new(num, 0);
            match members.get(&num) {
                Some(obj) => {
                    doc.objects.insert(key, obj.clone());
                },
                None => {
                    let e = Error::MissingObject(num, 0);
                    let site = FaultSite::component("parser").in_object(key);
                    match policy.on_error(&e, &site) {
                        Action::Fail => return Err(e),
                        _ => {},
                    }
                },
            }
        }

        doc.linearized = doc
            .objects
            .values()
            .next()
            .and_then(|o| o.as_dict())
            .is_some_and(|d| d.contains_key("Linearized"));

        Ok(doc)
    }

    /// Look up an object by its key, falling back to generation 0 for
    /// references written with a stale generation.
    pub fn get(&self, key: ObjectRef) -> Option<&Object> {
        self.objects
            .get(&key)
            .or_else(|| self.objects.get(&ObjectRef::new(key.id, 0)))
    }

    /// Resolve an object, following reference chains.
    ///
    /// # Errors
    ///
    /// `MissingObject` for a dangling reference, `CircularRef` with the
    /// offending chain when references loop.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut chain: Vec<ObjectRef> = Vec::new();
        let mut current = obj;

        while let Object::Reference(r) = current {
            if chain.contains(r) || chain.len() >= MAX_RESOLVE_DEPTH {
                chain.push(*r);
                return Err(Error::CircularRef(chain));
            }
            chain.push(*r);
            current = self.get(*r).ok_or(Error::MissingObject(r.id, r.gen))?;
        }

        Ok(current)
    }

    /// Resolve a reference key directly.
    pub fn resolve_ref(&self, key: ObjectRef) -> Result<&Object> {
        let obj = self.get(key).ok_or(Error::MissingObject(key.id, key.gen))?;
        self.resolve(obj)
    }

    /// Resolve a dictionary entry, following references.
    pub fn resolve_entry<'a>(&'a self, dict: &'a Dict, key: &str) -> Option<&'a Object> {
        dict.get(key).and_then(|o| self.resolve(o).ok())
    }

    /// The catalog dictionary named by the trailer's /Root.
    pub fn catalog(&self) -> Result<&Dict> {
        let root = self.trailer.get("Root").ok_or_else(|| Error::Malformed {
            entity: "Trailer".to_string(),
            field: "Root".to_string(),
        })?;
        self.resolve(root)?.as_dict().ok_or_else(|| Error::Malformed {
            entity: "Catalog".to_string(),
            field: "Root".to_string(),
        })
    }
}

/// Parse the `%PDF-M.N` header. Some producers put junk ahead of it, so
/// the marker is searched within the first kilobyte.
fn parse_header(reader: &ByteReader) -> Result<String> {
    let head = reader.read_at(0, reader.len().min(1024))?;
    let pos = head
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            let prefix = head.iter().take(8).map(|&c| c as char).collect::<String>();
            Error::MalformedHeader(prefix)
        })?;

    let version: String = head[pos + 5..]
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == b'.')
        .map(|&c| c as char)
        .collect();

    if version.is_empty() {
        return Err(Error::MalformedHeader("%PDF-".to_string()));
    }
    Ok(version)
}

/// Parse `N G obj <object> endobj` at a byte offset.
fn load_object_at(reader: &ByteReader, offset: usize, expected_num: u32) -> Result<Object> {
    let input = reader.slice_from(offset)?;

    let parse_err = |what: &str| Error::Parse {
        offset,
        reason: what.to_string(),
    };

    let (rest, num_tok) = token(input).map_err(|_| parse_err("expected object number"))?;
    let (rest, _gen_tok) = token(rest).map_err(|_| parse_err("expected generation number"))?;
    let (rest, obj_tok) = token(rest).map_err(|_| parse_err("expected obj keyword"))?;

    match num_tok {
        Token::Integer(n) if n as u32 == expected_num => {},
        Token::Integer(n) => {
            log::warn!("xref points {} at object {} (offset {})", expected_num, n, offset);
        },
        _ => return Err(parse_err("object header does not start with a number")),
    }
    if obj_tok != Token::Obj {
        return Err(parse_err("missing obj keyword"));
    }

    let (_, obj) = parse_object(rest).map_err(|e| Error::Parse {
        offset,
        reason: format!("object body: {}", e),
    })?;
    Ok(obj)
}

/// Lenient fallback: scan the whole file for `N G obj` headers and build a
/// synthetic table, taking the last definition of each object number. The
/// trailer is recovered from the last `trailer` keyword, or failing that,
/// by locating a /Type /Catalog object.
fn reconstruct_xref(reader: &ByteReader) -> Result<crate::xref::CrossRefTable> {
    use crate::xref::{CrossRefTable, XRefEntry};

    let data = reader.bytes();
    let mut table = CrossRefTable::new();

    let mut i = 0;
    while i + 3 < data.len() {
        if &data[i..i + 3] == b"obj"
            && (i + 3 >= data.len() || !data[i + 3].is_ascii_alphanumeric())
        {
            // Walk backwards over "N G " to the object number
            if let Some((num, gen, start)) = read_object_header_backwards(data, i) {
                table.add_entry(num, XRefEntry::uncompressed(start as u64, gen));
            }
        }
        i += 1;
    }

    if table.is_empty() {
        return Err(Error::MalformedXref("no object headers found by scan".to_string()));
    }

    // Last trailer dictionary wins
    let mut trailer = Dict::new();
    if let Some(pos) = reader.find_last(b"trailer", reader.len()) {
        if let Ok((_, Object::Dictionary(dict))) = parse_object(&data[pos + b"trailer".len()..]) {
            trailer = dict;
        }
    }
    if !trailer.contains_key("Root") {
        // Find a catalog to stand in as the root
        for num in table.object_numbers().collect::<Vec<_>>() {
            if let Some(entry) = table.get(num) {
                if let Ok(obj) = load_object_at(reader, entry.offset as usize, num) {
                    if obj.as_dict().and_then(|d| d.get("Type")).and_then(|t| t.as_name())
                        == Some("Catalog")
                    {
                        trailer.insert(
                            "Root".to_string(),
                            Object::Reference(ObjectRef::new(num, entry.generation)),
                        );
                        break;
                    }
                }
            }
        }
    }
    table.set_trailer(trailer);

    log::warn!("reconstructed xref with {} entries", table.len());
    Ok(table)
}

/// Given the position of an `obj` keyword, read `N G ` backwards.
/// Returns (object number, generation, offset of the number).
fn read_object_header_backwards(data: &[u8], obj_pos: usize) -> Option<(u32, u16, usize)> {
    let mut i = obj_pos;

    // whitespace before "obj"
    while i > 0 && crate::lexer::is_pdf_whitespace(data[i - 1]) {
        i -= 1;
    }
    // generation digits
    let gen_end = i;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    let gen_start = i;
    if gen_start == gen_end {
        return None;
    }
    // whitespace
    while i > 0 && crate::lexer::is_pdf_whitespace(data[i - 1]) {
        i -= 1;
    }
    // object number digits
    let num_end = i;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    let num_start = i;
    if num_start == num_end {
        return None;
    }

    let num: u32 = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
    let gen: u16 = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
    Some((num, gen, num_start))
}
