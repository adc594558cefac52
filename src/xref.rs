//! Cross-reference resolver.
//!
//! Walks the trailer chain from the last `startxref` backwards, decoding
//! classical xref tables and cross-reference streams (`/Type /XRef`) into
//! one flat map from object number to location. Incremental-update `/Prev`
//! chains are merged with later updates shadowing earlier ones; hybrid
//! files carrying both a table and an `/XRefStm` stream are accepted.

use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::parse_object;
use crate::reader::ByteReader;

/// Bound on the `/Prev` chain length; a deeper chain is circular or hostile.
const MAX_PREV_DEPTH: u32 = 100;

/// How an object is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Free-list entry
    Free,
    /// Uncompressed object at a byte offset
    Uncompressed,
    /// Object packed inside an object stream (PDF 1.5+)
    Compressed,
}

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Kind of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed), next free object (free), or the
    /// containing stream's object number (compressed)
    pub offset: u64,
    /// Generation (free/uncompressed) or index within the stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Entry for an uncompressed object at `offset`.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Entry for an object stored in object stream `stream_obj_num` at `index`.
    pub fn compressed(stream_obj_num: u64, index: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index,
        }
    }

    /// Free-list entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry points at a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Which syntax an xref section used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefSectionKind {
    /// Classical ASCII table
    Table,
    /// `/Type /XRef` stream
    Stream,
}

/// One xref section as encountered while walking the chain, newest first.
#[derive(Debug, Clone, Copy)]
pub struct XrefSection {
    /// Byte offset of the section in the source
    pub offset: u64,
    /// Table or stream syntax
    pub kind: XrefSectionKind,
}

/// Flat cross-reference map plus the trailer that governs the document.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    pub(crate) entries: HashMap<u32, XRefEntry>,
    trailer: Option<Dict>,
}

impl CrossRefTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary (for xref streams this is the stream dict).
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = Some(trailer);
    }

    /// The trailer dictionary, if one was parsed.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Insert an entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Look up an entry.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// All object numbers known to the table.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Merge an earlier table into this one. Existing entries win, which
    /// makes later incremental updates shadow earlier ones.
    pub fn merge_older(&mut self, older: CrossRefTable) {
        for (obj_num, entry) in older.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve the complete cross-reference state starting at `start`.
///
/// Returns the merged table and the list of sections walked, newest first.
pub fn resolve_xref(
    reader: &ByteReader,
    start: u64,
    cancel: &CancelToken,
) -> Result<(CrossRefTable, Vec<XrefSection>)> {
    let mut sections = Vec::new();
    let mut seen_offsets = Vec::new();
    let table = resolve_recursive(reader, start, 0, cancel, &mut sections, &mut seen_offsets)?;
    Ok((table, sections))
}

fn resolve_recursive(
    reader: &ByteReader,
    offset: u64,
    depth: u32,
    cancel: &CancelToken,
    sections: &mut Vec<XrefSection>,
    seen_offsets: &mut Vec<u64>,
) -> Result<CrossRefTable> {
    if depth > MAX_PREV_DEPTH {
        return Err(Error::MalformedXref(format!("/Prev chain deeper than {}", MAX_PREV_DEPTH)));
    }
    if seen_offsets.contains(&offset) {
        return Err(Error::MalformedXref(format!("circular /Prev chain at offset {}", offset)));
    }
    seen_offsets.push(offset);

    let input = reader.slice_from(offset as usize)?;
    let trimmed = skip_pdf_whitespace(input);

    let mut xref = if trimmed.starts_with(b"xref") {
        sections.push(XrefSection {
            offset,
            kind: XrefSectionKind::Table,
        });
        parse_table_section(trimmed, cancel)?
    } else if trimmed.first().is_some_and(|c| c.is_ascii_digit()) {
        sections.push(XrefSection {
            offset,
            kind: XrefSectionKind::Stream,
        });
        parse_stream_section(trimmed, cancel)?
    } else {
        return Err(Error::MalformedXref(format!("no xref section at offset {}", offset)));
    };

    // Hybrid file: the table's trailer names a supplementary xref stream
    if let Some(stm_offset) = xref
        .trailer()
        .and_then(|t| t.get("XRefStm"))
        .and_then(|o| o.as_integer())
    {
        log::debug!("hybrid xref: supplementary stream at {}", stm_offset);
        let stream_input = skip_pdf_whitespace(reader.slice_from(stm_offset as usize)?);
        match parse_stream_section(stream_input, cancel) {
            Ok(stream_xref) => {
                // The stream is newer than the table's plain entries
                let mut merged = stream_xref;
                merged.merge_older(std::mem::take(&mut xref));
                xref = merged;
            },
            Err(e) => log::warn!("hybrid /XRefStm at {} unreadable: {}", stm_offset, e),
        }
    }

    if let Some(prev) = xref
        .trailer()
        .and_then(|t| t.get("Prev"))
        .and_then(|o| o.as_integer())
    {
        let older = resolve_recursive(reader, prev as u64, depth + 1, cancel, sections, seen_offsets)?;
        xref.merge_older(older);
    }

    Ok(xref)
}

fn skip_pdf_whitespace(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|&c| !crate::lexer::is_pdf_whitespace(c))
        .unwrap_or(input.len());
    &input[start..]
}

/// Parse a classical ASCII xref table plus its trailer dictionary.
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000018 00000 n
/// 0000000154 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
fn parse_table_section(input: &[u8], cancel: &CancelToken) -> Result<CrossRefTable> {
    let mut xref = CrossRefTable::new();
    let lines = split_lines(input);
    let mut line_idx = 0;

    // Consume the `xref` keyword line
    while line_idx < lines.len() {
        let trimmed = lines[line_idx].trim();
        line_idx += 1;
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("xref") {
            break;
        }
        return Err(Error::MalformedXref("missing xref keyword".to_string()));
    }

    // Subsections until `trailer`
    while line_idx < lines.len() {
        let header = lines[line_idx].trim().to_string();
        line_idx += 1;

        if header.starts_with("trailer") {
            break;
        }
        if header.is_empty() || header.starts_with('%') {
            continue;
        }

        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 2 {
            continue;
        }
        let start_obj: u32 = parts[0]
            .parse()
            .map_err(|_| Error::MalformedXref(format!("bad subsection start {:?}", parts[0])))?;
        let count: u32 = parts[1]
            .parse()
            .map_err(|_| Error::MalformedXref(format!("bad subsection count {:?}", parts[1])))?;

        if count > 1_000_000 {
            return Err(Error::MalformedXref(format!("subsection count {} exceeds limit", count)));
        }

        let mut i = 0;
        while i < count && line_idx < lines.len() {
            cancel.check()?;
            let entry_line = lines[line_idx].trim().to_string();
            line_idx += 1;

            if entry_line.is_empty() {
                continue;
            }
            if entry_line.starts_with("trailer") {
                log::warn!("xref subsection promised {} entries, found {}", count, i);
                line_idx -= 1;
                break;
            }

            let parts: Vec<&str> = entry_line.split_whitespace().collect();
            if parts.len() < 3 {
                // Keep numbering intact with a placeholder free entry
                log::warn!("malformed xref entry {:?}, treating as free", entry_line);
                xref.add_entry(start_obj + i, XRefEntry::free(0, 65535));
                i += 1;
                continue;
            }

            let offset: u64 = parts[0].parse().unwrap_or(0);
            let generation: u16 = parts[1].parse().unwrap_or(65535);
            let entry = match parts[2].chars().next() {
                Some('n') | Some('N') => XRefEntry::uncompressed(offset, generation),
                Some('f') | Some('F') => XRefEntry::free(offset, generation),
                other => {
                    log::warn!("invalid xref type flag {:?}, treating as free", other);
                    XRefEntry::free(offset, generation)
                },
            };
            xref.add_entry(start_obj + i, entry);
            i += 1;
        }
    }

    // The trailer dictionary follows on the byte stream after `trailer`
    if let Some(pos) = find_keyword(input, b"trailer") {
        let after = &input[pos + b"trailer".len()..];
        if let Ok((_, Object::Dictionary(dict))) = parse_object(after) {
            xref.set_trailer(dict);
        }
    }

    Ok(xref)
}

/// Parse a cross-reference stream section (`N G obj << /Type /XRef ... >> stream`).
fn parse_stream_section(input: &[u8], cancel: &CancelToken) -> Result<CrossRefTable> {
    use crate::lexer::{Token, token};

    // Object header: number, generation, `obj`
    let (rest, _) = token(input)
        .map_err(|_| Error::MalformedXref("unreadable xref stream object number".to_string()))?;
    let (rest, _) = token(rest)
        .map_err(|_| Error::MalformedXref("unreadable xref stream generation".to_string()))?;
    let (rest, obj_kw) =
        token(rest).map_err(|_| Error::MalformedXref("missing obj keyword".to_string()))?;
    if obj_kw != Token::Obj {
        return Err(Error::MalformedXref("expected obj keyword before xref stream".to_string()));
    }

    let (_, obj) = parse_object(rest)
        .map_err(|e| Error::MalformedXref(format!("unreadable xref stream: {}", e)))?;

    let (stream_dict, decoded) = match &obj {
        Object::Stream { dict, .. } => (dict.clone(), obj.decode_stream_data()?),
        _ => return Err(Error::MalformedXref("xref stream is not a stream object".to_string())),
    };

    if let Some(type_name) = stream_dict.get("Type").and_then(|o| o.as_name()) {
        if type_name != "XRef" {
            return Err(Error::MalformedXref(format!("expected /Type /XRef, got /{}", type_name)));
        }
    }

    let w_array = stream_dict
        .get("W")
        .and_then(|o| o.as_array())
        .ok_or_else(|| Error::MalformedXref("missing /W array".to_string()))?;
    if w_array.len() != 3 {
        return Err(Error::MalformedXref(format!("/W has {} fields, expected 3", w_array.len())));
    }
    let widths: Vec<usize> = w_array
        .iter()
        .map(|o| o.as_integer().map(|v| v as usize))
        .collect::<Option<_>>()
        .ok_or_else(|| Error::MalformedXref("non-integer /W field".to_string()))?;
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 || entry_size > 32 {
        return Err(Error::MalformedXref(format!("implausible /W entry size {}", entry_size)));
    }

    let size = stream_dict
        .get("Size")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::MalformedXref("missing /Size".to_string()))? as u32;

    let index_ranges: Vec<(u32, u32)> = match stream_dict.get("Index").and_then(|o| o.as_array()) {
        Some(index) => {
            if index.len() % 2 != 0 {
                return Err(Error::MalformedXref("odd /Index length".to_string()));
            }
            index
                .chunks(2)
                .map(|pair| {
                    match (pair[0].as_integer(), pair[1].as_integer()) {
                        (Some(s), Some(c)) => Ok((s as u32, c as u32)),
                        _ => Err(Error::MalformedXref("non-integer /Index value".to_string())),
                    }
                })
                .collect::<Result<_>>()?
        },
        None => vec![(0, size)],
    };

    let mut xref = CrossRefTable::new();
    let mut pos = 0;

    for (start_obj, count) in index_ranges {
        for i in 0..count {
            cancel.check()?;
            if pos + entry_size > decoded.len() {
                return Err(Error::MalformedXref(format!(
                    "stream data ends at {} of promised {} entries",
                    i, count
                )));
            }
            let entry_data = &decoded[pos..pos + entry_size];
            pos += entry_size;

            // Width 0 for field 1 means "type 1" per the spec default
            let entry_type = if widths[0] > 0 { read_be(&entry_data[..widths[0]]) } else { 1 };
            let field2 = read_be(&entry_data[widths[0]..widths[0] + widths[1]]);
            let field3 = read_be(&entry_data[widths[0] + widths[1]..]);

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                other => {
                    return Err(Error::MalformedXref(format!("invalid entry type {}", other)));
                },
            };
            xref.add_entry(start_obj + i, entry);
        }
    }

    xref.set_trailer(stream_dict);
    Ok(xref)
}

/// Big-endian integer of 0-8 bytes; 0 bytes reads as 0.
fn read_be(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    if bytes.len() >= 8 {
        return BigEndian::read_u64(&bytes[..8]);
    }
    BigEndian::read_uint(bytes, bytes.len())
}

fn find_keyword(input: &[u8], keyword: &[u8]) -> Option<usize> {
    input.windows(keyword.len()).position(|w| w == keyword)
}

/// Split into lines accepting LF, CRLF and lone CR line endings.
fn split_lines(input: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(input);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            },
            '\n' => lines.push(std::mem::take(&mut current)),
            ch => current.push(ch),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(bytes: &[u8], start: u64) -> Result<(CrossRefTable, Vec<XrefSection>)> {
        let reader = ByteReader::new(bytes.to_vec());
        resolve_xref(&reader, start, &CancelToken::new())
    }

    #[test]
    fn test_table_single_subsection() {
        let data = b"xref\n\
            0 3\n\
            0000000000 65535 f \n\
            0000000018 00000 n \n\
            0000000154 00000 n \n\
            trailer\n<< /Size 3 >>\n";
        let (table, sections) = resolve(data, 0).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].kind, XrefSectionKind::Table);

        assert!(!table.get(0).unwrap().in_use());
        let entry1 = table.get(1).unwrap();
        assert_eq!(entry1.offset, 18);
        assert!(entry1.in_use());
        assert_eq!(table.get(2).unwrap().offset, 154);
        assert_eq!(table.trailer().unwrap().get("Size").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_table_multiple_subsections() {
        let data = b"xref\n\
            0 2\n\
            0000000000 65535 f \n\
            0000000018 00000 n \n\
            5 2\n\
            0000000200 00000 n \n\
            0000000300 00000 n \n\
            trailer\n<< /Size 7 >>\n";
        let (table, _) = resolve(data, 0).unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table.get(5).unwrap().offset, 200);
        assert_eq!(table.get(6).unwrap().offset, 300);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_table_cr_only_line_endings() {
        let data = b"xref\r0 2\r0000000000 65535 f \r0000000018 00000 n \rtrailer\r<< /Size 2 >>\r";
        let (table, _) = resolve(data, 0).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().offset, 18);
    }

    #[test]
    fn test_table_malformed_entry_becomes_free() {
        let data = b"xref\n\
            0 2\n\
            0000000000 65535 f \n\
            garbage\n\
            trailer\n<< /Size 2 >>\n";
        let (table, _) = resolve(data, 0).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.get(1).unwrap().in_use());
    }

    #[test]
    fn test_not_an_xref() {
        assert!(matches!(resolve(b"nonsense", 0), Err(Error::MalformedXref(_))));
    }

    #[test]
    fn test_excessive_count_rejected() {
        let data = b"xref\n0 2000000\n0000000000 65535 f \ntrailer\n<<>>\n";
        assert!(resolve(data, 0).is_err());
    }

    #[test]
    fn test_prev_chain_merges_with_shadowing() {
        // Older section at 0 maps object 1 to offset 18; newer section
        // remaps object 1 and adds object 2.
        let older = b"xref\n\
            0 2\n\
            0000000000 65535 f \n\
            0000000018 00000 n \n\
            trailer\n<< /Size 2 >>\n";
        let mut data = older.to_vec();
        let newer_offset = data.len();
        data.extend_from_slice(
            b"xref\n\
            1 2\n\
            0000000500 00000 n \n\
            0000000600 00000 n \n\
            trailer\n<< /Size 3 /Prev 0 >>\n",
        );

        let (table, sections) = resolve(&data, newer_offset as u64).unwrap();
        assert_eq!(sections.len(), 2);
        // Newer entry shadows the older one
        assert_eq!(table.get(1).unwrap().offset, 500);
        assert_eq!(table.get(2).unwrap().offset, 600);
        assert!(table.get(0).is_some());
        // Trailer comes from the newest section
        assert_eq!(table.trailer().unwrap().get("Size").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_circular_prev_detected() {
        let data = b"xref\n\
            0 1\n\
            0000000000 65535 f \n\
            trailer\n<< /Size 1 /Prev 0 >>\n";
        assert!(matches!(resolve(data, 0), Err(Error::MalformedXref(_))));
    }

    #[test]
    fn test_xref_stream_section() {
        // W [1 2 1], three entries: free head, uncompressed @ 0x0102,
        // compressed in stream 5 index 2
        let entries: Vec<u8> = vec![
            0, 0x00, 0x00, 0xFF, // free
            1, 0x01, 0x02, 0x00, // uncompressed at 258
            2, 0x00, 0x05, 0x02, // compressed in stream 5, index 2
        ];
        let mut data = b"7 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Length 12 >>\nstream\n".to_vec();
        data.extend_from_slice(&entries);
        data.extend_from_slice(b"\nendstream\nendobj\n");

        let (table, sections) = resolve(&data, 0).unwrap();
        assert_eq!(sections[0].kind, XrefSectionKind::Stream);
        assert_eq!(table.len(), 3);

        assert_eq!(table.get(0).unwrap().entry_type, XRefEntryType::Free);
        let e1 = table.get(1).unwrap();
        assert_eq!(e1.entry_type, XRefEntryType::Uncompressed);
        assert_eq!(e1.offset, 258);
        let e2 = table.get(2).unwrap();
        assert_eq!(e2.entry_type, XRefEntryType::Compressed);
        assert_eq!(e2.offset, 5);
        assert_eq!(e2.generation, 2);
    }

    #[test]
    fn test_xref_stream_with_index_ranges() {
        // W [1 1 1], /Index [4 2]: entries for objects 4 and 5
        let entries: Vec<u8> = vec![1, 10, 0, 1, 20, 0];
        let mut data =
            b"9 0 obj\n<< /Type /XRef /Size 6 /Index [4 2] /W [1 1 1] /Length 6 >>\nstream\n"
                .to_vec();
        data.extend_from_slice(&entries);
        data.extend_from_slice(b"\nendstream\nendobj\n");

        let (table, _) = resolve(&data, 0).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(4).unwrap().offset, 10);
        assert_eq!(table.get(5).unwrap().offset, 20);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn test_cancellation_honoured() {
        let data = b"xref\n\
            0 2\n\
            0000000000 65535 f \n\
            0000000018 00000 n \n\
            trailer\n<< /Size 2 >>\n";
        let reader = ByteReader::new(data.to_vec());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            resolve_xref(&reader, 0, &cancel),
            Err(Error::Cancelled)
        ));
    }
}
