//! TrueType subsetter: soundness properties and the end-to-end
//! document-level subsetting path.

mod common;

use std::collections::BTreeSet;

use byteorder::{BigEndian, ByteOrder};
use pdf_forge::fonts::sfnt::{SfntDirectory, table_checksum};
use pdf_forge::fonts::subset;
use pdf_forge::semantic::{
    CidSystemInfo, CidToGid, Font, FontDescriptor, FontEncoding, FontFileKind, FontSubtype, Page,
    Rect, SemanticDocument,
};
use pdf_forge::{CancelToken, DocumentWriter, StrictPolicy, WriteConfig, load_document};

const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

#[test]
fn test_subset_regression() {
    let font = common::build_truetype();
    let used: BTreeSet<u16> = [0, 1, 2, 3].into();

    let result = subset(&font, &used).unwrap();
    assert!(result.subsetted);

    // Output passes directory parse and keeps the essential tables
    let dir = SfntDirectory::parse(&result.data).unwrap();
    assert!(dir.tables.contains_key(b"glyf"));
    assert!(dir.tables.contains_key(b"loca"));
    assert!(dir.tables.contains_key(b"head"));

    // Strictly smaller than the original
    assert!(result.data.len() < font.len());
}

#[test]
fn test_subsetter_soundness_properties() {
    let font = common::build_truetype();
    let original_dir = SfntDirectory::parse(&font).unwrap();
    let original_glyphs = {
        let maxp = original_dir.table(&font, b"maxp").unwrap();
        BigEndian::read_u16(&maxp[4..6])
    };

    for used in [
        BTreeSet::from([1u16]),
        BTreeSet::from([2, 4]),
        BTreeSet::from([3]),
        BTreeSet::from([0, 1, 2, 3, 4, 5]),
    ] {
        let result = subset(&font, &used).unwrap();

        // (d) never larger
        assert!(result.data.len() <= font.len());

        if !result.subsetted {
            assert_eq!(result.data, font);
            continue;
        }

        let dir = SfntDirectory::parse(&result.data).unwrap();

        // (c) glyph count never grows
        let maxp = dir.table(&result.data, b"maxp").unwrap();
        let new_glyphs = BigEndian::read_u16(&maxp[4..6]);
        assert!(new_glyphs <= original_glyphs);

        // (a) every original glyph byte span in the closure is present
        let old_glyf = original_dir.table(&font, b"glyf").unwrap();
        let old_loca = original_dir.table(&font, b"loca").unwrap();
        let new_glyf = dir.table(&result.data, b"glyf").unwrap();
        let new_loca = dir.table(&result.data, b"loca").unwrap();
        for (&old_gid, &new_gid) in &result.gid_map {
            let old_span = glyph_bytes(old_glyf, old_loca, old_gid);
            let new_span = glyph_bytes(new_glyf, new_loca, new_gid);
            if old_span.is_empty() {
                assert!(new_span.is_empty());
                continue;
            }
            if BigEndian::read_i16(&old_span[0..2]) >= 0 {
                // Simple glyphs carry over byte for byte, modulo the
                // even-length pad the rebuild may append
                assert_eq!(old_span, &new_span[..old_span.len()]);
            } else {
                // Composite component fields are renumbered; the header
                // and bounding box are untouched
                assert_eq!(&old_span[..10], &new_span[..10]);
            }
        }

        // (b) checksumAdjustment balances the whole file
        let head_offset = dir.tables[b"head"].offset as usize;
        let stored =
            BigEndian::read_u32(&result.data[head_offset + 8..head_offset + 12]);
        let mut zeroed = result.data.clone();
        BigEndian::write_u32(&mut zeroed[head_offset + 8..head_offset + 12], 0);
        assert_eq!(stored, CHECKSUM_MAGIC.wrapping_sub(table_checksum(&zeroed)));
    }
}

/// Glyph byte span through a long-format loca.
fn glyph_bytes<'a>(glyf: &'a [u8], loca: &[u8], gid: u16) -> &'a [u8] {
    let i = gid as usize;
    let start = BigEndian::read_u32(&loca[i * 4..i * 4 + 4]) as usize;
    let end = BigEndian::read_u32(&loca[(i + 1) * 4..(i + 1) * 4 + 4]) as usize;
    &glyf[start..end]
}

#[test]
fn test_closure_monotonicity_and_fixed_point() {
    let font = common::build_truetype();
    let seed: BTreeSet<u16> = [3].into();
    let result = subset(&font, &seed).unwrap();

    // closure contains the seed
    let closure: BTreeSet<u16> = result.gid_map.keys().copied().collect();
    assert!(closure.is_superset(&seed));
    // composite 3 pulls in component 2
    assert!(closure.contains(&2));

    // running closure on its own output is a fixed point
    let second = subset(&font, &closure).unwrap();
    let closure2: BTreeSet<u16> = second.gid_map.keys().copied().collect();
    assert_eq!(closure, closure2);
}

#[test]
fn test_end_to_end_minimal_document_with_subsetting() {
    // One page, one Type0 Identity-H font showing CIDs 1 and 2
    let font_bytes = common::build_truetype();
    let original_len = font_bytes.len();

    let descendant = Font {
        subtype: FontSubtype::CIDFontType2,
        base_font: "TestSans".to_string(),
        cid_system_info: Some(CidSystemInfo {
            registry: "Adobe".to_string(),
            ordering: "Identity".to_string(),
            supplement: 0,
        }),
        cid_to_gid: Some(CidToGid::Identity),
        descriptor: Some(FontDescriptor {
            font_file: Some((FontFileKind::FontFile2, font_bytes)),
            ascent: Some(720.0),
            descent: Some(-200.0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let font = Font {
        subtype: FontSubtype::Type0,
        base_font: "TestSans".to_string(),
        encoding: FontEncoding::Named("Identity-H".to_string()),
        descendant: Some(Box::new(descendant)),
        ..Default::default()
    };

    let mut page = Page {
        media_box: Some(Rect::LETTER),
        ..Default::default()
    };
    page.contents.push(bytes::Bytes::from_static(
        b"BT /F1 12 Tf <00010002> Tj ET",
    ));
    page.resources.fonts.insert("F1".to_string(), font);

    let mut doc = SemanticDocument::default();
    doc.pages.push(page);

    let cancel = CancelToken::new();
    let config = WriteConfig::default()
        .with_deterministic(true)
        .with_subset_fonts(true)
        .with_compression(0);
    let bytes = DocumentWriter::new(config).write(&doc, &cancel).unwrap();

    // Header and structure chain come out of the writer
    assert!(bytes.starts_with(b"%PDF-1.7\n"));
    let reparsed = load_document(bytes, &StrictPolicy, &cancel).unwrap();
    assert_eq!(reparsed.pages.len(), 1);

    let font = &reparsed.pages[0].resources.fonts["F1"];
    assert_eq!(font.subtype, FontSubtype::Type0);
    assert!(font.encoding.is_identity_h());
    // Subset tag landed on the name
    assert_eq!(&font.base_font[6..7], "+");
    assert!(font.base_font.ends_with("TestSans"));

    // The embedded program shrank
    let (kind, embedded) = font
        .embedded_descriptor()
        .and_then(|d| d.font_file.as_ref())
        .unwrap();
    assert_eq!(*kind, FontFileKind::FontFile2);
    assert!(embedded.len() < original_len);
    SfntDirectory::parse(embedded).unwrap();

    // Content was remapped into the compact CID space: glyphs 1 and 2
    // keep their positions (0 stays, survivors sort ascending)
    let ops = pdf_forge::content::parse_operations(&reparsed.pages[0].joined_contents()).unwrap();
    let shown = ops
        .iter()
        .find(|op| op.operator == "Tj")
        .and_then(|op| op.operands[0].as_string())
        .unwrap();
    assert_eq!(shown, &[0x00, 0x01, 0x00, 0x02]);
}

#[test]
fn test_arab_script_guard_returns_original() {
    // Append a GSUB whose script list names arab
    let mut gsub = vec![0u8; 10];
    BigEndian::write_u16(&mut gsub[0..2], 1);
    BigEndian::write_u16(&mut gsub[4..6], 10); // script list at +10
    gsub.extend_from_slice(&[0, 1]); // one script record
    gsub.extend_from_slice(b"arab");
    gsub.extend_from_slice(&[0, 0]);

    let base = common::build_truetype();
    let dir = SfntDirectory::parse(&base).unwrap();
    let mut tables: Vec<([u8; 4], Vec<u8>)> = dir
        .tables
        .keys()
        .map(|tag| (*tag, dir.table(&base, tag).unwrap().to_vec()))
        .collect();
    tables.push((*b"GSUB", gsub));
    let font = pdf_forge::fonts::sfnt::assemble(0x0001_0000, tables).unwrap();

    let used: BTreeSet<u16> = [1].into();
    let result = subset(&font, &used).unwrap();
    assert!(!result.subsetted);
    assert_eq!(result.data, font);
}
