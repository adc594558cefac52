//! TrueType subsetting.
//!
//! Takes the original font bytes and the set of used glyph IDs, and
//! produces a smaller valid sfnt: glyph closure (composite references and
//! GSUB substitutions), compact renumbering, `glyf`/`loca`/`hmtx`/`maxp`
//! rebuild and directory assembly with a balanced checksum.
//!
//! Fonts this code must not touch are returned unchanged: non-TrueType
//! containers (no `glyf`), fonts missing an essential table, and fonts
//! whose GSUB carries the `arab` script, where a naive subset would break
//! shaping.

use byteorder::{BigEndian, ByteOrder};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::fonts::gsub::{close_over_gsub, has_script};
use crate::fonts::sfnt::{SfntDirectory, assemble};

/// Tables a TrueType subset cannot do without.
const ESSENTIAL_TABLES: [&[u8; 4]; 6] = [b"glyf", b"loca", b"head", b"maxp", b"hhea", b"hmtx"];

/// Layout and hinting tables dropped from the subset: shaping is already
/// baked into the closure and PDF viewers consume the glyphs via CIDs.
const DROPPED_TABLES: [&[u8; 4]; 6] = [b"GSUB", b"GPOS", b"GDEF", b"BASE", b"JSTF", b"DSIG"];

/// Result of subsetting one font.
#[derive(Debug, Clone)]
pub struct SubsetResult {
    /// The subset font, or a copy of the input when subsetting declined
    pub data: Vec<u8>,
    /// old GID -> new GID for every retained glyph
    pub gid_map: BTreeMap<u16, u16>,
    /// Whether the bytes were actually rewritten
    pub subsetted: bool,
}

/// Subset a TrueType font to the glyphs in `used_gids` (plus closure).
///
/// Returns the original bytes untouched when the font is not a TrueType,
/// an essential table is missing, the GSUB names the `arab` script, or
/// the rebuilt font would not be smaller.
pub fn subset(font_data: &[u8], used_gids: &BTreeSet<u16>) -> Result<SubsetResult> {
    let unchanged = |font_data: &[u8]| SubsetResult {
        data: font_data.to_vec(),
        gid_map: BTreeMap::new(),
        subsetted: false,
    };

    let directory = match SfntDirectory::parse(font_data) {
        Ok(dir) => dir,
        Err(e) => return Err(e),
    };

    if !directory.has_tables(&ESSENTIAL_TABLES) {
        log::debug!("font missing an essential TrueType table, returning original");
        return Ok(unchanged(font_data));
    }

    if let Some(gsub) = directory.table(font_data, b"GSUB") {
        if has_script(gsub, b"arab") {
            log::debug!("GSUB carries arab script, declining to subset");
            return Ok(unchanged(font_data));
        }
    }

    let head = directory.table(font_data, b"head").unwrap();
    let maxp = directory.table(font_data, b"maxp").unwrap();
    let hhea = directory.table(font_data, b"hhea").unwrap();
    let hmtx = directory.table(font_data, b"hmtx").unwrap();
    let glyf = directory.table(font_data, b"glyf").unwrap();
    let loca = directory.table(font_data, b"loca").unwrap();

    if head.len() < 54 || maxp.len() < 6 || hhea.len() < 36 {
        return Err(Error::FontMalformed("header table truncated".to_string()));
    }

    let num_glyphs = BigEndian::read_u16(&maxp[4..6]);
    let long_loca = BigEndian::read_i16(&head[50..52]) == 1;
    let loca_offsets = parse_loca(loca, num_glyphs, long_loca)?;
    let number_of_hmetrics = BigEndian::read_u16(&hhea[34..36]);

    // Closure: .notdef, the requested GIDs, composite components, GSUB
    let mut closure: BTreeSet<u16> = used_gids
        .iter()
        .copied()
        .filter(|gid| *gid < num_glyphs)
        .collect();
    closure.insert(0);
    close_over_composites(glyf, &loca_offsets, &mut closure);
    if let Some(gsub) = directory.table(font_data, b"GSUB") {
        let before = closure.len();
        close_over_gsub(gsub, &mut closure);
        closure.retain(|gid| *gid < num_glyphs);
        if closure.len() != before {
            // GSUB may pull in new composites
            close_over_composites(glyf, &loca_offsets, &mut closure);
        }
    }

    // Renumber: GID 0 stays, survivors sort ascending into 1..N
    let mut gid_map: BTreeMap<u16, u16> = BTreeMap::new();
    for (new_gid, old_gid) in closure.iter().enumerate() {
        gid_map.insert(*old_gid, new_gid as u16);
    }
    let new_num_glyphs = gid_map.len() as u16;

    // glyf/loca rebuild: copy kept glyph bytes, remap composite refs
    let mut new_glyf: Vec<u8> = Vec::new();
    let mut new_loca: Vec<u8> = Vec::with_capacity((new_num_glyphs as usize + 1) * 4);
    for &old_gid in &closure {
        new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());
        let (start, end) = glyph_span(&loca_offsets, old_gid);
        if end > start && end <= glyf.len() {
            let mut glyph = glyf[start..end].to_vec();
            remap_composite_refs(&mut glyph, &gid_map);
            new_glyf.extend_from_slice(&glyph);
            // Glyph data stays 2-byte aligned as in the original
            if new_glyf.len() % 2 != 0 {
                new_glyf.push(0);
            }
        }
    }
    new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());

    // hmtx rebuild: full metrics for every new GID
    let mut new_hmtx = Vec::with_capacity(new_num_glyphs as usize * 4);
    for &old_gid in &closure {
        let (advance, lsb) = horizontal_metrics(hmtx, number_of_hmetrics, old_gid);
        new_hmtx.extend_from_slice(&advance.to_be_bytes());
        new_hmtx.extend_from_slice(&lsb.to_be_bytes());
    }

    // Patched headers: long loca, new glyph and metric counts
    let mut new_head = head.to_vec();
    BigEndian::write_i16(&mut new_head[50..52], 1);
    let mut new_maxp = maxp.to_vec();
    BigEndian::write_u16(&mut new_maxp[4..6], new_num_glyphs);
    let mut new_hhea = hhea.to_vec();
    BigEndian::write_u16(&mut new_hhea[34..36], new_num_glyphs);

    let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"glyf", new_glyf),
        (*b"loca", new_loca),
        (*b"head", new_head),
        (*b"maxp", new_maxp),
        (*b"hhea", new_hhea),
        (*b"hmtx", new_hmtx),
    ];

    // Everything else carries over verbatim, minus the dropped layout set
    for (tag, _) in &directory.tables {
        let rebuilt = tables.iter().any(|(t, _)| t == tag);
        let dropped = DROPPED_TABLES.iter().any(|d| *d == tag);
        if !rebuilt && !dropped {
            if let Some(body) = directory.table(font_data, tag) {
                tables.push((*tag, body.to_vec()));
            }
        }
    }

    let data = assemble(directory.version, tables)?;

    // A subset that fails to shrink is not worth the rewrite
    if data.len() >= font_data.len() {
        log::debug!("subset did not shrink the font ({} >= {})", data.len(), font_data.len());
        return Ok(unchanged(font_data));
    }

    Ok(SubsetResult {
        data,
        gid_map,
        subsetted: true,
    })
}

/// Expand the glyph set with composite components, to a fixed point.
fn close_over_composites(glyf: &[u8], loca: &[usize], glyphs: &mut BTreeSet<u16>) {
    loop {
        let mut additions: Vec<u16> = Vec::new();
        for &gid in glyphs.iter() {
            let (start, end) = glyph_span(loca, gid);
            if end <= start || end > glyf.len() {
                continue;
            }
            for component in composite_components(&glyf[start..end]) {
                if !glyphs.contains(&component) {
                    additions.push(component);
                }
            }
        }
        if additions.is_empty() {
            break;
        }
        glyphs.extend(additions);
    }
}

/// Component GIDs of a composite glyph; empty for simple glyphs.
fn composite_components(glyph: &[u8]) -> Vec<u16> {
    let mut components = Vec::new();
    if glyph.len() < 10 {
        return components;
    }
    let number_of_contours = BigEndian::read_i16(&glyph[0..2]);
    if number_of_contours >= 0 {
        return components;
    }

    const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
    const WE_HAVE_A_SCALE: u16 = 0x0008;
    const MORE_COMPONENTS: u16 = 0x0020;
    const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
    const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

    let mut pos = 10;
    loop {
        if pos + 4 > glyph.len() {
            break;
        }
        let flags = BigEndian::read_u16(&glyph[pos..pos + 2]);
        let glyph_index = BigEndian::read_u16(&glyph[pos + 2..pos + 4]);
        components.push(glyph_index);
        pos += 4;

        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }

        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    components
}

/// Rewrite component GIDs of a composite glyph in place.
fn remap_composite_refs(glyph: &mut [u8], gid_map: &BTreeMap<u16, u16>) {
    if glyph.len() < 10 || BigEndian::read_i16(&glyph[0..2]) >= 0 {
        return;
    }

    const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
    const WE_HAVE_A_SCALE: u16 = 0x0008;
    const MORE_COMPONENTS: u16 = 0x0020;
    const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
    const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

    let mut pos = 10;
    loop {
        if pos + 4 > glyph.len() {
            break;
        }
        let flags = BigEndian::read_u16(&glyph[pos..pos + 2]);
        let old_index = BigEndian::read_u16(&glyph[pos + 2..pos + 4]);
        if let Some(&new_index) = gid_map.get(&old_index) {
            BigEndian::write_u16(&mut glyph[pos + 2..pos + 4], new_index);
        }
        pos += 4;

        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }

        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
}

/// Decode loca into numGlyphs+1 byte offsets into glyf.
fn parse_loca(loca: &[u8], num_glyphs: u16, long_format: bool) -> Result<Vec<usize>> {
    let count = num_glyphs as usize + 1;
    let needed = count * if long_format { 4 } else { 2 };
    if loca.len() < needed {
        return Err(Error::FontMalformed(format!(
            "loca has {} bytes, needs {} for {} glyphs",
            loca.len(),
            needed,
            num_glyphs
        )));
    }

    let offsets: Vec<usize> = if long_format {
        (0..count)
            .map(|i| BigEndian::read_u32(&loca[i * 4..i * 4 + 4]) as usize)
            .collect()
    } else {
        (0..count)
            .map(|i| BigEndian::read_u16(&loca[i * 2..i * 2 + 2]) as usize * 2)
            .collect()
    };

    // loca[i+1] >= loca[i] for a valid font
    if offsets.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(Error::FontMalformed("loca offsets are not monotonic".to_string()));
    }
    Ok(offsets)
}

/// Byte span of one glyph inside glyf.
fn glyph_span(loca: &[usize], gid: u16) -> (usize, usize) {
    let i = gid as usize;
    if i + 1 >= loca.len() {
        return (0, 0);
    }
    (loca[i], loca[i + 1])
}

/// Advance width and left side bearing for a glyph.
///
/// GIDs past `numberOfHMetrics` share the last advance and read their lsb
/// from the trailing array.
fn horizontal_metrics(hmtx: &[u8], number_of_hmetrics: u16, gid: u16) -> (u16, i16) {
    let metrics_count = number_of_hmetrics.max(1);
    if gid < metrics_count {
        let pos = gid as usize * 4;
        if pos + 4 <= hmtx.len() {
            return (
                BigEndian::read_u16(&hmtx[pos..pos + 2]),
                BigEndian::read_i16(&hmtx[pos + 2..pos + 4]),
            );
        }
        return (0, 0);
    }

    let last_advance_pos = (metrics_count as usize - 1) * 4;
    let advance = if last_advance_pos + 2 <= hmtx.len() {
        BigEndian::read_u16(&hmtx[last_advance_pos..last_advance_pos + 2])
    } else {
        0
    };
    let lsb_pos = metrics_count as usize * 4 + (gid - metrics_count) as usize * 2;
    let lsb = if lsb_pos + 2 <= hmtx.len() {
        BigEndian::read_i16(&hmtx[lsb_pos..lsb_pos + 2])
    } else {
        0
    };
    (advance, lsb)
}
