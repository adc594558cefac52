//! GSUB glyph-substitution closure.
//!
//! Subsetting must keep every glyph a shaping engine could substitute in:
//! ligatures, alternates, single and multiple substitutions, and the
//! outputs of contextual rules. This module walks the GSUB lookup list and
//! grows a glyph set to a fixed point.
//!
//! Contextual and chained-contextual lookups are handled conservatively:
//! their referenced lookup indices are triggered without consuming GIDs
//! from context, which over-approximates the reachable set but never
//! drops a needed glyph.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeSet;

/// Whether the GSUB script list names the given script tag.
pub fn has_script(gsub: &[u8], script_tag: &[u8; 4]) -> bool {
    let Some(script_list_offset) = read_u16(gsub, 4) else {
        return false;
    };
    let base = script_list_offset as usize;
    let Some(count) = read_u16(gsub, base) else {
        return false;
    };
    for i in 0..count as usize {
        let record = base + 2 + i * 6;
        if gsub.get(record..record + 4) == Some(script_tag.as_slice()) {
            return true;
        }
    }
    false
}

/// Expand `glyphs` with every GSUB substitution target whose inputs are
/// already present, iterating to a fixed point.
pub fn close_over_gsub(gsub: &[u8], glyphs: &mut BTreeSet<u16>) {
    let Some(lookup_list_offset) = read_u16(gsub, 8) else {
        return;
    };
    let lookup_list = lookup_list_offset as usize;
    let Some(lookup_count) = read_u16(gsub, lookup_list) else {
        return;
    };

    let lookup_offsets: Vec<usize> = (0..lookup_count as usize)
        .filter_map(|i| read_u16(gsub, lookup_list + 2 + i * 2))
        .map(|off| lookup_list + off as usize)
        .collect();

    loop {
        let before = glyphs.len();
        for &lookup in &lookup_offsets {
            apply_lookup(gsub, lookup, &lookup_offsets, glyphs, 0);
        }
        if glyphs.len() == before {
            break;
        }
    }
}

/// Apply one lookup table. `depth` bounds extension/contextual recursion.
fn apply_lookup(
    gsub: &[u8],
    lookup: usize,
    all_lookups: &[usize],
    glyphs: &mut BTreeSet<u16>,
    depth: usize,
) {
    if depth > 4 {
        return;
    }
    let Some(lookup_type) = read_u16(gsub, lookup) else {
        return;
    };
    let Some(subtable_count) = read_u16(gsub, lookup + 4) else {
        return;
    };

    for i in 0..subtable_count as usize {
        let Some(rel) = read_u16(gsub, lookup + 6 + i * 2) else {
            continue;
        };
        let subtable = lookup + rel as usize;
        apply_subtable(gsub, subtable, lookup_type, all_lookups, glyphs, depth);
    }
}

fn apply_subtable(
    gsub: &[u8],
    subtable: usize,
    lookup_type: u16,
    all_lookups: &[usize],
    glyphs: &mut BTreeSet<u16>,
    depth: usize,
) {
    match lookup_type {
        1 => apply_single(gsub, subtable, glyphs),
        2 => apply_sequence_sets(gsub, subtable, glyphs), // Multiple
        3 => apply_sequence_sets(gsub, subtable, glyphs), // Alternate, same layout
        4 => apply_ligature(gsub, subtable, glyphs),
        5 | 6 => apply_contextual(gsub, subtable, lookup_type, all_lookups, glyphs, depth),
        7 => {
            // Extension: substFormat, extensionLookupType, extensionOffset
            let (Some(ext_type), Some(ext_offset)) =
                (read_u16(gsub, subtable + 2), read_u32(gsub, subtable + 4))
            else {
                return;
            };
            apply_subtable(
                gsub,
                subtable + ext_offset as usize,
                ext_type,
                all_lookups,
                glyphs,
                depth + 1,
            );
        },
        8 => apply_reverse_chain(gsub, subtable, glyphs),
        _ => {},
    }
}

/// Single substitution, format 1 (delta) and format 2 (list).
fn apply_single(gsub: &[u8], subtable: usize, glyphs: &mut BTreeSet<u16>) {
    let (Some(format), Some(coverage_rel)) = (read_u16(gsub, subtable), read_u16(gsub, subtable + 2))
    else {
        return;
    };
    let covered = parse_coverage(gsub, subtable + coverage_rel as usize);

    match format {
        1 => {
            let Some(delta) = read_u16(gsub, subtable + 4) else {
                return;
            };
            for glyph in covered {
                if glyphs.contains(&glyph) {
                    glyphs.insert(glyph.wrapping_add(delta));
                }
            }
        },
        2 => {
            let Some(count) = read_u16(gsub, subtable + 4) else {
                return;
            };
            for (index, glyph) in covered.iter().enumerate().take(count as usize) {
                if glyphs.contains(glyph) {
                    if let Some(substitute) = read_u16(gsub, subtable + 6 + index * 2) {
                        glyphs.insert(substitute);
                    }
                }
            }
        },
        _ => {},
    }
}

/// Multiple (type 2) and Alternate (type 3) share the sequence-set layout:
/// coverage, setCount, set offsets; each set is a glyph count plus glyphs.
fn apply_sequence_sets(gsub: &[u8], subtable: usize, glyphs: &mut BTreeSet<u16>) {
    let (Some(format), Some(coverage_rel), Some(set_count)) = (
        read_u16(gsub, subtable),
        read_u16(gsub, subtable + 2),
        read_u16(gsub, subtable + 4),
    ) else {
        return;
    };
    if format != 1 {
        return;
    }
    let covered = parse_coverage(gsub, subtable + coverage_rel as usize);

    for (index, glyph) in covered.iter().enumerate().take(set_count as usize) {
        if !glyphs.contains(glyph) {
            continue;
        }
        let Some(set_rel) = read_u16(gsub, subtable + 6 + index * 2) else {
            continue;
        };
        let set = subtable + set_rel as usize;
        let Some(glyph_count) = read_u16(gsub, set) else {
            continue;
        };
        for j in 0..glyph_count as usize {
            if let Some(substitute) = read_u16(gsub, set + 2 + j * 2) {
                glyphs.insert(substitute);
            }
        }
    }
}

/// Ligature substitution: the ligature glyph joins the set when the first
/// glyph and every component are already present.
fn apply_ligature(gsub: &[u8], subtable: usize, glyphs: &mut BTreeSet<u16>) {
    let (Some(format), Some(coverage_rel), Some(set_count)) = (
        read_u16(gsub, subtable),
        read_u16(gsub, subtable + 2),
        read_u16(gsub, subtable + 4),
    ) else {
        return;
    };
    if format != 1 {
        return;
    }
    let covered = parse_coverage(gsub, subtable + coverage_rel as usize);

    let mut additions = Vec::new();
    for (index, first_glyph) in covered.iter().enumerate().take(set_count as usize) {
        if !glyphs.contains(first_glyph) {
            continue;
        }
        let Some(set_rel) = read_u16(gsub, subtable + 6 + index * 2) else {
            continue;
        };
        let set = subtable + set_rel as usize;
        let Some(ligature_count) = read_u16(gsub, set) else {
            continue;
        };

        for j in 0..ligature_count as usize {
            let Some(lig_rel) = read_u16(gsub, set + 2 + j * 2) else {
                continue;
            };
            let lig = set + lig_rel as usize;
            let (Some(ligature_glyph), Some(component_count)) =
                (read_u16(gsub, lig), read_u16(gsub, lig + 2))
            else {
                continue;
            };
            // Components after the first; all must be in the set already
            let components_present = (1..component_count as usize).all(|k| {
                read_u16(gsub, lig + 4 + (k - 1) * 2)
                    .is_some_and(|component| glyphs.contains(&component))
            });
            if components_present {
                additions.push(ligature_glyph);
            }
        }
    }
    glyphs.extend(additions);
}

/// Contextual (5) and chained-contextual (6): trigger referenced lookups.
///
/// Formats 1 and 2 nest rule sets whose rules end in SubstLookupRecord
/// arrays; format 3 lists coverages followed by the records. Rather than
/// matching contexts, every referenced lookup fires.
fn apply_contextual(
    gsub: &[u8],
    subtable: usize,
    lookup_type: u16,
    all_lookups: &[usize],
    glyphs: &mut BTreeSet<u16>,
    depth: usize,
) {
    let Some(format) = read_u16(gsub, subtable) else {
        return;
    };

    let mut referenced: Vec<u16> = Vec::new();
    match (lookup_type, format) {
        (5, 1) | (5, 2) => collect_rule_set_lookups(gsub, subtable, false, &mut referenced),
        (6, 1) | (6, 2) => collect_rule_set_lookups(gsub, subtable, true, &mut referenced),
        (5, 3) => {
            // glyphCount, substCount, coverages[glyphCount], records
            let (Some(glyph_count), Some(subst_count)) =
                (read_u16(gsub, subtable + 2), read_u16(gsub, subtable + 4))
            else {
                return;
            };
            let records = subtable + 6 + glyph_count as usize * 2;
            collect_subst_records(gsub, records, subst_count, &mut referenced);
        },
        (6, 3) => {
            // backtrack, input and lookahead coverage arrays, then records
            let mut pos = subtable + 2;
            for _ in 0..3 {
                let Some(count) = read_u16(gsub, pos) else {
                    return;
                };
                pos += 2 + count as usize * 2;
            }
            let Some(subst_count) = read_u16(gsub, pos) else {
                return;
            };
            collect_subst_records(gsub, pos + 2, subst_count, &mut referenced);
        },
        _ => {},
    }

    for lookup_index in referenced {
        if let Some(&lookup) = all_lookups.get(lookup_index as usize) {
            apply_lookup(gsub, lookup, all_lookups, glyphs, depth + 1);
        }
    }
}

/// Walk format 1/2 rule sets to their trailing SubstLookupRecord arrays.
///
/// Rules of chained lookups carry three glyph sequences instead of one;
/// `chained` selects the layout.
fn collect_rule_set_lookups(gsub: &[u8], subtable: usize, chained: bool, out: &mut Vec<u16>) {
    // coverage(+classdefs for format 2) precede the set count; the set
    // count position depends on the format
    let Some(format) = read_u16(gsub, subtable) else {
        return;
    };
    let set_count_pos = match (format, chained) {
        (1, _) => subtable + 4,
        (2, false) => subtable + 6,
        (2, true) => subtable + 10,
        _ => return,
    };
    let Some(set_count) = read_u16(gsub, set_count_pos) else {
        return;
    };

    for i in 0..set_count as usize {
        let Some(set_rel) = read_u16(gsub, set_count_pos + 2 + i * 2) else {
            continue;
        };
        if set_rel == 0 {
            continue;
        }
        let set = subtable + set_rel as usize;
        let Some(rule_count) = read_u16(gsub, set) else {
            continue;
        };

        for j in 0..rule_count as usize {
            let Some(rule_rel) = read_u16(gsub, set + 2 + j * 2) else {
                continue;
            };
            let rule = set + rule_rel as usize;

            if chained {
                // backtrackCount glyphs, inputCount-1 glyphs, lookaheadCount glyphs
                let Some(backtrack) = read_u16(gsub, rule) else {
                    continue;
                };
                let mut pos = rule + 2 + backtrack as usize * 2;
                let Some(input) = read_u16(gsub, pos) else {
                    continue;
                };
                pos += 2 + input.saturating_sub(1) as usize * 2;
                let Some(lookahead) = read_u16(gsub, pos) else {
                    continue;
                };
                pos += 2 + lookahead as usize * 2;
                let Some(subst_count) = read_u16(gsub, pos) else {
                    continue;
                };
                collect_subst_records(gsub, pos + 2, subst_count, out);
            } else {
                // glyphCount, substCount, input glyphs, records
                let (Some(glyph_count), Some(subst_count)) =
                    (read_u16(gsub, rule), read_u16(gsub, rule + 2))
                else {
                    continue;
                };
                let records = rule + 4 + glyph_count.saturating_sub(1) as usize * 2;
                collect_subst_records(gsub, records, subst_count, out);
            }
        }
    }
}

/// SubstLookupRecord: (sequenceIndex, lookupListIndex) pairs.
fn collect_subst_records(gsub: &[u8], pos: usize, count: u16, out: &mut Vec<u16>) {
    for i in 0..count as usize {
        if let Some(lookup_index) = read_u16(gsub, pos + i * 4 + 2) {
            out.push(lookup_index);
        }
    }
}

/// Coverage table: the covered glyphs in coverage-index order.
fn parse_coverage(gsub: &[u8], coverage: usize) -> Vec<u16> {
    let mut covered = Vec::new();
    let (Some(format), Some(count)) = (read_u16(gsub, coverage), read_u16(gsub, coverage + 2))
    else {
        return covered;
    };

    match format {
        1 => {
            for i in 0..count as usize {
                if let Some(glyph) = read_u16(gsub, coverage + 4 + i * 2) {
                    covered.push(glyph);
                }
            }
        },
        2 => {
            for i in 0..count as usize {
                let record = coverage + 4 + i * 6;
                let (Some(start), Some(end)) = (read_u16(gsub, record), read_u16(gsub, record + 2))
                else {
                    continue;
                };
                if end >= start && (end - start) < 0xFFFF {
                    covered.extend(start..=end);
                }
            }
        },
        _ => {},
    }
    covered
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(BigEndian::read_u16)
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4).map(BigEndian::read_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-build a GSUB with one script record and the given lookups.
    /// Lookup bodies are appended verbatim at computed offsets.
    fn build_gsub(script: &[u8; 4], lookups: &[Vec<u8>]) -> Vec<u8> {
        let mut gsub = vec![0u8; 10];
        BigEndian::write_u16(&mut gsub[0..2], 1); // major

        // ScriptList directly after the header
        let script_list = gsub.len();
        BigEndian::write_u16(&mut gsub[4..6], script_list as u16);
        gsub.extend_from_slice(&[0, 1]); // scriptCount
        gsub.extend_from_slice(script);
        gsub.extend_from_slice(&[0, 0]); // script table offset (unused)

        // LookupList
        let lookup_list = gsub.len();
        BigEndian::write_u16(&mut gsub[8..10], lookup_list as u16);
        let count = lookups.len();
        gsub.extend_from_slice(&(count as u16).to_be_bytes());
        // Reserve lookup offset slots
        let offsets_pos = gsub.len();
        gsub.extend(std::iter::repeat(0u8).take(count * 2));
        for (i, lookup) in lookups.iter().enumerate() {
            let rel = (gsub.len() - lookup_list) as u16;
            gsub[offsets_pos + i * 2..offsets_pos + i * 2 + 2].copy_from_slice(&rel.to_be_bytes());
            gsub.extend_from_slice(lookup);
        }
        gsub
    }

    /// Lookup wrapper: type, flag 0, one subtable at +8.
    fn lookup_with_subtable(lookup_type: u16, subtable: Vec<u8>) -> Vec<u8> {
        let mut lookup = Vec::new();
        lookup.extend_from_slice(&lookup_type.to_be_bytes());
        lookup.extend_from_slice(&[0, 0]); // flag
        lookup.extend_from_slice(&1u16.to_be_bytes()); // subtableCount
        lookup.extend_from_slice(&8u16.to_be_bytes()); // offset to subtable
        lookup.extend_from_slice(&subtable);
        lookup
    }

    /// Coverage format 1 over the given glyphs.
    fn coverage(glyphs: &[u16]) -> Vec<u8> {
        let mut cov = Vec::new();
        cov.extend_from_slice(&1u16.to_be_bytes());
        cov.extend_from_slice(&(glyphs.len() as u16).to_be_bytes());
        for g in glyphs {
            cov.extend_from_slice(&g.to_be_bytes());
        }
        cov
    }

    /// Single substitution format 2: covered[i] -> substitutes[i].
    fn single_subst(inputs: &[u16], outputs: &[u16]) -> Vec<u8> {
        let mut sub = Vec::new();
        sub.extend_from_slice(&2u16.to_be_bytes()); // format 2
        let coverage_rel = 6 + outputs.len() * 2;
        sub.extend_from_slice(&(coverage_rel as u16).to_be_bytes());
        sub.extend_from_slice(&(outputs.len() as u16).to_be_bytes());
        for g in outputs {
            sub.extend_from_slice(&g.to_be_bytes());
        }
        sub.extend_from_slice(&coverage(inputs));
        sub
    }

    /// Ligature subtable: first + components -> ligature.
    fn ligature_subst(first: u16, components: &[u16], ligature: u16) -> Vec<u8> {
        let mut sub = Vec::new();
        sub.extend_from_slice(&1u16.to_be_bytes()); // format
        // coverage after: header(6) + setOffset(2) happens inside; layout:
        // [format, covRel, setCount=1, setRel, ligSet, coverage]
        let lig_set: Vec<u8> = {
            let mut set = Vec::new();
            set.extend_from_slice(&1u16.to_be_bytes()); // ligatureCount
            set.extend_from_slice(&4u16.to_be_bytes()); // rel to ligature
            set.extend_from_slice(&ligature.to_be_bytes());
            set.extend_from_slice(&((components.len() + 1) as u16).to_be_bytes());
            for c in components {
                set.extend_from_slice(&c.to_be_bytes());
            }
            set
        };
        let set_rel = 8u16;
        let coverage_rel = 8 + lig_set.len() as u16;
        sub.extend_from_slice(&coverage_rel.to_be_bytes());
        sub.extend_from_slice(&1u16.to_be_bytes()); // setCount
        sub.extend_from_slice(&set_rel.to_be_bytes());
        sub.extend_from_slice(&lig_set);
        sub.extend_from_slice(&coverage(&[first]));
        sub
    }

    #[test]
    fn test_script_guard() {
        let gsub = build_gsub(b"arab", &[]);
        assert!(has_script(&gsub, b"arab"));
        assert!(!has_script(&gsub, b"latn"));
    }

    #[test]
    fn test_single_substitution_closure() {
        let lookup = lookup_with_subtable(1, single_subst(&[10, 11], &[100, 101]));
        let gsub = build_gsub(b"latn", &[lookup]);

        let mut glyphs: BTreeSet<u16> = [10].into();
        close_over_gsub(&gsub, &mut glyphs);
        assert!(glyphs.contains(&100));
        assert!(!glyphs.contains(&101)); // input 11 absent
    }

    #[test]
    fn test_ligature_requires_all_components() {
        // fi ligature: 20 + 21 -> 200
        let lookup = lookup_with_subtable(4, ligature_subst(20, &[21], 200));
        let gsub = build_gsub(b"latn", &[lookup]);

        let mut partial: BTreeSet<u16> = [20].into();
        close_over_gsub(&gsub, &mut partial);
        assert!(!partial.contains(&200));

        let mut full: BTreeSet<u16> = [20, 21].into();
        close_over_gsub(&gsub, &mut full);
        assert!(full.contains(&200));
    }

    #[test]
    fn test_transitive_closure_to_fixed_point() {
        // 10 -> 50 in one lookup, 50 -> 60 in another; both land
        let first = lookup_with_subtable(1, single_subst(&[10], &[50]));
        let second = lookup_with_subtable(1, single_subst(&[50], &[60]));
        let gsub = build_gsub(b"latn", &[first, second]);

        let mut glyphs: BTreeSet<u16> = [10].into();
        close_over_gsub(&gsub, &mut glyphs);
        assert!(glyphs.contains(&50));
        assert!(glyphs.contains(&60));
    }

    #[test]
    fn test_extension_wrapping() {
        // Extension (type 7) wrapping a single substitution
        let inner = single_subst(&[30], &[300]);
        let mut ext = Vec::new();
        ext.extend_from_slice(&1u16.to_be_bytes()); // substFormat
        ext.extend_from_slice(&1u16.to_be_bytes()); // extensionLookupType
        ext.extend_from_slice(&8u32.to_be_bytes()); // extensionOffset
        ext.extend_from_slice(&inner);
        let lookup = lookup_with_subtable(7, ext);
        let gsub = build_gsub(b"latn", &[lookup]);

        let mut glyphs: BTreeSet<u16> = [30].into();
        close_over_gsub(&gsub, &mut glyphs);
        assert!(glyphs.contains(&300));
    }

    #[test]
    fn test_contextual_format3_triggers_referenced_lookup() {
        // Lookup 0: contextual format 3 referencing lookup 1
        // Lookup 1: single subst 40 -> 400
        let mut ctx = Vec::new();
        ctx.extend_from_slice(&3u16.to_be_bytes()); // format 3
        ctx.extend_from_slice(&0u16.to_be_bytes()); // glyphCount 0 (degenerate)
        ctx.extend_from_slice(&1u16.to_be_bytes()); // substCount
        // SubstLookupRecord: sequenceIndex 0, lookupListIndex 1
        ctx.extend_from_slice(&0u16.to_be_bytes());
        ctx.extend_from_slice(&1u16.to_be_bytes());
        let contextual = lookup_with_subtable(5, ctx);
        let target = lookup_with_subtable(1, single_subst(&[40], &[400]));
        let gsub = build_gsub(b"latn", &[contextual, target]);

        let mut glyphs: BTreeSet<u16> = [40].into();
        close_over_gsub(&gsub, &mut glyphs);
        assert!(glyphs.contains(&400));
    }

    #[test]
    fn test_truncated_gsub_is_harmless() {
        let mut glyphs: BTreeSet<u16> = [1, 2].into();
        close_over_gsub(&[0, 1, 0, 0, 0], &mut glyphs);
        assert_eq!(glyphs.len(), 2);
    }
}
