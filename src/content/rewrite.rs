//! Show-text rewriting after font subsetting.
//!
//! When a font has been subsetted its glyph IDs are renumbered, and every
//! string shown with that font must be rewritten. Strings are treated as
//! sequences of 16-bit big-endian CIDs (Identity-H, where CID equals GID);
//! subsetting is gated on Identity-H fonts so this reading is safe. The
//! `'` and `"` operators show text like `Tj`.
//!
//! A string whose CIDs are not all present in the map is left intact:
//! substituting glyphs would corrupt the page worse than an oversized
//! font file does.

use std::collections::HashMap;

use crate::content::operation::{Operand, Operation};
use crate::object::Object;

/// Per-font CID remap tables keyed by resource name.
pub type CidRemaps = HashMap<String, HashMap<u16, u16>>;

/// Rewrite operations for subsetted fonts, returning the new sequence.
///
/// The current font is tracked from the most recent `Tf`; only strings
/// shown while a remapped font is current are touched.
pub fn remap_content(operations: &[Operation], remaps: &CidRemaps) -> Vec<Operation> {
    let mut output = Vec::with_capacity(operations.len());
    let mut current_remap: Option<&HashMap<u16, u16>> = None;

    for op in operations {
        match op.operator.as_str() {
            "Tf" => {
                current_remap = op
                    .operands
                    .first()
                    .and_then(|o| o.as_name())
                    .and_then(|name| remaps.get(name));
                output.push(op.clone());
            },
            "Tj" | "'" => match current_remap {
                Some(remap) => output.push(rewrite_string_operand(op, op.operands.len() - 1, remap)),
                None => output.push(op.clone()),
            },
            "\"" => match current_remap {
                Some(remap) if op.operands.len() >= 3 => {
                    output.push(rewrite_string_operand(op, 2, remap))
                },
                _ => output.push(op.clone()),
            },
            "TJ" => match current_remap {
                Some(remap) => output.push(rewrite_tj(op, remap)),
                None => output.push(op.clone()),
            },
            _ => output.push(op.clone()),
        }
    }

    output
}

fn rewrite_string_operand(op: &Operation, index: usize, remap: &HashMap<u16, u16>) -> Operation {
    let mut rewritten = op.clone();
    if let Some(Operand::Value(Object::String(bytes))) = rewritten.operands.get_mut(index) {
        if let Some(new_bytes) = remap_cid_string(bytes, remap) {
            *bytes = new_bytes;
        }
    }
    rewritten
}

fn rewrite_tj(op: &Operation, remap: &HashMap<u16, u16>) -> Operation {
    let mut rewritten = op.clone();
    if let Some(Operand::Value(Object::Array(items))) = rewritten.operands.first_mut() {
        for item in items {
            if let Object::String(bytes) = item {
                if let Some(new_bytes) = remap_cid_string(bytes, remap) {
                    *bytes = new_bytes;
                }
            }
        }
    }
    rewritten
}

/// Remap a 2-byte-BE CID string. Returns None (leave intact) when the
/// length is odd or any CID has no mapping.
fn remap_cid_string(bytes: &[u8], remap: &HashMap<u16, u16>) -> Option<Vec<u8>> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let mut out = Vec::with_capacity(bytes.len());
    for pair in bytes.chunks_exact(2) {
        let cid = u16::from_be_bytes([pair[0], pair[1]]);
        let new_cid = *remap.get(&cid)?;
        out.extend_from_slice(&new_cid.to_be_bytes());
    }
    Some(out)
}
