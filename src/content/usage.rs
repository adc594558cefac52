//! Resource-usage analysis.
//!
//! A linear pass over parsed operations that records which named resources
//! a content stream actually touches: fonts at `Tf`, XObjects at `Do`,
//! shadings at `sh`, and `Pattern`-prefixed names under the colour
//! operators. The analyser also keeps the shown strings per font, which is
//! what the subsetter turns into a used-glyph set.

use std::collections::{BTreeSet, HashMap};

use crate::content::operation::{Operand, Operation};
use crate::object::Object;

/// Names referenced by a content stream, grouped by resource kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceUsage {
    /// Font names set with `Tf`
    pub fonts: BTreeSet<String>,
    /// XObject names painted with `Do`
    pub xobjects: BTreeSet<String>,
    /// Shading names painted with `sh`
    pub shadings: BTreeSet<String>,
    /// `Pattern*` names under `scn`/`SCN`/`cs`/`CS`
    pub patterns: BTreeSet<String>,
    /// Show-text string bytes grouped by the font current at the operator
    pub text_by_font: HashMap<String, Vec<Vec<u8>>>,
}

impl ResourceUsage {
    /// All shown bytes for one font, concatenated.
    pub fn shown_bytes(&self, font: &str) -> Vec<u8> {
        self.text_by_font
            .get(font)
            .map(|strings| strings.concat())
            .unwrap_or_default()
    }
}

/// Analyse operations, maintaining the current font from the most recent
/// `Tf`.
pub fn analyze_usage(operations: &[Operation]) -> ResourceUsage {
    let mut usage = ResourceUsage::default();
    let mut current_font: Option<String> = None;

    for op in operations {
        match op.operator.as_str() {
            "Tf" => {
                if let Some(name) = op.operands.first().and_then(|o| o.as_name()) {
                    usage.fonts.insert(name.to_string());
                    current_font = Some(name.to_string());
                }
            },
            "Do" => {
                if let Some(name) = op.operands.first().and_then(|o| o.as_name()) {
                    usage.xobjects.insert(name.to_string());
                }
            },
            "sh" => {
                if let Some(name) = op.operands.first().and_then(|o| o.as_name()) {
                    usage.shadings.insert(name.to_string());
                }
            },
            "scn" | "SCN" | "cs" | "CS" => {
                for operand in &op.operands {
                    if let Some(name) = operand.as_name() {
                        if name.starts_with("Pattern") {
                            usage.patterns.insert(name.to_string());
                        }
                    }
                }
            },
            // ' and " show text like Tj
            "Tj" | "'" => {
                if let (Some(font), Some(text)) =
                    (&current_font, op.operands.last().and_then(|o| o.as_string()))
                {
                    usage
                        .text_by_font
                        .entry(font.clone())
                        .or_default()
                        .push(text.to_vec());
                }
            },
            "\"" => {
                if let (Some(font), Some(text)) =
                    (&current_font, op.operands.get(2).and_then(|o| o.as_string()))
                {
                    usage
                        .text_by_font
                        .entry(font.clone())
                        .or_default()
                        .push(text.to_vec());
                }
            },
            "TJ" => {
                if let (Some(font), Some(Operand::Value(Object::Array(items)))) =
                    (&current_font, op.operands.first())
                {
                    for item in items {
                        if let Object::String(s) = item {
                            usage
                                .text_by_font
                                .entry(font.clone())
                                .or_default()
                                .push(s.clone());
                        }
                    }
                }
            },
            _ => {},
        }
    }

    usage
}
