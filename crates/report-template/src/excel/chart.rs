//! Chart series ranges
//!
//! Series in `xl/charts/*.xml` reference sheet data through `<c:f>` range
//! formulas. Once rows have been expanded those formulas are shifted with the
//! row map of the sheet they point at, so a series over a repeated row covers
//! every copy.

use super::rows::{shift_formula, RowMap};
use crate::directive::scan_chart_ranges;
use crate::Result;
use ooxml_core::xml::{escape_text, tokenize};
use ooxml_core::Package;
use std::collections::HashMap;

const CHART_DIR: &str = "xl/charts/";

/// Chart parts of a workbook package
pub fn chart_parts(package: &Package) -> Vec<String> {
    package
        .part_names()
        .filter(|name| name.starts_with(CHART_DIR) && name.ends_with(".xml"))
        .filter(|name| !name[CHART_DIR.len()..].contains('/'))
        .map(str::to_string)
        .collect()
}

/// Shift every range formula of a chart part; `None` if nothing moved
pub fn shift_chart(part: &str, xml: &str, shifts: &[(&str, &RowMap)]) -> Result<Option<String>> {
    let ranges = scan_chart_ranges(part, xml)?;
    if ranges.is_empty() || shifts.is_empty() {
        return Ok(None);
    }

    let mut moved: HashMap<usize, String> = HashMap::new();
    for range in &ranges {
        let mut formula = range.path.clone();
        for (sheet, map) in shifts {
            formula = shift_formula(&formula, sheet, false, *map);
        }
        if formula != range.path {
            moved.insert(range.location.offset, formula);
        }
    }
    if moved.is_empty() {
        return Ok(None);
    }

    let mut out = String::with_capacity(xml.len());
    for token in tokenize(xml)? {
        match moved.get(&token.span.start) {
            Some(formula) => out.push_str(&escape_text(formula)),
            None => out.push_str(token.raw(xml)),
        }
    }
    tracing::debug!(part, ranges = ranges.len(), shifted = moved.len(), "shifted chart ranges");
    Ok(Some(out))
}
