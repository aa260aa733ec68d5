//! Row bookkeeping after block expansion
//!
//! Expanding a repeating block changes where every later row lands. The
//! [`RowMap`] records the expanded top-level blocks of one sheet and maps
//! template rows to output rows; everything that carries a row number
//! (cell refs, merges, sqrefs, formulas, defined names, chart series) is
//! rewritten through it.

use ooxml_core::{CellRange, CellRef};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Template rows `first..=last` rendered as `out_rows` rows starting at `out_first`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedBlock {
    pub first: u32,
    pub last: u32,
    pub out_first: u32,
    pub out_rows: u32,
}

impl ExpandedBlock {
    fn height(&self) -> u32 {
        self.last.saturating_sub(self.first).saturating_add(1)
    }

    fn contains(&self, row: u32) -> bool {
        (self.first..=self.last).contains(&row)
    }

    fn growth(&self) -> i64 {
        i64::from(self.out_rows) - i64::from(self.height())
    }
}

/// Translates row numbers
pub trait RowMapping {
    /// Output row of a single template row
    fn row(&self, row: u32) -> u32;

    /// Output rows of a template span; the result always has `end >= start`
    fn span(&self, start: u32, end: u32) -> (u32, u32);

    /// Rewrite a cell range
    fn map_range(&self, range: CellRange) -> CellRange {
        if !range.is_span {
            return CellRange::single(range.start.with_row(self.row(range.start.row)));
        }
        let (start, end) = if range.start.row <= range.end.row {
            self.span(range.start.row, range.end.row)
        } else {
            (self.row(range.start.row), self.row(range.end.row))
        };
        CellRange {
            start: range.start.with_row(start),
            end: range.end.with_row(end),
            is_span: true,
        }
    }

    /// Rewrite a space-separated list of ranges (`sqref`); unknown entries are kept
    fn map_sqref(&self, sqref: &str) -> String {
        sqref
            .split_whitespace()
            .map(|entry| match entry.parse::<CellRange>() {
                Ok(range) => self.map_range(range).to_string(),
                Err(()) => entry.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Template-to-output row map of one sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMap {
    blocks: Vec<ExpandedBlock>,
}

impl RowMap {
    pub fn new(mut blocks: Vec<ExpandedBlock>) -> Self {
        blocks.sort_by_key(|b| b.first);
        Self { blocks }
    }

    /// True if no row moves
    pub fn is_identity(&self) -> bool {
        self.blocks.iter().all(|b| b.growth() == 0 && b.out_first == b.first)
    }

    fn block_of(&self, row: u32) -> Option<&ExpandedBlock> {
        self.blocks.iter().find(|b| b.contains(row))
    }

    fn shifted(&self, row: u32) -> u32 {
        let delta: i64 = self
            .blocks
            .iter()
            .filter(|b| b.last < row)
            .map(ExpandedBlock::growth)
            .sum();
        clamp_row(i64::from(row) + delta)
    }

    /// True if the row belongs to an expanded block
    pub fn in_block(&self, row: u32) -> bool {
        self.block_of(row).is_some()
    }
}

impl RowMapping for RowMap {
    fn row(&self, row: u32) -> u32 {
        match self.block_of(row) {
            Some(block) => block.out_first + (row - block.first).min(block.out_rows.saturating_sub(1)),
            None => self.shifted(row),
        }
    }

    fn span(&self, start: u32, end: u32) -> (u32, u32) {
        let new_start = match self.block_of(start) {
            Some(block) => block.out_first,
            None => self.shifted(start),
        };
        let new_end = match self.block_of(end) {
            Some(block) => clamp_row(i64::from(block.out_first) + i64::from(block.out_rows) - 1),
            None => self.shifted(end),
        };
        (new_start, new_end.max(new_start))
    }
}

/// One rendered copy of a block body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFrame {
    pub first: u32,
    pub last: u32,
    /// Output row minus template row for this copy
    pub shift: i64,
}

/// Mapping for formulas inside a block copy
///
/// References into the enclosing copies follow that copy; everything else
/// goes through the sheet map.
pub struct CopyMapping<'m> {
    pub sheet: &'m RowMap,
    /// Innermost frame last
    pub frames: &'m [CopyFrame],
}

impl CopyMapping<'_> {
    fn frame_of(&self, row: u32) -> Option<&CopyFrame> {
        self.frames
            .iter()
            .rev()
            .find(|f| (f.first..=f.last).contains(&row))
    }
}

impl RowMapping for CopyMapping<'_> {
    fn row(&self, row: u32) -> u32 {
        match self.frame_of(row) {
            Some(frame) => clamp_row(i64::from(row) + frame.shift),
            None => self.sheet.row(row),
        }
    }

    fn span(&self, start: u32, end: u32) -> (u32, u32) {
        match (self.frame_of(start), self.frame_of(end)) {
            (None, None) => self.sheet.span(start, end),
            _ => {
                let (s, e) = (self.row(start), self.row(end));
                (s, e.max(s))
            }
        }
    }
}

pub(crate) fn clamp_row(row: i64) -> u32 {
    u32::try_from(row.max(1)).unwrap_or(u32::MAX)
}

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:(?P<sheet>'(?:[^']|'')+'|[\p{L}_][\p{L}\p{N}_.]*)!)?(?P<a>\$?[A-Za-z]{1,3}\$?[0-9]+)(?::(?P<b>\$?[A-Za-z]{1,3}\$?[0-9]+))?",
    )
    .expect("invalid cell reference regex")
});

/// Sheet name from a formula prefix (`'My ''Data'''` -> `My 'Data'`)
pub fn unquote_sheet(name: &str) -> String {
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}

/// Sheet names compare case-insensitively, including non-ASCII letters
fn same_sheet(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Shift A1 references to `target_sheet` in a formula
///
/// Unqualified references count as targeting the sheet when the formula
/// itself lives on it (`local`). String literals are left alone.
pub fn shift_formula(
    formula: &str,
    target_sheet: &str,
    local: bool,
    mapping: &dyn RowMapping,
) -> String {
    let mut out = String::with_capacity(formula.len());
    for (n, chunk) in formula.split('"').enumerate() {
        if n > 0 {
            out.push('"');
        }
        if n % 2 == 1 {
            out.push_str(chunk);
        } else {
            out.push_str(&shift_chunk(chunk, target_sheet, local, mapping));
        }
    }
    out
}

fn shift_chunk(chunk: &str, target_sheet: &str, local: bool, mapping: &dyn RowMapping) -> String {
    REFERENCE
        .replace_all(chunk, |caps: &Captures<'_>| {
            let Some(span) = caps.get(0) else {
                return String::new();
            };
            let whole = span.as_str().to_string();

            let before = chunk[..span.start()].chars().next_back();
            let after = chunk[span.end()..].chars().next();
            if before.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
                || after.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '(')
            {
                return whole;
            }

            let targeted = match caps.name("sheet") {
                Some(sheet) => same_sheet(&unquote_sheet(sheet.as_str()), target_sheet),
                None => local,
            };
            if !targeted {
                return whole;
            }

            let Some(Ok(a)) = caps.name("a").map(|a| a.as_str().parse::<CellRef>()) else {
                return whole;
            };
            let prefix = caps.name("sheet").map(|s| format!("{}!", s.as_str()));
            let prefix = prefix.as_deref().unwrap_or("");

            match caps.name("b").map(|b| b.as_str().parse::<CellRef>()) {
                Some(Ok(b)) => {
                    let (start, end) = if a.row <= b.row {
                        mapping.span(a.row, b.row)
                    } else {
                        (mapping.row(a.row), mapping.row(b.row))
                    };
                    format!("{prefix}{}:{}", a.with_row(start), b.with_row(end))
                }
                Some(Err(())) => whole,
                None => format!("{prefix}{}", a.with_row(mapping.row(a.row))),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Row 5 of the template repeated three times
    fn three_copies() -> RowMap {
        RowMap::new(vec![ExpandedBlock {
            first: 5,
            last: 5,
            out_first: 5,
            out_rows: 3,
        }])
    }

    #[test]
    fn test_map_rows() {
        let map = three_copies();
        assert_eq!(map.row(4), 4);
        assert_eq!(map.row(5), 5);
        assert_eq!(map.row(6), 8);
        assert_eq!(map.span(5, 5), (5, 7));
        assert_eq!(map.span(2, 9), (2, 11));
        assert!(!map.is_identity());
        assert!(RowMap::default().is_identity());
    }

    #[test]
    fn test_zero_iterations_collapse() {
        let map = RowMap::new(vec![ExpandedBlock {
            first: 3,
            last: 4,
            out_first: 3,
            out_rows: 0,
        }]);
        assert_eq!(map.row(5), 3);
        assert_eq!(map.row(10), 8);
        assert_eq!(map.span(3, 4), (3, 3));
    }

    #[test]
    fn test_map_sqref() {
        let map = three_copies();
        assert_eq!(map.map_sqref("A5:C5 D10 bogus"), "A5:C7 D12 bogus");
    }

    #[test]
    fn test_shift_formula() {
        let map = three_copies();
        assert_eq!(shift_formula("SUM(B5:B5)", "Data", true, &map), "SUM(B5:B7)");
        assert_eq!(shift_formula("B6*2", "Data", true, &map), "B8*2");
        assert_eq!(
            shift_formula("Data!$B$5:$B$5+Other!B6", "Data", false, &map),
            "Data!$B$5:$B$7+Other!B6"
        );
        assert_eq!(shift_formula("'Data'!B6", "data", false, &map), "'Data'!B8");
    }

    #[test]
    fn test_shift_formula_skips_names_and_strings() {
        let map = three_copies();
        assert_eq!(shift_formula("LOG10(B6)", "S", true, &map), "LOG10(B8)");
        assert_eq!(shift_formula("\"B6\"&B6", "S", true, &map), "\"B6\"&B8");
        assert_eq!(shift_formula("Table1[Amount]", "S", true, &map), "Table1[Amount]");
    }

    #[test]
    fn test_copy_mapping_follows_copy() {
        let map = three_copies();
        let frames = [CopyFrame {
            first: 5,
            last: 5,
            shift: 2,
        }];
        let mapping = CopyMapping {
            sheet: &map,
            frames: &frames,
        };
        assert_eq!(shift_formula("B5*C5+B1+B6", "S", true, &mapping), "B7*C7+B1+B8");
    }

    #[test]
    fn test_shift_formula_unicode_sheet() {
        let map = three_copies();
        assert_eq!(
            shift_formula("Données!$B$5:$B$5", "Données", false, &map),
            "Données!$B$5:$B$7"
        );
        assert_eq!(shift_formula("ÉTAT!C6", "état", false, &map), "ÉTAT!C8");
        assert_eq!(shift_formula("Ventes_2024.x!B6", "Données", false, &map), "Ventes_2024.x!B6");
        // A reference glued to a letter is part of a name
        assert_eq!(shift_formula("éB6", "S", true, &map), "éB6");
    }

    #[test]
    fn test_unquote_sheet() {
        assert_eq!(unquote_sheet("'My ''Data'''"), "My 'Data'");
        assert_eq!(unquote_sheet("Plain"), "Plain");
    }
}
