//! A1-style cell references

use std::fmt;
use std::str::FromStr;

/// Convert column letters to a 1-based column index (`A` -> 1, `AA` -> 27)
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(index)
}

/// Convert a 1-based column index to column letters
pub fn column_name(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A single cell reference such as `B2` or `$B$2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: u32,
    pub row: u32,
    pub col_absolute: bool,
    pub row_absolute: bool,
}

impl CellRef {
    /// Create a relative reference
    pub fn new(col: u32, row: u32) -> Self {
        Self {
            col,
            row,
            col_absolute: false,
            row_absolute: false,
        }
    }

    /// Same reference on another row, keeping the absolute markers
    pub fn with_row(self, row: u32) -> Self {
        Self { row, ..self }
    }
}

impl FromStr for CellRef {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (col_absolute, rest) = match s.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let split = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .ok_or(())?;
        let (letters, rest) = rest.split_at(split);
        let (row_absolute, digits) = match rest.strip_prefix('$') {
            Some(digits) => (true, digits),
            None => (false, rest),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(());
        }
        let col = column_index(letters).ok_or(())?;
        let row: u32 = digits.parse().map_err(|_| ())?;
        if row == 0 {
            return Err(());
        }
        Ok(Self {
            col,
            row,
            col_absolute,
            row_absolute,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col_absolute {
            f.write_str("$")?;
        }
        f.write_str(&column_name(self.col))?;
        if self.row_absolute {
            f.write_str("$")?;
        }
        write!(f, "{}", self.row)
    }
}

/// A cell range such as `A1:C10`; a single cell is a range with `end == start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
    /// Whether the source text used the `start:end` form
    pub is_span: bool,
}

impl CellRange {
    /// Range of a single cell
    pub fn single(cell: CellRef) -> Self {
        Self {
            start: cell,
            end: cell,
            is_span: false,
        }
    }
}

impl FromStr for CellRange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(Self {
                start: a.parse()?,
                end: b.parse()?,
                is_span: true,
            }),
            None => Ok(Self::single(s.parse()?)),
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_span {
            write!(f, "{}:{}", self.start, self.end)
        } else {
            write!(f, "{}", self.start)
        }
    }
}
