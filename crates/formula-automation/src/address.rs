use core::fmt;

use serde::{Deserialize, Serialize};

/// Excel's row limit (1-based count).
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;
/// Excel's column limit (1-based count, `XFD`).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// A single cell coordinate on a sheet.
///
/// Rows and columns are **0-indexed** (`row = 0, col = 0` is `A1`). Ordering is row-major, which
/// is the order hosts iterate cells in.
///
/// Serialized as its A1 text so that layouts can be written by hand (`"E6"`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Format as A1 text (e.g. `E6`).
    pub fn to_a1(self) -> String {
        let mut out = column_label(self.col);
        out.push_str(&(self.row + 1).to_string());
        out
    }

    /// Parse A1 text, accepting optional `$` anchors (`$E$6`).
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let body = s.strip_prefix('$').unwrap_or(s);
        let letters_end = body
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(body.len());
        if letters_end == 0 {
            return Err(A1ParseError::MissingColumn);
        }
        let col = ColumnRef::from_letters(&body[..letters_end])?.index();

        let digits = &body[letters_end..];
        let digits = digits.strip_prefix('$').unwrap_or(digits);
        if digits.is_empty() {
            return Err(A1ParseError::MissingRow);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(A1ParseError::TrailingCharacters);
        }
        let row: u32 = digits.parse().map_err(|_| A1ParseError::InvalidRow)?;
        if row == 0 || row > EXCEL_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self { row: row - 1, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl TryFrom<String> for CellRef {
    type Error = A1ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_a1(&value)
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_a1()
    }
}

/// A whole column (0-indexed), serialized as its letters (`"A"`, `"AB"`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef(u32);

impl ColumnRef {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// The cell of this column on `row` (0-indexed).
    #[inline]
    pub const fn cell(self, row: u32) -> CellRef {
        CellRef::new(row, self.0)
    }

    pub fn from_letters(letters: &str) -> Result<Self, A1ParseError> {
        let letters = letters.trim().trim_start_matches('$');
        if letters.is_empty() {
            return Err(A1ParseError::MissingColumn);
        }

        let mut col: u32 = 0;
        for b in letters.bytes() {
            if !b.is_ascii_alphabetic() {
                return Err(A1ParseError::InvalidColumn);
            }
            let digit = u32::from(b.to_ascii_uppercase() - b'A') + 1;
            col = col
                .checked_mul(26)
                .and_then(|c| c.checked_add(digit))
                .ok_or(A1ParseError::InvalidColumn)?;
        }
        if col > EXCEL_MAX_COLS {
            return Err(A1ParseError::InvalidColumn);
        }
        Ok(Self(col - 1))
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&column_label(self.0))
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = A1ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_letters(&value)
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        column_label(value.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("invalid row in A1 reference")]
    InvalidRow,
    #[error("trailing characters in A1 reference")]
    TrailingCharacters,
}

fn column_label(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_a1() {
        let e6 = CellRef::from_a1("E6").unwrap();
        assert_eq!(e6, CellRef::new(5, 4));
        assert_eq!(e6.to_a1(), "E6");
        assert_eq!(CellRef::from_a1("$e$6").unwrap(), e6);
        assert_eq!(CellRef::new(31, 54).to_a1(), "BC32");
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(CellRef::from_a1(""), Err(A1ParseError::Empty));
        assert_eq!(CellRef::from_a1("12"), Err(A1ParseError::MissingColumn));
        assert_eq!(CellRef::from_a1("E"), Err(A1ParseError::MissingRow));
        assert_eq!(CellRef::from_a1("E0"), Err(A1ParseError::InvalidRow));
        assert_eq!(CellRef::from_a1("E6x"), Err(A1ParseError::TrailingCharacters));
        assert_eq!(CellRef::from_a1("XFE1"), Err(A1ParseError::InvalidColumn));
        assert!(CellRef::from_a1("XFD1048576").is_ok());
    }

    #[test]
    fn columns_round_trip_through_letters() {
        assert_eq!(ColumnRef::from_letters("A").unwrap().index(), 0);
        assert_eq!(ColumnRef::from_letters("d").unwrap().index(), 3);
        assert_eq!(ColumnRef::from_letters("AA").unwrap().index(), 26);
        assert_eq!(ColumnRef::new(27).to_string(), "AB");
        assert_eq!(ColumnRef::new(1).cell(9), CellRef::from_a1("B10").unwrap());
    }

    #[test]
    fn serializes_as_a1_text() {
        let json = serde_json::to_string(&CellRef::new(4, 4)).unwrap();
        assert_eq!(json, "\"E5\"");
        let parsed: ColumnRef = serde_json::from_str("\"C\"").unwrap();
        assert_eq!(parsed, ColumnRef::new(2));
        assert!(serde_json::from_str::<CellRef>("\"not a cell\"").is_err());
    }
}
