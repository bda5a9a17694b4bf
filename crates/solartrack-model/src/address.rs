use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of columns addressable in a sheet (`A` through `XFD`).
pub const SHEET_MAX_COLS: u32 = 16_384;
/// Number of rows addressable in a sheet.
pub const SHEET_MAX_ROWS: u32 = 1_048_576;

/// A reference to a single cell within a sheet.
///
/// Rows and columns are **0-indexed**:
/// - `row = 0` is sheet row `1`
/// - `col = 0` is sheet column `A`
///
/// Serialized as its A1 text (`"B2"`), which is also the form the change log
/// persists and the UI displays.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// One-based row number as shown in the sheet gutter.
    #[inline]
    pub const fn row_number(self) -> u32 {
        self.row + 1
    }

    /// Column letters (`A`, `J`, `AA`, ...).
    pub fn column_letters(self) -> String {
        col_to_name(self.col)
    }

    /// Convert to A1 notation (e.g. `A1`, `BC32`).
    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), self.row + 1)
    }

    /// Parse an A1-style reference (e.g. `A1`, `$B$2`, `j14`).
    pub fn from_a1(a1: &str) -> Result<Self, CellRefError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(CellRefError::Empty);
        }

        let bytes = s.as_bytes();
        let mut idx = 0usize;
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        if idx == col_start {
            return Err(CellRefError::MissingColumn(s.to_string()));
        }
        let col_str = &s[col_start..idx];

        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start {
            return Err(CellRefError::MissingRow(s.to_string()));
        }
        if idx != bytes.len() {
            return Err(CellRefError::TrailingCharacters(s.to_string()));
        }

        let col = column_index(col_str)?;
        let row_1_based: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| CellRefError::InvalidRow(s.to_string()))?;
        if row_1_based == 0 || row_1_based > SHEET_MAX_ROWS {
            return Err(CellRefError::InvalidRow(s.to_string()));
        }

        Ok(Self {
            row: row_1_based - 1,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl std::str::FromStr for CellRef {
    type Err = CellRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_a1(s)
    }
}

impl Serialize for CellRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_a1())
    }
}

impl<'de> Deserialize<'de> for CellRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CellRef::from_a1(&raw).map_err(serde::de::Error::custom)
    }
}

/// Malformed cell reference text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CellRefError {
    #[error("empty cell reference")]
    Empty,
    #[error("missing column letters in cell reference `{0}`")]
    MissingColumn(String),
    #[error("missing row number in cell reference `{0}`")]
    MissingRow(String),
    #[error("invalid column `{0}`")]
    InvalidColumn(String),
    #[error("invalid row in cell reference `{0}`")]
    InvalidRow(String),
    #[error("trailing characters in cell reference `{0}`")]
    TrailingCharacters(String),
}

pub(crate) fn col_to_name(col: u32) -> String {
    // Column letters are bijective base-26 (A=1); `col` is stored 0-based.
    let mut n = col + 1;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Convert column letters (`"A"`, `"aa"`) to a 0-based column index.
pub fn column_index(letters: &str) -> Result<u32, CellRefError> {
    let invalid = || CellRefError::InvalidColumn(letters.to_string());
    if letters.is_empty() {
        return Err(invalid());
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(invalid());
        }
        let v = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or_else(invalid)?;
    }
    if col == 0 || col > SHEET_MAX_COLS {
        return Err(invalid());
    }
    Ok(col - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_roundtrip() {
        let c = CellRef::new(0, 0);
        assert_eq!(c.to_a1(), "A1");
        assert_eq!(CellRef::from_a1("A1").unwrap(), c);
        assert_eq!(CellRef::from_a1("$A$1").unwrap(), c);

        let c2 = CellRef::new(31, 54); // BC32
        assert_eq!(c2.to_a1(), "BC32");
        assert_eq!(CellRef::from_a1("bc32").unwrap(), c2);
    }

    #[test]
    fn column_letters_are_bijective_base26() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("Z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_index("AZ").unwrap(), 51);
        assert_eq!(col_to_name(701), "ZZ");
        assert_eq!(col_to_name(702), "AAA");
    }

    #[test]
    fn malformed_references_are_rejected() {
        assert_eq!(CellRef::from_a1(""), Err(CellRefError::Empty));
        assert!(matches!(CellRef::from_a1("12"), Err(CellRefError::MissingColumn(_))));
        assert!(matches!(CellRef::from_a1("B"), Err(CellRefError::MissingRow(_))));
        assert!(matches!(CellRef::from_a1("B0"), Err(CellRefError::InvalidRow(_))));
        assert!(matches!(
            CellRef::from_a1("B2x"),
            Err(CellRefError::TrailingCharacters(_))
        ));
        assert!(matches!(CellRef::from_a1("B-2"), Err(CellRefError::MissingRow(_))));
    }

    #[test]
    fn bounds_match_sheet_limits() {
        assert!(CellRef::from_a1("XFD1048576").is_ok());
        assert!(CellRef::from_a1("XFE1").is_err());
        assert!(CellRef::from_a1("A1048577").is_err());
    }

    #[test]
    fn serializes_as_a1_text() {
        let json = serde_json::to_string(&CellRef::new(1, 9)).unwrap();
        assert_eq!(json, "\"J2\"");
        let back: CellRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CellRef::new(1, 9));
        assert!(serde_json::from_str::<CellRef>("\"2J\"").is_err());
    }
}
