use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_ROWS: &str = "ABCDEFGHIJ";
pub const DEFAULT_COLUMNS: u32 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("seat layout needs at least one row letter")]
    NoRows,

    #[error("row letter '{0}' must be an uppercase ASCII letter")]
    InvalidRow(char),

    #[error("row letter '{0}' appears more than once")]
    DuplicateRow(char),

    #[error("seat layout needs at least one column per row")]
    NoColumns,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid seat label '{0}'")]
pub struct SeatLabelError(pub String);

/// A single seat, e.g. `B12`: one row letter followed by a 1-based column number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeatLabel {
    pub row: char,
    pub column: u32,
}

impl fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

impl FromStr for SeatLabel {
    type Err = SeatLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SeatLabelError(s.to_string());

        let mut chars = s.chars();
        let row = chars.next().filter(char::is_ascii_uppercase).ok_or_else(invalid)?;
        let digits = chars.as_str();

        // Leading zeros would give two spellings of the same seat.
        if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let column = digits.parse::<u32>().map_err(|_| invalid())?;
        Ok(SeatLabel { row, column })
    }
}

/// Row-major seat arrangement shared by every showtime.
///
/// The seats of a showtime are the first `capacity` positions of the layout, filling
/// row `rows[0]` from column 1 upwards before moving to the next row. Capacities above
/// [`SeatLayout::max_seats`] are clamped and negative capacities mean no seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatLayout {
    rows: Vec<char>,
    columns: u32,
}

impl SeatLayout {
    pub fn new(rows: &str, columns: u32) -> Result<Self, LayoutError> {
        let mut letters: Vec<char> = Vec::with_capacity(rows.len());
        for row in rows.chars() {
            if !row.is_ascii_uppercase() {
                return Err(LayoutError::InvalidRow(row));
            }
            if letters.contains(&row) {
                return Err(LayoutError::DuplicateRow(row));
            }
            letters.push(row);
        }

        if letters.is_empty() {
            return Err(LayoutError::NoRows);
        }
        if columns == 0 {
            return Err(LayoutError::NoColumns);
        }

        Ok(Self {
            rows: letters,
            columns,
        })
    }

    pub fn max_seats(&self) -> usize {
        self.rows.len() * self.columns as usize
    }

    /// Number of seats that actually exist for `capacity`.
    pub fn effective_capacity(&self, capacity: i32) -> usize {
        usize::try_from(capacity).map_or(0, |c| c.min(self.max_seats()))
    }

    /// The ordered seat labels of a showtime with the given capacity.
    pub fn seats(&self, capacity: i32) -> Vec<String> {
        (0..self.effective_capacity(capacity))
            .map(|ordinal| self.label_at(ordinal).to_string())
            .collect()
    }

    /// Whether `label` names a seat of a showtime with the given capacity.
    pub fn contains(&self, capacity: i32, label: &str) -> bool {
        label
            .parse::<SeatLabel>()
            .ok()
            .and_then(|seat| self.ordinal(&seat))
            .is_some_and(|ordinal| ordinal < self.effective_capacity(capacity))
    }

    /// Position of a seat in layout order, if the layout has that row and column.
    pub fn ordinal(&self, seat: &SeatLabel) -> Option<usize> {
        let row = self.rows.iter().position(|r| *r == seat.row)?;
        if seat.column == 0 || seat.column > self.columns {
            return None;
        }
        Some(row * self.columns as usize + (seat.column - 1) as usize)
    }

    fn label_at(&self, ordinal: usize) -> SeatLabel {
        let columns = self.columns as usize;
        SeatLabel {
            row: self.rows[ordinal / columns],
            column: (ordinal % columns) as u32 + 1,
        }
    }
}

impl Default for SeatLayout {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS.chars().collect(),
            columns: DEFAULT_COLUMNS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> SeatLayout {
        SeatLayout::new("AB", 2).unwrap()
    }

    #[test]
    fn test_small_layout_is_row_major() {
        assert_eq!(two_by_two().seats(4), vec!["A1", "A2", "B1", "B2"]);
    }

    #[test]
    fn test_partial_last_row() {
        assert_eq!(two_by_two().seats(3), vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn test_capacity_is_clamped_to_layout() {
        let layout = two_by_two();
        assert_eq!(layout.max_seats(), 4);
        assert_eq!(layout.seats(50), layout.seats(4));
    }

    #[test]
    fn test_zero_and_negative_capacity_have_no_seats() {
        let layout = SeatLayout::default();
        assert!(layout.seats(0).is_empty());
        assert!(layout.seats(-7).is_empty());
        assert_eq!(layout.effective_capacity(-1), 0);
    }

    #[test]
    fn test_same_capacity_same_layout() {
        let layout = SeatLayout::default();
        assert_eq!(layout.seats(137), layout.seats(137));
    }

    #[test]
    fn test_default_layout_shape() {
        let layout = SeatLayout::default();
        assert_eq!(layout.max_seats(), 200);

        let seats = layout.seats(200);
        assert_eq!(seats.first().map(String::as_str), Some("A1"));
        assert_eq!(seats[20], "B1");
        assert_eq!(seats.last().map(String::as_str), Some("J20"));
    }

    #[test]
    fn test_contains_respects_capacity() {
        let layout = two_by_two();
        assert!(layout.contains(3, "B1"));
        assert!(!layout.contains(3, "B2"));
        assert!(!layout.contains(4, "C1"));
        assert!(!layout.contains(4, "A3"));
        assert!(!layout.contains(4, "a1"));
        assert!(!layout.contains(4, "A01"));
    }

    #[test]
    fn test_layout_validation() {
        assert_eq!(SeatLayout::new("", 4), Err(LayoutError::NoRows));
        assert_eq!(SeatLayout::new("AB", 0), Err(LayoutError::NoColumns));
        assert_eq!(SeatLayout::new("AbC", 4), Err(LayoutError::InvalidRow('b')));
        assert_eq!(SeatLayout::new("ABA", 4), Err(LayoutError::DuplicateRow('A')));
    }

    #[test]
    fn test_seat_label_parsing() {
        assert_eq!(
            "C12".parse::<SeatLabel>(),
            Ok(SeatLabel { row: 'C', column: 12 })
        );
        assert_eq!("C12".parse::<SeatLabel>().unwrap().to_string(), "C12");

        for bad in ["", "C", "12", "c1", "C0", "C01", "C1a", "CC1", "C-1"] {
            assert!(bad.parse::<SeatLabel>().is_err(), "{bad} should not parse");
        }
    }
}
