//! In-memory workbook model and the merge-aware cell resolver.
//!
//! A [`Workbook`] is an ordered collection of [`Sheet`]s; each sheet keeps a
//! sparse cell grid plus its merge ranges. [`Sheet::resolve`] is the one way
//! the rest of the crate reads grid positions: it collapses merged ranges to
//! their master cell and prefers computed values over formula text.

pub(crate) mod cell;
pub mod reference;
mod xlsx;

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Structural problems with the workbook bytes themselves.
#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Missing required part '{0}' in workbook archive")]
    MissingPart(String),
}

/// A resolved cell value. Numbers cover integers, currency, and percentages;
/// date-formatted serials resolve to their rendered text.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Renders the value as display text. Integral numbers print without a
    /// fractional part, matching what a spreadsheet UI shows.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.to_owned(),
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                format!("{}", *number as i64)
            }
            Self::Number(number) => number.to_string(),
            Self::Bool(value) => value.to_string(),
        }
    }

    /// True when the value carries no usable content.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

/// A single cell: the computed value, the backing formula (never surfaced by
/// resolution), and a formatted-text fallback for unparseable numerics.
#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub value: Option<CellValue>,
    pub formula: Option<String>,
    pub formatted: Option<String>,
}

/// A rectangular block of cells sharing one logical value, anchored at its
/// top-left master cell. Bounds are 0-based and inclusive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MergeRange {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl MergeRange {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.row_start <= row && row <= self.row_end && self.col_start <= col && col <= self.col_end
    }
}

/// A sheet with a sparse rectangular grid of cells and its merge ranges.
#[derive(Debug, Default)]
pub struct Sheet {
    pub name: String,
    cells: HashMap<(usize, usize), Cell>,
    merges: Vec<MergeRange>,
    row_count: usize,
    col_count: usize,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Sheet {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Number of rows in the used range (0 for an empty sheet).
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of columns in the used range (0 for an empty sheet).
    pub fn col_count(&self) -> usize {
        self.col_count
    }

    pub fn merges(&self) -> &[MergeRange] {
        &self.merges
    }

    /// Inserts a cell, growing the used range.
    pub fn insert(&mut self, row: usize, col: usize, cell: Cell) {
        self.row_count = self.row_count.max(row + 1);
        self.col_count = self.col_count.max(col + 1);
        self.cells.insert((row, col), cell);
    }

    /// Declares a merge range. The range's top-left cell is the master.
    pub fn add_merge(&mut self, merge: MergeRange) {
        self.merges.push(merge);
    }

    /// Gets the cell stored at the exact address, ignoring merges.
    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Resolves the effective value of a grid position.
    ///
    /// Exact-address lookup first: a present cell resolves to its computed
    /// value, falling back to its formatted text; a bare formula with no
    /// cached result resolves to None. When the address itself yields
    /// nothing, a position inside a merge range resolves to the merge's
    /// master (top-left) cell instead. Pure and idempotent.
    pub fn resolve(&self, row: usize, col: usize) -> Option<CellValue> {
        if let Some(value) = self.resolve_exact(row, col) {
            return Some(value);
        }
        let merge = self.merges.iter().find(|merge| merge.contains(row, col))?;
        if merge.row_start == row && merge.col_start == col {
            return None;
        }
        self.resolve_exact(merge.row_start, merge.col_start)
    }

    /// Resolves a position to display text; absent resolves to "".
    pub fn resolve_text(&self, row: usize, col: usize) -> String {
        self.resolve(row, col)
            .map(|value| value.to_text())
            .unwrap_or_default()
    }

    /// All cells of one row rendered as text, sized to the used column range.
    pub fn row_text(&self, row: usize) -> Vec<String> {
        (0..self.col_count)
            .map(|col| self.resolve_text(row, col))
            .collect()
    }

    /// True when every cell of the row within the given column window is
    /// blank after merge resolution.
    pub fn is_row_blank(&self, row: usize, col_window: usize) -> bool {
        (0..col_window.min(self.col_count.max(1))).all(|col| {
            self.resolve(row, col)
                .map(|value| value.is_blank())
                .unwrap_or(true)
        })
    }

    fn resolve_exact(&self, row: usize, col: usize) -> Option<CellValue> {
        let cell = self.cells.get(&(row, col))?;
        match (&cell.value, &cell.formatted) {
            (Some(value), _) => Some(value.to_owned()),
            (None, Some(formatted)) => Some(CellValue::Text(formatted.to_owned())),
            (None, None) => None,
        }
    }
}

/// An ordered collection of sheets parsed from one spreadsheet file.
#[derive(Debug, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Parses a workbook from .xlsx/.xlsm bytes.
    ///
    /// A file with no sheets is a degenerate empty workbook, not an error;
    /// unreadable bytes and missing required parts are.
    pub fn from_bytes(bytes: &[u8]) -> Result<Workbook, crate::error::SheetMapError> {
        xlsx::read_workbook(bytes)
    }

    /// Finds a sheet by exact name.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Builds a sheet from rows of text/number literals. Numeric-looking
    /// strings stay text; use `num` cells via the f64 overload in callers.
    pub(crate) fn sheet_from_rows(name: &str, rows: &[&[&str]]) -> Sheet {
        let mut sheet = Sheet::new(name);
        for (row, cells) in rows.iter().enumerate() {
            for (col, text) in cells.iter().enumerate() {
                if !text.is_empty() {
                    sheet.insert(row, col, Cell {
                        value: Some(CellValue::Text((*text).to_owned())),
                        ..Cell::default()
                    });
                }
            }
        }
        sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_cell(text: &str) -> Cell {
        Cell {
            value: Some(CellValue::Text(text.to_owned())),
            ..Cell::default()
        }
    }

    #[test]
    fn resolve_prefers_value_over_formula() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.insert(0, 0, Cell {
            value: Some(CellValue::Number(42.0)),
            formula: Some("SUM(B1:B9)".to_owned()),
            formatted: None,
        });
        assert_eq!(sheet.resolve(0, 0), Some(CellValue::Number(42.0)));
    }

    #[test]
    fn bare_formula_resolves_absent() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.insert(0, 0, Cell {
            value: None,
            formula: Some("A1*2".to_owned()),
            formatted: None,
        });
        assert_eq!(sheet.resolve(0, 0), None);
    }

    #[test]
    fn formatted_text_is_a_fallback() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.insert(0, 0, Cell {
            value: None,
            formula: None,
            formatted: Some("N/A".to_owned()),
        });
        assert_eq!(sheet.resolve(0, 0), Some(CellValue::Text("N/A".to_owned())));
    }

    #[test]
    fn merge_interior_resolves_to_master() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.insert(0, 0, text_cell("Hardware Pricing"));
        sheet.add_merge(MergeRange { row_start: 0, row_end: 1, col_start: 0, col_end: 2 });
        assert_eq!(sheet.resolve(1, 2), Some(CellValue::Text("Hardware Pricing".to_owned())));
        assert_eq!(sheet.resolve(0, 1), Some(CellValue::Text("Hardware Pricing".to_owned())));
        // Outside the merge stays absent
        assert_eq!(sheet.resolve(2, 0), None);
    }

    #[test]
    fn blank_master_does_not_recurse() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.add_merge(MergeRange { row_start: 0, row_end: 1, col_start: 0, col_end: 1 });
        assert_eq!(sheet.resolve(1, 1), None);
    }

    #[test]
    fn row_blank_window() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.insert(0, 12, text_cell("far right"));
        assert!(sheet.is_row_blank(0, 10));
        assert!(!sheet.is_row_blank(0, 13));
        assert!(sheet.is_row_blank(5, 10));
    }

    #[test]
    fn number_text_rendering() {
        assert_eq!(CellValue::Number(1500.0).to_text(), "1500");
        assert_eq!(CellValue::Number(12.5).to_text(), "12.5");
        assert_eq!(CellValue::Text("abc".to_owned()).to_text(), "abc");
    }
}
