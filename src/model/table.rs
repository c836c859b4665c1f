//! Table types.

use serde::{Deserialize, Serialize};

use super::{Point, Rect};

/// A grid of aligned text spans.
///
/// Built only from text spans. `rows` and `columns` are sorted positions in
/// native units, and `cells` is a row-major grid with one entry per
/// (row, column) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    /// Bounding box of every contributing span
    pub bbox: Rect,

    /// Top edge of each row
    pub rows: Vec<f32>,

    /// Left edge of each column
    pub columns: Vec<f32>,

    /// Cell grid, `cells[row][column]`
    pub cells: Vec<Vec<TableCell>>,

    /// Whether the first row is treated as a header
    pub has_header: bool,
}

impl TableRegion {
    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get a cell by position.
    pub fn cell(&self, row: usize, column: usize) -> Option<&TableCell> {
        self.cells.get(row).and_then(|r| r.get(column))
    }

    /// Header row, if any.
    pub fn header(&self) -> Option<&[TableCell]> {
        if self.has_header {
            self.cells.first().map(|r| r.as_slice())
        } else {
            None
        }
    }

    /// Number of non-empty cells.
    pub fn filled_cells(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .count()
    }

    /// Plain text, tab separated per row.
    pub fn plain_text(&self) -> String {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A table cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    /// Cell text, empty when no span matched the column
    pub text: String,

    /// Top-left of the contributing span in native units
    pub anchor: Option<Point>,

    /// Font size of the contributing span
    pub font_size: Option<f32>,
}

impl TableCell {
    /// An empty cell.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A cell filled from a span.
    pub fn new(text: impl Into<String>, anchor: Point, font_size: f32) -> Self {
        Self {
            text: text.into(),
            anchor: Some(anchor),
            font_size: Some(font_size),
        }
    }

    /// Check if the cell is empty.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
