//! Masked probability grids.
//!
//! A `ProbabilityMatrix` is a dense grid of f64 values paired with a per-cell
//! "defined" flag. An undefined cell means the producing filter has no
//! opinion there; it is never represented by a sentinel value. Filters
//! produce world-shaped matrices; the habitat filter also uses kernel-shaped
//! and upsampled instances.

use serde::{Deserialize, Serialize};

use crate::grid::{WORLD_COLS, WORLD_ROWS};

/// A masked grid of probabilities. Defined cells hold values in [0, 1] when
/// produced by a filter; intermediate arithmetic may exceed that range
/// before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMatrix {
    values: Vec<f64>,
    defined: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl ProbabilityMatrix {
    /// Create a fully masked matrix of the given shape.
    pub fn masked(rows: usize, cols: usize) -> Self {
        Self {
            values: vec![0.0; rows * cols],
            defined: vec![false; rows * cols],
            rows,
            cols,
        }
    }

    /// Create a fully masked world-shaped matrix.
    pub fn world() -> Self {
        Self::masked(WORLD_ROWS, WORLD_COLS)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn idx(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }

    /// Value at (row, col) if the cell is defined.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let i = self.idx(row, col);
        self.defined[i].then(|| self.values[i])
    }

    #[inline]
    pub fn is_defined(&self, row: usize, col: usize) -> bool {
        self.defined[self.idx(row, col)]
    }

    /// Define the cell at (row, col) with the given value.
    #[inline]
    pub fn define(&mut self, row: usize, col: usize, value: f64) {
        let i = self.idx(row, col);
        self.values[i] = value;
        self.defined[i] = true;
    }

    /// Return the cell at (row, col) to the "no opinion" state.
    #[inline]
    pub fn mask(&mut self, row: usize, col: usize) {
        let i = self.idx(row, col);
        self.values[i] = 0.0;
        self.defined[i] = false;
    }

    /// Number of defined cells.
    pub fn count_defined(&self) -> usize {
        self.defined.iter().filter(|&&d| d).count()
    }

    /// True if no cell is defined.
    pub fn is_empty(&self) -> bool {
        !self.defined.iter().any(|&d| d)
    }

    /// Maximum over defined cells, or None if fully masked.
    pub fn max_defined(&self) -> Option<f64> {
        self.iter_defined()
            .map(|(_, _, v)| v)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    /// Sum over defined cells.
    pub fn sum_defined(&self) -> f64 {
        self.iter_defined().map(|(_, _, v)| v).sum()
    }

    /// Multiply every defined cell by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for (v, &d) in self.values.iter_mut().zip(self.defined.iter()) {
            if d {
                *v *= factor;
            }
        }
    }

    /// Iterate (row, col, value) over defined cells in row-major order.
    pub fn iter_defined(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.defined.iter().enumerate().filter_map(move |(i, &d)| {
            d.then(|| (i / self.cols, i % self.cols, self.values[i]))
        })
    }

    /// Raw parallel slices, row-major. Used by bulk operations that would be
    /// needlessly slow through per-cell accessors.
    pub fn parts_mut(&mut self) -> (&mut [f64], &mut [bool]) {
        (&mut self.values, &mut self.defined)
    }

    pub fn parts(&self) -> (&[f64], &[bool]) {
        (&self.values, &self.defined)
    }
}
