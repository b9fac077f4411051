//! Polygon filter: 1.0 at every grid cell intersected by the taxon's expert
//! range geometry, no opinion elsewhere.

use crate::errors::{Error, Result};
use crate::grid::{WORLD_COLS, WORLD_ROWS};
use crate::matrix::ProbabilityMatrix;

/// Build the polygon matrix from pre-rasterized (row, col) cells.
///
/// A taxon without a rasterizable extent is fatal for that taxon only;
/// the caller skips it and moves on.
pub fn filter(taxon_key: u32, cells: &[(usize, usize)]) -> Result<ProbabilityMatrix> {
    let mut matrix = ProbabilityMatrix::world();
    for &(row, col) in cells {
        if row >= WORLD_ROWS || col >= WORLD_COLS {
            log::warn!("taxon {taxon_key}: polygon cell ({row}, {col}) outside the grid, ignored");
            continue;
        }
        matrix.define(row, col, 1.0);
    }
    if matrix.is_empty() {
        return Err(Error::NoPolygon { taxon_key });
    }
    Ok(matrix)
}
