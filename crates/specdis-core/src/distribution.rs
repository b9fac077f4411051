//! Matrix combination and the per-taxon filter pipeline.

use crate::errors::{Error, Result};
use crate::filters::{self, FilterStage};
use crate::matrix::ProbabilityMatrix;
use crate::sink::OutputSink;
use crate::taxon::Taxon;
use crate::world::{field, WorldGrid};

/// Knobs threaded through one taxon's pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Save a grayscale image of every intermediate matrix.
    pub debug: bool,
    /// Turn numeric fallbacks (epsilon nudges, zero-max layers) into hard
    /// per-taxon errors.
    pub strict_numeric: bool,
}

/// Merge filter outputs into a single matrix.
///
/// Fully masked matrices are dropped. The rest fold into a running
/// accumulator: where both operands are defined the values multiply, and
/// where only one is defined its value passes through unchanged — a filter
/// with no opinion at a cell never vetoes another filter's opinion there.
/// The result is unnormalized; `None` means no filter had an opinion
/// anywhere.
pub fn combine_probability_matrices(matrices: &[ProbabilityMatrix]) -> Option<ProbabilityMatrix> {
    let mut live = matrices.iter().filter(|m| !m.is_empty());
    let mut acc = live.next()?.clone();
    for m in live {
        for (row, col, value) in m.iter_defined() {
            match acc.get(row, col) {
                Some(existing) => acc.define(row, col, existing * value),
                None => acc.define(row, col, value),
            }
        }
    }
    Some(acc)
}

/// Run the full filter pipeline for one taxon and return its normalized
/// distribution.
///
/// The combined matrix is divided by the sum of its defined values, giving
/// true probability-mass semantics (cell values sum to 1 before the water
/// mask), then multiplied by the percent-water field as a final physical
/// validity mask.
pub fn create_taxon_distribution(
    taxon: &Taxon,
    polygon_cells: &[(usize, usize)],
    world: &WorldGrid,
    opts: &PipelineOptions,
    sink: &dyn OutputSink,
) -> Result<ProbabilityMatrix> {
    log::info!("working on taxon {}", taxon.taxon_key);
    taxon.validate()?;

    let polygon = filters::polygon::filter(taxon.taxon_key, polygon_cells)?;
    let matrices = [
        polygon.clone(),
        filters::fao::filter(taxon, world)?,
        filters::latitude::filter(taxon, world)?,
        filters::depth::filter(taxon, world)?,
        filters::habitat::filter(taxon, world, &polygon, opts.strict_numeric)?,
        filters::submergence::filter(taxon, world, opts.strict_numeric)?,
    ];

    if opts.debug {
        for (stage, matrix) in FilterStage::ALL.iter().zip(matrices.iter()) {
            let label = format!("{}-{}-{}", taxon.taxon_key, *stage as usize, stage.name());
            sink.save_debug_image(matrix, &label);
        }
    }

    let mut distribution = combine_probability_matrices(&matrices)
        .ok_or(Error::EmptyDistribution { taxon_key: taxon.taxon_key })?;

    let total = distribution.sum_defined();
    if total <= 0.0 {
        return Err(Error::EmptyDistribution { taxon_key: taxon.taxon_key });
    }
    distribution.scale(1.0 / total);

    let water = world.field(field::PERCENT_WATER)?;
    let (values, defined) = distribution.parts_mut();
    let cols = water.cols();
    for (i, (v, &d)) in values.iter_mut().zip(defined.iter()).enumerate() {
        if d {
            *v *= water.get(i / cols, i % cols) / 100.0;
        }
    }

    if opts.debug {
        sink.save_debug_image(&distribution, &taxon.taxon_key.to_string());
    }

    if !distribution.iter_defined().any(|(_, _, v)| v > 0.0) {
        return Err(Error::EmptyDistribution { taxon_key: taxon.taxon_key });
    }
    Ok(distribution)
}
