//! Habitat filter: diffuses habitat-area fractions outward with a conical
//! frustum kernel at 10×-upsampled resolution, then combines the per-habitat
//! layers into one normalized matrix.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::grid::{Grid2D, WORLD_COLS, WORLD_ROWS};
use crate::matrix::ProbabilityMatrix;
use crate::taxon::{HabitatWeights, Taxon};
use crate::world::{field, WorldGrid};

/// Upsampling factor for sub-cell kernel placement.
pub const RESOLUTION_SCALE: usize = 10;

/// How a raw world field becomes a 0..1 habitat fraction.
#[derive(Clone, Copy)]
enum Normalize {
    /// Field is an area in km²; divide by the cell's total area.
    ByArea,
    /// Field is a percentage; divide by 100.
    Percent,
    /// Field is already a fraction.
    None,
}

struct HabitatLayer {
    name: &'static str,
    field: &'static str,
    normalize: Normalize,
    /// Distance-independent layers are summed before the others and are not
    /// subject to the inshore/offshore exclusion.
    dist_independent: bool,
    weight: fn(&HabitatWeights) -> f64,
}

const LAYERS: [HabitatLayer; 8] = [
    HabitatLayer {
        name: "inshore",
        field: field::AREA_COAST,
        normalize: Normalize::ByArea,
        dist_independent: false,
        weight: |h| h.inshore,
    },
    HabitatLayer {
        name: "offshore",
        field: field::AREA_OFFSHORE,
        normalize: Normalize::ByArea,
        dist_independent: false,
        weight: |h| h.offshore,
    },
    HabitatLayer {
        name: "coral",
        field: field::CORAL,
        normalize: Normalize::None,
        dist_independent: true,
        weight: |h| h.coral,
    },
    HabitatLayer {
        name: "estuary",
        field: field::ESTUARY,
        normalize: Normalize::ByArea,
        dist_independent: false,
        weight: |h| h.estuary,
    },
    HabitatLayer {
        name: "seamount",
        field: field::SEAMOUNT,
        normalize: Normalize::Percent,
        dist_independent: false,
        weight: |h| h.seamount,
    },
    HabitatLayer {
        name: "shelf",
        field: field::SHELF,
        normalize: Normalize::ByArea,
        dist_independent: false,
        weight: |h| h.shelf,
    },
    HabitatLayer {
        name: "slope",
        field: field::SLOPE,
        normalize: Normalize::ByArea,
        dist_independent: false,
        weight: |h| h.slope,
    },
    HabitatLayer {
        name: "abyssal",
        field: field::ABYSSAL,
        normalize: Normalize::ByArea,
        dist_independent: false,
        weight: |h| h.abyssal,
    },
];

/// Radially symmetric decay kernel: a square of side `2*r1 + 1` holding 1.0
/// out to radius `r2`, decaying to 0 at the outer radius `r1`, masked
/// beyond. Distances are squared-lattice distances from the center cell and
/// the decay is normalized against the largest in-rim squared distance.
pub fn conical_frustum_kernel(r1: usize, r2: usize) -> ProbabilityMatrix {
    let side = 2 * r1 + 1;
    let r1sq = (r1 * r1) as f64;
    let r2sq = (r2 * r2) as f64;
    let center = r1 as i64;

    let mut max_d2: f64 = 0.0;
    for i in 0..side {
        for j in 0..side {
            let dy = i as i64 - center;
            let dx = j as i64 - center;
            let d2 = (dy * dy + dx * dx) as f64;
            if d2 <= r1sq {
                max_d2 = max_d2.max(d2);
            }
        }
    }

    let denom = max_d2 - r2sq;
    let mut kernel = ProbabilityMatrix::masked(side, side);
    for i in 0..side {
        for j in 0..side {
            let dy = i as i64 - center;
            let dx = j as i64 - center;
            let d2 = (dy * dy + dx * dx) as f64;
            if d2 > r1sq {
                continue;
            }
            let value = if denom <= 0.0 {
                1.0
            } else {
                1.0 - (d2.max(r2sq) - r2sq) / denom
            };
            kernel.define(i, j, value);
        }
    }
    kernel
}

/// Merge a kernel into `target` centered at (row, col), keeping the larger
/// value wherever both are defined. Columns wrap around the date line; rows
/// are clamped at the poles.
fn apply_kernel_max(target: &mut ProbabilityMatrix, row: i64, col: i64, kernel: &ProbabilityMatrix) {
    let radius = (kernel.rows() / 2) as i64;
    let rows = target.rows() as i64;
    let cols = target.cols() as i64;

    for (ki, kj, value) in kernel.iter_defined() {
        let r = row - radius + ki as i64;
        if r < 0 || r >= rows {
            continue;
        }
        let c = (col - radius + kj as i64).rem_euclid(cols);
        let (r, c) = (r as usize, c as usize);
        match target.get(r, c) {
            Some(existing) if existing >= value => {}
            _ => target.define(r, c, value),
        }
    }
}

/// Block-mean downsample of the defined cells in each block; fully masked
/// blocks stay masked.
fn rebin(high: &ProbabilityMatrix, rows: usize, cols: usize) -> ProbabilityMatrix {
    let fr = high.rows() / rows;
    let fc = high.cols() / cols;
    let mut out = ProbabilityMatrix::masked(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            let mut sum = 0.0;
            let mut n = 0usize;
            for i in row * fr..(row + 1) * fr {
                for j in col * fc..(col + 1) * fc {
                    if let Some(v) = high.get(i, j) {
                        sum += v;
                        n += 1;
                    }
                }
            }
            if n > 0 {
                out.define(row, col, sum / n as f64);
            }
        }
    }
    out
}

/// Diffuse one habitat fraction grid outward by the taxon's effective
/// distance. Kernels are sized per cell from the habitat's own circular
/// radius, applied at upsampled resolution wherever the fraction is positive
/// and the polygon filter has an opinion, then block-meaned back down.
fn diffuse_layer(
    fraction: &Grid2D,
    effective_distance_km: f64,
    area: &Grid2D,
    polygon: &ProbabilityMatrix,
    kernels: &mut HashMap<(usize, usize), Arc<ProbabilityMatrix>>,
) -> ProbabilityMatrix {
    let mut high = ProbabilityMatrix::masked(
        WORLD_ROWS * RESOLUTION_SCALE,
        WORLD_COLS * RESOLUTION_SCALE,
    );
    let high_cols = high.cols();
    let offset = (RESOLUTION_SCALE / 2) as i64;

    for row in 0..WORLD_ROWS {
        for col in 0..WORLD_COLS {
            let frac = fraction.get(row, col);
            if !(frac > 0.0) || !polygon.is_defined(row, col) {
                continue;
            }

            let area_m2 = area.get(row, col) * 1.0e6;
            if !(area_m2 > 0.0) {
                continue;
            }
            let cell_length_m = area_m2.sqrt();
            let habitat_radius_m = (frac * area_m2 / std::f64::consts::PI).sqrt();

            // Radii in upsampled grid-cell units.
            let r2 = (RESOLUTION_SCALE as f64 * habitat_radius_m / cell_length_m).ceil() as usize;
            let r1 = r2
                + (RESOLUTION_SCALE as f64 * effective_distance_km * 1000.0 / cell_length_m).ceil()
                    as usize;

            if 2 * r1 + 1 > high_cols {
                log::debug!(
                    "skipping cell ({row}, {col}): kernel radius {r1} exceeds the grid"
                );
                continue;
            }

            let kernel = Arc::clone(
                kernels
                    .entry((r1, r2))
                    .or_insert_with(|| Arc::new(conical_frustum_kernel(r1, r2))),
            );
            apply_kernel_max(
                &mut high,
                (row * RESOLUTION_SCALE) as i64 + offset,
                (col * RESOLUTION_SCALE) as i64 + offset,
                &kernel,
            );
        }
    }

    rebin(&high, WORLD_ROWS, WORLD_COLS)
}

/// Sum `layer` into `acc`: values add where both are defined, and cells
/// defined only in `layer` pass into `acc` unchanged.
fn sum_union(acc: &mut ProbabilityMatrix, layer: &ProbabilityMatrix) {
    for (row, col, v) in layer.iter_defined() {
        match acc.get(row, col) {
            Some(existing) => acc.define(row, col, existing + v),
            None => acc.define(row, col, v),
        }
    }
}

/// Combine diffused layers. Distance-independent layers are summed first;
/// the inshore/offshore exclusion then extends the defined region with
/// zeros everywhere the taxon could have an opinion (cells on the wrong
/// side of the coastal split keep "no opinion"); finally the
/// distance-dependent layers are summed in and the result is normalized by
/// its own maximum.
fn combine_layers(
    taxon: &Taxon,
    dist_independent: &[ProbabilityMatrix],
    dist_dependent: &[ProbabilityMatrix],
    coastal_prop: &Grid2D,
    strict_numeric: bool,
) -> Result<ProbabilityMatrix> {
    let mut acc = ProbabilityMatrix::world();
    for layer in dist_independent {
        sum_union(&mut acc, layer);
    }

    if taxon.habitat.inshore == 0.0 {
        extend_except(&mut acc, coastal_prop, 1.0);
    }
    if taxon.habitat.offshore == 0.0 {
        extend_except(&mut acc, coastal_prop, 0.0);
    }

    for layer in dist_dependent {
        sum_union(&mut acc, layer);
    }

    match acc.max_defined() {
        Some(max) if max > 0.0 => {
            acc.scale(1.0 / max);
            Ok(acc)
        }
        _ => {
            if strict_numeric {
                return Err(Error::Numeric {
                    taxon_key: taxon.taxon_key,
                    reason: "habitat layers have no positive values to normalize".into(),
                });
            }
            log::warn!(
                "taxon {}: habitat layers have no positive values, no opinion",
                taxon.taxon_key
            );
            Ok(ProbabilityMatrix::world())
        }
    }
}

/// Define every currently-undefined cell as 0, except those whose coastal
/// proportion equals `excluded` — they keep "no opinion".
fn extend_except(acc: &mut ProbabilityMatrix, coastal_prop: &Grid2D, excluded: f64) {
    for row in 0..acc.rows() {
        for col in 0..acc.cols() {
            if !acc.is_defined(row, col) && coastal_prop.get(row, col) != excluded {
                acc.define(row, col, 0.0);
            }
        }
    }
}

pub fn filter(
    taxon: &Taxon,
    world: &WorldGrid,
    polygon: &ProbabilityMatrix,
    strict_numeric: bool,
) -> Result<ProbabilityMatrix> {
    let area = world.field(field::AREA)?;
    let mut kernels: HashMap<(usize, usize), Arc<ProbabilityMatrix>> = HashMap::new();

    let mut dist_independent = Vec::new();
    let mut dist_dependent = Vec::new();

    for layer in &LAYERS {
        let weight = (layer.weight)(&taxon.habitat);
        if !(weight > 0.0) {
            continue;
        }
        log::debug!("taxon {}: habitat layer {}", taxon.taxon_key, layer.name);

        let raw = world.field(layer.field)?;
        let mut fraction = Grid2D::world(0.0);
        for row in 0..WORLD_ROWS {
            for col in 0..WORLD_COLS {
                let v = raw.get(row, col);
                let f = match layer.normalize {
                    Normalize::ByArea => {
                        let a = area.get(row, col);
                        if a > 0.0 {
                            v / a
                        } else {
                            0.0
                        }
                    }
                    Normalize::Percent => v / 100.0,
                    Normalize::None => v,
                };
                fraction.set(row, col, f);
            }
        }

        let mut matrix = diffuse_layer(
            &fraction,
            taxon.effective_distance_km,
            &area,
            polygon,
            &mut kernels,
        );
        matrix.scale(weight);
        if layer.dist_independent {
            dist_independent.push(matrix);
        } else {
            dist_dependent.push(matrix);
        }
    }

    // Distance-independent layers alone never produce an opinion; they only
    // reinforce the distance-dependent ones.
    if dist_dependent.is_empty() {
        return Ok(ProbabilityMatrix::world());
    }

    let coastal_prop = world.field(field::COASTAL_PROP)?;
    combine_layers(
        taxon,
        &dist_independent,
        &dist_dependent,
        &coastal_prop,
        strict_numeric,
    )
}
