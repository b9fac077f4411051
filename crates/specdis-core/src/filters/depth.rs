//! Depth filter and the shared triangular depth-probability primitive.
//!
//! Depth conventions: the world grid measures elevation in negative meters
//! below sea level; taxon depth limits are given positive-down and negated
//! before use, so inside this module everything is in negative meters and
//! `taxon_min` (shallow limit) is numerically greater than `taxon_max`.

use std::collections::HashMap;

use crate::errors::Result;
use crate::matrix::ProbabilityMatrix;
use crate::taxon::Taxon;
use crate::world::{field, WorldGrid};

/// Probability of the taxon occurring in a cell with the given seafloor
/// depth, from a triangular density over [taxon_max, taxon_min] with its
/// apex one third of the way down from taxon_min.
///
/// The value is the fraction of the triangle's area lying at depths at or
/// above the seafloor — the part of the taxon's depth range the water
/// column actually offers. 1.0 in water deeper than the whole range, 0.0 in
/// water shallower than all of it.
pub fn depth_probability(seafloor: f64, taxon_min: f64, taxon_max: f64) -> f64 {
    if seafloor < taxon_max {
        return 1.0;
    }
    if seafloor > taxon_min {
        return 0.0;
    }

    let total_area = (taxon_min - taxon_max) / 2.0;
    if total_area <= 0.0 {
        // Degenerate zero-width range: the short circuits above already
        // decided everything except depth == both limits.
        return 1.0;
    }

    let apex = taxon_min - (taxon_min - taxon_max) / 3.0;
    let density = |z: f64| -> f64 {
        if z <= apex {
            (z - taxon_max) / (apex - taxon_max)
        } else {
            (taxon_min - z) / (taxon_min - apex)
        }
    };

    // Integrate the triangle over depths >= seafloor by the trapezoid rule
    // across the surviving control points.
    let mut points = vec![
        (seafloor, density(seafloor)),
        (apex, 1.0),
        (taxon_min, 0.0),
    ];
    points.retain(|&(z, _)| z >= seafloor);
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let mut area = 0.0;
    for pair in points.windows(2) {
        let (z0, p0) = pair[0];
        let (z1, p1) = pair[1];
        area += (z1 - z0) * (p0 + p1) / 2.0;
    }

    (area / total_area).clamp(0.0, 1.0)
}

/// Apply the triangular depth probability per cell over the grid's average
/// elevation. Skipped (no opinion anywhere) for pelagic taxa and taxa with
/// no offshore habitat affinity, where seafloor depth is not a meaningful
/// constraint.
pub fn filter(taxon: &Taxon, world: &WorldGrid) -> Result<ProbabilityMatrix> {
    let mut matrix = ProbabilityMatrix::world();
    if taxon.pelagic || taxon.habitat.offshore <= 0.0 {
        log::debug!("taxon {}: depth filter not applicable", taxon.taxon_key);
        return Ok(matrix);
    }

    let elevation = world.field(field::ELEVATION_MEAN)?;
    let taxon_min = -taxon.min_depth;
    let taxon_max = -taxon.max_depth;

    // Seafloor depths repeat across the grid; memoize the in-range
    // integrations per taxon instead of recomputing cell by cell.
    let mut memo: HashMap<u64, f64> = HashMap::new();
    for row in 0..matrix.rows() {
        for col in 0..matrix.cols() {
            let z = elevation.get(row, col);
            // Cheap inequality screen before the interpolated integral.
            let p = if z < taxon_max {
                1.0
            } else if z > taxon_min {
                0.0
            } else {
                *memo
                    .entry(z.to_bits())
                    .or_insert_with(|| depth_probability(z, taxon_min, taxon_max))
            };
            matrix.define(row, col, p);
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{taxon_for_tests, world_for_tests, WorldSpec};

    #[test]
    fn deep_water_probability_is_one() {
        assert_eq!(depth_probability(-1000.0, -10.0, -100.0), 1.0);
    }

    #[test]
    fn shallow_water_probability_is_zero() {
        assert_eq!(depth_probability(-1.0, -10.0, -100.0), 0.0);
    }

    #[test]
    fn probability_at_the_apex_is_the_top_triangle_share() {
        // Depth sits exactly at the apex of the triangular density: the
        // integral is the upper sub-triangle over the full triangle.
        let expected = (0.5 * 30.0 * 1.0) / (0.5 * 90.0 * 1.0);
        assert_eq!(depth_probability(-40.0, -10.0, -100.0), expected);
    }

    #[test]
    fn probability_is_monotone_in_seafloor_depth_and_bounded() {
        let mut prev = 0.0;
        for step in 0..=200 {
            let z = -5.0 - step as f64; // -5 down to -205
            let p = depth_probability(z, -10.0, -100.0);
            assert!((0.0..=1.0).contains(&p), "p={p} out of range at z={z}");
            assert!(p >= prev, "deeper water must not lower the probability");
            prev = p;
        }
        assert_eq!(prev, 1.0);
    }

    #[test]
    fn boundary_depths_hit_the_extremes() {
        assert_eq!(depth_probability(-10.0, -10.0, -100.0), 0.0);
        assert_eq!(depth_probability(-100.0, -10.0, -100.0), 1.0);
    }

    #[test]
    fn degenerate_zero_width_range_does_not_divide_by_zero() {
        let p = depth_probability(-50.0, -50.0, -50.0);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn pelagic_taxon_gets_no_opinion() {
        let world = world_for_tests(&WorldSpec::default());
        let mut taxon = taxon_for_tests();
        taxon.pelagic = true;
        assert!(filter(&taxon, &world).unwrap().is_empty());
    }

    #[test]
    fn non_offshore_taxon_gets_no_opinion() {
        let world = world_for_tests(&WorldSpec::default());
        let mut taxon = taxon_for_tests();
        taxon.habitat.offshore = 0.0;
        assert!(filter(&taxon, &world).unwrap().is_empty());
    }

    #[test]
    fn filter_defines_every_cell_with_in_range_values() {
        // Test world: uniform -1000 m seafloor, taxon range 10-100 m, so the
        // whole range is available everywhere.
        let world = world_for_tests(&WorldSpec::default());
        let taxon = taxon_for_tests();
        let m = filter(&taxon, &world).unwrap();
        assert_eq!(m.count_defined(), 360 * 720);
        assert_eq!(m.get(100, 100), Some(1.0));
    }
}
