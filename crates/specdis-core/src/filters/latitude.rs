//! Latitude filter: a 1-D north-south occurrence density broadcast across
//! all longitudes.
//!
//! The latitudinal range is divided into thirds. When the middle third
//! straddles the equator the density is a trapezoid — 0 at the southern
//! limit, 1 across the middle third, 0 at the northern limit. Otherwise it
//! is a symmetric triangle peaking at the range midpoint.

use crate::errors::Result;
use crate::matrix::ProbabilityMatrix;
use crate::taxon::Taxon;
use crate::world::{field, WorldGrid};

/// Density control points for a latitudinal range, as (latitude, density)
/// pairs ordered south to north.
fn control_points(lat_south: f64, lat_north: f64) -> Vec<(f64, f64)> {
    let third = (lat_north - lat_south) / 3.0;
    let b1 = lat_south + third;
    let b2 = lat_north - third;
    if b1 < 0.0 && b2 > 0.0 {
        vec![(lat_south, 0.0), (b1, 1.0), (b2, 1.0), (lat_north, 0.0)]
    } else {
        let mid = (lat_south + lat_north) / 2.0;
        vec![(lat_south, 0.0), (mid, 1.0), (lat_north, 0.0)]
    }
}

/// Piecewise-linear interpolation over the control points, clamped to the
/// endpoint values outside the range (which are both 0).
fn interp(points: &[(f64, f64)], x: f64) -> f64 {
    match points {
        [] => 0.0,
        [only] => only.1,
        _ => {
            if x <= points[0].0 {
                return points[0].1;
            }
            if x >= points[points.len() - 1].0 {
                return points[points.len() - 1].1;
            }
            for pair in points.windows(2) {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                if x <= x1 {
                    if x1 == x0 {
                        return y1;
                    }
                    return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
                }
            }
            0.0
        }
    }
}

/// Density at a single latitude for the taxon's range. Exposed so tests can
/// probe exact latitudes that fall between grid rows.
pub fn density_at(taxon: &Taxon, latitude: f64) -> f64 {
    interp(&control_points(taxon.lat_south, taxon.lat_north), latitude)
}

pub fn filter(taxon: &Taxon, world: &WorldGrid) -> Result<ProbabilityMatrix> {
    let mut matrix = ProbabilityMatrix::world();
    if taxon.lat_north <= taxon.lat_south {
        log::warn!(
            "taxon {}: degenerate latitude range [{}, {}], no opinion",
            taxon.taxon_key,
            taxon.lat_south,
            taxon.lat_north
        );
        return Ok(matrix);
    }

    let points = control_points(taxon.lat_south, taxon.lat_north);
    let lat = world.field(field::LAT)?;
    for row in 0..matrix.rows() {
        let density = interp(&points, lat.get(row, 0));
        if density > 0.0 {
            for col in 0..matrix.cols() {
                matrix.define(row, col, density);
            }
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::lat_for_row;
    use crate::testutil::{taxon_for_tests, world_for_tests, WorldSpec};
    use approx::assert_relative_eq;

    fn taxon_with_range(lat_south: f64, lat_north: f64) -> Taxon {
        let mut t = taxon_for_tests();
        t.lat_south = lat_south;
        t.lat_north = lat_north;
        t
    }

    #[test]
    fn equator_straddling_range_peaks_in_the_middle_band() {
        let world = world_for_tests(&WorldSpec::default());
        let taxon = taxon_with_range(-10.0, 10.0);
        let m = filter(&taxon, &world).unwrap();

        // Rows just above and below the equator sit inside the middle third.
        let row_near_equator = 179; // lat 0.25
        assert_eq!(m.get(row_near_equator, 0), Some(1.0));

        // Monotone decay from the middle band out to both bounds.
        let mut prev = m.get(row_near_equator, 0).unwrap();
        for row in row_near_equator + 1..360 {
            match m.get(row, 0) {
                Some(v) => {
                    assert!(v <= prev, "density must not increase toward lat_south");
                    prev = v;
                }
                None => break,
            }
        }

        // Exactly 0 at the bounds (between grid rows, probed on the density).
        assert_eq!(density_at(&taxon, 10.0), 0.0);
        assert_eq!(density_at(&taxon, -10.0), 0.0);
        assert_eq!(density_at(&taxon, 0.0), 1.0);
    }

    #[test]
    fn rows_outside_the_range_are_masked() {
        let world = world_for_tests(&WorldSpec::default());
        let taxon = taxon_with_range(-10.0, 10.0);
        let m = filter(&taxon, &world).unwrap();

        assert_eq!(m.get(0, 0), None, "north pole row");
        assert_eq!(m.get(359, 0), None, "south pole row");
        // lat 10.25 is just outside the range.
        assert!(lat_for_row(159) > 10.0);
        assert_eq!(m.get(159, 0), None);
    }

    #[test]
    fn single_hemisphere_range_is_triangular() {
        let taxon = taxon_with_range(0.0, 30.0);
        assert_eq!(density_at(&taxon, 15.0), 1.0);
        assert_relative_eq!(density_at(&taxon, 7.5), 0.5);
        assert_relative_eq!(density_at(&taxon, 22.5), 0.5);
        assert_eq!(density_at(&taxon, 0.0), 0.0);
        assert_eq!(density_at(&taxon, 30.0), 0.0);
    }

    #[test]
    fn trapezoid_holds_one_across_the_middle_third() {
        let taxon = taxon_with_range(-30.0, 30.0);
        // Middle third is [-10, 10].
        assert_eq!(density_at(&taxon, -10.0), 1.0);
        assert_eq!(density_at(&taxon, 10.0), 1.0);
        assert_eq!(density_at(&taxon, 0.0), 1.0);
        assert_relative_eq!(density_at(&taxon, 20.0), 0.5);
    }

    #[test]
    fn density_is_broadcast_across_all_columns() {
        let world = world_for_tests(&WorldSpec::default());
        let taxon = taxon_with_range(-10.0, 10.0);
        let m = filter(&taxon, &world).unwrap();
        let v = m.get(180, 0);
        for col in [1, 100, 719] {
            assert_eq!(m.get(180, col), v);
        }
    }
}
