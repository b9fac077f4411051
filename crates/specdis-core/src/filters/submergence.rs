//! Submergence filter: a depth-versus-latitude occurrence band bounded by
//! two fitted parabolas.
//!
//! The shallow (upper) and deep (lower) depth limits are modeled as
//! second-degree polynomials over latitude, anchored on the taxon's depth
//! and latitude limits plus the geometric mean depth. Submergence is assumed
//! constant poleward of 60°/−60°. Where the seafloor drops below the fitted
//! shallow bound, the triangular depth probability is evaluated with the two
//! fitted bounds standing in for the taxon's own depth limits.

use crate::errors::{Error, Result};
use crate::filters::depth::depth_probability;
use crate::matrix::ProbabilityMatrix;
use crate::taxon::Taxon;
use crate::world::{field, WorldGrid};

/// Latitude beyond which the depth gradients are held constant.
const LAT_LIMIT: f64 = 60.0;
/// Smallest depth magnitude accepted by the geometric mean.
const MIN_DEPTH_MAGNITUDE: f64 = 1e-3;

/// y = a·x² + b·x + c, depth as a function of latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Parabola {
    pub fn eval(&self, x: f64) -> f64 {
        self.a * x * x + self.b * x + self.c
    }
}

/// Least-squares quadratic through the given (latitude, depth) points,
/// via the 3×3 normal equations.
fn fit_quadratic(taxon_key: u32, points: &[(f64, f64)]) -> Result<Parabola> {
    let n = points.len() as f64;
    let (mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
    let (mut sy, mut sxy, mut sx2y) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let x2 = x * x;
        s1 += x;
        s2 += x2;
        s3 += x2 * x;
        s4 += x2 * x2;
        sy += y;
        sxy += x * y;
        sx2y += x2 * y;
    }

    // | s4 s3 s2 | a   sx2y
    // | s3 s2 s1 | b = sxy
    // | s2 s1 n  | c   sy
    let det = s4 * (s2 * n - s1 * s1) - s3 * (s3 * n - s1 * s2) + s2 * (s3 * s1 - s2 * s2);
    if det.abs() < 1e-9 * s4.max(1.0) {
        return Err(Error::Numeric {
            taxon_key,
            reason: format!("parabola fit is degenerate for control points {points:?}"),
        });
    }

    let a = (sx2y * (s2 * n - s1 * s1) - s3 * (sxy * n - sy * s1) + s2 * (sxy * s1 - sy * s2)) / det;
    let b = (s4 * (sxy * n - sy * s1) - sx2y * (s3 * n - s1 * s2) + s2 * (s3 * sy - s2 * sxy)) / det;
    let c = (s4 * (s2 * sy - s1 * sxy) - s3 * (s3 * sy - s2 * sxy) + sx2y * (s3 * s1 - s2 * s2)) / det;
    Ok(Parabola { a, b, c })
}

/// Geometric mean depth: log-domain average of the two magnitudes, negated.
/// Magnitudes below the floor are nudged onto it, or rejected outright in
/// strict-numeric mode.
fn geometric_mean_depth(
    taxon_key: u32,
    min_depth: f64,
    max_depth: f64,
    strict_numeric: bool,
) -> Result<f64> {
    let mut magnitudes = [min_depth.abs(), max_depth.abs()];
    for m in &mut magnitudes {
        if *m < MIN_DEPTH_MAGNITUDE {
            if strict_numeric {
                return Err(Error::Numeric {
                    taxon_key,
                    reason: format!("depth magnitude {m} too small for geometric mean"),
                });
            }
            log::warn!(
                "taxon {taxon_key}: depth magnitude {m} below {MIN_DEPTH_MAGNITUDE}, nudged"
            );
            *m = MIN_DEPTH_MAGNITUDE;
        }
    }
    let mean = -10f64.powf((magnitudes[0].log10() + magnitudes[1].log10()) / 2.0);
    // Keep the control point inside the taxon's own depth band.
    Ok(mean.clamp(max_depth, min_depth))
}

/// Fit the shallow (upper) and deep (lower) depth-gradient parabolas for a
/// depth range and latitude range. Depths are in negative meters,
/// `min_depth` being the shallow limit.
///
/// One of five latitude scenarios selects the control points; two corrective
/// refits then repair the known pathologies: a lower parabola opening
/// downward (deepest at the poles) is refit flatter against the poleward
/// mean-depth anchors, and an upper parabola more curved than the lower
/// (crossing it inside the band) is refit through the mean depth at the
/// equator.
pub fn fit_parabolas(
    taxon_key: u32,
    min_depth: f64,
    max_depth: f64,
    lat_north: f64,
    lat_south: f64,
    strict_numeric: bool,
) -> Result<(Parabola, Parabola)> {
    let mean = geometric_mean_depth(taxon_key, min_depth, max_depth, strict_numeric)?;

    let north_polar = lat_north > LAT_LIMIT;
    let south_polar = lat_south < -LAT_LIMIT;

    let (upper_points, lower_points): (Vec<(f64, f64)>, Vec<(f64, f64)>) =
        if north_polar || south_polar {
            // The fitted band would surface poleward of ±60; anchor the
            // shallow bound at the polar limit(s) instead.
            let mut upper = Vec::new();
            if north_polar {
                upper.push((lat_north, 0.0));
            }
            if south_polar {
                upper.push((lat_south, 0.0));
            }
            upper.push((LAT_LIMIT, min_depth));
            upper.push((-LAT_LIMIT, min_depth));
            let lower = vec![
                (lat_south, max_depth),
                (LAT_LIMIT, mean),
                (-LAT_LIMIT, mean),
            ];
            (upper, lower)
        } else if lat_south >= 0.0 {
            // Fully northern: shallow limit at the poleward (northern) edge.
            (
                vec![(LAT_LIMIT, 0.0), (lat_north, min_depth), (-LAT_LIMIT, 0.0)],
                vec![(LAT_LIMIT, mean), (lat_south, max_depth), (-LAT_LIMIT, mean)],
            )
        } else if lat_north <= 0.0 {
            // Fully southern: mirrored anchors.
            (
                vec![(LAT_LIMIT, 0.0), (lat_south, min_depth), (-LAT_LIMIT, 0.0)],
                vec![(LAT_LIMIT, mean), (lat_north, max_depth), (-LAT_LIMIT, mean)],
            )
        } else {
            // Straddling the equator: shallow anchor at the dominant limit,
            // deep anchor at the equator.
            let dominant = if lat_north.abs() >= lat_south.abs() {
                lat_north
            } else {
                lat_south
            };
            (
                vec![(LAT_LIMIT, 0.0), (dominant, min_depth), (-LAT_LIMIT, 0.0)],
                vec![(LAT_LIMIT, mean), (0.0, max_depth), (-LAT_LIMIT, mean)],
            )
        };

    let upper = fit_quadratic(taxon_key, &upper_points)?;
    let mut lower = fit_quadratic(taxon_key, &lower_points)?;

    let poleward = lat_north.abs().max(lat_south.abs());
    if lower.a < 0.0 {
        // Inverted lower parabola: deepest at the poles instead of inside
        // the range. Refit against the poleward mean-depth anchors.
        log::debug!("taxon {taxon_key}: lower parabola inverted (a = {}), refitting", lower.a);
        lower = fit_quadratic(
            taxon_key,
            &[
                (poleward, mean),
                (-poleward, mean),
                (LAT_LIMIT, max_depth),
                (-LAT_LIMIT, max_depth),
            ],
        )?;
    }

    let upper = if upper.a > lower.a {
        // Crossed parabolas: the shallow bound dives under the deep bound
        // inside the band. Refit the upper flatter through the mean depth.
        log::debug!(
            "taxon {taxon_key}: parabolas crossed (upper a = {}, lower a = {}), refitting",
            upper.a,
            lower.a
        );
        fit_quadratic(
            taxon_key,
            &[(poleward, 0.0), (-poleward, 0.0), (0.0, mean)],
        )?
    } else {
        upper
    };

    Ok((upper, lower))
}

/// Apply the fitted band per cell over the deepest seafloor elevation.
/// Skipped for intertidal taxa, taxa with the unknown-depth sentinel, and
/// polar-extreme latitude bounds.
pub fn filter(taxon: &Taxon, world: &WorldGrid, strict_numeric: bool) -> Result<ProbabilityMatrix> {
    let mut matrix = ProbabilityMatrix::world();
    if taxon.intertidal || taxon.depth_unknown() {
        log::debug!("taxon {}: submergence not applicable", taxon.taxon_key);
        return Ok(matrix);
    }
    if taxon.lat_north.abs() == 90.0 || taxon.lat_south.abs() == 90.0 {
        log::debug!(
            "taxon {}: latitude bounds reach the poles, submergence skipped",
            taxon.taxon_key
        );
        return Ok(matrix);
    }

    let (upper, lower) = fit_parabolas(
        taxon.taxon_key,
        -taxon.min_depth,
        -taxon.max_depth,
        taxon.lat_north,
        taxon.lat_south,
        strict_numeric,
    )?;

    let elevation = world.field(field::ELEVATION_MIN)?;
    let lat = world.field(field::LAT)?;
    for row in 0..matrix.rows() {
        let latitude = lat.get(row, 0).clamp(-LAT_LIMIT, LAT_LIMIT);
        let shallow_bound = upper.eval(latitude);
        let deep_bound = lower.eval(latitude);
        for col in 0..matrix.cols() {
            let seafloor = elevation.get(row, col);
            if seafloor < shallow_bound {
                matrix.define(
                    row,
                    col,
                    depth_probability(seafloor, shallow_bound, deep_bound),
                );
            }
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxon::DEPTH_UNKNOWN;
    use crate::testutil::{taxon_for_tests, world_for_tests, WorldSpec};
    use approx::assert_relative_eq;

    #[test]
    fn equatorial_straddling_fit_hits_the_anchor_points() {
        let (upper, lower) = fit_parabolas(1, -1.0, -10.0, 10.0, -10.0, false).unwrap();
        assert_relative_eq!(lower.eval(0.0), -10.0, epsilon = 1e-6);
        assert_relative_eq!(upper.eval(10.0), -1.0, epsilon = 1e-6);
        // Between the equator and the northern limit the shallow bound dips
        // slightly below the depth limit itself.
        assert_relative_eq!(upper.eval(5.0), -1.02, epsilon = 0.05);
    }

    #[test]
    fn inverted_lower_parabola_is_refit_against_the_poles() {
        // Pole-to-pole range whose naive lower fit opens downward.
        let (upper, lower) = fit_parabolas(100036, -1.0, -300.0, 90.0, -90.0, false).unwrap();
        assert!(lower.a > 0.0, "refit lower parabola must open upward");
        assert_relative_eq!(lower.eval(0.0), -526.1, epsilon = 0.1);
        let mean = -(300f64).sqrt();
        assert!(upper.eval(0.0) > mean, "shallow bound must stay above the mean depth");
    }

    #[test]
    fn crossed_parabolas_refit_the_upper_through_the_mean() {
        // Northern range reaching past 60°; the naive upper fit is more
        // curved than the lower and crosses it.
        let (upper, lower) = fit_parabolas(500871, -10.0, -50.0, 65.0, 14.0, false).unwrap();
        assert!(upper.a <= lower.a);
        let mean = -(10f64 * 50.0).sqrt();
        assert_relative_eq!(upper.eval(0.0), mean, epsilon = 0.1);
    }

    #[test]
    fn fully_southern_range_anchors_the_shallow_bound_poleward() {
        let (upper, _) = fit_parabolas(2, -5.0, -80.0, -10.0, -40.0, false).unwrap();
        assert_relative_eq!(upper.eval(-40.0), -5.0, epsilon = 1e-6);
        assert_relative_eq!(upper.eval(60.0), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_depth_is_nudged_or_rejected() {
        assert!(fit_parabolas(3, 0.0, -10.0, 10.0, -10.0, false).is_ok());
        assert!(matches!(
            fit_parabolas(3, 0.0, -10.0, 10.0, -10.0, true),
            Err(Error::Numeric { taxon_key: 3, .. })
        ));
    }

    #[test]
    fn intertidal_and_sentinel_depth_taxa_are_skipped() {
        let world = world_for_tests(&WorldSpec::default());

        let mut intertidal = taxon_for_tests();
        intertidal.intertidal = true;
        assert!(filter(&intertidal, &world, false).unwrap().is_empty());

        let mut unknown = taxon_for_tests();
        unknown.max_depth = DEPTH_UNKNOWN;
        assert!(filter(&unknown, &world, false).unwrap().is_empty());

        let mut polar = taxon_for_tests();
        polar.lat_south = -90.0;
        assert!(filter(&polar, &world, false).unwrap().is_empty());
    }

    #[test]
    fn deep_seafloor_inside_the_band_scores_one() {
        // Uniform 1200 m seafloor against a 10-100 m taxon: everywhere the
        // seafloor is below both fitted bounds, so the whole water column of
        // the band is available.
        let world = world_for_tests(&WorldSpec::default());
        let taxon = taxon_for_tests();
        let m = filter(&taxon, &world, false).unwrap();
        assert_eq!(m.count_defined(), 360 * 720);
        assert_eq!(m.get(180, 0), Some(1.0));
    }

    #[test]
    fn seafloor_above_the_shallow_bound_is_masked() {
        // A 50 m seafloor against a 100-1000 m taxon: around the equator the
        // fitted shallow bound dives well below the seafloor and the cells
        // are shaved off; toward the poles the bound rises to the surface
        // and the cells stay in.
        let spec = WorldSpec { elevation_min: -50.0, ..WorldSpec::default() };
        let world = world_for_tests(&spec);
        let mut taxon = taxon_for_tests();
        taxon.min_depth = 100.0;
        taxon.max_depth = 1000.0;
        let m = filter(&taxon, &world, false).unwrap();
        assert_eq!(m.get(180, 0), None, "equatorial cell must be shaved off");
        assert!(m.get(0, 0).is_some(), "poleward cell must stay defined");
        assert!(!m.is_empty());
    }
}
