//! Shared fixtures for the unit tests: a small synthetic world and a
//! plausible benthic taxon.

use std::collections::BTreeSet;

use crate::grid::{lat_for_row, WORLD_COLS, WORLD_ROWS};
use crate::taxon::{HabitatWeights, Taxon};
use crate::world::{field, InMemorySource, WorldGrid};

/// Knobs for the synthetic test world. Every field is uniform except the
/// FAO id, which splits at the equator.
pub struct WorldSpec {
    pub elevation_mean: f64,
    pub elevation_min: f64,
    pub percent_water: f64,
    pub coastal_prop: f64,
    pub area_km2: f64,
    /// FAO id for rows north of the equator.
    pub fao_north: f64,
    /// FAO id for rows south of the equator.
    pub fao_south: f64,
}

impl Default for WorldSpec {
    fn default() -> Self {
        Self {
            elevation_mean: -1000.0,
            elevation_min: -1200.0,
            percent_water: 100.0,
            coastal_prop: 0.25,
            area_km2: 2000.0,
            fao_north: 27.0,
            fao_south: 47.0,
        }
    }
}

/// Build a `WorldGrid` backed by an in-memory source per `spec`.
pub fn world_for_tests(spec: &WorldSpec) -> WorldGrid {
    let mut source = InMemorySource::new();
    source
        .insert_uniform(field::ELEVATION_MEAN, spec.elevation_mean)
        .insert_uniform(field::ELEVATION_MIN, spec.elevation_min)
        .insert_uniform(field::ELEVATION_MAX, 0.0)
        .insert_uniform(field::PERCENT_WATER, spec.percent_water)
        .insert_uniform(field::COASTAL_PROP, spec.coastal_prop)
        .insert_uniform(field::AREA, spec.area_km2)
        .insert_uniform(field::CORAL, 0.0)
        .insert_uniform(field::ESTUARY, 0.0)
        .insert_uniform(field::SEAMOUNT, 0.0)
        .insert_uniform(field::SHELF, 0.0)
        .insert_uniform(field::SLOPE, 0.0)
        .insert_uniform(field::ABYSSAL, 0.0);

    let mut lat = Vec::with_capacity(WORLD_ROWS * WORLD_COLS);
    let mut fao = Vec::with_capacity(WORLD_ROWS * WORLD_COLS);
    for row in 0..WORLD_ROWS {
        let row_lat = lat_for_row(row);
        let id = if row_lat > 0.0 { spec.fao_north } else { spec.fao_south };
        for _ in 0..WORLD_COLS {
            lat.push(row_lat);
            fao.push(id);
        }
    }
    source.insert(field::LAT, lat);
    source.insert(field::FAO_AREA, fao);

    WorldGrid::new(Box::new(source))
}

/// A benthic shelf taxon with an offshore affinity, 10-100 m depth range,
/// and a latitude range straddling the equator.
pub fn taxon_for_tests() -> Taxon {
    Taxon {
        taxon_key: 600107,
        common_name: "test cod".into(),
        scientific_name: "Gadus testis".into(),
        min_depth: 10.0,
        max_depth: 100.0,
        lat_north: 40.0,
        lat_south: -10.0,
        pelagic: false,
        intertidal: false,
        fao_areas: BTreeSet::from([27, 47]),
        habitat: HabitatWeights { offshore: 1.0, ..HabitatWeights::default() },
        effective_distance_km: 50.0,
    }
}
