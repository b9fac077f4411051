//! Taxon records: the per-species attributes every filter reads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Sentinel meaning "maximum depth unknown"; the submergence filter skips
/// taxa carrying it.
pub const DEPTH_UNKNOWN: f64 = 9999.0;

/// Affinity weights for each habitat type, 0 meaning "not applicable".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitatWeights {
    #[serde(default)]
    pub inshore: f64,
    #[serde(default)]
    pub offshore: f64,
    #[serde(default)]
    pub coral: f64,
    #[serde(default)]
    pub estuary: f64,
    #[serde(default)]
    pub seamount: f64,
    #[serde(default)]
    pub shelf: f64,
    #[serde(default)]
    pub slope: f64,
    #[serde(default)]
    pub abyssal: f64,
}

impl HabitatWeights {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("inshore", self.inshore),
            ("offshore", self.offshore),
            ("coral", self.coral),
            ("estuary", self.estuary),
            ("seamount", self.seamount),
            ("shelf", self.shelf),
            ("slope", self.slope),
            ("abyssal", self.abyssal),
        ]
        .into_iter()
    }
}

/// One modeled species/group. Immutable for the duration of a taxon's
/// processing; read from the repository once per taxon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub taxon_key: u32,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub scientific_name: String,
    /// Shallow depth limit in meters, positive down (surface = 0).
    pub min_depth: f64,
    /// Deep depth limit in meters, positive down.
    pub max_depth: f64,
    /// Northern latitudinal limit in degrees, −90..90.
    pub lat_north: f64,
    /// Southern latitudinal limit in degrees, −90..90.
    pub lat_south: f64,
    #[serde(default)]
    pub pelagic: bool,
    #[serde(default)]
    pub intertidal: bool,
    /// FAO statistical areas the taxon is reported from.
    #[serde(default)]
    pub fao_areas: BTreeSet<u16>,
    #[serde(default)]
    pub habitat: HabitatWeights,
    /// Habitat diffusion radius in kilometers.
    #[serde(default)]
    pub effective_distance_km: f64,
}

impl Taxon {
    /// Basic validity checks applied before any filter runs.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(Error::InvalidTaxon { taxon_key: self.taxon_key, reason })
        };

        if !(self.lat_north > self.lat_south) {
            return fail(format!(
                "lat_north {} must exceed lat_south {}",
                self.lat_north, self.lat_south
            ));
        }
        if self.lat_north > 90.0 || self.lat_south < -90.0 {
            return fail(format!(
                "latitude range [{}, {}] outside [-90, 90]",
                self.lat_south, self.lat_north
            ));
        }
        if self.min_depth < 0.0 || self.max_depth < self.min_depth {
            return fail(format!(
                "depth range [{}, {}] must satisfy 0 <= min <= max",
                self.min_depth, self.max_depth
            ));
        }
        if self.effective_distance_km < 0.0 {
            return fail(format!(
                "effective distance {} km is negative",
                self.effective_distance_km
            ));
        }
        if let Some((name, w)) = self.habitat.iter().find(|&(_, w)| w < 0.0) {
            return fail(format!("habitat weight {name} = {w} is negative"));
        }
        Ok(())
    }

    /// True when the depth range carries the "unknown" sentinel.
    pub fn depth_unknown(&self) -> bool {
        self.max_depth >= DEPTH_UNKNOWN
    }
}
