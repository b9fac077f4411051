//! Static world reference data: named environmental raster layers served
//! through a read-through cache.
//!
//! `WorldGrid` is constructed explicitly and passed into each filter call;
//! there is no process-wide singleton. Each worker owns its own instance —
//! field queries are idempotent and cheap next to per-taxon filter work, so
//! nothing is shared across workers.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::errors::{Error, Result};
use crate::grid::{lat_for_row, lon_for_col, Grid2D, CELL_DEG, WORLD_COLS, WORLD_ROWS};
use crate::sphere::great_circle_distance_m;

/// Raw field names served by a `GridSource`.
pub mod field {
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    pub const ELEVATION_MIN: &str = "elevation_min";
    pub const ELEVATION_MAX: &str = "elevation_max";
    pub const ELEVATION_MEAN: &str = "elevation_mean";
    pub const PERCENT_WATER: &str = "percent_water";
    pub const FAO_AREA: &str = "fao_area";
    pub const COASTAL_PROP: &str = "coastal_prop";
    pub const AREA: &str = "area";
    pub const CORAL: &str = "coral";
    pub const ESTUARY: &str = "estuary";
    pub const SEAMOUNT: &str = "seamount";
    pub const SHELF: &str = "shelf";
    pub const SLOPE: &str = "slope";
    pub const ABYSSAL: &str = "abyssal";

    // Derived fields computed by WorldGrid itself.
    pub const AREA_COAST: &str = "area_coast";
    pub const AREA_OFFSHORE: &str = "area_offshore";
    pub const CELL_HEIGHT: &str = "cell_height";
}

/// Backing store for raw world fields.
///
/// `field` returns one (row, col, value) triple per grid cell, ordered by
/// (row, col).
pub trait GridSource: Send + Sync {
    fn field(&self, name: &str) -> Result<Vec<(usize, usize, f64)>>;
}

/// Read-through, memoizing view over a `GridSource`. Raw and derived fields
/// are cached for the lifetime of the instance; repeated lookups return the
/// same shared array without re-querying the source.
pub struct WorldGrid {
    source: Box<dyn GridSource>,
    cache: Mutex<HashMap<String, Arc<Grid2D>>>,
}

impl WorldGrid {
    pub fn new(source: Box<dyn GridSource>) -> Self {
        Self { source, cache: Mutex::new(HashMap::new()) }
    }

    /// Fetch a named field, memoized.
    pub fn field(&self, name: &str) -> Result<Arc<Grid2D>> {
        if let Some(grid) = self.cache.lock().unwrap().get(name) {
            return Ok(Arc::clone(grid));
        }

        let grid = Arc::new(self.load(name)?);
        self.cache
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&grid));
        Ok(grid)
    }

    fn load(&self, name: &str) -> Result<Grid2D> {
        match name {
            field::AREA_COAST => {
                let prop = self.field(field::COASTAL_PROP)?;
                let area = self.field(field::AREA)?;
                Ok(combine(&prop, &area, |p, a| p * a))
            }
            field::AREA_OFFSHORE => {
                let prop = self.field(field::COASTAL_PROP)?;
                let area = self.field(field::AREA)?;
                Ok(combine(&prop, &area, |p, a| (1.0 - p) * a))
            }
            field::CELL_HEIGHT => Ok(cell_height_grid()),
            raw => {
                log::debug!("loading world field {raw:?}");
                let cells = self.source.field(raw)?;
                if cells.len() != WORLD_ROWS * WORLD_COLS {
                    return Err(Error::FieldShape {
                        name: raw.to_string(),
                        got: cells.len(),
                        expected: WORLD_ROWS * WORLD_COLS,
                    });
                }
                let mut grid = Grid2D::world(0.0);
                for (row, col, value) in cells {
                    if row >= WORLD_ROWS || col >= WORLD_COLS {
                        return Err(Error::FieldShape {
                            name: raw.to_string(),
                            got: row * WORLD_COLS + col,
                            expected: WORLD_ROWS * WORLD_COLS,
                        });
                    }
                    grid.set(row, col, value);
                }
                Ok(grid)
            }
        }
    }
}

fn combine(a: &Grid2D, b: &Grid2D, f: impl Fn(f64, f64) -> f64) -> Grid2D {
    let mut out = Grid2D::world(0.0);
    for row in 0..WORLD_ROWS {
        for col in 0..WORLD_COLS {
            out.set(row, col, f(a.get(row, col), b.get(row, col)));
        }
    }
    out
}

/// North-south extent of each cell in meters. The grid is a regular lat/lon
/// raster, so the height depends only on the row.
fn cell_height_grid() -> Grid2D {
    let mut grid = Grid2D::world(0.0);
    for row in 0..WORLD_ROWS {
        let lat = lat_for_row(row);
        let lon = lon_for_col(0);
        let height = great_circle_distance_m(
            lat - CELL_DEG / 2.0,
            lon,
            lat + CELL_DEG / 2.0,
            lon,
        );
        for col in 0..WORLD_COLS {
            grid.set(row, col, height);
        }
    }
    grid
}

/// In-memory source holding full per-field arrays. The backbone of tests and
/// of any caller that assembles world data itself.
#[derive(Default)]
pub struct InMemorySource {
    fields: HashMap<String, Vec<f64>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field from a row-major array of 360×720 values.
    pub fn insert(&mut self, name: &str, values: Vec<f64>) -> &mut Self {
        assert_eq!(values.len(), WORLD_ROWS * WORLD_COLS, "field {name} has wrong length");
        self.fields.insert(name.to_string(), values);
        self
    }

    /// Register a field with the same value everywhere.
    pub fn insert_uniform(&mut self, name: &str, value: f64) -> &mut Self {
        self.insert(name, vec![value; WORLD_ROWS * WORLD_COLS])
    }
}

impl GridSource for InMemorySource {
    fn field(&self, name: &str) -> Result<Vec<(usize, usize, f64)>> {
        let values = self
            .fields
            .get(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        Ok(values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i / WORLD_COLS, i % WORLD_COLS, v))
            .collect())
    }
}

/// JSON-file-backed source: a single object mapping field name to a
/// row-major array of 259 200 values. Latitude and longitude may be omitted;
/// they are synthesized from the grid geometry.
pub struct JsonGridSource {
    fields: HashMap<String, Vec<f64>>,
}

impl JsonGridSource {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut fields: HashMap<String, Vec<f64>> = serde_json::from_reader(reader)?;

        fields.entry(field::LAT.to_string()).or_insert_with(|| {
            (0..WORLD_ROWS * WORLD_COLS)
                .map(|i| lat_for_row(i / WORLD_COLS))
                .collect()
        });
        fields.entry(field::LON.to_string()).or_insert_with(|| {
            (0..WORLD_ROWS * WORLD_COLS)
                .map(|i| lon_for_col(i % WORLD_COLS))
                .collect()
        });
        Ok(Self { fields })
    }
}

impl GridSource for JsonGridSource {
    fn field(&self, name: &str) -> Result<Vec<(usize, usize, f64)>> {
        let values = self
            .fields
            .get(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        if values.len() != WORLD_ROWS * WORLD_COLS {
            return Err(Error::FieldShape {
                name: name.to_string(),
                got: values.len(),
                expected: WORLD_ROWS * WORLD_COLS,
            });
        }
        Ok(values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i / WORLD_COLS, i % WORLD_COLS, v))
            .collect())
    }
}
