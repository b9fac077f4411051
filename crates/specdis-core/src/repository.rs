//! Taxon data access: the read-only repository contract the pipeline
//! consumes, plus a JSON-file-backed implementation.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::taxon::Taxon;

/// Which taxa a run should process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonSelection {
    All,
    /// An explicit list of taxon keys.
    Keys(Vec<u32>),
    /// The first N taxa in repository order.
    Limit(usize),
}

/// Read-only access to taxon records and their rasterized extents.
pub trait TaxonRepository: Send + Sync {
    fn taxon(&self, taxon_key: u32) -> Result<Taxon>;

    /// Grid cells intersected by the taxon's expert range geometry.
    /// An empty result is reported as `NoPolygon`.
    fn polygon_cells(&self, taxon_key: u32) -> Result<Vec<(usize, usize)>>;

    fn taxon_keys(&self, selection: &TaxonSelection) -> Result<Vec<u32>>;
}

/// On-disk record shape for the JSON repository: a taxon plus its
/// pre-rasterized polygon cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonRecord {
    #[serde(flatten)]
    pub taxon: Taxon,
    #[serde(default)]
    pub polygon_cells: Vec<(usize, usize)>,
}

/// Repository backed by a JSON array of `TaxonRecord`s.
pub struct JsonTaxonRepository {
    records: BTreeMap<u32, TaxonRecord>,
}

impl JsonTaxonRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<TaxonRecord> = serde_json::from_reader(reader)?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<TaxonRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.taxon.taxon_key, r))
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TaxonRepository for JsonTaxonRepository {
    fn taxon(&self, taxon_key: u32) -> Result<Taxon> {
        self.records
            .get(&taxon_key)
            .map(|r| r.taxon.clone())
            .ok_or(Error::UnknownTaxon(taxon_key))
    }

    fn polygon_cells(&self, taxon_key: u32) -> Result<Vec<(usize, usize)>> {
        let record = self
            .records
            .get(&taxon_key)
            .ok_or(Error::UnknownTaxon(taxon_key))?;
        if record.polygon_cells.is_empty() {
            return Err(Error::NoPolygon { taxon_key });
        }
        Ok(record.polygon_cells.clone())
    }

    fn taxon_keys(&self, selection: &TaxonSelection) -> Result<Vec<u32>> {
        let all = self.records.keys().copied();
        Ok(match selection {
            TaxonSelection::All => all.collect(),
            TaxonSelection::Keys(keys) => keys.clone(),
            TaxonSelection::Limit(n) => all.take(*n).collect(),
        })
    }
}
