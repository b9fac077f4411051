//! Error taxonomy for the distribution pipeline.
//!
//! Per-taxon conditions (`NoPolygon`, `InvalidTaxon`, `ExistingRecord`,
//! `EmptyDistribution`, `Numeric`) are caught at the orchestrator boundary,
//! logged with the taxon key, and never abort a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("taxon {taxon_key} has no rasterizable polygon extent")]
    NoPolygon { taxon_key: u32 },

    #[error("invalid taxon {taxon_key}: {reason}")]
    InvalidTaxon { taxon_key: u32, reason: String },

    #[error("output for taxon {taxon_key} already exists (use force to overwrite)")]
    ExistingRecord { taxon_key: u32 },

    #[error("distribution for taxon {taxon_key} is empty after combination")]
    EmptyDistribution { taxon_key: u32 },

    #[error("numeric domain error for taxon {taxon_key}: {reason}")]
    Numeric { taxon_key: u32, reason: String },

    #[error("unknown taxon {0}")]
    UnknownTaxon(u32),

    #[error("unknown world field {0:?}")]
    UnknownField(String),

    #[error("world field {name:?} has {got} cells, expected {expected}")]
    FieldShape { name: String, got: usize, expected: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for conditions that skip one taxon rather than failing the run.
    pub fn is_per_taxon_skip(&self) -> bool {
        matches!(
            self,
            Error::NoPolygon { .. }
                | Error::InvalidTaxon { .. }
                | Error::ExistingRecord { .. }
                | Error::EmptyDistribution { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
