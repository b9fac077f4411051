//! Species-distribution engine: reconstructs per-taxon probability-of-
//! occurrence maps on a half-degree world grid by combining independent
//! spatial filters into one normalized distribution.

pub mod distribution;
pub mod errors;
pub mod filters;
pub mod grid;
pub mod matrix;
pub mod orchestrator;
pub mod repository;
pub mod sink;
pub mod sphere;
pub mod taxon;
pub mod world;

#[cfg(test)]
pub mod testutil;

pub use errors::{Error, Result};
pub use matrix::ProbabilityMatrix;
pub use taxon::Taxon;
pub use world::WorldGrid;
