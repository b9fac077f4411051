//! Output sinks: where finished distributions go.
//!
//! The on-disk sink stores one gzipped JSON record per taxon, shaped like
//! the distribution table rows of the backing database: (cell id, relative
//! abundance) pairs for every cell carrying occurrence mass, with
//! `cell id = row * 720 + col + 1`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::grid::{WORLD_COLS, WORLD_ROWS};
use crate::matrix::ProbabilityMatrix;

/// Consumer of finished per-taxon distributions.
pub trait OutputSink: Send + Sync {
    /// Persist a final grid. Without `force`, an already-present record is
    /// an `ExistingRecord` error; with it, the record is overwritten.
    fn save(&self, taxon_key: u32, matrix: &ProbabilityMatrix, force: bool) -> Result<()>;

    /// Idempotency pre-check against prior output.
    fn is_completed(&self, taxon_key: u32) -> bool;

    /// Optional diagnostic image of an intermediate matrix. Never required
    /// for correctness.
    fn save_debug_image(&self, _matrix: &ProbabilityMatrix, _label: &str) {}
}

/// Sparse distribution record, one per taxon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub taxon_key: u32,
    /// (cell id, relative abundance), cell id = row * 720 + col + 1,
    /// ordered by cell id. Cells without positive mass are omitted.
    pub cells: Vec<(u32, f64)>,
}

impl DistributionRecord {
    pub fn from_matrix(taxon_key: u32, matrix: &ProbabilityMatrix) -> Self {
        let cells = matrix
            .iter_defined()
            .filter(|&(_, _, v)| v > 0.0)
            .map(|(row, col, v)| ((row * WORLD_COLS + col + 1) as u32, v))
            .collect();
        Self { taxon_key, cells }
    }

    pub fn to_matrix(&self) -> ProbabilityMatrix {
        let mut matrix = ProbabilityMatrix::world();
        for &(cell_id, value) in &self.cells {
            let idx = (cell_id as usize).saturating_sub(1);
            let (row, col) = (idx / WORLD_COLS, idx % WORLD_COLS);
            if row < WORLD_ROWS {
                matrix.define(row, col, value);
            }
        }
        matrix
    }

    pub fn read_gz(path: &Path) -> Result<Self> {
        let reader = BufReader::new(GzDecoder::new(File::open(path)?));
        Ok(serde_json::from_reader(reader)?)
    }

    fn write_gz(&self, path: &Path) -> Result<()> {
        let mut encoder =
            GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
        serde_json::to_writer(&mut encoder, self)?;
        encoder.finish()?;
        Ok(())
    }
}

/// Directory of per-taxon `<key>.json.gz` records, plus optional debug PNGs
/// under `png/`.
pub struct DistributionDir {
    dir: PathBuf,
    debug: bool,
}

impl DistributionDir {
    pub fn open(dir: &Path, debug: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        if debug {
            fs::create_dir_all(dir.join("png"))?;
        }
        Ok(Self { dir: dir.to_path_buf(), debug })
    }

    pub fn record_path(&self, taxon_key: u32) -> PathBuf {
        self.dir.join(format!("{taxon_key}.json.gz"))
    }
}

impl OutputSink for DistributionDir {
    fn save(&self, taxon_key: u32, matrix: &ProbabilityMatrix, force: bool) -> Result<()> {
        let path = self.record_path(taxon_key);
        if path.exists() && !force {
            return Err(Error::ExistingRecord { taxon_key });
        }

        // Write-then-rename keeps the save atomic per taxon: a crash
        // mid-write leaves a stale temp file, never a torn record.
        let record = DistributionRecord::from_matrix(taxon_key, matrix);
        let tmp = self.dir.join(format!("{taxon_key}.json.gz.tmp"));
        record.write_gz(&tmp)?;
        fs::rename(&tmp, &path)?;
        log::debug!("taxon {taxon_key}: wrote {} cells to {}", record.cells.len(), path.display());
        Ok(())
    }

    fn is_completed(&self, taxon_key: u32) -> bool {
        self.record_path(taxon_key).exists()
    }

    fn save_debug_image(&self, matrix: &ProbabilityMatrix, label: &str) {
        if !self.debug {
            return;
        }
        let path = self.dir.join("png").join(format!("{label}.png"));
        if let Err(e) = write_grayscale_png(matrix, &path) {
            log::warn!("could not write debug image {}: {e}", path.display());
        }
    }
}

/// Grayscale render of a matrix, defined cells scaled against the maximum,
/// masked cells black.
fn write_grayscale_png(matrix: &ProbabilityMatrix, path: &Path) -> Result<()> {
    let max = matrix.max_defined().filter(|&m| m > 0.0).unwrap_or(1.0);
    let mut img = image::GrayImage::new(matrix.cols() as u32, matrix.rows() as u32);
    for (row, col, value) in matrix.iter_defined() {
        let level = ((value / max).clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, image::Luma([level]));
    }
    img.save(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

/// In-memory sink for tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<HashMap<u32, ProbabilityMatrix>>,
    debug_labels: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, taxon_key: u32) -> Option<ProbabilityMatrix> {
        self.saved.lock().unwrap().get(&taxon_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.lock().unwrap().is_empty()
    }

    pub fn debug_labels(&self) -> Vec<String> {
        self.debug_labels.lock().unwrap().clone()
    }
}

impl OutputSink for MemorySink {
    fn save(&self, taxon_key: u32, matrix: &ProbabilityMatrix, force: bool) -> Result<()> {
        let mut saved = self.saved.lock().unwrap();
        if saved.contains_key(&taxon_key) && !force {
            return Err(Error::ExistingRecord { taxon_key });
        }
        saved.insert(taxon_key, matrix.clone());
        Ok(())
    }

    fn is_completed(&self, taxon_key: u32) -> bool {
        self.saved.lock().unwrap().contains_key(&taxon_key)
    }

    fn save_debug_image(&self, _matrix: &ProbabilityMatrix, label: &str) {
        self.debug_labels.lock().unwrap().push(label.to_string());
    }
}
