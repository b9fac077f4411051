//! Diagnostic visualizer — renders a persisted distribution record to a
//! colormapped PNG. Masked cells are black; defined cells run through a
//! jet-style blue-to-red ramp scaled against the record's maximum.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use specdis_core::matrix::ProbabilityMatrix;
use specdis_core::sink::DistributionRecord;

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render a distribution record to PNG")]
struct Args {
    /// Distribution record (<taxon_key>.json.gz) written by specdis.
    #[arg(short, long)]
    input: PathBuf,

    /// Output PNG path; defaults to the input path with a .png extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Integer upscale factor for the output image.
    #[arg(long, default_value = "1")]
    width_scale: u32,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

/// Relative abundance [0, 1] → jet-style ramp: blue → cyan → yellow → red.
fn jet(t: f64) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let r = (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0);
    let g = (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0);
    let b = (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

fn render(matrix: &ProbabilityMatrix, scale: u32) -> image::RgbImage {
    let max = matrix.max_defined().filter(|&m| m > 0.0).unwrap_or(1.0);
    let mut img = image::RgbImage::new(matrix.cols() as u32 * scale, matrix.rows() as u32 * scale);
    for (row, col, value) in matrix.iter_defined() {
        let [r, g, b] = jet(value / max);
        for dy in 0..scale {
            for dx in 0..scale {
                img.put_pixel(
                    col as u32 * scale + dx,
                    row as u32 * scale + dy,
                    image::Rgb([r, g, b]),
                );
            }
        }
    }
    img
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.width_scale == 0 {
        bail!("width-scale must be at least 1");
    }

    let record = DistributionRecord::read_gz(&args.input)
        .with_context(|| format!("cannot read record {}", args.input.display()))?;
    let matrix = record.to_matrix();

    let output = args.output.unwrap_or_else(|| {
        let mut path = args.input.clone();
        path.set_extension("");
        path.set_extension("png");
        path
    });

    let img = render(&matrix, args.width_scale);
    img.save(&output)
        .with_context(|| format!("cannot write image {}", output.display()))?;
    println!(
        "taxon {}: {} cells -> {}",
        record.taxon_key,
        record.cells.len(),
        output.display()
    );
    Ok(())
}
