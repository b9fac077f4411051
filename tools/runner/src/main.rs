//! `specdis` — run the species-distribution pipeline over a taxa file and a
//! world-grid file, writing one gzipped distribution record per taxon.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use specdis_core::orchestrator::{run, CancellationToken, RunOptions};
use specdis_core::repository::{JsonTaxonRepository, TaxonSelection};
use specdis_core::sink::DistributionDir;
use specdis_core::world::{JsonGridSource, WorldGrid};

#[derive(Parser, Debug)]
#[command(name = "specdis", about = "Compute per-taxon probability-of-occurrence grids")]
struct Args {
    /// Taxa file: JSON array of taxon records with embedded polygon cells.
    #[arg(long, default_value = "data/taxa.json")]
    taxa: PathBuf,

    /// World-grid file: JSON map of field name to 360x720 row-major values.
    #[arg(long, default_value = "data/world.json")]
    world: PathBuf,

    /// Output directory for per-taxon distribution records.
    #[arg(short, long, default_value = "data/distributions")]
    output: PathBuf,

    /// Process only the first N taxa.
    #[arg(short, long)]
    limit: Option<usize>,

    /// Process only these taxon keys (repeatable).
    #[arg(short, long = "taxon")]
    taxon: Vec<u32>,

    /// Overwrite existing output records.
    #[arg(short, long)]
    force: bool,

    /// Worker threads (0 = one per CPU).
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Save debug images of every intermediate matrix.
    #[arg(short, long)]
    debug: bool,

    /// Treat numeric fallbacks as per-taxon failures.
    #[arg(long)]
    strict_numeric: bool,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    info!("starting distribution");

    let repo = JsonTaxonRepository::open(&args.taxa)
        .with_context(|| format!("cannot read taxa file {}", args.taxa.display()))?;
    let source = JsonGridSource::open(&args.world)
        .with_context(|| format!("cannot read world file {}", args.world.display()))?;
    let world = WorldGrid::new(Box::new(source));
    let sink = DistributionDir::open(&args.output, args.debug)
        .with_context(|| format!("cannot open output directory {}", args.output.display()))?;

    let selection = if !args.taxon.is_empty() {
        TaxonSelection::Keys(args.taxon.clone())
    } else if let Some(limit) = args.limit {
        TaxonSelection::Limit(limit)
    } else {
        TaxonSelection::All
    };
    let opts = RunOptions {
        selection,
        force: args.force,
        workers: args.workers,
        debug: args.debug,
        strict_numeric: args.strict_numeric,
    };

    // First interrupt stops dispatching new taxa; a second one gives up on
    // the in-flight work and exits immediately.
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("second interrupt, exiting now");
            process::exit(130);
        }
        eprintln!("interrupt received, finishing in-flight taxa");
        handler_token.cancel();
    })
    .context("cannot install the interrupt handler")?;

    let summary = run(&repo, &world, &sink, &opts, &cancel)?;
    if cancel.is_cancelled() {
        info!("run stopped early by interrupt");
    }
    info!(
        "{} completed, {} skipped, {} failed",
        summary.completed, summary.skipped, summary.failed
    );
    Ok(())
}
