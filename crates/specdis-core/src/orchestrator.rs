//! Run orchestration: shared-nothing parallelism across taxa.
//!
//! Each taxon's pipeline is independent; taxa are distributed across a
//! fixed-size rayon pool and results are persisted in whatever order they
//! finish. A failure inside one taxon never poisons its siblings — it is
//! logged, counted, and the run moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::distribution::{create_taxon_distribution, PipelineOptions};
use crate::errors::Result;
use crate::repository::{TaxonRepository, TaxonSelection};
use crate::sink::OutputSink;
use crate::world::WorldGrid;

/// Cooperative stop signal checked between taxa. In-flight taxa finish;
/// nothing new starts once cancelled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub selection: TaxonSelection,
    /// Overwrite existing output instead of skipping completed taxa.
    pub force: bool,
    /// Worker threads; 0 uses the rayon default.
    pub workers: usize,
    pub debug: bool,
    pub strict_numeric: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            selection: TaxonSelection::All,
            force: false,
            workers: 0,
            debug: false,
            strict_numeric: false,
        }
    }
}

/// Per-run outcome counts, logged at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Completed,
    Skipped,
    Failed,
}

/// Process every selected taxon and persist its distribution.
///
/// Only orchestration-level problems (an unreachable repository, a broken
/// worker pool) are errors here; per-taxon conditions land in the summary.
pub fn run(
    repo: &dyn TaxonRepository,
    world: &WorldGrid,
    sink: &dyn OutputSink,
    opts: &RunOptions,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let keys = repo.taxon_keys(&opts.selection)?;
    log::info!("found {} taxa", keys.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers)
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let outcomes: Vec<Outcome> = pool.install(|| {
        keys.par_iter()
            .map(|&key| {
                if cancel.is_cancelled() {
                    log::debug!("taxon {key}: not dispatched, run cancelled");
                    return Outcome::Skipped;
                }
                process_taxon(key, repo, world, sink, opts)
            })
            .collect()
    });

    let mut summary = RunSummary::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Completed => summary.completed += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }
    log::info!(
        "distribution complete: {} taxa done, {} skipped, {} failed",
        summary.completed,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

fn process_taxon(
    key: u32,
    repo: &dyn TaxonRepository,
    world: &WorldGrid,
    sink: &dyn OutputSink,
    opts: &RunOptions,
) -> Outcome {
    if !opts.force && sink.is_completed(key) {
        log::info!("taxon {key} exists in output, skipping it (use force to overwrite)");
        return Outcome::Skipped;
    }

    let pipeline_opts = PipelineOptions { debug: opts.debug, strict_numeric: opts.strict_numeric };
    let result = repo.taxon(key).and_then(|taxon| {
        let cells = repo.polygon_cells(key)?;
        let distribution = create_taxon_distribution(&taxon, &cells, world, &pipeline_opts, sink)?;
        sink.save(key, &distribution, opts.force)
    });

    match result {
        Ok(()) => {
            log::info!("taxon {key} complete");
            Outcome::Completed
        }
        Err(e) if e.is_per_taxon_skip() => {
            log::warn!("taxon {key} skipped: {e}");
            Outcome::Skipped
        }
        Err(e) => {
            log::error!("taxon {key} failed: {e}");
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{JsonTaxonRepository, TaxonRecord};
    use crate::sink::MemorySink;
    use crate::testutil::{taxon_for_tests, world_for_tests, WorldSpec};

    fn record(key: u32, cells: Vec<(usize, usize)>) -> TaxonRecord {
        let mut taxon = taxon_for_tests();
        taxon.taxon_key = key;
        TaxonRecord { taxon, polygon_cells: cells }
    }

    fn single_worker(selection: TaxonSelection) -> RunOptions {
        RunOptions { selection, workers: 1, ..RunOptions::default() }
    }

    #[test]
    fn run_processes_all_taxa_and_counts_outcomes() {
        let repo = JsonTaxonRepository::from_records(vec![
            record(1, vec![(100, 100)]),
            record(2, vec![(200, 200), (200, 201)]),
        ]);
        let world = world_for_tests(&WorldSpec::default());
        let sink = MemorySink::new();

        let summary = run(
            &repo,
            &world,
            &sink,
            &single_worker(TaxonSelection::All),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(summary, RunSummary { completed: 2, skipped: 0, failed: 0 });
        assert!(sink.get(1).is_some());
        assert!(sink.get(2).is_some());
    }

    #[test]
    fn per_taxon_failure_does_not_stop_the_run() {
        // Taxon 1 has no polygon; taxon 2 is fine.
        let repo = JsonTaxonRepository::from_records(vec![
            record(1, vec![]),
            record(2, vec![(100, 100)]),
        ]);
        let world = world_for_tests(&WorldSpec::default());
        let sink = MemorySink::new();

        let summary = run(
            &repo,
            &world,
            &sink,
            &single_worker(TaxonSelection::All),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(summary, RunSummary { completed: 1, skipped: 1, failed: 0 });
        assert!(sink.get(1).is_none());
        assert!(sink.get(2).is_some());
    }

    #[test]
    fn completed_taxa_are_skipped_unless_forced() {
        let repo = JsonTaxonRepository::from_records(vec![record(1, vec![(100, 100)])]);
        let world = world_for_tests(&WorldSpec::default());
        let sink = MemorySink::new();
        let cancel = CancellationToken::new();

        let first = run(&repo, &world, &sink, &single_worker(TaxonSelection::All), &cancel).unwrap();
        assert_eq!(first.completed, 1);

        let second = run(&repo, &world, &sink, &single_worker(TaxonSelection::All), &cancel).unwrap();
        assert_eq!(second, RunSummary { completed: 0, skipped: 1, failed: 0 });

        let forced = RunOptions { force: true, ..single_worker(TaxonSelection::All) };
        let third = run(&repo, &world, &sink, &forced, &cancel).unwrap();
        assert_eq!(third.completed, 1);
    }

    #[test]
    fn cancelled_token_stops_dispatch() {
        let repo = JsonTaxonRepository::from_records(vec![
            record(1, vec![(100, 100)]),
            record(2, vec![(100, 100)]),
        ]);
        let world = world_for_tests(&WorldSpec::default());
        let sink = MemorySink::new();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary =
            run(&repo, &world, &sink, &single_worker(TaxonSelection::All), &cancel).unwrap();

        assert_eq!(summary, RunSummary { completed: 0, skipped: 2, failed: 0 });
        assert!(sink.is_empty());
    }

    #[test]
    fn selection_limits_the_run() {
        let repo = JsonTaxonRepository::from_records(vec![
            record(1, vec![(100, 100)]),
            record(2, vec![(100, 100)]),
            record(3, vec![(100, 100)]),
        ]);
        let world = world_for_tests(&WorldSpec::default());
        let sink = MemorySink::new();

        let summary = run(
            &repo,
            &world,
            &sink,
            &single_worker(TaxonSelection::Keys(vec![2])),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(sink.len(), 1);
        assert!(sink.get(2).is_some());
    }
}
