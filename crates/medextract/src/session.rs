//! One extraction run, end to end
//!
//! [`ExtractionSession`] owns everything a run needs: the resolved config,
//! the codec, the strategy registry and the output layout. Nothing here is
//! process-global; two sessions over different output directories do not
//! interact.
//!
//! A run goes: snapshot or discovery → prune → strategy-set filter →
//! pooled extraction feeding the batch writer → merge.

use crate::address::AddressResolver;
use crate::batch::{remove_partial_batches, BatchSummary, BatchWriter};
use crate::category::Category;
use crate::codec::{DicomCodec, ImageCodec};
use crate::config::ExtractConfig;
use crate::discovery::Discovery;
use crate::error::{ErrorCode, ExtractError, ItemError, Result};
use crate::executor::Executor;
use crate::layout::OutputLayout;
use crate::merge::{merge_batches, MergeSummary};
use crate::progress::{create_progress_bar, ProgressTracker};
use crate::prune::ResumeState;
use crate::registry::{Dispatcher, StrategyRegistry};
use crate::row::MetadataRow;
use crate::strategies::{Outcome, RunContext};
use crate::work::{WorkItem, WorkList};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct ExtractionSession {
    run_id: Uuid,
    config: Arc<ExtractConfig>,
    codec: Arc<dyn ImageCodec>,
    registry: StrategyRegistry,
    layout: OutputLayout,
    show_progress: bool,
}

/// What a completed run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Items in the work list before filtering
    pub discovered: usize,
    /// Items outside the strategy set
    pub dropped: usize,
    /// Items already committed by earlier runs
    pub pruned: usize,
    /// Rows with a non-zero error code written this run
    pub failed: u64,
    /// Items a strategy declined
    pub skipped: u64,
    pub batches: BatchSummary,
    pub catalog: MergeSummary,
}

impl ExtractionSession {
    /// Session using the built-in DICOM codec
    pub fn new(config: ExtractConfig) -> Result<Self> {
        Self::with_codec(config, Arc::new(DicomCodec::new()))
    }

    /// Session with a specific codec
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate.
    pub fn with_codec(config: ExtractConfig, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            layout: OutputLayout::new(&config.output_dir),
            config: Arc::new(config),
            codec,
            registry: StrategyRegistry::builtin(),
            show_progress: false,
        })
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Draw progress bars on the terminal
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Full run, stopped early by Ctrl-C
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C; the run can only be stopped by killing it");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Full run, stopped early when `shutdown` completes
    ///
    /// # Errors
    ///
    /// `Interrupted` when stopped; batches committed before the stop stay
    /// valid and the next run resumes after them.
    pub async fn run_with_shutdown<F>(&self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        info!(run_id = %self.run_id, "Starting extraction run");
        self.config.log_summary();
        self.layout.ensure()?;

        let set = self.config.strategy_set;
        let dispatcher = self.registry.dispatcher(set.categories(), set)?;

        let mut work = self.load_or_discover().await?;
        let discovered = work.len();

        // Batches may come from runs with other strategy sets, so prune the
        // whole list before narrowing it
        let meta_dir = self.layout.meta_dir();
        remove_partial_batches(&meta_dir)?;
        let resume = ResumeState::load(&meta_dir)?;
        let pruned = resume.prune(&mut work)?;

        let dropped = work.retain_categories(set.categories());
        if dropped > 0 {
            info!(dropped, strategy_set = %set, "Dropped items outside the strategy set");
        }

        let (batches, tracker) = self
            .extract(work, dispatcher, resume.next_batch_id(), shutdown)
            .await?;
        let catalog = merge_batches(&meta_dir, &self.layout.catalog_path())?;

        let summary = RunSummary {
            run_id: self.run_id,
            discovered,
            dropped,
            pruned,
            failed: tracker.failed(),
            skipped: tracker.skipped(),
            batches,
            catalog,
        };
        info!(
            run_id = %self.run_id,
            rows = summary.batches.rows,
            batches = summary.batches.batch_ids.len(),
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Extraction run complete"
        );
        Ok(summary)
    }

    /// Walk the input tree and overwrite the snapshot
    pub async fn discover(&self) -> Result<WorkList> {
        self.layout.ensure()?;
        let list = Discovery::new(
            Arc::clone(&self.codec),
            self.config.workers,
            self.config.file_extension.clone(),
        )
        .with_parent_filter(self.config.apply_parent_filter)
        .with_progress(self.show_progress)
        .discover(&self.config.input_dir)
        .await?;
        list.save(&self.layout.snapshot_path(), &self.config.input_dir)?;
        Ok(list)
    }

    /// Rebuild the catalog from committed batches
    pub fn merge(&self) -> Result<MergeSummary> {
        merge_batches(&self.layout.meta_dir(), &self.layout.catalog_path())
    }

    async fn load_or_discover(&self) -> Result<WorkList> {
        let snapshot = self.layout.snapshot_path();
        if snapshot.exists() {
            let list = WorkList::load_for_input(&snapshot, &self.config.input_dir)?;
            info!(
                path = %snapshot.display(),
                items = list.len(),
                "Loaded work list snapshot, skipping discovery"
            );
            return Ok(list);
        }
        self.discover().await
    }

    async fn extract<F>(
        &self,
        work: WorkList,
        dispatcher: Dispatcher,
        first_batch_id: u64,
        shutdown: F,
    ) -> Result<(BatchSummary, ProgressTracker)>
    where
        F: Future<Output = ()>,
    {
        let total = work.len();
        info!(items = total, workers = self.config.workers, first_batch_id, "Extracting");

        let tracker = if self.show_progress {
            ProgressTracker::new(create_progress_bar(total as u64, "Extracting"))
        } else {
            ProgressTracker::hidden(total as u64)
        };
        let ctx = RunContext {
            config: Arc::clone(&self.config),
            codec: Arc::clone(&self.codec),
            resolver: AddressResolver::new(self.layout.images_dir()),
        };
        let task_tracker = tracker.clone();
        let executor = Executor::new(self.config.workers);
        let mut results = Box::pin(executor.run(work.into_items(), move |item: WorkItem| {
            let outcome = dispatcher.process(&item, &ctx);
            match &outcome {
                Outcome::Row(row) if row.error_code() != Some(ErrorCode::Success) => {
                    task_tracker.record_failure()
                }
                Outcome::Row(_) => task_tracker.record_success(),
                Outcome::Skipped => task_tracker.record_skip(),
            }
            outcome
        }));
        tokio::pin!(shutdown);

        let mut writer = BatchWriter::new(
            self.layout.meta_dir(),
            self.config.save_batch_size,
            first_batch_id,
        );
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    let discarded_rows = writer.discard();
                    let committed_batches = writer.written().len();
                    tracker.abandon("Interrupted");
                    warn!(
                        committed_batches,
                        discarded_rows,
                        next_batch_id = writer.next_id(),
                        "Run interrupted; rerun to resume"
                    );
                    return Err(ExtractError::Interrupted { committed_batches, discarded_rows });
                }
                next = results.next() => match next {
                    Some((_, Ok(Outcome::Row(row)))) => {
                        writer.accumulate(row)?;
                    }
                    Some((_, Ok(Outcome::Skipped))) => {}
                    Some((item, Err(e))) => {
                        let key = item.key();
                        error!(file = %key, error_code = ErrorCode::Unclassified.as_i64(), error = %e, "Worker failed");
                        tracker.record_failure();
                        let failure = ItemError::unclassified(format!("worker failed: {}", e));
                        writer.accumulate(MetadataRow::failed(key, item.category, &failure))?;
                    }
                    None => break,
                }
            }
        }

        let summary = writer.finish()?;
        tracker.finish("Extraction complete");
        Ok((summary, tracker))
    }
}

/// Snapshot of an output directory's progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Per-category counts from the snapshot, if one exists
    pub snapshot: Option<Vec<(Category, usize)>>,
    pub batches: usize,
    pub rows: usize,
    pub next_batch_id: u64,
    pub catalog_present: bool,
}

impl StatusReport {
    pub fn collect(layout: &OutputLayout) -> Result<Self> {
        let snapshot_path = layout.snapshot_path();
        let snapshot = if snapshot_path.exists() {
            Some(WorkList::load(&snapshot_path)?.counts())
        } else {
            None
        };
        let meta_dir = layout.meta_dir();
        let resume = ResumeState::load(&meta_dir)?;
        Ok(Self {
            snapshot,
            batches: resume.batch_count(),
            rows: resume.rows(),
            next_batch_id: resume.next_batch_id(),
            catalog_present: layout.catalog_path().exists(),
        })
    }

    /// Items in the snapshot not yet covered by a batch row
    pub fn remaining(&self) -> Option<usize> {
        let total: usize = self.snapshot.as_ref()?.iter().map(|(_, n)| n).sum();
        Some(total.saturating_sub(self.rows))
    }
}
