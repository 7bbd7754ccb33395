//! Sync Engine - sequences fetch, filter, map and reconcile for each item kind
//!
//! Items are reconciled one at a time in the order the API returned them. A
//! failing item never stops the pass; only configuration problems and
//! failures to list the remote items are returned as errors.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SyncContext;
use crate::error::{SyncError, SyncOutcome};
use crate::git::CommandRunner;
use crate::github::RemoteSource;
use crate::item::{filter_by_owner, ItemKind, RemoteItem, SyncTarget};
use crate::reconcile::{Reconciler, SyncResult};

/// Results from one kind's sync pass
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub kind: ItemKind,
    pub total_items: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub skipped_operations: usize,
    pub duration: Duration,
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    fn compile(kind: ItemKind, results: Vec<SyncResult>, duration: Duration) -> Self {
        let mut successful_operations = 0;
        let mut failed_operations = 0;
        let mut skipped_operations = 0;

        for result in &results {
            match result {
                SyncResult::Skipped { .. } => skipped_operations += 1,
                SyncResult::Failed { .. } => failed_operations += 1,
                _ => successful_operations += 1,
            }
        }

        Self {
            kind,
            total_items: results.len(),
            successful_operations,
            failed_operations,
            skipped_operations,
            duration,
            results,
        }
    }
}

/// One owned item after mapping
#[derive(Debug)]
pub enum Discovery {
    Target(SyncTarget),
    /// Could not be decoded or mapped; never reconciled
    Skipped(SyncResult),
}

/// Owned items of one kind, in the order the API returned them
#[derive(Debug, Default)]
pub struct Discovered {
    pub entries: Vec<Discovery>,
}

impl Discovered {
    pub fn targets(&self) -> impl Iterator<Item = &SyncTarget> {
        self.entries.iter().filter_map(|entry| match entry {
            Discovery::Target(target) => Some(target),
            Discovery::Skipped(_) => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Discovery::Skipped(_)))
            .count()
    }
}

/// The main sync engine that orchestrates mirroring
#[derive(Clone)]
pub struct SyncEngine {
    ctx: SyncContext,
    source: Arc<dyn RemoteSource>,
    runner: Arc<dyn CommandRunner>,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext, source: Arc<dyn RemoteSource>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { ctx, source, runner }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Run a complete pass for one item kind given by name
    pub async fn run_sync(&self, kind: &str) -> SyncOutcome<SyncSummary> {
        let kind: ItemKind = kind.parse()?;
        self.sync_kind(kind).await
    }

    /// Run several kinds in order.
    ///
    /// Every kind name is validated before anything is fetched. After that, a
    /// failed pass is reported in its slot and the next kind still runs.
    pub async fn run_all(&self, kinds: &[String]) -> SyncOutcome<Vec<(ItemKind, SyncOutcome<SyncSummary>)>> {
        let kinds = kinds
            .iter()
            .map(|k| k.parse::<ItemKind>())
            .collect::<SyncOutcome<Vec<_>>>()?;

        let mut reports = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let outcome = self.sync_kind(kind).await;
            if let Err(e) = &outcome {
                self.ctx.logger().error(&e.to_string());
            }
            reports.push((kind, outcome));
        }

        Ok(reports)
    }

    /// Fetch, filter and map every item of `kind` without touching disk
    pub async fn discover(&self, kind: ItemKind) -> SyncOutcome<Discovered> {
        self.ctx.logger().info(&format!("Fetching {} info...", kind.label()));

        let values = self
            .source
            .fetch_all(kind.endpoint(), self.ctx.user(), self.ctx.auth_token())
            .await?;
        let fetched = values.len();

        let mut discovered = Discovered::default();
        for value in filter_by_owner(values, self.ctx.user()) {
            let entry = RemoteItem::decode(kind, value)
                .and_then(SyncTarget::try_from)
                .map_or_else(|e| Discovery::Skipped(self.skip(kind, e)), Discovery::Target);
            discovered.entries.push(entry);
        }

        debug!(
            "{} {} fetched, {} owned by {}",
            fetched,
            kind.label(),
            discovered.entries.len(),
            self.ctx.user()
        );

        Ok(discovered)
    }

    async fn sync_kind(&self, kind: ItemKind) -> SyncOutcome<SyncSummary> {
        let start_time = Instant::now();

        let discovered = self.discover(kind).await?;

        let reconciler = Reconciler::new(&self.ctx, self.runner.as_ref(), self.source.as_ref());
        let total = discovered.targets().count();
        let mut results = Vec::with_capacity(discovered.entries.len());
        let mut index = 0;

        for entry in discovered.entries {
            match entry {
                Discovery::Target(target) => {
                    index += 1;
                    self.ctx
                        .logger()
                        .info(&format!("[{}/{}] {} {}", index, total, kind, target.name()));
                    results.push(reconciler.reconcile(&target).await);
                }
                Discovery::Skipped(result) => results.push(result),
            }
        }

        let summary = SyncSummary::compile(kind, results, start_time.elapsed());

        info!(
            "Sync of {} completed in {:.2}s: {} successful, {} failed, {} skipped",
            kind.label(),
            summary.duration.as_secs_f64(),
            summary.successful_operations,
            summary.failed_operations,
            summary.skipped_operations
        );

        Ok(summary)
    }

    fn skip(&self, kind: ItemKind, error: SyncError) -> SyncResult {
        self.ctx.logger().error(&format!("Skipping item: {}", error));
        SyncResult::Skipped {
            name: format!("<unreadable {}>", kind),
            reason: error.to_string(),
        }
    }
}
