use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::app::ports::{FetchPort, SecondaryFeedPort};
use crate::common::error::{ConsolidateError, Result};
use crate::domain::{MergeOutcome, Series};
use crate::pipeline::monotonic::MonotonicityEnforcer;
use crate::pipeline::reconcile::reconcile;
use crate::pipeline::stage::StageContext;
use crate::sources::{SourceAdapter, SourceKind};
use crate::store::SeriesStore;

/// What one per-location run did, for reporting and audit.
#[derive(Debug, Clone)]
pub struct LocationSummary {
    pub run_id: Uuid,
    pub source_id: String,
    pub location: String,
    pub kind: SourceKind,
    pub observed: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Points rejected at merge time, with the reason; these do not abort
    /// the rest of the run.
    pub rejected: Vec<(NaiveDate, String)>,
    pub flagged: usize,
    pub stale_runs: usize,
    pub dropped_by_reconcile: usize,
}

/// Drives the per-location flow: read → stage pipeline → monotonicity →
/// timeline → reconcile → merge → commit. Nothing is persisted until the
/// final commit, so an abort anywhere leaves the store untouched.
#[derive(Clone)]
pub struct ConsolidateUseCase {
    store: Arc<dyn SeriesStore>,
    fetch: Arc<dyn FetchPort>,
    secondary: Arc<dyn SecondaryFeedPort>,
    stale_after_days: i64,
}

impl ConsolidateUseCase {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        fetch: Arc<dyn FetchPort>,
        secondary: Arc<dyn SecondaryFeedPort>,
        stale_after_days: i64,
    ) -> Self {
        Self {
            store,
            fetch,
            secondary,
            stale_after_days,
        }
    }

    pub async fn run_source(&self, adapter: &dyn SourceAdapter) -> Result<LocationSummary> {
        let run_id = Uuid::new_v4();
        let location = adapter.location().to_string();
        let span = info_span!("consolidate", source = adapter.source_id(), %location, %run_id);
        let _enter = span.enter();

        let table = adapter.read(self.fetch.as_ref()).await?;
        info!(rows = table.len(), "extracted raw table");

        let mut ctx = StageContext::for_location(&location);
        ctx.timeline = adapter.vaccine_timeline()?;
        let table = adapter.pipeline().run(table, &mut ctx)?;

        let observations = adapter.observations(table)?;
        let observed = observations.len();
        let mut candidate = Series::from_observations(&location, observations)?;

        let enforcer = MonotonicityEnforcer::new(adapter.monotonic_policy())
            .with_stale_threshold(self.stale_after_days);
        let report = enforcer.enforce_all(&mut candidate)?;

        if let Some(timeline) = &ctx.timeline {
            timeline.apply(&mut candidate);
        }

        let mut dropped_by_reconcile = 0;
        let anchor = adapter.reconcile_metric();
        let trusted_point = match anchor {
            Some(_) => self.secondary.latest_for(&location).await?,
            None => None,
        };
        if let Some(anchor) = anchor {
            let reconciled = reconcile(&mut candidate, trusted_point.as_ref(), anchor);
            dropped_by_reconcile += reconciled.dropped.len();
        }

        let mut working = self
            .store
            .load(&location)
            .await?
            .unwrap_or_else(|| Series::new(&location));
        let mut inserted = 0;
        let mut updated = 0;
        let mut rejected = Vec::new();
        for obs in candidate.observations().iter().cloned() {
            let date = obs.date;
            match working.merge(obs) {
                Ok(MergeOutcome::Inserted) => inserted += 1,
                Ok(MergeOutcome::Updated) => updated += 1,
                Err(err @ ConsolidateError::Regression { .. }) => {
                    warn!(%date, %err, "merge rejected point");
                    rejected.push((date, err.to_string()));
                }
                Err(other) => return Err(other),
            }
        }

        // Merge only inserts or overwrites, so undercounts committed before
        // the trusted point arrived survive in the working series; the
        // reconciler has to run on it too before anything is persisted.
        if let Some(anchor) = anchor {
            let reconciled = reconcile(&mut working, trusted_point.as_ref(), anchor);
            dropped_by_reconcile += reconciled.dropped.len();
        }

        self.store.commit(&working).await?;
        info!(
            inserted,
            updated,
            rejected = rejected.len(),
            flagged = report.flagged.len(),
            "committed canonical series"
        );

        Ok(LocationSummary {
            run_id,
            source_id: adapter.source_id().to_string(),
            location,
            kind: adapter.kind(),
            observed,
            inserted,
            updated,
            rejected,
            flagged: report.flagged.len(),
            stale_runs: report.stale.len(),
            dropped_by_reconcile,
        })
    }

    /// Runs each adapter as its own worker over a bounded pool. Locations
    /// are independent; a failed location is reported individually and never
    /// blocks the others.
    pub async fn run_all(
        &self,
        adapters: Vec<Box<dyn SourceAdapter>>,
        max_concurrent: usize,
    ) -> Vec<(String, Result<LocationSummary>)> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut tasks: JoinSet<(String, Result<LocationSummary>)> = JoinSet::new();

        for adapter in adapters {
            let use_case = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let source_id = adapter.source_id().to_string();
                let result = use_case.run_source(adapter.as_ref()).await;
                if let Err(err) = &result {
                    error!(source = %source_id, %err, "source run failed");
                }
                (source_id, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(%err, "source worker panicked"),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }
}
