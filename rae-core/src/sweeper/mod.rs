//! Long-lived background tasks.
//!
//! Four sweepers share the engine's storage ports: importance scoring and
//! decay, cache expiry, the reflection pipeline, and archived-memory
//! purging. Each runs on a fixed interval, skips ticks that land while a
//! run is still active, and stops within a bounded drain period on
//! shutdown.
//!
//! Single-writer contracts: the decay sweeper is the only writer of
//! recomputed/decayed importance values, and the reflection sweeper is the
//! only writer of `consolidated` status for the batches it processes.

use crate::cache::ContextCache;
use crate::error::Result;
use crate::graph::GraphTraversalService;
use crate::reflection::ReflectionPipeline;
use crate::repository::MemoryRepository;
use crate::scoring::{DecayAction, ImportanceScorer, ScoringContext, decay};
use crate::search::SearchResponse;
use crate::telemetry::Telemetry;
use crate::types::{ConsolidationStatus, Memory, Scope, ScoringConfig, SweeperConfig};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Page size for decay scans.
const DECAY_SCAN_PAGE: usize = 500;

/// Importance changes smaller than this are not written back.
const RESCORE_EPSILON: f64 = 0.01;

/// Shared dependencies for the sweeper set.
#[derive(Clone)]
pub struct SweeperDeps {
    /// Memory repository
    pub memories: Arc<dyn MemoryRepository>,
    /// Graph traversal, for PageRank refresh and centrality lookups
    pub traversal: Arc<GraphTraversalService>,
    /// Context cache to expire
    pub cache: Arc<ContextCache<SearchResponse>>,
    /// Reflection pipeline to run periodically
    pub reflection: Arc<ReflectionPipeline>,
    /// Decay/archival tuning
    pub scoring: ScoringConfig,
    /// Metric registry
    pub telemetry: Telemetry,
}

/// Handle over the running sweeper tasks.
pub struct BackgroundSweepers {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    drain_timeout: std::time::Duration,
}

impl BackgroundSweepers {
    /// Spawn all four sweepers.
    #[must_use]
    pub fn start(deps: SweeperDeps, config: &SweeperConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let decay_days = config.decay_interval.as_secs_f64() / 86_400.0;
        let handles = vec![
            spawn_loop(
                "decay",
                config.decay_interval,
                shutdown.subscribe(),
                {
                    let deps = deps.clone();
                    move || {
                        let deps = deps.clone();
                        async move { decay_sweep(&deps, decay_days).await }
                    }
                },
            ),
            spawn_loop(
                "cache",
                config.cache_interval,
                shutdown.subscribe(),
                {
                    let deps = deps.clone();
                    move || {
                        let deps = deps.clone();
                        async move {
                            let removed = deps.cache.sweep_expired();
                            deps.telemetry
                                .counter("cache_sweeper_evictions")
                                .increment_by(removed as u64);
                            Ok(())
                        }
                    }
                },
            ),
            spawn_loop(
                "reflection",
                config.reflection_interval,
                shutdown.subscribe(),
                {
                    let deps = deps.clone();
                    move || {
                        let deps = deps.clone();
                        async move {
                            let outcome = deps.reflection.run().await?;
                            deps.telemetry
                                .counter("reflections_created")
                                .increment_by(outcome.reflections_created as u64);
                            Ok(())
                        }
                    }
                },
            ),
            spawn_loop(
                "archive",
                config.archive_interval,
                shutdown.subscribe(),
                {
                    let deps = deps.clone();
                    move || {
                        let deps = deps.clone();
                        async move { archive_sweep(&deps).await }
                    }
                },
            ),
        ];
        info!(sweepers = handles.len(), "background sweepers started");
        Self {
            handles,
            shutdown,
            drain_timeout: config.drain_timeout,
        }
    }

    /// Signal shutdown and wait for every sweeper, bounded by the drain
    /// timeout. Tasks still running after the deadline are aborted.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        for mut handle in self.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("sweeper did not drain before the deadline, aborting");
                handle.abort();
            }
        }
        info!("background sweepers stopped");
    }
}

/// Spawn one interval loop. Ticks that fire while a run is in progress are
/// skipped rather than queued.
fn spawn_loop<F, Fut>(
    name: &'static str,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
    mut run: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays cheap.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = run().await {
                        warn!(sweeper = name, error = %err, "sweep failed");
                    } else {
                        debug!(sweeper = name, "sweep complete");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// One scoring-and-decay pass over every scope. `days_elapsed` is the
/// sweep interval expressed in days, so the per-day decay factors compound
/// at the right rate.
async fn decay_sweep(deps: &SweeperDeps, days_elapsed: f64) -> Result<()> {
    let now = Utc::now();
    let scorer = ImportanceScorer::new(deps.scoring.clone());
    let scopes = deps.memories.list_scopes().await?;
    for scope in scopes {
        // Refresh centrality first so rescoring reads current PageRank.
        deps.traversal.recompute_pagerank(&scope).await?;
        decay_scope(deps, &scorer, &scope, now, days_elapsed).await?;
    }
    Ok(())
}

async fn decay_scope(
    deps: &SweeperDeps,
    scorer: &ImportanceScorer,
    scope: &Scope,
    now: DateTime<Utc>,
    days_elapsed: f64,
) -> Result<()> {
    let mut offset = 0;
    loop {
        let page = deps.memories.scan(scope, DECAY_SCAN_PAGE, offset).await?;
        if page.is_empty() {
            return Ok(());
        }
        for memory in &page {
            match decay::evaluate(memory, now, days_elapsed, &deps.scoring) {
                DecayAction::None => {
                    rescore(deps, scorer, scope, memory, now).await?;
                }
                DecayAction::Decay(importance) => {
                    deps.memories
                        .update_importance(memory.id, scope, importance)
                        .await?;
                    deps.telemetry.counter("decay_updates").increment();
                }
                DecayAction::Archive => {
                    deps.memories
                        .set_consolidation_status(
                            &[memory.id],
                            scope,
                            ConsolidationStatus::Archived,
                        )
                        .await?;
                    deps.telemetry.counter("memories_archived").increment();
                }
            }
        }
        offset += page.len();
    }
}

/// Recompute the factor-model importance for a memory the decay schedule
/// left alone. The user override opts out entirely.
async fn rescore(
    deps: &SweeperDeps,
    scorer: &ImportanceScorer,
    scope: &Scope,
    memory: &Memory,
    now: DateTime<Utc>,
) -> Result<()> {
    if memory.user_importance_override.is_some() {
        return Ok(());
    }
    let centrality = deps
        .traversal
        .max_centrality_for_memory(scope, memory.id)
        .await?;
    let ctx = ScoringContext {
        centrality,
        query_relevance: None,
    };
    let importance = scorer.compute(memory, &ctx, now);
    if (importance - memory.importance).abs() >= RESCORE_EPSILON {
        deps.memories
            .update_importance(memory.id, scope, importance)
            .await?;
        deps.telemetry.counter("importance_rescored").increment();
    }
    Ok(())
}

/// Delete archived memories past the audit retention window.
async fn archive_sweep(deps: &SweeperDeps) -> Result<()> {
    let cutoff = Utc::now()
        - ChronoDuration::seconds((deps.scoring.archive_retention_days * 86_400.0) as i64);
    let scopes = deps.memories.list_scopes().await?;
    for scope in scopes {
        let purged = deps.memories.purge_archived(&scope, cutoff).await?;
        if purged > 0 {
            deps.telemetry
                .counter("archived_memories_purged")
                .increment_by(purged);
            debug!(scope = %scope, purged, "archived memories purged");
        }
    }
    Ok(())
}
