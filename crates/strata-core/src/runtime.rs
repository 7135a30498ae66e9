//! Background runtime for maintenance jobs.
//!
//! Decay sweeps, fresh-buffer flushes, weight learning and prediction expiry
//! run as independent periodic jobs, never inline with a request. Each job is
//! a [`MaintenanceJob`] whose `run_once` can be driven directly in tests with
//! a manual clock; the [`BackgroundRuntime`] schedules them with
//! tokio-cron-scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::engine::TieringEngine;
use crate::error::{StrataError, StrataResult};
use crate::types::Tier;

/// Summary of one job run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    /// Items, samples or predictions handled.
    pub processed: usize,
    pub cancelled: bool,
}

/// A periodic, idempotent maintenance task.
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    /// Stable name, used for health flags and logs.
    fn name(&self) -> &str;

    /// Time between scheduled runs.
    fn interval(&self) -> Duration;

    /// Run once. Cancellation truncates the run between items.
    async fn run_once(&self, cancel: &CancellationToken) -> StrataResult<JobReport>;
}

/// Decay sweep over one persisted tier.
pub struct DecayJob {
    engine: Arc<TieringEngine>,
    tier: Tier,
    name: String,
    interval: Duration,
}

impl DecayJob {
    pub fn new(engine: Arc<TieringEngine>, tier: Tier, interval: Duration) -> Self {
        Self {
            engine,
            tier,
            name: format!("decay.{}", tier),
            interval,
        }
    }
}

#[async_trait]
impl MaintenanceJob for DecayJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, cancel: &CancellationToken) -> StrataResult<JobReport> {
        let report = self.engine.decay_sweep(self.tier, cancel).await?;
        Ok(JobReport {
            job: self.name.clone(),
            processed: report.scanned,
            cancelled: report.cancelled,
        })
    }
}

/// Re-routes fresh items whose window elapsed.
pub struct FreshFlushJob {
    engine: Arc<TieringEngine>,
    interval: Duration,
}

impl FreshFlushJob {
    pub fn new(engine: Arc<TieringEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl MaintenanceJob for FreshFlushJob {
    fn name(&self) -> &str {
        "fresh.flush"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, _cancel: &CancellationToken) -> StrataResult<JobReport> {
        let report = self.engine.flush_fresh().await?;
        Ok(JobReport {
            job: self.name().to_string(),
            processed: report.expired,
            cancelled: false,
        })
    }
}

/// Applies accumulated router feedback.
pub struct LearningJob {
    engine: Arc<TieringEngine>,
    interval: Duration,
}

impl LearningJob {
    pub fn new(engine: Arc<TieringEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl MaintenanceJob for LearningJob {
    fn name(&self) -> &str {
        "router.learning"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, _cancel: &CancellationToken) -> StrataResult<JobReport> {
        let report = self.engine.run_learning_cycle().await?;
        Ok(JobReport {
            job: self.name().to_string(),
            processed: report.samples,
            cancelled: false,
        })
    }
}

/// Expires predictions whose window has passed.
pub struct PredictionExpiryJob {
    engine: Arc<TieringEngine>,
    interval: Duration,
}

impl PredictionExpiryJob {
    pub fn new(engine: Arc<TieringEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl MaintenanceJob for PredictionExpiryJob {
    fn name(&self) -> &str {
        "prediction.expiry"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, cancel: &CancellationToken) -> StrataResult<JobReport> {
        let expired = self.engine.expire_predictions(cancel).await?;
        Ok(JobReport {
            job: self.name().to_string(),
            processed: expired.len(),
            cancelled: cancel.is_cancelled(),
        })
    }
}

/// Run `job` once and record the outcome in the engine's health flags.
pub async fn execute(
    job: &dyn MaintenanceJob,
    engine: &TieringEngine,
    cancel: &CancellationToken,
) -> StrataResult<JobReport> {
    debug!(job = job.name(), "Running maintenance job");
    match job.run_once(cancel).await {
        Ok(report) => {
            engine.health().record_success(job.name(), engine.now());
            debug!(job = job.name(), processed = report.processed, "Maintenance job complete");
            Ok(report)
        }
        Err(e) => {
            error!(job = job.name(), error = %e, "Maintenance job failed");
            engine.health().record_failure(job.name(), &e, engine.now());
            Err(e)
        }
    }
}

/// The default job set for `engine`, honouring the runtime enable flags.
pub fn default_jobs(engine: &Arc<TieringEngine>, config: &RuntimeConfig) -> Vec<Arc<dyn MaintenanceJob>> {
    let secs = |s: u64| Duration::from_secs(s.max(1));
    let mut jobs: Vec<Arc<dyn MaintenanceJob>> = vec![Arc::new(FreshFlushJob::new(
        engine.clone(),
        secs(config.fresh_flush_interval_secs),
    ))];

    if config.enable_decay {
        jobs.push(Arc::new(DecayJob::new(
            engine.clone(),
            Tier::LongTerm,
            secs(config.long_term_decay_interval_secs),
        )));
        jobs.push(Arc::new(DecayJob::new(
            engine.clone(),
            Tier::Archival,
            secs(config.archival_decay_interval_secs),
        )));
    }
    if config.enable_learning {
        jobs.push(Arc::new(LearningJob::new(engine.clone(), secs(config.learning_interval_secs))));
    }
    if config.enable_prediction_expiry {
        jobs.push(Arc::new(PredictionExpiryJob::new(
            engine.clone(),
            secs(config.prediction_expiry_interval_secs),
        )));
    }
    jobs
}

/// Background runtime managing the maintenance schedule.
///
/// # Example
///
/// ```ignore
/// use strata_core::{BackgroundRuntime, EngineConfig, TieringEngine};
///
/// let engine = TieringEngine::builder(EngineConfig::default()).build()?;
/// let mut runtime = BackgroundRuntime::new(engine.clone()).await?;
/// runtime.start().await?;
///
/// // ... application runs ...
///
/// runtime.shutdown().await?;
/// engine.shutdown().await;
/// ```
pub struct BackgroundRuntime {
    scheduler: JobScheduler,
    engine: Arc<TieringEngine>,
    jobs: Vec<Arc<dyn MaintenanceJob>>,
    cancel: CancellationToken,
    started: bool,
}

impl BackgroundRuntime {
    /// Create a runtime with the default job set from the engine's
    /// runtime configuration. Call `start()` to begin scheduling.
    pub async fn new(engine: Arc<TieringEngine>) -> StrataResult<Self> {
        let jobs = default_jobs(&engine, &engine.config().runtime);
        Self::with_jobs(engine, jobs).await
    }

    /// Create a runtime for an explicit job set.
    pub async fn with_jobs(engine: Arc<TieringEngine>, jobs: Vec<Arc<dyn MaintenanceJob>>) -> StrataResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| StrataError::Internal(format!("Failed to create job scheduler: {}", e)))?;
        debug!(jobs = jobs.len(), "Creating BackgroundRuntime");

        Ok(Self {
            scheduler,
            cancel: engine.shutdown_token().child_token(),
            engine,
            jobs,
            started: false,
        })
    }

    pub fn jobs(&self) -> &[Arc<dyn MaintenanceJob>] {
        &self.jobs
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Schedule every job and start the scheduler.
    pub async fn start(&mut self) -> StrataResult<()> {
        if self.started {
            return Ok(());
        }

        for job in &self.jobs {
            let scheduled = self.schedule(job.clone())?;
            self.scheduler
                .add(scheduled)
                .await
                .map_err(|e| StrataError::Internal(format!("Failed to schedule {}: {}", job.name(), e)))?;
            info!(job = job.name(), interval_secs = job.interval().as_secs(), "Maintenance job scheduled");
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| StrataError::Internal(format!("Failed to start job scheduler: {}", e)))?;
        self.started = true;
        info!(jobs = self.jobs.len(), "Background runtime started");
        Ok(())
    }

    fn schedule(&self, job: Arc<dyn MaintenanceJob>) -> StrataResult<Job> {
        let engine = self.engine.clone();
        let cancel = self.cancel.clone();
        let running = Arc::new(AtomicBool::new(false));
        let interval = job.interval();

        Job::new_repeated_async(interval, move |_uuid, _lock| {
            let job = job.clone();
            let engine = engine.clone();
            let cancel = cancel.clone();
            let running = running.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return;
                }
                if running.swap(true, Ordering::AcqRel) {
                    debug!(job = job.name(), "Previous run still active, skipping tick");
                    return;
                }
                let _ = execute(job.as_ref(), &engine, &cancel).await;
                running.store(false, Ordering::Release);
            })
        })
        .map_err(|e| StrataError::Internal(format!("Failed to create job: {}", e)))
    }

    /// Run every job once, in order, outside the schedule.
    pub async fn run_all_once(&self) -> Vec<StrataResult<JobReport>> {
        let mut results = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            results.push(execute(job.as_ref(), &self.engine, &self.cancel).await);
        }
        results
    }

    /// Cancel in-flight runs and stop the scheduler.
    pub async fn shutdown(&mut self) -> StrataResult<()> {
        debug!("Shutting down background runtime");
        self.cancel.cancel();
        if self.started {
            self.scheduler
                .shutdown()
                .await
                .map_err(|e| StrataError::Internal(format!("Failed to shut down job scheduler: {}", e)))?;
            self.started = false;
        }
        info!("Background runtime stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::EngineConfig;
    use crate::store::InMemoryStore;
    use crate::types::{ItemDraft, SignalHints};

    fn engine(config: EngineConfig) -> (Arc<TieringEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = TieringEngine::builder(config)
            .store(Arc::new(InMemoryStore::new()))
            .clock(clock.clone())
            .build()
            .unwrap();
        (engine, clock)
    }

    struct FailingJob;

    #[async_trait]
    impl MaintenanceJob for FailingJob {
        fn name(&self) -> &str {
            "always.fails"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn run_once(&self, _cancel: &CancellationToken) -> StrataResult<JobReport> {
            Err(StrataError::database("disk full"))
        }
    }

    #[tokio::test]
    async fn test_default_jobs_follow_flags() {
        let (engine, _) = engine(EngineConfig::default());
        let all = default_jobs(&engine, &RuntimeConfig::default());
        let names: Vec<&str> = all.iter().map(|j| j.name()).collect();
        assert_eq!(
            names,
            vec!["fresh.flush", "decay.long_term", "decay.archival", "router.learning", "prediction.expiry"]
        );
        assert_eq!(all[1].interval(), Duration::from_secs(3600));
        assert_eq!(all[2].interval(), Duration::from_secs(86_400));

        let config = RuntimeConfig {
            enable_decay: false,
            enable_learning: false,
            enable_prediction_expiry: false,
            ..Default::default()
        };
        let only_flush = default_jobs(&engine, &config);
        assert_eq!(only_flush.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_job_with_manual_clock() {
        let (engine, clock) = engine(EngineConfig::default());
        let hints = SignalHints {
            intensity: Some(0.4),
            ..Default::default()
        };
        let draft = ItemDraft::new("picked up dry cleaning", clock.now(), "agent-a").with_hints(hints);
        let routed = engine.ingest_and_wait(draft).await.unwrap();
        assert_eq!(routed.tier, Some(Tier::Fresh));

        let job = FreshFlushJob::new(engine.clone(), Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let report = execute(&job, &engine, &cancel).await.unwrap();
        assert_eq!(report.processed, 0);

        clock.advance(chrono::Duration::minutes(10));
        let report = execute(&job, &engine, &cancel).await.unwrap();
        assert_eq!(report.processed, 1);
        let item = engine.get_item(&routed.item_id).await.unwrap().unwrap();
        assert_eq!(item.tier, Tier::LongTerm);
    }

    #[tokio::test]
    async fn test_failed_job_marks_engine_degraded() {
        let (engine, _) = engine(EngineConfig::default());
        let cancel = CancellationToken::new();

        assert!(execute(&FailingJob, &engine, &cancel).await.is_err());
        let stats = engine.get_stats().await;
        assert!(stats.health.degraded);
        assert!(stats.health.jobs.iter().any(|j| j.job == "always.fails"));
    }

    #[tokio::test]
    async fn test_run_all_once_reports_each_job() {
        let (engine, _) = engine(EngineConfig::default());
        let runtime = BackgroundRuntime::new(engine.clone()).await.unwrap();
        let results = runtime.run_all_once().await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_runtime_start_and_shutdown() {
        let (engine, _) = engine(EngineConfig::default());
        let mut runtime = BackgroundRuntime::new(engine.clone()).await.unwrap();

        runtime.start().await.unwrap();
        assert!(runtime.is_started());

        runtime.shutdown().await.unwrap();
        assert!(!runtime.is_started());
        engine.shutdown().await;
    }
}
