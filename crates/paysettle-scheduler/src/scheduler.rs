//! Periodic job runner.
//!
//! Each registered [`Job`] gets its own ticker task. A run executes on a
//! separate spawned task, so an error or a panic ends that run only; the
//! ticker keeps going. A job never overlaps itself: a tick that arrives
//! while the previous run is still executing is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use paysettle_settlement::BatchReport;
use paysettle_types::{PaysettleError, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A unit of scheduled work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Time between runs.
    fn period(&self) -> Duration;

    async fn run(&self) -> Result<BatchReport>;
}

/// How one run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(BatchReport),
    Failed(PaysettleError),
    Panicked,
    /// The previous run was still executing.
    Overlapped,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A job plus its in-flight flag.
pub struct JobRunner {
    job: Arc<dyn Job>,
    running: AtomicBool,
}

impl JobRunner {
    #[must_use]
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            job,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute the job once unless it is already running.
    pub async fn run_once(&self) -> RunOutcome {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!(job = self.name(), "previous run still in progress, skipping");
            return RunOutcome::Overlapped;
        }
        let _guard = RunningGuard(&self.running);

        let started = Instant::now();
        let job = Arc::clone(&self.job);
        let joined = tokio::spawn(async move { job.run().await }).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match joined {
            Ok(Ok(report)) => {
                tracing::info!(
                    job = self.name(),
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    elapsed_ms,
                    "job finished"
                );
                RunOutcome::Completed(report)
            }
            Ok(Err(err)) => {
                tracing::error!(job = self.name(), error = %err, elapsed_ms, "job failed");
                RunOutcome::Failed(err)
            }
            Err(join_err) => {
                tracing::error!(job = self.name(), error = %join_err, "job panicked");
                RunOutcome::Panicked
            }
        }
    }
}

/// Collects jobs, then starts one ticker per job.
#[derive(Default)]
pub struct Scheduler {
    runners: Vec<Arc<JobRunner>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.runners.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `Configuration` when the job's period is zero.
    pub fn register(&mut self, job: Arc<dyn Job>) -> Result<()> {
        if job.period().is_zero() {
            return Err(PaysettleError::Configuration(format!(
                "job {} has a zero period",
                job.name()
            )));
        }
        self.runners.push(Arc::new(JobRunner::new(job)));
        Ok(())
    }

    #[must_use]
    pub fn job_names(&self) -> Vec<&'static str> {
        self.runners.iter().map(|r| r.name()).collect()
    }

    /// Start every ticker. The first run of each job happens one period
    /// after start.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);
        let tasks = self
            .runners
            .into_iter()
            .map(|runner| tokio::spawn(tick_loop(runner, shutdown.subscribe())))
            .collect();
        tracing::info!("scheduler started");
        SchedulerHandle { shutdown, tasks }
    }
}

async fn tick_loop(runner: Arc<JobRunner>, mut shutdown: watch::Receiver<bool>) {
    let period = runner.job.period();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    tracing::debug!(job = runner.name(), period = ?period, "ticker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                runner.run_once().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(job = runner.name(), "ticker stopped");
}

/// Running scheduler. Dropping it without [`SchedulerHandle::shutdown`]
/// leaves the tickers running.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every ticker, letting in-flight runs finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "ticker task ended abnormally");
            }
        }
        tracing::info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct Counting {
        runs: AtomicUsize,
        period: Duration,
    }

    #[async_trait]
    impl Job for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn period(&self) -> Duration {
            self.period
        }

        async fn run(&self) -> Result<BatchReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(BatchReport {
                processed: 1,
                ..BatchReport::default()
            })
        }
    }

    struct Blocking {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Job for Blocking {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn period(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn run(&self) -> Result<BatchReport> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(BatchReport::default())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Job for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn period(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn run(&self) -> Result<BatchReport> {
            panic!("boom");
        }
    }

    struct Failing;

    #[async_trait]
    impl Job for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn period(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn run(&self) -> Result<BatchReport> {
            Err(PaysettleError::Internal("store offline".into()))
        }
    }

    #[tokio::test]
    async fn run_once_reports() {
        let runner = JobRunner::new(Arc::new(Counting {
            runs: AtomicUsize::new(0),
            period: Duration::from_secs(1),
        }));
        assert!(matches!(runner.run_once().await, RunOutcome::Completed(r) if r.processed == 1));
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let job = Arc::new(Blocking {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let runner = Arc::new(JobRunner::new(job.clone()));

        let first = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run_once().await })
        };
        job.entered.notified().await;
        assert!(runner.is_running());
        assert!(matches!(runner.run_once().await, RunOutcome::Overlapped));

        job.release.notify_one();
        assert!(matches!(first.await.unwrap(), RunOutcome::Completed(_)));
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn failures_and_panics_stay_inside_the_run() {
        let failing = JobRunner::new(Arc::new(Failing));
        assert!(matches!(failing.run_once().await, RunOutcome::Failed(_)));

        let panicking = JobRunner::new(Arc::new(Panicking));
        assert!(matches!(panicking.run_once().await, RunOutcome::Panicked));
        assert!(!panicking.is_running());
        assert!(matches!(panicking.run_once().await, RunOutcome::Panicked));
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut scheduler = Scheduler::new();
        let err = scheduler
            .register(Arc::new(Counting {
                runs: AtomicUsize::new(0),
                period: Duration::ZERO,
            }))
            .unwrap_err();
        assert!(matches!(err, PaysettleError::Configuration(_)));
        assert!(scheduler.job_names().is_empty());
    }

    #[tokio::test]
    async fn tickers_run_until_shutdown() {
        let job = Arc::new(Counting {
            runs: AtomicUsize::new(0),
            period: Duration::from_millis(10),
        });
        let mut scheduler = Scheduler::new();
        scheduler.register(job.clone()).unwrap();
        assert_eq!(scheduler.job_names(), vec!["counting"]);

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        let runs = job.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected several runs, got {runs}");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }
}
