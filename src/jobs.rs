// src/jobs.rs
use crate::errors::{RelayError, Result};
use crate::models::{JobEvent, JobSnapshot, JobStatus};
use crate::relay::WsBroker;
use crate::runner::{OutputLines, ProcessRunner};
use crate::storage::UploadedFile;
use actix::Recipient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Job {
    input: UploadedFile,
    status: JobStatus,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    /// Incremented for every run; a run only records its outcome while it is current.
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Job {
    /// A queued or running job whose run has not been cancelled.
    fn is_live(&self) -> bool {
        self.status.is_active() && !self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn snapshot(&self, id: &str) -> JobSnapshot {
        JobSnapshot {
            id: id.to_string(),
            file_name: self.input.file_name.clone(),
            original_name: self.input.original_name.clone(),
            status: self.status,
            runs: self.generation,
            exit_code: self.exit_code,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

/// How a single run ended.
#[derive(Debug, Clone, PartialEq)]
enum RunOutcome {
    Completed(Option<i32>),
    Failed(Option<i32>, String),
    Cancelled,
}

enum Step {
    Line(Result<Option<String>>),
    Cancelled,
    TimedOut,
}

/// Every job known to the server, keyed by a generated id.
///
/// A job is created per upload and run each time a client opens its push
/// channel while no run is in progress.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    runner: Arc<ProcessRunner>,
    broker: WsBroker,
    /// Serializes listener changes with the start/cancel decision they trigger.
    membership: Arc<Mutex<()>>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl JobRegistry {
    pub fn new(
        runner: ProcessRunner,
        broker: WsBroker,
        max_concurrent: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            runner: Arc::new(runner),
            broker,
            membership: Arc::new(Mutex::new(())),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            timeout,
        }
    }

    pub async fn create(&self, input: UploadedFile) -> String {
        let id = Uuid::new_v4().to_string();
        log::info!("Created job {} for {}", id, input.path.display());

        let job = Job {
            input,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            generation: 0,
            cancel: None,
        };
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    pub async fn get(&self, id: &str) -> Option<JobSnapshot> {
        let jobs = self.jobs.read().await;
        jobs.get(id).map(|job| job.snapshot(id))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    /// Add `client` as a listener of `id` and start a run unless one is live.
    ///
    /// Returns `true` when a new run was started.
    pub async fn attach(&self, id: &str, client: Recipient<JobEvent>) -> Result<bool> {
        let _membership = self.membership.lock().await;
        if !self.contains(id).await {
            return Err(RelayError::JobNotFound(id.to_string()));
        }
        self.broker.register(id, client).await;
        self.start(id).await
    }

    /// Remove `client` from `id`, cancelling the run when it was the last listener.
    ///
    /// Returns `true` when the run was cancelled.
    pub async fn detach(&self, id: &str, client: &Recipient<JobEvent>) -> bool {
        let _membership = self.membership.lock().await;
        if self.broker.unregister(id, client).await > 0 {
            return false;
        }
        self.cancel(id).await
    }

    /// Start a run of `id` unless one is already in progress.
    ///
    /// Returns `true` when a new run was started.
    pub async fn start(&self, id: &str) -> Result<bool> {
        let (input, generation, cancel) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| RelayError::JobNotFound(id.to_string()))?;
            if job.is_live() {
                return Ok(false);
            }

            let cancel = CancellationToken::new();
            job.generation += 1;
            job.status = JobStatus::Queued;
            job.finished_at = None;
            job.exit_code = None;
            job.cancel = Some(cancel.clone());
            (job.input.clone(), job.generation, cancel)
        };

        let registry = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let outcome = registry.run(&id, &input, generation, cancel).await;
            registry.finish(&id, generation, outcome).await;
        });
        Ok(true)
    }

    /// Cancel the in-progress run of `id`, if any.
    pub async fn cancel(&self, id: &str) -> bool {
        let jobs = self.jobs.read().await;
        let token = jobs
            .get(id)
            .and_then(|job| job.cancel.as_ref())
            .filter(|token| !token.is_cancelled());
        match token {
            Some(token) => {
                log::info!("Cancelling job {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn set_status(&self, id: &str, generation: u64, status: JobStatus) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id).filter(|job| job.generation == generation) {
            job.status = status;
        }
    }

    async fn run(
        &self,
        id: &str,
        input: &UploadedFile,
        generation: u64,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                log::info!("Job {} queued, waiting for a free slot", id);
                self.broker
                    .broadcast(id, JobEvent::Queued { job_id: id.to_string() })
                    .await;
                tokio::select! {
                    _ = cancel.cancelled() => return RunOutcome::Cancelled,
                    permit = self.permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return RunOutcome::Failed(None, "job limiter closed".to_string()),
                    },
                }
            }
        };

        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let lines = match self.runner.spawn(&input.path) {
            Ok(lines) => lines,
            Err(e) => {
                log::error!("Job {} could not start: {}", id, e);
                return RunOutcome::Failed(None, e.to_string());
            }
        };

        self.set_status(id, generation, JobStatus::Running).await;
        self.broker
            .broadcast(
                id,
                JobEvent::Started {
                    job_id: id.to_string(),
                    file_name: input.file_name.clone(),
                },
            )
            .await;

        let outcome = self.drain(id, lines, cancel).await;
        drop(permit);
        outcome
    }

    /// Relay every line to the job's listeners until the child exits, the
    /// run is cancelled or the timeout elapses.
    async fn drain(&self, id: &str, mut lines: OutputLines, cancel: CancellationToken) -> RunOutcome {
        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = &mut deadline => Step::TimedOut,
                line = lines.next_line() => Step::Line(line),
            };

            match step {
                Step::Line(Ok(Some(line))) => {
                    log::debug!("[{}] {}", id, line);
                    self.broker
                        .broadcast(id, JobEvent::Output {
                            job_id: id.to_string(),
                            data: line.trim().to_string(),
                        })
                        .await;
                }
                Step::Line(Ok(None)) => break,
                Step::Line(Err(e)) => {
                    let _ = lines.kill().await;
                    return RunOutcome::Failed(None, format!("failed reading output: {}", e));
                }
                Step::Cancelled => {
                    if let Err(e) = lines.kill().await {
                        log::warn!("Failed to kill cancelled job {}: {}", id, e);
                    }
                    return RunOutcome::Cancelled;
                }
                Step::TimedOut => {
                    if let Err(e) = lines.kill().await {
                        log::warn!("Failed to kill timed out job {}: {}", id, e);
                    }
                    let secs = self.timeout.map_or(0, |t| t.as_secs_f64().ceil() as u64);
                    return RunOutcome::Failed(None, format!("timed out after {}s", secs));
                }
            }
        }

        match lines.wait().await {
            Ok(status) if status.success() => RunOutcome::Completed(status.code()),
            Ok(status) => RunOutcome::Failed(status.code(), format!("process exited with {}", status)),
            Err(e) => RunOutcome::Failed(None, e.to_string()),
        }
    }

    async fn finish(&self, id: &str, generation: u64, outcome: RunOutcome) {
        let current = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(id).filter(|job| job.generation == generation) {
                Some(job) => {
                    let (status, code) = match &outcome {
                        RunOutcome::Completed(code) => (JobStatus::Completed, *code),
                        RunOutcome::Failed(code, _) => (JobStatus::Failed, *code),
                        RunOutcome::Cancelled => (JobStatus::Cancelled, None),
                    };
                    job.status = status;
                    job.exit_code = code;
                    job.finished_at = Some(Utc::now());
                    job.cancel = None;
                    true
                }
                None => false,
            }
        };

        // A superseded run's outcome belongs to nobody still listening.
        if !current {
            log::debug!("Job {} run {} superseded", id, generation);
            return;
        }

        let event = match outcome {
            RunOutcome::Completed(exit_code) => {
                log::info!("Job {} completed", id);
                JobEvent::Completed {
                    job_id: id.to_string(),
                    exit_code,
                }
            }
            RunOutcome::Failed(_, reason) => {
                log::warn!("Job {} failed: {}", id, reason);
                JobEvent::Failed {
                    job_id: id.to_string(),
                    reason,
                }
            }
            RunOutcome::Cancelled => {
                log::info!("Job {} cancelled", id);
                if self.broker.listeners(id).await == 0 {
                    return;
                }
                JobEvent::Failed {
                    job_id: id.to_string(),
                    reason: "cancelled".to_string(),
                }
            }
        };
        self.broker.broadcast(id, event).await;
    }

    /// Drop jobs that finished (or were never run) more than `retention` ago.
    ///
    /// Queued and running jobs are always kept. Returns how many were removed.
    pub async fn evict_finished(&self, retention: Duration) -> usize {
        let Some(cutoff) = chrono::TimeDelta::from_std(retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.status.is_active() || job.finished_at.unwrap_or(job.created_at) > cutoff);
        before - jobs.len()
    }

    /// Periodically evict jobs older than `retention`.
    pub fn spawn_sweeper(&self, retention: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL.min(retention.max(Duration::from_secs(1))));
            loop {
                ticker.tick().await;
                let evicted = registry.evict_finished(retention).await;
                if evicted > 0 {
                    log::info!("Evicted {} finished jobs", evicted);
                }
            }
        })
    }
}
