// src/api/state.rs
use crate::config::AppConfig;
use crate::jobs::JobRegistry;
use crate::relay::WsBroker;
use crate::runner::ProcessRunner;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub broker: WsBroker,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let broker = WsBroker::new();
        let jobs = JobRegistry::new(
            ProcessRunner::new(config.executable.clone()),
            broker.clone(),
            config.max_concurrent_jobs,
            config.job_timeout(),
        );

        Self {
            config: Arc::new(config),
            broker,
            jobs,
        }
    }
}
