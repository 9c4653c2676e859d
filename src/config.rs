// src/config.rs
use crate::errors::{RelayError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "VIDEORELAY_";
const DEFAULT_CONFIG_FILE: &str = "videorelay.toml";

/// High-level application configuration.
///
/// Built from defaults, then an optional TOML file, then `VIDEORELAY_*`
/// environment variables, each layer overriding the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Program run once per job with the uploaded file path as its only argument.
    pub executable: PathBuf,
    pub upload_dir: PathBuf,
    /// Zero disables the timeout.
    pub job_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    pub max_upload_bytes: u64,
    /// How long a finished job stays queryable. Zero keeps jobs forever.
    pub job_retention_secs: u64,
}

/// The on-disk shape of `videorelay.toml`. Every key is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub executable: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub job_timeout_secs: Option<u64>,
    pub max_concurrent_jobs: Option<usize>,
    pub max_upload_bytes: Option<u64>,
    pub job_retention_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            executable: PathBuf::from("build/src/DarkPlate"),
            upload_dir: PathBuf::from("uploads"),
            job_timeout_secs: 3600,
            max_concurrent_jobs: 2,
            max_upload_bytes: 512 * 1024 * 1024,
            job_retention_secs: 3600,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file (if any) and the process environment.
    pub fn from_env() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();

        let mut config = AppConfig::default();
        match lookup("VIDEORELAY_CONFIG") {
            Some(path) => config.merge_file(&Self::read_file(Path::new(&path))?),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                config.merge_file(&Self::read_file(Path::new(DEFAULT_CONFIG_FILE))?)
            }
            None => {}
        }
        config.merge_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse_file(&raw)
    }

    pub fn parse_file(raw: &str) -> Result<FileConfig> {
        Ok(toml::from_str(raw)?)
    }

    pub fn merge_file(&mut self, file: &FileConfig) {
        if let Some(host) = &file.host {
            self.host = host.clone();
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(executable) = &file.executable {
            self.executable = executable.clone();
        }
        if let Some(upload_dir) = &file.upload_dir {
            self.upload_dir = upload_dir.clone();
        }
        if let Some(secs) = file.job_timeout_secs {
            self.job_timeout_secs = secs;
        }
        if let Some(max) = file.max_concurrent_jobs {
            self.max_concurrent_jobs = max;
        }
        if let Some(max) = file.max_upload_bytes {
            self.max_upload_bytes = max;
        }
        if let Some(secs) = file.job_retention_secs {
            self.job_retention_secs = secs;
        }
    }

    /// Apply `VIDEORELAY_*` overrides read through `lookup`.
    pub fn merge_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = parse_number("PORT", &port)?;
        }
        if let Some(executable) = var("EXECUTABLE") {
            self.executable = PathBuf::from(executable);
        }
        if let Some(upload_dir) = var("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(upload_dir);
        }
        if let Some(secs) = var("JOB_TIMEOUT_SECS") {
            self.job_timeout_secs = parse_number("JOB_TIMEOUT_SECS", &secs)?;
        }
        if let Some(max) = var("MAX_JOBS") {
            self.max_concurrent_jobs = parse_number("MAX_JOBS", &max)?;
        }
        if let Some(max) = var("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_number("MAX_UPLOAD_BYTES", &max)?;
        }
        if let Some(secs) = var("JOB_RETENTION_SECS") {
            self.job_retention_secs = parse_number("JOB_RETENTION_SECS", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(RelayError::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(RelayError::Config(
                "max_upload_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn job_retention(&self) -> Option<Duration> {
        (self.job_retention_secs > 0).then(|| Duration::from_secs(self.job_retention_secs))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RelayError::Config(format!(
            "{}{} must be a number, got '{}'",
            ENV_PREFIX, name, value
        ))
    })
}
