use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::MailError;

pub const CONFIG_FILE: &str = "config.json";

/// Contents of a job's `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub smtp: SmtpSettings,
    pub auth: AuthSettings,
    /// Pause after every send attempt, in milliseconds.
    #[serde(default)]
    pub mail_pause_msec: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    /// 0 or missing means the submission port, 587.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub use_ssl: bool,
    /// Connection and command timeout. No timeout when unset.
    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// env_logger filter, e.g. `info` or `simple_mail_merge=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Log file, relative to the job directory. Logs go to stderr when unset.
    #[serde(default)]
    pub filename: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
            filename: None,
        }
    }
}

impl JobConfig {
    pub fn load(job_dir: &Path) -> Result<Self, MailError> {
        let fail = |reason: String| MailError::Config {
            path: job_dir.to_path_buf(),
            reason,
        };
        let raw = fs::read_to_string(job_dir.join(CONFIG_FILE)).map_err(|e| fail(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| fail(e.to_string()))
    }
}
