use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;

use env_logger::{Builder, Env, Target};
use serde::Deserialize;

use crate::config::{LoggingConfig, CONFIG_FILE};
use crate::template::load_optional;

#[derive(Deserialize)]
struct LoggingSection {
    #[serde(default)]
    logging: LoggingConfig,
}

/// Reads only the `logging` section of the job's `config.json`.
///
/// Anything unreadable gives the defaults, so the session can still report
/// why the full config failed to load.
pub fn logging_config(job_dir: &Path) -> LoggingConfig {
    load_optional(&job_dir.join(CONFIG_FILE))
        .and_then(|raw| serde_json::from_str::<LoggingSection>(&raw).ok())
        .map(|section| section.logging)
        .unwrap_or_default()
}

/// Logger builder for a job. `RUST_LOG` overrides the configured level and a
/// configured file name is opened for appending inside `job_dir`.
pub fn builder(job_dir: &Path, config: &LoggingConfig) -> std::io::Result<Builder> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(config.level.as_str()));
    builder.format_timestamp_millis();

    if let Some(filename) = &config.filename {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(job_dir.join(filename))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    Ok(builder)
}

pub fn init(job_dir: &Path) -> Result<(), Box<dyn Error>> {
    let config = logging_config(job_dir);
    builder(job_dir, &config)?.try_init()?;
    Ok(())
}
