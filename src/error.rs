use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Job '{path}' configuration file 'config.json' error: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("Job '{path}' redo.log load error: {source}")]
    RedoLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A recipient directory could not be turned into a sendable mail.
    #[error("Mail load error in '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Invalid sender email address: '{0}', expected '@' somewhere in it")]
    InvalidSender(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Invalid SMTP configuration required for SMTP server connection: missing {0}")]
    MissingSettings(&'static str),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMTP session is not connected")]
    NotConnected,

    #[error("job has already been run")]
    AlreadyRun,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MailError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MailError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
