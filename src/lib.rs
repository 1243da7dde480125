//! Resumable mail-merge over SMTP.
//!
//! A job directory holds shared templates, shared attachments and one
//! subdirectory per recipient. [`job::JobRunner`] renders every recipient's
//! mail, sends it, and records each success in `redo.log` so an interrupted
//! run can be resumed without sending twice.

pub mod attachment;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod recipient;
pub mod redo_log;
pub mod smtp_client;
pub mod template;
pub mod variables;

pub use error::MailError;
pub use job::{JobRunner, JobState, RunReport};
