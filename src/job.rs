use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::JobConfig;
use crate::error::MailError;
use crate::recipient::{JobContext, Recipient, ATTACHMENTS_DIR};
use crate::redo_log::RedoLog;
use crate::smtp_client::{MailTransport, OutgoingMail, SmtpClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Ready,
    Sending,
    Done,
}

/// Outcome of one [`JobRunner::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sent: usize,
    /// Already listed in `redo.log` when the run started.
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sent {} emails ({} skipped)", self.sent, self.skipped)
    }
}

/// Sends one job: every recipient directory not yet in `redo.log`, in name order.
///
/// A runner only exists once the whole job has loaded; any config, redo log
/// or recipient error aborts [`JobRunner::load`] before a single send. During
/// [`JobRunner::run`] a failed send is logged and skipped, never committed.
pub struct JobRunner<T: MailTransport> {
    config: JobConfig,
    redo_log: RedoLog,
    recipients: Vec<Recipient>,
    transport: Option<T>,
    state: JobState,
}

impl JobRunner<SmtpClient> {
    pub fn load(path: &Path, restart: bool) -> Result<Self, MailError> {
        JobRunner::load_with(path, restart, SmtpClient::from_config)
    }
}

impl<T: MailTransport> JobRunner<T> {
    /// Loads the job and builds its transport with `make_transport`.
    pub fn load_with<F>(path: &Path, restart: bool, make_transport: F) -> Result<Self, MailError>
    where
        F: FnOnce(&JobConfig) -> Result<T, MailError>,
    {
        let config = JobConfig::load(path)?;
        let redo_log = RedoLog::open(path, restart)?;
        let context = JobContext::load(path)?;
        let recipients = load_recipients(path, &context)?;
        let transport = make_transport(&config)?;

        Ok(JobRunner {
            config,
            redo_log,
            recipients,
            transport: Some(transport),
            state: JobState::Ready,
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Connects, sends to every pending recipient, and disconnects.
    pub async fn run(&mut self) -> Result<RunReport, MailError> {
        if self.state != JobState::Ready {
            return Err(MailError::AlreadyRun);
        }
        let transport = self.transport.as_mut().ok_or(MailError::NotConnected)?;

        transport.connect().await?;
        info!("Connected to {}", transport.host());
        self.state = JobState::Sending;

        let pause = Duration::from_millis(self.config.mail_pause_msec);
        let mut report = RunReport::default();

        for recipient in &self.recipients {
            if self.redo_log.contains(recipient.key()) {
                report.skipped += 1;
                continue;
            }

            match send_one(transport, recipient).await {
                Ok(()) => {
                    info!("Sent email for {} recipient", recipient.name());
                    self.redo_log.commit(recipient.key())?;
                    report.sent += 1;
                }
                Err(e) => {
                    error!("Failure for {} recipient: {}", recipient.name(), e);
                    report.failed += 1;
                }
            }

            // TODO: let a negative pause select parallel sending.
            tokio::time::sleep(pause).await;
        }

        info!("{}", report);
        if report.failed > 0 {
            warn!("{} emails failed and will be retried on the next resumed run", report.failed);
        }

        transport.disconnect().await?;
        info!("disconnected {}", transport.host());
        self.state = JobState::Done;

        Ok(report)
    }

    /// Closes `redo.log` and drops the transport. Also runs on drop.
    pub fn dispose(&mut self) {
        self.transport = None;
        self.redo_log.dispose();
    }
}

impl<T: MailTransport> Drop for JobRunner<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn send_one<T: MailTransport>(transport: &mut T, recipient: &Recipient) -> Result<(), MailError> {
    let attachments = recipient
        .attachments()
        .items()
        .collect::<std::io::Result<Vec<_>>>()?;
    let to = [recipient.email().to_string()];

    transport
        .send(OutgoingMail {
            to: &to,
            subject: recipient.subject(),
            text: recipient.body_text(),
            html: recipient.body_html(),
            attachments,
        })
        .await
}

/// Every subdirectory of the job except `attachments`, sorted by name.
fn load_recipients(path: &Path, context: &JobContext) -> Result<Vec<Recipient>, MailError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let dir = entry.path();
        if dir.is_dir() && entry.file_name() != ATTACHMENTS_DIR {
            dirs.push(dir);
        }
    }
    dirs.sort();

    dirs.iter()
        .map(|dir| {
            info!(
                "Loading info about recipient {} ...",
                dir.file_name().unwrap_or_default().to_string_lossy()
            );
            Recipient::load(dir, context)
        })
        .collect()
}
