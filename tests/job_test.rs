use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use simple_mail_merge::config::JobConfig;
use simple_mail_merge::smtp_client::{MailTransport, OutgoingMail};
use simple_mail_merge::{JobRunner, JobState, MailError, RunReport};
use tempfile::{tempdir, TempDir};

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    to: Vec<String>,
    subject: String,
    text: Option<String>,
    attachments: Vec<(String, Vec<u8>)>,
}

/// Records every message instead of talking to a server.
#[derive(Default)]
struct RecordingTransport {
    connected: bool,
    connects: usize,
    disconnects: usize,
    refuse_connect: bool,
    fail_for: Option<String>,
    sent: Vec<Sent>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn connect(&mut self) -> Result<(), MailError> {
        if self.refuse_connect {
            return Err(MailError::Smtp("535 authentication failed".into()));
        }
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    async fn send(&mut self, mail: OutgoingMail<'_>) -> Result<(), MailError> {
        if !self.connected {
            return Err(MailError::NotConnected);
        }
        if self.fail_for.as_deref() == mail.to.first().map(String::as_str) {
            return Err(MailError::Smtp("550 mailbox unavailable".into()));
        }
        self.sent.push(Sent {
            to: mail.to.to_vec(),
            subject: mail.subject.to_string(),
            text: mail.text.map(str::to_string),
            attachments: mail.attachments,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MailError> {
        if !self.connected {
            return Err(MailError::NotConnected);
        }
        self.connected = false;
        self.disconnects += 1;
        Ok(())
    }

    fn host(&self) -> &str {
        "smtp.test"
    }
}

struct Job {
    dir: TempDir,
}

impl Job {
    fn new(pause_msec: u64) -> Self {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            format!(
                r#"{{
                    "smtp": {{"host": "smtp.test", "port": 587, "use_ssl": false}},
                    "auth": {{"user": "sender@test", "password": "pw"}},
                    "mail_pause_msec": {}
                }}"#,
                pause_msec
            ),
        )
        .unwrap();
        fs::write(dir.path().join("subject.txt"), "Hi {{recipient_dir}}").unwrap();
        fs::write(dir.path().join("body.txt"), "Hello {{name}}").unwrap();
        Job { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn add(&self, name: &str) -> &Self {
        let dir = self.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("email.txt"), format!("{}@example.com\n", name)).unwrap();
        self
    }

    fn key(&self, name: &str) -> String {
        self.path().join(name).to_string_lossy().into_owned()
    }

    fn redo_log(&self) -> String {
        fs::read_to_string(self.path().join("redo.log")).unwrap_or_default()
    }

    fn pre_log(&self, names: &[&str]) {
        let content: String = names.iter().map(|n| format!("{}\n", self.key(n))).collect();
        fs::write(self.path().join("redo.log"), content).unwrap();
    }

    fn runner(&self, restart: bool, transport: RecordingTransport) -> Result<JobRunner<RecordingTransport>, MailError> {
        JobRunner::load_with(self.path(), restart, move |_: &JobConfig| Ok(transport))
    }
}

fn recorded(runner: &JobRunner<RecordingTransport>) -> &RecordingTransport {
    runner.transport().unwrap()
}

fn sent_to(runner: &JobRunner<RecordingTransport>) -> Vec<String> {
    recorded(runner).sent.iter().flat_map(|s| s.to.clone()).collect()
}

#[tokio::test]
async fn logged_recipients_are_skipped() {
    let job = Job::new(0);
    job.add("a").add("b");
    job.pre_log(&["b"]);

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report, RunReport { sent: 1, skipped: 1, failed: 0 });
    assert_eq!(report.to_string(), "Sent 1 emails (1 skipped)");
    assert_eq!(sent_to(&runner), vec!["a@example.com"]);
    assert_eq!(job.redo_log(), format!("{}\n{}\n", job.key("b"), job.key("a")));
    assert_eq!(runner.state(), JobState::Done);
    assert_eq!(recorded(&runner).connects, 1);
    assert_eq!(recorded(&runner).disconnects, 1);
}

#[tokio::test]
async fn failed_send_does_not_stop_the_run() {
    let job = Job::new(0);
    job.add("a").add("c").add("d");

    let transport = RecordingTransport {
        fail_for: Some("c@example.com".into()),
        ..RecordingTransport::default()
    };
    let mut runner = job.runner(false, transport).unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report, RunReport { sent: 2, skipped: 0, failed: 1 });
    assert_eq!(sent_to(&runner), vec!["a@example.com", "d@example.com"]);
    assert!(!job.redo_log().contains(&job.key("c")));
}

#[tokio::test]
async fn resumed_run_retries_only_the_failed_recipient() {
    let job = Job::new(0);
    job.add("a").add("c");

    let transport = RecordingTransport {
        fail_for: Some("c@example.com".into()),
        ..RecordingTransport::default()
    };
    let mut first = job.runner(false, transport).unwrap();
    first.run().await.unwrap();
    drop(first);

    let mut second = job.runner(false, RecordingTransport::default()).unwrap();
    let report = second.run().await.unwrap();

    assert_eq!(report, RunReport { sent: 1, skipped: 1, failed: 0 });
    assert_eq!(sent_to(&second), vec!["c@example.com"]);

    let log = job.redo_log();
    assert_eq!(log.lines().filter(|l| *l == job.key("a")).count(), 1);
    assert_eq!(log.lines().filter(|l| *l == job.key("c")).count(), 1);
}

#[tokio::test]
async fn finished_job_sends_nothing_on_resume() {
    let job = Job::new(0);
    job.add("a").add("b");
    job.pre_log(&["a", "b"]);
    let before = job.redo_log();

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report, RunReport { sent: 0, skipped: 2, failed: 0 });
    assert!(recorded(&runner).sent.is_empty());
    assert_eq!(job.redo_log(), before);
}

#[tokio::test]
async fn restart_sends_everyone_again() {
    let job = Job::new(0);
    job.add("a").add("b");
    job.pre_log(&["a", "b"]);

    let mut runner = job.runner(true, RecordingTransport::default()).unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(job.redo_log(), format!("{}\n{}\n", job.key("a"), job.key("b")));
}

#[tokio::test]
async fn rendered_content_and_shared_attachments_are_sent() {
    let job = Job::new(0);
    job.add("ann");
    fs::write(job.path().join("ann").join("variables.json"), r#"{"name": "Ann"}"#).unwrap();
    fs::create_dir(job.path().join("attachments")).unwrap();
    fs::write(job.path().join("attachments").join("terms.pdf"), b"%PDF").unwrap();

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    assert_eq!(runner.recipients().len(), 1);
    runner.run().await.unwrap();

    let sent = &recorded(&runner).sent[0];
    assert_eq!(sent.subject, "Hi ann");
    assert_eq!(sent.text.as_deref(), Some("Hello Ann"));
    assert_eq!(sent.attachments, vec![("terms.pdf".to_string(), b"%PDF".to_vec())]);
}

#[tokio::test]
async fn vanished_attachment_fails_only_that_recipient() {
    let job = Job::new(0);
    job.add("a").add("b");
    let attachment: PathBuf = job.path().join("a").join("attachments").join("cv.txt");
    fs::create_dir_all(attachment.parent().unwrap()).unwrap();
    fs::write(&attachment, "cv").unwrap();

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    fs::remove_file(&attachment).unwrap();
    let report = runner.run().await.unwrap();

    assert_eq!(report, RunReport { sent: 1, skipped: 0, failed: 1 });
    assert_eq!(sent_to(&runner), vec!["b@example.com"]);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_recipient_directory_is_sent() {
    let job = Job::new(0);
    job.add("a");
    let elsewhere = tempdir().unwrap();
    let target = elsewhere.path().join("b");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("email.txt"), "b@example.com\n").unwrap();
    std::os::unix::fs::symlink(&target, job.path().join("b")).unwrap();

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    assert_eq!(runner.recipients().len(), 2);
    let report = runner.run().await.unwrap();

    assert_eq!(report, RunReport { sent: 2, skipped: 0, failed: 0 });
    assert_eq!(sent_to(&runner), vec!["a@example.com", "b@example.com"]);
    assert!(job.redo_log().lines().any(|l| l == job.key("b")));
}

#[tokio::test]
async fn invalid_recipient_aborts_loading() {
    let job = Job::new(0);
    job.add("a");
    fs::create_dir(job.path().join("broken")).unwrap();
    fs::write(job.path().join("broken").join("email.txt"), "nobody").unwrap();

    let result = job.runner(false, RecordingTransport::default());
    assert!(matches!(result, Err(MailError::Load { .. })));
    assert_eq!(job.redo_log(), "");
}

#[tokio::test]
async fn malformed_config_aborts_loading() {
    let job = Job::new(0);
    job.add("a");
    fs::write(job.path().join("config.json"), "{ nope").unwrap();

    let result = job.runner(false, RecordingTransport::default());
    assert!(matches!(result, Err(MailError::Config { .. })));
}

#[tokio::test]
async fn failed_connect_sends_nothing() {
    let job = Job::new(0);
    job.add("a");

    let transport = RecordingTransport {
        refuse_connect: true,
        ..RecordingTransport::default()
    };
    let mut runner = job.runner(false, transport).unwrap();

    assert!(matches!(runner.run().await, Err(MailError::Smtp(_))));
    assert!(recorded(&runner).sent.is_empty());
    assert_eq!(job.redo_log(), "");
    assert_eq!(runner.state(), JobState::Ready);
}

#[tokio::test]
async fn a_runner_runs_once() {
    let job = Job::new(0);
    job.add("a");

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    runner.run().await.unwrap();

    assert!(matches!(runner.run().await, Err(MailError::AlreadyRun)));
    assert_eq!(recorded(&runner).sent.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_follows_every_attempt() {
    let job = Job::new(1000);
    job.add("a").add("b").add("c");
    job.pre_log(&["a"]);

    let transport = RecordingTransport {
        fail_for: Some("c@example.com".into()),
        ..RecordingTransport::default()
    };
    let mut runner = job.runner(false, transport).unwrap();

    let started = tokio::time::Instant::now();
    runner.run().await.unwrap();

    // two attempts pause, the skipped recipient does not
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3000), "{:?}", elapsed);
}

#[tokio::test]
async fn dispose_closes_everything_and_is_repeatable() {
    let job = Job::new(0);
    job.add("a");

    let mut runner = job.runner(false, RecordingTransport::default()).unwrap();
    runner.dispose();
    runner.dispose();

    assert!(runner.transport().is_none());
}
