use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use log::info;

use crate::error::MailError;

pub const REDO_LOG_FILE: &str = "redo.log";

/// Append-only record of recipients whose mail went out.
///
/// Every committed line is flushed and synced before `commit` returns, so
/// after a crash the file never lists a recipient that was not sent and never
/// loses one that was.
pub struct RedoLog {
    file: Option<File>,
    done: HashSet<String>,
}

impl RedoLog {
    /// Opens `redo.log` in `job_dir`, removing a previous one first when `restart` is set.
    pub fn open(job_dir: &Path, restart: bool) -> Result<Self, MailError> {
        let path = job_dir.join(REDO_LOG_FILE);
        let fail = |source: io::Error| MailError::RedoLog {
            path: job_dir.to_path_buf(),
            source,
        };

        if restart && path.exists() {
            fs::remove_file(&path).map_err(fail)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(fail)?;

        let mut buf = String::new();
        file.read_to_string(&mut buf).map_err(fail)?;
        let done: HashSet<String> = buf
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        info!("Loaded redolog: {} recipients will be skipped", done.len());

        Ok(RedoLog {
            file: Some(file),
            done,
        })
    }

    pub fn contains(&self, recipient: &str) -> bool {
        self.done.contains(recipient)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Durably records `recipient` as sent.
    pub fn commit(&mut self, recipient: &str) -> Result<(), MailError> {
        let file = self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "redo.log is already closed")
        })?;
        file.write_all(format!("{}\n", recipient).as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        self.done.insert(recipient.to_owned());
        Ok(())
    }

    /// Closes the file. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.file = None;
    }
}
