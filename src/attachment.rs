use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One file registered as an attachment.
///
/// A lazy buffer re-reads the file on every request and never caches it,
/// a strict one reads it once when it is registered.
#[derive(Debug, Clone)]
struct Buffer {
    path: PathBuf,
    data: Option<Vec<u8>>,
}

impl Buffer {
    fn open(path: PathBuf, lazy: bool) -> io::Result<Self> {
        let data = if lazy { None } else { Some(fs::read(&path)?) };
        Ok(Buffer { path, data })
    }

    fn data(&self) -> io::Result<Vec<u8>> {
        match &self.data {
            Some(data) => Ok(data.clone()),
            None => fs::read(&self.path),
        }
    }
}

/// Named attachment buffers loaded from a flat directory.
#[derive(Debug, Clone, Default)]
pub struct AttachmentStore {
    buffers: BTreeMap<String, Buffer>,
}

impl AttachmentStore {
    /// Registers every file in `dir` under its base name, following symlinks.
    ///
    /// A missing directory yields an empty store. Subdirectories are not
    /// descended into.
    pub fn load(dir: &Path, lazy: bool) -> io::Result<Self> {
        let mut buffers = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(AttachmentStore { buffers });
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            buffers.insert(name, Buffer::open(path, lazy)?);
        }

        Ok(AttachmentStore { buffers })
    }

    /// Adds all of `other`'s attachments; `other` wins on a name collision.
    pub fn merge(&mut self, other: &AttachmentStore) {
        for (name, buffer) in &other.buffers {
            self.buffers.insert(name.clone(), buffer.clone());
        }
    }

    /// Yields `(name, bytes)` per attachment, reading lazy buffers from disk now.
    pub fn items(&self) -> impl Iterator<Item = io::Result<(String, Vec<u8>)>> + '_ {
        self.buffers
            .iter()
            .map(|(name, buffer)| buffer.data().map(|data| (name.clone(), data)))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
