use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    error::{Error, Result},
};

/// A [`CheckpointStore`] backed by a small JSON file.
///
/// Writes go to a sibling `*.tmp` file which is then renamed over the
/// target, so readers only ever see a complete record.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_error(&self, reason: impl ToString) -> Error {
        Error::PersistenceRead {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn write_error(&self, reason: impl ToString) -> Error {
        Error::PersistenceWrite {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn write_atomically(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self) -> Result<Option<Checkpoint>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.read_error(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.read_error(e))
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec(checkpoint).map_err(|e| self.write_error(e))?;
        self.write_atomically(&bytes)
            .map_err(|e| self.write_error(e))
    }
}
