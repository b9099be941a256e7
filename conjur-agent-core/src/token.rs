use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

/// Owner of the session artifact issued by Conjur. The authenticator hands
/// the artifact over exactly once per successful exchange; every other
/// component reads it back through this interface.
pub trait AccessTokenStore: Send + Sync {
    /// Replace the stored artifact. Must be all-or-nothing: a failed write
    /// leaves any previously stored artifact intact.
    fn write(&self, token: &[u8]) -> Result<()>;
    fn read(&self) -> Result<Zeroizing<Vec<u8>>>;
}

/// File-backed store, shared with the workload container via a volume
/// mount. Writes go to a temp file in the destination directory and are
/// renamed into place, so readers never observe a partial artifact.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccessTokenStore for FileTokenStore {
    fn write(&self, token: &[u8]) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)
            .map_err(|err| Error::TokenPersistFailed(err.to_string()))?;
        file.write_all(token)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|err| Error::TokenPersistFailed(err.to_string()))?;
        file.persist(&self.path)
            .map_err(|err| Error::TokenPersistFailed(err.to_string()))?;
        Ok(())
    }

    fn read(&self) -> Result<Zeroizing<Vec<u8>>> {
        fs::read(&self.path)
            .map(Zeroizing::new)
            .map_err(|err| Error::TokenUnavailable(err.to_string()))
    }
}
