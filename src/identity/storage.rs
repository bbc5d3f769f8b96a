//! JSON-file persistence for the signed-in session.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::{IdentityError, Session};

#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone)]
pub struct SessionStorage {
    path: PathBuf,
}

impl SessionStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted session. A missing file means no session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Storage`] when the file exists but cannot be
    /// read or parsed.
    pub async fn load(&self) -> Result<Option<Session>, IdentityError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_error(&e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.storage_error(&e))
    }

    /// Persist `session`, creating parent directories as needed. On unix the
    /// file is readable and writable by the owner only.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Storage`] on any filesystem failure.
    pub async fn save(&self, session: &Session) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.storage_error(&e))?;
        }
        let bytes = serde_json::to_vec_pretty(session).map_err(|e| self.storage_error(&e))?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(SESSION_FILE_MODE);
        let mut file = options.open(&self.path).await.map_err(|e| self.storage_error(&e))?;

        // `mode` only applies on creation.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(SESSION_FILE_MODE))
                .await
                .map_err(|e| self.storage_error(&e))?;
        }

        file.write_all(&bytes).await.map_err(|e| self.storage_error(&e))?;
        file.flush().await.map_err(|e| self.storage_error(&e))
    }

    /// Remove the persisted session. Missing file is fine.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Storage`] when the file exists but cannot be
    /// removed.
    pub async fn clear(&self) -> Result<(), IdentityError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error(&e)),
        }
    }

    fn storage_error(&self, e: &dyn std::fmt::Display) -> IdentityError {
        IdentityError::Storage(format!("{}: {e}", self.path.display()))
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
