//! Filesystem key-value backend.
//!
//! Stores each key as its own file inside a directory:
//! ```text
//! ~/.local/share/fieldsync/
//! ├── .gitignore          # Contains "*" to ignore all
//! ├── authToken
//! └── user
//! ```
//! The directory is created with mode 0700 and files with mode 0600 on unix.
//! Writes go through a temporary file that is atomically persisted over the
//! target, so a crash never leaves a half-written value behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::backend::KeyValueBackend;
use crate::error::{Error, Result};

/// Filesystem-backed key-value store.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(&self.dir)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(&self.dir, perms)?;
            }

            let gitignore = self.dir.join(".gitignore");
            if !gitignore.exists() {
                fs::write(gitignore, "*\n")?;
            }
        }
        Ok(())
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let invalid = ['/', '\\', '\0', ':', '*', '?', '"', '<', '>', '|'];
        if key.is_empty() || key.starts_with('.') || key.contains(invalid) {
            return Err(Error::storage(format!("invalid key '{key}'")));
        }
        Ok(self.dir.join(key))
    }

    fn write_atomic(&self, path: &Path, value: &str) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tmp.as_file().metadata()?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(tmp.path(), perms)?;
        }

        tmp.persist(path)
            .map_err(|e| Error::storage(format!("failed to persist {}: {}", path.display(), e.error)))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        let this = self.clone();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            this.ensure_dir()?;
            this.write_atomic(&path, &value)
        })
        .await
        .map_err(|e| Error::storage(format!("write task failed: {e}")))?
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
