//! Ephemeral files and folders: created under the OS temp directory with a
//! unique name, deleted on disposal.
//!
//! Disposal is idempotent: scoped-resource patterns may run cleanup more
//! than once under error paths, and a second disposal of an already-gone
//! entry is a no-op, never an error.

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::FsResult;
use crate::file::File;
use crate::folder::Folder;
use crate::node::Node;

/// 62^12 names; practical collision probability is negligible, and the
/// exact path is not re-checked.
const SUFFIX_LEN: usize = 12;

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn unique_path(tag: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("{tag}_{millis}_{}", random_alphanumeric(SUFFIX_LEN)))
}

fn ignore_missing(result: io::Result<()>) -> FsResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// An empty file created under the OS temp directory, deleted on disposal.
/// Always mutable, whatever the default for its kind.
#[derive(Debug)]
pub struct TempFile {
    file: File,
    disposed: bool,
}

impl TempFile {
    pub fn new_sync() -> FsResult<TempFile> {
        Self::with_tag_sync("tmpfile")
    }

    /// Create with a caller-chosen name tag, for recognizable temp entries.
    pub fn with_tag_sync(tag: &str) -> FsResult<TempFile> {
        let path = unique_path(tag);
        std::fs::File::create(&path)?;
        let mut file = File::open_sync(&path)?;
        file.set_mutable(true);
        tracing::debug!(path = %path.display(), "created temp file");
        Ok(TempFile {
            file,
            disposed: false,
        })
    }

    pub async fn new() -> FsResult<TempFile> {
        Self::with_tag("tmpfile").await
    }

    pub async fn with_tag(tag: &str) -> FsResult<TempFile> {
        let path = unique_path(tag);
        tokio::fs::File::create(&path).await?;
        let mut file = File::open(&path).await?;
        file.set_mutable(true);
        tracing::debug!(path = %path.display(), "created temp file");
        Ok(TempFile {
            file,
            disposed: false,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.location()
    }

    /// Delete the underlying file. Calling again, or after the entry is
    /// already gone, is a no-op.
    pub fn close_sync(&mut self) -> FsResult<()> {
        if self.disposed {
            return Ok(());
        }
        ignore_missing(std::fs::remove_file(self.file.location()))?;
        self.disposed = true;
        tracing::debug!(path = %self.file.location().display(), "disposed temp file");
        Ok(())
    }

    pub async fn close(&mut self) -> FsResult<()> {
        if self.disposed {
            return Ok(());
        }
        ignore_missing(tokio::fs::remove_file(self.file.location()).await)?;
        self.disposed = true;
        tracing::debug!(path = %self.file.location().display(), "disposed temp file");
        Ok(())
    }
}

impl Deref for TempFile {
    type Target = File;

    fn deref(&self) -> &File {
        &self.file
    }
}

impl DerefMut for TempFile {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.disposed {
            let _ = std::fs::remove_file(self.file.location());
        }
    }
}

/// An empty directory created under the OS temp directory, deleted
/// recursively on disposal. Always mutable.
#[derive(Debug)]
pub struct TempFolder {
    folder: Folder,
    disposed: bool,
}

impl TempFolder {
    pub fn new_sync() -> FsResult<TempFolder> {
        Self::with_tag_sync("tmpdir")
    }

    pub fn with_tag_sync(tag: &str) -> FsResult<TempFolder> {
        let path = unique_path(tag);
        std::fs::create_dir(&path)?;
        let mut folder = Folder::open_sync(&path)?;
        folder.set_mutable(true);
        tracing::debug!(path = %path.display(), "created temp folder");
        Ok(TempFolder {
            folder,
            disposed: false,
        })
    }

    pub async fn new() -> FsResult<TempFolder> {
        Self::with_tag("tmpdir").await
    }

    pub async fn with_tag(tag: &str) -> FsResult<TempFolder> {
        let path = unique_path(tag);
        tokio::fs::create_dir(&path).await?;
        let mut folder = Folder::open(&path).await?;
        folder.set_mutable(true);
        tracing::debug!(path = %path.display(), "created temp folder");
        Ok(TempFolder {
            folder,
            disposed: false,
        })
    }

    pub fn path(&self) -> &Path {
        self.folder.location()
    }

    /// Delete the directory and everything inside it. Idempotent like
    /// [`TempFile::close_sync`].
    pub fn close_sync(&mut self) -> FsResult<()> {
        if self.disposed {
            return Ok(());
        }
        ignore_missing(std::fs::remove_dir_all(self.folder.location()))?;
        self.disposed = true;
        tracing::debug!(path = %self.folder.location().display(), "disposed temp folder");
        Ok(())
    }

    pub async fn close(&mut self) -> FsResult<()> {
        if self.disposed {
            return Ok(());
        }
        ignore_missing(tokio::fs::remove_dir_all(self.folder.location()).await)?;
        self.disposed = true;
        tracing::debug!(path = %self.folder.location().display(), "disposed temp folder");
        Ok(())
    }
}

impl Deref for TempFolder {
    type Target = Folder;

    fn deref(&self) -> &Folder {
        &self.folder
    }
}

impl DerefMut for TempFolder {
    fn deref_mut(&mut self) -> &mut Folder {
        &mut self.folder
    }
}

impl Drop for TempFolder {
    fn drop(&mut self) {
        if !self.disposed {
            let _ = std::fs::remove_dir_all(self.folder.location());
        }
    }
}
