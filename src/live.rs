//! A file whose content is kept loaded in memory and refreshed whenever the
//! on-disk entry changes.

use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::FsResult;
use crate::file::File;
use crate::node::Node;
use crate::watch::{DEFAULT_POLL_PERIOD, PathWatcher};

/// A [`File`] paired with a background task that reloads its content after
/// every change notification.
///
/// The buffer always holds the most recent *successful* load; a failed
/// reload keeps the previous bytes. Dropping or closing the value cancels
/// the task; no reads are issued and no watch is held afterwards.
#[derive(Debug)]
pub struct LiveFile {
    file: File,
    content: Arc<RwLock<Vec<u8>>>,
    cancel: CancellationToken,
}

impl LiveFile {
    pub async fn open(path: impl AsRef<Path> + Send) -> FsResult<LiveFile> {
        Self::open_with_period(path, DEFAULT_POLL_PERIOD).await
    }

    /// Open with a custom change-detection period.
    pub async fn open_with_period(
        path: impl AsRef<Path> + Send,
        period: Duration,
    ) -> FsResult<LiveFile> {
        let file = File::open(path).await?;
        let initial = tokio::fs::read(file.location()).await?;
        let content = Arc::new(RwLock::new(initial));
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_content = Arc::clone(&content);
        let location = file.location().to_path_buf();
        tokio::spawn(async move {
            let mut watcher = PathWatcher::new(&location).with_period(period);
            loop {
                // Cancellation wins over a simultaneously pending change:
                // after disposal no further notification may be processed.
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = watcher.next_change() => {
                        match tokio::fs::read(&location).await {
                            Ok(bytes) => {
                                // Disposal may have happened during the read.
                                if task_cancel.is_cancelled() {
                                    break;
                                }
                                tracing::debug!(path = %location.display(), len = bytes.len(), "live reload");
                                *task_content.write().unwrap() = bytes;
                            }
                            Err(e) => {
                                tracing::warn!(path = %location.display(), error = %e, "live reload failed, keeping previous content");
                            }
                        }
                    }
                }
            }
            tracing::trace!(path = %location.display(), "live watch stopped");
        });

        Ok(LiveFile {
            file,
            content,
            cancel,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Snapshot of the most recently loaded content.
    pub fn content(&self) -> Vec<u8> {
        self.content.read().unwrap().clone()
    }

    /// Reload from disk right now, regardless of change notifications.
    pub async fn refresh(&self) -> FsResult<()> {
        let bytes = tokio::fs::read(self.file.location()).await?;
        *self.content.write().unwrap() = bytes;
        Ok(())
    }

    pub fn refresh_sync(&self) -> FsResult<()> {
        let bytes = std::fs::read(self.file.location())?;
        *self.content.write().unwrap() = bytes;
        Ok(())
    }

    /// Stop the background task. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Deref for LiveFile {
    type Target = File;

    fn deref(&self) -> &File {
        &self.file
    }
}

impl Drop for LiveFile {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
