//! Regular files: whole-content and streaming reads, guarded writes.

use std::io::{self, BufRead, Read};
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::error::FsResult;
use crate::folder::Folder;
use crate::kind::NodeKind;
use crate::node::{Node, NodeHandle};

/// Default chunk size for [`File::chunks`].
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A regular file. Content lives on disk only; every read goes to the OS.
#[derive(Debug, Clone)]
pub struct File {
    node: NodeHandle,
}

impl File {
    /// Open an existing regular file. Fails with `KindMismatch` if the path
    /// holds anything else.
    pub fn open_sync(path: impl AsRef<Path>) -> FsResult<File> {
        Ok(File {
            node: NodeHandle::open_sync(path.as_ref(), NodeKind::RegularFile, true)?,
        })
    }

    /// Suspending form of [`File::open_sync`].
    pub async fn open(path: impl AsRef<Path> + Send) -> FsResult<File> {
        Ok(File {
            node: NodeHandle::open(path.as_ref(), NodeKind::RegularFile, true).await?,
        })
    }

    pub(crate) fn from_handle(node: NodeHandle) -> File {
        File { node }
    }

    /// Library-level mutability guard, independent of OS permissions.
    pub fn set_mutable(&mut self, mutable: bool) {
        self.node.set_mutable(mutable);
    }

    /// Extension including the leading dot, empty if there is none.
    pub fn extension(&self) -> String {
        match self.location().extension() {
            Some(ext) => format!(".{}", ext.to_string_lossy()),
            None => String::new(),
        }
    }

    pub fn size_sync(&self) -> FsResult<u64> {
        Ok(self.metadata_sync()?.len())
    }

    pub async fn size(&self) -> FsResult<u64> {
        Ok(self.metadata().await?.len())
    }

    pub fn read_bytes_sync(&self) -> FsResult<Vec<u8>> {
        Ok(std::fs::read(self.location())?)
    }

    pub async fn read_bytes(&self) -> FsResult<Vec<u8>> {
        Ok(tokio::fs::read(self.location()).await?)
    }

    pub fn read_text_sync(&self) -> FsResult<String> {
        Ok(std::fs::read_to_string(self.location())?)
    }

    pub async fn read_text(&self) -> FsResult<String> {
        Ok(tokio::fs::read_to_string(self.location()).await?)
    }

    /// Truncate and replace the whole content.
    pub fn write_bytes_sync(&self, content: &[u8]) -> FsResult<()> {
        self.node.ensure_mutable()?;
        Ok(std::fs::write(self.location(), content)?)
    }

    pub async fn write_bytes(&self, content: &[u8]) -> FsResult<()> {
        self.node.ensure_mutable()?;
        Ok(tokio::fs::write(self.location(), content).await?)
    }

    pub fn write_text_sync(&self, content: &str) -> FsResult<()> {
        self.write_bytes_sync(content.as_bytes())
    }

    pub async fn write_text(&self, content: &str) -> FsResult<()> {
        self.write_bytes(content.as_bytes()).await
    }

    pub fn append_bytes_sync(&self, content: &[u8]) -> FsResult<()> {
        use std::io::Write;
        self.node.ensure_mutable()?;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(self.location())?;
        f.write_all(content)?;
        Ok(())
    }

    pub async fn append_bytes(&self, content: &[u8]) -> FsResult<()> {
        self.node.ensure_mutable()?;
        let mut f = tokio::fs::OpenOptions::new()
            .append(true)
            .open(self.location())
            .await?;
        f.write_all(content).await?;
        f.flush().await?;
        Ok(())
    }

    pub fn append_text_sync(&self, content: &str) -> FsResult<()> {
        self.append_bytes_sync(content.as_bytes())
    }

    pub async fn append_text(&self, content: &str) -> FsResult<()> {
        self.append_bytes(content.as_bytes()).await
    }

    /// Lazily yield lines without buffering the whole file. Call again to
    /// restart from the top.
    pub fn lines_sync(&self) -> FsResult<io::Lines<io::BufReader<std::fs::File>>> {
        let f = std::fs::File::open(self.location())?;
        Ok(io::BufReader::new(f).lines())
    }

    pub async fn lines(&self) -> FsResult<tokio::io::Lines<BufReader<tokio::fs::File>>> {
        let f = tokio::fs::File::open(self.location()).await?;
        Ok(BufReader::new(f).lines())
    }

    /// Lazily yield chunks of [`DEFAULT_CHUNK_SIZE`] bytes until EOF; the
    /// final chunk may be shorter.
    pub fn chunks_sync(&self) -> FsResult<ChunkIter> {
        self.chunks_with_sync(DEFAULT_CHUNK_SIZE)
    }

    pub async fn chunks(&self) -> FsResult<ChunkReader> {
        self.chunks_with(DEFAULT_CHUNK_SIZE).await
    }

    /// Like [`File::chunks_sync`] with a caller-chosen chunk size.
    pub fn chunks_with_sync(&self, chunk_size: usize) -> FsResult<ChunkIter> {
        let f = std::fs::File::open(self.location())?;
        Ok(ChunkIter {
            inner: f,
            chunk_size,
            done: false,
        })
    }

    pub async fn chunks_with(&self, chunk_size: usize) -> FsResult<ChunkReader> {
        let f = tokio::fs::File::open(self.location()).await?;
        Ok(ChunkReader {
            inner: f,
            chunk_size,
            done: false,
        })
    }

    /// Raw read handle for pipelining with other stream consumers.
    pub fn reader_sync(&self) -> FsResult<std::fs::File> {
        Ok(std::fs::File::open(self.location())?)
    }

    pub async fn reader(&self) -> FsResult<tokio::fs::File> {
        Ok(tokio::fs::File::open(self.location()).await?)
    }

    /// Raw truncating write handle; subject to the mutation guard.
    pub fn writer_sync(&self) -> FsResult<std::fs::File> {
        self.node.ensure_mutable()?;
        Ok(std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.location())?)
    }

    pub async fn writer(&self) -> FsResult<tokio::fs::File> {
        self.node.ensure_mutable()?;
        Ok(tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.location())
            .await?)
    }

    /// True only for the same path with byte-identical content. Two distinct
    /// paths holding the same bytes are deliberately not equal.
    pub fn content_equals_sync(&self, other: &File) -> FsResult<bool> {
        if self.location() != other.location() {
            return Ok(false);
        }
        Ok(self.read_bytes_sync()? == other.read_bytes_sync()?)
    }

    pub async fn content_equals(&self, other: &File) -> FsResult<bool> {
        if self.location() != other.location() {
            return Ok(false);
        }
        Ok(self.read_bytes().await? == other.read_bytes().await?)
    }
}

#[async_trait]
impl Node for File {
    fn handle(&self) -> &NodeHandle {
        &self.node
    }

    fn kind(&self) -> NodeKind {
        NodeKind::RegularFile
    }

    async fn delete(&mut self) -> FsResult<()> {
        self.node.ensure_mutable()?;
        Ok(tokio::fs::remove_file(self.location()).await?)
    }

    fn delete_sync(&mut self) -> FsResult<()> {
        self.node.ensure_mutable()?;
        Ok(std::fs::remove_file(self.location())?)
    }

    async fn rename_to(&mut self, new_name: &str) -> FsResult<()> {
        self.node.ensure_mutable()?;
        let dest = self.location().with_file_name(new_name);
        tokio::fs::rename(self.location(), &dest).await?;
        self.node.set_location(dest);
        Ok(())
    }

    fn rename_to_sync(&mut self, new_name: &str) -> FsResult<()> {
        self.node.ensure_mutable()?;
        let dest = self.location().with_file_name(new_name);
        std::fs::rename(self.location(), &dest)?;
        self.node.set_location(dest);
        Ok(())
    }

    async fn move_into(&mut self, dest: &Folder) -> FsResult<()> {
        self.node.ensure_mutable()?;
        let target = dest.join([self.name()]);
        tokio::fs::rename(self.location(), &target).await?;
        self.node.set_location(target);
        Ok(())
    }

    fn move_into_sync(&mut self, dest: &Folder) -> FsResult<()> {
        self.node.ensure_mutable()?;
        let target = dest.join([self.name()]);
        std::fs::rename(self.location(), &target)?;
        self.node.set_location(target);
        Ok(())
    }

    async fn copy_into(&self, dest: &Folder) -> FsResult<File> {
        let target = dest.join([self.name()]);
        tokio::fs::copy(self.location(), &target).await?;
        File::open(&target).await
    }

    fn copy_into_sync(&self, dest: &Folder) -> FsResult<File> {
        let target = dest.join([self.name()]);
        std::fs::copy(self.location(), &target)?;
        File::open_sync(&target)
    }
}

/// Blocking chunk reader; a fused iterator over `FsResult<Vec<u8>>`.
#[derive(Debug)]
pub struct ChunkIter {
    inner: std::fs::File,
    chunk_size: usize,
    done: bool,
}

impl Iterator for ChunkIter {
    type Item = FsResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
        if filled == 0 {
            self.done = true;
            return None;
        }
        if filled < buf.len() {
            self.done = true;
            buf.truncate(filled);
        }
        Some(Ok(buf))
    }
}

/// Suspending chunk reader, in the style of `tokio::io::Lines::next_line`.
#[derive(Debug)]
pub struct ChunkReader {
    inner: tokio::fs::File,
    chunk_size: usize,
    done: bool,
}

impl ChunkReader {
    /// The next chunk, or `None` at EOF. The final chunk may be shorter than
    /// the configured size.
    pub async fn next_chunk(&mut self) -> FsResult<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            self.done = true;
            return Ok(None);
        }
        if filled < buf.len() {
            self.done = true;
            buf.truncate(filled);
        }
        Ok(Some(buf))
    }
}
