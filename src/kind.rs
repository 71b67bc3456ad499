//! Classification of filesystem entries from their raw mode bits.

use std::fmt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// The seven entry kinds a Unix filesystem can hold.
///
/// A kind is derived from on-disk metadata at the moment it is asked for,
/// never cached: an entry can be replaced by one of a different kind at any
/// time behind our back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    RegularFile,
    Directory,
    BlockDevice,
    CharacterDevice,
    SymbolicLink,
    Fifo,
    Socket,
}

impl NodeKind {
    /// Classify raw `st_mode` bits by masking with `S_IFMT`.
    pub fn from_mode(mode: u32) -> FsResult<NodeKind> {
        const S_IFMT: u32 = libc::S_IFMT as u32;
        const S_IFREG: u32 = libc::S_IFREG as u32;
        const S_IFDIR: u32 = libc::S_IFDIR as u32;
        const S_IFBLK: u32 = libc::S_IFBLK as u32;
        const S_IFCHR: u32 = libc::S_IFCHR as u32;
        const S_IFLNK: u32 = libc::S_IFLNK as u32;
        const S_IFIFO: u32 = libc::S_IFIFO as u32;
        const S_IFSOCK: u32 = libc::S_IFSOCK as u32;

        match mode & S_IFMT {
            S_IFREG => Ok(NodeKind::RegularFile),
            S_IFDIR => Ok(NodeKind::Directory),
            S_IFBLK => Ok(NodeKind::BlockDevice),
            S_IFCHR => Ok(NodeKind::CharacterDevice),
            S_IFLNK => Ok(NodeKind::SymbolicLink),
            S_IFIFO => Ok(NodeKind::Fifo),
            S_IFSOCK => Ok(NodeKind::Socket),
            _ => Err(FsError::UnknownKind { mode }),
        }
    }

    /// Classify the entry at `path` without following a final symlink.
    pub fn of_path_sync(path: impl AsRef<Path>) -> FsResult<NodeKind> {
        let meta = std::fs::symlink_metadata(path.as_ref())?;
        NodeKind::from_mode(meta.mode())
    }

    /// Suspending form of [`NodeKind::of_path_sync`].
    pub async fn of_path(path: impl AsRef<Path>) -> FsResult<NodeKind> {
        let meta = tokio::fs::symlink_metadata(path.as_ref()).await?;
        NodeKind::from_mode(meta.mode())
    }

    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::RegularFile)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, NodeKind::SymbolicLink)
    }

    /// True for the four kinds this library represents but never mutates.
    pub fn is_inert(&self) -> bool {
        matches!(
            self,
            NodeKind::BlockDevice | NodeKind::CharacterDevice | NodeKind::Fifo | NodeKind::Socket
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::RegularFile => "regular file",
            NodeKind::Directory => "directory",
            NodeKind::BlockDevice => "block device",
            NodeKind::CharacterDevice => "character device",
            NodeKind::SymbolicLink => "symbolic link",
            NodeKind::Fifo => "fifo",
            NodeKind::Socket => "socket",
        };
        f.write_str(s)
    }
}
