//! Directories: fresh listings, child lookup, recursive tree operations.
//!
//! A folder never caches its children. Every listing and lookup is a fresh
//! read of the directory, so the answer always reflects the disk.

use std::future::Future;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::{FsError, FsResult};
use crate::kind::NodeKind;
use crate::node::{AnyNode, Node, NodeHandle};

#[derive(Debug, Clone)]
pub struct Folder {
    node: NodeHandle,
}

impl Folder {
    /// Open an existing directory. Fails with `KindMismatch` if the path
    /// holds anything else.
    pub fn open_sync(path: impl AsRef<Path>) -> FsResult<Folder> {
        Ok(Folder {
            node: NodeHandle::open_sync(path.as_ref(), NodeKind::Directory, true)?,
        })
    }

    /// Suspending form of [`Folder::open_sync`].
    pub async fn open(path: impl AsRef<Path> + Send) -> FsResult<Folder> {
        Ok(Folder {
            node: NodeHandle::open(path.as_ref(), NodeKind::Directory, true).await?,
        })
    }

    pub(crate) fn from_handle(node: NodeHandle) -> Folder {
        Folder { node }
    }

    /// Library-level mutability guard, independent of OS permissions.
    pub fn set_mutable(&mut self, mutable: bool) {
        self.node.set_mutable(mutable);
    }

    /// Typed handles for every immediate child, read fresh from the OS.
    pub fn list_sync(&self) -> FsResult<Vec<AnyNode>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(self.location())? {
            out.push(AnyNode::open_sync(entry?.path())?);
        }
        Ok(out)
    }

    pub async fn list(&self) -> FsResult<Vec<AnyNode>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(self.location()).await?;
        while let Some(entry) = entries.next_entry().await? {
            out.push(AnyNode::open(entry.path()).await?);
        }
        Ok(out)
    }

    /// Immediate children of one kind only.
    pub fn list_kind_sync(&self, kind: NodeKind) -> FsResult<Vec<AnyNode>> {
        let mut nodes = self.list_sync()?;
        nodes.retain(|n| n.kind() == kind);
        Ok(nodes)
    }

    pub async fn list_kind(&self, kind: NodeKind) -> FsResult<Vec<AnyNode>> {
        let mut nodes = self.list().await?;
        nodes.retain(|n| n.kind() == kind);
        Ok(nodes)
    }

    /// Look up an immediate child by name. Absent is `None`, not an error.
    pub fn find_sync(&self, name: &str) -> FsResult<Option<AnyNode>> {
        match AnyNode::open_sync(self.join([name])) {
            Ok(node) => Ok(Some(node)),
            Err(FsError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn find(&self, name: &str) -> FsResult<Option<AnyNode>> {
        match AnyNode::open(self.join([name])).await {
            Ok(node) => Ok(Some(node)),
            Err(FsError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`Folder::find_sync`], but a child of a different kind also
    /// reads as `None`.
    pub fn find_kind_sync(&self, name: &str, kind: NodeKind) -> FsResult<Option<AnyNode>> {
        Ok(self.find_sync(name)?.filter(|n| n.kind() == kind))
    }

    pub async fn find_kind(&self, name: &str, kind: NodeKind) -> FsResult<Option<AnyNode>> {
        Ok(self.find(name).await?.filter(|n| n.kind() == kind))
    }
}

/// Deep-copy a directory tree. Destination directories are created as
/// needed and same-named files are overwritten; a failure partway leaves
/// whatever the finished calls produced.
fn copy_tree_sync(src: &Path, dst: &Path) -> FsResult<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let meta = std::fs::symlink_metadata(&from)?;
        match NodeKind::from_mode(meta.mode())? {
            NodeKind::Directory => copy_tree_sync(&from, &to)?,
            NodeKind::RegularFile => {
                std::fs::copy(&from, &to)?;
            }
            NodeKind::SymbolicLink => {
                let target = std::fs::read_link(&from)?;
                std::os::unix::fs::symlink(&target, &to)?;
            }
            other => {
                return Err(FsError::Unsupported {
                    kind: other,
                    op: "copy",
                    path: from,
                });
            }
        }
    }
    Ok(())
}

fn copy_tree<'a>(
    src: &'a Path,
    dst: &'a Path,
) -> Pin<Box<dyn Future<Output = FsResult<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst).await?;
        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            let meta = tokio::fs::symlink_metadata(&from).await?;
            match NodeKind::from_mode(meta.mode())? {
                NodeKind::Directory => copy_tree(&from, &to).await?,
                NodeKind::RegularFile => {
                    tokio::fs::copy(&from, &to).await?;
                }
                NodeKind::SymbolicLink => {
                    let target = tokio::fs::read_link(&from).await?;
                    tokio::fs::symlink(&target, &to).await?;
                }
                other => {
                    return Err(FsError::Unsupported {
                        kind: other,
                        op: "copy",
                        path: from,
                    });
                }
            }
        }
        Ok(())
    })
}

#[async_trait]
impl Node for Folder {
    fn handle(&self) -> &NodeHandle {
        &self.node
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Directory
    }

    /// Recursive removal of the directory and everything inside it. As
    /// destructive as `rm -rf`; a mid-operation failure leaves the tree
    /// partially deleted.
    async fn delete(&mut self) -> FsResult<()> {
        self.node.ensure_mutable()?;
        Ok(tokio::fs::remove_dir_all(self.location()).await?)
    }

    fn delete_sync(&mut self) -> FsResult<()> {
        self.node.ensure_mutable()?;
        Ok(std::fs::remove_dir_all(self.location())?)
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

    async fn copy_into(&self, dest: &Folder) -> FsResult<Folder> {
        let target = dest.join([self.name()]);
        copy_tree(self.location(), &target).await?;
        Folder::open(&target).await
    }

    fn copy_into_sync(&self, dest: &Folder) -> FsResult<Folder> {
        let target = dest.join([self.name()]);
        copy_tree_sync(self.location(), &target)?;
        Folder::open_sync(&target)
    }
}
