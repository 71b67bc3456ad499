//! Symbolic links: target resolution and retargeting.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::FsResult;
use crate::folder::Folder;
use crate::kind::NodeKind;
use crate::node::{self, AnyNode, Node, NodeHandle};

/// A symbolic link. The "points to" relationship is a reference, re-read
/// from disk on every `target` call, never owned.
#[derive(Debug, Clone)]
pub struct SymbolicLink {
    node: NodeHandle,
}

impl SymbolicLink {
    /// Open an existing symlink (the link itself, via lstat). Fails with
    /// `KindMismatch` if the path holds anything else.
    pub fn open_sync(path: impl AsRef<Path>) -> FsResult<SymbolicLink> {
        Ok(SymbolicLink {
            node: NodeHandle::open_sync(path.as_ref(), NodeKind::SymbolicLink, true)?,
        })
    }

    /// Suspending form of [`SymbolicLink::open_sync`].
    pub async fn open(path: impl AsRef<Path> + Send) -> FsResult<SymbolicLink> {
        Ok(SymbolicLink {
            node: NodeHandle::open(path.as_ref(), NodeKind::SymbolicLink, true).await?,
        })
    }

    pub(crate) fn from_handle(node: NodeHandle) -> SymbolicLink {
        SymbolicLink { node }
    }

    /// Library-level mutability guard, independent of OS permissions.
    pub fn set_mutable(&mut self, mutable: bool) {
        self.node.set_mutable(mutable);
    }

    /// The stored target string, exactly as written in the link.
    pub fn target_path_sync(&self) -> FsResult<PathBuf> {
        Ok(std::fs::read_link(self.location())?)
    }

    pub async fn target_path(&self) -> FsResult<PathBuf> {
        Ok(tokio::fs::read_link(self.location()).await?)
    }

    /// Resolve the stored target against the link's own directory. Distinct
    /// from `location`: a dangling target makes constructing the node fail
    /// with the ordinary not-found error.
    fn resolved_target(&self, stored: PathBuf) -> FsResult<PathBuf> {
        let base = self.location().parent().unwrap_or_else(|| self.location());
        Ok(node::absolutize(&base.join(stored))?)
    }

    /// The node this link points at, classified and constructed fresh.
    pub fn target_sync(&self) -> FsResult<AnyNode> {
        let resolved = self.resolved_target(self.target_path_sync()?)?;
        AnyNode::open_sync(resolved)
    }

    pub async fn target(&self) -> FsResult<AnyNode> {
        let resolved = self.resolved_target(self.target_path().await?)?;
        AnyNode::open(resolved).await
    }

    /// Point this link at another node by deleting and recreating it.
    /// Not atomic across the two steps: a crash in between leaves no link.
    pub fn retarget_sync<N: Node>(&self, target: &N) -> FsResult<()> {
        self.node.ensure_mutable()?;
        std::fs::remove_file(self.location())?;
        std::os::unix::fs::symlink(target.location(), self.location())?;
        Ok(())
    }

    pub async fn retarget<N: Node>(&self, target: &N) -> FsResult<()> {
        self.node.ensure_mutable()?;
        tokio::fs::remove_file(self.location()).await?;
        tokio::fs::symlink(target.location(), self.location()).await?;
        Ok(())
    }
}

#[async_trait]
impl Node for SymbolicLink {
    fn handle(&self) -> &NodeHandle {
        &self.node
    }

    fn kind(&self) -> NodeKind {
        NodeKind::SymbolicLink
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

    /// Creates a new link with the same stored target string; never a copy
    /// of the target's content.
    async fn copy_into(&self, dest: &Folder) -> FsResult<SymbolicLink> {
        let stored = self.target_path().await?;
        let target = dest.join([self.name()]);
        tokio::fs::symlink(&stored, &target).await?;
        SymbolicLink::open(&target).await
    }

    fn copy_into_sync(&self, dest: &Folder) -> FsResult<SymbolicLink> {
        let stored = self.target_path_sync()?;
        let target = dest.join([self.name()]);
        std::os::unix::fs::symlink(&stored, &target)?;
        SymbolicLink::open_sync(&target)
    }
}
