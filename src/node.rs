//! Shared node state and the polymorphic contract every concrete kind
//! satisfies.
//!
//! A node is one filesystem path at a moment in time. Its kind is fixed at
//! construction and verified against the on-disk entry right then; nothing
//! re-verifies it afterwards, so an entry swapped out from under a live node
//! simply makes `exists` report false.

use std::ffi::CString;
use std::fs::Metadata;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::device::{BlockDevice, CharDevice, FifoNode, SocketNode};
use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::folder::Folder;
use crate::kind::NodeKind;
use crate::symlink::SymbolicLink;
use crate::watch::{Change, PathWatcher};

/// Resolve `path` against the current working directory and collapse `.` and
/// `..` components lexically. No filesystem access beyond the cwd lookup.
pub(crate) fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(seg) => out.push(seg),
        }
    }
    Ok(out)
}

/// What `is_accessible` probes for, mapping onto `access(2)` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Exists,
    Read,
    Write,
    Execute,
}

impl AccessMode {
    fn flag(self) -> libc::c_int {
        match self {
            AccessMode::Exists => libc::F_OK,
            AccessMode::Read => libc::R_OK,
            AccessMode::Write => libc::W_OK,
            AccessMode::Execute => libc::X_OK,
        }
    }
}

/// `access(2)` probe. Not-found and permission-denied are expected outcomes
/// and come back as `Ok(false)`; anything else is a real error.
pub(crate) fn access_probe(path: &Path, mode: AccessMode) -> FsResult<bool> {
    let raw = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
    let rc = unsafe { libc::access(raw.as_ptr(), mode.flag()) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Ok(false),
        _ => Err(err.into()),
    }
}

/// State common to every concrete node kind: the resolved location and the
/// library-level mutability guard.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    location: PathBuf,
    mutable: bool,
}

impl NodeHandle {
    /// Wrap an already-verified location. Callers have classified the entry.
    pub(crate) fn from_parts(location: PathBuf, mutable: bool) -> Self {
        Self { location, mutable }
    }

    /// Checked construction: the path must exist and its on-disk kind must
    /// equal `expected`. This is the single point where the identity
    /// invariant is enforced.
    pub(crate) fn open_sync(path: &Path, expected: NodeKind, mutable: bool) -> FsResult<Self> {
        let location = absolutize(path)?;
        let meta = std::fs::symlink_metadata(&location)?;
        let actual = NodeKind::from_mode(meta.mode())?;
        if actual != expected {
            return Err(FsError::KindMismatch {
                path: location,
                expected,
                actual,
            });
        }
        Ok(Self { location, mutable })
    }

    /// Suspending form of [`NodeHandle::open_sync`].
    pub(crate) async fn open(path: &Path, expected: NodeKind, mutable: bool) -> FsResult<Self> {
        let location = absolutize(path)?;
        let meta = tokio::fs::symlink_metadata(&location).await?;
        let actual = NodeKind::from_mode(meta.mode())?;
        if actual != expected {
            return Err(FsError::KindMismatch {
                path: location,
                expected,
                actual,
            });
        }
        Ok(Self { location, mutable })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub(crate) fn set_mutable(&mut self, mutable: bool) {
        self.mutable = mutable;
    }

    pub(crate) fn set_location(&mut self, location: PathBuf) {
        self.location = location;
    }

    /// The mutation guard: every mutating operation calls this first.
    pub(crate) fn ensure_mutable(&self) -> FsResult<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(FsError::Immutable {
                path: self.location.clone(),
            })
        }
    }
}

/// The contract shared by every node kind.
///
/// Suspending forms are the primary API; blocking forms carry a `_sync`
/// suffix and produce the same results and the same errors. Note: not
/// `dyn`-compatible because of the generic methods; use [`AnyNode`] where a
/// kind-erased value is needed.
#[async_trait]
pub trait Node: Send + Sync {
    fn handle(&self) -> &NodeHandle;

    /// The static kind this type represents.
    fn kind(&self) -> NodeKind;

    /// Absolute, resolved location of this node.
    fn location(&self) -> &Path {
        self.handle().location()
    }

    /// Final path component, empty for the filesystem root.
    fn name(&self) -> String {
        self.location()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Number of path components below the filesystem root.
    fn depth(&self) -> usize {
        self.location()
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    }

    /// Pure path concatenation relative to this node; no I/O.
    fn join<I, S>(&self, segments: I) -> PathBuf
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut out = self.location().to_path_buf();
        for segment in segments {
            out.push(segment.as_ref());
        }
        out
    }

    fn is_mutable(&self) -> bool {
        self.handle().is_mutable()
    }

    /// Raw lstat metadata for this node's location.
    fn metadata_sync(&self) -> FsResult<Metadata> {
        Ok(std::fs::symlink_metadata(self.location())?)
    }

    async fn metadata(&self) -> FsResult<Metadata> {
        Ok(tokio::fs::symlink_metadata(self.location()).await?)
    }

    /// True only if the path exists *and* still holds an entry of this
    /// node's kind. Not-found and permission-denied both read as false.
    fn exists_sync(&self) -> FsResult<bool> {
        match std::fs::symlink_metadata(self.location()) {
            Ok(meta) => Ok(NodeKind::from_mode(meta.mode()).ok() == Some(self.kind())),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self) -> FsResult<bool> {
        match tokio::fs::symlink_metadata(self.location()).await {
            Ok(meta) => Ok(NodeKind::from_mode(meta.mode()).ok() == Some(self.kind())),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Immediate containing directory; the root is its own parent.
    fn parent_sync(&self) -> FsResult<Folder> {
        let parent = self.location().parent().unwrap_or_else(|| self.location());
        Folder::open_sync(parent)
    }

    async fn parent(&self) -> FsResult<Folder> {
        let parent = self.location().parent().unwrap_or_else(|| self.location());
        Folder::open(parent).await
    }

    /// All containing directories, nearest first, ending at the root.
    fn ancestors_sync(&self) -> FsResult<Vec<Folder>> {
        let mut out = Vec::new();
        let mut current = self.parent_sync()?;
        loop {
            let next = current.parent_sync()?;
            let at_root = next.location() == current.location();
            out.push(current);
            if at_root {
                return Ok(out);
            }
            current = next;
        }
    }

    async fn ancestors(&self) -> FsResult<Vec<Folder>> {
        let mut out = Vec::new();
        let mut current = self.parent().await?;
        loop {
            let next = current.parent().await?;
            let at_root = next.location() == current.location();
            out.push(current);
            if at_root {
                return Ok(out);
            }
            current = next;
        }
    }

    fn is_accessible_sync(&self, mode: AccessMode) -> FsResult<bool> {
        access_probe(self.location(), mode)
    }

    async fn is_accessible(&self, mode: AccessMode) -> FsResult<bool> {
        let path = self.location().to_path_buf();
        match tokio::task::spawn_blocking(move || access_probe(&path, mode)).await {
            Ok(result) => result,
            Err(join) => Err(io::Error::other(join).into()),
        }
    }

    /// Suspend until `is_accessible(mode)` turns true. Returns `Ok(false)`
    /// when the token fires first; cancellation is a normal end-of-wait, not
    /// an error.
    async fn wait_until_accessible(
        &self,
        mode: AccessMode,
        cancel: &CancellationToken,
    ) -> FsResult<bool> {
        self.wait_until_accessible_with(mode, cancel, |_| {}).await
    }

    /// Like [`Node::wait_until_accessible`], invoking `on_attempt` for every
    /// change notification whose re-check still came up inaccessible.
    async fn wait_until_accessible_with<F>(
        &self,
        mode: AccessMode,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> FsResult<bool>
    where
        F: FnMut(&Change) + Send,
    {
        if self.is_accessible(mode).await? {
            return Ok(true);
        }
        let mut watcher = PathWatcher::new(self.location());
        loop {
            // Biased: a token that fired must win over a pending change, so
            // no notification is processed past cancellation.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                change = watcher.next_change() => {
                    if self.is_accessible(mode).await? {
                        return Ok(true);
                    }
                    on_attempt(&change);
                }
            }
        }
    }

    fn wait_until_accessible_sync(
        &self,
        mode: AccessMode,
        cancel: &CancellationToken,
    ) -> FsResult<bool> {
        self.wait_until_accessible_with_sync(mode, cancel, |_| {})
    }

    fn wait_until_accessible_with_sync<F>(
        &self,
        mode: AccessMode,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> FsResult<bool>
    where
        F: FnMut(&Change),
    {
        if self.is_accessible_sync(mode)? {
            return Ok(true);
        }
        let mut watcher = PathWatcher::new(self.location());
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            if let Some(change) = watcher.poll_once() {
                if self.is_accessible_sync(mode)? {
                    return Ok(true);
                }
                on_attempt(&change);
            }
            std::thread::sleep(watcher.period());
        }
    }

    /// Deliver change notifications for this node's path until the token
    /// fires.
    async fn watch<F>(&self, cancel: &CancellationToken, mut on_change: F)
    where
        F: FnMut(&Change) + Send,
    {
        let mut watcher = PathWatcher::new(self.location());
        loop {
            // Biased for the same reason as in wait_until_accessible_with.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                change = watcher.next_change() => on_change(&change),
            }
        }
    }

    fn watch_sync<F>(&self, cancel: &CancellationToken, mut on_change: F)
    where
        F: FnMut(&Change),
    {
        let mut watcher = PathWatcher::new(self.location());
        while !cancel.is_cancelled() {
            if let Some(change) = watcher.poll_once() {
                on_change(&change);
            }
            std::thread::sleep(watcher.period());
        }
    }

    /// Remove this node from disk. The instance goes stale afterwards; only
    /// `exists` remains meaningful on it.
    async fn delete(&mut self) -> FsResult<()>;
    fn delete_sync(&mut self) -> FsResult<()>;

    /// Rename within the current parent directory, updating `location`.
    async fn rename_to(&mut self, new_name: &str) -> FsResult<()>;
    fn rename_to_sync(&mut self, new_name: &str) -> FsResult<()>;

    /// Atomic rename into `dest`, keeping this node's name. An existing
    /// destination entry is overwritten.
    async fn move_into(&mut self, dest: &Folder) -> FsResult<()>;
    fn move_into_sync(&mut self, dest: &Folder) -> FsResult<()>;

    /// Copy into `dest` under this node's name, returning a new node at the
    /// destination. `self` is untouched.
    async fn copy_into(&self, dest: &Folder) -> FsResult<Self>
    where
        Self: Sized;
    fn copy_into_sync(&self, dest: &Folder) -> FsResult<Self>
    where
        Self: Sized;
}

/// Kind-erased node, produced by the factory when the caller does not know
/// the kind in advance (directory listings, symlink targets).
#[derive(Debug)]
pub enum AnyNode {
    File(File),
    Folder(Folder),
    Symlink(SymbolicLink),
    BlockDevice(BlockDevice),
    CharDevice(CharDevice),
    Fifo(FifoNode),
    Socket(SocketNode),
}

impl AnyNode {
    /// Factory construction: classify the entry at `path`, then build the
    /// matching concrete kind.
    pub fn open_sync(path: impl AsRef<Path>) -> FsResult<AnyNode> {
        let location = absolutize(path.as_ref())?;
        let meta = std::fs::symlink_metadata(&location)?;
        let kind = NodeKind::from_mode(meta.mode())?;
        Ok(Self::assemble(location, kind))
    }

    /// Suspending form of [`AnyNode::open_sync`].
    pub async fn open(path: impl AsRef<Path> + Send) -> FsResult<AnyNode> {
        let location = absolutize(path.as_ref())?;
        let meta = tokio::fs::symlink_metadata(&location).await?;
        let kind = NodeKind::from_mode(meta.mode())?;
        Ok(Self::assemble(location, kind))
    }

    fn assemble(location: PathBuf, kind: NodeKind) -> AnyNode {
        match kind {
            NodeKind::RegularFile => {
                AnyNode::File(File::from_handle(NodeHandle::from_parts(location, true)))
            }
            NodeKind::Directory => {
                AnyNode::Folder(Folder::from_handle(NodeHandle::from_parts(location, true)))
            }
            NodeKind::SymbolicLink => AnyNode::Symlink(SymbolicLink::from_handle(
                NodeHandle::from_parts(location, true),
            )),
            NodeKind::BlockDevice => {
                AnyNode::BlockDevice(BlockDevice::from_handle(NodeHandle::from_parts(
                    location, false,
                )))
            }
            NodeKind::CharacterDevice => {
                AnyNode::CharDevice(CharDevice::from_handle(NodeHandle::from_parts(
                    location, false,
                )))
            }
            NodeKind::Fifo => {
                AnyNode::Fifo(FifoNode::from_handle(NodeHandle::from_parts(location, false)))
            }
            NodeKind::Socket => AnyNode::Socket(SocketNode::from_handle(NodeHandle::from_parts(
                location, false,
            ))),
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            AnyNode::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            AnyNode::Folder(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_symlink(&self) -> Option<&SymbolicLink> {
        match self {
            AnyNode::Symlink(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            AnyNode::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_folder(self) -> Option<Folder> {
        match self {
            AnyNode::Folder(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_symlink(self) -> Option<SymbolicLink> {
        match self {
            AnyNode::Symlink(s) => Some(s),
            _ => None,
        }
    }
}

#[async_trait]
impl Node for AnyNode {
    fn handle(&self) -> &NodeHandle {
        match self {
            AnyNode::File(n) => n.handle(),
            AnyNode::Folder(n) => n.handle(),
            AnyNode::Symlink(n) => n.handle(),
            AnyNode::BlockDevice(n) => n.handle(),
            AnyNode::CharDevice(n) => n.handle(),
            AnyNode::Fifo(n) => n.handle(),
            AnyNode::Socket(n) => n.handle(),
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            AnyNode::File(n) => n.kind(),
            AnyNode::Folder(n) => n.kind(),
            AnyNode::Symlink(n) => n.kind(),
            AnyNode::BlockDevice(n) => n.kind(),
            AnyNode::CharDevice(n) => n.kind(),
            AnyNode::Fifo(n) => n.kind(),
            AnyNode::Socket(n) => n.kind(),
        }
    }

    async fn delete(&mut self) -> FsResult<()> {
        match self {
            AnyNode::File(n) => n.delete().await,
            AnyNode::Folder(n) => n.delete().await,
            AnyNode::Symlink(n) => n.delete().await,
            AnyNode::BlockDevice(n) => n.delete().await,
            AnyNode::CharDevice(n) => n.delete().await,
            AnyNode::Fifo(n) => n.delete().await,
            AnyNode::Socket(n) => n.delete().await,
        }
    }

    fn delete_sync(&mut self) -> FsResult<()> {
        match self {
            AnyNode::File(n) => n.delete_sync(),
            AnyNode::Folder(n) => n.delete_sync(),
            AnyNode::Symlink(n) => n.delete_sync(),
            AnyNode::BlockDevice(n) => n.delete_sync(),
            AnyNode::CharDevice(n) => n.delete_sync(),
            AnyNode::Fifo(n) => n.delete_sync(),
            AnyNode::Socket(n) => n.delete_sync(),
        }
    }

    async fn rename_to(&mut self, new_name: &str) -> FsResult<()> {
        match self {
            AnyNode::File(n) => n.rename_to(new_name).await,
            AnyNode::Folder(n) => n.rename_to(new_name).await,
            AnyNode::Symlink(n) => n.rename_to(new_name).await,
            AnyNode::BlockDevice(n) => n.rename_to(new_name).await,
            AnyNode::CharDevice(n) => n.rename_to(new_name).await,
            AnyNode::Fifo(n) => n.rename_to(new_name).await,
            AnyNode::Socket(n) => n.rename_to(new_name).await,
        }
    }

    fn rename_to_sync(&mut self, new_name: &str) -> FsResult<()> {
        match self {
            AnyNode::File(n) => n.rename_to_sync(new_name),
            AnyNode::Folder(n) => n.rename_to_sync(new_name),
            AnyNode::Symlink(n) => n.rename_to_sync(new_name),
            AnyNode::BlockDevice(n) => n.rename_to_sync(new_name),
            AnyNode::CharDevice(n) => n.rename_to_sync(new_name),
            AnyNode::Fifo(n) => n.rename_to_sync(new_name),
            AnyNode::Socket(n) => n.rename_to_sync(new_name),
        }
    }

    async fn move_into(&mut self, dest: &Folder) -> FsResult<()> {
        match self {
            AnyNode::File(n) => n.move_into(dest).await,
            AnyNode::Folder(n) => n.move_into(dest).await,
            AnyNode::Symlink(n) => n.move_into(dest).await,
            AnyNode::BlockDevice(n) => n.move_into(dest).await,
            AnyNode::CharDevice(n) => n.move_into(dest).await,
            AnyNode::Fifo(n) => n.move_into(dest).await,
            AnyNode::Socket(n) => n.move_into(dest).await,
        }
    }

    fn move_into_sync(&mut self, dest: &Folder) -> FsResult<()> {
        match self {
            AnyNode::File(n) => n.move_into_sync(dest),
            AnyNode::Folder(n) => n.move_into_sync(dest),
            AnyNode::Symlink(n) => n.move_into_sync(dest),
            AnyNode::BlockDevice(n) => n.move_into_sync(dest),
            AnyNode::CharDevice(n) => n.move_into_sync(dest),
            AnyNode::Fifo(n) => n.move_into_sync(dest),
            AnyNode::Socket(n) => n.move_into_sync(dest),
        }
    }

    async fn copy_into(&self, dest: &Folder) -> FsResult<AnyNode> {
        match self {
            AnyNode::File(n) => Ok(AnyNode::File(n.copy_into(dest).await?)),
            AnyNode::Folder(n) => Ok(AnyNode::Folder(n.copy_into(dest).await?)),
            AnyNode::Symlink(n) => Ok(AnyNode::Symlink(n.copy_into(dest).await?)),
            AnyNode::BlockDevice(n) => Ok(AnyNode::BlockDevice(n.copy_into(dest).await?)),
            AnyNode::CharDevice(n) => Ok(AnyNode::CharDevice(n.copy_into(dest).await?)),
            AnyNode::Fifo(n) => Ok(AnyNode::Fifo(n.copy_into(dest).await?)),
            AnyNode::Socket(n) => Ok(AnyNode::Socket(n.copy_into(dest).await?)),
        }
    }

    fn copy_into_sync(&self, dest: &Folder) -> FsResult<AnyNode> {
        match self {
            AnyNode::File(n) => Ok(AnyNode::File(n.copy_into_sync(dest)?)),
            AnyNode::Folder(n) => Ok(AnyNode::Folder(n.copy_into_sync(dest)?)),
            AnyNode::Symlink(n) => Ok(AnyNode::Symlink(n.copy_into_sync(dest)?)),
            AnyNode::BlockDevice(n) => Ok(AnyNode::BlockDevice(n.copy_into_sync(dest)?)),
            AnyNode::CharDevice(n) => Ok(AnyNode::CharDevice(n.copy_into_sync(dest)?)),
            AnyNode::Fifo(n) => Ok(AnyNode::Fifo(n.copy_into_sync(dest)?)),
            AnyNode::Socket(n) => Ok(AnyNode::Socket(n.copy_into_sync(dest)?)),
        }
    }
}
