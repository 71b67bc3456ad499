//! Inert node kinds: block/character devices, fifos, sockets.
//!
//! These exist so that directory listings and the factory can represent every
//! entry a directory may hold. They are identity-only: permanently immutable,
//! and every mutating operation fails with `Unsupported` naming the concrete
//! kind and path, leaving the disk untouched.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{FsError, FsResult};
use crate::folder::Folder;
use crate::kind::NodeKind;
use crate::node::{Node, NodeHandle};

/// Marker class tying a [`Device`] instantiation to one inert kind.
pub trait DeviceClass: Send + Sync + 'static {
    const KIND: NodeKind;
}

#[derive(Debug, Clone, Copy)]
pub struct Block;
#[derive(Debug, Clone, Copy)]
pub struct Char;
#[derive(Debug, Clone, Copy)]
pub struct Fifo;
#[derive(Debug, Clone, Copy)]
pub struct Socket;

impl DeviceClass for Block {
    const KIND: NodeKind = NodeKind::BlockDevice;
}
impl DeviceClass for Char {
    const KIND: NodeKind = NodeKind::CharacterDevice;
}
impl DeviceClass for Fifo {
    const KIND: NodeKind = NodeKind::Fifo;
}
impl DeviceClass for Socket {
    const KIND: NodeKind = NodeKind::Socket;
}

/// An inert node of class `C`. Frozen at construction: `mutable` is false
/// and cannot be flipped.
#[derive(Debug, Clone)]
pub struct Device<C: DeviceClass> {
    node: NodeHandle,
    _class: PhantomData<C>,
}

pub type BlockDevice = Device<Block>;
pub type CharDevice = Device<Char>;
pub type FifoNode = Device<Fifo>;
pub type SocketNode = Device<Socket>;

impl<C: DeviceClass> Device<C> {
    /// Open an existing entry of this class. Fails with `KindMismatch` if
    /// the on-disk kind differs.
    pub fn open_sync(path: impl AsRef<Path>) -> FsResult<Self> {
        let node = NodeHandle::open_sync(path.as_ref(), C::KIND, false)?;
        Ok(Self {
            node,
            _class: PhantomData,
        })
    }

    /// Suspending form of [`Device::open_sync`].
    pub async fn open(path: impl AsRef<Path> + Send) -> FsResult<Self> {
        let node = NodeHandle::open(path.as_ref(), C::KIND, false).await?;
        Ok(Self {
            node,
            _class: PhantomData,
        })
    }

    pub(crate) fn from_handle(node: NodeHandle) -> Self {
        Self {
            node,
            _class: PhantomData,
        }
    }

    fn refuse<T>(&self, op: &'static str) -> FsResult<T> {
        Err(FsError::Unsupported {
            kind: C::KIND,
            op,
            path: self.node.location().to_path_buf(),
        })
    }
}

#[async_trait]
impl<C: DeviceClass> Node for Device<C> {
    fn handle(&self) -> &NodeHandle {
        &self.node
    }

    fn kind(&self) -> NodeKind {
        C::KIND
    }

    async fn delete(&mut self) -> FsResult<()> {
        self.refuse("delete")
    }

    fn delete_sync(&mut self) -> FsResult<()> {
        self.refuse("delete")
    }

    async fn rename_to(&mut self, _new_name: &str) -> FsResult<()> {
        self.refuse("rename")
    }

    fn rename_to_sync(&mut self, _new_name: &str) -> FsResult<()> {
        self.refuse("rename")
    }

    async fn move_into(&mut self, _dest: &Folder) -> FsResult<()> {
        self.refuse("move")
    }

    fn move_into_sync(&mut self, _dest: &Folder) -> FsResult<()> {
        self.refuse("move")
    }

    async fn copy_into(&self, _dest: &Folder) -> FsResult<Self> {
        self.refuse("copy")
    }

    fn copy_into_sync(&self, _dest: &Folder) -> FsResult<Self> {
        self.refuse("copy")
    }
}
