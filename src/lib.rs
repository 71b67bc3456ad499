//! nodefs: a typed node layer over the local Unix filesystem.
//!
//! Every filesystem entry is represented by a concrete node type: [`File`],
//! [`Folder`], [`SymbolicLink`], plus inert placeholders for devices, fifos,
//! and sockets, all satisfying the [`Node`] contract. The kind of an entry
//! is resolved from its on-disk mode bits, either explicitly via
//! [`NodeKind`] or implicitly via the [`AnyNode`] factory. Ephemeral
//! variants ([`TempFile`], [`TempFolder`], [`LiveFile`]) add scoped cleanup
//! and auto-reload on top.
//!
//! Every I/O operation comes in a suspending form (the default) and a
//! blocking `_sync` form with identical semantics.

pub mod device;
pub mod error;
pub mod file;
pub mod folder;
pub mod kind;
pub mod live;
pub mod node;
pub mod symlink;
pub mod temp;
pub mod watch;

// Re-export
pub use device::{BlockDevice, CharDevice, Device, DeviceClass, FifoNode, SocketNode};
pub use error::{FsError, FsResult};
pub use file::{ChunkIter, ChunkReader, DEFAULT_CHUNK_SIZE, File};
pub use folder::Folder;
pub use kind::NodeKind;
pub use live::LiveFile;
pub use node::{AccessMode, AnyNode, Node, NodeHandle};
pub use symlink::SymbolicLink;
pub use temp::{TempFile, TempFolder};
pub use watch::{Change, ChangeKind, DEFAULT_POLL_PERIOD, PathWatcher};
