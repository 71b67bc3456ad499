use std::path::PathBuf;

use thiserror::Error;

use crate::kind::NodeKind;

#[derive(Debug, Error)]
pub enum FsError {
    /// A concrete node type was constructed at a path whose on-disk kind
    /// differs from the type's own kind.
    #[error("kind mismatch at {}: expected {expected}, found {actual}", path.display())]
    KindMismatch {
        path: PathBuf,
        expected: NodeKind,
        actual: NodeKind,
    },

    /// The file-type bits of a mode match none of the seven known kinds.
    #[error("unrecognized file mode {mode:#o}")]
    UnknownKind { mode: u32 },

    /// A mutating call on a node whose `mutable` flag is false.
    #[error("node at {} is immutable", path.display())]
    Immutable { path: PathBuf },

    /// A mutating call on a device, fifo, or socket node.
    #[error("{kind} node at {} does not support {op}", path.display())]
    Unsupported {
        kind: NodeKind,
        op: &'static str,
        path: PathBuf,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FsResult<T> = Result<T, FsError>;
