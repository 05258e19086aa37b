//! Error types for the object kernel and the containers.

use thiserror::Error;

/// Failure returned by a container mutation.
///
/// Every variant leaves the container exactly as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("container is immutable")]
    Immutable,
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("range {start}..{end} out of bounds for length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
    #[error("bounded container is full (capacity {max})")]
    CapacityExceeded { max: usize },
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },
}

/// Failure returned by the object kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("no class registered for id {0:?}")]
    UnknownClass(crate::class::ClassId),
    #[error("class name `{0}` is already registered")]
    DuplicateClassName(&'static str),
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },
}

/// A log mask string named a level that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level `{0}`")]
pub struct ParseMaskError(pub(crate) String);
