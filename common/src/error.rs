use thiserror::Error;

/// Failure taxonomy shared by settings loading and layer resolution.
///
/// Only `OutOfMemory` is fatal to the enclosing operation; every other
/// variant means "this input is absent or unusable" and callers degrade to
/// running without it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoaderError {
    /// The requested input does not exist
    #[error("not found")]
    NotFound,
    /// The input exists but is structurally malformed
    #[error("malformed input")]
    Invalid,
    /// The input declares intent but cannot be put into effect
    #[error("initialization failed")]
    InitializationFailed,
    /// Allocation failure; propagated immediately, never downgraded
    #[error("out of memory")]
    OutOfMemory,
}

pub type LoaderResult<T> = Result<T, LoaderError>;
