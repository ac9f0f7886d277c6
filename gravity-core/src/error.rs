use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the simulation core.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller supplied a value outside its valid domain
    /// (non-positive mass or density, bad configuration).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A worker was asked to change phase or assignment while busy.
    ///
    /// The engine never does this on its own; seeing this error means the
    /// master/worker protocol was broken.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A persisted snapshot could not be decoded. No state was modified.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A worker thread panicked or left one of its locks poisoned.
    #[error("worker {0} is no longer responsive")]
    WorkerLost(usize),

    /// Propagated I/O errors (thread spawn, snapshot streams).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
