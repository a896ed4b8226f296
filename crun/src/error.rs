//! Error types for container filesystem assembly and process lifecycle.

/// Result type for `crun` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by container assembly, launch, and stop/GC operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input: an empty `argv`, or similar caller-supplied defect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A container's pid file, or other expected artifact, is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// `run` was invoked without effective uid 0.
    #[error("must run as root (effective uid 0)")]
    Privilege,

    /// A filesystem operation (mkdir/mount/mknod/rename/read/write/unmount)
    /// failed.
    #[error("filesystem: {0}")]
    Filesystem(String),

    /// The child process failed to spawn, or its pid file could not be
    /// written (in which case the orphaned child is SIGKILLed before this
    /// error is returned).
    #[error("child process failed: {0}")]
    ChildFailed(String),

    /// An OCI image/store operation failed underneath a container
    /// operation (e.g. `run` resolving the image's manifest).
    #[error(transparent)]
    Oci(#[from] crun_oci::Error),

    /// A filesystem operation failed via `std::io`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
