//! Error types for image acquisition and the content-addressed store.

/// Result type for `crun-oci` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by OCI image and store operations.
///
/// `InvalidReference` and `NotFound` cover malformed or missing references;
/// `AlreadyExists` covers one-time setup state that's already present;
/// `Transport` covers registry HTTP failures; `Codec` covers JSON/base64
/// decode failures; `Filesystem` covers path-precondition and extraction
/// safety violations that aren't a bare `io::Error`; `Io` wraps the rest.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The image reference string could not be parsed.
    #[error("invalid image reference {0:?}: {1}")]
    InvalidReference(String, &'static str),

    /// A tag, manifest, or digest was not found locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Something that is meant to be created once already exists (e.g. the
    /// config file `init` is about to write).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The image is referenced by one or more running containers.
    #[error("image {image} is in use by container {container_id} (stop it first)")]
    InUse {
        /// The image reference, e.g. `"nginx:1-alpine-perl"`.
        image: String,
        /// The first container id found using this image.
        container_id: String,
    },

    /// A registry HTTP request failed or returned an unexpected status.
    #[error("registry: {0}")]
    Transport(String),

    /// JSON or base64 decoding failed.
    #[error("codec: {0}")]
    Codec(String),

    /// A filesystem precondition was violated: a path that should be a
    /// directory (or shouldn't be) is the wrong kind, a tar entry would
    /// escape its extraction root, or another mkdir/rename/read/write-level
    /// failure occurred that isn't a bare `io::Error`.
    #[error("filesystem: {0}")]
    Filesystem(String),

    /// A filesystem operation failed via `std::io`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
