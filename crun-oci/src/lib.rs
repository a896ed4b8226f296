//! OCI image acquisition and content-addressed store for the `crun`
//! container runtime.
//!
//! This crate covers components A-E of the runtime's design: path/archive
//! utilities, the OCI codec, the on-disk store layout, the registry client,
//! and the pull orchestrator that drives the three together.

pub mod codec;
pub mod error;
pub mod fsutil;
pub mod log;
pub mod pull;
pub mod reference;
pub mod registry;
pub mod store;

pub use codec::{Descriptor, HostPlatform, ImageConfig, Index, Manifest, Platform};
pub use error::{Error, Result};
pub use log::{EventLog, Field, Silent, StatusSink};
pub use pull::pull;
pub use reference::{digest_hex, Reference};
pub use registry::Registry;
pub use store::Store;
