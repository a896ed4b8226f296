//! Container filesystem assembly and process lifecycle for the `crun`
//! container runtime.
//!
//! This crate covers components F-H of the runtime's design: the container
//! assembler (overlay mount, id allocation, `/dev` population), the
//! container launcher (argv construction, chroot + netns spawn, pid-file
//! discipline), and stop/GC (the SIGTERM→SIGKILL state machine, `ps`).
//! Image acquisition and the content-addressed store live in `crun-oci`;
//! image removal is a store-level operation and stays there too.

pub mod container;
pub mod error;
pub mod launch;
pub mod list;
pub mod stop;

pub use container::{construct_lower_dir, create_container_dirs, new_container_id, setup_dev, ContainerDirs};
pub use error::{Error, Result};
pub use launch::{build_process_args, run, RunOptions, RunResult};
pub use list::{ps, ContainerRow, Status};
pub use stop::stop;
