//! Container assembler: id allocation, lower-dir construction, overlay
//! mount.

use std::path::{Path, PathBuf};

use nix::mount::{mount, MsFlags};
use rand::RngCore as _;

use crate::error::{Error, Result};
use crun_oci::{fsutil, Descriptor, Store};

/// Generates a 12-hex-character container id from 6 random bytes, retrying
/// if `containers/<id>` already exists under `store`.
pub fn new_container_id(store: &Store) -> Result<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..64 {
        let mut bytes = [0u8; 6];
        rng.fill_bytes(&mut bytes);
        let id = hex::encode(bytes);
        if !store.container_dir(&id).exists() {
            return Ok(id);
        }
    }
    Err(Error::InvalidArgument(
        "could not allocate a free container id after 64 attempts".into(),
    ))
}

/// Returns the `:`-joined list of `layers/<hex>` paths, in reverse
/// descriptor order (topmost layer first) — the ordering overlay requires
/// so that later layers shadow earlier ones.
pub fn construct_lower_dir(store: &Store, layers: &[Descriptor]) -> Result<String> {
    let mut parts = Vec::with_capacity(layers.len());
    for layer in layers.iter().rev() {
        let hex = crun_oci::digest_hex(&layer.digest)?;
        parts.push(store.layer_path(hex).to_string_lossy().into_owned());
    }
    Ok(parts.join(":"))
}

/// The directories that make up an assembled container filesystem.
#[derive(Debug, Clone)]
pub struct ContainerDirs {
    /// The container's root directory, `containers/<id>`.
    pub container_dir: PathBuf,
    /// The overlay's writable upper directory.
    pub upper: PathBuf,
    /// The overlay's work directory (kernel scratch space).
    pub work: PathBuf,
    /// The overlay's merged mountpoint — this is the container's rootfs.
    pub merged: PathBuf,
}

/// Ensures `upper`, `work`, `merged` exist under the container directory,
/// then performs an overlay mount with `lowerdir=<lowerdir>` onto `merged`.
/// On mount failure, the created directories are left in place (they are
/// harmless and idempotently reusable) but no partial mount is left mounted.
pub fn create_container_dirs(store: &Store, id: &str, lowerdir: &str) -> Result<ContainerDirs> {
    let container_dir = store.container_dir(id);
    let upper = container_dir.join("upper");
    let work = container_dir.join("work");
    let merged = container_dir.join("merged");

    fsutil::ensure_dir(&upper)?;
    fsutil::ensure_dir(&work)?;
    fsutil::ensure_dir(&merged)?;

    let options = format!(
        "lowerdir={lowerdir},upperdir={},workdir={}",
        upper.display(),
        work.display()
    );

    mount(
        Some("overlay"),
        &merged,
        Some("overlay"),
        MsFlags::empty(),
        Some(options.as_str()),
    )
    .map_err(|errno| Error::Filesystem(format!("overlay mount on {}: {errno}", merged.display())))?;

    Ok(ContainerDirs {
        container_dir,
        upper,
        work,
        merged,
    })
}

/// Replaces `rootfs/dev` with a fresh directory containing character
/// devices `null (1,3)`, `zero (1,5)`, `random (1,8)`, `urandom (1,9)`, each
/// mode 0666. Requires privilege (mknod).
pub fn setup_dev(rootfs: &Path) -> Result<()> {
    use nix::sys::stat::{mknod, Mode, SFlag};

    let dev = rootfs.join("dev");
    let _ = std::fs::remove_dir_all(&dev);
    fsutil::ensure_dir(&dev)?;

    let mode = Mode::from_bits_truncate(0o666);
    for (name, major, minor) in [
        ("null", 1, 3),
        ("zero", 1, 5),
        ("random", 1, 8),
        ("urandom", 1, 9),
    ] {
        let path = dev.join(name);
        let device = nix::sys::stat::makedev(major, minor);
        mknod(&path, SFlag::S_IFCHR, mode, device)
            .map_err(|errno| Error::Filesystem(format!("mknod {}: {errno}", path.display())))?;
    }
    Ok(())
}
