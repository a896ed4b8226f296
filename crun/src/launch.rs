//! Container launcher: argv construction, chroot + optional
//! network-namespace spawn, pid-file discipline.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::os::unix::process::CommandExt as _;
use std::path::Path;
use std::process::{Command, Stdio};

use nix::unistd::Uid;

use crate::container::{construct_lower_dir, create_container_dirs, new_container_id, setup_dev};
use crate::error::{Error, Result};
use crun_oci::{fsutil, ImageConfig, Store};

/// Options accepted by [`run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// When true, the new-network-namespace flag is omitted and the
    /// container shares the host network stack.
    pub host_network: bool,
}

/// Concatenates `entrypoint` and `cmd` when `entrypoint` is non-empty, else
/// returns `cmd`. An empty result is refused.
pub fn build_process_args(entrypoint: &[String], cmd: &[String]) -> Result<Vec<String>> {
    let argv = if entrypoint.is_empty() {
        cmd.to_vec()
    } else {
        entrypoint.iter().chain(cmd.iter()).cloned().collect()
    };
    if argv.is_empty() {
        return Err(Error::InvalidArgument(
            "image config has no entrypoint and no cmd".into(),
        ));
    }
    Ok(argv)
}

/// The outcome of a successful [`run`]: enough to report to the caller and
/// to `ps`.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The allocated container id.
    pub id: String,
    /// The spawned child's pid.
    pub pid: u32,
}

/// Locates `image` in `store` (tag → manifest → layers + config), assembles
/// the overlay, populates `/dev`, builds argv from the image config, and
/// spawns the entrypoint chrooted into the merged rootfs. Requires
/// effective uid 0.
pub fn run(store: &Store, image: &str, reference: &crun_oci::Reference, options: RunOptions) -> Result<RunResult> {
    if !Uid::effective().is_root() {
        return Err(Error::Privilege);
    }

    let (_hex, manifest) = store.resolve(reference)?;
    let config_hex = crun_oci::digest_hex(&manifest.config.digest)?;
    let config_bytes = std::fs::read(store.blob_path(config_hex))?;
    let image_config: ImageConfig = crun_oci::codec::decode_image_config(&config_bytes)?;

    let argv = build_process_args(&image_config.runtime.entrypoint, &image_config.runtime.cmd)?;

    let id = new_container_id(store)?;
    let lowerdir = construct_lower_dir(store, &manifest.layers)?;
    let dirs = create_container_dirs(store, &id, &lowerdir)?;
    setup_dev(&dirs.merged)?;

    fsutil::ensure_file(&dirs.container_dir.join("image"))?;
    std::fs::write(dirs.container_dir.join("image"), image)?;

    let log_path = dirs.container_dir.join("log");
    let mut log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    writeln!(
        log_file,
        "Container started at {} | container-id: {id}",
        now_rfc3339(),
    )?;
    let log_for_child = log_file.try_clone()?;

    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .env_clear()
        .envs(parse_env(&image_config.runtime.env))
        .current_dir("/")
        .stdin(Stdio::null())
        .stdout(log_for_child.try_clone()?)
        .stderr(log_for_child);

    let merged = dirs.merged.clone();
    let host_network = options.host_network;

    // SAFETY: chroot/unshare/setsid/close_range are all async-signal-safe
    // syscalls, and this closure runs between fork and exec in the child
    // only, per `Command::pre_exec`'s contract.
    unsafe {
        command.pre_exec(move || pre_exec(&merged, host_network));
    }

    let child = command
        .spawn()
        .map_err(|e| Error::ChildFailed(format!("spawn {}: {e}", argv[0])))?;
    // Dropping `Child` does not kill or wait on the process; the container
    // is meant to outlive this call, so we simply stop tracking it here.
    let pid = child.id();
    drop(child);

    let pid_path = dirs.container_dir.join("pid");
    if let Err(e) = fsutil::atomic_save(&pid_path, pid.to_string().as_bytes()) {
        // SAFETY: pid is a plain libc::pid_t; kill is async-signal-safe and
        // side-effect-free to call here outside a signal handler.
        unsafe {
            libc::kill(i32::try_from(pid).unwrap_or(i32::MAX), libc::SIGKILL);
        }
        return Err(Error::ChildFailed(format!(
            "writing pid file: {e}"
        )));
    }

    Ok(RunResult { id, pid })
}

/// Runs inside the forked child, before `exec`: new process group, chroot
/// into the merged rootfs, optional new network namespace, FD cleanup.
fn pre_exec(merged: &Path, host_network: bool) -> std::io::Result<()> {
    // New process group: the container is detached from the parent's.
    nix::unistd::setsid().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    if !host_network {
        nix::sched::unshare(nix::sched::CloneFlags::CLONE_NEWNET)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    }

    nix::unistd::chroot(merged).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::env::set_current_dir("/")?;

    close_inherited_fds();

    Ok(())
}

/// Closes inherited file descriptors >= 3 before `exec`, mirroring typical
/// container-runtime pre-exec hardening (`close_range` where available).
fn close_inherited_fds() {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: close_range is async-signal-safe.
        let ret = unsafe { libc::syscall(libc::SYS_close_range, 3_u32, u32::MAX, 0_u32) };
        if ret == 0 {
            return;
        }
    }
    // SAFETY: sysconf is async-signal-safe.
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max = if max > 0 { max as i32 } else { 1024 };
    for fd in 3..max {
        // SAFETY: close is async-signal-safe; closing an already-closed fd
        // is a harmless EBADF.
        unsafe {
            libc::close(fd);
        }
    }
}

/// Parses `K=V` environment entries.
fn parse_env(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// The current instant, formatted as RFC3339, for the container log's
/// header line.
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_process_args_prefers_entrypoint() {
        let entrypoint = vec!["e0".to_string(), "e1".to_string()];
        let cmd = vec!["c0".to_string()];
        assert_eq!(
            build_process_args(&entrypoint, &cmd).unwrap(),
            vec!["e0", "e1", "c0"]
        );
    }

    #[test]
    fn build_process_args_falls_back_to_cmd() {
        let cmd = vec!["c0".to_string(), "c1".to_string()];
        assert_eq!(build_process_args(&[], &cmd).unwrap(), vec!["c0", "c1"]);
    }

    #[test]
    fn build_process_args_rejects_empty() {
        assert!(build_process_args(&[], &[]).is_err());
    }

    #[test]
    fn parse_env_splits_on_first_equals() {
        let env = vec!["A=B".to_string(), "C=D=E".to_string(), "malformed".to_string()];
        let parsed = parse_env(&env);
        assert_eq!(parsed[0], ("A".to_string(), "B".to_string()));
        assert_eq!(parsed[1], ("C".to_string(), "D=E".to_string()));
        assert_eq!(parsed.len(), 2);
    }
}
