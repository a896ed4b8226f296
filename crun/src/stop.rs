//! Stop state machine: SIGTERM with bounded wait, escalate to SIGKILL,
//! unmount, remove the container tree.

use std::thread::sleep;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::{Error, Result};
use crun_oci::{log::StatusSink, Store};

/// How long to poll after SIGTERM before escalating to SIGKILL.
const GRACE_PERIOD: Duration = Duration::from_secs(3);
/// Poll interval while waiting for the process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stops the container `id`: reads its pid file, sends SIGTERM, polls for
/// up to [`GRACE_PERIOD`], escalates to SIGKILL if still alive, then
/// removes the pid file, unmounts the overlay (tolerating `EINVAL`), and
/// removes the container directory tree. Idempotent: stopping an
/// already-stopped container cleans up residue and returns success.
pub fn stop(store: &Store, id: &str, status: &impl StatusSink) -> Result<()> {
    let container_dir = store.container_dir(id);
    let pid_path = container_dir.join("pid");

    let pid_contents = match std::fs::read_to_string(&pid_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("no pid file for container {id}")));
        }
        Err(e) => return Err(e.into()),
    };

    let pid: i32 = pid_contents
        .trim()
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("unparsable pid file for container {id}")))?;
    let pid = Pid::from_raw(pid);

    match signal::kill(pid, Signal::SIGTERM) {
        Ok(()) => {
            wait_for_exit(pid, status);
        }
        Err(Errno::ESRCH) => {
            status.warn(&format!("container {id} already gone"), &[]);
        }
        Err(e) => return Err(Error::Filesystem(format!("kill({pid}, SIGTERM): {e}"))),
    }

    cleanup(store, &container_dir, &pid_path)
}

/// Polls `kill(pid, 0)` every [`POLL_INTERVAL`] for up to [`GRACE_PERIOD`];
/// escalates to SIGKILL if the process is still alive afterward.
fn wait_for_exit(pid: Pid, status: &impl StatusSink) {
    let deadline = std::time::Instant::now() + GRACE_PERIOD;
    loop {
        match signal::kill(pid, None) {
            Err(Errno::ESRCH) => return,
            _ if std::time::Instant::now() >= deadline => break,
            _ => sleep(POLL_INTERVAL),
        }
    }
    status.warn(&format!("container did not exit within grace period, sending SIGKILL"), &[]);
    let _ = signal::kill(pid, Signal::SIGKILL);
}

/// Removes the pid file, unmounts `merged` (tolerating `EINVAL` as "not
/// mounted"), and removes the container directory tree.
fn cleanup(store: &Store, container_dir: &std::path::Path, pid_path: &std::path::Path) -> Result<()> {
    let _ = std::fs::remove_file(pid_path);

    let merged = container_dir.join("merged");
    match nix::mount::umount(&merged) {
        Ok(()) | Err(Errno::EINVAL) => {}
        Err(e) => return Err(Error::Filesystem(format!("umount {}: {e}", merged.display()))),
    }

    let _ = store;
    std::fs::remove_dir_all(container_dir).or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Ok(())
        } else {
            Err(Error::from(e))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crun_oci::log::Silent;

    #[test]
    fn stop_reports_not_found_without_pid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store.init().unwrap();
        let err = stop(&store, "abc123def456", &Silent).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn stop_rejects_unparsable_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store.init().unwrap();
        let container_dir = store.container_dir("abc123def456");
        std::fs::create_dir_all(&container_dir).unwrap();
        std::fs::write(container_dir.join("pid"), "not-a-pid").unwrap();
        let err = stop(&store, "abc123def456", &Silent).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn stop_cleans_up_already_gone_process() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store.init().unwrap();
        let container_dir = store.container_dir("abc123def456");
        std::fs::create_dir_all(&container_dir).unwrap();
        std::fs::create_dir_all(container_dir.join("merged")).unwrap();
        // A pid that is exceedingly unlikely to be alive in the test sandbox.
        std::fs::write(container_dir.join("pid"), "999999").unwrap();
        stop(&store, "abc123def456", &Silent).unwrap();
        assert!(!container_dir.exists());
    }
}
