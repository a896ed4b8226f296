//! Container listing: enumerates `containers/*/pid`, classifying each by
//! liveness.

use nix::sys::signal;
use nix::unistd::Pid;

use crate::error::Result;
use crun_oci::Store;

/// A live status classification: `running` if `kill(pid, 0)` succeeds,
/// `exited` if it reports `ESRCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The process named by the pid file is still alive.
    Running,
    /// The pid file names a process that no longer exists.
    Exited,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Running => "running",
            Self::Exited => "exited",
        })
    }
}

/// One row of `ps` output.
#[derive(Debug, Clone)]
pub struct ContainerRow {
    /// The 12-hex container id.
    pub id: String,
    /// The `"repo:tag"` reference the container was started from.
    pub image: String,
    /// The pid recorded in the container's pid file.
    pub pid: i32,
    /// `running` or `exited`, per [`Status`].
    pub status: Status,
}

/// Enumerates `containers/*/pid`, parses the pid, classifies status by
/// `kill(pid, 0)`, and pairs each row with the container's `image` file
/// contents.
pub fn ps(store: &Store) -> Result<Vec<ContainerRow>> {
    let containers_dir = store.root_dir().join("containers");
    let mut rows = Vec::new();

    let Ok(entries) = std::fs::read_dir(&containers_dir) else {
        return Ok(rows);
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        let pid_path = entry.path().join("pid");
        let Ok(pid_contents) = std::fs::read_to_string(&pid_path) else {
            continue;
        };
        let Ok(pid) = pid_contents.trim().parse::<i32>() else {
            continue;
        };
        let image = std::fs::read_to_string(entry.path().join("image"))
            .unwrap_or_default()
            .trim()
            .to_owned();

        let status = match signal::kill(Pid::from_raw(pid), None) {
            Err(nix::errno::Errno::ESRCH) => Status::Exited,
            _ => Status::Running,
        };

        rows.push(ContainerRow {
            id,
            image,
            pid,
            status,
        });
    }

    rows.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_classifies_dead_pid_as_exited() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store.init().unwrap();
        let container_dir = store.container_dir("abc123def456");
        std::fs::create_dir_all(&container_dir).unwrap();
        std::fs::write(container_dir.join("pid"), "999999").unwrap();
        std::fs::write(container_dir.join("image"), "nginx:1-alpine-perl").unwrap();

        let rows = ps(&store).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "abc123def456");
        assert_eq!(rows[0].image, "nginx:1-alpine-perl");
        assert_eq!(rows[0].status, Status::Exited);
    }

    #[test]
    fn ps_on_empty_store_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store.init().unwrap();
        assert!(ps(&store).unwrap().is_empty());
    }
}
