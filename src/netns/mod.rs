//! Network namespace pinned execution
//!
//! DNS resolution and ICMP probing have to happen from inside the target
//! container's network namespace while the process itself stays outside. Every
//! foreign-namespace operation therefore runs on a dedicated OS thread that
//! switches into the namespace, runs the closure, and switches back. The
//! tokio runtime's worker threads and the process's initial thread are never
//! switched.

use std::path::{Path, PathBuf};

use netns_rs::NetNs;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::NamespaceError;

/// Filesystem reference to a network namespace, such as `/proc/666/ns/net`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetnsRef {
    path: PathBuf,
}

impl NetnsRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The network namespace of the process with the given PID.
    pub fn from_pid(pid: i64) -> Self {
        Self::new(format!("/proc/{}/ns/net", pid))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for NetnsRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Runs `f` inside the referenced network namespace, or on a plain blocking
/// thread when `netns` is `None`.
///
/// The returned error reports namespace switching (infrastructure) failures
/// only; domain errors travel inside `f`'s own result type. A worker thread
/// whose namespace restore fails is retired: it is dedicated to this one
/// operation and terminates right after it, so a foreign namespace can never
/// leak into other work.
pub async fn execute<F, T>(netns: Option<&NetnsRef>, f: F) -> Result<T, NamespaceError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let Some(netns) = netns else {
        return tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| NamespaceError::WorkerFailed(e.to_string()));
    };

    let path = netns.path.clone();
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("netns-worker".into())
        .spawn(move || {
            let _ = tx.send(enter_and_run(&path, f));
        })
        .map_err(|e| NamespaceError::WorkerFailed(e.to_string()))?;
    rx.await
        .map_err(|_| NamespaceError::WorkerFailed("worker thread vanished".into()))?
}

/// Switches the calling thread into the namespace at `path`, runs `f`, and
/// attempts to switch back. Must only ever be called on a dedicated thread.
fn enter_and_run<F, T>(path: &Path, f: F) -> Result<T, NamespaceError>
where
    F: FnOnce() -> T,
{
    if !path.exists() {
        return Err(NamespaceError::NotFound(path.display().to_string()));
    }

    let origin = netns_rs::get_from_current_thread().map_err(classify_ns_error)?;
    // NetNs::get joins its default directory with the name; an absolute path
    // replaces the base, so full /proc/<pid>/ns/net references work here.
    let target = NetNs::get(path.display().to_string()).map_err(classify_ns_error)?;
    target.enter().map_err(classify_ns_error)?;

    let out = f();

    if let Err(e) = origin.enter() {
        // The thread dies right after this function returns and is never
        // handed any further work, so the foreign namespace cannot leak.
        warn!("cannot restore original network namespace, retiring thread: {e}");
    }
    Ok(out)
}

fn classify_ns_error(e: netns_rs::Error) -> NamespaceError {
    let msg = e.to_string();
    if msg.contains("Permission denied") || msg.contains("Operation not permitted") {
        NamespaceError::InsufficientPrivileges
    } else {
        NamespaceError::SwitchFailed(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netns_ref_from_pid() {
        let ns = NetnsRef::from_pid(666);
        assert_eq!(ns.path(), Path::new("/proc/666/ns/net"));
        assert_eq!(ns.to_string(), "/proc/666/ns/net");
    }

    #[tokio::test]
    async fn executes_without_namespace() {
        let out = execute(None, || 6 * 7).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn domain_results_pass_through() {
        let out: Result<Result<u32, String>, _> =
            execute(None, || Err::<u32, _>("domain error".to_string())).await;
        // infrastructure ok, domain error intact
        assert_eq!(out.unwrap(), Err("domain error".to_string()));
    }

    #[tokio::test]
    async fn missing_namespace_path_is_reported() {
        let ns = NetnsRef::new("/proc/0/ns/nonexistent");
        let err = execute(Some(&ns), || ()).await.unwrap_err();
        match err {
            NamespaceError::NotFound(path) => {
                assert_eq!(path, "/proc/0/ns/nonexistent");
            }
            other => panic!("expected NotFound, got: {other:?}"),
        }
    }
}
