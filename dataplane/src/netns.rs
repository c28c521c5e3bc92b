// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network namespace manipulation

#![allow(missing_docs)]

use nix::fcntl::OFlag;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::stat::Mode;
use std::future::Future;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use tracing::error;

use crate::errors::DataplaneError;
use crate::outcome::PrimitiveOutcome;

/// Directory `ip netns` and this daemon both use to track named namespaces as bind-mounted
/// files, so namespaces created here are visible to `ip netns` and vice versa.
const NETNS_DIR: &str = "/var/run/netns";

/// Run an (async) function or closure in another network namespace.
///
/// This method will spawn a new thread and create a thread local tokio runtime to execute the
/// provided method.
///
/// # Panics
///
/// * If we are unable to spawn a new thread
/// * If we are unable to create a tokio runtime
/// * If the provided function / closure panics
/// * If the provided netns path is not legal Unicode
pub fn in_netns<
    Exec: (FnOnce() -> Fut) + Send + 'static,
    Fut: Future<Output = Out> + Send,
    Out: Send + 'static,
>(
    netns: &Path,
    exec: Exec,
) -> Out {
    #[allow(clippy::expect_used)] // documented error case
    let netns_str = netns
        .to_str()
        .expect("netns path not legal unicode")
        .to_string();
    let thread_name = format!("netns-{netns_str}");
    #[allow(clippy::expect_used)]
    std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            #[allow(clippy::expect_used)] // the inability to swap to the other netns is fatal
            #[allow(unsafe_code)] // uses external linux FFI
            unsafe { swap_thread_to_netns(&netns_str) }.expect("failed to swap to netns");
            #[allow(clippy::expect_used)] // the inability to start tokio is fatal
            let tokio_runtime = tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()
                .expect("failed to build tokio runtime");
            tokio_runtime.block_on(exec())
        })
        .expect("failed to spawn netns thread")
        .join()
        .expect("failed to join netns thread")
}

/// Move the current thread to the (extant) network namespace located at `netns_path`.
///
/// # Errors
///
/// Returns a [`rtnetlink::Error`] in an `Err` variant in the event that
///
/// 1. the `unshare` syscall fails
/// 2. `open` fails on the `netns_path`
/// 3. the call to `setns` fails
///
/// Not that the current thread needs the `CAP_SYS_ADMIN` and `CAP_NET_ADMIN` capability in order to
/// run this method successfully.
///
/// # Safety
///
/// If the current thread is bound to network resources (e.g., open sockets), then this method will
/// exhibit undefined behavior.
#[allow(unsafe_code)] // documented rational
pub unsafe fn swap_thread_to_netns(netns_path: &String) -> Result<(), rtnetlink::Error> {
    let ns_path = Path::new(netns_path);

    if let Err(e) = nix::sched::unshare(CloneFlags::CLONE_NEWNET) {
        error!("{e}");
        if let Err(err) = nix::unistd::unlink(ns_path) {
            error!("{msg}", msg = err.desc());
        }
        return Err(rtnetlink::Error::NamespaceError(format!("{e}")));
    }

    let file_descriptor = match nix::fcntl::open(
        Path::new(netns_path),
        OFlag::O_RDONLY | OFlag::O_CLOEXEC,
        Mode::empty(),
    ) {
        Ok(raw_fd) => raw_fd,
        Err(e) => {
            error!("open error: {e}");
            let err_msg = format!("open error: {e}");
            return Err(rtnetlink::Error::NamespaceError(err_msg));
        }
    };

    if let Err(e) = nix::sched::setns(
        #[allow(unsafe_code)]
        unsafe {
            BorrowedFd::borrow_raw(file_descriptor.as_raw_fd())
        },
        CloneFlags::CLONE_NEWNET,
    ) {
        error!("setns error: {e}");
        let err_msg = format!("setns error: {e}");
        error!("{err_msg}");
        if let Err(err) = nix::unistd::unlink(ns_path) {
            error!("{msg}", msg = err.desc());
        }
        return Err(rtnetlink::Error::NamespaceError(err_msg));
    }
    Ok(())
}

/// Ensure a named, persistent network namespace exists at `/var/run/netns/<name>` (§4.3
/// `ns_ensure`), the same bind-mounted-file convention `ip netns add` uses.
///
/// Idempotent: if the namespace file already exists, this is a no-op.
///
/// # Errors
///
/// Returns [`DataplaneError::Namespace`] if the creation thread cannot be spawned, `unshare`
/// fails, or the bind mount fails; the partially-created target file is cleaned up on failure.
pub fn ns_ensure(name: &str) -> Result<PrimitiveOutcome, DataplaneError> {
    let dir = Path::new(NETNS_DIR);
    std::fs::create_dir_all(dir).map_err(|e| DataplaneError::io(dir.display().to_string(), e))?;

    let target = dir.join(name);
    if target.exists() {
        return Ok(PrimitiveOutcome::Unchanged);
    }
    std::fs::File::create(&target)
        .map_err(|e| DataplaneError::io(target.display().to_string(), e))?;

    let result = create_namespace_file(name.to_string(), target.clone());
    if let Err(reason) = result {
        let _ = std::fs::remove_file(&target);
        return Err(DataplaneError::Namespace {
            name: name.to_string(),
            reason,
        });
    }
    Ok(PrimitiveOutcome::Created)
}

/// Bind-mount a fresh network namespace onto `target`, in a dedicated thread so the calling
/// thread's own namespace is never touched (mirrors [`in_netns`]'s thread-swap pattern).
fn create_namespace_file(name: String, target: PathBuf) -> Result<(), String> {
    std::thread::Builder::new()
        .name(format!("netns-create-{name}"))
        .spawn(move || -> Result<(), String> {
            nix::sched::unshare(CloneFlags::CLONE_NEWNET).map_err(|e| e.to_string())?;
            nix::mount::mount(
                Some("/proc/self/ns/net"),
                &target,
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
            .map_err(|e| e.to_string())
        })
        .map_err(|e| e.to_string())?
        .join()
        .map_err(|_| "namespace creation thread panicked".to_string())?
}

/// Remove a namespace previously created by [`ns_ensure`] (§4.3 `ns_delete`).
///
/// Idempotent: removing a namespace that doesn't exist is a no-op.
///
/// # Errors
///
/// Returns [`DataplaneError::Namespace`] if the unmount fails for a reason other than "not
/// mounted", or [`DataplaneError::Io`] if the backing file cannot be removed.
pub fn ns_delete(name: &str) -> Result<PrimitiveOutcome, DataplaneError> {
    let target = Path::new(NETNS_DIR).join(name);
    if !target.exists() {
        return Ok(PrimitiveOutcome::Unchanged);
    }
    if let Err(e) = nix::mount::umount(&target) {
        if e != nix::errno::Errno::EINVAL {
            return Err(DataplaneError::Namespace {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }
    }
    std::fs::remove_file(&target).map_err(|e| DataplaneError::io(target.display().to_string(), e))?;
    Ok(PrimitiveOutcome::Changed)
}
