// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NAT64 instance binding (`nat64_instance_ensure`/`_remove`, §4.3).
//!
//! No crate in the pack models the Jool NAT64 kernel module's control plane, so this shells out
//! to the `jool` CLI the same way the teacher's process-supervision code wraps external
//! binaries: format the argv, run it, check the exit status, and classify "already (not) bound"
//! as success rather than an error so the primitive stays idempotent.

use std::net::Ipv6Addr;

use tokio::process::Command;
use tracing::trace;

use crate::errors::{DataplaneError, DataplaneResult};
use crate::outcome::PrimitiveOutcome;

/// The NAT64 /96 pool bound to a network instance's namespace.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Nat64Pool {
    /// The NAT64 prefix, always a /96.
    pub prefix: Ipv6Addr,
}

async fn jool(instance: &str, args: &[&str]) -> DataplaneResult<std::process::Output> {
    let mut full_args = vec!["-i", instance];
    full_args.extend_from_slice(args);
    let display = format!("jool {}", full_args.join(" "));
    trace!(command = %display, "exec");
    Command::new("jool")
        .args(&full_args)
        .output()
        .await
        .map_err(|e| DataplaneError::command(display, e.to_string()))
}

/// Bind the NAT64 instance for network instance `instance` to `pool`, creating it if absent.
///
/// Idempotent: if the instance is already bound with this pool, this is a no-op; if it's bound
/// with a different pool, the pool is replaced.
///
/// # Errors
///
/// Returns [`DataplaneError::ExternalCommand`] if `jool` cannot be spawned or reports a failure
/// other than "instance already exists with this pool".
pub async fn nat64_instance_ensure(
    instance: &str,
    pool: Nat64Pool,
) -> DataplaneResult<PrimitiveOutcome> {
    let pool_arg = format!("{}/96", pool.prefix);

    let add = jool(instance, &["instance", "add", "--netfilter", "--pool6", &pool_arg]).await?;
    if add.status.success() {
        return Ok(PrimitiveOutcome::Created);
    }
    let stderr = String::from_utf8_lossy(&add.stderr);
    if !stderr.contains("already exists") {
        return Err(DataplaneError::command(
            format!("jool -i {instance} instance add"),
            stderr.trim().to_string(),
        ));
    }

    let current = jool(instance, &["pool6", "display"]).await?;
    if String::from_utf8_lossy(&current.stdout).contains(&pool_arg) {
        return Ok(PrimitiveOutcome::Unchanged);
    }

    let replace = jool(instance, &["pool6", "update", &pool_arg]).await?;
    if replace.status.success() {
        Ok(PrimitiveOutcome::Changed)
    } else {
        Err(DataplaneError::command(
            format!("jool -i {instance} pool6 update"),
            String::from_utf8_lossy(&replace.stderr).trim().to_string(),
        ))
    }
}

/// Unbind the NAT64 instance for network instance `instance`.
///
/// Idempotent: removing an instance that doesn't exist is success.
///
/// # Errors
///
/// Returns [`DataplaneError::ExternalCommand`] if `jool` cannot be spawned or reports a failure
/// other than "instance doesn't exist".
pub async fn nat64_instance_remove(instance: &str) -> DataplaneResult<PrimitiveOutcome> {
    let remove = jool(instance, &["instance", "remove"]).await?;
    if remove.status.success() {
        return Ok(PrimitiveOutcome::Changed);
    }
    let stderr = String::from_utf8_lossy(&remove.stderr);
    if stderr.contains("doesn't exist") || stderr.contains("does not exist") {
        Ok(PrimitiveOutcome::Unchanged)
    } else {
        Err(DataplaneError::command(
            format!("jool -i {instance} instance remove"),
            stderr.trim().to_string(),
        ))
    }
}
