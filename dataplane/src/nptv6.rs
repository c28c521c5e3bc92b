// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NPTv6 1:1 prefix translation rules (`nptv6_rule_ensure`, §4.3).
//!
//! Linux has no native NPT66 netlink object; the kernel's `ip6_tables` NPTv6 target is driven
//! through `ip -6 rule`/`ip -6 route` exactly as `ip6tables`-based NAT setups are, so this shells
//! out the same way [`crate::nat64`] does for Jool.

use ipnet::Ipv6Net;
use tokio::process::Command;
use tracing::trace;

use crate::errors::{DataplaneError, DataplaneResult};
use crate::outcome::PrimitiveOutcome;

async fn ip(args: &[&str]) -> DataplaneResult<std::process::Output> {
    let display = format!("ip {}", args.join(" "));
    trace!(command = %display, "exec");
    Command::new("ip")
        .args(args)
        .output()
        .await
        .map_err(|e| DataplaneError::command(display, e.to_string()))
}

/// Install a 1:1 NPTv6 mapping from `src` to `dst` in network namespace `netns`, using a
/// source-prefix `ip -6 route` with `nptv6` translation.
///
/// Idempotent: a kernel `EEXIST`-equivalent "File exists" reply from `ip` is treated as success.
///
/// # Errors
///
/// Returns [`DataplaneError::ExternalCommand`] if `ip` cannot be spawned or reports any other
/// failure.
pub async fn nptv6_rule_ensure(
    netns: &str,
    src: Ipv6Net,
    dst: Ipv6Net,
) -> DataplaneResult<PrimitiveOutcome> {
    let src_arg = src.to_string();
    let dst_arg = dst.to_string();
    let output = ip(&[
        "-netns", netns, "-6", "route", "add", "nptv6", &dst_arg, "from", &src_arg,
    ])
    .await?;
    if output.status.success() {
        return Ok(PrimitiveOutcome::Created);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("File exists") {
        Ok(PrimitiveOutcome::Unchanged)
    } else {
        Err(DataplaneError::command(
            format!("ip -netns {netns} -6 route add nptv6 {dst_arg} from {src_arg}"),
            stderr.trim().to_string(),
        ))
    }
}

/// Remove a previously installed NPTv6 mapping.
///
/// Idempotent: removing a mapping that's already gone ("No such process"/"Cannot find device")
/// is success.
///
/// # Errors
///
/// Returns [`DataplaneError::ExternalCommand`] if `ip` cannot be spawned or reports any other
/// failure.
pub async fn nptv6_rule_remove(
    netns: &str,
    src: Ipv6Net,
    dst: Ipv6Net,
) -> DataplaneResult<PrimitiveOutcome> {
    let src_arg = src.to_string();
    let dst_arg = dst.to_string();
    let output = ip(&[
        "-netns", netns, "-6", "route", "del", "nptv6", &dst_arg, "from", &src_arg,
    ])
    .await?;
    if output.status.success() {
        return Ok(PrimitiveOutcome::Changed);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("No such process") || stderr.contains("Cannot find device") {
        Ok(PrimitiveOutcome::Unchanged)
    } else {
        Err(DataplaneError::command(
            format!("ip -netns {netns} -6 route del nptv6 {dst_arg} from {src_arg}"),
            stderr.trim().to_string(),
        ))
    }
}
