// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A [`dns::DnsControl`] that shells out to the netfilter DNS hook's control binary, passing the
//! rule set as JSON on stdin — the same shell-out-and-classify idiom used throughout the driver
//! layer (`drivers::ipsec::SwanctlControl`, `routing::reload`), since no crate in the pack models
//! the hook's control protocol directly.

use std::process::Stdio;

use config::NetworkInstanceId;
use dns::{DnsControl, DnsError, DnsResult, RewriteRule};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Duration;

#[derive(Serialize)]
#[serde(tag = "type")]
enum WireRule {
    Nat64Synthesis { match_v4: String, nat64_v6: String },
    Nptv6Rewrite { match_v6: String, nptv6_v6: String },
}

impl From<&RewriteRule> for WireRule {
    fn from(rule: &RewriteRule) -> Self {
        match *rule {
            RewriteRule::Nat64Synthesis { match_v4, nat64_v6 } => WireRule::Nat64Synthesis {
                match_v4: match_v4.to_string(),
                nat64_v6: nat64_v6.to_string(),
            },
            RewriteRule::Nptv6Rewrite { match_v6, nptv6_v6 } => WireRule::Nptv6Rewrite {
                match_v6: match_v6.to_string(),
                nptv6_v6: nptv6_v6.to_string(),
            },
        }
    }
}

/// Pushes/clears rewrite rules by invoking `binary load --ni <ni>` (rules as JSON on stdin) or
/// `binary clear --ni <ni>`.
pub struct CliDnsControl {
    binary: String,
    timeout: Duration,
}

impl CliDnsControl {
    /// Build a control client invoking `binary`, aborting any single invocation after `timeout`.
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        CliDnsControl {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str], stdin_payload: Option<&[u8]>) -> DnsResult<()> {
        let display = format!("{} {}", self.binary, args.join(" "));
        let mut command = Command::new(&self.binary);
        command.args(args);
        if stdin_payload.is_some() {
            command.stdin(Stdio::piped());
        }
        let mut child = command
            .spawn()
            .map_err(|e| DnsError::control(format!("spawn `{display}`: {e}")))?;

        if let Some(payload) = stdin_payload {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| DnsError::control(format!("`{display}`: no stdin handle")))?;
            stdin
                .write_all(payload)
                .await
                .map_err(|e| DnsError::control(format!("writing to `{display}`: {e}")))?;
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DnsError::control(format!("`{display}` timed out after {:?}", self.timeout)))?
            .map_err(|e| DnsError::control(format!("`{display}`: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DnsError::control(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

impl DnsControl for CliDnsControl {
    async fn push_rules(&self, ni: &NetworkInstanceId, rules: &[RewriteRule]) -> DnsResult<()> {
        let wire: Vec<WireRule> = rules.iter().map(WireRule::from).collect();
        let payload = serde_json::to_vec(&wire).map_err(|e| DnsError::control(format!("encoding rules: {e}")))?;
        self.run(&["load", "--ni", ni.as_str()], Some(&payload)).await
    }

    async fn clear_rules(&self, ni: &NetworkInstanceId) -> DnsResult<()> {
        self.run(&["clear", "--ni", ni.as_str()], None).await
    }
}
