// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The netfilter DNS hook's local control-channel contract (§4.8): the hook itself is an
//! external collaborator that intercepts DNS responses on the management path; this crate only
//! computes and pushes the rule set it should apply.

use config::NetworkInstanceId;

use crate::errors::DnsResult;
use crate::rules::RewriteRule;

/// Pushes rewrite rules to the netfilter DNS hook. Idempotent: pushing the same rule set twice
/// for the same NI is a no-op from the hook's perspective.
pub trait DnsControl: Send + Sync {
    /// Replace the rule set the hook applies for `ni` with `rules`.
    fn push_rules(&self, ni: &NetworkInstanceId, rules: &[RewriteRule]) -> impl Future<Output = DnsResult<()>> + Send;

    /// Remove every rule the hook holds for `ni` (the NI was removed or stopped using NAT64/NPTv6).
    fn clear_rules(&self, ni: &NetworkInstanceId) -> impl Future<Output = DnsResult<()>> + Send;
}
