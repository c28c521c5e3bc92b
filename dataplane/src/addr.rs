// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Idempotent per-link address primitives (`addr_ensure`/`addr_flush`, §4.3).

use std::net::IpAddr;

use futures::TryStreamExt;
use net::InterfaceIndex;
use rtnetlink::Handle;
use rtnetlink::packet_route::address::{AddressAttribute, AddressMessage};

use crate::errors::{DataplaneError, DataplaneResult};
use crate::outcome::PrimitiveOutcome;

/// One address bound to a link, as either a requirement or an observation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AddressSpec {
    /// The address itself.
    pub address: IpAddr,
    /// Its prefix length.
    pub prefix_len: u8,
}

fn observed_address(message: &AddressMessage) -> Option<AddressSpec> {
    let address = message.attributes.iter().find_map(|attr| match attr {
        AddressAttribute::Address(addr) => Some(*addr),
        _ => None,
    })?;
    Some(AddressSpec {
        address,
        prefix_len: message.header.prefix_len,
    })
}

/// List every address currently bound to `index`.
///
/// # Errors
///
/// Returns [`DataplaneError::Netlink`] if the kernel request fails.
pub async fn addr_observe(
    handle: &Handle,
    index: InterfaceIndex,
) -> DataplaneResult<Vec<AddressMessage>> {
    let messages: Vec<AddressMessage> = handle
        .address()
        .get()
        .set_link_index_filter(index.to_u32())
        .execute()
        .try_collect()
        .await?;
    Ok(messages)
}

/// Ensure `required` is bound to `index`, leaving any other addresses already present alone.
///
/// Idempotent: if `required` is already observed on `index`, this is a no-op.
///
/// # Errors
///
/// Returns [`DataplaneError::Netlink`] if either the observation or the add request fails (an
/// `EEXIST` reply from a concurrent writer is treated as success, not an error).
pub async fn addr_ensure(
    handle: &Handle,
    index: InterfaceIndex,
    required: AddressSpec,
) -> DataplaneResult<PrimitiveOutcome> {
    let observed = addr_observe(handle, index).await?;
    if observed.iter().filter_map(observed_address).any(|a| a == required) {
        return Ok(PrimitiveOutcome::Unchanged);
    }
    match handle
        .address()
        .add(index.to_u32(), required.address, required.prefix_len)
        .execute()
        .await
    {
        Ok(()) => Ok(PrimitiveOutcome::Created),
        Err(rtnetlink::Error::NetlinkError(err)) if err.raw_code() == -libc::EEXIST => {
            Ok(PrimitiveOutcome::Unchanged)
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove every address bound to `index` that is not in `keep`.
///
/// # Errors
///
/// Returns [`DataplaneError::Netlink`] if observation or any delete request fails (an `ENOENT`
/// reply, meaning another writer already removed it, is treated as success).
pub async fn addr_flush(
    handle: &Handle,
    index: InterfaceIndex,
    keep: &[AddressSpec],
) -> DataplaneResult<PrimitiveOutcome> {
    let observed = addr_observe(handle, index).await?;
    let mut outcome = PrimitiveOutcome::Unchanged;
    for message in observed {
        let Some(spec) = observed_address(&message) else {
            continue;
        };
        if keep.contains(&spec) {
            continue;
        }
        match handle.address().del(message).execute().await {
            Ok(()) => outcome = PrimitiveOutcome::Changed,
            Err(rtnetlink::Error::NetlinkError(err)) if err.raw_code() == -libc::ENOENT => {}
            Err(e) => return Err(DataplaneError::from(e)),
        }
    }
    Ok(outcome)
}
