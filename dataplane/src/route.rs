// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Idempotent per-link route primitives (`route_ensure`/`route_flush`, §4.3).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use futures::TryStreamExt;
use net::InterfaceIndex;
use rtnetlink::packet_route::route::{
    RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteScope,
};
use rtnetlink::{Handle, RouteMessageBuilder};

use crate::errors::{DataplaneError, DataplaneResult};
use crate::outcome::PrimitiveOutcome;

/// A route requirement: destination prefix, optional next hop, carried out a given link.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RouteSpec {
    /// The destination network.
    pub destination: IpAddr,
    /// The destination prefix length.
    pub prefix_len: u8,
    /// The next-hop address, or `None` for an on-link / reject route.
    pub via: Option<IpAddr>,
}

fn build_message(index: u32, spec: RouteSpec) -> RouteMessage {
    match (spec.destination, spec.via) {
        (IpAddr::V4(dst), via) => {
            let mut builder = RouteMessageBuilder::<Ipv4Addr>::new()
                .output_interface(index)
                .protocol(RouteProtocol::Static)
                .scope(RouteScope::Universe)
                .destination_prefix(dst, spec.prefix_len);
            if let Some(IpAddr::V4(gw)) = via {
                builder = builder.gateway(gw);
            }
            builder.build()
        }
        (IpAddr::V6(dst), via) => {
            let mut builder = RouteMessageBuilder::<Ipv6Addr>::new()
                .output_interface(index)
                .protocol(RouteProtocol::Static)
                .scope(RouteScope::Universe)
                .destination_prefix(dst, spec.prefix_len);
            if let Some(IpAddr::V6(gw)) = via {
                builder = builder.gateway(gw);
            }
            builder.build()
        }
    }
}

fn route_address_to_ip(addr: &RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(v4) => Some(IpAddr::V4(*v4)),
        RouteAddress::Inet6(v6) => Some(IpAddr::V6(*v6)),
        _ => None,
    }
}

fn observed_route(message: &RouteMessage) -> Option<RouteSpec> {
    let destination = message.attributes.iter().find_map(|attr| match attr {
        RouteAttribute::Destination(addr) => route_address_to_ip(addr),
        _ => None,
    })?;
    let via = message.attributes.iter().find_map(|attr| match attr {
        RouteAttribute::Gateway(addr) => route_address_to_ip(addr),
        _ => None,
    });
    Some(RouteSpec {
        destination,
        prefix_len: message.header.destination_prefix_length,
        via,
    })
}

/// List every route this daemon installed out of `index` (statically-protocoled routes only, so
/// kernel/connected routes the link creation itself produced are left alone).
///
/// # Errors
///
/// Returns [`DataplaneError::Netlink`] if the kernel request fails.
pub async fn route_observe(
    handle: &Handle,
    index: InterfaceIndex,
) -> DataplaneResult<Vec<RouteMessage>> {
    let mut all: Vec<RouteMessage> = handle
        .route()
        .get(rtnetlink::IpVersion::V4)
        .execute()
        .try_collect()
        .await?;
    let mut v6: Vec<RouteMessage> = handle
        .route()
        .get(rtnetlink::IpVersion::V6)
        .execute()
        .try_collect()
        .await?;
    all.append(&mut v6);
    Ok(all
        .into_iter()
        .filter(|m| m.header.protocol == RouteProtocol::Static)
        .filter(|m| {
            m.attributes.iter().any(|attr| {
                matches!(attr, RouteAttribute::Oif(oif) if *oif == index.to_u32())
            })
        })
        .collect())
}

/// Ensure `required` is installed out of `index`.
///
/// Idempotent: a kernel `EEXIST` reply (the route already matches) is success, not an error.
///
/// # Errors
///
/// Returns [`DataplaneError::Netlink`] on any other kernel rejection.
pub async fn route_ensure(
    handle: &Handle,
    index: InterfaceIndex,
    required: RouteSpec,
) -> DataplaneResult<PrimitiveOutcome> {
    let message = build_message(index.to_u32(), required);
    match handle.route().add(message).execute().await {
        Ok(()) => Ok(PrimitiveOutcome::Created),
        Err(rtnetlink::Error::NetlinkError(err)) if err.raw_code() == -libc::EEXIST => {
            Ok(PrimitiveOutcome::Unchanged)
        }
        Err(e) => Err(DataplaneError::from(e)),
    }
}

/// Remove every statically-protocoled route out of `index` that is not in `keep`.
///
/// # Errors
///
/// Returns [`DataplaneError::Netlink`] if observation or a delete fails (`ESRCH`/`ENOENT`,
/// meaning the route is already gone, is treated as success).
pub async fn route_flush(
    handle: &Handle,
    index: InterfaceIndex,
    keep: &[RouteSpec],
) -> DataplaneResult<PrimitiveOutcome> {
    let observed = route_observe(handle, index).await?;
    let mut outcome = PrimitiveOutcome::Unchanged;
    for message in observed {
        let Some(spec) = observed_route(&message) else {
            continue;
        };
        if keep.contains(&spec) {
            continue;
        }
        match handle.route().del(message).execute().await {
            Ok(()) => outcome = PrimitiveOutcome::Changed,
            Err(rtnetlink::Error::NetlinkError(err))
                if err.raw_code() == -libc::ENOENT || err.raw_code() == -libc::ESRCH => {}
            Err(e) => return Err(DataplaneError::from(e)),
        }
    }
    Ok(outcome)
}
