// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Semantic validation beyond schema (§4.1).

use crate::errors::{ConfigError, ConfigResult};
use crate::ids::{TenantId, TenantRole};
use crate::model::{ConnectionConfig, Mode, NiType};
use crate::snapshot::Snapshot;

/// Validate a complete [`Snapshot`], returning the first rule it violates.
///
/// This is the single entry point the config store calls before ever letting a commit replace
/// `active/`; §8 law 3 depends on this function being pure (no I/O, no mutation) so that a failed
/// commit leaves `active/` byte-identical.
pub fn validate(snapshot: &Snapshot) -> ConfigResult<()> {
    validate_asn(snapshot)?;
    validate_neighbor_priorities(snapshot)?;
    for (tid, tenant) in &snapshot.tenants {
        if tenant.id != *tid {
            return Err(ConfigError::TenantIdMismatch {
                file: format!("{tid}.yaml"),
                declared: tenant.id.to_string(),
                expected: tid.to_string(),
            });
        }
        validate_tenant_role(&snapshot.service.mode, tid)?;
    }
    validate_default_tenant_shape(snapshot)?;
    for (tid, nid, ni) in snapshot.network_instances() {
        validate_ni_role(&snapshot.service.mode, tid, ni.ni_type)?;
        for (_cid, conn) in &ni.connections {
            if let ConnectionConfig::Ipsec(ipsec) = &conn.config {
                let has_routes = !conn.routes.is_empty();
                let has_ts = ipsec
                    .traffic_selectors
                    .as_ref()
                    .is_some_and(|ts| !ts.is_empty());
                if has_routes && has_ts {
                    return Err(ConfigError::invalid(
                        format!("{tid}/{nid}/{}", conn.id),
                        "routes and traffic_selectors are mutually exclusive for IPsec connections",
                    ));
                }
            }
            for route in &conn.routes {
                if let Some(nptv6_prefix) = route.nptv6_prefix {
                    if route.to.is_v6() && nptv6_prefix.prefix_len() != route.to.prefix_len() {
                        return Err(ConfigError::invalid(
                            format!("{tid}/{nid}/{}", conn.id),
                            "explicit nptv6_prefix length must match the route's prefix length",
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_tenant_role(mode: &Mode, tid: &TenantId) -> ConfigResult<()> {
    match (mode, tid.role()) {
        (Mode::Hub, TenantRole::Endpoint) => Err(ConfigError::invalid(
            tid.to_string(),
            "E#### tenants are only valid in endpoint mode",
        )),
        (Mode::Endpoint, TenantRole::DownlinkC | TenantRole::DownlinkD) => {
            Err(ConfigError::invalid(
                tid.to_string(),
                "C/D downlink tenants are only valid in hub mode",
            ))
        }
        _ => Ok(()),
    }
}

fn validate_ni_role(mode: &Mode, tid: &TenantId, ni_type: NiType) -> ConfigResult<()> {
    match (ni_type, mode, tid.role()) {
        (NiType::Downlink, Mode::Hub, TenantRole::DownlinkC | TenantRole::DownlinkD) => Ok(()),
        (NiType::Downlink, _, _) => Err(ConfigError::invalid(
            tid.to_string(),
            "downlink network instances are only valid in hub mode, for C/D tenants",
        )),
        (NiType::Endpoint, Mode::Endpoint, TenantRole::Endpoint) => Ok(()),
        (NiType::Endpoint, _, _) => Err(ConfigError::invalid(
            tid.to_string(),
            "endpoint network instances are only valid in endpoint mode, for E#### tenants",
        )),
        (NiType::External | NiType::Core, _, TenantRole::Default) => Ok(()),
        (NiType::External | NiType::Core, _, _) => Err(ConfigError::invalid(
            tid.to_string(),
            "EXTERNAL/CORE network instances may only be owned by DEFAULT",
        )),
    }
}

fn validate_default_tenant_shape(snapshot: &Snapshot) -> ConfigResult<()> {
    let default_tenant = TenantId::default_tenant();
    let Some(default) = snapshot.tenants.get(&default_tenant) else {
        return Err(ConfigError::invalid(
            "DEFAULT.yaml",
            "a DEFAULT tenant is mandatory",
        ));
    };
    let externals = count_ni_type(default, NiType::External);
    let cores = count_ni_type(default, NiType::Core);
    let endpoints = count_ni_type(default, NiType::Endpoint);

    if externals != 1 {
        return Err(ConfigError::invalid(
            "DEFAULT.yaml",
            format!("expected exactly one EXTERNAL network instance, found {externals}"),
        ));
    }
    if cores != 1 {
        return Err(ConfigError::invalid(
            "DEFAULT.yaml",
            format!("expected exactly one CORE network instance, found {cores}"),
        ));
    }
    match snapshot.service.mode {
        Mode::Endpoint if endpoints != 1 => Err(ConfigError::invalid(
            "DEFAULT.yaml",
            format!("endpoint mode requires exactly one ENDPOINT network instance, found {endpoints}"),
        )),
        Mode::Hub if endpoints != 0 => Err(ConfigError::invalid(
            "DEFAULT.yaml",
            "ENDPOINT network instances are only valid in endpoint mode",
        )),
        _ => Ok(()),
    }
}

fn count_ni_type(tenant: &crate::model::Tenant, ni_type: NiType) -> usize {
    tenant
        .network_instances
        .values()
        .filter(|ni| ni.ni_type == ni_type)
        .count()
}

fn validate_asn(snapshot: &Snapshot) -> ConfigResult<()> {
    let asn = snapshot.service.bgp.asn;
    const MIN: u32 = 4_200_000_000;
    const MAX: u32 = 4_290_000_000;
    if !(MIN..MAX).contains(&asn) {
        return Err(ConfigError::invalid(
            "DEFAULT.yaml#bgp.asn",
            format!("ASN {asn} is out of the private range [{MIN}, {MAX})"),
        ));
    }
    Ok(())
}

fn validate_neighbor_priorities(snapshot: &Snapshot) -> ConfigResult<()> {
    for (i, neighbor) in snapshot.service.bgp.neighbors.iter().enumerate() {
        if neighbor.priority > 9 {
            return Err(ConfigError::invalid(
                format!("DEFAULT.yaml#bgp.neighbors[{i}]"),
                "neighbor priority must be in 0..=9",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NetworkInstanceId;
    use crate::model::{
        AllocatorPrefixes, BgpGlobals, Connection, ConnectionConfig, IpNetSpec, IpsecConfig,
        NetworkInstance, RouteSpec, ServiceConfig, Tenant, TrafficSelector,
    };
    use crate::ids::ConnId;
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr};

    fn base_snapshot(mode: Mode) -> Snapshot {
        let mut default_tenant = Tenant {
            id: TenantId::default_tenant(),
            name: "default".to_string(),
            metadata: Default::default(),
            network_instances: BTreeMap::new(),
        };
        default_tenant.network_instances.insert(
            NetworkInstanceId::try_from(NetworkInstanceId::EXTERNAL).unwrap(),
            NetworkInstance {
                ni_type: NiType::External,
                metadata: Default::default(),
                connections: Default::default(),
            },
        );
        default_tenant.network_instances.insert(
            NetworkInstanceId::try_from(NetworkInstanceId::CORE).unwrap(),
            NetworkInstance {
                ni_type: NiType::Core,
                metadata: Default::default(),
                connections: Default::default(),
            },
        );
        let mut tenants = BTreeMap::new();
        tenants.insert(default_tenant.id.clone(), default_tenant);
        Snapshot {
            generation: 1,
            service: ServiceConfig {
                mode,
                prefixes: AllocatorPrefixes {
                    prefix_downlink_interface_v4: "100.64.0.0/16".parse().unwrap(),
                    prefix_downlink_interface_v6: "fd00:1::/32".parse().unwrap(),
                    prefix_downlink_nat64: "fdcc:0::/32".parse().unwrap(),
                    prefix_downlink_nptv6: "fdff::/12".parse().unwrap(),
                },
                bgp: BgpGlobals {
                    asn: 4_200_000_001,
                    router_id: Ipv4Addr::new(10, 0, 0, 1),
                    bfd: false,
                    neighbors: vec![],
                },
            },
            tenants,
        }
    }

    #[test]
    fn minimal_hub_snapshot_validates() {
        assert!(validate(&base_snapshot(Mode::Hub)).is_ok());
    }

    #[test]
    fn endpoint_mode_rejects_downlink_tenant() {
        let mut snap = base_snapshot(Mode::Endpoint);
        snap.tenants
            .get_mut(&TenantId::default_tenant())
            .unwrap()
            .network_instances
            .insert(
                NetworkInstanceId::try_from(NetworkInstanceId::ENDPOINT).unwrap(),
                NetworkInstance {
                    ni_type: NiType::Endpoint,
                    metadata: Default::default(),
                    connections: Default::default(),
                },
            );
        let c0001 = TenantId::try_from("C0001").unwrap();
        snap.tenants.insert(
            c0001.clone(),
            Tenant {
                id: c0001,
                name: "bad".to_string(),
                metadata: Default::default(),
                network_instances: Default::default(),
            },
        );
        assert!(matches!(validate(&snap), Err(ConfigError::InvalidConfig { .. })));
    }

    #[test]
    fn ipsec_routes_and_traffic_selectors_are_exclusive() {
        let mut snap = base_snapshot(Mode::Hub);
        let c0001 = TenantId::try_from("C0001").unwrap();
        let mut ni = NetworkInstance {
            ni_type: NiType::Downlink,
            metadata: Default::default(),
            connections: Default::default(),
        };
        ni.connections.insert(
            ConnId::new(0),
            Connection {
                id: ConnId::new(0),
                interface_addrs: None,
                routes: vec![RouteSpec {
                    to: IpNetSpec::V4("192.0.2.0/24".parse().unwrap()),
                    via: None,
                    nptv6: false,
                    nptv6_prefix: None,
                }],
                config: ConnectionConfig::Ipsec(IpsecConfig {
                    remote_addrs: vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))],
                    local_id: None,
                    remote_id: None,
                    ike_version: crate::model::IkeVersion::V2,
                    ike_proposal: "aes256-sha256-modp2048".to_string(),
                    ike_lifetime: 28800,
                    ipsec_proposal: "aes256-sha256".to_string(),
                    ipsec_lifetime: 3600,
                    initiation: crate::model::Initiation::Start,
                    psk: "secret".to_string(),
                    traffic_selectors: Some(vec![TrafficSelector {
                        local: IpNetSpec::V4("10.0.0.0/24".parse().unwrap()),
                        remote: IpNetSpec::V4("10.0.1.0/24".parse().unwrap()),
                    }]),
                }),
            },
        );
        let mut tenant = Tenant {
            id: c0001.clone(),
            name: "acme".to_string(),
            metadata: Default::default(),
            network_instances: Default::default(),
        };
        tenant
            .network_instances
            .insert(NetworkInstanceId::downlink(&c0001, 0), ni);
        snap.tenants.insert(c0001, tenant);

        assert!(matches!(validate(&snap), Err(ConfigError::InvalidConfig { .. })));
    }
}
