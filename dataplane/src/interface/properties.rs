// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::interface::{InterfaceProperties, XfrmPropertiesSpec};
use derive_builder::Builder;
use rekon::AsRequirement;
use serde::{Deserialize, Serialize};

/// The planned properties of a veth peer.
#[derive(Builder, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub struct VethPropertiesSpec {
    /// The name of the peer end of the veth pair. The peer is created in the
    /// same step and later moved into the uplink namespace by the physical driver.
    pub peer_name: net::InterfaceName,
}

/// The planned properties of a network interface that this daemon is responsible
/// for creating.
///
/// Note that [`InterfacePropertiesSpec::Physical`] and
/// [`InterfacePropertiesSpec::WireGuard`] are deliberately excluded: physical
/// links are never created (only moved between namespaces, see
/// [`crate::interface::InterfaceAssociation`]) and WireGuard links are created
/// and entirely owned by the WireGuard connection driver via its own
/// netlink channel, not by this reconciler.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum InterfacePropertiesSpec {
    /// The planned properties of an XFRM interface (route-based IPsec).
    Xfrm(XfrmPropertiesSpec),
    /// The planned properties of a veth pair.
    Veth(VethPropertiesSpec),
    /// The planned properties of a tun interface (used by the SSH driver).
    Tun,
}

impl AsRequirement<InterfacePropertiesSpec> for InterfaceProperties {
    type Requirement<'a>
        = Option<InterfacePropertiesSpec>
    where
        Self: 'a;

    fn as_requirement<'a>(&self) -> Self::Requirement<'a> {
        Some(match self {
            InterfaceProperties::Xfrm(props) => InterfacePropertiesSpec::Xfrm(*props),
            InterfaceProperties::Tun => InterfacePropertiesSpec::Tun,
            InterfaceProperties::Veth
            | InterfaceProperties::Physical
            | InterfaceProperties::WireGuard
            | InterfaceProperties::Other => {
                return None;
            }
        })
    }
}

impl PartialEq<InterfaceProperties> for InterfacePropertiesSpec {
    fn eq(&self, other: &InterfaceProperties) -> bool {
        match other.as_requirement() {
            None => false,
            Some(other) => other == *self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InterfacePropertiesSpec;
    use crate::interface::InterfaceProperties;
    use rekon::AsRequirement;

    #[test]
    fn as_requirement_obeys_contract() {
        bolero::check!()
            .with_type()
            .for_each(
                |observed: &InterfaceProperties| match observed.as_requirement() {
                    None => {}
                    Some(observed_req) => {
                        assert_eq!(&observed_req, observed);
                        assert_eq!(observed_req, observed.as_requirement().unwrap());
                    }
                },
            );
    }

    #[test]
    fn equality_meaning() {
        bolero::check!().with_type().for_each(
            |(requirement, observation): &(InterfacePropertiesSpec, InterfaceProperties)| {
                if requirement == observation {
                    assert_eq!(requirement, &observation.as_requirement().unwrap());
                } else {
                    match observation.as_requirement() {
                        None => {}
                        Some(observation_req) => {
                            assert_ne!(requirement, &observation_req);
                        }
                    }
                }
            },
        );
    }
}
