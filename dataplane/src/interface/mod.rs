// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reconcile the intended state of per-connection Linux interfaces (XFRM, veth,
//! tun, and moved-physical links) with their observed state.

mod properties;
mod tun;
mod xfrm;

pub use properties::{InterfacePropertiesSpec, VethPropertiesSpec};
pub use tun::{TunDevice, TunPropertiesSpec};
pub use xfrm::XfrmPropertiesSpec;

use crate::{Manager, manager_of};
use derive_builder::Builder;
use futures::TryStreamExt;
use net::{AdminState, InterfaceIndex, InterfaceName, Mtu};
use rekon::{AsRequirement, Create, Observe, Op, Reconcile, Remove, Update};
use rtnetlink::packet_route::link::{
    InfoData, InfoKind, LinkAttribute, LinkFlags, LinkInfo, LinkMessage, State,
};
use rtnetlink::{LinkUnspec, LinkVeth, LinkXfrm};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// The observed operational state of a network interface, as reported by the
/// kernel. Unlike [`AdminState`] this can never be directly requested.
#[derive(Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum OperationalState {
    /// The interface is operationally up.
    Up,
    /// The interface is operationally down.
    Down,
    /// The kernel did not report a usable operational state.
    Unknown,
    /// The kernel reported an operational state this daemon does not model.
    Complex,
}

/// The observed properties of a network interface that are specific to its kind.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum InterfaceProperties {
    /// An XFRM interface, as observed.
    Xfrm(XfrmPropertiesSpec),
    /// A veth pair, as observed. The peer side of the pair is not discoverable
    /// from a single link message, so veth links are never matched against a
    /// requirement by identity and are instead recreated whenever drift is
    /// suspected; see the `Update for Manager<Interface>` note below.
    Veth,
    /// A `tun` device, as observed.
    Tun,
    /// A pre-existing physical interface that has been (or should be) moved
    /// into a tenant/connection namespace; this daemon never creates or
    /// destroys it, only relocates it.
    Physical,
    /// A WireGuard link, owned and mutated entirely by the WireGuard
    /// connection driver over its own generic-netlink channel.
    WireGuard,
    /// Some interface kind this daemon does not plan for.
    Other,
}

/// The observed state of a network interface.
#[derive(Builder, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub struct Interface {
    /// The kernel-assigned index of this interface.
    pub index: InterfaceIndex,
    /// The current name of this interface.
    pub name: InterfaceName,
    /// The current MAC address of this interface, if it has one.
    #[builder(default)]
    pub mac: Option<[u8; 6]>,
    /// The current MTU of this interface, if the kernel reported a legal one.
    #[builder(default)]
    pub mtu: Option<Mtu>,
    /// The current administrative state of this interface.
    pub admin_state: AdminState,
    /// The current operational state of this interface.
    pub operational_state: OperationalState,
    /// The kind-specific properties of this interface.
    pub properties: InterfaceProperties,
}

/// A marker type used to key the `Manager<InterfaceAssociation>` impl, which
/// moves an interface into a namespace rather than changing any of its
/// properties.
#[derive(Copy, Clone, Debug)]
pub struct InterfaceAssociation;

/// The specified / intended state for a network interface this daemon may create.
///
/// This type represents a "plan" in that it consists of goals to be realized, not observed
/// external state.
#[derive(Builder, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub struct InterfaceSpec {
    /// The intended name of the network interface.
    pub name: InterfaceName,
    /// The MTU to be assigned to the interface. If set to `None`, the operating
    /// system picks.
    #[builder(default)]
    pub mtu: Option<Mtu>,
    /// The intended administrative state of the network interface.
    pub admin_state: AdminState,
    /// Interface-specific properties.
    pub properties: InterfacePropertiesSpec,
}

impl AsRequirement<InterfaceSpec> for Interface {
    type Requirement<'a>
        = Option<InterfaceSpec>
    where
        Self: 'a;

    fn as_requirement<'a>(&self) -> Self::Requirement<'a> {
        Some(InterfaceSpec {
            name: self.name.clone(),
            mtu: self.mtu,
            admin_state: self.admin_state,
            properties: self.properties.as_requirement()?,
        })
    }
}

impl PartialEq<Interface> for InterfaceSpec {
    fn eq(&self, other: &Interface) -> bool {
        match other.as_requirement() {
            None => false,
            Some(mut other) => {
                if self.mtu.is_none() {
                    other.mtu = None;
                }
                *self == other
            }
        }
    }
}

impl Create for Manager<Interface> {
    type Requirement<'a>
        = &'a InterfaceSpec
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a;

    async fn create<'a>(&self, requirement: &'a InterfaceSpec) -> Self::Outcome<'a>
    where
        Self: 'a,
    {
        match &requirement.properties {
            InterfacePropertiesSpec::Xfrm(props) => {
                let message = LinkXfrm::new(requirement.name.as_ref(), props.if_id).build();
                self.handle.link().add(message).execute().await
            }
            InterfacePropertiesSpec::Veth(props) => {
                let message =
                    LinkVeth::new(requirement.name.as_ref(), props.peer_name.as_ref()).build();
                self.handle.link().add(message).execute().await
            }
            InterfacePropertiesSpec::Tun => TunDevice::open(&requirement.name)
                .await
                .map(|_| ())
                .map_err(|err| {
                    warn!("failed to create tun device: {err:?}");
                    rtnetlink::Error::RequestFailed
                }),
        }
    }
}

impl Remove for Manager<Interface> {
    type Observation<'a>
        = &'a Interface
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a,
        Interface: 'a;

    async fn remove<'a>(&self, observation: &'a Interface) -> Result<(), rtnetlink::Error>
    where
        Self: 'a,
    {
        self.handle
            .link()
            .del(observation.index.to_u32())
            .execute()
            .await
    }
}

impl Update for Manager<InterfaceName> {
    type Requirement<'a>
        = &'a InterfaceName
    where
        Self: 'a;
    type Observation<'a>
        = &'a Interface
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a;

    async fn update<'a>(
        &self,
        requirement: &InterfaceName,
        observation: &Interface,
    ) -> Result<(), rtnetlink::Error> {
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(observation.index.to_u32())
                    .down()
                    .name(requirement.to_string())
                    .build(),
            )
            .execute()
            .await
    }
}

/// Move an interface into a namespace (or back to the root namespace when
/// `requirement` is `None`). Used by the physical connection driver.
impl Update for Manager<InterfaceAssociation> {
    type Requirement<'a>
        = Option<i32>
    where
        Self: 'a;
    type Observation<'a>
        = &'a Interface
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a;

    async fn update<'a>(
        &self,
        requirement: Option<i32>,
        observation: &Interface,
    ) -> Result<(), rtnetlink::Error> {
        let message = LinkUnspec::new_with_index(observation.index.to_u32()).down();
        let message = match requirement {
            Some(fd) => message.setns_by_fd(fd),
            None => message,
        };
        self.handle.link().set(message.build()).execute().await
    }
}

impl Update for Manager<Mtu> {
    type Requirement<'a>
        = Mtu
    where
        Self: 'a;
    type Observation<'a>
        = &'a Interface
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a;

    async fn update<'a>(
        &self,
        requirement: Mtu,
        observation: &Interface,
    ) -> Result<(), rtnetlink::Error>
    where
        Self: 'a,
    {
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(observation.index.to_u32())
                    .mtu(requirement.to_u32())
                    .build(),
            )
            .execute()
            .await
    }
}

impl Update for Manager<AdminState> {
    type Requirement<'a>
        = AdminState
    where
        Self: 'a;
    type Observation<'a>
        = &'a Interface
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a;

    async fn update<'a>(
        &self,
        requirement: AdminState,
        observation: &Interface,
    ) -> Result<(), rtnetlink::Error> {
        let message = LinkUnspec::new_with_index(observation.index.to_u32());
        let message = match requirement {
            AdminState::Down => message.down(),
            AdminState::Up => message.up(),
        };
        self.handle.link().set(message.build()).execute().await
    }
}

impl Update for Manager<Interface> {
    type Requirement<'a>
        = &'a InterfaceSpec
    where
        Self: 'a;
    type Observation<'a>
        = &'a Interface
    where
        Self: 'a;
    type Outcome<'a>
        = Result<(), rtnetlink::Error>
    where
        Self: 'a,
        Interface: 'a;

    async fn update<'a>(
        &self,
        required: &InterfaceSpec,
        observed: &Interface,
    ) -> Result<(), rtnetlink::Error> {
        if required.properties != observed.properties {
            // Interface kind or kind-specific properties can't be updated in place:
            // kill it and let the next reconciliation pass re-create it.
            manager_of::<Interface>(self).remove(observed).await?;
            return Ok(());
        }
        if required.name != observed.name {
            manager_of::<InterfaceName>(self)
                .update(&required.name, observed)
                .await?;
        }
        if required.mtu != observed.mtu {
            if let Some(mtu) = required.mtu {
                manager_of::<Mtu>(self).update(mtu, observed).await?;
                return Ok(());
            }
        }
        if required.admin_state != observed.admin_state {
            manager_of::<AdminState>(self)
                .update(required.admin_state, observed)
                .await?;
            return Ok(());
        }
        Ok(())
    }
}

impl Reconcile for Manager<Interface> {
    type Requirement<'a>
        = &'a InterfaceSpec
    where
        Self: 'a;
    type Observation<'a>
        = Option<&'a Interface>
    where
        Self: 'a;
    type Outcome<'a>
        = Option<Op<'a, Self>>
    where
        Self: 'a,
        Interface: 'a;

    async fn reconcile<'a>(
        &self,
        requirement: &'a InterfaceSpec,
        observation: Option<&'a Interface>,
    ) -> Self::Outcome<'a>
    where
        Self: 'a,
    {
        match observation {
            None => Some(Op::Create(self.create(requirement).await)),
            Some(observed) => {
                if requirement == observed {
                    return None;
                }
                Some(Op::Update(self.update(requirement, observed).await))
            }
        }
    }
}

/// List every network interface visible in the manager's namespace.
///
/// Used by the physical connection driver (to find the link it is about to move) and by the
/// tenant/NI reconciler (to diff desired links against what the kernel reports).
impl Observe for Manager<Interface> {
    type Observation<'a>
        = Vec<Interface>
    where
        Self: 'a;

    async fn observe<'a>(&self) -> Self::Observation<'a>
    where
        Self: 'a,
    {
        let mut observations = Vec::new();
        let mut req = self.handle.link().get().execute();
        loop {
            match req.try_next().await {
                Ok(Some(message)) => match Interface::try_from_link_message(&message) {
                    Ok(interface) => observations.push(interface),
                    Err(err) => debug!("{err:?}"),
                },
                Ok(None) => break,
                Err(err) => {
                    error!("failed to list links: {err}");
                    break;
                }
            }
        }
        observations
    }
}

/// Extract an observed [`Interface`] from a netlink link message.
pub trait TryFromLinkMessage {
    /// The error produced when the message cannot be interpreted.
    type Error;
    /// Try to construct this type from a netlink [`LinkMessage`].
    ///
    /// # Errors
    ///
    /// Returns an error if unable to construct `Self` from that message.
    fn try_from_link_message(message: &LinkMessage) -> Result<Self, Self::Error>
    where
        Self: Sized;
}

impl TryFromLinkMessage for Interface {
    type Error = InterfaceBuilderError;

    fn try_from_link_message(message: &LinkMessage) -> Result<Self, Self::Error> {
        let mut builder = InterfaceBuilder::default();
        builder.index(InterfaceIndex::new(message.header.index));
        builder.admin_state(if message.header.flags.contains(LinkFlags::Up) {
            AdminState::Up
        } else {
            AdminState::Down
        });
        builder.operational_state(OperationalState::Unknown);
        builder.mac(None);
        builder.mtu(None);
        let mut kind: Option<InfoKind> = None;
        let mut xfrm_if_id: Option<u32> = None;

        for attr in &message.attributes {
            match attr {
                LinkAttribute::Address(addr) => {
                    if let Ok(mac) = <[u8; 6]>::try_from(addr.as_slice()) {
                        builder.mac(Some(mac));
                    }
                }
                LinkAttribute::Mtu(mtu) => {
                    builder.mtu(Mtu::try_from(*mtu).ok());
                }
                LinkAttribute::LinkInfo(infos) => {
                    for info in infos {
                        match info {
                            LinkInfo::Kind(kind_) => kind = Some(kind_.clone()),
                            LinkInfo::Data(InfoData::Xfrm(if_id)) => {
                                xfrm_if_id = Some(*if_id);
                            }
                            _ => {}
                        }
                    }
                }
                LinkAttribute::IfName(name) => match InterfaceName::try_from(name.clone()) {
                    Ok(name) => {
                        builder.name(name);
                    }
                    Err(illegal_name) => {
                        error!("{illegal_name:?}");
                    }
                },
                LinkAttribute::OperState(state) => {
                    builder.operational_state(match state {
                        State::Up => OperationalState::Up,
                        State::Down => OperationalState::Down,
                        State::Unknown => OperationalState::Unknown,
                        _ => OperationalState::Complex,
                    });
                }
                _ => {}
            }
        }

        builder.properties(match kind {
            Some(InfoKind::Xfrm) => xfrm_if_id.map_or(InterfaceProperties::Other, |if_id| {
                InterfaceProperties::Xfrm(XfrmPropertiesSpec { if_id })
            }),
            Some(InfoKind::Veth) => InterfaceProperties::Veth,
            Some(InfoKind::Tun) => InterfaceProperties::Tun,
            Some(InfoKind::WireGuard) => InterfaceProperties::WireGuard,
            None => InterfaceProperties::Physical,
            _ => InterfaceProperties::Other,
        });
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_requirement_obeys_contract() {
        bolero::check!()
            .with_type()
            .with_test_time(std::time::Duration::from_secs(5))
            .for_each(|interface: &Interface| {
                if matches!(
                    interface.properties,
                    InterfaceProperties::Veth
                        | InterfaceProperties::Physical
                        | InterfaceProperties::WireGuard
                        | InterfaceProperties::Other
                ) {
                    assert!(interface.as_requirement().is_none());
                    return;
                }
                let requirement = interface.as_requirement().unwrap();
                assert_eq!(&requirement, interface);
            });
    }
}
