// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// The planned properties of an XFRM interface.
///
/// XFRM interfaces bind a route-based IPsec tunnel to an ordinary Linux
/// interface: traffic routed into the device is encrypted against whichever
/// state the kernel's XFRM policy database associates with `if_id`, and the
/// reverse on the way out. The IPsec connection driver manages the XFRM
/// policy/state entries themselves; this type only describes the link.
#[derive(Builder, Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub struct XfrmPropertiesSpec {
    /// The `if_id` correlating this link with the XFRM state/policy pair
    /// installed by the IPsec driver for a given connection.
    pub if_id: u32,
}
