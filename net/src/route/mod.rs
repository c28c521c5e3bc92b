// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route table identifiers

pub mod table;

pub use table::RouteTableId;
