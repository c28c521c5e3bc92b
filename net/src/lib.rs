#![cfg_attr(not(test), no_std)] // This library should always compile without std (even if we never ship that way)
#![forbid(unsafe_code)] // Validation logic should always be strictly safe
#![deny(missing_docs, clippy::all, clippy::pedantic)] // yeah, I'm that guy.  I'm not sorry.
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Do you know where your towel is?

//! Strictly validated network primitive types: interface names/indices/MTU,
//! unicast address newtypes, and route table identifiers.

extern crate std;

pub mod interface;
pub mod ipv4;
pub mod ipv6;
pub mod route;

pub use interface::{AdminState, InterfaceIndex, InterfaceName, Mtu};
pub use ipv4::UnicastIpv4Addr;
pub use ipv6::UnicastIpv6Addr;
pub use route::RouteTableId;
