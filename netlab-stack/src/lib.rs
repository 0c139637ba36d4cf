//! A minimal Ethernet/ARP/IPv4/ICMP echo stack over a pluggable wire.
//!
//! Frames go down `IcmpEcho` → `IpLayer` → `EthernetLayer` (→ `ArpEngine` while a next hop
//! is unresolved) → `WireTransport`, and come back up the same way. `Stack` assembles the
//! layers and runs the read loop.

pub mod arp;
pub mod config;
pub mod error;
pub mod ethernet;
mod handle;
pub mod icmp;
pub mod ip;
mod stack;
pub mod stats;
pub mod wire;

pub use self::arp::{ArpEngine, ArpRecord, ArpState, Resolution};
pub use self::config::{ArpPolicy, EchoPolicy, InterfaceIdentity, StackConfig};
pub use self::error::{Result, StackError};
pub use self::ethernet::{Destination, EthernetLayer, Transmission};
pub use self::icmp::IcmpEcho;
pub use self::ip::IpLayer;
pub use self::stack::Stack;
pub use self::stats::{DropCounters, DropReason};
pub use self::wire::{cable, CableEnd, WireTransport};
