use failure::Fail;
use std::net::Ipv4Addr;

/// Failures a caller of the stack can see. Receive paths never produce these; a frame
/// that can't be used is dropped and counted instead (see `DropReason`).
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum StackError {
    #[fail(display = "invalid address {:?}: {}", value, reason)]
    InvalidAddress { value: String, reason: &'static str },

    #[fail(display = "netmask {} is not contiguous", _0)]
    InvalidNetmask(Ipv4Addr),

    #[fail(display = "payload of {} bytes exceeds the {} byte MTU", len, mtu)]
    PayloadTooLarge { len: usize, mtu: usize },

    #[fail(display = "no ARP reply from {} after all retries", _0)]
    UnresolvedDestination(Ipv4Addr),

    #[fail(display = "too many sends already waiting on resolution of {}", _0)]
    PendingQueueFull(Ipv4Addr),

    #[fail(display = "timed out waiting for an echo reply")]
    Timeout,

    #[fail(display = "interface is disconnected")]
    Disconnected,

    #[fail(display = "interface is already connected")]
    AlreadyConnected,

    #[fail(display = "{} layer is not wired into a stack", _0)]
    NotWired(&'static str),
}

pub type Result<T> = std::result::Result<T, StackError>;
