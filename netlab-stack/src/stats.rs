use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a received frame went no further. None of these are errors: they are counted
/// and traced, and the receive call reports 0 bytes processed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Shorter than an Ethernet header.
    MalformedFrame,
    /// Neither ARP nor IPv4.
    UnsupportedEtherType,
    /// Truncated, or not the Ethernet/IPv4 ARP profile, or a bogus sender.
    MalformedArp,
    /// Sender claims an address already bound, while that binding is still fresh, to another MAC.
    ArpConflict,
    /// ARP reply nobody asked for.
    UnsolicitedReply,
    /// Bad version, header length or total length.
    MalformedDatagram,
    /// IPv4 header or ICMP checksum doesn't verify.
    ChecksumMismatch,
    /// Datagram addressed to someone else.
    NotForUs,
    /// IP protocol, ICMP type or fragment we don't handle.
    UnsupportedProtocol,
    /// Too short for an ICMP echo header.
    MalformedIcmp,
    /// Echo reply that matches no outstanding request.
    UnmatchedReply,
}

impl DropReason {
    pub const ALL: [DropReason; 11] = [
        DropReason::MalformedFrame,
        DropReason::UnsupportedEtherType,
        DropReason::MalformedArp,
        DropReason::ArpConflict,
        DropReason::UnsolicitedReply,
        DropReason::MalformedDatagram,
        DropReason::ChecksumMismatch,
        DropReason::NotForUs,
        DropReason::UnsupportedProtocol,
        DropReason::MalformedIcmp,
        DropReason::UnmatchedReply,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-reason drop counters, shared by every layer of one stack.
#[derive(Debug, Default)]
pub struct DropCounters {
    counts: [AtomicU64; 11],
}

impl DropCounters {
    pub fn new() -> Self {
        DropCounters::default()
    }

    pub fn record(&self, reason: DropReason) {
        self.counts[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, reason: DropReason) -> u64 {
        self.counts[reason.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        DropReason::ALL.iter().map(|r| self.get(*r)).sum()
    }

    /// Non-zero counters, in declaration order.
    pub fn snapshot(&self) -> Vec<(DropReason, u64)> {
        DropReason::ALL
            .iter()
            .map(|r| (*r, self.get(*r)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}
