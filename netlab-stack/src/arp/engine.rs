use crate::arp::table::{ArpRecord, ArpTable, Learned, Lookup};
use crate::config::{ArpPolicy, InterfaceIdentity};
use crate::error::Result;
use crate::ethernet::{Destination, EthernetLayer};
use crate::handle::{lock, Handle};
use crate::stats::{DropCounters, DropReason};
use netlab_packets::{ArpOp, ArpPacket, MacAddr, ARP_ETHER_TYPE, ARP_PACKET_LEN};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// Outcome of asking for the MAC of a next hop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(MacAddr),
    /// Not known yet. The payload was captured and goes out once a reply arrives.
    Deferred,
}

/// RFC 826 address resolution for Ethernet/IPv4.
///
/// From the RFC: https://tools.ietf.org/html/rfc826
///
/// Every request sender is learned, replies are only trusted when they answer a request
/// of ours, and a fresh binding is never overwritten by a claim for another MAC. Sends to
/// an unresolved address are parked per address and flushed in the order they were made
/// once the address resolves, or reported back up once the engine gives up on it.
///
/// The table lock is never held while anything is put on the wire.
pub struct ArpEngine {
    identity: Arc<InterfaceIdentity>,
    table: Mutex<ArpTable>,
    drops: Arc<DropCounters>,
    ethernet: Handle<EthernetLayer>,
}

impl ArpEngine {
    pub fn new(identity: Arc<InterfaceIdentity>, policy: ArpPolicy, drops: Arc<DropCounters>) -> Self {
        ArpEngine {
            identity,
            table: Mutex::new(ArpTable::new(policy)),
            drops,
            ethernet: Handle::new("ethernet"),
        }
    }

    pub(crate) fn attach(&self, ethernet: &Arc<EthernetLayer>) {
        self.ethernet.set(ethernet);
    }

    /// MAC for `ip` now, or `Deferred` with a copy of `payload` parked until it resolves.
    /// A request goes out unless one already did for `ip` within the request interval.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn resolve(&self, ip: Ipv4Addr, payload: &[u8], ether_type: u16) -> Result<Resolution> {
        let lookup = lock(&self.table).resolve(ip, payload, ether_type, Instant::now())?;
        match lookup {
            Lookup::Resolved(mac) => {
                trace!(%ip, %mac, "cache hit");
                Ok(Resolution::Resolved(mac))
            }
            Lookup::Queued { request_due } => {
                if request_due {
                    // The payload is parked either way; the retry timer asks again.
                    if let Err(e) = self.arp_request(ip) {
                        warn!(error = %e, %ip, "ARP request not sent");
                    }
                } else {
                    debug!(%ip, "request already outstanding, payload queued");
                }
                Ok(Resolution::Deferred)
            }
        }
    }

    /// Broadcasts a who-has for `ip`.
    pub fn arp_request(&self, ip: Ipv4Addr) -> Result<usize> {
        let request = ArpPacket::request(self.identity.mac(), self.identity.ip(), ip);
        debug!(%ip, "who-has");
        let sent = self
            .ethernet
            .get()?
            .send(request.as_bytes(), ARP_ETHER_TYPE, Destination::Mac(MacAddr::BROADCAST))?;
        Ok(sent.len())
    }

    /// Processes a received ARP packet and returns the bytes consumed, 0 if it was dropped.
    pub fn handle_arp_packet(&self, packet: &ArpPacket) -> usize {
        self.handle_arp_packet_at(packet, Instant::now())
    }

    pub(crate) fn handle_arp_packet_at(&self, packet: &ArpPacket, now: Instant) -> usize {
        let sender_mac = packet.sender_hardware_addr();
        let sender_ip = packet.sender_protocol_addr();

        if sender_mac.is_multicast() || sender_mac.is_zero() || sender_ip.is_unspecified() {
            return self.discard(DropReason::MalformedArp, sender_ip, "bogus sender address");
        }
        if sender_ip == self.identity.ip() {
            warn!(%sender_ip, %sender_mac, "peer claims our address");
            return self.discard(DropReason::ArpConflict, sender_ip, "sender claims our address");
        }
        if !self.identity.is_on_link(sender_ip) {
            return self.discard(DropReason::MalformedArp, sender_ip, "sender not on our subnet");
        }

        match packet.opcode() {
            ArpOp::Request => self.handle_request(packet, sender_mac, sender_ip, now),
            ArpOp::Reply => self.handle_reply(packet, sender_mac, sender_ip, now),
            ArpOp::Unknown(_) => self.discard(DropReason::MalformedArp, sender_ip, "unknown opcode"),
        }
    }

    fn handle_request(
        &self,
        packet: &ArpPacket,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        now: Instant,
    ) -> usize {
        let learned = lock(&self.table).learn(sender_ip, sender_mac, now);
        match learned {
            Learned::Conflict { existing } => {
                // Don't answer either, or we'd be reflecting for a spoofer.
                warn!(%sender_ip, %existing, claimed = %sender_mac, "conflicting ARP claim ignored");
                return self.discard(DropReason::ArpConflict, sender_ip, "binding is still fresh");
            }
            Learned::Replaced { previous } => {
                info!(%sender_ip, %previous, mac = %sender_mac, "stale binding replaced");
            }
            Learned::Resolved => self.flush(sender_ip, sender_mac),
            Learned::Inserted | Learned::Refreshed => {
                trace!(%sender_ip, %sender_mac, "learned from request");
            }
        }

        if packet.target_protocol_addr() == self.identity.ip() {
            let reply = ArpPacket::reply(self.identity.mac(), self.identity.ip(), sender_mac, sender_ip);
            debug!(%sender_ip, %sender_mac, "is-at");
            let sent = self.ethernet.get().and_then(|ethernet| {
                ethernet.send(reply.as_bytes(), ARP_ETHER_TYPE, Destination::Mac(sender_mac))
            });
            if let Err(e) = sent {
                warn!(error = %e, %sender_ip, "ARP reply not sent");
            }
        }
        ARP_PACKET_LEN
    }

    fn handle_reply(
        &self,
        packet: &ArpPacket,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        now: Instant,
    ) -> usize {
        if packet.target_protocol_addr() != self.identity.ip() {
            return self.discard(DropReason::UnsolicitedReply, sender_ip, "reply not addressed to us");
        }
        let completed = lock(&self.table).complete(sender_ip, sender_mac, now);
        if !completed {
            return self.discard(DropReason::UnsolicitedReply, sender_ip, "no request outstanding");
        }
        self.flush(sender_ip, sender_mac);
        ARP_PACKET_LEN
    }

    /// Sends what was waiting on `ip`, oldest first. Sends made meanwhile join the back
    /// of the queue, and the entry only turns into a cache hit once it is empty.
    fn flush(&self, ip: Ipv4Addr, mac: MacAddr) {
        let ethernet = self.ethernet.get();
        let mut flushed = 0;
        loop {
            let next = lock(&self.table).take_pending(ip, Instant::now());
            let outbound = match next {
                Some(outbound) => outbound,
                None => break,
            };
            let sent = ethernet
                .as_ref()
                .map_err(|e| e.clone())
                .and_then(|ethernet| ethernet.send(&outbound.payload, outbound.ether_type, Destination::Mac(mac)));
            match sent {
                Ok(_) => flushed += 1,
                Err(e) => warn!(error = %e, %ip, len = outbound.len(), "queued send failed"),
            }
        }
        info!(%ip, %mac, flushed, "resolved");
    }

    /// Runs the retry timer: re-requests overdue addresses and gives up on those out of
    /// requests, reporting their queued sends as failed. Returns the requests sent.
    pub fn tick(&self, now: Instant) -> usize {
        let actions = lock(&self.table).expire(now);

        let mut sent = 0;
        for ip in actions.retry {
            match self.arp_request(ip) {
                Ok(_) => sent += 1,
                Err(e) => warn!(error = %e, %ip, "ARP retry not sent"),
            }
        }
        for ip in actions.aged {
            debug!(%ip, "binding aged out");
        }
        for (ip, pending) in actions.expired {
            warn!(%ip, dropped = pending.len(), "no ARP reply, giving up");
            match self.ethernet.get() {
                Ok(ethernet) => ethernet.report_unresolved(ip, pending),
                Err(e) => warn!(error = %e, %ip, "failure not reported"),
            }
        }
        sent
    }

    /// The fresh binding for `ip`, if any.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        lock(&self.table).lookup(ip, Instant::now())
    }

    pub fn entry(&self, ip: Ipv4Addr) -> Option<ArpRecord> {
        lock(&self.table).record(ip, Instant::now())
    }

    pub fn entries(&self) -> Vec<ArpRecord> {
        lock(&self.table).records(Instant::now())
    }

    fn discard(&self, reason: DropReason, sender_ip: Ipv4Addr, why: &'static str) -> usize {
        self.drops.record(reason);
        debug!(%reason, %sender_ip, why, "ARP packet dropped");
        0
    }
}
