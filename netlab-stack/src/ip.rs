use crate::config::InterfaceIdentity;
use crate::error::{Result, StackError};
use crate::ethernet::{Destination, EthernetLayer, Transmission};
use crate::handle::Handle;
use crate::icmp::IcmpEcho;
use crate::stats::{DropCounters, DropReason};
use netlab_packets::{IcmpMessage, IpProtocol, Ipv4Packet, MacAddr, ETHERNET_MTU, IPV4_ETHER_TYPE, IPV4_HEADER_LEN};
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

pub const DEFAULT_TTL: u8 = 64;

/// IPv4 without options or fragments: one subnet plus a default gateway.
pub struct IpLayer {
    identity: Arc<InterfaceIdentity>,
    drops: Arc<DropCounters>,
    identification: AtomicU16,
    ethernet: Handle<EthernetLayer>,
    icmp: Handle<IcmpEcho>,
}

impl IpLayer {
    pub fn new(identity: Arc<InterfaceIdentity>, drops: Arc<DropCounters>) -> Self {
        IpLayer {
            identity,
            drops,
            identification: AtomicU16::new(1),
            ethernet: Handle::new("ethernet"),
            icmp: Handle::new("icmp"),
        }
    }

    pub(crate) fn attach(&self, ethernet: &Arc<EthernetLayer>, icmp: &Arc<IcmpEcho>) {
        self.ethernet.set(ethernet);
        self.icmp.set(icmp);
    }

    /// Wraps `payload` in a datagram from `src` to `dst` and sends it towards its next
    /// hop: `dst` itself when on link, the gateway otherwise. Broadcast destinations go
    /// straight to the Ethernet broadcast address.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn send(
        &self,
        payload: &[u8],
        protocol: IpProtocol,
        src: Ipv4Addr,
        dst: Ipv4Addr,
    ) -> Result<Transmission> {
        if IPV4_HEADER_LEN + payload.len() > ETHERNET_MTU {
            return Err(StackError::PayloadTooLarge {
                len: payload.len(),
                mtu: ETHERNET_MTU - IPV4_HEADER_LEN,
            });
        }

        let mut packet = Ipv4Packet::empty();
        packet
            .set_protocol(protocol)
            .set_payload(payload)
            .set_ttl(DEFAULT_TTL)
            .set_identification(self.identification.fetch_add(1, Ordering::Relaxed))
            .set_src_addr(src)
            .set_dest_addr(dst)
            .set_checksum();

        let destination = if self.identity.is_broadcast(dst) {
            Destination::Mac(MacAddr::BROADCAST)
        } else {
            let next_hop = self.identity.next_hop(dst);
            if next_hop != dst {
                trace!(%dst, gateway = %next_hop, "off link, via gateway");
            }
            Destination::Resolve(next_hop)
        };
        self.ethernet
            .get()?
            .send(&packet.data[packet.layer3_offset..], IPV4_ETHER_TYPE, destination)
    }

    /// Validates a received datagram and hands its payload to the protocol above.
    /// Returns the bytes consumed, 0 if the datagram was dropped.
    pub fn receive(&self, packet: Ipv4Packet) -> usize {
        if !packet.validate_checksum() {
            return self.discard(DropReason::ChecksumMismatch, packet.src_addr(), "bad header checksum");
        }
        if packet.is_fragment() {
            return self.discard(DropReason::UnsupportedProtocol, packet.src_addr(), "fragment");
        }
        let dst = packet.dest_addr();
        if !self.identity.accepts(dst) {
            trace!(%dst, "not for us");
            return self.discard(DropReason::NotForUs, packet.src_addr(), "not addressed to us");
        }

        let src = packet.src_addr();
        let header_len = packet.payload_offset - packet.layer3_offset;
        let consumed = match packet.protocol() {
            IpProtocol::ICMP => match IcmpMessage::try_from(packet) {
                Ok(message) => match self.icmp.get() {
                    Ok(icmp) => icmp.receive(message, src),
                    Err(e) => {
                        warn!(error = %e, %src, "datagram dropped");
                        0
                    }
                },
                Err(why) => return self.discard(DropReason::MalformedIcmp, src, why),
            },
            _ => return self.discard(DropReason::UnsupportedProtocol, src, "unsupported protocol"),
        };

        if consumed == 0 {
            0
        } else {
            header_len + consumed
        }
    }

    /// A datagram we built never left because `next_hop` didn't resolve.
    pub(crate) fn report_unresolved(&self, datagram: &[u8], next_hop: Ipv4Addr) {
        let packet = match Ipv4Packet::from_buffer(datagram.to_vec(), None, 0) {
            Ok(packet) => packet,
            Err(why) => {
                warn!(%next_hop, why, "unresolved datagram unreadable");
                return;
            }
        };
        let dst = packet.dest_addr();
        debug!(%dst, %next_hop, "datagram undeliverable");
        if packet.protocol() != IpProtocol::ICMP {
            return;
        }
        match (IcmpMessage::try_from(packet), self.icmp.get()) {
            (Ok(message), Ok(icmp)) => icmp.report_unresolved(&message, next_hop),
            (Err(why), _) => warn!(%dst, why, "unresolved message unreadable"),
            (_, Err(e)) => warn!(error = %e, %dst, "failure not reported"),
        }
    }

    fn discard(&self, reason: DropReason, src: Ipv4Addr, why: &'static str) -> usize {
        self.drops.record(reason);
        debug!(%reason, %src, why, "datagram dropped");
        0
    }
}
