use crate::arp::{ArpEngine, PendingOutbound, Resolution};
use crate::config::InterfaceIdentity;
use crate::error::{Result, StackError};
use crate::handle::Handle;
use crate::ip::IpLayer;
use crate::stats::{DropCounters, DropReason};
use crate::wire::WireTransport;
use netlab_packets::{
    ArpPacket, EthernetFrame, Ipv4Packet, MacAddr, ARP_ETHER_TYPE, ETHERNET_HEADER_LEN, ETHERNET_MTU,
    IPV4_ETHER_TYPE,
};
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

/// Where a frame should go.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Already known, used by ARP itself and for broadcasts.
    Mac(MacAddr),
    /// The MAC of this next hop, looked up through ARP.
    Resolve(Ipv4Addr),
}

/// What happened to a send.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transmission {
    /// Bytes put on the wire now.
    Sent(usize),
    /// Payload bytes accepted and parked until the next hop resolves. Nothing went out.
    Deferred(usize),
}

impl Transmission {
    pub fn len(&self) -> usize {
        match *self {
            Transmission::Sent(len) | Transmission::Deferred(len) => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Transmission::Deferred(_))
    }
}

/// Frames outgoing payloads with our source MAC and unframes what the wire delivers,
/// handing it to ARP or IP by ethertype.
pub struct EthernetLayer {
    identity: Arc<InterfaceIdentity>,
    wire: Arc<dyn WireTransport>,
    drops: Arc<DropCounters>,
    arp: Handle<ArpEngine>,
    ip: Handle<IpLayer>,
}

impl EthernetLayer {
    pub fn new(
        identity: Arc<InterfaceIdentity>,
        wire: Arc<dyn WireTransport>,
        drops: Arc<DropCounters>,
    ) -> Self {
        EthernetLayer {
            identity,
            wire,
            drops,
            arp: Handle::new("arp"),
            ip: Handle::new("ip"),
        }
    }

    pub(crate) fn attach_arp(&self, arp: &Arc<ArpEngine>) {
        self.arp.set(arp);
    }

    pub(crate) fn attach_ip(&self, ip: &Arc<IpLayer>) {
        self.ip.set(ip);
    }

    /// Sends `payload` as one frame of `ether_type`. With `Destination::Resolve` the MAC
    /// comes from ARP, and if ARP doesn't have it yet the payload is parked there and
    /// the send reports `Deferred`.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn send(&self, payload: &[u8], ether_type: u16, destination: Destination) -> Result<Transmission> {
        if payload.len() > ETHERNET_MTU {
            return Err(StackError::PayloadTooLarge {
                len: payload.len(),
                mtu: ETHERNET_MTU,
            });
        }

        let mac = match destination {
            Destination::Mac(mac) => mac,
            // ARP frames are never resolved through ARP.
            Destination::Resolve(_) if ether_type == ARP_ETHER_TYPE => MacAddr::BROADCAST,
            Destination::Resolve(ip) => match self.arp.get()?.resolve(ip, payload, ether_type)? {
                Resolution::Resolved(mac) => mac,
                Resolution::Deferred => return Ok(Transmission::Deferred(payload.len())),
            },
        };
        self.transmit(payload, ether_type, mac).map(Transmission::Sent)
    }

    fn transmit(&self, payload: &[u8], ether_type: u16, dest: MacAddr) -> Result<usize> {
        let mut frame = EthernetFrame::encap(ether_type, payload);
        frame
            .set_dest_mac(dest)
            .set_src_mac(self.identity.mac())
            .pad();
        trace!(%dest, ether_type, len = frame.len(), "transmit");
        self.wire.transmit(&frame.data)
    }

    /// Processes one raw frame from the wire. Returns the bytes consumed: the Ethernet
    /// header plus whatever the layer above consumed, or 0 if the frame was dropped.
    pub fn receive(&self, data: Vec<u8>) -> usize {
        let frame = match EthernetFrame::from_buffer(data) {
            Ok(frame) => frame,
            Err(why) => return self.discard(DropReason::MalformedFrame, why),
        };

        let consumed = match frame.ether_type() {
            ARP_ETHER_TYPE => match ArpPacket::try_from(frame) {
                Ok(packet) => match self.arp.get() {
                    Ok(arp) => arp.handle_arp_packet(&packet),
                    Err(e) => return self.unwired(e),
                },
                Err(why) => return self.discard(DropReason::MalformedArp, why),
            },
            IPV4_ETHER_TYPE => match Ipv4Packet::try_from(frame) {
                Ok(packet) => match self.ip.get() {
                    Ok(ip) => ip.receive(packet),
                    Err(e) => return self.unwired(e),
                },
                Err(why) => return self.discard(DropReason::MalformedDatagram, why),
            },
            other => {
                trace!(ether_type = other, "unsupported ethertype");
                return self.discard(DropReason::UnsupportedEtherType, "unsupported ethertype");
            }
        };

        if consumed == 0 {
            0
        } else {
            ETHERNET_HEADER_LEN + consumed
        }
    }

    /// Hands sends that ARP gave up on back to the layer that made them.
    pub(crate) fn report_unresolved(&self, next_hop: Ipv4Addr, pending: Vec<PendingOutbound>) {
        for outbound in pending {
            match outbound.ether_type {
                IPV4_ETHER_TYPE => match self.ip.get() {
                    Ok(ip) => ip.report_unresolved(&outbound.payload, next_hop),
                    Err(e) => {
                        self.unwired(e);
                    }
                },
                other => debug!(%next_hop, ether_type = other, "unresolved send discarded"),
            }
        }
    }

    fn discard(&self, reason: DropReason, why: &'static str) -> usize {
        self.drops.record(reason);
        debug!(%reason, why, "frame dropped");
        0
    }

    fn unwired(&self, e: StackError) -> usize {
        warn!(error = %e, "frame dropped");
        0
    }
}
