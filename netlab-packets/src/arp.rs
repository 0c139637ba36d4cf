use crate::*;
use std::convert::{TryFrom, TryInto};
use std::net::Ipv4Addr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Unknown(u16),
}

impl From<u16> for ArpOp {
    fn from(val: u16) -> Self {
        match val {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            other => ArpOp::Unknown(other),
        }
    }
}

impl From<ArpOp> for u16 {
    fn from(op: ArpOp) -> u16 {
        match op {
            ArpOp::Request => 1,
            ArpOp::Reply => 2,
            ArpOp::Unknown(code) => code,
        }
    }
}

pub const ARP_HARDWARE_ETHERNET: u16 = 1;

/// Size of an ARP packet for the Ethernet/IPv4 profile.
pub const ARP_PACKET_LEN: usize = 28;

const HARDWARE_TYPE_RANGE: (usize, usize) = (0, 2);
const PROTOCOL_TYPE_RANGE: (usize, usize) = (2, 4);
const HARDWARE_ADDR_LEN_RANGE: (usize, usize) = (4, 5);
const PROTOCOL_ADDR_LEN_RANGE: (usize, usize) = (5, 6);
const OPCODE_RANGE: (usize, usize) = (6, 8);
const SENDER_HARDWARE_ADDR_RANGE: (usize, usize) = (8, 14);
const SENDER_PROTOCOL_ADDR_RANGE: (usize, usize) = (14, 18);
const TARGET_HARDWARE_ADDR_RANGE: (usize, usize) = (18, 24);
const TARGET_PROTOCOL_ADDR_RANGE: (usize, usize) = (24, 28);

///
/// Getters/setters for the packet structure described in RFC 826
/// https://tools.ietf.org/html/rfc826
///
/// Only the Ethernet/IPv4 profile is supported: 6 byte hardware addresses and
/// 4 byte protocol addresses, so every field sits at a fixed offset.
///
#[derive(Clone, Debug)]
pub struct ArpPacket {
    pub data: PacketData,
    pub layer2_offset: Option<usize>,
    pub arp_offset: usize,
}

impl ArpPacket {
    /// Decorates `data` with ARP getters/setters.
    /// Validates
    /// - There are enough bytes for a full Ethernet/IPv4 ARP packet (link padding may follow)
    /// - Hardware type is Ethernet and protocol type is IPv4
    /// - The address length fields are 6 and 4
    pub fn from_buffer(
        data: PacketData,
        layer2_offset: Option<usize>,
        arp_offset: usize,
    ) -> Result<ArpPacket, &'static str> {
        if data.len() < arp_offset + ARP_PACKET_LEN {
            return Err("Packet is too short to be an Ethernet/IPv4 ARP packet");
        }

        let packet = ArpPacket {
            data,
            layer2_offset,
            arp_offset,
        };

        if packet.hardware_type() != ARP_HARDWARE_ETHERNET {
            return Err("ARP hardware type is not Ethernet");
        }
        if packet.protocol_type() != IPV4_ETHER_TYPE {
            return Err("ARP protocol type is not IPv4");
        }
        if packet.hardware_addr_len() != 6 || packet.protocol_addr_len() != 4 {
            return Err("ARP address lengths don't match the Ethernet/IPv4 profile");
        }

        Ok(packet)
    }

    ///
    /// Constructs a packet with the Ethernet/IPv4 profile filled in and every
    /// address and the opcode zeroed.
    ///
    pub fn new() -> Self {
        let mut packet = ArpPacket {
            data: vec![0; ARP_PACKET_LEN],
            layer2_offset: None,
            arp_offset: 0,
        };
        packet
            .set_hardware_type(ARP_HARDWARE_ETHERNET)
            .set_protocol_type(IPV4_ETHER_TYPE)
            .set_hardware_addr_len(6)
            .set_protocol_addr_len(4);
        packet
    }

    /// A who-has request for `target_ip`. The target hardware address is left zeroed,
    /// since it is the value being resolved.
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        let mut packet = ArpPacket::new();
        packet
            .set_opcode(ArpOp::Request)
            .set_sender_hardware_addr(sender_mac)
            .set_sender_protocol_addr(sender_ip)
            .set_target_hardware_addr(MacAddr::ZERO)
            .set_target_protocol_addr(target_ip);
        packet
    }

    /// An is-at reply from `sender` directed at `target`.
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        let mut packet = ArpPacket::new();
        packet
            .set_opcode(ArpOp::Reply)
            .set_sender_hardware_addr(sender_mac)
            .set_sender_protocol_addr(sender_ip)
            .set_target_hardware_addr(target_mac)
            .set_target_protocol_addr(target_ip);
        packet
    }

    pub fn hardware_type(&self) -> u16 {
        let (start, end) = HARDWARE_TYPE_RANGE;
        u16::from_be_bytes(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn protocol_type(&self) -> u16 {
        let (start, end) = PROTOCOL_TYPE_RANGE;
        u16::from_be_bytes(self.arp_data(start, end).try_into().unwrap())
    }

    pub fn hardware_addr_len(&self) -> u8 {
        let (start, _) = HARDWARE_ADDR_LEN_RANGE;
        self.data[self.arp_offset + start]
    }

    pub fn protocol_addr_len(&self) -> u8 {
        let (start, _) = PROTOCOL_ADDR_LEN_RANGE;
        self.data[self.arp_offset + start]
    }

    pub fn opcode(&self) -> ArpOp {
        let (start, end) = OPCODE_RANGE;
        ArpOp::from(u16::from_be_bytes(self.arp_data(start, end).try_into().unwrap()))
    }

    pub fn sender_hardware_addr(&self) -> MacAddr {
        let (start, end) = SENDER_HARDWARE_ADDR_RANGE;
        MacAddr::from_slice(self.arp_data(start, end))
    }

    pub fn sender_protocol_addr(&self) -> Ipv4Addr {
        let (start, end) = SENDER_PROTOCOL_ADDR_RANGE;
        let octets: [u8; 4] = self.arp_data(start, end).try_into().unwrap();
        Ipv4Addr::from(octets)
    }

    pub fn target_hardware_addr(&self) -> MacAddr {
        let (start, end) = TARGET_HARDWARE_ADDR_RANGE;
        MacAddr::from_slice(self.arp_data(start, end))
    }

    pub fn target_protocol_addr(&self) -> Ipv4Addr {
        let (start, end) = TARGET_PROTOCOL_ADDR_RANGE;
        let octets: [u8; 4] = self.arp_data(start, end).try_into().unwrap();
        Ipv4Addr::from(octets)
    }

    pub fn set_hardware_type(&mut self, htype: u16) -> &mut Self {
        let (start, end) = HARDWARE_TYPE_RANGE;
        self.set_arp_data(&htype.to_be_bytes(), start, end)
    }

    pub fn set_protocol_type(&mut self, ptype: u16) -> &mut Self {
        let (start, end) = PROTOCOL_TYPE_RANGE;
        self.set_arp_data(&ptype.to_be_bytes(), start, end)
    }

    pub fn set_hardware_addr_len(&mut self, len: u8) -> &mut Self {
        let (start, end) = HARDWARE_ADDR_LEN_RANGE;
        self.set_arp_data(&[len], start, end)
    }

    pub fn set_protocol_addr_len(&mut self, len: u8) -> &mut Self {
        let (start, end) = PROTOCOL_ADDR_LEN_RANGE;
        self.set_arp_data(&[len], start, end)
    }

    pub fn set_opcode(&mut self, op: ArpOp) -> &mut Self {
        let (start, end) = OPCODE_RANGE;
        self.set_arp_data(&u16::from(op).to_be_bytes(), start, end)
    }

    pub fn set_sender_hardware_addr(&mut self, addr: MacAddr) -> &mut Self {
        let (start, end) = SENDER_HARDWARE_ADDR_RANGE;
        self.set_arp_data(&addr.bytes, start, end)
    }

    pub fn set_sender_protocol_addr(&mut self, addr: Ipv4Addr) -> &mut Self {
        let (start, end) = SENDER_PROTOCOL_ADDR_RANGE;
        self.set_arp_data(&addr.octets(), start, end)
    }

    pub fn set_target_hardware_addr(&mut self, addr: MacAddr) -> &mut Self {
        let (start, end) = TARGET_HARDWARE_ADDR_RANGE;
        self.set_arp_data(&addr.bytes, start, end)
    }

    pub fn set_target_protocol_addr(&mut self, addr: Ipv4Addr) -> &mut Self {
        let (start, end) = TARGET_PROTOCOL_ADDR_RANGE;
        self.set_arp_data(&addr.octets(), start, end)
    }

    /// The 28 ARP bytes, without any link header or padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.arp_offset..self.arp_offset + ARP_PACKET_LEN]
    }

    // Returns the bytes of the ARP packet between start and end, exclusive
    fn arp_data(&self, start: usize, end: usize) -> &[u8] {
        &self.data[self.arp_offset + start..self.arp_offset + end]
    }

    fn set_arp_data(&mut self, bytes: &[u8], start: usize, end: usize) -> &mut Self {
        self.data[self.arp_offset + start..self.arp_offset + end].copy_from_slice(bytes);
        self
    }
}

impl Default for ArpPacket {
    fn default() -> Self {
        ArpPacket::new()
    }
}

impl TryFrom<EthernetFrame> for ArpPacket {
    type Error = &'static str;

    fn try_from(frame: EthernetFrame) -> Result<Self, Self::Error> {
        if frame.ether_type() != ARP_ETHER_TYPE {
            return Err("Frame does not have ARP ether type.");
        };
        ArpPacket::from_buffer(frame.data, Some(0), frame.payload_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_empty_arp_packet() {
        let packet = ArpPacket::new();
        assert_eq!(packet.hardware_type(), 1);
        assert_eq!(packet.protocol_type(), 0x0800);
        assert_eq!(packet.hardware_addr_len(), 6);
        assert_eq!(packet.protocol_addr_len(), 4);
        assert_eq!(packet.opcode(), ArpOp::Unknown(0));
        assert_eq!(packet.sender_hardware_addr(), MacAddr::ZERO);
        assert_eq!(packet.sender_protocol_addr(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(packet.target_hardware_addr(), MacAddr::ZERO);
        assert_eq!(packet.target_protocol_addr(), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn arp_packet_from_ethernet() -> Result<(), String> {
        let arp_payload: Vec<u8> = vec![
            0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01, 1, 2, 3, 4, 5, 6, 10, 0, 0, 1, 10, 9,
            8, 7, 6, 5, 0xff, 0xff, 0xff, 0xff,
        ];
        let frame = EthernetFrame::encap(ARP_ETHER_TYPE, &arp_payload);

        let packet = ArpPacket::try_from(frame)?;
        assert_eq!(packet.opcode(), ArpOp::Request);
        assert_eq!(packet.sender_hardware_addr(), MacAddr::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(packet.sender_protocol_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.target_hardware_addr(), MacAddr::new([10, 9, 8, 7, 6, 5]));
        assert_eq!(packet.target_protocol_addr(), Ipv4Addr::BROADCAST);
        assert_eq!(packet.as_bytes(), &arp_payload[..]);
        Ok(())
    }

    #[test]
    fn accepts_padded_frames() {
        let request = ArpPacket::request(
            MacAddr::new([2, 0, 0, 0, 0, 1]),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let mut frame = EthernetFrame::encap_arp(&request);
        frame.pad();
        let packet = ArpPacket::try_from(frame).unwrap();
        assert_eq!(packet.target_protocol_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.as_bytes(), request.as_bytes());
    }

    #[test]
    fn rejects_malformed() {
        let mut frame = EthernetFrame::encap(ARP_ETHER_TYPE, &[0x00, 0x01, 0x08, 0x00, 6, 4]);
        assert!(ArpPacket::try_from(frame.clone()).is_err());

        // IPv6 protocol type
        let mut request = ArpPacket::new();
        request.set_protocol_type(0x86DD);
        frame = EthernetFrame::encap_arp(&request);
        assert_eq!(
            ArpPacket::try_from(frame).unwrap_err(),
            "ARP protocol type is not IPv4"
        );

        let mut request = ArpPacket::new();
        request.set_hardware_addr_len(8);
        let frame = EthernetFrame::encap_arp(&request);
        assert!(ArpPacket::try_from(frame).is_err());

        let frame = EthernetFrame::encap(IPV4_ETHER_TYPE, ArpPacket::new().as_bytes());
        assert!(ArpPacket::try_from(frame).is_err());
    }

    #[test]
    fn request_layout() {
        let request = ArpPacket::request(
            MacAddr::new([2, 0, 0, 0, 0, 1]),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
        );
        assert_eq!(
            request.as_bytes(),
            &[
                0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01, 2, 0, 0, 0, 0, 1, 10, 0, 0, 2, 0, 0, 0,
                0, 0, 0, 10, 0, 0, 1
            ][..]
        );
    }

    #[test]
    fn reply_layout() {
        let reply = ArpPacket::reply(
            MacAddr::new([2, 0, 0, 0, 0, 1]),
            Ipv4Addr::new(10, 0, 0, 1),
            MacAddr::new([2, 0, 0, 0, 0, 2]),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        assert_eq!(reply.opcode(), ArpOp::Reply);
        assert_eq!(&reply.as_bytes()[6..8], &[0, 2]);
        assert_eq!(reply.target_hardware_addr(), MacAddr::new([2, 0, 0, 0, 0, 2]));
    }
}
