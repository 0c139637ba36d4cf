use crate::*;
use std::borrow::Cow;
use std::convert::{TryFrom, TryInto};

#[derive(Clone, Debug)]
pub struct EthernetFrame {
    pub data: PacketData,
    pub payload_offset: usize,
}

impl EthernetFrame {
    pub fn from_buffer(frame: PacketData) -> Result<EthernetFrame, &'static str> {
        // Ethernet II frames must be at least the header, which is 14bytes
        // 0                    6                    12                      14
        // |---6 byte Dest_MAC--|---6 byte Src_MAC---|--2 Byte EtherType---|
        if frame.len() < ETHERNET_HEADER_LEN {
            return Err("Frame is less than the minimum of 14 bytes");
        }

        Ok(EthernetFrame {
            data: frame,
            payload_offset: ETHERNET_HEADER_LEN,
        })
    }

    /// Returns an empty EthernetFrame where all values all populated to zero.
    pub fn empty() -> EthernetFrame {
        EthernetFrame {
            data: vec![0; ETHERNET_HEADER_LEN],
            payload_offset: ETHERNET_HEADER_LEN,
        }
    }

    /// Builds a frame around `payload`, with zeroed MAC addresses.
    pub fn encap(ether_type: u16, payload: &[u8]) -> EthernetFrame {
        let mut frame = EthernetFrame::empty();
        frame.set_ether_type(ether_type);
        frame.set_payload(payload);
        frame
    }

    pub fn encap_ipv4(ipv4: &Ipv4Packet) -> EthernetFrame {
        EthernetFrame::encap(IPV4_ETHER_TYPE, &ipv4.data[ipv4.layer3_offset..])
    }

    pub fn encap_arp(arp: &ArpPacket) -> EthernetFrame {
        EthernetFrame::encap(ARP_ETHER_TYPE, &arp.data[arp.arp_offset..])
    }

    pub fn dest_mac(&self) -> MacAddr {
        MacAddr::from_slice(&self.data[0..6])
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr::from_slice(&self.data[6..12])
    }

    pub fn set_dest_mac(&mut self, mac: MacAddr) -> &mut Self {
        self.data[..6].copy_from_slice(&mac.bytes[..6]);
        self
    }

    pub fn set_src_mac(&mut self, mac: MacAddr) -> &mut Self {
        self.data[6..12].copy_from_slice(&mac.bytes[..6]);
        self
    }

    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.data[12..=13].try_into().unwrap())
    }

    pub fn set_ether_type(&mut self, ether_type: u16) -> &mut Self {
        self.data[12..=13].copy_from_slice(&ether_type.to_be_bytes());
        self
    }

    // This gives you a cow of a slice of the payload.
    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    pub fn set_payload(&mut self, payload: &[u8]) -> &mut Self {
        self.data.truncate(self.payload_offset);
        self.data.reserve_exact(payload.len());
        self.data.extend(payload);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() <= self.payload_offset
    }

    /// Zero pads the frame up to the Ethernet minimum frame size.
    pub fn pad(&mut self) -> &mut Self {
        if self.data.len() < ETHERNET_MIN_FRAME_LEN {
            self.data.resize(ETHERNET_MIN_FRAME_LEN, 0);
        }
        self
    }
}

/// EthernetFrames are considered the same if they carry the same bytes.
impl PartialEq for EthernetFrame {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for EthernetFrame {}

impl TryFrom<Ipv4Packet> for EthernetFrame {
    type Error = &'static str;

    fn try_from(packet: Ipv4Packet) -> Result<Self, Self::Error> {
        if packet.layer2_offset.is_some() {
            EthernetFrame::from_buffer(packet.data)
        } else {
            Err("IPv4 Packet does not contain an Ethernet Frame")
        }
    }
}

impl TryFrom<ArpPacket> for EthernetFrame {
    type Error = &'static str;

    fn try_from(packet: ArpPacket) -> Result<Self, Self::Error> {
        if packet.layer2_offset.is_some() {
            EthernetFrame::from_buffer(packet.data)
        } else {
            Err("ARP Packet does not contain an Ethernet Frame")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_frame() {
        let data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6, 0, 0];
        let frame = EthernetFrame::from_buffer(data).unwrap();
        assert_eq!(
            frame.dest_mac(),
            MacAddr::new([0xde, 0xad, 0xbe, 0xef, 0xff, 0xff])
        );
        assert_eq!(frame.src_mac(), MacAddr::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(frame.ether_type(), 0);
        assert_eq!(frame.payload().len(), 0);
        assert!(frame.is_empty());
    }

    #[test]
    fn set_payload() {
        let data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6, 0, 0];
        let mut frame = EthernetFrame::from_buffer(data).unwrap();

        let new_payload: Vec<u8> = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];
        frame.set_payload(&new_payload);
        assert_eq!(frame.payload(), new_payload);
        assert_eq!(frame.payload()[2], 3);
        assert_eq!(frame.len(), 23);
    }

    #[test]
    fn invalid_data_length() {
        let data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6];
        assert_eq!(
            EthernetFrame::from_buffer(data).unwrap_err(),
            "Frame is less than the minimum of 14 bytes"
        );
    }

    #[test]
    fn set_macs() {
        let mut frame = EthernetFrame::empty();
        let dest = MacAddr::new([0x98, 0x88, 0x18, 0x12, 0xb4, 0xdf]);
        let src = MacAddr::new([2, 0, 0, 0, 0, 1]);
        frame.set_dest_mac(dest).set_src_mac(src);
        assert_eq!(frame.dest_mac(), dest);
        assert_eq!(frame.src_mac(), src);
        assert_eq!(&frame.data[..12], &[0x98, 0x88, 0x18, 0x12, 0xb4, 0xdf, 2, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn ether_type_is_big_endian() {
        let frame = EthernetFrame::encap(ARP_ETHER_TYPE, &[]);
        assert_eq!(frame.ether_type(), ARP_ETHER_TYPE);
        assert_eq!(&frame.data[12..14], &[0x08, 0x06]);
    }

    #[test]
    fn pad_to_minimum() {
        let mut frame = EthernetFrame::encap(IPV4_ETHER_TYPE, &[1, 2, 3]);
        frame.pad();
        assert_eq!(frame.len(), ETHERNET_MIN_FRAME_LEN);
        assert_eq!(&frame.payload()[..4], &[1, 2, 3, 0]);

        let mut big = EthernetFrame::encap(IPV4_ETHER_TYPE, &[7; 100]);
        big.pad();
        assert_eq!(big.len(), 114);
    }

    #[test]
    fn encap_decap_ipv4() {
        let mut ipv4 = Ipv4Packet::empty();
        ipv4.set_payload(&[9, 9, 9]);
        let frame = EthernetFrame::encap_ipv4(&ipv4);
        assert_eq!(frame.ether_type(), IPV4_ETHER_TYPE);
        assert_eq!(frame.payload_offset, 14);

        let packet = Ipv4Packet::try_from(frame).unwrap();
        assert_eq!(packet.layer2_offset, Some(0));
        assert_eq!(packet.layer3_offset, 14);
        assert_eq!(packet.payload(), vec![9, 9, 9]);

        let frame = EthernetFrame::try_from(packet).unwrap();
        assert_eq!(frame.len(), 14 + 23);
    }
}
