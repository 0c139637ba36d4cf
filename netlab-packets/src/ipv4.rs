use crate::*;
use std::borrow::Cow;
use std::convert::{TryFrom, TryInto};
use std::net::Ipv4Addr;

/// Length of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;

/// Flags + fragment offset word with only "Don't Fragment" set.
const DONT_FRAGMENT: u16 = 0x4000;

#[derive(Clone, Debug)]
pub struct Ipv4Packet {
    pub data: PacketData,
    pub layer2_offset: Option<usize>,
    pub layer3_offset: usize,
    pub payload_offset: usize,
}

impl Ipv4Packet {
    pub fn from_buffer(
        mut data: PacketData,
        layer2_offset: Option<usize>,
        layer3_offset: usize,
    ) -> Result<Ipv4Packet, &'static str> {
        if data.len() < layer3_offset + IPV4_HEADER_LEN {
            return Err("Data is too short to be an IPv4 Packet");
        }

        // Check version number
        let version: u8 = (data[layer3_offset] & 0xF0) >> 4;
        if version != 4 {
            return Err("Packet has incorrect version, is not Ipv4Packet");
        }

        // This is the header length in 32bit words
        let ihl = (data[layer3_offset] & 0x0F) as usize;
        if ihl * 4 < IPV4_HEADER_LEN {
            return Err("Packet header length is below the 20 byte minimum");
        }

        // TotalLen is the 3rd and 4th byte of the IP Header
        let total_len = u16::from_be_bytes(
            data[layer3_offset + 2..=layer3_offset + 3]
                .try_into()
                .unwrap(),
        ) as usize;
        if total_len < ihl * 4 || data.len() < layer3_offset + total_len {
            return Err("Packet has invalid total length field");
        }
        // Anything past total length is link layer padding
        data.truncate(layer3_offset + total_len);

        Ok(Ipv4Packet {
            data,
            layer2_offset,
            layer3_offset,
            payload_offset: layer3_offset + (ihl * 4),
        })
    }

    /// A bare 20 byte header: version 4, IHL 5, "Don't Fragment", everything else zero.
    pub fn empty() -> Ipv4Packet {
        let mut data = vec![0; IPV4_HEADER_LEN];
        data[0] = 0x45;
        data[3] = IPV4_HEADER_LEN as u8;
        data[6..8].copy_from_slice(&DONT_FRAGMENT.to_be_bytes());
        Ipv4Packet::from_buffer(data, None, 0).unwrap()
    }

    /// Builds a datagram carrying an ICMP message. The header checksum is left for the
    /// caller to set once the remaining fields are filled in.
    pub fn encap_icmp(icmp: &IcmpMessage) -> Ipv4Packet {
        let mut packet = Ipv4Packet::empty();
        packet.set_protocol(IpProtocol::ICMP);
        packet.set_payload(&icmp.data[icmp.layer4_offset..]);
        packet
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        let data: [u8; 4] = self.data[self.layer3_offset + 12..self.layer3_offset + 16]
            .try_into()
            .unwrap();
        Ipv4Addr::from(data)
    }

    pub fn set_src_addr(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.data[self.layer3_offset + 12..self.layer3_offset + 16].copy_from_slice(&addr.octets());
        self
    }

    pub fn dest_addr(&self) -> Ipv4Addr {
        let data: [u8; 4] = self.data[self.layer3_offset + 16..self.layer3_offset + 20]
            .try_into()
            .unwrap();
        Ipv4Addr::from(data)
    }

    pub fn set_dest_addr(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.data[self.layer3_offset + 16..self.layer3_offset + 20].copy_from_slice(&addr.octets());
        self
    }

    pub fn ihl(&self) -> u8 {
        self.data[self.layer3_offset] & 0x0F
    }

    pub fn header(&self) -> &[u8] {
        &self.data[self.layer3_offset..self.payload_offset]
    }

    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    /// Replaces the payload and rewrites the total length field.
    pub fn set_payload(&mut self, payload: &[u8]) -> &mut Self {
        self.data.truncate(self.payload_offset);
        let total_len = (self.payload_offset - self.layer3_offset + payload.len()) as u16;
        self.data[self.layer3_offset + 2..=self.layer3_offset + 3]
            .copy_from_slice(&total_len.to_be_bytes());
        self.data.reserve_exact(payload.len());
        self.data.extend(payload);
        self
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.data[self.layer3_offset + 9])
    }

    pub fn set_protocol(&mut self, protocol: IpProtocol) -> &mut Self {
        self.data[self.layer3_offset + 9] = protocol.into();
        self
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer3_offset + 2..=self.layer3_offset + 3]
                .try_into()
                .unwrap(),
        )
    }

    pub fn tos(&self) -> u8 {
        self.data[self.layer3_offset + 1]
    }

    pub fn ttl(&self) -> u8 {
        self.data[self.layer3_offset + 8]
    }

    pub fn set_ttl(&mut self, ttl: u8) -> &mut Self {
        self.data[self.layer3_offset + 8] = ttl;
        self
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer3_offset + 4..=self.layer3_offset + 5]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_identification(&mut self, id: u16) -> &mut Self {
        self.data[self.layer3_offset + 4..=self.layer3_offset + 5].copy_from_slice(&id.to_be_bytes());
        self
    }

    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([
            self.data[self.layer3_offset + 6] & 0x1F,
            self.data[self.layer3_offset + 7],
        ])
    }

    /// Returns tuple of (Don't Fragment, More Fragments)
    pub fn flags(&self) -> (bool, bool) {
        let df = (self.data[self.layer3_offset + 6] & 0x40) != 0;
        let mf = (self.data[self.layer3_offset + 6] & 0x20) != 0;
        (df, mf)
    }

    /// True if this datagram is one piece of a fragmented one.
    pub fn is_fragment(&self) -> bool {
        self.flags().1 || self.fragment_offset() != 0
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer3_offset + 10..=self.layer3_offset + 11]
                .try_into()
                .unwrap(),
        )
    }

    /// Verifies the IP header checksum.
    pub fn validate_checksum(&self) -> bool {
        checksum::verify(self.header())
    }

    /// Calculates what the checksum should be set to given the current header
    pub fn calculate_checksum(&self) -> u16 {
        // Word 5 is the checksum field itself
        let full_sum = self
            .header()
            .chunks_exact(2)
            .enumerate()
            .filter(|x| x.0 != 5)
            .fold(0, |acc: u32, x| {
                acc + u32::from(u16::from_be_bytes([x.1[0], x.1[1]]))
            });
        !checksum::fold(full_sum)
    }

    /// Sets checksum field to valid value
    pub fn set_checksum(&mut self) -> &mut Self {
        let new_checksum = self.calculate_checksum();
        self.data[self.layer3_offset + 10..=self.layer3_offset + 11]
            .copy_from_slice(&new_checksum.to_be_bytes());
        self
    }
}

/// Ipv4Packets are considered the same if they have the same data from the layer 3
/// header and onward.
impl PartialEq for Ipv4Packet {
    fn eq(&self, other: &Self) -> bool {
        self.data[self.layer3_offset..] == other.data[other.layer3_offset..]
    }
}

impl Eq for Ipv4Packet {}

impl TryFrom<EthernetFrame> for Ipv4Packet {
    type Error = &'static str;

    fn try_from(frame: EthernetFrame) -> Result<Self, Self::Error> {
        if frame.ether_type() != IPV4_ETHER_TYPE {
            return Err("Frame does not have IPv4 ether type");
        }
        Ipv4Packet::from_buffer(frame.data, Some(0), frame.payload_offset)
    }
}

impl TryFrom<IcmpMessage> for Ipv4Packet {
    type Error = &'static str;

    fn try_from(message: IcmpMessage) -> Result<Self, Self::Error> {
        if let Some(layer3_offset) = message.layer3_offset {
            Ipv4Packet::from_buffer(message.data, message.layer2_offset, layer3_offset)
        } else {
            Err("ICMP Message does not contain an IP Packet")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(ip_data: &[u8]) -> EthernetFrame {
        let mac_data: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 1, 2, 3, 4, 5, 6, 8, 0];
        let mut frame = EthernetFrame::from_buffer(mac_data).unwrap();
        frame.set_payload(ip_data);
        frame
    }

    #[test]
    fn ipv4_packet() {
        let ip_data: Vec<u8> = vec![
            0x45, 0, 0, 20, 0, 0, 0, 0, 64, 17, 0, 0, 192, 178, 128, 0, 10, 0, 0, 1,
        ];
        let packet = Ipv4Packet::try_from(frame_with(&ip_data)).unwrap();

        assert_eq!(packet.src_addr(), Ipv4Addr::new(192, 178, 128, 0));
        assert_eq!(packet.dest_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.ihl(), 5);
        assert_eq!(packet.payload().len(), 0);
        assert_eq!(packet.protocol(), IpProtocol::UDP);
        assert_eq!(packet.total_len(), 20);
        assert_eq!(packet.ttl(), 64);
        assert_eq!(packet.checksum(), 0);
        assert_eq!(packet.tos(), 0);
        assert_eq!(packet.identification(), 0);
        assert_eq!(packet.fragment_offset(), 0);
        assert_eq!(packet.flags(), (false, false));
        assert!(!packet.is_fragment());
    }

    #[test]
    fn too_short() {
        let ip_data: Vec<u8> = vec![0x45, 0, 0, 20, 0, 0, 0, 0, 64, 17];
        assert!(Ipv4Packet::try_from(frame_with(&ip_data)).is_err());
    }

    #[test]
    fn wrong_version() {
        let ip_data: Vec<u8> = vec![
            0x65, 0, 0, 20, 0, 0, 0, 0, 64, 17, 0, 0, 192, 178, 128, 0, 10, 0, 0, 1,
        ];
        assert!(Ipv4Packet::try_from(frame_with(&ip_data)).is_err());
    }

    #[test]
    fn total_length_beyond_data() {
        let ip_data: Vec<u8> = vec![
            0x45, 0, 0, 40, 0, 0, 0, 0, 64, 17, 0, 0, 192, 178, 128, 0, 10, 0, 0, 1,
        ];
        assert!(Ipv4Packet::try_from(frame_with(&ip_data)).is_err());
    }

    #[test]
    fn trims_link_padding() {
        let mut ip_data: Vec<u8> = vec![
            0x45, 0, 0, 22, 0, 0, 0, 0, 64, 1, 0, 0, 192, 178, 128, 0, 10, 0, 0, 1, 0xaa, 0xbb,
        ];
        ip_data.resize(46, 0);
        let packet = Ipv4Packet::try_from(frame_with(&ip_data)).unwrap();
        assert_eq!(packet.payload(), vec![0xaa, 0xbb]);
    }

    #[test]
    fn validate_checksum() {
        let invalid_checksum_data: Vec<u8> = vec![
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let packet = Ipv4Packet::try_from(frame_with(&invalid_checksum_data)).unwrap();
        assert!(!packet.validate_checksum());

        let valid_checksum_data: Vec<u8> = vec![
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0xc0, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let packet = Ipv4Packet::try_from(frame_with(&valid_checksum_data)).unwrap();
        assert!(packet.validate_checksum());
        assert_eq!(packet.calculate_checksum(), packet.checksum());
    }

    #[test]
    fn set_checksum() {
        let ip_data: Vec<u8> = vec![
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let mut packet = Ipv4Packet::try_from(frame_with(&ip_data)).unwrap();
        assert!(!packet.validate_checksum());
        packet.set_checksum();
        assert!(packet.validate_checksum());
        assert_eq!(packet.checksum(), 0xb8c0);
    }

    #[test]
    fn recomputed_checksum_matches_for_built_headers() {
        for ttl in &[1u8, 64, 255] {
            let mut packet = Ipv4Packet::empty();
            packet
                .set_src_addr(Ipv4Addr::new(10, 0, 0, 2))
                .set_dest_addr(Ipv4Addr::new(10, 0, 0, *ttl))
                .set_ttl(*ttl)
                .set_identification(u16::from(*ttl) << 8)
                .set_protocol(IpProtocol::ICMP)
                .set_payload(&[1, 2, 3, 4, 5]);
            packet.set_checksum();
            let original = packet.checksum();

            let mut zeroed = packet.header().to_vec();
            zeroed[10] = 0;
            zeroed[11] = 0;
            assert_eq!(checksum::compute(&zeroed), original);
        }
    }

    #[test]
    fn empty_header() {
        let packet = Ipv4Packet::empty();
        assert_eq!(packet.ihl(), 5);
        assert_eq!(packet.total_len(), 20);
        assert_eq!(packet.flags(), (true, false));
        assert_eq!(packet.layer2_offset, None);
    }

    #[test]
    fn encap_icmp() {
        let message = IcmpMessage::echo_request(7, 1, b"ping");
        let packet = Ipv4Packet::encap_icmp(&message);
        assert_eq!(packet.protocol(), IpProtocol::ICMP);
        assert_eq!(packet.total_len(), 20 + 8 + 4);
        assert_eq!(packet.payload(), message.data);
    }
}
