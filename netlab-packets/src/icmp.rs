use crate::*;
use std::borrow::Cow;
use std::convert::{TryFrom, TryInto};

/// The size of an ICMP echo "header", which precedes the data field
pub const ICMP_HEADER_LEN: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    EchoRequest,
    Unknown(u8),
}

impl From<u8> for IcmpType {
    fn from(val: u8) -> Self {
        match val {
            0 => IcmpType::EchoReply,
            8 => IcmpType::EchoRequest,
            other => IcmpType::Unknown(other),
        }
    }
}

impl From<IcmpType> for u8 {
    fn from(icmp_type: IcmpType) -> u8 {
        match icmp_type {
            IcmpType::EchoReply => 0,
            IcmpType::EchoRequest => 8,
            IcmpType::Unknown(other) => other,
        }
    }
}

/// An ICMP message laid out as an echo: type, code, checksum, identifier, sequence, data.
#[derive(Clone, Debug)]
pub struct IcmpMessage {
    pub data: PacketData,
    pub layer2_offset: Option<usize>,
    pub layer3_offset: Option<usize>,
    pub layer4_offset: usize,
    pub payload_offset: usize,
}

impl IcmpMessage {
    pub fn from_buffer(
        data: PacketData,
        layer2_offset: Option<usize>,
        layer3_offset: Option<usize>,
        layer4_offset: usize,
    ) -> Result<IcmpMessage, &'static str> {
        if data.len() < layer4_offset + ICMP_HEADER_LEN {
            return Err("Message too short to contain an ICMP echo header");
        }

        if let Some(layer3_offset) = layer3_offset {
            if data.len() <= layer3_offset + 9
                || IpProtocol::from(data[layer3_offset + 9]) != IpProtocol::ICMP
            {
                return Err("Protocol is incorrect, since it isn't ICMP");
            }
        }

        Ok(IcmpMessage {
            data,
            layer2_offset,
            layer3_offset,
            layer4_offset,
            payload_offset: layer4_offset + ICMP_HEADER_LEN,
        })
    }

    fn echo(icmp_type: IcmpType, identifier: u16, sequence: u16, payload: &[u8]) -> IcmpMessage {
        let mut data = vec![0; ICMP_HEADER_LEN];
        data.extend_from_slice(payload);
        let mut message = IcmpMessage::from_buffer(data, None, None, 0).unwrap();
        message
            .set_icmp_type(icmp_type)
            .set_identifier(identifier)
            .set_sequence(sequence)
            .set_checksum();
        message
    }

    /// An echo request with its checksum already set.
    pub fn echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> IcmpMessage {
        IcmpMessage::echo(IcmpType::EchoRequest, identifier, sequence, payload)
    }

    /// An echo reply with its checksum already set.
    pub fn echo_reply(identifier: u16, sequence: u16, payload: &[u8]) -> IcmpMessage {
        IcmpMessage::echo(IcmpType::EchoReply, identifier, sequence, payload)
    }

    pub fn icmp_type(&self) -> IcmpType {
        IcmpType::from(self.data[self.layer4_offset])
    }

    pub fn set_icmp_type(&mut self, icmp_type: IcmpType) -> &mut Self {
        self.data[self.layer4_offset] = icmp_type.into();
        self
    }

    pub fn code(&self) -> u8 {
        self.data[self.layer4_offset + 1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 2..=self.layer4_offset + 3]
                .try_into()
                .unwrap(),
        )
    }

    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 4..=self.layer4_offset + 5]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_identifier(&mut self, identifier: u16) -> &mut Self {
        self.data[self.layer4_offset + 4..=self.layer4_offset + 5]
            .copy_from_slice(&identifier.to_be_bytes());
        self
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 6..=self.layer4_offset + 7]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_sequence(&mut self, sequence: u16) -> &mut Self {
        self.data[self.layer4_offset + 6..=self.layer4_offset + 7]
            .copy_from_slice(&sequence.to_be_bytes());
        self
    }

    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    /// The whole message, header and data.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.layer4_offset..]
    }

    /// The checksum covers the whole ICMP message.
    pub fn validate_checksum(&self) -> bool {
        checksum::verify(self.as_bytes())
    }

    pub fn set_checksum(&mut self) -> &mut Self {
        self.data[self.layer4_offset + 2] = 0;
        self.data[self.layer4_offset + 3] = 0;
        let new_checksum = checksum::compute(self.as_bytes());
        self.data[self.layer4_offset + 2..=self.layer4_offset + 3]
            .copy_from_slice(&new_checksum.to_be_bytes());
        self
    }
}

impl PartialEq for IcmpMessage {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for IcmpMessage {}

impl TryFrom<Ipv4Packet> for IcmpMessage {
    type Error = &'static str;

    fn try_from(packet: Ipv4Packet) -> Result<Self, Self::Error> {
        IcmpMessage::from_buffer(
            packet.data,
            packet.layer2_offset,
            Some(packet.layer3_offset),
            packet.payload_offset,
        )
    }
}
