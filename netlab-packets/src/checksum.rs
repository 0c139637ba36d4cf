//! RFC 1071 Internet checksum, shared by the IPv4 header and ICMP.

/// Sums `data` as a sequence of big endian 16 bit words. An odd trailing byte is
/// padded with a zero on the right.
pub fn sum(data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    let mut acc = chunks
        .by_ref()
        .fold(0u32, |acc, x| acc + u32::from(u16::from_be_bytes([x[0], x[1]])));
    if let [last] = chunks.remainder() {
        acc += u32::from(*last) << 8;
    }
    acc
}

/// Folds the carries back in until the sum fits in 16 bits.
pub fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// The value to store in a checksum field, computed over `data` with that field zeroed.
pub fn compute(data: &[u8]) -> u16 {
    !fold(sum(data))
}

/// True when `data`, checksum field included, sums to all ones.
pub fn verify(data: &[u8]) -> bool {
    fold(sum(data)) == 0xFFFF
}
