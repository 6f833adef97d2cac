//! Payload extraction from a stream of IPv4/UDP packets.
//!
//! Every packet is a 20 byte IPv4 header without options, an 8 byte UDP
//! header and the UDP payload. The next packet starts `total_length` bytes
//! after the current one. Only packets with valid IPv4 and UDP checksums
//! that travel between the configured addresses contribute their payload.

use std::net::Ipv4Addr;

use log::*;

use super::{LayerError, Result};
use crate::memory::Byte;

pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

/// Which packets are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketFilter {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub destination_port: u16,
}

impl Default for PacketFilter {
    fn default() -> Self {
        Self {
            source: Ipv4Addr::new(10, 1, 1, 10),
            destination: Ipv4Addr::new(10, 1, 1, 200),
            destination_port: 42069,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Header length in 32 bit words
    pub ihl: u8,
    pub total_length: u16,
    pub identification: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    fn parse(bytes: &[Byte]) -> Self {
        Self {
            version: bytes[0] >> 4,
            ihl: bytes[0] & 0x0F,
            total_length: be16(&bytes[2..4]),
            identification: be16(&bytes[4..6]),
            ttl: bytes[8],
            protocol: bytes[9],
            checksum: be16(&bytes[10..12]),
            source: Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]),
            destination: Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    /// Length of header and payload
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    fn parse(bytes: &[Byte]) -> Self {
        Self {
            source_port: be16(&bytes[0..2]),
            destination_port: be16(&bytes[2..4]),
            length: be16(&bytes[4..6]),
            checksum: be16(&bytes[6..8]),
        }
    }
}

fn be16(bytes: &[Byte]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Internet checksum: ones' complement of the ones' complement sum of all
/// big endian 16 bit words. An odd trailing byte is padded with zero.
/// Data that contains its own correct checksum sums to 0.
pub fn checksum(data: &[Byte]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|word| u32::from(u16::from_be_bytes([word[0], *word.get(1).unwrap_or(&0)])))
        .sum();

    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Checks the UDP checksum over the IPv4 pseudo header, the UDP header and
/// the payload
fn udp_checksum_ok(ip: &Ipv4Header, udp: &[Byte]) -> bool {
    let mut pseudo = Vec::with_capacity(12 + udp.len());
    pseudo.extend_from_slice(&ip.source.octets());
    pseudo.extend_from_slice(&ip.destination.octets());
    pseudo.extend_from_slice(&[0, ip.protocol]);
    pseudo.extend_from_slice(&(udp.len() as u16).to_be_bytes());
    pseudo.extend_from_slice(udp);

    checksum(&pseudo) == 0
}

fn need(packet: &[Byte], offset: usize, needed: usize) -> Result<()> {
    if packet.len() < needed {
        return Err(LayerError::TruncatedPacket {
            offset,
            needed,
            available: packet.len(),
        });
    }

    Ok(())
}

/// Concatenates the payloads of all packets in `data` that pass `filter`
pub fn decode(data: &[Byte], filter: &PacketFilter) -> Result<Vec<Byte>> {
    let mut payload = Vec::new();
    let mut offset = 0;
    let (mut kept, mut dropped) = (0usize, 0usize);

    while offset < data.len() {
        let packet = &data[offset..];
        need(packet, offset, IPV4_HEADER_LEN + UDP_HEADER_LEN)?;

        let ip = Ipv4Header::parse(&packet[..IPV4_HEADER_LEN]);
        let udp = UdpHeader::parse(&packet[IPV4_HEADER_LEN..IPV4_HEADER_LEN + UDP_HEADER_LEN]);

        if usize::from(ip.total_length) < IPV4_HEADER_LEN + UDP_HEADER_LEN {
            return Err(LayerError::InvalidLength {
                offset,
                field: "total length",
                value: ip.total_length,
            });
        }
        if usize::from(udp.length) < UDP_HEADER_LEN {
            return Err(LayerError::InvalidLength {
                offset,
                field: "UDP length",
                value: udp.length,
            });
        }

        let udp_end = IPV4_HEADER_LEN + usize::from(udp.length);
        need(packet, offset, udp_end)?;
        let datagram = &packet[IPV4_HEADER_LEN..udp_end];

        let verdict = if checksum(&packet[..IPV4_HEADER_LEN]) != 0 {
            Err("IPv4 checksum mismatch")
        } else if !udp_checksum_ok(&ip, datagram) {
            Err("UDP checksum mismatch")
        } else if ip.source != filter.source {
            Err("unexpected source address")
        } else if ip.destination != filter.destination {
            Err("unexpected destination address")
        } else if udp.destination_port != filter.destination_port {
            Err("unexpected destination port")
        } else {
            Ok(())
        };

        match verdict {
            Ok(()) => {
                payload.extend_from_slice(&datagram[UDP_HEADER_LEN..]);
                kept += 1;
            }
            Err(reason) => {
                debug!(
                    "Dropping packet at {} ({} -> {}:{}): {}",
                    offset, ip.source, ip.destination, udp.destination_port, reason
                );
                dropped += 1;
            }
        }

        offset += usize::from(ip.total_length);
    }

    if dropped > 0 {
        warn!("Dropped {} of {} packets", dropped, kept + dropped);
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    const SOURCE: [Byte; 4] = [10, 1, 1, 10];
    const DESTINATION: [Byte; 4] = [10, 1, 1, 200];

    fn packet(source: [Byte; 4], destination: [Byte; 4], port: u16, payload: &[Byte]) -> Vec<Byte> {
        let total_length = (IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len()) as u16;
        let udp_length = (UDP_HEADER_LEN + payload.len()) as u16;

        let mut ip = vec![0x45, 0x00];
        ip.extend(total_length.to_be_bytes());
        ip.extend([0x00, 0x01, 0x40, 0x00, 64, 17, 0x00, 0x00]);
        ip.extend(source);
        ip.extend(destination);
        let ip_checksum = checksum(&ip);
        ip[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

        let mut udp = Vec::new();
        udp.extend(4321u16.to_be_bytes());
        udp.extend(port.to_be_bytes());
        udp.extend(udp_length.to_be_bytes());
        udp.extend([0x00, 0x00]);
        udp.extend(payload);

        let mut pseudo = source.to_vec();
        pseudo.extend(destination);
        pseudo.extend([0, 17]);
        pseudo.extend(udp_length.to_be_bytes());
        pseudo.extend(&udp);
        let udp_checksum = checksum(&pseudo);
        udp[6..8].copy_from_slice(&udp_checksum.to_be_bytes());

        ip.extend(udp);
        ip
    }

    #[test]
    fn test_checksum() {
        // example header from RFC 1071 style walkthroughs
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(checksum(&header), 0);

        let mut zeroed = header;
        zeroed[10] = 0;
        zeroed[11] = 0;
        assert_eq!(checksum(&zeroed), 0xb861);
    }

    #[test]
    fn test_keeps_matching_packets() -> Result<()> {
        let mut stream = packet(SOURCE, DESTINATION, 42069, b"Hello, ");
        stream.extend(packet(SOURCE, DESTINATION, 42069, b"world"));

        assert_eq!(
            decode(&stream, &PacketFilter::default())?,
            b"Hello, world".to_vec()
        );

        Ok(())
    }

    #[test]
    fn test_drops_foreign_packets() -> Result<()> {
        let mut stream = packet(SOURCE, DESTINATION, 42069, b"a");
        stream.extend(packet([10, 1, 1, 11], DESTINATION, 42069, b"b"));
        stream.extend(packet(SOURCE, [10, 1, 1, 201], 42069, b"c"));
        stream.extend(packet(SOURCE, DESTINATION, 42070, b"d"));
        stream.extend(packet(SOURCE, DESTINATION, 42069, b"e"));

        assert_eq!(decode(&stream, &PacketFilter::default())?, b"ae".to_vec());

        Ok(())
    }

    #[test]
    fn test_drops_corrupted_packets() -> Result<()> {
        let mut bad_ip = packet(SOURCE, DESTINATION, 42069, b"ip");
        bad_ip[8] ^= 0x01; // ttl

        let mut bad_udp = packet(SOURCE, DESTINATION, 42069, b"udp");
        let last = bad_udp.len() - 1;
        bad_udp[last] ^= 0x01;

        let mut stream = bad_ip;
        stream.extend(bad_udp);
        stream.extend(packet(SOURCE, DESTINATION, 42069, b"ok"));

        assert_eq!(decode(&stream, &PacketFilter::default())?, b"ok".to_vec());

        Ok(())
    }

    #[test]
    fn test_custom_filter() -> Result<()> {
        let stream = packet([192, 168, 0, 1], [192, 168, 0, 2], 53, b"dns");
        let filter = PacketFilter {
            source: Ipv4Addr::new(192, 168, 0, 1),
            destination: Ipv4Addr::new(192, 168, 0, 2),
            destination_port: 53,
        };

        assert_eq!(decode(&stream, &filter)?, b"dns".to_vec());

        Ok(())
    }

    #[test]
    fn test_truncated_stream() {
        let stream = packet(SOURCE, DESTINATION, 42069, b"payload");

        assert_eq!(
            decode(&stream[..stream.len() - 2], &PacketFilter::default()),
            Err(LayerError::TruncatedPacket {
                offset: 0,
                needed: 35,
                available: 33
            })
        );
        assert!(decode(&stream[..10], &PacketFilter::default()).is_err());
    }

    #[test]
    fn test_zero_total_length_is_rejected() {
        let mut stream = packet(SOURCE, DESTINATION, 42069, b"x");
        stream[2] = 0;
        stream[3] = 0;

        assert!(matches!(
            decode(&stream, &PacketFilter::default()),
            Err(LayerError::InvalidLength { offset: 0, .. })
        ));
    }
}
