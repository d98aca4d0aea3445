//! Unprivileged ICMP echo over a datagram socket
//!
//! Linux (with `net.ipv4.ping_group_range` covering the process group) and
//! macOS accept `SOCK_DGRAM` + `IPPROTO_ICMP` without raw-socket privileges.
//! On Linux the kernel rewrites the identifier field, so replies are matched
//! on sequence number and payload token only. macOS prepends the IPv4 header
//! to received datagrams; Linux does not.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout_at;

const ECHO_REQUEST: u8 = 8;
const ECHO_REPLY: u8 = 0;
const HEADER_LEN: usize = 8;
const TOKEN_LEN: usize = 8;

pub(crate) struct IcmpSocket {
    socket: UdpSocket,
    token: u64,
}

impl IcmpSocket {
    pub(crate) fn open() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self {
            socket,
            token: (std::process::id() as u64) << 32 | 0x6e77,
        })
    }

    /// Send one echo request and wait for the matching reply.
    ///
    /// `Ok(None)` means no matching reply before `wait` elapsed.
    pub(crate) async fn echo(&self, addr: Ipv4Addr, sequence: u16, wait: Duration) -> io::Result<Option<Duration>> {
        let packet = build_echo_request(sequence, self.token);
        let deadline = tokio::time::Instant::now() + wait;
        let start = Instant::now();

        self.socket
            .send_to(&packet, SocketAddr::V4(SocketAddrV4::new(addr, 0)))
            .await?;

        let mut buf = [0u8; 1500];
        loop {
            let received = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            };
            let (len, _from) = received;

            if let Some(reply) = parse_echo_reply(&buf[..len]) {
                if reply.sequence == sequence && reply.token == Some(self.token) {
                    return Ok(Some(start.elapsed()));
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct EchoReply {
    pub sequence: u16,
    pub token: Option<u64>,
}

pub(crate) fn build_echo_request(sequence: u16, token: u64) -> [u8; HEADER_LEN + TOKEN_LEN] {
    let mut packet = [0u8; HEADER_LEN + TOKEN_LEN];
    packet[0] = ECHO_REQUEST;
    // identifier (bytes 4..6) left at 0, the kernel assigns it
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    packet[HEADER_LEN..].copy_from_slice(&token.to_be_bytes());

    let checksum = internet_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

pub(crate) fn parse_echo_reply(datagram: &[u8]) -> Option<EchoReply> {
    let icmp = match datagram.first() {
        Some(first) if first >> 4 == 4 => {
            let ihl = ((first & 0x0f) as usize) * 4;
            datagram.get(ihl..)?
        }
        Some(_) => datagram,
        None => return None,
    };

    if icmp.len() < HEADER_LEN || icmp[0] != ECHO_REPLY {
        return None;
    }

    let sequence = u16::from_be_bytes([icmp[6], icmp[7]]);
    let token = icmp
        .get(HEADER_LEN..HEADER_LEN + TOKEN_LEN)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_be_bytes);

    Some(EchoReply { sequence, token })
}

fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_reply(mut packet: [u8; HEADER_LEN + TOKEN_LEN]) -> [u8; HEADER_LEN + TOKEN_LEN] {
        packet[0] = ECHO_REPLY;
        packet
    }

    #[test]
    fn test_echo_request_checksum() {
        let packet = build_echo_request(7, 0xdead_beef);
        assert_eq!(packet[0], ECHO_REQUEST);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 7);
        // Summing a packet with a valid checksum folds to zero
        assert_eq!(internet_checksum(&packet), 0);
    }

    #[test]
    fn test_parse_bare_reply() {
        let reply = as_reply(build_echo_request(42, 99));
        assert_eq!(
            parse_echo_reply(&reply),
            Some(EchoReply { sequence: 42, token: Some(99) })
        );
    }

    #[test]
    fn test_parse_reply_with_ipv4_header() {
        let mut datagram = vec![0x45u8];
        datagram.extend_from_slice(&[0u8; 19]);
        datagram.extend_from_slice(&as_reply(build_echo_request(3, 1234)));

        assert_eq!(
            parse_echo_reply(&datagram),
            Some(EchoReply { sequence: 3, token: Some(1234) })
        );
    }

    #[test]
    fn test_parse_rejects_requests_and_truncated() {
        assert_eq!(parse_echo_reply(&build_echo_request(1, 1)), None);
        assert_eq!(parse_echo_reply(&[0u8; 4]), None);
        assert_eq!(parse_echo_reply(&[]), None);
    }
}
