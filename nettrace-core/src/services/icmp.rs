//! ICMP echo probing shared by ping and traceroute.
//!
//! Packets are built and parsed with `pnet_packet`; sockets come from `socket2`.
//! A raw socket is tried first (it sees Time Exceeded messages and reply TTLs);
//! without privileges the unprivileged datagram ICMP socket is used instead.

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::trace;
use pnet_packet::Packet;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet};
use pnet_packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, Socket, Type};

/// ICMP echo header length (type, code, checksum, identifier, sequence).
const ECHO_HEADER_LEN: usize = 8;
/// Fixed IPv6 header length quoted inside ICMPv6 errors.
const IPV6_HEADER_LEN: usize = 40;
/// Receive buffer size; large enough for any reply to our echo sizes.
const RECV_BUFFER_LEN: usize = 65_536;

static NEXT_IDENTIFIER: AtomicU16 = AtomicU16::new(0);

/// Identifier for a new probe session, distinct per call within the process.
pub fn next_identifier() -> u16 {
    // u32 -> u16: only the low bits are needed to tell sessions apart
    #[allow(clippy::cast_possible_truncation)]
    let pid = std::process::id() as u16;
    pid.wrapping_add(NEXT_IDENTIFIER.fetch_add(1, Ordering::Relaxed))
}

/// One echo request to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: IpAddr,
    /// Outgoing TTL / hop limit.
    pub ttl: u8,
    pub identifier: u16,
    pub sequence: u16,
    pub payload_size: usize,
    pub timeout: Duration,
}

/// What came back for a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReply {
    /// Echo reply from the target.
    Echo {
        from: IpAddr,
        rtt: Duration,
        ttl: Option<u8>,
    },
    /// A router discarded the probe because its TTL ran out.
    TimeExceeded { from: IpAddr, rtt: Duration },
    /// Destination unreachable, with the ICMP code.
    Unreachable { from: IpAddr, rtt: Duration, code: u8 },
}

impl ProbeReply {
    pub const fn responder(&self) -> IpAddr {
        match self {
            Self::Echo { from, .. }
            | Self::TimeExceeded { from, .. }
            | Self::Unreachable { from, .. } => *from,
        }
    }

    pub const fn rtt(&self) -> Duration {
        match self {
            Self::Echo { rtt, .. }
            | Self::TimeExceeded { rtt, .. }
            | Self::Unreachable { rtt, .. } => *rtt,
        }
    }
}

/// Sends a single ICMP echo request and waits for the answer that matches it.
///
/// Platform implementation: [`SystemProber`]. Tests substitute their own.
#[async_trait]
pub trait IcmpProber: Send + Sync {
    /// `Ok(None)` when nothing matching arrived within `request.timeout`.
    async fn probe(&self, request: ProbeRequest) -> io::Result<Option<ProbeReply>>;
}

/// Prober backed by OS ICMP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProber;

#[async_trait]
impl IcmpProber for SystemProber {
    async fn probe(&self, request: ProbeRequest) -> io::Result<Option<ProbeReply>> {
        tokio::task::spawn_blocking(move || blocking_probe(&request))
            .await
            .map_err(io::Error::other)?
    }
}

/// Socket flavour actually obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    Raw,
    Datagram,
}

fn open_socket(v6: bool) -> io::Result<(Socket, SocketKind)> {
    let (domain, protocol) = if v6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };
    match Socket::new(domain, Type::RAW, Some(protocol)) {
        Ok(socket) => Ok((socket, SocketKind::Raw)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            trace!("[ICMP] Raw socket not permitted, falling back to datagram ICMP");
            Socket::new(domain, Type::DGRAM, Some(protocol)).map(|s| (s, SocketKind::Datagram))
        }
        Err(e) => Err(e),
    }
}

fn blocking_probe(request: &ProbeRequest) -> io::Result<Option<ProbeReply>> {
    let v6 = request.target.is_ipv6();
    let (socket, kind) = open_socket(v6)?;
    if v6 {
        socket.set_unicast_hops_v6(u32::from(request.ttl))?;
    } else {
        socket.set_ttl(u32::from(request.ttl))?;
    }
    let socket: UdpSocket = socket.into();

    let packet = build_echo_request(v6, request.identifier, request.sequence, request.payload_size)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;

    let started = Instant::now();
    socket.send_to(&packet, SocketAddr::new(request.target, 0))?;

    let deadline = started + request.timeout;
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    // Datagram ICMP sockets get their identifier rewritten by the kernel,
    // which also filters replies per socket.
    let check_identifier = kind == SocketKind::Raw;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        socket.set_read_timeout(Some(remaining))?;

        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let expected = EchoKey {
            identifier: request.identifier,
            sequence: request.sequence,
            check_identifier,
        };
        let parsed = if v6 {
            parse_v6(&buf[..len], expected)
        } else {
            parse_v4(&buf[..len], expected)
        };

        if let Some(parsed) = parsed {
            let rtt = started.elapsed();
            let from = from.ip();
            return Ok(Some(match parsed {
                Parsed::Echo { ttl } => ProbeReply::Echo { from, rtt, ttl },
                Parsed::TimeExceeded => ProbeReply::TimeExceeded { from, rtt },
                Parsed::Unreachable(code) => ProbeReply::Unreachable { from, rtt, code },
            }));
        }
    }
}

/// Build an ICMP (or ICMPv6) echo request. The ICMPv6 checksum is left to the kernel.
///
/// Returns `None` when the payload does not fit in a single datagram.
pub fn build_echo_request(
    v6: bool,
    identifier: u16,
    sequence: u16,
    payload_size: usize,
) -> Option<Vec<u8>> {
    if payload_size > usize::from(u16::MAX) - ECHO_HEADER_LEN {
        return None;
    }
    // Recognisable filler, as classic ping does.
    // usize -> u8: modulo keeps the value in range
    #[allow(clippy::cast_possible_truncation)]
    let payload: Vec<u8> = (0..payload_size).map(|i| (i % 256) as u8).collect();
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + payload_size];

    if v6 {
        let mut body = Vec::with_capacity(4 + payload_size);
        body.extend_from_slice(&identifier.to_be_bytes());
        body.extend_from_slice(&sequence.to_be_bytes());
        body.extend_from_slice(&payload);

        let mut packet = MutableIcmpv6Packet::new(&mut buffer)?;
        packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
        packet.set_icmpv6_code(Icmpv6Code::new(0));
        packet.set_payload(&body);
    } else {
        {
            let mut packet = MutableEchoRequestPacket::new(&mut buffer)?;
            packet.set_icmp_type(IcmpTypes::EchoRequest);
            packet.set_icmp_code(IcmpCode::new(0));
            packet.set_identifier(identifier);
            packet.set_sequence_number(sequence);
            packet.set_payload(&payload);
        }
        let checksum = pnet_packet::icmp::checksum(&IcmpPacket::new(&buffer)?);
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    Some(buffer)
}

/// Identity of the echo request we are waiting for.
#[derive(Debug, Clone, Copy)]
struct EchoKey {
    identifier: u16,
    sequence: u16,
    check_identifier: bool,
}

impl EchoKey {
    /// `bytes` starts at the echo identifier field.
    fn matches(self, bytes: &[u8]) -> bool {
        if bytes.len() < 4 {
            return false;
        }
        let identifier = u16::from_be_bytes([bytes[0], bytes[1]]);
        let sequence = u16::from_be_bytes([bytes[2], bytes[3]]);
        sequence == self.sequence && (!self.check_identifier || identifier == self.identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parsed {
    Echo { ttl: Option<u8> },
    TimeExceeded,
    Unreachable(u8),
}

/// Parse an IPv4 ICMP datagram, with or without the leading IP header.
fn parse_v4(buf: &[u8], expected: EchoKey) -> Option<Parsed> {
    let (icmp, ttl) = if buf.first().is_some_and(|b| b >> 4 == 4) {
        let ip = Ipv4Packet::new(buf)?;
        let header_len = usize::from(ip.get_header_length()) * 4;
        (buf.get(header_len..)?, Some(ip.get_ttl()))
    } else {
        (buf, None)
    };

    let packet = IcmpPacket::new(icmp)?;
    let body = packet.payload();
    match packet.get_icmp_type() {
        IcmpTypes::EchoReply => expected.matches(body).then_some(Parsed::Echo { ttl }),
        IcmpTypes::TimeExceeded => {
            quoted_v4_matches(body, expected).then_some(Parsed::TimeExceeded)
        }
        IcmpTypes::DestinationUnreachable => quoted_v4_matches(body, expected)
            .then_some(Parsed::Unreachable(packet.get_icmp_code().0)),
        _ => None,
    }
}

/// ICMP error bodies carry 4 unused bytes, then the original IP header and 8 bytes of ICMP.
fn quoted_v4_matches(body: &[u8], expected: EchoKey) -> bool {
    let Some(quoted) = body.get(4..) else {
        return false;
    };
    let Some(inner) = Ipv4Packet::new(quoted) else {
        return false;
    };
    let start = usize::from(inner.get_header_length()) * 4;
    match quoted.get(start..) {
        Some(icmp) if icmp.first() == Some(&IcmpTypes::EchoRequest.0) => {
            icmp.get(4..).is_some_and(|ids| expected.matches(ids))
        }
        _ => false,
    }
}

fn parse_v6(buf: &[u8], expected: EchoKey) -> Option<Parsed> {
    let packet = Icmpv6Packet::new(buf)?;
    let body = packet.payload();
    match packet.get_icmpv6_type() {
        Icmpv6Types::EchoReply => expected.matches(body).then_some(Parsed::Echo { ttl: None }),
        Icmpv6Types::TimeExceeded => {
            quoted_v6_matches(body, expected).then_some(Parsed::TimeExceeded)
        }
        Icmpv6Types::DestinationUnreachable => quoted_v6_matches(body, expected)
            .then_some(Parsed::Unreachable(packet.get_icmpv6_code().0)),
        _ => None,
    }
}

fn quoted_v6_matches(body: &[u8], expected: EchoKey) -> bool {
    match body.get(4 + IPV6_HEADER_LEN..) {
        Some(icmp) if icmp.first() == Some(&Icmpv6Types::EchoRequest.0) => {
            icmp.get(4..).is_some_and(|ids| expected.matches(ids))
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: EchoKey = EchoKey {
        identifier: 0xABCD,
        sequence: 7,
        check_identifier: true,
    };

    fn ipv4_header(protocol: u8, ttl: u8, payload_len: usize) -> Vec<u8> {
        let mut header = vec![0u8; 20];
        header[0] = 0x45;
        // usize -> u16: test packets are tiny
        #[allow(clippy::cast_possible_truncation)]
        let total = (20 + payload_len) as u16;
        header[2..4].copy_from_slice(&total.to_be_bytes());
        header[8] = ttl;
        header[9] = protocol;
        header
    }

    #[test]
    fn test_build_echo_request_v4() {
        let packet = build_echo_request(false, 0xABCD, 7, 56).unwrap();
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8); // Echo Request
        assert_eq!(packet[1], 0);
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 0xABCD);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 7);
        let view = IcmpPacket::new(&packet).unwrap();
        assert_eq!(pnet_packet::icmp::checksum(&view), view.get_checksum());
    }

    #[test]
    fn test_build_echo_request_v6() {
        let packet = build_echo_request(true, 1, 2, 8).unwrap();
        assert_eq!(packet.len(), 16);
        assert_eq!(packet[0], 128);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 2);
    }

    #[test]
    fn test_build_rejects_oversized_payload() {
        assert!(build_echo_request(false, 1, 1, 70_000).is_none());
    }

    #[test]
    fn test_parse_echo_reply_without_ip_header() {
        let mut reply = build_echo_request(false, 0xABCD, 7, 4).unwrap();
        reply[0] = 0; // Echo Reply
        assert_eq!(parse_v4(&reply, KEY), Some(Parsed::Echo { ttl: None }));
    }

    #[test]
    fn test_parse_echo_reply_with_ip_header() {
        let mut icmp = build_echo_request(false, 0xABCD, 7, 4).unwrap();
        icmp[0] = 0;
        let mut packet = ipv4_header(1, 57, icmp.len());
        packet.extend_from_slice(&icmp);
        assert_eq!(parse_v4(&packet, KEY), Some(Parsed::Echo { ttl: Some(57) }));
    }

    #[test]
    fn test_parse_echo_reply_wrong_sequence() {
        let mut reply = build_echo_request(false, 0xABCD, 8, 4).unwrap();
        reply[0] = 0;
        assert_eq!(parse_v4(&reply, KEY), None);
    }

    #[test]
    fn test_parse_time_exceeded_quoting_our_probe() {
        let original = build_echo_request(false, 0xABCD, 7, 0).unwrap();
        let mut quoted = ipv4_header(1, 1, original.len());
        quoted.extend_from_slice(&original);

        let mut error = vec![11u8, 0, 0, 0, 0, 0, 0, 0];
        error.extend_from_slice(&quoted);
        let mut packet = ipv4_header(1, 250, error.len());
        packet.extend_from_slice(&error);

        assert_eq!(parse_v4(&packet, KEY), Some(Parsed::TimeExceeded));
    }

    #[test]
    fn test_parse_unreachable_code() {
        let original = build_echo_request(false, 0xABCD, 7, 0).unwrap();
        let mut quoted = ipv4_header(1, 1, original.len());
        quoted.extend_from_slice(&original);
        let mut error = vec![3u8, 1, 0, 0, 0, 0, 0, 0];
        error.extend_from_slice(&quoted);
        assert_eq!(parse_v4(&error, KEY), Some(Parsed::Unreachable(1)));
    }

    #[test]
    fn test_parse_v6_echo_reply() {
        let mut reply = build_echo_request(true, 0xABCD, 7, 4).unwrap();
        reply[0] = 129;
        assert_eq!(parse_v6(&reply, KEY), Some(Parsed::Echo { ttl: None }));
    }

    #[test]
    fn test_datagram_sockets_ignore_identifier() {
        let mut reply = build_echo_request(false, 0x1111, 7, 4).unwrap();
        reply[0] = 0;
        assert_eq!(parse_v4(&reply, KEY), None);
        let relaxed = EchoKey {
            check_identifier: false,
            ..KEY
        };
        assert!(parse_v4(&reply, relaxed).is_some());
    }
}
