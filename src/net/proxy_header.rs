//! PROXY protocol (v1/v2) support.
//!
//! A load balancer in front of the proxy prepends the header as the first
//! datagram of a session. Towards backends the proxy writes a v2 header
//! the same way.

use std::net::{SocketAddr, SocketAddrV6};

use proxy_protocol::{version1, version2, ParseError, ProxyHeader};

/// Parse a PROXY header at the start of `packet`.
///
/// Returns the original source address, if the header carries one, and the
/// bytes that followed the header in the same packet.
pub fn parse(packet: &[u8]) -> Result<(Option<SocketAddr>, &[u8]), ParseError> {
    let mut buf = packet;
    let header = proxy_protocol::parse(&mut buf)?;
    Ok((source_addr(&header), buf))
}

fn source_addr(header: &ProxyHeader) -> Option<SocketAddr> {
    match header {
        ProxyHeader::Version1 { addresses } => match addresses {
            version1::ProxyAddresses::Ipv4 { source, .. } => Some(SocketAddr::V4(*source)),
            version1::ProxyAddresses::Ipv6 { source, .. } => Some(SocketAddr::V6(*source)),
            version1::ProxyAddresses::Unknown => None,
        },
        ProxyHeader::Version2 {
            command: version2::ProxyCommand::Proxy,
            addresses,
            ..
        } => match addresses {
            version2::ProxyAddresses::Ipv4 { source, .. } => Some(SocketAddr::V4(*source)),
            version2::ProxyAddresses::Ipv6 { source, .. } => Some(SocketAddr::V6(*source)),
            version2::ProxyAddresses::Unspec | version2::ProxyAddresses::Unix { .. } => None,
        },
        // LOCAL commands describe the balancer itself.
        _ => None,
    }
}

/// Encode a v2 datagram header announcing `source` connecting to `destination`.
pub fn encode_v2(source: SocketAddr, destination: SocketAddr) -> Vec<u8> {
    let addresses = match (source, destination) {
        (SocketAddr::V4(source), SocketAddr::V4(destination)) => {
            version2::ProxyAddresses::Ipv4 {
                source,
                destination,
            }
        }
        (source, destination) => version2::ProxyAddresses::Ipv6 {
            source: to_v6(source),
            destination: to_v6(destination),
        },
    };

    proxy_protocol::encode(ProxyHeader::Version2 {
        command: version2::ProxyCommand::Proxy,
        transport_protocol: version2::ProxyTransportProtocol::Datagram,
        addresses,
    })
    .map(|header| header.to_vec())
    .unwrap_or_default()
}

fn to_v6(addr: SocketAddr) -> SocketAddrV6 {
    match addr {
        SocketAddr::V6(addr) => addr,
        SocketAddr::V4(addr) => SocketAddrV6::new(addr.ip().to_ipv6_mapped(), addr.port(), 0, 0),
    }
}
