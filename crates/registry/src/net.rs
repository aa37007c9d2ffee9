//! Local address detection.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

const LOOPBACK: &str = "127.0.0.1";

/// Returns the address this process should announce.
///
/// An explicit override (usually `NODE_IP`) wins. Otherwise the outbound
/// interface is found by connecting a UDP socket, which sends no packets.
/// Falls back to loopback when nothing better is found.
pub fn local_ip(override_ip: Option<&str>) -> String {
    if let Some(ip) = override_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        return ip.to_string();
    }

    match detect_outbound_ip() {
        Some(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip.to_string(),
        _ => {
            tracing::warn!("could not detect local address, announcing loopback");
            LOOPBACK.to_string()
        }
    }
}

fn detect_outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        assert_eq!(local_ip(Some("10.1.2.3")), "10.1.2.3");
    }

    #[test]
    fn blank_override_is_ignored() {
        let ip = local_ip(Some("  "));
        assert!(ip.parse::<IpAddr>().is_ok());
    }

    #[test]
    fn detection_always_yields_an_address() {
        let ip = local_ip(None);
        assert!(ip.parse::<IpAddr>().is_ok());
    }
}
