use std::net::{IpAddr, UdpSocket};

/// Reported when the outbound interface cannot be determined.
pub const UNKNOWN_IP: &str = "Unknown";

/// Address of the interface used for outbound traffic.
///
/// "Connecting" a UDP socket only selects a route; no packet is sent.
pub fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

pub fn outbound_ip_string() -> String {
    match outbound_ip() {
        Some(ip) => ip.to_string(),
        None => {
            log::warn!("Could not determine local IP address");
            UNKNOWN_IP.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_string_is_address_or_unknown() {
        let ip = outbound_ip_string();
        assert!(ip == UNKNOWN_IP || ip.parse::<IpAddr>().is_ok());
    }
}
