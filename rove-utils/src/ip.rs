//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, UdpSocket};

use ipnetwork::Ipv4Network;

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    // Returns the legacy classful prefix length for this address, or None
    // for class D/E addresses.
    fn classful_prefix_len(&self) -> Option<u8>;
}

// Extension methods for Ipv4Network.
pub trait Ipv4NetworkExt {
    // Truncates the prefix to its classful boundary. Prefixes longer than
    // the class length are masked down to it; prefixes already shorter keep
    // their network address and take the classful length. Class D/E
    // prefixes yield None.
    fn classful(&self) -> Option<Ipv4Network>;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    fn classful_prefix_len(&self) -> Option<u8> {
        match self.octets()[0] {
            0..=127 => Some(8),
            128..=191 => Some(16),
            192..=223 => Some(24),
            _ => None,
        }
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    fn classful(&self) -> Option<Ipv4Network> {
        let addr = self.network();
        let plen = addr.classful_prefix_len()?;

        // The network address already has its host bits cleared at the
        // original length, so masking at the classful length covers both
        // the longer-prefix and shorter-prefix cases.
        let mask = u32::MAX.checked_shl(32 - plen as u32).unwrap_or(0);
        let addr = Ipv4Addr::from(u32::from(addr) & mask);
        let network = Ipv4Network::new(addr, plen)
            .expect("classful prefix length is always valid");
        Some(network)
    }
}

// ===== global functions =====

// Best-effort discovery of the host's primary egress IPv4 address.
//
// Connecting a UDP socket doesn't send any packets; it only asks the kernel
// to pick the source address it would route through.
pub fn get_local_ip() -> Ipv4Addr {
    fn egress_addr() -> std::io::Result<std::net::IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    }

    match egress_addr() {
        Ok(std::net::IpAddr::V4(addr)) => addr,
        _ => Ipv4Addr::LOCALHOST,
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use const_addrs::net4;

    use super::*;

    #[test]
    fn classful_truncation() {
        // Longer than the class boundary: mask down.
        assert_eq!(net4!("10.1.2.3/32").classful(), Some(net4!("10.0.0.0/8")));
        assert_eq!(
            net4!("172.16.5.0/24").classful(),
            Some(net4!("172.16.0.0/16"))
        );
        assert_eq!(
            net4!("192.0.2.128/25").classful(),
            Some(net4!("192.0.2.0/24"))
        );

        // Already at the boundary: identity.
        assert_eq!(net4!("10.0.0.0/8").classful(), Some(net4!("10.0.0.0/8")));

        // Shorter than the boundary: keep the network address, take the
        // classful length.
        assert_eq!(net4!("0.0.0.0/0").classful(), Some(net4!("0.0.0.0/8")));
        assert_eq!(
            net4!("128.0.0.0/2").classful(),
            Some(net4!("128.0.0.0/16"))
        );

        // Class D/E: rejected.
        assert_eq!(net4!("224.0.0.0/4").classful(), None);
        assert_eq!(net4!("239.1.1.0/24").classful(), None);
        assert_eq!(net4!("240.0.0.0/8").classful(), None);
    }
}
