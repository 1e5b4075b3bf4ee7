//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

// Useful type definition.
type Result<T> = std::io::Result<T>;

// Creates a UDP socket bound to 0.0.0.0:port with address and port reuse,
// ready for broadcast transmission.
//
// Multiple logical listeners on the same host (e.g. a daemon restarting
// while the old socket lingers in TIME_WAIT) rely on the reuse options.
pub fn udp_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

// Creates a raw ICMP socket for the given address family, wrapped as a
// datagram socket so tokio can drive it.
//
// Requires CAP_NET_RAW (the daemon runs privileged, like any router).
pub fn icmp_socket(ipv6: bool) -> Result<UdpSocket> {
    let socket = if ipv6 {
        Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))?
    } else {
        Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?
    };
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}
