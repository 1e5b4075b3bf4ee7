//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::Sender;
use tracing::warn;

use crate::ip::get_local_ip;
use crate::socket;

// A single datagram received from the network.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub src: SocketAddr,
}

// Forwarding plane errors.
#[derive(Debug)]
pub enum FpError {
    Timeout,
    Io(std::io::Error),
}

// The forwarding plane owns every socket in the system. Daemons consume it
// as an interface so probe and wire behavior can be stubbed out in tests.
pub trait ForwardingPlane: Send + Sync + 'static {
    // Sends one ICMP echo request to `dest` and returns the measured
    // round-trip time. Fails with `FpError::Timeout` when no matching reply
    // arrives within `timeout`.
    fn ping(
        &self,
        dest: IpAddr,
        timeout: Duration,
    ) -> impl Future<Output = Result<Duration, FpError>> + Send;

    // Emits a single UDP datagram. When `src_port` is None an ephemeral
    // port is chosen. Returns the source port actually used so callers can
    // listen for replies on it.
    fn send_udp(
        &self,
        payload: &[u8],
        dst: SocketAddrV4,
        src_port: Option<u16>,
    ) -> impl Future<Output = Result<u16, FpError>> + Send;

    // Binds to 0.0.0.0:port with address/port reuse and forwards each
    // received datagram to the channel. Runs until the channel is closed or
    // the task is cancelled.
    fn listen_udp(
        &self,
        port: u16,
        tx: Sender<Datagram>,
    ) -> impl Future<Output = Result<(), FpError>> + Send;

    // Same as `listen_udp`, bounded by a deadline. Returns normally on
    // expiry.
    fn listen_udp_timed(
        &self,
        port: u16,
        tx: Sender<Datagram>,
        window: Duration,
    ) -> impl Future<Output = Result<(), FpError>> + Send;

    // Best-effort primary egress IPv4 address of this host.
    fn local_ip(&self) -> Ipv4Addr;
}

// Socket-backed forwarding plane.
#[derive(Debug)]
pub struct NetFp {
    local_ip: Ipv4Addr,
}

// ===== impl NetFp =====

impl NetFp {
    pub fn new() -> NetFp {
        NetFp {
            local_ip: get_local_ip(),
        }
    }
}

impl Default for NetFp {
    fn default() -> NetFp {
        NetFp::new()
    }
}

impl ForwardingPlane for NetFp {
    async fn ping(
        &self,
        dest: IpAddr,
        timeout: Duration,
    ) -> Result<Duration, FpError> {
        let socket = socket::icmp_socket(dest.is_ipv6())?;
        let id = rand::random::<u16>();
        let seq = rand::random::<u16>();
        let request = icmp::echo_request(dest, id, seq);

        let start = Instant::now();
        socket.send_to(&request, SocketAddr::new(dest, 0)).await?;

        let reply = async {
            let mut buf = [0u8; 1024];
            loop {
                let (num_bytes, src) = socket.recv_from(&mut buf).await?;
                if src.ip() == dest
                    && icmp::is_echo_reply(dest, &buf[..num_bytes], id, seq)
                {
                    return Ok(());
                }
            }
        };
        match tokio::time::timeout(timeout, reply).await {
            Ok(result) => result.map(|()| start.elapsed()),
            Err(_) => Err(FpError::Timeout),
        }
    }

    async fn send_udp(
        &self,
        payload: &[u8],
        dst: SocketAddrV4,
        src_port: Option<u16>,
    ) -> Result<u16, FpError> {
        let socket = socket::udp_socket(src_port.unwrap_or(0))?;
        socket.send_to(payload, SocketAddr::V4(dst)).await?;
        let src_port = socket.local_addr()?.port();
        Ok(src_port)
    }

    async fn listen_udp(
        &self,
        port: u16,
        tx: Sender<Datagram>,
    ) -> Result<(), FpError> {
        let socket = socket::udp_socket(port)?;
        let mut buf = [0u8; 16384];

        loop {
            let (num_bytes, src) = match socket.recv_from(&mut buf).await {
                Ok((num_bytes, src)) => (num_bytes, src),
                Err(error) => {
                    warn!(%error, "failed to receive UDP packet");
                    continue;
                }
            };

            let dgram = Datagram {
                data: buf[..num_bytes].to_vec(),
                src,
            };
            if tx.send(dgram).await.is_err() {
                // Receiver is gone; stop listening.
                return Ok(());
            }
        }
    }

    async fn listen_udp_timed(
        &self,
        port: u16,
        tx: Sender<Datagram>,
        window: Duration,
    ) -> Result<(), FpError> {
        match tokio::time::timeout(window, self.listen_udp(port, tx)).await {
            // Deadline expired: not an error.
            Err(_) => Ok(()),
            Ok(result) => result,
        }
    }

    fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }
}

// ===== impl FpError =====

impl std::fmt::Display for FpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FpError::Timeout => {
                write!(f, "timed out")
            }
            FpError::Io(..) => {
                write!(f, "I/O error")
            }
        }
    }
}

impl std::error::Error for FpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FpError::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FpError {
    fn from(error: std::io::Error) -> FpError {
        FpError::Io(error)
    }
}

// ===== ICMP echo codec =====

mod icmp {
    use super::*;

    const ICMPV4_ECHO_REQUEST: u8 = 8;
    const ICMPV4_ECHO_REPLY: u8 = 0;
    const ICMPV6_ECHO_REQUEST: u8 = 128;
    const ICMPV6_ECHO_REPLY: u8 = 129;
    const HDR_LENGTH: usize = 8;

    // Builds an ICMP(v6) echo request message. For ICMPv6 the checksum is
    // left to the kernel, which fills in the pseudo-header sum on raw
    // sockets.
    pub(super) fn echo_request(dest: IpAddr, id: u16, seq: u16) -> Vec<u8> {
        let mut msg = vec![0; HDR_LENGTH];
        msg[0] = if dest.is_ipv6() {
            ICMPV6_ECHO_REQUEST
        } else {
            ICMPV4_ECHO_REQUEST
        };
        msg[4..6].copy_from_slice(&id.to_be_bytes());
        msg[6..8].copy_from_slice(&seq.to_be_bytes());

        if dest.is_ipv4() {
            let cksum = internet_checksum::checksum(&msg);
            msg[2..4].copy_from_slice(&cksum);
        }

        msg
    }

    // Checks whether a received raw datagram is the echo reply matching the
    // given id/seq pair. IPv4 raw sockets deliver the IP header; IPv6 ones
    // don't.
    pub(super) fn is_echo_reply(
        dest: IpAddr,
        data: &[u8],
        id: u16,
        seq: u16,
    ) -> bool {
        let (reply_type, msg) = match dest {
            IpAddr::V4(_) => {
                let Some(ihl) = data.first().map(|b| ((b & 0x0f) as usize) * 4)
                else {
                    return false;
                };
                let Some(msg) = data.get(ihl..) else {
                    return false;
                };
                (ICMPV4_ECHO_REPLY, msg)
            }
            IpAddr::V6(_) => (ICMPV6_ECHO_REPLY, data),
        };

        if msg.len() < HDR_LENGTH || msg[0] != reply_type || msg[1] != 0 {
            return false;
        }
        let reply_id = u16::from_be_bytes([msg[4], msg[5]]);
        let reply_seq = u16::from_be_bytes([msg[6], msg[7]]);
        reply_id == id && reply_seq == seq
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn echo_request_checksum() {
            let msg = echo_request(IpAddr::V4(Ipv4Addr::LOCALHOST), 0x1234, 1);
            assert_eq!(msg.len(), HDR_LENGTH);
            assert_eq!(msg[0], ICMPV4_ECHO_REQUEST);
            // Verifying the checksum over the whole message yields zero.
            assert_eq!(internet_checksum::checksum(&msg), [0, 0]);
        }

        #[test]
        fn echo_reply_matching() {
            let dest = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
            // 20-byte IPv4 header followed by an echo reply.
            let mut data = vec![0x45; 1];
            data.extend_from_slice(&[0; 19]);
            data.extend_from_slice(&[0, 0, 0, 0, 0x12, 0x34, 0x00, 0x01]);
            assert!(is_echo_reply(dest, &data, 0x1234, 1));
            assert!(!is_echo_reply(dest, &data, 0x1234, 2));
            // Truncated packet.
            assert!(!is_echo_reply(dest, &data[..21], 0x1234, 1));
        }
    }
}
