//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use ipnetwork::Ipv4Network;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use rove_utils::ip::{Ipv4AddrExt, Ipv4NetworkExt};
use serde::{Deserialize, Serialize};

use crate::route::Metric;

//
// The RIP packet format is:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  command (1)  |  version (1)  |       must be zero (2)        |
// +---------------+---------------+-------------------------------+
// |                                                               |
// ~                         RIP Entry (20)                        ~
// |                                                               |
// +---------------+---------------+---------------+---------------+
//
#[derive(Debug, Deserialize, Eq, new, PartialEq, Serialize)]
pub struct Pdu {
    // PDU command.
    pub command: Command,
    #[new(value = "1")]
    // PDU version.
    pub version: u8,
    // List of RTEs.
    pub rtes: Vec<Rte>,
    // List of RTEs that failed to be decoded.
    #[new(default)]
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rte_errors: Vec<DecodeError>,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Command {
    Request = 1,
    Response = 2,
}

//
// The format for the 20-octet route entry (RTE) is:
//
//  0                   1                   2                   3 3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Address Family Identifier (2) |       must be zero (2)        |
// +-------------------------------+-------------------------------+
// |                         IP Address (4)                        |
// +---------------------------------------------------------------+
// |                         Next Hop (4)                          |
// +---------------------------------------------------------------+
// |                      must be zero (4)                         |
// +---------------------------------------------------------------+
// |                         Metric (4)                            |
// +---------------------------------------------------------------+
//
// RIP v1 carries no subnet mask; the prefix length is inferred from the
// address class. A next hop of 0.0.0.0 means "the sender of this datagram".
//
#[derive(Debug, Deserialize, EnumAsInner, Eq, PartialEq, Serialize)]
pub enum Rte {
    Zero(RteZero),
    Ipv4(RteIpv4),
}

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RteZero {
    pub metric: Metric,
}

#[derive(Debug, Deserialize, Eq, new, PartialEq, Serialize)]
pub struct RteIpv4 {
    pub prefix: Ipv4Network,
    pub nexthop: Option<Ipv4Addr>,
    pub metric: Metric,
}

// RIP decode errors.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DecodeError {
    InvalidLength(usize),
    InvalidCommand(u8),
    InvalidVersion(u8),
    InvalidRteAddressFamily(u16),
    InvalidRtePrefix(Ipv4Addr),
    InvalidRteNexthop(Ipv4Addr),
    InvalidRteMetric(u32),
}

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// ===== impl Pdu =====

impl Pdu {
    pub const VERSION: u8 = 1;
    pub const HDR_LENGTH: usize = 4;
    pub const MAX_ENTRIES: usize = 25;
    pub const MIN_SIZE: usize = (Self::HDR_LENGTH + Rte::LENGTH);
    pub const MAX_SIZE: usize =
        (Self::HDR_LENGTH + Self::MAX_ENTRIES * Rte::LENGTH);

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::MAX_SIZE);

        // Encode PDU header.
        buf.put_u8(self.command as u8);
        buf.put_u8(self.version);
        buf.put_u16(0);

        // Encode RTEs.
        for rte in &self.rtes {
            rte.encode(&mut buf);
        }

        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Pdu> {
        let mut buf = Bytes::copy_from_slice(data);

        // Validate the packet length.
        let buf_size = data.len();
        if !(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&buf_size) {
            return Err(DecodeError::InvalidLength(buf_size));
        }

        // Parse and validate RIP command.
        let command = buf.get_u8();
        let command = Command::from_u8(command)
            .ok_or(DecodeError::InvalidCommand(command))?;

        // Parse and validate RIP version.
        //
        // RFC 1058 specifies that datagrams with a version number greater
        // than one should still be processed; version zero is discarded.
        let version = buf.get_u8();
        if version < Self::VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        // Ignore MBZ.
        let _ = buf.get_u16();

        // Decode RIP RTEs.
        let mut rtes = vec![];
        let mut rte_errors = vec![];
        while buf.remaining() >= Rte::LENGTH {
            match Rte::decode(&mut buf) {
                Ok(rte) => rtes.push(rte),
                Err(error) => rte_errors.push(error),
            }
        }

        let pdu = Pdu {
            command,
            version,
            rtes,
            rte_errors,
        };

        Ok(pdu)
    }

    // Takes the list of RTEs that failed to decode.
    pub fn rte_errors(&mut self) -> Vec<DecodeError> {
        std::mem::take(&mut self.rte_errors)
    }

    // Creates a request to send the entire routing table.
    pub fn new_dump_request() -> Pdu {
        let rtes = vec![Rte::Zero(RteZero {
            metric: Metric::from(Metric::INFINITE),
        })];
        Pdu::new(Command::Request, rtes)
    }

    // If there is exactly one entry in the request, and it has an address
    // family identifier of zero and a metric of infinity (i.e., 16), then
    // this is a request to send the entire routing table.
    pub fn is_dump_request(&self) -> bool {
        self.command == Command::Request
            && self.rtes.len() == 1
            && self.rtes[0]
                == Rte::Zero(RteZero {
                    metric: Metric::from(Metric::INFINITE),
                })
    }
}

// ===== impl Rte =====

impl Rte {
    pub const LENGTH: usize = 20;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            Rte::Zero(rte) => rte.encode(buf),
            Rte::Ipv4(rte) => rte.encode(buf),
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let afi = buf.get_u16();
        let rte = match afi {
            RteZero::AFI => Rte::Zero(RteZero::decode(buf)?),
            RteIpv4::AFI => Rte::Ipv4(RteIpv4::decode(buf)?),
            _ => {
                buf.advance(Rte::LENGTH - 2);
                return Err(DecodeError::InvalidRteAddressFamily(afi));
            }
        };

        Ok(rte)
    }
}

// ===== impl RteZero =====

impl RteZero {
    pub const AFI: u16 = libc::AF_UNSPEC as u16;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(Self::AFI);
        buf.put_u16(0);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(self.metric.get().into());
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let _mbz = buf.get_u16();
        let _addr = buf.get_u32();
        let _nexthop = buf.get_u32();
        let _mbz = buf.get_u32();
        let metric = buf.get_u32();

        // Sanity checks.
        let metric = Metric::new(metric)
            .map_err(|_| DecodeError::InvalidRteMetric(metric))?;

        Ok(RteZero { metric })
    }
}

// ===== impl RteIpv4 =====

impl RteIpv4 {
    pub const AFI: u16 = libc::AF_INET as u16;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(Self::AFI);
        buf.put_u16(0);
        buf.put_u32(self.prefix.network().into());
        if let Some(nexthop) = &self.nexthop {
            buf.put_u32((*nexthop).into());
        } else {
            buf.put_u32(0);
        }
        buf.put_u32(0);
        buf.put_u32(self.metric.get().into());
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let _mbz = buf.get_u16();
        let addr = Ipv4Addr::from(buf.get_u32());
        let nexthop = Ipv4Addr::from(buf.get_u32());
        let _mbz = buf.get_u32();
        let metric = buf.get_u32();

        // Validate the address and infer the classful prefix length.
        if addr.is_loopback() || addr.is_broadcast() {
            return Err(DecodeError::InvalidRtePrefix(addr));
        }
        let plen = addr
            .classful_prefix_len()
            .ok_or(DecodeError::InvalidRtePrefix(addr))?;
        // Host bits beyond the classful boundary are dropped; the stored
        // prefix is always in canonical (masked) form.
        let prefix = Ipv4Network::new(addr, plen)
            .ok()
            .and_then(|prefix| prefix.classful())
            .ok_or(DecodeError::InvalidRtePrefix(addr))?;

        // Validate nexthop.
        let nexthop = if nexthop.is_unspecified() {
            None
        } else {
            if nexthop.is_loopback() || nexthop.is_multicast() {
                return Err(DecodeError::InvalidRteNexthop(nexthop));
            }
            Some(nexthop)
        };

        // Validate metric.
        let metric = Metric::new(metric)
            .map_err(|_| DecodeError::InvalidRteMetric(metric))?;

        Ok(RteIpv4 {
            prefix,
            nexthop,
            metric,
        })
    }
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidLength(length) => {
                write!(f, "Invalid Length: {}", length)
            }
            DecodeError::InvalidCommand(command) => {
                write!(f, "Invalid RIP command: {}", command)
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "Invalid RIP version: {}", version)
            }
            DecodeError::InvalidRteAddressFamily(afi) => {
                write!(f, "Invalid RIP address-family: {}", afi)
            }
            DecodeError::InvalidRtePrefix(addr) => {
                write!(f, "Invalid RTE prefix: {}", addr)
            }
            DecodeError::InvalidRteNexthop(nexthop) => {
                write!(f, "Invalid RTE nexthop: {}", nexthop)
            }
            DecodeError::InvalidRteMetric(metric) => {
                write!(f, "Invalid RIP metric: {}", metric)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
