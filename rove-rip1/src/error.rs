//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use rove_utils::fp::FpError;
use rove_utils::rib::RibError;
use tracing::warn;

use crate::packet::DecodeError;

// RIP errors.
#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    UdpPduDecodeError(DecodeError),
    RouteRecordError(RibError),
}

// RIP I/O errors.
#[derive(Debug)]
pub enum IoError {
    UdpRecvError(FpError),
    UdpSendError(FpError),
}

// RIP metric errors.
#[derive(Debug)]
pub enum MetricError {
    InvalidValue,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::UdpPduDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::RouteRecordError(error) => {
                warn!(%error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::UdpPduDecodeError(..) => {
                write!(f, "failed to decode PDU")
            }
            Error::RouteRecordError(..) => {
                write!(f, "invalid route record")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::UdpPduDecodeError(error) => Some(error),
            Error::RouteRecordError(error) => Some(error),
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl From<RibError> for Error {
    fn from(error: RibError) -> Error {
        Error::RouteRecordError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::UdpRecvError(error) | IoError::UdpSendError(error) => {
                warn!(%error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::UdpRecvError(..) => {
                write!(f, "failed to receive UDP packet")
            }
            IoError::UdpSendError(..) => {
                write!(f, "failed to send UDP packet")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::UdpRecvError(error) | IoError::UdpSendError(error) => {
                Some(error)
            }
        }
    }
}

// ===== impl MetricError =====

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::InvalidValue => {
                write!(f, "invalid RIP metric")
            }
        }
    }
}

impl std::error::Error for MetricError {}
