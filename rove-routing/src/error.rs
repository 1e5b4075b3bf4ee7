//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

// Control plane errors.
#[derive(Debug)]
pub enum Error {
    SlaNotEnabled,
    Rip1NotEnabled,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::SlaNotEnabled | Error::Rip1NotEnabled => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SlaNotEnabled => {
                write!(f, "SLA daemon is not enabled")
            }
            Error::Rip1NotEnabled => {
                write!(f, "RIP daemon is not enabled")
            }
        }
    }
}

impl std::error::Error for Error {}
