//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod debug;
pub mod error;
pub mod events;
pub mod instance;
pub mod output;
pub mod packet;
pub mod route;
pub mod tasks;

pub use instance::{Instance, InstanceCfg};
pub use route::{Metric, Rip1Route};
