//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod instance;
pub mod route;

pub use instance::{ControlPlane, ControlPlaneCfg};
pub use route::{CpRoute, CpStaticRoute};
