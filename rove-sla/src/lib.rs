//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod instance;
pub mod route;

pub use instance::{Instance, InstanceCfg};
pub use route::SlaRoute;
