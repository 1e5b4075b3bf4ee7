//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddrV4};

use ipnetwork::Ipv4Network;
use tracing::{debug, debug_span};

use crate::packet::Pdu;
use crate::route::Metric;

// RIP debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceCreate,
    InstanceStart,
    InstanceStop,
    Advertisement,
    RequestCycle,
    PduRx(&'a SocketAddrV4, &'a Pdu),
    PduTx(&'a SocketAddrV4, &'a Pdu),
    OwnPduDrop(&'a Ipv4Addr),
    RouteLearn(&'a Ipv4Network, &'a Ipv4Addr, &'a Metric),
    RoutePoison(&'a Ipv4Network, &'a Ipv4Addr),
    RouteFlush(&'a Ipv4Network, &'a Ipv4Addr),
    RedistributionTrigger,
}

// ===== impl Debug =====

impl<'a> Debug<'a> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate
            | Debug::InstanceStart
            | Debug::InstanceStop
            | Debug::Advertisement
            | Debug::RequestCycle
            | Debug::RedistributionTrigger => {
                debug!("{}", self);
            }
            Debug::PduRx(source, pdu) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("input", %source).in_scope(|| {
                        let data = serde_json::to_string(&pdu).unwrap();
                        debug!(%data, "{}", self);
                    });
                });
            }
            Debug::PduTx(destination, pdu) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("output", %destination).in_scope(|| {
                        let data = serde_json::to_string(&pdu).unwrap();
                        debug!(%data, "{}", self);
                    });
                });
            }
            Debug::OwnPduDrop(source) => {
                debug!(%source, "{}", self);
            }
            Debug::RouteLearn(prefix, next_hop, metric) => {
                debug!(%prefix, %next_hop, metric = %metric.get(), "{}", self);
            }
            Debug::RoutePoison(prefix, next_hop)
            | Debug::RouteFlush(prefix, next_hop) => {
                debug!(%prefix, %next_hop, "{}", self);
            }
        }
    }
}

impl<'a> std::fmt::Display for Debug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => {
                write!(f, "instance created")
            }
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop => {
                write!(f, "stopping instance")
            }
            Debug::Advertisement => {
                write!(f, "advertisement interval")
            }
            Debug::RequestCycle => {
                write!(f, "request cycle")
            }
            Debug::PduRx(..) | Debug::PduTx(..) => {
                write!(f, "pdu")
            }
            Debug::OwnPduDrop(..) => {
                write!(f, "dropping our own pdu")
            }
            Debug::RouteLearn(..) => {
                write!(f, "route learned")
            }
            Debug::RoutePoison(..) => {
                write!(f, "route poisoned")
            }
            Debug::RouteFlush(..) => {
                write!(f, "route flushed")
            }
            Debug::RedistributionTrigger => {
                write!(f, "triggering redistribution")
            }
        }
    }
}
