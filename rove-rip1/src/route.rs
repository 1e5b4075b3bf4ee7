//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ipnetwork::{IpNetwork, Ipv4Network};
use rove_utils::ip::Ipv4NetworkExt;
use rove_utils::rib::{
    RibError, RibRoute, RouteRecord, RouteStatus, SourceCode, record,
};
use serde::{Deserialize, Serialize};

use crate::error::MetricError;

// A RIP route. Always stored at its classful boundary; a metric of 16
// means the route is poisoned (unreachable).
#[derive(Clone, Debug)]
pub struct Rip1Route {
    pub prefix: Ipv4Network,
    pub next_hop: Ipv4Addr,
    pub metric: Metric,
    pub source: SourceCode,
    pub status: RouteStatus,
    pub last_updated: DateTime<Utc>,
    // Aging clock: set when the route is learned or overwritten from the
    // wire, and deliberately not reset by poisoning, so the garbage timer
    // runs from the last genuine update.
    pub updated_at: Instant,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Serialize)]
pub struct Metric(u8);

// ===== impl Rip1Route =====

impl Rip1Route {
    // Creates a route truncated to its classful boundary. Class D/E
    // prefixes have no classful equivalent and are rejected.
    pub fn new(
        prefix: Ipv4Network,
        next_hop: Ipv4Addr,
        metric: Metric,
        source: SourceCode,
    ) -> Result<Rip1Route, RibError> {
        let prefix = prefix.classful().ok_or_else(|| {
            RibError::FieldInvalid("prefix", prefix.to_string())
        })?;

        Ok(Rip1Route {
            prefix,
            next_hop,
            metric,
            source,
            status: RouteStatus::Unknown,
            last_updated: Utc::now(),
            updated_at: Instant::now(),
        })
    }

    // Marks the route unreachable. The route is kept so it can be
    // advertised as poisoned until the garbage timer flushes it.
    pub fn poison(&mut self) {
        self.metric.set_infinite();
        self.status = RouteStatus::Down;
        self.last_updated = Utc::now();
    }
}

impl RibRoute for Rip1Route {
    type Key = (Ipv4Network, Ipv4Addr);

    const INTRINSIC_FIELDS: &'static [&'static str] = &["prefix", "next_hop"];
    const SUPPLEMENTAL_FIELDS: &'static [&'static str] = &["metric"];
    const OPTIONAL_FIELDS: &'static [&'static str] =
        &["last_updated", "status", "route_source", "admin_distance"];

    fn key(&self) -> Self::Key {
        (self.prefix, self.next_hop)
    }

    fn from_record(record: &RouteRecord) -> Result<Rip1Route, RibError> {
        let prefix = match record::prefix(record, "prefix")? {
            IpNetwork::V4(prefix) => prefix,
            IpNetwork::V6(prefix) => {
                return Err(RibError::FieldInvalid(
                    "prefix",
                    prefix.to_string(),
                ));
            }
        };
        let next_hop = match record::addr(record, "next_hop")? {
            std::net::IpAddr::V4(addr) => addr,
            std::net::IpAddr::V6(addr) => {
                return Err(RibError::FieldInvalid(
                    "next_hop",
                    addr.to_string(),
                ));
            }
        };
        let metric = Metric::clamped(record::uint(record, "metric")?);
        let source = record::opt_source(record, "route_source")?
            .unwrap_or(SourceCode::Rip1);

        let mut route = Rip1Route::new(prefix, next_hop, metric, source)?;
        if let Some(status) = record::opt_status(record, "status")? {
            route.status = status;
        }
        if let Some(last_updated) = record::opt_timestamp(record, "last_updated")
        {
            route.last_updated = last_updated;
        }
        Ok(route)
    }

    fn to_record(&self) -> RouteRecord {
        let mut record = RouteRecord::new();
        record::set(&mut record, "prefix", self.prefix.to_string());
        record::set(&mut record, "next_hop", self.next_hop.to_string());
        record::set(&mut record, "metric", self.metric.get());
        record::set(&mut record, "status", self.status.as_str());
        record::set(&mut record, "last_updated", self.last_updated.to_rfc3339());
        record::set(&mut record, "route_source", self.source.as_str());
        record
    }
}

// ===== impl Metric =====

impl Metric {
    pub const INFINITE: u8 = 16;

    pub fn new(metric: impl TryInto<u8>) -> Result<Self, MetricError> {
        match metric.try_into() {
            Ok(metric) => {
                // Validate metric.
                if metric == 0 || metric > Self::INFINITE {
                    return Err(MetricError::InvalidValue);
                }

                Ok(Metric(metric))
            }
            Err(_) => Err(MetricError::InvalidValue),
        }
    }

    // Clamps an arbitrary value into the valid [1, 16] range.
    pub fn clamped(metric: u32) -> Metric {
        Metric(metric.clamp(1, Self::INFINITE as u32) as u8)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub fn add(&mut self, metric: Metric) {
        self.0 = std::cmp::min(self.0 + metric.0, Self::INFINITE);
    }

    pub fn set_infinite(&mut self) {
        self.0 = Self::INFINITE
    }

    pub fn is_infinite(&self) -> bool {
        self.0 == Self::INFINITE
    }
}

impl From<u8> for Metric {
    // This function panics on error. It should only be used when the metric
    // has already been previously validated.
    fn from(metric: u8) -> Metric {
        Metric::new(metric).expect("Invalid metric value")
    }
}
