//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use rove_utils::rib::{
    RibError, RibRoute, RouteRecord, RouteStatus, SourceCode, record,
};

// An SLA-monitored route: a configured prefix/next-hop pair promoted or
// demoted by round-trip-time probes against its threshold.
#[derive(Clone, Debug)]
pub struct SlaRoute {
    pub prefix: IpNetwork,
    pub next_hop: IpAddr,
    pub priority: u32,
    pub threshold_ms: u32,
    pub status: RouteStatus,
    pub last_updated: DateTime<Utc>,
    // Monotonic companion of `last_updated`, used for probe scheduling.
    pub updated_at: Instant,
}

// ===== impl SlaRoute =====

impl SlaRoute {
    pub fn new(
        prefix: IpNetwork,
        next_hop: IpAddr,
        priority: u32,
        threshold_ms: u32,
    ) -> SlaRoute {
        SlaRoute {
            prefix,
            next_hop,
            priority,
            threshold_ms,
            status: RouteStatus::Unknown,
            last_updated: Utc::now(),
            updated_at: Instant::now(),
        }
    }

    // Refreshes the route timestamps.
    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
        self.updated_at = Instant::now();
    }
}

impl RibRoute for SlaRoute {
    type Key = (IpNetwork, IpAddr);

    const INTRINSIC_FIELDS: &'static [&'static str] = &["prefix", "next_hop"];
    const SUPPLEMENTAL_FIELDS: &'static [&'static str] =
        &["priority", "threshold_ms"];
    const OPTIONAL_FIELDS: &'static [&'static str] =
        &["last_updated", "status", "route_source"];

    fn key(&self) -> Self::Key {
        (self.prefix, self.next_hop)
    }

    fn from_record(record: &RouteRecord) -> Result<SlaRoute, RibError> {
        if let Some(source) = record::opt_source(record, "route_source")?
            && source != SourceCode::Sla
        {
            return Err(RibError::FieldInvalid(
                "route_source",
                source.to_string(),
            ));
        }

        let mut route = SlaRoute::new(
            record::prefix(record, "prefix")?,
            record::addr(record, "next_hop")?,
            record::uint(record, "priority")?,
            record::uint(record, "threshold_ms")?,
        );
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
        record::set(&mut record, "priority", self.priority);
        record::set(&mut record, "threshold_ms", self.threshold_ms);
        record::set(&mut record, "status", self.status.as_str());
        record::set(&mut record, "last_updated", self.last_updated.to_rfc3339());
        record::set(&mut record, "route_source", SourceCode::Sla.as_str());
        record
    }
}
