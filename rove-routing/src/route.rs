//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use rove_utils::rib::{
    RibError, RibRoute, RouteRecord, RouteStatus, SourceCode, record,
};

// A composite-RIB route. Identity includes the originating protocol, so
// the same prefix can coexist once per source until best-path selection.
#[derive(Clone, Debug)]
pub struct CpRoute {
    pub prefix: IpNetwork,
    pub next_hop: IpAddr,
    pub route_source: SourceCode,
    pub admin_distance: u32,
    pub status: RouteStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

// An operator-supplied static route. Lives from configuration load until
// removed by the operator.
#[derive(Clone, Debug)]
pub struct CpStaticRoute {
    pub prefix: IpNetwork,
    pub next_hop: IpAddr,
    pub admin_distance: u32,
    pub last_updated: DateTime<Utc>,
}

// ===== impl CpRoute =====

impl RibRoute for CpRoute {
    type Key = (IpNetwork, IpAddr, SourceCode);

    const INTRINSIC_FIELDS: &'static [&'static str] =
        &["prefix", "next_hop", "route_source"];
    const SUPPLEMENTAL_FIELDS: &'static [&'static str] = &["admin_distance"];
    const OPTIONAL_FIELDS: &'static [&'static str] =
        &["last_updated", "status"];

    fn key(&self) -> Self::Key {
        (self.prefix, self.next_hop, self.route_source)
    }

    fn from_record(record: &RouteRecord) -> Result<CpRoute, RibError> {
        let route_source = record::opt_source(record, "route_source")?
            .ok_or(RibError::FieldMissing("route_source"))?;

        Ok(CpRoute {
            prefix: record::prefix(record, "prefix")?,
            next_hop: record::addr(record, "next_hop")?,
            route_source,
            admin_distance: record::uint(record, "admin_distance")?,
            status: record::opt_status(record, "status")?
                .unwrap_or(RouteStatus::Up),
            last_updated: record::opt_timestamp(record, "last_updated"),
        })
    }

    fn to_record(&self) -> RouteRecord {
        let mut record = RouteRecord::new();
        record::set(&mut record, "prefix", self.prefix.to_string());
        record::set(&mut record, "next_hop", self.next_hop.to_string());
        record::set(&mut record, "route_source", self.route_source.as_str());
        record::set(&mut record, "admin_distance", self.admin_distance);
        record::set(&mut record, "status", self.status.as_str());
        if let Some(last_updated) = &self.last_updated {
            record::set(&mut record, "last_updated", last_updated.to_rfc3339());
        }
        record
    }
}

// ===== impl CpStaticRoute =====

impl CpStaticRoute {
    pub fn new(
        prefix: IpNetwork,
        next_hop: IpAddr,
        admin_distance: u32,
    ) -> CpStaticRoute {
        CpStaticRoute {
            prefix,
            next_hop,
            admin_distance,
            last_updated: Utc::now(),
        }
    }

    // The composite-RIB view of this route. Static routes are always Up.
    pub fn to_cp_route(&self) -> CpRoute {
        CpRoute {
            prefix: self.prefix,
            next_hop: self.next_hop,
            route_source: SourceCode::Static,
            admin_distance: self.admin_distance,
            status: RouteStatus::Up,
            last_updated: Some(self.last_updated),
        }
    }
}

impl RibRoute for CpStaticRoute {
    type Key = (IpNetwork, IpAddr);

    const INTRINSIC_FIELDS: &'static [&'static str] = &["prefix", "next_hop"];
    const SUPPLEMENTAL_FIELDS: &'static [&'static str] =
        &["admin_distance", "route_source"];
    const OPTIONAL_FIELDS: &'static [&'static str] = &["last_updated"];

    fn key(&self) -> Self::Key {
        (self.prefix, self.next_hop)
    }

    fn from_record(record: &RouteRecord) -> Result<CpStaticRoute, RibError> {
        if let Some(source) = record::opt_source(record, "route_source")?
            && source != SourceCode::Static
        {
            return Err(RibError::FieldInvalid(
                "route_source",
                source.to_string(),
            ));
        }

        let mut route = CpStaticRoute::new(
            record::prefix(record, "prefix")?,
            record::addr(record, "next_hop")?,
            record::opt_uint(record, "admin_distance")?.unwrap_or(1),
        );
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
        record::set(&mut record, "admin_distance", self.admin_distance);
        record::set(&mut record, "route_source", SourceCode::Static.as_str());
        record::set(&mut record, "last_updated", self.last_updated.to_rfc3339());
        record
    }
}
