//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// The route sources the system understands.
//
// Persisted as strings; the wire/record form is the uppercase name.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceCode {
    Static,
    Rip1,
    Ospf,
    Bgp,
    Sla,
}

// Operational status of a route.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Up,
    Down,
    Unknown,
}

// The interchange form of a route: a flat JSON object. Used by the service
// surface and by redistribution between daemons.
pub type RouteRecord = serde_json::Map<String, Value>;

// RIB errors.
#[derive(Debug, Eq, PartialEq)]
pub enum RibError {
    FieldMissing(&'static str),
    FieldUnknown(String),
    FieldInvalid(&'static str, String),
}

// A route type that can live in a RIB.
//
// Every variant declares its identity key and its field schema: intrinsic
// fields participate in identity and are always required in records;
// supplemental fields are required but carry no identity; optional fields
// are derived state.
pub trait RibRoute: Clone + std::fmt::Debug + Send + 'static {
    type Key: Clone + Ord + std::fmt::Debug + Send;

    const INTRINSIC_FIELDS: &'static [&'static str];
    const SUPPLEMENTAL_FIELDS: &'static [&'static str];
    const OPTIONAL_FIELDS: &'static [&'static str];

    // Return the route's identity key.
    fn key(&self) -> Self::Key;

    // Build a route from its record form.
    fn from_record(record: &RouteRecord) -> Result<Self, RibError>;

    // Render the route as a record.
    fn to_record(&self) -> RouteRecord;
}

// A Routing Information Base: a set of routes indexed by identity.
#[derive(Clone, Debug)]
pub struct Rib<R: RibRoute> {
    table: BTreeMap<R::Key, R>,
}

// ===== impl SourceCode =====

impl SourceCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SourceCode::Static => "STATIC",
            SourceCode::Rip1 => "RIP1",
            SourceCode::Ospf => "OSPF",
            SourceCode::Bgp => "BGP",
            SourceCode::Sla => "SLA",
        }
    }
}

impl std::fmt::Display for SourceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STATIC" => Ok(SourceCode::Static),
            "RIP1" => Ok(SourceCode::Rip1),
            "OSPF" => Ok(SourceCode::Ospf),
            "BGP" => Ok(SourceCode::Bgp),
            "SLA" => Ok(SourceCode::Sla),
            _ => Err(()),
        }
    }
}

// ===== impl RouteStatus =====

impl RouteStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Up => "up",
            RouteStatus::Down => "down",
            RouteStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(RouteStatus::Up),
            "down" => Ok(RouteStatus::Down),
            "unknown" => Ok(RouteStatus::Unknown),
            _ => Err(()),
        }
    }
}

// ===== impl RibError =====

impl std::fmt::Display for RibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RibError::FieldMissing(field) => {
                write!(f, "missing required field: {}", field)
            }
            RibError::FieldUnknown(field) => {
                write!(f, "unknown field: {}", field)
            }
            RibError::FieldInvalid(field, reason) => {
                write!(f, "invalid field {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for RibError {}

// ===== impl Rib =====

impl<R> Rib<R>
where
    R: RibRoute,
{
    pub fn new() -> Rib<R> {
        Rib {
            table: Default::default(),
        }
    }

    // Adds a route, overwriting any previous route of the same identity.
    // Returns the replaced route, if any.
    pub fn add(&mut self, route: R) -> Option<R> {
        self.table.insert(route.key(), route)
    }

    // Validates a record against the route schema and adds the resulting
    // route.
    pub fn add_record(
        &mut self,
        record: &RouteRecord,
        strict: bool,
    ) -> Result<(), RibError> {
        validate_fields::<R>(record, strict)?;
        self.add(R::from_record(record)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &R::Key) -> Option<R> {
        self.table.remove(key)
    }

    // Removes a route if present; removing an absent route is not an error.
    pub fn discard(&mut self, key: &R::Key) {
        self.table.remove(key);
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.table.get(key)
    }

    pub fn get_mut(&mut self, key: &R::Key) -> Option<&mut R> {
        self.table.get_mut(key)
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.table.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.table.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.table.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &R::Key> {
        self.table.keys()
    }

    // Returns a snapshot copy of the table contents.
    pub fn items(&self) -> Vec<R> {
        self.table.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    // Renders the whole table as records.
    pub fn export_routes(&self) -> Vec<RouteRecord> {
        self.table.values().map(R::to_record).collect()
    }

    // Loads routes from records. Fails on the first invalid record.
    pub fn import_routes(
        &mut self,
        records: &[RouteRecord],
        strict: bool,
    ) -> Result<(), RibError> {
        for record in records {
            self.add_record(record, strict)?;
        }
        Ok(())
    }
}

impl<R> Default for Rib<R>
where
    R: RibRoute,
{
    fn default() -> Rib<R> {
        Rib::new()
    }
}

// ===== global functions =====

// Checks a record against a route type's field schema. Intrinsic fields
// must always be present; in strict mode fields outside the schema are
// rejected, otherwise they are ignored. Supplemental fields are enforced
// (or defaulted) by each variant's record constructor.
pub fn validate_fields<R: RibRoute>(
    record: &RouteRecord,
    strict: bool,
) -> Result<(), RibError> {
    for field in R::INTRINSIC_FIELDS {
        if !record.contains_key(*field) {
            return Err(RibError::FieldMissing(*field));
        }
    }

    if strict {
        for key in record.keys() {
            let known = R::INTRINSIC_FIELDS.contains(&key.as_str())
                || R::SUPPLEMENTAL_FIELDS.contains(&key.as_str())
                || R::OPTIONAL_FIELDS.contains(&key.as_str());
            if !known {
                return Err(RibError::FieldUnknown(key.clone()));
            }
        }
    }
    Ok(())
}

// Typed accessors for record fields, shared by the route variants.
pub mod record {
    use std::net::IpAddr;

    use chrono::{DateTime, Utc};
    use ipnetwork::IpNetwork;

    use super::*;

    fn parse<T: FromStr>(
        field: &'static str,
        value: &str,
    ) -> Result<T, RibError> {
        value
            .parse()
            .map_err(|_| RibError::FieldInvalid(field, value.to_owned()))
    }

    pub fn get_str<'a>(
        record: &'a RouteRecord,
        field: &'static str,
    ) -> Result<&'a str, RibError> {
        record
            .get(field)
            .ok_or(RibError::FieldMissing(field))?
            .as_str()
            .ok_or_else(|| {
                RibError::FieldInvalid(field, "expected a string".to_owned())
            })
    }

    pub fn prefix(
        record: &RouteRecord,
        field: &'static str,
    ) -> Result<IpNetwork, RibError> {
        parse(field, get_str(record, field)?)
    }

    pub fn addr(
        record: &RouteRecord,
        field: &'static str,
    ) -> Result<IpAddr, RibError> {
        parse(field, get_str(record, field)?)
    }

    pub fn uint(
        record: &RouteRecord,
        field: &'static str,
    ) -> Result<u32, RibError> {
        let value =
            record.get(field).ok_or(RibError::FieldMissing(field))?;
        value
            .as_u64()
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| RibError::FieldInvalid(field, value.to_string()))
    }

    pub fn opt_uint(
        record: &RouteRecord,
        field: &'static str,
    ) -> Result<Option<u32>, RibError> {
        match record.get(field) {
            None => Ok(None),
            Some(_) => uint(record, field).map(Some),
        }
    }

    pub fn opt_source(
        record: &RouteRecord,
        field: &'static str,
    ) -> Result<Option<SourceCode>, RibError> {
        match record.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => parse(field, get_str(record, field)?).map(Some),
        }
    }

    pub fn opt_status(
        record: &RouteRecord,
        field: &'static str,
    ) -> Result<Option<RouteStatus>, RibError> {
        match record.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => parse(field, get_str(record, field)?).map(Some),
        }
    }

    // Timestamps travel as RFC 3339 strings; anything unparseable is
    // treated as absent (the receiving RIB restamps on mutation anyway).
    pub fn opt_timestamp(
        record: &RouteRecord,
        field: &'static str,
    ) -> Option<DateTime<Utc>> {
        record
            .get(field)
            .and_then(Value::as_str)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc))
    }

    pub fn set(
        record: &mut RouteRecord,
        field: &'static str,
        value: impl Into<Value>,
    ) {
        record.insert(field.to_owned(), value.into());
    }
}

// ===== tests =====
