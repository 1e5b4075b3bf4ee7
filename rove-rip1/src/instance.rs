//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use rove_utils::fp::ForwardingPlane;
use rove_utils::rib::{Rib, RibRoute, RouteRecord, SourceCode, record};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::Sender;
use tracing::debug;

use crate::debug::Debug;
use crate::error::Error;
use crate::packet::Command;
use crate::route::Rip1Route;
use crate::{events, output, tasks};

// RIP v1 talks UDP port 520, source and destination.
pub const UDP_PORT: u16 = 520;

// A learned route not refreshed within the timeout is poisoned; once the
// garbage timer also expires it is flushed from the table.
pub const ROUTE_TIMEOUT: Duration = Duration::from_secs(180);
pub const ROUTE_GARBAGE_TIMER: Duration = Duration::from_secs(120);
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

// RIP instance configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InstanceCfg {
    pub enabled: bool,
    pub admin_distance: u32,
    pub default_metric: u8,
    // Seconds between unsolicited RESPONSEs; 0 disables the loop.
    pub advertisement_interval: u64,
    // Seconds between REQUEST cycles; 0 disables the loop.
    pub request_interval: u64,
    pub broadcast_address: Ipv4Addr,
    pub reject_own_messages: bool,
    pub trigger_redistribution: bool,
    pub redistribute_accept: Vec<SourceCode>,
}

// RIP daemon instance.
//
// Owns three disjoint tables: routes learned from peers, routes accepted
// from other sources via redistribute-in, and the RIB rebuilt from their
// union on every refresh. All loops share the state behind one mutex;
// critical sections are short and never span I/O.
#[derive(Debug)]
pub struct Instance<F> {
    pub config: InstanceCfg,
    pub(crate) fp: Arc<F>,
    pub(crate) state: Mutex<InstanceState>,
    redist_tx: Mutex<Option<Sender<()>>>,
    tasks: Mutex<tasks::LoopTasks>,
}

#[derive(Debug, Default)]
pub(crate) struct InstanceState {
    pub(crate) learned: Rib<Rip1Route>,
    pub(crate) redistributed: Rib<Rip1Route>,
    pub(crate) rib: Rib<Rip1Route>,
    pub(crate) statistics: MessageStatistics,
}

// Inbound and outbound statistic counters.
#[derive(Debug, Default)]
pub struct MessageStatistics {
    pub discontinuity_time: Option<DateTime<Utc>>,
    pub requests_rcvd: u32,
    pub requests_sent: u32,
    pub responses_rcvd: u32,
    pub responses_sent: u32,
}

// Summary of one housekeeping pass.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct AgeStats {
    pub poisoned: usize,
    pub removed: usize,
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            enabled: false,
            admin_distance: 120,
            default_metric: 1,
            advertisement_interval: 5,
            request_interval: 30,
            broadcast_address: Ipv4Addr::BROADCAST,
            reject_own_messages: true,
            trigger_redistribution: false,
            redistribute_accept: vec![SourceCode::Static, SourceCode::Sla],
        }
    }
}

// ===== impl Instance =====

impl<F> Instance<F>
where
    F: ForwardingPlane,
{
    pub fn new(fp: Arc<F>, config: InstanceCfg) -> Instance<F> {
        Debug::InstanceCreate.log();

        Instance {
            config,
            fp,
            state: Default::default(),
            redist_tx: Default::default(),
            tasks: Default::default(),
        }
    }

    // Instance description for the service surface.
    pub fn spec(&self) -> Value {
        json!({
            "admin_distance": self.config.admin_distance,
            "default_metric": self.config.default_metric,
        })
    }

    // Full dump: the instance description plus all three tables.
    pub fn full_spec(&self) -> Value {
        let state = self.state.lock().unwrap();
        json!({
            "admin_distance": self.config.admin_distance,
            "default_metric": self.config.default_metric,
            "rib": state.rib.export_routes(),
            "learned_routes": state.learned.export_routes(),
            "redistributed_routes": state.redistributed.export_routes(),
        })
    }

    pub fn rib_routes(&self) -> Vec<Rip1Route> {
        self.state.lock().unwrap().rib.items()
    }

    pub fn learned_routes(&self) -> Vec<Rip1Route> {
        self.state.lock().unwrap().learned.items()
    }

    pub fn redistributed_routes(&self) -> Vec<Rip1Route> {
        self.state.lock().unwrap().redistributed.items()
    }

    // Rebuilds the RIB from the union of the redistributed and learned
    // tables. Learned routes win identity collisions.
    pub fn refresh_rib(&self) {
        let mut state = self.state.lock().unwrap();
        Self::refresh_rib_locked(&mut state);
    }

    pub(crate) fn refresh_rib_locked(state: &mut InstanceState) {
        let mut rib = Rib::new();
        for route in state.redistributed.iter() {
            rib.add(route.clone());
        }
        for route in state.learned.iter() {
            rib.add(route.clone());
        }
        state.rib = rib;
    }

    // Returns the advertisement set: one best route (minimum metric) per
    // prefix, poisoned routes included.
    pub fn export_routes(&self) -> Vec<Rip1Route> {
        let state = self.state.lock().unwrap();
        Self::export_routes_locked(&state)
    }

    pub(crate) fn export_routes_locked(
        state: &InstanceState,
    ) -> Vec<Rip1Route> {
        let mut best: BTreeMap<Ipv4Network, Rip1Route> = BTreeMap::new();
        for route in state.rib.iter() {
            match best.get(&route.prefix) {
                Some(current) if current.metric <= route.metric => {}
                _ => {
                    best.insert(route.prefix, route.clone());
                }
            }
        }
        best.into_values().collect()
    }

    // Broadcasts a REQUEST for the entire routing table and returns the
    // source port so the caller can listen for unicast replies on it.
    pub async fn send_request(&self) -> Result<u16, Error> {
        output::send_request(self).await
    }

    // Sends a RESPONSE built from the advertisement set, broadcast by
    // default or unicast when a destination is given.
    pub async fn send_response(
        &self,
        dest: Option<SocketAddrV4>,
    ) -> Result<(), Error> {
        output::send_response(self, dest).await
    }

    // Entry point for every datagram received on the RIP port or on a
    // request cycle's reply window.
    pub async fn handle_pdu(&self, data: &[u8], src: SocketAddr) {
        events::process_dgram(self, data, src).await;
    }

    // Wholly replaces the redistributed table. Records from sources outside
    // the accept-list are dropped; records without a metric take the
    // per-source default; everything stored is clamped and classful.
    pub fn redistribute_in(&self, records: &[RouteRecord]) {
        let mut table = Rib::new();
        for rec in records {
            let source = match record::opt_source(rec, "route_source") {
                Ok(Some(source)) => source,
                Ok(None) => {
                    debug!("dropping redistributed route without a source");
                    continue;
                }
                Err(error) => {
                    Error::RouteRecordError(error).log();
                    continue;
                }
            };
            if !self.config.redistribute_accept.contains(&source) {
                debug!(%source, "dropping route from unaccepted source");
                continue;
            }

            let mut rec = rec.clone();
            if !rec.contains_key("metric") {
                record::set(&mut rec, "metric", self.config.default_metric);
            }
            match Rip1Route::from_record(&rec) {
                Ok(route) => {
                    table.add(route);
                }
                Err(error) => Error::RouteRecordError(error).log(),
            }
        }

        let mut state = self.state.lock().unwrap();
        state.redistributed = table;
        Self::refresh_rib_locked(&mut state);
    }

    // Exports this protocol's own reachable routes: source RIP1, metric
    // below infinity, one best per prefix, tagged with the administrative
    // distance.
    pub fn redistribute_out(&self) -> Vec<RouteRecord> {
        let state = self.state.lock().unwrap();

        let mut best: BTreeMap<Ipv4Network, &Rip1Route> = BTreeMap::new();
        for route in state.rib.iter() {
            if route.source != SourceCode::Rip1 || route.metric.is_infinite() {
                continue;
            }
            match best.get(&route.prefix) {
                Some(current) if current.metric <= route.metric => {}
                _ => {
                    best.insert(route.prefix, route);
                }
            }
        }

        best.into_values()
            .map(|route| {
                let mut rec = route.to_record();
                record::set(&mut rec, "admin_distance", self.config.admin_distance);
                rec
            })
            .collect()
    }

    // One housekeeping pass over the learned table: poisons routes past the
    // timeout, flushes routes past the garbage timer. Any change refreshes
    // the RIB. Takes the clock as a parameter so aging is testable.
    pub fn age_routes(&self, now: Instant) -> AgeStats {
        let mut stats = AgeStats::default();
        let mut state = self.state.lock().unwrap();

        let mut poison = vec![];
        let mut flush = vec![];
        for route in state.learned.iter() {
            let age = now.saturating_duration_since(route.updated_at);
            if age > ROUTE_TIMEOUT + ROUTE_GARBAGE_TIMER {
                flush.push(route.key());
            } else if age > ROUTE_TIMEOUT && !route.metric.is_infinite() {
                poison.push(route.key());
            }
        }

        for key in poison {
            if let Some(route) = state.learned.get_mut(&key) {
                Debug::RoutePoison(&route.prefix, &route.next_hop).log();
                route.poison();
                stats.poisoned += 1;
            }
        }
        for key in flush {
            Debug::RouteFlush(&key.0, &key.1).log();
            state.learned.remove(&key);
            stats.removed += 1;
        }

        if stats.changed() {
            Self::refresh_rib_locked(&mut state);
        }
        stats
    }

    // Hands the instance the redistribution trigger channel. The consumer
    // side collapses bursts into single control-plane cycles.
    pub fn set_redistribution_trigger(&self, tx: Sender<()>) {
        *self.redist_tx.lock().unwrap() = Some(tx);
    }

    // Fire-and-forget signal that this daemon's routes changed. A full
    // channel means a cycle is already pending, so nothing is lost.
    pub(crate) fn trigger_redistribution(&self) {
        if !self.config.trigger_redistribution {
            return;
        }
        if let Some(tx) = &*self.redist_tx.lock().unwrap() {
            Debug::RedistributionTrigger.log();
            let _ = tx.try_send(());
        }
    }

    // Starts the listener only.
    pub fn listen(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.listener.is_none() {
            tasks.listener = Some(tasks::listener(self));
        }
    }

    // Starts all four background loops. A configured interval of zero
    // disables the corresponding loop.
    pub fn run(self: &Arc<Self>) {
        Debug::InstanceStart.log();

        let mut tasks = self.tasks.lock().unwrap();
        if tasks.listener.is_none() {
            tasks.listener = Some(tasks::listener(self));
        }
        if self.config.advertisement_interval > 0 {
            tasks.advertiser = Some(tasks::advertiser(
                self,
                Duration::from_secs(self.config.advertisement_interval),
            ));
        }
        if self.config.request_interval > 0 {
            tasks.requester = Some(tasks::requester(
                self,
                Duration::from_secs(self.config.request_interval),
            ));
        }
        tasks.housekeeper = Some(tasks::housekeeper(self));
    }

    // Cancels all background loops. In-flight sends complete on their own;
    // pending listens are abandoned.
    pub fn shutdown(&self) {
        Debug::InstanceStop.log();
        *self.tasks.lock().unwrap() = Default::default();
    }
}

// ===== impl MessageStatistics =====

impl MessageStatistics {
    pub(crate) fn update(&mut self, command: Command, sent: bool) {
        self.discontinuity_time = Some(Utc::now());
        match (command, sent) {
            (Command::Request, false) => self.requests_rcvd += 1,
            (Command::Request, true) => self.requests_sent += 1,
            (Command::Response, false) => self.responses_rcvd += 1,
            (Command::Response, true) => self.responses_sent += 1,
        }
    }
}

// ===== impl AgeStats =====

impl AgeStats {
    pub fn changed(&self) -> bool {
        self.poisoned > 0 || self.removed > 0
    }
}
