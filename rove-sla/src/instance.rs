//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ipnetwork::IpNetwork;
use rove_utils::fp::ForwardingPlane;
use rove_utils::rib::{Rib, RibRoute, RouteRecord, RouteStatus, record};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::route::SlaRoute;

// SLA instance configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InstanceCfg {
    pub enabled: bool,
    pub admin_distance: u32,
    // Seconds between re-probes of a settled route.
    pub threshold_measure_interval: u64,
    pub routes: Vec<RouteCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RouteCfg {
    pub prefix: IpNetwork,
    pub next_hop: IpAddr,
    pub priority: u32,
    pub threshold_ms: u32,
}

// SLA daemon instance.
//
// Owns the configured table and a working RIB initialised from it. The
// probe loop promotes routes to Up or demotes them to Down; routes are
// never removed by the daemon itself.
#[derive(Debug)]
pub struct Instance<F> {
    pub config: InstanceCfg,
    fp: Arc<F>,
    state: Mutex<InstanceState>,
}

#[derive(Debug, Default)]
struct InstanceState {
    configured: Rib<SlaRoute>,
    rib: Rib<SlaRoute>,
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            enabled: false,
            admin_distance: 1,
            threshold_measure_interval: 60,
            routes: Vec::new(),
        }
    }
}

// ===== impl Instance =====

impl<F> Instance<F>
where
    F: ForwardingPlane,
{
    pub fn new(fp: Arc<F>, config: InstanceCfg) -> Instance<F> {
        let mut state = InstanceState::default();
        for route in &config.routes {
            let route = SlaRoute::new(
                route.prefix,
                route.next_hop,
                route.priority,
                route.threshold_ms,
            );
            state.configured.add(route.clone());
            state.rib.add(route);
        }

        Instance {
            config,
            fp,
            state: Mutex::new(state),
        }
    }

    // Instance description for the service surface.
    pub fn spec(&self) -> Value {
        let state = self.state.lock().unwrap();
        json!({
            "admin_distance": self.config.admin_distance,
            "threshold_measure_interval": self.config.threshold_measure_interval,
            "configured_routes": state.configured.export_routes(),
        })
    }

    pub fn configured_routes(&self) -> Vec<SlaRoute> {
        self.state.lock().unwrap().configured.items()
    }

    pub fn rib_routes(&self) -> Vec<SlaRoute> {
        self.state.lock().unwrap().rib.items()
    }

    pub fn up_routes(&self) -> Vec<SlaRoute> {
        self.state
            .lock()
            .unwrap()
            .rib
            .iter()
            .filter(|route| route.status == RouteStatus::Up)
            .cloned()
            .collect()
    }

    // Adds a route to the configured table and the working RIB.
    pub fn add_route(
        &self,
        prefix: IpNetwork,
        next_hop: IpAddr,
        priority: u32,
        threshold_ms: u32,
    ) {
        let route = SlaRoute::new(prefix, next_hop, priority, threshold_ms);
        let mut state = self.state.lock().unwrap();
        state.configured.add(route.clone());
        state.rib.add(route);
    }

    pub fn delete_route(&self, prefix: IpNetwork, next_hop: IpAddr) {
        let key = (prefix, next_hop);
        let mut state = self.state.lock().unwrap();
        state.configured.discard(&key);
        state.rib.discard(&key);
    }

    // Rebuilds the working RIB from the configured table. Probe state is
    // discarded; routes start over as Unknown.
    pub fn refresh_rib(&self) {
        let mut state = self.state.lock().unwrap();
        let mut rib = Rib::new();
        for route in state.configured.iter() {
            rib.add(SlaRoute::new(
                route.prefix,
                route.next_hop,
                route.priority,
                route.threshold_ms,
            ));
        }
        state.rib = rib;
    }

    // Walks the RIB and re-probes every route that is still Unknown or
    // whose last measurement is older than the measure interval.
    pub async fn evaluate_routes(&self) {
        let interval = Duration::from_secs(self.config.threshold_measure_interval);
        let now = Instant::now();

        let pending: Vec<SlaRoute> = {
            let state = self.state.lock().unwrap();
            state
                .rib
                .iter()
                .filter(|route| {
                    route.status == RouteStatus::Unknown
                        || now.duration_since(route.updated_at) > interval
                })
                .cloned()
                .collect()
        };

        for route in pending {
            let status = self.probe(&route).await;

            let mut state = self.state.lock().unwrap();
            if let Some(route) = state.rib.get_mut(&route.key()) {
                route.status = status;
                route.touch();
            }
        }
    }

    // Probes one next hop. The ping deadline is the threshold rounded up
    // to whole seconds; any timeout or error demotes the route.
    async fn probe(&self, route: &SlaRoute) -> RouteStatus {
        let timeout = Duration::from_secs(route.threshold_ms.div_ceil(1000).into());
        match self.fp.ping(route.next_hop, timeout).await {
            Ok(rtt) => {
                let rtt_ms = rtt.as_secs_f64() * 1000.0;
                debug!(next_hop = %route.next_hop, rtt_ms, "probe reply");
                if rtt_ms <= route.threshold_ms as f64 {
                    RouteStatus::Up
                } else {
                    RouteStatus::Down
                }
            }
            Err(error) => {
                debug!(next_hop = %route.next_hop, %error, "probe failed");
                RouteStatus::Down
            }
        }
    }

    // Returns the best Up route per prefix (highest priority wins), with
    // the configured administrative distance attached.
    pub fn redistribute_out(&self) -> Vec<RouteRecord> {
        let mut best: BTreeMap<IpNetwork, SlaRoute> = BTreeMap::new();
        for route in self.up_routes() {
            match best.get(&route.prefix) {
                Some(current) if current.priority >= route.priority => {}
                _ => {
                    best.insert(route.prefix, route);
                }
            }
        }

        best.values()
            .map(|route| {
                let mut rec = route.to_record();
                record::set(&mut rec, "admin_distance", self.config.admin_distance);
                rec
            })
            .collect()
    }
}
