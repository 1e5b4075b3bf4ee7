//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipnetwork::IpNetwork;
use rove_utils::fp::ForwardingPlane;
use rove_utils::rib::{Rib, RibRoute, RouteRecord, RouteStatus};
use rove_utils::task::{IntervalTask, Task};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::route::{CpRoute, CpStaticRoute};

// Control plane configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ControlPlaneCfg {
    pub hostname: String,
    pub static_routes: Vec<StaticRouteCfg>,
    // Seconds between unsolicited redistribution cycles; 0 disables the
    // loop (cycles still run on daemon triggers and operator requests).
    pub redistribute_interval: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StaticRouteCfg {
    pub prefix: IpNetwork,
    pub next_hop: IpAddr,
    pub admin_distance: Option<u32>,
}

// The Control Plane arbiter.
//
// Holds the operator's static table, a composite RIB rebuilt on every
// refresh or redistribution cycle, and handles to the protocol daemons
// that were enabled by configuration.
#[derive(Debug)]
pub struct ControlPlane<F> {
    pub config: ControlPlaneCfg,
    pub sla_instance: Option<String>,
    pub rip1_instance: Option<String>,
    sla: Option<Arc<rove_sla::Instance<F>>>,
    rip1: Option<Arc<rove_rip1::Instance<F>>>,
    state: Mutex<CpState>,
    trigger_rx: Mutex<Option<Receiver<()>>>,
    tasks: Mutex<CpTasks>,
}

#[derive(Debug, Default)]
struct CpState {
    static_routes: Rib<CpStaticRoute>,
    rib: Rib<CpRoute>,
}

#[derive(Debug, Default)]
struct CpTasks {
    trigger_consumer: Option<Task<()>>,
    redistributor: Option<IntervalTask>,
}

// ===== impl ControlPlaneCfg =====

impl Default for ControlPlaneCfg {
    fn default() -> ControlPlaneCfg {
        ControlPlaneCfg {
            hostname: "rove".to_owned(),
            static_routes: Vec::new(),
            redistribute_interval: 0,
        }
    }
}

// ===== impl ControlPlane =====

impl<F> ControlPlane<F>
where
    F: ForwardingPlane,
{
    pub fn new(
        config: ControlPlaneCfg,
        sla: Option<(String, Arc<rove_sla::Instance<F>>)>,
        rip1: Option<(String, Arc<rove_rip1::Instance<F>>)>,
    ) -> ControlPlane<F> {
        let (sla_instance, sla) = sla.unzip();
        let (rip1_instance, rip1) = rip1.unzip();

        // Wire up the redistribution trigger when the RIP daemon asks for
        // it. The channel is bounded: a full queue just means a cycle is
        // already pending.
        let mut trigger_rx = None;
        if let Some(rip1) = &rip1
            && rip1.config.trigger_redistribution
        {
            let (tx, rx) = mpsc::channel(4);
            rip1.set_redistribution_trigger(tx);
            trigger_rx = Some(rx);
        }

        let cp = ControlPlane {
            config,
            sla_instance,
            rip1_instance,
            sla,
            rip1,
            state: Default::default(),
            trigger_rx: Mutex::new(trigger_rx),
            tasks: Default::default(),
        };

        for route in &cp.config.static_routes {
            let route = CpStaticRoute::new(
                route.prefix,
                route.next_hop,
                route.admin_distance.unwrap_or(1),
            );
            cp.add_static_route(route, true);
        }

        cp
    }

    // Instance description for the service surface.
    pub fn spec(&self) -> Value {
        let state = self.state.lock().unwrap();
        json!({
            "hostname": self.config.hostname,
            "rp_sla_enabled": self.sla.is_some(),
            "rp_sla_instance": self.sla_instance,
            "rp_rip1_enabled": self.rip1.is_some(),
            "rp_rip1_instance": self.rip1_instance,
            "static_routes": state.static_routes.export_routes(),
        })
    }

    pub fn add_static_route(&self, route: CpStaticRoute, rib_sync: bool) {
        let mut state = self.state.lock().unwrap();
        if rib_sync {
            state.rib.add(route.to_cp_route());
        }
        state.static_routes.add(route);
    }

    pub fn remove_static_route(
        &self,
        prefix: IpNetwork,
        next_hop: IpAddr,
        rib_sync: bool,
    ) {
        let mut state = self.state.lock().unwrap();
        if let Some(route) = state.static_routes.remove(&(prefix, next_hop))
            && rib_sync
        {
            state.rib.discard(&route.to_cp_route().key());
        }
    }

    pub fn static_routes(&self) -> Vec<CpStaticRoute> {
        self.state.lock().unwrap().static_routes.items()
    }

    pub fn rib_routes(&self) -> Vec<CpRoute> {
        self.state.lock().unwrap().rib.items()
    }

    pub fn up_routes(&self) -> Vec<CpRoute> {
        self.state
            .lock()
            .unwrap()
            .rib
            .iter()
            .filter(|route| route.status == RouteStatus::Up)
            .cloned()
            .collect()
    }

    // Rebuilds the composite RIB from the static table and each enabled
    // daemon's best routes, and returns the new contents.
    pub fn refresh_rib(&self) -> Vec<RouteRecord> {
        let rib = self.build_composite();
        let mut state = self.state.lock().unwrap();
        state.rib = rib;
        state.rib.export_routes()
    }

    fn build_composite(&self) -> Rib<CpRoute> {
        let mut rib = Rib::new();

        {
            let state = self.state.lock().unwrap();
            for route in state.static_routes.iter() {
                rib.add(route.to_cp_route());
            }
        }

        // A failing peer contributes nothing; the cycle proceeds with
        // whatever it already has.
        if let Some(sla) = &self.sla {
            for record in sla.redistribute_out() {
                if let Err(error) = rib.add_record(&record, false) {
                    warn!(%error, "discarding SLA route");
                }
            }
        }
        if let Some(rip1) = &self.rip1 {
            for record in rip1.redistribute_out() {
                if let Err(error) = rib.add_record(&record, false) {
                    warn!(%error, "discarding RIP route");
                }
            }
        }

        rib
    }

    // One full redistribution cycle: rebuild the composite RIB from every
    // daemon's redistribute-out, then push the post-selection table into
    // each daemon that accepts redistribute-in.
    pub fn redistribute(&self) {
        debug!("redistribution cycle");

        let rib = self.build_composite();
        {
            let mut state = self.state.lock().unwrap();
            state.rib = rib;
        }

        let records: Vec<RouteRecord> = self
            .export_routes()
            .iter()
            .map(CpRoute::to_record)
            .collect();

        // Each daemon filters by its own accept-list; SLA accepts nothing.
        if let Some(rip1) = &self.rip1 {
            rip1.redistribute_in(&records);
        }
    }

    // Collapses the composite RIB to at most one route per prefix: among
    // Up routes the smallest administrative distance wins. Equal distances
    // fall back to the source-code string, then the next hop, purely so
    // the result is deterministic.
    pub fn export_routes(&self) -> Vec<CpRoute> {
        let mut best: BTreeMap<IpNetwork, CpRoute> = BTreeMap::new();
        for route in self.up_routes() {
            match best.get(&route.prefix) {
                Some(current) if !Self::prefer(&route, current) => {}
                _ => {
                    best.insert(route.prefix, route);
                }
            }
        }
        best.into_values().collect()
    }

    fn prefer(candidate: &CpRoute, current: &CpRoute) -> bool {
        (
            candidate.admin_distance,
            candidate.route_source.as_str(),
            candidate.next_hop,
        ) < (
            current.admin_distance,
            current.route_source.as_str(),
            current.next_hop,
        )
    }

    // Forwards an evaluate request to the SLA daemon.
    pub async fn rp_sla_evaluate_routes(&self) -> Result<(), Error> {
        let sla = self.sla.as_ref().ok_or(Error::SlaNotEnabled)?;
        sla.evaluate_routes().await;
        Ok(())
    }

    // Starts the background activities: the trigger consumer draining the
    // RIP daemon's redistribution requests, and the optional periodic
    // redistribution loop.
    pub fn run(self: &Arc<Self>) {
        info!(hostname = %self.config.hostname, "starting control plane");

        let mut tasks = self.tasks.lock().unwrap();

        if let Some(rx) = self.trigger_rx.lock().unwrap().take() {
            tasks.trigger_consumer = Some(trigger_consumer(self, rx));
        }

        if self.config.redistribute_interval > 0 {
            let cp = self.clone();
            tasks.redistributor = Some(IntervalTask::new(
                Duration::from_secs(self.config.redistribute_interval),
                false,
                move || {
                    let cp = cp.clone();
                    async move {
                        cp.redistribute();
                    }
                },
            ));
        }
    }

    pub fn shutdown(&self) {
        *self.tasks.lock().unwrap() = Default::default();
    }
}

// ===== helper functions =====

// Consumes daemon-originated redistribution triggers, collapsing bursts
// into a single cycle. Trigger failures never propagate back into the
// daemon's loops.
fn trigger_consumer<F>(
    cp: &Arc<ControlPlane<F>>,
    mut rx: Receiver<()>,
) -> Task<()>
where
    F: ForwardingPlane,
{
    let cp = cp.clone();
    Task::spawn(async move {
        while rx.recv().await.is_some() {
            while rx.try_recv().is_ok() {}
            debug!("daemon-triggered redistribution");
            cp.redistribute();
        }
    })
}
