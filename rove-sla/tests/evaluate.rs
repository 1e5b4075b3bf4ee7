//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use const_addrs::{ip4, net4};
use rove_sla::{Instance, InstanceCfg};
use rove_utils::fp::{Datagram, ForwardingPlane, FpError};
use tokio::sync::mpsc::Sender;

// Forwarding plane stub answering every ping with a fixed RTT (or a
// timeout when none is configured).
#[derive(Debug, Default)]
struct StubFp {
    rtt: Option<Duration>,
    pings: AtomicUsize,
}

impl StubFp {
    fn with_rtt(rtt_ms: u64) -> Arc<StubFp> {
        Arc::new(StubFp {
            rtt: Some(Duration::from_millis(rtt_ms)),
            pings: AtomicUsize::new(0),
        })
    }

    fn unreachable() -> Arc<StubFp> {
        Arc::new(StubFp::default())
    }

    fn pings(&self) -> usize {
        self.pings.load(Ordering::Relaxed)
    }
}

impl ForwardingPlane for StubFp {
    async fn ping(
        &self,
        _dest: IpAddr,
        _timeout: Duration,
    ) -> Result<Duration, FpError> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        self.rtt.ok_or(FpError::Timeout)
    }

    async fn send_udp(
        &self,
        _payload: &[u8],
        _dst: SocketAddrV4,
        _src_port: Option<u16>,
    ) -> Result<u16, FpError> {
        unimplemented!("the SLA daemon never sends UDP")
    }

    async fn listen_udp(
        &self,
        _port: u16,
        _tx: Sender<Datagram>,
    ) -> Result<(), FpError> {
        unimplemented!("the SLA daemon never listens")
    }

    async fn listen_udp_timed(
        &self,
        _port: u16,
        _tx: Sender<Datagram>,
        _window: Duration,
    ) -> Result<(), FpError> {
        unimplemented!("the SLA daemon never listens")
    }

    fn local_ip(&self) -> Ipv4Addr {
        Ipv4Addr::LOCALHOST
    }
}

fn instance_with_routes(
    fp: Arc<StubFp>,
    routes: &[(&str, &str, u32, u32)],
) -> Instance<StubFp> {
    let instance = Instance::new(fp, InstanceCfg::default());
    for (prefix, next_hop, priority, threshold_ms) in routes {
        instance.add_route(
            prefix.parse().unwrap(),
            next_hop.parse().unwrap(),
            *priority,
            *threshold_ms,
        );
    }
    instance
}

// Two default routes, one threshold above the measured RTT and one below:
// exactly one comes up.
#[tokio::test]
async fn evaluate_one_up_one_down() {
    let fp = StubFp::with_rtt(75);
    let instance = instance_with_routes(
        fp.clone(),
        &[
            ("0.0.0.0/0", "1.1.1.1", 1, 100),
            ("0.0.0.0/0", "1.1.1.2", 2, 50),
        ],
    );

    instance.evaluate_routes().await;

    assert_eq!(instance.configured_routes().len(), 2);
    let up = instance.up_routes();
    assert_eq!(up.len(), 1);
    assert_eq!(up[0].next_hop, IpAddr::from(ip4!("1.1.1.1")));
}

// Priority selection: redistribute-out returns one route per distinct
// prefix, the highest priority winning.
#[tokio::test]
async fn redistribute_out_picks_highest_priority() {
    let fp = StubFp::with_rtt(75);
    let instance = instance_with_routes(
        fp.clone(),
        &[
            ("0.0.0.0/0", "1.1.1.1", 1, 100),
            ("0.0.0.0/0", "1.1.1.2", 2, 50),
            ("1.0.0.0/8", "1.1.1.1", 1, 100),
            ("1.0.0.0/8", "1.1.1.2", 2, 100),
        ],
    );

    instance.evaluate_routes().await;
    assert_eq!(instance.up_routes().len(), 3);

    let out = instance.redistribute_out();
    assert_eq!(out.len(), 2);

    let for_prefix = |prefix: &str| {
        out.iter()
            .find(|rec| rec.get("prefix").unwrap() == prefix)
            .unwrap()
    };
    // 0.0.0.0/0: only the priority-1 route is up.
    assert_eq!(for_prefix("0.0.0.0/0").get("next_hop").unwrap(), "1.1.1.1");
    // 1.0.0.0/8: both up, priority 2 wins.
    assert_eq!(for_prefix("1.0.0.0/8").get("next_hop").unwrap(), "1.1.1.2");

    // Exported records carry the configured admin distance and source.
    for rec in &out {
        assert_eq!(rec.get("admin_distance").unwrap().as_u64(), Some(1));
        assert_eq!(rec.get("route_source").unwrap(), "SLA");
        assert_eq!(rec.get("status").unwrap(), "up");
    }
}

// A probe timeout demotes the route.
#[tokio::test]
async fn timeout_marks_down() {
    let fp = StubFp::unreachable();
    let instance =
        instance_with_routes(fp.clone(), &[("0.0.0.0/0", "1.1.1.1", 1, 100)]);

    instance.evaluate_routes().await;

    let rib = instance.rib_routes();
    assert_eq!(rib.len(), 1);
    assert!(instance.up_routes().is_empty());
}

// Settled routes are not re-probed until the measure interval elapses.
#[tokio::test]
async fn evaluate_respects_measure_interval() {
    let fp = StubFp::with_rtt(10);
    let instance =
        instance_with_routes(fp.clone(), &[("0.0.0.0/0", "1.1.1.1", 1, 100)]);

    instance.evaluate_routes().await;
    assert_eq!(fp.pings(), 1);

    // Still fresh: no new probe.
    instance.evaluate_routes().await;
    assert_eq!(fp.pings(), 1);

    // A RIB refresh resets the probe state.
    instance.refresh_rib();
    instance.evaluate_routes().await;
    assert_eq!(fp.pings(), 2);
}

// Deleting a route removes it from both tables.
#[tokio::test]
async fn add_and_delete_route() {
    let fp = StubFp::with_rtt(10);
    let instance = instance_with_routes(fp, &[("10.0.0.0/8", "1.1.1.1", 1, 100)]);

    instance.delete_route(net4!("10.0.0.0/8").into(), ip4!("1.1.1.1").into());
    assert!(instance.configured_routes().is_empty());
    assert!(instance.rib_routes().is_empty());
}
