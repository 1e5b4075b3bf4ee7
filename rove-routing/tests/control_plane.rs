//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use const_addrs::{ip4, net4};
use rove_rip1::packet::{Command, Pdu, Rte, RteIpv4};
use rove_rip1::route::Metric;
use rove_routing::{ControlPlane, ControlPlaneCfg, CpStaticRoute};
use rove_utils::fp::{Datagram, ForwardingPlane, FpError};
use rove_utils::rib::SourceCode;
use tokio::sync::mpsc::Sender;

// Forwarding plane stub serving both daemons: fixed-RTT pings for SLA,
// sent-datagram capture for RIP.
#[derive(Debug)]
struct StubFp {
    rtt: Option<Duration>,
    sent: Mutex<Vec<(Vec<u8>, SocketAddrV4)>>,
}

impl StubFp {
    fn new(rtt_ms: Option<u64>) -> Arc<StubFp> {
        Arc::new(StubFp {
            rtt: rtt_ms.map(Duration::from_millis),
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl ForwardingPlane for StubFp {
    async fn ping(
        &self,
        _dest: IpAddr,
        _timeout: Duration,
    ) -> Result<Duration, FpError> {
        self.rtt.ok_or(FpError::Timeout)
    }

    async fn send_udp(
        &self,
        payload: &[u8],
        dst: SocketAddrV4,
        src_port: Option<u16>,
    ) -> Result<u16, FpError> {
        self.sent.lock().unwrap().push((payload.to_vec(), dst));
        Ok(src_port.unwrap_or(49152))
    }

    async fn listen_udp(
        &self,
        _port: u16,
        _tx: Sender<Datagram>,
    ) -> Result<(), FpError> {
        std::future::pending().await
    }

    async fn listen_udp_timed(
        &self,
        _port: u16,
        _tx: Sender<Datagram>,
        window: Duration,
    ) -> Result<(), FpError> {
        tokio::time::sleep(window).await;
        Ok(())
    }

    fn local_ip(&self) -> Ipv4Addr {
        ip4!("192.0.2.99")
    }
}

// Feeds one learned route into a RIP instance through its PDU handler.
async fn learn(
    rip1: &rove_rip1::Instance<StubFp>,
    prefix: &str,
    peer: &str,
    metric: u8,
) {
    let pdu = Pdu::new(
        Command::Response,
        vec![Rte::Ipv4(RteIpv4::new(
            prefix.parse().unwrap(),
            None,
            Metric::from(metric),
        ))],
    );
    let src = SocketAddr::V4(SocketAddrV4::new(peer.parse().unwrap(), 520));
    rip1.handle_pdu(&pdu.encode(), src).await;
}

// Static beats RIP for the same prefix: smallest admin distance wins.
#[tokio::test]
async fn best_path_by_admin_distance() {
    let fp = StubFp::new(None);
    let rip1 = Arc::new(rove_rip1::Instance::new(
        fp.clone(),
        rove_rip1::InstanceCfg::default(),
    ));
    learn(&rip1, "10.0.0.0/8", "192.0.2.7", 2).await;

    let cp = ControlPlane::new(
        ControlPlaneCfg::default(),
        None,
        Some(("rip1".to_owned(), rip1)),
    );
    cp.add_static_route(
        CpStaticRoute::new(net4!("10.0.0.0/8").into(), ip4!("192.0.2.1").into(), 1),
        true,
    );

    cp.refresh_rib();
    // Two sources coexist in the composite RIB.
    assert_eq!(cp.rib_routes().len(), 2);

    let best = cp.export_routes();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].route_source, SourceCode::Static);
    assert_eq!(best[0].admin_distance, 1);
}

// Equal distances: the tie-break is deterministic (source code string,
// then next hop).
#[tokio::test]
async fn equal_distance_tie_break() {
    let fp = StubFp::new(None);
    let rip1 = Arc::new(rove_rip1::Instance::new(
        fp.clone(),
        rove_rip1::InstanceCfg {
            admin_distance: 1,
            ..Default::default()
        },
    ));
    learn(&rip1, "10.0.0.0/8", "192.0.2.7", 2).await;

    let cp = ControlPlane::new(
        ControlPlaneCfg::default(),
        None,
        Some(("rip1".to_owned(), rip1)),
    );
    cp.add_static_route(
        CpStaticRoute::new(net4!("10.0.0.0/8").into(), ip4!("192.0.2.1").into(), 1),
        true,
    );

    cp.refresh_rib();
    let best = cp.export_routes();
    assert_eq!(best.len(), 1);
    // "RIP1" sorts before "STATIC".
    assert_eq!(best[0].route_source, SourceCode::Rip1);

    // Repeat runs settle on the same winner.
    for _ in 0..3 {
        cp.refresh_rib();
        assert_eq!(cp.export_routes()[0].route_source, SourceCode::Rip1);
    }
}

// The composite RIB merges statics with both daemons' best routes.
#[tokio::test]
async fn refresh_rib_composition() {
    let fp = StubFp::new(Some(20));

    let sla = Arc::new(rove_sla::Instance::new(
        fp.clone(),
        rove_sla::InstanceCfg {
            admin_distance: 2,
            ..Default::default()
        },
    ));
    sla.add_route("0.0.0.0/0".parse().unwrap(), ip4!("1.1.1.1").into(), 1, 100);
    sla.evaluate_routes().await;

    let rip1 = Arc::new(rove_rip1::Instance::new(
        fp.clone(),
        rove_rip1::InstanceCfg::default(),
    ));
    learn(&rip1, "20.0.0.0/8", "192.0.2.7", 3).await;

    let cp = ControlPlane::new(
        ControlPlaneCfg::default(),
        Some(("sla".to_owned(), sla)),
        Some(("rip1".to_owned(), rip1)),
    );
    cp.add_static_route(
        CpStaticRoute::new(net4!("10.0.0.0/8").into(), ip4!("192.0.2.1").into(), 1),
        true,
    );

    let records = cp.refresh_rib();
    assert_eq!(records.len(), 3);

    let best = cp.export_routes();
    assert_eq!(best.len(), 3);
    let source_of = |prefix: &str| {
        best.iter()
            .find(|route| route.prefix.to_string() == prefix)
            .map(|route| route.route_source)
            .unwrap()
    };
    assert_eq!(source_of("10.0.0.0/8"), SourceCode::Static);
    assert_eq!(source_of("0.0.0.0/0"), SourceCode::Sla);
    assert_eq!(source_of("20.0.0.0/8"), SourceCode::Rip1);
}

// A full redistribution cycle pushes the post-selection table back into
// the RIP daemon, classful-truncated on arrival.
#[tokio::test]
async fn redistribute_cycle_feeds_rip() {
    let fp = StubFp::new(Some(20));

    let sla = Arc::new(rove_sla::Instance::new(
        fp.clone(),
        rove_sla::InstanceCfg {
            admin_distance: 2,
            ..Default::default()
        },
    ));
    sla.add_route(
        "172.16.5.0/24".parse().unwrap(),
        ip4!("1.1.1.1").into(),
        1,
        100,
    );
    sla.evaluate_routes().await;

    let rip1 = Arc::new(rove_rip1::Instance::new(
        fp.clone(),
        rove_rip1::InstanceCfg::default(),
    ));

    let cp = ControlPlane::new(
        ControlPlaneCfg::default(),
        Some(("sla".to_owned(), sla)),
        Some(("rip1".to_owned(), rip1.clone())),
    );
    cp.add_static_route(
        CpStaticRoute::new(
            net4!("10.1.2.3/32").into(),
            ip4!("192.0.2.1").into(),
            1,
        ),
        true,
    );

    cp.redistribute();

    let redistributed = rip1.redistributed_routes();
    assert_eq!(redistributed.len(), 2);
    let prefixes: Vec<_> = redistributed
        .iter()
        .map(|route| route.prefix.to_string())
        .collect();
    // Both prefixes were truncated to their classful boundaries.
    assert!(prefixes.contains(&"10.0.0.0/8".to_owned()));
    assert!(prefixes.contains(&"172.16.0.0/16".to_owned()));

    // Source attribution survives the cycle.
    let sources: Vec<_> =
        redistributed.iter().map(|route| route.source).collect();
    assert!(sources.contains(&SourceCode::Static));
    assert!(sources.contains(&SourceCode::Sla));

    // Running the cycle again is idempotent.
    cp.redistribute();
    assert_eq!(rip1.redistributed_routes().len(), 2);
}

// The RIP daemon's trigger channel drives control plane redistribution.
#[tokio::test]
async fn rip_trigger_runs_redistribution() {
    let fp = StubFp::new(None);

    let rip1 = Arc::new(rove_rip1::Instance::new(
        fp.clone(),
        rove_rip1::InstanceCfg {
            trigger_redistribution: true,
            ..Default::default()
        },
    ));

    let cp = Arc::new(ControlPlane::new(
        ControlPlaneCfg::default(),
        None,
        Some(("rip1".to_owned(), rip1.clone())),
    ));
    cp.add_static_route(
        CpStaticRoute::new(net4!("10.0.0.0/8").into(), ip4!("192.0.2.1").into(), 1),
        true,
    );
    cp.run();

    // Learn a route; the change fires the trigger, whose consumer runs a
    // cycle that lands the static route in the RIP daemon.
    learn(&rip1, "20.0.0.0/8", "192.0.2.7", 2).await;

    let mut redistributed = vec![];
    for _ in 0..50 {
        redistributed = rip1.redistributed_routes();
        if !redistributed.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(redistributed.len(), 1);
    assert_eq!(redistributed[0].prefix, net4!("10.0.0.0/8"));

    cp.shutdown();
}

// Evaluate forwarding fails cleanly when no SLA daemon is attached.
#[tokio::test]
async fn sla_evaluate_requires_sla() {
    let cp: ControlPlane<StubFp> =
        ControlPlane::new(ControlPlaneCfg::default(), None, None);

    assert!(cp.rp_sla_evaluate_routes().await.is_err());
}
