//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use const_addrs::{ip4, net4};
use rove_rip1::instance::{ROUTE_GARBAGE_TIMER, ROUTE_TIMEOUT};
use rove_rip1::packet::{Command, Pdu, Rte, RteIpv4};
use rove_rip1::route::Metric;
use rove_rip1::{Instance, InstanceCfg};
use rove_utils::fp::{Datagram, ForwardingPlane, FpError};
use rove_utils::rib::{RouteRecord, RouteStatus, SourceCode, record};
use tokio::sync::mpsc::Sender;

// Forwarding plane stub: records every datagram sent, never receives.
#[derive(Debug)]
struct StubFp {
    local_ip: Ipv4Addr,
    sent: Mutex<Vec<(Vec<u8>, SocketAddrV4, Option<u16>)>>,
}

impl StubFp {
    fn new(local_ip: Ipv4Addr) -> StubFp {
        StubFp {
            local_ip,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<(Vec<u8>, SocketAddrV4, Option<u16>)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ForwardingPlane for StubFp {
    async fn ping(
        &self,
        _dest: IpAddr,
        _timeout: Duration,
    ) -> Result<Duration, FpError> {
        Err(FpError::Timeout)
    }

    async fn send_udp(
        &self,
        payload: &[u8],
        dst: SocketAddrV4,
        src_port: Option<u16>,
    ) -> Result<u16, FpError> {
        self.sent
            .lock()
            .unwrap()
            .push((payload.to_vec(), dst, src_port));
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
        self.local_ip
    }
}

fn new_instance(config: InstanceCfg) -> (Arc<StubFp>, Instance<StubFp>) {
    let fp = Arc::new(StubFp::new(ip4!("192.0.2.99")));
    let instance = Instance::new(fp.clone(), config);
    (fp, instance)
}

fn static_record(prefix: &str, next_hop: &str) -> RouteRecord {
    let mut rec = RouteRecord::new();
    record::set(&mut rec, "prefix", prefix);
    record::set(&mut rec, "next_hop", next_hop);
    record::set(&mut rec, "route_source", SourceCode::Static.as_str());
    rec
}

fn response_pdu(entries: &[(&str, u32)]) -> Vec<u8> {
    let rtes = entries
        .iter()
        .map(|(prefix, metric)| {
            Rte::Ipv4(RteIpv4::new(
                prefix.parse().unwrap(),
                None,
                Metric::clamped(*metric),
            ))
        })
        .collect();
    Pdu::new(Command::Response, rtes).encode().to_vec()
}

fn peer(addr: &str) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(addr.parse().unwrap(), 520))
}

// Redistributed routes are stored at their classful boundary.
#[test]
fn redistribute_in_classful_truncation() {
    let (_, instance) = new_instance(InstanceCfg::default());

    instance.redistribute_in(&[static_record("10.1.2.3/32", "192.0.2.1")]);

    let routes = instance.redistributed_routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].prefix, net4!("10.0.0.0/8"));
    assert_eq!(routes[0].next_hop, ip4!("192.0.2.1"));
    // No metric supplied: the per-source default applies.
    assert_eq!(routes[0].metric.get(), 1);
    assert_eq!(routes[0].source, SourceCode::Static);

    // The RIB is refreshed from the union.
    let rib = instance.rib_routes();
    assert_eq!(rib.len(), 1);
    assert_eq!(rib[0].prefix, net4!("10.0.0.0/8"));
}

// Sources outside the accept-list are dropped, as are records without any
// source attribution.
#[test]
fn redistribute_in_accept_list() {
    let (_, instance) = new_instance(InstanceCfg::default());

    let mut ospf = static_record("10.0.0.0/8", "192.0.2.1");
    record::set(&mut ospf, "route_source", SourceCode::Ospf.as_str());
    let mut unsourced = static_record("20.0.0.0/8", "192.0.2.1");
    unsourced.remove("route_source");
    let accepted = static_record("30.0.0.0/8", "192.0.2.1");

    instance.redistribute_in(&[ospf, unsourced, accepted]);

    let routes = instance.redistributed_routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].prefix, net4!("30.0.0.0/8"));
}

// Supplied metrics are clamped into [1, 16].
#[test]
fn redistribute_in_metric_clamp() {
    let (_, instance) = new_instance(InstanceCfg::default());

    let mut rec = static_record("10.0.0.0/8", "192.0.2.1");
    record::set(&mut rec, "metric", 99);
    instance.redistribute_in(&[rec]);

    let routes = instance.redistributed_routes();
    assert_eq!(routes[0].metric.get(), Metric::INFINITE);
}

// Two consecutive redistribute-in calls with identical input leave the
// daemon state identical.
#[test]
fn redistribute_in_idempotent() {
    let (_, instance) = new_instance(InstanceCfg::default());
    let records = vec![
        static_record("10.1.2.3/32", "192.0.2.1"),
        static_record("172.16.1.0/24", "192.0.2.2"),
    ];

    let snapshot = |instance: &Instance<StubFp>| {
        let mut routes: Vec<_> = instance
            .redistributed_routes()
            .iter()
            .map(|route| {
                (route.prefix, route.next_hop, route.metric, route.source)
            })
            .collect();
        routes.sort();
        routes
    };

    instance.redistribute_in(&records);
    let first = snapshot(&instance);
    instance.redistribute_in(&records);
    assert_eq!(first, snapshot(&instance));
}

// Learned routes are aged: poisoned after the timeout, flushed after the
// garbage timer on top of it.
#[tokio::test]
async fn poison_on_timeout() {
    let (_, instance) = new_instance(InstanceCfg::default());

    instance
        .handle_pdu(&response_pdu(&[("10.0.0.0/8", 2)]), peer("192.0.2.7"))
        .await;

    let learned = instance.learned_routes();
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].status, RouteStatus::Up);
    // The advertised next hop was 0.0.0.0, so it is rewritten to the
    // datagram source.
    assert_eq!(learned[0].next_hop, ip4!("192.0.2.7"));

    let t0 = Instant::now();

    // One second past the timeout: poisoned but still present.
    let stats =
        instance.age_routes(t0 + ROUTE_TIMEOUT + Duration::from_secs(1));
    assert_eq!(stats.poisoned, 1);
    assert_eq!(stats.removed, 0);
    let learned = instance.learned_routes();
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].metric.get(), Metric::INFINITE);
    assert_eq!(learned[0].status, RouteStatus::Down);

    // A second pass in the poisoned window leaves the route untouched.
    let stats =
        instance.age_routes(t0 + ROUTE_TIMEOUT + Duration::from_secs(2));
    assert_eq!(stats.poisoned, 0);
    assert_eq!(stats.removed, 0);

    // Past timeout + garbage timer: flushed.
    let stats = instance.age_routes(
        t0 + ROUTE_TIMEOUT + ROUTE_GARBAGE_TIMER + Duration::from_secs(1),
    );
    assert_eq!(stats.removed, 1);
    assert!(instance.learned_routes().is_empty());
    assert!(instance.rib_routes().is_empty());
}

// A REQUEST is answered with exactly one unicast RESPONSE to the
// requester, carrying the export set with incremented metrics and a
// next hop of 0.0.0.0.
#[tokio::test]
async fn request_gets_unicast_response() {
    let (fp, instance) = new_instance(InstanceCfg::default());

    let mut rec = static_record("10.0.0.0/8", "192.0.2.1");
    record::set(&mut rec, "metric", 2);
    instance.redistribute_in(&[rec]);

    instance
        .handle_pdu(&Pdu::new_dump_request().encode(), peer("192.0.2.5"))
        .await;

    let sent = fp.sent();
    assert_eq!(sent.len(), 1);
    let (payload, dst, src_port) = &sent[0];
    assert_eq!(*dst, SocketAddrV4::new(ip4!("192.0.2.5"), 520));
    assert_eq!(*src_port, Some(520));

    let pdu = Pdu::decode(payload).unwrap();
    assert_eq!(pdu.command, Command::Response);
    assert_eq!(pdu.rtes.len(), 1);
    let rte = pdu.rtes[0].as_ipv4().unwrap();
    assert_eq!(rte.prefix, net4!("10.0.0.0/8"));
    assert_eq!(rte.metric.get(), 3);
    assert_eq!(rte.nexthop, None);
}

// An empty REQUEST gets no response at all.
#[tokio::test]
async fn empty_request_is_ignored() {
    let (fp, instance) = new_instance(InstanceCfg::default());
    instance.redistribute_in(&[static_record("10.0.0.0/8", "192.0.2.1")]);

    let pdu = Pdu::new(Command::Request, vec![]);
    instance.handle_pdu(&pdu.encode(), peer("192.0.2.5")).await;

    assert!(fp.sent().is_empty());
}

// Receiving a poisoned route marks it Down and immediately re-advertises
// to the broadcast destination to speed up convergence.
#[tokio::test]
async fn poisoned_response_triggers_broadcast() {
    let (fp, instance) = new_instance(InstanceCfg::default());

    instance
        .handle_pdu(
            &response_pdu(&[("10.0.0.0/8", 16)]),
            peer("192.0.2.7"),
        )
        .await;

    let learned = instance.learned_routes();
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].status, RouteStatus::Down);
    assert_eq!(learned[0].metric.get(), Metric::INFINITE);

    let sent = fp.sent();
    assert_eq!(sent.len(), 1);
    let (payload, dst, _) = &sent[0];
    assert_eq!(*dst, SocketAddrV4::new(Ipv4Addr::BROADCAST, 520));
    let pdu = Pdu::decode(payload).unwrap();
    assert_eq!(pdu.command, Command::Response);
    // Poisoned metric stays at infinity on the wire.
    assert_eq!(pdu.rtes[0].as_ipv4().unwrap().metric.get(), Metric::INFINITE);
}

// Our own broadcasts are dropped.
#[tokio::test]
async fn own_messages_are_rejected() {
    let (fp, instance) = new_instance(InstanceCfg::default());

    instance
        .handle_pdu(&response_pdu(&[("10.0.0.0/8", 1)]), peer("192.0.2.99"))
        .await;
    assert!(instance.learned_routes().is_empty());
    assert!(fp.sent().is_empty());

    // With the check disabled the same datagram is learned.
    let (_, instance) = new_instance(InstanceCfg {
        reject_own_messages: false,
        ..Default::default()
    });
    instance
        .handle_pdu(&response_pdu(&[("10.0.0.0/8", 1)]), peer("192.0.2.99"))
        .await;
    assert_eq!(instance.learned_routes().len(), 1);
}

// A learned route overwrites a redistributed route of the same identity in
// the RIB, and redistribute-out only offers reachable RIP routes.
#[tokio::test]
async fn redistribute_out_filters_sources_and_poison() {
    let (_, instance) = new_instance(InstanceCfg::default());

    // Foreign route, a learned route, and a poisoned learned route.
    instance.redistribute_in(&[static_record("30.0.0.0/8", "192.0.2.1")]);
    instance
        .handle_pdu(
            &response_pdu(&[("10.0.0.0/8", 2), ("20.0.0.0/8", 16)]),
            peer("192.0.2.7"),
        )
        .await;

    assert_eq!(instance.rib_routes().len(), 3);

    let out = instance.redistribute_out();
    assert_eq!(out.len(), 1);
    let rec = &out[0];
    assert_eq!(rec.get("prefix").unwrap(), "10.0.0.0/8");
    assert_eq!(rec.get("route_source").unwrap(), "RIP1");
    assert_eq!(rec.get("admin_distance").unwrap().as_u64(), Some(120));
}

// The best (minimum-metric) route per prefix wins the export.
#[tokio::test]
async fn export_picks_minimum_metric() {
    let (fp, instance) = new_instance(InstanceCfg::default());

    instance
        .handle_pdu(&response_pdu(&[("10.0.0.0/8", 5)]), peer("192.0.2.7"))
        .await;
    instance
        .handle_pdu(&response_pdu(&[("10.0.0.0/8", 2)]), peer("192.0.2.8"))
        .await;

    // Two identities coexist for the prefix.
    assert_eq!(instance.rib_routes().len(), 2);

    instance.send_response(None).await.unwrap();
    let sent = fp.sent();
    let (payload, _, _) = sent.last().unwrap();
    let pdu = Pdu::decode(payload).unwrap();
    assert_eq!(pdu.rtes.len(), 1);
    assert_eq!(pdu.rtes[0].as_ipv4().unwrap().metric.get(), 3);
}
