//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddrV4;

use itertools::Itertools;
use rove_utils::fp::ForwardingPlane;

use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::instance::{Instance, UDP_PORT};
use crate::packet::{Command, Pdu, Rte, RteIpv4};
use crate::route::{Metric, Rip1Route};

// ===== global functions =====

// Broadcasts a single "send me everything" REQUEST from an ephemeral port
// and returns the port so the caller can collect unicast replies.
pub(crate) async fn send_request<F>(
    instance: &Instance<F>,
) -> Result<u16, Error>
where
    F: ForwardingPlane,
{
    let dst = SocketAddrV4::new(instance.config.broadcast_address, UDP_PORT);
    let pdu = Pdu::new_dump_request();
    Debug::PduTx(&dst, &pdu).log();

    let src_port = instance
        .fp
        .send_udp(&pdu.encode(), dst, None)
        .await
        .map_err(IoError::UdpSendError)?;

    let mut state = instance.state.lock().unwrap();
    state.statistics.update(Command::Request, true);

    Ok(src_port)
}

// Sends a RESPONSE built from the advertisement set. Broadcast unless a
// unicast destination is given. The outbound metric is incremented and
// clamped; the next hop is forced to 0.0.0.0 ("the sender").
pub(crate) async fn send_response<F>(
    instance: &Instance<F>,
    dest: Option<SocketAddrV4>,
) -> Result<(), Error>
where
    F: ForwardingPlane,
{
    // Snapshot the RIB at the top so a concurrent refresh can't produce a
    // torn advertisement.
    let routes = instance.export_routes();

    let rtes = build_rtes(&routes);
    if rtes.is_empty() {
        return Ok(());
    }

    let dst = dest.unwrap_or(SocketAddrV4::new(
        instance.config.broadcast_address,
        UDP_PORT,
    ));

    // Send as many PDUs as necessary.
    let chunks: Vec<Vec<Rte>> = rtes
        .into_iter()
        .chunks(Pdu::MAX_ENTRIES)
        .into_iter()
        .map(|chunk| chunk.collect())
        .collect();
    for rtes in chunks {
        let pdu = Pdu::new(Command::Response, rtes);
        Debug::PduTx(&dst, &pdu).log();

        instance
            .fp
            .send_udp(&pdu.encode(), dst, Some(UDP_PORT))
            .await
            .map_err(IoError::UdpSendError)?;

        let mut state = instance.state.lock().unwrap();
        state.statistics.update(Command::Response, true);
    }

    Ok(())
}

// Renders routes as outbound RTEs.
fn build_rtes(routes: &[Rip1Route]) -> Vec<Rte> {
    routes
        .iter()
        .map(|route| {
            let mut metric = route.metric;
            metric.add(Metric::from(1));
            Rte::Ipv4(RteIpv4::new(route.prefix, None, metric))
        })
        .collect()
}
