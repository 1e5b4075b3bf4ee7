//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{SocketAddr, SocketAddrV4};

use rove_utils::fp::ForwardingPlane;
use rove_utils::rib::{RibRoute, RouteStatus, SourceCode};

use crate::debug::Debug;
use crate::error::Error;
use crate::instance::Instance;
use crate::packet::{Command, Pdu};
use crate::route::Rip1Route;

// ===== UDP packet receipt =====

pub(crate) async fn process_dgram<F>(
    instance: &Instance<F>,
    data: &[u8],
    src: SocketAddr,
) where
    F: ForwardingPlane,
{
    // RIP v1 is IPv4-only.
    let SocketAddr::V4(src) = src else {
        return;
    };

    // Drop our own broadcasts.
    if instance.config.reject_own_messages
        && *src.ip() == instance.fp.local_ip()
    {
        Debug::OwnPduDrop(src.ip()).log();
        return;
    }

    match Pdu::decode(data) {
        Ok(mut pdu) => {
            Debug::PduRx(&src, &pdu).log();

            // Log RTEs that failed to decode; the rest of the PDU is still
            // processed.
            for rte_error in pdu.rte_errors() {
                Error::UdpPduDecodeError(rte_error).log();
            }

            instance
                .state
                .lock()
                .unwrap()
                .statistics
                .update(pdu.command, false);

            match pdu.command {
                Command::Request => {
                    process_pdu_request(instance, src, pdu).await;
                }
                Command::Response => {
                    process_pdu_response(instance, src, pdu).await;
                }
            }
        }
        Err(error) => {
            // Malformed packets never take the daemon down.
            Error::UdpPduDecodeError(error).log();
        }
    }
}

// The response is sent to the requester's address and port.
async fn process_pdu_request<F>(
    instance: &Instance<F>,
    src: SocketAddrV4,
    pdu: Pdu,
) where
    F: ForwardingPlane,
{
    // If there are no entries, no response is given.
    if pdu.rtes.is_empty() {
        return;
    }

    if let Err(error) = instance.send_response(Some(src)).await {
        error.log();
    }
}

// A Response can be received for one of several different reasons:
//
// - response to a specific query
// - regular update (unsolicited response)
// - triggered poison advertisement
//
// Processing is the same no matter why the Response was generated.
async fn process_pdu_response<F>(
    instance: &Instance<F>,
    src: SocketAddrV4,
    pdu: Pdu,
) where
    F: ForwardingPlane,
{
    let mut any_poisoned = false;
    let mut changed = false;

    {
        let mut state = instance.state.lock().unwrap();

        for rte in &pdu.rtes {
            let Some(rte) = rte.as_ipv4() else {
                continue;
            };

            // A next hop of 0.0.0.0 means the sender itself.
            let next_hop = rte.nexthop.unwrap_or(*src.ip());

            // The wire codec already canonicalised the prefix, so the only
            // rejection left here is a class D/E prefix, which decode
            // filtered out too.
            let Ok(mut route) = Rip1Route::new(
                rte.prefix,
                next_hop,
                rte.metric,
                SourceCode::Rip1,
            ) else {
                continue;
            };
            route.status = if route.metric.is_infinite() {
                any_poisoned = true;
                RouteStatus::Down
            } else {
                RouteStatus::Up
            };

            // Overwrite any prior route of the same identity; the fresh
            // timestamps restart the aging clock.
            changed |= match state.learned.get(&route.key()) {
                Some(old) => {
                    old.metric != route.metric || old.status != route.status
                }
                None => true,
            };
            Debug::RouteLearn(&route.prefix, &route.next_hop, &route.metric)
                .log();
            state.learned.add(route);
        }

        Instance::<F>::refresh_rib_locked(&mut state);
    }

    // Pass poisoned reachability on to our own peers without waiting for
    // the next advertisement interval.
    if any_poisoned
        && let Err(error) = instance.send_response(None).await
    {
        error.log();
    }

    if changed {
        instance.trigger_redistribution();
    }
}
