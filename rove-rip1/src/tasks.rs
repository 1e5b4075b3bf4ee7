//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::{Duration, Instant};

use rove_utils::fp::ForwardingPlane;
use rove_utils::task::{IntervalTask, Task};
use tokio::sync::mpsc;
use tracing::info;

use crate::debug::Debug;
use crate::error::IoError;
use crate::instance::{HOUSEKEEPING_INTERVAL, Instance, UDP_PORT};

//
// RIP loops diagram:
//
//               +-------------+
//   listener -> |             |
//  advertise -> |  instance   | -> udp tx (via forwarding plane)
//    request -> |   state     |
//  housekeep -> |             | -> redistribution trigger (bounded channel)
//               +-------------+
//

// Background loop handles. Dropping a handle cancels its loop.
#[derive(Debug, Default)]
pub(crate) struct LoopTasks {
    pub(crate) listener: Option<Task<()>>,
    pub(crate) advertiser: Option<IntervalTask>,
    pub(crate) requester: Option<IntervalTask>,
    pub(crate) housekeeper: Option<IntervalTask>,
}

// ===== RIP tasks =====

// Indefinite listener on the RIP port. Supervised so a panic while
// processing a hostile packet restarts the loop instead of killing the
// daemon.
pub(crate) fn listener<F>(instance: &Arc<Instance<F>>) -> Task<()>
where
    F: ForwardingPlane,
{
    let instance = instance.clone();
    Task::spawn_supervised(move || {
        let instance = instance.clone();
        async move {
            let (tx, mut rx) = mpsc::channel(16);
            let fp = instance.fp.clone();
            let _io = Task::spawn(async move {
                if let Err(error) = fp.listen_udp(UDP_PORT, tx).await {
                    IoError::UdpRecvError(error).log();
                }
            });

            while let Some(dgram) = rx.recv().await {
                instance.handle_pdu(&dgram.data, dgram.src).await;
            }
        }
    })
}

// Unsolicited RESPONSE every advertisement interval.
pub(crate) fn advertiser<F>(
    instance: &Arc<Instance<F>>,
    interval: Duration,
) -> IntervalTask
where
    F: ForwardingPlane,
{
    let instance = instance.clone();
    IntervalTask::new(interval, false, move || {
        let instance = instance.clone();
        async move {
            Debug::Advertisement.log();
            if let Err(error) = instance.send_response(None).await {
                error.log();
            }
        }
    })
}

// REQUEST cycle: broadcast a dump request, then collect unicast replies on
// the ephemeral source port for the rest of the interval.
pub(crate) fn requester<F>(
    instance: &Arc<Instance<F>>,
    interval: Duration,
) -> IntervalTask
where
    F: ForwardingPlane,
{
    let instance = instance.clone();
    IntervalTask::new(interval, true, move || {
        let instance = instance.clone();
        async move {
            Debug::RequestCycle.log();

            let src_port = match instance.send_request().await {
                Ok(src_port) => src_port,
                Err(error) => {
                    error.log();
                    return;
                }
            };

            let window = interval.saturating_sub(Duration::from_secs(1));
            let (tx, mut rx) = mpsc::channel(16);
            let fp = instance.fp.clone();
            let _io = Task::spawn(async move {
                if let Err(error) =
                    fp.listen_udp_timed(src_port, tx, window).await
                {
                    IoError::UdpRecvError(error).log();
                }
            });

            // The reply window closing drops the channel and ends the loop.
            while let Some(dgram) = rx.recv().await {
                instance.handle_pdu(&dgram.data, dgram.src).await;
            }
        }
    })
}

// Aging pass over the learned table every housekeeping tick.
pub(crate) fn housekeeper<F>(instance: &Arc<Instance<F>>) -> IntervalTask
where
    F: ForwardingPlane,
{
    let instance = instance.clone();
    IntervalTask::new(HOUSEKEEPING_INTERVAL, false, move || {
        let instance = instance.clone();
        async move {
            let stats = instance.age_routes(Instant::now());
            if stats.changed() {
                info!(
                    poisoned = stats.poisoned,
                    removed = stats.removed,
                    "aged out learned routes"
                );
                instance.trigger_redistribution();
            }
        }
    })
}
