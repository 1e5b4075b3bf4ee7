//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use rove_utils::rib::RibRoute;
use serde::{Deserialize, Serialize};

use super::{ApiResult, Northbound, Reply, load_config};

// SLA daemon operations.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaRequest {
    ListInstances,
    GetInstance {
        id: String,
    },
    CreateFromConfig {
        filename: String,
    },
    DeleteInstance {
        id: String,
    },
    GetConfiguredRoutes {
        id: String,
    },
    GetRibRoutes {
        id: String,
    },
    AddRoute {
        id: String,
        prefix: IpNetwork,
        next_hop: IpAddr,
        priority: u32,
        threshold_ms: u32,
    },
    DeleteRoute {
        id: String,
        prefix: IpNetwork,
        next_hop: IpAddr,
    },
    EvaluateRoutes {
        id: String,
    },
    RedistributeOut {
        id: String,
    },
}

pub(crate) async fn dispatch(
    nb: &Northbound,
    request: SlaRequest,
) -> ApiResult {
    match request {
        SlaRequest::ListInstances => {
            let registry = nb.sla.lock().unwrap();
            let instances: BTreeMap<_, _> = registry
                .iter()
                .map(|(id, instance)| (id.clone(), instance.spec()))
                .collect();
            Ok(Reply::Instances(instances))
        }
        SlaRequest::GetInstance { id } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            Ok(Reply::Spec(instance.spec()))
        }
        SlaRequest::CreateFromConfig { filename } => {
            let config = load_config(&filename)?;
            let instance =
                Arc::new(rove_sla::Instance::new(nb.fp.clone(), config.rp_sla));
            let instance_id = nb.sla.lock().unwrap().insert(instance);
            Ok(Reply::Created { instance_id })
        }
        SlaRequest::DeleteInstance { id } => {
            let instance_id = nb.sla.lock().unwrap().remove(&id)?;
            Ok(Reply::Deleted { instance_id })
        }
        SlaRequest::GetConfiguredRoutes { id } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            let routes = instance
                .configured_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        SlaRequest::GetRibRoutes { id } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            let routes = instance
                .rib_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        SlaRequest::AddRoute {
            id,
            prefix,
            next_hop,
            priority,
            threshold_ms,
        } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            instance.add_route(prefix, next_hop, priority, threshold_ms);
            Ok(Reply::Spec(instance.spec()))
        }
        SlaRequest::DeleteRoute {
            id,
            prefix,
            next_hop,
        } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            instance.delete_route(prefix, next_hop);
            Ok(Reply::Spec(instance.spec()))
        }
        SlaRequest::EvaluateRoutes { id } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            instance.evaluate_routes().await;
            let routes = instance
                .rib_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        SlaRequest::RedistributeOut { id } => {
            let instance = nb.sla.lock().unwrap().get(&id)?;
            Ok(Reply::Routes(instance.redistribute_out()))
        }
    }
}
