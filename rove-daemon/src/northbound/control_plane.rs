//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;

use rove_routing::ControlPlane;
use rove_utils::rib::RibRoute;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, Northbound, Reply, load_config};

// Control Plane operations.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CpRequest {
    ListInstances,
    GetInstance { id: String },
    CreateFromConfig { filename: String },
    DeleteInstance { id: String },
    GetRoutes { id: String },
    GetStaticRoutes { id: String },
    RefreshRib { id: String },
    Redistribute { id: String },
    GetBestRoutes { id: String },
    RpSlaEvaluate { id: String },
}

pub(crate) async fn dispatch(nb: &Northbound, request: CpRequest) -> ApiResult {
    match request {
        CpRequest::ListInstances => {
            let registry = nb.control_plane.lock().unwrap();
            let instances: BTreeMap<_, _> = registry
                .iter()
                .map(|(id, instance)| (id.clone(), instance.spec()))
                .collect();
            Ok(Reply::Instances(instances))
        }
        CpRequest::GetInstance { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            Ok(Reply::Spec(instance.spec()))
        }
        CpRequest::CreateFromConfig { filename } => {
            let config = load_config(&filename)?;

            // Bring up the enabled protocol daemons first; the control
            // plane holds handles to them for the rest of its life.
            let sla = config.rp_sla.enabled.then(|| {
                let instance = Arc::new(rove_sla::Instance::new(
                    nb.fp.clone(),
                    config.rp_sla.clone(),
                ));
                let id = nb.sla.lock().unwrap().insert(instance.clone());
                (id, instance)
            });
            let rip1 = config.rp_rip1.enabled.then(|| {
                let instance = Arc::new(rove_rip1::Instance::new(
                    nb.fp.clone(),
                    config.rp_rip1.clone(),
                ));
                let id = nb.rip1.lock().unwrap().insert(instance.clone());
                (id, instance)
            });

            let instance =
                Arc::new(ControlPlane::new(config.control_plane, sla, rip1));
            instance.run();

            let instance_id =
                nb.control_plane.lock().unwrap().insert(instance);
            Ok(Reply::Created { instance_id })
        }
        CpRequest::DeleteInstance { id } => {
            let instance_id = nb.control_plane.lock().unwrap().remove(&id)?;
            Ok(Reply::Deleted { instance_id })
        }
        CpRequest::GetRoutes { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            let routes = instance
                .rib_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        CpRequest::GetStaticRoutes { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            let routes = instance
                .static_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        CpRequest::RefreshRib { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            Ok(Reply::Routes(instance.refresh_rib()))
        }
        CpRequest::Redistribute { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            instance.redistribute();
            Ok(Reply::Spec(instance.spec()))
        }
        CpRequest::GetBestRoutes { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            let routes = instance
                .export_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        CpRequest::RpSlaEvaluate { id } => {
            let instance = nb.control_plane.lock().unwrap().get(&id)?;
            instance
                .rp_sla_evaluate_routes()
                .await
                .map_err(|error| ApiError::NotEnabled(error.to_string()))?;
            Ok(Reply::Spec(instance.spec()))
        }
    }
}
