//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;

use rove_utils::rib::{RibRoute, RouteRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, ApiResult, Northbound, Reply, load_config};

// RIP daemon operations.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rip1Request {
    ListInstances,
    GetInstance { id: String },
    CreateFromConfig { filename: String },
    DeleteInstance { id: String },
    GetRibRoutes { id: String },
    GetFull { id: String },
    RedistributeIn { id: String, routes: Vec<RouteRecord> },
    RedistributeOut { id: String },
    RefreshRib { id: String },
    SendResponse { id: String },
    SendRequest { id: String },
    Listen { id: String },
    Run { id: String },
}

pub(crate) async fn dispatch(
    nb: &Northbound,
    request: Rip1Request,
) -> ApiResult {
    match request {
        Rip1Request::ListInstances => {
            let registry = nb.rip1.lock().unwrap();
            let instances: BTreeMap<_, _> = registry
                .iter()
                .map(|(id, instance)| (id.clone(), instance.spec()))
                .collect();
            Ok(Reply::Instances(instances))
        }
        Rip1Request::GetInstance { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            Ok(Reply::Spec(instance.spec()))
        }
        Rip1Request::CreateFromConfig { filename } => {
            let config = load_config(&filename)?;
            let instance = Arc::new(rove_rip1::Instance::new(
                nb.fp.clone(),
                config.rp_rip1,
            ));
            let instance_id = nb.rip1.lock().unwrap().insert(instance);
            Ok(Reply::Created { instance_id })
        }
        Rip1Request::DeleteInstance { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id).ok();
            if let Some(instance) = instance {
                instance.shutdown();
            }
            let instance_id = nb.rip1.lock().unwrap().remove(&id)?;
            Ok(Reply::Deleted { instance_id })
        }
        Rip1Request::GetRibRoutes { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            let routes = instance
                .rib_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        Rip1Request::GetFull { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            Ok(Reply::Spec(instance.full_spec()))
        }
        Rip1Request::RedistributeIn { id, routes } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            instance.redistribute_in(&routes);
            let routes = instance
                .redistributed_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        Rip1Request::RedistributeOut { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            Ok(Reply::Routes(instance.redistribute_out()))
        }
        Rip1Request::RefreshRib { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            instance.refresh_rib();
            let routes = instance
                .rib_routes()
                .iter()
                .map(RibRoute::to_record)
                .collect();
            Ok(Reply::Routes(routes))
        }
        Rip1Request::SendResponse { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            instance
                .send_response(None)
                .await
                .map_err(|error| ApiError::Transport(error.to_string()))?;
            Ok(Reply::Empty)
        }
        Rip1Request::SendRequest { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            let src_port = instance
                .send_request()
                .await
                .map_err(|error| ApiError::Transport(error.to_string()))?;
            Ok(Reply::Spec(json!({ "src_port": src_port })))
        }
        Rip1Request::Listen { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            instance.listen();
            Ok(Reply::Empty)
        }
        Rip1Request::Run { id } => {
            let instance = nb.rip1.lock().unwrap().get(&id)?;
            instance.run();
            Ok(Reply::Empty)
        }
    }
}
