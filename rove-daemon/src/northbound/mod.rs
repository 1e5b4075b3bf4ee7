//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod control_plane;
pub mod rip1;
pub mod sla;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::distr::Alphanumeric;
use rove_utils::fp::NetFp;
use rove_utils::rib::RouteRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

// The transport-agnostic service surface: one registry of instances per
// daemon type, addressed by request/reply messages a transport binds to.
#[derive(Debug)]
pub struct Northbound {
    pub(crate) fp: Arc<NetFp>,
    pub(crate) control_plane:
        Mutex<Registry<rove_routing::ControlPlane<NetFp>>>,
    pub(crate) sla: Mutex<Registry<rove_sla::Instance<NetFp>>>,
    pub(crate) rip1: Mutex<Registry<rove_rip1::Instance<NetFp>>>,
}

// Instance registry for one daemon type. The `latest` slot tracks the most
// recently created instance and is addressable by the literal id "latest".
#[derive(Debug)]
pub struct Registry<T> {
    instances: BTreeMap<String, Arc<T>>,
    latest: Option<String>,
}

// A service request, targeted at one of the daemon surfaces.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    ControlPlane(control_plane::CpRequest),
    Sla(sla::SlaRequest),
    Rip1(rip1::Rip1Request),
}

// Structured replies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Instances(BTreeMap<String, Value>),
    Spec(Value),
    Created { instance_id: String },
    Deleted { instance_id: String },
    Routes(Vec<RouteRecord>),
    Empty,
}

// Service errors, mapped onto transport status codes by the binding.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiError {
    NotFound(String),
    ConfigInvalid(String),
    NotEnabled(String),
    Transport(String),
}

pub type ApiResult = Result<Reply, ApiError>;
pub type RequestSender = mpsc::Sender<(Request, oneshot::Sender<ApiResult>)>;
pub type RequestReceiver =
    mpsc::Receiver<(Request, oneshot::Sender<ApiResult>)>;

// ===== impl Northbound =====

impl Northbound {
    pub fn new(fp: Arc<NetFp>) -> Northbound {
        Northbound {
            fp,
            control_plane: Mutex::new(Registry::new()),
            sla: Mutex::new(Registry::new()),
            rip1: Mutex::new(Registry::new()),
        }
    }

    // Creates the request channel a transport plugs into.
    pub fn channel() -> (RequestSender, RequestReceiver) {
        mpsc::channel(32)
    }

    // Serves requests until the transport side closes the channel.
    pub async fn serve(self: Arc<Self>, mut rx: RequestReceiver) {
        while let Some((request, reply_tx)) = rx.recv().await {
            debug!(?request, "northbound request");
            let reply = self.dispatch(request).await;
            let _ = reply_tx.send(reply);
        }
    }

    pub async fn dispatch(&self, request: Request) -> ApiResult {
        match request {
            Request::ControlPlane(request) => {
                control_plane::dispatch(self, request).await
            }
            Request::Sla(request) => sla::dispatch(self, request).await,
            Request::Rip1(request) => rip1::dispatch(self, request).await,
        }
    }
}

// ===== impl Registry =====

impl<T> Registry<T> {
    fn new() -> Registry<T> {
        Registry {
            instances: BTreeMap::new(),
            latest: None,
        }
    }

    // Registers an instance under a fresh id and makes it the latest.
    pub fn insert(&mut self, instance: Arc<T>) -> String {
        let instance_id = generate_id();
        self.instances.insert(instance_id.clone(), instance);
        self.latest = Some(instance_id.clone());
        instance_id
    }

    // Resolves the "latest" alias to a concrete id.
    pub fn resolve(&self, instance_id: &str) -> Result<String, ApiError> {
        if instance_id == "latest" {
            self.latest.clone().ok_or_else(|| {
                ApiError::NotFound("'latest' instance not set".to_owned())
            })
        } else {
            Ok(instance_id.to_owned())
        }
    }

    pub fn get(&self, instance_id: &str) -> Result<Arc<T>, ApiError> {
        let instance_id = self.resolve(instance_id)?;
        self.instances.get(&instance_id).cloned().ok_or_else(|| {
            ApiError::NotFound(format!("instance {} not found", instance_id))
        })
    }

    // Removes an instance. Removing a concrete id that doesn't exist is
    // not an error.
    pub fn remove(&mut self, instance_id: &str) -> Result<String, ApiError> {
        let instance_id = self.resolve(instance_id)?;
        self.instances.remove(&instance_id);
        if self.latest.as_deref() == Some(&instance_id) {
            self.latest = None;
        }
        Ok(instance_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<T>)> {
        self.instances.iter()
    }
}

// ===== impl ApiError =====

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(detail) => {
                write!(f, "not found: {}", detail)
            }
            ApiError::ConfigInvalid(detail) => {
                write!(f, "invalid configuration: {}", detail)
            }
            ApiError::NotEnabled(detail) => {
                write!(f, "not enabled: {}", detail)
            }
            ApiError::Transport(detail) => {
                write!(f, "transport failure: {}", detail)
            }
        }
    }
}

impl std::error::Error for ApiError {}

// ===== global functions =====

// Random 8-character alphanumeric instance id.
pub fn generate_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

// Loads a daemon configuration file on behalf of a create request.
pub(crate) fn load_config(
    filename: &str,
) -> Result<crate::config::Config, ApiError> {
    use crate::config::ConfigError;

    crate::config::Config::load(filename).map_err(|error| match error {
        ConfigError::NotFound(path) => {
            ApiError::NotFound(format!("config file not found: {}", path))
        }
        error => ApiError::ConfigInvalid(error.to_string()),
    })
}

// ===== tests =====
