//! Test doubles shared across module tests

use crate::error::{Result, WorkerError};
use crate::network::Network;
use crate::types::{FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

pub(crate) const ORIGIN: &str = "http://localhost:4000";

pub(crate) fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub(crate) fn get(path: &str) -> FetchRequest {
    FetchRequest::get(origin().join(path).unwrap())
}

/// Network with canned responses per URL that records every fetch.
/// Unknown URLs and a network taken offline fail like an unreachable origin.
#[derive(Default)]
pub(crate) struct ScriptedNetwork {
    responses: Mutex<HashMap<String, FetchResponse>>,
    calls: Mutex<Vec<String>>,
    offline: Mutex<bool>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, path: &str, response: FetchResponse) -> &Self {
        let url = origin().join(path).unwrap().to_string();
        self.responses.lock().unwrap().insert(url, response);
        self
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if *self.offline.lock().unwrap() {
            return Err(WorkerError::Network(format!("{}: connection refused", url)));
        }

        self.responses
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| WorkerError::Network(format!("{}: unreachable", url)))
    }
}
