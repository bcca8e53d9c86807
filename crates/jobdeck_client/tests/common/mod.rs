#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

use jobdeck_client::{ListFetcher, Transport};
use jobdeck_core::{ApiError, ListParams, TransportFailure};
use serde_json::{json, Value};
use tokio::sync::Notify;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(jobdeck_logging::initialize_for_tests);
}

pub fn status(id: &str, status: &str, percent: f64) -> Value {
    json!({ "id": id, "status": status, "percent": percent })
}

pub fn network_down() -> ApiError {
    ApiError::transport(TransportFailure::Network, "connection refused")
}

/// Answers each endpoint from a script. The last scripted answer repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<BTreeMap<String, VecDeque<Result<Value, ApiError>>>>,
    calls: Mutex<Vec<(String, ListParams)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script<I>(&self, endpoint: &str, answers: I)
    where
        I: IntoIterator<Item = Result<Value, ApiError>>,
    {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), answers.into_iter().collect());
    }

    /// Scripts `GET /job/{id}/status` with the given `(status, percent)` steps.
    pub fn script_status(&self, id: &str, steps: &[(&str, f64)]) {
        self.script(
            &format!("/job/{id}/status"),
            steps.iter().map(|(s, p)| Ok(status(id, s, *p))),
        );
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .count()
    }

    pub fn last_query(&self, endpoint: &str) -> Option<ListParams> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| e == endpoint)
            .map(|(_, q)| q.clone())
    }

    fn answer(&self, endpoint: &str, query: &ListParams) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), query.clone()));
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(endpoint) else {
            return Err(ApiError::transport(
                TransportFailure::HttpStatus(404),
                format!("no script for {endpoint}"),
            ));
        };
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, endpoint: &str, query: &ListParams) -> Result<Value, ApiError> {
        self.answer(endpoint, query)
    }

    async fn post(&self, endpoint: &str, _body: &Value) -> Result<Value, ApiError> {
        self.answer(endpoint, &ListParams::new())
    }
}

/// List fetcher returning scripted pages in order. With `gated`, every fetch
/// waits for [`PagedFetcher::release`] before answering.
pub struct PagedFetcher {
    pages: Mutex<VecDeque<Result<Value, ApiError>>>,
    requests: Mutex<Vec<ListParams>>,
    gate: Option<Notify>,
}

impl PagedFetcher {
    pub fn new<I>(pages: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<Value, ApiError>>,
    {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn gated<I>(pages: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<Value, ApiError>>,
    {
        Arc::new(Self {
            pages: Mutex::new(pages.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            gate: Some(Notify::new()),
        })
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn requests(&self) -> Vec<ListParams> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ListFetcher for PagedFetcher {
    async fn fetch(&self, params: &ListParams) -> Result<Value, ApiError> {
        self.requests.lock().unwrap().push(params.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::malformed("no page scripted")))
    }
}

pub fn page(items: Value, page: u32, page_size: u32, total: u64) -> Result<Value, ApiError> {
    Ok(json!({ "list": items, "page": page, "page_size": page_size, "total": total }))
}
