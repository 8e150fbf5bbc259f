//! Shared fixtures: an in-memory platform client driven by scripted replies

#![allow(dead_code)]

use async_trait::async_trait;
use cdpwrap::cdp::{ClientFactory, ClientSettings, Credentials, PlatformClient, RawError, RedirectResponse};
use cdpwrap::sink::CollectingSink;
use cdpwrap::{CdpWrapper, WrapperConfig};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Client error shaped like the ones the control plane produces
pub fn client_error(service: &str, operation: &str, code: &str, status: u16, message: &str) -> RawError {
    RawError::Client {
        message: format!(
            "An error occurred: {} (Status Code: {}; Error Code: {}; Service: {}; Operation: {}; Request ID: req-{};)",
            message, status, code, service, operation, status
        ),
        response: Some(json!({ "error": { "code": code, "message": message } })),
    }
}

pub fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// One recorded upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: PathBuf,
}

/// Replays queued replies per operation. The last successful reply repeats.
pub struct ScriptedClient {
    service: String,
    replies: Mutex<HashMap<String, VecDeque<Result<Value, RawError>>>>,
    redirects: Mutex<VecDeque<Result<RedirectResponse, RawError>>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    uploads: Mutex<Vec<Upload>>,
}

impl ScriptedClient {
    pub fn new(service: &str) -> Arc<Self> {
        Arc::new(Self {
            service: service.to_string(),
            replies: Mutex::new(HashMap::new()),
            redirects: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn reply(&self, operation: &str, reply: Result<Value, RawError>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn ok(&self, operation: &str, value: Value) -> &Self {
        self.reply(operation, Ok(value))
    }

    pub fn fail(&self, operation: &str, code: &str, status: u16, message: &str) -> &Self {
        let error = client_error(&self.service, operation, code, status, message);
        self.reply(operation, Err(error))
    }

    pub fn redirect(&self, reply: Result<RedirectResponse, RawError>) -> &Self {
        self.redirects.lock().unwrap().push_back(reply);
        self
    }

    /// Recorded `(operation, payload)` pairs
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Map<String, Value>> {
        self.calls()
            .into_iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    fn next(&self, operation: &str) -> Result<Value, RawError> {
        let mut replies = self.replies.lock().unwrap();
        let Some(queue) = replies.get_mut(operation) else {
            return Err(RawError::UnknownOperation {
                service: self.service.clone(),
                operation: operation.to_string(),
            });
        };
        if queue.len() == 1 {
            if let Some(Ok(value)) = queue.front() {
                return Ok(value.clone());
            }
        }
        queue
            .pop_front()
            .unwrap_or_else(|| Err(RawError::Other(format!("no scripted reply left for {}", operation))))
    }
}

#[async_trait]
impl PlatformClient for ScriptedClient {
    fn service(&self) -> &str {
        &self.service
    }

    async fn invoke(&self, operation: &str, payload: &Map<String, Value>) -> Result<Value, RawError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), payload.clone()));
        self.next(operation)
    }

    async fn invoke_no_redirect(
        &self,
        operation: &str,
        payload: &Map<String, Value>,
    ) -> Result<RedirectResponse, RawError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), payload.clone()));
        self.redirects
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RawError::Other("no scripted redirect".into())))
    }

    async fn upload(&self, url: &str, headers: &[(String, String)], body: &Path) -> Result<Value, RawError> {
        self.uploads.lock().unwrap().push(Upload {
            url: url.to_string(),
            headers: headers.to_vec(),
            body: body.to_path_buf(),
        });
        Ok(json!({ "uploaded": true }))
    }
}

/// Hands out pre-registered scripted clients and records every build
#[derive(Default)]
pub struct ScriptedFactory {
    clients: Mutex<HashMap<String, Arc<ScriptedClient>>>,
    builds: Mutex<Vec<(String, ClientSettings)>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client(&self, service: &str) -> Arc<ScriptedClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_insert_with(|| ScriptedClient::new(service))
            .clone()
    }

    pub fn builds(&self) -> Vec<(String, ClientSettings)> {
        self.builds.lock().unwrap().clone()
    }

    pub fn builds_of(&self, service: &str) -> usize {
        self.builds().iter().filter(|(s, _)| s == service).count()
    }
}

impl ClientFactory for ScriptedFactory {
    fn create_client(
        &self,
        service: &str,
        settings: &ClientSettings,
    ) -> Result<Arc<dyn PlatformClient>, RawError> {
        self.builds
            .lock()
            .unwrap()
            .push((service.to_string(), settings.clone()));
        let client: Arc<dyn PlatformClient> = self
            .clients
            .lock()
            .unwrap()
            .get(service)
            .cloned()
            .map(|c| c as Arc<dyn PlatformClient>)
            .ok_or_else(|| RawError::Other(format!("no client registered for {}", service)))?;
        Ok(client)
    }
}

pub fn test_config() -> WrapperConfig {
    WrapperConfig::default()
        .with_endpoint("https://api.test.cdp.example")
        .with_credentials(Credentials::new("test-key-id", "test-private-key"))
}

/// Warnings collected, errors raised
pub fn wrapper(factory: &Arc<ScriptedFactory>, sink: &Arc<CollectingSink>) -> CdpWrapper {
    wrapper_with(factory, sink, test_config())
}

pub fn wrapper_with(factory: &Arc<ScriptedFactory>, sink: &Arc<CollectingSink>, config: WrapperConfig) -> CdpWrapper {
    CdpWrapper::builder(config)
        .with_client_factory(factory.clone())
        .with_warning_sink(sink.clone())
        .build()
}

/// Warnings and errors both collected
pub fn collecting_wrapper(factory: &Arc<ScriptedFactory>, sink: &Arc<CollectingSink>, config: WrapperConfig) -> CdpWrapper {
    CdpWrapper::builder(config)
        .with_client_factory(factory.clone())
        .with_warning_sink(sink.clone())
        .with_error_sink(sink.clone())
        .build()
}
