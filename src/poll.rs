//! Convergence Poller
//!
//! Repeatedly describes an object until its status reaches one of the accepted
//! states, lands in a known failure state, or the timeout runs out.

use crate::dispatch::ServiceCall;
use crate::error::{CdpError, Result};
use crate::states::{StateSet, FAILED_STATES};
use crate::util::{get_path, parse_path};
use crate::wrapper::CdpWrapper;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Probed in order when no status path is given
const DEFAULT_STATUS_CANDIDATES: &[&[&str]] = &[
    &["status"],          // datalake, dw, opdb, datahub
    &["instanceStatus"],  // ml
    &["status", "state"], // df
];

/// Fields that may explain a failure state, in order of preference
const FAILURE_REASON_FIELDS: &[&str] = &["statusReason", "failureMessage"];

pub const DEFAULT_DELAY: Duration = Duration::from_secs(15);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Where the status lives in a describe response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusField {
    /// Probe the known status locations
    Heuristic,
    /// Nested key path
    Path(Vec<String>),
}

impl StatusField {
    /// Dot-notation path, `status.state`
    pub fn path(path: &str) -> Self {
        StatusField::Path(parse_path(path))
    }

    fn describe(&self) -> String {
        match self {
            StatusField::Heuristic => "<default>".to_string(),
            StatusField::Path(path) => path.join("."),
        }
    }
}

/// Poll settings
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub field: StatusField,
    /// Accepted states; `None` means the object no longer exists
    pub states: Vec<Option<String>>,
    pub delay: Duration,
    pub timeout: Duration,
    pub ignore_failures: bool,
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self {
            field: StatusField::Path(vec!["status".to_string()]),
            states: Vec::new(),
            delay: DEFAULT_DELAY,
            timeout: DEFAULT_TIMEOUT,
            ignore_failures: false,
        }
    }
}

impl WaitSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn until(mut self, state: impl Into<String>) -> Self {
        self.states.push(Some(state.into()));
        self
    }

    pub fn until_set(mut self, states: StateSet) -> Self {
        self.states
            .extend(states.states().iter().map(|s| Some(s.to_string())));
        self
    }

    /// Accept the object disappearing
    pub fn until_gone(mut self) -> Self {
        self.states.push(None);
        self
    }

    pub fn field(mut self, field: StatusField) -> Self {
        self.field = field;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ignore_failures(mut self) -> Self {
        self.ignore_failures = true;
        self
    }

    fn accepts_gone(&self) -> bool {
        self.states.iter().any(Option::is_none)
    }

    fn accepts(&self, status: &str) -> bool {
        self.states.iter().flatten().any(|s| s == status)
    }

    fn describe_states(&self) -> String {
        let states: Vec<&str> = self
            .states
            .iter()
            .map(|s| s.as_deref().unwrap_or("None"))
            .collect();
        format!("[{}]", states.join(", "))
    }
}

fn render_params(params: &Map<String, Value>) -> String {
    Value::Object(params.clone()).to_string()
}

/// Last non-null reason field wins, so `failureMessage` beats `statusReason`
fn failure_reason(response: &Value) -> String {
    FAILURE_REASON_FIELDS
        .iter()
        .rev()
        .find_map(|field| response.get(*field).filter(|v| !v.is_null()))
        .map(|reason| match reason {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "None provided".to_string())
}

/// Resolve the current status. `Err` when no default candidate root is present.
fn resolve_status(response: &Value, field: &StatusField) -> std::result::Result<Option<String>, String> {
    let as_status = |v: &Value| v.as_str().map(str::to_string);

    match field {
        StatusField::Path(path) => Ok(get_path(response, path.as_slice()).and_then(as_status)),
        StatusField::Heuristic => {
            let present = DEFAULT_STATUS_CANDIDATES
                .iter()
                .any(|candidate| response.get(candidate[0]).is_some());
            if !present {
                return Err(format!(
                    "Could not determine default status field in response {}",
                    response
                ));
            }

            // Only string values count, so a nested `status` object falls
            // through to `status.state`
            Ok(DEFAULT_STATUS_CANDIDATES
                .iter()
                .find_map(|candidate| get_path(response, *candidate).and_then(as_status)))
        },
    }
}

impl CdpWrapper {
    /// Poll `describe` until the status is accepted, fails, or time runs out.
    ///
    /// Returns the last describe response on success, `None` when the object
    /// is gone and that was accepted, or when the error sink absorbed a
    /// timeout.
    pub async fn wait_for_state<F, Fut>(
        &self,
        label: &str,
        mut describe: F,
        params: &Map<String, Value>,
        spec: &WaitSpec,
    ) -> Result<Option<Value>>
    where
        F: FnMut(Map<String, Value>) -> Fut,
        Fut: Future<Output = Result<Option<Value>>>,
    {
        tracing::info!(
            "Waiting for {} on params [{}] to have field {} with state {}",
            label,
            render_params(params),
            spec.field.describe(),
            spec.describe_states()
        );

        let started = Instant::now();
        while started.elapsed() < spec.timeout {
            match describe(params.clone()).await? {
                None if spec.accepts_gone() => return Ok(None),
                None => tracing::info!("Waiting for {} to return an object", label),
                Some(current) => {
                    let status = match resolve_status(&current, &spec.field) {
                        Ok(status) => status,
                        Err(message) => {
                            self.raise(CdpError::generic(message))?;
                            None
                        },
                    };

                    match status {
                        None => tracing::info!(
                            "Waiting to find field {} in {} response",
                            spec.field.describe(),
                            label
                        ),
                        Some(status) if spec.accepts(&status) => {
                            tracing::info!("{} reached {}", label, status);
                            return Ok(Some(current));
                        },
                        Some(status) if FAILED_STATES.contains(&status) => {
                            if spec.ignore_failures {
                                // Keeps polling rather than returning
                                self.warn(format!(
                                    "Ignored Failure status '{}' while waiting",
                                    status
                                ));
                            } else {
                                self.raise(CdpError::failed_state(format!(
                                    "Function {} with params [{}] encountered failed state {} with reason {}",
                                    label,
                                    render_params(params),
                                    status,
                                    failure_reason(&current)
                                )))?;
                            }
                        },
                        Some(status) => tracing::info!(
                            "Waiting for change in {}: [{}], current is {}: {}",
                            label,
                            render_params(params),
                            spec.field.describe(),
                            status
                        ),
                    }
                },
            }

            tokio::time::sleep(spec.delay).await;
        }

        self.raise(CdpError::timeout(format!(
            "Timeout waiting for function {} with params [{}] to return field {} with state {}",
            label,
            render_params(params),
            spec.field.describe(),
            spec.describe_states()
        )))?;
        Ok(None)
    }

    /// Poll a describe-style service call
    pub async fn wait_for_call(&self, describe: ServiceCall, spec: &WaitSpec) -> Result<Option<Value>> {
        let label = format!("{}.{}", describe.service, describe.operation);
        let params = describe.params.clone();

        self.wait_for_state(
            &label,
            |params| {
                let mut call = describe.clone();
                call.params = params;
                async move { self.call(call).await?.into_value() }
            },
            &params,
            spec,
        )
        .await
    }
}
