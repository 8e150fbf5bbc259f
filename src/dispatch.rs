//! Call Dispatcher
//!
//! `call` runs one service operation through
//! Scrub → Resolve-Client → Invoke → (Paginate)* → Extract-Field, with every
//! failure routed through the same error branch: strict mode, squelch rules,
//! errors-as-values, then the error sink.

use crate::cdp::PlatformClient;
use crate::error::{normalize, CdpError, ErrorField, ErrorKind, Result};
use crate::scrub::{scrub, scrub_headers};
use crate::util::is_empty_response;
use crate::wrapper::CdpWrapper;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Continuation token returned by paginated operations
pub const NEXT_TOKEN: &str = "nextToken";
/// Continuation token sent back on the next request
pub const STARTING_TOKEN: &str = "startingToken";
pub const PAGE_SIZE: &str = "pageSize";

/// Suppresses one remote error shape and substitutes a default
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SquelchRule {
    #[serde(default)]
    pub field: ErrorField,
    pub value: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub warning: Option<String>,
}

impl SquelchRule {
    /// Match `value` against the error code, substituting null
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            field: ErrorField::ErrorCode,
            value: value.into(),
            default: Value::Null,
            warning: None,
        }
    }

    pub fn on(mut self, field: ErrorField) -> Self {
        self.field = field;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// Substring containment on the named field
    pub fn matches(&self, error: &CdpError) -> bool {
        error.field_text(self.field).contains(&self.value)
    }
}

/// How the operation is sent
#[derive(Debug, Clone, Default)]
pub enum InvokeMode {
    #[default]
    Standard,
    /// Redirect-following disabled, then stream `body` to the returned location
    Redirect {
        headers: Map<String, Value>,
        body: PathBuf,
    },
}

/// One invocation of a service operation
#[derive(Debug, Clone)]
pub struct ServiceCall {
    pub service: String,
    pub operation: String,
    pub field: Option<String>,
    pub squelch: Vec<SquelchRule>,
    pub params: Map<String, Value>,
    pub return_error: bool,
    pub scrub: bool,
    pub mode: InvokeMode,
}

impl ServiceCall {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            field: None,
            squelch: Vec::new(),
            params: Map::new(),
            return_error: false,
            scrub: true,
            mode: InvokeMode::Standard,
        }
    }

    /// Return only this child field of the response
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn squelch(mut self, rule: SquelchRule) -> Self {
        self.squelch.push(rule);
        self
    }

    pub fn squelch_all(mut self, rules: impl IntoIterator<Item = SquelchRule>) -> Self {
        self.squelch.extend(rules);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    /// Hand unmatched errors back as [`CallOutcome::Error`] instead of raising
    pub fn return_error(mut self) -> Self {
        self.return_error = true;
        self
    }

    pub fn no_scrub(mut self) -> Self {
        self.scrub = false;
        self
    }

    pub fn redirect(mut self, headers: Map<String, Value>, body: impl Into<PathBuf>) -> Self {
        self.mode = InvokeMode::Redirect {
            headers,
            body: body.into(),
        };
        self
    }

    fn label(&self) -> String {
        format!("{}.{}", self.service, self.operation)
    }
}

/// Result of a dispatched call
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Value(Value),
    /// A squelch rule matched; carries the rule's default
    Suppressed { default: Value },
    /// Returned instead of raised because the caller asked for errors as values
    Error(CdpError),
    /// Nothing to return: empty response, or the error sink absorbed the error
    Empty,
}

impl CallOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            CallOutcome::Value(value) | CallOutcome::Suppressed { default: value } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CdpError> {
        match self {
            CallOutcome::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, CallOutcome::Suppressed { .. })
    }

    /// Collapse to a plain value; null and empty become `None`, errors `Err`
    pub fn into_value(self) -> Result<Option<Value>> {
        match self {
            CallOutcome::Value(value) | CallOutcome::Suppressed { default: value } => {
                Ok((!value.is_null()).then_some(value))
            },
            CallOutcome::Error(error) => Err(error),
            CallOutcome::Empty => Ok(None),
        }
    }
}

fn take_token(response: &mut Map<String, Value>) -> Option<Value> {
    response
        .remove(NEXT_TOKEN)
        .filter(|token| !token.is_null() && token.as_str() != Some(""))
}

/// Fold one page into the accumulated response: strings overwrite, lists extend
pub fn merge_page(merged: &mut Map<String, Value>, page: Value) {
    let Value::Object(page) = page else {
        return;
    };

    for (key, value) in page {
        match value {
            Value::String(_) => {
                merged.insert(key, value);
            },
            Value::Array(items) => match merged.get_mut(&key) {
                Some(Value::Array(existing)) => existing.extend(items),
                _ => {
                    merged.insert(key, Value::Array(items));
                },
            },
            _ => {},
        }
    }
}

impl CdpWrapper {
    /// Dispatch one service call
    pub async fn call(&self, call: ServiceCall) -> Result<CallOutcome> {
        let label = call.label();
        let ServiceCall {
            service,
            operation,
            field,
            squelch,
            params,
            return_error,
            scrub: scrub_call,
            mode,
        } = call;
        tracing::debug!("Calling {}", label);

        let payload = if scrub_call && self.config.scrub_inputs {
            scrub(params, self.warnings.as_ref())
        } else {
            params
        };

        let mut response = match self.execute(&service, &operation, &payload, mode).await {
            Ok(response) => response,
            Err(error) => return self.on_error(error, &squelch, return_error),
        };

        let Some(field) = field else {
            return Ok(CallOutcome::Value(response));
        };
        if is_empty_response(&response) {
            self.warn(format!(
                "Call Response is empty, cannot return child field {}",
                field
            ));
            return Ok(CallOutcome::Empty);
        }

        match response.as_object_mut().and_then(|r| r.remove(&field)) {
            Some(value) => Ok(CallOutcome::Value(value)),
            None => {
                let error = CdpError::generic(format!(
                    "Response from {} has no field '{}'",
                    label, field
                ))
                .with_call(&service, &operation);
                self.on_error(error, &squelch, return_error)
            },
        }
    }

    async fn execute(
        &self,
        service: &str,
        operation: &str,
        payload: &Map<String, Value>,
        mode: InvokeMode,
    ) -> Result<Value> {
        let client = self.client_for(service, payload).await?;

        match mode {
            InvokeMode::Standard => {
                let response = client
                    .invoke(operation, payload)
                    .await
                    .map_err(|e| normalize(e).with_call(service, operation))?;
                self.paginate(client.as_ref(), operation, payload, response)
                    .await
            },
            InvokeMode::Redirect { headers, body } => {
                self.redirect(client.as_ref(), operation, payload, headers, &body)
                    .await
            },
        }
    }

    async fn paginate(
        &self,
        client: &dyn PlatformClient,
        operation: &str,
        payload: &Map<String, Value>,
        response: Value,
    ) -> Result<Value> {
        let Value::Object(mut merged) = response else {
            return Ok(response);
        };

        let mut pages = 1;
        while let Some(token) = take_token(&mut merged) {
            let mut next = payload.clone();
            next.insert(STARTING_TOKEN.to_string(), token);
            next.entry(PAGE_SIZE)
                .or_insert_with(|| json!(self.config.page_size));

            pages += 1;
            tracing::debug!("Fetching page {} of {}.{}", pages, client.service(), operation);
            let page = client
                .invoke(operation, &next)
                .await
                .map_err(|e| normalize(e).with_call(client.service(), operation))?;
            merge_page(&mut merged, page);
        }

        Ok(Value::Object(merged))
    }

    async fn redirect(
        &self,
        client: &dyn PlatformClient,
        operation: &str,
        payload: &Map<String, Value>,
        headers: Map<String, Value>,
        body: &Path,
    ) -> Result<Value> {
        let service = client.service().to_string();
        let first = client
            .invoke_no_redirect(operation, payload)
            .await
            .map_err(|e| normalize(e).with_call(&service, operation))?;

        if !(300..400).contains(&first.status) {
            return Err(CdpError::generic(format!(
                "Expected a redirect from {}.{} but received status {}",
                service, operation, first.status
            ))
            .with_call(&service, operation));
        }
        let Some(location) = first.location.filter(|l| !l.is_empty()) else {
            return Err(
                CdpError::generic(format!("Redirect URL from {}.{} was empty", service, operation))
                    .with_call(&service, operation),
            );
        };

        let headers = scrub_headers(headers, self.warnings.as_ref());
        tracing::debug!("Following redirect for {}.{}", service, operation);
        client
            .upload(&location, &headers, body)
            .await
            .map_err(|e| normalize(e).with_call(&service, operation))
    }

    /// The error branch shared by every failure after input scrubbing
    fn on_error(
        &self,
        error: CdpError,
        squelch: &[SquelchRule],
        return_error: bool,
    ) -> Result<CallOutcome> {
        // Local usage errors are never squelched
        if error.kind == ErrorKind::Usage {
            return Err(error);
        }

        if self.config.strict_errors {
            self.raise(error.clone())?;
        }

        if error.is_remote() {
            if let Some(rule) = squelch.iter().find(|rule| rule.matches(&error)) {
                tracing::debug!("Squelched {} on {:?}", rule.value, rule.field);
                let message = rule
                    .warning
                    .clone()
                    .unwrap_or_else(|| error.violations_text());
                self.warn(message);
                return Ok(CallOutcome::Suppressed {
                    default: rule.default.clone(),
                });
            }
        }

        if return_error {
            return Ok(CallOutcome::Error(error));
        }

        self.raise(error)?;
        Ok(CallOutcome::Empty)
    }
}
