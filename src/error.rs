//! Error normalization
//!
//! Every failure the wrapper reports is a [`CdpError`]. Raw client failures are
//! turned into one by an ordered chain of classifiers, each recognising one
//! [`RawError`] shape. The first classifier that accepts the error wins.

use crate::cdp::RawError;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Crate result alias
pub type Result<T> = std::result::Result<T, CdpError>;

pub const LOCAL_NOT_IMPLEMENTED: &str = "LOCAL_NOT_IMPLEMENTED";
pub const REMOTE_NOT_IMPLEMENTED: &str = "REMOTE_NOT_IMPLEMENTED";
pub const PARAMETER_VALIDATION: &str = "PARAMETER_VALIDATION";

/// Generic error code the control plane uses when it has nothing better
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// Marker left in the body when the remote gateway has no such route
const REMOTE_404_MARKER: &str = "HTTP ERROR 404 Not Found";

const PARAM_VALIDATION_HEADER: &str = "Parameter validation failed:";

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The control plane rejected the request
    ClientRequest,
    /// The payload failed local parameter validation
    ParameterValidation,
    /// The local client has no such operation
    LocalNotImplemented,
    /// The remote control plane has no such operation
    RemoteNotImplemented,
    /// Bad CRN, bad name or missing required parameter, raised before any call
    Usage,
    /// A polled object reached a failure state
    FailedState,
    /// A poll did not converge in time
    Timeout,
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ClientRequest => "client request error",
            ErrorKind::ParameterValidation => "parameter validation error",
            ErrorKind::LocalNotImplemented => "operation not implemented locally",
            ErrorKind::RemoteNotImplemented => "operation not implemented remotely",
            ErrorKind::Usage => "usage error",
            ErrorKind::FailedState => "failed state",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Generic => "error",
        };
        f.write_str(name)
    }
}

/// Violation detail attached to an error
#[derive(Debug, Clone, PartialEq)]
pub enum Violations {
    /// Free form message
    Text(String),
    /// Message that parsed as JSON
    Json(Value),
    /// One entry per parameter validation failure
    Lines(Vec<String>),
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violations::Text(text) => f.write_str(text),
            Violations::Json(value) => write!(f, "{}", value),
            Violations::Lines(lines) => f.write_str(&lines.join("\n")),
        }
    }
}

/// Error fields a squelch rule can inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorField {
    #[default]
    ErrorCode,
    StatusCode,
    Service,
    Operation,
    RequestId,
    Violations,
    Message,
}

/// Normalized error record
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}{}", format_call(.service, .operation, .error_code))]
pub struct CdpError {
    pub kind: ErrorKind,
    pub error_code: Option<String>,
    pub status_code: Option<u16>,
    pub service: Option<String>,
    pub operation: Option<String>,
    pub request_id: Option<String>,
    pub violations: Option<Violations>,
    pub message: String,
    pub rc: i32,
    #[source]
    base: Option<Arc<RawError>>,
    trace: Arc<Backtrace>,
}

fn format_call(service: &Option<String>, operation: &Option<String>, code: &Option<String>) -> String {
    let mut parts = Vec::new();
    if let (Some(service), Some(operation)) = (service, operation) {
        parts.push(format!("{}.{}", service, operation));
    }
    if let Some(code) = code.as_deref().filter(|c| !c.is_empty()) {
        parts.push(code.to_string());
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl CdpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            error_code: None,
            status_code: None,
            service: None,
            operation: None,
            request_id: None,
            violations: None,
            message: message.into(),
            rc: 1,
            base: None,
            trace: Arc::new(Backtrace::force_capture()),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }

    pub fn failed_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedState, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Fill in service and operation where the classifier could not
    pub fn with_call(mut self, service: &str, operation: &str) -> Self {
        self.service.get_or_insert_with(|| service.to_string());
        self.operation.get_or_insert_with(|| operation.to_string());
        self
    }

    /// The raw failure this error was built from
    pub fn base(&self) -> Option<&RawError> {
        self.base.as_deref()
    }

    /// Call stack captured when the error was built
    pub fn backtrace(&self) -> &Backtrace {
        &self.trace
    }

    /// Whether the control plane itself produced this error
    pub fn is_remote(&self) -> bool {
        matches!(self.base(), Some(RawError::Client { .. }))
    }

    /// Violations as text, falling back to the message
    pub fn violations_text(&self) -> String {
        match &self.violations {
            Some(violations) => violations.to_string(),
            None => self.message.clone(),
        }
    }

    /// Text form of one field, as squelch rules see it
    pub fn field_text(&self, field: ErrorField) -> String {
        match field {
            ErrorField::ErrorCode => self.error_code.clone().unwrap_or_default(),
            ErrorField::StatusCode => self
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_default(),
            ErrorField::Service => self.service.clone().unwrap_or_default(),
            ErrorField::Operation => self.operation.clone().unwrap_or_default(),
            ErrorField::RequestId => self.request_id.clone().unwrap_or_default(),
            ErrorField::Violations => self
                .violations
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default(),
            ErrorField::Message => self.message.clone(),
        }
    }
}

/// One entry in the classifier chain
struct Classifier {
    shape: &'static str,
    classify: fn(&RawError) -> Option<CdpError>,
}

const CLASSIFIERS: &[Classifier] = &[
    Classifier {
        shape: "client-error",
        classify: classify_client_error,
    },
    Classifier {
        shape: "parameter-validation",
        classify: classify_param_validation,
    },
    Classifier {
        shape: "unknown-operation",
        classify: classify_unknown_operation,
    },
];

/// Build a [`CdpError`] from any raw failure. Never fails.
pub fn normalize(raw: RawError) -> CdpError {
    let classified = CLASSIFIERS.iter().find_map(|c| {
        let error = (c.classify)(&raw)?;
        tracing::debug!("Classified error as {}", c.shape);
        Some(error)
    });

    let mut error = classified.unwrap_or_else(|| CdpError::generic(raw.to_string()));
    error.base = Some(Arc::new(raw));
    rewrite_remote_not_implemented(error)
}

fn client_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"Status Code: (.*?); Error Code: (.*?); Service: (.*?); Operation: (.*?); Request ID: (.*?);",
        )
        .expect("client error pattern is valid")
    })
}

fn classify_client_error(raw: &RawError) -> Option<CdpError> {
    let RawError::Client { message, response } = raw else {
        return None;
    };

    let service_error = response.as_ref().and_then(|r| r.get("error"));
    let violations = match service_error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        Some(text) => match serde_json::from_str::<Value>(&html_unescape(text)) {
            Ok(parsed) => Violations::Json(parsed),
            Err(_) => Violations::Text(text.to_string()),
        },
        None => Violations::Text(message.clone()),
    };
    let body_code = service_error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(caps) = client_error_pattern().captures(message) else {
        // Every client error carries call metadata; a miss is a defect upstream
        tracing::error!("Client error without call metadata: {}", message);
        let mut error = CdpError::generic(format!(
            "Client error did not carry call metadata: {}",
            message
        ));
        error.error_code = body_code;
        error.violations = Some(violations);
        return Some(error);
    };

    let group = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());
    let mut error = CdpError::new(ErrorKind::ClientRequest, violations.to_string());
    error.status_code = group(1).and_then(|s| s.parse().ok());
    error.error_code = body_code.or_else(|| group(2));
    error.service = group(3);
    error.operation = group(4);
    error.request_id = group(5);
    error.violations = Some(violations);
    Some(error)
}

fn classify_param_validation(raw: &RawError) -> Option<CdpError> {
    let RawError::ParamValidation { report } = raw else {
        return None;
    };

    let lines: Vec<String> = report
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != PARAM_VALIDATION_HEADER)
        .map(str::to_string)
        .collect();

    let mut error = CdpError::new(ErrorKind::ParameterValidation, report.clone());
    error.error_code = Some(PARAMETER_VALIDATION.to_string());
    error.violations = Some(Violations::Lines(lines));
    Some(error)
}

fn classify_unknown_operation(raw: &RawError) -> Option<CdpError> {
    let RawError::UnknownOperation { service, operation } = raw else {
        return None;
    };

    let mut error = CdpError::new(
        ErrorKind::LocalNotImplemented,
        format!(
            "Operation '{}' is not available in the local '{}' client, a newer client may be required",
            operation, service
        ),
    );
    error.error_code = Some(LOCAL_NOT_IMPLEMENTED.to_string());
    error.status_code = Some(404);
    error.service = Some(service.clone());
    error.operation = Some(operation.clone());
    Some(error)
}

/// A 404 whose body is the gateway's own page means the route does not exist
fn rewrite_remote_not_implemented(mut error: CdpError) -> CdpError {
    let unknown = error.error_code.as_deref() == Some(UNKNOWN_ERROR_CODE);
    let marked =
        error.message.contains(REMOTE_404_MARKER) || error.violations_text().contains(REMOTE_404_MARKER);

    if error.status_code == Some(404) && unknown && marked {
        error.kind = ErrorKind::RemoteNotImplemented;
        error.error_code = Some(REMOTE_NOT_IMPLEMENTED.to_string());
        error.message = format!(
            "The remote control plane does not implement {}.{}; it may not be available for this deployment or region",
            error.service.as_deref().unwrap_or("<service>"),
            error.operation.as_deref().unwrap_or("<operation>")
        );
    }
    error
}

/// Decode HTML character references: named ones the gateway emits plus any
/// decimal (`&#123;`) or hex (`&#x7b;`) form
fn html_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail[1..].find(';').map(|end| (&tail[1..=end], end + 2)) {
            Some((entity, consumed)) if entity.len() <= 10 => match decode_entity(entity) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[consumed..];
                },
                None => {
                    out.push('&');
                    rest = &tail[1..];
                },
            },
            _ => {
                out.push('&');
                rest = &tail[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match entity {
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "nbsp" => Some('\u{a0}'),
        "lbrace" => Some('{'),
        "rbrace" => Some('}'),
        "lsqb" | "lbrack" => Some('['),
        "rsqb" | "rbrack" => Some(']'),
        "colon" => Some(':'),
        "comma" => Some(','),
        _ => None,
    }
}
