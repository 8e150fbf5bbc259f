//! Platform client seam
//!
//! The wrapper never touches the network itself. It asks a [`ClientFactory`]
//! for one [`PlatformClient`] per service and invokes operations on it by name.

use super::auth::Credentials;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Failure shapes a platform client can produce
#[derive(Debug, Error)]
pub enum RawError {
    /// The control plane answered with an error response
    #[error("{message}")]
    Client {
        /// Text form, carrying the `(Status Code: ..; Error Code: ..; ..)` trailer
        message: String,
        /// Structured service payload, `{"error": {"code": .., "message": ..}}`
        response: Option<Value>,
    },

    /// The payload was rejected locally before anything was sent
    #[error("{report}")]
    ParamValidation { report: String },

    /// The client has no such operation
    #[error("'{service}' client has no operation '{operation}'")]
    UnknownOperation { service: String, operation: String },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// First leg of a redirect-mode call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectResponse {
    pub status: u16,
    pub location: Option<String>,
}

/// Operation-invocation surface for one service
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Service this client talks to
    fn service(&self) -> &str;

    /// Invoke a named operation with a keyword payload
    async fn invoke(&self, operation: &str, payload: &Map<String, Value>) -> Result<Value, RawError>;

    /// Invoke an operation with redirect following disabled
    async fn invoke_no_redirect(
        &self,
        operation: &str,
        _payload: &Map<String, Value>,
    ) -> Result<RedirectResponse, RawError> {
        Err(RawError::Other(format!(
            "'{}' client cannot issue redirect calls for '{}'",
            self.service(),
            operation
        )))
    }

    /// Stream a file body to a redirect location
    async fn upload(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _body: &Path,
    ) -> Result<Value, RawError> {
        Err(RawError::Other(format!(
            "'{}' client cannot upload to {}",
            self.service(),
            url
        )))
    }
}

/// Everything needed to construct an authenticated client
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub tls_verify: bool,
    pub tls_warnings: bool,
    pub credentials: Credentials,
    pub user_agent: String,
}

/// Builds clients for named services
pub trait ClientFactory: Send + Sync {
    fn create_client(
        &self,
        service: &str,
        settings: &ClientSettings,
    ) -> Result<Arc<dyn PlatformClient>, RawError>;
}
