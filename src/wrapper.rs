//! The wrapper instance
//!
//! Owns configuration, the injected sinks, the client factory and the client
//! cache. The dispatcher, poller and registry front-end are implemented on it
//! in their own modules.

use crate::cache::ClientCache;
use crate::cdp::{ClientFactory, ClientSettings, Credentials, HttpClientFactory, PlatformClient};
use crate::config::WrapperConfig;
use crate::dispatch::{CallOutcome, ServiceCall};
use crate::error::{normalize, CdpError, Result};
use crate::sink::{CdpWarning, ErrorSink, RaiseErrorSink, TracingWarningSink, WarningSink};
use async_recursion::async_recursion;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Service whose client needs a workload token first
pub const WORKLOAD_SERVICE: &str = "dfworkload";

/// Workload name the token is requested for
const WORKLOAD_NAME: &str = "DF";

pub struct CdpWrapper {
    pub(crate) config: WrapperConfig,
    settings: ClientSettings,
    factory: Arc<dyn ClientFactory>,
    cache: ClientCache,
    pub(crate) warnings: Arc<dyn WarningSink>,
    pub(crate) errors: Arc<dyn ErrorSink>,
}

impl std::fmt::Debug for CdpWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpWrapper")
            .field("endpoint", &self.settings.endpoint)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CdpWrapper`]
pub struct CdpWrapperBuilder {
    config: WrapperConfig,
    factory: Option<Arc<dyn ClientFactory>>,
    warnings: Option<Arc<dyn WarningSink>>,
    errors: Option<Arc<dyn ErrorSink>>,
}

impl CdpWrapperBuilder {
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_warning_sink(mut self, sink: Arc<dyn WarningSink>) -> Self {
        self.warnings = Some(sink);
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.errors = Some(sink);
        self
    }

    pub fn build(self) -> CdpWrapper {
        let config = self.config;
        let credentials = config
            .credentials
            .clone()
            .or_else(Credentials::from_env_or_file)
            .unwrap_or_default();
        if credentials.method.is_empty() {
            tracing::debug!("No CDP credentials found, clients will be unauthenticated");
        }

        let settings = ClientSettings {
            endpoint: config.resolved_endpoint(),
            tls_verify: config.tls_verify,
            tls_warnings: config.tls_warnings,
            credentials,
            user_agent: config.user_agent(),
        };
        if config.debug {
            tracing::debug!("User agent: {}", settings.user_agent);
            tracing::debug!("Endpoint: {}", settings.endpoint);
        }

        CdpWrapper {
            config,
            settings,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(HttpClientFactory::new())),
            cache: ClientCache::new(),
            warnings: self
                .warnings
                .unwrap_or_else(|| Arc::new(TracingWarningSink)),
            errors: self.errors.unwrap_or_else(|| Arc::new(RaiseErrorSink)),
        }
    }
}

impl CdpWrapper {
    /// Wrapper with the default HTTP client factory and sinks
    pub fn new(config: WrapperConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: WrapperConfig) -> CdpWrapperBuilder {
        CdpWrapperBuilder {
            config,
            factory: None,
            warnings: None,
            errors: None,
        }
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Send a warning to the warning sink
    pub fn warn(&self, message: impl Into<String>) {
        self.warnings.warn(CdpWarning::new(message));
    }

    /// Hand an error to the error sink. `Ok(())` means the sink absorbed it.
    pub fn raise(&self, error: CdpError) -> Result<()> {
        self.errors.raise(error)
    }

    /// Cached client for a service, built on first use
    #[async_recursion]
    pub async fn client_for(
        &self,
        service: &str,
        params: &Map<String, Value>,
    ) -> Result<Arc<dyn PlatformClient>> {
        if let Some(client) = self.cache.get(service) {
            return Ok(client);
        }

        let settings = if service == WORKLOAD_SERVICE {
            self.workload_settings(params).await?
        } else {
            self.settings.clone()
        };

        let client = self
            .factory
            .create_client(service, &settings)
            .map_err(|e| normalize(e).with_call(service, "create_client"))?;
        tracing::debug!("Cached new '{}' client", service);
        Ok(self.cache.insert(service, client))
    }

    /// Exchange the shared credentials for a workload token and endpoint
    async fn workload_settings(&self, params: &Map<String, Value>) -> Result<ClientSettings> {
        let Some(env_crn) = params
            .get("environmentCrn")
            .and_then(Value::as_str)
            .filter(|crn| !crn.is_empty())
        else {
            return Err(CdpError::usage(format!(
                "environmentCrn must be supplied when connecting to {}",
                WORKLOAD_SERVICE
            )));
        };

        tracing::debug!("Requesting {} workload token for {}", WORKLOAD_NAME, env_crn);
        let outcome = self
            .call(
                ServiceCall::new("iam", "generate_workload_auth_token")
                    .param("workloadName", WORKLOAD_NAME)
                    .param("environmentCrn", env_crn),
            )
            .await?;

        // The token call already reported its own failure to the sinks
        let response = match outcome {
            CallOutcome::Value(response) => response,
            _ => {
                return Err(CdpError::usage(format!(
                    "No workload token for {}, cannot connect to {}",
                    env_crn, WORKLOAD_SERVICE
                )))
            },
        };
        let token = response.get("token").and_then(Value::as_str);
        let endpoint = response.get("endpointUrl").and_then(Value::as_str);
        let (Some(token), Some(endpoint)) = (token, endpoint) else {
            return Err(CdpError::generic(format!(
                "Workload token response for {} did not include a token and endpoint",
                env_crn
            ))
            .with_call("iam", "generate_workload_auth_token"));
        };

        Ok(ClientSettings {
            endpoint: endpoint.to_string(),
            credentials: Credentials::static_token(token),
            ..self.settings.clone()
        })
    }
}
