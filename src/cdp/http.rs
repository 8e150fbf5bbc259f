//! HTTP platform client for CDP REST API calls
//!
//! Every operation is a `POST <endpoint>/api/v1/<service>/<camelCaseOperation>`
//! with a JSON body. Error responses are rendered in the same textual shape the
//! CDP CLI uses, so the error normalizer can pick them apart.

use super::client::{ClientFactory, ClientSettings, PlatformClient, RawError, RedirectResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{redirect, Client, RequestBuilder, Response};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Response headers that may carry the request id
const REQUEST_ID_HEADERS: &[&str] = &["x-altus-request-id", "x-cdp-request-id"];

/// Error code used when the service payload carries none
const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let char_count = body.chars().count();
    let truncated = if char_count > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// `describe_database` -> `describeDatabase`
pub fn operation_path(operation: &str) -> String {
    let mut out = String::with_capacity(operation.len());
    let mut upper_next = false;
    for c in operation.chars() {
        if c == '_' || c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Operations a local client knows about, with their required parameters.
///
/// A partial model (the default) only checks the operations it lists and lets
/// any other operation through to the control plane. An exhaustive model
/// rejects unlisted operations locally.
#[derive(Debug, Clone, Default)]
pub struct ServiceModel {
    operations: HashMap<String, Vec<String>>,
    exhaustive: bool,
}

impl ServiceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat operations missing from the model as not implemented
    pub fn exhaustive(mut self) -> Self {
        self.exhaustive = true;
        self
    }

    pub fn with_operation(mut self, operation: &str, required: &[String]) -> Self {
        self.operations
            .insert(operation.to_string(), required.to_vec());
        self
    }

    /// Required parameters, or `None` if the operation is unknown
    pub fn required(&self, operation: &str) -> Option<&[String]> {
        self.operations.get(operation).map(Vec::as_slice)
    }

    /// Check a payload the way a generated client would before sending it
    pub fn validate(
        &self,
        service: &str,
        operation: &str,
        payload: &Map<String, Value>,
    ) -> Result<(), RawError> {
        let Some(required) = self.required(operation) else {
            if self.exhaustive {
                return Err(RawError::UnknownOperation {
                    service: service.to_string(),
                    operation: operation.to_string(),
                });
            }
            return Ok(());
        };

        let missing: Vec<String> = required
            .iter()
            .filter(|name| payload.get(name.as_str()).map_or(true, Value::is_null))
            .map(|name| format!("Missing required parameter in input: \"{}\"", name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RawError::ParamValidation {
                report: format!("Parameter validation failed:\n{}", missing.join("\n")),
            })
        }
    }
}

/// HTTP client for one CDP service
pub struct HttpPlatformClient {
    service: String,
    endpoint: Url,
    client: Client,
    no_redirect: Client,
    bearer: Option<String>,
    model: Option<ServiceModel>,
}

impl HttpPlatformClient {
    /// Create a new HTTP client
    pub fn new(
        service: &str,
        settings: &ClientSettings,
        model: Option<ServiceModel>,
    ) -> Result<Self, RawError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| RawError::Other(format!("Invalid endpoint {}: {}", settings.endpoint, e)))?;

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .danger_accept_invalid_certs(!settings.tls_verify)
            .build()?;

        let no_redirect = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .danger_accept_invalid_certs(!settings.tls_verify)
            .redirect(redirect::Policy::none())
            .build()?;

        let bearer = settings.credentials.bearer_token().map(str::to_string);
        if bearer.is_none() {
            tracing::debug!("No access token for {}, requests are sent unsigned", service);
        }

        Ok(Self {
            service: service.to_string(),
            endpoint,
            client,
            no_redirect,
            bearer,
            model,
        })
    }

    fn operation_url(&self, operation: &str) -> String {
        format!(
            "{}/api/v1/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.service,
            operation_path(operation)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_model(&self, operation: &str, payload: &Map<String, Value>) -> Result<(), RawError> {
        match &self.model {
            Some(model) => model.validate(&self.service, operation, payload),
            None => Ok(()),
        }
    }

    async fn send(
        &self,
        client: &Client,
        operation: &str,
        payload: &Map<String, Value>,
    ) -> Result<(Response, String), RawError> {
        let url = self.operation_url(operation);
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("POST {} [{}]", url, request_id);

        let request = client
            .post(&url)
            .header(REQUEST_ID_HEADERS[0], request_id.as_str())
            .json(payload);
        let response = self.authorize(request).send().await?;

        Ok((response, request_id))
    }

    /// Turn an error response into the CLI-shaped client error
    fn client_error(&self, operation: &str, status: u16, request_id: &str, body: &str) -> RawError {
        // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!("API error: {} - {}", status, sanitize_for_log(body));

        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ERROR_CODE)
            .to_string();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        RawError::Client {
            message: format!(
                "An error occurred: {} (Status Code: {}; Error Code: {}; Service: {}; Operation: {}; Request ID: {};)",
                message,
                status,
                code,
                self.service,
                operation_path(operation),
                request_id
            ),
            response: Some(json!({ "error": { "code": code, "message": message } })),
        }
    }
}

fn response_request_id(headers: &HeaderMap, sent: &str) -> String {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .unwrap_or(sent)
        .to_string()
}

fn parse_body(body: &str) -> Result<Value, RawError> {
    // Handle empty response
    if body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(body)
        .map_err(|e| RawError::Other(format!("Failed to parse response JSON: {}", e)))
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    fn service(&self) -> &str {
        &self.service
    }

    async fn invoke(&self, operation: &str, payload: &Map<String, Value>) -> Result<Value, RawError> {
        self.check_model(operation, payload)?;

        let (response, sent_id) = self.send(&self.client, operation, payload).await?;
        let status = response.status();
        let request_id = response_request_id(response.headers(), &sent_id);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(self.client_error(operation, status.as_u16(), &request_id, &body));
        }

        parse_body(&body)
    }

    async fn invoke_no_redirect(
        &self,
        operation: &str,
        payload: &Map<String, Value>,
    ) -> Result<RedirectResponse, RawError> {
        self.check_model(operation, payload)?;

        let (response, sent_id) = self.send(&self.no_redirect, operation, payload).await?;
        let status = response.status();
        let request_id = response_request_id(response.headers(), &sent_id);
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await?;
            return Err(self.client_error(operation, status.as_u16(), &request_id, &body));
        }

        Ok(RedirectResponse {
            status: status.as_u16(),
            location,
        })
    }

    async fn upload(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Path,
    ) -> Result<Value, RawError> {
        tracing::debug!("POST {} (upload from {})", url, body.display());

        let file = tokio::fs::File::open(body).await?;
        let mut request = self.client.post(url).body(reqwest::Body::from(file));
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = self.authorize(request).send().await?;
        let status = response.status();
        let request_id = response_request_id(response.headers(), "");
        let response_body = response.text().await?;

        if !status.is_success() {
            return Err(self.client_error("upload", status.as_u16(), &request_id, &response_body));
        }

        parse_body(&response_body)
    }
}

/// Default client factory backed by [`HttpPlatformClient`]
pub struct HttpClientFactory {
    use_registry_model: bool,
}

impl HttpClientFactory {
    /// Factory whose clients check required parameters of registered
    /// operations and send everything else unchecked
    pub fn new() -> Self {
        Self {
            use_registry_model: true,
        }
    }

    /// Factory whose clients send any operation unchecked
    pub fn without_model() -> Self {
        Self {
            use_registry_model: false,
        }
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for HttpClientFactory {
    fn create_client(
        &self,
        service: &str,
        settings: &ClientSettings,
    ) -> Result<Arc<dyn PlatformClient>, RawError> {
        if !settings.tls_verify && settings.tls_warnings {
            tracing::warn!("TLS verification is disabled for the '{}' client", service);
        }

        let model = if self.use_registry_model {
            crate::registry::service_model(service)
        } else {
            None
        };

        tracing::debug!("Building '{}' client for {}", service, settings.endpoint);
        let client = HttpPlatformClient::new(service, settings, model)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_path_camel_cases() {
        assert_eq!(operation_path("describe_database"), "describeDatabase");
        assert_eq!(operation_path("get_user"), "getUser");
        assert_eq!(operation_path("listClusters"), "listClusters");
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
        assert!(sanitized.len() < 300);
    }

    #[test]
    fn test_sanitize_handles_multibyte() {
        let body = "é".repeat(300);
        assert!(sanitize_for_log(&body).contains("truncated"));
    }

    #[test]
    fn test_exhaustive_model_rejects_unknown_operation() {
        let model = ServiceModel::new().with_operation("get_user", &[]).exhaustive();
        let err = model
            .validate("iam", "get_users", &Map::new())
            .unwrap_err();
        assert!(matches!(err, RawError::UnknownOperation { .. }));
    }

    #[test]
    fn test_partial_model_passes_unknown_operation() {
        let required = vec!["userId".to_string()];
        let model = ServiceModel::new().with_operation("get_user", &required);

        assert!(model.validate("iam", "get_users", &Map::new()).is_ok());
        assert!(matches!(
            model.validate("iam", "get_user", &Map::new()),
            Err(RawError::ParamValidation { .. })
        ));
    }

    #[test]
    fn test_model_reports_missing_required() {
        let model = ServiceModel::new()
            .with_operation("describe_database", &["databaseName".into(), "environmentName".into()]);
        let mut payload = Map::new();
        payload.insert("databaseName".into(), json!("db1"));

        let err = model
            .validate("opdb", "describe_database", &payload)
            .unwrap_err();
        let RawError::ParamValidation { report } = err else {
            panic!("expected parameter validation failure");
        };
        assert_eq!(
            report,
            "Parameter validation failed:\nMissing required parameter in input: \"environmentName\""
        );
    }
}
