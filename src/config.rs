//! Configuration Management
//!
//! [`WrapperConfig`] is the constructor-level surface of the wrapper.
//! [`Config`] is the small profile the CLI persists between runs.

use crate::cdp::Credentials;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-west-1";

/// Page size sent with continuation requests
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const USER_AGENT_PRODUCT: &str = "CDPWRAP";

/// Wrapper settings
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    pub debug: bool,
    pub tls_verify: bool,
    /// Surface every remote error through the error sink, squelch rules or not
    pub strict_errors: bool,
    /// Warn when a client is built with TLS verification disabled
    pub tls_warnings: bool,
    pub endpoint: Option<String>,
    pub credentials: Option<Credentials>,
    pub scrub_inputs: bool,
    pub region: String,
    pub user_agent_suffix: Option<String>,
    pub page_size: u32,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            debug: false,
            tls_verify: true,
            strict_errors: false,
            tls_warnings: false,
            endpoint: None,
            credentials: None,
            scrub_inputs: true,
            region: DEFAULT_REGION.to_string(),
            user_agent_suffix: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl WrapperConfig {
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    pub fn with_strict_errors(mut self, strict: bool) -> Self {
        self.strict_errors = strict;
        self
    }

    pub fn with_tls_warnings(mut self, warnings: bool) -> Self {
        self.tls_warnings = warnings;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_scrub_inputs(mut self, scrub: bool) -> Self {
        self.scrub_inputs = scrub;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_user_agent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Explicit endpoint, else the regional control plane
    pub fn resolved_endpoint(&self) -> String {
        match self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://api.{}.cdp.cloudera.com", self.region),
        }
    }

    /// User agent sent with every request
    pub fn user_agent(&self) -> String {
        let base = format!(
            "{}/{} Rust {}/{}",
            USER_AGENT_PRODUCT,
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        match self.user_agent_suffix.as_deref().filter(|s| !s.is_empty()) {
            Some(suffix) => format!("{} {}", base, suffix),
            None => base,
        }
    }
}

/// CLI profile persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Last used endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    /// Last TLS verification choice
    #[serde(default)]
    pub tls_verify: Option<bool>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cdpwrap").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;

        Ok(())
    }

    /// Get effective region (CLI > config > default)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Get effective endpoint (CLI > config)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string).or_else(|| self.endpoint.clone())
    }

    /// Get effective TLS verification (CLI opt-out > config > on)
    pub fn effective_tls_verify(&self, no_verify: bool) -> bool {
        !no_verify && self.tls_verify.unwrap_or(true)
    }

    /// Build wrapper settings from this profile
    pub fn to_wrapper_config(&self) -> WrapperConfig {
        let mut config = WrapperConfig::default()
            .with_region(self.effective_region(None))
            .with_tls_verify(self.effective_tls_verify(false));
        config.endpoint = self.effective_endpoint(None);
        config
    }
}
