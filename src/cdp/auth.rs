//! CDP Credentials
//!
//! Holds the credential material handed to the client factory. Credentials come
//! from the wrapper configuration, the environment, or the shared
//! `~/.cdp/credentials` file. Signing requests with them is the factory's job.

use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable overriding the credentials profile
pub const PROFILE_ENV: &str = "CDP_PROFILE";

/// Profile used when none is configured
pub const DEFAULT_PROFILE: &str = "default";

/// Credential material for one CDP identity
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub private_key: String,
    pub access_token: String,
    /// Where the credentials came from (`static`, `env`, `shared-credentials-file`)
    pub method: String,
}

// Security: never print key material
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("private_key", &redact(&self.private_key))
            .field("access_token", &redact(&self.access_token))
            .field("method", &self.method)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

impl Credentials {
    /// Static key pair credentials
    pub fn new(access_key_id: &str, private_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            private_key: private_key.to_string(),
            access_token: String::new(),
            method: "static".to_string(),
        }
    }

    /// Static credentials carrying a pre-obtained bearer token
    pub fn static_token(access_token: &str) -> Self {
        Self {
            access_key_id: String::new(),
            private_key: String::new(),
            access_token: access_token.to_string(),
            method: "static".to_string(),
        }
    }

    /// Bearer token without any `Bearer ` prefix, if one is present
    pub fn bearer_token(&self) -> Option<&str> {
        let token = self.access_token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        (!token.is_empty()).then_some(token)
    }

    /// Load credentials from the environment, falling back to the shared credentials file
    pub fn from_env_or_file() -> Option<Self> {
        if let Some(credentials) = Self::from_env() {
            return Some(credentials);
        }

        let profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
        let path = credentials_path()?;
        Self::from_file(&path, &profile)
    }

    /// Read `CDP_ACCESS_KEY_ID`, `CDP_PRIVATE_KEY` and `CDP_ACCESS_TOKEN`
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("CDP_ACCESS_KEY_ID").unwrap_or_default();
        let private_key = std::env::var("CDP_PRIVATE_KEY").unwrap_or_default();
        let access_token = std::env::var("CDP_ACCESS_TOKEN").unwrap_or_default();

        if access_token.is_empty() && (access_key_id.is_empty() || private_key.is_empty()) {
            return None;
        }

        Some(Self {
            access_key_id,
            private_key,
            access_token,
            method: "env".to_string(),
        })
    }

    /// Read one profile from a shared credentials file
    pub fn from_file(path: &Path, profile: &str) -> Option<Self> {
        // Security: Validate profile name before matching section headers
        if !validate_profile_name(profile) {
            tracing::warn!("Invalid characters in credentials profile name");
            return None;
        }

        let content = std::fs::read_to_string(path).ok()?;
        parse_profile(&content, profile)
    }
}

/// Location of the shared credentials file
pub fn credentials_path() -> Option<PathBuf> {
    // Check CDP_CREDENTIALS_FILE environment variable first
    if let Ok(path) = std::env::var("CDP_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".cdp").join("credentials"))
}

fn validate_profile_name(profile: &str) -> bool {
    !profile.is_empty()
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse an INI style credentials file and pick out one profile
fn parse_profile(content: &str, profile: &str) -> Option<Credentials> {
    let header = format!("[{}]", profile);
    let mut in_profile = false;
    let mut access_key_id = None;
    let mut private_key = None;

    for line in content.lines() {
        let line = line.trim();
        // Security: Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_profile = line == header;
            continue;
        }
        if !in_profile {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "cdp_access_key_id" => access_key_id = Some(value.trim().to_string()),
            "cdp_private_key" => private_key = Some(value.trim().to_string()),
            _ => {},
        }
    }

    Some(Credentials {
        access_key_id: access_key_id?,
        private_key: private_key?,
        access_token: String::new(),
        method: "shared-credentials-file".to_string(),
    })
}
