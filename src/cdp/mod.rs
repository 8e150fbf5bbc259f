//! CDP API interaction module
//!
//! The platform client layer the wrapper sits on: credential material, the
//! client/factory seam, and a default HTTP implementation.
//!
//! # Module Structure
//!
//! - [`auth`] - Credentials from configuration, environment or the shared credentials file
//! - [`client`] - [`PlatformClient`] / [`ClientFactory`] traits and raw failure shapes
//! - [`http`] - `reqwest` backed client and factory
//!
//! # Example
//!
//! ```ignore
//! use cdpwrap::cdp::{ClientFactory, ClientSettings, Credentials, HttpClientFactory};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let settings = ClientSettings {
//!         endpoint: "https://api.us-west-1.cdp.cloudera.com".into(),
//!         tls_verify: true,
//!         tls_warnings: false,
//!         credentials: Credentials::static_token("token"),
//!         user_agent: "example".into(),
//!     };
//!     let iam = HttpClientFactory::new().create_client("iam", &settings)?;
//!     let user = iam.invoke("get_user", &serde_json::Map::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;

pub use auth::Credentials;
pub use client::{ClientFactory, ClientSettings, PlatformClient, RawError, RedirectResponse};
pub use http::{HttpClientFactory, HttpPlatformClient, ServiceModel};
