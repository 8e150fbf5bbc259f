//! cdpwrap - a convenience layer over the CDP control-plane API
//!
//! One generic dispatcher runs every service operation: it scrubs inputs,
//! resolves a cached per-service client, paginates, extracts the requested
//! field and routes failures through declarative squelch rules. A convergence
//! poller waits on long-running state transitions.
//!
//! # Module Structure
//!
//! - [`cdp`] - Platform client seam, credentials and the default HTTP client
//! - [`dispatch`] - [`ServiceCall`], squelch rules and [`CallOutcome`]
//! - [`poll`] - `wait_for_state` and its [`WaitSpec`]
//! - [`registry`] - Declarative per-service operation tables
//! - [`error`] - Normalized [`CdpError`] and the classifier chain
//! - [`sink`] - Pluggable warning and error channels
//!
//! # Example
//!
//! ```ignore
//! use cdpwrap::{CdpWrapper, ServiceCall, SquelchRule, WaitSpec, WrapperConfig};
//! use cdpwrap::states::STARTED_STATES;
//!
//! async fn create(wrapper: &CdpWrapper) -> cdpwrap::Result<()> {
//!     wrapper
//!         .call(
//!             ServiceCall::new("opdb", "create_database")
//!                 .field("databaseDetails")
//!                 .param("databaseName", "db1")
//!                 .param("environmentName", "envA"),
//!         )
//!         .await?;
//!
//!     let describe = ServiceCall::new("opdb", "describe_database")
//!         .field("databaseDetails")
//!         .squelch(SquelchRule::new("NOT_FOUND"))
//!         .param("databaseName", "db1")
//!         .param("environmentName", "envA");
//!     wrapper
//!         .wait_for_call(describe, &WaitSpec::new().until_set(STARTED_STATES))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cdp;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod poll;
pub mod registry;
pub mod scrub;
pub mod sink;
pub mod states;
pub mod util;
pub mod validate;
pub mod wrapper;

pub use config::WrapperConfig;
pub use dispatch::{CallOutcome, InvokeMode, ServiceCall, SquelchRule};
pub use error::{CdpError, ErrorField, ErrorKind, Result, Violations};
pub use poll::{StatusField, WaitSpec};
pub use sink::{CdpWarning, CollectingSink, ErrorSink, WarningSink};
pub use wrapper::{CdpWrapper, CdpWrapperBuilder};
