//! Operation registry
//!
//! Per-service operations are data rather than code. Each entry names the
//! result field to return, the squelch rules to apply, required parameters and
//! CRN checks. One generic front-end ([`CdpWrapper::invoke`]) turns an entry
//! into a dispatched call.
//!
//! # Operation Definitions
//!
//! Operations are defined in JSON files under `src/operations/`, one per
//! service, embedded at compile time.
//!
//! # Example
//!
//! ```ignore
//! use cdpwrap::{CdpWrapper, WrapperConfig};
//! use serde_json::{json, Map};
//!
//! async fn list_vws(wrapper: &CdpWrapper) -> cdpwrap::Result<()> {
//!     let mut params = Map::new();
//!     params.insert("clusterId".into(), json!("env-abc"));
//!     let vws = wrapper.invoke("dw", "list_vws", params).await?.into_value()?;
//!     println!("{:?}", vws);
//!     Ok(())
//! }
//! ```
//!
//! [`CdpWrapper::invoke`]: crate::CdpWrapper::invoke

mod helpers;
mod invoke;
mod table;

pub use invoke::registered_call;
pub use table::*;
