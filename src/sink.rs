//! Warning and error channels
//!
//! The wrapper never decides on its own how a failure reaches the host. Errors
//! go to an [`ErrorSink`] and non-fatal conditions to a [`WarningSink`], both
//! injectable, so automation hosts can collect instead of propagating.

use crate::error::{CdpError, Result};
use std::sync::{Mutex, PoisonError};

/// A non-fatal condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdpWarning {
    pub message: String,
}

impl CdpWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CdpWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives warnings
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: CdpWarning);
}

/// Receives errors the wrapper could not absorb.
///
/// Returning `Err` propagates the error to the caller. Returning `Ok(())`
/// means the sink took ownership of it and the call carries on with no value.
pub trait ErrorSink: Send + Sync {
    fn raise(&self, error: CdpError) -> Result<()>;
}

/// Default warning sink: a `tracing` warning event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWarningSink;

impl WarningSink for TracingWarningSink {
    fn warn(&self, warning: CdpWarning) {
        tracing::warn!(target: "cdpwrap::warning", "{}", warning.message);
    }
}

/// Default error sink: propagate
#[derive(Debug, Default, Clone, Copy)]
pub struct RaiseErrorSink;

impl ErrorSink for RaiseErrorSink {
    fn raise(&self, error: CdpError) -> Result<()> {
        Err(error)
    }
}

/// Records warnings and errors for later inspection
#[derive(Debug, Default)]
pub struct CollectingSink {
    warnings: Mutex<Vec<CdpWarning>>,
    errors: Mutex<Vec<CdpError>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<CdpWarning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn errors(&self) -> Vec<CdpError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain everything collected so far
    pub fn take(&self) -> (Vec<CdpWarning>, Vec<CdpError>) {
        let warnings = std::mem::take(
            &mut *self
                .warnings
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let errors = std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner));
        (warnings, errors)
    }
}

impl WarningSink for CollectingSink {
    fn warn(&self, warning: CdpWarning) {
        tracing::debug!("Collected warning: {}", warning.message);
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }
}

impl ErrorSink for CollectingSink {
    fn raise(&self, error: CdpError) -> Result<()> {
        tracing::debug!("Collected error: {}", error);
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
        Ok(())
    }
}
