//! Local validation
//!
//! Checks that fail fast, before anything is sent: CRN shape and resource
//! names. Failures are usage errors and are never squelched.

use crate::error::{CdpError, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Every CRN starts with this
pub const CRN_PREFIX: &str = "crn:";

/// Declared CRN types and the substrings they must contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrnKind {
    Environment,
    Dataflow,
    Flow,
    Readyflow,
    Deployment,
}

impl CrnKind {
    /// A CRN of this kind contains at least one of these
    pub fn required_substrings(&self) -> &'static [&'static str] {
        match self {
            CrnKind::Environment => &[":environments:"],
            CrnKind::Dataflow => &[":df:"],
            CrnKind::Flow => &[":flow:"],
            CrnKind::Readyflow => &[":readyFlow:"],
            CrnKind::Deployment => &[":deployment:"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrnKind::Environment => "environment",
            CrnKind::Dataflow => "dataflow",
            CrnKind::Flow => "flow",
            CrnKind::Readyflow => "readyflow",
            CrnKind::Deployment => "deployment",
        }
    }
}

/// Validate a CRN, optionally against a declared type
pub fn validate_crn(crn: Option<&str>, kind: Option<CrnKind>) -> Result<()> {
    let Some(crn) = crn.filter(|c| c.starts_with(CRN_PREFIX)) else {
        return Err(CdpError::usage(format!(
            "Supplied crn {} is not a valid CDP crn",
            crn.unwrap_or("None")
        )));
    };

    if let Some(kind) = kind {
        if !kind.required_substrings().iter().any(|s| crn.contains(s)) {
            return Err(CdpError::usage(format!(
                "Supplied crn {} is not a valid CDP {} crn",
                crn,
                kind.as_str()
            )));
        }
    }
    Ok(())
}

/// Resource kinds with naming rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Datahub,
    Datalake,
    Environment,
    Credential,
}

fn forbidden_pattern(kind: NameKind) -> &'static Regex {
    static LOWER_DASH: OnceLock<Regex> = OnceLock::new();
    static ENVIRONMENT: OnceLock<Regex> = OnceLock::new();

    match kind {
        NameKind::Environment => ENVIRONMENT.get_or_init(|| {
            Regex::new(r"(^[^a-z0-9]|[^a-z0-9-]|^.{0,4}$|^.{29,}$)")
                .expect("environment name pattern is valid")
        }),
        NameKind::Datahub | NameKind::Datalake | NameKind::Credential => LOWER_DASH
            .get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("name pattern is valid")),
    }
}

/// Validate a resource name against its naming rules
pub fn validate_name(kind: NameKind, name: &str) -> Result<()> {
    if name.is_empty() || forbidden_pattern(kind).is_match(name) {
        return Err(CdpError::usage(format!(
            "Supplied {:?} name '{}' is not valid",
            kind, name
        )));
    }
    Ok(())
}

/// Id of an already running operation mentioned in violation text
pub fn running_operation_id(text: &str) -> Option<String> {
    static OPERATION: OnceLock<Regex> = OnceLock::new();
    let pattern = OPERATION.get_or_init(|| {
        Regex::new(r"operation ([0-9a-zA-Z-]{36}) running").expect("operation pattern is valid")
    });
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
