//! Operation Registry - Load operation definitions from JSON
//!
//! This module loads all CDP operation definitions from embedded JSON files
//! and provides lookup functions for the rest of the crate.

use crate::cdp::ServiceModel;
use crate::dispatch::SquelchRule;
use crate::validate::{CrnKind, NameKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded operation JSON files (compiled into the binary)
const OPERATION_FILES: &[&str] = &[
    include_str!("../operations/iam.json"),
    include_str!("../operations/environments.json"),
    include_str!("../operations/datalake.json"),
    include_str!("../operations/datahub.json"),
    include_str!("../operations/opdb.json"),
    include_str!("../operations/dw.json"),
    include_str!("../operations/de.json"),
    include_str!("../operations/ml.json"),
    include_str!("../operations/df.json"),
    include_str!("../operations/dfworkload.json"),
    include_str!("../operations/drscp.json"),
    include_str!("../operations/metrics.json"),
];

/// CRN check applied to one parameter before dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct CrnCheck {
    pub param: String,
    #[serde(default)]
    pub kind: Option<CrnKind>,
    /// Skip the check when the parameter is absent
    #[serde(default)]
    pub optional: bool,
}

/// Naming rule applied to one parameter when it is supplied
#[derive(Debug, Clone, Deserialize)]
pub struct NameCheck {
    pub param: String,
    pub kind: NameKind,
}

/// Upload leg of a redirect-mode operation
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectDef {
    /// Header name -> parameter supplying its value
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parameter holding the path of the file to stream
    pub body_param: String,
}

fn default_true() -> bool {
    true
}

/// Operation definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct OperationDef {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub result_field: Option<String>,
    #[serde(default)]
    pub squelch: Vec<SquelchRule>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub crn: Vec<CrnCheck>,
    #[serde(default)]
    pub names: Vec<NameCheck>,
    #[serde(default = "default_true")]
    pub scrub: bool,
    #[serde(default)]
    pub redirect: Option<RedirectDef>,
}

/// Root structure of operations/*.json
#[derive(Debug, Clone, Deserialize)]
struct ServiceFile {
    service: String,
    operations: BTreeMap<String, OperationDef>,
}

/// All services and their operations
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub services: BTreeMap<String, BTreeMap<String, OperationDef>>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the operation registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut registry = Registry::default();

        for content in OPERATION_FILES {
            let file: ServiceFile = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded operation JSON: {}", e));
            registry
                .services
                .entry(file.service)
                .or_default()
                .extend(file.operations);
        }

        registry
    })
}

/// Get an operation definition
pub fn get_operation(service: &str, operation: &str) -> Option<&'static OperationDef> {
    get_registry().services.get(service)?.get(operation)
}

/// Get all service names
pub fn services() -> Vec<&'static str> {
    get_registry().services.keys().map(String::as_str).collect()
}

/// Get the operation names of one service
pub fn operations_for(service: &str) -> Vec<&'static str> {
    get_registry()
        .services
        .get(service)
        .map(|ops| ops.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Partial local service model for a platform client, `None` for unknown services.
/// Operations outside the registry still reach the control plane.
pub fn service_model(service: &str) -> Option<ServiceModel> {
    let operations = get_registry().services.get(service)?;
    Some(
        operations
            .iter()
            .fold(ServiceModel::new(), |model, (name, def)| {
                model.with_operation(name, &def.required)
            }),
    )
}
