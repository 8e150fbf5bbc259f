//! Registry front-end
//!
//! Turns an [`OperationDef`] plus caller parameters into a [`ServiceCall`].

use super::table::{get_operation, OperationDef};
use crate::cdp::RawError;
use crate::dispatch::{CallOutcome, ServiceCall};
use crate::error::{normalize, CdpError, Result};
use crate::validate::{validate_crn, validate_name, CRN_PREFIX};
use crate::wrapper::CdpWrapper;
use serde_json::{Map, Value};
use std::path::PathBuf;

fn check_crns(def: &OperationDef, params: &Map<String, Value>) -> Result<()> {
    for check in &def.crn {
        let value = params.get(&check.param).and_then(Value::as_str);
        if value.is_none() && check.optional {
            continue;
        }
        validate_crn(value, check.kind)?;
    }
    Ok(())
}

fn check_names(def: &OperationDef, params: &Map<String, Value>) -> Result<()> {
    for check in &def.names {
        if let Some(name) = params.get(&check.param).and_then(Value::as_str) {
            validate_name(check.kind, name)?;
        }
    }
    Ok(())
}

fn build_call(
    service: &str,
    operation: &str,
    def: &OperationDef,
    mut params: Map<String, Value>,
) -> Result<ServiceCall> {
    let mut call = ServiceCall::new(service, operation).squelch_all(def.squelch.iter().cloned());
    if let Some(field) = &def.result_field {
        call = call.field(field.as_str());
    }
    if !def.scrub {
        call = call.no_scrub();
    }

    if let Some(redirect) = &def.redirect {
        let Some(body) = params
            .remove(&redirect.body_param)
            .and_then(|v| v.as_str().map(PathBuf::from))
        else {
            return Err(CdpError::usage(format!(
                "{}.{} requires the file path parameter '{}'",
                service, operation, redirect.body_param
            )));
        };

        let headers: Map<String, Value> = redirect
            .headers
            .iter()
            .map(|(header, param)| (header.clone(), params.remove(param).unwrap_or(Value::Null)))
            .collect();
        call = call.redirect(headers, body);
    }

    Ok(call.params(params))
}

/// Build the call for a registered operation, validating CRNs first
pub fn registered_call(
    service: &str,
    operation: &str,
    params: Map<String, Value>,
) -> Result<ServiceCall> {
    let Some(def) = get_operation(service, operation) else {
        return Err(normalize(RawError::UnknownOperation {
            service: service.to_string(),
            operation: operation.to_string(),
        }));
    };

    check_crns(def, &params)?;
    check_names(def, &params)?;
    build_call(service, operation, def, params)
}

impl CdpWrapper {
    /// Invoke a registered operation by service and name
    pub async fn invoke(
        &self,
        service: &str,
        operation: &str,
        params: Map<String, Value>,
    ) -> Result<CallOutcome> {
        let call = registered_call(service, operation, params)?;
        self.call(call).await
    }

    /// CRNs pass through; names are looked up through `describe_environment`
    pub async fn resolve_environment_crn(&self, environment: &str) -> Result<Option<String>> {
        if environment.starts_with(CRN_PREFIX) {
            return Ok(Some(environment.to_string()));
        }

        let mut params = Map::new();
        params.insert("environmentName".to_string(), Value::from(environment));
        let described = self
            .invoke("environments", "describe_environment", params)
            .await?
            .into_value()?;

        Ok(described
            .as_ref()
            .and_then(|env| env.get("crn"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}
