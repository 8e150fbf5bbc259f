//! Lookups composed from registered operations

use super::invoke::registered_call;
use crate::dispatch::CallOutcome;
use crate::error::Result;
use crate::util::{filter_by_key, first_item_if_exists, is_empty_response};
use crate::validate::running_operation_id;
use crate::wrapper::CdpWrapper;
use serde_json::{Map, Value};

const CONFLICT: &str = "CONFLICT";

fn single(key: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(key.to_string(), value.into());
    params
}

impl CdpWrapper {
    async fn invoke_value(
        &self,
        service: &str,
        operation: &str,
        params: Map<String, Value>,
    ) -> Result<Option<Value>> {
        self.invoke(service, operation, params).await?.into_value()
    }

    /// First credential listed under `name`, `None` when there is none
    pub async fn describe_credential(&self, name: &str) -> Result<Option<Value>> {
        let listed = self
            .invoke_value("environments", "list_credentials", single("credentialName", name))
            .await?;
        Ok(listed
            .filter(|l| !is_empty_response(l))
            .map(first_item_if_exists))
    }

    pub async fn describe_proxy_config(&self, name: &str) -> Result<Option<Value>> {
        let listed = self
            .invoke_value("environments", "list_proxy_configs", single("proxyConfigName", name))
            .await?;
        Ok(listed
            .filter(|l| !is_empty_response(l))
            .map(first_item_if_exists))
    }

    /// CRNs of the given users, or of every user when none are named
    pub async fn gather_users(&self, users: &[String]) -> Result<Option<Vec<Value>>> {
        let params = if users.is_empty() {
            Map::new()
        } else {
            single("userIds", users.to_vec())
        };
        let listed = self.invoke_value("iam", "list_users", params).await?;
        Ok(listed.map(|users| {
            users
                .as_array()
                .map(|items| filter_by_key(items, "crn"))
                .unwrap_or_default()
        }))
    }

    /// Start a user sync, or track the one already running
    pub async fn sync_users(&self, environments: &[String]) -> Result<Option<Value>> {
        let mut call = registered_call("environments", "sync_all_users", Map::new())?.return_error();
        if !environments.is_empty() {
            call = call.param("environmentNames", environments.to_vec());
        }

        match self.call(call).await? {
            CallOutcome::Error(error) => {
                if error.error_code.as_deref() == Some(CONFLICT) && !self.config.strict_errors {
                    if let Some(id) = running_operation_id(&error.violations_text()) {
                        self.warn(format!(
                            "Sync All Users Operation already running, tracking existing job {}",
                            id
                        ));
                        return self.sync_status(&id).await;
                    }
                }
                self.raise(error)?;
                Ok(None)
            },
            outcome => outcome.into_value(),
        }
    }

    pub async fn sync_status(&self, operation_id: &str) -> Result<Option<Value>> {
        self.invoke_value("environments", "sync_status", single("operationId", operation_id))
            .await
    }
}
