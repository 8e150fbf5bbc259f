//! Dispatcher behaviour against scripted platform clients

mod common;

use cdpwrap::cdp::{RawError, RedirectResponse};
use cdpwrap::sink::CollectingSink;
use cdpwrap::{CallOutcome, ErrorField, ErrorKind, ServiceCall, SquelchRule};
use common::{collecting_wrapper, params, test_config, wrapper, wrapper_with, ScriptedFactory};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

const ENV_CRN: &str = "crn:cdp:environments:us-west-1:acct-1:environment:env-1";

mod squelch {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let factory = ScriptedFactory::new();
        factory
            .client("dw")
            .fail("list_vws", "NOT_FOUND", 404, "cluster not found");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .call(
                ServiceCall::new("dw", "list_vws")
                    .field("vws")
                    .squelch(SquelchRule::new("CONFLICT").with_default(json!("conflict")))
                    .squelch(
                        SquelchRule::new("NOT_FOUND")
                            .with_default(json!([]))
                            .with_warning("first"),
                    )
                    .squelch(
                        SquelchRule::new("NOT_FOUND")
                            .with_default(json!("second"))
                            .with_warning("second"),
                    ),
            )
            .await
            .unwrap();

        assert!(outcome.is_suppressed());
        assert_eq!(outcome.value(), Some(&json!([])));
        let warnings = sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "first");
    }

    #[tokio::test]
    async fn test_not_found_yields_empty_list() {
        let factory = ScriptedFactory::new();
        factory
            .client("opdb")
            .fail("list_databases", "NOT_FOUND", 404, "no databases");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let value = wrapper
            .invoke("opdb", "list_databases", params(json!({ "environmentName": "envA" })))
            .await
            .unwrap()
            .into_value()
            .unwrap();

        assert_eq!(value, Some(json!([])));
        assert_eq!(sink.warnings()[0].message, "No OpDB Databases found in Tenant");
    }

    #[tokio::test]
    async fn test_disabled_entitlement_yields_empty_list() {
        let factory = ScriptedFactory::new();
        factory
            .client("dw")
            .fail("list_dbcs", "PATH_DISABLED", 403, "path disabled for tenant");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let value = wrapper
            .invoke("dw", "list_dbcs", params(json!({ "clusterId": "env-1" })))
            .await
            .unwrap()
            .into_value()
            .unwrap();

        assert_eq!(value, Some(json!([])));
        assert_eq!(sink.warnings()[0].message, "Data Catalog not enabled on CDP Tenant");
    }

    #[tokio::test]
    async fn test_status_code_rule() {
        let factory = ScriptedFactory::new();
        factory
            .client("dw")
            .fail("list_dbcs", "UNKNOWN", 504, "gateway timeout");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .invoke("dw", "list_dbcs", params(json!({ "clusterId": "env-x" })))
            .await
            .unwrap();

        assert_eq!(outcome.value(), Some(&json!([])));
        assert_eq!(sink.warnings()[0].message, "No Data Catalogs found in this Cluster");
    }

    #[tokio::test]
    async fn test_warning_defaults_to_violations() {
        let factory = ScriptedFactory::new();
        factory
            .client("environments")
            .fail("create_gcp_credential", "INVALID_ARGUMENT", 400, "Credential already exists with name cred-1");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .call(
                ServiceCall::new("environments", "create_gcp_credential")
                    .squelch(SquelchRule::new("already exists").on(ErrorField::Violations)),
            )
            .await
            .unwrap();

        assert!(outcome.is_suppressed());
        assert_eq!(outcome.value(), Some(&Value::Null));
        assert_eq!(
            sink.warnings()[0].message,
            "Credential already exists with name cred-1"
        );
    }

    #[tokio::test]
    async fn test_local_errors_are_not_squelched() {
        let factory = ScriptedFactory::new();
        factory.client("ml").reply(
            "list_workspaces",
            Err(RawError::UnknownOperation {
                service: "ml".into(),
                operation: "list_workspaces".into(),
            }),
        );
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .call(
                ServiceCall::new("ml", "list_workspaces")
                    .squelch(SquelchRule::new("LOCAL_NOT_IMPLEMENTED").with_default(json!([]))),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::LocalNotImplemented);
        assert!(sink.warnings().is_empty());
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_unmatched_error_is_raised() {
        let factory = ScriptedFactory::new();
        factory
            .client("environments")
            .fail("stop_environment", "INTERNAL", 500, "boom");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .invoke(
                "environments",
                "stop_environment",
                params(json!({ "environmentName": "envA" })),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ClientRequest);
        assert_eq!(err.error_code.as_deref(), Some("INTERNAL"));
        assert_eq!(err.status_code, Some(500));
        assert_eq!(err.service.as_deref(), Some("environments"));
        assert_eq!(err.request_id.as_deref(), Some("req-500"));
    }

    #[tokio::test]
    async fn test_return_error_hands_back_value() {
        let factory = ScriptedFactory::new();
        factory
            .client("df")
            .fail("disable_service", "CONFLICT", 409, "service busy");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .call(ServiceCall::new("df", "disable_service").return_error())
            .await
            .unwrap();

        let error = outcome.error().unwrap();
        assert_eq!(error.error_code.as_deref(), Some("CONFLICT"));
        assert!(matches!(outcome.into_value(), Err(e) if e.status_code == Some(409)));
    }

    #[tokio::test]
    async fn test_collecting_sink_absorbs() {
        let factory = ScriptedFactory::new();
        factory
            .client("datahub")
            .fail("delete_cluster", "INTERNAL", 500, "boom");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = collecting_wrapper(&factory, &sink, test_config());

        let outcome = wrapper
            .call(ServiceCall::new("datahub", "delete_cluster"))
            .await
            .unwrap();

        assert!(matches!(outcome, CallOutcome::Empty));
        assert_eq!(sink.errors().len(), 1);
        assert_eq!(sink.errors()[0].error_code.as_deref(), Some("INTERNAL"));
    }

    #[tokio::test]
    async fn test_strict_mode_raises_before_squelch() {
        let factory = ScriptedFactory::new();
        factory
            .client("opdb")
            .fail("list_databases", "NOT_FOUND", 404, "none");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper_with(&factory, &sink, test_config().with_strict_errors(true));

        let err = wrapper
            .call(
                ServiceCall::new("opdb", "list_databases")
                    .squelch(SquelchRule::new("NOT_FOUND").with_default(json!([]))),
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code.as_deref(), Some("NOT_FOUND"));
        assert!(sink.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_strict_mode_with_collecting_sink_still_squelches() {
        let factory = ScriptedFactory::new();
        factory
            .client("opdb")
            .fail("list_databases", "NOT_FOUND", 404, "none");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = collecting_wrapper(&factory, &sink, test_config().with_strict_errors(true));

        let outcome = wrapper
            .call(
                ServiceCall::new("opdb", "list_databases")
                    .squelch(SquelchRule::new("NOT_FOUND").with_default(json!([]))),
            )
            .await
            .unwrap();

        assert_eq!(outcome.value(), Some(&json!([])));
        assert_eq!(sink.errors().len(), 1);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_operation() {
        let factory = ScriptedFactory::new();
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .invoke("opdb", "describe_everything", Default::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::LocalNotImplemented);
        assert_eq!(err.error_code.as_deref(), Some("LOCAL_NOT_IMPLEMENTED"));
        assert!(factory.builds().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_crn_raises_before_any_call() {
        let factory = ScriptedFactory::new();
        factory.client("dw");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = collecting_wrapper(&factory, &sink, test_config());

        let err = wrapper
            .invoke("dw", "create_cluster", params(json!({ "environmentCrn": "envA" })))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Usage);
        assert!(sink.errors().is_empty());
        assert!(factory.client("dw").calls().is_empty());
    }

    #[tokio::test]
    async fn test_factory_failure_goes_through_error_branch() {
        let factory = ScriptedFactory::new();
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .call(ServiceCall::new("cde", "list_things").return_error())
            .await
            .unwrap();

        let error = outcome.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Generic);
        assert_eq!(error.operation.as_deref(), Some("create_client"));
    }
}

mod extraction {
    use super::*;

    #[tokio::test]
    async fn test_field_is_returned() {
        let factory = ScriptedFactory::new();
        factory.client("iam").ok(
            "get_user",
            json!({ "user": { "userId": "u-1", "email": "someone@example.com" } }),
        );
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let user = wrapper
            .invoke("iam", "get_user", Default::default())
            .await
            .unwrap()
            .into_value()
            .unwrap()
            .unwrap();

        assert_eq!(user["userId"], json!("u-1"));
    }

    #[tokio::test]
    async fn test_empty_response_warns_instead_of_failing() {
        let factory = ScriptedFactory::new();
        factory.client("opdb").ok("start_database", json!({}));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .call(ServiceCall::new("opdb", "start_database").field("databaseDetails"))
            .await
            .unwrap();

        assert!(matches!(outcome, CallOutcome::Empty));
        assert_eq!(
            sink.warnings()[0].message,
            "Call Response is empty, cannot return child field databaseDetails"
        );
    }

    #[tokio::test]
    async fn test_missing_field_in_full_response_is_an_error() {
        let factory = ScriptedFactory::new();
        factory
            .client("opdb")
            .ok("create_database", json!({ "somethingElse": 1 }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .call(ServiceCall::new("opdb", "create_database").field("databaseDetails"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Generic);
        assert!(err.message.contains("databaseDetails"));
    }

    #[tokio::test]
    async fn test_whole_response_without_field() {
        let factory = ScriptedFactory::new();
        factory
            .client("environments")
            .ok("sync_user", json!({ "operationId": "op-1" }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .call(ServiceCall::new("environments", "sync_user"))
            .await
            .unwrap();

        assert_eq!(outcome.value(), Some(&json!({ "operationId": "op-1" })));
    }
}

mod scrubbing {
    use super::*;

    #[tokio::test]
    async fn test_empty_and_null_arguments_dropped() {
        let factory = ScriptedFactory::new();
        let opdb = factory.client("opdb");
        opdb.ok("list_databases", json!({ "databases": [] }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        wrapper
            .call(
                ServiceCall::new("opdb", "list_databases")
                    .params(params(json!({ "name": "", "env": "envA", "filter": null }))),
            )
            .await
            .unwrap();

        assert_eq!(opdb.calls_to("list_databases"), vec![params(json!({ "env": "envA" }))]);
        let warnings = sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("name"));
    }

    #[tokio::test]
    async fn test_opt_out_keeps_arguments() {
        let factory = ScriptedFactory::new();
        let opdb = factory.client("opdb");
        opdb.ok("list_databases", json!({ "databases": [] }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        wrapper
            .call(
                ServiceCall::new("opdb", "list_databases")
                    .no_scrub()
                    .param("name", ""),
            )
            .await
            .unwrap();

        assert_eq!(opdb.calls_to("list_databases"), vec![params(json!({ "name": "" }))]);
        assert!(sink.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_wrapper_level_opt_out() {
        let factory = ScriptedFactory::new();
        let opdb = factory.client("opdb");
        opdb.ok("list_databases", json!({ "databases": [] }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper_with(&factory, &sink, test_config().with_scrub_inputs(false));

        wrapper
            .call(ServiceCall::new("opdb", "list_databases").param("name", ""))
            .await
            .unwrap();

        assert_eq!(opdb.calls_to("list_databases")[0].get("name"), Some(&json!("")));
    }
}

mod pagination {
    use super::*;

    #[tokio::test]
    async fn test_pages_are_merged_in_order() {
        let factory = ScriptedFactory::new();
        let df = factory.client("df");
        df.ok(
            "list_deployments",
            json!({ "deployments": [{ "name": "a" }, { "name": "b" }], "nextToken": "t1", "owner": "p1" }),
        )
        .ok(
            "list_deployments",
            json!({ "deployments": [{ "name": "c" }], "nextToken": "t2", "owner": "p2" }),
        )
        .ok("list_deployments", json!({ "deployments": [{ "name": "d" }], "owner": "p3" }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let merged = wrapper
            .call(ServiceCall::new("df", "list_deployments").param("environmentCrn", ENV_CRN))
            .await
            .unwrap()
            .into_value()
            .unwrap()
            .unwrap();

        assert_eq!(
            merged,
            json!({
                "deployments": [{ "name": "a" }, { "name": "b" }, { "name": "c" }, { "name": "d" }],
                "owner": "p3"
            })
        );
        assert!(merged.get("nextToken").is_none());

        let calls = df.calls_to("list_deployments");
        assert_eq!(calls.len(), 3);
        assert!(calls[0].get("startingToken").is_none());
        assert_eq!(calls[1]["startingToken"], json!("t1"));
        assert_eq!(calls[1]["pageSize"], json!(100));
        assert_eq!(calls[2]["startingToken"], json!("t2"));
        assert_eq!(calls[2]["environmentCrn"], json!(ENV_CRN));
    }

    #[tokio::test]
    async fn test_caller_page_size_is_kept() {
        let factory = ScriptedFactory::new();
        let df = factory.client("df");
        df.ok("list_services", json!({ "services": [1], "nextToken": "t1" }))
            .ok("list_services", json!({ "services": [2] }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let services = wrapper
            .call(ServiceCall::new("df", "list_services").field("services").param("pageSize", 10))
            .await
            .unwrap()
            .into_value()
            .unwrap();

        assert_eq!(services, Some(json!([1, 2])));
        assert_eq!(df.calls_to("list_services")[1]["pageSize"], json!(10));
    }

    #[tokio::test]
    async fn test_error_on_later_page_is_normalized() {
        let factory = ScriptedFactory::new();
        factory
            .client("df")
            .ok("list_deployments", json!({ "deployments": [1], "nextToken": "t1" }))
            .fail("list_deployments", "NOT_FOUND", 404, "token expired");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let outcome = wrapper
            .invoke("df", "list_deployments", Default::default())
            .await
            .unwrap();

        assert_eq!(outcome.value(), Some(&json!([])));
    }
}

mod redirect {
    use super::*;

    fn import_params() -> serde_json::Map<String, Value> {
        params(json!({
            "name": "my-flow",
            "description": "",
            "file": "/tmp/flow.json",
        }))
    }

    #[tokio::test]
    async fn test_redirect_then_upload() {
        let factory = ScriptedFactory::new();
        let df = factory.client("df");
        df.redirect(Ok(RedirectResponse {
            status: 307,
            location: Some("https://upload.example/flows/abc".into()),
        }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let value = wrapper
            .invoke("df", "import_flow_definition", import_params())
            .await
            .unwrap()
            .into_value()
            .unwrap();

        assert_eq!(value, Some(json!({ "uploaded": true })));
        let uploads = df.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].url, "https://upload.example/flows/abc");
        assert_eq!(uploads[0].body, PathBuf::from("/tmp/flow.json"));
        assert_eq!(
            uploads[0].headers,
            vec![("Flow-Definition-Name".to_string(), "my-flow".to_string())]
        );
        // Empty description header dropped with a warning
        assert_eq!(sink.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_redirect_is_hard_error() {
        let factory = ScriptedFactory::new();
        factory.client("df").redirect(Ok(RedirectResponse {
            status: 200,
            location: None,
        }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .invoke("df", "import_flow_definition", import_params())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Generic);
        assert!(err.message.contains("status 200"));
        assert!(factory.client("df").uploads().is_empty());
    }

    #[tokio::test]
    async fn test_empty_location_is_hard_error() {
        let factory = ScriptedFactory::new();
        factory.client("df").redirect(Ok(RedirectResponse {
            status: 302,
            location: Some(String::new()),
        }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .invoke("df", "import_flow_definition", import_params())
            .await
            .unwrap_err();

        assert!(err.message.contains("Redirect URL"));
    }
}

mod clients {
    use super::*;

    #[tokio::test]
    async fn test_client_built_once_per_service() {
        let factory = ScriptedFactory::new();
        factory.client("iam").ok("get_account", json!({ "account": { "id": "a" } }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        for _ in 0..3 {
            wrapper
                .invoke("iam", "get_account", Default::default())
                .await
                .unwrap();
        }

        assert_eq!(factory.builds_of("iam"), 1);
        assert!(wrapper.cache().contains("iam"));
        let builds = factory.builds();
        let (_, settings) = &builds[0];
        assert_eq!(settings.endpoint, "https://api.test.cdp.example");
        assert_eq!(settings.credentials.access_key_id, "test-key-id");
        assert!(settings.user_agent.starts_with("CDPWRAP/"));
    }

    #[test]
    fn test_cache_reuse_from_blocking_context() {
        let factory = ScriptedFactory::new();
        factory.client("datalake").ok("list_datalakes", json!({ "datalakes": [] }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        tokio_test::block_on(async {
            let first = wrapper.client_for("datalake", &Default::default()).await.unwrap();
            let second = wrapper.client_for("datalake", &Default::default()).await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));
        });
        assert_eq!(factory.builds_of("datalake"), 1);
    }

    #[tokio::test]
    async fn test_workload_requires_environment_crn() {
        let factory = ScriptedFactory::new();
        factory.client("iam");
        factory.client("dfworkload");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = collecting_wrapper(&factory, &sink, test_config());

        let err = wrapper
            .call(ServiceCall::new("dfworkload", "list_deployment_events").return_error())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Usage);
        assert!(err.message.contains("environmentCrn"));
        assert!(sink.errors().is_empty());
        assert!(factory.client("iam").calls().is_empty());
        assert_eq!(factory.builds_of("dfworkload"), 0);
    }

    #[tokio::test]
    async fn test_workload_bootstrap() {
        let factory = ScriptedFactory::new();
        let iam = factory.client("iam");
        iam.ok(
            "generate_workload_auth_token",
            json!({ "token": "workload-token", "endpointUrl": "https://dfx.example/api", "expireAt": "later" }),
        );
        factory
            .client("dfworkload")
            .ok("list_deployment_events", json!({ "events": [{ "id": 1 }] }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        for _ in 0..2 {
            let events = wrapper
                .call(
                    ServiceCall::new("dfworkload", "list_deployment_events")
                        .field("events")
                        .param("environmentCrn", ENV_CRN),
                )
                .await
                .unwrap()
                .into_value()
                .unwrap();
            assert_eq!(events, Some(json!([{ "id": 1 }])));
        }

        let token_calls = iam.calls_to("generate_workload_auth_token");
        assert_eq!(token_calls.len(), 1);
        assert_eq!(token_calls[0]["workloadName"], json!("DF"));
        assert_eq!(token_calls[0]["environmentCrn"], json!(ENV_CRN));

        let builds = factory.builds();
        let (_, settings) = builds
            .iter()
            .find(|(service, _)| service == "dfworkload")
            .unwrap();
        assert_eq!(settings.endpoint, "https://dfx.example/api");
        assert_eq!(settings.credentials.bearer_token(), Some("workload-token"));
        assert_eq!(factory.builds_of("dfworkload"), 1);
    }

    #[tokio::test]
    async fn test_absorbed_token_failure_reported_once() {
        let factory = ScriptedFactory::new();
        factory.client("iam").fail(
            "generate_workload_auth_token",
            "FORBIDDEN",
            403,
            "not entitled to DF",
        );
        factory.client("dfworkload");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = collecting_wrapper(&factory, &sink, test_config());

        let err = wrapper
            .call(
                ServiceCall::new("dfworkload", "list_deployment_events")
                    .param("environmentCrn", ENV_CRN),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Usage);
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code.as_deref(), Some("FORBIDDEN"));
        assert_eq!(factory.builds_of("dfworkload"), 0);
    }

    #[tokio::test]
    async fn test_resolve_environment_crn() {
        let factory = ScriptedFactory::new();
        let environments = factory.client("environments");
        environments
            .ok(
                "describe_environment",
                json!({ "environment": { "environmentName": "envA", "crn": ENV_CRN } }),
            )
            .fail("describe_environment", "NOT_FOUND", 404, "no such environment");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        assert_eq!(
            wrapper.resolve_environment_crn(ENV_CRN).await.unwrap().as_deref(),
            Some(ENV_CRN)
        );
        assert!(environments.calls().is_empty());

        assert_eq!(
            wrapper.resolve_environment_crn("envA").await.unwrap().as_deref(),
            Some(ENV_CRN)
        );
        assert_eq!(environments.calls_to("describe_environment")[0]["environmentName"], json!("envA"));

        assert_eq!(wrapper.resolve_environment_crn("gone").await.unwrap(), None);
    }
}

mod lookups {
    use super::*;

    const OP_ID: &str = "0b5e6d1c-54f2-4c7f-9a6e-2f3b1a7c9d10";

    #[tokio::test]
    async fn test_describe_credential_takes_first_or_none() {
        let factory = ScriptedFactory::new();
        factory
            .client("environments")
            .ok(
                "list_credentials",
                json!({ "credentials": [{ "credentialName": "cred-1" }] }),
            )
            .fail("list_credentials", "NOT_FOUND", 404, "none");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let found = wrapper.describe_credential("cred-1").await.unwrap();
        assert_eq!(found, Some(json!({ "credentialName": "cred-1" })));

        assert_eq!(wrapper.describe_credential("cred-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_gather_users_returns_crns() {
        let factory = ScriptedFactory::new();
        let iam = factory.client("iam");
        iam.ok(
            "list_users",
            json!({ "users": [{ "crn": "crn:u1", "email": "a" }, { "crn": "crn:u2" }] }),
        );
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let crns = wrapper.gather_users(&["u1".to_string()]).await.unwrap();

        assert_eq!(crns, Some(vec![json!("crn:u1"), json!("crn:u2")]));
        assert_eq!(iam.calls_to("list_users")[0]["userIds"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_sync_users_tracks_running_operation() {
        let factory = ScriptedFactory::new();
        let environments = factory.client("environments");
        environments
            .fail(
                "sync_all_users",
                "CONFLICT",
                409,
                &format!("There is an operation {} running for this account", OP_ID),
            )
            .ok("sync_status", json!({ "operationId": OP_ID, "status": "RUNNING" }));
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let status = wrapper
            .sync_users(&["envA".to_string()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(status["status"], json!("RUNNING"));
        assert_eq!(environments.calls_to("sync_status")[0]["operationId"], json!(OP_ID));
        assert_eq!(
            environments.calls_to("sync_all_users")[0]["environmentNames"],
            json!(["envA"])
        );
        assert!(sink.warnings()[0].message.ends_with(OP_ID));
    }

    #[tokio::test]
    async fn test_sync_users_other_conflict_is_raised() {
        let factory = ScriptedFactory::new();
        factory
            .client("environments")
            .fail("sync_all_users", "CONFLICT", 409, "something else");
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper.sync_users(&[]).await.unwrap_err();

        assert_eq!(err.error_code.as_deref(), Some("CONFLICT"));
        assert!(factory.client("environments").calls_to("sync_status").is_empty());
    }

    #[tokio::test]
    async fn test_invalid_environment_name_is_usage_error() {
        let factory = ScriptedFactory::new();
        let sink = Arc::new(CollectingSink::new());
        let wrapper = wrapper(&factory, &sink);

        let err = wrapper
            .invoke(
                "environments",
                "create_aws_environment",
                params(json!({ "environmentName": "Env_1", "credentialName": "c", "region": "r" })),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Usage);
        assert!(factory.builds().is_empty());
    }
}
