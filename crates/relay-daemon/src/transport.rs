//! The line-delimited JSON request/response transport.
//!
//! Wire framing for tool invocations is explicitly out of scope; this is
//! the minimal real transport needed to begin serving the twelve tool
//! operations without building a full stdio-framed JSON-RPC stack and
//! tool registry.

use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use relay_engine::Engine;

#[derive(Debug, Deserialize)]
struct ToolRequest {
    operation: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct SuccessEnvelope {
    success: bool,
    #[serde(flatten)]
    payload: Value,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
    code: relay_core::error::ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Read one request per line from stdin, dispatch it against `engine`, and
/// write one JSON response per line to stdout. Runs until stdin closes.
pub async fn serve_stdio(engine: &Engine) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let stdout = std::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => dispatch(engine, request).await,
            Err(e) => serde_json::to_string(&ErrorEnvelope {
                success: false,
                error: format!("malformed request: {e}"),
                code: relay_core::error::ErrorCode::InternalError,
                reason: None,
                details: None,
            })
            .expect("error envelope serializes"),
        };

        let mut out = stdout.lock();
        writeln!(out, "{response}")?;
        out.flush()?;
    }

    Ok(())
}

async fn dispatch(engine: &Engine, request: ToolRequest) -> String {
    let result = run_operation(engine, &request.operation, request.params).await;
    let rendered = match result {
        Ok(payload) => serde_json::to_string(&SuccessEnvelope { success: true, payload }),
        Err(e) => serde_json::to_string(&ErrorEnvelope {
            success: false,
            error: e.message.clone(),
            code: e.code,
            reason: e.reason.clone(),
            details: e.details.clone(),
        }),
    };
    rendered.unwrap_or_else(|e| format!(r#"{{"success":false,"error":"response serialization failed: {e}"}}"#))
}

async fn run_operation(engine: &Engine, operation: &str, params: Value) -> relay_core::error::Result<Value> {
    macro_rules! call {
        ($op:expr) => {{
            let req = serde_json::from_value(params)
                .map_err(|e| relay_core::error::RelayError::internal(format!("invalid params: {e}")))?;
            let payload = $op(engine, req).await?;
            serde_json::to_value(payload).map_err(|e| relay_core::error::RelayError::internal(e.to_string()))
        }};
    }

    match operation {
        "create_issue" => call!(relay_engine::create_issue),
        "list_backlog" => call!(relay_engine::list_backlog),
        "select_next_issue" => call!(relay_engine::select_next_issue),
        "advance_workflow" => call!(relay_engine::advance_workflow),
        "release_lock" => call!(relay_engine::release_lock),
        "force_claim" => call!(relay_engine::force_claim),
        "get_workflow_status" => call!(relay_engine::get_workflow_status),
        "sync_backlog_labels" => call!(relay_engine::sync_backlog_labels),
        "get_pr_status" => call!(relay_engine::get_pr_status),
        "bulk_update_issues" => call!(relay_engine::bulk_update_issues),
        "implement_batch" => call!(relay_engine::implement_batch),
        "batch_continue" => call!(relay_engine::batch_continue),
        other => Err(relay_core::error::RelayError::internal(format!("unknown operation: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::config::Config;
    use relay_github::GitHubClient;
    use relay_store::StoreLayout;

    fn engine() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let github = GitHubClient::new("test-token".to_string(), "acme", "widgets").unwrap();
        let engine = Engine::new(github, Config::default(), "session-1".to_string(), layout).unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn unknown_operation_reports_internal_error_without_touching_the_engine() {
        let (engine, _dir) = engine();
        let result = run_operation(&engine, "not_a_real_operation", Value::Null).await;
        let err = result.unwrap_err();
        assert_eq!(err.code, relay_core::error::ErrorCode::InternalError);
        assert!(err.message.contains("not_a_real_operation"));
    }

    #[test]
    fn success_envelope_flattens_payload_alongside_the_success_flag() {
        let payload = serde_json::json!({ "issueNumber": 42 });
        let rendered = serde_json::to_value(&SuccessEnvelope { success: true, payload }).unwrap();
        assert_eq!(rendered["success"], true);
        assert_eq!(rendered["issueNumber"], 42);
    }

    #[test]
    fn error_envelope_omits_absent_optional_fields() {
        let rendered = serde_json::to_value(&ErrorEnvelope {
            success: false,
            error: "boom".to_string(),
            code: relay_core::error::ErrorCode::InternalError,
            reason: None,
            details: None,
        })
        .unwrap();
        let obj = rendered.as_object().unwrap();
        assert!(!obj.contains_key("reason"));
        assert!(!obj.contains_key("details"));
        assert_eq!(obj["error"], "boom");
    }

    #[test]
    fn non_json_input_fails_to_parse_as_a_request() {
        let parsed = serde_json::from_str::<ToolRequest>("not json");
        assert!(parsed.is_err());
    }

    #[test]
    fn request_without_params_defaults_to_null() {
        let parsed: ToolRequest = serde_json::from_str(r#"{"operation":"list_backlog"}"#).unwrap();
        assert_eq!(parsed.operation, "list_backlog");
        assert_eq!(parsed.params, Value::Null);
    }
}
