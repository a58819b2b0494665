use std::process::{Command, Output};

use httpmock::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

struct Harness {
    server: MockServer,
    config_dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            server: MockServer::start(),
            config_dir: TempDir::new().expect("tempdir"),
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_gchat"))
            .args(args)
            .env("GCHAT_API_BASE_URL", self.server.url("/v1"))
            .env("GCHAT_UPLOAD_BASE_URL", self.server.url("/upload/v1"))
            .env("GCHAT_CONFIG_DIR", self.config_dir.path())
            .env("GCHAT_TOKEN", "test-token")
            .env_remove("GCHAT_TOKEN_FILE")
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to execute gchat binary")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_resource_commands() {
    let output = Harness::new().run(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["spaces", "messages", "members", "reactions", "readstate", "events"] {
        assert!(text.contains(command), "missing {command} in help:\n{text}");
    }
}

#[test]
fn spaces_list_renders_table_and_continuation_hint() {
    let harness = Harness::new();
    let mock = harness.server.mock(|when, then| {
        when.method(GET)
            .path("/v1/spaces")
            .query_param("pageSize", "100")
            .header("authorization", "Bearer test-token");
        then.status(200).json_body(json!({
            "spaces": [
                {"name": "spaces/AAA", "displayName": "Team Room", "spaceType": "SPACE"},
                {"name": "spaces/BBB", "spaceType": "DIRECT_MESSAGE"}
            ],
            "nextPageToken": "tok-2"
        }));
    });

    let output = harness.run(&["spaces", "list"]);
    mock.assert();
    assert!(output.status.success(), "gchat failed: {}", stderr(&output));

    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("NAME"));
    assert!(lines[0].contains("DISPLAY_NAME"));
    assert!(lines[1].starts_with("----"));
    assert!(lines[2].starts_with("spaces/AAA"));
    assert!(lines[2].contains("Team Room"));
    assert!(text.contains("--page-token tok-2"));
}

#[test]
fn quiet_mode_keeps_data_and_drops_hint() {
    let harness = Harness::new();
    harness.server.mock(|when, then| {
        when.method(GET).path("/v1/spaces");
        then.status(200).json_body(json!({
            "spaces": [{"name": "spaces/AAA", "displayName": "Team Room"}],
            "nextPageToken": "tok-2"
        }));
    });

    let output = harness.run(&["--quiet", "spaces", "list"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("spaces/AAA"));
    assert!(!text.contains("More results available"));
}

#[test]
fn json_mode_prints_the_response_body() {
    let harness = Harness::new();
    harness.server.mock(|when, then| {
        when.method(GET).path("/v1/spaces/AAA");
        then.status(200)
            .body(r#"{"name":"spaces/AAA","displayName":"Team Room","spaceType":"SPACE"}"#);
    });

    let output = harness.run(&["spaces", "get", "AAA", "--json"]);
    assert!(output.status.success(), "gchat failed: {}", stderr(&output));
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout should be valid json");
    assert_eq!(value["displayName"], "Team Room");
    assert!(stdout(&output).starts_with("{\n  \"name\": \"spaces/AAA\""));
}

#[test]
fn fetch_all_aggregates_pages_in_json_mode() {
    let harness = Harness::new();
    let first = harness.server.mock(|when, then| {
        when.method(GET)
            .path("/v1/spaces/AAA/members")
            .query_param("pageToken", "p1");
        then.status(200).json_body(json!({
            "memberships": [{"name": "spaces/AAA/members/1"}],
            "nextPageToken": "p2"
        }));
    });
    let second = harness.server.mock(|when, then| {
        when.method(GET)
            .path("/v1/spaces/AAA/members")
            .query_param("pageToken", "p2");
        then.status(200).json_body(json!({
            "memberships": [{"name": "spaces/AAA/members/2"}]
        }));
    });

    let output = harness.run(&["members", "list", "AAA", "--all", "--page-token", "p1", "--json"]);
    first.assert();
    second.assert();
    assert!(output.status.success(), "gchat failed: {}", stderr(&output));
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        value,
        json!({"memberships": [
            {"name": "spaces/AAA/members/1"},
            {"name": "spaces/AAA/members/2"}
        ]})
    );
}

#[test]
fn api_errors_exit_nonzero_with_reason() {
    let harness = Harness::new();
    harness.server.mock(|when, then| {
        when.method(DELETE).path("/v1/spaces/AAA");
        then.status(403).json_body(json!({
            "error": {
                "code": 403,
                "message": "The caller does not have permission",
                "status": "PERMISSION_DENIED",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                    "reason": "ACCESS_TOKEN_SCOPE_INSUFFICIENT"
                }]
            }
        }));
    });

    let output = harness.run(&["spaces", "delete", "AAA"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains(
        "Error: deleting space: API error 403 (PERMISSION_DENIED): The caller does not have permission"
    ));
    assert!(err.contains("Reason: ACCESS_TOKEN_SCOPE_INSUFFICIENT"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn missing_credentials_are_reported() {
    let harness = Harness::new();
    let output = Command::new(env!("CARGO_BIN_EXE_gchat"))
        .args(["spaces", "list"])
        .env("GCHAT_API_BASE_URL", harness.server.url("/v1"))
        .env("GCHAT_CONFIG_DIR", harness.config_dir.path())
        .env_remove("GCHAT_TOKEN")
        .env_remove("GCHAT_TOKEN_FILE")
        .output()
        .expect("failed to execute gchat binary");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not logged in"));
}

#[test]
fn verbose_logging_stays_on_stderr() {
    let harness = Harness::new();
    let body = r#"{"name":"spaces/AAA","displayName":"Team Room"}"#;
    harness.server.mock(|when, then| {
        when.method(GET).path("/v1/spaces/AAA");
        then.status(200).body(body);
    });

    let output = harness.run(&["--verbose", "spaces", "get", "AAA", "--json"]);
    assert!(output.status.success(), "gchat failed: {}", stderr(&output));

    let printed: Value = serde_json::from_slice(&output.stdout).expect("stdout should be only json");
    let expected: Value = serde_json::from_str(body).expect("body");
    assert_eq!(printed, expected);
    assert!(!stdout(&output).contains(">>"));

    let err = stderr(&output);
    assert!(err.contains(">> GET"), "missing request line:\n{err}");
    assert!(err.contains("<< 200"), "missing status line:\n{err}");
}

#[test]
fn fetch_all_json_keeps_number_text() {
    let harness = Harness::new();
    harness.server.mock(|when, then| {
        when.method(GET).path("/v1/spaces/AAA/messages");
        then.status(200)
            .body(r#"{"messages":[{"name":"spaces/AAA/messages/1","n":12345678901234567890123,"r":1.0e2}]}"#);
    });

    let output = harness.run(&["messages", "list", "AAA", "--all", "--json"]);
    assert!(output.status.success(), "gchat failed: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("\"n\": 12345678901234567890123"), "number rewritten:\n{text}");
    assert!(text.contains("\"r\": 1.0e2"), "number rewritten:\n{text}");
    assert!(text.starts_with("{\n  \"messages\": [\n    {\n"));
}
