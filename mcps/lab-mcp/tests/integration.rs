//! Integration tests for the script lab MCP server
//!
//! Each test feeds a full session of request lines through
//! `mcp_common::serve` and inspects the response lines, with the sandbox
//! rooted in a temporary directory.

use lab_mcp::{Config, LabServer};
use mcp_common::{METHOD_NOT_FOUND, TOOL_EXECUTION_ERROR};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Serve `requests` (one JSON value or raw string per line) and collect the responses
async fn session(dir: &TempDir, requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|request| match request {
            Value::String(raw) => format!("{}\n", raw),
            other => format!("{}\n", other),
        })
        .collect();

    let server = LabServer::with_root(Config::default(), dir.path()).unwrap();
    let mut output = Vec::new();
    mcp_common::serve(server, input.as_bytes(), &mut output)
        .await
        .unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

fn error_code(response: &Value) -> Option<i64> {
    response["error"]["code"].as_i64()
}

// ============================================================================
// PROTOCOL
// ============================================================================

#[tokio::test]
async fn initialize_is_stable_and_echoes_ids() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "id": "abc", "method": "initialize"}),
            json!({"jsonrpc": "2.0", "id": null, "method": "initialize"}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], json!(1));
    assert_eq!(responses[1]["id"], json!("abc"));
    assert_eq!(responses[2]["id"], Value::Null);

    assert_eq!(responses[0]["result"], responses[1]["result"]);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "script-lab");
    assert!(responses[0]["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tools_list_and_alias_match() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "list_tools"}),
        ],
    )
    .await;

    assert_eq!(responses[0]["result"], responses[1]["result"]);
    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let run_script = tools.iter().find(|t| t["name"] == "run_script").unwrap();
    assert!(run_script["inputSchema"]["properties"]["code"].is_object());
}

#[tokio::test]
async fn unknown_method_and_tool() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
            call(2, "delete_everything", json!({"path": "x.txt"})),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {}}),
            call(4, "list_files", json!({})),
        ],
    )
    .await;

    assert_eq!(error_code(&responses[0]), Some(METHOD_NOT_FOUND as i64));
    assert_eq!(responses[0]["error"]["message"], "Unknown method: resources/list");

    assert_eq!(error_code(&responses[1]), Some(METHOD_NOT_FOUND as i64));
    assert_eq!(responses[1]["error"]["message"], "Unknown tool: delete_everything");
    assert_eq!(error_code(&responses[2]), Some(METHOD_NOT_FOUND as i64));

    assert_eq!(responses[3]["result"]["total_count"], 0);
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            json!("this is not json"),
            json!(""),
            json!("{\"id\": 1, \"method\": "),
            json!({"jsonrpc": "2.0", "id": 7, "method": "initialize"}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 7);
}

#[tokio::test]
async fn invalid_arguments_are_tool_errors() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "read_file", json!({})),
            call(2, "write_file", json!({"path": 12})),
        ],
    )
    .await;

    for response in &responses {
        assert_eq!(error_code(response), Some(TOOL_EXECUTION_ERROR as i64));
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Tool error: invalid parameters"));
        assert!(response["error"]["data"].is_string());
    }
}

// ============================================================================
// FILE STORE
// ============================================================================

#[tokio::test]
async fn write_then_read() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "write_file", json!({"path": "a/b.txt", "content": "hello"})),
            call(2, "read_file", json!({"path": "a/b.txt"})),
            call(3, "read_file", json!({"path": "missing.txt"})),
        ],
    )
    .await;

    assert_eq!(
        responses[0]["result"],
        json!({"ok": true, "path": "a/b.txt", "bytes_written": 5})
    );
    assert_eq!(responses[1]["result"]["content"], "hello");
    assert_eq!(responses[1]["result"]["size"], 5);
    assert_eq!(error_code(&responses[2]), Some(TOOL_EXECUTION_ERROR as i64));
}

#[tokio::test]
async fn traversal_stays_in_sandbox() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "write_file", json!({"path": "../../etc/passwd", "content": "root"})),
            call(2, "list_files", json!({})),
        ],
    )
    .await;

    assert_eq!(responses[0]["result"]["path"], "etc/passwd");
    assert_eq!(responses[1]["result"]["files"], json!(["etc/passwd"]));
    assert!(dir.path().join("etc").join("passwd").is_file());
}

#[tokio::test]
async fn list_and_reset() {
    let dir = TempDir::new().unwrap();
    let mut requests: Vec<Value> = (0..5)
        .map(|i| call(i, "write_file", json!({"path": format!("runs/{}.txt", i), "content": "x"})))
        .collect();
    requests.push(call(10, "list_files", json!({})));
    requests.push(call(11, "reset_sandbox", json!({})));
    requests.push(call(12, "list_files", Value::Null));

    let responses = session(&dir, &requests).await;

    assert_eq!(responses[5]["result"]["total_count"], 5);
    assert_eq!(responses[6]["result"], json!({"ok": true, "removed": 5, "failed": 0}));
    assert_eq!(responses[7]["result"]["total_count"], 0);
}

// ============================================================================
// SCRIPTS
// ============================================================================

#[tokio::test]
async fn script_results_and_faults() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "run_script", json!({"code": "print(\"hi\"); result = 42;"})),
            call(2, "run_script", json!({"code": "let x = 1 / 0;"})),
            call(3, "run_script", json!({"script": "result = sum([1, 2, 3]);"})),
            call(4, "run_script", json!({})),
        ],
    )
    .await;

    assert_eq!(
        responses[0]["result"],
        json!({"stdout": "hi\n", "stderr": "", "result": 42, "truncated": false})
    );

    assert!(responses[1]["error"].is_null());
    assert!(!responses[1]["result"]["stderr"].as_str().unwrap().is_empty());
    assert_eq!(responses[1]["result"]["result"], Value::Null);

    assert_eq!(responses[2]["result"]["result"], 6);
    assert_eq!(responses[3]["result"]["result"], Value::Null);
}

#[tokio::test]
async fn deep_recursion_keeps_the_server_alive() {
    let dir = TempDir::new().unwrap();
    let countdown = "fn depth(n) { if n == 0 { 0 } else { depth(n - 1) + 1 } }";
    let responses = session(
        &dir,
        &[
            call(1, "run_script", json!({"code": format!("{} result = depth(60);", countdown)})),
            call(2, "run_script", json!({"code": format!("{} result = depth(100000);", countdown)})),
            call(3, "backend_info", json!({})),
        ],
    )
    .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["result"]["result"], 60);
    assert_eq!(responses[0]["result"]["stderr"], "");
    assert_eq!(responses[1]["result"]["result"], Value::Null);
    assert!(responses[1]["result"]["stderr"]
        .as_str()
        .unwrap()
        .starts_with("error: "));
    assert_eq!(responses[2]["result"]["backend"], "cpu");
}

#[tokio::test]
async fn non_finite_values_are_flagged() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "run_script", json!({"code": "result = 1.0 / 0.0;"})),
            call(2, "simulate_kerr", json!({})),
        ],
    )
    .await;

    assert_eq!(responses[0]["result"]["result"], Value::Null);
    assert!(responses[0]["result"]["stderr"]
        .as_str()
        .unwrap()
        .contains("non-finite"));

    let kerr = &responses[1]["result"];
    assert_eq!(kerr["redshifts"][0], Value::Null);
    assert_eq!(kerr["inside_horizon"], 1);
}

#[tokio::test]
async fn scripts_cannot_touch_the_filesystem() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "run_script", json!({"code": "import \"fs\" as fs; result = 1;"})),
            call(2, "run_script", json!({"code": "result = eval(\"open('x')\");"})),
            call(3, "list_files", json!({})),
        ],
    )
    .await;

    for response in &responses[..2] {
        assert_eq!(response["result"]["result"], Value::Null);
        assert!(!response["result"]["stderr"].as_str().unwrap().is_empty());
    }
    assert_eq!(responses[2]["result"]["total_count"], 0);
}

#[tokio::test]
async fn astro_tools_round_out_a_session() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        &dir,
        &[
            call(1, "simulate_kerr", json!({"spin": 0.9, "samples": 16})),
            call(2, "generate_noise", json!({"width": 4, "height": 4, "seed": 3})),
            call(3, "backend_info", json!({})),
            call(
                4,
                "run_script",
                json!({"code": "let r = sample_orbit_radii(0.9, 16); result = r[0] == kerr_isco_radius(0.9);"}),
            ),
        ],
    )
    .await;

    assert_eq!(responses[0]["result"]["radii"].as_array().unwrap().len(), 16);
    assert_eq!(responses[1]["result"]["field"].as_array().unwrap().len(), 4);
    assert_eq!(responses[2]["result"]["backend"], "cpu");
    assert_eq!(responses[3]["result"]["result"], true);
}
