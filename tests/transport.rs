//! The line-oriented JSON transport, driven through the real binary.

mod common;

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

use common::scratch_with_remote;
use serde_json::{Value, json};

fn devsolo_bin() -> &'static str {
    env!("CARGO_BIN_EXE_devsolo")
}

fn run_cli(work: &std::path::Path, args: &[&str]) -> (bool, Value) {
    let output = Command::new(devsolo_bin())
        .arg("-C")
        .arg(work)
        .args(args)
        .output()
        .expect("failed to spawn devsolo");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value = serde_json::from_str(&stdout).unwrap_or(Value::Null);
    (output.status.success(), value)
}

#[test]
fn cli_init_then_status() {
    let scratch = scratch_with_remote();

    let (ok, result) = run_cli(&scratch.work, &["init"]);
    assert!(ok, "init failed: {result}");
    assert_eq!(result["success"], true);

    let (ok, result) = run_cli(&scratch.work, &["status"]);
    assert!(ok);
    assert_eq!(result["success"], true);
    assert_eq!(result["data"]["trunk"], "main");
    assert_eq!(result["data"]["currentBranch"], "main");
}

#[test]
fn cli_uninitialized_tool_fails_with_kind() {
    let scratch = scratch_with_remote();
    let (ok, result) = run_cli(
        &scratch.work,
        &["launch", "--description", "too early"],
    );
    assert!(!ok, "launch must fail before init");
    assert_eq!(result["errorKind"], "not-initialized");
    assert!(result["nextSteps"][0].as_str().unwrap().contains("init"));
}

#[test]
fn cli_tools_lists_all_nine() {
    let scratch = scratch_with_remote();
    let (ok, listing) = run_cli(&scratch.work, &["tools"]);
    assert!(ok);
    let tools = listing.as_array().unwrap();
    assert_eq!(tools.len(), 9);
    let names: Vec<&str> = tools
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"workflow.launch"));
    assert!(names.contains(&"workflow.ship"));
    assert!(names.contains(&"devsolo.status"));
    // Every tool publishes an object schema for its parameters
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object", "tool: {}", tool["name"]);
    }
}

#[test]
fn serve_answers_one_result_per_request_line() {
    let scratch = scratch_with_remote();
    let (ok, _) = run_cli(&scratch.work, &["init"]);
    assert!(ok);

    let mut child = Command::new(devsolo_bin())
        .arg("-C")
        .arg(&scratch.work)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn devsolo serve");

    let mut stdin = child.stdin.take().unwrap();
    let stdout = BufReader::new(child.stdout.take().unwrap());
    let mut lines = stdout.lines();

    let requests = [
        json!({ "tool": "devsolo.status", "params": {} }),
        json!({ "tool": "workflow.nonsense", "params": {} }),
        json!({ "tool": "workflow.launch", "params": { "branchName": "feature/over-the-wire" } }),
    ];
    let mut responses = Vec::new();
    for request in &requests {
        writeln!(stdin, "{request}").unwrap();
        stdin.flush().unwrap();
        let line = lines.next().expect("a response line").unwrap();
        responses.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    // Malformed input produces a structured failure, not a crash
    writeln!(stdin, "this is not json").unwrap();
    stdin.flush().unwrap();
    let line = lines.next().expect("a response line").unwrap();
    responses.push(serde_json::from_str::<Value>(&line).unwrap());

    drop(stdin);
    let status = child.wait().unwrap();
    assert!(status.success(), "serve must exit cleanly on EOF");

    assert_eq!(responses[0]["success"], true);
    assert_eq!(responses[1]["success"], false);
    assert_eq!(responses[1]["errorKind"], "unknown-tool");
    assert_eq!(responses[2]["success"], true);
    assert_eq!(responses[2]["branchName"], "feature/over-the-wire");
    assert_eq!(responses[2]["state"], "BRANCH_READY");
    assert_eq!(responses[3]["success"], false);
    assert_eq!(responses[3]["errorKind"], "internal");
}
