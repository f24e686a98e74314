use std::process::{Command, Output};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_apm")
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .env("APM_CONFIG", "/nonexistent/apm/config.toml")
        .env_remove("APM_ACCOUNT_ID")
        .env_remove("APM_TRUSTED_ACCOUNT_KEY")
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn traceparent_json_output() {
    let output = run(&[
        "traceparent",
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        "--json",
    ]);
    let value = stdout_json(&output);
    assert_eq!(value["trace_id"], json!("4bf92f3577b34da6a3ce929d0e0e4736"));
    assert_eq!(value["parent_id"], json!("00f067aa0ba902b7"));
    assert_eq!(value["sampled"], json!(true));
}

#[test]
fn invalid_traceparent_fails() {
    let output = run(&[
        "traceparent",
        "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
    ]);
    assert!(!output.status.success());
}

#[test]
fn encode_then_decode() {
    let encoded = run(&["encode", r#"{"route":"/orders","ids":[1,2,3]}"#]);
    assert!(encoded.status.success());
    let payload = String::from_utf8(encoded.stdout).unwrap();

    let decoded = run(&["decode", payload.trim()]);
    assert_eq!(
        stdout_json(&decoded),
        json!({"route": "/orders", "ids": [1, 2, 3]})
    );
}

#[test]
fn tracestate_extracts_trusted_entry() {
    let header = "190@nr=0-0-709288-8599547-f85f42fd82a4cf1d-164d3b4b0d09cb05-1-0.789-1563574856827,rojo=00f067aa0ba902b7";
    let output = run(&["tracestate", header, "--trust-key", "190", "--json"]);
    let value = stdout_json(&output);
    assert_eq!(value["entry"]["account_id"], json!("709288"));
    assert_eq!(value["entry"]["parent_type"], json!("App"));
    assert_eq!(value["entry"]["sampled"], json!(true));
    assert_eq!(value["vendors"], json!(["rojo=00f067aa0ba902b7"]));
}

#[test]
fn newrelic_header_decodes() {
    let header = STANDARD.encode(
        json!({
            "v": [0, 1],
            "d": {"ty": "Browser", "ac": "33", "ap": "2827902", "id": "5f474d64b9cc9b2a",
                  "tr": "6e2fea0b173fdad0", "ti": 1518469636035u64}
        })
        .to_string(),
    );
    let value = stdout_json(&run(&["newrelic", &header, "--json"]));
    assert_eq!(value["parent_type"], json!("Browser"));
    assert_eq!(value["trace_id"], json!("6e2fea0b173fdad0"));
    assert_eq!(value["span_id"], json!("5f474d64b9cc9b2a"));
}

#[test]
fn demo_harvests_both_sides_of_each_call() {
    let value = stdout_json(&run(&["demo", "--transactions", "3", "--json"]));
    assert_eq!(value["transactions"], json!(6));
    let names: Vec<&str> = value["metrics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m[0]["name"].as_str())
        .collect();
    assert!(names.contains(&"External/inventory.internal/all"));
    assert!(names.contains(&"Datastore/Postgres/all"));
    assert!(names.contains(&"DurationByCaller/App/1/1/HTTPS/all"));
}
