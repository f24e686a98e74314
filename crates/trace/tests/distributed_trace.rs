use std::collections::HashMap;

use apm_trace::distributed::{NEWRELIC_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER, TraceParent};
use apm_trace::{TransactionKind, TransportType};
use serde_json::json;
use testkit::{ACCOUNT_ID, APP_ID, dt_config, headers, legacy_header, transaction};

#[test]
fn headers_round_trip_between_transactions() {
    let mut upstream = transaction(TransactionKind::Web, dt_config());
    assert!(upstream.force_sampled(true));
    let call = upstream
        .add_segment("External/downstream/orders", None, None)
        .unwrap();
    let mut outbound: HashMap<String, String> = HashMap::new();
    upstream.insert_distributed_trace_headers(Some(call), &mut outbound);

    let mut downstream = transaction(TransactionKind::Web, dt_config());
    assert!(downstream.accept_distributed_trace_headers(TransportType::Https, &outbound));

    assert_eq!(downstream.trace_id(), upstream.trace_id());
    assert_eq!(downstream.current_sampled(), Some(true));
    assert_eq!(downstream.current_priority(), Some(2.0));

    let payload = downstream
        .distributed_trace()
        .accepted_payload()
        .unwrap()
        .clone();
    assert_eq!(payload.account_id, ACCOUNT_ID);
    assert_eq!(payload.app_id, APP_ID);
    assert_eq!(payload.transaction_id.as_deref(), Some(upstream.id().as_str()));

    let parent = TraceParent::parse(&outbound[TRACEPARENT_HEADER]).unwrap();
    assert_eq!(
        parent.parent_id,
        upstream.segment(call).unwrap().id().as_str()
    );

    let finished = downstream.end();
    let caller = format!("App/{ACCOUNT_ID}/{APP_ID}/HTTPS");
    assert!(
        finished
            .metrics
            .get_metric(&format!("DurationByCaller/{caller}/all"), None)
            .is_some()
    );
    assert!(
        finished
            .metrics
            .get_metric(&format!("TransportDuration/{caller}/allWeb"), None)
            .is_some()
    );
    assert_eq!(finished.intrinsics()["parent.app"], json!(APP_ID));
}

#[test]
fn legacy_header_alone_is_accepted() {
    let mut upstream = transaction(TransactionKind::Background, dt_config());
    let mut outbound: HashMap<String, String> = HashMap::new();
    upstream.insert_distributed_trace_headers(None, &mut outbound);
    outbound.remove(TRACEPARENT_HEADER);
    outbound.remove(TRACESTATE_HEADER);

    let mut downstream = transaction(TransactionKind::Message, dt_config());
    assert!(downstream.accept_distributed_trace_headers(TransportType::Kafka, &outbound));
    assert_eq!(downstream.trace_id(), upstream.trace_id());
    let inbound = downstream.distributed_trace().inbound().unwrap();
    assert!(!inbound.via_trace_context);
}

#[test]
fn malformed_headers_leave_transaction_untraced() {
    let carrier = headers(&[
        (TRACEPARENT_HEADER, "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7"),
        (NEWRELIC_HEADER, "%%% not base64 %%%"),
    ]);
    let mut tx = transaction(TransactionKind::Web, dt_config());
    let original_trace_id = tx.trace_id().to_string();
    assert!(!tx.accept_distributed_trace_headers(TransportType::Http, &carrier));
    assert_eq!(tx.trace_id(), original_trace_id);

    let finished = tx.end();
    assert!(
        finished
            .metrics
            .get_metric("Supportability/DistributedTrace/AcceptPayload/ParseException", None)
            .is_some()
    );
    assert!(
        finished
            .metrics
            .get_metric("DurationByCaller/Unknown/Unknown/Unknown/Unknown/all", None)
            .is_some()
    );
}

#[test]
fn mismatched_trust_key_is_ignored() {
    let header = legacy_header(&json!({
        "v": [0, 1],
        "d": {"ty": "App", "ac": "77", "ap": "1", "tx": "7a9e3b9ec2e4b7d8",
              "tr": "d6b4ba0c3a712ca", "ti": 1518469636035u64, "tk": "77"}
    }));
    let carrier = headers(&[(NEWRELIC_HEADER, &header)]);
    let mut tx = transaction(TransactionKind::Web, dt_config());
    assert!(!tx.accept_distributed_trace_headers(TransportType::Http, &carrier));
    assert!(tx.distributed_trace().inbound().is_none());
}

#[test]
fn priority_cannot_change_after_decision() {
    let mut tx = transaction(TransactionKind::Web, dt_config());
    let decided = tx.priority();

    let header = legacy_header(&json!({
        "v": [0, 1],
        "d": {"ty": "App", "ac": ACCOUNT_ID, "ap": APP_ID, "tx": "7a9e3b9ec2e4b7d8",
              "tr": "d6b4ba0c3a712ca", "ti": 1518469636035u64, "tk": "1",
              "sa": true, "pr": 1.75}
    }));
    let carrier = headers(&[(NEWRELIC_HEADER, &header)]);
    assert!(tx.accept_distributed_trace_headers(TransportType::Http, &carrier));
    assert_eq!(tx.priority(), decided);
    assert_eq!(tx.trace_id(), "d6b4ba0c3a712ca");
}

#[test]
fn unsampled_upstream_decision_is_adopted() {
    let header = legacy_header(&json!({
        "v": [0, 1],
        "d": {"ty": "Mobile", "ac": ACCOUNT_ID, "ap": APP_ID, "id": "27856f70d3d314b7",
              "tr": "d6b4ba0c3a712ca", "ti": 1518469636035u64, "tk": "1",
              "sa": false, "pr": 0.25}
    }));
    let carrier = headers(&[(NEWRELIC_HEADER, &header)]);
    let mut tx = transaction(TransactionKind::Web, dt_config());
    assert!(tx.accept_distributed_trace_headers(TransportType::Http, &carrier));
    assert!(!tx.sampled());
    assert_eq!(tx.priority(), 0.25);
}
