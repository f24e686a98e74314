use std::collections::BTreeMap;

use apm_core::config::Config;
use apm_trace::attributes::CIRCULAR_PLACEHOLDER;
use apm_trace::{
    AttrValue, Attributes, FinishedTransaction, PayloadEncoding, SlowQueryReservoir,
    TransactionKind, codec,
};
use serde_json::{Value, json};
use testkit::{overlapping_children_trace, pin, transaction};

fn finished_web(config: Config) -> FinishedTransaction {
    let mut tx = transaction(TransactionKind::Web, config);
    tx.set_name("Uri/orders");
    tx.set_url("/orders");
    let base = tx.base_segment().unwrap();
    let query = tx
        .add_segment("Datastore/statement/Postgres/orders/select", None, None)
        .unwrap();
    tx.segment_mut(query)
        .unwrap()
        .add_attribute("sql", "SELECT * FROM orders WHERE id = 7");
    let root = tx.trace().root();
    pin(tx.trace_mut(), root, 0.0, 40.0);
    pin(tx.trace_mut(), base, 0.0, 40.0);
    pin(tx.trace_mut(), query, 10.0, 25.0);
    tx.end()
}

#[test]
fn exclusive_time_of_overlapping_children() {
    let (mut trace, children) = overlapping_children_trace();
    assert_eq!(trace.exclusive_duration_ms(trace.root()), 5.0);
    trace.end();
    assert_eq!(trace.root_segment().finalized_exclusive_ms(), Some(5.0));
    assert_eq!(
        trace.segment(children[0]).unwrap().finalized_exclusive_ms(),
        Some(22.0)
    );
}

#[tokio::test]
async fn trace_payload_round_trips_in_both_modes() {
    for simple_compression in [false, true] {
        let finished = finished_web(Config {
            simple_compression,
            ..Config::default()
        });
        let sync = finished.trace_json().unwrap();
        let asynchronous = finished.trace_json_async().await.unwrap();
        assert_eq!(sync, asynchronous);

        let body = match &sync[4] {
            Value::String(encoded) => codec::decode(encoded).unwrap(),
            raw => raw.clone(),
        };
        assert_eq!(simple_compression, !sync[4].is_string());

        let root = &body[3];
        assert_eq!(root[2], json!("ROOT"));
        let base = &root[4][0];
        assert_eq!(base[2], json!("WebTransaction/Uri/orders"));
        let query = &base[4][0];
        assert_eq!(query[0], json!(10.0));
        assert_eq!(query[1], json!(35.0));
        assert_eq!(
            query[3]["sql"],
            json!("SELECT * FROM orders WHERE id = 7")
        );
        assert_eq!(body[4]["intrinsics"]["guid"], json!(finished.id));
        assert_eq!(sync[3], json!("/orders"));
    }
}

#[test]
fn self_referential_attributes_encode_with_placeholder() {
    let (value, shared) = AttrValue::shared(Attributes::new());
    shared
        .lock()
        .unwrap()
        .insert("self".to_string(), value.clone());
    shared
        .lock()
        .unwrap()
        .insert("route".to_string(), AttrValue::from("/orders"));

    let mut attrs = BTreeMap::new();
    attrs.insert("ctx".to_string(), value);
    let json = apm_trace::attributes::attributes_to_json(&attrs);
    let decoded = codec::decode(&codec::encode(&json).unwrap()).unwrap();
    assert_eq!(decoded["ctx"]["self"], json!(CIRCULAR_PLACEHOLDER));
    assert_eq!(decoded["ctx"]["route"], json!("/orders"));

    // Break the cycle so the test does not leak.
    shared.lock().unwrap().clear();
}

#[test]
fn truncation_keeps_timing_for_uncollected_segments() {
    let config = Config {
        max_trace_segments: 900,
        ..Config::default()
    };
    let mut tx = transaction(TransactionKind::Background, config);
    // The base segment counts toward the cap.
    for i in 0..949 {
        let handle = tx.add_segment(format!("Custom/work/{i}"), None, None).unwrap();
        tx.end_segment(handle);
    }
    let finished = tx.end();
    let trace = &finished.trace;
    let collected = trace.iter().skip(1).filter(|(_, s)| s.collect()).count();
    assert_eq!(trace.segments_seen(), 950);
    assert_eq!(collected, 900);
    assert_eq!(trace.len() - 1 - collected, 50);

    let body = trace
        .generate_json(&finished.trace_info(), PayloadEncoding::Raw)
        .unwrap();
    let base = &body[4][3][4][0];
    assert_eq!(base[4].as_array().unwrap().len(), 899);
}

#[test]
fn apdex_buckets_by_duration_and_status() {
    let cases: [(f64, Option<u16>, Option<[u64; 3]>); 6] = [
        (50.0, Some(200), Some([1, 0, 0])),
        (100.0, Some(200), Some([1, 0, 0])),
        (300.0, Some(200), Some([0, 1, 0])),
        (500.0, Some(200), Some([0, 0, 1])),
        (10.0, Some(500), Some([0, 0, 1])),
        (10.0, Some(404), None),
    ];
    for (duration, status, expected) in cases {
        let mut tx = transaction(TransactionKind::Web, Config::default());
        tx.set_name("Uri/apdex");
        if let Some(status) = status {
            tx.set_status_code(status);
        }
        let base = tx.base_segment().unwrap();
        pin(tx.trace_mut(), base, 0.0, duration);
        let finished = tx.end();
        let apdex = finished.metrics.get_apdex_metric("Apdex/Uri/apdex");
        assert_eq!(apdex.map(|a| a.buckets()), expected, "{duration}ms {status:?}");
    }
}

#[test]
fn slow_query_reservoir_keeps_slowest_of_two() {
    let config = Config {
        explain_threshold: std::time::Duration::from_millis(1),
        ..Config::default()
    };
    let mut reservoir = SlowQueryReservoir::new(&config);
    for duration in [3.0, 30.0] {
        let mut tx = transaction(TransactionKind::Web, config.clone());
        let query = tx
            .add_segment("Datastore/statement/Postgres/orders/select", None, None)
            .unwrap();
        tx.segment_mut(query)
            .unwrap()
            .add_attribute("sql", format!("SELECT * FROM orders WHERE id = {duration}"));
        pin(tx.trace_mut(), query, 0.0, duration);
        reservoir.collect_from(&tx.end());
    }

    assert_eq!(reservoir.len(), 1);
    let sample = reservoir.get("select * from orders where id = ?").unwrap();
    assert_eq!(sample.stats.count, 2);
    assert_eq!(sample.stats.max, 0.03);
    assert_eq!(sample.sample.duration_ms, 30.0);
}
