use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use apm_core::config::Config;
use apm_trace::{
    AdaptiveSampler, FinishedTransaction, SegmentHandle, Trace, Transaction, TransactionKind,
    TransactionListener,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{TimeZone, Utc};

pub const ACCOUNT_ID: &str = "33";
pub const APP_ID: &str = "5043";
pub const TRUST_KEY: &str = "1";

pub fn base_epoch_ms() -> f64 {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0)
        .unwrap()
        .timestamp_millis() as f64
}

pub fn dt_config() -> Config {
    Config {
        account_id: Some(ACCOUNT_ID.to_string()),
        primary_application_id: Some(APP_ID.to_string()),
        trusted_account_key: Some(TRUST_KEY.to_string()),
        ..Config::default()
    }
}

pub fn transaction(kind: TransactionKind, config: Config) -> Transaction {
    let target = config.sampling_target;
    Transaction::new(kind, Arc::new(config), Arc::new(AdaptiveSampler::new(target)))
}

pub fn pin(trace: &mut Trace, handle: SegmentHandle, offset_ms: f64, duration_ms: f64) {
    trace
        .segment_mut(handle)
        .unwrap()
        .timer_mut()
        .set_duration_in_millis(duration_ms, Some(base_epoch_ms() + offset_ms));
}

pub fn overlapping_children_trace() -> (Trace, Vec<SegmentHandle>) {
    let mut trace = Trace::default();
    let root = trace.root();
    let children: Vec<SegmentHandle> = ["A", "B", "C", "D"]
        .into_iter()
        .map(|name| trace.add(name, None, None).unwrap())
        .collect();
    pin(&mut trace, root, 0.0, 42.0);
    for (handle, (offset, duration)) in children
        .iter()
        .zip([(0.0, 22.0), (5.0, 5.0), (11.0, 22.0), (35.0, 4.0)])
    {
        pin(&mut trace, *handle, offset, duration);
    }
    (trace, children)
}

pub fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn legacy_header(value: &serde_json::Value) -> String {
    STANDARD.encode(value.to_string())
}

#[derive(Default)]
pub struct RecordingListener {
    finished: Mutex<Vec<FinishedTransaction>>,
}

impl RecordingListener {
    pub fn finished(&self) -> Vec<FinishedTransaction> {
        self.finished.lock().unwrap().clone()
    }
}

impl TransactionListener for RecordingListener {
    fn on_transaction_finished(&self, transaction: &FinishedTransaction) {
        self.finished.lock().unwrap().push(transaction.clone());
    }
}
