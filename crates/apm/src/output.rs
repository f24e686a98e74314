use apm_harvest::HarvestBatch;
use apm_trace::distributed::payload::{TracePayload, format_priority};
use apm_trace::distributed::{TraceParent, TraceState};
use owo_colors::OwoColorize;
use serde_json::{Value, json};

pub fn payload_json(payload: &TracePayload) -> Value {
    json!({
        "version": [payload.version.0, payload.version.1],
        "parent_type": payload.parent_type.as_str(),
        "account_id": payload.account_id,
        "app_id": payload.app_id,
        "transaction_id": payload.transaction_id,
        "span_id": payload.span_id,
        "trace_id": payload.trace_id,
        "sampled": payload.sampled,
        "priority": payload.priority,
        "timestamp": payload.timestamp,
        "trusted_account_key": payload.trusted_account_key,
    })
}

pub fn traceparent_json(parent: &TraceParent) -> Value {
    json!({
        "trace_id": parent.trace_id,
        "parent_id": parent.parent_id,
        "flags": parent.flags,
        "sampled": parent.sampled(),
    })
}

pub fn print_traceparent_human(parent: &TraceParent) {
    println!("trace_id={}", parent.trace_id);
    println!("parent_id={}", parent.parent_id);
    println!("flags={:02x} sampled={}", parent.flags, parent.sampled());
}

pub fn print_payload_human(payload: &TracePayload) {
    let dash = || "-".to_string();
    println!(
        "version={}.{} type={} account={} app={}",
        payload.version.0,
        payload.version.1,
        payload.parent_type.as_str(),
        payload.account_id,
        payload.app_id
    );
    println!(
        "trace={} tx={} span={}",
        payload.trace_id.clone().unwrap_or_else(dash),
        payload.transaction_id.clone().unwrap_or_else(dash),
        payload.span_id.clone().unwrap_or_else(dash)
    );
    println!(
        "sampled={} priority={} timestamp={}",
        payload
            .sampled
            .map(|s| s.to_string())
            .unwrap_or_else(dash),
        payload.priority.map(format_priority).unwrap_or_else(dash),
        payload.timestamp
    );
    if let Some(key) = &payload.trusted_account_key {
        println!("trust_key={key}");
    }
}

pub fn print_tracestate_human(state: &TraceState, entry: Option<&TracePayload>) {
    match entry {
        Some(payload) => print_payload_human(payload),
        None => println!("no trusted entry"),
    }
    for vendor in &state.vendors {
        println!("vendor {vendor}");
    }
    println!("-- {} other vendors --", state.vendors.len());
}

pub fn print_batch_human(batch: &HarvestBatch) {
    println!(
        "HARVEST transactions={} dropped={} metrics={}",
        batch.transactions,
        batch.dropped,
        batch.metrics.len()
    );
    for name in batch.metrics.unscoped_names() {
        if let Some(stats) = batch.metrics.get_metric(name, None) {
            println!(
                "{} count={} total={:.3}s",
                name.cyan(),
                stats.count,
                stats.total
            );
        }
    }
    if let Some(trace) = &batch.slowest_trace {
        println!(
            "slowest trace: {} {}ms",
            trace[2].as_str().unwrap_or("-").green(),
            trace[1]
        );
    }
    if let Some(queries) = &batch.slow_queries {
        println!("slow queries: {}", queries.len().yellow());
    }
}
