use crate::metrics::Metrics;
use crate::transaction::Transaction;

const UNKNOWN: &str = "Unknown";

pub fn record_distributed_trace(transaction: &Transaction, duration_ms: f64, metrics: &mut Metrics) {
    let state = transaction.distributed_trace();
    let inbound = state.inbound();
    let payload = state.accepted_payload();

    let tag = match payload {
        Some(payload) => format!(
            "{}/{}/{}/{}",
            payload.parent_type.as_str(),
            payload.account_id,
            payload.app_id,
            inbound.map(|i| i.transport.as_str()).unwrap_or(UNKNOWN),
        ),
        None => format!("{UNKNOWN}/{UNKNOWN}/{UNKNOWN}/{UNKNOWN}"),
    };
    let suffix = transaction.kind().all_suffix();

    for bucket in ["all", suffix] {
        metrics.measure_milliseconds(
            &format!("DurationByCaller/{tag}/{bucket}"),
            None,
            duration_ms,
            Some(duration_ms),
        );
        if transaction.has_errors() {
            metrics
                .get_or_create_metric(&format!("ErrorsByCaller/{tag}/{bucket}"), None)
                .increment_call_count(1);
        }
        if let (Some(inbound), Some(_)) = (inbound, payload) {
            metrics.measure_milliseconds(
                &format!("TransportDuration/{tag}/{bucket}"),
                None,
                inbound.transport_duration_ms,
                Some(inbound.transport_duration_ms),
            );
        }
    }
}
