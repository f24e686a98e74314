use super::{exclusive_ms, is_base_segment, record_distributed_trace};
use crate::metrics::Metrics;
use crate::stats::ApdexZone;
use crate::trace::Segment;
use crate::transaction::Transaction;

pub fn record_web(
    segment: &Segment,
    scope: Option<&str>,
    transaction: &Transaction,
    metrics: &mut Metrics,
) {
    if !is_base_segment(segment, transaction) {
        return;
    }
    let duration = segment.duration_ms();
    let exclusive = exclusive_ms(segment);
    let total = transaction.trace().total_time_ms();
    let partial = transaction.partial_name();

    metrics.measure_milliseconds("WebTransaction", None, duration, Some(exclusive));
    metrics.measure_milliseconds("WebTransactionTotalTime", None, total, Some(total));
    metrics.measure_milliseconds("HttpDispatcher", None, duration, None);
    if let Some(scope) = scope {
        metrics.measure_milliseconds(scope, None, duration, Some(exclusive));
    }
    metrics.measure_milliseconds(
        &format!("WebTransactionTotalTime/{partial}"),
        None,
        total,
        Some(total),
    );

    let queue_time = transaction.queue_time_ms();
    if queue_time > 0.0 {
        metrics.measure_milliseconds("WebFrontend/QueueTime", None, queue_time, Some(queue_time));
    }

    if let Some(zone) = apdex_zone(transaction, duration) {
        let apdex_t = transaction.apdex_t_ms();
        metrics
            .get_or_create_apdex_metric(&format!("Apdex/{partial}"), apdex_t)
            .increment(zone);
        metrics
            .get_or_create_apdex_metric("Apdex", None)
            .increment(zone);
    }

    record_distributed_trace(transaction, duration, metrics);
}

pub fn apdex_zone(transaction: &Transaction, duration_ms: f64) -> Option<ApdexZone> {
    let config = transaction.config();
    if let Some(status) = transaction.status_code() {
        if config.is_ignored_status(status) {
            return None;
        }
        if status >= 400 {
            return Some(ApdexZone::Frustrating);
        }
    }
    if transaction.has_errors() {
        return Some(ApdexZone::Frustrating);
    }
    let apdex_t = transaction
        .apdex_t_ms()
        .unwrap_or_else(|| config.apdex_t_ms());
    Some(ApdexZone::classify(duration_ms, apdex_t))
}
