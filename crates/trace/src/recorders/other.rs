use super::{exclusive_ms, is_base_segment, record_distributed_trace};
use crate::metrics::Metrics;
use crate::trace::Segment;
use crate::transaction::Transaction;

pub fn record_background(
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

    if let Some(scope) = scope {
        metrics.measure_milliseconds(scope, None, duration, Some(exclusive));
    }
    metrics.measure_milliseconds(
        &format!("OtherTransactionTotalTime/{}", transaction.partial_name()),
        None,
        total,
        Some(total),
    );
    metrics.measure_milliseconds("OtherTransaction/all", None, duration, Some(exclusive));
    metrics.measure_milliseconds("OtherTransactionTotalTime", None, total, Some(total));

    record_distributed_trace(transaction, duration, metrics);
}
