use super::exclusive_ms;
use crate::metrics::Metrics;
use crate::trace::Segment;
use crate::transaction::Transaction;

pub fn record_generic(
    segment: &Segment,
    scope: Option<&str>,
    _transaction: &Transaction,
    metrics: &mut Metrics,
) {
    let duration = segment.duration_ms();
    let exclusive = exclusive_ms(segment);
    if let Some(scope) = scope {
        metrics.measure_milliseconds(segment.name(), Some(scope), duration, Some(exclusive));
    }
    metrics.measure_milliseconds(segment.name(), None, duration, Some(exclusive));
}
