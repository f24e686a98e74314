use super::exclusive_ms;
use crate::metrics::Metrics;
use crate::trace::Segment;
use crate::transaction::Transaction;

pub const EXTERNAL_PREFIX: &str = "External/";

pub fn record_external(
    segment: &Segment,
    scope: Option<&str>,
    transaction: &Transaction,
    metrics: &mut Metrics,
) {
    let duration = segment.duration_ms();
    let exclusive = exclusive_ms(segment);
    let host = segment
        .name()
        .strip_prefix(EXTERNAL_PREFIX)
        .and_then(|rest| rest.split('/').next())
        .filter(|host| !host.is_empty())
        .unwrap_or("Unknown");

    metrics.measure_milliseconds(
        &format!("{EXTERNAL_PREFIX}{host}/all"),
        None,
        duration,
        Some(exclusive),
    );
    metrics.measure_milliseconds("External/all", None, duration, Some(exclusive));
    metrics.measure_milliseconds(
        &format!("External/{}", transaction.kind().all_suffix()),
        None,
        duration,
        Some(exclusive),
    );
    if let Some(scope) = scope {
        metrics.measure_milliseconds(segment.name(), Some(scope), duration, Some(exclusive));
    }
}
