use super::exclusive_ms;
use crate::attributes::AttrValue;
use crate::metrics::Metrics;
use crate::trace::Segment;
use crate::transaction::Transaction;

pub const OPERATION_PREFIX: &str = "Datastore/operation/";
pub const HOST_ATTRIBUTE: &str = "host";
pub const PORT_ATTRIBUTE: &str = "port_path_or_id";

pub fn record_datastore(
    segment: &Segment,
    scope: Option<&str>,
    transaction: &Transaction,
    metrics: &mut Metrics,
) {
    let duration = segment.duration_ms();
    let exclusive = Some(exclusive_ms(segment));
    let product = product_of(segment.name());
    let suffix = transaction.kind().all_suffix();

    if let Some(scope) = scope {
        metrics.measure_milliseconds(segment.name(), Some(scope), duration, exclusive);
    }
    metrics.measure_milliseconds(segment.name(), None, duration, exclusive);
    metrics.measure_milliseconds(&format!("Datastore/{product}/all"), None, duration, exclusive);
    metrics.measure_milliseconds(
        &format!("Datastore/{product}/{suffix}"),
        None,
        duration,
        exclusive,
    );
    metrics.measure_milliseconds("Datastore/all", None, duration, exclusive);
    metrics.measure_milliseconds(&format!("Datastore/{suffix}"), None, duration, exclusive);

    let host = segment.attribute(HOST_ATTRIBUTE).and_then(attr_text);
    let port = segment.attribute(PORT_ATTRIBUTE).and_then(attr_text);
    if let (Some(host), Some(port)) = (host, port) {
        metrics.measure_milliseconds(
            &format!("Datastore/instance/{product}/{host}/{port}"),
            None,
            duration,
            exclusive,
        );
    }
}

pub fn product_of(name: &str) -> &str {
    name.strip_prefix(OPERATION_PREFIX)
        .and_then(|rest| rest.split('/').next())
        .filter(|product| !product.is_empty())
        .unwrap_or("Unknown")
}

fn attr_text(value: &AttrValue) -> Option<String> {
    match value {
        AttrValue::Int(port) => Some(port.to_string()),
        other => other.as_str().map(str::to_string),
    }
}
