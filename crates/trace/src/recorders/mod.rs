pub mod datastore;
pub mod distributed;
pub mod external;
pub mod generic;
pub mod other;
pub mod web;

use crate::metrics::Metrics;
use crate::trace::Segment;
use crate::transaction::Transaction;

pub type Recorder = fn(&Segment, Option<&str>, &Transaction, &mut Metrics);

pub use datastore::record_datastore;
pub use distributed::record_distributed_trace;
pub use external::record_external;
pub use generic::record_generic;
pub use other::record_background;
pub use web::record_web;

pub(crate) fn exclusive_ms(segment: &Segment) -> f64 {
    segment
        .finalized_exclusive_ms()
        .unwrap_or_else(|| segment.duration_ms())
}

pub(crate) fn is_base_segment(segment: &Segment, transaction: &Transaction) -> bool {
    transaction
        .base_segment()
        .and_then(|handle| transaction.trace().segment(handle))
        .is_some_and(|base| base.id() == segment.id())
}
