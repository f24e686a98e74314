pub mod attributes;
pub mod codec;
pub mod context;
pub mod distributed;
pub mod errors;
pub mod metrics;
pub mod recorders;
pub mod sampler;
pub mod slow_query;
pub mod stats;
pub mod timer;
pub mod trace;
pub mod tracer;
pub mod transaction;

pub use attributes::{AttrValue, Attributes};
pub use context::{Context, SegmentFactory};
pub use distributed::{DistributedTraceState, Extractor, Injector, TransportType};
pub use errors::{CapturedError, Exception};
pub use metrics::Metrics;
pub use recorders::Recorder;
pub use sampler::AdaptiveSampler;
pub use slow_query::{QuerySample, SlowQuery, SlowQueryReservoir};
pub use stats::{ApdexStats, ApdexZone, Stats};
pub use timer::Timer;
pub use trace::{PayloadEncoding, Segment, SegmentHandle, Trace, TraceInfo};
pub use tracer::{Tracer, TransactionListener};
pub use transaction::{FinishedTransaction, Transaction, TransactionKind};
