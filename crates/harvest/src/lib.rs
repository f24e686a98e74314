pub mod batch;
pub mod pipeline;
pub mod registry;

pub use batch::{HarvestBatch, HarvestSink, LogSink, MemorySink};
pub use pipeline::{HarvestPipeline, PipelineConfig};
pub use registry::MetricRegistry;
