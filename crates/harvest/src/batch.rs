use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex};

use apm_core::{ApmError, Result};
use apm_trace::{Metrics, SlowQueryReservoir};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Clone)]
pub struct HarvestBatch {
    pub begin_ms: u64,
    pub end_ms: u64,
    pub transactions: usize,
    pub dropped: usize,
    pub metrics: Metrics,
    pub slowest_trace: Option<Value>,
    pub slow_queries: Option<SlowQueryReservoir>,
}

impl HarvestBatch {
    pub fn is_empty(&self) -> bool {
        self.transactions == 0 && self.metrics.is_empty()
    }

    pub fn to_json(&self) -> Result<Value> {
        let slow_sql = match &self.slow_queries {
            Some(reservoir) => reservoir.prepare_json()?,
            None => json!([]),
        };
        Ok(json!({
            "begin": self.begin_ms,
            "end": self.end_ms,
            "transactions": self.transactions,
            "dropped": self.dropped,
            "metrics": self.metrics.to_json(),
            "transaction_traces": self.slowest_trace.iter().collect::<Vec<_>>(),
            "slow_sql": slow_sql,
        }))
    }

    pub fn encode_gzip(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(&self.to_json()?)
            .map_err(|e| ApmError::Internal(format!("harvest json: {e}")))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        Ok(encoder.finish()?)
    }
}

pub trait HarvestSink: Send + Sync + 'static {
    fn deliver(&self, batch: &HarvestBatch) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl HarvestSink for LogSink {
    async fn deliver(&self, batch: &HarvestBatch) -> Result<()> {
        info!(
            transactions = batch.transactions,
            dropped = batch.dropped,
            metrics = batch.metrics.len(),
            has_trace = batch.slowest_trace.is_some(),
            slow_queries = batch.slow_queries.as_ref().map_or(0, |r| r.len()),
            "harvest"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<HarvestBatch>>>,
}

impl MemorySink {
    pub fn batches(&self) -> Vec<HarvestBatch> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }
}

impl HarvestSink for MemorySink {
    async fn deliver(&self, batch: &HarvestBatch) -> Result<()> {
        self.batches
            .lock()
            .map_err(|_| ApmError::Internal("memory sink lock poisoned".into()))?
            .push(batch.clone());
        Ok(())
    }
}
