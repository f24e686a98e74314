use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use apm_core::config::Config;
use apm_core::time::now_millis;
use apm_core::{ApmError, Result};
use apm_trace::{AdaptiveSampler, FinishedTransaction, SlowQueryReservoir, TransactionListener};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use crate::batch::{HarvestBatch, HarvestSink};
use crate::registry::MetricRegistry;

pub struct PipelineConfig {
    pub channel_capacity: usize,
    pub flush_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            flush_interval: Duration::from_secs(60),
        }
    }
}

enum Message {
    Transaction(Box<FinishedTransaction>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct HarvestPipeline {
    tx: mpsc::Sender<Message>,
    registry: Arc<MetricRegistry>,
    dropped: Arc<AtomicUsize>,
}

impl HarvestPipeline {
    pub fn spawn<S: HarvestSink>(
        config: Arc<Config>,
        sampler: Arc<AdaptiveSampler>,
        sink: S,
        cfg: PipelineConfig,
    ) -> Result<(Self, JoinHandle<()>)> {
        if cfg.flush_interval.is_zero() {
            return Err(ApmError::InvalidArgument(
                "flush interval must be greater than zero".into(),
            ));
        }
        if config.sampling_period.is_zero() {
            return Err(ApmError::InvalidArgument(
                "sampling period must be greater than zero".into(),
            ));
        }
        if cfg.channel_capacity == 0 {
            return Err(ApmError::InvalidArgument(
                "channel capacity must be greater than zero".into(),
            ));
        }

        let (tx, rx) = mpsc::channel(cfg.channel_capacity);
        let registry = Arc::new(MetricRegistry::new(config.apdex_t_ms()));
        let dropped = Arc::new(AtomicUsize::new(0));

        let aggregator = Aggregator {
            sink,
            registry: registry.clone(),
            dropped: dropped.clone(),
            reservoir: SlowQueryReservoir::new(&config),
            slow_sql_enabled: config.slow_sql_enabled,
            slowest: None,
            transactions: 0,
            begin_ms: now_millis(),
        };
        let handle = tokio::spawn(run_aggregator(
            aggregator,
            rx,
            sampler,
            cfg.flush_interval,
            config.sampling_period,
        ));

        Ok((
            Self {
                tx,
                registry,
                dropped,
            },
            handle,
        ))
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Message::Flush(done_tx)).await?;
        done_rx
            .await
            .map_err(|_| ApmError::Internal("harvest pipeline stopped".into()))
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Message::Shutdown(done_tx)).await?;
        done_rx
            .await
            .map_err(|_| ApmError::Internal("harvest pipeline stopped".into()))
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ApmError::Internal("harvest pipeline stopped".into()))
    }
}

impl TransactionListener for HarvestPipeline {
    fn on_transaction_finished(&self, transaction: &FinishedTransaction) {
        let message = Message::Transaction(Box::new(transaction.clone()));
        if self.tx.try_send(message).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(transaction = %transaction.id, "harvest pipeline dropped transaction");
        }
    }
}

struct Aggregator<S> {
    sink: S,
    registry: Arc<MetricRegistry>,
    dropped: Arc<AtomicUsize>,
    reservoir: SlowQueryReservoir,
    slow_sql_enabled: bool,
    slowest: Option<Box<FinishedTransaction>>,
    transactions: usize,
    begin_ms: u64,
}

impl<S: HarvestSink> Aggregator<S> {
    fn record(&mut self, transaction: Box<FinishedTransaction>) {
        self.transactions += 1;
        if let Err(e) = self.registry.merge(&transaction.metrics) {
            warn!(error = %e, "failed merging transaction metrics");
        }
        if self.slow_sql_enabled {
            self.reservoir.collect_from(&transaction);
        }
        let slower = self
            .slowest
            .as_ref()
            .is_none_or(|current| transaction.duration_ms() > current.duration_ms());
        if slower {
            self.slowest = Some(transaction);
        }
    }

    async fn harvest(&mut self) {
        let metrics = match self.registry.take() {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "failed taking metrics");
                return;
            }
        };
        let slowest_trace = match self.slowest.take() {
            Some(transaction) => match transaction.trace_json_async().await {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!(transaction = %transaction.id, error = %e, "failed encoding trace");
                    None
                }
            },
            None => None,
        };
        let queries = self.reservoir.take();
        let end_ms = now_millis();
        let batch = HarvestBatch {
            begin_ms: self.begin_ms,
            end_ms,
            transactions: std::mem::take(&mut self.transactions),
            dropped: self.dropped.swap(0, Ordering::Relaxed),
            metrics,
            slowest_trace,
            slow_queries: (!queries.is_empty()).then_some(queries),
        };
        if batch.is_empty() && batch.dropped == 0 {
            return;
        }

        match self.sink.deliver(&batch).await {
            Ok(()) => {
                self.begin_ms = end_ms;
                debug!(
                    transactions = batch.transactions,
                    metrics = batch.metrics.len(),
                    "harvest delivered"
                );
            }
            Err(e) => {
                warn!(error = %e, "harvest delivery failed; keeping data for next harvest");
                self.transactions += batch.transactions;
                self.dropped.fetch_add(batch.dropped, Ordering::Relaxed);
                if let Err(e) = self.registry.fold_back(batch.metrics) {
                    warn!(error = %e, "failed folding metrics back");
                }
                if let Some(queries) = batch.slow_queries {
                    self.reservoir.merge(queries);
                }
            }
        }
    }
}

async fn run_aggregator<S: HarvestSink>(
    mut aggregator: Aggregator<S>,
    mut rx: mpsc::Receiver<Message>,
    sampler: Arc<AdaptiveSampler>,
    flush_interval: Duration,
    sampling_period: Duration,
) {
    let mut flush_ticker = interval_at(Instant::now() + flush_interval, flush_interval);
    let mut period_ticker = interval_at(Instant::now() + sampling_period, sampling_period);
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(Message::Transaction(transaction)) => aggregator.record(transaction),
                Some(Message::Flush(done)) => {
                    aggregator.harvest().await;
                    let _ = done.send(());
                }
                Some(Message::Shutdown(done)) => {
                    aggregator.harvest().await;
                    let _ = done.send(());
                    break;
                }
                None => {
                    aggregator.harvest().await;
                    break;
                }
            },
            _ = flush_ticker.tick() => aggregator.harvest().await,
            _ = period_ticker.tick() => sampler.next_period(),
        }
    }
    debug!("harvest pipeline stopped");
}
