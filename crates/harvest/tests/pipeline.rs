use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use apm_core::config::Config;
use apm_core::{ApmError, Result};
use apm_harvest::{HarvestBatch, HarvestPipeline, HarvestSink, MemorySink, PipelineConfig};
use apm_trace::{Tracer, TransactionKind};
use serde_json::json;
use testkit::pin;

fn start<S: HarvestSink>(config: Config, sink: S) -> (Tracer, HarvestPipeline) {
    start_with(config, sink, PipelineConfig::default())
}

fn start_with<S: HarvestSink>(
    config: Config,
    sink: S,
    pipeline_config: PipelineConfig,
) -> (Tracer, HarvestPipeline) {
    let tracer = Tracer::new(config);
    let (pipeline, _handle) = HarvestPipeline::spawn(
        tracer.config().clone(),
        tracer.sampler().clone(),
        sink,
        pipeline_config,
    )
    .unwrap();
    let tracer = tracer.with_listener(Arc::new(pipeline.clone()));
    (tracer, pipeline)
}

fn run_web(tracer: &Tracer, name: &str, duration_ms: f64) {
    let mut tx = tracer.start_transaction(TransactionKind::Web);
    tx.set_name(name);
    let root = tx.trace().root();
    let base = tx.base_segment().unwrap();
    pin(tx.trace_mut(), root, 0.0, duration_ms);
    pin(tx.trace_mut(), base, 0.0, duration_ms);
    tx.end();
}

#[derive(Clone, Default)]
struct FlakySink {
    fail_next: Arc<AtomicBool>,
    inner: MemorySink,
}

impl HarvestSink for FlakySink {
    async fn deliver(&self, batch: &HarvestBatch) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ApmError::Io("collector unavailable".into()));
        }
        self.inner.deliver(batch).await
    }
}

#[tokio::test]
async fn metrics_merge_across_transactions() -> anyhow::Result<()> {
    let sink = MemorySink::default();
    let (tracer, pipeline) = start(Config::default(), sink.clone());
    for _ in 0..3 {
        run_web(&tracer, "Uri/orders", 20.0);
    }
    pipeline.flush().await?;

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].transactions, 3);
    let stats = batches[0]
        .metrics
        .get_metric("WebTransaction/Uri/orders", None)
        .unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(
        batches[0].metrics.get_apdex_metric("Apdex/Uri/orders").unwrap().buckets(),
        [3, 0, 0]
    );

    // Nothing new arrived, so the next harvest is skipped.
    pipeline.flush().await?;
    assert_eq!(sink.batches().len(), 1);
    assert!(pipeline.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn slowest_transaction_trace_is_kept() -> anyhow::Result<()> {
    let sink = MemorySink::default();
    let (tracer, pipeline) = start(Config::default(), sink.clone());
    run_web(&tracer, "Uri/fast", 10.0);
    run_web(&tracer, "Uri/slowest", 50.0);
    run_web(&tracer, "Uri/medium", 20.0);
    pipeline.flush().await?;

    let batches = sink.batches();
    let trace = batches[0].slowest_trace.as_ref().unwrap();
    assert_eq!(trace[1], json!(50.0));
    assert_eq!(trace[2], json!("WebTransaction/Uri/slowest"));
    assert_eq!(batches[0].to_json()?["transaction_traces"][0], *trace);
    Ok(())
}

#[tokio::test]
async fn failed_delivery_is_folded_into_next_harvest() -> anyhow::Result<()> {
    let sink = FlakySink::default();
    sink.fail_next.store(true, Ordering::SeqCst);
    let (tracer, pipeline) = start(Config::default(), sink.clone());

    run_web(&tracer, "Uri/orders", 20.0);
    pipeline.flush().await?;
    assert!(sink.inner.batches().is_empty());

    run_web(&tracer, "Uri/orders", 30.0);
    pipeline.flush().await?;
    let batches = sink.inner.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].transactions, 2);
    assert_eq!(
        batches[0]
            .metrics
            .get_metric("WebTransaction/Uri/orders", None)
            .unwrap()
            .count,
        2
    );
    Ok(())
}

#[tokio::test]
async fn slow_queries_are_collected_when_enabled() -> anyhow::Result<()> {
    let config = Config {
        slow_sql_enabled: true,
        explain_threshold: Duration::from_millis(1),
        ..Config::default()
    };
    let sink = MemorySink::default();
    let (tracer, pipeline) = start(config, sink.clone());

    let mut tx = tracer.start_transaction(TransactionKind::Web);
    tx.set_name("Uri/orders");
    let query = tx
        .add_segment("Datastore/statement/Postgres/orders/select", None, None)
        .unwrap();
    tx.segment_mut(query)
        .unwrap()
        .add_attribute("sql", "SELECT * FROM orders WHERE id = 7");
    pin(tx.trace_mut(), query, 0.0, 30.0);
    tx.end();
    pipeline.flush().await?;

    let batches = sink.batches();
    let reservoir = batches[0].slow_queries.as_ref().unwrap();
    assert_eq!(reservoir.len(), 1);
    let body = batches[0].to_json()?;
    assert_eq!(body["slow_sql"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn shutdown_flushes_and_stops() -> anyhow::Result<()> {
    let sink = MemorySink::default();
    let tracer = Tracer::new(Config::default());
    let (pipeline, handle) = HarvestPipeline::spawn(
        tracer.config().clone(),
        tracer.sampler().clone(),
        sink.clone(),
        PipelineConfig::default(),
    )?;
    let tracer = tracer.with_listener(Arc::new(pipeline.clone()));
    run_web(&tracer, "Uri/orders", 20.0);

    pipeline.shutdown().await?;
    handle.await?;
    assert_eq!(sink.batches().len(), 1);
    assert!(pipeline.flush().await.is_err());
    Ok(())
}

#[tokio::test]
async fn dropped_count_survives_failed_delivery() -> anyhow::Result<()> {
    let sink = FlakySink::default();
    sink.fail_next.store(true, Ordering::SeqCst);
    let (tracer, pipeline) = start_with(
        Config::default(),
        sink.clone(),
        PipelineConfig {
            channel_capacity: 1,
            ..PipelineConfig::default()
        },
    );

    // The aggregator cannot run between these, so only the first one fits.
    for _ in 0..3 {
        run_web(&tracer, "Uri/orders", 20.0);
    }
    assert_eq!(pipeline.dropped(), 2);

    pipeline.flush().await?;
    assert!(sink.inner.batches().is_empty());
    assert_eq!(pipeline.dropped(), 2);

    pipeline.flush().await?;
    let batches = sink.inner.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].transactions, 1);
    assert_eq!(batches[0].dropped, 2);
    assert_eq!(pipeline.dropped(), 0);
    Ok(())
}

#[tokio::test]
async fn zero_periods_are_refused() {
    let tracer = Tracer::new(Config {
        sampling_period: Duration::ZERO,
        ..Config::default()
    });
    let err = HarvestPipeline::spawn(
        tracer.config().clone(),
        tracer.sampler().clone(),
        MemorySink::default(),
        PipelineConfig::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, ApmError::InvalidArgument(_)));

    let tracer = Tracer::new(Config::default());
    let result = HarvestPipeline::spawn(
        tracer.config().clone(),
        tracer.sampler().clone(),
        MemorySink::default(),
        PipelineConfig {
            flush_interval: Duration::ZERO,
            ..PipelineConfig::default()
        },
    );
    assert!(matches!(result, Err(ApmError::InvalidArgument(_))));
}
