mod output;
mod telemetry;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use apm_core::config::Config;
use apm_harvest::{HarvestPipeline, MemorySink, PipelineConfig};
use apm_trace::distributed::tracestate::parse_entry;
use apm_trace::distributed::{LegacyHeader, TraceParent, TraceState};
use apm_trace::recorders::{record_datastore, record_external};
use apm_trace::{Context, Tracer, TransactionKind, TransportType, codec};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use crate::output::{
    payload_json, print_batch_human, print_payload_human, print_traceparent_human,
    print_tracestate_human, traceparent_json,
};
use crate::telemetry::init_cli_tracing;

#[derive(Parser, Debug)]
#[command(name = "apm")]
#[command(about = "Inspect distributed tracing headers and compressed payloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Decode a base64 deflate payload into JSON")]
    Decode { payload: String },
    #[command(about = "Encode JSON into a base64 deflate payload")]
    Encode {
        #[arg(id = "input_json", value_name = "JSON")]
        json: String,
    },
    #[command(about = "Parse a W3C traceparent header")]
    Traceparent { header: String },
    #[command(about = "Parse a W3C tracestate header")]
    Tracestate {
        header: String,
        #[arg(long, help = "Trust key of the entry to extract (defaults to config)")]
        trust_key: Option<String>,
    },
    #[command(about = "Decode a legacy newrelic header")]
    Newrelic { header: String },
    #[command(about = "Run synthetic transactions through a tracer and print the harvest")]
    Demo {
        #[arg(long, default_value_t = 5)]
        transactions: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing();

    match cli.command {
        Commands::Decode { payload } => {
            let value = codec::decode(payload.trim()).context("decoding payload")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Commands::Encode { json } => {
            let value: Value = serde_json::from_str(&json).context("input is not JSON")?;
            println!("{}", codec::encode(&value)?);
            Ok(())
        }
        Commands::Traceparent { header } => {
            let parent = TraceParent::parse(&header)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&traceparent_json(&parent))?);
            } else {
                print_traceparent_human(&parent);
            }
            Ok(())
        }
        Commands::Tracestate { header, trust_key } => {
            let trust_key = match trust_key {
                Some(key) => key,
                None => Config::load()?
                    .trust_key()
                    .map(str::to_string)
                    .context("no trust key given and none configured")?,
            };
            let state = TraceState::parse(&header, &trust_key);
            let entry = state
                .entry
                .as_deref()
                .map(|value| parse_entry(value, &trust_key))
                .transpose()?;
            if cli.json {
                let out = json!({
                    "entry": entry.as_ref().map(payload_json),
                    "vendors": state.vendors,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_tracestate_human(&state, entry.as_ref());
            }
            Ok(())
        }
        Commands::Newrelic { header } => {
            let legacy = LegacyHeader::decode(header.trim())?;
            let payload = legacy.into_payload()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&payload_json(&payload))?);
            } else {
                print_payload_human(&payload);
            }
            Ok(())
        }
        Commands::Demo { transactions } => run_demo(transactions, cli.json).await,
    }
}

async fn run_demo(rounds: usize, json: bool) -> anyhow::Result<()> {
    if rounds == 0 {
        bail!("--transactions must be at least 1");
    }
    let mut config = Config::load()?;
    config.account_id.get_or_insert_with(|| "1".to_string());
    config
        .primary_application_id
        .get_or_insert_with(|| "1".to_string());

    let sink = MemorySink::default();
    let tracer = Tracer::new(config);
    let (pipeline, handle) = HarvestPipeline::spawn(
        tracer.config().clone(),
        tracer.sampler().clone(),
        sink.clone(),
        PipelineConfig::default(),
    )?;
    let tracer = tracer.with_listener(Arc::new(pipeline.clone()));

    for i in 0..rounds {
        let mut upstream = tracer.start_transaction(TransactionKind::Web);
        upstream.set_name(format!("Uri/orders/{}", i % 3));
        upstream.set_status_code(200);

        let root = Context::root();
        if let Some(query) = root.enter_recorded(
            &mut upstream,
            "Datastore/operation/Postgres/select",
            record_datastore,
        ) {
            if let Some(handle) = query.segment()
                && let Some(segment) = upstream.segment_mut(handle)
            {
                segment.add_attribute("sql", format!("SELECT * FROM orders WHERE id = {i}"));
            }
            query.exit(&mut upstream);
        }

        let mut headers: HashMap<String, String> = HashMap::new();
        if let Some(call) = root.enter_recorded(
            &mut upstream,
            "External/inventory.internal/http",
            record_external,
        ) {
            upstream.insert_distributed_trace_headers(call.segment(), &mut headers);
            let mut downstream = tracer.start_transaction(TransactionKind::Web);
            downstream.set_name("Uri/inventory");
            downstream.accept_distributed_trace_headers(TransportType::Https, &headers);
            downstream.end();
            call.exit(&mut upstream);
        }
        upstream.end();
    }

    pipeline.shutdown().await?;
    handle.await?;

    for batch in sink.batches() {
        if json {
            println!("{}", serde_json::to_string_pretty(&batch.to_json()?)?);
        } else {
            print_batch_human(&batch);
        }
    }
    Ok(())
}
