pub mod carrier;
pub mod legacy;
pub mod payload;
pub mod tracestate;
pub mod traceparent;

use apm_core::config::Config;
use apm_core::ids::TraceId;
use apm_core::time::now_millis;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::metrics::Metrics;

pub use carrier::{Extractor, Injector};
pub use legacy::LegacyHeader;
pub use payload::{ParentType, TracePayload, TransportType, format_priority, truncate_priority};
pub use traceparent::TraceParent;
pub use tracestate::TraceState;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const NEWRELIC_HEADER: &str = "newrelic";

const ACCEPT_PREFIX: &str = "Supportability/DistributedTrace/AcceptPayload";
const TRACE_CONTEXT_PREFIX: &str = "Supportability/TraceContext";

#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub payload: Option<TracePayload>,
    pub transport: TransportType,
    pub transport_duration_ms: f64,
    pub via_trace_context: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Outbound<'a> {
    pub trace_id: &'a str,
    pub span_id: &'a str,
    pub transaction_id: &'a str,
    pub sampled: bool,
    pub priority: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributedTraceState {
    inbound: Option<Inbound>,
    vendors: Vec<String>,
    created_outbound: bool,
}

impl DistributedTraceState {
    pub fn inbound(&self) -> Option<&Inbound> {
        self.inbound.as_ref()
    }

    pub fn accepted_payload(&self) -> Option<&TracePayload> {
        self.inbound.as_ref().and_then(|i| i.payload.as_ref())
    }

    pub fn has_created_outbound(&self) -> bool {
        self.created_outbound
    }

    pub fn vendors(&self) -> &[String] {
        &self.vendors
    }

    pub fn accept(
        &mut self,
        config: &Config,
        transport: TransportType,
        carrier: &dyn Extractor,
        metrics: &mut Metrics,
    ) -> Option<&Inbound> {
        if !config.distributed_tracing_enabled {
            return None;
        }
        if self.inbound.is_some() {
            supportability(metrics, &format!("{ACCEPT_PREFIX}/Ignored/Multiple"));
            return None;
        }
        if self.created_outbound {
            supportability(metrics, &format!("{ACCEPT_PREFIX}/Ignored/CreateBeforeAccept"));
            return None;
        }

        let traceparent = carrier.get(TRACEPARENT_HEADER);
        let newrelic = carrier.get(NEWRELIC_HEADER);
        if traceparent.is_none() && newrelic.is_none() {
            supportability(metrics, &format!("{ACCEPT_PREFIX}/Ignored/Null"));
            return None;
        }

        let now = now_millis();
        let accepted = traceparent
            .and_then(|tp| accept_trace_context(config, tp, carrier.get(TRACESTATE_HEADER), metrics))
            .map(|(inbound, vendors)| {
                self.vendors = vendors;
                inbound
            })
            .or_else(|| newrelic.and_then(|nr| accept_legacy(config, nr, metrics)));

        let mut inbound = accepted?;
        inbound.transport = transport;
        if let Some(payload) = &inbound.payload {
            inbound.transport_duration_ms = now.saturating_sub(payload.timestamp) as f64;
        }
        self.inbound = Some(inbound);
        self.inbound.as_ref()
    }

    pub fn insert(
        &mut self,
        config: &Config,
        outbound: Outbound<'_>,
        carrier: &mut dyn Injector,
        metrics: &mut Metrics,
    ) {
        if !config.distributed_tracing_enabled {
            return;
        }
        self.created_outbound = true;

        let traceparent = match TraceId::padded(outbound.trace_id) {
            Ok(trace_id) => TraceParent::new(trace_id.as_str(), outbound.span_id, outbound.sampled),
            Err(err) => {
                debug!(error = %err, "cannot build traceparent");
                supportability(metrics, &format!("{TRACE_CONTEXT_PREFIX}/Create/Exception"));
                return;
            }
        };
        carrier.set(TRACEPARENT_HEADER, traceparent.to_string());

        let payload = match (&config.account_id, &config.primary_application_id) {
            (Some(account), Some(app)) => Some(TracePayload {
                version: (legacy::VERSION[0], legacy::VERSION[1]),
                parent_type: ParentType::App,
                account_id: account.clone(),
                app_id: app.clone(),
                transaction_id: Some(outbound.transaction_id.to_string()),
                span_id: config
                    .span_events_enabled
                    .then(|| outbound.span_id.to_string()),
                trace_id: Some(outbound.trace_id.to_string()),
                sampled: Some(outbound.sampled),
                priority: Some(outbound.priority),
                timestamp: now_millis(),
                trusted_account_key: config.trust_key().map(str::to_string),
            }),
            _ => None,
        };

        let entry = payload.as_ref().zip(config.trust_key()).map(|(payload, key)| {
            tracestate::format_entry(key, payload)
        });
        let state = tracestate::format_header(entry.as_deref(), &self.vendors);
        if !state.is_empty() {
            carrier.set(TRACESTATE_HEADER, state);
        }
        supportability(metrics, &format!("{TRACE_CONTEXT_PREFIX}/Create/Success"));

        let Some(payload) = payload else {
            return;
        };
        if config.exclude_newrelic_header {
            return;
        }
        match LegacyHeader::from_payload(&payload).encode() {
            Ok(header) => {
                carrier.set(NEWRELIC_HEADER, header);
                supportability(metrics, "Supportability/DistributedTrace/CreatePayload/Success");
            }
            Err(err) => {
                debug!(error = %err, "cannot build newrelic header");
                supportability(
                    metrics,
                    "Supportability/DistributedTrace/CreatePayload/Exception",
                );
            }
        }
    }

    pub fn intrinsics(&self) -> Map<String, Value> {
        let mut out = Map::new();
        let Some(inbound) = &self.inbound else {
            return out;
        };
        if let Some(parent) = &inbound.parent_span_id {
            out.insert("parentSpanId".into(), json!(parent));
        }
        if let Some(payload) = &inbound.payload {
            out.insert("parent.type".into(), json!(payload.parent_type.as_str()));
            out.insert("parent.app".into(), json!(payload.app_id));
            out.insert("parent.account".into(), json!(payload.account_id));
            out.insert("parent.transportType".into(), json!(inbound.transport.as_str()));
            out.insert(
                "parent.transportDuration".into(),
                json!(inbound.transport_duration_ms / 1000.0),
            );
            if let Some(tx) = &payload.transaction_id {
                out.insert("parentId".into(), json!(tx));
            }
        }
        if !self.vendors.is_empty() {
            let state = TraceState {
                entry: None,
                vendors: self.vendors.clone(),
            };
            out.insert("tracingVendors".into(), json!(state.vendor_keys().join(",")));
        }
        out
    }
}

fn accept_trace_context(
    config: &Config,
    traceparent: &str,
    tracestate: Option<&str>,
    metrics: &mut Metrics,
) -> Option<(Inbound, Vec<String>)> {
    let parent = match TraceParent::parse(traceparent) {
        Ok(parent) => parent,
        Err(err) => {
            debug!(error = %err, "ignoring traceparent");
            supportability(metrics, &format!("{TRACE_CONTEXT_PREFIX}/TraceParent/Parse/Exception"));
            return None;
        }
    };

    let state = match (tracestate, config.trust_key()) {
        (Some(header), Some(key)) => TraceState::parse(header, key),
        (Some(header), None) => TraceState::parse(header, ""),
        (None, _) => TraceState::default(),
    };

    let payload = match (&state.entry, config.trust_key()) {
        (Some(entry), Some(key)) => match tracestate::parse_entry(entry, key) {
            Ok(mut payload) => {
                payload.trace_id = Some(parent.trace_id.clone());
                Some(payload)
            }
            Err(err) => {
                debug!(error = %err, "ignoring tracestate entry");
                supportability(
                    metrics,
                    &format!("{TRACE_CONTEXT_PREFIX}/TraceState/InvalidNrEntry"),
                );
                None
            }
        },
        _ => {
            supportability(metrics, &format!("{TRACE_CONTEXT_PREFIX}/TraceState/NoNrEntry"));
            None
        }
    };

    supportability(metrics, &format!("{TRACE_CONTEXT_PREFIX}/Accept/Success"));
    let inbound = Inbound {
        trace_id: parent.trace_id,
        parent_span_id: Some(parent.parent_id),
        payload,
        transport: TransportType::Unknown,
        transport_duration_ms: 0.0,
        via_trace_context: true,
    };
    Some((inbound, state.vendors))
}

fn accept_legacy(config: &Config, header: &str, metrics: &mut Metrics) -> Option<Inbound> {
    let decoded = match LegacyHeader::decode(header) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(error = %err, "ignoring newrelic header");
            supportability(metrics, &format!("{ACCEPT_PREFIX}/ParseException"));
            return None;
        }
    };
    if decoded.major_version() > legacy::VERSION[0] {
        debug!(
            major = decoded.major_version(),
            "ignoring newrelic header with newer major version"
        );
        supportability(metrics, &format!("{ACCEPT_PREFIX}/Ignored/MajorVersion"));
        return None;
    }
    let payload = match decoded.into_payload() {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "ignoring newrelic header");
            supportability(metrics, &format!("{ACCEPT_PREFIX}/ParseException"));
            return None;
        }
    };

    let sent_key = payload
        .trusted_account_key
        .as_deref()
        .unwrap_or(payload.account_id.as_str());
    if config.trust_key() != Some(sent_key) {
        debug!(trust_key = sent_key, "ignoring newrelic header from untrusted account");
        supportability(metrics, &format!("{ACCEPT_PREFIX}/Ignored/UntrustedAccount"));
        return None;
    }

    supportability(metrics, &format!("{ACCEPT_PREFIX}/Success"));
    Some(Inbound {
        trace_id: payload.trace_id.clone().unwrap_or_default(),
        parent_span_id: payload.span_id.clone(),
        payload: Some(payload),
        transport: TransportType::Unknown,
        transport_duration_ms: 0.0,
        via_trace_context: false,
    })
}

fn supportability(metrics: &mut Metrics, name: &str) {
    metrics.get_or_create_metric(name, None).increment_call_count(1);
}
