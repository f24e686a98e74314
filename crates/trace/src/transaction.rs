use std::fmt;
use std::sync::Arc;

use apm_core::Result;
use apm_core::config::Config;
use apm_core::ids::{SpanId, TraceId};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::attributes::Attributes;
use crate::context::SegmentFactory;
use crate::distributed::{
    DistributedTraceState, Extractor, Injector, Outbound, TransportType, truncate_priority,
};
use crate::errors::{CapturedError, Exception};
use crate::metrics::Metrics;
use crate::recorders::{self, Recorder};
use crate::sampler::AdaptiveSampler;
use crate::trace::{PayloadEncoding, Segment, SegmentHandle, Trace, TraceInfo};
use crate::tracer::TransactionListener;

pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Web,
    Background,
    Message,
}

impl TransactionKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Web => "WebTransaction",
            Self::Background | Self::Message => "OtherTransaction",
        }
    }

    pub fn is_web(self) -> bool {
        matches!(self, Self::Web)
    }

    pub fn all_suffix(self) -> &'static str {
        if self.is_web() { "allWeb" } else { "allOther" }
    }

    fn default_recorder(self) -> Recorder {
        match self {
            Self::Web => recorders::record_web,
            Self::Background | Self::Message => recorders::record_background,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Web => "web",
            Self::Background => "background",
            Self::Message => "message",
        })
    }
}

pub struct Transaction {
    id: SpanId,
    trace_id: String,
    kind: TransactionKind,
    name: Option<String>,
    url: Option<String>,
    status_code: Option<u16>,
    queue_time_ms: f64,
    apdex_t_ms: Option<f64>,
    ignored: bool,
    trace: Trace,
    base_segment: Option<SegmentHandle>,
    metrics: Metrics,
    exceptions: Vec<Exception>,
    distributed: DistributedTraceState,
    priority: Option<f64>,
    sampled: Option<bool>,
    forced: bool,
    config: Arc<Config>,
    sampler: Arc<AdaptiveSampler>,
    listeners: Arc<[Arc<dyn TransactionListener>]>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("trace_id", &self.trace_id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("segments", &self.trace.len())
            .field("priority", &self.priority)
            .field("sampled", &self.sampled)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub fn new(kind: TransactionKind, config: Arc<Config>, sampler: Arc<AdaptiveSampler>) -> Self {
        Self::with_listeners(kind, config, sampler, Arc::from(Vec::new()))
    }

    pub(crate) fn with_listeners(
        kind: TransactionKind,
        config: Arc<Config>,
        sampler: Arc<AdaptiveSampler>,
        listeners: Arc<[Arc<dyn TransactionListener>]>,
    ) -> Self {
        let mut trace = Trace::new(config.max_trace_segments);
        let base_name = format!("{}/{UNKNOWN_NAME}", kind.prefix());
        let base_segment = trace.add(base_name, Some(kind.default_recorder()), None);
        Self {
            id: SpanId::random(),
            trace_id: TraceId::random().to_string(),
            kind,
            name: None,
            url: None,
            status_code: None,
            queue_time_ms: 0.0,
            apdex_t_ms: None,
            ignored: false,
            trace,
            base_segment,
            metrics: Metrics::new(config.apdex_t_ms()),
            exceptions: Vec::new(),
            distributed: DistributedTraceState::default(),
            priority: None,
            sampled: None,
            forced: false,
            config,
            sampler,
            listeners,
        }
    }

    pub fn id(&self) -> &SpanId {
        &self.id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn partial_name(&self) -> String {
        let name = self.name.as_deref().unwrap_or(UNKNOWN_NAME);
        match self.kind {
            TransactionKind::Message => format!("Message/{name}"),
            _ => name.to_string(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}/{}", self.kind.prefix(), self.partial_name())
    }

    pub fn set_name(&mut self, partial: impl Into<String>) {
        self.name = Some(partial.into());
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn set_status_code(&mut self, status: u16) {
        self.status_code = Some(status);
    }

    pub fn queue_time_ms(&self) -> f64 {
        self.queue_time_ms
    }

    pub fn set_queue_time_ms(&mut self, queue_time_ms: f64) {
        self.queue_time_ms = queue_time_ms.max(0.0);
    }

    pub fn apdex_t_ms(&self) -> Option<f64> {
        self.apdex_t_ms
    }

    pub fn set_apdex_t_ms(&mut self, apdex_t_ms: f64) {
        self.apdex_t_ms = Some(apdex_t_ms);
    }

    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut Trace {
        &mut self.trace
    }

    pub fn base_segment(&self) -> Option<SegmentHandle> {
        self.base_segment
    }

    pub fn segment(&self, handle: SegmentHandle) -> Option<&Segment> {
        self.trace.segment(handle)
    }

    pub fn segment_mut(&mut self, handle: SegmentHandle) -> Option<&mut Segment> {
        self.trace.segment_mut(handle)
    }

    pub fn add_segment(
        &mut self,
        name: impl Into<String>,
        recorder: Option<Recorder>,
        parent: Option<SegmentHandle>,
    ) -> Option<SegmentHandle> {
        let parent = parent.or(self.base_segment);
        self.trace.add(name, recorder, parent)
    }

    pub fn end_segment(&mut self, handle: SegmentHandle) {
        self.trace.end_segment(handle);
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    pub fn measure(&mut self, name: &str, scope: Option<&str>, duration_ms: f64, exclusive_ms: Option<f64>) {
        self.metrics
            .measure_milliseconds(name, scope, duration_ms, exclusive_ms);
    }

    pub fn exceptions(&self) -> &[Exception] {
        &self.exceptions
    }

    pub fn add_exception(&mut self, error: Arc<CapturedError>, custom_attributes: Attributes) {
        self.exceptions.push(Exception::new(error, custom_attributes));
    }

    pub fn has_errors(&self) -> bool {
        !self.exceptions.is_empty()
    }

    pub fn distributed_trace(&self) -> &DistributedTraceState {
        &self.distributed
    }

    pub fn accept_distributed_trace_headers(
        &mut self,
        transport: TransportType,
        carrier: &dyn Extractor,
    ) -> bool {
        let Some(inbound) = self
            .distributed
            .accept(&self.config, transport, carrier, &mut self.metrics)
            .cloned()
        else {
            return false;
        };

        if !inbound.trace_id.is_empty() {
            self.trace_id = inbound.trace_id;
        }
        let upstream = inbound
            .payload
            .as_ref()
            .and_then(|p| p.sampled.map(|sampled| (sampled, p.priority)));
        if let Some((sampled, priority)) = upstream {
            if self.priority.is_none() {
                self.sampled = Some(sampled);
                self.priority = Some(match priority {
                    Some(priority) => truncate_priority(priority),
                    None => self.local_priority(sampled),
                });
            } else {
                debug!(
                    transaction = %self.id,
                    "priority already decided, ignoring upstream sampling decision"
                );
            }
        }
        true
    }

    pub fn insert_distributed_trace_headers(
        &mut self,
        segment: Option<SegmentHandle>,
        carrier: &mut dyn Injector,
    ) {
        self.ensure_priority();
        let span_id = segment
            .or(self.base_segment)
            .and_then(|handle| self.trace.segment(handle))
            .unwrap_or_else(|| self.trace.root_segment())
            .id()
            .to_string();
        let outbound = Outbound {
            trace_id: &self.trace_id,
            span_id: &span_id,
            transaction_id: self.id.as_str(),
            sampled: self.sampled.unwrap_or(false),
            priority: self.priority.unwrap_or(0.0),
        };
        self.distributed
            .insert(&self.config, outbound, carrier, &mut self.metrics);
    }

    /// The priority, deciding it now if nothing has yet.
    pub fn priority(&mut self) -> f64 {
        self.ensure_priority();
        self.priority.unwrap_or(0.0)
    }

    pub fn sampled(&mut self) -> bool {
        self.ensure_priority();
        self.sampled.unwrap_or(false)
    }

    pub fn current_priority(&self) -> Option<f64> {
        self.priority
    }

    pub fn current_sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// Overrides the sampling decision. Only possible once and only before
    /// the decision was made or adopted; returns whether it took effect.
    pub fn force_sampled(&mut self, sampled: bool) -> bool {
        if self.forced || self.priority.is_some() {
            return false;
        }
        self.forced = true;
        self.sampled = Some(sampled);
        self.priority = Some(if sampled { 2.0 } else { 0.0 });
        true
    }

    fn ensure_priority(&mut self) {
        if self.priority.is_some() {
            return;
        }
        let base = truncate_priority(rand::random::<f64>());
        let sampled = self.sampler.should_sample(base);
        self.sampled = Some(sampled);
        self.priority = Some(if sampled {
            truncate_priority(base + 1.0)
        } else {
            base
        });
    }

    fn local_priority(&self, sampled: bool) -> f64 {
        let base = truncate_priority(rand::random::<f64>());
        if sampled { truncate_priority(base + 1.0) } else { base }
    }

    pub fn end(mut self) -> FinishedTransaction {
        let name = self.name();
        if let Some(base) = self.base_segment {
            if let Some(segment) = self.trace.segment_mut(base) {
                segment.set_name(name.clone());
            }
            self.trace.end_segment(base);
        }
        self.trace.end();
        self.ensure_priority();

        let guid = self.id.to_string();
        for exception in &mut self.exceptions {
            exception.annotate(&guid);
        }

        if !self.ignored {
            let mut metrics =
                std::mem::replace(&mut self.metrics, Metrics::new(self.config.apdex_t_ms()));
            for (_, segment) in self.trace.iter() {
                if let Some(recorder) = segment.recorder() {
                    recorder(segment, Some(name.as_str()), &self, &mut metrics);
                }
            }
            self.metrics = metrics;
        }

        debug!(
            transaction = %self.id,
            name = %name,
            segments = self.trace.len(),
            duration_ms = self.trace.duration_ms(),
            "transaction ended"
        );

        let listeners = self.listeners.clone();
        let finished = FinishedTransaction {
            id: guid,
            trace_id: self.trace_id,
            kind: self.kind,
            name,
            url: self.url,
            status_code: self.status_code,
            priority: self.priority.unwrap_or(0.0),
            sampled: self.sampled.unwrap_or(false),
            ignored: self.ignored,
            trace: self.trace,
            metrics: self.metrics,
            exceptions: self.exceptions,
            distributed_trace: self.distributed,
            simple_compression: self.config.simple_compression,
        };
        if !finished.ignored {
            for listener in listeners.iter() {
                listener.on_transaction_finished(&finished);
            }
        }
        finished
    }
}

impl SegmentFactory for Transaction {
    fn create_segment(&mut self, name: &str, parent: Option<SegmentHandle>) -> Option<SegmentHandle> {
        self.add_segment(name, Some(recorders::record_generic), parent)
    }

    fn create_recorded_segment(
        &mut self,
        name: &str,
        recorder: Recorder,
        parent: Option<SegmentHandle>,
    ) -> Option<SegmentHandle> {
        self.add_segment(name, Some(recorder), parent)
    }

    fn end_segment(&mut self, handle: SegmentHandle) {
        self.trace.end_segment(handle);
    }
}

#[derive(Debug, Clone)]
pub struct FinishedTransaction {
    pub id: String,
    pub trace_id: String,
    pub kind: TransactionKind,
    pub name: String,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub priority: f64,
    pub sampled: bool,
    pub ignored: bool,
    pub trace: Trace,
    pub metrics: Metrics,
    pub exceptions: Vec<Exception>,
    pub distributed_trace: DistributedTraceState,
    pub simple_compression: bool,
}

impl FinishedTransaction {
    pub fn duration_ms(&self) -> f64 {
        self.trace.duration_ms()
    }

    pub fn intrinsics(&self) -> Map<String, Value> {
        let mut intrinsics = self.distributed_trace.intrinsics();
        intrinsics.insert("guid".into(), json!(self.id));
        intrinsics.insert("traceId".into(), json!(self.trace_id));
        intrinsics.insert("priority".into(), json!(self.priority));
        intrinsics.insert("sampled".into(), json!(self.sampled));
        intrinsics
    }

    pub fn trace_info(&self) -> TraceInfo {
        TraceInfo {
            name: self.name.clone(),
            url: self.url.clone(),
            transaction_id: self.id.clone(),
            duration_ms: self.duration_ms(),
            intrinsics: self.intrinsics(),
        }
    }

    pub fn encoding(&self) -> PayloadEncoding {
        PayloadEncoding::from_simple_compression(self.simple_compression)
    }

    pub fn trace_json(&self) -> Result<Value> {
        self.trace.generate_json(&self.trace_info(), self.encoding())
    }

    pub async fn trace_json_async(&self) -> Result<Value> {
        self.trace
            .generate_json_async(&self.trace_info(), self.encoding())
            .await
    }
}
