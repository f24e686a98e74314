use std::fmt;
use std::sync::LazyLock;

use apm_core::ids::{SpanId, TraceId};
use apm_core::{ApmError, Result};
use regex::Regex;

pub const SUPPORTED_VERSION: &str = "00";
const FLAG_SAMPLED: u8 = 0x01;

static TRACEPARENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})$")
        .expect("failed creating regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: String,
    pub parent_id: String,
    pub flags: u8,
}

impl TraceParent {
    pub fn new(trace_id: impl Into<String>, parent_id: impl Into<String>, sampled: bool) -> Self {
        Self {
            trace_id: trace_id.into(),
            parent_id: parent_id.into(),
            flags: if sampled { FLAG_SAMPLED } else { 0 },
        }
    }

    pub fn sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let caps = TRACEPARENT_REGEX
            .captures(header)
            .ok_or_else(|| ApmError::Parse(format!("malformed traceparent: {header}")))?;

        let version = &caps[1];
        if version != SUPPORTED_VERSION {
            return Err(ApmError::Parse(format!(
                "unsupported traceparent version: {version}"
            )));
        }
        let trace_id = TraceId::parse(&caps[2])?;
        let parent_id = SpanId::parse(&caps[3])?;
        if trace_id.is_zero() {
            return Err(ApmError::Parse("traceparent trace id is all zeros".into()));
        }
        if parent_id.is_zero() {
            return Err(ApmError::Parse("traceparent parent id is all zeros".into()));
        }
        let flags = u8::from_str_radix(&caps[4], 16)
            .map_err(|e| ApmError::Parse(format!("traceparent flags: {e}")))?;

        Ok(Self {
            trace_id: trace_id.as_str().to_string(),
            parent_id: parent_id.as_str().to_string(),
            flags,
        })
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SUPPORTED_VERSION}-{}-{}-{:02x}",
            self.trace_id, self.parent_id, self.flags
        )
    }
}
