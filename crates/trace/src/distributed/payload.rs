use std::fmt;

use apm_core::{ApmError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentType {
    App,
    Browser,
    Mobile,
}

impl ParentType {
    pub fn code(self) -> u8 {
        match self {
            Self::App => 0,
            Self::Browser => 1,
            Self::Mobile => 2,
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "0" => Ok(Self::App),
            "1" => Ok(Self::Browser),
            "2" => Ok(Self::Mobile),
            other => Err(ApmError::Parse(format!("unknown parent type code: {other}"))),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "App" => Ok(Self::App),
            "Browser" => Ok(Self::Browser),
            "Mobile" => Ok(Self::Mobile),
            other => Err(ApmError::Parse(format!("unknown parent type: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "App",
            Self::Browser => "Browser",
            Self::Mobile => "Mobile",
        }
    }
}

impl fmt::Display for ParentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    #[default]
    Unknown,
    Http,
    Https,
    Kafka,
    Jms,
    IronMq,
    Amqp,
    Queue,
    Other,
}

impl TransportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Kafka => "Kafka",
            Self::Jms => "JMS",
            Self::IronMq => "IronMQ",
            Self::Amqp => "AMQP",
            Self::Queue => "Queue",
            Self::Other => "Other",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "HTTP" => Self::Http,
            "HTTPS" => Self::Https,
            "KAFKA" => Self::Kafka,
            "JMS" => Self::Jms,
            "IRONMQ" => Self::IronMq,
            "AMQP" => Self::Amqp,
            "QUEUE" => Self::Queue,
            "OTHER" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TracePayload {
    pub version: (u32, u32),
    pub parent_type: ParentType,
    pub account_id: String,
    pub app_id: String,
    pub transaction_id: Option<String>,
    pub span_id: Option<String>,
    pub trace_id: Option<String>,
    pub sampled: Option<bool>,
    pub priority: Option<f64>,
    pub timestamp: u64,
    pub trusted_account_key: Option<String>,
}

pub const PRIORITY_DECIMALS: i32 = 6;

/// Truncates (not rounds) a priority to [`PRIORITY_DECIMALS`] places. The
/// small bias absorbs binary representation error, so `1.23456` stays put.
pub fn truncate_priority(priority: f64) -> f64 {
    let factor = 10f64.powi(PRIORITY_DECIMALS);
    ((priority * factor) + 1e-9).trunc() / factor
}

pub fn format_priority(priority: f64) -> String {
    let fixed = format!("{:.*}", PRIORITY_DECIMALS as usize, truncate_priority(priority));
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
