use std::time::Duration;

use chrono::Utc;

use crate::error::{ApmError, Result};

pub fn now_ms() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| ApmError::Parse(format!("invalid duration {input}: {e}")))
}
