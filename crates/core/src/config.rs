use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ApmError, Result};
use crate::time::parse_duration_str;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordSql {
    Raw,
    #[default]
    Obfuscated,
    Off,
}

impl FromStr for RecordSql {
    type Err = ApmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "obfuscated" => Ok(Self::Obfuscated),
            "off" => Ok(Self::Off),
            _ => Err(ApmError::Parse(format!("unknown record_sql mode: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub account_id: Option<String>,
    pub primary_application_id: Option<String>,
    pub trusted_account_key: Option<String>,
    pub distributed_tracing_enabled: bool,
    pub exclude_newrelic_header: bool,
    pub span_events_enabled: bool,
    pub apdex_t: Duration,
    pub ignore_status_codes: Vec<u16>,
    pub max_trace_segments: usize,
    pub simple_compression: bool,
    pub record_sql: RecordSql,
    pub slow_sql_enabled: bool,
    pub explain_threshold: Duration,
    pub slow_sql_max_samples: usize,
    pub sampling_target: usize,
    pub sampling_period: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_id: None,
            primary_application_id: None,
            trusted_account_key: None,
            distributed_tracing_enabled: true,
            exclude_newrelic_header: false,
            span_events_enabled: true,
            apdex_t: Duration::from_millis(100),
            ignore_status_codes: vec![404],
            max_trace_segments: 900,
            simple_compression: false,
            record_sql: RecordSql::Obfuscated,
            slow_sql_enabled: false,
            explain_threshold: Duration::from_millis(500),
            slow_sql_max_samples: 10,
            sampling_target: 10,
            sampling_period: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn trust_key(&self) -> Option<&str> {
        self.trusted_account_key
            .as_deref()
            .or(self.account_id.as_deref())
    }

    pub fn apdex_t_ms(&self) -> f64 {
        self.apdex_t.as_secs_f64() * 1000.0
    }

    pub fn is_ignored_status(&self, status: u16) -> bool {
        self.ignore_status_codes.contains(&status)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    account_id: Option<String>,
    primary_application_id: Option<String>,
    trusted_account_key: Option<String>,
    distributed_tracing_enabled: Option<bool>,
    exclude_newrelic_header: Option<bool>,
    span_events_enabled: Option<bool>,
    apdex_t: Option<String>,
    ignore_status_codes: Option<String>,
    max_trace_segments: Option<usize>,
    simple_compression: Option<bool>,
    record_sql: Option<String>,
    slow_sql_enabled: Option<bool>,
    explain_threshold: Option<String>,
    slow_sql_max_samples: Option<usize>,
    sampling_target: Option<usize>,
    sampling_period: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("APM_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("apm/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ApmError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ApmError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ApmError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        account_id: env::var("APM_ACCOUNT_ID").ok(),
        primary_application_id: env::var("APM_PRIMARY_APPLICATION_ID").ok(),
        trusted_account_key: env::var("APM_TRUSTED_ACCOUNT_KEY").ok(),
        distributed_tracing_enabled: env_parsed("APM_DISTRIBUTED_TRACING_ENABLED")?,
        exclude_newrelic_header: env_parsed("APM_EXCLUDE_NEWRELIC_HEADER")?,
        span_events_enabled: env_parsed("APM_SPAN_EVENTS_ENABLED")?,
        apdex_t: env::var("APM_APDEX_T").ok(),
        ignore_status_codes: env::var("APM_IGNORE_STATUS_CODES").ok(),
        max_trace_segments: env_parsed("APM_MAX_TRACE_SEGMENTS")?,
        simple_compression: env_parsed("APM_SIMPLE_COMPRESSION")?,
        record_sql: env::var("APM_RECORD_SQL").ok(),
        slow_sql_enabled: env_parsed("APM_SLOW_SQL_ENABLED")?,
        explain_threshold: env::var("APM_EXPLAIN_THRESHOLD").ok(),
        slow_sql_max_samples: env_parsed("APM_SLOW_SQL_MAX_SAMPLES")?,
        sampling_target: env_parsed("APM_SAMPLING_TARGET")?,
        sampling_period: env::var("APM_SAMPLING_PERIOD").ok(),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.account_id {
        cfg.account_id = Some(v);
    }
    if let Some(v) = overrides.primary_application_id {
        cfg.primary_application_id = Some(v);
    }
    if let Some(v) = overrides.trusted_account_key {
        cfg.trusted_account_key = Some(v);
    }
    if let Some(v) = overrides.distributed_tracing_enabled {
        cfg.distributed_tracing_enabled = v;
    }
    if let Some(v) = overrides.exclude_newrelic_header {
        cfg.exclude_newrelic_header = v;
    }
    if let Some(v) = overrides.span_events_enabled {
        cfg.span_events_enabled = v;
    }
    if let Some(v) = overrides.apdex_t {
        cfg.apdex_t = parse_period("apdex_t", &v, source)?;
    }
    if let Some(v) = overrides.ignore_status_codes {
        cfg.ignore_status_codes = parse_status_codes(&v).map_err(|e| {
            ApmError::Config(format!(
                "bad ignore_status_codes in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.max_trace_segments {
        cfg.max_trace_segments = v;
    }
    if let Some(v) = overrides.simple_compression {
        cfg.simple_compression = v;
    }
    if let Some(v) = overrides.record_sql {
        cfg.record_sql = v.parse().map_err(|e| {
            ApmError::Config(format!("bad record_sql in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.slow_sql_enabled {
        cfg.slow_sql_enabled = v;
    }
    if let Some(v) = overrides.explain_threshold {
        cfg.explain_threshold = parse_duration_str(&v).map_err(|e| {
            ApmError::Config(format!(
                "bad explain_threshold in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.slow_sql_max_samples {
        cfg.slow_sql_max_samples = v;
    }
    if let Some(v) = overrides.sampling_target {
        cfg.sampling_target = v;
    }
    if let Some(v) = overrides.sampling_period {
        cfg.sampling_period = parse_period("sampling_period", &v, source)?;
    }
    Ok(())
}

fn parse_period(key: &str, raw: &str, source: &str) -> Result<Duration> {
    let period = parse_duration_str(raw)
        .map_err(|e| ApmError::Config(format!("bad {key} in {source}: {e} (value={raw})")))?;
    if period.is_zero() {
        return Err(ApmError::Config(format!(
            "bad {key} in {source}: must be greater than zero (value={raw})"
        )));
    }
    Ok(period)
}

fn parse_status_codes(raw: &str) -> Result<Vec<u16>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = trimmed.split_once('-') {
            let lo = parse_status(lo)?;
            let hi = parse_status(hi)?;
            if lo > hi {
                return Err(ApmError::Config(format!("empty status range: {trimmed}")));
            }
            out.extend(lo..=hi);
        } else {
            out.push(parse_status(trimmed)?);
        }
    }
    Ok(out)
}

fn parse_status(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| ApmError::Config(format!("status code {raw}: {e}")))
}
