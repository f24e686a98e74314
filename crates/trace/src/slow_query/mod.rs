pub mod obfuscate;

use std::collections::HashMap;

use apm_core::Result;
use apm_core::config::{Config, RecordSql};
use serde_json::{Map, Value, json};

use crate::attributes::AttrValue;
use crate::codec;
use crate::stats::Stats;
use crate::trace::PayloadEncoding;
use crate::transaction::FinishedTransaction;

pub const SQL_ATTRIBUTE: &str = "sql";
const UNKNOWN_URL: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq)]
pub struct SlowQuery {
    pub raw: String,
    pub obfuscated: String,
    pub normalized: String,
    pub id: u32,
    pub metric: String,
    pub duration_ms: f64,
    pub params: Map<String, Value>,
    pub transaction_name: String,
    pub url: Option<String>,
    pub trace_id: String,
    pub priority: f64,
    pub sampled: bool,
}

impl SlowQuery {
    pub fn new(
        sql: &str,
        metric: impl Into<String>,
        duration_ms: f64,
        params: Map<String, Value>,
        transaction: &FinishedTransaction,
    ) -> Self {
        let normalized = obfuscate::normalize(sql);
        Self {
            raw: sql.to_string(),
            obfuscated: obfuscate::obfuscate(sql),
            id: obfuscate::fingerprint(&normalized),
            normalized,
            metric: metric.into(),
            duration_ms,
            params,
            transaction_name: transaction.name.clone(),
            url: transaction.url.clone(),
            trace_id: transaction.trace_id.clone(),
            priority: transaction.priority,
            sampled: transaction.sampled,
        }
    }

    pub fn query_text(&self, record_sql: RecordSql) -> &str {
        match record_sql {
            RecordSql::Raw => &self.raw,
            RecordSql::Obfuscated => &self.obfuscated,
            RecordSql::Off => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySample {
    pub stats: Stats,
    pub sample: SlowQuery,
}

impl QuerySample {
    pub fn new(query: SlowQuery) -> Self {
        let mut stats = Stats::new();
        stats.record_value_in_millis(query.duration_ms, None);
        Self {
            stats,
            sample: query,
        }
    }

    pub fn aggregate(&mut self, query: SlowQuery) {
        self.stats.record_value_in_millis(query.duration_ms, None);
        if query.duration_ms > self.sample.duration_ms {
            self.sample = query;
        }
    }

    pub fn merge(&mut self, other: QuerySample) {
        self.stats.merge(&other.stats);
        if other.sample.duration_ms > self.sample.duration_ms {
            self.sample = other.sample;
        }
    }

    pub fn to_json(&self, record_sql: RecordSql, encoding: PayloadEncoding) -> Result<Value> {
        let sample = &self.sample;
        let mut params = sample.params.clone();
        params.insert("traceId".into(), json!(sample.trace_id));
        params.insert("priority".into(), json!(sample.priority));
        params.insert("sampled".into(), json!(sample.sampled));
        let params = match encoding {
            PayloadEncoding::Deflate => Value::String(codec::encode(&params)?),
            PayloadEncoding::Raw => Value::Object(params),
        };

        Ok(json!([
            sample.transaction_name,
            sample.url.as_deref().unwrap_or(UNKNOWN_URL),
            sample.id,
            sample.query_text(record_sql),
            sample.metric,
            self.stats.count,
            self.stats.total * 1000.0,
            self.stats.min * 1000.0,
            self.stats.max * 1000.0,
            params,
        ]))
    }
}

#[derive(Debug, Clone)]
pub struct SlowQueryReservoir {
    samples: HashMap<String, QuerySample>,
    max_samples: usize,
    explain_threshold_ms: f64,
    record_sql: RecordSql,
    encoding: PayloadEncoding,
}

impl SlowQueryReservoir {
    pub fn new(config: &Config) -> Self {
        Self {
            samples: HashMap::new(),
            max_samples: config.slow_sql_max_samples,
            explain_threshold_ms: config.explain_threshold.as_secs_f64() * 1000.0,
            record_sql: config.record_sql,
            encoding: PayloadEncoding::from_simple_compression(config.simple_compression),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, normalized: &str) -> Option<&QuerySample> {
        self.samples.get(normalized)
    }

    pub fn add(&mut self, query: SlowQuery) {
        match self.samples.get_mut(&query.normalized) {
            Some(existing) => existing.aggregate(query),
            None => {
                self.samples
                    .insert(query.normalized.clone(), QuerySample::new(query));
            }
        }
    }

    pub fn merge(&mut self, other: SlowQueryReservoir) {
        for (key, sample) in other.samples {
            match self.samples.get_mut(&key) {
                Some(existing) => existing.merge(sample),
                None => {
                    self.samples.insert(key, sample);
                }
            }
        }
    }

    pub fn collect_from(&mut self, transaction: &FinishedTransaction) -> usize {
        let mut added = 0;
        for (_, segment) in transaction.trace.iter() {
            let Some(sql) = segment.attribute(SQL_ATTRIBUTE).and_then(AttrValue::as_str) else {
                continue;
            };
            let duration = segment.duration_ms();
            if duration <= self.explain_threshold_ms {
                continue;
            }
            let params: Map<String, Value> = segment
                .attributes()
                .iter()
                .filter(|(key, _)| key.as_str() != SQL_ATTRIBUTE)
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect();
            let query = SlowQuery::new(sql, segment.name(), duration, params, transaction);
            self.add(query);
            added += 1;
        }
        added
    }

    pub fn take(&mut self) -> SlowQueryReservoir {
        let mut taken = self.clone_settings();
        std::mem::swap(&mut taken.samples, &mut self.samples);
        taken
    }

    pub fn prepare_json(&self) -> Result<Value> {
        let mut samples: Vec<&QuerySample> = self.samples.values().collect();
        samples.sort_by(|a, b| b.sample.duration_ms.total_cmp(&a.sample.duration_ms));
        samples.truncate(self.max_samples);
        let rows = samples
            .into_iter()
            .map(|sample| sample.to_json(self.record_sql, self.encoding))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Array(rows))
    }

    fn clone_settings(&self) -> Self {
        Self {
            samples: HashMap::new(),
            max_samples: self.max_samples,
            explain_threshold_ms: self.explain_threshold_ms,
            record_sql: self.record_sql,
            encoding: self.encoding,
        }
    }
}
