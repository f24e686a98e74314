use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::stats::{ApdexStats, Stats};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    apdex_t_ms: f64,
    unscoped: BTreeMap<String, Stats>,
    scoped: BTreeMap<String, BTreeMap<String, Stats>>,
    apdex: BTreeMap<String, ApdexStats>,
}

impl Metrics {
    pub fn new(apdex_t_ms: f64) -> Self {
        Self {
            apdex_t_ms,
            ..Self::default()
        }
    }

    pub fn apdex_t_ms(&self) -> f64 {
        self.apdex_t_ms
    }

    pub fn measure_milliseconds(
        &mut self,
        name: &str,
        scope: Option<&str>,
        duration_ms: f64,
        exclusive_ms: Option<f64>,
    ) {
        self.get_or_create_metric(name, scope)
            .record_value_in_millis(duration_ms, exclusive_ms);
    }

    pub fn get_or_create_metric(&mut self, name: &str, scope: Option<&str>) -> &mut Stats {
        let bucket = match scope {
            Some(scope) => self.scoped.entry(scope.to_string()).or_default(),
            None => &mut self.unscoped,
        };
        bucket.entry(name.to_string()).or_default()
    }

    pub fn get_metric(&self, name: &str, scope: Option<&str>) -> Option<&Stats> {
        match scope {
            Some(scope) => self.scoped.get(scope)?.get(name),
            None => self.unscoped.get(name),
        }
    }

    pub fn get_or_create_apdex_metric(
        &mut self,
        name: &str,
        apdex_t_ms: Option<f64>,
    ) -> &mut ApdexStats {
        let default_t = self.apdex_t_ms;
        self.apdex
            .entry(name.to_string())
            .or_insert_with(|| ApdexStats::new(apdex_t_ms.unwrap_or(default_t)))
    }

    pub fn get_apdex_metric(&self, name: &str) -> Option<&ApdexStats> {
        self.apdex.get(name)
    }

    pub fn len(&self) -> usize {
        self.unscoped.len() + self.scoped.values().map(BTreeMap::len).sum::<usize>()
            + self.apdex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unscoped_names(&self) -> impl Iterator<Item = &str> {
        self.unscoped.keys().map(String::as_str)
    }

    pub fn merge(&mut self, other: Option<&Metrics>) {
        let Some(other) = other else {
            return;
        };
        for (name, stats) in &other.unscoped {
            self.get_or_create_metric(name, None).merge(stats);
        }
        for (scope, metrics) in &other.scoped {
            for (name, stats) in metrics {
                self.get_or_create_metric(name, Some(scope)).merge(stats);
            }
        }
        for (name, apdex) in &other.apdex {
            self.apdex
                .entry(name.clone())
                .or_insert_with(|| ApdexStats::new(apdex.apdex_t * 1000.0))
                .merge(apdex);
        }
    }

    pub fn to_json(&self) -> Value {
        let mut out = Vec::with_capacity(self.len());
        for (name, stats) in &self.unscoped {
            out.push(json!([{"name": name}, stats]));
        }
        for (name, apdex) in &self.apdex {
            out.push(json!([{"name": name}, apdex]));
        }
        for (scope, metrics) in &self.scoped {
            for (name, stats) in metrics {
                out.push(json!([{"name": name, "scope": scope}, stats]));
            }
        }
        Value::Array(out)
    }
}
