use std::sync::{Mutex, MutexGuard};

use apm_core::{ApmError, Result};
use apm_trace::Metrics;

#[derive(Debug)]
pub struct MetricRegistry {
    apdex_t_ms: f64,
    metrics: Mutex<Metrics>,
}

impl MetricRegistry {
    pub fn new(apdex_t_ms: f64) -> Self {
        Self {
            apdex_t_ms,
            metrics: Mutex::new(Metrics::new(apdex_t_ms)),
        }
    }

    pub fn merge(&self, metrics: &Metrics) -> Result<()> {
        self.lock()?.merge(Some(metrics));
        Ok(())
    }

    pub fn take(&self) -> Result<Metrics> {
        let mut guard = self.lock()?;
        Ok(std::mem::replace(&mut *guard, Metrics::new(self.apdex_t_ms)))
    }

    pub fn fold_back(&self, metrics: Metrics) -> Result<()> {
        self.merge(&metrics)
    }

    pub fn snapshot(&self) -> Result<Metrics> {
        Ok(self.lock()?.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Metrics>> {
        self.metrics
            .lock()
            .map_err(|_| ApmError::Internal("metric registry lock poisoned".into()))
    }
}
