use std::sync::Mutex;

use tracing::debug;

#[derive(Debug)]
pub struct AdaptiveSampler {
    target: usize,
    state: Mutex<SamplerState>,
}

#[derive(Debug, Default)]
struct SamplerState {
    first_period: bool,
    seen: usize,
    sampled: usize,
    threshold: f64,
}

impl AdaptiveSampler {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            state: Mutex::new(SamplerState {
                first_period: true,
                ..SamplerState::default()
            }),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn should_sample(&self, priority: f64) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        state.seen += 1;
        let sample = if state.first_period {
            state.sampled < self.target
        } else {
            state.sampled < self.target * 2 && priority >= state.threshold
        };
        if sample {
            state.sampled += 1;
        }
        sample
    }

    pub fn next_period(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let seen = state.seen;
        state.threshold = if seen == 0 {
            0.0
        } else {
            1.0 - (self.target as f64 / seen as f64).min(1.0)
        };
        debug!(
            seen,
            sampled = state.sampled,
            threshold = state.threshold,
            "sampler period rolled over"
        );
        state.first_period = false;
        state.seen = 0;
        state.sampled = 0;
    }

    pub fn threshold(&self) -> f64 {
        self.state.lock().map(|s| s.threshold).unwrap_or(1.0)
    }
}
