use std::time::Instant;

use apm_core::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Pending,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Timer {
    state: TimerState,
    start: Option<f64>,
    hr_start: Option<Instant>,
    duration: Option<f64>,
    touched: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            state: TimerState::Pending,
            start: None,
            hr_start: None,
            duration: None,
            touched: false,
        }
    }

    pub fn start(&mut self) {
        if self.state != TimerState::Pending {
            return;
        }
        if self.start.is_none() {
            self.start = Some(now_ms());
        }
        self.hr_start = Some(Instant::now());
        self.state = TimerState::Running;
    }

    pub fn end(&mut self) {
        if self.state != TimerState::Running {
            return;
        }
        self.duration = Some(self.elapsed_ms());
        self.state = TimerState::Stopped;
    }

    pub fn touch(&mut self) {
        if self.state != TimerState::Running {
            return;
        }
        self.touched = true;
        self.duration = Some(self.elapsed_ms());
    }

    pub fn soft_end(&mut self) -> bool {
        if self.state != TimerState::Running {
            return false;
        }
        if !self.touched && self.duration.is_none() {
            self.touch();
        }
        self.state = TimerState::Stopped;
        true
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn start_ms(&self) -> f64 {
        self.start.unwrap_or(0.0)
    }

    pub fn get_duration_in_millis(&self) -> f64 {
        match (self.duration, self.state) {
            (Some(d), _) => d.max(0.0),
            (None, TimerState::Running) => self.elapsed_ms(),
            (None, _) => 0.0,
        }
    }

    pub fn set_duration_in_millis(&mut self, duration: f64, start: Option<f64>) {
        self.state = TimerState::Stopped;
        self.duration = Some(duration.max(0.0));
        if let Some(start) = start {
            self.start = Some(start);
        }
    }

    pub fn overwrite_duration_in_millis(&mut self, duration: f64) {
        self.duration = Some(duration.max(0.0));
    }

    pub fn end_ms(&self) -> f64 {
        self.start_ms() + self.get_duration_in_millis()
    }

    pub fn started_relative_to(&self, other: &Timer) -> f64 {
        self.start_ms() - other.start_ms()
    }

    pub fn ends_after(&self, other: &Timer) -> bool {
        self.end_ms() > other.end_ms()
    }

    fn elapsed_ms(&self) -> f64 {
        self.hr_start
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}
