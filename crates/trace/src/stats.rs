use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub count: u64,
    pub total: f64,
    pub total_exclusive: f64,
    pub min: f64,
    pub max: f64,
    pub sum_of_squares: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_value(&mut self, value: f64, exclusive: Option<f64>) {
        if self.count > 0 {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        } else {
            self.min = value;
            self.max = value;
        }
        self.sum_of_squares += value * value;
        self.count += 1;
        self.total += value;
        self.total_exclusive += exclusive.unwrap_or(value);
    }

    pub fn record_value_in_millis(&mut self, duration_ms: f64, exclusive_ms: Option<f64>) {
        self.record_value(duration_ms / 1000.0, exclusive_ms.map(|v| v / 1000.0));
    }

    pub fn increment_call_count(&mut self, count: u64) {
        self.count += count;
    }

    pub fn merge(&mut self, other: &Stats) {
        if other.count > 0 {
            if self.count > 0 {
                self.min = self.min.min(other.min);
                self.max = self.max.max(other.max);
            } else {
                self.min = other.min;
                self.max = other.max;
            }
        }
        self.total += other.total;
        self.total_exclusive += other.total_exclusive;
        self.sum_of_squares += other.sum_of_squares;
        self.count += other.count;
    }
}

impl Serialize for Stats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(6))?;
        seq.serialize_element(&self.count)?;
        seq.serialize_element(&self.total)?;
        seq.serialize_element(&self.total_exclusive)?;
        seq.serialize_element(&self.min)?;
        seq.serialize_element(&self.max)?;
        seq.serialize_element(&self.sum_of_squares)?;
        seq.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApdexZone {
    Satisfying,
    Tolerating,
    Frustrating,
}

impl ApdexZone {
    pub fn classify(duration_ms: f64, apdex_t_ms: f64) -> Self {
        if duration_ms <= apdex_t_ms {
            Self::Satisfying
        } else if duration_ms <= 4.0 * apdex_t_ms {
            Self::Tolerating
        } else {
            Self::Frustrating
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApdexStats {
    pub satisfying: u64,
    pub tolerating: u64,
    pub frustrating: u64,
    pub apdex_t: f64,
}

impl ApdexStats {
    pub fn new(apdex_t_ms: f64) -> Self {
        Self {
            apdex_t: apdex_t_ms / 1000.0,
            ..Self::default()
        }
    }

    pub fn record_value_in_millis(&mut self, duration_ms: f64) {
        let zone = ApdexZone::classify(duration_ms, self.apdex_t * 1000.0);
        self.increment(zone);
    }

    pub fn increment(&mut self, zone: ApdexZone) {
        match zone {
            ApdexZone::Satisfying => self.satisfying += 1,
            ApdexZone::Tolerating => self.tolerating += 1,
            ApdexZone::Frustrating => self.frustrating += 1,
        }
    }

    pub fn buckets(&self) -> [u64; 3] {
        [self.satisfying, self.tolerating, self.frustrating]
    }

    pub fn merge(&mut self, other: &ApdexStats) {
        self.satisfying += other.satisfying;
        self.tolerating += other.tolerating;
        self.frustrating += other.frustrating;
        if self.apdex_t == 0.0 {
            self.apdex_t = other.apdex_t;
        }
    }
}

impl Serialize for ApdexStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(6))?;
        seq.serialize_element(&self.satisfying)?;
        seq.serialize_element(&self.tolerating)?;
        seq.serialize_element(&self.frustrating)?;
        seq.serialize_element(&self.apdex_t)?;
        seq.serialize_element(&self.apdex_t)?;
        seq.serialize_element(&0)?;
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_sets_min_and_max() {
        let mut stats = Stats::new();
        stats.record_value(5.0, None);
        assert_eq!(stats.min, 5.0);
        assert_eq!(stats.max, 5.0);
        stats.record_value(2.0, Some(1.0));
        stats.record_value(9.0, Some(0.0));
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total, 16.0);
        assert_eq!(stats.total_exclusive, 6.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.sum_of_squares, 25.0 + 4.0 + 81.0);
    }

    #[test]
    fn millis_are_stored_as_seconds() {
        let mut stats = Stats::new();
        stats.record_value_in_millis(1500.0, Some(500.0));
        assert_eq!(stats.total, 1.5);
        assert_eq!(stats.total_exclusive, 0.5);
    }

    #[test]
    fn merge_combines_fields() {
        let mut a = Stats::new();
        a.record_value(3.0, None);
        let mut b = Stats::new();
        b.record_value(1.0, None);
        b.record_value(7.0, None);

        a.merge(&b);
        assert_eq!(a.count, 3);
        assert_eq!(a.total, 11.0);
        assert_eq!(a.min, 1.0);
        assert_eq!(a.max, 7.0);
        assert_eq!(a.sum_of_squares, 9.0 + 1.0 + 49.0);
    }

    #[test]
    fn merge_into_empty_takes_other_bounds() {
        let mut empty = Stats::new();
        let mut other = Stats::new();
        other.record_value(4.0, None);
        empty.merge(&other);
        assert_eq!(empty.min, 4.0);
        assert_eq!(empty.max, 4.0);
    }

    #[test]
    fn merge_with_empty_is_noop() {
        let mut stats = Stats::new();
        stats.record_value(2.0, None);
        let before = stats.clone();
        stats.merge(&Stats::new());
        assert_eq!(stats, before);
    }

    #[test]
    fn serializes_positionally() {
        let mut stats = Stats::new();
        stats.record_value(2.0, Some(1.0));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json, serde_json::json!([1, 2.0, 1.0, 2.0, 2.0, 4.0]));
    }

    #[test]
    fn apdex_zones() {
        assert_eq!(ApdexZone::classify(100.0, 100.0), ApdexZone::Satisfying);
        assert_eq!(ApdexZone::classify(101.0, 100.0), ApdexZone::Tolerating);
        assert_eq!(ApdexZone::classify(400.0, 100.0), ApdexZone::Tolerating);
        assert_eq!(ApdexZone::classify(401.0, 100.0), ApdexZone::Frustrating);
    }

    #[test]
    fn apdex_serializes_threshold_twice() {
        let mut apdex = ApdexStats::new(500.0);
        apdex.record_value_in_millis(100.0);
        assert_eq!(apdex.buckets(), [1, 0, 0]);
        let json = serde_json::to_value(&apdex).unwrap();
        assert_eq!(json, serde_json::json!([1, 0, 0, 0.5, 0.5, 0]));
    }
}
