use apm_core::Result;
use serde_json::{Map, Value, json};

use super::{SegmentHandle, Trace};
use crate::attributes::attributes_to_json;
use crate::codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Deflate,
    Raw,
}

impl PayloadEncoding {
    pub fn from_simple_compression(simple: bool) -> Self {
        if simple { Self::Raw } else { Self::Deflate }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceInfo {
    pub name: String,
    pub url: Option<String>,
    pub transaction_id: String,
    pub duration_ms: f64,
    pub intrinsics: Map<String, Value>,
}

impl Trace {
    pub fn segment_to_json(&self, handle: SegmentHandle) -> Value {
        let Some(segment) = self.segment(handle) else {
            return Value::Null;
        };
        let root = &self.root_segment().timer;
        let start = segment.timer.started_relative_to(root);
        let end = start + segment.duration_ms();
        let children: Vec<Value> = segment
            .children
            .iter()
            .filter(|child| self.segments[child.0].collect)
            .map(|child| self.segment_to_json(*child))
            .collect();

        json!([
            start,
            end,
            segment.name,
            attributes_to_json(&segment.attributes),
            children,
        ])
    }

    pub fn body_json(&self, info: &TraceInfo) -> Value {
        json!([
            self.start_ms() / 1000.0,
            {},
            {"nr_flatten_leading": false},
            self.segment_to_json(self.root()),
            {
                "agentAttributes": {},
                "userAttributes": attributes_to_json(&self.attributes),
                "intrinsics": info.intrinsics,
            },
            [],
        ])
    }

    pub fn generate_json(&self, info: &TraceInfo, encoding: PayloadEncoding) -> Result<Value> {
        let body = self.body_json(info);
        let data = match encoding {
            PayloadEncoding::Deflate => Value::String(codec::encode(&body)?),
            PayloadEncoding::Raw => body,
        };
        Ok(self.wire_array(info, data))
    }

    pub async fn generate_json_async(
        &self,
        info: &TraceInfo,
        encoding: PayloadEncoding,
    ) -> Result<Value> {
        let body = self.body_json(info);
        let data = match encoding {
            PayloadEncoding::Deflate => Value::String(codec::encode_async(body).await?),
            PayloadEncoding::Raw => body,
        };
        Ok(self.wire_array(info, data))
    }

    fn wire_array(&self, info: &TraceInfo, data: Value) -> Value {
        json!([
            self.start_ms() / 1000.0,
            info.duration_ms,
            info.name,
            info.url,
            data,
            info.transaction_id,
            null,
            false,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> TraceInfo {
        TraceInfo {
            name: "WebTransaction/Uri/users".to_string(),
            url: Some("/users".to_string()),
            transaction_id: "0123456789abcdef".to_string(),
            duration_ms: 42.0,
            intrinsics: Map::new(),
        }
    }

    fn small_trace() -> Trace {
        let mut trace = Trace::default();
        let start = trace.start_ms();
        let child = trace.add("Datastore/operation/Redis/get", None, None).unwrap();
        trace
            .segment_mut(child)
            .unwrap()
            .add_attribute("host", "cache-1");
        trace
            .segment_mut(child)
            .unwrap()
            .timer_mut()
            .set_duration_in_millis(4.0, Some(start + 1.0));
        trace
            .root_segment_mut()
            .timer_mut()
            .set_duration_in_millis(10.0, Some(start));
        trace.end();
        trace
    }

    #[test]
    fn segment_array_is_positional() {
        let trace = small_trace();
        let root = trace.segment_to_json(trace.root());
        assert_eq!(root[0], json!(0.0));
        assert_eq!(root[1], json!(10.0));
        assert_eq!(root[2], json!("ROOT"));
        let child = &root[4][0];
        assert_eq!(child[0], json!(1.0));
        assert_eq!(child[1], json!(5.0));
        assert_eq!(child[3]["host"], json!("cache-1"));
        assert_eq!(child[3]["nr_exclusive_duration_millis"], json!(4.0));
        assert_eq!(child[4], json!([]));
    }

    #[test]
    fn wire_array_layout() {
        let trace = small_trace();
        let wire = trace.generate_json(&info(), PayloadEncoding::Raw).unwrap();
        let fields = wire.as_array().unwrap();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[1], json!(42.0));
        assert_eq!(fields[2], json!("WebTransaction/Uri/users"));
        assert_eq!(fields[3], json!("/users"));
        assert_eq!(fields[5], json!("0123456789abcdef"));
        assert_eq!(fields[6], Value::Null);
        assert_eq!(fields[7], json!(false));
        assert_eq!(fields[4][3], trace.segment_to_json(trace.root()));
    }

    #[test]
    fn deflated_body_decodes_to_raw_body() {
        let trace = small_trace();
        let deflated = trace
            .generate_json(&info(), PayloadEncoding::Deflate)
            .unwrap();
        let raw = trace.generate_json(&info(), PayloadEncoding::Raw).unwrap();
        let decoded = codec::decode(deflated[4].as_str().unwrap()).unwrap();
        assert_eq!(decoded, raw[4]);
    }

    #[test]
    fn uncollected_segments_are_left_out() {
        let mut trace = Trace::new(1);
        trace.add("kept", None, None).unwrap();
        trace.add("dropped", None, None).unwrap();
        trace.end();
        let root = trace.segment_to_json(trace.root());
        assert_eq!(root[4].as_array().unwrap().len(), 1);
        assert_eq!(root[4][0][2], json!("Truncated/kept"));
    }

    #[tokio::test]
    async fn async_matches_sync() {
        let trace = small_trace();
        for encoding in [PayloadEncoding::Deflate, PayloadEncoding::Raw] {
            let sync = trace.generate_json(&info(), encoding).unwrap();
            let asynchronous = trace.generate_json_async(&info(), encoding).await.unwrap();
            assert_eq!(sync, asynchronous);
        }
    }
}
