pub mod exclusive;
pub mod segment;
pub mod serialize;

use tracing::debug;

use crate::attributes::{AttrValue, Attributes};
use crate::recorders::Recorder;

pub use segment::{Segment, SegmentHandle};
pub use serialize::{PayloadEncoding, TraceInfo};

pub const ROOT_NAME: &str = "ROOT";
pub const TRUNCATED_PREFIX: &str = "Truncated/";
pub const EXCLUSIVE_DURATION_ATTRIBUTE: &str = "nr_exclusive_duration_millis";
pub const DEFAULT_MAX_SEGMENTS: usize = 900;

#[derive(Debug, Clone)]
pub struct Trace {
    segments: Vec<Segment>,
    segments_seen: usize,
    max_segments: usize,
    attributes: Attributes,
    ended: bool,
}

impl Default for Trace {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEGMENTS)
    }
}

impl Trace {
    pub fn new(max_segments: usize) -> Self {
        let mut root = Segment::new(ROOT_NAME, None);
        root.start();
        Self {
            segments: vec![root],
            segments_seen: 0,
            max_segments,
            attributes: Attributes::new(),
            ended: false,
        }
    }

    pub fn root(&self) -> SegmentHandle {
        SegmentHandle(0)
    }

    pub fn root_segment(&self) -> &Segment {
        &self.segments[0]
    }

    pub fn root_segment_mut(&mut self) -> &mut Segment {
        &mut self.segments[0]
    }

    pub fn segment(&self, handle: SegmentHandle) -> Option<&Segment> {
        self.segments.get(handle.0)
    }

    pub fn segment_mut(&mut self, handle: SegmentHandle) -> Option<&mut Segment> {
        self.segments.get_mut(handle.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentHandle, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .map(|(i, s)| (SegmentHandle(i), s))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.len() <= 1
    }

    pub fn segments_seen(&self) -> usize {
        self.segments_seen
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn start_ms(&self) -> f64 {
        self.root_segment().timer.start_ms()
    }

    pub fn duration_ms(&self) -> f64 {
        self.root_segment().duration_ms()
    }

    pub fn add(
        &mut self,
        name: impl Into<String>,
        recorder: Option<Recorder>,
        parent: Option<SegmentHandle>,
    ) -> Option<SegmentHandle> {
        let parent = parent.unwrap_or(self.root());
        let parent_segment = self.segments.get(parent.0)?;
        if parent_segment.opaque {
            return None;
        }

        self.segments_seen += 1;
        let handle = SegmentHandle(self.segments.len());
        let mut segment = Segment::new(name, Some(parent));
        segment.collect = self.segments_seen <= self.max_segments;
        if !segment.collect && self.segments_seen == self.max_segments + 1 {
            debug!(
                max_segments = self.max_segments,
                "segment cap reached, further segments are not collected"
            );
        }
        segment.recorder = recorder;
        segment.start();
        self.segments.push(segment);

        let parent_segment = &mut self.segments[parent.0];
        parent_segment.children.push(handle);
        parent_segment.touch();
        Some(handle)
    }

    pub fn end_segment(&mut self, handle: SegmentHandle) {
        let Some(segment) = self.segments.get_mut(handle.0) else {
            return;
        };
        if !segment.is_running() {
            return;
        }
        segment.timer.end();
        self.update_root_timer(handle);
    }

    pub fn touch_segment(&mut self, handle: SegmentHandle) {
        if let Some(segment) = self.segments.get_mut(handle.0) {
            segment.touch();
        }
    }

    /// Duration of `handle` not covered by any of its children. Child
    /// intervals are clipped to the parent's own window, so an async child
    /// outliving its parent only covers the overlap.
    pub fn exclusive_duration_ms(&self, handle: SegmentHandle) -> f64 {
        let Some(segment) = self.segments.get(handle.0) else {
            return 0.0;
        };
        let duration = segment.duration_ms();
        let window_start = segment.timer.start_ms();
        let window_end = window_start + duration;
        let intervals = segment
            .children
            .iter()
            .map(|child| {
                let timer = &self.segments[child.0].timer;
                (
                    timer.start_ms().max(window_start),
                    timer.end_ms().min(window_end),
                )
            })
            .collect();
        exclusive::exclusive_duration(duration, intervals)
    }

    pub fn total_time_ms(&self) -> f64 {
        (1..self.segments.len())
            .map(|i| self.exclusive_duration_ms(SegmentHandle(i)))
            .sum()
    }

    /// Ends the root and finalizes the tree. Later calls do nothing.
    ///
    /// Segments still running are closed at their last known duration and
    /// renamed with [`TRUNCATED_PREFIX`]. The root is stretched to cover any
    /// segment ending after it. Afterwards every segment gets its
    /// exclusive duration written to [`EXCLUSIVE_DURATION_ATTRIBUTE`].
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.segments[0].timer.end();

        for i in 1..self.segments.len() {
            let segment = &mut self.segments[i];
            if segment.timer.soft_end() {
                segment.name = format!("{TRUNCATED_PREFIX}{}", segment.name);
            }
            self.update_root_timer(SegmentHandle(i));
        }

        for i in 0..self.segments.len() {
            let exclusive = self.exclusive_duration_ms(SegmentHandle(i));
            self.segments[i].attributes.insert(
                EXCLUSIVE_DURATION_ATTRIBUTE.to_string(),
                AttrValue::Float(exclusive),
            );
        }
    }

    fn update_root_timer(&mut self, handle: SegmentHandle) {
        if handle.0 == 0 {
            return;
        }
        let root = &self.segments[0].timer;
        if root.is_running() {
            return;
        }
        let timer = &self.segments[handle.0].timer;
        if timer.ends_after(root) {
            let stretched = timer.end_ms() - root.start_ms();
            self.segments[0]
                .timer
                .overwrite_duration_in_millis(stretched);
        }
    }
}
