use apm_core::ids::SpanId;

use crate::attributes::{AttrValue, Attributes};
use crate::recorders::Recorder;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentHandle(pub(crate) usize);

impl SegmentHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub(crate) id: SpanId,
    pub(crate) name: String,
    pub(crate) parent: Option<SegmentHandle>,
    pub(crate) children: Vec<SegmentHandle>,
    pub(crate) timer: Timer,
    pub(crate) attributes: Attributes,
    pub(crate) opaque: bool,
    pub(crate) collect: bool,
    pub(crate) recorder: Option<Recorder>,
}

impl Segment {
    pub(crate) fn new(name: impl Into<String>, parent: Option<SegmentHandle>) -> Self {
        Self {
            id: SpanId::random(),
            name: name.into(),
            parent,
            children: Vec::new(),
            timer: Timer::new(),
            attributes: Attributes::new(),
            opaque: false,
            collect: true,
            recorder: None,
        }
    }

    pub fn id(&self) -> &SpanId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn parent(&self) -> Option<SegmentHandle> {
        self.parent
    }

    pub fn children(&self) -> &[SegmentHandle] {
        &self.children
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn set_opaque(&mut self, opaque: bool) {
        self.opaque = opaque;
    }

    pub fn collect(&self) -> bool {
        self.collect
    }

    pub fn recorder(&self) -> Option<Recorder> {
        self.recorder
    }

    pub fn set_recorder(&mut self, recorder: Recorder) {
        self.recorder = Some(recorder);
    }

    pub fn start(&mut self) {
        self.timer.start();
    }

    pub fn touch(&mut self) {
        self.timer.touch();
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn duration_ms(&self) -> f64 {
        self.timer.get_duration_in_millis()
    }

    pub fn finalized_exclusive_ms(&self) -> Option<f64> {
        self.attributes
            .get(super::EXCLUSIVE_DURATION_ATTRIBUTE)
            .and_then(AttrValue::as_f64)
    }
}
