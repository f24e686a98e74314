use crate::recorders::Recorder;
use crate::trace::SegmentHandle;

pub trait SegmentFactory {
    fn create_segment(&mut self, name: &str, parent: Option<SegmentHandle>) -> Option<SegmentHandle>;

    fn create_recorded_segment(
        &mut self,
        name: &str,
        recorder: Recorder,
        parent: Option<SegmentHandle>,
    ) -> Option<SegmentHandle>;

    fn end_segment(&mut self, handle: SegmentHandle);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    segment: Option<SegmentHandle>,
}

impl Context {
    pub fn root() -> Self {
        Self { segment: None }
    }

    pub fn child_of(segment: SegmentHandle) -> Self {
        Self {
            segment: Some(segment),
        }
    }

    pub fn segment(&self) -> Option<SegmentHandle> {
        self.segment
    }

    pub fn enter<F: SegmentFactory + ?Sized>(&self, factory: &mut F, name: &str) -> Option<Context> {
        factory
            .create_segment(name, self.segment)
            .map(Context::child_of)
    }

    pub fn enter_recorded<F: SegmentFactory + ?Sized>(
        &self,
        factory: &mut F,
        name: &str,
        recorder: Recorder,
    ) -> Option<Context> {
        factory
            .create_recorded_segment(name, recorder, self.segment)
            .map(Context::child_of)
    }

    pub fn exit<F: SegmentFactory + ?Sized>(&self, factory: &mut F) {
        if let Some(segment) = self.segment {
            factory.end_segment(segment);
        }
    }
}
