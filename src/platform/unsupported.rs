use crate::delegate::DelegateHandle;
use crate::error::{MalformedSample, PlatformError};
use crate::frame::{MediaTime, PlaneLayout};
use crate::stream::{CaptureStream, SampleBuffer};
use crate::types::{Rect, Size, StreamConfig};

/// A sample type that can never exist.
#[derive(Debug)]
pub enum NoSample {}

impl SampleBuffer for NoSample {
    fn fourcc(&self) -> u32 {
        match *self {}
    }
    fn size(&self) -> Size {
        match *self {}
    }
    fn plane_count(&self) -> usize {
        match *self {}
    }
    fn plane_layout(&self, _index: usize) -> PlaneLayout {
        match *self {}
    }
    fn crop(&self) -> Rect {
        match *self {}
    }
    fn timestamp(&self) -> MediaTime {
        match *self {}
    }
    fn with_planes<R>(&self, _f: impl FnOnce(&[u8], &[u8]) -> R) -> Result<R, MalformedSample> {
        match *self {}
    }
}

/// Stand-in stream for platforms without a supported capture facility.
/// Activation always fails, so `start` reports `CaptureUnavailable`.
#[derive(Debug, Default)]
pub struct UnsupportedStream;

impl CaptureStream for UnsupportedStream {
    type Sample = NoSample;

    fn activate(
        &mut self,
        _config: &StreamConfig,
        _delegate: DelegateHandle<NoSample>,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn deactivate(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }
}
