use arrayvec::ArrayVec;

use crate::delegate::DelegateHandle;
use crate::error::{MalformedSample, PlatformError};
use crate::frame::{FrameLayout, MAX_PLANES, MediaTime, PlaneLayout};
use crate::types::{Rect, StreamConfig, Size};

/// One captured sample as handed over by the native framework.
///
/// Implementations hold a retained reference to the native buffer; cloning or
/// moving one must never copy pixel data. The buffer stays owned by the
/// native side and is released when the value is dropped.
pub trait SampleBuffer: Send + 'static {
    /// Core Video style FourCC of the buffer's pixel format.
    fn fourcc(&self) -> u32;
    fn size(&self) -> Size;
    fn plane_count(&self) -> usize;
    fn plane_layout(&self, index: usize) -> PlaneLayout;
    /// Region of the buffer holding valid image data.
    fn crop(&self) -> Rect;
    fn timestamp(&self) -> MediaTime;

    /// Lock the buffer for reading and lend its luma and chroma planes to `f`.
    ///
    /// The slices are only valid inside `f`.
    fn with_planes<R>(&self, f: impl FnOnce(&[u8], &[u8]) -> R) -> Result<R, MalformedSample>;

    /// Validate the sample and capture its geometry.
    fn layout(&self) -> Result<FrameLayout, MalformedSample> {
        let count = self.plane_count();
        if count != MAX_PLANES {
            return Err(MalformedSample::PlaneCount(count));
        }
        let planes: ArrayVec<PlaneLayout, MAX_PLANES> =
            (0..count).map(|i| self.plane_layout(i)).collect();
        FrameLayout::validate(
            self.fourcc(),
            self.size(),
            &planes,
            self.crop(),
            self.timestamp(),
        )
    }
}

/// The native capture stream a session drives.
///
/// Implementations configure and run the platform capture facility and report
/// back through the [`DelegateHandle`] they were given. They never call
/// consumer code.
pub trait CaptureStream {
    type Sample: SampleBuffer;

    /// Configure and begin activating capture. Returns once activation has
    /// been initiated; the stream confirms with
    /// [`DelegateHandle::stream_started`] when frames will follow.
    fn activate(
        &mut self,
        config: &StreamConfig,
        delegate: DelegateHandle<Self::Sample>,
    ) -> Result<(), PlatformError>;

    /// Begin tearing down capture. Must not block on in-flight callbacks.
    fn deactivate(&mut self) -> Result<(), PlatformError>;
}
