use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2_core_foundation::{CFArray, CFRetained};
use objc2_core_media::CMSampleBuffer;
use objc2_core_video::{
    CVPixelBuffer, CVPixelBufferGetBaseAddressOfPlane, CVPixelBufferGetBytesPerRowOfPlane,
    CVPixelBufferGetHeight, CVPixelBufferGetHeightOfPlane, CVPixelBufferGetPixelFormatType,
    CVPixelBufferGetPlaneCount, CVPixelBufferGetWidth, CVPixelBufferGetWidthOfPlane,
    CVPixelBufferLockBaseAddress, CVPixelBufferLockFlags, CVPixelBufferUnlockBaseAddress,
    kCVReturnSuccess,
};
use objc2_foundation::{NSArray, NSDictionary, NSNumber, NSString};
use objc2_screen_capture_kit::{
    SCFrameStatus, SCStreamFrameInfoContentRect, SCStreamFrameInfoScaleFactor,
    SCStreamFrameInfoStatus,
};

use crate::error::MalformedSample;
use crate::frame::{MediaTime, PlaneLayout};
use crate::stream::SampleBuffer;
use crate::types::{Rect, Size};

type FrameInfo = NSDictionary<NSString, AnyObject>;

/// A captured screen sample backed by a retained `CVPixelBuffer`.
///
/// Holding one keeps the native buffer alive (and out of the capture pool)
/// until it is dropped; no pixel data is copied.
pub struct MacosSample {
    pixel_buffer: CFRetained<CVPixelBuffer>,
    crop: Rect,
    timestamp: MediaTime,
}

// SAFETY: CVPixelBuffer retain/release is thread-safe, and plane memory is
// only read between a read-only lock and unlock.
unsafe impl Send for MacosSample {}

impl MacosSample {
    /// Retain the image buffer of a complete screen sample.
    ///
    /// Returns `None` for samples ScreenCaptureKit marks as idle, blank or
    /// otherwise incomplete, and for samples that carry no image.
    pub(crate) fn from_sample_buffer(sample_buffer: &CMSampleBuffer) -> Option<Self> {
        let info = frame_info(sample_buffer);
        if let Some(status) = info
            .as_deref()
            .and_then(|info| number(info, unsafe { SCStreamFrameInfoStatus }))
        {
            let status = SCFrameStatus(status.integerValue());
            if status != SCFrameStatus::Complete {
                tracing::trace!(status = status.0, "incomplete sample skipped");
                return None;
            }
        }

        let Some(pixel_buffer) = (unsafe { sample_buffer.image_buffer() }) else {
            tracing::trace!("sample without image buffer");
            return None;
        };

        let cm_time = unsafe { sample_buffer.presentation_time_stamp() };
        let timestamp = MediaTime {
            value: cm_time.value,
            timescale: cm_time.timescale,
            flags: cm_time.flags.0,
            epoch: cm_time.epoch,
        };

        let size = Size {
            width: unsafe { CVPixelBufferGetWidth(&pixel_buffer) } as u32,
            height: unsafe { CVPixelBufferGetHeight(&pixel_buffer) } as u32,
        };
        let (content, scale_factor) = match info.as_deref() {
            Some(info) => (
                content_rect(info),
                number(info, unsafe { SCStreamFrameInfoScaleFactor })
                    .map_or(1.0, |n| n.doubleValue()),
            ),
            None => (None, 1.0),
        };

        Some(MacosSample {
            pixel_buffer,
            crop: content_to_crop(content, scale_factor, size),
            timestamp,
        })
    }
}

/// The `SCStreamFrameInfo` dictionary attached to a sample.
fn frame_info(sample_buffer: &CMSampleBuffer) -> Option<Retained<FrameInfo>> {
    let attachments = unsafe { sample_buffer.sample_attachments_array(false) }?;
    // CFArray is toll-free bridged to NSArray.
    let attachments: *const CFArray = &*attachments;
    let attachments = unsafe { &*attachments.cast::<NSArray<FrameInfo>>() };
    attachments.firstObject()
}

fn number(info: &FrameInfo, key: &NSString) -> Option<Retained<NSNumber>> {
    info.objectForKey(key)?.downcast::<NSNumber>().ok()
}

/// The content rect as `[x, y, width, height]` in points, from its
/// `CGRect` dictionary representation.
fn content_rect(info: &FrameInfo) -> Option<[f64; 4]> {
    let rect = info
        .objectForKey(unsafe { SCStreamFrameInfoContentRect })?
        .downcast::<NSDictionary>()
        .ok()?;
    let field = |name: &str| {
        let key = NSString::from_str(name);
        rect.objectForKey(&key)?
            .downcast::<NSNumber>()
            .ok()
            .map(|n| n.doubleValue())
    };
    Some([field("X")?, field("Y")?, field("Width")?, field("Height")?])
}

/// Convert the content rect (points) to a whole-pixel crop inside the
/// buffer, falling back to the full buffer when it is missing or empty.
fn content_to_crop(content: Option<[f64; 4]>, scale_factor: f64, size: Size) -> Rect {
    let Some([x, y, width, height]) = content else {
        return Rect::full(size);
    };
    let scale = if scale_factor.is_finite() && scale_factor > 0.0 {
        scale_factor
    } else {
        1.0
    };
    let (width, height) = (width * scale, height * scale);
    if !(width >= 1.0 && height >= 1.0) {
        return Rect::full(size);
    }
    let x = ((x * scale).max(0.0).round() as u32).min(size.width);
    let y = ((y * scale).max(0.0).round() as u32).min(size.height);
    Rect {
        x,
        y,
        width: (width.round() as u32).min(size.width - x),
        height: (height.round() as u32).min(size.height - y),
    }
}

impl SampleBuffer for MacosSample {
    fn fourcc(&self) -> u32 {
        unsafe { CVPixelBufferGetPixelFormatType(&self.pixel_buffer) }
    }

    fn size(&self) -> Size {
        Size {
            width: unsafe { CVPixelBufferGetWidth(&self.pixel_buffer) } as u32,
            height: unsafe { CVPixelBufferGetHeight(&self.pixel_buffer) } as u32,
        }
    }

    fn plane_count(&self) -> usize {
        unsafe { CVPixelBufferGetPlaneCount(&self.pixel_buffer) }
    }

    fn plane_layout(&self, index: usize) -> PlaneLayout {
        let pb = &self.pixel_buffer;
        unsafe {
            PlaneLayout {
                width: CVPixelBufferGetWidthOfPlane(pb, index),
                height: CVPixelBufferGetHeightOfPlane(pb, index),
                bytes_per_row: CVPixelBufferGetBytesPerRowOfPlane(pb, index),
            }
        }
    }

    fn crop(&self) -> Rect {
        self.crop
    }

    fn timestamp(&self) -> MediaTime {
        self.timestamp
    }

    fn with_planes<R>(&self, f: impl FnOnce(&[u8], &[u8]) -> R) -> Result<R, MalformedSample> {
        let pb = &self.pixel_buffer;
        let lock_flags = CVPixelBufferLockFlags::ReadOnly;
        if unsafe { CVPixelBufferLockBaseAddress(pb, lock_flags) } != kCVReturnSuccess {
            return Err(MalformedSample::Unreadable);
        }

        // SAFETY: the base address stays locked until the unlock below, and
        // the slices do not escape `f`.
        let planes = unsafe { (locked_plane(pb, 0), locked_plane(pb, 1)) };
        let result = match planes {
            (Some(luma), Some(chroma)) => Ok(f(luma, chroma)),
            _ => Err(MalformedSample::Unreadable),
        };

        unsafe {
            CVPixelBufferUnlockBaseAddress(pb, lock_flags);
        }
        result
    }
}

/// Borrow one plane of a pixel buffer.
///
/// # Safety
///
/// The buffer's base address must be locked for as long as the slice lives.
unsafe fn locked_plane(pb: &CVPixelBuffer, index: usize) -> Option<&[u8]> {
    let base = unsafe { CVPixelBufferGetBaseAddressOfPlane(pb, index) };
    if base.is_null() {
        return None;
    }
    let len = unsafe {
        CVPixelBufferGetBytesPerRowOfPlane(pb, index) * CVPixelBufferGetHeightOfPlane(pb, index)
    };
    Some(unsafe { std::slice::from_raw_parts(base as *const u8, len) })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: Size = Size {
        width: 1280,
        height: 720,
    };

    #[test]
    fn letterboxed_content_scales_to_pixels() {
        // A 4:3 window pillarboxed in a 16:9 buffer on a 2x display.
        let crop = content_to_crop(Some([80.0, 0.0, 480.0, 360.0]), 2.0, SIZE);
        assert_eq!(crop, Rect::new(160, 0, 960, 720));
    }

    #[test]
    fn rounding_stays_inside_buffer() {
        let crop = content_to_crop(Some([0.4, 0.0, 640.4, 360.3]), 2.0, SIZE);
        assert_eq!(crop, Rect::new(1, 0, 1279, 720));
        assert!(crop.fits_within(SIZE));
    }

    #[test]
    fn missing_or_empty_content_uses_full_buffer() {
        assert_eq!(content_to_crop(None, 2.0, SIZE), Rect::full(SIZE));
        assert_eq!(
            content_to_crop(Some([0.0, 0.0, 0.0, 0.0]), 1.0, SIZE),
            Rect::full(SIZE)
        );
        assert_eq!(
            content_to_crop(Some([0.0, 0.0, f64::NAN, 10.0]), 1.0, SIZE),
            Rect::full(SIZE)
        );
    }

    #[test]
    fn bad_scale_factor_is_ignored() {
        let crop = content_to_crop(Some([10.0, 20.0, 100.0, 50.0]), 0.0, SIZE);
        assert_eq!(crop, Rect::new(10, 20, 100, 50));
    }
}
