use core::num::NonZeroU32;

/// Pixel formats a capture backend may hand us.
///
/// Only the biplanar 4:2:0 formats are accepted for delivery; the rest exist
/// so a backend can report what it actually produced before the sample is
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Biplanar Y'CbCr 4:2:0, video range (`420v`).
    Nv12,
    /// Biplanar Y'CbCr 4:2:0, full range (`420f`).
    Nv12FullRange,
    Bgra32,
    Yuyv,
    Uyvy,
}

impl PixelFormat {
    /// Whether frames in this format can be carried as a [`FrameDescriptor`].
    ///
    /// [`FrameDescriptor`]: crate::frame::FrameDescriptor
    pub fn is_biplanar_420(&self) -> bool {
        matches!(self, Self::Nv12 | Self::Nv12FullRange)
    }

    /// Map a Core Video style FourCC onto a known format.
    pub fn from_fourcc(fourcc: u32) -> Option<Self> {
        #[allow(clippy::mistyped_literal_suffixes)]
        match fourcc {
            0x34_32_30_76 => Some(Self::Nv12),          // '420v'
            0x34_32_30_66 => Some(Self::Nv12FullRange), // '420f'
            0x42_47_52_41 => Some(Self::Bgra32),        // 'BGRA'
            0x79_75_76_73 => Some(Self::Yuyv),          // 'yuvs'
            0x32_76_75_79 => Some(Self::Uyvy),          // '2vuy'
            _ => None,
        }
    }

    pub fn fourcc(&self) -> u32 {
        #[allow(clippy::mistyped_literal_suffixes)]
        match self {
            Self::Nv12 => 0x34_32_30_76,
            Self::Nv12FullRange => 0x34_32_30_66,
            Self::Bgra32 => 0x42_47_52_41,
            Self::Yuyv => 0x79_75_76_73,
            Self::Uyvy => 0x32_76_75_79,
        }
    }
}

/// Pixel dimensions of a frame or plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// A crop rectangle in buffer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// The full area of a buffer of the given size.
    pub fn full(size: Size) -> Self {
        Rect::new(0, 0, size.width, size.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether this rectangle lies entirely inside a buffer of `size`.
    pub fn fits_within(&self, size: Size) -> bool {
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        right <= size.width as u64 && bottom <= size.height as u64
    }
}

/// Geometry and pacing the native stream is configured with.
///
/// Produced by [`StreamOptions::config`](crate::options::StreamOptions::config)
/// after validation, so every field is already known to be in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub size: Size,
    pub frame_rate: NonZeroU32,
    pub pixel_format: PixelFormat,
    /// Frames the bridge may hold before new frames are dropped.
    pub queue_depth: usize,
    pub shows_cursor: bool,
}

impl StreamConfig {
    /// Minimum interval between frames as a `(value, timescale)` pair, in the
    /// shape Core Media expects (`1 / frame_rate` seconds).
    pub fn frame_interval(&self) -> (i64, i32) {
        (1, self.frame_rate.get().min(i32::MAX as u32) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_round_trips_for_known_formats() {
        for pf in [
            PixelFormat::Nv12,
            PixelFormat::Nv12FullRange,
            PixelFormat::Bgra32,
            PixelFormat::Yuyv,
            PixelFormat::Uyvy,
        ] {
            assert_eq!(PixelFormat::from_fourcc(pf.fourcc()), Some(pf));
        }
        assert_eq!(PixelFormat::from_fourcc(0), None);
    }

    #[test]
    fn only_biplanar_formats_are_deliverable() {
        assert!(PixelFormat::Nv12.is_biplanar_420());
        assert!(PixelFormat::Nv12FullRange.is_biplanar_420());
        assert!(!PixelFormat::Bgra32.is_biplanar_420());
        assert!(!PixelFormat::Uyvy.is_biplanar_420());
    }

    #[test]
    fn rect_bounds() {
        let size = Size {
            width: 1280,
            height: 720,
        };
        assert!(Rect::full(size).fits_within(size));
        assert!(Rect::new(10, 10, 1270, 710).fits_within(size));
        assert!(!Rect::new(11, 0, 1270, 720).fits_within(size));
        assert!(!Rect::new(u32::MAX, 0, 2, 1).fits_within(size));
        assert!(Rect::new(0, 0, 0, 5).is_empty());
    }
}
