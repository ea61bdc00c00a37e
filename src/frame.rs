use alloc::vec::Vec;

use arrayvec::ArrayVec;

use crate::error::MalformedSample;
use crate::types::{PixelFormat, Rect, Size};

/// Number of planes in a biplanar frame: luma, then interleaved chroma.
pub const MAX_PLANES: usize = 2;

/// A single plane of image data.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub bytes_per_row: usize,
}

/// Layout of one plane as reported by the native buffer, without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Width in samples (chroma samples are two bytes wide).
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
}

impl PlaneLayout {
    fn min_len(&self) -> usize {
        self.bytes_per_row.saturating_mul(self.height)
    }
}

/// A presentation timestamp.
pub trait Timestamp: Copy {
    fn as_secs_f64(&self) -> f64;
}

/// A presentation timestamp shaped like Core Media's `CMTime`.
///
/// Preserves value, timescale, flags and epoch as the capture clock reported
/// them. Not a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MediaTime {
    /// The numerator of the time value (ticks).
    pub value: i64,
    /// Ticks per second.
    pub timescale: i32,
    pub flags: u32,
    /// Distinguishes separate timelines that may restart from zero.
    pub epoch: i64,
}

impl MediaTime {
    /// `kCMTimeFlags_Valid`
    pub const FLAG_VALID: u32 = 1;

    pub fn new(value: i64, timescale: i32) -> Self {
        MediaTime {
            value,
            timescale,
            flags: Self::FLAG_VALID,
            epoch: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags & Self::FLAG_VALID != 0
    }
}

impl Timestamp for MediaTime {
    fn as_secs_f64(&self) -> f64 {
        if self.timescale > 0 {
            self.value as f64 / self.timescale as f64
        } else {
            0.0
        }
    }
}

/// A borrowed video frame. Lifetime tied to callback scope (zero-copy).
pub trait Frame {
    type Timestamp: Timestamp;

    fn pixel_format(&self) -> PixelFormat;
    fn size(&self) -> Size;
    fn planes(&self) -> &[Plane<'_>];
    fn timestamp(&self) -> Self::Timestamp;
}

/// Everything about a captured sample except its pixel data.
///
/// Built on the capture thread when a sample arrives; holds no pointers into
/// the native buffer, so it can travel through the bridge alongside the
/// retained sample and be turned into a [`FrameDescriptor`] at delivery time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub luma: PlaneLayout,
    pub chroma: PlaneLayout,
    pub crop: Rect,
    pub timestamp: MediaTime,
}

impl FrameLayout {
    /// Check that a sample is a usable biplanar 4:2:0 buffer and capture its
    /// geometry.
    pub fn validate(
        fourcc: u32,
        size: Size,
        planes: &[PlaneLayout],
        crop: Rect,
        timestamp: MediaTime,
    ) -> Result<Self, MalformedSample> {
        let pixel_format = PixelFormat::from_fourcc(fourcc)
            .filter(PixelFormat::is_biplanar_420)
            .ok_or(MalformedSample::UnsupportedFormat(fourcc))?;

        let [luma, chroma] = planes else {
            return Err(MalformedSample::PlaneCount(planes.len()));
        };

        let width = size.width as usize;
        let height = size.height as usize;
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        if luma.width < width || luma.height < height || luma.bytes_per_row < width {
            return Err(MalformedSample::PlaneGeometry { plane: 0 });
        }
        if chroma.width < chroma_width
            || chroma.height < chroma_height
            || chroma.bytes_per_row < chroma_width * 2
        {
            return Err(MalformedSample::PlaneGeometry { plane: 1 });
        }
        if crop.is_empty() || !crop.fits_within(size) {
            return Err(MalformedSample::CropOutOfBounds(crop));
        }

        Ok(FrameLayout {
            pixel_format,
            size,
            luma: *luma,
            chroma: *chroma,
            crop,
            timestamp,
        })
    }
}

/// Normalized view over one captured biplanar frame.
///
/// Both planes borrow the native buffer and are only valid for the single
/// `on_frame` invocation that receives this descriptor. Copy anything that
/// needs to outlive it, e.g. with [`write_packed_nv12`](Self::write_packed_nv12).
#[derive(Debug)]
pub struct FrameDescriptor<'a> {
    planes: ArrayVec<Plane<'a>, MAX_PLANES>,
    pixel_format: PixelFormat,
    size: Size,
    crop: Rect,
    timestamp: MediaTime,
}

impl<'a> FrameDescriptor<'a> {
    /// Attach lent plane data to a validated layout.
    pub fn new(
        layout: &FrameLayout,
        luma: &'a [u8],
        chroma: &'a [u8],
    ) -> Result<Self, MalformedSample> {
        if luma.len() < layout.luma.min_len() {
            return Err(MalformedSample::PlaneTooShort { plane: 0 });
        }
        if chroma.len() < layout.chroma.min_len() {
            return Err(MalformedSample::PlaneTooShort { plane: 1 });
        }

        let mut planes = ArrayVec::new();
        planes.push(Plane {
            data: luma,
            bytes_per_row: layout.luma.bytes_per_row,
        });
        planes.push(Plane {
            data: chroma,
            bytes_per_row: layout.chroma.bytes_per_row,
        });

        Ok(FrameDescriptor {
            planes,
            pixel_format: layout.pixel_format,
            size: layout.size,
            crop: layout.crop,
            timestamp: layout.timestamp,
        })
    }

    pub fn luma(&self) -> &Plane<'a> {
        &self.planes[0]
    }

    pub fn chroma(&self) -> &Plane<'a> {
        &self.planes[1]
    }

    /// The region of the buffer holding valid image data.
    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// Copy the crop region into `out` as tightly packed NV12 (no row
    /// padding). `out` is cleared first. Returns the packed dimensions.
    pub fn write_packed_nv12(&self, out: &mut Vec<u8>) -> Size {
        let Rect {
            x,
            y,
            width,
            height,
        } = self.crop;
        let (x, y, w, h) = (x as usize, y as usize, width as usize, height as usize);

        let chroma_x = x & !1;
        let chroma_row_bytes = w.div_ceil(2) * 2;
        // One chroma row per two luma rows, starting at the row that covers `y`.
        let first_chroma_row = y / 2;
        let chroma_rows = first_chroma_row..first_chroma_row + h.div_ceil(2);

        out.clear();
        out.reserve(w * h + chroma_row_bytes * chroma_rows.len());

        let luma = self.luma();
        for row in y..y + h {
            let start = row * luma.bytes_per_row + x;
            out.extend_from_slice(&luma.data[start..start + w]);
        }

        let chroma = self.chroma();
        for row in chroma_rows {
            let start = row * chroma.bytes_per_row + chroma_x;
            out.extend_from_slice(&chroma.data[start..start + chroma_row_bytes]);
        }

        Size { width, height }
    }
}

impl Frame for FrameDescriptor<'_> {
    type Timestamp = MediaTime;

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn size(&self) -> Size {
        self.size
    }

    fn planes(&self) -> &[Plane<'_>] {
        &self.planes
    }

    fn timestamp(&self) -> MediaTime {
        self.timestamp
    }
}
