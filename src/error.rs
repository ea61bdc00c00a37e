use alloc::string::String;
use core::fmt;

use crate::types::Rect;

/// Platform-specific error details.
///
/// Native error objects are flattened into owned data at the boundary so the
/// error can travel from the capture thread to the consumer with the
/// `on_stop` event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlatformError {
    Message(String),
    /// An `NSError` (or equivalent) reported by the native framework.
    Native {
        domain: String,
        code: isize,
        description: String,
    },
    /// The current platform has no supported capture facility.
    Unsupported,
}

impl PlatformError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            Self::Native {
                domain,
                code,
                description,
            } => write!(f, "{description} ({domain} {code})"),
            Self::Unsupported => f.write_str("not supported on this platform"),
        }
    }
}

impl core::error::Error for PlatformError {}

/// Why a set of [`StreamOptions`](crate::options::StreamOptions) was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    ZeroWidth,
    ZeroHeight,
    ZeroFrameRate,
    QueueDepth(usize),
    MissingSink(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroWidth => f.write_str("width must be positive"),
            Self::ZeroHeight => f.write_str("height must be positive"),
            Self::ZeroFrameRate => f.write_str("frame rate must be positive"),
            Self::QueueDepth(depth) => write!(f, "queue depth {depth} out of range"),
            Self::MissingSink(name) => write!(f, "missing {name} callback"),
        }
    }
}

/// Top-level crate error, returned synchronously by session operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    InvalidConfiguration(ConfigError),
    AlreadyStarted,
    CaptureUnavailable(PlatformError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration(e) => write!(f, "invalid configuration: {e}"),
            Self::AlreadyStarted => f.write_str("stream already started"),
            Self::CaptureUnavailable(e) => write!(f, "capture unavailable: {e}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::CaptureUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfiguration(e)
    }
}

/// Error delivered asynchronously with `on_stop` when capture ended without
/// the consumer asking for it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamError {
    CaptureInterrupted(PlatformError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureInterrupted(e) => write!(f, "capture interrupted: {e}"),
        }
    }
}

impl core::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::CaptureInterrupted(e) => Some(e),
        }
    }
}

/// Why a single sample was dropped instead of being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MalformedSample {
    /// FourCC of a format that is not biplanar 4:2:0.
    UnsupportedFormat(u32),
    PlaneCount(usize),
    PlaneGeometry { plane: usize },
    PlaneTooShort { plane: usize },
    CropOutOfBounds(Rect),
    /// The native buffer could not be locked for reading.
    Unreadable,
}

impl fmt::Display for MalformedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(fourcc) => {
                let b = fourcc.to_be_bytes();
                if b.iter().all(u8::is_ascii_graphic) {
                    write!(
                        f,
                        "unsupported pixel format '{}{}{}{}'",
                        b[0] as char, b[1] as char, b[2] as char, b[3] as char
                    )
                } else {
                    write!(f, "unsupported pixel format {fourcc:#010x}")
                }
            }
            Self::PlaneCount(n) => write!(f, "expected 2 planes, got {n}"),
            Self::PlaneGeometry { plane } => write!(f, "plane {plane} smaller than frame"),
            Self::PlaneTooShort { plane } => write!(f, "plane {plane} data shorter than layout"),
            Self::CropOutOfBounds(r) => write!(
                f,
                "crop {}x{}+{}+{} outside buffer",
                r.width, r.height, r.x, r.y
            ),
            Self::Unreadable => f.write_str("buffer could not be locked"),
        }
    }
}

impl core::error::Error for MalformedSample {}

/// Non-fatal conditions that are counted rather than escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anomaly {
    MalformedSample,
    /// A sample arrived before the native stream confirmed start.
    EarlySample,
    /// Capture ended involuntarily while running.
    Interrupted,
}
