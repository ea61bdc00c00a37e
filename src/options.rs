use core::fmt;
use core::num::NonZeroU32;

use crate::error::{ConfigError, Error, StreamError};
use crate::frame::FrameDescriptor;
use crate::types::{PixelFormat, Size, StreamConfig};

/// Frames the bridge holds before dropping new ones, unless configured.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;
pub const MAX_QUEUE_DEPTH: usize = 64;

pub(crate) type StartSink = Box<dyn FnMut()>;
pub(crate) type StopSink = Box<dyn FnMut(Option<&StreamError>)>;
pub(crate) type FrameSink = Box<dyn FnMut(&FrameDescriptor<'_>)>;

/// The three consumer callbacks. Only ever invoked on the thread that
/// dispatches events, so they need not be `Send`.
pub(crate) struct Sinks {
    pub(crate) on_start: StartSink,
    pub(crate) on_stop: StopSink,
    pub(crate) on_frame: FrameSink,
}

/// Validated, immutable stream options.
///
/// Built with [`StreamOptions::builder`]. Width, height and frame rate are
/// guaranteed positive and all three callbacks are present.
pub struct StreamOptions {
    config: StreamConfig,
    sinks: Sinks,
}

impl StreamOptions {
    pub fn builder() -> StreamOptionsBuilder {
        StreamOptionsBuilder::default()
    }

    /// The geometry and pacing the native stream will be configured with.
    pub fn config(&self) -> StreamConfig {
        self.config
    }

    pub(crate) fn into_parts(self) -> (StreamConfig, Sinks) {
        (self.config, self.sinks)
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StreamOptions`].
pub struct StreamOptionsBuilder {
    width: u32,
    height: u32,
    frame_rate: u32,
    queue_depth: usize,
    shows_cursor: bool,
    on_start: Option<StartSink>,
    on_stop: Option<StopSink>,
    on_frame: Option<FrameSink>,
}

impl Default for StreamOptionsBuilder {
    fn default() -> Self {
        StreamOptionsBuilder {
            width: 0,
            height: 0,
            frame_rate: 0,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            shows_cursor: true,
            on_start: None,
            on_stop: None,
            on_frame: None,
        }
    }
}

impl StreamOptionsBuilder {
    /// Target frame width in pixels. Frames are scaled by the OS to fit.
    pub fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    /// Target frames per second.
    pub fn frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Frames that may wait for delivery before new frames are dropped.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn shows_cursor(mut self, shows_cursor: bool) -> Self {
        self.shows_cursor = shows_cursor;
        self
    }

    /// Called once when capture has begun.
    pub fn on_start(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Called once when capture has ended. An error is present only if the
    /// stream stopped without being asked to.
    pub fn on_stop(mut self, f: impl FnMut(Option<&StreamError>) + 'static) -> Self {
        self.on_stop = Some(Box::new(f));
        self
    }

    /// Called for each captured frame. The descriptor's planes are only valid
    /// for the duration of the call.
    pub fn on_frame(mut self, f: impl FnMut(&FrameDescriptor<'_>) + 'static) -> Self {
        self.on_frame = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<StreamOptions, Error> {
        let width = NonZeroU32::new(self.width).ok_or(ConfigError::ZeroWidth)?;
        let height = NonZeroU32::new(self.height).ok_or(ConfigError::ZeroHeight)?;
        let frame_rate = NonZeroU32::new(self.frame_rate).ok_or(ConfigError::ZeroFrameRate)?;
        if !(1..=MAX_QUEUE_DEPTH).contains(&self.queue_depth) {
            return Err(ConfigError::QueueDepth(self.queue_depth).into());
        }

        let on_start = self.on_start.ok_or(ConfigError::MissingSink("on_start"))?;
        let on_stop = self.on_stop.ok_or(ConfigError::MissingSink("on_stop"))?;
        let on_frame = self.on_frame.ok_or(ConfigError::MissingSink("on_frame"))?;

        Ok(StreamOptions {
            config: StreamConfig {
                size: Size {
                    width: width.get(),
                    height: height.get(),
                },
                frame_rate,
                pixel_format: PixelFormat::Nv12,
                queue_depth: self.queue_depth,
                shows_cursor: self.shows_cursor,
            },
            sinks: Sinks {
                on_start,
                on_stop,
                on_frame,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> StreamOptionsBuilder {
        StreamOptions::builder()
            .width(1280)
            .height(720)
            .frame_rate(30)
            .on_start(|| {})
            .on_stop(|_| {})
            .on_frame(|_| {})
    }

    #[test]
    fn accepts_valid_options() {
        let options = complete().build().unwrap();
        let config = options.config();
        assert_eq!(
            config.size,
            Size {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(config.frame_rate.get(), 30);
        assert_eq!(config.pixel_format, PixelFormat::Nv12);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.frame_interval(), (1, 30));
    }

    #[test]
    fn rejects_zero_dimensions_and_rate() {
        let cases = [
            (complete().width(0), ConfigError::ZeroWidth),
            (complete().height(0), ConfigError::ZeroHeight),
            (complete().frame_rate(0), ConfigError::ZeroFrameRate),
            (complete().queue_depth(0), ConfigError::QueueDepth(0)),
            (
                complete().queue_depth(MAX_QUEUE_DEPTH + 1),
                ConfigError::QueueDepth(MAX_QUEUE_DEPTH + 1),
            ),
        ];
        for (builder, expected) in cases {
            match builder.build() {
                Err(Error::InvalidConfiguration(e)) => assert_eq!(e, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_missing_sinks() {
        let missing_frame = StreamOptions::builder()
            .width(1)
            .height(1)
            .frame_rate(1)
            .on_start(|| {})
            .on_stop(|_| {})
            .build();
        assert!(matches!(
            missing_frame,
            Err(Error::InvalidConfiguration(ConfigError::MissingSink(
                "on_frame"
            )))
        ));

        let missing_start = StreamOptions::builder()
            .width(1)
            .height(1)
            .frame_rate(1)
            .on_stop(|_| {})
            .on_frame(|_| {})
            .build();
        assert!(matches!(
            missing_start,
            Err(Error::InvalidConfiguration(ConfigError::MissingSink(
                "on_start"
            )))
        ));
    }
}
