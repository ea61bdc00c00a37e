//! Screen capture delivered to a single-threaded consumer.
//!
//! The OS capture facility calls back on its own threads with short-lived
//! native buffers. This crate validates each sample there, moves lifecycle
//! and frame events through one bounded, ordered channel, and invokes the
//! consumer's `on_start`, `on_frame` and `on_stop` callbacks on the thread
//! that drives [`CaptureSession::dispatch`]. Consumers see `on_start`, then
//! frames, then exactly one `on_stop`, and never a frame after `on_stop`.
//!
//! ```no_run
//! use screen_share_stream::{CaptureSession, PlatformStream, StreamOptions};
//!
//! let options = StreamOptions::builder()
//!     .width(1280)
//!     .height(720)
//!     .frame_rate(30)
//!     .on_start(|| println!("started"))
//!     .on_stop(|err| println!("stopped: {err:?}"))
//!     .on_frame(|frame| println!("frame {:?}", frame.crop()))
//!     .build()?;
//!
//! let mut session = CaptureSession::new(PlatformStream::default(), options);
//! session.start()?;
//! session.run_until_stopped();
//! # Ok::<(), screen_share_stream::Error>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;
pub mod frame;
pub mod types;

#[cfg(feature = "std")]
pub mod bridge;
#[cfg(feature = "std")]
pub mod delegate;
#[cfg(feature = "std")]
pub mod options;
#[cfg(feature = "std")]
pub mod platform;
#[cfg(feature = "std")]
pub mod session;
#[cfg(feature = "std")]
pub mod stream;

// Re-exports
pub use error::*;
pub use frame::*;
pub use types::*;

#[cfg(feature = "std")]
pub use bridge::{BridgeStats, Dropped, Event, EventSender};
#[cfg(feature = "std")]
pub use delegate::{AnomalyStats, CaptureDelegate, DelegateHandle, StopReason};
#[cfg(feature = "std")]
pub use options::{StreamOptions, StreamOptionsBuilder};
#[cfg(feature = "std")]
pub use session::{CaptureSession, SessionState, SessionStats};
#[cfg(feature = "std")]
pub use stream::*;

/// The native stream for the current platform.
#[cfg(all(feature = "std", target_os = "macos"))]
pub type PlatformStream = platform::macos::MacosCaptureStream;
/// The native stream for the current platform.
#[cfg(all(feature = "std", not(target_os = "macos")))]
pub type PlatformStream = platform::unsupported::UnsupportedStream;

/// Whether screen capture with the system picker is supported here.
#[cfg(feature = "std")]
pub fn is_supported() -> bool {
    #[cfg(target_os = "macos")]
    {
        platform::macos::is_available()
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}
