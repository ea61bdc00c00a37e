use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{self, BridgeStats, Dispatcher};
use crate::delegate::{AnomalyStats, CaptureDelegate};
use crate::error::Error;
use crate::options::StreamOptions;
use crate::stream::CaptureStream;
use crate::types::StreamConfig;

/// Lifecycle of a [`CaptureSession`].
///
/// `Idle -> Starting -> Running -> Stopping -> Stopped`, where a session may
/// also go `Starting -> Stopping` if stopped before the native stream
/// confirms. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub bridge: BridgeStats,
    pub anomalies: AnomalyStats,
}

/// One screen capture, from construction to `on_stop`.
///
/// Owns the native stream and the only strong reference to its delegate.
/// `start` and `stop` return as soon as the transition is initiated; their
/// completion is observed through `on_start` and `on_stop`, which (like every
/// other callback) run only inside [`dispatch`](Self::dispatch),
/// [`dispatch_timeout`](Self::dispatch_timeout) or
/// [`run_until_stopped`](Self::run_until_stopped) on the calling thread.
pub struct CaptureSession<B: CaptureStream> {
    stream: B,
    config: StreamConfig,
    delegate: Arc<CaptureDelegate<B::Sample>>,
    dispatcher: Dispatcher<B::Sample>,
}

impl<B: CaptureStream> CaptureSession<B> {
    /// Create an idle session. Options are validated when they are built, so
    /// construction itself cannot fail.
    pub fn new(stream: B, options: StreamOptions) -> Self {
        let (config, sinks) = options.into_parts();
        let (events, dispatcher) = bridge::channel(config.queue_depth, sinks);
        CaptureSession {
            stream,
            config,
            delegate: CaptureDelegate::new(events),
            dispatcher,
        }
    }

    pub fn state(&self) -> SessionState {
        self.delegate.state()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Activate native capture. Valid only from `Idle`.
    ///
    /// On failure the session returns to `Idle` and `on_start` is not called.
    pub fn start(&mut self) -> Result<(), Error> {
        self.delegate.begin_start()?;

        tracing::debug!(
            width = self.config.size.width,
            height = self.config.size.height,
            frame_rate = self.config.frame_rate.get(),
            "activating capture stream"
        );
        if let Err(e) = self.stream.activate(&self.config, self.delegate.handle()) {
            self.delegate.abort_start();
            tracing::warn!(error = %e, "capture stream activation failed");
            return Err(Error::CaptureUnavailable(e));
        }
        Ok(())
    }

    /// Tear down native capture and enqueue the single `on_stop`.
    ///
    /// A no-op unless the session is `Starting` or `Running`, so repeated
    /// calls deliver `on_stop` once.
    pub fn stop(&mut self) {
        if !self.delegate.begin_stop() {
            return;
        }
        if let Err(e) = self.stream.deactivate() {
            tracing::warn!(error = %e, "capture stream deactivation failed");
        }
        self.delegate.finish_stop(None);
    }

    /// Deliver every queued event without waiting.
    pub fn dispatch(&mut self) -> usize {
        self.dispatcher.dispatch()
    }

    /// Wait up to `timeout` for the next event, then deliver everything
    /// queued.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        self.dispatcher.dispatch_timeout(timeout)
    }

    /// Deliver events until `on_stop` has been delivered.
    ///
    /// Blocks for as long as the native stream keeps running; call
    /// [`stop`](Self::stop) first, or rely on an involuntary stop.
    pub fn run_until_stopped(&mut self) {
        self.dispatcher.run_until_stopped();
    }

    /// Whether `on_stop` has been delivered.
    pub fn is_finished(&self) -> bool {
        self.dispatcher.is_stopped()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            bridge: self.delegate.events().stats(),
            anomalies: self.delegate.anomalies(),
        }
    }

    /// The native stream this session drives.
    pub fn stream(&self) -> &B {
        &self.stream
    }
}

impl<B: CaptureStream> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
