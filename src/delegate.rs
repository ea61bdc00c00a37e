use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::bridge::{Event, EventSender};
use crate::error::{Anomaly, Error, PlatformError, StreamError};
use crate::session::SessionState;
use crate::stream::SampleBuffer;

const ANOMALY_LOG_INTERVAL: u64 = 30;

/// Why the native stream reported that it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The stream stopped because it was asked to.
    Requested,
    /// The stream ended on its own: target closed, permission revoked, picker
    /// cancelled and so on.
    Error(PlatformError),
}

/// Counted, non-fatal anomalies seen by the delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnomalyStats {
    pub malformed_samples: u64,
    pub early_samples: u64,
    pub interruptions: u64,
}

#[derive(Default)]
struct AnomalyCounters {
    malformed_samples: AtomicU64,
    early_samples: AtomicU64,
    interruptions: AtomicU64,
}

/// Receives native capture notifications and turns them into bridge events.
///
/// Owned (strongly) only by its [`CaptureSession`](crate::session::CaptureSession).
/// The native stream gets a [`DelegateHandle`], which does not keep it alive.
pub struct CaptureDelegate<S> {
    events: EventSender<S>,
    state: Mutex<SessionState>,
    /// Set once `Started` is enqueued. Frames seen before that are early.
    started: AtomicBool,
    anomalies: AnomalyCounters,
}

impl<S: SampleBuffer> CaptureDelegate<S> {
    pub(crate) fn new(events: EventSender<S>) -> Arc<Self> {
        Arc::new(CaptureDelegate {
            events,
            state: Mutex::new(SessionState::Idle),
            started: AtomicBool::new(false),
            anomalies: AnomalyCounters::default(),
        })
    }

    /// A non-owning handle for the native stream.
    pub fn handle(self: &Arc<Self>) -> DelegateHandle<S> {
        DelegateHandle {
            inner: Arc::downgrade(self),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn anomalies(&self) -> AnomalyStats {
        let a = &self.anomalies;
        AnomalyStats {
            malformed_samples: a.malformed_samples.load(Ordering::Relaxed),
            early_samples: a.early_samples.load(Ordering::Relaxed),
            interruptions: a.interruptions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn events(&self) -> &EventSender<S> {
        &self.events
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Idle -> Starting`.
    pub(crate) fn begin_start(&self) -> Result<(), Error> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Idle => {
                *state = SessionState::Starting;
                tracing::debug!("session starting");
                Ok(())
            }
            _ => Err(Error::AlreadyStarted),
        }
    }

    /// `Starting -> Idle` after the native stream refused to activate.
    pub(crate) fn abort_start(&self) {
        let mut state = self.lock_state();
        if *state == SessionState::Starting {
            *state = SessionState::Idle;
        }
    }

    /// `Starting | Running -> Stopping`. Returns false if there is nothing to
    /// stop.
    pub(crate) fn begin_stop(&self) -> bool {
        let mut state = self.lock_state();
        match *state {
            SessionState::Starting | SessionState::Running => {
                *state = SessionState::Stopping;
                tracing::debug!("session stopping");
                true
            }
            _ => false,
        }
    }

    /// `Stopping -> Stopped`, enqueueing the single `Stopped` event.
    pub(crate) fn finish_stop(&self, error: Option<StreamError>) {
        let mut state = self.lock_state();
        if *state == SessionState::Stopping {
            self.enter_stopped(&mut state, error);
        }
    }

    fn enter_stopped(&self, state: &mut SessionState, error: Option<StreamError>) {
        *state = SessionState::Stopped;
        if self.events.enqueue(Event::Stopped { error }).is_err() {
            tracing::debug!("stop event not delivered, consumer is gone");
        }
        tracing::debug!("session stopped");
    }

    fn record(&self, anomaly: Anomaly) {
        let counter = match anomaly {
            Anomaly::MalformedSample => &self.anomalies.malformed_samples,
            Anomaly::EarlySample => &self.anomalies.early_samples,
            Anomaly::Interrupted => &self.anomalies.interruptions,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if n % ANOMALY_LOG_INTERVAL == 0 {
            tracing::debug!(?anomaly, total = n, "capture anomalies");
        }
    }

    /// The native stream confirmed capture has begun.
    pub fn stream_started(&self) {
        let mut state = self.lock_state();
        if *state != SessionState::Starting {
            tracing::debug!(state = ?*state, "ignoring start notification");
            return;
        }
        *state = SessionState::Running;
        if self.events.enqueue(Event::Started).is_err() {
            tracing::debug!("start event not delivered, consumer is gone");
        }
        self.started.store(true, Ordering::Release);
        tracing::debug!("session running");
    }

    /// The native stream reported that it stopped.
    pub fn stream_stopped(&self, reason: StopReason) {
        let mut state = self.lock_state();
        match (*state, reason) {
            (SessionState::Starting | SessionState::Running, StopReason::Error(e)) => {
                tracing::warn!(error = %e, "capture interrupted");
                self.record(Anomaly::Interrupted);
                self.enter_stopped(&mut state, Some(StreamError::CaptureInterrupted(e)));
            }
            (SessionState::Starting | SessionState::Running | SessionState::Stopping, _) => {
                self.enter_stopped(&mut state, None);
            }
            (SessionState::Idle | SessionState::Stopped, _) => {
                tracing::debug!(state = ?*state, "ignoring stop notification");
            }
        }
    }

    /// A sample arrived. Validates it and enqueues a frame; never blocks and
    /// never copies pixel data.
    pub fn sample_arrived(&self, sample: S) {
        let layout = match sample.layout() {
            Ok(layout) => layout,
            Err(e) => {
                tracing::trace!(error = %e, "malformed sample dropped");
                self.record(Anomaly::MalformedSample);
                return;
            }
        };

        if !self.started.load(Ordering::Acquire) && !self.events.is_closed() {
            tracing::trace!("sample before start dropped");
            self.record(Anomaly::EarlySample);
            return;
        }

        // Rejected (and counted by the bridge) once `Stopped` is queued.
        let _ = self.events.enqueue(Event::Frame { sample, layout });
    }
}

/// The delegate reference handed to the native stream.
///
/// Holds no ownership: once the session is dropped every method becomes a
/// no-op, so late callbacks from native threads are harmless.
pub struct DelegateHandle<S> {
    inner: Weak<CaptureDelegate<S>>,
}

impl<S> Clone for DelegateHandle<S> {
    fn clone(&self) -> Self {
        DelegateHandle {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: SampleBuffer> DelegateHandle<S> {
    fn with(&self, f: impl FnOnce(&CaptureDelegate<S>)) {
        match self.inner.upgrade() {
            Some(delegate) => f(&delegate),
            None => tracing::trace!("notification after session released"),
        }
    }

    /// Whether the owning session still exists.
    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn stream_started(&self) {
        self.with(|d| d.stream_started());
    }

    pub fn stream_stopped(&self, reason: StopReason) {
        self.with(|d| d.stream_stopped(reason));
    }

    pub fn sample_arrived(&self, sample: S) {
        self.with(|d| d.sample_arrived(sample));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::bridge::{self, Dispatcher};
    use crate::error::MalformedSample;
    use crate::frame::{MediaTime, PlaneLayout};
    use crate::options::Sinks;
    use crate::types::{Rect, Size};

    /// A sample with a single plane, which is never valid.
    struct FlatSample;

    impl SampleBuffer for FlatSample {
        fn fourcc(&self) -> u32 {
            0x34_32_30_76
        }
        fn size(&self) -> Size {
            Size {
                width: 2,
                height: 2,
            }
        }
        fn plane_count(&self) -> usize {
            1
        }
        fn plane_layout(&self, _index: usize) -> PlaneLayout {
            PlaneLayout {
                width: 2,
                height: 2,
                bytes_per_row: 2,
            }
        }
        fn crop(&self) -> Rect {
            Rect::new(0, 0, 2, 2)
        }
        fn timestamp(&self) -> MediaTime {
            MediaTime::default()
        }
        fn with_planes<R>(
            &self,
            _f: impl FnOnce(&[u8], &[u8]) -> R,
        ) -> Result<R, MalformedSample> {
            Err(MalformedSample::Unreadable)
        }
    }

    fn delegate() -> (
        Arc<CaptureDelegate<FlatSample>>,
        Dispatcher<FlatSample>,
        Rc<RefCell<Vec<Option<StreamError>>>>,
    ) {
        let stops = Rc::new(RefCell::new(Vec::new()));
        let seen = stops.clone();
        let sinks = Sinks {
            on_start: Box::new(|| {}),
            on_stop: Box::new(move |e| seen.borrow_mut().push(e.cloned())),
            on_frame: Box::new(|_| panic!("no frame expected")),
        };
        let (events, dispatcher) = bridge::channel(4, sinks);
        (CaptureDelegate::new(events), dispatcher, stops)
    }

    #[test]
    fn start_only_from_idle() {
        let (d, _rx, _stops) = delegate();
        d.begin_start().unwrap();
        assert!(matches!(d.begin_start(), Err(Error::AlreadyStarted)));
        d.abort_start();
        assert_eq!(d.state(), SessionState::Idle);
        d.begin_start().unwrap();
        assert_eq!(d.state(), SessionState::Starting);
    }

    #[test]
    fn notifications_outside_a_session_are_ignored() {
        let (d, mut rx, stops) = delegate();
        d.stream_started();
        d.stream_stopped(StopReason::Error(PlatformError::Unsupported));
        assert_eq!(d.state(), SessionState::Idle);
        assert_eq!(rx.dispatch(), 0);
        assert!(stops.borrow().is_empty());
        assert_eq!(d.anomalies(), AnomalyStats::default());
    }

    #[test]
    fn requested_native_stop_has_no_error() {
        let (d, mut rx, stops) = delegate();
        d.begin_start().unwrap();
        d.stream_started();
        d.stream_stopped(StopReason::Requested);
        d.stream_stopped(StopReason::Requested);
        assert_eq!(d.state(), SessionState::Stopped);
        assert_eq!(rx.dispatch(), 2);
        assert_eq!(*stops.borrow(), vec![None]);
        assert_eq!(d.anomalies().interruptions, 0);
    }

    #[test]
    fn malformed_sample_is_counted() {
        let (d, mut rx, _stops) = delegate();
        d.begin_start().unwrap();
        d.stream_started();
        d.sample_arrived(FlatSample);
        assert_eq!(rx.dispatch(), 1);
        assert_eq!(d.anomalies().malformed_samples, 1);
        assert_eq!(d.events().stats().enqueued, 1);
    }

    #[test]
    fn handle_outlives_delegate_harmlessly() {
        let (d, _rx, _stops) = delegate();
        let handle = d.handle();
        assert!(handle.is_live());
        drop(d);
        assert!(!handle.is_live());
        handle.stream_started();
        handle.sample_arrived(FlatSample);
    }
}
