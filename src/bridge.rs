//! Ordered delivery of capture events from native threads to the consumer.
//!
//! Any number of [`EventSender`]s feed one bounded channel; a single
//! [`Dispatcher`] drains it on the consumer's thread and invokes the sinks.
//! Enqueueing never waits for the consumer: when the frame budget is used up
//! the new frame is dropped and counted. Two slots beyond the frame budget are
//! kept for `Started` and `Stopped`, so lifecycle events always fit.
//!
//! Once `Stopped` has been enqueued the bridge is closed and later frames are
//! dropped at the door, which is what keeps `on_frame` from ever following
//! `on_stop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::StreamError;
use crate::frame::{FrameDescriptor, FrameLayout};
use crate::options::Sinks;
use crate::stream::SampleBuffer;

const LIFECYCLE_SLOTS: usize = 2;

/// Log a summary every this many drops.
const DROP_LOG_INTERVAL: u64 = 30;

/// One event travelling to the consumer.
#[derive(Debug)]
pub enum Event<S> {
    Started,
    /// A retained sample and its validated layout. The pixel data is lent to
    /// `on_frame` only while the event is being delivered.
    Frame {
        sample: S,
        layout: FrameLayout,
    },
    Stopped {
        error: Option<StreamError>,
    },
}

impl<S> Event<S> {
    fn is_frame(&self) -> bool {
        matches!(self, Event::Frame { .. })
    }
}

/// Why an event was not enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    /// The frame budget was used up.
    Full,
    /// `Stopped` was already enqueued, or the consumer side is gone.
    Closed,
}

/// Counters for the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub dropped_full: u64,
    pub dropped_closed: u64,
    /// Frames whose buffer could not be read back at delivery time.
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped_full: AtomicU64,
    dropped_closed: AtomicU64,
    discarded: AtomicU64,
}

struct Shared {
    /// Serializes admission so the frame budget check and the send are one
    /// step, and so nothing slips in after `Stopped`.
    closed: Mutex<bool>,
    frame_budget: usize,
    counters: Counters,
}

impl Shared {
    fn stats(&self) -> BridgeStats {
        let c = &self.counters;
        BridgeStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped_full: c.dropped_full.load(Ordering::Relaxed),
            dropped_closed: c.dropped_closed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Producer half. Cheap to clone; safe to use from any thread.
pub struct EventSender<S> {
    tx: Sender<Event<S>>,
    shared: Arc<Shared>,
}

impl<S> Clone for EventSender<S> {
    fn clone(&self) -> Self {
        EventSender {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Create a bridge whose consumer half delivers to `sinks`.
pub(crate) fn channel<S: SampleBuffer>(
    frame_budget: usize,
    sinks: Sinks,
) -> (EventSender<S>, Dispatcher<S>) {
    let (tx, rx) = crossbeam_channel::bounded(frame_budget + LIFECYCLE_SLOTS);
    let shared = Arc::new(Shared {
        closed: Mutex::new(false),
        frame_budget,
        counters: Counters::default(),
    });
    let sender = EventSender {
        tx,
        shared: Arc::clone(&shared),
    };
    let dispatcher = Dispatcher {
        rx,
        shared,
        sinks,
        stopped: false,
    };
    (sender, dispatcher)
}

impl<S> EventSender<S> {
    /// Enqueue without blocking. Events accepted here are delivered in the
    /// order their `enqueue` calls completed.
    pub fn enqueue(&self, event: Event<S>) -> Result<(), Dropped> {
        let mut closed = self.shared.closed.lock().unwrap_or_else(|e| e.into_inner());
        let result = if *closed {
            Err(Dropped::Closed)
        } else if event.is_frame() && self.tx.len() >= self.shared.frame_budget {
            Err(Dropped::Full)
        } else {
            let stopping = matches!(event, Event::Stopped { .. });
            match self.tx.try_send(event) {
                Ok(()) => {
                    if stopping {
                        *closed = true;
                    }
                    Ok(())
                }
                Err(TrySendError::Full(_)) => Err(Dropped::Full),
                Err(TrySendError::Disconnected(_)) => {
                    *closed = true;
                    Err(Dropped::Closed)
                }
            }
        };
        drop(closed);

        let counters = &self.shared.counters;
        match result {
            Ok(()) => {
                counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(reason) => {
                let counter = match reason {
                    Dropped::Full => &counters.dropped_full,
                    Dropped::Closed => &counters.dropped_closed,
                };
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(?reason, "event dropped");
                if n % DROP_LOG_INTERVAL == 0 {
                    tracing::debug!(?reason, total = n, "events dropped");
                }
            }
        }
        result
    }

    /// Whether `Stopped` has been enqueued or the consumer side is gone.
    pub fn is_closed(&self) -> bool {
        *self.shared.closed.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.stats()
    }
}

/// Consumer half. Delivers events to the sinks on whichever thread calls its
/// dispatch methods.
pub struct Dispatcher<S> {
    rx: Receiver<Event<S>>,
    shared: Arc<Shared>,
    sinks: Sinks,
    stopped: bool,
}

impl<S: SampleBuffer> Dispatcher<S> {
    /// Deliver everything already queued without waiting. Returns the number
    /// of events delivered.
    pub fn dispatch(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => delivered += self.deliver(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return delivered,
            }
        }
    }

    /// Wait up to `timeout` for an event, then deliver everything queued.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => self.deliver(event) + self.dispatch(),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Block, delivering events, until `on_stop` has been delivered or every
    /// sender is gone.
    pub fn run_until_stopped(&mut self) {
        while !self.stopped {
            match self.rx.recv() {
                Ok(event) => {
                    self.deliver(event);
                }
                Err(_) => break,
            }
        }
    }

    /// Whether `on_stop` has been delivered.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.stats()
    }

    fn deliver(&mut self, event: Event<S>) -> usize {
        let counters = &self.shared.counters;
        if self.stopped {
            counters.dropped_closed.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        match event {
            Event::Started => (self.sinks.on_start)(),
            Event::Frame { sample, layout } => {
                let on_frame = &mut self.sinks.on_frame;
                let result = sample
                    .with_planes(|luma, chroma| {
                        FrameDescriptor::new(&layout, luma, chroma).map(|frame| on_frame(&frame))
                    })
                    .and_then(|r| r);
                // `sample` drops here, releasing the native buffer.
                if let Err(e) = result {
                    counters.discarded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(error = %e, "frame discarded at delivery");
                    return 0;
                }
            }
            Event::Stopped { error } => {
                self.stopped = true;
                (self.sinks.on_stop)(error.as_ref());
            }
        }
        counters.delivered.fetch_add(1, Ordering::Relaxed);
        1
    }
}
