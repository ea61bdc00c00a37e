//! Scripted native stream and samples for driving sessions in tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use screen_share_stream::{
    CaptureStream, DelegateHandle, MalformedSample, MediaTime, PixelFormat, PlaneLayout,
    PlatformError, Rect, SampleBuffer, Size, StopReason, StreamConfig, StreamError,
    StreamOptions,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const PADDING: usize = 16;

/// An in-memory sample. Every luma byte holds `tag`, so the consumer can
/// tell samples apart.
#[derive(Debug, Clone)]
pub struct FakeSample {
    pub fourcc: u32,
    pub size: Size,
    pub crop: Rect,
    pub tag: u8,
    pub plane_count: usize,
}

impl FakeSample {
    pub fn nv12(width: u32, height: u32, tag: u8) -> Self {
        let size = Size { width, height };
        FakeSample {
            fourcc: PixelFormat::Nv12.fourcc(),
            size,
            crop: Rect::full(size),
            tag,
            plane_count: 2,
        }
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = crop;
        self
    }

    /// A packed BGRA buffer: one plane, wrong format.
    pub fn bgra(width: u32, height: u32) -> Self {
        FakeSample {
            fourcc: PixelFormat::Bgra32.fourcc(),
            plane_count: 1,
            ..FakeSample::nv12(width, height, 0)
        }
    }
}

impl SampleBuffer for FakeSample {
    fn fourcc(&self) -> u32 {
        self.fourcc
    }

    fn size(&self) -> Size {
        self.size
    }

    fn plane_count(&self) -> usize {
        self.plane_count
    }

    fn plane_layout(&self, index: usize) -> PlaneLayout {
        let width = self.size.width as usize;
        let height = self.size.height as usize;
        match index {
            0 => PlaneLayout {
                width,
                height,
                bytes_per_row: width + PADDING,
            },
            _ => PlaneLayout {
                width: width.div_ceil(2),
                height: height.div_ceil(2),
                bytes_per_row: width.div_ceil(2) * 2 + PADDING,
            },
        }
    }

    fn crop(&self) -> Rect {
        self.crop
    }

    fn timestamp(&self) -> MediaTime {
        MediaTime::new(self.tag as i64, 30)
    }

    fn with_planes<R>(&self, f: impl FnOnce(&[u8], &[u8]) -> R) -> Result<R, MalformedSample> {
        let luma = self.plane_layout(0);
        let chroma = self.plane_layout(1);
        let luma = vec![self.tag; luma.bytes_per_row * luma.height];
        let chroma = vec![128u8; chroma.bytes_per_row * chroma.height];
        Ok(f(&luma, &chroma))
    }
}

#[derive(Default)]
struct NativeState {
    handle: Option<DelegateHandle<FakeSample>>,
    config: Option<StreamConfig>,
    activations: usize,
    deactivations: usize,
    fail_next_activation: Option<PlatformError>,
    fail_next_deactivation: Option<PlatformError>,
}

/// The "OS side" of a [`ScriptedStream`]: lets a test play the native
/// framework's notifications from any thread.
#[derive(Clone, Default)]
pub struct Native {
    state: Arc<Mutex<NativeState>>,
}

impl Native {
    pub fn stream(&self) -> ScriptedStream {
        ScriptedStream {
            native: self.clone(),
        }
    }

    pub fn fail_next_activation(&self, error: PlatformError) {
        self.state.lock().unwrap().fail_next_activation = Some(error);
    }

    pub fn fail_next_deactivation(&self, error: PlatformError) {
        self.state.lock().unwrap().fail_next_deactivation = Some(error);
    }

    pub fn handle(&self) -> DelegateHandle<FakeSample> {
        self.state
            .lock()
            .unwrap()
            .handle
            .clone()
            .expect("stream was never activated")
    }

    pub fn config(&self) -> Option<StreamConfig> {
        self.state.lock().unwrap().config
    }

    pub fn activations(&self) -> usize {
        self.state.lock().unwrap().activations
    }

    pub fn deactivations(&self) -> usize {
        self.state.lock().unwrap().deactivations
    }

    pub fn started(&self) {
        self.handle().stream_started();
    }

    pub fn stopped(&self, reason: StopReason) {
        self.handle().stream_stopped(reason);
    }

    pub fn sample(&self, sample: FakeSample) {
        self.handle().sample_arrived(sample);
    }
}

pub struct ScriptedStream {
    native: Native,
}

impl CaptureStream for ScriptedStream {
    type Sample = FakeSample;

    fn activate(
        &mut self,
        config: &StreamConfig,
        delegate: DelegateHandle<FakeSample>,
    ) -> Result<(), PlatformError> {
        let mut state = self.native.state.lock().unwrap();
        if let Some(e) = state.fail_next_activation.take() {
            return Err(e);
        }
        state.activations += 1;
        state.config = Some(*config);
        state.handle = Some(delegate);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), PlatformError> {
        let mut state = self.native.state.lock().unwrap();
        state.deactivations += 1;
        match state.fail_next_deactivation.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// What the consumer observed, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Start,
    Frame { tag: u8, crop: Rect },
    Stop(Option<StreamError>),
}

pub type Log = Rc<RefCell<Vec<Seen>>>;

/// Options whose sinks append to a shared log.
pub fn recording_options(width: u32, height: u32, queue_depth: usize) -> (StreamOptions, Log) {
    let log: Log = Rc::default();
    let (on_start, on_stop, on_frame) = (log.clone(), log.clone(), log.clone());
    let options = StreamOptions::builder()
        .width(width)
        .height(height)
        .frame_rate(30)
        .queue_depth(queue_depth)
        .on_start(move || on_start.borrow_mut().push(Seen::Start))
        .on_stop(move |e| on_stop.borrow_mut().push(Seen::Stop(e.cloned())))
        .on_frame(move |frame| {
            on_frame.borrow_mut().push(Seen::Frame {
                tag: frame.luma().data[0],
                crop: frame.crop(),
            })
        })
        .build()
        .unwrap();
    (options, log)
}

/// Check the delivered sequence is `[Start?, Frame*, Stop]` with exactly one
/// stop at the end.
pub fn assert_well_ordered(log: &[Seen]) {
    let stops = log.iter().filter(|s| matches!(s, Seen::Stop(_))).count();
    assert_eq!(stops, 1, "expected exactly one stop in {log:?}");
    assert!(matches!(log.last(), Some(Seen::Stop(_))), "stop not last in {log:?}");
    let starts: Vec<_> = log
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s, Seen::Start))
        .map(|(i, _)| i)
        .collect();
    assert!(starts.len() <= 1, "more than one start in {log:?}");
    if let Some(&i) = starts.first() {
        assert_eq!(i, 0, "start not first in {log:?}");
    }
}
