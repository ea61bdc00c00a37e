use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use block2::RcBlock;
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2::{AllocAnyThread, DefinedClass, define_class, msg_send};
use objc2_core_media::{CMSampleBuffer, CMTime, CMTimeFlags};
use objc2_foundation::{NSError, NSObject, NSObjectProtocol};
use objc2_screen_capture_kit::{
    SCContentFilter, SCContentSharingPicker, SCContentSharingPickerObserver, SCStream,
    SCStreamConfiguration, SCStreamDelegate, SCStreamOutput, SCStreamOutputType,
};

use crate::delegate::{DelegateHandle, StopReason};
use crate::error::PlatformError;
use crate::platform::macos::frame::MacosSample;
use crate::platform::macos::{catch_objc, is_available, ns_error};
use crate::stream::CaptureStream;
use crate::types::StreamConfig;

struct ObserverIvars {
    delegate: DelegateHandle<MacosSample>,
    config: StreamConfig,
    stream: Mutex<Option<Retained<SCStream>>>,
}

define_class!(
    #[unsafe(super(NSObject))]
    #[ivars = ObserverIvars]
    #[name = "ScreenShareStreamObserver"]
    struct StreamObserver;

    impl StreamObserver {
    }

    unsafe impl NSObjectProtocol for StreamObserver {}

    unsafe impl SCStreamOutput for StreamObserver {
        #[unsafe(method(stream:didOutputSampleBuffer:ofType:))]
        #[allow(non_snake_case)]
        unsafe fn stream_didOutputSampleBuffer_ofType(
            &self,
            _stream: &SCStream,
            sample_buffer: &CMSampleBuffer,
            output_type: SCStreamOutputType,
        ) {
            if output_type != SCStreamOutputType::Screen {
                return;
            }
            if let Some(sample) = MacosSample::from_sample_buffer(sample_buffer) {
                self.ivars().delegate.sample_arrived(sample);
            }
        }
    }

    unsafe impl SCStreamDelegate for StreamObserver {
        #[unsafe(method(stream:didStopWithError:))]
        #[allow(non_snake_case)]
        unsafe fn stream_didStopWithError(&self, _stream: &SCStream, error: &NSError) {
            self.ivars()
                .delegate
                .stream_stopped(StopReason::Error(ns_error(error)));
        }
    }

    unsafe impl SCContentSharingPickerObserver for StreamObserver {
        #[unsafe(method(contentSharingPicker:didCancelForStream:))]
        #[allow(non_snake_case)]
        unsafe fn contentSharingPicker_didCancelForStream(
            &self,
            _picker: &SCContentSharingPicker,
            _stream: Option<&SCStream>,
        ) {
            if self.has_stream() {
                // Cancelling a re-pick leaves the running capture alone.
                return;
            }
            self.ivars().delegate.stream_stopped(StopReason::Error(
                PlatformError::message("content picker cancelled"),
            ));
        }

        #[unsafe(method(contentSharingPicker:didUpdateWithFilter:forStream:))]
        #[allow(non_snake_case)]
        unsafe fn contentSharingPicker_didUpdateWithFilter_forStream(
            &self,
            _picker: &SCContentSharingPicker,
            filter: &SCContentFilter,
            _stream: Option<&SCStream>,
        ) {
            if let Err(e) = self.begin_capture(filter) {
                self.ivars().delegate.stream_stopped(StopReason::Error(e));
            }
        }

        #[unsafe(method(contentSharingPickerStartDidFailWithError:))]
        #[allow(non_snake_case)]
        unsafe fn contentSharingPickerStartDidFailWithError(&self, error: &NSError) {
            self.ivars()
                .delegate
                .stream_stopped(StopReason::Error(ns_error(error)));
        }
    }
);

impl StreamObserver {
    fn new(config: StreamConfig, delegate: DelegateHandle<MacosSample>) -> Retained<Self> {
        let ivars = ObserverIvars {
            delegate,
            config,
            stream: Mutex::new(None),
        };
        let obj = Self::alloc().set_ivars(ivars);
        unsafe { msg_send![super(obj), init] }
    }

    fn stream_slot(&self) -> std::sync::MutexGuard<'_, Option<Retained<SCStream>>> {
        self.ivars()
            .stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn has_stream(&self) -> bool {
        self.stream_slot().is_some()
    }

    /// Create and start the stream for the picked content, or retarget the
    /// running stream if the user picked again.
    fn begin_capture(&self, filter: &SCContentFilter) -> Result<(), PlatformError> {
        let mut slot = self.stream_slot();
        if let Some(stream) = slot.as_ref() {
            tracing::debug!("retargeting capture stream");
            unsafe { stream.updateContentFilter_completionHandler(filter, None) };
            return Ok(());
        }

        let configuration = stream_configuration(&self.ivars().config);
        let stream = unsafe {
            SCStream::initWithFilter_configuration_delegate(
                SCStream::alloc(),
                filter,
                &configuration,
                Some(ProtocolObject::from_ref(self)),
            )
        };

        let queue = dispatch2::DispatchQueue::new(
            "screen-share-stream.samples",
            dispatch2::DispatchQueueAttr::SERIAL,
        );
        unsafe {
            stream.addStreamOutput_type_sampleHandlerQueue_error(
                ProtocolObject::from_ref(self),
                SCStreamOutputType::Screen,
                Some(&queue),
            )
        }
        .map_err(|e| ns_error(&e))?;

        let delegate = self.ivars().delegate.clone();
        let completion = RcBlock::new(move |error: *mut NSError| {
            match unsafe { error.as_ref() } {
                None => delegate.stream_started(),
                Some(e) => delegate.stream_stopped(StopReason::Error(ns_error(e))),
            }
        });
        catch_objc(AssertUnwindSafe(|| unsafe {
            stream.startCaptureWithCompletionHandler(Some(&*completion));
        }))?;

        *slot = Some(stream);
        Ok(())
    }

    /// Detach from the picker and stop the stream. The stream is stopped even
    /// if detaching fails; the first error is returned.
    fn shutdown(&self) -> Result<(), PlatformError> {
        let detached = catch_objc(AssertUnwindSafe(|| unsafe {
            let picker = SCContentSharingPicker::sharedPicker();
            picker.removeObserver(ProtocolObject::from_ref(self));
            picker.setActive(false);
        }));

        let Some(stream) = self.stream_slot().take() else {
            return detached;
        };
        if let Err(e) = unsafe {
            stream.removeStreamOutput_type_error(
                ProtocolObject::from_ref(self),
                SCStreamOutputType::Screen,
            )
        } {
            tracing::warn!(error = %ns_error(&e), "failed to remove stream output");
        }
        let stopped = catch_objc(AssertUnwindSafe(|| unsafe {
            stream.stopCaptureWithCompletionHandler(None);
        }));

        detached.and(stopped)
    }
}

fn stream_configuration(config: &StreamConfig) -> Retained<SCStreamConfiguration> {
    let (value, timescale) = config.frame_interval();
    let frame_interval = CMTime {
        value,
        timescale,
        flags: CMTimeFlags(1), // kCMTimeFlags_Valid
        epoch: 0,
    };

    unsafe {
        let configuration = SCStreamConfiguration::new();
        configuration.setWidth(config.size.width as usize);
        configuration.setHeight(config.size.height as usize);
        configuration.setMinimumFrameInterval(frame_interval);
        configuration.setPixelFormat(config.pixel_format.fourcc());
        configuration.setShowsCursor(config.shows_cursor);
        // ScreenCaptureKit accepts 3..=8 surfaces in flight.
        configuration.setQueueDepth(config.queue_depth.clamp(3, 8) as isize);
        configuration
    }
}

/// macOS screen capture backed by ScreenCaptureKit.
///
/// Activation presents the system content-sharing picker; capture starts once
/// the user picks a display or window, and cancelling the picker ends the
/// session with an error.
#[derive(Default)]
pub struct MacosCaptureStream {
    observer: Option<Retained<StreamObserver>>,
}

impl MacosCaptureStream {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureStream for MacosCaptureStream {
    type Sample = MacosSample;

    fn activate(
        &mut self,
        config: &StreamConfig,
        delegate: DelegateHandle<MacosSample>,
    ) -> Result<(), PlatformError> {
        if !is_available() {
            return Err(PlatformError::Unsupported);
        }
        if self.observer.is_some() {
            return Err(PlatformError::message("stream already active"));
        }

        let observer = StreamObserver::new(*config, delegate);
        catch_objc(AssertUnwindSafe(|| unsafe {
            let picker = SCContentSharingPicker::sharedPicker();
            picker.addObserver(ProtocolObject::from_ref(&*observer));
            picker.setActive(true);
            picker.present();
        }))?;

        self.observer = Some(observer);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), PlatformError> {
        match self.observer.take() {
            Some(observer) => observer.shutdown(),
            None => Ok(()),
        }
    }
}

impl Drop for MacosCaptureStream {
    fn drop(&mut self) {
        let _ = self.deactivate();
    }
}
