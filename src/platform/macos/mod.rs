use objc2::runtime::AnyClass;
use objc2_foundation::NSError;

use crate::error::PlatformError;

pub mod frame;
pub mod stream;

pub use frame::MacosSample;
pub use stream::MacosCaptureStream;

/// Whether the system content-sharing picker (macOS 14+) is present.
pub fn is_available() -> bool {
    AnyClass::get(c"SCContentSharingPicker").is_some()
}

/// Catch Objective-C exceptions and convert them to our error type.
fn catch_objc<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> Result<R, PlatformError> {
    objc2::exception::catch(f).map_err(|exception| {
        let msg = exception
            .map(|e| format!("{e:?}"))
            .unwrap_or_else(|| "unknown Objective-C exception".into());
        PlatformError::Message(msg)
    })
}

/// Flatten an `NSError` into owned data that can cross threads.
fn ns_error(e: &NSError) -> PlatformError {
    PlatformError::Native {
        domain: e.domain().to_string(),
        code: e.code(),
        description: e.localizedDescription().to_string(),
    }
}
