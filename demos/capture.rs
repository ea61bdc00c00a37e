use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use screen_share_stream::frame::{Frame, Timestamp};
use screen_share_stream::{CaptureSession, PlatformStream, StreamOptions};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if !screen_share_stream::is_supported() {
        println!("Screen capture with the system picker is not supported here.");
        return;
    }

    let frame_count = Rc::new(Cell::new(0u64));
    let count = frame_count.clone();
    let target_frames: u64 = 60;

    let options = StreamOptions::builder()
        .width(1280)
        .height(720)
        .frame_rate(30)
        .on_start(|| println!("Capture started"))
        .on_stop(|err| match err {
            Some(e) => println!("Capture stopped: {e}"),
            None => println!("Capture stopped"),
        })
        .on_frame(move |frame| {
            let n = count.get() + 1;
            count.set(n);
            let crop = frame.crop();
            println!(
                "Frame {}: {:?} {}x{} crop={}x{}+{}+{} ts={:.3}s luma stride={}",
                n,
                frame.pixel_format(),
                frame.size().width,
                frame.size().height,
                crop.width,
                crop.height,
                crop.x,
                crop.y,
                frame.timestamp().as_secs_f64(),
                frame.luma().bytes_per_row,
            );
        })
        .build()
        .expect("invalid options");

    let mut session = CaptureSession::new(PlatformStream::default(), options);
    session.start().expect("failed to start capture");
    println!("Pick a display or window to share...");

    // Picking can take a while; give up after a minute without frames.
    let deadline = Instant::now() + Duration::from_secs(60);
    while frame_count.get() < target_frames && !session.is_finished() {
        session.dispatch_timeout(Duration::from_millis(100));
        if frame_count.get() == 0 && Instant::now() > deadline {
            println!("No frames received.");
            break;
        }
    }

    session.stop();
    session.dispatch();
    let stats = session.stats();
    println!(
        "\nDone. Captured {} frames ({} dropped, {} malformed).",
        frame_count.get(),
        stats.bridge.dropped_full,
        stats.anomalies.malformed_samples,
    );
}
