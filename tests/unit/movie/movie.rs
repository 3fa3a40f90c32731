use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::*;
use crate::assets::raster::PixelBuffer;
use crate::encode::backend::InMemoryBackend;
use crate::encode::session::SessionOpts;
use crate::foundation::error::AppendError;

#[derive(Debug, Default)]
struct Log {
    opened: Option<EncodingTarget>,
    appended: Vec<(FrameTimestamp, Canvas)>,
    finalized: Option<FrameTimestamp>,
}

struct RecordingSession {
    log: Arc<Mutex<Log>>,
    fail_on: Option<usize>,
}

impl EncodingSession for RecordingSession {
    fn append(&mut self, buffer: PixelBuffer, at: FrameTimestamp) -> Result<(), AppendError> {
        let mut log = self.log.lock().unwrap();
        if self.fail_on == Some(log.appended.len()) {
            return Err(AppendError::rejected("simulated"));
        }
        log.appended.push((at, buffer.canvas()));
        Ok(())
    }

    fn finalize(self, end: FrameTimestamp) -> FinalizeStatus {
        self.log.lock().unwrap().finalized = Some(end);
        FinalizeStatus::Completed(EncodeSummary {
            frames_written: 0,
            duration: end,
        })
    }
}

fn solid(width: u32, height: u32) -> SourceImage {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 80, 120, 255]));
    SourceImage::new(image::DynamicImage::ImageRgba8(img))
}

fn writer(width: u32, height: u32, fps: u32, fpi: u32) -> MovieWriter {
    MovieWriter::new(MovieSettings {
        width,
        height,
        fps: Fps::new(fps).unwrap(),
        frames_per_image: fpi,
        ..MovieSettings::default()
    })
    .unwrap()
}

fn run(
    w: &MovieWriter,
    images: &[SourceImage],
    fail_on: Option<usize>,
) -> (ReelResult<EncodeSummary>, Log) {
    let log = Arc::new(Mutex::new(Log::default()));
    let session_log = Arc::clone(&log);
    let res = w.make_movie_with(images, &PathBuf::from("out.mp4"), |target| {
        session_log.lock().unwrap().opened = Some(target);
        Ok(RecordingSession {
            log: session_log,
            fail_on,
        })
    });
    let log = Arc::try_unwrap(log).unwrap().into_inner().unwrap();
    (res, log)
}

#[test]
fn three_images_at_ten_fps_repeat_five() {
    let images = vec![solid(100, 100), solid(100, 100), solid(100, 100)];
    let (res, log) = run(&writer(100, 100, 10, 5), &images, None);
    let summary = res.unwrap();

    let stamps: Vec<u64> = log.appended.iter().map(|(t, _)| t.value).collect();
    assert_eq!(stamps, vec![0, 5, 10]);
    assert!(log.appended.iter().all(|(t, _)| t.timescale == 10));
    let end = log.finalized.unwrap();
    assert_eq!(end, FrameTimestamp::new(15, 10).unwrap());
    assert!((end.as_secs_f64() - 1.5).abs() < 1e-12);
    assert_eq!(summary.duration, end);
}

#[test]
fn zero_size_uses_first_image_for_every_frame() {
    let images = vec![solid(640, 480), solid(320, 200), solid(1024, 768)];
    let (res, log) = run(&writer(0, 0, 30, 1), &images, None);
    res.unwrap();

    let opened = log.opened.unwrap();
    assert_eq!(opened.canvas, Canvas::new(640, 480).unwrap());
    assert!(
        log.appended
            .iter()
            .all(|(_, c)| *c == Canvas::new(640, 480).unwrap())
    );
}

#[test]
fn one_side_zero_takes_only_that_side_from_first_image() {
    let images = vec![solid(640, 480)];
    let (res, log) = run(&writer(200, 0, 30, 1), &images, None);
    res.unwrap();
    assert_eq!(log.opened.unwrap().canvas, Canvas::new(200, 480).unwrap());
}

#[test]
fn empty_input_is_rejected_before_opening() {
    let (res, log) = run(&writer(100, 100, 30, 1), &[], None);
    assert!(matches!(res, Err(ReelError::NoInputImages)));
    assert!(log.opened.is_none());
    assert!(log.finalized.is_none());
}

#[test]
fn append_failure_on_third_image_skips_finalize() {
    let images: Vec<_> = (0..5).map(|_| solid(8, 8)).collect();
    let (res, log) = run(&writer(8, 8, 30, 1), &images, Some(2));
    match res {
        Err(ReelError::Append { frame, source }) => {
            assert_eq!(frame, 2);
            assert!(matches!(source, AppendError::Rejected(_)));
        }
        other => panic!("expected append error, got {other:?}"),
    }
    assert_eq!(log.appended.len(), 2);
    assert!(log.finalized.is_none());
}

#[test]
fn rasterize_failure_aborts_job() {
    let images = vec![solid(8, 8), SourceImage::new(image::DynamicImage::new_rgba8(0, 0))];
    let (res, log) = run(&writer(8, 8, 30, 1), &images, None);
    assert!(matches!(res, Err(ReelError::Rasterize(_))));
    assert!(log.finalized.is_none());
}

#[test]
fn frame_timestamps_step_by_repeat_count() {
    let fps = Fps::new(24).unwrap();
    let (stamps, end) = frame_timestamps(4, fps, 3);
    let values: Vec<u64> = stamps.iter().map(|t| t.value).collect();
    assert_eq!(values, vec![0, 3, 6, 9]);
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(end, FrameTimestamp::new(12, 24).unwrap());
}

#[test]
fn settings_validate_frames_per_image() {
    let bad = MovieSettings {
        frames_per_image: 0,
        ..MovieSettings::default()
    };
    assert!(MovieWriter::new(bad).is_err());
}

#[test]
fn settings_round_trip_through_json() {
    let s = MovieSettings::default();
    let json = serde_json::to_string(&s).unwrap();
    assert!(json.contains("\"fps\":30"));
    let back: MovieSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);
}

#[test]
fn rasterizer_format_must_match_settings() {
    let w = writer(8, 8, 30, 1);
    let other = Rasterizer::new(PixelFormat::BGRA32).unwrap();
    assert!(w.with_rasterizer(other).is_err());
}

#[test]
fn in_memory_session_duration_matches_repeat_sum() {
    let images = vec![solid(10, 10), solid(10, 10), solid(10, 10)];
    let backend = InMemoryBackend::new();
    let w = writer(10, 10, 10, 5);
    let summary = w
        .make_movie_with(&images, &PathBuf::from("unused.mp4"), |target| {
            VideoEncodingSession::open(target, SessionOpts::default(), backend.clone())
        })
        .unwrap();
    assert_eq!(summary.frames_written, 15);
    assert_eq!(backend.record().frames.len(), 15);
    let secs = Fps::new(10).unwrap().frames_to_secs(summary.frames_written);
    assert!((secs - 1.5).abs() < 0.1);
}

struct UnclosableSession;

impl EncodingSession for UnclosableSession {
    fn append(&mut self, _buffer: PixelBuffer, _at: FrameTimestamp) -> Result<(), AppendError> {
        Ok(())
    }

    fn finalize(self, _end: FrameTimestamp) -> FinalizeStatus {
        FinalizeStatus::Failed("encoder exited with status 1".to_string())
    }
}

#[test]
fn failed_finalize_becomes_finalize_error() {
    let images = vec![solid(8, 8), solid(8, 8)];
    let res = writer(8, 8, 30, 2).make_movie_with(&images, &PathBuf::from("out.mp4"), |_| {
        Ok(UnclosableSession)
    });
    match res {
        Err(ReelError::Finalize(reason)) => assert!(reason.contains("status 1")),
        other => panic!("expected finalize error, got {other:?}"),
    }
}

#[test]
fn backend_finish_failure_reaches_the_driver() {
    struct NoFinish;

    impl crate::encode::backend::EncoderBackend for NoFinish {
        fn start(&mut self, _target: &EncodingTarget) -> Result<(), OpenError> {
            Ok(())
        }

        fn write_frame(&mut self, _pixels: &[u8]) -> ReelResult<()> {
            Ok(())
        }

        fn finish(&mut self) -> ReelResult<()> {
            Err(ReelError::finalize("container not closed"))
        }

        fn abort(&mut self) {}
    }

    let images = vec![solid(4, 4)];
    let err = writer(4, 4, 30, 1)
        .make_movie_with(&images, &PathBuf::from("out.mp4"), |target| {
            VideoEncodingSession::open(target, SessionOpts::default(), NoFinish)
        })
        .unwrap_err();
    assert!(matches!(err, ReelError::Finalize(ref r) if r.contains("container not closed")));
    assert_eq!(err.stage(), "finalize");
}
