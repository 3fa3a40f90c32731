use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::assets::raster::PixelBuffer;
use crate::encode::backend::EncoderBackend;
use crate::encode::ffmpeg::FfmpegBackend;
use crate::foundation::core::{Canvas, Fps, FrameTimestamp, PixelFormat};
use crate::foundation::error::{AppendError, OpenError, ReelResult};

/// Everything an encode job needs to know about its output. Immutable for the session lifetime.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncodingTarget {
    /// Output frame size.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Destination file.
    pub out_path: PathBuf,
    /// Pixel layout of appended buffers.
    pub format: PixelFormat,
}

impl EncodingTarget {
    /// Target with the default [`PixelFormat`] (ARGB32).
    pub fn new(canvas: Canvas, fps: Fps, out_path: impl Into<PathBuf>) -> Self {
        Self {
            canvas,
            fps,
            out_path: out_path.into(),
            format: PixelFormat::default(),
        }
    }

    /// Replace the pixel format of appended buffers.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }
}

/// Tuning for the append backpressure contract.
#[derive(Clone, Debug)]
pub struct SessionOpts {
    /// Frames that may wait between `append` and the encoder. Clamped to at least 1.
    pub queue_capacity: usize,
    /// Longest an `append` waits for queue space while the encoder writes nothing, before
    /// failing with `NotReady`. Any frame the encoder writes restarts the wait.
    pub ready_timeout: Duration,
    /// Sleep between readiness checks while the queue is full.
    pub poll_interval: Duration,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            ready_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(2),
        }
    }
}

/// Lifecycle of a [`VideoEncodingSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, encoder not yet started.
    Created,
    /// Accepting frames.
    Started,
    /// Finalize requested; no more frames.
    Draining,
    /// Container closed successfully.
    Completed,
    /// A stage failed; the encoder was released.
    Failed,
}

/// Facts about a successfully closed container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Constant-rate frames handed to the encoder (repeats included).
    pub frames_written: u64,
    /// End time the container was closed at.
    pub duration: FrameTimestamp,
}

/// Final outcome of [`VideoEncodingSession::finalize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalizeStatus {
    /// The encoder reported success.
    Completed(EncodeSummary),
    /// Any other final status, with its reason.
    Failed(String),
}

impl FinalizeStatus {
    /// `true` for [`FinalizeStatus::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Sequential frame consumer the movie driver is written against.
pub trait EncodingSession {
    /// Queue `buffer` for display starting at `at`.
    fn append(&mut self, buffer: PixelBuffer, at: FrameTimestamp) -> Result<(), AppendError>;

    /// Close the output at `end`, blocking until the encoder reports its final status.
    fn finalize(self, end: FrameTimestamp) -> FinalizeStatus
    where
        Self: Sized;
}

enum WriterMsg {
    Frame {
        buffer: PixelBuffer,
        at: FrameTimestamp,
    },
    Finish {
        end: FrameTimestamp,
        done: SyncSender<FinalizeStatus>,
    },
}

type FailureSlot = Arc<Mutex<Option<String>>>;

/// One encode job: owns the encoder from `open` until `finalize` (or drop).
///
/// Single writer: `append` and `finalize` take `&mut self` / `self`. Encoding happens on a
/// dedicated thread fed through a bounded queue; `append` returns once the frame is queued.
pub struct VideoEncodingSession {
    target: EncodingTarget,
    opts: SessionOpts,
    state: SessionState,

    tx: Option<SyncSender<WriterMsg>>,
    writer: Option<JoinHandle<()>>,
    failure: FailureSlot,
    progress: Arc<AtomicU64>,

    last_at: Option<FrameTimestamp>,
    appended: usize,
}

impl VideoEncodingSession {
    /// Open an MP4 session backed by the system `ffmpeg`.
    pub fn open_mp4(target: EncodingTarget) -> Result<Self, OpenError> {
        Self::open(target, SessionOpts::default(), FfmpegBackend::default())
    }

    /// Start `backend` for `target` and spawn the writer thread. Encoding begins at time zero.
    #[tracing::instrument(skip(opts, backend), fields(out = %target.out_path.display()))]
    pub fn open<B: EncoderBackend>(
        target: EncodingTarget,
        opts: SessionOpts,
        mut backend: B,
    ) -> Result<Self, OpenError> {
        target
            .format
            .validate()
            .map_err(|e| OpenError::EncoderUnavailable(e.to_string()))?;

        let mut session = Self {
            target,
            opts,
            state: SessionState::Created,
            tx: None,
            writer: None,
            failure: Arc::new(Mutex::new(None)),
            progress: Arc::new(AtomicU64::new(0)),
            last_at: None,
            appended: 0,
        };

        backend.start(&session.target)?;

        let (tx, rx) = mpsc::sync_channel::<WriterMsg>(session.opts.queue_capacity.max(1));
        let fps = session.target.fps;
        let failure = Arc::clone(&session.failure);
        let progress = Arc::clone(&session.progress);
        let writer = std::thread::Builder::new()
            .name("reelmaker-encoder".to_string())
            .spawn(move || run_writer(backend, fps, rx, failure, progress))
            .map_err(|e| OpenError::EncoderUnavailable(format!("spawn encoder thread: {e}")))?;

        session.tx = Some(tx);
        session.writer = Some(writer);
        session.state = SessionState::Started;
        tracing::debug!(size = %session.target.canvas, fps = fps.get(), "session started");
        Ok(session)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Target the session was opened with.
    pub fn target(&self) -> &EncodingTarget {
        &self.target
    }

    /// Number of buffers accepted so far.
    pub fn frames_appended(&self) -> usize {
        self.appended
    }

    /// Queue `buffer` for display from `at` until the next frame's timestamp.
    ///
    /// Waits for queue space as long as the encoder keeps writing frames; fails with
    /// [`AppendError::NotReady`] once it writes nothing for `ready_timeout`. Any failure moves
    /// the session to [`SessionState::Failed`] and releases the encoder.
    pub fn append(&mut self, buffer: PixelBuffer, at: FrameTimestamp) -> Result<(), AppendError> {
        match self.state {
            SessionState::Started => {}
            SessionState::Failed => {
                return Err(AppendError::rejected(format!(
                    "session already failed: {}",
                    self.failure_reason()
                )));
            }
            SessionState::Created => return Err(AppendError::rejected("session not started")),
            SessionState::Draining | SessionState::Completed => {
                return Err(AppendError::rejected("session is finalizing"));
            }
        }

        if buffer.canvas() != self.target.canvas {
            return Err(self.fail(AppendError::rejected(format!(
                "buffer is {}, session expects {}",
                buffer.canvas(),
                self.target.canvas
            ))));
        }
        if buffer.format() != self.target.format {
            return Err(self.fail(AppendError::rejected(format!(
                "buffer format {:?} does not match session format {:?}",
                buffer.format(),
                self.target.format
            ))));
        }
        if let Some(last) = self.last_at
            && at < last
        {
            return Err(self.fail(AppendError::rejected(format!(
                "timestamp {at} is before previous frame at {last}"
            ))));
        }

        let Some(tx) = self.tx.as_ref() else {
            return Err(self.fail(AppendError::rejected("encoder queue is closed")));
        };

        // Bounded retry: the deadline restarts whenever the writer hands a frame to the backend.
        let mut since = Instant::now();
        let mut seen = self.progress.load(Ordering::Acquire);
        let mut msg = WriterMsg::Frame { buffer, at };
        let queued = loop {
            match tx.try_send(msg) {
                Ok(()) => break Ok(()),
                Err(TrySendError::Full(back)) => {
                    let now = self.progress.load(Ordering::Acquire);
                    if now != seen {
                        seen = now;
                        since = Instant::now();
                    }
                    let waited = since.elapsed();
                    if waited >= self.opts.ready_timeout {
                        break Err(AppendError::NotReady { waited });
                    }
                    msg = back;
                    std::thread::sleep(self.opts.poll_interval);
                }
                Err(TrySendError::Disconnected(_)) => {
                    break Err(AppendError::Rejected(self.failure_reason()));
                }
            }
        };
        if let Err(e) = queued {
            return Err(self.fail(e));
        }

        tracing::debug!(frame = self.appended, %at, "queued frame");
        self.last_at = Some(at);
        self.appended += 1;
        Ok(())
    }

    /// Close the container at `end` and wait for the encoder's final status.
    ///
    /// `end` must not precede the last appended timestamp.
    #[tracing::instrument(skip(self), fields(out = %self.target.out_path.display()))]
    pub fn finalize(mut self, end: FrameTimestamp) -> FinalizeStatus {
        let status = self.finalize_inner(end);
        match &status {
            FinalizeStatus::Completed(summary) => {
                self.state = SessionState::Completed;
                tracing::info!(
                    frames = summary.frames_written,
                    duration_secs = summary.duration.as_secs_f64(),
                    "encoding completed"
                );
            }
            FinalizeStatus::Failed(reason) => {
                self.state = SessionState::Failed;
                tracing::warn!(%reason, "encoding failed");
            }
        }
        status
    }

    fn finalize_inner(&mut self, end: FrameTimestamp) -> FinalizeStatus {
        if self.state != SessionState::Started {
            let reason = format!("cannot finalize a {:?} session", self.state);
            return self.abort_with(reason);
        }
        if let Some(last) = self.last_at
            && end < last
        {
            return self.abort_with(format!("end time {end} is before last frame at {last}"));
        }

        self.state = SessionState::Draining;
        let Some(tx) = self.tx.take() else {
            return self.abort_with("encoder queue is closed".to_string());
        };

        // One-shot completion signal, resolved exactly once by the writer thread.
        let (done_tx, done_rx) = mpsc::sync_channel::<FinalizeStatus>(1);
        let sent = tx.send(WriterMsg::Finish { end, done: done_tx });
        drop(tx);

        let status = match sent {
            Ok(()) => done_rx
                .recv()
                .unwrap_or_else(|_| FinalizeStatus::Failed(self.failure_reason())),
            Err(_) => FinalizeStatus::Failed(self.failure_reason()),
        };
        if self.join_writer().is_err() {
            return FinalizeStatus::Failed("encoder thread panicked".to_string());
        }
        status
    }

    fn fail(&mut self, err: AppendError) -> AppendError {
        self.state = SessionState::Failed;
        self.set_failure(err.to_string());
        self.shutdown();
        err
    }

    fn abort_with(&mut self, reason: String) -> FinalizeStatus {
        self.set_failure(reason.clone());
        self.shutdown();
        FinalizeStatus::Failed(reason)
    }

    /// Record the first failure reason; later ones are ignored.
    fn set_failure(&self, reason: String) {
        let mut slot = lock_failure(&self.failure);
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    fn failure_reason(&self) -> String {
        lock_failure(&self.failure)
            .clone()
            .unwrap_or_else(|| "encoder stopped".to_string())
    }

    /// Close the queue; the writer sees the disconnect and aborts the backend.
    fn shutdown(&mut self) {
        drop(self.tx.take());
        let _ = self.join_writer();
    }

    fn join_writer(&mut self) -> std::thread::Result<()> {
        match self.writer.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Drop for VideoEncodingSession {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.set_failure("session dropped before finalize".to_string());
        }
        self.shutdown();
    }
}

impl EncodingSession for VideoEncodingSession {
    fn append(&mut self, buffer: PixelBuffer, at: FrameTimestamp) -> Result<(), AppendError> {
        VideoEncodingSession::append(self, buffer, at)
    }

    fn finalize(self, end: FrameTimestamp) -> FinalizeStatus {
        VideoEncodingSession::finalize(self, end)
    }
}

fn lock_failure(slot: &FailureSlot) -> std::sync::MutexGuard<'_, Option<String>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Writer-thread body.
///
/// The backend is constant-rate, so each frame is held until the next timestamp (or the end
/// time) fixes how many `1 / fps` slots it covers. The first frame always starts at slot 0.
fn run_writer<B: EncoderBackend>(
    mut backend: B,
    fps: Fps,
    rx: Receiver<WriterMsg>,
    failure: FailureSlot,
    progress: Arc<AtomicU64>,
) {
    let mut pending: Option<(PixelBuffer, u64)> = None;
    let mut written: u64 = 0;

    for msg in rx.iter() {
        if lock_failure(&failure).is_some() {
            break;
        }
        match msg {
            WriterMsg::Frame { buffer, at } => {
                let slot = at.to_frame_slot(fps);
                let start = match pending.take() {
                    Some((prev, prev_start)) => {
                        let repeat = slot.saturating_sub(prev_start);
                        if repeat == 0 {
                            tracing::debug!(%at, "frame replaced before it was shown");
                        }
                        if let Err(e) = write_repeated(&mut backend, &prev, repeat, &progress) {
                            record_failure(&mut backend, &failure, e.to_string());
                            return;
                        }
                        written += repeat;
                        slot
                    }
                    None => 0,
                };
                pending = Some((buffer, start));
            }
            WriterMsg::Finish { end, done } => {
                if let Some((last, start)) = pending.take() {
                    // A frame stamped exactly at the end time still gets one slot.
                    let repeat = end.to_frame_slot(fps).saturating_sub(start).max(1);
                    if let Err(e) = write_repeated(&mut backend, &last, repeat, &progress) {
                        let reason = e.to_string();
                        record_failure(&mut backend, &failure, reason.clone());
                        let _ = done.send(FinalizeStatus::Failed(reason));
                        return;
                    }
                    written += repeat;
                }
                let status = match backend.finish() {
                    Ok(()) => FinalizeStatus::Completed(EncodeSummary {
                        frames_written: written,
                        duration: end,
                    }),
                    Err(e) => {
                        let reason = e.to_string();
                        record_failure(&mut backend, &failure, reason.clone());
                        FinalizeStatus::Failed(reason)
                    }
                };
                let _ = done.send(status);
                return;
            }
        }
    }

    // Every sender dropped without a Finish, or the session failed: discard what is queued.
    tracing::debug!("encoder queue closed before finalize; aborting");
    backend.abort();
}

fn record_failure<B: EncoderBackend>(backend: &mut B, failure: &FailureSlot, reason: String) {
    tracing::warn!(%reason, "encoder backend failed");
    {
        let mut slot = lock_failure(failure);
        if slot.is_none() {
            *slot = Some(reason);
        }
    }
    backend.abort();
}

fn write_repeated<B: EncoderBackend>(
    backend: &mut B,
    buffer: &PixelBuffer,
    repeat: u64,
    progress: &AtomicU64,
) -> ReelResult<()> {
    if repeat == 0 {
        return Ok(());
    }
    let pixels = buffer.packed();
    for _ in 0..repeat {
        backend.write_frame(&pixels)?;
        progress.fetch_add(1, Ordering::Release);
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/session.rs"]
mod tests;
