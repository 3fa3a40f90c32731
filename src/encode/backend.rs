use std::sync::{Arc, Mutex};

use crate::encode::session::EncodingTarget;
use crate::foundation::error::{OpenError, ReelError, ReelResult};

/// Encoder/muxer reached by a [`crate::VideoEncodingSession`].
///
/// The backend is constant-frame-rate: every `write_frame` call occupies exactly one `1 / fps`
/// slot. `start` runs on the caller's thread; everything else runs on the session's writer
/// thread, in order.
pub trait EncoderBackend: Send + 'static {
    /// Open the container for `target`.
    fn start(&mut self, target: &EncodingTarget) -> Result<(), OpenError>;

    /// Write one output frame of tightly packed pixels in the target's [`crate::PixelFormat`].
    fn write_frame(&mut self, pixels: &[u8]) -> ReelResult<()>;

    /// Flush and close the container. An `Err` is a non-success final status.
    fn finish(&mut self) -> ReelResult<()>;

    /// Release every resource after a failure or an abandoned session.
    fn abort(&mut self);
}

/// What an [`InMemoryBackend`] has seen so far.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecord {
    /// Target passed to `start`.
    pub target: Option<EncodingTarget>,
    /// Every written frame in order.
    pub frames: Vec<Vec<u8>>,
    /// `finish` was called.
    pub finished: bool,
    /// `abort` was called.
    pub aborted: bool,
}

/// Backend that keeps frames in memory, for tests and debugging.
///
/// Clones share the same record, so a clone kept by the caller can inspect what the session
/// wrote after the original moved into the writer thread.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    record: Arc<Mutex<InMemoryRecord>>,
}

impl InMemoryBackend {
    /// Create a backend with an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the shared record.
    pub fn record(&self) -> InMemoryRecord {
        match self.record.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_record<T>(&self, f: impl FnOnce(&mut InMemoryRecord) -> T) -> ReelResult<T> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| ReelError::encode("in-memory record lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl EncoderBackend for InMemoryBackend {
    fn start(&mut self, target: &EncodingTarget) -> Result<(), OpenError> {
        let target = target.clone();
        self.with_record(|r| {
            *r = InMemoryRecord {
                target: Some(target),
                ..InMemoryRecord::default()
            };
        })
        .map_err(|e| OpenError::EncoderUnavailable(e.to_string()))
    }

    fn write_frame(&mut self, pixels: &[u8]) -> ReelResult<()> {
        let pixels = pixels.to_vec();
        self.with_record(|r| {
            if r.finished || r.aborted {
                return Err(ReelError::encode("in-memory backend is closed"));
            }
            r.frames.push(pixels);
            Ok(())
        })?
    }

    fn finish(&mut self) -> ReelResult<()> {
        self.with_record(|r| r.finished = true)
    }

    fn abort(&mut self) {
        let _ = self.with_record(|r| r.aborted = true);
    }
}
