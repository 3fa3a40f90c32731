/// Encoder/muxer seam and the in-memory backend.
pub mod backend;
/// System `ffmpeg` backend (H.264 MP4).
pub mod ffmpeg;
/// Session lifecycle: open, append, finalize.
pub mod session;
