use std::fs::OpenOptions;
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use crate::encode::backend::EncoderBackend;
use crate::encode::session::EncodingTarget;
use crate::foundation::error::{OpenError, ReelError, ReelResult};

/// Pads odd sides by one black pixel column/row.
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// Options for [`FfmpegBackend`].
#[derive(Clone, Debug)]
pub struct FfmpegBackendOpts {
    /// `ffmpeg` executable, looked up on `PATH` when not absolute.
    pub program: PathBuf,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
    /// x264 constant rate factor.
    pub crf: u8,
}

impl Default for FfmpegBackendOpts {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            overwrite: true,
            crf: 20,
        }
    }
}

/// Encoder backend that spawns the system `ffmpeg` and streams raw frames to its stdin.
///
/// Output is always H.264 (`libx264`, `yuv420p`) in an MP4 container with `+faststart` and no
/// audio track. Odd canvas sides are padded to the next even size on the right/bottom edge.
pub struct FfmpegBackend {
    opts: FfmpegBackendOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,

    out_path: PathBuf,
    frame_len: usize,
}

impl FfmpegBackend {
    /// Create an idle backend; the process is spawned by `start`.
    pub fn new(opts: FfmpegBackendOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            out_path: PathBuf::new(),
            frame_len: 0,
        }
    }

    fn build_command(&self, target: &EncodingTarget) -> Command {
        let mut cmd = Command::new(&self.opts.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if self.opts.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        let fps = target.fps.get().to_string();
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            target.format.ffmpeg_pix_fmt(),
            "-s",
            &target.canvas.to_string(),
            "-r",
            &fps,
            "-i",
            "pipe:0",
        ]);
        // Output: h264 + yuv420p for broad compatibility. yuv420p needs even sides.
        let canvas = target.canvas;
        if !canvas.width.is_multiple_of(2) || !canvas.height.is_multiple_of(2) {
            cmd.args(["-vf", EVEN_PAD_FILTER]);
        }
        cmd.args([
            "-an",
            "-c:v",
            "libx264",
            "-crf",
            &self.opts.crf.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-r",
            &fps,
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ])
        .arg(&target.out_path);
        cmd
    }

    fn join_stderr(&mut self) -> ReelResult<Vec<u8>> {
        match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::encode("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::encode(format!("ffmpeg stderr read failed: {e}"))),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(FfmpegBackendOpts::default())
    }
}

impl EncoderBackend for FfmpegBackend {
    fn start(&mut self, target: &EncodingTarget) -> Result<(), OpenError> {
        if self.child.is_some() {
            return Err(OpenError::EncoderUnavailable(
                "ffmpeg backend is already started".to_string(),
            ));
        }
        let canvas = target.canvas;

        let unwritable = |reason: String| OpenError::DestinationUnwritable {
            path: target.out_path.clone(),
            reason,
        };
        ensure_parent_dir(&target.out_path).map_err(|e| unwritable(format!("{e:#}")))?;
        let existed = target.out_path.exists();
        if !self.opts.overwrite && existed {
            return Err(unwritable("file already exists".to_string()));
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target.out_path)
            .map_err(|e| unwritable(e.to_string()))?;

        if !is_tool_on_path(&self.opts.program) {
            if !existed {
                let _ = std::fs::remove_file(&target.out_path);
            }
            return Err(OpenError::EncoderUnavailable(format!(
                "'{}' is required for MP4 encoding, but could not be run",
                self.opts.program.display()
            )));
        }

        let mut child = match self.build_command(target).spawn() {
            Ok(child) => child,
            Err(e) => {
                if !existed {
                    let _ = std::fs::remove_file(&target.out_path);
                }
                return Err(OpenError::EncoderUnavailable(format!(
                    "failed to spawn '{}': {e}",
                    self.opts.program.display()
                )));
            }
        };

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(mut stderr)) = (stdin, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(OpenError::EncoderUnavailable(
                "failed to open ffmpeg stdio pipes (unexpected)".to_string(),
            ));
        };
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::debug!(
            program = %self.opts.program.display(),
            out = %target.out_path.display(),
            size = %canvas,
            fps = target.fps.get(),
            pix_fmt = target.format.ffmpeg_pix_fmt(),
            "spawned ffmpeg"
        );

        self.frame_len =
            (canvas.width as usize) * (canvas.height as usize) * target.format.bytes_per_pixel();
        self.out_path = target.out_path.clone();
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        Ok(())
    }

    fn write_frame(&mut self, pixels: &[u8]) -> ReelResult<()> {
        if pixels.len() != self.frame_len {
            return Err(ReelError::encode(format!(
                "frame holds {} bytes, expected {}",
                pixels.len(),
                self.frame_len
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encode("ffmpeg backend is not running"));
        };
        stdin
            .write_all(pixels)
            .map_err(|e| ReelError::encode(format!("failed to write frame to ffmpeg stdin: {e}")))
    }

    fn finish(&mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::finalize("ffmpeg backend not started"))?;

        let status = child
            .wait()
            .map_err(|e| ReelError::finalize(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = self.join_stderr()?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::finalize(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        tracing::debug!(out = %self.out_path.display(), "ffmpeg finished");
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(out = %self.out_path.display(), "ffmpeg aborted");
        }
        let _ = self.join_stderr();
    }
}

impl Drop for FfmpegBackend {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `program -version` runs successfully.
pub fn is_tool_on_path(program: impl AsRef<Path>) -> bool {
    Command::new(program.as_ref())
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    is_tool_on_path("ffmpeg")
}

/// Container duration of `path` in seconds, as reported by `ffprobe`.
pub fn probe_duration_secs(path: &Path) -> ReelResult<f64> {
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        format: ProbeFormat,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| ReelError::encode(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::encode(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelError::encode(format!("ffprobe json parse failed: {e}")))?;
    parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ReelError::encode("ffprobe reported no duration"))
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
