use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgAction, Parser};
use reelmaker::{Fps, ImageCrateDecoder, MovieSettings, MovieWriter, load_images};

#[derive(Parser, Debug)]
#[command(name = "reelmaker", version, disable_help_flag = true)]
struct Cli {
    /// Source images, in playback order (e.g. ~/Downloads/*.png).
    files: Vec<PathBuf>,

    /// Output MP4 path.
    #[arg(short, long = "output-file", default_value = "a.mp4")]
    output_file: PathBuf,

    /// Video width (0 means the width of the first image).
    #[arg(short, long, default_value_t = 0)]
    width: u32,

    /// Video height (0 means the height of the first image).
    #[arg(short, long, default_value_t = 0)]
    height: u32,

    /// Frames per second.
    #[arg(short, long, default_value_t = 30)]
    fps: u32,

    /// Frames per image.
    #[arg(short = 'F', long, default_value_t = 1)]
    fpi: u32,

    /// Print job parameters and debug logs.
    #[arg(short, long)]
    verbose: bool,

    /// Print help.
    #[arg(short = '?', long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = MovieSettings {
        width: cli.width,
        height: cli.height,
        fps: Fps::new(cli.fps)?,
        frames_per_image: cli.fpi,
        ..MovieSettings::default()
    };
    let writer = MovieWriter::new(settings)?;

    let images = load_images(&ImageCrateDecoder, &cli.files);
    let out = &cli.output_file;
    if images.is_empty() {
        return Err(reelmaker::ReelError::NoInputImages)
            .with_context(|| format!("input stage failed for '{}'", out.display()));
    }

    if out.exists() {
        if cli.verbose {
            println!("delete old file={}", out.display());
        }
        if let Err(e) = std::fs::remove_file(out) {
            tracing::warn!(path = %out.display(), error = %e, "could not remove existing output");
        }
    }

    if cli.verbose {
        println!("files={:?}", cli.files);
        println!("images.count={}", images.len());
        if let Some(first) = images.first() {
            let canvas = writer.settings().resolve_canvas(first)?;
            println!("size={canvas}");
        }
        println!("output={}", out.display());
        println!("fps={}", cli.fps);
        println!("fpi={}", cli.fpi);
    }

    let summary = match writer.make_movie(&images, out) {
        Ok(summary) => summary,
        Err(err) => {
            let stage = err.stage();
            if out.exists() {
                let _ = std::fs::remove_file(out);
            }
            return Err(err)
                .with_context(|| format!("{stage} stage failed for '{}'", out.display()));
        }
    };

    if cli.verbose {
        println!("Succeeded: created file={}", out.display());
        println!(
            "frames={} duration={:.3}s",
            summary.frames_written,
            summary.duration.as_secs_f64()
        );
        match reelmaker::probe_duration_secs(out) {
            Ok(secs) => println!("probed duration={secs:.3}s"),
            Err(e) => tracing::debug!(error = %e, "ffprobe unavailable"),
        }
    }
    Ok(())
}
