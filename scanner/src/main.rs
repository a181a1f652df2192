mod detector;
mod sink;
mod source;
mod tools;

use detector::{DetectError, DetectionSettings};
use particle_scan_common::config::Config;
use sink::{DiscardSink, FrameSink, PngDirectorySink};
use source::ffmpeg::{check_ffmpeg_available, FfmpegSource};
use source::{FrameSource, SourceError};
use std::path::{Path, PathBuf};
use tools::ToolError;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        video = %config.video.path.display(),
        mode = config.run.mode,
        roi = %config.detection.roi,
        threshold = config.detection.threshold,
        "starting particle-scan"
    );

    check_ffmpeg_available(&config.video.ffmpeg);

    let result = match config.run.mode.as_str() {
        "detect" => run_detect(&config),
        "extract" => run_extract(&config),
        "preview" => run_preview(&config),
        other => {
            error!(
                mode = other,
                "unknown run mode, expected 'detect', 'extract' or 'preview'"
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        error!(error = %e, "run failed");
        std::process::exit(1);
    }
}

fn open_source(config: &Config) -> Result<FfmpegSource, SourceError> {
    FfmpegSource::open(
        &config.video.path,
        &config.video.ffmpeg,
        &config.video.ffprobe,
    )
}

fn build_sink(config: &Config) -> Box<dyn FrameSink> {
    if !config.output.save_frames {
        return Box::new(DiscardSink);
    }
    match PngDirectorySink::new(&config.output.dir) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            error!(error = %e, "detected frames will not be saved");
            Box::new(DiscardSink)
        }
    }
}

fn run_detect(config: &Config) -> Result<(), RunError> {
    // Validate before touching the video.
    let settings = DetectionSettings::new(config.detection.roi, config.detection.threshold)
        .map_err(DetectError::from)?;

    let mut source = open_source(config)?;
    match source.frame_count() {
        Some(total) => info!(total, "total frames in video"),
        None => warn!("container does not report a frame count"),
    }

    let mut sink = build_sink(config);
    let report = detector::scan(&mut source, &settings, sink.as_mut())?;
    source.close()?;

    info!(
        particles = report.events.len(),
        frames = report.frames_processed,
        "number of particles in video"
    );
    if report.persist_failures > 0 {
        warn!(
            failures = report.persist_failures,
            "some detected frames could not be saved"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_extract(config: &Config) -> Result<(), RunError> {
    let mut source = open_source(config)?;
    let frame = tools::extract_frame(&mut source, config.run.frame_index)?;
    source.close()?;

    let gray = tools::to_gray(&frame.image);
    let mean_intensity = tools::mean_intensity(&gray);
    save(gray, &config.run.extract_path)?;
    info!(
        frame_index = frame.index,
        path = %config.run.extract_path.display(),
        mean_intensity = format!("{:.4}", mean_intensity),
        "frame saved"
    );
    Ok(())
}

fn run_preview(config: &Config) -> Result<(), RunError> {
    let mut source = open_source(config)?;
    let frame = tools::extract_frame(&mut source, config.run.frame_index)?;
    source.close()?;

    let preview = tools::render_roi_preview(&frame.image, &config.detection.roi)?;
    save(preview.annotated, &config.run.preview_path)?;
    save(preview.crop, &config.run.crop_path)?;
    info!(
        frame_index = frame.index,
        roi = %config.detection.roi,
        preview = %config.run.preview_path.display(),
        crop = %config.run.crop_path.display(),
        "roi preview saved"
    );
    Ok(())
}

fn save(image: impl Into<image::DynamicImage>, path: &Path) -> Result<(), ToolError> {
    image.into().save(path).map_err(|e| ToolError::Save {
        path: path.display().to_string(),
        source: e,
    })
}
