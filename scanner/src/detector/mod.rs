pub mod change;
pub mod signal;

use particle_scan_common::frame::DetectionEvent;
use particle_scan_common::roi::{Roi, RoiError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::sink::FrameSink;
use crate::source::{FrameSource, SourceError};

use change::IntensityChangeDetector;
use signal::roi_mean;

/// Strictly positive, finite intensity threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ConfigurationError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigurationError::InvalidThreshold(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Strictly positive, finite frames-per-second value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate(f64);

impl FrameRate {
    pub fn new(fps: f64) -> Result<Self, ConfigurationError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ConfigurationError::InvalidFrameRate(fps));
        }
        Ok(Self(fps))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Seconds from stream start to `frame_index`.
    pub fn timestamp(self, frame_index: u64) -> f64 {
        frame_index as f64 / self.0
    }
}

/// Validated parameters of one detection run.
#[derive(Debug, Clone, Copy)]
pub struct DetectionSettings {
    roi: Roi,
    threshold: Threshold,
}

impl DetectionSettings {
    pub fn new(roi: Roi, threshold: f64) -> Result<Self, ConfigurationError> {
        roi.ensure_non_empty()?;
        let threshold = Threshold::new(threshold)?;
        Ok(Self { roi, threshold })
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }
}

/// Invalid detection setup. Always raised before the first frame is read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Roi(#[from] RoiError),
    #[error("threshold must be a positive number, got {0}")]
    InvalidThreshold(f64),
    #[error("frame rate must be a positive number, got {0}")]
    InvalidFrameRate(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("invalid detection configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("video source unavailable: {0}")]
    Source(#[from] SourceError),
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub frames_processed: u64,
    pub frame_rate: f64,
    /// Detections in stream order.
    pub events: Vec<DetectionEvent>,
    /// Detections whose frame the sink failed to save. These events are still
    /// listed in `events`.
    pub persist_failures: u64,
}

/// Scan `source` to exhaustion and report every abrupt ROI intensity change.
///
/// The ROI and frame rate are checked against the source before any frame is
/// read. Each detected frame is handed to `sink`; sink failures are logged and
/// counted but never stop the scan. A source error, including a frame whose
/// size differs from the one the source reported, aborts the scan.
pub fn scan<S, K>(
    source: &mut S,
    settings: &DetectionSettings,
    sink: &mut K,
) -> Result<ScanReport, DetectError>
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
{
    let (width, height) = source.dimensions();
    let roi = settings.roi();
    roi.ensure_within(width, height)
        .map_err(ConfigurationError::from)?;
    let frame_rate = FrameRate::new(source.frame_rate())?;

    info!(
        roi = %roi,
        threshold = settings.threshold().value(),
        frame_rate = frame_rate.value(),
        total_frames = ?source.frame_count(),
        sink = sink.name(),
        "starting intensity scan"
    );

    let mut detector = IntensityChangeDetector::new(settings.threshold());
    let mut events = Vec::new();
    let mut persist_failures = 0u64;

    while let Some(frame) = source.next_frame()? {
        if (frame.width(), frame.height()) != (width, height) {
            return Err(SourceError::Decode(format!(
                "frame {} is {}x{}, expected {}x{}",
                frame.index,
                frame.width(),
                frame.height(),
                width,
                height
            ))
            .into());
        }
        let signal = roi_mean(&frame.image, &roi);
        let Some(delta) = detector.observe(signal) else {
            continue;
        };

        let event = DetectionEvent {
            timestamp_secs: frame_rate.timestamp(frame.index),
            frame_index: frame.index,
            intensity_delta: delta,
        };
        info!(
            frame_index = event.frame_index,
            timestamp_secs = format!("{:.3}", event.timestamp_secs),
            delta = format!("{:.4}", event.intensity_delta),
            "particle detected"
        );
        events.push(event);

        if let Err(e) = sink.persist(&frame, &frame.detection_label()) {
            persist_failures += 1;
            warn!(error = %e, frame_index = frame.index, "failed to save detected frame");
        }
    }

    let frames_processed = detector.frames_seen();
    debug!(frames_processed, "end of stream");
    info!(
        frames_processed,
        detections = events.len(),
        persist_failures,
        "intensity scan complete"
    );

    Ok(ScanReport {
        frames_processed,
        frame_rate: frame_rate.value(),
        events,
        persist_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{DiscardSink, PersistError};
    use crate::source::memory::MemorySource;
    use particle_scan_common::frame::Frame;

    /// Records every label it is asked to persist.
    #[derive(Default)]
    struct RecordingSink {
        labels: Vec<String>,
    }

    impl FrameSink for RecordingSink {
        fn persist(&mut self, _frame: &Frame, label: &str) -> Result<(), PersistError> {
            self.labels.push(label.to_string());
            Ok(())
        }
    }

    /// Fails every write.
    struct BrokenSink {
        calls: u32,
    }

    impl FrameSink for BrokenSink {
        fn persist(&mut self, frame: &Frame, _label: &str) -> Result<(), PersistError> {
            self.calls += 1;
            Err(PersistError::CreateDir(
                format!("/readonly/{}", frame.index),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ))
        }
    }

    fn settings(threshold: f64) -> DetectionSettings {
        DetectionSettings::new(Roi::new(1, 1, 4, 4), threshold).unwrap()
    }

    fn indices(report: &ScanReport) -> Vec<u64> {
        report.events.iter().map(|e| e.frame_index).collect()
    }

    #[test]
    fn particle_passing_through_fires_on_entry_and_exit() {
        let mut source = MemorySource::uniform(8, 8, 10.0, &[10, 10, 30, 30, 10]);
        let mut sink = RecordingSink::default();
        let report = scan(&mut source, &settings(5.0), &mut sink).unwrap();

        assert_eq!(indices(&report), vec![2, 4]);
        assert!(report.events.iter().all(|e| e.intensity_delta == 20.0));
        assert_eq!(report.frames_processed, 5);
        assert_eq!(sink.labels, vec!["detected_frame_2", "detected_frame_4"]);
    }

    #[test]
    fn empty_and_single_frame_streams_have_no_events() {
        for levels in [&[][..], &[128u8][..]] {
            let mut source = MemorySource::uniform(8, 8, 30.0, levels);
            let report = scan(&mut source, &settings(0.12), &mut DiscardSink).unwrap();
            assert!(report.events.is_empty());
            assert_eq!(report.frames_processed, levels.len() as u64);
        }
    }

    #[test]
    fn constant_signal_has_no_events_for_any_threshold() {
        for threshold in [1e-9, 0.12, 5.0, 254.0] {
            let mut source = MemorySource::uniform(8, 8, 30.0, &[77; 12]);
            let report = scan(&mut source, &settings(threshold), &mut DiscardSink).unwrap();
            assert!(report.events.is_empty(), "threshold {threshold}");
        }
    }

    #[test]
    fn delta_equal_to_threshold_does_not_fire() {
        let mut source = MemorySource::uniform(8, 8, 30.0, &[10, 15, 10]);
        let report = scan(&mut source, &settings(5.0), &mut DiscardSink).unwrap();
        assert!(report.events.is_empty());

        let mut source = MemorySource::uniform(8, 8, 30.0, &[10, 15, 10]);
        let report = scan(&mut source, &settings(4.999), &mut DiscardSink).unwrap();
        assert_eq!(indices(&report), vec![1, 2]);
    }

    #[test]
    fn events_are_strictly_increasing_and_timestamped() {
        let levels: Vec<u8> = (0..60).map(|i| if i % 3 == 0 { 200 } else { 20 }).collect();
        let mut source = MemorySource::uniform(8, 8, 25.0, &levels);
        let report = scan(&mut source, &settings(0.12), &mut DiscardSink).unwrap();

        assert!(!report.events.is_empty());
        assert!(report
            .events
            .windows(2)
            .all(|w| w[0].frame_index < w[1].frame_index));
        for event in &report.events {
            assert_eq!(event.timestamp_secs, event.frame_index as f64 / 25.0);
        }
    }

    #[test]
    fn repeated_scans_are_identical() {
        let levels = [3, 90, 91, 40, 40, 250, 0, 0, 17];
        let run = || {
            let mut source = MemorySource::uniform(8, 8, 29.97, &levels);
            scan(&mut source, &settings(0.5), &mut DiscardSink).unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn only_roi_changes_matter() {
        // Flicker outside the ROI must not fire.
        let mut frames = Vec::new();
        for i in 0..6u8 {
            let mut img = image::RgbImage::from_pixel(8, 8, image::Rgb([50, 50, 50]));
            img.put_pixel(7, 7, image::Rgb([i * 40, i * 40, i * 40]));
            frames.push(img);
        }
        let mut source = MemorySource::new(8, 8, 30.0, frames);
        let report = scan(&mut source, &settings(0.12), &mut DiscardSink).unwrap();
        assert!(report.events.is_empty());
    }

    #[test]
    fn empty_roi_is_rejected_before_scanning() {
        let err = DetectionSettings::new(Roi::new(200, 0, 0, 380), 0.12).unwrap_err();
        assert!(matches!(err, ConfigurationError::Roi(RoiError::Empty { .. })));
        let err = DetectionSettings::new(Roi::new(200, 0, 50, 0), 0.12).unwrap_err();
        assert!(matches!(err, ConfigurationError::Roi(RoiError::Empty { .. })));
    }

    #[test]
    fn non_positive_threshold_is_rejected() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = DetectionSettings::new(Roi::new(0, 0, 1, 1), threshold);
            assert!(matches!(result, Err(ConfigurationError::InvalidThreshold(_))));
        }
    }

    #[test]
    fn roi_outside_frame_is_rejected_before_reading() {
        let mut source = MemorySource::uniform(8, 8, 30.0, &[1, 2, 3]);
        let settings = DetectionSettings::new(Roi::new(6, 0, 4, 4), 0.12).unwrap();
        let err = scan(&mut source, &settings, &mut DiscardSink).unwrap_err();
        assert!(matches!(
            err,
            DetectError::Configuration(ConfigurationError::Roi(RoiError::OutOfBounds { .. }))
        ));
        assert_eq!(source.frames_read(), 0);
    }

    #[test]
    fn zero_frame_rate_is_rejected_before_reading() {
        let mut source = MemorySource::uniform(8, 8, 0.0, &[1, 50, 3]);
        let err = scan(&mut source, &settings(0.12), &mut DiscardSink).unwrap_err();
        assert!(matches!(
            err,
            DetectError::Configuration(ConfigurationError::InvalidFrameRate(fps)) if fps == 0.0
        ));
        assert_eq!(source.frames_read(), 0);
    }

    #[test]
    fn persist_failures_do_not_interrupt_the_scan() {
        let mut source = MemorySource::uniform(8, 8, 10.0, &[10, 10, 30, 30, 10]);
        let mut sink = BrokenSink { calls: 0 };
        let report = scan(&mut source, &settings(5.0), &mut sink).unwrap();
        assert_eq!(indices(&report), vec![2, 4]);
        assert_eq!(report.persist_failures, 2);
        assert_eq!(sink.calls, 2);
        assert_eq!(report.frames_processed, 5);
    }

    #[test]
    fn source_failure_aborts_the_scan() {
        let mut source = MemorySource::uniform(8, 8, 10.0, &[10, 30, 10, 30]).failing_after(2);
        let err = scan(&mut source, &settings(5.0), &mut DiscardSink).unwrap_err();
        assert!(matches!(err, DetectError::Source(SourceError::Decode(_))));
    }

    #[test]
    fn frame_of_unexpected_size_aborts_the_scan() {
        let frames = vec![
            image::RgbImage::from_pixel(8, 8, image::Rgb([10, 10, 10])),
            image::RgbImage::from_pixel(4, 16, image::Rgb([10, 10, 10])),
        ];
        let mut source = MemorySource::new(8, 8, 30.0, frames);
        let err = scan(&mut source, &settings(5.0), &mut DiscardSink).unwrap_err();
        assert!(matches!(
            err,
            DetectError::Source(SourceError::Decode(msg)) if msg.contains("4x16")
        ));
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn timestamp_divides_index_by_rate() {
        let rate = FrameRate::new(30.0).unwrap();
        assert_eq!(rate.timestamp(0), 0.0);
        assert_eq!(rate.timestamp(45), 1.5);
        assert!(FrameRate::new(0.0).is_err());
        assert!(FrameRate::new(f64::NAN).is_err());
    }
}
