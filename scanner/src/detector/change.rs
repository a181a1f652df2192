use tracing::debug;

use super::Threshold;

/// Lag-1 intensity-change detector.
///
/// Holds the previous frame's signal and compares every new signal against
/// it. The baseline moves on every frame, so a particle that keeps the ROI
/// changing across several frames fires on each of them; no debouncing is
/// applied.
pub struct IntensityChangeDetector {
    threshold: Threshold,
    previous_signal: Option<f64>,
    /// Index of the next frame to be observed.
    frames_seen: u64,
}

impl IntensityChangeDetector {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            previous_signal: None,
            frames_seen: 0,
        }
    }

    /// Feeds the next frame's signal. Returns the absolute change against the
    /// previous frame when it strictly exceeds the threshold.
    pub fn observe(&mut self, signal: f64) -> Option<f64> {
        let frame_index = self.frames_seen;
        self.frames_seen += 1;

        let Some(previous) = self.previous_signal.replace(signal) else {
            debug!(frame_index, signal, "first frame, no comparison");
            return None;
        };

        let delta = (signal - previous).abs();
        let detected = delta > self.threshold.value();
        debug!(
            frame_index,
            signal = format!("{:.4}", signal),
            delta = format!("{:.4}", delta),
            threshold = self.threshold.value(),
            detected,
            "intensity comparison"
        );
        detected.then_some(delta)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
