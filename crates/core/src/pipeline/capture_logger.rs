use std::collections::HashMap;
use std::time::Instant;

/// Observer for capture-loop events.
///
/// The orchestrator reports stage timings and counters here; each
/// implementation decides what to keep and where it goes.
pub trait CaptureLogger: Send {
    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time value (faces per frame, sharpness, ...).
    fn metric(&mut self, name: &str, value: f64);

    /// Count one occurrence of a named event.
    fn count(&mut self, name: &str);

    /// A round left the capture stage. Default: no-op.
    fn round_finished(&mut self, _round: u64) {}
}

/// Discards everything. Used by tests.
pub struct NullCaptureLogger;

impl CaptureLogger for NullCaptureLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn count(&mut self, _name: &str) {}
}

/// Aggregates per-round statistics and writes a summary through `log`
/// whenever a round leaves capture.
pub struct LogCaptureLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    counters: HashMap<String, u64>,
    round_start: Instant,
}

impl LogCaptureLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            counters: HashMap::new(),
            round_start: Instant::now(),
        }
    }

    /// Formatted summary of the data gathered so far, or `None` if empty.
    pub fn summary_string(&self, round: u64) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() && self.counters.is_empty() {
            return None;
        }

        let elapsed_s = self.round_start.elapsed().as_secs_f64();
        let mut lines = vec![format!("Round {round} capture summary ({elapsed_s:.1}s):")];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  ({} frames)",
                durations.len()
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        let mut counters: Vec<_> = self.counters.iter().collect();
        counters.sort();
        for (name, count) in counters {
            lines.push(format!("  {name}: {count}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn count_of(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    fn reset(&mut self) {
        self.timings.clear();
        self.metrics.clear();
        self.counters.clear();
        self.round_start = Instant::now();
    }
}

impl Default for LogCaptureLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureLogger for LogCaptureLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn count(&mut self, name: &str) {
        *self.counters.entry(name.to_string()).or_default() += 1;
    }

    fn round_finished(&mut self, round: u64) {
        if let Some(text) = self.summary_string(round) {
            log::info!("\n{text}");
        }
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullCaptureLogger;
        logger.timing("detect", 5.0);
        logger.metric("faces", 2.0);
        logger.count("detector_errors");
        logger.round_finished(1);
    }

    #[test]
    fn test_timings_are_recorded_per_stage() {
        let mut logger = LogCaptureLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("quality", 2.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("quality").unwrap().len(), 1);
    }

    #[test]
    fn test_summary_lists_stages_metrics_and_counters() {
        let mut logger = LogCaptureLogger::new();
        logger.timing("detect", 10.0);
        logger.metric("faces_per_frame", 1.0);
        logger.metric("faces_per_frame", 2.0);
        logger.count("quality_rejections");

        let summary = logger.summary_string(3).unwrap();
        assert!(summary.contains("Round 3"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("faces_per_frame: avg 1.5"));
        assert!(summary.contains("quality_rejections: 1"));
    }

    #[test]
    fn test_round_finished_starts_fresh() {
        let mut logger = LogCaptureLogger::new();
        logger.timing("detect", 10.0);
        logger.count("detector_errors");
        logger.round_finished(1);

        assert!(logger.summary_string(2).is_none());
        assert_eq!(logger.count_of("detector_errors"), 0);
    }
}
