//! Progress reporting service
//!
//! Keeps progress reporting out of the processing code so each frontend can
//! render it its own way.

use crate::types::ProcessingTimings;
use instant::Instant;

/// Stages of one retouch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Building the processor and loading cascades or models
    Initialization,
    /// Loading and decoding input image
    ImageLoading,
    /// Locating faces, eyes and mouths
    RegionDetection,
    /// Running the segmentation cascade
    Segmentation,
    /// Filtering, blending and compositing
    Processing,
    /// Encoding and writing the result
    FileSaving,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Initialization => "Loading detectors and models",
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::RegionDetection => "Detecting facial regions",
            ProcessingStage::Segmentation => "Separating foreground",
            ProcessingStage::Processing => "Applying retouch",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Initialization => 5,
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::RegionDetection => 25,
            ProcessingStage::Segmentation => 50,
            ProcessingStage::Processing => 80,
            ProcessingStage::FileSaving => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    #[must_use]
    pub fn with_description(stage: ProcessingStage, description: String, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            stage,
            description,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Receiver of progress events
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Reporter that discards everything
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Reporter that logs progress
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// `verbose` adds elapsed times and the timing breakdown
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        log::info!("✅ Retouch completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Image decode: {}ms", timings.image_decode_ms);
            log::info!("    • Detection: {}ms", timings.detection_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    • Processing: {}ms", timings.processing_ms);
            if let Some(encode_ms) = timings.image_encode_ms {
                log::info!("    • Encode: {}ms", encode_ms);
            }
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Tracks elapsed time and the current stage for one call
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Tracker that reports nothing
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report progress with a custom description
    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::with_description(stage, description, self.start_time));
    }

    pub fn report_completion(&self, timings: &ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Initialization);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct TestProgressReporter {
        updates: Arc<Mutex<Vec<ProgressUpdate>>>,
        completions: Arc<Mutex<Vec<ProcessingTimings>>>,
        errors: Arc<Mutex<Vec<(ProcessingStage, String)>>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }

        fn report_completion(&self, timings: &ProcessingTimings) {
            self.completions.lock().unwrap().push(timings.clone());
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            ProcessingStage::Initialization,
            ProcessingStage::ImageLoading,
            ProcessingStage::RegionDetection,
            ProcessingStage::Segmentation,
            ProcessingStage::Processing,
            ProcessingStage::FileSaving,
            ProcessingStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_tracker_forwards_to_reporter() {
        let reporter = TestProgressReporter::default();
        let mut tracker = ProgressTracker::new(Box::new(reporter.clone()));
        assert!(tracker.current_stage().is_none());

        tracker.report_stage(ProcessingStage::RegionDetection);
        tracker.report_stage_with_description(ProcessingStage::Processing, "Smoothing skin".to_string());
        tracker.report_error("kernel too large");
        tracker.report_completion(&ProcessingTimings {
            total_ms: 12,
            ..ProcessingTimings::default()
        });

        let updates = reporter.updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].description, "Detecting facial regions");
        assert_eq!(updates[1].description, "Smoothing skin");
        assert_eq!(updates[1].progress, 80);

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors[0].0, ProcessingStage::Processing);
        assert_eq!(reporter.completions.lock().unwrap()[0].total_ms, 12);
    }

    #[test]
    fn test_no_op_tracker() {
        let mut tracker = ProgressTracker::no_op();
        tracker.report_stage(ProcessingStage::Completed);
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Completed));
    }
}
