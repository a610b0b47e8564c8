//! Services that sit between the processing core and its callers

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
