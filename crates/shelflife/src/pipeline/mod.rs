pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, PipelineWarning};
pub use progress::{
    BroadcastProgress, NoopProgress, PipelineStage, ProgressEvent, ProgressReporter,
    ReceiptProgressEvent,
};
pub use runner::{Pipeline, RunResult, Trigger};
