pub mod config;
mod session;
mod types;

pub use config::PipelineConfig;
pub use session::ReductionSession;
pub use types::{
    MatchedFrame, MeasuredFrame, NoOpReporter, PipelineStage, ProgressReporter, Reduction,
};
