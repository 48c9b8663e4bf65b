use ndarray::Array2;

use crate::background::{BackgroundFit, BackgroundLightModel, MatchCandidate};
use crate::frame::Frame;

/// Background-reduction stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Sampling,
    Fitting,
    Profiling,
    Matching,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sampling => write!(f, "Sampling inter-order nodes"),
            Self::Fitting => write!(f, "Fitting background surface"),
            Self::Profiling => write!(f, "Deriving brightness profile"),
            Self::Matching => write!(f, "Matching stored backgrounds"),
            Self::Writing => write!(f, "Writing background"),
        }
    }
}

/// A frame whose own inter-order light was measured.
#[derive(Clone, Debug)]
pub struct MeasuredFrame {
    pub corrected: Frame,
    pub fit: BackgroundFit,
    pub model: BackgroundLightModel,
}

/// A multi-fiber frame corrected with matched backgrounds.
#[derive(Clone, Debug)]
pub struct MatchedFrame {
    pub corrected: Frame,
    pub background: Array2<f32>,
    pub matches: Vec<MatchCandidate>,
}

/// Outcome of reducing one frame in a session.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Reduction {
    Measured(MeasuredFrame),
    Matched(MatchedFrame),
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Measured(m) => write!(f, "Measured ({} nodes)", m.fit.nodes.len()),
            Self::Matched(m) => write!(f, "Matched ({} fibers)", m.matches.len()),
        }
    }
}

/// Thread-safe progress reporting for background reduction.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. fibers), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
