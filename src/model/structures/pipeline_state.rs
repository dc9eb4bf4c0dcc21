use std::fmt;

/// Steps of a single pipeline run.
///
/// `Empty -> Judged(0) -> [Select -> GenerateVariants -> Judge -> DriftCorrect -> Judged(g)]* -> ExportTop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Judged(i32),
    Select(i32),
    GenerateVariants(i32),
    Judge(i32),
    DriftCorrect(i32),
    ExportTop
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Empty => write!(f, "Empty"),
            PipelineState::Judged(g) => write!(f, "Judged({})", g),
            PipelineState::Select(g) => write!(f, "Select({})", g),
            PipelineState::GenerateVariants(g) => write!(f, "GenerateVariants({})", g),
            PipelineState::Judge(g) => write!(f, "Judge({})", g),
            PipelineState::DriftCorrect(g) => write!(f, "DriftCorrect({})", g),
            PipelineState::ExportTop => write!(f, "ExportTop")
        }
    }
}

impl PipelineState {
    /// The generation the state refers to, if any
    pub fn generation(&self) -> Option<i32> {
        match self {
            PipelineState::Judged(g)
            | PipelineState::Select(g)
            | PipelineState::GenerateVariants(g)
            | PipelineState::Judge(g)
            | PipelineState::DriftCorrect(g) => Some(*g),
            PipelineState::Empty | PipelineState::ExportTop => None
        }
    }
}
