pub mod events;
mod executor;
pub mod types;

#[cfg(test)]
mod tests;

pub use events::{EventPublisher, JobEvent, TaskLog};
pub use executor::{AnalysisEngine, JobHandle};
pub use types::{
    AnalysisJob, FinalReport, JobOptions, JobState, JobStatus, SectionResult, SectionSpec, WebSuggestion,
};

/// Planning failure is the only road to `Failed`; every active state can be
/// canceled by the caller.
pub fn can_transition(from: JobState, to: JobState) -> bool {
    if from == to {
        return true;
    }
    match from {
        JobState::Created => matches!(to, JobState::Planning | JobState::Canceled),
        JobState::Planning => matches!(
            to,
            JobState::Analyzing | JobState::Failed | JobState::Canceled
        ),
        JobState::Analyzing => matches!(to, JobState::Augmenting | JobState::Canceled),
        JobState::Augmenting => matches!(to, JobState::Compiling | JobState::Canceled),
        JobState::Compiling => matches!(to, JobState::Completed | JobState::Canceled),
        JobState::Completed | JobState::Failed | JobState::Canceled => false,
    }
}
