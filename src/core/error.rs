use thiserror::Error;

/// Fatal to a job: nothing can be dispatched without a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("document is empty")]
    EmptyDocument,
    #[error("document is too short to analyze ({len} characters, need at least {min})")]
    TooShort { len: usize, min: usize },
    #[error("planning timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("planner failed: {0}")]
    Planner(String),
}

/// Recoverable: callers degrade instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("response failed schema validation: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing API token; pass ?token=<token> or an Authorization: Bearer header")]
    MissingToken,
    #[error("invalid or unauthorized API token")]
    InvalidToken,
    #[error("no API tokens configured; create one before exposing the server on a non-loopback address")]
    NoTokensConfigured,
    #[error("token store unavailable: {0}")]
    Store(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("section '{0}' already has a result")]
    DuplicateSection(String),
    #[error("section '{0}' is not part of the plan")]
    UnknownSection(String),
}
