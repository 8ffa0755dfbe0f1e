use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("harness not initialized: run 'ft init'")]
    NotInitialized,

    #[error("invalid feat id '{0}': expected f-<yyyymmdd>-<slug>")]
    InvalidFeatId(String),

    #[error("invalid task id '{0}': expected T-<nnn>")]
    InvalidTaskId(String),

    #[error("invalid slug '{0}': empty after normalization")]
    InvalidSlug(String),

    #[error("{0}")]
    Usage(String),

    #[error("feat not found: {0}")]
    FeatNotFound(String),

    #[error("task not found: {feat}/{task}")]
    TaskNotFound { feat: String, task: String },

    #[error("missing document: {}", .0.display())]
    DocumentMissing(PathBuf),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("{0}")]
    Invariant(String),

    #[error("gate failed for {feat}/{task}: {}", .reasons.join("; "))]
    GateFailed {
        feat: String,
        task: String,
        reasons: Vec<String>,
    },

    #[error("consistency check failed: {0} error(s)")]
    Inconsistent(usize),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("readiness check failed: {}", .0.join("; "))]
    NotReady(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Coarse error class, used by callers that branch on "what went wrong"
/// rather than on the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    NotFound,
    StateInvariant,
    GateFailure,
    Consistency,
    ExternalTool,
    Io,
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::InvalidFeatId(_)
            | HarnessError::InvalidTaskId(_)
            | HarnessError::InvalidSlug(_)
            | HarnessError::Usage(_) => ErrorKind::Usage,
            HarnessError::NotInitialized
            | HarnessError::FeatNotFound(_)
            | HarnessError::TaskNotFound { .. }
            | HarnessError::DocumentMissing(_) => ErrorKind::NotFound,
            HarnessError::InvalidTransition { .. }
            | HarnessError::Invariant(_)
            | HarnessError::NotReady(_) => ErrorKind::StateInvariant,
            HarnessError::GateFailed { .. } => ErrorKind::GateFailure,
            HarnessError::Inconsistent(_) => ErrorKind::Consistency,
            HarnessError::Git { .. } | HarnessError::NotARepository(_) => ErrorKind::ExternalTool,
            HarnessError::Io(_) | HarnessError::Yaml(_) | HarnessError::Json(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        HarnessError::Invariant(msg.into())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Usage => "usage",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StateInvariant => "state_invariant",
            ErrorKind::GateFailure => "gate_failure",
            ErrorKind::Consistency => "consistency",
            ErrorKind::ExternalTool => "external_tool",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}
