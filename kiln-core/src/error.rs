//! Error taxonomy for the pipeline
//!
//! Every variant run fails independently. A failure in one variant never
//! aborts its siblings, and none of these errors are retried by the core.
//! Cancellation is deliberately absent: a superseded run reports a terminal
//! status, not an error.

use thiserror::Error;

/// Result type alias for pipeline stages
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Static configuration problems
///
/// Fatal for the affected run, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Variant is not part of the declared matrix
    #[error("unknown variant '{variant}' (declared: {declared})")]
    UnknownVariant { variant: String, declared: String },

    /// Variant declared twice in the matrix
    #[error("duplicate variant '{0}' in matrix")]
    DuplicateVariant(String),

    /// Variant id cannot be used as a registry tag prefix
    #[error("invalid variant id '{0}': expected 1-64 characters of [A-Za-z0-9_.-]")]
    InvalidVariant(String),

    /// Build description missing, unreadable or inconsistent with the parameters
    #[error("malformed build description: {0}")]
    MalformedDescription(String),

    /// Anything else wrong with the pipeline declaration
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Toolchain reported a failure
///
/// Carries the complete diagnostic output of the toolchain so the caller can
/// surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("build failed ({status}):\n{diagnostics}")]
pub struct BuildFailure {
    /// Exit code, if the toolchain exited at all
    pub exit_code: Option<i32>,
    /// Human readable summary of how the toolchain ended
    pub status: String,
    /// Full stdout/stderr of the toolchain
    pub diagnostics: String,
}

impl BuildFailure {
    /// Failure for a toolchain that exited with a non-zero code
    pub fn exited(code: i32, diagnostics: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            status: format!("exit code {}", code),
            diagnostics: diagnostics.into(),
        }
    }

    /// Failure for a toolchain that could not be run or was killed
    pub fn toolchain(status: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            status: status.into(),
            diagnostics: diagnostics.into(),
        }
    }
}

/// Layer cache problems
///
/// Always recoverable: a failed read is a miss, a failed write only loses
/// the cache benefit for the next run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(String),

    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e.to_string())
    }
}

/// Registry rejected a push
///
/// Tags are pushed one by one. Tags published before the failing one stay
/// published, which is reported as `Partial` rather than `Total`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushFailure {
    /// Nothing was published
    #[error("push of tag '{tag}' failed: {reason}")]
    Total { tag: String, reason: String },

    /// Some tags were published before a later one failed
    #[error(
        "partial push: {count} tag(s) published before '{failed_tag}' failed: {reason}",
        count = .pushed.len()
    )]
    Partial {
        pushed: Vec<String>,
        failed_tag: String,
        reason: String,
    },
}

impl PushFailure {
    /// Builds the right failure kind from the tags already published
    pub fn after(pushed: Vec<String>, failed_tag: impl Into<String>, reason: impl Into<String>) -> Self {
        if pushed.is_empty() {
            PushFailure::Total {
                tag: failed_tag.into(),
                reason: reason.into(),
            }
        } else {
            PushFailure::Partial {
                pushed,
                failed_tag: failed_tag.into(),
                reason: reason.into(),
            }
        }
    }

    /// Tags that remain published despite the failure
    pub fn published(&self) -> &[String] {
        match self {
            PushFailure::Total { .. } => &[],
            PushFailure::Partial { pushed, .. } => pushed,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, PushFailure::Partial { .. })
    }
}

/// Any fatal error of a single variant run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Build(#[from] BuildFailure),

    #[error(transparent)]
    Push(#[from] PushFailure),

    /// A variant task ended abnormally (e.g. panicked)
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short label used in reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Build(_) => "build",
            PipelineError::Push(PushFailure::Partial { .. }) => "partial-push",
            PipelineError::Push(PushFailure::Total { .. }) => "push",
            PipelineError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_failure_after_nothing_is_total() {
        let failure = PushFailure::after(vec![], "3-main", "denied");
        assert!(!failure.is_partial());
        assert!(failure.published().is_empty());
    }

    #[test]
    fn test_push_failure_after_some_is_partial() {
        let failure = PushFailure::after(vec!["3-main".to_string()], "3-latest", "denied");
        assert!(failure.is_partial());
        assert_eq!(failure.published(), &["3-main".to_string()]);
        assert!(failure.to_string().contains("1 tag(s) published"));
    }

    #[test]
    fn test_pipeline_error_kind() {
        let err: PipelineError = BuildFailure::exited(2, "cmake error").into();
        assert_eq!(err.kind(), "build");

        let err: PipelineError =
            PushFailure::after(vec!["a".to_string()], "b", "timeout").into();
        assert_eq!(err.kind(), "partial-push");
    }

    #[test]
    fn test_build_failure_keeps_diagnostics() {
        let failure = BuildFailure::exited(1, "line 1\nline 2");
        assert_eq!(failure.exit_code, Some(1));
        assert!(failure.to_string().contains("line 2"));
    }
}
