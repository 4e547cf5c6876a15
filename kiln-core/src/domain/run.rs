//! Run domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::event::{Event, EventKind};
use crate::domain::image::Image;
use crate::domain::tag::TagSet;
use crate::domain::variant::Variant;
use crate::error::PipelineError;

/// Coordination group: the ref, plus the head ref for pull requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunGroup(String);

impl RunGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_event(event: &Event) -> Self {
        match (&event.kind, &event.head_ref) {
            (EventKind::PullRequest, Some(head)) => Self(format!("{}-{}", event.git_ref, head)),
            _ => Self(event.git_ref.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

/// Why a successfully built image was not pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Publish gate refused the event
    GateDenied,
    /// Tag deriver produced nothing to push
    NoTags,
    /// Caller asked for a build without publishing
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::GateDenied => "publishing not allowed for this event",
            SkipReason::NoTags => "no tags derived",
            SkipReason::DryRun => "dry run",
        })
    }
}

/// Terminal outcome of one variant task
#[derive(Debug, Clone)]
pub enum VariantOutcome {
    Published { image: Image, tags: TagSet },
    Built { image: Image, tags: TagSet, reason: SkipReason },
    Cancelled,
    Failed { error: PipelineError },
}

impl VariantOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, VariantOutcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, VariantOutcome::Cancelled)
    }
}

/// Outcome of one variant within a run
#[derive(Debug, Clone)]
pub struct VariantReport {
    pub variant: Variant,
    pub outcome: VariantOutcome,
}

/// Result of one pipeline run (one event fanned out over the matrix)
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub group: RunGroup,
    pub status: RunStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub variants: Vec<VariantReport>,
}

impl RunReport {
    /// Terminal status for a set of variant outcomes
    ///
    /// Only variants that actually stopped make a run `Cancelled`. A run
    /// superseded after all its pushes began still completes.
    pub fn summarize(variants: &[VariantReport]) -> RunStatus {
        if variants.iter().any(|v| v.outcome.is_cancelled()) {
            RunStatus::Cancelled
        } else if variants.iter().any(|v| v.outcome.is_failure()) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed | RunStatus::Idle | RunStatus::Running => 0,
            RunStatus::Failed => 1,
            RunStatus::Cancelled => 3,
        }
    }

    /// Every tag pushed by this run, including those left by partial pushes
    pub fn published_tags(&self) -> Vec<&str> {
        self.variants
            .iter()
            .flat_map(|v| match &v.outcome {
                VariantOutcome::Published { tags, .. } => tags.iter().collect::<Vec<_>>(),
                VariantOutcome::Failed {
                    error: PipelineError::Push(failure),
                } => failure.published().iter().map(String::as_str).collect(),
                _ => Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildFailure, PushFailure};

    fn report(variant: &str, outcome: VariantOutcome) -> VariantReport {
        VariantReport {
            variant: Variant::new(variant),
            outcome,
        }
    }

    #[test]
    fn test_run_group_for_event() {
        let push = Event::new(EventKind::Push, "refs/heads/main", "abc");
        assert_eq!(push.run_group().as_str(), "refs/heads/main");

        let pr = Event::new(EventKind::PullRequest, "refs/pull/3/merge", "abc").with_head_ref("fix");
        assert_eq!(pr.run_group().as_str(), "refs/pull/3/merge-fix");

        // head_ref only matters for pull requests
        let push = push.with_head_ref("ignored");
        assert_eq!(push.run_group().as_str(), "refs/heads/main");
    }

    #[test]
    fn test_summarize() {
        let failed = report(
            "1",
            VariantOutcome::Failed {
                error: BuildFailure::exited(1, "").into(),
            },
        );
        let cancelled = report("2", VariantOutcome::Cancelled);

        assert_eq!(RunReport::summarize(&[]), RunStatus::Completed);
        assert_eq!(RunReport::summarize(&[failed.clone()]), RunStatus::Failed);
        assert_eq!(RunReport::summarize(&[failed, cancelled]), RunStatus::Cancelled);
    }

    #[test]
    fn test_published_tags_include_partial_pushes() {
        let run = RunReport {
            run_id: Uuid::new_v4(),
            group: RunGroup::new("refs/heads/main"),
            status: RunStatus::Failed,
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
            variants: vec![report(
                "3",
                VariantOutcome::Failed {
                    error: PushFailure::after(vec!["3-main".to_string()], "3-latest", "denied").into(),
                },
            )],
        };
        assert_eq!(run.published_tags(), vec!["3-main"]);
        assert_eq!(run.exit_code(), 1);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Idle.is_terminal());
    }
}
