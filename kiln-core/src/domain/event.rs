//! Trigger event domain types
//!
//! An event is supplied by the source-control host and passed explicitly to
//! the pipeline entry point. Nothing reads it from ambient state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::run::RunGroup;

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";
const PULL_PREFIX: &str = "refs/pull/";

/// Kind of trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Schedule,
    Tag,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Schedule => "schedule",
            EventKind::Tag => "tag",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" | "pr" => Ok(EventKind::PullRequest),
            "schedule" => Ok(EventKind::Schedule),
            "tag" => Ok(EventKind::Tag),
            other => Err(format!(
                "unknown event kind '{}' (expected push, pull_request, schedule or tag)",
                other
            )),
        }
    }
}

/// Incoming trigger event
///
/// Read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub head_ref: Option<String>,
    pub commit_sha: String,
    #[serde(default)]
    pub semver_tag: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, git_ref: impl Into<String>, commit_sha: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
            head_ref: None,
            commit_sha: commit_sha.into(),
            semver_tag: None,
        }
    }

    pub fn with_head_ref(mut self, head_ref: impl Into<String>) -> Self {
        self.head_ref = Some(head_ref.into());
        self
    }

    pub fn with_semver_tag(mut self, tag: impl Into<String>) -> Self {
        self.semver_tag = Some(tag.into());
        self
    }

    /// Branch name if the ref points at a branch
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix(BRANCH_PREFIX)
    }

    /// Tag name if the ref points at a tag
    pub fn tag_name(&self) -> Option<&str> {
        self.git_ref.strip_prefix(TAG_PREFIX)
    }

    /// Pull request number for `refs/pull/<n>/...` refs
    pub fn pull_request_number(&self) -> Option<u64> {
        self.git_ref
            .strip_prefix(PULL_PREFIX)
            .and_then(|rest| rest.split('/').next())
            .and_then(|n| n.parse().ok())
    }

    /// Candidate semantic-version tag
    ///
    /// The explicit field wins; otherwise a tag ref supplies it.
    pub fn semver_candidate(&self) -> Option<&str> {
        self.semver_tag.as_deref().or_else(|| self.tag_name())
    }

    /// Returns true for a push to a branch (as opposed to a tag push)
    pub fn is_branch_push(&self) -> bool {
        self.kind == EventKind::Push && self.branch().is_some()
    }

    /// Abbreviated commit SHA
    pub fn short_sha(&self, len: usize) -> &str {
        match self.commit_sha.char_indices().nth(len) {
            Some((idx, _)) => &self.commit_sha[..idx],
            None => &self.commit_sha,
        }
    }

    /// Coordination group of this event
    pub fn run_group(&self) -> RunGroup {
        RunGroup::for_event(self)
    }
}
