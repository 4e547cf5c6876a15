//! Publish gate
//!
//! The single authorization boundary for registry pushes. It only decides
//! whether anything may be pushed; what gets pushed is the tag deriver's job.

use crate::domain::event::{Event, EventKind};

/// Returns false for pull requests, true for every other event
pub fn may_push(event: &Event) -> bool {
    event.kind != EventKind::PullRequest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_requests_never_push() {
        let pr = Event::new(EventKind::PullRequest, "refs/pull/1/merge", "abc")
            .with_head_ref("main")
            .with_semver_tag("v1.0.0");
        assert!(!may_push(&pr));
    }

    #[test]
    fn test_other_events_may_push() {
        for kind in [EventKind::Push, EventKind::Schedule, EventKind::Tag] {
            assert!(may_push(&Event::new(kind, "refs/heads/main", "abc")));
        }
    }
}
