//! Tag domain types
//!
//! Tag rules are small pure evaluators. Each looks at the event and emits at
//! most one base tag; the deriver in [`crate::tags`] combines them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::event::{Event, EventKind};
use crate::domain::semver::SemVer;

/// Longest tag the registry accepts
pub const MAX_TAG_LEN: usize = 128;

/// Literal emitted by the latest determination
pub const LATEST: &str = "latest";

fn default_schedule_pattern() -> String {
    "nightly".to_string()
}

fn default_sha_length() -> usize {
    7
}

/// A statically declared tag rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TagRule {
    /// Fixed literal for scheduled runs
    ScheduleLiteral {
        #[serde(default = "default_schedule_pattern")]
        pattern: String,
    },
    /// Branch name for branch pushes, PR ref name for pull requests
    RefBased,
    /// The semantic-version tag as given (e.g. "v2.1.0")
    SemverExact,
    /// `MAJOR.MINOR` of a release version
    SemverMajorMinor,
    /// `MAJOR` of a release version
    SemverMajor,
    /// Abbreviated commit SHA
    Sha {
        #[serde(default = "default_sha_length")]
        length: usize,
    },
}

impl TagRule {
    /// Stable rule name for logs
    pub fn name(&self) -> &'static str {
        match self {
            TagRule::ScheduleLiteral { .. } => "schedule-literal",
            TagRule::RefBased => "ref-based",
            TagRule::SemverExact => "semver-exact",
            TagRule::SemverMajorMinor => "semver-major-minor",
            TagRule::SemverMajor => "semver-major",
            TagRule::Sha { .. } => "sha",
        }
    }

    /// Evaluates the rule against an event
    ///
    /// Returns the raw, unsanitized base tag, or `None` if the rule does not
    /// apply to this event.
    pub fn evaluate(&self, event: &Event) -> Option<String> {
        match self {
            TagRule::ScheduleLiteral { pattern } => {
                (event.kind == EventKind::Schedule).then(|| pattern.clone())
            }
            TagRule::RefBased => ref_name(event),
            TagRule::SemverExact => semver(event).map(|v| v.original().to_string()),
            TagRule::SemverMajorMinor => semver(event)
                .filter(|v| !v.is_prerelease())
                .map(|v| v.major_minor()),
            TagRule::SemverMajor => semver(event)
                .filter(|v| !v.is_prerelease() && v.major > 0)
                .map(|v| v.major.to_string()),
            TagRule::Sha { length } => {
                let sha = event.short_sha(*length);
                (!sha.is_empty()).then(|| sha.to_string())
            }
        }
    }

    /// The rule list used when a pipeline declares none explicitly
    pub fn defaults() -> Vec<TagRule> {
        vec![
            TagRule::ScheduleLiteral {
                pattern: default_schedule_pattern(),
            },
            TagRule::RefBased,
            TagRule::SemverExact,
            TagRule::SemverMajorMinor,
            TagRule::SemverMajor,
            TagRule::Sha {
                length: default_sha_length(),
            },
        ]
    }
}

fn ref_name(event: &Event) -> Option<String> {
    match event.kind {
        EventKind::Push => event.branch().map(str::to_string),
        EventKind::PullRequest => match event.pull_request_number() {
            Some(n) => Some(format!("pr-{}", n)),
            None => event
                .head_ref
                .clone()
                .or_else(|| event.git_ref.rsplit('/').next().map(str::to_string))
                .filter(|name| !name.is_empty()),
        },
        EventKind::Schedule | EventKind::Tag => None,
    }
}

fn semver(event: &Event) -> Option<SemVer> {
    event.semver_candidate()?.parse().ok()
}

/// Which run gets the `latest` tag
///
/// The trigger configuration leaves the precedence between a release and a
/// default-branch push open, so it is a setting rather than a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatestPolicy {
    /// Branch push to the default branch, unless the event carries a release
    #[default]
    Auto,
    /// Events carrying a non-prerelease semantic version
    Release,
    /// Never emit `latest`
    Never,
}

impl fmt::Display for LatestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LatestPolicy::Auto => "auto",
            LatestPolicy::Release => "release",
            LatestPolicy::Never => "never",
        })
    }
}

impl LatestPolicy {
    /// Decides whether the event is the canonical `latest` run
    pub fn selects(&self, event: &Event, default_branch: &str) -> bool {
        match self {
            LatestPolicy::Auto => {
                event.is_branch_push()
                    && event.branch() == Some(default_branch)
                    && semver(event).is_none()
            }
            LatestPolicy::Release => semver(event).is_some_and(|v| !v.is_prerelease()),
            LatestPolicy::Never => false,
        }
    }
}

/// Ordered, duplicate-free set of registry tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tag unless already present
    ///
    /// Returns false for duplicates, which keeps the first-seen position.
    pub fn push(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.0.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.push(tag);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(git_ref: &str) -> Event {
        Event::new(EventKind::Push, git_ref, "abc1234def")
    }

    #[test]
    fn test_tagset_dedup_preserves_first_seen_order() {
        let set: TagSet = ["a", "b", "a", "c"].into_iter().collect();
        assert_eq!(set.as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn test_schedule_literal_only_on_schedule() {
        let rule = TagRule::ScheduleLiteral {
            pattern: "nightly".to_string(),
        };
        let schedule = Event::new(EventKind::Schedule, "refs/heads/main", "abc");
        assert_eq!(rule.evaluate(&schedule).as_deref(), Some("nightly"));
        assert_eq!(rule.evaluate(&push("refs/heads/main")), None);
    }

    #[test]
    fn test_ref_based() {
        assert_eq!(
            TagRule::RefBased.evaluate(&push("refs/heads/development")).as_deref(),
            Some("development")
        );
        assert_eq!(TagRule::RefBased.evaluate(&push("refs/tags/v1.0.0")), None);

        let pr = Event::new(EventKind::PullRequest, "refs/pull/12/merge", "abc");
        assert_eq!(TagRule::RefBased.evaluate(&pr).as_deref(), Some("pr-12"));

        let pr = Event::new(EventKind::PullRequest, "feature", "abc").with_head_ref("feature/gpu");
        assert_eq!(TagRule::RefBased.evaluate(&pr).as_deref(), Some("feature/gpu"));

        let schedule = Event::new(EventKind::Schedule, "refs/heads/main", "abc");
        assert_eq!(TagRule::RefBased.evaluate(&schedule), None);
    }

    #[test]
    fn test_semver_rules() {
        let event = push("refs/heads/main").with_semver_tag("v2.1.0");
        assert_eq!(TagRule::SemverExact.evaluate(&event).as_deref(), Some("v2.1.0"));
        assert_eq!(TagRule::SemverMajorMinor.evaluate(&event).as_deref(), Some("2.1"));
        assert_eq!(TagRule::SemverMajor.evaluate(&event).as_deref(), Some("2"));
    }

    #[test]
    fn test_semver_rules_skip_malformed_tag() {
        let event = push("refs/heads/main").with_semver_tag("23.08");
        assert_eq!(TagRule::SemverExact.evaluate(&event), None);
        assert_eq!(TagRule::SemverMajorMinor.evaluate(&event), None);
        assert_eq!(TagRule::SemverMajor.evaluate(&event), None);
    }

    #[test]
    fn test_prerelease_does_not_move_floating_tags() {
        let event = push("refs/heads/main").with_semver_tag("v3.0.0-rc.1");
        assert_eq!(TagRule::SemverExact.evaluate(&event).as_deref(), Some("v3.0.0-rc.1"));
        assert_eq!(TagRule::SemverMajorMinor.evaluate(&event), None);
        assert_eq!(TagRule::SemverMajor.evaluate(&event), None);
    }

    #[test]
    fn test_major_zero_has_no_major_tag() {
        let event = push("refs/heads/main").with_semver_tag("0.4.2");
        assert_eq!(TagRule::SemverMajorMinor.evaluate(&event).as_deref(), Some("0.4"));
        assert_eq!(TagRule::SemverMajor.evaluate(&event), None);
    }

    #[test]
    fn test_sha_rule_length() {
        let event = push("refs/heads/main");
        assert_eq!(TagRule::Sha { length: 7 }.evaluate(&event).as_deref(), Some("abc1234"));
        assert_eq!(TagRule::Sha { length: 3 }.evaluate(&event).as_deref(), Some("abc"));
    }

    #[test]
    fn test_latest_policy() {
        let main = push("refs/heads/main");
        assert!(LatestPolicy::Auto.selects(&main, "main"));
        assert!(!LatestPolicy::Auto.selects(&push("refs/heads/dev"), "main"));
        assert!(!LatestPolicy::Auto.selects(&main.clone().with_semver_tag("v1.2.3"), "main"));
        assert!(!LatestPolicy::Never.selects(&main, "main"));

        let release = push("refs/tags/v1.2.3");
        assert!(LatestPolicy::Release.selects(&release, "main"));
        assert!(!LatestPolicy::Release.selects(&push("refs/tags/v1.2.3-beta"), "main"));
        assert!(!LatestPolicy::Release.selects(&main, "main"));
    }

    #[test]
    fn test_rule_toml_shape() {
        let rule: TagRule = serde_json::from_str(r#"{"kind":"sha"}"#).unwrap();
        assert_eq!(rule, TagRule::Sha { length: 7 });

        let rule: TagRule =
            serde_json::from_str(r#"{"kind":"schedule-literal","pattern":"edge"}"#).unwrap();
        assert_eq!(rule.evaluate(&Event::new(EventKind::Schedule, "x", "y")).as_deref(), Some("edge"));
    }
}
