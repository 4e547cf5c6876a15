//! Tag deriver
//!
//! Computes the registry tags for one (event, variant) pair:
//! - each rule is evaluated independently, in declared order
//! - rule output is sanitized into registry tag syntax
//! - the `latest` determination is appended when the policy selects the event
//! - every tag gets the `<variant>-` prefix
//! - duplicates are dropped, keeping the first occurrence
//!
//! Derivation is a pure function of its inputs: no counters, no clock.

use tracing::{trace, warn};

use crate::domain::event::Event;
use crate::domain::tag::{LATEST, LatestPolicy, MAX_TAG_LEN, TagRule, TagSet};
use crate::domain::variant::Variant;

/// Tag deriver configured with the static rule list
#[derive(Debug, Clone)]
pub struct TagDeriver {
    rules: Vec<TagRule>,
    default_branch: String,
    latest: LatestPolicy,
}

impl TagDeriver {
    /// Creates a deriver with the `auto` latest policy
    pub fn new(rules: Vec<TagRule>, default_branch: impl Into<String>) -> Self {
        Self {
            rules,
            default_branch: default_branch.into(),
            latest: LatestPolicy::default(),
        }
    }

    pub fn with_latest_policy(mut self, policy: LatestPolicy) -> Self {
        self.latest = policy;
        self
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn latest_policy(&self) -> LatestPolicy {
        self.latest
    }

    /// Whether this event is the canonical run that receives `latest`
    pub fn is_canonical(&self, event: &Event) -> bool {
        self.latest.selects(event, &self.default_branch)
    }

    /// Derives the tag set for one variant
    ///
    /// An empty rule list yields an empty set, `latest` included.
    pub fn derive(&self, event: &Event, variant: &Variant) -> TagSet {
        if self.rules.is_empty() {
            return TagSet::new();
        }

        let mut base: Vec<String> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let raw = rule.evaluate(event)?;
                let tag = sanitize(&raw);
                trace!(rule = rule.name(), raw = %raw, tag = %tag, "rule emitted tag");
                (!tag.is_empty()).then_some(tag)
            })
            .collect();

        if self.is_canonical(event) {
            base.push(LATEST.to_string());
        }

        let mut tags = TagSet::new();
        for base_tag in base {
            let Some(tag) = prefix(variant, &base_tag) else {
                warn!(
                    "Dropping tag '{}' for variant {}: longer than {} characters",
                    base_tag, variant, MAX_TAG_LEN
                );
                continue;
            };
            if !is_valid_tag(&tag) {
                warn!("Dropping invalid registry tag '{}' for variant {}", tag, variant);
                continue;
            }
            tags.push(tag);
        }
        tags
    }
}

/// Prefixes a base tag with the variant
///
/// Returns `None` when the result exceeds the registry limit. Tags are never
/// truncated: cutting `a-` + base and `a-b-` + base to the same length can
/// make them equal.
pub fn prefix(variant: &Variant, base: &str) -> Option<String> {
    let tag = format!("{}-{}", variant, base);
    (tag.len() <= MAX_TAG_LEN).then_some(tag)
}

/// Maps arbitrary rule output onto registry tag characters
///
/// Lowercases and replaces anything outside `[a-z0-9._-]` with `-`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Registry tag grammar: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= MAX_TAG_LEN
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;

    fn deriver() -> TagDeriver {
        TagDeriver::new(TagRule::defaults(), "main")
    }

    fn tags(set: &TagSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn test_default_branch_push() {
        let event = Event::new(EventKind::Push, "refs/heads/main", "abc1234");
        let set = deriver().derive(&event, &Variant::new("3"));
        assert_eq!(tags(&set), vec!["3-main", "3-abc1234", "3-latest"]);
    }

    #[test]
    fn test_schedule_event() {
        let event = Event::new(EventKind::Schedule, "refs/heads/main", "abc1234ffff");
        let set = deriver().derive(&event, &Variant::new("RZ"));
        assert!(set.contains("RZ-nightly"));
        assert!(set.contains("RZ-abc1234"));
        assert!(!set.contains("RZ-latest"));
    }

    #[test]
    fn test_semver_push() {
        let event =
            Event::new(EventKind::Push, "refs/tags/v2.1.0", "0badc0ffee").with_semver_tag("v2.1.0");
        let set = deriver().derive(&event, &Variant::new("1"));
        for expected in ["1-v2.1.0", "1-2.1", "1-2", "1-0badc0f"] {
            assert!(set.contains(expected), "missing {} in {:?}", expected, set);
        }
        assert!(!set.contains("1-latest"));
    }

    #[test]
    fn test_semver_on_default_branch_suppresses_latest() {
        let event = Event::new(EventKind::Push, "refs/heads/main", "abc1234").with_semver_tag("v2.1.0");
        let set = deriver().derive(&event, &Variant::new("2"));
        assert!(set.contains("2-main"));
        assert!(set.contains("2-2.1"));
        assert!(!set.contains("2-latest"));
    }

    #[test]
    fn test_release_policy_moves_latest_to_releases() {
        let deriver = deriver().with_latest_policy(LatestPolicy::Release);
        let release = Event::new(EventKind::Tag, "refs/tags/v2.1.0", "abc1234");
        let main = Event::new(EventKind::Push, "refs/heads/main", "abc1234");

        assert!(deriver.derive(&release, &Variant::new("1")).contains("1-latest"));
        assert!(!deriver.derive(&main, &Variant::new("1")).contains("1-latest"));
    }

    #[test]
    fn test_pull_request_tags() {
        let event = Event::new(EventKind::PullRequest, "refs/pull/5/merge", "abc1234")
            .with_head_ref("feature");
        let set = deriver().derive(&event, &Variant::new("2"));
        assert_eq!(tags(&set), vec!["2-pr-5", "2-abc1234"]);
    }

    #[test]
    fn test_branch_names_are_sanitized() {
        let event = Event::new(EventKind::Push, "refs/heads/Feature/GPU+CUDA", "abc1234");
        let set = deriver().derive(&event, &Variant::new("3"));
        assert!(set.contains("3-feature-gpu-cuda"));
        assert!(set.iter().all(is_valid_tag));
    }

    #[test]
    fn test_empty_rules_yield_empty_set() {
        let deriver = TagDeriver::new(Vec::new(), "main");
        let event = Event::new(EventKind::Push, "refs/heads/main", "abc1234");
        assert!(deriver.is_canonical(&event));
        assert!(deriver.derive(&event, &Variant::new("3")).is_empty());
    }

    #[test]
    fn test_duplicate_rule_output_is_deduplicated() {
        let deriver = TagDeriver::new(
            vec![
                TagRule::RefBased,
                TagRule::Sha { length: 7 },
                TagRule::RefBased,
                TagRule::ScheduleLiteral {
                    pattern: "main".to_string(),
                },
            ],
            "dev",
        );
        let event = Event::new(EventKind::Schedule, "refs/heads/main", "abc1234");
        let set = deriver.derive(&event, &Variant::new("1"));
        assert_eq!(tags(&set), vec!["1-abc1234", "1-main"]);

        let event = Event::new(EventKind::Push, "refs/heads/main", "abc1234");
        let set = deriver.derive(&event, &Variant::new("1"));
        assert_eq!(tags(&set), vec!["1-main", "1-abc1234"]);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let deriver = deriver();
        let event = Event::new(EventKind::Push, "refs/heads/main", "abc1234").with_semver_tag("v1.2.3");
        let variant = Variant::new("RZ");
        assert_eq!(deriver.derive(&event, &variant), deriver.derive(&event, &variant));
    }

    #[test]
    fn test_prefix_is_injective_across_variants() {
        let variants = ["1", "2", "3", "RZ", "1-2"];
        for base in ["main", "latest", "2-main", "x".repeat(120).as_str()] {
            let prefixed: Vec<Option<String>> = variants
                .iter()
                .map(|v| prefix(&Variant::new(*v), base))
                .collect();
            for (i, a) in prefixed.iter().enumerate() {
                for b in &prefixed[i + 1..] {
                    if a.is_some() {
                        assert_ne!(a, b, "collision for base {}", base);
                    }
                }
            }
        }
    }

    #[test]
    fn test_prefix_rejects_overlong_tags() {
        assert_eq!(prefix(&Variant::new("RZ"), &"a".repeat(300)), None);

        let base = "a".repeat(MAX_TAG_LEN - 3);
        let tag = prefix(&Variant::new("RZ"), &base).unwrap();
        assert_eq!(tag.len(), MAX_TAG_LEN);
        assert!(is_valid_tag(&tag));
    }

    #[test]
    fn test_long_bases_never_collide_across_variants() {
        let base = "b-".repeat(100);
        let short = prefix(&Variant::new("a"), &base);
        let long = prefix(&Variant::new("a-b"), &base);
        assert!(short.is_none() && long.is_none());

        // Near the limit, the shorter variant keeps its tag and the longer one loses it
        let base = "b-".repeat(63);
        let short = prefix(&Variant::new("a"), &base);
        let long = prefix(&Variant::new("a-b"), &base);
        assert_eq!(short.as_deref().map(str::len), Some(128));
        assert_eq!(long, None);
        assert_ne!(short, long);
    }

    #[test]
    fn test_overlong_tags_are_dropped_from_the_set() {
        let branch = format!("refs/heads/{}", "b-".repeat(100));
        let event = Event::new(EventKind::Push, branch, "abc1234");
        let a = deriver().derive(&event, &Variant::new("a"));
        let ab = deriver().derive(&event, &Variant::new("a-b"));

        assert_eq!(tags(&a), vec!["a-abc1234"]);
        assert_eq!(tags(&ab), vec!["a-b-abc1234"]);
        assert!(a.iter().all(|t| !ab.contains(t)));
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(is_valid_tag("3-main"));
        assert!(is_valid_tag("RZ-v2.1.0"));
        assert!(is_valid_tag("_x"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("-3"));
        assert!(!is_valid_tag(".3"));
        assert!(!is_valid_tag("3/main"));
        assert!(!is_valid_tag(&"a".repeat(MAX_TAG_LEN + 1)));
    }
}
