//! Semantic version tags
//!
//! Parses `MAJOR.MINOR.PATCH[-prerelease][+build]` with an optional leading
//! `v`. The original text is kept because the exact tag is published as-is.

use std::fmt;
use std::str::FromStr;

/// Parsed semantic version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
    pub build: Option<String>,
    original: String,
}

/// Why a tag is not a semantic version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVerError(String);

impl fmt::Display for SemVerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid semantic version: {}", self.0)
    }
}

impl std::error::Error for SemVerError {}

impl SemVer {
    /// The tag exactly as it was given (e.g. "v2.1.0")
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// `MAJOR.MINOR`
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl FromStr for SemVer {
    type Err = SemVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| SemVerError(format!("'{}': {}", s, reason));

        let body = s.strip_prefix('v').unwrap_or(s);

        let (rest, build) = match body.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (body, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let mut parts = core.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err("expected MAJOR.MINOR.PATCH"));
        };

        let major = parse_numeric(major).ok_or_else(|| err("bad major version"))?;
        let minor = parse_numeric(minor).ok_or_else(|| err("bad minor version"))?;
        let patch = parse_numeric(patch).ok_or_else(|| err("bad patch version"))?;

        if let Some(pre) = pre {
            if !valid_identifiers(pre, true) {
                return Err(err("bad pre-release"));
            }
        }
        if let Some(build) = build {
            if !valid_identifiers(build, false) {
                return Err(err("bad build metadata"));
            }
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre: pre.map(str::to_string),
            build: build.map(str::to_string),
            original: s.to_string(),
        })
    }
}

/// Numeric identifier: digits only, no leading zero unless it is "0"
fn parse_numeric(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn valid_identifiers(s: &str, numeric_rules: bool) -> bool {
    s.split('.').all(|ident| {
        if ident.is_empty()
            || !ident
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return false;
        }
        // Pre-release numeric identifiers must not have leading zeros
        if numeric_rules && ident.bytes().all(|b| b.is_ascii_digit()) {
            return parse_numeric(ident).is_some();
        }
        true
    })
}
