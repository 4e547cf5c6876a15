//! Pipeline manifest
//!
//! The static declaration of a pipeline, loaded from TOML: target image
//! repository, build description, variant matrix and tag rules. A built-in
//! default covers the dimensionality matrix (`1`, `2`, `3`, `RZ`).
//!
//! ```toml
//! image = "localhost/warpx"
//! default_branch = "main"
//! latest = "auto"
//!
//! [build]
//! file = "Containerfile"
//! context = "."
//! slots = ["DIMS", "CMAKE_OPTIONS"]
//!
//! [build.args]
//! DIMS = "{variant}"
//! CMAKE_OPTIONS = "-DWarpX_DIMS={variant}"
//!
//! [[variants]]
//! id = "RZ"
//!
//! [[tags]]
//! kind = "sha"
//! ```

use anyhow::{Context, Result};
use kiln_core::domain::image::BuildDescription;
use kiln_core::domain::tag::{LatestPolicy, TagRule};
use kiln_core::domain::variant::VariantSpec;
use kiln_core::error::ConfigurationError;
use kiln_core::resolver::VariantResolver;
use kiln_core::tags::TagDeriver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_CMAKE_OPTIONS: &str =
    "-DWarpX_DIMS={variant} -DWarpX_MPI=ON -DWarpX_OPENPMD=ON -DWarpX_PYTHON=ON";

fn default_branch() -> String {
    "main".to_string()
}

/// Build description section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Build instruction file, relative to the manifest
    pub file: PathBuf,
    /// Build context directory, relative to the manifest
    #[serde(default = "default_context")]
    pub context: PathBuf,
    /// Declared build-argument slots
    pub slots: Vec<String>,
    /// Argument template applied to every variant
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

/// Whole pipeline declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineManifest {
    /// Registry repository receiving the images (without tag)
    pub image: String,

    /// Branch whose pushes are canonical for `latest`
    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default)]
    pub latest: LatestPolicy,

    /// Overrides the runner's platform
    #[serde(default)]
    pub platform: Option<String>,

    pub build: BuildSection,

    pub variants: Vec<VariantSpec>,

    /// Tag rules in evaluation order; omitted means the default rules
    #[serde(default)]
    pub tags: Option<Vec<TagRule>>,
}

impl PipelineManifest {
    /// Loads and validates a manifest file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline manifest {}", path.display()))?;
        let manifest = Self::from_toml(&raw)
            .with_context(|| format!("Invalid pipeline manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Parses and validates manifest text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(raw).context("Failed to parse TOML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates the declaration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let image = self.image.trim();
        if image.is_empty() || image.contains(char::is_whitespace) {
            return Err(ConfigurationError::Invalid(format!(
                "image must be a repository reference, got '{}'",
                self.image
            )));
        }

        if image.rsplit('/').next().is_some_and(|last| last.contains(':')) {
            return Err(ConfigurationError::Invalid(
                "image must not carry a tag; tags are derived per event".to_string(),
            ));
        }

        if self.default_branch.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "default_branch cannot be empty".to_string(),
            ));
        }

        if self.build.slots.is_empty() {
            return Err(ConfigurationError::MalformedDescription(
                "build.slots must declare at least one argument".to_string(),
            ));
        }

        if let Some(rules) = &self.tags {
            for rule in rules {
                if let TagRule::Sha { length } = rule {
                    if *length < 4 || *length > 40 {
                        return Err(ConfigurationError::Invalid(format!(
                            "sha tag length must be between 4 and 40, got {}",
                            length
                        )));
                    }
                }
                if let TagRule::ScheduleLiteral { pattern } = rule {
                    if pattern.trim().is_empty() {
                        return Err(ConfigurationError::Invalid(
                            "schedule-literal pattern cannot be empty".to_string(),
                        ));
                    }
                }
            }
        }

        // Matrix problems surface here rather than at the first resolve
        self.resolver().map(|_| ())
    }

    /// Variant resolver for the declared matrix
    pub fn resolver(&self) -> Result<VariantResolver, ConfigurationError> {
        VariantResolver::new(self.build.args.clone(), self.variants.clone())
    }

    /// Tag deriver for the declared rules
    pub fn deriver(&self) -> TagDeriver {
        let rules = self.tags.clone().unwrap_or_else(TagRule::defaults);
        TagDeriver::new(rules, self.default_branch.clone()).with_latest_policy(self.latest)
    }

    /// Loads the build description relative to `base_dir`
    pub fn description(&self, base_dir: &Path) -> Result<BuildDescription, ConfigurationError> {
        BuildDescription::load(
            base_dir.join(&self.build.file),
            base_dir.join(&self.build.context),
            self.build.slots.iter().cloned(),
        )
    }
}

impl Default for PipelineManifest {
    fn default() -> Self {
        let mut args = BTreeMap::new();
        args.insert("DIMS".to_string(), "{variant}".to_string());
        args.insert("CMAKE_OPTIONS".to_string(), DEFAULT_CMAKE_OPTIONS.to_string());

        Self {
            image: "localhost/warpx".to_string(),
            default_branch: default_branch(),
            latest: LatestPolicy::Auto,
            platform: None,
            build: BuildSection {
                file: PathBuf::from("Containerfile"),
                context: default_context(),
                slots: vec!["DIMS".to_string(), "CMAKE_OPTIONS".to_string()],
                args,
            },
            variants: ["1", "2", "3", "RZ"].into_iter().map(VariantSpec::new).collect(),
            tags: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::domain::event::{Event, EventKind};
    use kiln_core::domain::variant::Variant;

    const MANIFEST: &str = r#"
image = "ghcr.io/example/sim"
default_branch = "development"
latest = "release"

[build]
file = "docker/Containerfile"
slots = ["DIMS", "CMAKE_OPTIONS"]

[build.args]
DIMS = "{variant}"
CMAKE_OPTIONS = "-DWarpX_DIMS={variant}"

[[variants]]
id = "3"

[[variants]]
id = "RZ"
args = { CMAKE_OPTIONS = "-DWarpX_DIMS=RZ -DWarpX_PSATD=ON" }

[[tags]]
kind = "ref-based"

[[tags]]
kind = "sha"
length = 8
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PipelineManifest::from_toml(MANIFEST).unwrap();
        assert_eq!(manifest.image, "ghcr.io/example/sim");
        assert_eq!(manifest.default_branch, "development");
        assert_eq!(manifest.latest, LatestPolicy::Release);
        assert_eq!(manifest.build.context, PathBuf::from("."));
        assert_eq!(
            manifest.tags,
            Some(vec![TagRule::RefBased, TagRule::Sha { length: 8 }])
        );

        let params = manifest.resolver().unwrap().resolve(&Variant::new("RZ")).unwrap();
        assert_eq!(params.get("CMAKE_OPTIONS"), Some("-DWarpX_DIMS=RZ -DWarpX_PSATD=ON"));
    }

    #[test]
    fn test_deriver_uses_declared_rules() {
        let manifest = PipelineManifest::from_toml(MANIFEST).unwrap();
        let event = Event::new(EventKind::Push, "refs/heads/development", "0123456789");
        let tags = manifest.deriver().derive(&event, &Variant::new("3"));
        assert_eq!(tags.as_slice(), &["3-development", "3-01234567"]);
    }

    #[test]
    fn test_empty_tag_list_is_kept() {
        let raw = r#"
image = "localhost/warpx"
tags = []

[build]
file = "Containerfile"
slots = ["DIMS"]

[[variants]]
id = "1"
"#;
        let manifest = PipelineManifest::from_toml(raw).unwrap();
        assert_eq!(manifest.tags, Some(vec![]));
        assert!(manifest.deriver().rules().is_empty());
    }

    #[test]
    fn test_missing_tags_use_defaults() {
        let manifest = PipelineManifest::default();
        assert_eq!(manifest.deriver().rules(), TagRule::defaults().as_slice());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut manifest = PipelineManifest::default();
        manifest.image = "localhost/warpx:latest".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = PipelineManifest::default();
        manifest.variants.push(VariantSpec::new("RZ"));
        assert_eq!(
            manifest.validate().unwrap_err(),
            ConfigurationError::DuplicateVariant("RZ".to_string())
        );

        let mut manifest = PipelineManifest::default();
        manifest.tags = Some(vec![TagRule::Sha { length: 2 }]);
        assert!(manifest.validate().is_err());

        let mut manifest = PipelineManifest::default();
        manifest.build.slots.clear();
        assert!(matches!(
            manifest.validate(),
            Err(ConfigurationError::MalformedDescription(_))
        ));
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        let mut manifest = PipelineManifest::default();
        manifest.image = "localhost:5000/warpx".to_string();
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_description_is_loaded_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Containerfile"), "FROM ubuntu:24.04\nARG DIMS\n").unwrap();

        let manifest = PipelineManifest::default();
        let description = manifest.description(dir.path()).unwrap();
        assert_eq!(description.file, dir.path().join("Containerfile"));
        assert!(description.slots.contains("DIMS"));
    }
}
