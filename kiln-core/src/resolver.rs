//! Variant resolver
//!
//! Maps a declared variant to its build parameters. Resolution is a pure
//! function of the variant and the static matrix: a shared argument template
//! with `{variant}` placeholders, overridden by the entry's own arguments.

use std::collections::BTreeMap;

use crate::domain::variant::{BuildParameterSet, Variant, VariantSpec};
use crate::error::ConfigurationError;

/// Placeholder replaced by the variant id in template values
pub const VARIANT_PLACEHOLDER: &str = "{variant}";

/// Resolves variants of a statically declared matrix
#[derive(Debug, Clone)]
pub struct VariantResolver {
    template: BTreeMap<String, String>,
    variants: Vec<VariantSpec>,
}

impl VariantResolver {
    /// Creates a resolver, validating the matrix
    ///
    /// # Arguments
    /// * `template` - Arguments applied to every variant
    /// * `variants` - Declared matrix, in fan-out order
    pub fn new(
        template: BTreeMap<String, String>,
        variants: Vec<VariantSpec>,
    ) -> Result<Self, ConfigurationError> {
        if variants.is_empty() {
            return Err(ConfigurationError::Invalid(
                "variant matrix is empty".to_string(),
            ));
        }

        for (idx, spec) in variants.iter().enumerate() {
            if !spec.id.is_valid() {
                return Err(ConfigurationError::InvalidVariant(spec.id.to_string()));
            }
            if variants[..idx].iter().any(|other| other.id == spec.id) {
                return Err(ConfigurationError::DuplicateVariant(spec.id.to_string()));
            }
        }

        Ok(Self { template, variants })
    }

    /// Declared variants in matrix order
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().map(|spec| &spec.id)
    }

    pub fn contains(&self, variant: &Variant) -> bool {
        self.variants.iter().any(|spec| &spec.id == variant)
    }

    /// Resolves a variant to its build parameters
    ///
    /// Fails with `UnknownVariant` for anything outside the matrix.
    pub fn resolve(&self, variant: &Variant) -> Result<BuildParameterSet, ConfigurationError> {
        let spec = self
            .variants
            .iter()
            .find(|spec| &spec.id == variant)
            .ok_or_else(|| ConfigurationError::UnknownVariant {
                variant: variant.to_string(),
                declared: self
                    .variants
                    .iter()
                    .map(|s| s.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        let mut params = BuildParameterSet::new();
        for (name, value) in self.template.iter().chain(spec.args.iter()) {
            params.insert(name.clone(), value.replace(VARIANT_PLACEHOLDER, variant.as_str()));
        }
        Ok(params)
    }
}
