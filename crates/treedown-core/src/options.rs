use std::fmt;
use std::sync::Arc;

use crate::registry::{Overrides, Registry};

/// Replaceable URL validator. Receives the attribute name (`url` today) and
/// the raw URL; returns the value to emit, or `None` to reject it.
pub type SanitizeFn = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// Replaceable heading-id generator. Uniqueness suffixes are applied on top
/// of whatever this returns.
pub type SlugifyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Per-call configuration for `parse` and `compile`.
#[derive(Clone, Default)]
pub struct Options {
    /// Renderer/attribute overrides layered over the base rule registry.
    pub overrides: Overrides,
    /// Custom sanitizer; the scheme allow-list is used when unset.
    pub sanitizer: Option<SanitizeFn>,
    /// Custom slug base function; the built-in slugifier is used when unset.
    pub slugify: Option<SlugifyFn>,
    /// Treat the whole input as one block, skipping block detection.
    pub force_block: bool,
    /// Treat the whole input as a single inline run.
    pub force_inline: bool,
    /// Turn off raw-HTML block and span recognition; angle brackets become
    /// ordinary text.
    pub disable_parsing_raw_html: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the configuration against the registry the compile will use.
    /// This runs before any parsing, and is the only error path in the
    /// compile entry points.
    pub fn validate(&self, registry: &Registry) -> Result<(), ConfigError> {
        if self.force_block && self.force_inline {
            return Err(ConfigError::ConflictingForceModes);
        }
        for key in self.overrides.keys() {
            if let Some(tag) = key.strip_prefix("html:") {
                if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
                    return Err(ConfigError::InvalidTagOverride(key.to_string()));
                }
                continue;
            }
            if !registry.contains(key) {
                return Err(ConfigError::InvalidTagOverride(key.to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("force_block", &self.force_block)
            .field("force_inline", &self.force_inline)
            .field("disable_parsing_raw_html", &self.disable_parsing_raw_html)
            .field("has_sanitizer", &self.sanitizer.is_some())
            .field("has_slugify", &self.slugify.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// An override names a node type absent from the registry, or a
    /// malformed `html:<tag>` key.
    InvalidTagOverride(String),
    /// `force_block` and `force_inline` were both set.
    ConflictingForceModes,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidTagOverride(key) => {
                write!(f, "override references unknown node type or tag `{key}`")
            }
            ConfigError::ConflictingForceModes => {
                write!(f, "force_block and force_inline cannot both be set")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Options};
    use crate::registry::{Override, Registry, Rule};
    use std::sync::Arc;

    fn registry_with(names: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for name in names {
            registry.insert(*name, Rule::new(Arc::new(|_, _, _| String::new())));
        }
        registry
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let registry = registry_with(&["paragraph"]);
        let mut options = Options::new();
        options.overrides.set("paragraf", Override::default());

        assert_eq!(
            options.validate(&registry),
            Err(ConfigError::InvalidTagOverride("paragraf".to_string()))
        );
    }

    #[test]
    fn tag_overrides_and_known_types_pass() {
        let registry = registry_with(&["paragraph"]);
        let mut options = Options::new();
        options.overrides.set("paragraph", Override::default());
        options.overrides.set("html:div", Override::default());

        assert!(options.validate(&registry).is_ok());
    }

    #[test]
    fn conflicting_force_modes_are_a_config_error() {
        let registry = registry_with(&[]);
        let options = Options {
            force_block: true,
            force_inline: true,
            ..Options::new()
        };

        assert_eq!(
            options.validate(&registry),
            Err(ConfigError::ConflictingForceModes)
        );
    }
}
