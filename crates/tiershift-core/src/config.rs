//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default so a partial file works.
//!
//! ```toml
//! source_tier = "gp2"
//! target_tier = "gp3"
//! region = "ap-south-1"
//! max_in_flight = 16
//! call_timeout_secs = 30
//!
//! [selection]
//! tag_key = "AutoConvert"
//! tag_value = "true"
//! ```

use crate::error::ConfigError;
use crate::filter::{FilterTerm, SelectionFilter};
use crate::types::Tier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tier volumes are migrated from
    pub source_tier: Tier,
    /// Tier volumes are migrated to
    pub target_tier: Tier,
    /// Region stamped into audit records
    pub region: String,
    /// Selection policy
    pub selection: SelectionConfig,
    /// Maximum concurrent per-volume operations within a stage
    pub max_in_flight: usize,
    /// Deadline for each external call, in seconds
    pub call_timeout_secs: u64,
    /// Subject of every notification
    pub notification_subject: String,
    /// Run the Verifier/Notifier after submitting
    pub verify_after_submit: bool,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on invalid TOML, or any validation error.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`PipelineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Check invariants
    ///
    /// # Errors
    /// The first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_tier.is_blank() {
            return Err(ConfigError::EmptyTier {
                field: "source_tier",
            });
        }
        if self.target_tier.is_blank() {
            return Err(ConfigError::EmptyTier {
                field: "target_tier",
            });
        }
        if self.source_tier == self.target_tier {
            return Err(ConfigError::SameTier(self.source_tier.clone()));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.selection.tag_key.trim().is_empty() {
            return Err(ConfigError::EmptyTagKey);
        }
        Ok(())
    }

    /// Per-call deadline
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Filter selecting volumes to migrate
    #[must_use]
    pub fn selection_filter(&self) -> SelectionFilter {
        self.selection
            .extra_tags
            .iter()
            .fold(
                SelectionFilter::tier_migration(
                    self.selection.tag_key.as_str(),
                    self.selection.tag_value.as_str(),
                    &self.source_tier,
                ),
                |filter, (key, value)| filter.with_term(FilterTerm::tag(key.as_str(), value.as_str())),
            )
    }

    /// With source tier
    #[inline]
    #[must_use]
    pub fn with_source_tier(mut self, tier: impl Into<String>) -> Self {
        self.source_tier = Tier::new(tier);
        self
    }

    /// With target tier
    #[inline]
    #[must_use]
    pub fn with_target_tier(mut self, tier: impl Into<String>) -> Self {
        self.target_tier = Tier::new(tier);
        self
    }

    /// With region
    #[inline]
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// With in-flight window
    #[inline]
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// With per-call timeout in seconds
    #[inline]
    #[must_use]
    pub fn with_call_timeout_secs(mut self, secs: u64) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    /// With or without the verification stage
    #[inline]
    #[must_use]
    pub fn with_verify_after_submit(mut self, verify: bool) -> Self {
        self.verify_after_submit = verify;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_tier: Tier::new("gp2"),
            target_tier: Tier::new("gp3"),
            region: "ap-south-1".to_string(),
            selection: SelectionConfig::default(),
            max_in_flight: 16,
            call_timeout_secs: 30,
            notification_subject: "Volume Status Logged".to_string(),
            verify_after_submit: true,
        }
    }
}

/// Tag-based selection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Opt-in tag key
    pub tag_key: String,
    /// Opt-in tag value
    pub tag_value: String,
    /// Additional tags that must all match
    pub extra_tags: BTreeMap<String, String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            tag_key: "AutoConvert".to_string(),
            tag_value: "true".to_string(),
            extra_tags: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.source_tier, Tier::new("gp2"));
        assert_eq!(config.target_tier, Tier::new("gp3"));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            target_tier = "io2"
            max_in_flight = 4

            [selection]
            extra_tags = { Environment = "staging" }
            "#,
        )
        .unwrap();

        assert_eq!(config.target_tier, Tier::new("io2"));
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.source_tier, Tier::new("gp2"));
        assert_eq!(config.selection.tag_key, "AutoConvert");
        assert_eq!(config.selection.extra_tags.len(), 1);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert_eq!(
            PipelineConfig::new().with_target_tier("gp2").validate(),
            Err(ConfigError::SameTier(Tier::new("gp2")))
        );
        assert_eq!(
            PipelineConfig::new().with_max_in_flight(0).validate(),
            Err(ConfigError::ZeroWindow)
        );
        assert_eq!(
            PipelineConfig::new().with_call_timeout_secs(0).validate(),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            PipelineConfig::new().with_source_tier(" ").validate(),
            Err(ConfigError::EmptyTier {
                field: "source_tier"
            })
        );
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let result = PipelineConfig::from_toml_str("max_in_flight = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = PipelineConfig::load("/nonexistent/tiershift.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn selection_filter_includes_extra_tags() {
        let mut config = PipelineConfig::new();
        config
            .selection
            .extra_tags
            .insert("Team".to_string(), "storage".to_string());

        let filter = config.selection_filter();
        assert_eq!(filter.terms().len(), 3);
        assert_eq!(
            filter.to_string(),
            "tag:AutoConvert in [true] AND volume-type in [gp2] AND tag:Team in [storage]"
        );
    }
}
