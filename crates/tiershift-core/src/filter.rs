//! Selection filters
//!
//! A [`SelectionFilter`] is a conjunction of [`FilterTerm`]s. Each term names
//! one attribute and the set of values accepted for it; a volume matches when
//! every term accepts it. An empty filter matches every volume.

use crate::types::{Tier, VolumeDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Volume attribute a term inspects
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAttribute {
    /// Resource tag by key
    Tag(String),
    /// Storage tier
    VolumeType,
    /// Locality identifier
    AvailabilityZone,
    /// Lifecycle state
    State,
}

impl std::fmt::Display for FilterAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterAttribute::Tag(key) => write!(f, "tag:{key}"),
            FilterAttribute::VolumeType => f.write_str("volume-type"),
            FilterAttribute::AvailabilityZone => f.write_str("availability-zone"),
            FilterAttribute::State => f.write_str("status"),
        }
    }
}

/// One (attribute, accepted-values) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTerm {
    /// Attribute inspected
    pub attribute: FilterAttribute,
    /// Accepted values (exact, case-sensitive)
    pub values: BTreeSet<String>,
}

impl FilterTerm {
    /// Create term
    #[must_use]
    pub fn new<I, S>(attribute: FilterAttribute, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Term over a tag
    #[inline]
    #[must_use]
    pub fn tag(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(FilterAttribute::Tag(key.into()), [value.into()])
    }

    /// Term over the storage tier
    #[inline]
    #[must_use]
    pub fn volume_type(tier: &Tier) -> Self {
        Self::new(FilterAttribute::VolumeType, [tier.as_str()])
    }

    /// Check a volume against this term
    #[must_use]
    pub fn matches(&self, volume: &VolumeDescriptor) -> bool {
        let actual = match &self.attribute {
            FilterAttribute::Tag(key) => volume.tag(key),
            FilterAttribute::VolumeType => Some(volume.volume_type.as_str()),
            FilterAttribute::AvailabilityZone => Some(volume.availability_zone.as_str()),
            FilterAttribute::State => Some(volume.state.as_str()),
        };
        actual.is_some_and(|value| self.values.contains(value))
    }
}

/// Conjunction of filter terms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionFilter {
    terms: Vec<FilterTerm>,
}

impl SelectionFilter {
    /// Create empty filter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference migration filter: opted-in by tag and still on the source tier
    #[must_use]
    pub fn tier_migration(
        tag_key: impl Into<String>,
        tag_value: impl Into<String>,
        source_tier: &Tier,
    ) -> Self {
        Self::new()
            .with_term(FilterTerm::tag(tag_key, tag_value))
            .with_term(FilterTerm::volume_type(source_tier))
    }

    /// With term
    #[inline]
    #[must_use]
    pub fn with_term(mut self, term: FilterTerm) -> Self {
        self.terms.push(term);
        self
    }

    /// Terms in this filter
    #[inline]
    #[must_use]
    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    /// Check a volume against every term
    #[inline]
    #[must_use]
    pub fn matches(&self, volume: &VolumeDescriptor) -> bool {
        self.terms.iter().all(|term| term.matches(volume))
    }
}

impl std::fmt::Display for SelectionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("<all>");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            let values: Vec<&str> = term.values.iter().map(String::as_str).collect();
            write!(f, "{} in [{}]", term.attribute, values.join(","))?;
        }
        Ok(())
    }
}
