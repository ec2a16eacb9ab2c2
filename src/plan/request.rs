//! Plan requests.

use std::collections::BTreeSet;

use crate::model::{Feature, FeatureSet, Tag, TagSet};

/// What a plan must achieve and under which configuration.
///
/// # Examples
///
/// ```rust
/// use passplan::{model::Catalog, plan::PlanRequest};
///
/// let mut catalog = Catalog::new();
/// let parsed = catalog.tag("parsed")?;
/// let dex = catalog.tag("dex")?;
/// let desugar = catalog.feature("desugar")?;
///
/// let request = PlanRequest::new()
///     .target(dex)
///     .feature(desugar)
///     .initial(parsed)
///     .exclude("verify");
///
/// assert!(request.targets().contains(dex));
/// assert!(request.is_excluded("verify"));
/// # Ok::<(), passplan::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanRequest {
    targets: TagSet,
    features: FeatureSet,
    excluded: BTreeSet<String>,
    included: Vec<String>,
    initial: TagSet,
}

impl PlanRequest {
    /// An empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target tag.
    #[must_use]
    pub fn target(mut self, tag: Tag) -> Self {
        self.targets.insert(tag);
        self
    }

    /// Adds several target tags.
    #[must_use]
    pub fn targets_all(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.targets.extend(tags);
        self
    }

    /// Enables a feature.
    #[must_use]
    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    /// Enables several features.
    #[must_use]
    pub fn features_all(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features.extend(features);
        self
    }

    /// Excludes a schedulable by name.
    #[must_use]
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded.insert(name.into());
        self
    }

    /// Forces a schedulable into the plan, together with whatever it needs.
    #[must_use]
    pub fn include(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.included.contains(&name) {
            self.included.push(name);
        }
        self
    }

    /// Assumes `tag` holds for every item before the first stage.
    #[must_use]
    pub fn initial(mut self, tag: Tag) -> Self {
        self.initial.insert(tag);
        self
    }

    /// Assumes several tags hold initially.
    #[must_use]
    pub fn initial_all(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.initial.extend(tags);
        self
    }

    /// Target tags.
    #[must_use]
    pub fn targets(&self) -> &TagSet {
        &self.targets
    }

    /// Enabled features.
    #[must_use]
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Returns true if `name` is excluded.
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }

    /// Excluded names in lexical order.
    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    /// Explicitly included names in request order.
    #[must_use]
    pub fn included(&self) -> &[String] {
        &self.included
    }

    /// Assumed initial tags.
    #[must_use]
    pub fn initial_tags(&self) -> &TagSet {
        &self.initial
    }
}
