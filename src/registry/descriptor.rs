//! Schedulable descriptors.
//!
//! A [`Descriptor`] is the declarative contract of a pass: which tags it needs, which
//! it produces and removes, which feature gates it, whether it must run exclusively and
//! at which granularity. Descriptors are built once through [`DescriptorBuilder`] and
//! never mutated afterwards.

use crate::{
    model::{Feature, FeatureSet, Granularity, Tag, TagSet},
    plan::Exclusion,
};

/// Declared contract of a schedulable.
///
/// # Examples
///
/// ```rust
/// use passplan::{model::{Catalog, Granularity}, registry::Descriptor};
///
/// let mut catalog = Catalog::new();
/// let cfg = catalog.tag("cfg")?;
/// let ssa = catalog.tag("ssa")?;
///
/// let descriptor = Descriptor::builder("to-ssa")
///     .description("Converts method bodies to SSA form")
///     .needs(cfg)
///     .produces(ssa)
///     .granularity(Granularity::Method)
///     .build();
///
/// assert!(descriptor.needs().contains(cfg));
/// assert!(!descriptor.is_exclusive());
/// # Ok::<(), passplan::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    name: String,
    description: String,
    needs: TagSet,
    produces: TagSet,
    removes: TagSet,
    required_feature: Option<Feature>,
    suppressing_feature: Option<Feature>,
    exclusive: bool,
    granularity: Granularity,
}

impl Descriptor {
    /// Starts a descriptor for a schedulable named `name`.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    /// Unique schedulable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Tags that must hold before the schedulable runs.
    #[must_use]
    pub fn needs(&self) -> &TagSet {
        &self.needs
    }

    /// Tags that hold after the schedulable ran.
    #[must_use]
    pub fn produces(&self) -> &TagSet {
        &self.produces
    }

    /// Tags that no longer hold after the schedulable ran.
    #[must_use]
    pub fn removes(&self) -> &TagSet {
        &self.removes
    }

    /// Feature that must be enabled for the schedulable to be eligible.
    #[must_use]
    pub fn required_feature(&self) -> Option<Feature> {
        self.required_feature
    }

    /// Feature whose activation makes the schedulable ineligible.
    #[must_use]
    pub fn suppressing_feature(&self) -> Option<Feature> {
        self.suppressing_feature
    }

    /// Whether the schedulable runs as a full barrier.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Kind of item the schedulable runs on.
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Why the schedulable is not eligible under `features`, or `None` if it is.
    #[must_use]
    pub fn feature_exclusion(&self, features: &FeatureSet) -> Option<FeatureGate> {
        if let Some(feature) = self.required_feature {
            if !features.contains(feature) {
                return Some(FeatureGate::Disabled(feature));
            }
        }
        if let Some(feature) = self.suppressing_feature {
            if features.contains(feature) {
                return Some(FeatureGate::Suppressed(feature));
            }
        }
        None
    }

    /// Returns true if the schedulable can run under `features`.
    #[must_use]
    pub fn is_eligible(&self, features: &FeatureSet) -> bool {
        self.feature_exclusion(features).is_none()
    }

    /// Returns true if no feature configuration makes both `self` and `other` eligible.
    #[must_use]
    pub fn is_gated_apart_from(&self, other: &Descriptor) -> bool {
        let apart = |a: &Descriptor, b: &Descriptor| {
            matches!((a.required_feature, b.suppressing_feature), (Some(x), Some(y)) if x == y)
        };
        apart(self, other) || apart(other, self)
    }
}

/// Feature-related reason for a schedulable not being eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGate {
    /// The required feature is disabled.
    Disabled(Feature),
    /// The suppressing feature is enabled.
    Suppressed(Feature),
}

impl FeatureGate {
    pub(crate) fn into_exclusion(self, catalog: &crate::model::Catalog) -> Exclusion {
        match self {
            FeatureGate::Disabled(feature) => Exclusion::FeatureDisabled {
                feature: catalog.feature_name(feature),
            },
            FeatureGate::Suppressed(feature) => Exclusion::FeatureSuppressed {
                feature: catalog.feature_name(feature),
            },
        }
    }
}

/// Fluent builder for [`Descriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    inner: Descriptor,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Descriptor {
                name: name.into(),
                description: String::new(),
                needs: TagSet::new(),
                produces: TagSet::new(),
                removes: TagSet::new(),
                required_feature: None,
                suppressing_feature: None,
                exclusive: false,
                granularity: Granularity::Session,
            },
        }
    }

    /// Sets the human readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.inner.description = description.into();
        self
    }

    /// Adds a needed tag.
    #[must_use]
    pub fn needs(mut self, tag: Tag) -> Self {
        self.inner.needs.insert(tag);
        self
    }

    /// Adds several needed tags.
    #[must_use]
    pub fn needs_all(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.inner.needs.extend(tags);
        self
    }

    /// Adds a produced tag.
    #[must_use]
    pub fn produces(mut self, tag: Tag) -> Self {
        self.inner.produces.insert(tag);
        self
    }

    /// Adds several produced tags.
    #[must_use]
    pub fn produces_all(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.inner.produces.extend(tags);
        self
    }

    /// Adds a removed tag.
    #[must_use]
    pub fn removes(mut self, tag: Tag) -> Self {
        self.inner.removes.insert(tag);
        self
    }

    /// Adds several removed tags.
    #[must_use]
    pub fn removes_all(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.inner.removes.extend(tags);
        self
    }

    /// Declares that this schedulable replaces `tag` of the same exclusive group.
    ///
    /// Equivalent to [`removes`](Self::removes); it reads better next to the produced
    /// tag of an exclusive group.
    #[must_use]
    pub fn supersedes(self, tag: Tag) -> Self {
        self.removes(tag)
    }

    /// Only eligible when `feature` is enabled.
    #[must_use]
    pub fn requires_feature(mut self, feature: Feature) -> Self {
        self.inner.required_feature = Some(feature);
        self
    }

    /// Not eligible when `feature` is enabled.
    #[must_use]
    pub fn unless_feature(mut self, feature: Feature) -> Self {
        self.inner.suppressing_feature = Some(feature);
        self
    }

    /// Runs as an exclusive stage.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.inner.exclusive = true;
        self
    }

    /// Sets the granularity (default [`Granularity::Session`]).
    #[must_use]
    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.inner.granularity = granularity;
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> Descriptor {
        self.inner
    }
}
