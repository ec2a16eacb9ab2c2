//! The catalog of tags, features and exclusive tag groups.
//!
//! A [`Catalog`] is filled once at process start, frozen into an `Arc` and shared by
//! the registry, every plan and every diagnostic. It is the only place names live:
//! everything else passes around dense [`Tag`] / [`Feature`] ids.

use std::{collections::HashMap, fmt::Write};

use crate::{
    model::{
        set::sealed::FromIndex,
        tag::{Feature, FeatureSet, Tag, TagSet},
    },
    Error, Result,
};

/// Identifier of an exclusive tag group inside a [`Catalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(usize);

impl GroupId {
    /// Position of the group in declaration order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named set of tags of which at most one may hold for an item at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusiveGroup {
    /// Group name, used in diagnostics.
    pub name: String,
    /// Member tags.
    pub tags: TagSet,
}

/// Names and ids of all tags, features and exclusive groups of a toolchain.
///
/// # Examples
///
/// ```rust
/// use passplan::model::Catalog;
///
/// let mut catalog = Catalog::new();
/// let source = catalog.tag("source-ir")?;
/// let optimized = catalog.tag("optimized-ir")?;
/// let level = catalog.exclusive_group("ir-level", [source, optimized]);
///
/// assert!(catalog.is_exclusive(source, optimized));
/// assert_eq!(catalog.tags_of(level).len(), 2);
/// assert_eq!(catalog.tag_name(source), "source-ir");
/// # Ok::<(), passplan::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tags: Vec<String>,
    tag_ids: HashMap<String, Tag>,
    features: Vec<String>,
    feature_ids: HashMap<String, Feature>,
    groups: Vec<ExclusiveGroup>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a tag, or returns the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogFull`] once [`TagSet::CAPACITY`] tags exist.
    pub fn tag(&mut self, name: &str) -> Result<Tag> {
        if let Some(tag) = self.tag_ids.get(name) {
            return Ok(*tag);
        }

        let tag = Tag::from_index(Self::next_id("tag", name, self.tags.len())?);
        self.tags.push(name.to_string());
        self.tag_ids.insert(name.to_string(), tag);
        Ok(tag)
    }

    /// Defines a feature, or returns the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogFull`] once [`FeatureSet::CAPACITY`] features exist.
    pub fn feature(&mut self, name: &str) -> Result<Feature> {
        if let Some(feature) = self.feature_ids.get(name) {
            return Ok(*feature);
        }

        let feature = Feature::from_index(Self::next_id("feature", name, self.features.len())?);
        self.features.push(name.to_string());
        self.feature_ids.insert(name.to_string(), feature);
        Ok(feature)
    }

    /// Declares an exclusive group over `tags`.
    ///
    /// Declaring a tag in more than one group is accepted here and reported by
    /// [`crate::registry::Registry::validate`] as [`Error::TagGroupOverlap`].
    pub fn exclusive_group(
        &mut self,
        name: &str,
        tags: impl IntoIterator<Item = Tag>,
    ) -> GroupId {
        self.groups.push(ExclusiveGroup {
            name: name.to_string(),
            tags: tags.into_iter().collect(),
        });
        GroupId(self.groups.len() - 1)
    }

    fn next_id(kind: &'static str, name: &str, len: usize) -> Result<u16> {
        if len >= TagSet::CAPACITY {
            return Err(Error::CatalogFull {
                kind,
                name: name.to_string(),
                capacity: TagSet::CAPACITY,
            });
        }
        u16::try_from(len).map_err(|_| Error::CatalogFull {
            kind,
            name: name.to_string(),
            capacity: TagSet::CAPACITY,
        })
    }

    /// Looks up a tag by name.
    #[must_use]
    pub fn find_tag(&self, name: &str) -> Option<Tag> {
        self.tag_ids.get(name).copied()
    }

    /// Looks up a feature by name.
    #[must_use]
    pub fn find_feature(&self, name: &str) -> Option<Feature> {
        self.feature_ids.get(name).copied()
    }

    /// Name of `tag`, or `#id` for a tag this catalog never defined.
    #[must_use]
    pub fn tag_name(&self, tag: Tag) -> String {
        self.tags
            .get(usize::from(tag.id()))
            .cloned()
            .unwrap_or_else(|| format!("#{}", tag.id()))
    }

    /// Name of `feature`, or `#id` for a feature this catalog never defined.
    #[must_use]
    pub fn feature_name(&self, feature: Feature) -> String {
        self.features
            .get(usize::from(feature.id()))
            .cloned()
            .unwrap_or_else(|| format!("#{}", feature.id()))
    }

    /// Number of defined tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Number of defined features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// All exclusive groups in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[ExclusiveGroup] {
        &self.groups
    }

    /// The group with id `group`.
    #[must_use]
    pub fn group(&self, group: GroupId) -> Option<&ExclusiveGroup> {
        self.groups.get(group.0)
    }

    /// Iterates over `(GroupId, group)` pairs in declaration order.
    pub fn iter_groups(&self) -> impl Iterator<Item = (GroupId, &ExclusiveGroup)> {
        self.groups
            .iter()
            .enumerate()
            .map(|(index, group)| (GroupId(index), group))
    }

    /// Member tags of `group`; empty for an unknown id.
    #[must_use]
    pub fn tags_of(&self, group: GroupId) -> TagSet {
        self.groups
            .get(group.0)
            .map(|g| g.tags)
            .unwrap_or_default()
    }

    /// The first group `tag` belongs to.
    #[must_use]
    pub fn group_of(&self, tag: Tag) -> Option<GroupId> {
        self.iter_groups()
            .find(|(_, group)| group.tags.contains(tag))
            .map(|(id, _)| id)
    }

    /// Returns true if `a` and `b` are distinct tags of a common exclusive group.
    #[must_use]
    pub fn is_exclusive(&self, a: Tag, b: Tag) -> bool {
        a != b
            && self
                .groups
                .iter()
                .any(|group| group.tags.contains(a) && group.tags.contains(b))
    }

    /// Finds the first tag declared in two groups, as `(tag, first, second)`.
    #[must_use]
    pub fn find_overlap(&self) -> Option<(Tag, GroupId, GroupId)> {
        for (i, first) in self.groups.iter().enumerate() {
            for (j, second) in self.groups.iter().enumerate().skip(i + 1) {
                if let Some(tag) = first.tags.intersection(&second.tags).first() {
                    return Some((tag, GroupId(i), GroupId(j)));
                }
            }
        }
        None
    }

    /// Renders a tag set as ``{`a`, `b`}``.
    #[must_use]
    pub fn describe_tags(&self, tags: &TagSet) -> String {
        let mut out = String::from("{");
        for (i, tag) in tags.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "`{}`", self.tag_name(tag));
        }
        out.push('}');
        out
    }

    /// Renders a feature set as ``{`a`, `b`}``.
    #[must_use]
    pub fn describe_features(&self, features: &FeatureSet) -> String {
        let names: Vec<String> = features
            .iter()
            .map(|f| format!("`{}`", self.feature_name(f)))
            .collect();
        format!("{{{}}}", names.join(", "))
    }
}
