//! Tag and feature handles.

use std::fmt;

use crate::model::set::{sealed::FromIndex, IdSet, SetKey};

/// A boolean fact about a compilation item ("converted to SSA", "optimized IR", ...).
///
/// Tags are dense ids handed out by [`crate::model::Catalog::tag`]; their names live in
/// the catalog. Two tags compare equal when they have the same id, so tags from
/// different catalogs must not be mixed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(u16);

impl Tag {
    /// The dense id of this tag.
    #[must_use]
    pub fn id(self) -> u16 {
        self.0
    }
}

impl SetKey for Tag {
    fn index(self) -> u16 {
        self.0
    }
}

impl FromIndex for Tag {
    fn from_index(index: u16) -> Self {
        Tag(index)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag#{}", self.0)
    }
}

/// A build-wide on/off switch gating optional schedulables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Feature(u16);

impl Feature {
    /// The dense id of this feature.
    #[must_use]
    pub fn id(self) -> u16 {
        self.0
    }
}

impl SetKey for Feature {
    fn index(self) -> u16 {
        self.0
    }
}

impl FromIndex for Feature {
    fn from_index(index: u16) -> Self {
        Feature(index)
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Feature#{}", self.0)
    }
}

/// Set of [`Tag`]s held by an item, needed, produced or removed by a schedulable.
pub type TagSet = IdSet<Tag>;

/// Set of enabled [`Feature`]s for a compilation run.
pub type FeatureSet = IdSet<Feature>;
