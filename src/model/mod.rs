//! Tag & feature model.
//!
//! This module defines the vocabulary every other part of the engine speaks:
//!
//! - [`Tag`] - a boolean fact about a compilation item
//! - [`Feature`] - a build-wide switch that gates optional schedulables
//! - [`TagSet`] / [`FeatureSet`] - fixed-size bitsets over those ids
//! - [`Catalog`] - names, ids and exclusive tag groups
//! - [`Granularity`] - the kind of item a schedulable runs on
//!
//! Nothing in here has side effects beyond the catalog's own tables. Consistency of
//! exclusive groups is checked by the registry, not at declaration time.

mod catalog;
mod granularity;
pub(crate) mod set;
mod tag;

pub use catalog::{Catalog, ExclusiveGroup, GroupId};
pub use granularity::Granularity;
pub use set::{IdSet, Iter, SetKey};
pub use tag::{Feature, FeatureSet, Tag, TagSet};
