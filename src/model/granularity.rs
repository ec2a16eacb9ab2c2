//! Granularity of compilation items.

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// The kind of compilation item a schedulable operates on.
///
/// Variants are ordered from coarse to fine: a session encloses types, a type encloses
/// methods. A schedulable runs exactly once per item of its declared granularity; finer
/// items are enumerated from their enclosing item through
/// [`crate::executor::Item::children`].
///
/// # Examples
///
/// ```rust
/// use passplan::model::Granularity;
/// use std::str::FromStr;
///
/// let g = Granularity::from_str("method").unwrap();
/// assert!(Granularity::Type.is_coarser_than(g));
/// assert_eq!(g.to_string(), "method");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Granularity {
    /// The whole compilation session.
    Session,
    /// A single type (class or interface).
    Type,
    /// A single method body.
    Method,
}

impl Granularity {
    /// Nesting depth, `0` for [`Granularity::Session`].
    #[must_use]
    pub fn depth(self) -> usize {
        self as usize
    }

    /// Returns true if `self` strictly encloses `other`.
    #[must_use]
    pub fn is_coarser_than(self, other: Granularity) -> bool {
        self < other
    }

    /// The granularity directly enclosed by `self`, if any.
    #[must_use]
    pub fn finer(self) -> Option<Granularity> {
        match self {
            Granularity::Session => Some(Granularity::Type),
            Granularity::Type => Some(Granularity::Method),
            Granularity::Method => None,
        }
    }
}
