//! Fixed-size bitsets keyed by catalog ids.
//!
//! [`IdSet`] is the storage behind [`crate::model::TagSet`] and [`crate::model::FeatureSet`].
//! It is a plain `Copy` value of four machine words, so per-item tag state can be
//! snapshotted and compared without allocation. Iteration is always in ascending id
//! order, which keeps every consumer of a set deterministic.

use std::{fmt, hash::Hash, marker::PhantomData};

const WORDS: usize = 4;

pub(crate) mod sealed {
    /// Rebuilding keys from a dense index, reserved to the catalog and to set iteration.
    pub trait FromIndex {
        /// Rebuilds a key from its dense index.
        fn from_index(index: u16) -> Self;
    }
}

/// A key that can live in an [`IdSet`].
///
/// Implemented by [`crate::model::Tag`] and [`crate::model::Feature`]; both are dense
/// ids handed out by a [`crate::model::Catalog`]. The trait is sealed, so every key in a
/// set was issued by a catalog and lies within [`IdSet::CAPACITY`].
pub trait SetKey: sealed::FromIndex + Copy + Eq + Ord + Hash {
    /// Dense index of this key (`0..IdSet::CAPACITY`).
    fn index(self) -> u16;
}

/// A fixed-capacity bitset of catalog ids.
pub struct IdSet<K> {
    words: [u64; WORDS],
    _key: PhantomData<K>,
}

impl<K> Clone for IdSet<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for IdSet<K> {}

impl<K> PartialEq for IdSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl<K> Eq for IdSet<K> {}

impl<K> Hash for IdSet<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.words.hash(state);
    }
}

impl<K> Default for IdSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> IdSet<K> {
    /// Maximum number of distinct ids a set can hold.
    pub const CAPACITY: usize = WORDS * 64;

    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [0; WORDS],
            _key: PhantomData,
        }
    }

    /// Returns true if the set holds no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of ids in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set union.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.zip(other, |a, b| a | b)
    }

    /// Set intersection.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.zip(other, |a, b| a & b)
    }

    /// Ids of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.zip(other, |a, b| a & !b)
    }

    /// Returns true if every id of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Returns true if the sets share no id.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersection(other).is_empty()
    }

    fn zip(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Self {
        let mut words = [0; WORDS];
        for (slot, (a, b)) in words.iter_mut().zip(self.words.iter().zip(other.words.iter())) {
            *slot = op(*a, *b);
        }
        Self {
            words,
            _key: PhantomData,
        }
    }
}

impl<K: SetKey> IdSet<K> {
    /// Inserts `key`, returning true if it was not present.
    pub fn insert(&mut self, key: K) -> bool {
        let (word, bit) = Self::locate(key);
        let fresh = self.words[word] & bit == 0;
        self.words[word] |= bit;
        fresh
    }

    /// Removes `key`, returning true if it was present.
    pub fn remove(&mut self, key: K) -> bool {
        let (word, bit) = Self::locate(key);
        let present = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        present
    }

    /// Returns true if `key` is in the set.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        let (word, bit) = Self::locate(key);
        self.words[word] & bit != 0
    }

    /// Lowest id in the set.
    #[must_use]
    pub fn first(&self) -> Option<K> {
        self.iter().next()
    }

    /// Iterates the ids in ascending order.
    #[must_use]
    pub fn iter(&self) -> Iter<K> {
        Iter {
            words: self.words,
            word: 0,
            _key: PhantomData,
        }
    }

    fn locate(key: K) -> (usize, u64) {
        let index = usize::from(key.index());
        assert!(index < Self::CAPACITY, "id {index} out of bitset range");
        (index / 64, 1u64 << (index % 64))
    }
}

impl<K: SetKey> FromIterator<K> for IdSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<K: SetKey> Extend<K> for IdSet<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl<'a, K: SetKey> IntoIterator for &'a IdSet<K> {
    type Item = K;
    type IntoIter = Iter<K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: SetKey + fmt::Debug> fmt::Debug for IdSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Ascending iterator over an [`IdSet`].
pub struct Iter<K> {
    words: [u64; WORDS],
    word: usize,
    _key: PhantomData<K>,
}

impl<K: SetKey> Iterator for Iter<K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        while self.word < WORDS {
            let current = self.words[self.word];
            if current == 0 {
                self.word += 1;
                continue;
            }

            let bit = current.trailing_zeros();
            self.words[self.word] &= current - 1;
            // WORDS * 64 fits in u16
            #[allow(clippy::cast_possible_truncation)]
            let index = (self.word * 64 + bit as usize) as u16;
            return Some(K::from_index(index));
        }
        None
    }
}
