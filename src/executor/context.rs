//! Per-run context handed to [`crate::registry::Schedulable::run`].

use std::fmt;

use crate::{
    executor::{ExclusiveGuard, Item},
    validator::TagAccess,
};

/// Everything a schedulable may touch while processing one item.
pub struct RunContext<'a> {
    item: &'a dyn Item,
    root: &'a dyn Item,
    tags: TagAccess<'a>,
    guard: Option<&'a ExclusiveGuard<'a>>,
    stage: usize,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        item: &'a dyn Item,
        root: &'a dyn Item,
        tags: TagAccess<'a>,
        guard: Option<&'a ExclusiveGuard<'a>>,
        stage: usize,
    ) -> Self {
        Self {
            item,
            root,
            tags,
            guard,
            stage,
        }
    }

    /// The item of the schedulable's granularity being processed.
    #[must_use]
    pub fn item(&self) -> &'a dyn Item {
        self.item
    }

    /// The root item handed to the executor that encloses [`item`](Self::item).
    ///
    /// Same as [`item`](Self::item) unless the schedulable runs at a finer granularity
    /// than the root.
    #[must_use]
    pub fn root(&self) -> &'a dyn Item {
        self.root
    }

    /// Contract-checked view of the item's tags.
    pub fn tags(&mut self) -> &mut TagAccess<'a> {
        &mut self.tags
    }

    /// The exclusivity guard, present only in exclusive stages.
    #[must_use]
    pub fn exclusive_guard(&self) -> Option<&'a ExclusiveGuard<'a>> {
        self.guard
    }

    /// Returns true inside an exclusive stage.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.guard.is_some()
    }

    /// Plan position of the running stage.
    #[must_use]
    pub fn stage(&self) -> usize {
        self.stage
    }

    pub(crate) fn into_tags(self) -> TagAccess<'a> {
        self.tags
    }
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("item", &self.item.label())
            .field("root", &self.root.label())
            .field("stage", &self.stage)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}
