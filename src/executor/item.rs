//! Compilation items as seen by the executor.

use std::{fmt, sync::Arc};

use crate::model::{Granularity, TagSet};

/// Shared handle to a compilation item.
pub type ItemRef = Arc<dyn Item>;

/// An opaque compilation item owned by the caller.
///
/// Items know nothing about tags: the executor keeps the tag state of every item it
/// reaches. Non-exclusive stages call into items from several worker threads at once.
pub trait Item: Send + Sync {
    /// Identity used in reports and diagnostics.
    fn label(&self) -> String;

    /// The kind of item this is.
    fn granularity(&self) -> Granularity;

    /// The directly enclosed items of the finer `granularity`.
    ///
    /// The executor asks each item once, for the granularity right below its own (a
    /// session for its types, a type for its methods), and keeps the result for the whole
    /// execution. Items with nothing to offer at that level return an empty list.
    fn children(&self, granularity: Granularity) -> Vec<ItemRef>;
}

/// A root item handed to [`super::PlanExecutor::execute`], with its initial tags.
#[derive(Clone)]
pub struct WorkItem {
    /// The item
    pub item: ItemRef,
    /// Tags that hold before the first stage
    pub initial: TagSet,
}

impl WorkItem {
    /// Pairs `item` with `initial` tags.
    pub fn new(item: ItemRef, initial: TagSet) -> Self {
        Self { item, initial }
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("item", &self.item.label())
            .field("granularity", &self.item.granularity())
            .field("initial", &self.initial)
            .finish()
    }
}
