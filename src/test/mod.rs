//! Test fixtures shared by the unit tests.
//!
//! Catalogs are built from plain tag and feature names so tests can refer to tags by
//! name; items form a small session/type/method tree.


pub use catalog::TestCatalog;
pub use items::TestItem;

use crate::registry::{DescriptorBuilder, FnSchedulable, NoopFn};

/// A schedulable that only carries the contract described by `builder`.
pub fn noop(builder: DescriptorBuilder) -> FnSchedulable<NoopFn> {
    FnSchedulable::noop(builder.build())
}
