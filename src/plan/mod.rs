//! Plans and the plan builder.
//!
//! A [`Plan`] is the ordered, immutable list of schedulables that establishes the targets
//! of a [`PlanRequest`]. It is built once per compilation session by [`PlanBuilder`] and
//! then handed to the [`crate::executor::PlanExecutor`].
//!
//! # Key Components
//!
//! - [`PlanRequest`] - targets, enabled features, exclusions and inclusions
//! - [`PlanBuilder`] - dependency resolution, feature gating, cycle detection
//! - [`Plan`] / [`PlanEntry`] - the result, with the [`Justification`]s of each entry
//! - [`ProducerList`], [`CycleMembers`], [`Exclusion`], [`Demand`] - diagnostic payloads
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use passplan::{
//!     model::Catalog,
//!     plan::PlanRequest,
//!     registry::{Descriptor, FnSchedulable, Registry},
//! };
//!
//! let mut catalog = Catalog::new();
//! let x = catalog.tag("x")?;
//! let y = catalog.tag("y")?;
//! let mut registry = Registry::new(Arc::new(catalog));
//! registry.register(FnSchedulable::noop(Descriptor::builder("a").produces(x).build()))?;
//! registry.register(FnSchedulable::noop(
//!     Descriptor::builder("b").needs(x).produces(y).build(),
//! ))?;
//! let registry = registry.validate()?;
//!
//! let plan = registry.plan(&PlanRequest::new().target(y))?;
//! println!("{plan}");
//! assert_eq!(plan.names(), vec!["a", "b"]);
//! # Ok::<(), passplan::Error>(())
//! ```

mod builder;
mod diagnostic;
mod graph;
mod request;

use std::{fmt, fmt::Write, sync::Arc};

pub use builder::PlanBuilder;
pub use diagnostic::{ConsideredProducer, CycleMembers, Demand, Exclusion, ProducerList};
pub use request::PlanRequest;

use crate::{
    model::{Catalog, Granularity, Tag, TagSet},
    registry::{Descriptor, SchedulableRef},
    Error, Result,
};

/// The rule that ordered two plan entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// The earlier entry produces a tag the later one needs.
    Provides,
    /// The later entry removes a tag the earlier one needs.
    Invalidates,
    /// The earlier entry removes a target tag the later one produces again.
    Restores,
    /// The earlier entry produces a tag of an exclusive group whose target tag the later
    /// one produces.
    Supersedes,
    /// Producers of one exclusive group with no other constraint, in registration order.
    Precedence,
}

impl EdgeKind {
    /// Short human readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            EdgeKind::Provides => "produces",
            EdgeKind::Invalidates => "must read before removal",
            EdgeKind::Restores => "removes target",
            EdgeKind::Supersedes => "is superseded on",
            EdgeKind::Precedence => "is registered earlier on group of",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Why an entry comes after another one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Justification {
    /// Name of the entry that must run first
    pub from: String,
    /// The tag that links both entries
    pub tag: Tag,
    /// The rule that introduced the constraint
    pub kind: EdgeKind,
}

/// One step of a [`Plan`].
#[derive(Clone)]
pub struct PlanEntry {
    index: usize,
    schedulable: SchedulableRef,
    justifications: Vec<Justification>,
}

impl PlanEntry {
    pub(crate) fn new(
        index: usize,
        schedulable: SchedulableRef,
        justifications: Vec<Justification>,
    ) -> Self {
        Self {
            index,
            schedulable,
            justifications,
        }
    }

    /// The schedulable to run.
    #[must_use]
    pub fn schedulable(&self) -> &SchedulableRef {
        &self.schedulable
    }

    /// Its declared contract.
    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        self.schedulable.descriptor()
    }

    /// Schedulable name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.schedulable.name()
    }

    /// Registration index in the registry the plan was built from.
    #[must_use]
    pub fn registration_index(&self) -> usize {
        self.index
    }

    /// Granularity the entry runs at.
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.descriptor().granularity()
    }

    /// Whether the entry is a full barrier.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.descriptor().is_exclusive()
    }

    /// Inbound ordering constraints.
    #[must_use]
    pub fn justifications(&self) -> &[Justification] {
        &self.justifications
    }
}

impl PartialEq for PlanEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.index == other.index
            && self.granularity() == other.granularity()
            && self.is_exclusive() == other.is_exclusive()
            && self.justifications == other.justifications
    }
}

impl Eq for PlanEntry {}

impl fmt::Debug for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanEntry")
            .field("name", &self.name())
            .field("granularity", &self.granularity())
            .field("exclusive", &self.is_exclusive())
            .field("justifications", &self.justifications)
            .finish()
    }
}

/// An ordered, immutable list of schedulables.
#[derive(Clone)]
pub struct Plan {
    catalog: Arc<Catalog>,
    entries: Vec<PlanEntry>,
    targets: TagSet,
    initial: TagSet,
}

impl Plan {
    pub(crate) fn new(
        catalog: Arc<Catalog>,
        entries: Vec<PlanEntry>,
        targets: TagSet,
        initial: TagSet,
    ) -> Self {
        Self {
            catalog,
            entries,
            targets,
            initial,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the targets already hold initially.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    /// The entry at `position`.
    #[must_use]
    pub fn entry(&self, position: usize) -> Option<&PlanEntry> {
        self.entries.get(position)
    }

    /// Entry names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(PlanEntry::name).collect()
    }

    /// Position of the entry named `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == name)
    }

    /// Returns true if the plan runs `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Target tags of the request.
    #[must_use]
    pub fn targets(&self) -> &TagSet {
        &self.targets
    }

    /// Initial tags assumed by the request.
    #[must_use]
    pub fn initial(&self) -> &TagSet {
        &self.initial
    }

    /// The catalog the plan's tags belong to.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Applies every entry's declared effects to `initial`, checking each need.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlanUnsound`] naming the first entry whose need does not hold.
    pub fn simulate(&self, initial: &TagSet) -> Result<TagSet> {
        let mut tags = *initial;
        for (position, entry) in self.entries.iter().enumerate() {
            let descriptor = entry.descriptor();
            if let Some(tag) = descriptor.needs().difference(&tags).first() {
                return Err(Error::PlanUnsound {
                    position,
                    schedulable: Some(entry.name().to_string()),
                    tag: self.catalog.tag_name(tag),
                });
            }
            tags = tags
                .difference(descriptor.removes())
                .union(descriptor.produces());
        }
        Ok(tags)
    }

    /// Simulates from the request's initial tags and checks every target holds.
    pub(crate) fn verify(&self) -> Result<()> {
        let tags = self.simulate(&self.initial)?;
        if let Some(tag) = self.targets.difference(&tags).first() {
            return Err(Error::PlanUnsound {
                position: self.entries.len(),
                schedulable: None,
                tag: self.catalog.tag_name(tag),
            });
        }
        Ok(())
    }

    /// Renders the plan with the edges that justify each entry's position.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Plan for {} ({} entries)",
            self.catalog.describe_tags(&self.targets),
            self.entries.len()
        );

        for (position, entry) in self.entries.iter().enumerate() {
            let _ = write!(out, "{position:>3}. {} [{}", entry.name(), entry.granularity());
            if entry.is_exclusive() {
                out.push_str(", exclusive");
            }
            out.push_str("]\n");

            for justification in &entry.justifications {
                let _ = writeln!(
                    out,
                    "       after `{}`: {} `{}`",
                    justification.from,
                    justification.kind,
                    self.catalog.tag_name(justification.tag)
                );
            }
        }
        out
    }
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
            && self.targets == other.targets
            && self.initial == other.initial
    }
}

impl Eq for Plan {}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("entries", &self.entries)
            .field("targets", &self.targets)
            .finish()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registry::Registry,
        test::{noop, TestCatalog},
    };

    #[test]
    fn test_render_lists_edges() -> Result<()> {
        let cat = TestCatalog::new(&["x", "y"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        registry.register(noop(
            Descriptor::builder("b")
                .needs(cat.tag("x"))
                .produces(cat.tag("y"))
                .granularity(Granularity::Method)
                .exclusive(),
        ))?;
        let registry = registry.validate()?;

        let plan = registry.plan(&PlanRequest::new().target(cat.tag("y")))?;
        assert_eq!(
            plan.render(),
            "Plan for {`y`} (2 entries)\n  \
               0. a [session]\n  \
               1. b [method, exclusive]\n       \
                    after `a`: produces `x`\n"
        );
        assert_eq!(plan.to_string(), plan.render());
        Ok(())
    }

    #[test]
    fn test_simulate_reports_missing_need() -> Result<()> {
        let cat = TestCatalog::new(&["x", "y"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        registry.register(noop(
            Descriptor::builder("b")
                .needs(cat.tag("x"))
                .produces(cat.tag("y")),
        ))?;
        let registry = registry.validate()?;

        let plan = registry.plan(&PlanRequest::new().target(cat.tag("y")))?;
        let tags = plan.simulate(&TagSet::new())?;
        assert!(tags.contains(cat.tag("x")) && tags.contains(cat.tag("y")));

        let partial = registry.plan(
            &PlanRequest::new()
                .initial(cat.tag("x"))
                .target(cat.tag("y")),
        )?;
        assert_eq!(partial.names(), vec!["b"]);
        assert!(matches!(
            partial.simulate(&TagSet::new()),
            Err(Error::PlanUnsound { position: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_empty_plan_when_targets_hold() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;
        let registry = registry.validate()?;

        let plan = registry.plan(
            &PlanRequest::new()
                .initial(cat.tag("x"))
                .target(cat.tag("x")),
        )?;
        assert!(plan.is_empty());
        Ok(())
    }
}
