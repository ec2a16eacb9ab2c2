//! Schedulable registry.
//!
//! The registry collects every known pass and checks the consistency of their
//! declarations once, before any plan is built:
//!
//! 1. Create a [`Registry`] over a shared [`Catalog`]
//! 2. [`Registry::register`] each schedulable (registration order is the tie-break used
//!    everywhere downstream)
//! 3. Optionally [`Registry::declare_alternatives`] for tags with several producers
//! 4. [`Registry::validate`] into an immutable [`ValidatedRegistry`]
//!
//! A [`ValidatedRegistry`] is cheap to clone and can serve any number of plan requests.
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
//! let parsed = catalog.tag("parsed")?;
//! let lowered = catalog.tag("lowered")?;
//! let catalog = Arc::new(catalog);
//!
//! let mut registry = Registry::new(catalog.clone());
//! registry.register(FnSchedulable::noop(
//!     Descriptor::builder("parse").produces(parsed).build(),
//! ))?;
//! registry.register(FnSchedulable::noop(
//!     Descriptor::builder("lower").needs(parsed).produces(lowered).build(),
//! ))?;
//!
//! let registry = registry.validate()?;
//! let plan = registry.plan(&PlanRequest::new().target(lowered))?;
//! assert_eq!(plan.names(), vec!["parse", "lower"]);
//! # Ok::<(), passplan::Error>(())
//! ```

mod descriptor;
mod schedulable;
mod validation;

use std::{collections::HashMap, fmt, sync::Arc};

use log::{debug, info};

pub use descriptor::{Descriptor, DescriptorBuilder, FeatureGate};
pub use schedulable::{FnSchedulable, NoopFn, Schedulable};

use crate::{
    model::{Catalog, Tag},
    plan::{Plan, PlanBuilder, PlanRequest},
    Error, Result,
};

/// Shared handle to a registered schedulable.
pub type SchedulableRef = Arc<dyn Schedulable>;

/// Mutable collection of schedulables, prior to validation.
pub struct Registry {
    catalog: Arc<Catalog>,
    entries: Vec<SchedulableRef>,
    names: HashMap<String, usize>,
    alternatives: Vec<(Tag, Vec<String>)>,
}

impl Registry {
    /// Creates an empty registry whose descriptors use tags of `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            entries: Vec::new(),
            names: HashMap::new(),
            alternatives: Vec::new(),
        }
    }

    /// Registers a schedulable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if a schedulable with the same name exists.
    pub fn register<S: Schedulable + 'static>(&mut self, schedulable: S) -> Result<()> {
        self.register_arc(Arc::new(schedulable))
    }

    /// Registers an already shared schedulable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] if a schedulable with the same name exists.
    pub fn register_arc(&mut self, schedulable: SchedulableRef) -> Result<()> {
        let name = schedulable.name().to_string();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateName { name });
        }

        debug!(
            "registered schedulable `{}` ({}) at index {}",
            name,
            schedulable.descriptor().granularity(),
            self.entries.len()
        );
        self.names.insert(name, self.entries.len());
        self.entries.push(schedulable);
        Ok(())
    }

    /// Declares `names` as alternative producers of `tag`, highest priority first.
    ///
    /// When several listed producers are eligible for a request, the plan builder picks
    /// the first one. Names are resolved during [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAlternatives`] if alternatives for `tag` were already
    /// declared.
    pub fn declare_alternatives<I, N>(&mut self, tag: Tag, names: I) -> Result<()>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        if self.alternatives.iter().any(|(t, _)| *t == tag) {
            return Err(Error::DuplicateAlternatives {
                tag: self.catalog.tag_name(tag),
            });
        }
        self.alternatives
            .push((tag, names.into_iter().map(Into::into).collect()));
        Ok(())
    }

    /// The catalog descriptors refer to.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of registered schedulables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if a schedulable named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Runs the static consistency checks and freezes the registry.
    ///
    /// # Errors
    ///
    /// - [`Error::TagGroupOverlap`] if a tag is in two exclusive groups
    /// - [`Error::ConflictingEffects`] if a schedulable produces and removes a tag
    /// - [`Error::ExclusivityConflict`] if a schedulable could leave two tags of one
    ///   exclusive group on an item
    /// - [`Error::UnknownSchedulable`] / [`Error::NotAProducer`] for bad alternatives
    /// - [`Error::AmbiguousProducer`] if two producers of a tag can be eligible together
    ///   without being declared alternatives
    pub fn validate(self) -> Result<ValidatedRegistry> {
        let catalog = self.catalog;
        let entries = self.entries;

        validation::check_groups(&catalog)?;
        validation::check_effects(&catalog, &entries)?;
        validation::check_exclusivity(&catalog, &entries)?;

        let alternatives =
            validation::resolve_alternatives(&catalog, &entries, &self.names, self.alternatives)?;

        let mut producers: HashMap<Tag, Vec<usize>> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            for tag in entry.descriptor().produces() {
                producers.entry(tag).or_default().push(index);
            }
        }

        validation::check_producers(&catalog, &entries, &producers, &alternatives)?;

        info!(
            "validated registry: {} schedulables, {} produced tags, {} alternative groups",
            entries.len(),
            producers.len(),
            alternatives.len()
        );

        Ok(ValidatedRegistry {
            catalog,
            entries,
            names: self.names,
            producers,
            alternatives,
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schedulables", &self.entries.len())
            .field("alternatives", &self.alternatives.len())
            .finish()
    }
}

/// An immutable, validated registry.
///
/// Produced by [`Registry::validate`]. All lookups preserve registration order.
#[derive(Clone)]
pub struct ValidatedRegistry {
    catalog: Arc<Catalog>,
    entries: Vec<SchedulableRef>,
    names: HashMap<String, usize>,
    producers: HashMap<Tag, Vec<usize>>,
    alternatives: HashMap<Tag, Vec<usize>>,
}

impl ValidatedRegistry {
    /// The catalog descriptors refer to.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of registered schedulables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The schedulable registered at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SchedulableRef> {
        self.entries.get(index)
    }

    /// Registration index of the schedulable named `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// The schedulable named `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&SchedulableRef> {
        self.index_of(name).and_then(|index| self.entries.get(index))
    }

    /// Iterates `(index, schedulable)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SchedulableRef)> {
        self.entries.iter().enumerate()
    }

    /// Registration indices of every producer of `tag`, in registration order.
    #[must_use]
    pub fn producers_of(&self, tag: Tag) -> &[usize] {
        self.producers.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Declared alternative producers of `tag`, highest priority first.
    #[must_use]
    pub fn alternatives_for(&self, tag: Tag) -> Option<&[usize]> {
        self.alternatives.get(&tag).map(Vec::as_slice)
    }

    /// Builds a plan for `request`.
    ///
    /// Shorthand for `PlanBuilder::new(self).build(request)`.
    ///
    /// # Errors
    ///
    /// See [`PlanBuilder::build`].
    pub fn plan(&self, request: &PlanRequest) -> Result<Plan> {
        PlanBuilder::new(self).build(request)
    }
}

impl fmt::Debug for ValidatedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name()).collect();
        f.debug_struct("ValidatedRegistry")
            .field("schedulables", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{noop, TestCatalog};

    #[test]
    fn test_duplicate_name() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("a").produces(cat.tag("x"))))?;

        let err = registry
            .register(noop(Descriptor::builder("a")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName { ref name } if name == "a"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("a"));
        Ok(())
    }

    #[test]
    fn test_lookup_preserves_registration_order() -> Result<()> {
        let cat = TestCatalog::new(&["x", "y", "z"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(Descriptor::builder("first").produces(cat.tag("x"))))?;
        registry.register(noop(Descriptor::builder("second").produces(cat.tag("y"))))?;
        registry.register(noop(Descriptor::builder("third").needs(cat.tag("x"))))?;

        let registry = registry.validate()?;
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.index_of("third"), Some(2));
        assert_eq!(registry.producers_of(cat.tag("y")), &[1]);
        assert!(registry.producers_of(cat.tag("z")).is_empty());
        let names: Vec<&str> = registry.iter().map(|(_, s)| s.name()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_alternatives() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.declare_alternatives(cat.tag("x"), ["a", "b"])?;
        assert!(matches!(
            registry.declare_alternatives(cat.tag("x"), ["b"]),
            Err(Error::DuplicateAlternatives { .. })
        ));
        Ok(())
    }
}
