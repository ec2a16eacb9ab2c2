//! Run validator.
//!
//! Every run of a schedulable sees the tags of its item through a [`TagAccess`]. The view
//! enforces the declared contract of the schedulable:
//!
//! - reading a tag outside `needs` that does not currently hold is a [`Operation::Read`]
//!   violation
//! - adding a tag outside `produces` is an [`Operation::Add`] violation
//! - removing a tag outside `removes` is an [`Operation::Remove`] violation
//! - a need that does not hold when the run starts is an [`Operation::Require`] violation
//!
//! With validation disabled no violation is ever raised, but writes outside the declared
//! sets are still dropped, so the tag state the executor keeps stays consistent with the
//! declarations either way.
//!
//! Violations are programming errors in a schedulable. They are returned to the caller
//! immediately and also latched in the view, so the executor aborts even if the
//! schedulable swallows the error.

use bitflags::bitflags;
use strum::Display;
use thiserror::Error;

use crate::{
    executor::Item,
    model::{Catalog, SetKey, Tag, TagSet},
    registry::Descriptor,
};

bitflags! {
    /// Operations a schedulable may perform on one tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u8 {
        /// The tag is a declared need.
        const READ = 0b001;
        /// The tag is declared as produced.
        const ADD = 0b010;
        /// The tag is declared as removed.
        const REMOVE = 0b100;
    }
}

/// The operation that broke a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    /// A declared need did not hold when the run started.
    Require,
    /// `has` on an undeclared tag that does not hold.
    Read,
    /// `add` of a tag outside `produces`.
    Add,
    /// `remove` of a tag outside `removes`.
    Remove,
}

/// A schedulable touched a tag outside its declared contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Contract violation: schedulable `{schedulable}` attempted to {operation} tag `{tag}` on item `{item}`")]
pub struct ContractViolation {
    /// The offending schedulable
    pub schedulable: String,
    /// The tag
    pub tag: String,
    /// What was attempted
    pub operation: Operation,
    /// Label of the item being processed
    pub item: String,
}

/// Per-tag access masks of one schedulable, computed once per plan entry.
#[derive(Clone)]
pub struct Contract {
    name: String,
    needs: TagSet,
    masks: [Access; TagSet::CAPACITY],
}

impl Contract {
    /// Derives the access masks from `descriptor`.
    #[must_use]
    pub fn of(descriptor: &Descriptor) -> Self {
        let mut masks = [Access::empty(); TagSet::CAPACITY];
        let mut grant = |tags: &TagSet, access: Access| {
            for tag in tags {
                masks[usize::from(tag.index())] |= access;
            }
        };
        grant(descriptor.needs(), Access::READ);
        grant(descriptor.produces(), Access::ADD);
        grant(descriptor.removes(), Access::REMOVE);

        Self {
            name: descriptor.name().to_string(),
            needs: *descriptor.needs(),
            masks,
        }
    }

    /// Name of the schedulable the contract belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared access to `tag`.
    #[must_use]
    pub fn access(&self, tag: Tag) -> Access {
        self.masks
            .get(usize::from(tag.index()))
            .copied()
            .unwrap_or_default()
    }

    /// Returns true if the contract grants every bit of `access` on `tag`.
    #[must_use]
    pub fn allows(&self, tag: Tag, access: Access) -> bool {
        self.access(tag).contains(access)
    }
}

impl std::fmt::Debug for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("needs", &self.needs)
            .finish_non_exhaustive()
    }
}

/// Explicit tag writes performed during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagDelta {
    /// Tags added through [`TagAccess::add`]
    pub added: TagSet,
    /// Tags removed through [`TagAccess::remove`]
    pub removed: TagSet,
}

impl TagDelta {
    /// Folds `other` into `self`.
    pub fn merge(&mut self, other: &TagDelta) {
        self.added = self.added.union(&other.added);
        self.removed = self.removed.union(&other.removed);
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Contract-checked view of an item's tags during one run.
pub struct TagAccess<'a> {
    contract: &'a Contract,
    catalog: &'a Catalog,
    item: &'a dyn Item,
    current: TagSet,
    delta: TagDelta,
    validate: bool,
    violation: Option<ContractViolation>,
}

impl<'a> TagAccess<'a> {
    pub(crate) fn new(
        contract: &'a Contract,
        catalog: &'a Catalog,
        item: &'a dyn Item,
        current: TagSet,
        validate: bool,
    ) -> Self {
        Self {
            contract,
            catalog,
            item,
            current,
            delta: TagDelta::default(),
            validate,
            violation: None,
        }
    }

    /// Returns whether `tag` holds.
    ///
    /// # Errors
    ///
    /// With validation on, returns an [`Operation::Read`] violation for a tag outside
    /// `needs` that does not hold.
    pub fn has(&mut self, tag: Tag) -> Result<bool, ContractViolation> {
        let holds = self.current.contains(tag);
        if self.validate && !holds && !self.contract.allows(tag, Access::READ) {
            return Err(self.violate(tag, Operation::Read));
        }
        Ok(holds)
    }

    /// Adds `tag` to the item.
    ///
    /// # Errors
    ///
    /// With validation on, returns an [`Operation::Add`] violation for a tag outside
    /// `produces`. With validation off such writes are ignored.
    pub fn add(&mut self, tag: Tag) -> Result<(), ContractViolation> {
        if !self.contract.allows(tag, Access::ADD) {
            return self.reject(tag, Operation::Add);
        }
        self.current.insert(tag);
        self.delta.added.insert(tag);
        self.delta.removed.remove(tag);
        Ok(())
    }

    /// Removes `tag` from the item.
    ///
    /// # Errors
    ///
    /// With validation on, returns an [`Operation::Remove`] violation for a tag outside
    /// `removes`. With validation off such writes are ignored.
    pub fn remove(&mut self, tag: Tag) -> Result<(), ContractViolation> {
        if !self.contract.allows(tag, Access::REMOVE) {
            return self.reject(tag, Operation::Remove);
        }
        self.current.remove(tag);
        self.delta.removed.insert(tag);
        self.delta.added.remove(tag);
        Ok(())
    }

    /// Whether contract checks are active for this run.
    #[must_use]
    pub fn is_validating(&self) -> bool {
        self.validate
    }

    /// The first violation of this run, if any.
    #[must_use]
    pub fn violation(&self) -> Option<&ContractViolation> {
        self.violation.as_ref()
    }

    /// Checks that every declared need holds.
    pub(crate) fn check_preconditions(&mut self) -> Result<(), ContractViolation> {
        if !self.validate {
            return Ok(());
        }
        match self.contract.needs.difference(&self.current).first() {
            Some(tag) => Err(self.violate(tag, Operation::Require)),
            None => Ok(()),
        }
    }

    /// Ends the run, returning the explicit writes and the latched violation.
    pub(crate) fn finish(self) -> (TagDelta, Option<ContractViolation>) {
        (self.delta, self.violation)
    }

    fn reject(&mut self, tag: Tag, operation: Operation) -> Result<(), ContractViolation> {
        if self.validate {
            Err(self.violate(tag, operation))
        } else {
            Ok(())
        }
    }

    fn violate(&mut self, tag: Tag, operation: Operation) -> ContractViolation {
        let violation = ContractViolation {
            schedulable: self.contract.name.clone(),
            tag: self.catalog.tag_name(tag),
            operation,
            item: self.item.label(),
        };
        if self.violation.is_none() {
            self.violation = Some(violation.clone());
        }
        violation
    }
}

impl std::fmt::Debug for TagAccess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagAccess")
            .field("schedulable", &self.contract.name)
            .field("current", &self.current)
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}
