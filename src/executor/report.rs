//! Execution reports.

use std::{fmt, time::Duration};

use crate::{
    executor::EventLog,
    model::{Granularity, TagSet},
    PassError,
};

/// An earlier stage whose effects an item never received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithheldStage {
    /// Plan position of the stage
    pub stage: usize,
    /// Its schedulable
    pub schedulable: String,
}

/// A recoverable failure that removed an item, and everything it encloses, from the
/// remaining stages.
#[derive(Debug)]
pub struct ItemFailure {
    /// Plan position of the failing stage
    pub stage: usize,
    /// The failing schedulable
    pub schedulable: String,
    /// Label of the failed item
    pub unit: String,
    /// The error returned by the schedulable, or the reason it could not run
    pub error: PassError,
    /// Set when the schedulable could not run because an earlier stage did not take effect
    /// on the item: it was finer than that stage, or an item it encloses failed there
    pub withheld: Option<WithheldStage>,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` failed at stage {} on `{}`: {}",
            self.schedulable, self.stage, self.unit, self.error
        )
    }
}

/// Final state of one item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Every stage the item took part in completed.
    Completed,
    /// A stage failed; later stages skipped the item.
    Failed(ItemFailure),
}

impl ItemOutcome {
    /// Returns true for [`ItemOutcome::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, ItemOutcome::Completed)
    }

    /// The failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            ItemOutcome::Completed => None,
            ItemOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Outcome and final tags of one root item.
#[derive(Debug)]
pub struct ItemReport {
    /// Item label
    pub label: String,
    /// Tags of the root after the last stage
    pub tags: TagSet,
    /// Whether the root itself completed
    pub outcome: ItemOutcome,
    /// Failures of items enclosed by the root, in enumeration order
    pub enclosed: Vec<ItemFailure>,
}

impl ItemReport {
    /// Returns true if neither the root nor any item it encloses failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcome.is_completed() && self.enclosed.is_empty()
    }

    /// The failure of the root, then those of the items it encloses.
    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.outcome.failure().into_iter().chain(&self.enclosed)
    }
}

/// Statistics of one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Plan position
    pub position: usize,
    /// Schedulable name
    pub name: String,
    /// Granularity the stage ran at
    pub granularity: Granularity,
    /// Whether the stage ran exclusively
    pub exclusive: bool,
    /// Number of units processed
    pub units: usize,
    /// Number of items that failed in this stage
    pub failures: usize,
    /// Wall time of the stage
    pub elapsed: Duration,
}

/// Result of [`super::PlanExecutor::execute`].
#[derive(Debug)]
pub struct ExecutionReport {
    /// Per root item, in input order
    pub items: Vec<ItemReport>,
    /// Per stage, in plan order
    pub stages: Vec<StageReport>,
    /// Stage and failure events
    pub events: EventLog,
}

impl ExecutionReport {
    /// Number of root items without any failure.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.items.iter().filter(|i| i.is_clean()).count()
    }

    /// Number of root items with a failure of their own or of an enclosed item.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.items.len() - self.completed()
    }

    /// Returns true if no item failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// The report of the item labelled `label`.
    #[must_use]
    pub fn item(&self, label: &str) -> Option<&ItemReport> {
        self.items.iter().find(|i| i.label == label)
    }

    /// A short text summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let units: usize = self.stages.iter().map(|s| s.units).sum();
        let elapsed: Duration = self.stages.iter().map(|s| s.elapsed).sum();
        let mut out = format!(
            "{} stages, {} units, {} items completed, {} failed in {:.2?}",
            self.stages.len(),
            units,
            self.completed(),
            self.failed(),
            elapsed
        );
        for item in &self.items {
            for failure in item.failures() {
                out.push_str(&format!("\n  {}: {failure}", item.label));
            }
        }
        out
    }
}
