//! Plan executor.
//!
//! [`PlanExecutor::execute`] runs a [`Plan`] over a batch of root items:
//!
//! - stages run strictly one after another, in plan order
//! - a stage processes one *unit* per item of its granularity: the root itself, or the
//!   items it encloses, enumerated one level at a time through [`Item::children`]
//! - non-exclusive stages process their units on a bounded rayon pool
//! - exclusive stages hold the [`ExclusiveGuard`] and process their units sequentially
//! - after a stage, its declared effects are applied to every unit that did not fail, to
//!   the items those units enclose, and to every enclosing item none of whose units failed
//!
//! The executor owns the tag state of every item. An item that misses a stage's effects,
//! because it is finer than the stage or because an item it encloses failed there,
//! remembers that stage. A later stage whose needs are missing on such an item fails it
//! instead of running.
//!
//! # Failures
//!
//! A [`PassError`](crate::PassError) is classified through the configured
//! [`FailurePolicy`]. Recoverable failures mark the item as failed, skip it and every item
//! it encloses in later stages and show up in the [`ExecutionReport`]. Fatal failures and
//! contract violations cancel the stage (workers check a flag between units) and make
//! `execute` return the error.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use passplan::{
//!     executor::{ExecutorConfig, Item, ItemRef, PlanExecutor, WorkItem},
//!     model::{Catalog, Granularity, TagSet},
//!     plan::PlanRequest,
//!     registry::{Descriptor, FnSchedulable, Registry},
//! };
//!
//! struct Module(&'static str);
//!
//! impl Item for Module {
//!     fn label(&self) -> String {
//!         self.0.to_string()
//!     }
//!     fn granularity(&self) -> Granularity {
//!         Granularity::Session
//!     }
//!     fn children(&self, _granularity: Granularity) -> Vec<ItemRef> {
//!         Vec::new()
//!     }
//! }
//!
//! let mut catalog = Catalog::new();
//! let parsed = catalog.tag("parsed")?;
//! let mut registry = Registry::new(Arc::new(catalog));
//! registry.register(FnSchedulable::noop(
//!     Descriptor::builder("parse").produces(parsed).build(),
//! ))?;
//! let plan = registry.validate()?.plan(&PlanRequest::new().target(parsed))?;
//!
//! let executor = PlanExecutor::new(ExecutorConfig::validated())?;
//! let report = executor.execute(
//!     &plan,
//!     vec![WorkItem::new(Arc::new(Module("core")), TagSet::new())],
//! )?;
//! assert!(report.is_success());
//! assert!(report.items[0].tags.contains(parsed));
//! # Ok::<(), passplan::Error>(())
//! ```

mod barrier;
mod config;
mod context;
mod events;
mod item;
mod report;
mod tree;

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        OnceLock,
    },
    time::Instant,
};

use dashmap::DashMap;
use log::{debug, error, info, warn};
use rayon::prelude::*;

pub use barrier::{ExclusiveGuard, SharedGuard, StageBarrier};
pub use config::{ExecutorConfig, FailurePolicy};
pub use context::RunContext;
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use item::{Item, ItemRef, WorkItem};
pub use report::{
    ExecutionReport, ItemFailure, ItemOutcome, ItemReport, StageReport, WithheldStage,
};

use crate::{
    model::Tag,
    plan::{Plan, PlanEntry},
    validator::{Contract, TagAccess, TagDelta},
    Error, PassError, Result, Severity,
};
use tree::{ItemTree, Node};

/// Runs plans over compilation items.
pub struct PlanExecutor {
    config: ExecutorConfig,
    pool: rayon::ThreadPool,
    barrier: StageBarrier,
}

/// Shared state of a running stage.
struct Stage<'p> {
    position: usize,
    plan: &'p Plan,
    entry: &'p PlanEntry,
    contract: Contract,
    validate: bool,
    config: &'p ExecutorConfig,
    events: &'p EventLog,
    failures: DashMap<usize, ItemFailure>,
    deltas: DashMap<usize, TagDelta>,
    cancel: AtomicBool,
    fatal: OnceLock<Error>,
}

impl PlanExecutor {
    /// Creates an executor with its own barrier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadPool`] if the worker pool cannot be created.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        Self::with_barrier(config, StageBarrier::new())
    }

    /// Creates an executor that synchronizes its stages through `barrier`.
    ///
    /// Executors sharing a barrier never run an exclusive stage concurrently with any
    /// stage of another.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadPool`] if the worker pool cannot be created.
    pub fn with_barrier(config: ExecutorConfig, barrier: StageBarrier) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("passplan-worker-{i}"));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        Ok(Self {
            config,
            pool,
            barrier,
        })
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The barrier stages synchronize through.
    #[must_use]
    pub fn barrier(&self) -> &StageBarrier {
        &self.barrier
    }

    /// Waits until no stage runs and holds the barrier exclusively.
    ///
    /// For callers that touch shared output outside of a plan.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        self.barrier.exclusive()
    }

    /// Runs `plan` over `items`.
    ///
    /// # Errors
    ///
    /// - [`Error::Aborted`] if a schedulable failed fatally
    /// - [`Error::ContractViolation`] if a schedulable broke its declared contract
    pub fn execute(&self, plan: &Plan, items: Vec<WorkItem>) -> Result<ExecutionReport> {
        let mut tree = ItemTree::new(items);
        let events = EventLog::new();
        let mut failures: BTreeMap<usize, ItemFailure> = BTreeMap::new();
        let mut stages = Vec::with_capacity(plan.len());

        for (position, entry) in plan.iter().enumerate() {
            let stage = Stage {
                position,
                plan,
                entry,
                contract: Contract::of(entry.descriptor()),
                validate: self.config.validate_contracts,
                config: &self.config,
                events: &events,
                failures: DashMap::new(),
                deltas: DashMap::new(),
                cancel: AtomicBool::new(false),
                fatal: OnceLock::new(),
            };
            stages.push(self.run_stage(stage, &mut tree, &mut failures)?);
        }

        let mut items: Vec<ItemReport> = (0..tree.roots())
            .map(|root| {
                let node = tree.node(root);
                ItemReport {
                    label: node.item.label(),
                    tags: node.tags,
                    outcome: failures
                        .remove(&root)
                        .map_or(ItemOutcome::Completed, ItemOutcome::Failed),
                    enclosed: Vec::new(),
                }
            })
            .collect();
        for (id, failure) in failures {
            items[tree.node(id).root].enclosed.push(failure);
        }

        let report = ExecutionReport {
            items,
            stages,
            events,
        };
        info!("{}", report.summary());
        Ok(report)
    }

    fn run_stage(
        &self,
        stage: Stage<'_>,
        tree: &mut ItemTree,
        failures: &mut BTreeMap<usize, ItemFailure>,
    ) -> Result<StageReport> {
        let started = Instant::now();
        let entry = stage.entry;
        let granularity = entry.granularity();

        let mut units = Vec::new();
        let mut enclosing = Vec::new();
        let mut participants = 0;
        for root in 0..tree.roots() {
            let (failed, own) = {
                let node = tree.node(root);
                (node.failed, node.item.granularity())
            };
            if failed {
                continue;
            }
            if granularity.is_coarser_than(own) {
                debug!(
                    "`{}` is finer than stage {} `{}` and does not take part",
                    tree.node(root).item.label(),
                    stage.position,
                    entry.name()
                );
                tree.node_mut(root).withheld.push(stage.position);
                continue;
            }
            let selection = tree.select(root, granularity);
            units.extend(selection.units);
            enclosing.extend(selection.enclosing);
            participants += 1;
        }

        debug!(
            "stage {} `{}` [{}{}]: {} units over {} items",
            stage.position,
            entry.name(),
            granularity,
            if entry.is_exclusive() { ", exclusive" } else { "" },
            units.len(),
            participants
        );
        stage
            .events
            .record(EventKind::StageStarted)
            .stage(stage.position)
            .schedulable(entry.name())
            .message(format!("{} units", units.len()));

        let snapshot: &ItemTree = tree;
        if entry.is_exclusive() {
            let guard = self.barrier.exclusive();
            for &unit in &units {
                if stage.cancel.load(Ordering::Relaxed) {
                    break;
                }
                stage.run_unit(unit, snapshot, Some(&guard));
            }
        } else {
            let _shared = self.barrier.shared();
            self.pool.install(|| {
                units
                    .par_iter()
                    .for_each(|&unit| stage.run_unit(unit, snapshot, None));
            });
        }

        if let Some(err) = stage.fatal.into_inner() {
            error!("execution aborted at stage {}: {err}", stage.position);
            stage
                .events
                .record(EventKind::ExecutionAborted)
                .stage(stage.position)
                .schedulable(entry.name())
                .message(err.to_string());
            return Err(err);
        }

        // Enclosing items only take the effects when every unit below them succeeded
        let failed = stage.failures.len();
        let mut blocked = HashSet::new();
        for (id, failure) in stage.failures {
            blocked.extend(tree.ancestors(id));
            tree.node_mut(id).failed = true;
            failures.insert(id, failure);
        }

        let descriptor = entry.descriptor();
        for id in enclosing {
            if blocked.contains(&id) {
                tree.node_mut(id).withheld.push(stage.position);
            } else {
                tree.apply(id, descriptor.removes(), descriptor.produces());
            }
        }
        let unit_count = units.len();
        for id in units {
            if tree.node(id).failed {
                continue;
            }
            let delta = stage
                .deltas
                .remove(&id)
                .map(|(_, delta)| delta)
                .unwrap_or_default();
            tree.apply(
                id,
                &descriptor.removes().union(&delta.removed),
                &descriptor.produces().union(&delta.added),
            );
        }

        let report = StageReport {
            position: stage.position,
            name: entry.name().to_string(),
            granularity,
            exclusive: entry.is_exclusive(),
            units: unit_count,
            failures: failed,
            elapsed: started.elapsed(),
        };
        stage
            .events
            .record(EventKind::StageCompleted)
            .stage(stage.position)
            .schedulable(entry.name())
            .message(format!(
                "{} units, {} failures in {:.2?}",
                report.units, report.failures, report.elapsed
            ));
        Ok(report)
    }
}

impl Stage<'_> {
    fn run_unit(&self, id: usize, tree: &ItemTree, guard: Option<&ExclusiveGuard<'_>>) {
        if self.cancel.load(Ordering::Relaxed) {
            return;
        }

        let node = tree.node(id);
        let missing = self.entry.descriptor().needs().difference(&node.tags);
        if let Some(withheld) = missing.iter().find_map(|tag| self.withheld_producer(node, tag)) {
            let error = PassError::recoverable(format!(
                "needs tags that stage {} (`{}`) did not establish on this item",
                withheld.stage, withheld.schedulable
            ));
            self.fail(id, node, error, Some(withheld));
            return;
        }

        let mut access = TagAccess::new(
            &self.contract,
            self.plan.catalog(),
            node.item.as_ref(),
            node.tags,
            self.validate,
        );
        if let Err(violation) = access.check_preconditions() {
            self.abort(Error::ContractViolation(violation));
            return;
        }

        let mut cx = RunContext::new(
            node.item.as_ref(),
            tree.node(node.root).item.as_ref(),
            access,
            guard,
            self.position,
        );
        let result = self.entry.schedulable().run(&mut cx);
        let (delta, violation) = cx.into_tags().finish();

        // A latched violation wins over whatever the schedulable returned
        if let Some(violation) = violation {
            self.abort(Error::ContractViolation(violation));
            return;
        }

        match result {
            Ok(()) => self.deltas.entry(id).or_default().merge(&delta),
            Err(error) => self.fail(id, node, error, None),
        }
    }

    /// The latest stage withheld from `node` that would have produced `tag`.
    fn withheld_producer(&self, node: &Node, tag: Tag) -> Option<WithheldStage> {
        node.withheld.iter().rev().find_map(|&position| {
            let entry = self.plan.entry(position)?;
            entry
                .descriptor()
                .produces()
                .contains(tag)
                .then(|| WithheldStage {
                    stage: position,
                    schedulable: entry.name().to_string(),
                })
        })
    }

    fn fail(&self, id: usize, node: &Node, error: PassError, withheld: Option<WithheldStage>) {
        let severity = self.config.failure_policy.classify(error.severity());
        let error = error.reclassified(severity);
        let label = node.item.label();

        if severity == Severity::Fatal {
            self.abort(Error::Aborted {
                stage: self.position,
                schedulable: self.entry.name().to_string(),
                item: label,
                source: error,
            });
            return;
        }

        warn!(
            "`{}` failed on `{}` at stage {}: {}",
            self.entry.name(),
            label,
            self.position,
            error
        );
        self.events
            .record(EventKind::ItemFailed)
            .stage(self.position)
            .schedulable(self.entry.name())
            .item(label.clone())
            .message(error.to_string());
        self.failures.insert(
            id,
            ItemFailure {
                stage: self.position,
                schedulable: self.entry.name().to_string(),
                unit: label,
                error,
                withheld,
            },
        );
    }

    fn abort(&self, error: Error) {
        self.cancel.store(true, Ordering::Relaxed);
        let _ = self.fatal.set(error);
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;
    use crate::{
        model::{Granularity, TagSet},
        plan::PlanRequest,
        registry::{Descriptor, FnSchedulable, Registry, ValidatedRegistry},
        test::{noop, TestCatalog, TestItem},
        PassError,
    };

    fn items(labels: &[&str]) -> Vec<WorkItem> {
        labels
            .iter()
            .map(|label| {
                let item: ItemRef =
                    TestItem::program(label, &[("A", &["f", "g"][..]), ("B", &["h"][..])]);
                WorkItem::new(item, TagSet::new())
            })
            .collect()
    }

    fn validated(registry: Registry) -> ValidatedRegistry {
        registry.validate().unwrap()
    }

    #[test]
    fn test_units_follow_granularity() -> Result<()> {
        let cat = TestCatalog::new(&["types", "bodies"])?;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new(cat.shared());
        registry.register(noop(
            Descriptor::builder("scan-types")
                .produces(cat.tag("types"))
                .granularity(Granularity::Type),
        ))?;
        let log = seen.clone();
        registry.register(FnSchedulable::new(
            Descriptor::builder("lower-bodies")
                .needs(cat.tag("types"))
                .produces(cat.tag("bodies"))
                .granularity(Granularity::Method)
                .build(),
            move |cx| {
                log.lock().unwrap().push(cx.item().label());
                assert_eq!(cx.root().granularity(), Granularity::Session);
                Ok(())
            },
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("bodies")))?;

        let executor = PlanExecutor::new(ExecutorConfig::validated().with_worker_threads(2))?;
        let report = executor.execute(&plan, items(&["core"]))?;

        assert_eq!(report.stages[0].units, 2);
        assert_eq!(report.stages[1].units, 3);
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, ["core::A::f", "core::A::g", "core::B::h"]);
        assert!(report.items[0].tags.contains(cat.tag("bodies")));
        Ok(())
    }

    #[test]
    fn test_recoverable_failure_skips_item() -> Result<()> {
        let cat = TestCatalog::new(&["x", "y"])?;
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new(cat.shared());
        registry.register(FnSchedulable::new(
            Descriptor::builder("first").produces(cat.tag("x")).build(),
            |cx| {
                if cx.item().label() == "bad" {
                    return Err(PassError::recoverable("cannot parse"));
                }
                Ok(())
            },
        ))?;
        let counter = second.clone();
        registry.register(FnSchedulable::new(
            Descriptor::builder("second")
                .needs(cat.tag("x"))
                .produces(cat.tag("y"))
                .build(),
            move |_cx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("y")))?;

        let executor = PlanExecutor::new(ExecutorConfig::validated())?;
        let report = executor.execute(&plan, items(&["good", "bad"]))?;

        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(report.completed(), 1);
        let bad = report.item("bad").unwrap();
        let failure = bad.outcome.failure().unwrap();
        assert_eq!(failure.schedulable, "first");
        assert_eq!(failure.stage, 0);
        assert!(bad.tags.is_empty());
        assert_eq!(report.events.count_kind(EventKind::ItemFailed), 1);
        assert_eq!(report.stages[0].failures, 1);
        Ok(())
    }

    #[test]
    fn test_failed_method_spares_its_siblings() -> Result<()> {
        let cat = TestCatalog::new(&["lowered", "emitted"])?;
        let emitted_on = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new(cat.shared());
        registry.register(FnSchedulable::new(
            Descriptor::builder("lower")
                .produces(cat.tag("lowered"))
                .granularity(Granularity::Method)
                .build(),
            |cx| {
                if cx.item().label() == "core::A::g" {
                    return Err(PassError::recoverable("unsupported opcode"));
                }
                Ok(())
            },
        ))?;
        let log = emitted_on.clone();
        registry.register(FnSchedulable::new(
            Descriptor::builder("emit")
                .needs(cat.tag("lowered"))
                .produces(cat.tag("emitted"))
                .granularity(Granularity::Type)
                .build(),
            move |cx| {
                log.lock().unwrap().push(cx.item().label());
                Ok(())
            },
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("emitted")))?;

        let report =
            PlanExecutor::new(ExecutorConfig::validated())?.execute(&plan, items(&["core"]))?;

        assert_eq!(*emitted_on.lock().unwrap(), ["core::B"]);
        let core = &report.items[0];
        assert!(core.outcome.is_completed());
        assert!(!core.is_clean());
        assert!(!core.tags.contains(cat.tag("lowered")));

        let failed: Vec<_> = core.enclosed.iter().map(|f| f.unit.as_str()).collect();
        assert_eq!(failed, ["core::A", "core::A::g"]);
        assert!(core.enclosed[1].withheld.is_none());
        assert_eq!(
            core.enclosed[0].withheld,
            Some(WithheldStage {
                stage: 0,
                schedulable: "lower".to_string(),
            })
        );
        assert_eq!(report.stages[0].failures, 1);
        assert_eq!(report.stages[1].failures, 1);
        assert_eq!(report.completed(), 0);
        Ok(())
    }

    #[test]
    fn test_fatal_failure_aborts() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(FnSchedulable::new(
            Descriptor::builder("explode").produces(cat.tag("x")).build(),
            |_cx| Err(PassError::fatal("corrupt input")),
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("x")))?;

        let executor = PlanExecutor::new(ExecutorConfig::default())?;
        let err = executor.execute(&plan, items(&["core"])).unwrap_err();
        assert!(matches!(
            err,
            Error::Aborted { ref schedulable, ref item, .. } if schedulable == "explode" && item == "core"
        ));
        Ok(())
    }

    #[test]
    fn test_keep_going_downgrades_fatal() -> Result<()> {
        let cat = TestCatalog::new(&["x"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(FnSchedulable::new(
            Descriptor::builder("explode").produces(cat.tag("x")).build(),
            |_cx| Err(PassError::fatal("corrupt input")),
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("x")))?;

        let config = ExecutorConfig::default().with_failure_policy(FailurePolicy::KeepGoing);
        let report = PlanExecutor::new(config)?.execute(&plan, items(&["core"]))?;
        assert_eq!(report.failed(), 1);
        Ok(())
    }

    #[test]
    fn test_undeclared_write_is_a_violation() -> Result<()> {
        let cat = TestCatalog::new(&["x", "secret"])?;
        let mut registry = Registry::new(cat.shared());
        let secret = cat.tag("secret");
        registry.register(FnSchedulable::new(
            Descriptor::builder("sneaky").produces(cat.tag("x")).build(),
            move |cx| {
                let _ = cx.tags().add(secret);
                Ok(())
            },
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("x")))?;

        let err = PlanExecutor::new(ExecutorConfig::validated())?
            .execute(&plan, items(&["core"]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Contract violation: schedulable `sneaky` attempted to add tag `secret` on item `core`"
        );

        let report = PlanExecutor::new(ExecutorConfig::sequential().with_validation(false))?
            .execute(&plan, items(&["core"]))?;
        assert!(!report.items[0].tags.contains(secret));
        assert!(report.items[0].tags.contains(cat.tag("x")));
        Ok(())
    }

    #[test]
    fn test_exclusive_stage_gets_guard() -> Result<()> {
        let cat = TestCatalog::new(&["written"])?;
        let mut registry = Registry::new(cat.shared());
        registry.register(FnSchedulable::new(
            Descriptor::builder("write-archive")
                .produces(cat.tag("written"))
                .exclusive()
                .build(),
            |cx| {
                assert!(cx.is_exclusive());
                Ok(())
            },
        ))?;
        let plan = validated(registry).plan(&PlanRequest::new().target(cat.tag("written")))?;

        let report = PlanExecutor::new(ExecutorConfig::default())?
            .execute(&plan, items(&["a", "b"]))?;
        assert!(report.is_success());
        assert!(report.stages[0].exclusive);
        Ok(())
    }
}
