//! The plan builder.
//!
//! Turns a [`PlanRequest`] into a [`Plan`] over a [`ValidatedRegistry`]:
//!
//! 1. Filter the registry down to the *candidates* of the request (feature gates and
//!    explicit exclusions)
//! 2. Seed a frontier with the targets and the needs of explicitly included schedulables,
//!    minus the assumed initial tags
//! 3. Drain the frontier, choosing one producer per tag (declared alternatives first,
//!    then registration order) and pushing the needs of every newly selected schedulable
//! 4. Re-seed removed targets until the selection reaches a fixpoint
//! 5. Order the selection with Kahn's algorithm over the justified edges
//! 6. Simulate the result as a safety net
//!
//! Nothing here depends on hash iteration order: identical inputs produce `==` plans or
//! identical errors.

use std::collections::{BTreeSet, HashMap, VecDeque};

use log::{debug, info};

use crate::{
    model::{Tag, TagSet},
    plan::{
        graph::PlanGraph, ConsideredProducer, CycleMembers, Demand, EdgeKind, Exclusion, Justification,
        Plan, PlanEntry, PlanRequest, ProducerList,
    },
    registry::ValidatedRegistry,
    Error, Result,
};

/// Builds plans over a validated registry.
///
/// Building is single-threaded, synchronous and side-effect free apart from logging.
#[derive(Debug, Clone, Copy)]
pub struct PlanBuilder<'r> {
    registry: &'r ValidatedRegistry,
}

/// A tag the builder still has to find a producer for.
#[derive(Debug, Clone, Copy)]
struct Pending {
    tag: Tag,
    demand: Demand,
    consumer: Option<usize>,
}

/// Mutable state of one `build` call.
struct Selection<'a> {
    registry: &'a ValidatedRegistry,
    request: &'a PlanRequest,
    selected: BTreeSet<usize>,
    chosen: HashMap<Tag, usize>,
    frontier: VecDeque<Pending>,
}

impl<'r> PlanBuilder<'r> {
    /// Creates a builder for `registry`.
    #[must_use]
    pub fn new(registry: &'r ValidatedRegistry) -> Self {
        Self { registry }
    }

    /// Computes the plan for `request`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownSchedulable`] if an included name is not registered
    /// - [`Error::InclusionRejected`] if an included schedulable is not a candidate
    /// - [`Error::PlanUnsatisfiable`] if a required tag has no candidate producer
    /// - [`Error::PlanCycle`] if the selected schedulables cannot be ordered
    /// - [`Error::PlanUnsound`] if the ordered plan does not establish what it promised
    pub fn build(&self, request: &PlanRequest) -> Result<Plan> {
        let catalog = self.registry.catalog();
        let mut selection = Selection {
            registry: self.registry,
            request,
            selected: BTreeSet::new(),
            chosen: HashMap::new(),
            frontier: VecDeque::new(),
        };

        for tag in request.targets().difference(request.initial_tags()).iter() {
            selection.frontier.push_back(Pending {
                tag,
                demand: Demand::Target,
                consumer: None,
            });
        }

        for name in request.included() {
            let index = self
                .registry
                .index_of(name)
                .ok_or_else(|| Error::UnknownSchedulable { name: name.clone() })?;
            if let Some(reason) = selection.exclusion(index) {
                return Err(Error::InclusionRejected {
                    name: name.clone(),
                    reason,
                });
            }
            selection.select(index);
        }

        loop {
            selection.drain()?;
            if !selection.restore_removed_targets() {
                break;
            }
        }

        let graph = self.edges(&selection.selected, request);
        let order = graph.topological_order().map_err(|cycle| Error::PlanCycle {
            members: CycleMembers(
                cycle
                    .into_iter()
                    .filter_map(|index| self.registry.get(index))
                    .map(|s| s.name().to_string())
                    .collect(),
            ),
        })?;

        let mut entries = Vec::with_capacity(order.len());
        for index in order {
            let justifications = graph
                .inbound(index)
                .filter_map(|edge| {
                    let from = self.registry.get(edge.from)?;
                    Some(Justification {
                        from: from.name().to_string(),
                        tag: edge.tag,
                        kind: edge.kind,
                    })
                })
                .collect();
            if let Some(schedulable) = self.registry.get(index) {
                entries.push(PlanEntry::new(index, schedulable.clone(), justifications));
            }
        }

        let plan = Plan::new(
            catalog.clone(),
            entries,
            *request.targets(),
            *request.initial_tags(),
        );
        plan.verify()?;

        info!(
            "built plan with {} entries for targets {} (features {})",
            plan.len(),
            catalog.describe_tags(request.targets()),
            catalog.describe_features(request.features())
        );
        Ok(plan)
    }

    /// Builds the justified ordering constraints among `selected`.
    ///
    /// A remover that already precedes every producer of a tag gets no invalidation edge
    /// for it; such edges are therefore added after all producer edges.
    fn edges(&self, selected: &BTreeSet<usize>, request: &PlanRequest) -> PlanGraph {
        let catalog = self.registry.catalog();
        let targets = request.targets();
        let mut graph = PlanGraph::new(selected.iter().copied());

        let selected_producers = |tag: Tag| -> Vec<usize> {
            self.registry
                .producers_of(tag)
                .iter()
                .copied()
                .filter(|index| selected.contains(index))
                .collect()
        };
        let descriptor = |index: usize| self.registry.get(index).map(|s| s.descriptor());

        for &consumer in selected {
            let Some(entry) = descriptor(consumer) else {
                continue;
            };
            for tag in entry.needs() {
                for producer in selected_producers(tag) {
                    graph.add_edge(producer, consumer, tag, EdgeKind::Provides);
                }
            }
        }

        for &remover in selected {
            let Some(entry) = descriptor(remover) else {
                continue;
            };
            for tag in entry.removes().intersection(targets).iter() {
                for producer in selected_producers(tag) {
                    graph.add_edge(remover, producer, tag, EdgeKind::Restores);
                }
            }
        }

        let mut groups = Vec::new();
        for group in catalog.groups() {
            let members: Vec<(Tag, usize)> = group
                .tags
                .iter()
                .flat_map(|tag| selected_producers(tag).into_iter().map(move |p| (tag, p)))
                .collect();

            for target in group.tags.intersection(targets).iter() {
                for &(_, winner) in members.iter().filter(|(tag, _)| *tag == target) {
                    for &(tag, other) in members.iter().filter(|(tag, _)| *tag != target) {
                        graph.add_edge(other, winner, tag, EdgeKind::Supersedes);
                    }
                }
            }
            groups.push(members);
        }

        for &consumer in selected {
            let Some(entry) = descriptor(consumer) else {
                continue;
            };
            for tag in entry.needs() {
                let producers = selected_producers(tag);
                for &remover in selected {
                    let removes = descriptor(remover).is_some_and(|r| r.removes().contains(tag));
                    if !removes || remover == consumer {
                        continue;
                    }
                    let restored = !producers.is_empty()
                        && producers.iter().all(|&p| graph.has_path(remover, p));
                    if !restored {
                        graph.add_edge(consumer, remover, tag, EdgeKind::Invalidates);
                    }
                }
            }
        }

        for members in groups {
            for (i, &(tag, a)) in members.iter().enumerate() {
                for &(_, b) in &members[i + 1..] {
                    graph.order_pair(a, b, tag);
                }
            }
        }

        graph
    }
}

impl Selection<'_> {
    /// Why `index` is not a candidate for the request.
    fn exclusion(&self, index: usize) -> Option<Exclusion> {
        let schedulable = self.registry.get(index)?;
        let descriptor = schedulable.descriptor();
        if let Some(gate) = descriptor.feature_exclusion(self.request.features()) {
            return Some(gate.into_exclusion(self.registry.catalog()));
        }
        if self.request.is_excluded(descriptor.name()) {
            return Some(Exclusion::Excluded);
        }
        None
    }

    fn select(&mut self, index: usize) {
        if !self.selected.insert(index) {
            return;
        }
        let Some(schedulable) = self.registry.get(index) else {
            return;
        };
        let descriptor = schedulable.descriptor();
        debug!(
            "selected `{}` (needs {}, produces {})",
            descriptor.name(),
            self.registry.catalog().describe_tags(descriptor.needs()),
            self.registry.catalog().describe_tags(descriptor.produces())
        );

        let missing = descriptor.needs().difference(self.request.initial_tags());
        for tag in missing.iter() {
            self.frontier.push_back(Pending {
                tag,
                demand: Demand::Need,
                consumer: Some(index),
            });
        }
    }

    /// Chooses producers until the frontier is empty.
    fn drain(&mut self) -> Result<()> {
        while let Some(pending) = self.frontier.pop_front() {
            if let Some(&producer) = self.chosen.get(&pending.tag) {
                if Some(producer) != pending.consumer {
                    continue;
                }
            }

            let producer = self.choose(pending)?;
            self.chosen.entry(pending.tag).or_insert(producer);
            self.select(producer);
        }
        Ok(())
    }

    /// Picks the producer of `pending.tag`: the first candidate among the declared
    /// alternatives, then among all producers in registration order.
    fn choose(&self, pending: Pending) -> Result<usize> {
        let declared = self
            .registry
            .alternatives_for(pending.tag)
            .unwrap_or_default();
        let remaining = self
            .registry
            .producers_of(pending.tag)
            .iter()
            .filter(|index| !declared.contains(*index));

        let found = declared
            .iter()
            .chain(remaining)
            .copied()
            .find(|&index| Some(index) != pending.consumer && self.exclusion(index).is_none());
        if let Some(index) = found {
            return Ok(index);
        }

        let considered = self
            .registry
            .producers_of(pending.tag)
            .iter()
            .filter_map(|&index| {
                let name = self.registry.get(index)?.name().to_string();
                let reason = if Some(index) == pending.consumer {
                    Exclusion::SelfDependent
                } else {
                    self.exclusion(index)?
                };
                Some(ConsideredProducer { name, reason })
            })
            .collect();

        Err(Error::PlanUnsatisfiable {
            tag: self.registry.catalog().tag_name(pending.tag),
            demand: pending.demand,
            consumer: pending
                .consumer
                .and_then(|index| self.registry.get(index))
                .map(|s| s.name().to_string()),
            considered: ProducerList(considered),
        })
    }

    /// Queues a re-producer for every target some selected schedulable removes and no
    /// selected schedulable produces. Returns true if anything was queued.
    fn restore_removed_targets(&mut self) -> bool {
        let targets = self.request.targets();
        let mut produced = TagSet::new();
        let mut lost: Vec<(Tag, usize)> = Vec::new();

        for &index in &self.selected {
            if let Some(schedulable) = self.registry.get(index) {
                produced = produced.union(schedulable.descriptor().produces());
            }
        }
        for &index in &self.selected {
            if let Some(schedulable) = self.registry.get(index) {
                for tag in schedulable.descriptor().removes().intersection(targets).iter() {
                    if !produced.contains(tag) && !lost.iter().any(|(t, _)| *t == tag) {
                        lost.push((tag, index));
                    }
                }
            }
        }

        for &(tag, remover) in &lost {
            self.frontier.push_back(Pending {
                tag,
                demand: Demand::Restore,
                consumer: Some(remover),
            });
        }
        !lost.is_empty()
    }
}
