//! Dependency graph over the schedulables selected for a plan.
//!
//! Nodes are registration indices. An edge `from -> to` means `from` must run before
//! `to`; every edge remembers the tag and the rule that introduced it so the finished
//! plan can explain each adjacency.
//!
//! # Thread Safety
//!
//! Construction and ordering are single-threaded. The graph only lives for the duration
//! of one [`super::PlanBuilder::build`] call.

use std::collections::{BTreeMap, BTreeSet};

use crate::{model::Tag, plan::EdgeKind};

/// A justified ordering constraint between two selected schedulables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edge {
    pub from: usize,
    pub to: usize,
    pub tag: Tag,
    pub kind: EdgeKind,
}

#[derive(Debug, Default)]
pub(crate) struct PlanGraph {
    nodes: BTreeSet<usize>,
    successors: BTreeMap<usize, BTreeSet<usize>>,
    predecessors: BTreeMap<usize, BTreeSet<usize>>,
    edges: Vec<Edge>,
}

impl PlanGraph {
    pub fn new(nodes: impl IntoIterator<Item = usize>) -> Self {
        let nodes: BTreeSet<usize> = nodes.into_iter().collect();
        let successors = nodes.iter().map(|n| (*n, BTreeSet::new())).collect();
        let predecessors = nodes.iter().map(|n| (*n, BTreeSet::new())).collect();
        Self {
            nodes,
            successors,
            predecessors,
            edges: Vec::new(),
        }
    }

    /// Adds `from -> to`. Self loops and repeated justifications are ignored.
    pub fn add_edge(&mut self, from: usize, to: usize, tag: Tag, kind: EdgeKind) {
        if from == to || !self.nodes.contains(&from) || !self.nodes.contains(&to) {
            return;
        }

        let edge = Edge {
            from,
            to,
            tag,
            kind,
        };
        if self.edges.contains(&edge) {
            return;
        }

        self.edges.push(edge);
        self.successors.entry(from).or_default().insert(to);
        self.predecessors.entry(to).or_default().insert(from);
    }

    /// Returns true if `to` is reachable from `from`.
    pub fn has_path(&self, from: usize, to: usize) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![from];

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = self.successors.get(&node) {
                stack.extend(next.iter().copied());
            }
        }

        false
    }

    /// Orders `a` and `b` by registration index unless they are already ordered.
    pub fn order_pair(&mut self, a: usize, b: usize, tag: Tag) {
        if a == b || self.has_path(a, b) || self.has_path(b, a) {
            return;
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        self.add_edge(first, second, tag, EdgeKind::Precedence);
    }

    /// Edges pointing at `to`, in insertion order.
    pub fn inbound(&self, to: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.to == to)
    }

    /// Kahn's algorithm; the ready set is drained lowest registration index first.
    ///
    /// # Errors
    ///
    /// Returns the members of one cycle, in dependency order, starting at the lowest
    /// registration index, if the graph is not acyclic.
    pub fn topological_order(&self) -> std::result::Result<Vec<usize>, Vec<usize>> {
        let mut in_degree: BTreeMap<usize, usize> = self
            .nodes
            .iter()
            .map(|node| (*node, self.predecessors.get(node).map_or(0, BTreeSet::len)))
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for next in self.successors.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let scheduled: BTreeSet<usize> = order.into_iter().collect();
        let remaining: BTreeSet<usize> = self.nodes.difference(&scheduled).copied().collect();
        Err(self.find_cycle(&remaining))
    }

    /// Extracts one cycle from the nodes Kahn's algorithm could not schedule.
    ///
    /// Every remaining node has a remaining predecessor, so walking lowest-index
    /// predecessors must revisit a node.
    fn find_cycle(&self, remaining: &BTreeSet<usize>) -> Vec<usize> {
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };

        let mut walk = Vec::new();
        let mut node = start;
        loop {
            if let Some(position) = walk.iter().position(|n| *n == node) {
                let mut cycle: Vec<usize> = walk.split_off(position);
                cycle.reverse();
                if let Some(lowest) = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, n)| **n)
                    .map(|(i, _)| i)
                {
                    cycle.rotate_left(lowest);
                }
                return cycle;
            }
            walk.push(node);

            let previous = self
                .predecessors
                .get(&node)
                .and_then(|preds| preds.iter().find(|p| remaining.contains(p)));
            match previous {
                Some(p) => node = *p,
                None => return walk,
            }
        }
    }
}
