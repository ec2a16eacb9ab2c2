//! Per-item tag state of one execution.
//!
//! Root items are handed in by the caller; their children are enumerated one level at a
//! time the first time a stage needs them and are kept for the rest of the execution, so
//! every compilation item has exactly one node and one tag set. A child starts with the
//! tags of its parent at the moment it is enumerated.

use crate::{
    executor::{ItemRef, WorkItem},
    model::{Granularity, TagSet},
};

/// One compilation item and the state the executor keeps for it.
pub(super) struct Node {
    pub item: ItemRef,
    /// Index of the root this item belongs to
    pub root: usize,
    pub parent: Option<usize>,
    pub tags: TagSet,
    /// Plan positions whose effects this item did not receive
    pub withheld: Vec<usize>,
    pub failed: bool,
    children: Option<Vec<usize>>,
}

/// Stage participants found by [`ItemTree::select`].
#[derive(Default)]
pub(super) struct Selection {
    /// Items of the stage's granularity, in enumeration order
    pub units: Vec<usize>,
    /// Coarser items enclosing the units, parents before children
    pub enclosing: Vec<usize>,
}

/// All items reached so far. Roots occupy the first indices, in input order.
pub(super) struct ItemTree {
    nodes: Vec<Node>,
    roots: usize,
}

impl ItemTree {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let nodes: Vec<Node> = items
            .into_iter()
            .enumerate()
            .map(|(root, work)| Node {
                item: work.item,
                root,
                parent: None,
                tags: work.initial,
                withheld: Vec::new(),
                failed: false,
                children: None,
            })
            .collect();
        let roots = nodes.len();
        Self { nodes, roots }
    }

    pub fn roots(&self) -> usize {
        self.roots
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes[id].parent, |&parent| self.nodes[parent].parent)
    }

    /// Collects the items of `granularity` at or below `id`.
    ///
    /// Failed items and everything they enclose are left out. Items finer than
    /// `granularity` select nothing.
    pub fn select(&mut self, id: usize, granularity: Granularity) -> Selection {
        let mut selection = Selection::default();
        self.descend(id, granularity, &mut selection);
        selection
    }

    fn descend(&mut self, id: usize, granularity: Granularity, selection: &mut Selection) {
        if self.nodes[id].failed {
            return;
        }
        let own = self.nodes[id].item.granularity();
        if own == granularity {
            selection.units.push(id);
        } else if own.is_coarser_than(granularity) {
            selection.enclosing.push(id);
            for child in self.children(id) {
                self.descend(child, granularity, selection);
            }
        }
    }

    fn children(&mut self, id: usize) -> Vec<usize> {
        if let Some(children) = &self.nodes[id].children {
            return children.clone();
        }

        let node = &self.nodes[id];
        let items = node
            .item
            .granularity()
            .finer()
            .map(|finer| node.item.children(finer))
            .unwrap_or_default();
        let (root, tags, withheld) = (node.root, node.tags, node.withheld.clone());

        let start = self.nodes.len();
        self.nodes.extend(items.into_iter().map(|item| Node {
            item,
            root,
            parent: Some(id),
            tags,
            withheld: withheld.clone(),
            failed: false,
            children: None,
        }));
        let ids: Vec<usize> = (start..self.nodes.len()).collect();
        self.nodes[id].children = Some(ids.clone());
        ids
    }

    /// Removes `removed`, then adds `added`, on `id` and every enumerated item below it
    /// that has not failed.
    pub fn apply(&mut self, id: usize, removed: &TagSet, added: &TagSet) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let node = &mut self.nodes[id];
            if node.failed {
                continue;
            }
            node.tags = node.tags.difference(removed).union(added);
            if let Some(children) = &node.children {
                pending.extend(children.iter().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{TestCatalog, TestItem},
        Result,
    };

    fn tree() -> ItemTree {
        let item: ItemRef =
            TestItem::program("core", &[("A", &["f", "g"][..]), ("B", &[] as &[&str])]);
        ItemTree::new(vec![WorkItem::new(item, TagSet::new())])
    }

    fn labels(tree: &ItemTree, ids: &[usize]) -> Vec<String> {
        ids.iter().map(|&id| tree.node(id).item.label()).collect()
    }

    #[test]
    fn test_select_enumerates_once() {
        let mut tree = tree();
        let methods = tree.select(0, Granularity::Method);
        assert_eq!(labels(&tree, &methods.units), ["core::A::f", "core::A::g"]);
        assert_eq!(
            labels(&tree, &methods.enclosing),
            ["core", "core::A", "core::B"]
        );

        let again = tree.select(0, Granularity::Method);
        assert_eq!(again.units, methods.units);
        assert_eq!(tree.ancestors(methods.units[0]).count(), 2);
    }

    #[test]
    fn test_children_inherit_and_receive_effects() -> Result<()> {
        let cat = TestCatalog::new(&["resolved", "lowered"])?;
        let resolved: TagSet = [cat.tag("resolved")].into_iter().collect();
        let lowered: TagSet = [cat.tag("lowered")].into_iter().collect();

        let mut tree = tree();
        tree.apply(0, &TagSet::new(), &resolved);
        let types = tree.select(0, Granularity::Type);
        assert!(tree.node(types.units[0]).tags.contains(cat.tag("resolved")));

        let methods = tree.select(0, Granularity::Method);
        tree.node_mut(methods.units[1]).failed = true;
        tree.apply(0, &resolved, &lowered);
        assert_eq!(tree.node(methods.units[0]).tags, lowered);
        assert_eq!(tree.node(methods.units[1]).tags, resolved);

        let remaining = tree.select(0, Granularity::Method);
        assert_eq!(remaining.units, vec![methods.units[0]]);
        Ok(())
    }

    #[test]
    fn test_root_of_stage_granularity_is_its_own_unit() {
        let item: ItemRef = TestItem::program("core", &[]);
        let mut tree = ItemTree::new(vec![WorkItem::new(item, TagSet::new())]);
        let selection = tree.select(0, Granularity::Session);
        assert_eq!(selection.units, vec![0]);
        assert!(selection.enclosing.is_empty());
        assert_eq!(tree.roots(), 1);
    }
}
