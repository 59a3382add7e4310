use std::collections::BTreeSet;

use log::debug;

use super::table::NodeTable;
use super::{Bdd, BddNode, NodeRef};
use crate::cfg::{Cfg, DependencyGraph};
use crate::error::EndpointBddError;
use crate::types::OrderingViolation;

/// Mutable working form of a [`Bdd`] for reordering passes.
///
/// Nodes carry CFG condition indices, so a swap of two adjacent levels only
/// rewrites nodes at those levels; everything above keeps pointing at the
/// same node ids. Nodes are reference counted and die as soon as their last
/// parent lets go. Their slots are reclaimed by [`collect_garbage`].
///
/// [`collect_garbage`]: Self::collect_garbage
#[derive(Debug, Clone)]
pub(crate) struct Diagram {
    table: NodeTable,
    root: NodeRef,
    /// Condition at each level.
    order: Vec<usize>,
    /// Level of each condition.
    levels: Vec<usize>,
    /// Live node ids testing each condition.
    by_var: Vec<BTreeSet<u32>>,
    /// Live parents of each slot, plus one for the root.
    refs: Vec<u32>,
    live: usize,
}

impl Diagram {
    /// Load a diagram produced for `cfg`.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn from_bdd(cfg: &Cfg, bdd: &Bdd) -> Result<Self, EndpointBddError> {
        bdd.validate()?;
        let order = cfg.order_of(bdd)?;

        let mut indices: Vec<usize> = (0..bdd.nodes.len()).collect();
        indices.sort_by_key(|&i| std::cmp::Reverse(bdd.nodes[i].condition));
        let mut table = NodeTable::new();
        let mut map = vec![NodeRef::Result(0); bdd.nodes.len()];
        let lookup = |map: &[NodeRef], r: NodeRef| match r {
            NodeRef::Node(i) => map[i as usize],
            result => result,
        };
        // Deepest level first, so children are mapped before parents.
        for i in indices {
            let n = bdd.nodes[i];
            let var = order.condition_at(n.condition as usize) as u32;
            let low = lookup(&map, n.low);
            let high = lookup(&map, n.high);
            map[i] = table.mk(var, low, high);
        }
        let root = lookup(&map, bdd.root);
        let root = table.compact(root);

        let mut diagram = Self {
            table,
            root,
            order: order.as_slice().to_vec(),
            levels: order.levels().to_vec(),
            by_var: Vec::new(),
            refs: Vec::new(),
            live: 0,
        };
        diagram.reindex();
        Ok(diagram)
    }

    /// Rebuild the level index and reference counts from a compact table.
    #[allow(clippy::cast_possible_truncation)]
    fn reindex(&mut self) {
        self.by_var = vec![BTreeSet::new(); self.order.len()];
        self.refs = vec![0; self.table.len()];
        for (id, n) in self.table.nodes().iter().enumerate() {
            self.by_var[n.condition as usize].insert(id as u32);
            for child in [n.low, n.high] {
                if let NodeRef::Node(c) = child {
                    self.refs[c as usize] += 1;
                }
            }
        }
        if let NodeRef::Node(r) = self.root {
            self.refs[r as usize] += 1;
        }
        self.live = self.table.len();
    }

    /// Reclaim dead slots once they outnumber live nodes. Node ids change.
    pub(crate) fn collect_garbage(&mut self) {
        if self.table.len() > 2 * self.live {
            self.root = self.table.compact(self.root);
            self.reindex();
        }
    }

    pub(crate) fn root(&self) -> NodeRef {
        self.root
    }

    pub(crate) fn node(&self, id: u32) -> BddNode {
        self.table.node(id)
    }

    /// Number of slots, live or dead. Every node id is below this.
    pub(crate) fn slots(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.live
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn level_of(&self, var: usize) -> usize {
        self.levels[var]
    }

    pub(crate) fn var_at(&self, level: usize) -> usize {
        self.order[level]
    }

    /// Node count at each level.
    pub(crate) fn level_sizes(&self) -> Vec<usize> {
        self.order.iter().map(|&c| self.by_var[c].len()).collect()
    }

    /// Reachable nodes with every parent ahead of its children, in an order
    /// that depends only on the diagram's shape.
    pub(crate) fn topological(&self) -> Vec<u32> {
        let mut ids = self.table.preorder(self.root);
        ids.sort_by_key(|&id| self.levels[self.table.node(id).condition as usize]);
        ids
    }

    /// Whether levels `level` and `level + 1` may trade places.
    pub(crate) fn can_swap(&self, level: usize, deps: &DependencyGraph) -> bool {
        level + 1 < self.order.len() && !deps.depends_on(self.order[level + 1], self.order[level])
    }

    fn retain(&mut self, r: NodeRef) {
        if let NodeRef::Node(id) = r {
            self.refs[id as usize] += 1;
        }
    }

    /// Drop one reference to `r`, freeing every node that becomes
    /// unreachable.
    fn release(&mut self, r: NodeRef) {
        let mut stack = vec![r];
        while let Some(r) = stack.pop() {
            let NodeRef::Node(id) = r else {
                continue;
            };
            self.refs[id as usize] -= 1;
            if self.refs[id as usize] == 0 {
                let n = self.table.node(id);
                self.table.remove_key(id);
                self.by_var[n.condition as usize].remove(&id);
                self.live -= 1;
                stack.push(n.low);
                stack.push(n.high);
            }
        }
    }

    /// Find or create `(var, low, high)`. A fresh node holds references to
    /// its children but none from a parent yet.
    fn mk(&mut self, var: u32, low: NodeRef, high: NodeRef) -> NodeRef {
        let slots = self.table.len();
        let r = self.table.mk(var, low, high);
        if let NodeRef::Node(id) = r {
            if id as usize == slots {
                self.refs.push(0);
                self.by_var[var as usize].insert(id);
                self.live += 1;
                self.retain(low);
                self.retain(high);
            }
        }
        r
    }

    fn tests(&self, r: NodeRef, var: u32) -> bool {
        matches!(r, NodeRef::Node(id) if self.table.node(id).condition == var)
    }

    /// Children of `r` when it tests `var`, otherwise `r` twice.
    fn cofactors(&self, r: NodeRef, var: u32) -> (NodeRef, NodeRef) {
        match r {
            NodeRef::Node(id) if self.table.node(id).condition == var => {
                let n = self.table.node(id);
                (n.low, n.high)
            }
            other => (other, other),
        }
    }

    /// Exchange levels `level` and `level + 1`.
    ///
    /// Each node testing the upper condition `x` with a child testing the
    /// lower condition `y` is rewritten in place as a `y` node over two
    /// `x` nodes. Node ids seen by parents stay valid, and only nodes at the
    /// two levels are visited.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn swap(
        &mut self,
        level: usize,
        deps: &DependencyGraph,
    ) -> Result<(), OrderingViolation> {
        if level + 1 >= self.order.len() {
            return Err(OrderingViolation::NotAPermutation {
                expected: self.order.len(),
            });
        }
        let x = self.order[level];
        let y = self.order[level + 1];
        if deps.depends_on(y, x) {
            return Err(OrderingViolation::DependencyEdge {
                condition: y,
                dependency: x,
            });
        }
        let (xv, yv) = (x as u32, y as u32);

        let affected: Vec<u32> = self.by_var[x]
            .iter()
            .copied()
            .filter(|&id| {
                let n = self.table.node(id);
                self.tests(n.low, yv) || self.tests(n.high, yv)
            })
            .collect();
        for &id in &affected {
            let n = self.table.node(id);
            self.table.remove_key(id);
            let (f00, f01) = self.cofactors(n.low, yv);
            let (f10, f11) = self.cofactors(n.high, yv);
            let low = self.mk(xv, f00, f10);
            let high = self.mk(xv, f01, f11);
            self.retain(low);
            self.retain(high);
            self.table.replace(
                id,
                BddNode {
                    condition: yv,
                    low,
                    high,
                },
            );
            self.by_var[x].remove(&id);
            self.by_var[y].insert(id);
            self.release(n.low);
            self.release(n.high);
        }

        self.order.swap(level, level + 1);
        self.levels[x] = level + 1;
        self.levels[y] = level;
        debug!(
            "swapped levels {level}/{}: {} rewritten, {} nodes",
            level + 1,
            affected.len(),
            self.live
        );
        Ok(())
    }

    /// Export in canonical layout.
    pub(crate) fn to_bdd(&self, cfg: &Cfg) -> Bdd {
        let (nodes, root) = self.table.export(self.root, &self.levels);
        Bdd::from_parts(
            self.order
                .iter()
                .map(|&c| cfg.conditions[c].clone())
                .collect(),
            cfg.results.clone(),
            nodes,
            root,
        )
    }
}
