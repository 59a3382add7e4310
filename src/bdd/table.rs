use std::collections::HashMap;

use super::{BddNode, NodeRef};

/// Hash-consed node storage. `BddNode::condition` holds a CFG condition
/// index here, not a level.
///
/// Every node built through [`mk`](Self::mk) is reduced: no node has equal
/// children, and no two nodes share a `(condition, low, high)` triple.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeTable {
    nodes: Vec<BddNode>,
    unique: HashMap<(u32, NodeRef, NodeRef), u32>,
}

impl NodeTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn mk(&mut self, var: u32, low: NodeRef, high: NodeRef) -> NodeRef {
        if low == high {
            return low;
        }
        if let Some(&id) = self.unique.get(&(var, low, high)) {
            return NodeRef::Node(id);
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(BddNode {
            condition: var,
            low,
            high,
        });
        self.unique.insert((var, low, high), id);
        NodeRef::Node(id)
    }

    pub(crate) fn node(&self, id: u32) -> BddNode {
        self.nodes[id as usize]
    }

    pub(crate) fn nodes(&self) -> &[BddNode] {
        &self.nodes
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Drop `id` from the unique table ahead of rewriting it in place.
    pub(crate) fn remove_key(&mut self, id: u32) {
        let n = self.nodes[id as usize];
        self.unique.remove(&(n.condition, n.low, n.high));
    }

    /// Overwrite node `id`, keeping its identity for every parent.
    pub(crate) fn replace(&mut self, id: u32, node: BddNode) {
        self.nodes[id as usize] = node;
        self.unique.insert((node.condition, node.low, node.high), id);
    }

    /// Reachable nodes in canonical pre-order from `root`, high branch
    /// first.
    pub(crate) fn preorder(&self, root: NodeRef) -> Vec<u32> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let NodeRef::Node(id) = current else {
                continue;
            };
            if std::mem::replace(&mut seen[id as usize], true) {
                continue;
            }
            out.push(id);
            let n = self.nodes[id as usize];
            stack.push(n.low);
            stack.push(n.high);
        }
        out
    }

    /// Reachable nodes from `root` with every node after both of its
    /// children.
    pub(crate) fn postorder(&self, root: NodeRef) -> Vec<u32> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((current, expanded)) = stack.pop() {
            let NodeRef::Node(id) = current else {
                continue;
            };
            if expanded {
                out.push(id);
                continue;
            }
            if std::mem::replace(&mut seen[id as usize], true) {
                continue;
            }
            let n = self.nodes[id as usize];
            stack.push((current, true));
            stack.push((n.low, false));
            stack.push((n.high, false));
        }
        out
    }

    /// Rebuild the table with only the nodes reachable from `root`, and
    /// return the new root.
    pub(crate) fn compact(&mut self, root: NodeRef) -> NodeRef {
        let order = self.postorder(root);
        let mut fresh = NodeTable::new();
        let mut map: HashMap<u32, NodeRef> = HashMap::with_capacity(order.len());
        let lookup = |map: &HashMap<u32, NodeRef>, r: NodeRef| match r {
            NodeRef::Node(id) => map[&id],
            result => result,
        };
        for id in order {
            let n = self.nodes[id as usize];
            let low = lookup(&map, n.low);
            let high = lookup(&map, n.high);
            map.insert(id, fresh.mk(n.condition, low, high));
        }
        let root = lookup(&map, root);
        *self = fresh;
        root
    }

    /// Lay the reachable nodes out in canonical pre-order with conditions
    /// rewritten to levels. Node 0 of the output is the root.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn export(&self, root: NodeRef, levels: &[usize]) -> (Vec<BddNode>, NodeRef) {
        let order = self.preorder(root);
        let position: HashMap<u32, u32> = order
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos as u32))
            .collect();
        let remap = |r: NodeRef| match r {
            NodeRef::Node(id) => NodeRef::Node(position[&id]),
            result => result,
        };
        let nodes = order
            .iter()
            .map(|&id| {
                let n = self.nodes[id as usize];
                BddNode {
                    condition: levels[n.condition as usize] as u32,
                    low: remap(n.low),
                    high: remap(n.high),
                }
            })
            .collect();
        (nodes, remap(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: NodeRef = NodeRef::Result(1);
    const B: NodeRef = NodeRef::Result(2);

    #[test]
    fn redundant_test_is_elided() {
        let mut table = NodeTable::new();
        assert_eq!(table.mk(0, A, A), A);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn identical_triples_share_a_node() {
        let mut table = NodeTable::new();
        let x = table.mk(0, A, B);
        let y = table.mk(0, A, B);
        assert_eq!(x, y);
        assert_eq!(table.len(), 1);
        assert_ne!(table.mk(0, B, A), x);
    }

    #[test]
    fn compact_drops_unreachable_nodes() {
        let mut table = NodeTable::new();
        let _orphan = table.mk(1, B, A);
        let child = table.mk(1, A, B);
        let root = table.mk(0, child, B);
        let root = table.compact(root);
        assert_eq!(table.len(), 2);
        let NodeRef::Node(id) = root else {
            panic!("root must be a node");
        };
        assert_eq!(table.node(id).condition, 0);
    }

    /// `c0 ? c2 : (c1 ? c2 : A)` with `c2` shared by parents at levels 0
    /// and 1. Pre-order visits `c2` before `c1`.
    fn shared_child(table: &mut NodeTable) -> (NodeRef, NodeRef) {
        let shared = table.mk(2, A, B);
        let middle = table.mk(1, A, shared);
        (table.mk(0, middle, shared), shared)
    }

    #[test]
    fn postorder_puts_children_first() {
        let mut table = NodeTable::new();
        let (root, _) = shared_child(&mut table);
        let order = table.postorder(root);
        assert_eq!(order.len(), 3);
        for (pos, &id) in order.iter().enumerate() {
            let n = table.node(id);
            for child in [n.low, n.high] {
                if let NodeRef::Node(c) = child {
                    assert!(order[..pos].contains(&c), "{c} must precede {id}");
                }
            }
        }
    }

    #[test]
    fn compact_keeps_shared_children() {
        let mut table = NodeTable::new();
        let _orphan = table.mk(2, B, A);
        let (root, _) = shared_child(&mut table);
        let (before, _) = table.export(root, &[0, 1, 2]);
        let root = table.compact(root);
        assert_eq!(table.len(), 3);
        let (after, root) = table.export(root, &[0, 1, 2]);
        assert_eq!(root, NodeRef::Node(0));
        assert_eq!(after, before);
        assert_eq!(after[0].high, after[2].high);
    }

    #[test]
    fn export_is_preorder_with_levels() {
        let mut table = NodeTable::new();
        let low = table.mk(2, A, B);
        let high = table.mk(1, B, A);
        let root = table.mk(0, low, high);
        let (nodes, root) = table.export(root, &[0, 1, 2]);
        assert_eq!(root, NodeRef::Node(0));
        assert_eq!(nodes[0].high, NodeRef::Node(1));
        assert_eq!(nodes[0].low, NodeRef::Node(2));
        assert_eq!(nodes[1].condition, 1);
        assert_eq!(nodes[2].condition, 2);
    }
}
