use std::collections::HashMap;

use log::debug;

use super::table::NodeTable;
use super::NodeRef;
use crate::cfg::{Cfg, CfgRef, ConditionOrder};
use crate::types::StructuralError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

enum Frame {
    Enter {
        var: u32,
        high: NodeRef,
        low: NodeRef,
    },
    Combine {
        key: (u32, NodeRef, NodeRef),
        split: u32,
    },
}

/// Translates a CFG into a reduced ordered diagram under a fixed condition
/// order.
///
/// CFG nodes are visited children-first. Each one becomes
/// `ite(condition, high, low)` over the already-translated children, built by
/// [`mux`](Self::mux) so the result respects the order even when the CFG
/// tested conditions in a different sequence.
pub(crate) struct BddCompiler<'a> {
    cfg: &'a Cfg,
    order: &'a ConditionOrder,
    table: NodeTable,
    memo: HashMap<(u32, NodeRef, NodeRef), NodeRef>,
}

impl<'a> BddCompiler<'a> {
    pub(crate) fn new(cfg: &'a Cfg, order: &'a ConditionOrder) -> Self {
        Self {
            cfg,
            order,
            table: NodeTable::new(),
            memo: HashMap::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<(NodeTable, NodeRef), StructuralError> {
        let root = match self.cfg.root {
            CfgRef::Result(r) => self.result(r)?,
            CfgRef::Node(n) => self.translate(n)?,
        };
        debug!(
            "compiled {} CFG nodes into {} diagram nodes ({} memo entries)",
            self.cfg.nodes.len(),
            self.table.len(),
            self.memo.len()
        );
        let mut table = self.table;
        let root = table.compact(root);
        Ok((table, root))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn result(&self, index: usize) -> Result<NodeRef, StructuralError> {
        if index >= self.cfg.results.len() {
            return Err(StructuralError::UnknownResult { index });
        }
        Ok(NodeRef::Result(index as u32))
    }

    /// Post-order walk from CFG node `start`. Revisiting a node that is still
    /// on the stack means the CFG has a cycle.
    #[allow(clippy::cast_possible_truncation)]
    fn translate(&mut self, start: usize) -> Result<NodeRef, StructuralError> {
        let count = self.cfg.nodes.len();
        let mut state = vec![DfsState::Unvisited; count];
        let mut done: Vec<Option<NodeRef>> = vec![None; count];
        let mut stack = vec![(start, false)];

        while let Some((n, expanded)) = stack.pop() {
            let node = *self
                .cfg
                .nodes
                .get(n)
                .ok_or_else(|| StructuralError::MalformedDiagram {
                    reason: format!("CFG node {n} does not exist"),
                })?;
            if expanded {
                let high = self.child(node.high, &done)?;
                let low = self.child(node.low, &done)?;
                if node.condition >= self.cfg.conditions.len() {
                    return Err(StructuralError::UnknownCondition {
                        index: node.condition,
                    });
                }
                let var = node.condition as u32;
                done[n] = Some(if node.negated {
                    self.mux(var, low, high)
                } else {
                    self.mux(var, high, low)
                });
                state[n] = DfsState::Done;
                continue;
            }
            match state[n] {
                DfsState::Done => continue,
                DfsState::InStack => {
                    return Err(StructuralError::MalformedDiagram {
                        reason: format!("CFG node {n} is part of a cycle"),
                    })
                }
                DfsState::Unvisited => {}
            }
            state[n] = DfsState::InStack;
            stack.push((n, true));
            for child in [node.low, node.high] {
                if let CfgRef::Node(c) = child {
                    if c >= count {
                        return Err(StructuralError::MalformedDiagram {
                            reason: format!("CFG node {c} does not exist"),
                        });
                    }
                    match state[c] {
                        DfsState::Unvisited => stack.push((c, false)),
                        DfsState::InStack => {
                            return Err(StructuralError::MalformedDiagram {
                                reason: format!("CFG node {c} is part of a cycle"),
                            })
                        }
                        DfsState::Done => {}
                    }
                }
            }
        }

        done[start].ok_or_else(|| StructuralError::MalformedDiagram {
            reason: format!("CFG node {start} was not translated"),
        })
    }

    fn child(&self, r: CfgRef, done: &[Option<NodeRef>]) -> Result<NodeRef, StructuralError> {
        match r {
            CfgRef::Result(i) => self.result(i),
            CfgRef::Node(n) => done[n].ok_or_else(|| StructuralError::MalformedDiagram {
                reason: format!("CFG node {n} used before translation"),
            }),
        }
    }

    fn top(&self, r: NodeRef) -> usize {
        match r {
            NodeRef::Node(id) => self.order.level_of(self.table.node(id).condition as usize),
            NodeRef::Result(_) => usize::MAX,
        }
    }

    fn cofactor(&self, r: NodeRef, var: u32, value: bool) -> NodeRef {
        match r {
            NodeRef::Node(id) => {
                let n = self.table.node(id);
                if n.condition != var {
                    r
                } else if value {
                    n.high
                } else {
                    n.low
                }
            }
            result => result,
        }
    }

    /// Build `if var then high else low` in the ordered table.
    #[allow(clippy::cast_possible_truncation)]
    fn mux(&mut self, var: u32, high: NodeRef, low: NodeRef) -> NodeRef {
        let mut frames = vec![Frame::Enter { var, high, low }];
        let mut values: Vec<NodeRef> = Vec::new();

        while let Some(frame) = frames.pop() {
            match frame {
                Frame::Enter { var, high, low } => {
                    if high == low {
                        values.push(high);
                        continue;
                    }
                    let key = (var, high, low);
                    if let Some(&hit) = self.memo.get(&key) {
                        values.push(hit);
                        continue;
                    }
                    let level = self.order.level_of(var as usize);
                    let t = self.top(high).min(self.top(low));
                    if t > level {
                        let r = self.table.mk(var, low, high);
                        self.memo.insert(key, r);
                        values.push(r);
                    } else if t == level {
                        let f0 = self.cofactor(low, var, false);
                        let f1 = self.cofactor(high, var, true);
                        let r = self.table.mk(var, f0, f1);
                        self.memo.insert(key, r);
                        values.push(r);
                    } else {
                        let split = self.order.condition_at(t) as u32;
                        frames.push(Frame::Combine { key, split });
                        frames.push(Frame::Enter {
                            var,
                            high: self.cofactor(high, split, false),
                            low: self.cofactor(low, split, false),
                        });
                        frames.push(Frame::Enter {
                            var,
                            high: self.cofactor(high, split, true),
                            low: self.cofactor(low, split, true),
                        });
                    }
                }
                Frame::Combine { key, split } => {
                    let f0 = values.pop().expect("false cofactor computed");
                    let f1 = values.pop().expect("true cofactor computed");
                    let r = self.table.mk(split, f0, f1);
                    self.memo.insert(key, r);
                    values.push(r);
                }
            }
        }

        values.pop().expect("mux produces a value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_set, reference, Endpoint, Parameter, Rule, RuleSetBuilder};

    fn two_flags() -> Cfg {
        RuleSetBuilder::new()
            .parameter(Parameter::string("A"))
            .parameter(Parameter::string("B"))
            .rule(
                Rule::endpoint(Endpoint::new("https://both"))
                    .when(is_set(reference("A")))
                    .when(is_set(reference("B"))),
            )
            .rule(Rule::error("fallback"))
            .build()
            .unwrap()
            .cfg()
            .unwrap()
    }

    fn walk(table: &NodeTable, root: NodeRef, truth: &[bool]) -> u32 {
        let mut current = root;
        loop {
            match current {
                NodeRef::Result(r) => return r,
                NodeRef::Node(id) => {
                    let n = table.node(id);
                    current = if truth[n.condition as usize] {
                        n.high
                    } else {
                        n.low
                    };
                }
            }
        }
    }

    #[test]
    fn default_order_matches_cfg() {
        let cfg = two_flags();
        let order = cfg.default_order();
        let (table, root) = BddCompiler::new(&cfg, &order).run().unwrap();
        assert_eq!(table.len(), 2);
        for truth in [[false, false], [false, true], [true, false], [true, true]] {
            assert_eq!(
                walk(&table, root, &truth) as usize,
                cfg.evaluate_assignment(&truth).unwrap()
            );
        }
    }

    #[test]
    fn reversed_order_is_equivalent() {
        let cfg = two_flags();
        let order = ConditionOrder::new(vec![1, 0], cfg.dependencies()).unwrap();
        let (table, root) = BddCompiler::new(&cfg, &order).run().unwrap();
        let NodeRef::Node(id) = root else {
            panic!("root must be a node");
        };
        assert_eq!(table.node(id).condition, 1);
        for truth in [[false, false], [false, true], [true, false], [true, true]] {
            assert_eq!(
                walk(&table, root, &truth) as usize,
                cfg.evaluate_assignment(&truth).unwrap()
            );
        }
    }

    #[test]
    fn constant_cfg_has_no_nodes() {
        let cfg = RuleSetBuilder::new()
            .rule(Rule::error("always"))
            .build()
            .unwrap()
            .cfg()
            .unwrap();
        let order = cfg.default_order();
        let (table, root) = BddCompiler::new(&cfg, &order).run().unwrap();
        assert_eq!(table.len(), 0);
        assert_eq!(root, NodeRef::Result(1));
    }
}
