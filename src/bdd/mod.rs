//! Reduced ordered binary decision diagrams over endpoint conditions.
//!
//! A [`Bdd`] is an immutable value: every optimization pass takes one and
//! returns a new one. Node `condition` fields hold *levels*, i.e. indices into
//! [`Bdd::conditions`], which lists conditions in evaluation order.

mod compile;
mod cost;
mod diagram;
mod sift;
mod table;

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

pub use cost::{CostConfig, CostModel, CostStats};
pub use sift::{SiftingConfig, SiftingStats};

pub(crate) use diagram::Diagram;

use crate::cfg::{Cfg, ConditionOrder};
use crate::error::EndpointBddError;
use crate::types::{
    Condition, Context, EvalError, EvaluationReport, Outcome, Parameter, Resolution,
    StructuralError,
};

use compile::BddCompiler;

/// Reference from a decision node to another node or to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeRef {
    Node(u32),
    Result(u32),
}

/// A decision: test the condition at level `condition`, go to `high` when
/// it holds and `low` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub struct BddNode {
    pub condition: u32,
    pub low: NodeRef,
    pub high: NodeRef,
}

/// A compiled decision diagram.
///
/// Nodes are laid out in pre-order from the root (high branch first), so
/// equal diagrams are equal values.
#[derive(Debug, Clone, PartialEq)]
pub struct Bdd {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) results: Vec<Outcome>,
    pub(crate) nodes: Vec<BddNode>,
    pub(crate) root: NodeRef,
}

impl Bdd {
    /// Compile `cfg` under `order`.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderingViolation`](crate::OrderingViolation) if `order`
    /// does not fit `cfg`'s dependencies, or a [`StructuralError`] if the CFG
    /// refers to conditions or results it does not hold.
    pub fn build(cfg: &Cfg, order: &ConditionOrder) -> Result<Self, EndpointBddError> {
        let order = ConditionOrder::new(order.as_slice().to_vec(), cfg.dependencies())?;
        let (table, root) = BddCompiler::new(cfg, &order).run()?;
        let (nodes, root) = table.export(root, order.levels());
        Ok(Self {
            conditions: order
                .as_slice()
                .iter()
                .map(|&c| cfg.conditions[c].clone())
                .collect(),
            results: cfg.results.clone(),
            nodes,
            root,
        })
    }

    pub(crate) fn from_parts(
        conditions: Vec<Condition>,
        results: Vec<Outcome>,
        nodes: Vec<BddNode>,
        root: NodeRef,
    ) -> Self {
        Self {
            conditions,
            results,
            nodes,
            root,
        }
    }

    /// Conditions in evaluation order; node `condition` fields index this.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn results(&self) -> &[Outcome] {
        &self.results
    }

    #[must_use]
    pub fn nodes(&self) -> &[BddNode] {
        &self.nodes
    }

    #[must_use]
    pub fn root(&self) -> NodeRef {
        self.root
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of decision nodes that test `condition`.
    #[must_use]
    pub fn nodes_testing(&self, condition: &Condition) -> usize {
        let Some(level) = self.conditions.iter().position(|c| c == condition) else {
            return 0;
        };
        self.nodes
            .iter()
            .filter(|n| n.condition as usize == level)
            .count()
    }

    /// Indices of the results reachable from the root, ascending.
    #[must_use]
    pub fn referenced_results(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut add = |r: NodeRef| {
            if let NodeRef::Result(i) = r {
                if seen.insert(i) {
                    out.push(i as usize);
                }
            }
        };
        add(self.root);
        for n in &self.nodes {
            add(n.low);
            add(n.high);
        }
        out.sort_unstable();
        out
    }

    /// Check every structural invariant: references in bounds, edges going
    /// to strictly later levels, no redundant test, no duplicate node.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), StructuralError> {
        let check = |r: NodeRef, parent_level: Option<u32>| match r {
            NodeRef::Result(i) if i as usize >= self.results.len() => {
                Err(StructuralError::UnknownResult { index: i as usize })
            }
            NodeRef::Result(_) => Ok(()),
            NodeRef::Node(i) => {
                let child = self.nodes.get(i as usize).ok_or_else(|| {
                    StructuralError::MalformedDiagram {
                        reason: format!("node {i} does not exist"),
                    }
                })?;
                if parent_level.is_some_and(|level| child.condition <= level) {
                    return Err(StructuralError::MalformedDiagram {
                        reason: format!("edge to node {i} does not go to a later level"),
                    });
                }
                Ok(())
            }
        };

        check(self.root, None)?;
        let mut unique = HashSet::with_capacity(self.nodes.len());
        for (i, n) in self.nodes.iter().enumerate() {
            if n.condition as usize >= self.conditions.len() {
                return Err(StructuralError::UnknownCondition {
                    index: n.condition as usize,
                });
            }
            check(n.low, Some(n.condition))?;
            check(n.high, Some(n.condition))?;
            if n.low == n.high {
                return Err(StructuralError::MalformedDiagram {
                    reason: format!("node {i} has identical branches"),
                });
            }
            if !unique.insert(*n) {
                return Err(StructuralError::MalformedDiagram {
                    reason: format!("node {i} duplicates an earlier node"),
                });
            }
        }
        Ok(())
    }

    /// Resolve an endpoint for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the reached outcome cannot be rendered.
    pub fn evaluate(
        &self,
        parameters: &[Parameter],
        ctx: &Context,
    ) -> Result<Resolution, EvalError> {
        crate::evaluate::evaluate_bdd(parameters, self, ctx, None)
    }

    /// Resolve an endpoint and report every condition tested on the way.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the reached outcome cannot be rendered.
    pub fn evaluate_detailed(
        &self,
        parameters: &[Parameter],
        ctx: &Context,
    ) -> Result<EvaluationReport, EvalError> {
        let start = Instant::now();
        let mut path = Vec::new();
        let resolution = crate::evaluate::evaluate_bdd(parameters, self, ctx, Some(&mut path))?;
        Ok(EvaluationReport::new(resolution, path, start.elapsed()))
    }

    /// Follow the diagram under a truth assignment indexed by level and
    /// return the reached result index.
    pub(crate) fn evaluate_assignment(&self, truth: &[bool]) -> Result<usize, StructuralError> {
        let mut current = self.root;
        for _ in 0..=self.nodes.len() {
            match current {
                NodeRef::Result(r) => return Ok(r as usize),
                NodeRef::Node(i) => {
                    let n = self.nodes.get(i as usize).ok_or_else(|| {
                        StructuralError::MalformedDiagram {
                            reason: format!("node {i} does not exist"),
                        }
                    })?;
                    let value = *truth.get(n.condition as usize).ok_or(
                        StructuralError::UnknownCondition {
                            index: n.condition as usize,
                        },
                    )?;
                    current = if value { n.high } else { n.low };
                }
            }
        }
        Err(StructuralError::MalformedDiagram {
            reason: "diagram contains a cycle".to_owned(),
        })
    }

    /// Reorder conditions to minimize the node count.
    ///
    /// # Errors
    ///
    /// Returns an error if this diagram does not belong to `cfg`.
    pub fn sift(
        &self,
        cfg: &Cfg,
        config: &SiftingConfig,
    ) -> Result<(Bdd, SiftingStats), EndpointBddError> {
        let mut diagram = Diagram::from_bdd(cfg, self)?;
        let stats = sift::sift(&mut diagram, cfg.dependencies(), config)?;
        Ok((diagram.to_bdd(cfg), stats))
    }

    /// Reorder conditions to minimize expected evaluation cost, allowing the
    /// node count to grow by at most the configured slack.
    ///
    /// # Errors
    ///
    /// Returns an error if this diagram does not belong to `cfg`.
    pub fn optimize_cost(
        &self,
        cfg: &Cfg,
        config: &CostConfig,
    ) -> Result<(Bdd, CostStats), EndpointBddError> {
        let mut diagram = Diagram::from_bdd(cfg, self)?;
        let stats = cost::optimize(&mut diagram, cfg, config)?;
        Ok((diagram.to_bdd(cfg), stats))
    }

    /// Expected evaluation cost under `model`, with every condition true
    /// half of the time.
    #[must_use]
    pub fn expected_cost(&self, model: &CostModel) -> f64 {
        let costs: Vec<f64> = self
            .conditions
            .iter()
            .map(|c| model.condition_cost(c))
            .collect();
        let mut reach = vec![0.0; self.nodes.len()];
        if let NodeRef::Node(root) = self.root {
            reach[root as usize] = 1.0;
        }
        // Parents sit at strictly earlier levels than their children.
        let mut by_level: Vec<usize> = (0..self.nodes.len()).collect();
        by_level.sort_by_key(|&i| self.nodes[i].condition);
        let mut total = 0.0;
        for i in by_level {
            let n = self.nodes[i];
            total += reach[i] * costs[n.condition as usize];
            for child in [n.low, n.high] {
                if let NodeRef::Node(c) = child {
                    reach[c as usize] += reach[i] * 0.5;
                }
            }
        }
        total
    }
}

impl fmt::Display for Bdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conditions, {} results, {} nodes",
            self.conditions.len(),
            self.results.len(),
            self.nodes.len()
        )
    }
}
