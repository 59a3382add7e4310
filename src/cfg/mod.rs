//! Control-flow graph lowering of the rule tree.
//!
//! The rule tree is first made binding-unique (`SsaTransform`), then
//! flattened into a hash-consed DAG of condition tests (`CfgBuilder`).
//! Conditions and results are numbered in depth-first pre-order (true branch
//! first); that numbering is the default condition order.

mod builder;
mod deps;
mod order;
mod ssa;

use std::collections::HashMap;

pub use deps::DependencyGraph;
pub use order::ConditionOrder;
pub(crate) use ssa::SsaTransform;

use crate::bdd::Bdd;
use crate::types::{Condition, OrderingViolation, Outcome, Parameter, RuleSet, StructuralError};

use builder::CfgBuilder;

/// Reference from a CFG node to a node or to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CfgRef {
    Node(usize),
    Result(usize),
}

/// A condition test. When `negated` is set the branches are taken on the
/// condition's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CfgNode {
    pub(crate) condition: usize,
    pub(crate) negated: bool,
    pub(crate) high: CfgRef,
    pub(crate) low: CfgRef,
}

/// The flattened rule tree: unique conditions, unique results and the DAG
/// that decides between them.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) results: Vec<Outcome>,
    pub(crate) nodes: Vec<CfgNode>,
    pub(crate) root: CfgRef,
    pub(crate) deps: DependencyGraph,
    index: HashMap<Condition, usize>,
}

impl Cfg {
    /// Lower a rule set.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError`] on scoping problems or binding cycles.
    pub fn build(ruleset: &RuleSet) -> Result<Self, StructuralError> {
        let rules = SsaTransform::new(&ruleset.parameters).run(&ruleset.rules)?;
        CfgBuilder::new().build(&rules, ruleset.parameters.clone())
    }

    pub(crate) fn from_parts(
        parameters: Vec<Parameter>,
        conditions: Vec<Condition>,
        results: Vec<Outcome>,
        nodes: Vec<CfgNode>,
        root: CfgRef,
    ) -> Result<Self, StructuralError> {
        let deps = DependencyGraph::new(&conditions)?;
        let index = conditions
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Ok(Self {
            parameters,
            conditions,
            results,
            nodes,
            root,
            deps,
            index,
        })
    }

    /// Conditions in discovery order, after binding renaming.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Results; index 0 is always [`Outcome::NoMatch`].
    #[must_use]
    pub fn results(&self) -> &[Outcome] {
        &self.results
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of decision nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.deps
    }

    /// Index of `condition` in [`conditions()`](Self::conditions).
    #[must_use]
    pub fn condition_index(&self, condition: &Condition) -> Option<usize> {
        self.index.get(condition).copied()
    }

    /// Discovery order, adjusted into a linear extension of the dependency
    /// relation.
    #[must_use]
    pub fn default_order(&self) -> ConditionOrder {
        let rank: Vec<usize> = (0..self.conditions.len()).collect();
        ConditionOrder::from_linear_extension(self.deps.topological_order(&rank))
    }

    /// The condition order used by `bdd`, expressed in this CFG's indices.
    ///
    /// # Errors
    ///
    /// Returns [`OrderingViolation`] if `bdd` tests conditions this CFG does
    /// not have, or orders them against a dependency.
    pub fn order_of(&self, bdd: &Bdd) -> Result<ConditionOrder, OrderingViolation> {
        let order = bdd
            .conditions()
            .iter()
            .map(|c| self.condition_index(c))
            .collect::<Option<Vec<_>>>()
            .ok_or(OrderingViolation::NotAPermutation {
                expected: self.conditions.len(),
            })?;
        ConditionOrder::new(order, &self.deps)
    }

    /// Follow the DAG under a truth assignment indexed by condition and
    /// return the reached result index.
    pub(crate) fn evaluate_assignment(&self, truth: &[bool]) -> Result<usize, StructuralError> {
        let mut current = self.root;
        for _ in 0..=self.nodes.len() {
            match current {
                CfgRef::Result(r) => return Ok(r),
                CfgRef::Node(i) => {
                    let node = self.nodes.get(i).ok_or_else(|| {
                        StructuralError::MalformedDiagram {
                            reason: format!("CFG node {i} does not exist"),
                        }
                    })?;
                    let value = *truth
                        .get(node.condition)
                        .ok_or(StructuralError::UnknownCondition {
                            index: node.condition,
                        })?;
                    current = if value != node.negated {
                        node.high
                    } else {
                        node.low
                    };
                }
            }
        }
        Err(StructuralError::MalformedDiagram {
            reason: "CFG contains a cycle".to_owned(),
        })
    }
}
