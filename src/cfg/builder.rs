use std::collections::HashSet;

use log::debug;

use super::{Cfg, CfgNode, CfgRef};
use crate::pool::Pool;
use crate::types::{
    Condition, Expr, Function, Literal, Outcome, Parameter, ParameterType, Rule, RuleKind,
    StructuralError, Value,
};

/// Flattens a binding-unique rule tree into a hash-consed CFG.
pub(crate) struct CfgBuilder {
    conditions: Pool<Condition>,
    results: Pool<Outcome>,
    nodes: Pool<CfgNode>,
    /// Boolean parameters with a default; never unset at evaluation.
    defaulted: HashSet<String>,
}

impl CfgBuilder {
    pub(crate) fn new() -> Self {
        let mut results = Pool::new();
        results.intern(Outcome::NoMatch);
        Self {
            conditions: Pool::new(),
            results,
            nodes: Pool::new(),
            defaulted: HashSet::new(),
        }
    }

    pub(crate) fn build(
        mut self,
        rules: &[Rule],
        parameters: Vec<Parameter>,
    ) -> Result<Cfg, StructuralError> {
        self.defaulted = parameters
            .iter()
            .filter(|p| {
                p.ty() == ParameterType::Boolean && matches!(p.default_value(), Some(Value::Bool(_)))
            })
            .map(|p| p.name().to_owned())
            .collect();
        let root = self.chain(rules, CfgRef::Result(0));
        let (conditions, results, nodes, root) = self.renumber(root);
        debug!(
            "built CFG: {} conditions, {} results, {} nodes",
            conditions.len(),
            results.len(),
            nodes.len()
        );
        Cfg::from_parts(parameters, conditions, results, nodes, root)
    }

    /// Lower a list of alternatives. Built back to front: each rule falls
    /// through to the one after it, the last to `fallthrough`.
    fn chain(&mut self, rules: &[Rule], fallthrough: CfgRef) -> CfgRef {
        let mut next = fallthrough;
        for rule in rules.iter().rev() {
            next = self.rule(rule, next);
        }
        next
    }

    fn rule(&mut self, rule: &Rule, next: CfgRef) -> CfgRef {
        let mut body = match &rule.kind {
            RuleKind::Tree(children) => self.chain(children, next),
            RuleKind::Endpoint(endpoint) => {
                CfgRef::Result(self.results.intern(Outcome::Endpoint(endpoint.clone())))
            }
            RuleKind::Error(message) => {
                CfgRef::Result(self.results.intern(Outcome::Error(message.clone())))
            }
        };
        for condition in rule.conditions.iter().rev() {
            body = self.node(condition, body, next);
        }
        body
    }

    fn node(&mut self, condition: &Condition, high: CfgRef, low: CfgRef) -> CfgRef {
        if high == low {
            return high;
        }
        let (condition, negated) = canonicalize(condition, &self.defaulted);
        let node = CfgNode {
            condition: self.conditions.intern(condition),
            negated,
            high,
            low,
        };
        CfgRef::Node(self.nodes.intern(node))
    }

    /// Renumber reachable conditions and results in depth-first pre-order,
    /// true branch first, and emit nodes children-first. `NoMatch` keeps
    /// result index 0.
    fn renumber(&self, root: CfgRef) -> (Vec<Condition>, Vec<Outcome>, Vec<CfgNode>, CfgRef) {
        let old_nodes = self.nodes.items();
        let mut condition_map = vec![None; self.conditions.len()];
        let mut result_map = vec![None; self.results.len()];
        let mut node_map = vec![None; old_nodes.len()];
        let mut visited = vec![false; old_nodes.len()];

        let mut conditions = Vec::new();
        let mut results = vec![Outcome::NoMatch];
        result_map[0] = Some(0);
        let mut nodes = Vec::new();

        let mut stack = vec![(root, false)];
        while let Some((current, expanded)) = stack.pop() {
            match current {
                CfgRef::Result(r) => {
                    if result_map[r].is_none() {
                        result_map[r] = Some(results.len());
                        results.push(self.results.items()[r].clone());
                    }
                }
                CfgRef::Node(n) if !expanded => {
                    if std::mem::replace(&mut visited[n], true) {
                        continue;
                    }
                    let node = old_nodes[n];
                    if condition_map[node.condition].is_none() {
                        condition_map[node.condition] = Some(conditions.len());
                        conditions.push(self.conditions.items()[node.condition].clone());
                    }
                    stack.push((current, true));
                    stack.push((node.low, false));
                    stack.push((node.high, false));
                }
                CfgRef::Node(n) => {
                    let node = old_nodes[n];
                    node_map[n] = Some(nodes.len());
                    nodes.push(CfgNode {
                        condition: condition_map[node.condition].unwrap_or_default(),
                        negated: node.negated,
                        high: remap(node.high, &node_map, &result_map),
                        low: remap(node.low, &node_map, &result_map),
                    });
                }
            }
        }

        let root = remap(root, &node_map, &result_map);
        (conditions, results, nodes, root)
    }
}

fn remap(r: CfgRef, node_map: &[Option<usize>], result_map: &[Option<usize>]) -> CfgRef {
    match r {
        CfgRef::Node(n) => CfgRef::Node(node_map[n].unwrap_or_default()),
        CfgRef::Result(i) => CfgRef::Result(result_map[i].unwrap_or_default()),
    }
}

/// Strip `not` around boolean-valued calls so both polarities share one
/// condition, and rewrite `booleanEquals(P, false)` on a defaulted boolean
/// parameter to the negation of `booleanEquals(P, true)`. Conditions that
/// bind a name are kept as written.
fn canonicalize(condition: &Condition, defaulted: &HashSet<String>) -> (Condition, bool) {
    if condition.assign.is_some() {
        return (condition.clone(), false);
    }
    let mut expr = &condition.expr;
    let mut negated = false;
    loop {
        let Expr::Call {
            function: Function::Not,
            args,
        } = expr
        else {
            break;
        };
        let [inner] = args.as_slice() else {
            break;
        };
        match inner {
            Expr::Call { function, .. } if function.returns_bool() => {
                expr = inner;
                negated = !negated;
            }
            _ => break,
        }
    }
    if let Expr::Call {
        function: Function::BooleanEquals,
        args,
    } = expr
    {
        if let [Expr::Reference(name), Expr::Literal(Literal::Bool(false))] = args.as_slice() {
            if defaulted.contains(name) {
                let flipped = Expr::Call {
                    function: Function::BooleanEquals,
                    args: vec![
                        Expr::Reference(name.clone()),
                        Expr::Literal(Literal::Bool(true)),
                    ],
                };
                return (Condition::new(flipped), !negated);
            }
        }
    }
    (Condition::new(expr.clone()), negated)
}
