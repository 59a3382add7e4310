use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::sift::sift_one;
use super::{Diagram, NodeRef};
use crate::cfg::Cfg;
use crate::types::{Condition, Function, OrderingViolation};

/// Static evaluation cost of conditions, by the functions they call.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    weights: BTreeMap<Function, f64>,
    uniform: bool,
}

impl Default for CostModel {
    fn default() -> Self {
        let weights = [
            (Function::Not, 2.0),
            (Function::IsSet, 8.0),
            (Function::BooleanEquals, 10.0),
            (Function::Coalesce, 10.0),
            (Function::StringEquals, 20.0),
            (Function::GetAttr, 25.0),
            (Function::Substring, 60.0),
            (Function::UriEncode, 70.0),
            (Function::IsValidHostLabel, 80.0),
            (Function::ParseUrl, 200.0),
        ];
        Self {
            weights: weights.into_iter().collect(),
            uniform: false,
        }
    }
}

impl CostModel {
    /// Every condition costs 1.
    #[must_use]
    pub fn uniform() -> Self {
        Self {
            weights: BTreeMap::new(),
            uniform: true,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, function: Function, weight: f64) -> Self {
        self.weights.insert(function, weight);
        self.uniform = false;
        self
    }

    #[must_use]
    pub fn weight(&self, function: Function) -> f64 {
        self.weights.get(&function).copied().unwrap_or(1.0)
    }

    /// Sum of the weights of every call in the condition; 1 for a condition
    /// without calls.
    #[must_use]
    pub fn condition_cost(&self, condition: &Condition) -> f64 {
        if self.uniform {
            return 1.0;
        }
        let calls = condition.expr.calls();
        if calls.is_empty() {
            return 1.0;
        }
        calls.into_iter().map(|f| self.weight(f)).sum()
    }
}

/// Probability that a condition holds, for reach propagation.
pub type TrueProbability = Arc<dyn Fn(&Condition) -> f64 + Send + Sync>;

/// Settings for the cost pass.
#[derive(Clone)]
pub struct CostConfig {
    pub model: CostModel,
    /// Allowed node growth over the input, as a fraction.
    pub slack: f64,
    pub max_rounds: usize,
    pub time_budget: Option<Duration>,
    /// Defaults to 0.5 for every condition.
    pub true_probability: Option<TrueProbability>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            model: CostModel::default(),
            slack: 0.1,
            max_rounds: 30,
            time_budget: None,
            true_probability: None,
        }
    }
}

impl fmt::Debug for CostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostConfig")
            .field("model", &self.model)
            .field("slack", &self.slack)
            .field("max_rounds", &self.max_rounds)
            .field("time_budget", &self.time_budget)
            .field("true_probability", &self.true_probability.is_some())
            .finish()
    }
}

impl CostConfig {
    #[must_use]
    pub fn with_model(mut self, model: CostModel) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_slack(mut self, slack: f64) -> Self {
        self.slack = slack;
        self
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    #[must_use]
    pub fn with_true_probability(
        mut self,
        probability: impl Fn(&Condition) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.true_probability = Some(Arc::new(probability));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostStats {
    pub initial_cost: f64,
    pub final_cost: f64,
    pub initial_nodes: usize,
    pub final_nodes: usize,
    pub node_limit: usize,
    pub rounds: usize,
    pub budget_exhausted: bool,
}

/// Candidate score: expected cost first, node count second.
///
/// Costs are summed in an order fixed by the diagram's shape, so equal
/// diagrams score bit-identically and raw floats compare safely.
#[derive(Debug, Clone, Copy)]
struct CostScore {
    cost: f64,
    nodes: usize,
}

impl PartialEq for CostScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for CostScore {}

impl PartialOrd for CostScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CostScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.nodes.cmp(&other.nodes))
    }
}

/// Per-condition inputs to the expected-cost computation, indexed by CFG
/// condition.
struct Weights {
    cost: Vec<f64>,
    probability: Vec<f64>,
}

impl Weights {
    fn new(cfg: &Cfg, config: &CostConfig) -> Self {
        let cost = cfg
            .conditions
            .iter()
            .map(|c| config.model.condition_cost(c))
            .collect();
        let probability = cfg
            .conditions
            .iter()
            .map(|c| {
                config
                    .true_probability
                    .as_ref()
                    .map_or(0.5, |p| p(c).clamp(0.0, 1.0))
            })
            .collect();
        Self { cost, probability }
    }

    /// Reach of every node, indexed by node id, propagated from the root
    /// over `ids` in topological order.
    fn reach(&self, diagram: &Diagram, ids: &[u32]) -> Vec<f64> {
        let mut reach = vec![0.0; diagram.slots()];
        let NodeRef::Node(root) = diagram.root() else {
            return reach;
        };
        reach[root as usize] = 1.0;
        for &id in ids {
            let n = diagram.node(id);
            let from = reach[id as usize];
            let p = self.probability[n.condition as usize];
            if let NodeRef::Node(h) = n.high {
                reach[h as usize] += from * p;
            }
            if let NodeRef::Node(l) = n.low {
                reach[l as usize] += from * (1.0 - p);
            }
        }
        reach
    }

    fn expected_cost(&self, diagram: &Diagram) -> f64 {
        let ids = diagram.topological();
        let reach = self.reach(diagram, &ids);
        ids.iter()
            .map(|&id| reach[id as usize] * self.cost[diagram.node(id).condition as usize])
            .sum()
    }

    /// Conditions in visiting order: hottest level first, then by level.
    fn schedule(&self, diagram: &Diagram) -> Vec<usize> {
        let ids = diagram.topological();
        let reach = self.reach(diagram, &ids);
        let mut heat = vec![0.0_f64; diagram.len()];
        for &id in &ids {
            let var = diagram.node(id).condition as usize;
            heat[diagram.level_of(var)] += reach[id as usize] * self.cost[var];
        }
        let mut levels: Vec<usize> = (0..diagram.len()).collect();
        levels.sort_by(|&a, &b| heat[b].total_cmp(&heat[a]).then(a.cmp(&b)));
        levels.into_iter().map(|l| diagram.var_at(l)).collect()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn node_limit(baseline: usize, slack: f64) -> usize {
    (baseline as f64 * (1.0 + slack.max(0.0))).floor() as usize
}

/// Reorder to minimize expected cost while keeping the node count within
/// `floor(initial_nodes * (1 + slack))`. Expected cost never increases.
pub(super) fn optimize(
    diagram: &mut Diagram,
    cfg: &Cfg,
    config: &CostConfig,
) -> Result<CostStats, OrderingViolation> {
    let started = Instant::now();
    let weights = Weights::new(cfg, config);
    let deps = cfg.dependencies();
    let limit = node_limit(diagram.node_count(), config.slack);
    let score = |d: &Diagram| {
        let nodes = d.node_count();
        (nodes <= limit).then(|| CostScore {
            cost: weights.expected_cost(d),
            nodes,
        })
    };

    let mut stats = CostStats {
        initial_cost: weights.expected_cost(diagram),
        initial_nodes: diagram.node_count(),
        node_limit: limit,
        ..CostStats::default()
    };
    let mut swaps = 0;

    'rounds: while stats.rounds < config.max_rounds {
        let before = score(diagram);
        stats.rounds += 1;
        for var in weights.schedule(diagram) {
            if config.time_budget.is_some_and(|b| started.elapsed() >= b) {
                stats.budget_exhausted = true;
                break 'rounds;
            }
            if sift_one(diagram, deps, var, score, &mut swaps)? {
                debug!(
                    "moved condition {var} to level {}: expected cost {:.3}, {} nodes",
                    diagram.level_of(var),
                    weights.expected_cost(diagram),
                    diagram.node_count()
                );
            }
        }
        if score(diagram) >= before {
            break;
        }
    }

    stats.final_cost = weights.expected_cost(diagram);
    stats.final_nodes = diagram.node_count();
    if stats.budget_exhausted {
        warn!(
            "cost optimization stopped after {:?} time budget, {} rounds",
            config.time_budget.unwrap_or_default(),
            stats.rounds
        );
    }
    info!(
        "cost: {:.3} -> {:.3} expected, {} -> {} nodes (limit {}) in {} rounds",
        stats.initial_cost,
        stats.final_cost,
        stats.initial_nodes,
        stats.final_nodes,
        stats.node_limit,
        stats.rounds
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::Bdd;
    use crate::types::{
        boolean_equals, is_set, is_valid_host_label, parse_url, reference, string_equals,
        Endpoint, Parameter, Rule, RuleSetBuilder,
    };
    use test_log::test;

    #[test]
    fn default_weights() {
        let model = CostModel::default();
        assert_eq!(model.weight(Function::ParseUrl), 200.0);
        assert_eq!(model.weight(Function::Not), 2.0);
        let cond = Condition::new(string_equals(reference("Region"), "aws-global"));
        assert_eq!(model.condition_cost(&cond), 20.0);
        let nested = Condition::new(is_set(parse_url(reference("Endpoint"))));
        assert_eq!(model.condition_cost(&nested), 208.0);
    }

    #[test]
    fn uniform_and_overrides() {
        let cond = Condition::new(parse_url(reference("Endpoint"))).assign("url");
        assert_eq!(CostModel::uniform().condition_cost(&cond), 1.0);
        let model = CostModel::default().with_weight(Function::ParseUrl, 5.0);
        assert_eq!(model.condition_cost(&cond), 5.0);
        assert_eq!(
            CostModel::default().condition_cost(&Condition::new(reference("UseFIPS"))),
            1.0
        );
    }

    #[test]
    fn node_limit_rounds_down() {
        assert_eq!(node_limit(10, 0.1), 11);
        assert_eq!(node_limit(9, 0.1), 9);
        assert_eq!(node_limit(4, 0.0), 4);
    }

    /// `isValidHostLabel(Bucket) and UseFIPS`, expensive test first.
    fn expensive_first() -> Cfg {
        RuleSetBuilder::new()
            .parameter(Parameter::string("Bucket"))
            .parameter(Parameter::boolean("UseFIPS"))
            .rule(
                Rule::endpoint(Endpoint::new("https://{Bucket}.fips.example.com"))
                    .when(is_valid_host_label(reference("Bucket"), false))
                    .when(boolean_equals(reference("UseFIPS"), true)),
            )
            .rule(Rule::error("unsupported"))
            .build()
            .unwrap()
            .cfg()
            .unwrap()
    }

    #[test]
    fn cheap_condition_moves_first() {
        let cfg = expensive_first();
        let bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        let (optimized, stats) = bdd.optimize_cost(&cfg, &CostConfig::default()).unwrap();
        assert_eq!(
            optimized.conditions()[0].expr(),
            &boolean_equals(reference("UseFIPS"), true)
        );
        assert!((stats.initial_cost - 85.0).abs() < 1e-9);
        assert!((stats.final_cost - 50.0).abs() < 1e-9);
        assert_eq!(stats.final_nodes, 2);
        assert!(stats.final_nodes <= stats.node_limit);
    }

    #[test]
    fn probability_hint_changes_nothing_when_already_cheap_first() {
        let cfg = expensive_first();
        let order = crate::cfg::ConditionOrder::new(vec![1, 0], cfg.dependencies()).unwrap();
        let bdd = Bdd::build(&cfg, &order).unwrap();
        let config = CostConfig::default().with_true_probability(|_| 0.9);
        let (optimized, stats) = bdd.optimize_cost(&cfg, &config).unwrap();
        assert_eq!(optimized, bdd);
        assert!(stats.final_cost <= stats.initial_cost);
    }

    #[test]
    fn positions_over_the_node_limit_are_skipped() {
        // c0 ? A : (c1 ? B : C) has 2 nodes with c0 on top and 3 below.
        let cfg = RuleSetBuilder::new()
            .parameter(Parameter::string("Region"))
            .parameter(Parameter::boolean("UseFIPS"))
            .rule(Rule::endpoint(Endpoint::new("https://a")).when(is_set(reference("Region"))))
            .rule(
                Rule::endpoint(Endpoint::new("https://b"))
                    .when(boolean_equals(reference("UseFIPS"), true)),
            )
            .rule(Rule::error("unsupported"))
            .build()
            .unwrap()
            .cfg()
            .unwrap();
        let bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        assert_eq!(bdd.node_count(), 2);

        // A score that favours larger diagrams, capped at `limit` nodes.
        fn grow(limit: usize) -> impl FnMut(&Diagram) -> Option<std::cmp::Reverse<usize>> {
            move |d| {
                let nodes = d.node_count();
                (nodes <= limit).then_some(std::cmp::Reverse(nodes))
            }
        }
        let mut swaps = 0;
        let mut diagram = Diagram::from_bdd(&cfg, &bdd).unwrap();
        assert!(!sift_one(&mut diagram, cfg.dependencies(), 0, grow(2), &mut swaps).unwrap());
        assert_eq!(diagram.node_count(), 2);
        assert!(sift_one(&mut diagram, cfg.dependencies(), 0, grow(3), &mut swaps).unwrap());
        assert_eq!(diagram.node_count(), 3);
        assert_eq!(diagram.level_of(0), 1);
    }

    #[test]
    fn zero_budget_keeps_input() {
        let cfg = expensive_first();
        let bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        let config = CostConfig::default().with_time_budget(Duration::ZERO);
        let (optimized, stats) = bdd.optimize_cost(&cfg, &config).unwrap();
        assert!(stats.budget_exhausted);
        assert_eq!(optimized, bdd);
    }

    #[test]
    fn scores_compare_exact_costs_before_nodes() {
        let cheaper = CostScore {
            cost: 1.0,
            nodes: 5,
        };
        let barely_dearer = CostScore {
            cost: 1.0 + 4e-7,
            nodes: 1,
        };
        assert!(cheaper < barely_dearer);
        let fewer = CostScore {
            cost: 1.0,
            nodes: 4,
        };
        assert!(fewer < cheaper);
    }

    #[test]
    fn equal_diagrams_score_identically() {
        let cfg = expensive_first();
        let bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        let config = CostConfig::default().with_true_probability(|_| 0.3);
        let weights = Weights::new(&cfg, &config);
        let mut diagram = Diagram::from_bdd(&cfg, &bdd).unwrap();
        let before = weights.expected_cost(&diagram);
        diagram.swap(0, cfg.dependencies()).unwrap();
        diagram.swap(0, cfg.dependencies()).unwrap();
        assert_eq!(weights.expected_cost(&diagram).to_bits(), before.to_bits());
    }

    #[test]
    fn skewed_probabilities_never_raise_cost() {
        let cfg = expensive_first();
        let bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        for p in [0.01, 0.3, 0.77, 0.999] {
            let config = CostConfig::default().with_true_probability(move |_| p);
            let (_, stats) = bdd.optimize_cost(&cfg, &config).unwrap();
            assert!(stats.final_cost <= stats.initial_cost, "p = {p}");
        }
    }

    #[test]
    fn config_debug_hides_closure() {
        let config = CostConfig::default().with_true_probability(|_| 0.2);
        assert!(format!("{config:?}").contains("true_probability: true"));
    }
}
