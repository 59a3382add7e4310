use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::bdd::Bdd;
use crate::cfg::Cfg;
use crate::types::{
    EquivalenceFailure, Resolution, RuleSet, Stage, StructuralError, TestCase, Warning,
};

const CONDITION_SPACE: &str = "condition-space";

/// Bounds on the condition-space comparison.
///
/// Up to `exhaustive_limit` conditions every truth assignment is checked.
/// Beyond that the critical assignments are checked first, then seeded
/// pseudo-random ones. Both modes stop at `max_samples` assignments or
/// after `timeout`, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageConfig {
    pub exhaustive_limit: usize,
    pub max_samples: usize,
    pub timeout: Duration,
    /// Seed for sampled assignments. A fixed seed keeps failures reproducible.
    pub seed: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            exhaustive_limit: 20,
            max_samples: 1_000_000,
            timeout: Duration::from_secs(60),
            seed: 0x5eed_bdd0,
        }
    }
}

/// Gates each compilation stage on agreement with the rule tree.
///
/// Test cases are validated against the parameter declarations up front and
/// replayed against the rule tree once; only cases the tree itself passes are
/// used to gate diagrams.
#[derive(Debug)]
pub struct EquivalenceHarness<'a> {
    ruleset: &'a RuleSet,
    gating: Vec<&'a TestCase>,
    excluded: Vec<Warning>,
}

impl<'a> EquivalenceHarness<'a> {
    /// # Errors
    ///
    /// Returns [`StructuralError`] if a test binds an undeclared parameter,
    /// binds a value of the wrong type, or leaves a required parameter
    /// without a default unset.
    pub fn new(ruleset: &'a RuleSet, tests: &'a [TestCase]) -> Result<Self, StructuralError> {
        let mut gating = Vec::with_capacity(tests.len());
        let mut excluded = Vec::new();
        for test in tests {
            check_bindings(ruleset, test)?;
            match ruleset.evaluate(test.params()) {
                Ok(actual) if actual == *test.expected() => gating.push(test),
                outcome => {
                    let reason = match outcome {
                        Ok(actual) => format!("expected {}, got {actual}", test.expected()),
                        Err(e) => format!("rule tree evaluation failed: {e}"),
                    };
                    warn!("excluding test '{}': {reason}", test.id());
                    excluded.push(Warning::TestExcluded {
                        test: test.id().to_owned(),
                        reason,
                    });
                }
            }
        }
        debug!(
            "{} gating tests, {} excluded",
            gating.len(),
            excluded.len()
        );
        Ok(Self {
            ruleset,
            gating,
            excluded,
        })
    }

    /// Warnings for tests that fail against the rule tree itself.
    #[must_use]
    pub fn excluded(&self) -> &[Warning] {
        &self.excluded
    }

    /// Number of tests used for gating.
    #[must_use]
    pub fn gating_tests(&self) -> usize {
        self.gating.len()
    }

    /// Replay every gating test against `bdd`.
    ///
    /// # Errors
    ///
    /// Returns the first [`EquivalenceFailure`].
    pub fn check(&self, stage: Stage, bdd: &Bdd) -> Result<(), EquivalenceFailure> {
        for test in &self.gating {
            let actual = bdd.evaluate(&self.ruleset.parameters, test.params());
            if actual.as_ref() != Ok(test.expected()) {
                let failure = EquivalenceFailure {
                    stage,
                    test: test.id().to_owned(),
                    expected: test.expected().to_string(),
                    actual: describe(actual),
                };
                error!("{failure}");
                return Err(failure);
            }
        }
        Ok(())
    }

    /// Compare `bdd` with `cfg` over condition truth assignments, bounded
    /// by `coverage`.
    ///
    /// # Errors
    ///
    /// Returns an [`EquivalenceFailure`] with test id `condition-space` on
    /// the first disagreement.
    pub fn verify_condition_space(
        &self,
        cfg: &Cfg,
        bdd: &Bdd,
        stage: Stage,
        coverage: &CoverageConfig,
    ) -> Result<(), EquivalenceFailure> {
        let fail = |expected: String, actual: String| {
            let failure = EquivalenceFailure {
                stage,
                test: CONDITION_SPACE.to_owned(),
                expected,
                actual,
            };
            error!("{failure}");
            failure
        };
        let order = cfg
            .order_of(bdd)
            .map_err(|e| fail("a diagram over the same conditions".to_owned(), e.to_string()))?;

        let n = cfg.conditions().len();
        let mut by_level = vec![false; n];
        let mut compare = |truth: &[bool]| -> Result<(), EquivalenceFailure> {
            for (level, &condition) in order.as_slice().iter().enumerate() {
                by_level[level] = truth[condition];
            }
            let expected = cfg
                .evaluate_assignment(truth)
                .map_err(|e| fail("a CFG result".to_owned(), e.to_string()))?;
            let actual = bdd
                .evaluate_assignment(&by_level)
                .map_err(|e| fail(cfg.results()[expected].to_string(), e.to_string()))?;
            let (expected, actual) = (&cfg.results()[expected], &bdd.results()[actual]);
            if expected != actual {
                return Err(fail(expected.to_string(), actual.to_string()));
            }
            Ok(())
        };

        let started = Instant::now();
        let mut checked = 0_usize;
        let mut truth = vec![false; n];
        for mut assignment in assignments(n, coverage) {
            if checked >= coverage.max_samples || started.elapsed() >= coverage.timeout {
                info!(
                    "{stage}: condition space check stopped after {checked} assignments in {:?}",
                    started.elapsed()
                );
                break;
            }
            assignment.fill(&mut truth);
            compare(&truth)?;
            checked += 1;
        }
        debug!("{stage}: {checked} condition assignments agree");
        Ok(())
    }
}

fn describe(actual: Result<Resolution, crate::types::EvalError>) -> String {
    match actual {
        Ok(resolution) => resolution.to_string(),
        Err(e) => format!("evaluation error: {e}"),
    }
}

fn check_bindings(ruleset: &RuleSet, test: &TestCase) -> Result<(), StructuralError> {
    for (name, value) in test.params().iter() {
        let parameter =
            ruleset
                .parameter(name)
                .ok_or_else(|| StructuralError::UnknownTestParameter {
                    test: test.id().to_owned(),
                    parameter: name.to_owned(),
                })?;
        if !parameter.ty().accepts(value) {
            return Err(StructuralError::TestParameterType {
                test: test.id().to_owned(),
                parameter: name.to_owned(),
                expected: parameter.ty().to_string(),
                found: value.type_name().to_owned(),
            });
        }
    }
    for parameter in ruleset.parameters() {
        if parameter.is_required()
            && parameter.default_value().is_none()
            && test.params().get(parameter.name()).is_none()
        {
            return Err(StructuralError::MissingTestParameter {
                test: test.id().to_owned(),
                parameter: parameter.name().to_owned(),
            });
        }
    }
    Ok(())
}

/// One truth assignment, written into a buffer indexed by condition.
enum Assignment {
    Mask(u32),
    Uniform(bool),
    /// Every condition is `!value` except `index`.
    Single { index: usize, value: bool },
    /// Even conditions take `even`, odd ones the opposite.
    Alternating { even: bool },
    Sampled(u64),
}

impl Assignment {
    fn fill(&mut self, truth: &mut [bool]) {
        match *self {
            Assignment::Mask(bits) => {
                for (i, t) in truth.iter_mut().enumerate() {
                    *t = bits & (1 << i) != 0;
                }
            }
            Assignment::Uniform(value) => truth.fill(value),
            Assignment::Single { index, value } => {
                truth.fill(!value);
                truth[index] = value;
            }
            Assignment::Alternating { even } => {
                for (i, t) in truth.iter_mut().enumerate() {
                    *t = (i % 2 == 0) == even;
                }
            }
            Assignment::Sampled(ref mut state) => {
                for chunk in truth.chunks_mut(64) {
                    let bits = splitmix(state);
                    for (i, t) in chunk.iter_mut().enumerate() {
                        *t = bits & (1 << i) != 0;
                    }
                }
            }
        }
    }
}

/// Assignments to check for `n` conditions: every mask up to the
/// exhaustive limit, otherwise the critical ones followed by an endless
/// seeded stream. Callers bound the stream.
fn assignments(n: usize, coverage: &CoverageConfig) -> Box<dyn Iterator<Item = Assignment>> {
    if n <= coverage.exhaustive_limit.min(31) {
        return Box::new((0..1_u32 << n).map(Assignment::Mask));
    }
    let uniform = [false, true].into_iter().map(Assignment::Uniform);
    let one_hot = (0..n).map(|index| Assignment::Single { index, value: true });
    let one_cold = (0..n).map(|index| Assignment::Single { index, value: false });
    let alternating = [false, true]
        .into_iter()
        .map(|even| Assignment::Alternating { even });
    let mut state = coverage.seed;
    let sampled = std::iter::repeat_with(move || Assignment::Sampled(splitmix(&mut state)));
    Box::new(
        uniform
            .chain(one_hot)
            .chain(one_cold)
            .chain(alternating)
            .chain(sampled),
    )
}

/// SplitMix64 step.
fn splitmix(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::NodeRef;
    use crate::types::{
        is_set, reference, string_equals, Endpoint, Parameter, ResolvedEndpoint, Rule,
        RuleSetBuilder,
    };

    fn scenario_a() -> RuleSet {
        RuleSetBuilder::new()
            .parameter(Parameter::string("Region"))
            .parameter(Parameter::boolean("UseFIPS").with_default(false))
            .rule(
                Rule::endpoint(Endpoint::new("https://global.example.com"))
                    .when(string_equals(reference("Region"), "aws-global")),
            )
            .rule(
                Rule::endpoint(Endpoint::new("https://{Region}.example.com"))
                    .when(is_set(reference("Region"))),
            )
            .rule(Rule::error("Region must be set"))
            .build()
            .unwrap()
    }

    fn tests() -> Vec<TestCase> {
        vec![
            TestCase::new("global")
                .param("Region", "aws-global")
                .expect_endpoint(ResolvedEndpoint::new("https://global.example.com")),
            TestCase::new("regional")
                .param("Region", "us-east-1")
                .expect_endpoint(ResolvedEndpoint::new("https://us-east-1.example.com")),
            TestCase::new("unset").expect_error("Region must be set"),
        ]
    }

    #[test]
    fn passing_tests_gate() {
        let ruleset = scenario_a();
        let tests = tests();
        let harness = EquivalenceHarness::new(&ruleset, &tests).unwrap();
        assert_eq!(harness.gating_tests(), 3);
        assert!(harness.excluded().is_empty());

        let cfg = ruleset.cfg().unwrap();
        let bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        harness.check(Stage::Raw, &bdd).unwrap();
        harness
            .verify_condition_space(&cfg, &bdd, Stage::Raw, &CoverageConfig::default())
            .unwrap();
    }

    #[test]
    fn tree_failures_are_excluded() {
        let ruleset = scenario_a();
        let tests = vec![TestCase::new("wrong").expect_error("nope")];
        let harness = EquivalenceHarness::new(&ruleset, &tests).unwrap();
        assert_eq!(harness.gating_tests(), 0);
        assert!(matches!(
            &harness.excluded()[0],
            Warning::TestExcluded { test, .. } if test == "wrong"
        ));
    }

    #[test]
    fn binding_validation() {
        let ruleset = scenario_a();
        let unknown = vec![TestCase::new("t").param("Bucket", "b")];
        assert!(matches!(
            EquivalenceHarness::new(&ruleset, &unknown),
            Err(StructuralError::UnknownTestParameter { .. })
        ));
        let mistyped = vec![TestCase::new("t").param("UseFIPS", "yes")];
        assert_eq!(
            EquivalenceHarness::new(&ruleset, &mistyped).unwrap_err(),
            StructuralError::TestParameterType {
                test: "t".into(),
                parameter: "UseFIPS".into(),
                expected: "boolean".into(),
                found: "string".into(),
            }
        );
    }

    #[test]
    fn missing_required_parameter() {
        let ruleset = RuleSetBuilder::new()
            .parameter(Parameter::string("Region").required())
            .rule(Rule::error("x"))
            .build()
            .unwrap();
        let tests = vec![TestCase::new("t").expect_error("x")];
        assert!(matches!(
            EquivalenceHarness::new(&ruleset, &tests),
            Err(StructuralError::MissingTestParameter { .. })
        ));
    }

    #[test]
    fn tampered_diagram_is_caught() {
        let ruleset = scenario_a();
        let tests = tests();
        let harness = EquivalenceHarness::new(&ruleset, &tests).unwrap();
        let cfg = ruleset.cfg().unwrap();
        let mut bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        // Swap the two endpoints reached from the root.
        bdd.nodes[0].high = NodeRef::Result(2);

        let failure = harness.check(Stage::Sifting, &bdd).unwrap_err();
        assert_eq!(failure.stage, Stage::Sifting);
        assert_eq!(failure.test, "global");

        let failure = harness
            .verify_condition_space(&cfg, &bdd, Stage::Sifting, &CoverageConfig::default())
            .unwrap_err();
        assert_eq!(failure.test, "condition-space");
    }

    fn expand(n: usize, coverage: &CoverageConfig, take: usize) -> Vec<Vec<bool>> {
        assignments(n, coverage)
            .take(take)
            .map(|mut a| {
                let mut truth = vec![false; n];
                a.fill(&mut truth);
                truth
            })
            .collect()
    }

    #[test]
    fn exhaustive_up_to_twenty_conditions() {
        let coverage = CoverageConfig::default();
        assert_eq!(assignments(0, &coverage).count(), 1);
        assert_eq!(assignments(3, &coverage).count(), 8);
        assert_eq!(assignments(20, &coverage).take(1 << 21).count(), 1 << 20);
        let all = expand(3, &coverage, 8);
        assert_eq!(all[5], [true, false, true]);
    }

    #[test]
    fn critical_assignments_then_samples_above_the_limit() {
        let coverage = CoverageConfig::default();
        let n = 21;
        let critical = 2 + 2 * n + 2;
        let all = expand(n, &coverage, critical + 50);
        assert!(all[0].iter().all(|b| !b));
        assert!(all[1].iter().all(|b| *b));
        assert!(all[2][0] && all[2][1..].iter().all(|b| !b));
        assert!(!all[2 + n][0] && all[2 + n][1..].iter().all(|b| *b));
        let alternating = &all[critical - 2];
        assert!(alternating.iter().enumerate().all(|(i, b)| *b == (i % 2 == 1)));
        let alternating = &all[critical - 1];
        assert!(alternating.iter().enumerate().all(|(i, b)| *b == (i % 2 == 0)));

        let samples = &all[critical..];
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
        assert!(samples.iter().flatten().any(|b| *b));
        assert!(samples.iter().flatten().any(|b| !b));
    }

    #[test]
    fn samples_are_reproducible_per_seed() {
        let coverage = CoverageConfig {
            exhaustive_limit: 4,
            ..CoverageConfig::default()
        };
        let first = expand(70, &coverage, 200);
        assert_eq!(first, expand(70, &coverage, 200));
        let reseeded = CoverageConfig {
            seed: coverage.seed + 1,
            ..coverage.clone()
        };
        assert_ne!(first, expand(70, &reseeded, 200));
    }

    #[test]
    fn sample_cap_bounds_the_check() {
        let ruleset = scenario_a();
        let tests = tests();
        let harness = EquivalenceHarness::new(&ruleset, &tests).unwrap();
        let cfg = ruleset.cfg().unwrap();
        let mut bdd = Bdd::build(&cfg, &cfg.default_order()).unwrap();
        bdd.nodes[0].high = NodeRef::Result(2);

        // With no assignments allowed the tampered diagram slips through.
        let none = CoverageConfig {
            max_samples: 0,
            ..CoverageConfig::default()
        };
        assert!(harness
            .verify_condition_space(&cfg, &bdd, Stage::Cost, &none)
            .is_ok());
        let sampled_only = CoverageConfig {
            exhaustive_limit: 0,
            max_samples: 10_000,
            ..CoverageConfig::default()
        };
        assert!(harness
            .verify_condition_space(&cfg, &bdd, Stage::Cost, &sampled_only)
            .is_err());
    }
}
