use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::bdd::{Bdd, CostConfig, CostStats, SiftingConfig, SiftingStats};
use crate::cfg::Cfg;
use crate::error::EndpointBddError;
use crate::harness::{CoverageConfig, EquivalenceHarness};
use crate::types::{
    Artifact, Context, EvalError, Parameter, Resolution, RuleSet, Stage, TestCase, Warning,
};

/// Which optimization stages run, and how the output is gated.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// `None` skips sifting.
    pub sifting: Option<SiftingConfig>,
    /// `None` skips cost optimization.
    pub cost: Option<CostConfig>,
    /// Also compare each stage with the CFG over condition assignments.
    pub verify_condition_space: bool,
    /// Bounds on that comparison.
    pub coverage: CoverageConfig,
    /// Fail instead of falling back when a stage is rejected.
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            sifting: Some(SiftingConfig::default()),
            cost: Some(CostConfig::default()),
            verify_condition_space: true,
            coverage: CoverageConfig::default(),
            strict: false,
        }
    }
}

impl CompileOptions {
    /// Raw compilation only.
    #[must_use]
    pub fn unoptimized() -> Self {
        Self {
            sifting: None,
            cost: None,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sifting(mut self, config: Option<SiftingConfig>) -> Self {
        self.sifting = config;
        self
    }

    #[must_use]
    pub fn with_cost(mut self, config: Option<CostConfig>) -> Self {
        self.cost = config;
        self
    }

    #[must_use]
    pub fn with_condition_space_check(mut self, enabled: bool) -> Self {
        self.verify_condition_space = enabled;
        self
    }

    #[must_use]
    pub fn with_coverage(mut self, coverage: CoverageConfig) -> Self {
        self.coverage = coverage;
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// What happened during a compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileReport {
    pub raw_nodes: usize,
    pub sifting: Option<SiftingStats>,
    pub cost: Option<CostStats>,
    /// The last stage whose output was kept.
    pub final_stage: Stage,
    pub warnings: Vec<Warning>,
    pub duration: Duration,
}

/// A compiled rule set: the CFG, the accepted diagram and the report.
#[derive(Debug, Clone)]
pub struct Compilation {
    cfg: Cfg,
    bdd: Bdd,
    report: CompileReport,
    parameters: Vec<Parameter>,
}

impl Compilation {
    #[must_use]
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    #[must_use]
    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    #[must_use]
    pub fn report(&self) -> &CompileReport {
        &self.report
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// The portable result of the compilation.
    #[must_use]
    pub fn artifact(&self) -> Artifact {
        Artifact::new(self.parameters.clone(), self.bdd.clone())
    }

    /// Resolve an endpoint with the compiled diagram.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the reached outcome cannot be rendered.
    pub fn evaluate(&self, ctx: &Context) -> Result<Resolution, EvalError> {
        self.bdd.evaluate(&self.parameters, ctx)
    }
}

struct Pipeline<'a> {
    cfg: &'a Cfg,
    harness: &'a EquivalenceHarness<'a>,
    options: &'a CompileOptions,
    warnings: Vec<Warning>,
}

impl Pipeline<'_> {
    /// Gate a stage output. `Ok(None)` means it was rejected and the caller
    /// keeps its previous diagram.
    fn accept(
        &mut self,
        stage: Stage,
        output: Result<Bdd, EndpointBddError>,
    ) -> Result<Option<Bdd>, EndpointBddError> {
        let checked = output.and_then(|bdd| {
            self.harness.check(stage, &bdd)?;
            if self.options.verify_condition_space {
                self.harness
                    .verify_condition_space(self.cfg, &bdd, stage, &self.options.coverage)?;
            }
            Ok(bdd)
        });
        match checked {
            Ok(bdd) => Ok(Some(bdd)),
            Err(e) if self.options.strict => Err(e),
            Err(e) => {
                warn!("{stage} output rejected, keeping previous diagram: {e}");
                self.warnings.push(Warning::StageRejected {
                    stage,
                    reason: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    fn budget(&mut self, stage: Stage, exhausted: bool, limit: Option<Duration>, rounds: usize) {
        if exhausted {
            let detail = format!(
                "time budget of {:?} reached after {rounds} rounds",
                limit.unwrap_or_default()
            );
            self.warnings
                .push(Warning::ResourceBudgetExceeded { stage, detail });
        }
    }
}

/// Run every stage on `ruleset`, gating each on `tests`.
pub(crate) fn compile(
    ruleset: &RuleSet,
    tests: &[TestCase],
    options: &CompileOptions,
) -> Result<Compilation, EndpointBddError> {
    let started = Instant::now();
    let harness = EquivalenceHarness::new(ruleset, tests)?;
    let cfg = ruleset.cfg()?;

    let raw = Bdd::build(&cfg, &cfg.default_order())?;
    harness.check(Stage::Raw, &raw)?;
    if options.verify_condition_space {
        harness.verify_condition_space(&cfg, &raw, Stage::Raw, &options.coverage)?;
    }
    let raw_nodes = raw.node_count();
    info!("raw: {raw} ({} gating tests)", harness.gating_tests());

    let mut pipeline = Pipeline {
        cfg: &cfg,
        harness: &harness,
        options,
        warnings: harness.excluded().to_vec(),
    };
    let mut best = raw;
    let mut final_stage = Stage::Raw;

    let mut sifting = None;
    if let Some(config) = &options.sifting {
        let output = best.sift(&cfg, config).map(|(bdd, stats)| {
            pipeline.budget(
                Stage::Sifting,
                stats.budget_exhausted,
                config.time_budget,
                stats.passes,
            );
            sifting = Some(stats);
            bdd
        });
        if let Some(bdd) = pipeline.accept(Stage::Sifting, output)? {
            best = bdd;
            final_stage = Stage::Sifting;
        }
    }

    let mut cost = None;
    if let Some(config) = &options.cost {
        let output = best.optimize_cost(&cfg, config).map(|(bdd, stats)| {
            pipeline.budget(
                Stage::Cost,
                stats.budget_exhausted,
                config.time_budget,
                stats.rounds,
            );
            cost = Some(stats);
            bdd
        });
        if let Some(bdd) = pipeline.accept(Stage::Cost, output)? {
            best = bdd;
            final_stage = Stage::Cost;
        }
    }

    let report = CompileReport {
        raw_nodes,
        sifting,
        cost,
        final_stage,
        warnings: pipeline.warnings,
        duration: started.elapsed(),
    };
    info!(
        "compiled: {best}, final stage {final_stage}, {} warnings in {:?}",
        report.warnings.len(),
        report.duration
    );
    Ok(Compilation {
        parameters: ruleset.parameters.clone(),
        cfg,
        bdd: best,
        report,
    })
}

/// Compile independent rule sets in parallel, one thread each. Results come
/// back in input order.
pub fn compile_all(
    units: &[(RuleSet, Vec<TestCase>)],
    options: &CompileOptions,
) -> Vec<Result<Compilation, EndpointBddError>> {
    thread::scope(|scope| {
        let handles: Vec<_> = units
            .iter()
            .map(|(ruleset, tests)| scope.spawn(move || compile(ruleset, tests, options)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}
