use std::collections::HashSet;
use std::time::Instant;

use super::context::Context;
use super::error::{EvalError, StructuralError};
use super::evaluation_report::EvaluationReport;
use super::parameter::Parameter;
use super::resolution::Resolution;
use super::rule::Rule;
use super::test_case::TestCase;
use crate::cfg::{Cfg, SsaTransform};
use crate::compile::{Compilation, CompileOptions};
use crate::EndpointBddError;

/// Builder for constructing a [`RuleSet`].
///
/// Parameters and top-level rules are collected in order and validated by
/// [`build()`](Self::build).
///
/// # Example
///
/// ```
/// use endpoint_bdd::{Endpoint, Parameter, Rule, RuleSetBuilder, is_set, reference};
///
/// let ruleset = RuleSetBuilder::new()
///     .parameter(Parameter::string("Region"))
///     .rule(
///         Rule::endpoint(Endpoint::new("https://{Region}.example.com"))
///             .when(is_set(reference("Region"))),
///     )
///     .rule(Rule::error("Region must be set"))
///     .build()
///     .unwrap();
/// assert_eq!(ruleset.parameters().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    parameters: Vec<Parameter>,
    rules: Vec<Rule>,
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Append a top-level rule. Rules are tried in the order they are added.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate the parameters and the rule tree's scoping.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError`] on duplicate parameters, ill-typed
    /// defaults, unbound references, shadowed parameters, wrong argument
    /// counts or malformed templates.
    pub fn build(self) -> Result<RuleSet, StructuralError> {
        check_parameters(&self.parameters)?;
        SsaTransform::new(&self.parameters).run(&self.rules)?;
        Ok(RuleSet {
            parameters: self.parameters,
            rules: self.rules,
        })
    }
}

fn check_parameters(parameters: &[Parameter]) -> Result<(), StructuralError> {
    let mut seen = HashSet::new();
    for parameter in parameters {
        if !seen.insert(parameter.name()) {
            return Err(StructuralError::DuplicateParameter {
                name: parameter.name().to_owned(),
            });
        }
        if let Some(default) = parameter.default_value() {
            if !parameter.ty().accepts(default) {
                return Err(StructuralError::InvalidDefault {
                    name: parameter.name().to_owned(),
                    expected: parameter.ty().to_string(),
                    found: default.type_name().to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// A validated rule tree with its parameter declarations. Immutable and
/// thread-safe.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) rules: Vec<Rule>,
}

impl RuleSet {
    /// Evaluate the rule tree directly against the given context.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the matched outcome cannot be rendered.
    pub fn evaluate(&self, ctx: &Context) -> Result<Resolution, EvalError> {
        crate::evaluate::evaluate_rules(&self.parameters, &self.rules, ctx, None)
    }

    /// Evaluate with the list of tested conditions and timing information.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the matched outcome cannot be rendered.
    pub fn evaluate_detailed(&self, ctx: &Context) -> Result<EvaluationReport, EvalError> {
        let start = Instant::now();
        let mut path = Vec::new();
        let resolution =
            crate::evaluate::evaluate_rules(&self.parameters, &self.rules, ctx, Some(&mut path))?;
        Ok(EvaluationReport::new(resolution, path, start.elapsed()))
    }

    /// Lower the rule tree into its control-flow graph.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError`] if the tree is malformed.
    pub fn cfg(&self) -> Result<Cfg, StructuralError> {
        Cfg::build(self)
    }

    /// Run the full pipeline: CFG, raw BDD, sifting and cost reordering, each
    /// stage gated by `tests`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointBddError`] on structural problems, when the raw
    /// diagram fails a test, or when a later stage fails one under
    /// [`CompileOptions::strict`].
    pub fn compile(
        &self,
        tests: &[TestCase],
        options: &CompileOptions,
    ) -> Result<Compilation, EndpointBddError> {
        crate::compile::compile(self, tests, options)
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a parameter declaration by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}
