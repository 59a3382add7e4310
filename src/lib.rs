//! Compiles endpoint rule trees into reduced ordered binary decision
//! diagrams.
//!
//! A [`RuleSet`] is an ordered tree of rules whose conditions are tested
//! against caller parameters. Compilation lowers it to a control-flow graph
//! ([`Cfg`]), builds a [`Bdd`] over the distinct conditions, and reorders the
//! conditions twice: first to minimize node count, then to minimize the
//! expected cost of an evaluation. Every stage is checked against the rule
//! tree by an [`EquivalenceHarness`] before it is accepted.
//!
//! ```
//! use endpoint_bdd::{
//!     is_set, reference, string_equals, CompileOptions, Context, Endpoint, Parameter,
//!     ResolvedEndpoint, Rule, RuleSetBuilder, TestCase,
//! };
//!
//! let ruleset = RuleSetBuilder::new()
//!     .parameter(Parameter::string("Region"))
//!     .rule(
//!         Rule::endpoint(Endpoint::new("https://global.example.com"))
//!             .when(string_equals(reference("Region"), "aws-global")),
//!     )
//!     .rule(
//!         Rule::endpoint(Endpoint::new("https://{Region}.example.com"))
//!             .when(is_set(reference("Region"))),
//!     )
//!     .rule(Rule::error("Region must be set"))
//!     .build()?;
//!
//! let tests = [TestCase::new("regional")
//!     .param("Region", "us-east-1")
//!     .expect_endpoint(ResolvedEndpoint::new("https://us-east-1.example.com"))];
//! let compiled = ruleset.compile(&tests, &CompileOptions::default())?;
//!
//! let resolved = compiled.evaluate(&Context::new().set("Region", "eu-west-1"))?;
//! assert_eq!(resolved.endpoint().unwrap().url(), "https://eu-west-1.example.com");
//! # Ok::<(), endpoint_bdd::EndpointBddError>(())
//! ```

mod bdd;
mod cfg;
mod compile;
mod error;
mod evaluate;
mod harness;
mod parse;
mod pool;
#[cfg(feature = "artifact")]
mod serial;
mod types;

pub use bdd::{
    Bdd, BddNode, CostConfig, CostModel, CostStats, NodeRef, SiftingConfig, SiftingStats,
};
pub use cfg::{Cfg, ConditionOrder, DependencyGraph};
pub use compile::{compile_all, Compilation, CompileOptions, CompileReport};
pub use error::EndpointBddError;
pub use harness::{CoverageConfig, EquivalenceHarness};
pub use parse::ParseError;
#[cfg(feature = "artifact")]
pub use serial::{DeserializeError, SerializeError};
pub use types::{
    boolean_equals, coalesce, get_attr, is_set, is_valid_host_label, lit, not, parse_url,
    reference, string_equals, substring, uri_encode, Artifact, Condition, Context, Endpoint,
    EquivalenceFailure, EvalError, EvaluationReport, Expr, Function, Literal, OrderingViolation,
    Outcome, Parameter, ParameterType, Resolution, ResolvedEndpoint, Rule, RuleKind, RuleSet,
    RuleSetBuilder, Stage, StructuralError, Template, TestCase, Value, Warning,
};
