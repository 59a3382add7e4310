use thiserror::Error;

use super::report::Stage;

/// Fatal problems with the rule set, its tests or a decision structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("unbound reference '{name}' at {location}")]
    UnboundReference { location: String, name: String },

    #[error("binding cycle detected: {}", path.join(" -> "))]
    BindingCycle { path: Vec<String> },

    #[error("binding '{name}' at {location} shadows a parameter")]
    ShadowedParameter { location: String, name: String },

    #[error("duplicate parameter '{name}'")]
    DuplicateParameter { name: String },

    #[error("default for parameter '{name}' must be {expected}, got {found}")]
    InvalidDefault {
        name: String,
        expected: String,
        found: String,
    },

    #[error("{function} at {location} takes {expected} arguments, got {found}")]
    InvalidArity {
        location: String,
        function: String,
        expected: String,
        found: usize,
    },

    #[error("invalid template {template} at {location}: {reason}")]
    InvalidTemplate {
        location: String,
        template: String,
        reason: String,
    },

    #[error("reference to unknown condition {index}")]
    UnknownCondition { index: usize },

    #[error("reference to unknown result {index}")]
    UnknownResult { index: usize },

    #[error("test '{test}' binds unknown parameter '{parameter}'")]
    UnknownTestParameter { test: String, parameter: String },

    #[error("test '{test}' binds parameter '{parameter}' to a {found}, expected {expected}")]
    TestParameterType {
        test: String,
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("test '{test}' leaves required parameter '{parameter}' unset")]
    MissingTestParameter { test: String, parameter: String },

    #[error("malformed decision diagram: {reason}")]
    MalformedDiagram { reason: String },
}

/// A condition order that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingViolation {
    #[error("condition {condition} is ordered before its dependency {dependency}")]
    DependencyEdge { condition: usize, dependency: usize },

    #[error("ordering is not a permutation of {expected} conditions")]
    NotAPermutation { expected: usize },
}

/// A stage output that disagrees with the rule tree on a test case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} output fails test '{test}': expected {expected}, got {actual}")]
pub struct EquivalenceFailure {
    pub stage: Stage,
    pub test: String,
    pub expected: String,
    pub actual: String,
}

/// Failures while rendering an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("invalid template {template}: {reason}")]
    Template { template: String, reason: String },

    #[error("'{name}' is unset")]
    UnsetValue { name: String },

    #[error("invalid attribute path '{path}': {reason}")]
    AttrPath { path: String, reason: String },

    #[error("endpoint url must be a string, got {found}")]
    NonStringUrl { found: String },
}
