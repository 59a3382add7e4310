use thiserror::Error;

use crate::parse::ParseError;
use crate::types::{EquivalenceFailure, EvalError, OrderingViolation, StructuralError};

/// Unified error type for building, compiling, evaluating and persisting
/// decision diagrams.
///
/// Returned by [`RuleSet::compile()`](crate::RuleSet::compile) and the
/// diagram transformations on [`Bdd`](crate::Bdd).
#[derive(Debug, Error)]
pub enum EndpointBddError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Ordering(#[from] OrderingViolation),

    #[error(transparent)]
    Equivalence(#[from] EquivalenceFailure),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "artifact")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "artifact")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
