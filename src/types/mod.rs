mod artifact;
mod condition;
mod context;
mod endpoint;
mod error;
mod evaluation_report;
mod expr;
mod parameter;
mod report;
mod resolution;
mod rule;
mod ruleset;
mod template;
mod test_case;
mod value;

pub use artifact::Artifact;
pub use condition::Condition;
pub use context::Context;
pub use endpoint::{Endpoint, Outcome};
pub use error::{EquivalenceFailure, EvalError, OrderingViolation, StructuralError};
pub use evaluation_report::EvaluationReport;
pub use expr::{
    boolean_equals, coalesce, get_attr, is_set, is_valid_host_label, lit, not, parse_url,
    reference, string_equals, substring, uri_encode, Expr, Function, Literal,
};
pub use parameter::{Parameter, ParameterType};
pub use report::{Stage, Warning};
pub use resolution::{Resolution, ResolvedEndpoint};
pub use rule::{Rule, RuleKind};
pub use ruleset::{RuleSet, RuleSetBuilder};
pub use template::Template;
pub(crate) use template::{AttrPath, PathSegment, TemplatePart};
pub use test_case::TestCase;
pub(crate) use value::truthy;
pub use value::Value;
