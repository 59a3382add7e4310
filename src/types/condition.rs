use std::fmt;

use super::expr::Expr;

/// A predicate tested by a rule, optionally binding its value to a name.
///
/// Identity is structural: two conditions with the same expression and the
/// same binding name are the same condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub struct Condition {
    pub(crate) expr: Expr,
    pub(crate) assign: Option<String>,
}

impl Condition {
    #[must_use]
    pub fn new(expr: Expr) -> Self {
        Self { expr, assign: None }
    }

    /// Bind the condition's value to `name` when it is truthy.
    #[must_use]
    pub fn assign(mut self, name: &str) -> Self {
        self.assign = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The bound variable name, if any.
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        self.assign.as_deref()
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Self::new(expr)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assign {
            Some(name) => write!(f, "{name} = {}", self.expr),
            None => write!(f, "{}", self.expr),
        }
    }
}
