use super::condition::Condition;
use super::endpoint::Endpoint;
use super::expr::Expr;

/// A node of the rule tree: a list of conditions guarding a nested rule
/// list, an endpoint or an error.
///
/// When any condition fails, evaluation moves on to the next sibling. A
/// nested rule list whose rules all fail falls through to the parent's next
/// sibling as well.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) kind: RuleKind,
    pub(crate) documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Tree(Vec<Rule>),
    Endpoint(Endpoint),
    Error(Expr),
}

impl Rule {
    fn new(kind: RuleKind) -> Self {
        Self {
            conditions: Vec::new(),
            kind,
            documentation: None,
        }
    }

    #[must_use]
    pub fn tree(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self::new(RuleKind::Tree(rules.into_iter().collect()))
    }

    #[must_use]
    pub fn endpoint(endpoint: Endpoint) -> Self {
        Self::new(RuleKind::Endpoint(endpoint))
    }

    #[must_use]
    pub fn error(message: impl Into<Expr>) -> Self {
        Self::new(RuleKind::Error(message.into()))
    }

    /// Append a guarding condition. Conditions are tested in order.
    #[must_use]
    pub fn when(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    #[must_use]
    pub fn documented(mut self, documentation: &str) -> Self {
        self.documentation = Some(documentation.to_owned());
        self
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    #[must_use]
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_set, reference};

    #[test]
    fn builder_collects_conditions_in_order() {
        let rule = Rule::error("no region")
            .when(is_set(reference("Region")))
            .when(Condition::new(reference("UseFIPS")))
            .documented("fallback");
        assert_eq!(rule.conditions().len(), 2);
        assert_eq!(rule.conditions()[1].expr(), &reference("UseFIPS"));
        assert_eq!(rule.documentation(), Some("fallback"));
        assert!(matches!(rule.kind(), RuleKind::Error(_)));
    }

    #[test]
    fn tree_holds_children() {
        let rule = Rule::tree([
            Rule::endpoint(Endpoint::new("https://a.example.com")),
            Rule::error("unreachable"),
        ]);
        match rule.kind() {
            RuleKind::Tree(children) => assert_eq!(children.len(), 2),
            other => panic!("expected tree, got {other:?}"),
        }
    }
}
