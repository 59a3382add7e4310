use std::collections::{HashMap, HashSet};

use log::debug;

use crate::parse::{self, ParseError};
use crate::types::{
    Condition, Endpoint, Expr, Function, Literal, Parameter, Rule, RuleKind, StructuralError,
};

/// Scope checking and binding renaming.
///
/// Walks the rule tree top-down with a stack of scopes. Every reference must
/// resolve to an enclosing binding or a parameter. A name bound to different
/// expressions in different places is split into distinct names (`x`, `x_1`,
/// `x_2`, ... in first-seen order) so that a binding name identifies exactly
/// one expression. The converse also holds: an expression bound under several
/// names takes the first name it was bound to, and a binding an enclosing
/// rule already made is dropped.
pub(crate) struct SsaTransform<'a> {
    parameters: HashSet<&'a str>,
    taken: HashSet<String>,
    versions: HashMap<Expr, String>,
    scopes: Vec<HashMap<String, String>>,
}

impl<'a> SsaTransform<'a> {
    pub(crate) fn new(parameters: &'a [Parameter]) -> Self {
        Self {
            parameters: parameters.iter().map(Parameter::name).collect(),
            taken: parameters.iter().map(|p| p.name().to_owned()).collect(),
            versions: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    /// Check and rewrite `rules`, returning the renamed tree.
    pub(crate) fn run(mut self, rules: &[Rule]) -> Result<Vec<Rule>, StructuralError> {
        self.rules(rules, "")
    }

    fn rules(&mut self, rules: &[Rule], prefix: &str) -> Result<Vec<Rule>, StructuralError> {
        rules
            .iter()
            .enumerate()
            .map(|(i, rule)| self.rule(rule, &format!("{prefix}rules[{i}]")))
            .collect()
    }

    fn rule(&mut self, rule: &Rule, path: &str) -> Result<Rule, StructuralError> {
        self.scopes.push(HashMap::new());
        let result = self.rule_in_scope(rule, path);
        self.scopes.pop();
        result
    }

    fn rule_in_scope(&mut self, rule: &Rule, path: &str) -> Result<Rule, StructuralError> {
        let mut conditions = Vec::with_capacity(rule.conditions.len());
        for (j, cond) in rule.conditions.iter().enumerate() {
            if let Some(cond) = self.condition(cond, &format!("{path}.conditions[{j}]"))? {
                conditions.push(cond);
            }
        }

        let kind = match &rule.kind {
            RuleKind::Tree(children) => RuleKind::Tree(self.rules(children, &format!("{path}."))?),
            RuleKind::Endpoint(endpoint) => {
                RuleKind::Endpoint(self.endpoint(endpoint, &format!("{path}.endpoint"))?)
            }
            RuleKind::Error(message) => {
                let location = format!("{path}.error");
                check_expr(message, &location)?;
                RuleKind::Error(self.rewrite(message, &location)?)
            }
        };

        Ok(Rule {
            conditions,
            kind,
            documentation: rule.documentation.clone(),
        })
    }

    /// `None` when the condition repeats a binding already in scope.
    fn condition(
        &mut self,
        cond: &Condition,
        location: &str,
    ) -> Result<Option<Condition>, StructuralError> {
        check_expr(&cond.expr, location)?;
        let expr = self.rewrite(&cond.expr, location)?;

        let Some(name) = &cond.assign else {
            return Ok(Some(Condition { expr, assign: None }));
        };
        if self.parameters.contains(name.as_str()) {
            return Err(StructuralError::ShadowedParameter {
                location: location.to_owned(),
                name: name.clone(),
            });
        }
        let ssa_name = self.allocate(name, &expr);
        let redundant = self.in_scope(&ssa_name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.clone(), ssa_name.clone());
        }
        if redundant {
            debug!("{location}: '{name}' repeats binding '{ssa_name}', dropped");
            return Ok(None);
        }
        Ok(Some(Condition {
            expr,
            assign: Some(ssa_name),
        }))
    }

    fn endpoint(&self, endpoint: &Endpoint, location: &str) -> Result<Endpoint, StructuralError> {
        check_expr(&endpoint.url, location)?;
        for value in endpoint.headers.values().flatten() {
            check_expr(value, location)?;
        }
        for value in endpoint.properties.values() {
            check_literal(value, location)?;
        }
        let references = endpoint
            .references()
            .map_err(|e| template_error(location, &endpoint.url.to_string(), &e))?;
        let renames = self.resolve_all(&references, location)?;
        endpoint
            .rename(&renames)
            .map_err(|e| template_error(location, &endpoint.url.to_string(), &e))
    }

    /// Resolve every reference in `expr` and rewrite it to the renamed
    /// bindings in scope.
    fn rewrite(&self, expr: &Expr, location: &str) -> Result<Expr, StructuralError> {
        let references = expr
            .references()
            .map_err(|e| template_error(location, &expr.to_string(), &e))?;
        let renames = self.resolve_all(&references, location)?;
        expr.rename(&renames)
            .map_err(|e| template_error(location, &expr.to_string(), &e))
    }

    fn resolve_all(
        &self,
        references: &[String],
        location: &str,
    ) -> Result<HashMap<String, String>, StructuralError> {
        let mut renames = HashMap::new();
        for name in references {
            if let Some(ssa_name) = self.resolve(name) {
                renames.insert(name.clone(), ssa_name.to_owned());
            } else if !self.parameters.contains(name.as_str()) {
                return Err(StructuralError::UnboundReference {
                    location: location.to_owned(),
                    name: name.clone(),
                });
            }
        }
        Ok(renames)
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map(String::as_str)
    }

    /// Whether an enclosing binding already holds `ssa_name`.
    fn in_scope(&self, ssa_name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.values().any(|bound| bound == ssa_name))
    }

    fn allocate(&mut self, name: &str, expr: &Expr) -> String {
        if let Some(existing) = self.versions.get(expr) {
            if existing != name {
                debug!("'{name}' consolidated into '{existing}' for {expr}");
            }
            return existing.clone();
        }
        let mut candidate = name.to_owned();
        let mut suffix = 0;
        while self.taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        self.taken.insert(candidate.clone());
        self.versions.insert(expr.clone(), candidate.clone());
        candidate
    }
}

fn template_error(location: &str, template: &str, err: &ParseError) -> StructuralError {
    StructuralError::InvalidTemplate {
        location: location.to_owned(),
        template: template.to_owned(),
        reason: err.to_string(),
    }
}

/// Static checks on an expression: argument counts, template syntax and
/// `getAttr` paths.
fn check_expr(expr: &Expr, location: &str) -> Result<(), StructuralError> {
    let mut stack = vec![expr];
    while let Some(expr) = stack.pop() {
        match expr {
            Expr::Reference(_) => {}
            Expr::Literal(lit) => check_literal(lit, location)?,
            Expr::Call { function, args } => {
                check_arity(*function, args.len(), location)?;
                if *function == Function::GetAttr {
                    check_attr_path(&args[1], location)?;
                }
                stack.extend(args);
            }
        }
    }
    Ok(())
}

fn check_literal(lit: &Literal, location: &str) -> Result<(), StructuralError> {
    match lit {
        Literal::Bool(_) | Literal::Int(_) => Ok(()),
        Literal::String(template) => template
            .parts()
            .map(|_| ())
            .map_err(|e| template_error(location, &template.to_string(), &e)),
        Literal::Array(items) => items.iter().try_for_each(|i| check_literal(i, location)),
        Literal::Record(fields) => fields
            .values()
            .try_for_each(|v| check_literal(v, location)),
    }
}

fn check_arity(function: Function, found: usize, location: &str) -> Result<(), StructuralError> {
    let (min, max) = function.arity();
    let ok = found >= min && max.is_none_or(|max| found <= max);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    };
    Err(StructuralError::InvalidArity {
        location: location.to_owned(),
        function: function.name().to_owned(),
        expected,
        found,
    })
}

fn check_attr_path(arg: &Expr, location: &str) -> Result<(), StructuralError> {
    let Expr::Literal(Literal::String(template)) = arg else {
        return Err(StructuralError::InvalidTemplate {
            location: location.to_owned(),
            template: arg.to_string(),
            reason: "getAttr path must be a string literal".to_owned(),
        });
    };
    parse::parse_attr_path(template.as_str())
        .map(|_| ())
        .map_err(|e| template_error(location, &template.to_string(), &e))
}
