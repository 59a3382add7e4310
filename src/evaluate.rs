use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::net::Ipv4Addr;

use crate::bdd::{Bdd, NodeRef};
use crate::parse::parse_attr_path;
use crate::types::{
    truthy, AttrPath, Condition, Context, Endpoint, EvalError, Expr, Function, Literal, Outcome,
    Parameter, PathSegment, Resolution, ResolvedEndpoint, Rule, RuleKind, Template, TemplatePart,
    Value,
};

/// Variables visible to an evaluation: parameters plus bindings made by
/// conditions that held.
pub(crate) type Scope = HashMap<String, Value>;

/// Tested conditions and their outcomes, in evaluation order.
pub(crate) type Trace<'a> = Option<&'a mut Vec<(String, bool)>>;

/// Parameters from `ctx`, falling back to declared defaults. Names the rule
/// set does not declare, and values the declared type rejects, are ignored.
pub(crate) fn bind_parameters(parameters: &[Parameter], ctx: &Context) -> Scope {
    parameters
        .iter()
        .filter_map(|p| {
            ctx.get(p.name())
                .filter(|v| p.ty().accepts(v))
                .or_else(|| p.default_value())
                .map(|v| (p.name().to_owned(), v.clone()))
        })
        .collect()
}

/// Interpret the rule tree directly.
pub(crate) fn evaluate_rules(
    parameters: &[Parameter],
    rules: &[Rule],
    ctx: &Context,
    mut trace: Trace<'_>,
) -> Result<Resolution, EvalError> {
    let scope = bind_parameters(parameters, ctx);
    Ok(eval_rules(rules, &scope, &mut trace)?.unwrap_or(Resolution::NoMatch))
}

fn eval_rules(
    rules: &[Rule],
    scope: &Scope,
    trace: &mut Trace<'_>,
) -> Result<Option<Resolution>, EvalError> {
    for rule in rules {
        let mut local = scope.clone();
        if !rule
            .conditions
            .iter()
            .all(|c| eval_condition(c, &mut local, trace))
        {
            continue;
        }
        match &rule.kind {
            RuleKind::Tree(children) => {
                if let Some(resolution) = eval_rules(children, &local, trace)? {
                    return Ok(Some(resolution));
                }
            }
            RuleKind::Endpoint(endpoint) => {
                return render_endpoint(endpoint, &local).map(Some);
            }
            RuleKind::Error(message) => {
                return render_text(message, &local).map(|m| Some(Resolution::Error(m)));
            }
        }
    }
    Ok(None)
}

/// Walk a compiled diagram.
pub(crate) fn evaluate_bdd(
    parameters: &[Parameter],
    bdd: &Bdd,
    ctx: &Context,
    mut trace: Trace<'_>,
) -> Result<Resolution, EvalError> {
    let mut scope = bind_parameters(parameters, ctx);
    let mut current = bdd.root;
    loop {
        match current {
            NodeRef::Node(i) => {
                let node = bdd.nodes[i as usize];
                let condition = &bdd.conditions[node.condition as usize];
                current = if eval_condition(condition, &mut scope, &mut trace) {
                    node.high
                } else {
                    node.low
                };
            }
            NodeRef::Result(r) => return resolve(&bdd.results[r as usize], &scope),
        }
    }
}

/// Render a reached outcome.
pub(crate) fn resolve(outcome: &Outcome, scope: &Scope) -> Result<Resolution, EvalError> {
    match outcome {
        Outcome::NoMatch => Ok(Resolution::NoMatch),
        Outcome::Endpoint(endpoint) => render_endpoint(endpoint, scope),
        Outcome::Error(message) => render_text(message, scope).map(Resolution::Error),
    }
}

/// Test a condition, binding its value when it holds and names a variable.
pub(crate) fn eval_condition(
    condition: &Condition,
    scope: &mut Scope,
    trace: &mut Trace<'_>,
) -> bool {
    let value = eval_expr(&condition.expr, scope);
    let holds = truthy(value.as_ref());
    if holds {
        if let (Some(name), Some(value)) = (&condition.assign, value) {
            scope.insert(name.clone(), value);
        }
    }
    if let Some(trace) = trace.as_deref_mut() {
        trace.push((condition.to_string(), holds));
    }
    holds
}

/// Evaluate a condition argument. Total: anything that cannot produce a
/// value yields `None`.
pub(crate) fn eval_expr(expr: &Expr, scope: &Scope) -> Option<Value> {
    match expr {
        Expr::Literal(literal) => eval_literal(literal, scope).ok(),
        Expr::Reference(name) => scope.get(name).cloned(),
        Expr::Call { function, args } => call(*function, args, scope),
    }
}

fn call(function: Function, args: &[Expr], scope: &Scope) -> Option<Value> {
    let arg = |i: usize| args.get(i).and_then(|e| eval_expr(e, scope));
    match function {
        Function::IsSet => Some(Value::Bool(arg(0).is_some())),
        Function::Not => Some(Value::Bool(!truthy(arg(0).as_ref()))),
        Function::BooleanEquals => Some(Value::Bool(matches!(
            (arg(0), arg(1)),
            (Some(Value::Bool(a)), Some(Value::Bool(b))) if a == b
        ))),
        Function::StringEquals => Some(Value::Bool(matches!(
            (arg(0), arg(1)),
            (Some(Value::String(a)), Some(Value::String(b))) if a == b
        ))),
        Function::Substring => {
            let (Some(Value::String(input)), Some(Value::Int(start)), Some(Value::Int(stop))) =
                (arg(0), arg(1), arg(2))
            else {
                return None;
            };
            let reverse = arg(3).and_then(|v| v.as_bool()).unwrap_or(false);
            substring(&input, start, stop, reverse).map(Value::String)
        }
        Function::IsValidHostLabel => {
            let valid = match (arg(0), arg(1)) {
                (Some(Value::String(value)), allow) => {
                    let allow_sub_domains = allow.and_then(|v| v.as_bool()).unwrap_or(false);
                    is_valid_host_label(&value, allow_sub_domains)
                }
                _ => false,
            };
            Some(Value::Bool(valid))
        }
        Function::ParseUrl => match arg(0)? {
            Value::String(url) => parse_url(&url),
            _ => None,
        },
        Function::UriEncode => match arg(0)? {
            Value::String(value) => Some(Value::String(uri_encode(&value))),
            _ => None,
        },
        Function::GetAttr => {
            let target = arg(0)?;
            let Value::String(path) = arg(1)? else {
                return None;
            };
            let path = parse_attr_path(&path).ok()?;
            navigate(&target, &path).cloned()
        }
        Function::Coalesce => args.iter().find_map(|e| eval_expr(e, scope)),
    }
}

fn eval_literal(literal: &Literal, scope: &Scope) -> Result<Value, EvalError> {
    Ok(match literal {
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::String(template) => Value::String(render_template(template, scope)?),
        Literal::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| eval_literal(item, scope))
                .collect::<Result<_, _>>()?,
        ),
        Literal::Record(fields) => Value::Record(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), eval_literal(v, scope)?)))
                .collect::<Result<BTreeMap<_, _>, EvalError>>()?,
        ),
    })
}

/// Evaluate an outcome expression, where an unset value is an error.
fn eval_output(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(literal) => eval_literal(literal, scope),
        Expr::Reference(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnsetValue { name: name.clone() }),
        Expr::Call { .. } => eval_expr(expr, scope).ok_or_else(|| EvalError::UnsetValue {
            name: expr.to_string(),
        }),
    }
}

fn render_text(expr: &Expr, scope: &Scope) -> Result<String, EvalError> {
    let value = eval_output(expr, scope)?;
    text_of(&value).ok_or_else(|| EvalError::Template {
        template: expr.to_string(),
        reason: format!("cannot render a {} as text", value.type_name()),
    })
}

fn render_endpoint(endpoint: &Endpoint, scope: &Scope) -> Result<Resolution, EvalError> {
    let url = match eval_output(&endpoint.url, scope)? {
        Value::String(url) => url,
        other => {
            return Err(EvalError::NonStringUrl {
                found: other.type_name().to_owned(),
            })
        }
    };
    let mut resolved = ResolvedEndpoint::new(url);
    for (name, values) in &endpoint.headers {
        for value in values {
            resolved = resolved.header(name, render_text(value, scope)?);
        }
    }
    for (name, value) in &endpoint.properties {
        resolved = resolved.property(name, eval_literal(value, scope)?);
    }
    Ok(Resolution::Endpoint(resolved))
}

fn render_template(template: &Template, scope: &Scope) -> Result<String, EvalError> {
    let parts = template.parts().map_err(|e| EvalError::Template {
        template: template.to_string(),
        reason: e.to_string(),
    })?;
    let mut out = String::with_capacity(template.as_str().len());
    for part in parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(&text),
            TemplatePart::Dynamic { name, path } => {
                let mut value = scope
                    .get(&name)
                    .ok_or_else(|| EvalError::UnsetValue { name: name.clone() })?;
                if let Some(path) = path {
                    value = navigate(value, &path).ok_or_else(|| EvalError::UnsetValue {
                        name: format!("{name}#{path}"),
                    })?;
                }
                let text = text_of(value).ok_or_else(|| EvalError::Template {
                    template: template.to_string(),
                    reason: format!("cannot render a {} in '{{{name}}}'", value.type_name()),
                })?;
                out.push_str(&text);
            }
        }
    }
    Ok(out)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Array(_) | Value::Record(_) => None,
    }
}

fn navigate<'v>(value: &'v Value, path: &AttrPath) -> Option<&'v Value> {
    path.segments
        .iter()
        .try_fold(value, |current, segment| match (segment, current) {
            (PathSegment::Key(key), Value::Record(fields)) => fields.get(key),
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        })
}

/// `input[start..stop]`, or the same span counted from the end when
/// `reverse` is set. ASCII input only.
fn substring(input: &str, start: i64, stop: i64, reverse: bool) -> Option<String> {
    let start = usize::try_from(start).ok()?;
    let stop = usize::try_from(stop).ok()?;
    if !input.is_ascii() || start >= stop || input.len() < stop {
        return None;
    }
    let len = input.len();
    let span = if reverse {
        &input[len - stop..len - start]
    } else {
        &input[start..stop]
    };
    Some(span.to_owned())
}

fn is_valid_host_label(value: &str, allow_sub_domains: bool) -> bool {
    let label_ok = |label: &str| {
        let bytes = label.as_bytes();
        (1..=63).contains(&bytes.len())
            && bytes[0].is_ascii_alphanumeric()
            && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
    };
    if allow_sub_domains {
        value.split('.').all(label_ok)
    } else {
        label_ok(value)
    }
}

/// Split an `http`/`https` URL into the record read by `getAttr`. URLs with
/// a query string are rejected.
fn parse_url(url: &str) -> Option<Value> {
    let (scheme, rest) = url.split_once("://")?;
    if !matches!(scheme, "http" | "https") || url.contains('?') {
        return None;
    }
    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return None;
    }
    let host = if authority.starts_with('[') {
        authority
    } else {
        authority.rsplit_once(':').map_or(authority, |(h, _)| h)
    };
    let is_ip = host.starts_with('[') || host.parse::<Ipv4Addr>().is_ok();

    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    let fields = [
        ("scheme", Value::from(scheme)),
        ("authority", Value::from(authority)),
        ("path", Value::from(path)),
        ("normalizedPath", Value::String(normalized)),
        ("isIp", Value::Bool(is_ip)),
    ];
    Some(Value::Record(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect(),
    ))
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn uri_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}
