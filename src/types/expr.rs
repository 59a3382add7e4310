use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::template::Template;
use crate::parse::ParseError;

/// Library functions available to conditions and result templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub enum Function {
    IsSet,
    Not,
    BooleanEquals,
    StringEquals,
    Substring,
    IsValidHostLabel,
    ParseUrl,
    UriEncode,
    GetAttr,
    Coalesce,
}

impl Function {
    /// Name as written in rule documents.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Function::IsSet => "isSet",
            Function::Not => "not",
            Function::BooleanEquals => "booleanEquals",
            Function::StringEquals => "stringEquals",
            Function::Substring => "substring",
            Function::IsValidHostLabel => "isValidHostLabel",
            Function::ParseUrl => "parseURL",
            Function::UriEncode => "uriEncode",
            Function::GetAttr => "getAttr",
            Function::Coalesce => "coalesce",
        }
    }

    /// Accepted argument counts as `(min, max)`; `None` means variadic.
    #[must_use]
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::IsSet | Function::Not | Function::ParseUrl | Function::UriEncode => {
                (1, Some(1))
            }
            Function::BooleanEquals
            | Function::StringEquals
            | Function::IsValidHostLabel
            | Function::GetAttr => (2, Some(2)),
            Function::Substring => (4, Some(4)),
            Function::Coalesce => (2, None),
        }
    }

    /// Whether the function always produces a boolean.
    #[must_use]
    pub fn returns_bool(self) -> bool {
        matches!(
            self,
            Function::IsSet
                | Function::Not
                | Function::BooleanEquals
                | Function::StringEquals
                | Function::IsValidHostLabel
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Literal values. String literals are [`Template`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
    Bool(bool),
    Int(i64),
    String(Template),
    Array(Vec<Literal>),
    Record(BTreeMap<String, Literal>),
}

/// Expression AST for condition arguments and result templates.
///
/// Bare strings convert into string literals; variables are named with
/// [`reference()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Literal(Literal),
    Reference(String),
    Call { function: Function, args: Vec<Expr> },
}

impl Literal {
    fn collect_references(&self, out: &mut Vec<String>) -> Result<(), ParseError> {
        match self {
            Literal::Bool(_) | Literal::Int(_) => {}
            Literal::String(t) => out.extend(t.references()?),
            Literal::Array(items) => {
                for item in items {
                    item.collect_references(out)?;
                }
            }
            Literal::Record(fields) => {
                for value in fields.values() {
                    value.collect_references(out)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn rename(&self, renames: &HashMap<String, String>) -> Result<Self, ParseError> {
        Ok(match self {
            Literal::Bool(_) | Literal::Int(_) => self.clone(),
            Literal::String(t) => Literal::String(t.rename(renames)?),
            Literal::Array(items) => Literal::Array(
                items
                    .iter()
                    .map(|item| item.rename(renames))
                    .collect::<Result<_, _>>()?,
            ),
            Literal::Record(fields) => Literal::Record(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.rename(renames)?)))
                    .collect::<Result<_, ParseError>>()?,
            ),
        })
    }
}

impl Expr {
    /// Names of every variable read by this expression, templates included,
    /// in source order.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if an embedded template is malformed.
    pub fn references(&self) -> Result<Vec<String>, ParseError> {
        let mut out = Vec::new();
        self.collect_references(&mut out)?;
        Ok(out)
    }

    fn collect_references(&self, out: &mut Vec<String>) -> Result<(), ParseError> {
        match self {
            Expr::Literal(lit) => lit.collect_references(out),
            Expr::Reference(name) => {
                out.push(name.clone());
                Ok(())
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out)?;
                }
                Ok(())
            }
        }
    }

    /// Every function called by this expression, outermost first.
    pub(crate) fn calls(&self) -> Vec<Function> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            if let Expr::Call { function, args } = expr {
                out.push(*function);
                stack.extend(args.iter().rev());
            }
        }
        out
    }

    pub(crate) fn rename(&self, renames: &HashMap<String, String>) -> Result<Self, ParseError> {
        Ok(match self {
            Expr::Literal(lit) => Expr::Literal(lit.rename(renames)?),
            Expr::Reference(name) => {
                Expr::Reference(renames.get(name).cloned().unwrap_or_else(|| name.clone()))
            }
            Expr::Call { function, args } => Expr::Call {
                function: *function,
                args: args
                    .iter()
                    .map(|arg| arg.rename(renames))
                    .collect::<Result<_, _>>()?,
            },
        })
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::String(t) => write!(f, "{t}"),
            Literal::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Literal::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::Reference(name) => write!(f, "{name}"),
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Expr::Literal(lit)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(Template::new(v))
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::String(Template::new(v))
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Literal(v.into())
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Literal(v.into())
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Literal(v.into())
    }
}

fn call(function: Function, args: Vec<Expr>) -> Expr {
    Expr::Call { function, args }
}

#[must_use]
pub fn reference(name: &str) -> Expr {
    Expr::Reference(name.to_owned())
}

#[must_use]
pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

#[must_use]
pub fn is_set(arg: impl Into<Expr>) -> Expr {
    call(Function::IsSet, vec![arg.into()])
}

#[must_use]
pub fn not(arg: impl Into<Expr>) -> Expr {
    call(Function::Not, vec![arg.into()])
}

#[must_use]
pub fn boolean_equals(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    call(Function::BooleanEquals, vec![a.into(), b.into()])
}

#[must_use]
pub fn string_equals(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    call(Function::StringEquals, vec![a.into(), b.into()])
}

/// `substring(input, start, stop, reverse)`: ASCII-only slice, counted from
/// the end when `reverse` is true.
#[must_use]
pub fn substring(input: impl Into<Expr>, start: i64, stop: i64, reverse: bool) -> Expr {
    call(
        Function::Substring,
        vec![input.into(), start.into(), stop.into(), reverse.into()],
    )
}

#[must_use]
pub fn is_valid_host_label(value: impl Into<Expr>, allow_sub_domains: bool) -> Expr {
    call(
        Function::IsValidHostLabel,
        vec![value.into(), allow_sub_domains.into()],
    )
}

#[must_use]
pub fn parse_url(url: impl Into<Expr>) -> Expr {
    call(Function::ParseUrl, vec![url.into()])
}

#[must_use]
pub fn uri_encode(value: impl Into<Expr>) -> Expr {
    call(Function::UriEncode, vec![value.into()])
}

#[must_use]
pub fn get_attr(target: impl Into<Expr>, path: &str) -> Expr {
    call(Function::GetAttr, vec![target.into(), path.into()])
}

#[must_use]
pub fn coalesce(args: impl IntoIterator<Item = Expr>) -> Expr {
    call(Function::Coalesce, args.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_calls() {
        let expr = string_equals(reference("Region"), "aws-global");
        assert_eq!(
            expr,
            Expr::Call {
                function: Function::StringEquals,
                args: vec![
                    Expr::Reference("Region".to_owned()),
                    Expr::Literal(Literal::String(Template::new("aws-global"))),
                ],
            }
        );
    }

    #[test]
    fn display_nested_call() {
        let expr = string_equals(get_attr(reference("url"), "scheme"), "https");
        assert_eq!(
            expr.to_string(),
            "stringEquals(getAttr(url, \"scheme\"), \"https\")"
        );
    }

    #[test]
    fn references_include_template_placeholders() {
        let expr = string_equals(reference("Region"), "{Partition}-{Suffix}");
        assert_eq!(expr.references().unwrap(), ["Region", "Partition", "Suffix"]);
    }

    #[test]
    fn calls_outermost_first() {
        let expr = not(is_set(coalesce([reference("a"), reference("b")])));
        assert_eq!(
            expr.calls(),
            [Function::Not, Function::IsSet, Function::Coalesce]
        );
    }

    #[test]
    fn rename_rewrites_references_and_templates() {
        let expr = string_equals(reference("url"), "{url#scheme}");
        let renames = HashMap::from([("url".to_owned(), "url_1".to_owned())]);
        assert_eq!(
            expr.rename(&renames).unwrap(),
            string_equals(reference("url_1"), "{url_1#scheme}")
        );
    }

    #[test]
    fn arity_table() {
        assert_eq!(Function::Substring.arity(), (4, Some(4)));
        assert_eq!(Function::Coalesce.arity(), (2, None));
        assert_eq!(Function::IsSet.arity(), (1, Some(1)));
    }

    #[test]
    fn boolean_returning_functions() {
        assert!(Function::StringEquals.returns_bool());
        assert!(!Function::ParseUrl.returns_bool());
        assert!(!Function::Coalesce.returns_bool());
    }
}
