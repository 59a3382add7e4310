use std::collections::BTreeMap;

use super::Value;

/// Parameter bindings supplied to an evaluation.
///
/// Parameters that are not set fall back to their declared default, or stay
/// unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    data: BTreeMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter.
    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Bind a parameter (mutable reference version).
    pub fn insert(&mut self, name: &str, value: Value) {
        self.data.insert(name.to_owned(), value);
    }

    /// Look up a bound parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Iterate bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let ctx = Context::new().set("Region", "us-east-1");
        assert_eq!(ctx.get("Region"), Some(&Value::from("us-east-1")));
        assert_eq!(ctx.get("Endpoint"), None);
    }

    #[test]
    fn overwrite_value() {
        let ctx = Context::new().set("UseFIPS", false).set("UseFIPS", true);
        assert_eq!(ctx.get("UseFIPS"), Some(&Value::Bool(true)));
    }

    #[test]
    fn iteration_is_name_ordered() {
        let ctx = Context::new().set("b", 1_i64).set("a", 2_i64);
        let names: Vec<&str> = ctx.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn insert_mutable_ref() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());
        ctx.insert("key", Value::Bool(true));
        assert_eq!(ctx.get("key"), Some(&Value::Bool(true)));
    }
}
