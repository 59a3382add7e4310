use std::fmt;

use super::value::Value;

/// Declared type of a rule-set parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterType {
    String,
    Boolean,
    StringArray,
}

impl ParameterType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Boolean => "boolean",
            ParameterType::StringArray => "stringArray",
        }
    }

    /// Whether `value` is an instance of this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ParameterType::String, Value::String(_))
            | (ParameterType::Boolean, Value::Bool(_)) => true,
            (ParameterType::StringArray, Value::Array(items)) => {
                items.iter().all(|v| matches!(v, Value::String(_)))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed input to the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub(crate) name: String,
    pub(crate) ty: ParameterType,
    pub(crate) default: Option<Value>,
    pub(crate) required: bool,
    pub(crate) documentation: Option<String>,
}

impl Parameter {
    fn new(name: &str, ty: ParameterType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            default: None,
            required: false,
            documentation: None,
        }
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::new(name, ParameterType::String)
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::new(name, ParameterType::Boolean)
    }

    #[must_use]
    pub fn string_array(name: &str) -> Self {
        Self::new(name, ParameterType::StringArray)
    }

    /// Value used when the caller leaves the parameter unset.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn documented(mut self, documentation: &str) -> Self {
        self.documentation = Some(documentation.to_owned());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> ParameterType {
        self.ty
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }
}
