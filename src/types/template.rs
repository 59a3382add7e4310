use std::collections::HashMap;
use std::fmt;

use crate::parse::{self, ParseError};

/// A string literal with `{name}` and `{name#path}` placeholders.
///
/// `{{` and `}}` produce literal braces. The source text is kept as written;
/// it is parsed on demand and validated when the rule tree is lowered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub struct Template {
    source: String,
}

/// One piece of a parsed [`Template`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TemplatePart {
    Literal(String),
    Dynamic { name: String, path: Option<AttrPath> },
}

/// A `getAttr` path such as `authority` or `parts[0].name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrPath {
    pub(crate) segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    Key(String),
    Index(usize),
}

impl Template {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The template text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn parts(&self) -> Result<Vec<TemplatePart>, ParseError> {
        parse::parse_template(&self.source)
    }

    /// Names of all variables the template reads.
    pub(crate) fn references(&self) -> Result<Vec<String>, ParseError> {
        Ok(self
            .parts()?
            .into_iter()
            .filter_map(|part| match part {
                TemplatePart::Dynamic { name, .. } => Some(name),
                TemplatePart::Literal(_) => None,
            })
            .collect())
    }

    /// Rewrite placeholder names through `renames`; names without an entry
    /// are kept.
    pub(crate) fn rename(&self, renames: &HashMap<String, String>) -> Result<Self, ParseError> {
        let parts = self.parts()?;
        if !parts
            .iter()
            .any(|p| matches!(p, TemplatePart::Dynamic { .. }))
        {
            return Ok(self.clone());
        }
        let mut source = String::with_capacity(self.source.len());
        for part in parts {
            let part = match part {
                TemplatePart::Dynamic { name, path } => TemplatePart::Dynamic {
                    name: renames.get(&name).cloned().unwrap_or(name),
                    path,
                },
                literal => literal,
            };
            source.push_str(&part.to_string());
        }
        Ok(Self { source })
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.source)
    }
}

impl fmt::Display for TemplatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplatePart::Literal(text) => {
                for c in text.chars() {
                    match c {
                        '{' => write!(f, "{{{{")?,
                        '}' => write!(f, "}}}}")?,
                        c => write!(f, "{c}")?,
                    }
                }
                Ok(())
            }
            TemplatePart::Dynamic { name, path: None } => write!(f, "{{{name}}}"),
            TemplatePart::Dynamic {
                name,
                path: Some(path),
            } => write!(f, "{{{name}#{path}}}"),
        }
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
