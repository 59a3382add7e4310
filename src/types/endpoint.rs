use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::expr::{Expr, Literal};
use crate::parse::ParseError;

/// An endpoint produced by a matching rule.
///
/// The URL and header values are expressions, usually string templates such
/// as `"https://{Region}.example.com"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    pub(crate) url: Expr,
    pub(crate) headers: BTreeMap<String, Vec<Expr>>,
    pub(crate) properties: BTreeMap<String, Literal>,
}

impl Endpoint {
    #[must_use]
    pub fn new(url: impl Into<Expr>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Append a value to header `name`.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<Expr>) -> Self {
        self.headers
            .entry(name.to_owned())
            .or_default()
            .push(value.into());
        self
    }

    #[must_use]
    pub fn property(mut self, name: &str, value: impl Into<Literal>) -> Self {
        self.properties.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn url(&self) -> &Expr {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, Vec<Expr>> {
        &self.headers
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Literal> {
        &self.properties
    }
}

/// A terminal outcome of the decision structure.
///
/// Result index 0 of every compiled structure is [`Outcome::NoMatch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "artifact", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    NoMatch,
    Endpoint(Endpoint),
    Error(Expr),
}

impl Endpoint {
    pub(crate) fn references(&self) -> Result<Vec<String>, ParseError> {
        let mut out = self.url.references()?;
        for value in self.headers.values().flatten() {
            out.extend(value.references()?);
        }
        for value in self.properties.values() {
            out.extend(Expr::Literal(value.clone()).references()?);
        }
        Ok(out)
    }

    pub(crate) fn rename(&self, renames: &HashMap<String, String>) -> Result<Self, ParseError> {
        Ok(Endpoint {
            url: self.url.rename(renames)?,
            headers: self
                .headers
                .iter()
                .map(|(name, values)| {
                    let values = values
                        .iter()
                        .map(|v| v.rename(renames))
                        .collect::<Result<_, _>>()?;
                    Ok((name.clone(), values))
                })
                .collect::<Result<_, ParseError>>()?,
            properties: self
                .properties
                .iter()
                .map(|(name, value)| Ok((name.clone(), value.rename(renames)?)))
                .collect::<Result<_, ParseError>>()?,
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NoMatch => write!(f, "no match"),
            Outcome::Endpoint(endpoint) => write!(f, "endpoint {}", endpoint.url),
            Outcome::Error(message) => write!(f, "error {message}"),
        }
    }
}
