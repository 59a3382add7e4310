use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;

/// A fully rendered endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ResolvedEndpoint {
    url: String,
    headers: BTreeMap<String, Vec<String>>,
    properties: BTreeMap<String, Value>,
}

impl ResolvedEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_owned())
            .or_default()
            .push(value.into());
        self
    }

    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.headers
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }
}

/// What evaluating a rule set against a context produces.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Resolution {
    Endpoint(ResolvedEndpoint),
    Error(String),
    NoMatch,
}

impl Resolution {
    /// The resolved endpoint, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&ResolvedEndpoint> {
        match self {
            Resolution::Endpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Endpoint(e) => {
                write!(f, "endpoint {}", e.url)?;
                if !e.headers.is_empty() {
                    write!(f, " headers {:?}", e.headers)?;
                }
                for (name, value) in &e.properties {
                    write!(f, " {name}={value}")?;
                }
                Ok(())
            }
            Resolution::Error(message) => write!(f, "error \"{message}\""),
            Resolution::NoMatch => write!(f, "no match"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_endpoint() {
        let r = Resolution::Endpoint(
            ResolvedEndpoint::new("https://a.example.com").property("signingRegion", "us-east-1"),
        );
        assert_eq!(
            r.to_string(),
            "endpoint https://a.example.com signingRegion=\"us-east-1\""
        );
    }

    #[test]
    fn display_error_and_no_match() {
        assert_eq!(Resolution::Error("bad".into()).to_string(), "error \"bad\"");
        assert_eq!(Resolution::NoMatch.to_string(), "no match");
    }

    #[test]
    fn endpoint_accessor() {
        let r = Resolution::Endpoint(ResolvedEndpoint::new("https://x").header("h", "v"));
        assert_eq!(r.endpoint().map(ResolvedEndpoint::url), Some("https://x"));
        assert_eq!(r.endpoint().unwrap().headers()["h"], ["v"]);
        assert!(Resolution::NoMatch.endpoint().is_none());
    }
}
