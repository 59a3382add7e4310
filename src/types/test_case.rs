use super::context::Context;
use super::resolution::{ResolvedEndpoint, Resolution};
use super::value::Value;

/// A declarative expectation: evaluating with `params` yields `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    id: String,
    params: Context,
    expected: Resolution,
}

impl TestCase {
    /// A test expecting no match until one of the `expect_*` methods is used.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            params: Context::new(),
            expected: Resolution::NoMatch,
        }
    }

    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value.into());
        self
    }

    #[must_use]
    pub fn expect_endpoint(mut self, endpoint: ResolvedEndpoint) -> Self {
        self.expected = Resolution::Endpoint(endpoint);
        self
    }

    #[must_use]
    pub fn expect_error(mut self, message: &str) -> Self {
        self.expected = Resolution::Error(message.to_owned());
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn params(&self) -> &Context {
        &self.params
    }

    #[must_use]
    pub fn expected(&self) -> &Resolution {
        &self.expected
    }
}
