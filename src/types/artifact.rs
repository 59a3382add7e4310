use super::context::Context;
use super::error::EvalError;
use super::parameter::Parameter;
use super::resolution::Resolution;
use crate::bdd::Bdd;

/// The shippable product of a compilation: parameter declarations and the
/// final decision diagram.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) bdd: Bdd,
}

impl Artifact {
    #[must_use]
    pub fn new(parameters: Vec<Parameter>, bdd: Bdd) -> Self {
        Self { parameters, bdd }
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    /// Resolve an endpoint by walking the diagram.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the reached outcome cannot be rendered.
    pub fn evaluate(&self, ctx: &Context) -> Result<Resolution, EvalError> {
        self.bdd.evaluate(&self.parameters, ctx)
    }

    /// Serialize to the binary artifact format.
    ///
    /// Encoding is deterministic: the same artifact always produces the same
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::SerializeError) if encoding fails.
    #[cfg(feature = "artifact")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::SerializeError> {
        crate::serial::encode(self)
    }

    /// Deserialize from bytes produced by [`to_bytes()`](Self::to_bytes).
    ///
    /// The header, checksum and every diagram invariant are validated.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::DeserializeError) on a bad header,
    /// checksum mismatch, decode failure or invalid diagram.
    #[cfg(feature = "artifact")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// Write the binary form to a file.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::SerializeError) on encode or I/O failure.
    #[cfg(feature = "artifact")]
    pub fn write_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), crate::SerializeError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Read an artifact written by [`write_file()`](Self::write_file).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::DeserializeError) on I/O or decode failure.
    #[cfg(feature = "artifact")]
    pub fn read_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
