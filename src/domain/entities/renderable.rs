//! Opaque handles handed to rendering code.

/// An object URL standing in for cached bytes.
///
/// Rendering code passes it around without touching the bytes; it is
/// resolved back through the registry that issued it and becomes dangling
/// once revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderableRef(String);

impl RenderableRef {
    /// Scheme prefix of every issued reference.
    pub const PREFIX: &'static str = "blob:contest-media/";

    /// Wraps an already-formatted object URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the object URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RenderableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
