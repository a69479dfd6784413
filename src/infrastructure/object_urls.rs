//! Registry issuing object URLs over cached bytes.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use crate::domain::entities::RenderableRef;

/// Maps issued [`RenderableRef`]s to the bytes they stand for.
#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    urls: RwLock<HashMap<RenderableRef, Bytes>>,
}

impl ObjectUrlRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new object URL for `bytes`.
    pub fn create(&self, bytes: Bytes) -> RenderableRef {
        let renderable = RenderableRef::new(format!(
            "{}{}",
            RenderableRef::PREFIX,
            uuid::Uuid::new_v4()
        ));
        trace!(url = %renderable, size = bytes.len(), "Created object URL");
        self.urls.write().insert(renderable.clone(), bytes);
        renderable
    }

    /// Returns the bytes behind an object URL, or `None` once revoked.
    #[must_use]
    pub fn lookup(&self, renderable: &RenderableRef) -> Option<Bytes> {
        self.urls.read().get(renderable).cloned()
    }

    /// Releases an object URL.
    pub fn revoke(&self, renderable: &RenderableRef) {
        if self.urls.write().remove(renderable).is_some() {
            trace!(url = %renderable, "Revoked object URL");
        }
    }

    /// Releases every object URL. Returns how many were live.
    pub fn revoke_all(&self) -> usize {
        let mut urls = self.urls.write();
        let count = urls.len();
        urls.clear();
        count
    }

    /// Returns the number of live object URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.read().len()
    }

    /// Returns true if no object URLs are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.read().is_empty()
    }
}
