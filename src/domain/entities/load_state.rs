//! Per-consumer load state exposed to UI bindings.

use super::RenderableRef;

/// Status of a resource in its load lifecycle.
///
/// Transitions are `Idle -> Loading -> Loaded | Failed`, and
/// `Failed -> Loading` on a manual reload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    /// Loading has not started.
    #[default]
    Idle,
    /// A load (possibly a retry) is in progress.
    Loading,
    /// The resource is ready for rendering.
    Loaded,
    /// Loading failed after retries with an error message.
    Failed(String),
}

impl LoadStatus {
    /// Returns true while loading.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns true once loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// Returns true if loading failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Snapshot of an image resource for UI binding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceState {
    /// Lifecycle status.
    pub status: LoadStatus,
    /// Reference to render once loaded.
    pub renderable_ref: Option<RenderableRef>,
}

impl ResourceState {
    /// Returns true while loading.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    /// Returns true once loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.status.is_loaded()
    }

    /// Returns true if loading failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            LoadStatus::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Snapshot of a video thumbnail for UI binding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThumbnailState {
    /// Thumbnail to display, or the fallback icon after a failure.
    pub thumbnail_url: Option<String>,
    /// True while extraction is running.
    pub is_loading: bool,
    /// Failure message of the last extraction.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_state_accessors() {
        let mut state = ResourceState::default();
        assert!(!state.is_loading() && !state.is_loaded() && !state.is_failed());

        state.status = LoadStatus::Failed("HTTP 500".to_string());
        assert!(state.is_failed());
        assert_eq!(state.error(), Some("HTTP 500"));

        state.status = LoadStatus::Loaded;
        assert!(state.is_loaded());
        assert_eq!(state.error(), None);
    }
}
