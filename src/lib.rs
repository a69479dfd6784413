//! Contest media - image and video thumbnail caching engine.
//!
//! Resolves remote images through a two-tier byte cache with at most one
//! fetch in flight per URL, and extracts representative video thumbnails
//! into a versioned persistent cache.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the loading services and media facade.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing cache tiers and adapters.
pub mod infrastructure;
/// Presentation layer containing the command-line front end.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "contest-media";
