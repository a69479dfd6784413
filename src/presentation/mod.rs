//! Presentation layer: the command-line front end.

/// Command runner.
pub mod app;

pub use app::App;
