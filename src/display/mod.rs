//! Terminal display utilities for CLI output.

pub mod progress;
pub mod theme;

pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use theme::{MatchStrength, THEME, Theme};
