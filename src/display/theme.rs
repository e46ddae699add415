//! Terminal styling for match listings and status lines.

use console::Style;
use std::io::IsTerminal;
use std::sync::LazyLock;

/// Shared theme for CLI output.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// How close a match is, for colouring its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrength {
    Strong,
    Fair,
    Weak,
}

impl MatchStrength {
    pub fn of(similarity: f32) -> Self {
        if similarity >= 0.75 {
            MatchStrength::Strong
        } else if similarity >= 0.5 {
            MatchStrength::Fair
        } else {
            MatchStrength::Weak
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    /// Job titles and section headings
    pub title: Style,
    /// Ids, suggestions and other secondary text
    pub dim: Style,
    /// Counts in `info` output
    pub number: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            title: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            number: Style::new().cyan(),
        }
    }
}

impl Theme {
    pub fn success_with_icon(&self, text: &str) -> String {
        self.with_icon(&self.success, "✓", text)
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        self.with_icon(&self.error, "✗", text)
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        self.with_icon(&self.warning, "⚠", text)
    }

    fn with_icon(&self, style: &Style, icon: &str, text: &str) -> String {
        format!("{} {}", self.apply(style, icon), self.apply(style, text))
    }

    /// Similarity to four decimals, coloured by [`MatchStrength`].
    pub fn similarity(&self, similarity: f32) -> String {
        let style = match MatchStrength::of(similarity) {
            MatchStrength::Strong => &self.success,
            MatchStrength::Fair => &self.warning,
            MatchStrength::Weak => &self.dim,
        };
        self.apply(style, format!("{similarity:.4}"))
    }

    /// Aligned `label: value` line for metadata listings.
    pub fn field<T: std::fmt::Display>(&self, label: &str, value: T) -> String {
        format!("  {:<14}{}", format!("{label}:"), self.apply(&self.number, value))
    }

    /// Colours are off under `NO_COLOR` or when stdout is not a terminal.
    pub fn should_disable_colors() -> bool {
        std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
    }

    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_strength_bands() {
        assert_eq!(MatchStrength::of(1.0), MatchStrength::Strong);
        assert_eq!(MatchStrength::of(0.75), MatchStrength::Strong);
        assert_eq!(MatchStrength::of(0.6), MatchStrength::Fair);
        assert_eq!(MatchStrength::of(0.1), MatchStrength::Weak);
    }

    #[test]
    fn test_field_and_similarity_text() {
        let theme = Theme::default();
        assert!(theme.similarity(0.81234).contains("0.8123"));
        let line = theme.field("Vectors", 42);
        assert!(line.starts_with("  Vectors:"));
        assert!(line.contains("42"));
    }
}
