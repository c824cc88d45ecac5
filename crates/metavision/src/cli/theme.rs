//! Prompt theme and terminal styling shared by the commands.

use console::{style, Style};
use dialoguer::theme::ColorfulTheme;

/// A `ColorfulTheme` writing to stderr, so prompts never mix with records
/// on stdout.
pub fn metavision_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("?".to_string()).for_stderr().cyan(),
        prompt_style: Style::new().for_stderr().bold(),
        prompt_suffix: style("›".to_string()).for_stderr().bright().black(),
        success_prefix: style("✓".to_string()).for_stderr().green(),
        error_prefix: style("✗".to_string()).for_stderr().red(),
        values_style: Style::new().for_stderr().green(),
        ..ColorfulTheme::default()
    }
}

/// Print a one-line status message to stderr, prefixed with a green check.
pub fn success(message: &str) {
    eprintln!("{} {message}", Style::new().for_stderr().green().apply_to("✓"));
}

/// Print a one-line warning to stderr, prefixed in yellow.
pub fn notice(message: &str) {
    eprintln!("{} {message}", Style::new().for_stderr().yellow().apply_to("!"));
}
