use crate::error::{ErrorContext, PacedError};
use colored::Colorize;
use std::fmt::Write as _;

pub fn format_error_chain(error: &PacedError) -> String {
    ErrorContext::new(error).to_string()
}

/// Renders an error as a headline, optional details and bulleted suggestions.
///
/// Styling goes through `colored`, so `NO_COLOR` and `CLICOLOR_FORCE` are
/// honored on top of `use_color`.
pub fn format_error_with_color(error: &PacedError, use_color: bool) -> String {
    let paint = |text: &str, style: fn(&str) -> colored::ColoredString| {
        if use_color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    };

    let context = ErrorContext::new(error);
    let mut output = String::new();
    let _ = writeln!(output, "{} {error}", paint("Error:", |s| s.red().bold()));

    if let Some(details) = &context.details {
        let _ = write!(output, "\n{details}\n");
    }

    if let Some(suggestion) = &context.suggestion {
        let _ = write!(output, "\n{}\n", paint("Suggestions:", |s| s.yellow().bold()));
        for line in suggestion.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let _ = writeln!(output, "{}", paint(&format!("• {line}"), |s| s.cyan()));
        }
    }

    output
}
