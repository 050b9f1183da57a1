use is_terminal::IsTerminal;

use cg_search::ColorMode;

const RESET: &str = "\x1b[0m";
const MAGENTA_BOLD: &str = "\x1b[1;35m";
const GREEN_BOLD: &str = "\x1b[1;32m";
const RED_BOLD: &str = "\x1b[1;31m";
const GRAY: &str = "\x1b[90m";
const CYAN: &str = "\x1b[36m";

/// ANSI styling for the text formatter. All fields are empty strings
/// when colors are off, so call sites can interpolate unconditionally.
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub file: &'static str,
    pub line: &'static str,
    pub matched: &'static str,
    pub context: &'static str,
    pub separator: &'static str,
    pub reset: &'static str,
}

impl ColorScheme {
    pub fn enabled() -> Self {
        Self {
            file: MAGENTA_BOLD,
            line: GREEN_BOLD,
            matched: RED_BOLD,
            context: GRAY,
            separator: CYAN,
            reset: RESET,
        }
    }

    pub fn disabled() -> Self {
        Self {
            file: "",
            line: "",
            matched: "",
            context: "",
            separator: "",
            reset: "",
        }
    }

    /// Resolve a color mode against the real stdout.
    pub fn for_mode(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Always => Self::enabled(),
            ColorMode::Never => Self::disabled(),
            ColorMode::Auto => {
                if stdout_supports_color() {
                    Self::enabled()
                } else {
                    Self::disabled()
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.reset.is_empty()
    }
}

/// Auto mode: a real terminal on stdout and a TERM that is not `dumb`.
/// Redirection makes `is_terminal` return false on every platform.
fn stdout_supports_color() -> bool {
    if !std::io::stdout().is_terminal() {
        return false;
    }
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => true,
    }
}
