//! Styled terminal output

use owo_colors::{OwoColorize, colors::css};
use supports_color::Stream;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Pass,
    Fail,
    Identity,
    Muted,
}

fn paint(text: &str, tone: Tone) -> String {
    if supports_color::on_cached(Stream::Stdout).is_none() {
        return text.to_string();
    }

    match tone {
        Tone::Pass => text.fg::<css::Green>().to_string(),
        Tone::Fail => text.fg::<css::Orange>().to_string(),
        Tone::Identity => text.fg::<css::LightBlue>().to_string(),
        Tone::Muted => text.dimmed().to_string(),
    }
}

/// Extension trait for colorizing output
pub trait Colorize {
    /// Passing checks (green)
    fn success(&self) -> String;
    /// Failing or erroring checks (amber)
    fn warning(&self) -> String;
    /// Component identities (blue)
    fn info(&self) -> String;
    /// Secondary detail
    fn dim(&self) -> String;
}

impl<T: AsRef<str> + ?Sized> Colorize for T {
    fn success(&self) -> String {
        paint(self.as_ref(), Tone::Pass)
    }

    fn warning(&self) -> String {
        paint(self.as_ref(), Tone::Fail)
    }

    fn info(&self) -> String {
        paint(self.as_ref(), Tone::Identity)
    }

    fn dim(&self) -> String {
        paint(self.as_ref(), Tone::Muted)
    }
}
