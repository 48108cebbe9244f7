//! CLI color helpers.
//!
//! All functions respect `NO_COLOR`, `FORCE_COLOR`, and TTY detection via
//! `owo-colors`' `if_supports_color()`. The `--no-color` flag sets an internal
//! flag that bypasses owo-colors entirely.

use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use owo_colors::Stream::{Stderr, Stdout};

/// Set by `--no-color`; forces color off.
static NO_COLOR_FLAG: AtomicBool = AtomicBool::new(false);

pub fn set_no_color() {
    NO_COLOR_FLAG.store(true, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl Rgb {
    const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }
}

const PANEL_BLUE: Rgb = Rgb::from_hex(0x5FA8D3); // Paths, pids
const LIME: Rgb = Rgb::from_hex(0x7FB069); // Running, processed
const SAND: Rgb = Rgb::from_hex(0xD9A441); // Starting, warnings
const BRICK: Rgb = Rgb::from_hex(0xC0504D); // Errors
const SLATE: Rgb = Rgb::from_hex(0x6C7580); // Secondary info

fn no_color() -> bool {
    NO_COLOR_FLAG.load(Ordering::Relaxed)
}

fn paint(text: &str, rgb: Rgb) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stdout, |t| t.truecolor(rgb.r, rgb.g, rgb.b))
        .to_string()
}

fn paint_stderr(text: &str, rgb: Rgb) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stderr, |t| t.truecolor(rgb.r, rgb.g, rgb.b))
        .to_string()
}

/// Paths and pids.
pub fn accent(text: &str) -> String {
    paint(text, PANEL_BLUE)
}

pub fn success(text: &str) -> String {
    paint(text, LIME)
}

pub fn caution(text: &str) -> String {
    paint(text, SAND)
}

pub fn muted(text: &str) -> String {
    paint(text, SLATE)
}

pub fn bold(text: &str) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stdout, |t| t.bold()).to_string()
}

/// Color-code a process state value (running/starting).
pub fn state(state_str: &str) -> String {
    match state_str {
        "running" => success(state_str),
        "starting" => caution(state_str),
        _ => state_str.to_string(),
    }
}

/// Error styling for stderr messages.
pub fn error(text: &str) -> String {
    paint_stderr(text, BRICK)
}

/// Warning styling for stderr messages.
pub fn warning(text: &str) -> String {
    paint_stderr(text, SAND)
}

/// Secondary info on stderr.
pub fn hint(text: &str) -> String {
    paint_stderr(text, SLATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_hex() {
        let c = Rgb::from_hex(0x5FA8D3);
        assert_eq!((c.r, c.g, c.b), (0x5F, 0xA8, 0xD3));
    }

    #[test]
    fn test_no_color_returns_plain_text() {
        set_no_color();
        assert_eq!(accent("/srv"), "/srv");
        assert_eq!(state("running"), "running");
        assert_eq!(error("boom"), "boom");
        assert_eq!(bold("Pid"), "Pid");
    }
}
