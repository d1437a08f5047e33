// SPDX-License-Identifier: MIT

//! Minimal ANSI coloring, disabled outside a TTY or under `NO_COLOR`.

use std::io::IsTerminal;

mod codes {
    pub const HEADER: u8 = 74;
    pub const MUTED: u8 = 240;
    pub const GOOD: u8 = 35;
    pub const BAD: u8 = 167;
}

pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn fg256(code: u8, text: &str) -> String {
    if should_colorize() {
        format!("\x1b[38;5;{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

pub fn header(text: &str) -> String {
    fg256(codes::HEADER, text)
}

pub fn muted(text: &str) -> String {
    fg256(codes::MUTED, text)
}

pub fn good(text: &str) -> String {
    fg256(codes::GOOD, text)
}

pub fn bad(text: &str) -> String {
    fg256(codes::BAD, text)
}

/// Color a job/worker status word by whether it reads as terminal-good,
/// terminal-bad, or in-flight.
pub fn status(text: &str) -> String {
    match text {
        "completed" | "idle" | "up" => good(text),
        "failed" | "timeout" | "error" | "offline" | "down" => bad(text),
        _ => text.to_string(),
    }
}
