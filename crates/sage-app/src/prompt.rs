//! Dialogs rendered on the terminal.

use std::io::{BufRead, Write};

use sage_launch::Prompter;

/// Prompter that writes to stderr and reads answers from stdin.
pub struct TerminalPrompter {
    assume_yes: bool,
}

impl TerminalPrompter {
    /// With `assume_yes`, every question is answered "yes" without reading.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompter for TerminalPrompter {
    fn show_warning(&mut self, message: &str) {
        eprintln!("Warning: {}", message);
    }

    fn show_error(&mut self, message: &str) {
        eprintln!("Error: {}", message);
    }

    fn ask_yes_no(&mut self, message: &str) -> bool {
        self.ask(message, "[y/N]", "y", is_yes)
    }

    fn ask_ok_cancel(&mut self, message: &str) -> bool {
        self.ask(message, "[ok/Cancel]", "ok", is_ok)
    }
}

impl TerminalPrompter {
    fn ask(&self, message: &str, choices: &str, accept: &str, accepted: fn(&str) -> bool) -> bool {
        if self.assume_yes {
            eprintln!("{} {} {}", message, choices, accept);
            return true;
        }
        eprint!("{} {} ", message, choices);
        std::io::stderr().flush().ok();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => accepted(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn is_ok(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "o" | "ok")
}
