//! Status line shown while results are being filtered.

use console::{measure_text_width, Term};
use std::io::Write;

const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Every message replaces the previous one on a single line.
    Overwrite,
    /// Every message gets its own line.
    Append,
}

/// Writes progress messages for the duration of a search.
///
/// In [`ProgressMode::Overwrite`] the cursor is hidden while messages are shown. The
/// status line is cleared and the cursor restored when the printer is dropped, so an
/// early return or an error still leaves the terminal usable.
pub struct ProgressPrinter<W: Write> {
    out: W,
    mode: ProgressMode,
    last_width: usize,
}

impl ProgressPrinter<Term> {
    /// Printer on stderr: overwrite mode on a terminal unless `verbose`.
    pub fn stderr(verbose: bool) -> Self {
        let term = Term::stderr();
        let mode = if !verbose && term.is_term() {
            ProgressMode::Overwrite
        } else {
            ProgressMode::Append
        };
        Self::new(term, mode)
    }
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W, mode: ProgressMode) -> Self {
        Self {
            out,
            mode,
            last_width: 0,
        }
    }

    pub fn print(&mut self, message: &str) {
        match self.mode {
            ProgressMode::Overwrite => self.overwrite(message),
            ProgressMode::Append => self.append(message),
        }
    }

    /// Prints a message that must stay visible, such as an error.
    pub fn force(&mut self, message: &str) {
        match self.mode {
            ProgressMode::Overwrite => {
                write!(self.out, "\n{}\n", message).ok();
                self.last_width = 0;
                self.out.flush().ok();
            }
            ProgressMode::Append => self.append(message),
        }
    }

    fn append(&mut self, message: &str) {
        writeln!(self.out, "{}", message).ok();
        self.out.flush().ok();
    }

    fn overwrite(&mut self, message: &str) {
        let width = measure_text_width(message);
        let padding = " ".repeat(self.last_width.saturating_sub(width));
        write!(self.out, "\r{}{}{}", HIDE_CURSOR, message, padding).ok();
        self.out.flush().ok();
        self.last_width = width;
    }
}

impl<W: Write> Drop for ProgressPrinter<W> {
    fn drop(&mut self) {
        if self.mode == ProgressMode::Overwrite {
            self.overwrite("");
            write!(self.out, "\r{}", SHOW_CURSOR).ok();
            self.out.flush().ok();
        }
    }
}
