//! Writing command output and error reports.

use std::io::{self, Write};

use is_terminal::IsTerminal;

use crate::bridge::format::Palette;
use crate::error::{AppError, Severity};

/// Where a command writes what it has to say.
///
/// Commands write into any `Write` so tests can capture the output.
pub struct Console<W: Write> {
    out: W,
    palette: Palette,
}

impl Console<io::Stdout> {
    /// Standard output, coloured when it is a terminal.
    pub fn stdout() -> Self {
        Self::new(io::stdout(), Palette::detect())
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W, palette: Palette) -> Self {
        Self { out, palette }
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    /// Write one block of text followed by a newline.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// The single line an error is reported with, coloured by severity.
pub fn error_line(err: &AppError, palette: Palette) -> String {
    let message = err.user_message();
    match err.severity() {
        Severity::Critical => palette.red(&message),
        Severity::Warning => palette.yellow(&message),
    }
}

/// Report an error on stderr.
pub fn print_error(err: &AppError) {
    let palette = stderr_palette();
    let _ = writeln!(io::stderr(), "{}", error_line(err, palette));
}

fn stderr_palette() -> Palette {
    if io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none() {
        Palette::colored()
    } else {
        Palette::plain()
    }
}
