// src/output.rs

//! User-facing output
//!
//! Change lines, summaries and diagnostic reports are user output, not logs.
//! They go through [`Output`], which writes to the terminal or captures
//! everything into a buffer so tests can assert on exact text.

use std::io::Write;

/// Width used when the terminal width is unknown
const DEFAULT_WIDTH: usize = 80;

/// Units for [`human_size`], each 1024 times the previous
const SIZE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Scale `size` down by 1024 while it has five or more digits
pub fn human_size(size: u64) -> (u64, &'static str) {
    let mut value = size;
    let mut unit = 0;
    while value >= 10000 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024;
        unit += 1;
    }
    (value, SIZE_UNITS[unit])
}

/// Where user output ends up
#[derive(Debug)]
enum Sink {
    Terminal,
    Capture(String),
}

/// Verbosity-aware output channel
///
/// Verbosity 0 is quiet, 1 is the default, 2 and above add detail.
#[derive(Debug)]
pub struct Output {
    verbosity: i32,
    width: usize,
    sink: Sink,
}

impl Output {
    /// Output to stdout/stderr
    pub fn terminal(verbosity: i32) -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|c| c.parse().ok())
            .filter(|w: &usize| *w > 0)
            .unwrap_or(DEFAULT_WIDTH);
        Self {
            verbosity,
            width,
            sink: Sink::Terminal,
        }
    }

    /// Output into an in-memory buffer; stdout and stderr are interleaved
    pub fn capture(verbosity: i32) -> Self {
        Self {
            verbosity,
            width: DEFAULT_WIDTH,
            sink: Sink::Capture(String::new()),
        }
    }

    pub fn verbosity(&self) -> i32 {
        self.verbosity
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Everything captured so far (empty for terminal output)
    pub fn captured(&self) -> &str {
        match &self.sink {
            Sink::Capture(buf) => buf,
            Sink::Terminal => "",
        }
    }

    pub fn write_out(&mut self, text: &str) {
        match &mut self.sink {
            Sink::Capture(buf) => buf.push_str(text),
            Sink::Terminal => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
        }
    }

    pub fn write_err(&mut self, text: &str) {
        match &mut self.sink {
            Sink::Capture(buf) => buf.push_str(text),
            Sink::Terminal => {
                let _ = std::io::stderr().lock().write_all(text.as_bytes());
            }
        }
    }

    /// Normal message, shown at default verbosity
    pub fn msg(&mut self, text: &str) {
        if self.verbosity >= 1 {
            self.write_out(&format!("{}\n", text));
        }
    }

    /// Detail, shown from verbosity 2
    pub fn detail(&mut self, text: &str) {
        if self.verbosity >= 2 {
            self.write_out(&format!("{}\n", text));
        }
    }

    /// Always shown
    pub fn error(&mut self, text: &str) {
        self.write_err(&format!("ERROR: {}\n", text));
    }

    /// Shown unless quiet
    pub fn warning(&mut self, text: &str) {
        if self.verbosity >= 0 {
            self.write_err(&format!("WARNING: {}\n", text));
        }
    }

    /// Start an indented, word-wrapped block
    pub fn indent(&mut self, to_stderr: bool) -> Indent<'_> {
        Indent {
            width: self.width,
            out: self,
            to_stderr,
            x: 0,
            indent: 0,
        }
    }
}

/// Word-wrapping writer for grouped lists
///
/// A group starts with a heading; items follow on the same line and wrap to
/// the column after the heading once the line would exceed the width.
pub struct Indent<'a> {
    out: &'a mut Output,
    to_stderr: bool,
    width: usize,
    x: usize,
    indent: usize,
}

impl Indent<'_> {
    fn write(&mut self, text: &str) {
        if self.to_stderr {
            self.out.write_err(text);
        } else {
            self.out.write_out(text);
        }
    }

    /// Current column; zero at the start of a line
    pub fn column(&self) -> usize {
        self.x
    }

    /// A complete line of text, outside any group
    pub fn line(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
        self.x = 0;
        self.indent = 0;
    }

    /// Start a group heading
    ///
    /// With `indent == 0` continuation lines align one past the heading.
    /// A heading ending in a newline puts its items on the following lines.
    pub fn group(&mut self, indent: usize, heading: &str) {
        self.write(heading);
        self.x = heading.len();
        self.indent = if indent > 0 { indent } else { self.x + 1 };
        if heading.ends_with('\n') {
            self.x = 0;
        }
    }

    /// One item of the current group
    pub fn item(&mut self, text: &str) {
        if self.x <= self.indent {
            let pad = " ".repeat(self.indent - self.x);
            self.write(&format!("{}{}", pad, text));
            self.x = self.indent + text.len();
        } else if self.x + text.len() + 1 >= self.width {
            let pad = " ".repeat(self.indent);
            self.write(&format!("\n{}{}", pad, text));
            self.x = self.indent + text.len();
        } else {
            self.write(&format!(" {}", text));
            self.x += text.len() + 1;
        }
    }

    /// Each whitespace-separated word of `text` as an item
    pub fn words(&mut self, text: &str) {
        for word in text.split_whitespace() {
            self.item(word);
        }
    }

    /// Finish the current line, if anything is on it
    pub fn end(&mut self) {
        if self.x > 0 {
            self.write("\n");
            self.x = 0;
            self.indent = 0;
        }
    }
}
