//! Terminal side of the first-run setup: line prompts and framed banners.

use std::io::{self, BufRead, Write};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Where setup answers come from.
pub trait SetupSource {
    /// Shows `prompt` and reads one answer. `Ok(None)` means the input was closed.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Shows a framed status message between prompts.
    fn announce(&mut self, _tone: Tone, _title: &str, _message: &str) {}
}

/// Reads answers line by line from a buffered reader, echoing prompts to a writer.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> SetupSource for Console<R, W> {
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{prompt} > ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn announce(&mut self, tone: Tone, title: &str, message: &str) {
        let framed = panel(title, message);
        // Best effort, a broken terminal surfaces on the next prompt.
        let _ = writeln!(self.output, "{}{framed}{RESET}", tone.color());
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Tone {
    Info,
    Success,
    Error,
}

impl Tone {
    fn color(self) -> &'static str {
        match self {
            Tone::Info => YELLOW,
            Tone::Success => GREEN,
            Tone::Error => RED,
        }
    }
}

/// Draws `message` inside a box whose top edge carries `title`.
pub fn panel(title: &str, message: &str) -> String {
    let width = message
        .lines()
        .map(|l| l.chars().count())
        .chain(std::iter::once(title.chars().count() + 2))
        .max()
        .unwrap_or(0);
    let mut out = format!("╭─ {title} {}╮\n", "─".repeat(width - title.chars().count() - 1));
    for line in message.lines() {
        let pad = width - line.chars().count();
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("╰{}╯", "─".repeat(width + 2)));
    out
}

pub fn banner(tone: Tone, title: &str, message: &str) {
    let framed = panel(title, message);
    match tone {
        Tone::Error => eprintln!("{}{framed}{RESET}", tone.color()),
        _ => println!("{}{framed}{RESET}", tone.color()),
    }
}
