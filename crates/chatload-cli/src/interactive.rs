//! Line-based questions for interactive configuration.

use std::io::{self, BufRead, Write};

use chatload_core::PromptCategory;

/// Asks questions on `output` and reads answers from `input`.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    /// Prompter over the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Ask until a non-empty answer is given (or the default applies).
    pub fn ask(&mut self, question: &str, default: Option<&str>) -> io::Result<String> {
        loop {
            match default {
                Some(d) => write!(self.output, "{question} [{d}]: ")?,
                None => write!(self.output, "{question}: ")?,
            }
            self.output.flush()?;

            let Some(answer) = self.read_line()? else {
                return default.map(str::to_string).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "input closed")
                });
            };
            if !answer.is_empty() {
                return Ok(answer);
            }
            if let Some(d) = default {
                return Ok(d.to_string());
            }
        }
    }

    /// Ask for an optional value; empty means none.
    pub fn ask_optional(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}: ")?;
        self.output.flush()?;
        Ok(self.read_line()?.filter(|a| !a.is_empty()))
    }

    pub fn ask_category(&mut self) -> io::Result<PromptCategory> {
        let names: Vec<&str> = PromptCategory::ALL.iter().map(|c| c.as_str()).collect();
        let question = format!("Prompt category ({})", names.join(", "));
        loop {
            let answer = self.ask(&question, Some(PromptCategory::default().as_str()))?;
            match answer.parse() {
                Ok(category) => return Ok(category),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        }
    }

    /// Collect custom prompts until an empty line.
    pub fn ask_prompts(&mut self) -> io::Result<Vec<String>> {
        writeln!(self.output, "Enter prompts, one per line (empty line to finish):")?;
        let mut prompts = Vec::new();
        loop {
            write!(self.output, "  {}> ", prompts.len() + 1)?;
            self.output.flush()?;
            match self.read_line()? {
                Some(line) if !line.is_empty() => prompts.push(line),
                _ => return Ok(prompts),
            }
        }
    }

    pub fn ask_number(&mut self, question: &str, default: f64) -> io::Result<f64> {
        let default = default.to_string();
        loop {
            let answer = self.ask(question, Some(&default))?;
            match answer.parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => return Ok(n),
                _ => writeln!(self.output, "Please enter a non-negative number")?,
            }
        }
    }

    pub fn ask_count(&mut self, question: &str, default: u32) -> io::Result<u32> {
        let default = default.to_string();
        loop {
            let answer = self.ask(question, Some(&default))?;
            match answer.parse::<u32>() {
                Ok(n) if n >= 1 => return Ok(n),
                _ => writeln!(self.output, "Please enter a whole number of at least 1")?,
            }
        }
    }
}
