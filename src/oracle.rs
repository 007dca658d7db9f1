use std::io::{BufRead, Write};

use log::info;
use regex::Regex;

use crate::error::{SynthError, SynthResult};
use crate::interpreter::full_match;

pub const YES_VALUES: &[&str] = &["yes", "valid", "true", "1", "+", "v", "y", "t"];
pub const NO_VALUES: &[&str] = &["no", "invalid", "false", "0", "-", "i", "n", "f"];

/// Source of ground truth about inputs the candidates disagree on.
pub trait Oracle {
    /// Should `input` be accepted? May block.
    fn answer(&mut self, input: &str) -> SynthResult<bool>;
}

/// Parses a yes/no answer. Case and surrounding whitespace are ignored.
pub fn parse_answer(line: &str) -> Option<bool> {
    let answer = line.trim().to_lowercase();

    if YES_VALUES.contains(&answer.as_str()) {
        Some(true)
    } else if NO_VALUES.contains(&answer.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Asks a human through a line-based prompt.
pub struct InteractiveOracle<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> InteractiveOracle<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl InteractiveOracle<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Oracle for InteractiveOracle<R, W> {
    fn answer(&mut self, input: &str) -> SynthResult<bool> {
        loop {
            writeln!(self.writer, "Is \"{input}\" valid?")?;
            self.writer.flush()?;

            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(SynthError::OracleClosed);
            }

            match parse_answer(&line) {
                Some(answer) => {
                    info!("\"{input}\" is {}.", if answer { "valid" } else { "invalid" });
                    return Ok(answer);
                },
                None => info!("Invalid answer {:?}! Please answer 'yes' or 'no'.", line.trim()),
            }
        }
    }
}

/// Simulates the user by full-matching against a known regex.
#[derive(Debug, Clone)]
pub struct GroundTruthOracle {
    regex: Regex,
}

impl GroundTruthOracle {
    pub fn new(pattern: impl Into<String>) -> SynthResult<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(SynthError::MissingGroundTruth);
        }

        let regex = full_match(&pattern)
            .map_err(|source| SynthError::InvalidGroundTruth { pattern, source })?;

        Ok(Self { regex })
    }
}

impl Oracle for GroundTruthOracle {
    fn answer(&mut self, input: &str) -> SynthResult<bool> {
        let answer = self.regex.is_match(input);
        info!("Auto: \"{input}\" is {}.", if answer { "valid" } else { "invalid" });

        Ok(answer)
    }
}
