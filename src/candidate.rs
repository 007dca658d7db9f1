use std::fmt;

use regex::Regex;

use crate::capturer::{Captures, Condition};
use crate::interpreter::{Interpreter, InterpreterError};
use crate::program::{NodePath, Program};

/// An accepted program together with what was synthesized for it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub program: Program,
    pub captures: Captures,
    pub conditions: Vec<Condition>,
    matcher: Regex,
}

impl Candidate {
    pub fn new(
        interpreter: &Interpreter,
        program: Program,
        captures: Captures,
        conditions: Vec<Condition>,
    ) -> Result<Self, InterpreterError> {
        let matcher = interpreter.compile(&program)?;

        Ok(Self {
            program,
            captures,
            conditions,
            matcher,
        })
    }

    /// Whether the program itself (conditions aside) accepts `input`.
    pub fn accepts(&self, input: &str) -> bool {
        self.matcher.is_match(input)
    }

    pub fn size(&self) -> usize {
        self.program.size()
    }
}

/// The winning candidate, rendered for reporting.
#[derive(Debug, Clone)]
pub struct Solution {
    pub program: Program,
    pub captures: Captures,
    pub conditions: Vec<Condition>,
    /// Regex source with a group for every capture slot and every
    /// conditioned node.
    pub regex: String,
    pub depth: usize,
    groups: Vec<NodePath>,
}

impl Solution {
    pub fn new(
        interpreter: &Interpreter,
        candidate: Candidate,
        depth: usize,
    ) -> Result<Self, InterpreterError> {
        let mut groups: Vec<NodePath> = candidate.captures.slots().to_vec();
        for cond in &candidate.conditions {
            if !groups.contains(&cond.path) {
                groups.push(cond.path.clone());
            }
        }
        groups.sort();

        let regex = interpreter.eval_with_captures(&candidate.program, &groups)?;

        Ok(Self {
            program: candidate.program,
            captures: candidate.captures,
            conditions: candidate.conditions,
            regex,
            depth,
            groups,
        })
    }

    /// Groups in `regex`: the capture slots plus the conditioned nodes.
    pub fn capture_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn nodes(&self) -> usize {
        self.program.size()
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.regex)?;

        // `$i` counts groups from 1, as `regex` numbers them
        for (group, path) in self.groups.iter().enumerate() {
            for cond in self.conditions.iter().filter(|c| c.path == *path) {
                write!(f, ", ${} {} {}", group + 1, cond.op, cond.bound)?;
            }
        }

        Ok(())
    }
}
