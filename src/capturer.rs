use std::fmt;

use log::{debug, trace};
use regex::Regex;

use crate::dsl::Type;
use crate::error::{SynthError, SynthResult};
use crate::interpreter::Interpreter;
use crate::program::{NodePath, Program};

/// Capture group placement, one node per capture slot, in slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Captures(Vec<NodePath>);

impl Captures {
    pub fn new(slots: Vec<NodePath>) -> Self {
        Self(slots)
    }

    pub fn slots(&self) -> &[NodePath] {
        &self.0
    }

    /// Regex group number of a slot once the program is rendered with
    /// these captures.
    pub fn group_of(&self, slot: usize) -> Option<usize> {
        let path = self.0.get(slot)?;
        Some(1 + self.0.iter().filter(|other| *other < path).count())
    }

    /// Texts captured for each slot, or `None` if the input is rejected or
    /// a group did not participate in the match.
    pub fn extract(&self, regex: &Regex, input: &str) -> Option<Vec<String>> {
        let caps = regex.captures(input)?;

        (0..self.0.len())
            .map(|slot| {
                let group = self.group_of(slot)?;
                caps.get(group).map(|m| m.as_str().to_string())
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Le,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Le => write!(f, "<="),
            CmpOp::Ge => write!(f, ">="),
        }
    }
}

/// Guard on the integer value captured at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition {
    pub path: NodePath,
    pub op: CmpOp,
    pub bound: u64,
}

impl Condition {
    pub fn holds(&self, value: u64) -> bool {
        match self.op {
            CmpOp::Le => value <= self.bound,
            CmpOp::Ge => value >= self.bound,
        }
    }
}

/// Synthesizes capture groups and capture conditions for an accepted
/// program.
pub struct Capturer {
    interpreter: Interpreter,
    valid: Vec<String>,
    targets: Vec<Vec<String>>,
    condition_invalid: Vec<String>,
}

impl Capturer {
    /// `targets` holds one row of expected captures per valid example, or
    /// nothing if no captures are wanted.
    pub fn new(
        interpreter: Interpreter,
        valid: Vec<String>,
        targets: Vec<Vec<String>>,
        condition_invalid: Vec<String>,
    ) -> SynthResult<Self> {
        if !targets.is_empty() && targets.len() != valid.len() {
            return Err(SynthError::CaptureArity {
                expected: valid.len(),
                found: targets.len(),
            });
        }
        let slots = targets.first().map_or(0, Vec::len);
        if let Some(row) = targets.iter().find(|row| row.len() != slots) {
            return Err(SynthError::CaptureArity {
                expected: slots,
                found: row.len(),
            });
        }

        Ok(Self {
            interpreter,
            valid,
            targets,
            condition_invalid,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.targets.first().map_or(0, Vec::len)
    }

    pub fn synthesize_capturing_groups(&self, program: &Program) -> Option<Captures> {
        let nodes = self.regex_nodes(program);
        let mut chosen: Vec<NodePath> = Vec::with_capacity(self.slot_count());

        for slot in 0..self.slot_count() {
            let found = nodes.iter()
                .filter(|path| !chosen.contains(path))
                .find(|path| self.captures_slot(program, path, slot))?;

            trace!("Capture slot {slot} at {found}");
            chosen.push(found.clone());
        }

        let captures = Captures::new(chosen);
        if !self.verify(program, &captures) {
            debug!("Capture placement {captures:?} does not hold jointly");
            return None;
        }

        Some(captures)
    }

    /// Re-evaluates the captured program against every valid example.
    pub fn verify(&self, program: &Program, captures: &Captures) -> bool {
        let Ok(regex) = self.interpreter.compile_with_captures(program, captures.slots()) else {
            return false;
        };

        self.valid.iter()
            .zip(&self.targets)
            .all(|(input, expected)| captures.extract(&regex, input).as_ref() == Some(expected))
    }

    fn captures_slot(&self, program: &Program, path: &NodePath, slot: usize) -> bool {
        let single = Captures::new(vec![path.clone()]);
        let Ok(regex) = self.interpreter.compile_with_captures(program, single.slots()) else {
            return false;
        };

        self.valid.iter()
            .zip(&self.targets)
            .all(|(input, expected)| match single.extract(&regex, input) {
                Some(texts) => texts[0] == expected[slot],
                None => false,
            })
    }

    fn regex_nodes(&self, program: &Program) -> Vec<NodePath> {
        let grammar = self.interpreter.grammar();

        program.paths()
            .into_iter()
            .filter(|path| program.get(path)
                .is_some_and(|node| grammar.get(node.production()).ret() == Type::Regex))
            .collect()
    }

    /// Looks for integer guards on captured values that reject every
    /// condition-invalid example the program still accepts, while keeping
    /// every valid one. Best effort: `None` means no such guards were found.
    pub fn synthesize_capture_conditions(&self, program: &Program) -> Option<Vec<Condition>> {
        let Ok(regex) = self.interpreter.compile(program) else {
            return None;
        };
        let mut residual: Vec<&str> = self.condition_invalid.iter()
            .map(String::as_str)
            .filter(|s| regex.is_match(s))
            .collect();
        if residual.is_empty() {
            return Some(Vec::new());
        }

        let numeric = self.numeric_nodes(program);
        let mut conditions = Vec::new();

        while !residual.is_empty() {
            // earliest node in pre-order wins ties
            let mut best: Option<(Condition, Vec<&str>)> = None;
            for guard in numeric.iter().flat_map(|node| node.guards(&residual)) {
                if best.as_ref().map_or(true, |(_, rejected)| guard.1.len() > rejected.len()) {
                    best = Some(guard);
                }
            }
            let (condition, rejected) = best?;

            debug!("Condition {} {} {} rejects {rejected:?}", condition.path, condition.op, condition.bound);
            residual.retain(|s| !rejected.contains(s));
            conditions.push(condition);
        }

        Some(conditions)
    }

    /// Nodes whose captured text is an integer on every valid example.
    fn numeric_nodes(&self, program: &Program) -> Vec<NumericNode> {
        self.regex_nodes(program)
            .into_iter()
            .filter_map(|path| {
                let regex = self.interpreter
                    .compile_with_captures(program, std::slice::from_ref(&path))
                    .ok()?;
                let values = self.valid.iter()
                    .map(|input| captured_int(&regex, input))
                    .collect::<Option<Vec<u64>>>()?;

                Some(NumericNode {
                    min: *values.iter().min()?,
                    max: *values.iter().max()?,
                    path,
                    regex,
                })
            })
            .collect()
    }
}

struct NumericNode {
    path: NodePath,
    regex: Regex,
    min: u64,
    max: u64,
}

impl NumericNode {
    /// The loosest upper and lower bounds that reject part of `residual`.
    fn guards<'a>(&self, residual: &[&'a str]) -> Vec<(Condition, Vec<&'a str>)> {
        let values: Vec<(&str, u64)> = residual.iter()
            .filter_map(|s| captured_int(&self.regex, s).map(|v| (*s, v)))
            .collect();
        let mut guards = Vec::new();

        let above: Vec<_> = values.iter().filter(|(_, v)| *v > self.max).collect();
        if let Some(lowest) = above.iter().map(|(_, v)| *v).min() {
            guards.push((
                Condition { path: self.path.clone(), op: CmpOp::Le, bound: lowest - 1 },
                above.iter().map(|(s, _)| *s).collect(),
            ));
        }

        let below: Vec<_> = values.iter().filter(|(_, v)| *v < self.min).collect();
        if let Some(highest) = below.iter().map(|(_, v)| *v).max() {
            guards.push((
                Condition { path: self.path.clone(), op: CmpOp::Ge, bound: highest + 1 },
                below.iter().map(|(s, _)| *s).collect(),
            ));
        }

        guards
    }
}

fn captured_int(regex: &Regex, input: &str) -> Option<u64> {
    let text = regex.captures(input)?.get(1)?.as_str();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
