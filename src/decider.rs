use std::fmt;

use log::trace;
use regex::Regex;

use crate::dsl::ProdKind;
use crate::interpreter::{Interpreter, InterpreterError};
use crate::program::{NodePath, Pattern, PatternNode, Program};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Example {
    pub input: String,
    pub label: bool,
}

impl Example {
    pub fn new(input: impl Into<String>, label: bool) -> Self {
        Self {
            input: input.into(),
            label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    /// A sub-language of the program accepts an invalid example.
    AcceptsInvalid,
    /// A node that must match a prefix of a valid example matches none.
    NoPrefix,
    /// Same as `NoPrefix`, for suffixes.
    NoSuffix,
    /// The program could not be evaluated.
    EvaluationError,
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateKind::AcceptsInvalid => write!(f, "accepts_invalid"),
            PredicateKind::NoPrefix => write!(f, "no_prefix"),
            PredicateKind::NoSuffix => write!(f, "no_suffix"),
            PredicateKind::EvaluationError => write!(f, "eval_error"),
        }
    }
}

/// Structural explanation of a rejection. Only used as a pruning hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub kind: PredicateKind,
    pub pattern: Pattern,
    pub witness: Option<String>,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.pattern)?;
        if let Some(witness) = &self.witness {
            write!(f, " on {witness:?}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Ok,
    /// Inconsistent with the examples. The predicates may be empty when no
    /// localized cause was found.
    Bad(Vec<Predicate>),
}

impl Analysis {
    pub fn is_ok(&self) -> bool {
        matches!(self, Analysis::Ok)
    }

    pub fn why(&self) -> Option<&[Predicate]> {
        match self {
            Analysis::Bad(preds) if !preds.is_empty() => Some(preds),
            _ => None,
        }
    }
}

/// Checks programs against the running example set.
pub struct RegexDecider {
    interpreter: Interpreter,
    examples: Vec<Example>,
}

impl RegexDecider {
    pub fn new(interpreter: Interpreter, examples: Vec<Example>) -> Self {
        Self {
            interpreter,
            examples,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn add_example(&mut self, input: impl Into<String>, label: bool) {
        self.examples.push(Example::new(input, label));
    }

    pub fn analyze(&self, program: &Program) -> Analysis {
        let regex = match self.interpreter.compile(program) {
            Ok(regex) => regex,
            Err(e) => return Analysis::Bad(self.analyze_interpreter_error(program, &e)),
        };

        let failed: Vec<&Example> = self.examples.iter()
            .filter(|ex| regex.is_match(&ex.input) != ex.label)
            .collect();

        if failed.is_empty() {
            return Analysis::Ok;
        }

        Analysis::Bad(self.explain(program, &failed))
    }

    /// Turns an evaluation failure into a pruning hint for the offending
    /// construct.
    pub fn analyze_interpreter_error(
        &self,
        program: &Program,
        error: &InterpreterError,
    ) -> Vec<Predicate> {
        let pattern = match error {
            InterpreterError::Arity { path, .. } => program.get(path)
                .map(|node| PatternNode::Node(
                    node.production(),
                    vec![PatternNode::Any; node.children().len()],
                ))
                .map(Pattern::anywhere),
            InterpreterError::IllTyped { path, .. } => Self::bad_child_pattern(program, path),
            InterpreterError::InvalidRange { path, .. } => program.get(path)
                .map(|node| PatternNode::Node(
                    node.production(),
                    node.children().iter()
                        .enumerate()
                        .map(|(idx, c)| if idx == 0 {
                            PatternNode::Any
                        } else {
                            PatternNode::from_program(c)
                        })
                        .collect(),
                ))
                .map(Pattern::anywhere),
            InterpreterError::Compile(_) => None,
        };

        let pattern = pattern
            .unwrap_or_else(|| Pattern::along_path(program, &NodePath::root()));

        vec![Predicate {
            kind: PredicateKind::EvaluationError,
            pattern,
            witness: Some(error.to_string()),
        }]
    }

    fn bad_child_pattern(program: &Program, path: &NodePath) -> Option<Pattern> {
        let parent_path = path.parent()?;
        let parent = program.get(&parent_path)?;
        let bad_idx = *path.indices().last()?;
        let bad = parent.children().get(bad_idx)?;

        let children = (0..parent.children().len())
            .map(|idx| if idx == bad_idx {
                PatternNode::Node(bad.production(), vec![PatternNode::Any; bad.children().len()])
            } else {
                PatternNode::Any
            })
            .collect();

        Some(Pattern::anywhere(PatternNode::Node(parent.production(), children)))
    }

    fn explain(&self, program: &Program, failed: &[&Example]) -> Vec<Predicate> {
        let mut preds = Vec::new();

        let accepted_invalid: Vec<&str> = failed.iter()
            .filter(|ex| !ex.label)
            .map(|ex| ex.input.as_str())
            .collect();
        if !accepted_invalid.is_empty() {
            self.explain_accepted(program, &accepted_invalid, &mut preds);
        }

        for ex in failed.iter().filter(|ex| ex.label) {
            for side in [Side::Prefix, Side::Suffix] {
                if let Some(pred) = self.explain_rejected(program, &ex.input, side) {
                    if !preds.contains(&pred) {
                        preds.push(pred);
                    }
                }
            }
        }

        preds
    }

    /// Every node reachable from the root through union, star, plus and
    /// option edges denotes a subset of the program's language.
    fn explain_accepted(&self, program: &Program, invalid: &[&str], out: &mut Vec<Predicate>) {
        let mut spine = Vec::new();
        self.superset_spine(program, NodePath::root(), &mut spine);

        let hits: Vec<(NodePath, &str)> = spine.into_iter()
            .filter(|path| !path.is_root())
            .filter_map(|path| {
                let node = program.get(&path)?;
                let regex = self.interpreter.compile(node).ok()?;
                let witness = invalid.iter().find(|s| regex.is_match(s))?;
                Some((path, *witness))
            })
            .collect();

        for (path, witness) in &hits {
            let has_deeper_hit = hits.iter().any(|(other, _)| other.is_below(path));
            if has_deeper_hit {
                continue;
            }

            trace!("Node {path} accepts invalid {witness:?}");
            out.push(Predicate {
                kind: PredicateKind::AcceptsInvalid,
                pattern: Pattern::along_path(program, path),
                witness: Some(witness.to_string()),
            });
        }
    }

    fn superset_spine(&self, node: &Program, at: NodePath, out: &mut Vec<NodePath>) {
        let next: &[usize] = match self.interpreter.grammar().get(node.production()).kind {
            ProdKind::Union => &[0, 1],
            ProdKind::Kleene | ProdKind::Posit | ProdKind::Optional => &[0],
            _ => &[],
        };

        for idx in next {
            if let Some(child) = node.children().get(*idx) {
                self.superset_spine(child, at.child(*idx), out);
            }
        }
        out.push(at);
    }

    /// Any word of the program starts (ends) with a word of each node on the
    /// left (right) concatenation chain. Failing nodes are closed upwards,
    /// so the deepest failing one is reported.
    fn explain_rejected(&self, program: &Program, valid: &str, side: Side) -> Option<Predicate> {
        let grammar = self.interpreter.grammar();
        let mut chain = Vec::new();
        let mut at = NodePath::root();
        let mut node = program;

        loop {
            let idx = match (&grammar.get(node.production()).kind, side) {
                (ProdKind::Concat, Side::Prefix) => 0,
                (ProdKind::Concat, Side::Suffix) => 1,
                (ProdKind::Posit, _) => 0,
                _ => break,
            };
            let Some(child) = node.children().get(idx) else { break };

            at = at.child(idx);
            node = child;
            chain.push((at.clone(), node));
        }

        let (path, _) = chain.into_iter()
            .rev()
            .find(|(_, node)| match self.interpreter.compile(node) {
                Ok(regex) => !side.matches_some(&regex, valid),
                Err(_) => false,
            })?;

        trace!("Node {path} has no {side:?} of valid {valid:?}");
        Some(Predicate {
            kind: side.kind(),
            pattern: Pattern::along_path(program, &path),
            witness: Some(valid.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Prefix,
    Suffix,
}

impl Side {
    fn kind(self) -> PredicateKind {
        match self {
            Side::Prefix => PredicateKind::NoPrefix,
            Side::Suffix => PredicateKind::NoSuffix,
        }
    }

    fn matches_some(self, regex: &Regex, s: &str) -> bool {
        let cuts = s.char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(s.len()));

        match self {
            Side::Prefix => cuts.into_iter().any(|idx| regex.is_match(&s[..idx])),
            Side::Suffix => cuts.into_iter().any(|idx| regex.is_match(&s[idx..])),
        }
    }
}
