use std::collections::BTreeSet;

use log::{debug, trace};

use crate::candidate::Candidate;
use crate::decider::Example;
use crate::dsl::ProdKind;
use crate::interpreter::Interpreter;
use crate::program::Program;

pub const DEFAULT_MAX_LEN: usize = 4;
pub const DEFAULT_BUDGET: usize = 4000;
const SAMPLES_PER_NODE: usize = 12;

/// Verdict of one distinguishing round. The keep sets hold indices into
/// the candidate slice that was distinguished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distinction {
    pub input: Option<String>,
    pub keep_if_valid: Vec<usize>,
    pub keep_if_invalid: Vec<usize>,
    pub undetermined: Vec<usize>,
}

/// Searches for inputs that separate accepted candidates. The explored
/// inputs are every word over the alphabet up to `max_len` characters
/// (at most `budget` of them), plus words sampled from each candidate, in
/// shortlex order.
pub struct Distinguisher {
    interpreter: Interpreter,
    alphabet: Vec<char>,
    max_len: usize,
    budget: usize,
}

impl Distinguisher {
    pub fn new(interpreter: Interpreter, examples: &[Example]) -> Self {
        Self::with_limits(interpreter, examples, DEFAULT_MAX_LEN, DEFAULT_BUDGET)
    }

    pub fn with_limits(
        interpreter: Interpreter,
        examples: &[Example],
        max_len: usize,
        budget: usize,
    ) -> Self {
        let mut alphabet: BTreeSet<char> = examples.iter()
            .flat_map(|ex| ex.input.chars())
            .collect();
        for prod in interpreter.grammar().productions() {
            match &prod.kind {
                ProdKind::Literal(s) => alphabet.extend(s.chars()),
                ProdKind::Class(class) => alphabet.extend(class.representatives()),
                _ => (),
            }
        }

        debug!("Distinguishing over alphabet {alphabet:?}");

        Self {
            interpreter,
            alphabet: alphabet.into_iter().collect(),
            max_len,
            budget,
        }
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Every input explored for these candidates, in exploration order.
    pub fn inputs(&self, candidates: &[Candidate]) -> Vec<String> {
        let mut inputs = self.words();
        for cand in candidates {
            inputs.extend(self.sample(&cand.program));
        }

        inputs.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        inputs.dedup();

        inputs
    }

    pub fn distinguish(&self, candidates: &[Candidate]) -> Distinction {
        let Some(first) = candidates.first() else {
            return Distinction::default();
        };

        for input in self.inputs(candidates) {
            let expected = first.accepts(&input);
            let Some(split) = candidates.iter().position(|c| c.accepts(&input) != expected) else {
                continue;
            };

            trace!("{input:?} separates candidate 0 from candidate {split}");

            let mut res = Distinction {
                input: None,
                keep_if_valid: Vec::new(),
                keep_if_invalid: Vec::new(),
                undetermined: (split + 1..candidates.len()).collect(),
            };
            for idx in 0..=split {
                // Everything before `split` agreed with the first one
                let accepted = (idx == split) != expected;
                if accepted {
                    res.keep_if_valid.push(idx);
                } else {
                    res.keep_if_invalid.push(idx);
                }
            }
            res.input = Some(input);

            return res;
        }

        debug!("{} candidates are indistinguishable", candidates.len());

        Distinction {
            undetermined: (0..candidates.len()).collect(),
            ..Distinction::default()
        }
    }

    /// All words over the alphabet up to `max_len`, shortest first.
    fn words(&self) -> Vec<String> {
        let mut words = vec![String::new()];
        let mut level = vec![String::new()];

        for _ in 0..self.max_len {
            let mut next = Vec::new();
            for w in &level {
                for c in &self.alphabet {
                    if words.len() + next.len() >= self.budget {
                        break;
                    }
                    next.push(format!("{w}{c}"));
                }
            }

            words.extend(next.iter().cloned());
            level = next;
            if words.len() >= self.budget || level.is_empty() {
                break;
            }
        }

        words
    }

    /// A handful of words from the language of `program`.
    fn sample(&self, program: &Program) -> Vec<String> {
        let grammar = self.interpreter.grammar();
        let children = program.children();
        let sub = |idx: usize| children.get(idx)
            .map(|c| self.sample(c))
            .unwrap_or_default();
        let int = |idx: usize| children.get(idx)
            .and_then(|c| match grammar.get(c.production()).kind {
                ProdKind::Int(n) => Some(n as usize),
                _ => None,
            });

        let mut words: Vec<String> = match &grammar.get(program.production()).kind {
            ProdKind::Literal(s) => vec![s.clone()],
            ProdKind::Class(class) => class.representatives().iter().map(char::to_string).collect(),
            ProdKind::Int(_) => Vec::new(),
            ProdKind::Concat => {
                let (left, right) = (sub(0), sub(1));
                left.iter()
                    .flat_map(|l| right.iter().map(move |r| format!("{l}{r}")))
                    .collect()
            },
            ProdKind::Union => interleave(sub(0), sub(1)),
            ProdKind::Kleene => std::iter::once(String::new())
                .chain(sub(0).into_iter().flat_map(|w| [w.clone(), w.repeat(2)]))
                .collect(),
            ProdKind::Posit => sub(0).into_iter()
                .flat_map(|w| [w.clone(), w.repeat(2)])
                .collect(),
            ProdKind::Optional => std::iter::once(String::new())
                .chain(sub(0))
                .collect(),
            ProdKind::Copy => match int(1) {
                Some(n) => sub(0).iter().map(|w| w.repeat(n)).collect(),
                None => Vec::new(),
            },
            ProdKind::Repeat => match (int(1), int(2)) {
                (Some(min), Some(max)) => sub(0).into_iter()
                    .flat_map(|w| [w.repeat(min), w.repeat(max)])
                    .collect(),
                _ => Vec::new(),
            },
        };

        words.truncate(SAMPLES_PER_NODE);
        words
    }
}

fn interleave(left: Vec<String>, right: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter();
    let mut right = right.into_iter();

    loop {
        match (left.next(), right.next()) {
            (None, None) => break,
            (l, r) => {
                out.extend(l);
                out.extend(r);
            },
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::capturer::Captures;
    use crate::dsl::{Grammar, ProdId};

    // a, c, union, concat
    fn setup() -> (Interpreter, Vec<Example>) {
        let grammar = Grammar::builder()
            .literal("a")
            .literal("c")
            .operator(ProdKind::Union)
            .operator(ProdKind::Concat)
            .build()
            .unwrap();
        let examples = vec![Example::new("a", true), Example::new("b", false)];

        (Interpreter::new(Rc::new(grammar)), examples)
    }

    fn cand(interp: &Interpreter, program: Program) -> Candidate {
        Candidate::new(interp, program, Captures::new(Vec::new()), Vec::new()).unwrap()
    }

    fn a() -> Program {
        Program::leaf(ProdId(0))
    }

    fn a_or_c() -> Program {
        Program::node(ProdId(2), vec![Program::leaf(ProdId(0)), Program::leaf(ProdId(1))])
    }

    #[test]
    fn separating_input_partitions_candidates() {
        let (interp, examples) = setup();
        let d = Distinguisher::new(interp.clone(), &examples);
        let cands = vec![cand(&interp, a()), cand(&interp, a_or_c())];

        let res = d.distinguish(&cands);

        assert_eq!(res.input.as_deref(), Some("c"));
        assert_eq!(res.keep_if_valid, vec![1]);
        assert_eq!(res.keep_if_invalid, vec![0]);
        assert!(res.undetermined.is_empty());
    }

    #[test]
    fn unevaluated_candidates_are_undetermined() {
        let (interp, examples) = setup();
        let d = Distinguisher::new(interp.clone(), &examples);
        let cands = vec![cand(&interp, a()), cand(&interp, a_or_c()), cand(&interp, a())];

        let res = d.distinguish(&cands);

        assert_eq!(res.input.as_deref(), Some("c"));
        assert_eq!(res.undetermined, vec![2]);
    }

    #[test]
    fn same_language_is_indistinguishable() {
        let (interp, examples) = setup();
        let d = Distinguisher::new(interp.clone(), &examples);
        let a_or_a = Program::node(ProdId(2), vec![a(), a()]);
        let cands = vec![cand(&interp, a_or_a), cand(&interp, a())];

        let res = d.distinguish(&cands);

        assert_eq!(res.input, None);
        assert_eq!(res, d.distinguish(&cands));
    }

    #[test]
    fn distinguishing_is_idempotent() {
        let (interp, examples) = setup();
        let d = Distinguisher::new(interp.clone(), &examples);
        let cands = vec![cand(&interp, a()), cand(&interp, a_or_c())];

        assert_eq!(d.distinguish(&cands), d.distinguish(&cands));
    }

    #[test]
    fn sampled_words_reach_past_the_length_bound() {
        let (interp, examples) = setup();
        let d = Distinguisher::with_limits(interp.clone(), &examples, 0, 1);
        let cat = |l: Program, r: Program| Program::node(ProdId(3), vec![l, r]);
        let aac = cat(a(), cat(a(), Program::leaf(ProdId(1))));
        let aaa = cat(a(), cat(a(), a()));
        let cands = vec![cand(&interp, aac), cand(&interp, aaa)];

        let res = d.distinguish(&cands);

        assert_eq!(res.input.as_deref(), Some("aaa"));
        assert_eq!(res.keep_if_invalid, vec![0]);
        assert_eq!(res.keep_if_valid, vec![1]);
    }

    #[test]
    fn words_are_shortlex() {
        let (interp, examples) = setup();
        let d = Distinguisher::with_limits(interp, &examples, 2, 100);

        assert_eq!(d.alphabet(), &['a', 'b', 'c']);
        let inputs = d.inputs(&[]);
        assert_eq!(inputs.len(), 1 + 3 + 9);
        assert_eq!(&inputs[..5], &["", "a", "b", "c", "aa"]);
    }
}
