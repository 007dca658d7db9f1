use std::rc::Rc;

use regex::Regex;
use thiserror::Error;

use crate::dsl::{Grammar, ProdKind, Type};
use crate::program::{NodePath, Program};

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("Node at {path} expects {expected} children, found {found}.")]
    Arity {
        path: NodePath,
        expected: usize,
        found: usize,
    },

    #[error("Node at {path} has type {found}, but {expected} is required here.")]
    IllTyped {
        path: NodePath,
        expected: Type,
        found: Type,
    },

    #[error("Repetition at {path} has inverted bounds {{{min},{max}}}.")]
    InvalidRange {
        path: NodePath,
        min: u32,
        max: u32,
    },

    #[error("Regex engine rejected the program: {0}")]
    Compile(#[from] regex::Error),
}

/// Binding strength of a rendered fragment, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Alt,
    Seq,
    Rep,
    Atom,
}

struct Rendered {
    text: String,
    prec: Prec,
}

impl Rendered {
    fn at_least(self, prec: Prec) -> String {
        if self.prec >= prec {
            self.text
        } else {
            format!("(?:{})", self.text)
        }
    }
}

/// Turns programs into regex source and full-match matchers.
#[derive(Debug, Clone)]
pub struct Interpreter {
    grammar: Rc<Grammar>,
}

impl Interpreter {
    pub fn new(grammar: Rc<Grammar>) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> &Rc<Grammar> {
        &self.grammar
    }

    /// Regex source of the program, without any capture groups.
    pub fn eval(&self, program: &Program) -> Result<String, InterpreterError> {
        self.eval_with_captures(program, &[])
    }

    /// Regex source where every node in `captures` is wrapped in a capture
    /// group. Groups are numbered in pre-order of their paths.
    pub fn eval_with_captures(
        &self,
        program: &Program,
        captures: &[NodePath],
    ) -> Result<String, InterpreterError> {
        let mut at = Vec::new();
        self.render(program, &mut at, captures).map(|r| r.text)
    }

    pub fn compile(&self, program: &Program) -> Result<Regex, InterpreterError> {
        self.compile_with_captures(program, &[])
    }

    pub fn compile_with_captures(
        &self,
        program: &Program,
        captures: &[NodePath],
    ) -> Result<Regex, InterpreterError> {
        let source = self.eval_with_captures(program, captures)?;
        Ok(full_match(&source)?)
    }

    fn render(
        &self,
        program: &Program,
        at: &mut Vec<usize>,
        captures: &[NodePath],
    ) -> Result<Rendered, InterpreterError> {
        let production = self.grammar.get(program.production());
        let children = program.children();

        if production.ret() != Type::Regex {
            return Err(InterpreterError::IllTyped {
                path: at.clone().into(),
                expected: Type::Regex,
                found: production.ret(),
            });
        }
        if children.len() != production.arity() {
            return Err(InterpreterError::Arity {
                path: at.clone().into(),
                expected: production.arity(),
                found: children.len(),
            });
        }

        let child = |idx: usize, at: &mut Vec<usize>| {
            at.push(idx);
            let res = self.render(&children[idx], at, captures);
            at.pop();
            res
        };

        let rendered = match &production.kind {
            ProdKind::Literal(s) => match s.chars().count() {
                0 => Rendered { text: "(?:)".to_string(), prec: Prec::Atom },
                1 => Rendered { text: regex::escape(s), prec: Prec::Atom },
                _ => Rendered { text: regex::escape(s), prec: Prec::Seq },
            },
            ProdKind::Class(class) => Rendered {
                text: class.pattern().to_string(),
                prec: Prec::Atom,
            },
            ProdKind::Concat => {
                let l = child(0, at)?.at_least(Prec::Seq);
                let r = child(1, at)?.at_least(Prec::Seq);
                Rendered { text: format!("{l}{r}"), prec: Prec::Seq }
            },
            ProdKind::Union => {
                let l = child(0, at)?.at_least(Prec::Alt);
                let r = child(1, at)?.at_least(Prec::Alt);
                Rendered { text: format!("{l}|{r}"), prec: Prec::Alt }
            },
            ProdKind::Kleene => Rendered {
                text: format!("{}*", child(0, at)?.at_least(Prec::Atom)),
                prec: Prec::Rep,
            },
            ProdKind::Posit => Rendered {
                text: format!("{}+", child(0, at)?.at_least(Prec::Atom)),
                prec: Prec::Rep,
            },
            ProdKind::Optional => Rendered {
                text: format!("{}?", child(0, at)?.at_least(Prec::Atom)),
                prec: Prec::Rep,
            },
            ProdKind::Copy => {
                let inner = child(0, at)?.at_least(Prec::Atom);
                let n = self.int_child(children, 1, at)?;
                Rendered { text: format!("{inner}{{{n}}}"), prec: Prec::Rep }
            },
            ProdKind::Repeat => {
                let inner = child(0, at)?.at_least(Prec::Atom);
                let min = self.int_child(children, 1, at)?;
                let max = self.int_child(children, 2, at)?;
                if min > max {
                    return Err(InterpreterError::InvalidRange {
                        path: at.clone().into(),
                        min,
                        max,
                    });
                }
                Rendered { text: format!("{inner}{{{min},{max}}}"), prec: Prec::Rep }
            },
            ProdKind::Int(_) => unreachable!("int productions are rejected above"),
        };

        if captures.iter().any(|c| c.indices() == at.as_slice()) {
            return Ok(Rendered {
                text: format!("({})", rendered.text),
                prec: Prec::Atom,
            });
        }

        Ok(rendered)
    }

    fn int_child(
        &self,
        children: &[Program],
        idx: usize,
        at: &[usize],
    ) -> Result<u32, InterpreterError> {
        let node = &children[idx];
        let production = self.grammar.get(node.production());

        match production.kind {
            ProdKind::Int(n) => Ok(n),
            _ => {
                let mut path = at.to_vec();
                path.push(idx);

                Err(InterpreterError::IllTyped {
                    path: path.into(),
                    expected: Type::Int,
                    found: production.ret(),
                })
            },
        }
    }
}

/// Anchors `source` so that the resulting regex only accepts whole inputs.
pub fn full_match(source: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{source})$"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{CharClass, ProdId};

    fn grammar() -> Rc<Grammar> {
        Rc::new(Grammar::builder()
            .literal("a")
            .literal("bc")
            .class(CharClass::Digit)
            .int(2)
            .int(3)
            .operator(ProdKind::Concat)
            .operator(ProdKind::Union)
            .operator(ProdKind::Kleene)
            .operator(ProdKind::Copy)
            .operator(ProdKind::Repeat)
            .build()
            .unwrap())
    }

    fn id(grammar: &Grammar, kind: ProdKind) -> ProdId {
        grammar.find(&kind).unwrap()
    }

    #[test]
    fn precedence_adds_groups_only_when_needed() {
        let g = grammar();
        let interp = Interpreter::new(g.clone());
        let a = Program::leaf(id(&g, ProdKind::Literal("a".into())));
        let bc = Program::leaf(id(&g, ProdKind::Literal("bc".into())));
        let union = Program::node(id(&g, ProdKind::Union), vec![a.clone(), bc.clone()]);
        let concat = Program::node(id(&g, ProdKind::Concat), vec![union.clone(), a.clone()]);
        let star = Program::node(id(&g, ProdKind::Kleene), vec![bc.clone()]);
        let star_star = Program::node(id(&g, ProdKind::Kleene), vec![star.clone()]);

        assert_eq!(interp.eval(&union).unwrap(), "a|bc");
        assert_eq!(interp.eval(&concat).unwrap(), "(?:a|bc)a");
        assert_eq!(interp.eval(&star).unwrap(), "(?:bc)*");
        assert_eq!(interp.eval(&star_star).unwrap(), "(?:(?:bc)*)*");
    }

    #[test]
    fn captures_are_numbered_in_preorder() {
        let g = grammar();
        let interp = Interpreter::new(g.clone());
        let a = Program::leaf(id(&g, ProdKind::Literal("a".into())));
        let digit = Program::leaf(id(&g, ProdKind::Class(CharClass::Digit)));
        let two = Program::leaf(id(&g, ProdKind::Int(2)));
        let digits = Program::node(id(&g, ProdKind::Copy), vec![digit, two]);
        let p = Program::node(id(&g, ProdKind::Concat), vec![a, digits]);

        let captures = [NodePath::from(vec![1]), NodePath::root()];
        let re = interp.compile_with_captures(&p, &captures).unwrap();
        let caps = re.captures("a42").unwrap();

        assert_eq!(&caps[1], "a42");
        assert_eq!(&caps[2], "42");
        assert!(!re.is_match("a4"));
    }

    #[test]
    fn inverted_range_is_an_error() {
        let g = grammar();
        let interp = Interpreter::new(g.clone());
        let p = Program::node(id(&g, ProdKind::Repeat), vec![
            Program::leaf(id(&g, ProdKind::Literal("a".into()))),
            Program::leaf(id(&g, ProdKind::Int(3))),
            Program::leaf(id(&g, ProdKind::Int(2))),
        ]);

        assert!(matches!(
            interp.eval(&p),
            Err(InterpreterError::InvalidRange { min: 3, max: 2, .. })
        ));
    }

    #[test]
    fn ill_typed_child_is_an_error() {
        let g = grammar();
        let interp = Interpreter::new(g.clone());
        let p = Program::node(id(&g, ProdKind::Kleene), vec![
            Program::leaf(id(&g, ProdKind::Int(2))),
        ]);

        match interp.eval(&p) {
            Err(InterpreterError::IllTyped { path, expected, found }) => {
                assert_eq!(path, NodePath::from(vec![0]));
                assert_eq!(expected, Type::Regex);
                assert_eq!(found, Type::Int);
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
