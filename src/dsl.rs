use std::collections::BTreeSet;
use std::fmt;

use log::debug;

use crate::error::{SynthError, SynthResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Regex,
    Int,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Regex => write!(f, "regex"),
            Type::Int => write!(f, "int"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProdId(pub usize);

impl fmt::Display for ProdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Digit,
    Lower,
    Upper,
    Alpha,
    Alnum,
}

impl CharClass {
    pub fn pattern(&self) -> &'static str {
        match self {
            CharClass::Digit => "[0-9]",
            CharClass::Lower => "[a-z]",
            CharClass::Upper => "[A-Z]",
            CharClass::Alpha => "[a-zA-Z]",
            CharClass::Alnum => "[a-zA-Z0-9]",
        }
    }

    pub fn contains(&self, c: char) -> bool {
        match self {
            CharClass::Digit => c.is_ascii_digit(),
            CharClass::Lower => c.is_ascii_lowercase(),
            CharClass::Upper => c.is_ascii_uppercase(),
            CharClass::Alpha => c.is_ascii_alphabetic(),
            CharClass::Alnum => c.is_ascii_alphanumeric(),
        }
    }

    /// A few members of the class, used to build inputs from it.
    pub fn representatives(&self) -> &'static [char] {
        match self {
            CharClass::Digit => &['0', '1', '9'],
            CharClass::Lower => &['a', 'b', 'z'],
            CharClass::Upper => &['A', 'B', 'Z'],
            CharClass::Alpha => &['a', 'Z'],
            CharClass::Alnum => &['a', 'Z', '0'],
        }
    }

    fn of(c: char) -> Option<CharClass> {
        [CharClass::Digit, CharClass::Lower, CharClass::Upper]
            .into_iter()
            .find(|class| class.contains(c))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProdKind {
    Literal(String),
    Class(CharClass),
    Int(u32),
    Concat,
    Union,
    Kleene,
    Posit,
    Optional,
    Copy,
    Repeat,
}

impl ProdKind {
    pub fn ret(&self) -> Type {
        match self {
            ProdKind::Int(_) => Type::Int,
            _ => Type::Regex,
        }
    }

    pub fn args(&self) -> &'static [Type] {
        match self {
            ProdKind::Literal(_) | ProdKind::Class(_) | ProdKind::Int(_) => &[],
            ProdKind::Concat | ProdKind::Union => &[Type::Regex, Type::Regex],
            ProdKind::Kleene | ProdKind::Posit | ProdKind::Optional => &[Type::Regex],
            ProdKind::Copy => &[Type::Regex, Type::Int],
            ProdKind::Repeat => &[Type::Regex, Type::Int, Type::Int],
        }
    }

    pub fn arity(&self) -> usize {
        self.args().len()
    }

    pub fn is_terminal(&self) -> bool {
        self.arity() == 0
    }
}

impl fmt::Display for ProdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProdKind::Literal(s) => write!(f, "\"{s}\""),
            ProdKind::Class(c) => write!(f, "{}", c.pattern()),
            ProdKind::Int(n) => write!(f, "{n}"),
            ProdKind::Concat => write!(f, "concat"),
            ProdKind::Union => write!(f, "union"),
            ProdKind::Kleene => write!(f, "kleene"),
            ProdKind::Posit => write!(f, "posit"),
            ProdKind::Optional => write!(f, "option"),
            ProdKind::Copy => write!(f, "copy"),
            ProdKind::Repeat => write!(f, "range"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Production {
    pub id: ProdId,
    pub kind: ProdKind,
}

impl Production {
    pub fn ret(&self) -> Type {
        self.kind.ret()
    }

    pub fn args(&self) -> &'static [Type] {
        self.kind.args()
    }

    pub fn arity(&self) -> usize {
        self.kind.arity()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// A typed production system. Production ids are indices into
/// `productions`, so their order is the enumeration order.
#[derive(Debug, Clone)]
pub struct Grammar {
    productions: Vec<Production>,
    start: Type,
}

impl Grammar {
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::new()
    }

    pub fn start(&self) -> Type {
        self.start
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    // NOTE: ids only come from this grammar, an out of range id is a bug
    pub fn get(&self, id: ProdId) -> &Production {
        &self.productions[id.0]
    }

    pub fn find(&self, kind: &ProdKind) -> Option<ProdId> {
        self.productions.iter()
            .find(|p| &p.kind == kind)
            .map(|p| p.id)
    }

    pub fn of_type(&self, ty: Type) -> impl Iterator<Item = &Production> + '_ {
        self.productions.iter().filter(move |p| p.ret() == ty)
    }

    pub fn terminals_of(&self, ty: Type) -> impl Iterator<Item = &Production> + '_ {
        self.of_type(ty).filter(|p| p.is_terminal())
    }

    pub fn operators(&self) -> impl Iterator<Item = &Production> + '_ {
        self.productions.iter().filter(|p| !p.is_terminal())
    }

    pub fn max_arity(&self) -> usize {
        self.productions.iter()
            .map(Production::arity)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    kinds: Vec<ProdKind>,
    start: Type,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self {
            kinds: Vec::new(),
            start: Type::Regex,
        }
    }

    /// Derives the default regex DSL from the examples: character classes
    /// and separator literals seen in the valid examples, and the lengths
    /// of same-class runs as repetition counts.
    pub fn from_examples(valid: &[String], invalid: &[String]) -> SynthResult<Self> {
        if valid.is_empty() {
            return Err(SynthError::NoValidExamples);
        }

        let mut classes = Vec::new();
        let mut literals = BTreeSet::new();
        let mut run_lengths = BTreeSet::new();

        for example in valid {
            let mut run: Option<(CharClass, u32)> = None;

            for c in example.chars() {
                let class = CharClass::of(c);
                match class {
                    Some(class) if !classes.contains(&class) => classes.push(class),
                    Some(_) => (),
                    None => { literals.insert(c); },
                }

                run = match (run, class) {
                    (Some((prev, len)), Some(class)) if prev == class => Some((prev, len + 1)),
                    (prev, class) => {
                        if let Some((_, len)) = prev {
                            run_lengths.insert(len);
                        }
                        class.map(|class| (class, 1))
                    },
                };
            }

            if let Some((_, len)) = run {
                run_lengths.insert(len);
            }
        }

        debug!(
            "DSL from {} valid / {} invalid examples: classes {classes:?}, literals {literals:?}, counts {run_lengths:?}",
            valid.len(),
            invalid.len(),
        );

        let mut builder = Self::new();
        for class in classes {
            builder = builder.class(class);
        }
        for c in literals {
            builder = builder.literal(c.to_string());
        }
        for n in run_lengths.iter().filter(|n| **n > 1) {
            builder = builder.int(*n);
        }
        builder = builder
            .operator(ProdKind::Concat)
            .operator(ProdKind::Union)
            .operator(ProdKind::Kleene)
            .operator(ProdKind::Posit)
            .operator(ProdKind::Optional);
        if run_lengths.iter().any(|n| *n > 1) {
            builder = builder
                .operator(ProdKind::Copy)
                .operator(ProdKind::Repeat);
        }

        Ok(builder)
    }

    pub fn start(mut self, ty: Type) -> Self {
        self.start = ty;
        self
    }

    pub fn literal(self, s: impl Into<String>) -> Self {
        self.production(ProdKind::Literal(s.into()))
    }

    pub fn class(self, class: CharClass) -> Self {
        self.production(ProdKind::Class(class))
    }

    pub fn int(self, n: u32) -> Self {
        self.production(ProdKind::Int(n))
    }

    pub fn operator(self, kind: ProdKind) -> Self {
        self.production(kind)
    }

    /// Adds a production. Duplicates are ignored.
    pub fn production(mut self, kind: ProdKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    pub fn build(self) -> SynthResult<Grammar> {
        let productions: Vec<_> = self.kinds.into_iter()
            .enumerate()
            .map(|(idx, kind)| Production { id: ProdId(idx), kind })
            .collect();

        let has_start = productions.iter()
            .any(|p| p.ret() == self.start && p.is_terminal());
        if !has_start {
            return Err(SynthError::EmptyGrammar);
        }

        Ok(Grammar {
            productions,
            start: self.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_ignores_duplicates() {
        let grammar = Grammar::builder()
            .literal("a")
            .literal("a")
            .operator(ProdKind::Concat)
            .build()
            .unwrap();

        assert_eq!(grammar.len(), 2);
        assert_eq!(grammar.find(&ProdKind::Concat), Some(ProdId(1)));
        assert_eq!(grammar.max_arity(), 2);
    }

    #[test]
    fn grammar_without_start_terminal_is_rejected() {
        let res = Grammar::builder()
            .int(3)
            .operator(ProdKind::Kleene)
            .build();

        assert!(matches!(res, Err(SynthError::EmptyGrammar)));
    }

    #[test]
    fn grammar_from_examples() {
        let valid = vec!["12-ab".to_string(), "7-xyz".to_string()];
        let grammar = GrammarBuilder::from_examples(&valid, &[])
            .unwrap()
            .build()
            .unwrap();

        assert!(grammar.find(&ProdKind::Class(CharClass::Digit)).is_some());
        assert!(grammar.find(&ProdKind::Class(CharClass::Lower)).is_some());
        assert!(grammar.find(&ProdKind::Class(CharClass::Upper)).is_none());
        assert!(grammar.find(&ProdKind::Literal("-".to_string())).is_some());
        assert!(grammar.find(&ProdKind::Int(2)).is_some());
        assert!(grammar.find(&ProdKind::Int(3)).is_some());
        assert!(grammar.find(&ProdKind::Repeat).is_some());
    }

    #[test]
    fn grammar_from_no_valid_examples_fails() {
        let res = GrammarBuilder::from_examples(&[], &["x".to_string()]);
        assert!(matches!(res, Err(SynthError::NoValidExamples)));
    }
}
