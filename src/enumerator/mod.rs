pub mod ktree;
pub mod smt;

use std::fmt;
use std::rc::Rc;

use crate::decider::Predicate;
use crate::dsl::Grammar;
use crate::program::Program;

pub use ktree::KTreeEnumerator;
pub use smt::SmtEnumerator;

/// An enumerator is an iterator-like structure. It generates program
/// candidates of bounded depth, smallest first, and can be told why the
/// last candidate was rejected so that it skips structurally equivalent
/// failures.
pub trait Enumerator {
    /// Query the enumerator for the next program to try. `None` means the
    /// search space is exhausted, and stays that way.
    fn next_program(&mut self) -> Option<Program>;

    /// Feedback on the last program. `None` only advances past it;
    /// predicates block their patterns for the rest of the enumeration.
    fn update(&mut self, predicates: Option<&[Predicate]>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EnumeratorKind {
    #[default]
    #[value(name = "ktree")]
    KTree,
    #[value(name = "smt")]
    Smt,
}

impl fmt::Display for EnumeratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumeratorKind::KTree => write!(f, "KTreeEnumerator"),
            EnumeratorKind::Smt => write!(f, "SmtEnumerator"),
        }
    }
}

pub enum AnyEnumerator<'ctx> {
    KTree(KTreeEnumerator),
    Smt(SmtEnumerator<'ctx>),
}

impl<'ctx> AnyEnumerator<'ctx> {
    pub fn build(
        kind: EnumeratorKind,
        z3: &'ctx z3::Context,
        grammar: Rc<Grammar>,
        depth: usize,
    ) -> Self {
        match kind {
            EnumeratorKind::KTree => AnyEnumerator::KTree(KTreeEnumerator::new(grammar, depth)),
            EnumeratorKind::Smt => AnyEnumerator::Smt(SmtEnumerator::new(z3, grammar, depth)),
        }
    }
}

impl Enumerator for AnyEnumerator<'_> {
    fn next_program(&mut self) -> Option<Program> {
        match self {
            AnyEnumerator::KTree(e) => e.next_program(),
            AnyEnumerator::Smt(e) => e.next_program(),
        }
    }

    fn update(&mut self, predicates: Option<&[Predicate]>) {
        match self {
            AnyEnumerator::KTree(e) => e.update(predicates),
            AnyEnumerator::Smt(e) => e.update(predicates),
        }
    }
}
