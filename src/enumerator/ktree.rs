use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use log::{debug, trace};

use crate::decider::Predicate;
use crate::dsl::{Grammar, ProdId, Type};
use crate::program::{Pattern, Program};

use super::Enumerator;

/// An operator tree whose leaves are still typed holes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Skeleton {
    Hole(Type),
    Op(ProdId, Vec<Skeleton>),
}

impl Skeleton {
    /// Holes in pre-order, together with their depth.
    fn holes(&self, depth: usize, out: &mut Vec<(Type, usize)>) {
        match self {
            Skeleton::Hole(ty) => out.push((*ty, depth)),
            Skeleton::Op(_, children) => children.iter()
                .for_each(|c| c.holes(depth + 1, out)),
        }
    }

    fn subst_hole(&self, target: usize, with: &Skeleton) -> Skeleton {
        self.subst_rec(target, &mut 0, with)
    }

    fn subst_rec(&self, target: usize, seen: &mut usize, with: &Skeleton) -> Skeleton {
        match self {
            Skeleton::Hole(_) => {
                let hit = *seen == target;
                *seen += 1;
                if hit { with.clone() } else { self.clone() }
            },
            Skeleton::Op(prod, children) => Skeleton::Op(
                *prod,
                children.iter().map(|c| c.subst_rec(target, seen, with)).collect(),
            ),
        }
    }

    fn to_program(&self, fill: &[ProdId], next: &mut usize) -> Program {
        match self {
            Skeleton::Hole(_) => {
                let prod = fill[*next];
                *next += 1;
                Program::leaf(prod)
            },
            Skeleton::Op(prod, children) => Program::node(
                *prod,
                children.iter().map(|c| c.to_program(fill, next)).collect(),
            ),
        }
    }
}

struct Terminals {
    regex: Vec<ProdId>,
    int: Vec<ProdId>,
}

impl Terminals {
    fn new(grammar: &Grammar) -> Self {
        let collect = |ty: Type| -> Vec<ProdId> {
            grammar.terminals_of(ty).map(|p| p.id).collect()
        };

        Self {
            regex: collect(Type::Regex),
            int: collect(Type::Int),
        }
    }

    fn of(&self, ty: Type) -> &[ProdId] {
        match ty {
            Type::Regex => &self.regex,
            Type::Int => &self.int,
        }
    }
}

/// Odometer over the terminal choices of every hole of one skeleton.
struct HoleFill {
    limit_reached: bool,
    holes: Vec<Type>,
    digits: Vec<usize>,
}

impl HoleFill {
    fn new() -> Self {
        Self {
            limit_reached: true,
            holes: Vec::new(),
            digits: Vec::new(),
        }
    }

    fn reset(&mut self, skele: &Skeleton, terminals: &Terminals) {
        let mut holes = Vec::new();
        skele.holes(0, &mut holes);

        self.holes.clear();
        self.holes.extend(holes.into_iter().map(|(ty, _)| ty));
        self.digits.clear();
        self.digits.extend(self.holes.iter().map(|_| 0));
        self.limit_reached = self.holes.iter().any(|ty| terminals.of(*ty).is_empty());
    }

    fn next_program(&mut self, skele: &Skeleton, terminals: &Terminals) -> Option<Program> {
        if self.limit_reached { return None; }

        let res = self.produce(skele, terminals);
        self.increment(terminals);

        Some(res)
    }

    fn produce(&self, skele: &Skeleton, terminals: &Terminals) -> Program {
        let fill: Vec<ProdId> = self.digits.iter()
            .zip(&self.holes)
            .map(|(digit, ty)| terminals.of(*ty)[*digit])
            .collect();

        skele.to_program(&fill, &mut 0)
    }

    fn increment(&mut self, terminals: &Terminals) {
        for (digit, ty) in self.digits.iter_mut().zip(&self.holes) {
            if *digit + 1 < terminals.of(*ty).len() {
                *digit += 1;
                return;
            }

            *digit = 0;
        }

        self.limit_reached = true;
    }
}

/// Walks the grammar by node count: operator skeletons of size `n` are
/// grown from those of size `n - arity`, and the holes of each skeleton
/// are filled with terminals in production order.
pub struct KTreeEnumerator {
    grammar: Rc<Grammar>,
    depth: usize,
    terminals: Terminals,
    window: usize,
    levels: BTreeMap<usize, Vec<Skeleton>>,
    size: usize,
    skeleton_idx: usize,
    fill: HoleFill,
    blocked: Vec<Pattern>,
    exhausted: bool,
}

impl KTreeEnumerator {
    pub fn new(grammar: Rc<Grammar>, depth: usize) -> Self {
        let terminals = Terminals::new(&grammar);
        let root = Skeleton::Hole(grammar.start());
        let mut fill = HoleFill::new();
        fill.reset(&root, &terminals);

        Self {
            window: grammar.max_arity().max(1),
            grammar,
            depth,
            terminals,
            levels: BTreeMap::from([(1, vec![root])]),
            size: 1,
            skeleton_idx: 0,
            fill,
            blocked: Vec::new(),
            exhausted: false,
        }
    }

    pub fn blocked(&self) -> &[Pattern] {
        &self.blocked
    }

    fn is_blocked(&self, program: &Program) -> bool {
        self.blocked.iter().any(|pat| pat.matches(program))
    }

    fn grow(&mut self) {
        let next = self.size + 1;
        let mut seen = HashSet::new();
        let mut grown = Vec::new();

        for op in self.grammar.operators() {
            let Some(base) = next.checked_sub(op.arity()).and_then(|s| self.levels.get(&s)) else {
                continue;
            };
            let with = Skeleton::Op(
                op.id,
                op.args().iter().map(|ty| Skeleton::Hole(*ty)).collect(),
            );

            for skele in base {
                let mut holes = Vec::new();
                skele.holes(0, &mut holes);

                for (idx, (ty, depth)) in holes.into_iter().enumerate() {
                    if ty != op.ret() || depth + 1 > self.depth {
                        continue;
                    }

                    let grown_skele = skele.subst_hole(idx, &with);
                    if seen.insert(grown_skele.clone()) {
                        grown.push(grown_skele);
                    }
                }
            }
        }

        debug!("{} skeletons of size {next} at depth {}", grown.len(), self.depth);

        let window = self.window;
        self.levels.insert(next, grown);
        self.levels.retain(|size, _| size + window > next);
        self.size = next;
        self.skeleton_idx = 0;

        // Larger skeletons only grow out of the retained window.
        if self.levels.values().all(Vec::is_empty) {
            debug!("Enumerator exhausted at size {next}");
            self.exhausted = true;
            return;
        }

        if let Some(first) = self.levels.get(&next).and_then(|s| s.first()) {
            self.fill.reset(first, &self.terminals);
        }
    }
}

impl Enumerator for KTreeEnumerator {
    fn next_program(&mut self) -> Option<Program> {
        // Cursor order: fill, then skeleton, then size.
        loop {
            if self.exhausted {
                return None;
            }

            if let Some(skeletons) = self.levels.get(&self.size) {
                if let Some(skele) = skeletons.get(self.skeleton_idx) {
                    match self.fill.next_program(skele, &self.terminals) {
                        Some(program) if self.is_blocked(&program) => {
                            trace!("Skipping blocked {program:?}");
                            continue;
                        },
                        Some(program) => return Some(program),
                        None => {
                            self.skeleton_idx += 1;
                            if let Some(next) = skeletons.get(self.skeleton_idx) {
                                self.fill.reset(next, &self.terminals);
                            }
                            continue;
                        },
                    }
                }
            }

            // Out of skeletons of this size
            self.grow();
        }
    }

    fn update(&mut self, predicates: Option<&[Predicate]>) {
        let Some(predicates) = predicates else { return };

        for pred in predicates {
            if !self.blocked.contains(&pred.pattern) {
                debug!("Blocking {}", pred.pattern);
                self.blocked.push(pred.pattern.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::decider::PredicateKind;
    use crate::dsl::ProdKind;
    use crate::interpreter::Interpreter;
    use crate::program::PatternNode;

    fn union_grammar() -> Rc<Grammar> {
        Rc::new(Grammar::builder()
            .literal("a")
            .literal("b")
            .operator(ProdKind::Union)
            .build()
            .unwrap())
    }

    fn drain(e: &mut KTreeEnumerator) -> Vec<Program> {
        std::iter::from_fn(|| e.next_program()).collect()
    }

    #[test]
    fn enumerates_every_program_once() {
        let mut e = KTreeEnumerator::new(union_grammar(), 2);
        let all = drain(&mut e);

        // t0 = 2, t1 = 2 + t0^2, t2 = 2 + t1^2
        assert_eq!(all.len(), 38);
        assert_eq!(all.iter().collect::<HashSet<_>>().len(), 38);
        assert!(all.iter().all(|p| p.depth() <= 2));
        assert!(all.windows(2).all(|w| w[0].size() <= w[1].size()));
    }

    #[test]
    fn exhaustion_is_sticky() {
        let mut e = KTreeEnumerator::new(union_grammar(), 0);

        assert_eq!(drain(&mut e).len(), 2);
        assert_eq!(e.next_program(), None);
        assert_eq!(e.next_program(), None);
    }

    #[test]
    fn blocked_patterns_are_never_produced() {
        let grammar = union_grammar();
        let b = grammar.find(&ProdKind::Literal("b".into())).unwrap();
        let mut e = KTreeEnumerator::new(grammar, 2);

        let first = e.next_program().unwrap();
        assert_eq!(first, Program::leaf(ProdId(0)));

        e.update(Some(&[Predicate {
            kind: PredicateKind::AcceptsInvalid,
            pattern: Pattern::anywhere(PatternNode::Node(b, vec![])),
            witness: None,
        }]));
        e.update(None);

        let rest = drain(&mut e);
        // only the all-`a` trees of each shape remain, minus the one seen
        assert_eq!(rest.len(), 4);
        assert!(rest.iter().all(|p| !e.blocked()[0].matches(p)));
    }

    #[test]
    fn typed_holes_get_typed_terminals() {
        let grammar = Rc::new(Grammar::builder()
            .literal("a")
            .int(2)
            .int(3)
            .operator(ProdKind::Copy)
            .operator(ProdKind::Repeat)
            .operator(ProdKind::Concat)
            .build()
            .unwrap());
        let interp = Interpreter::new(grammar.clone());
        let mut e = KTreeEnumerator::new(grammar, 2);
        let all = drain(&mut e);

        assert!(!all.is_empty());
        for p in &all {
            match interp.eval(p) {
                Ok(_) => (),
                Err(crate::interpreter::InterpreterError::InvalidRange { .. }) => (),
                Err(e) => panic!("ill-formed program {p:?}: {e}"),
            }
        }
    }
}
