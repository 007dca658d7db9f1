use std::rc::Rc;

use log::{debug, info, trace, warn};
use z3::ast::{Ast, Bool, Int};
use z3::{SatResult, Solver};

use crate::decider::Predicate;
use crate::dsl::{Grammar, ProdId, Type};
use crate::program::{Anchor, Pattern, PatternNode, Program};

use super::Enumerator;

/// Encodes every program of bounded depth as an assignment of production
/// ids to the nodes of a complete k-ary tree. Node `i` has children
/// `i * k + 1 ..= i * k + k`, and the value `EMPTY` marks an unused node.
pub struct SmtEnumerator<'ctx> {
    z3: &'ctx z3::Context,
    solver: Solver<'ctx>,
    grammar: Rc<Grammar>,
    depth: usize,
    arity: usize,
    nodes: Vec<Int<'ctx>>,
    size_expr: Int<'ctx>,
    size: usize,
    exhausted: bool,
}

impl<'ctx> SmtEnumerator<'ctx> {
    pub fn new(z3: &'ctx z3::Context, grammar: Rc<Grammar>, depth: usize) -> Self {
        let arity = grammar.max_arity().max(1);
        let count: usize = (0..=depth).map(|level| arity.pow(level as u32)).sum();

        let nodes: Vec<_> = (0..count)
            .map(|idx| Int::new_const(z3, format!("n{idx}")))
            .collect();
        let one = Int::from_u64(z3, 1);
        let zero = Int::from_u64(z3, 0);
        let empty = Int::from_u64(z3, grammar.len() as u64);
        let size_terms: Vec<Int<'ctx>> = nodes.iter()
            .map(|n| n._eq(&empty).ite(&zero, &one))
            .collect();
        let size_expr = Int::add(z3, &size_terms.iter().collect::<Vec<_>>());

        let res = Self {
            z3,
            solver: Solver::new(z3),
            grammar,
            depth,
            arity,
            nodes,
            size_expr,
            size: 1,
            exhausted: false,
        };
        res.well_formed();

        debug!("SMT encoding over {} nodes at depth {depth}", res.nodes.len());

        res
    }

    fn empty(&self) -> Int<'ctx> {
        Int::from_u64(self.z3, self.grammar.len() as u64)
    }

    fn is_prod(&self, idx: usize, prod: ProdId) -> Bool<'ctx> {
        self.nodes[idx]._eq(&Int::from_u64(self.z3, prod.0 as u64))
    }

    fn has_type(&self, idx: usize, ty: Type) -> Bool<'ctx> {
        let options: Vec<_> = self.grammar.of_type(ty)
            .map(|p| self.is_prod(idx, p.id))
            .collect();

        Bool::or(self.z3, &options.iter().collect::<Vec<_>>())
    }

    fn child(&self, idx: usize, nth: usize) -> Option<usize> {
        let child = idx * self.arity + nth + 1;
        (child < self.nodes.len()).then_some(child)
    }

    fn well_formed(&self) {
        let zero = Int::from_u64(self.z3, 0);
        let empty = self.empty();

        for (idx, node) in self.nodes.iter().enumerate() {
            self.solver.assert(&node.ge(&zero));
            self.solver.assert(&node.le(&empty));

            let children: Vec<usize> = (0..self.arity)
                .filter_map(|nth| self.child(idx, nth))
                .collect();
            let is_empty = node._eq(&empty);

            for child in &children {
                self.solver.assert(&is_empty.implies(&self.nodes[*child]._eq(&empty)));
            }

            for prod in self.grammar.productions() {
                let chosen = self.is_prod(idx, prod.id);

                if !prod.is_terminal() && children.is_empty() {
                    self.solver.assert(&!chosen);
                    continue;
                }

                let mut conds = Vec::new();
                for (nth, child) in children.iter().enumerate() {
                    match prod.args().get(nth) {
                        Some(ty) => conds.push(self.has_type(*child, *ty)),
                        None => conds.push(self.nodes[*child]._eq(&empty)),
                    }
                }

                if !conds.is_empty() {
                    let conds = Bool::and(self.z3, &conds.iter().collect::<Vec<_>>());
                    self.solver.assert(&chosen.implies(&conds));
                }
            }
        }

        self.solver.assert(&self.has_type(0, self.grammar.start()));
    }

    /// `None` if the model doesn't decode, which ends the enumeration like
    /// an `unknown` verdict does.
    fn model_program(&self, model: Option<z3::Model<'ctx>>) -> Option<Option<(Program, Vec<u64>)>> {
        match model.and_then(|m| self.decode(&m)) {
            Some(res) => Some(Some(res)),
            None => {
                warn!("Z3 model at size {} doesn't decode to a program", self.size);
                None
            },
        }
    }

    fn decode(&self, model: &z3::Model<'ctx>) -> Option<(Program, Vec<u64>)> {
        let values = self.nodes.iter()
            .map(|n| model.eval(n, true).and_then(|v| v.as_u64()))
            .collect::<Option<Vec<_>>>()?;
        let program = self.decode_rec(0, &values)?;

        Some((program, values))
    }

    fn decode_rec(&self, idx: usize, values: &[u64]) -> Option<Program> {
        let id = ProdId(usize::try_from(values[idx]).ok()?);
        if id.0 >= self.grammar.len() {
            return None;
        }

        let children = (0..self.grammar.get(id).arity())
            .map(|nth| self.decode_rec(self.child(idx, nth)?, values))
            .collect::<Option<Vec<_>>>()?;

        Some(Program::node(id, children))
    }

    fn block_model(&self, values: &[u64]) {
        let differs: Vec<_> = self.nodes.iter()
            .zip(values)
            .map(|(n, v)| !n._eq(&Int::from_u64(self.z3, *v)))
            .collect();

        self.solver.assert(&Bool::or(self.z3, &differs.iter().collect::<Vec<_>>()));
    }

    /// Equalities that hold exactly when `node` sits at `idx`. `None` if it
    /// can't fit there.
    fn pattern_at(&self, idx: usize, node: &PatternNode, out: &mut Vec<Bool<'ctx>>) -> Option<()> {
        match node {
            PatternNode::Any => Some(()),
            PatternNode::Node(prod, children) => {
                out.push(self.is_prod(idx, *prod));
                for (nth, child) in children.iter().enumerate() {
                    if matches!(child, PatternNode::Any) {
                        continue;
                    }
                    self.pattern_at(self.child(idx, nth)?, child, out)?;
                }

                Some(())
            },
        }
    }

    fn block_pattern(&self, pattern: &Pattern) {
        let positions = match pattern.anchor {
            Anchor::Root => 0..1,
            Anchor::Anywhere => 0..self.nodes.len(),
        };

        for idx in positions {
            let mut eqs = Vec::new();
            if self.pattern_at(idx, &pattern.tree, &mut eqs).is_none() {
                continue;
            }

            // A bare wildcard blocks everything
            if eqs.is_empty() {
                self.solver.assert(&Bool::from_bool(self.z3, false));
                return;
            }

            self.solver.assert(&!Bool::and(self.z3, &eqs.iter().collect::<Vec<_>>()));
        }
    }

    fn check_size(&self, size: &Int<'ctx>, exact: bool) -> Option<Option<(Program, Vec<u64>)>> {
        self.solver.push();
        if exact {
            self.solver.assert(&self.size_expr._eq(size));
        } else {
            self.solver.assert(&self.size_expr.gt(size));
        }

        let check = self.solver.check();
        trace!("Z3 check (size {}, exact {exact}): {check:?}", self.size);
        let res = match check {
            SatResult::Sat => self.model_program(self.solver.get_model()),
            SatResult::Unsat => Some(None),
            SatResult::Unknown => None,
        };
        self.solver.pop(1);

        res
    }
}

impl<'ctx> Enumerator for SmtEnumerator<'ctx> {
    fn next_program(&mut self) -> Option<Program> {
        loop {
            if self.exhausted {
                return None;
            }

            let size = Int::from_u64(self.z3, self.size as u64);
            match self.check_size(&size, true) {
                Some(Some((program, values))) => {
                    self.block_model(&values);
                    return Some(program);
                },
                Some(None) => (),
                None => {
                    warn!("Z3 gave up at size {}, stopping", self.size);
                    self.exhausted = true;
                    continue;
                },
            }

            // Nothing left at this size. Is there anything bigger?
            match self.check_size(&size, false) {
                Some(Some(_)) => self.size += 1,
                _ => {
                    info!("SMT enumerator exhausted at depth {}", self.depth);
                    self.exhausted = true;
                },
            }
        }
    }

    fn update(&mut self, predicates: Option<&[Predicate]>) {
        let Some(predicates) = predicates else { return };

        for pred in predicates {
            debug!("Blocking {}", pred.pattern);
            self.block_pattern(&pred.pattern);
        }
    }
}
