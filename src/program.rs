use std::fmt;

use crate::dsl::{Grammar, ProdId};

/// Child indices leading from the root to a subtree. The derived ordering
/// is the pre-order of the nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, idx: usize) -> Self {
        let mut path = self.0.clone();
        path.push(idx);
        Self(path)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// `true` if `self` lies strictly below `other`.
    pub fn is_below(&self, other: &NodePath) -> bool {
        self.0.len() > other.0.len() && self.0.starts_with(&other.0)
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(path: Vec<usize>) -> Self {
        Self(path)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{idx}")?;
        }
        Ok(())
    }
}

/// A candidate program: an immutable tree of grammar productions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    production: ProdId,
    children: Vec<Program>,
}

impl Program {
    pub fn leaf(production: ProdId) -> Self {
        Self {
            production,
            children: Vec::new(),
        }
    }

    pub fn node(production: ProdId, children: Vec<Program>) -> Self {
        Self {
            production,
            children,
        }
    }

    pub fn production(&self) -> ProdId {
        self.production
    }

    pub fn children(&self) -> &[Program] {
        &self.children
    }

    /// Longest root-to-leaf edge count.
    pub fn depth(&self) -> usize {
        self.children.iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Node count.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Program::size).sum::<usize>()
    }

    pub fn get(&self, path: &NodePath) -> Option<&Program> {
        path.indices().iter()
            .try_fold(self, |node, idx| node.children.get(*idx))
    }

    /// All node paths in pre-order.
    pub fn paths(&self) -> Vec<NodePath> {
        let mut out = Vec::new();
        self.collect_paths(NodePath::root(), &mut out);
        out
    }

    fn collect_paths(&self, at: NodePath, out: &mut Vec<NodePath>) {
        out.push(at.clone());
        for (idx, child) in self.children.iter().enumerate() {
            child.collect_paths(at.child(idx), out);
        }
    }

    pub fn display<'a>(&'a self, grammar: &'a Grammar) -> ProgramDisplay<'a> {
        ProgramDisplay { program: self, grammar }
    }
}

/// Prefix form of a program, for logs.
pub struct ProgramDisplay<'a> {
    program: &'a Program,
    grammar: &'a Grammar,
}

impl fmt::Display for ProgramDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.grammar.get(self.program.production).kind)?;
        if self.program.children.is_empty() {
            return Ok(());
        }

        write!(f, "(")?;
        for (i, child) in self.program.children.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", child.display(self.grammar))?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternNode {
    Any,
    Node(ProdId, Vec<PatternNode>),
}

impl PatternNode {
    pub fn from_program(program: &Program) -> Self {
        PatternNode::Node(
            program.production,
            program.children.iter().map(PatternNode::from_program).collect(),
        )
    }

    pub fn matches(&self, program: &Program) -> bool {
        match self {
            PatternNode::Any => true,
            PatternNode::Node(prod, children) => {
                *prod == program.production
                    && children.len() <= program.children.len()
                    && children.iter()
                        .zip(&program.children)
                        .all(|(pat, child)| pat.matches(child))
            },
        }
    }
}

impl fmt::Display for PatternNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternNode::Any => write!(f, "_"),
            PatternNode::Node(prod, children) if children.is_empty() => write!(f, "{prod}"),
            PatternNode::Node(prod, children) => {
                write!(f, "{prod}(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// The pattern must match at the root of the program.
    Root,
    /// The pattern may match at any node.
    Anywhere,
}

/// A structural pruning key. It only refers to production ids, so it stays
/// valid after the program it was learned from is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    pub anchor: Anchor,
    pub tree: PatternNode,
}

impl Pattern {
    pub fn anywhere(tree: PatternNode) -> Self {
        Self { anchor: Anchor::Anywhere, tree }
    }

    /// Root-anchored pattern keeping the productions along `path` and the
    /// whole subtree at its end. Siblings of the path become wildcards.
    pub fn along_path(program: &Program, path: &NodePath) -> Self {
        fn build(node: &Program, rest: &[usize]) -> PatternNode {
            let Some((next, rest)) = rest.split_first() else {
                return PatternNode::from_program(node);
            };

            let children = node.children.iter()
                .enumerate()
                .map(|(idx, child)| if idx == *next {
                    build(child, rest)
                } else {
                    PatternNode::Any
                })
                .collect();

            PatternNode::Node(node.production, children)
        }

        Self {
            anchor: Anchor::Root,
            tree: build(program, path.indices()),
        }
    }

    pub fn matches(&self, program: &Program) -> bool {
        match self.anchor {
            Anchor::Root => self.tree.matches(program),
            Anchor::Anywhere => self.matches_anywhere(program),
        }
    }

    fn matches_anywhere(&self, program: &Program) -> bool {
        self.tree.matches(program)
            || program.children.iter().any(|c| self.matches_anywhere(c))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Anchor::Root => write!(f, "^{}", self.tree),
            Anchor::Anywhere => write!(f, "{}", self.tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // concat(a, kleene(b))
    fn sample() -> Program {
        Program::node(ProdId(2), vec![
            Program::leaf(ProdId(0)),
            Program::node(ProdId(3), vec![Program::leaf(ProdId(1))]),
        ])
    }

    #[test]
    fn depth_and_size() {
        let p = sample();
        assert_eq!(p.depth(), 2);
        assert_eq!(p.size(), 4);
        assert_eq!(Program::leaf(ProdId(0)).depth(), 0);
    }

    #[test]
    fn paths_are_preorder() {
        let paths = sample().paths();
        let mut sorted = paths.clone();
        sorted.sort();

        assert_eq!(paths, sorted);
        assert_eq!(paths.len(), 4);
        assert_eq!(sample().get(&NodePath::from(vec![1, 0])), Some(&Program::leaf(ProdId(1))));
        assert_eq!(sample().get(&NodePath::from(vec![0, 0])), None);
    }

    #[test]
    fn path_pattern_wildcards_siblings() {
        let p = sample();
        let pat = Pattern::along_path(&p, &NodePath::from(vec![1]));

        // concat(c, kleene(b)) shares the path, concat(a, b) does not
        let other = Program::node(ProdId(2), vec![
            Program::leaf(ProdId(4)),
            Program::node(ProdId(3), vec![Program::leaf(ProdId(1))]),
        ]);
        let unrelated = Program::node(ProdId(2), vec![
            Program::leaf(ProdId(0)),
            Program::leaf(ProdId(1)),
        ]);

        assert!(pat.matches(&p));
        assert!(pat.matches(&other));
        assert!(!pat.matches(&unrelated));
        // anchored: does not match below the root
        assert!(!pat.matches(&Program::node(ProdId(3), vec![p])));
    }

    #[test]
    fn anywhere_pattern_matches_nested() {
        let pat = Pattern::anywhere(PatternNode::Node(ProdId(3), vec![PatternNode::Any]));
        assert!(pat.matches(&sample()));
        assert!(!pat.matches(&Program::leaf(ProdId(3))));
    }
}
