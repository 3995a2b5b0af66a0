//! Fixpoint term rewriting over formula trees.
//!
//! A [Rule] decides whether it applies to a node and produces its
//! replacement. The [Mutator] walks the tree post-order and applies the first
//! matching rule until no rule matches anywhere.
//!
//! Rules must make progress: each replacement has to reduce some well-founded
//! measure of the subtree. Rules that don't can loop, which the mutator stops
//! after a configurable number of replacements.

pub mod optimization;

use itertools::Itertools;

use crate::{Error, ErrorSource, FormulaItem, Reason, Result, WithErrorInfo};

pub use optimization::{default_rules, optimize, optimize_plan};

/// Default cap on the number of replacements within a single [Mutator::apply].
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// A rewrite rule.
///
/// `parents` is the list of ancestors of `node`, innermost last.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn match_node(&self, node: &FormulaItem, parents: &[&FormulaItem]) -> bool;

    /// Only called for nodes that [Rule::match_node] accepted.
    fn make_replacement(&self, node: &FormulaItem, parents: &[&FormulaItem]) -> FormulaItem;
}

/// Replaces every occurrence of one tree with another.
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pub original: FormulaItem,
    pub replacement: FormulaItem,
}

impl Rule for ReplaceRule {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn match_node(&self, node: &FormulaItem, _parents: &[&FormulaItem]) -> bool {
        node == &self.original
    }

    fn make_replacement(&self, _node: &FormulaItem, _parents: &[&FormulaItem]) -> FormulaItem {
        self.replacement.clone()
    }
}

pub struct Mutator {
    rules: Vec<Box<dyn Rule>>,
    max_iterations: usize,
}

impl Mutator {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Mutator {
            rules,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn apply(&self, root: &FormulaItem) -> Result<FormulaItem> {
        let mut run = MutationRun {
            rules: &self.rules,
            max_iterations: self.max_iterations,
            iterations: 0,
        };
        let res = run.apply_node(root, &[])?;
        if run.iterations > 0 {
            log::debug!(
                "rewrote `{root}` into `{res}` in {} steps",
                run.iterations
            );
        }
        Ok(res)
    }
}

/// Applies `rules` to `root` until a fixpoint, with the default iteration cap.
pub fn apply_rules(rules: &[Box<dyn Rule>], root: &FormulaItem) -> Result<FormulaItem> {
    MutationRun {
        rules,
        max_iterations: DEFAULT_MAX_ITERATIONS,
        iterations: 0,
    }
    .apply_node(root, &[])
}

struct MutationRun<'r> {
    rules: &'r [Box<dyn Rule>],
    max_iterations: usize,
    iterations: usize,
}

impl MutationRun<'_> {
    fn apply_node(&mut self, node: &FormulaItem, parents: &[&FormulaItem]) -> Result<FormulaItem> {
        let rules = self.rules;

        let mut current = self.apply_children(node, parents)?;
        loop {
            let Some(rule) = rules.iter().find(|r| r.match_node(&current, parents)) else {
                return Ok(current);
            };

            self.iterations += 1;
            if self.iterations > self.max_iterations {
                return Err(Error::new(Reason::Bug {
                    details: Some(format!(
                        "rewrite did not reach a fixpoint after {} replacements (last rule: `{}`)",
                        self.max_iterations,
                        rule.name()
                    )),
                }))
                .with_source(ErrorSource::Optimizer);
            }

            let replacement = rule.make_replacement(&current, parents);
            log::trace!("rule `{}`: `{current}` -> `{replacement}`", rule.name());

            // replacements may contain nodes that no rule has seen yet
            current = self.apply_children(&replacement, parents)?;
        }
    }

    fn apply_children(&mut self, node: &FormulaItem, parents: &[&FormulaItem]) -> Result<FormulaItem> {
        let children = node.children();
        if children.is_empty() {
            return Ok(node.clone());
        }

        let mut stack = parents.to_vec();
        stack.push(node);

        let children: Vec<FormulaItem> = children
            .into_iter()
            .map(|child| self.apply_node(child, &stack))
            .try_collect()?;
        Ok(node.with_children(children))
    }
}
