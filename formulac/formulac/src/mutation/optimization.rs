//! Rules that simplify formulas without changing their meaning.
//!
//! Every rule only matches when its replacement is strictly simpler than the
//! node (fewer nodes, or a literal in place of an expression), so applying
//! them to a fixpoint always terminates.

use crate::ir::fold::PlanFold;
use crate::ir::CompiledMultiLevelQuery;
use crate::{FormulaItem, ItemKind, Literal, Result};

use super::{Mutator, Rule};

pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ConstComparison),
        Box::new(ConstMath),
        Box::new(ZeroOneComparison),
        Box::new(ConstAndOr),
        Box::new(IfPruning),
        Box::new(CasePruning),
        Box::new(IsNullFolding),
    ]
}

/// Applies the [default_rules] to a fixpoint.
pub fn optimize(item: &FormulaItem) -> Result<FormulaItem> {
    Mutator::new(default_rules()).apply(item)
}

/// Optimizes every formula of the plan.
pub fn optimize_plan(
    plan: CompiledMultiLevelQuery,
    max_iterations: usize,
) -> Result<CompiledMultiLevelQuery> {
    let mut optimizer = PlanOptimizer {
        mutator: Mutator::new(default_rules()).with_max_iterations(max_iterations),
    };
    optimizer.fold_plan(plan)
}

struct PlanOptimizer {
    mutator: Mutator,
}

impl PlanFold for PlanOptimizer {
    fn fold_formula(&mut self, formula: FormulaItem) -> Result<FormulaItem> {
        self.mutator.apply(&formula)
    }
}

fn as_binary<'a>(node: &'a FormulaItem, ops: &[&str]) -> Option<(&'a FormulaItem, &'a str, &'a FormulaItem)> {
    let bin = node.kind.as_binary()?;
    ops.contains(&bin.op.as_str())
        .then_some((bin.left.as_ref(), bin.op.as_str(), bin.right.as_ref()))
}

fn as_literal(node: &FormulaItem) -> Option<&Literal> {
    node.kind.as_literal()
}

fn boolean(value: bool) -> FormulaItem {
    FormulaItem::literal(value)
}

/// `Literal == Literal` of the same type.
pub struct ConstComparison;

impl ConstComparison {
    fn evaluate(node: &FormulaItem) -> Option<bool> {
        let (left, op, right) = as_binary(node, &["==", "!=", "_==", "_!="])?;
        let (left, right) = (as_literal(left)?, as_literal(right)?);

        let null_safe = op.starts_with('_');
        let equal = match (left, right) {
            (Literal::Null, Literal::Null) if null_safe => true,
            (Literal::Null, _) | (_, Literal::Null) if null_safe => false,
            (Literal::Null, _) | (_, Literal::Null) => return None,
            (Literal::Float(a), Literal::Float(b)) => a == b,
            (a, b) if a.same_type(b) => a == b,
            _ => return None,
        };
        Some(if op.ends_with("==") { equal } else { !equal })
    }
}

impl Rule for ConstComparison {
    fn name(&self) -> &'static str {
        "const_comparison"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::evaluate(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        Self::evaluate(node).map_or_else(|| node.clone(), boolean)
    }
}

/// Arithmetic on numeric literals.
///
/// Integer results stay integer, except for `/`. Division by zero and
/// integer overflow are left for the database to deal with.
pub struct ConstMath;

impl ConstMath {
    fn evaluate(node: &FormulaItem) -> Option<Literal> {
        let (left, op, right) = as_binary(node, &["+", "-", "*", "/"])?;
        let (left, right) = (as_literal(left)?, as_literal(right)?);

        if op == "/" {
            let divisor = right.as_f64()?;
            if divisor == 0.0 {
                return None;
            }
            return finite(left.as_f64()? / divisor);
        }

        match (left, right) {
            (Literal::Integer(a), Literal::Integer(b)) => match op {
                "+" => a.checked_add(*b),
                "-" => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            }
            .map(Literal::Integer),
            (a, b) => {
                let (a, b) = (a.as_f64()?, b.as_f64()?);
                finite(match op {
                    "+" => a + b,
                    "-" => a - b,
                    _ => a * b,
                })
            }
        }
    }
}

fn finite(value: f64) -> Option<Literal> {
    value.is_finite().then_some(Literal::Float(value))
}

impl Rule for ConstMath {
    fn name(&self) -> &'static str {
        "const_math"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::evaluate(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        Self::evaluate(node).map_or_else(|| node.clone(), FormulaItem::literal)
    }
}

/// `(a > b) == 0` into `a <= b`, `(a and b) != 1` into `not (a and b)` and
/// similar. The literal may be on either side.
pub struct ZeroOneComparison;

const INVERTIBLE_COMPARISONS: [(&str, &str); 8] = [
    (">", "<="),
    (">=", "<"),
    ("<", ">="),
    ("<=", ">"),
    ("==", "!="),
    ("!=", "=="),
    ("in", "notin"),
    ("notin", "in"),
];

fn inverted_comparison(op: &str) -> Option<&'static str> {
    INVERTIBLE_COMPARISONS
        .iter()
        .find(|(from, _)| *from == op)
        .map(|(_, to)| *to)
}

fn zero_one_value(literal: &Literal) -> Option<bool> {
    match literal {
        Literal::Integer(0) | Literal::Boolean(false) => Some(false),
        Literal::Integer(1) | Literal::Boolean(true) => Some(true),
        _ => None,
    }
}

impl ZeroOneComparison {
    /// Returns the inner expression and whether it has to be negated.
    fn unwrap(node: &FormulaItem) -> Option<(&FormulaItem, bool)> {
        let (left, op, right) = as_binary(node, &["==", "!="])?;

        let (inner, value) = match (as_literal(left), as_literal(right)) {
            (None, Some(lit)) => (left, zero_one_value(lit)?),
            (Some(lit), None) => (right, zero_one_value(lit)?),
            _ => return None,
        };

        let inner_op = inner.kind.as_binary()?.op.as_str();
        if inverted_comparison(inner_op).is_none() && !matches!(inner_op, "and" | "or") {
            return None;
        }

        let keep = (op == "==") == value;
        Some((inner, !keep))
    }
}

impl Rule for ZeroOneComparison {
    fn name(&self) -> &'static str {
        "zero_one_comparison"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::unwrap(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        let Some((inner, negate)) = Self::unwrap(node) else {
            return node.clone();
        };
        if !negate {
            return inner.clone();
        }

        let ItemKind::Binary(bin) = &inner.kind else {
            return node.clone();
        };
        match inverted_comparison(&bin.op) {
            Some(op) => FormulaItem::binary(op, (*bin.left).clone(), (*bin.right).clone())
                .with_span(inner.span),
            None => FormulaItem::unary("not", inner.clone()).with_span(inner.span),
        }
    }
}

/// `x and TRUE` into `x`, `x or TRUE` into `TRUE` and similar, in both operand
/// orders.
pub struct ConstAndOr;

impl ConstAndOr {
    fn simplify(node: &FormulaItem) -> Option<FormulaItem> {
        let (left, op, right) = as_binary(node, &["and", "or"])?;

        let (other, value) = match (as_literal(left), as_literal(right)) {
            (_, Some(Literal::Boolean(b))) => (left, *b),
            (Some(Literal::Boolean(b)), _) => (right, *b),
            _ => return None,
        };

        Some(match (op, value) {
            ("and", true) | ("or", false) => other.clone(),
            ("and", false) => boolean(false),
            _ => boolean(true),
        })
    }
}

impl Rule for ConstAndOr {
    fn name(&self) -> &'static str {
        "const_and_or"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::simplify(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        Self::simplify(node).unwrap_or_else(|| node.clone())
    }
}

/// A condition that is known at compile time. `NULL` counts as false.
fn const_condition(cond: &FormulaItem) -> Option<bool> {
    match as_literal(cond)? {
        Literal::Boolean(b) => Some(*b),
        Literal::Null => Some(false),
        _ => None,
    }
}

/// Drops branches whose condition is known to be false, and truncates at the
/// first condition known to be true.
///
/// `branches` are `(condition, value)` pairs. Returns `None` when nothing
/// changed.
fn prune_branches<'a, F>(
    branches: impl Iterator<Item = (&'a FormulaItem, &'a FormulaItem)>,
    else_value: &'a FormulaItem,
    decide: F,
) -> Option<(Vec<FormulaItem>, FormulaItem)>
where
    F: Fn(&FormulaItem) -> Option<bool>,
{
    let mut kept = Vec::new();
    let mut else_value = else_value;
    let mut changed = false;

    for (cond, value) in branches {
        match decide(cond) {
            Some(false) => changed = true,
            Some(true) => {
                else_value = value;
                changed = true;
                break;
            }
            None => kept.extend([cond.clone(), value.clone()]),
        }
    }

    if !changed && !kept.is_empty() {
        return None;
    }
    Some((kept, else_value.clone()))
}

/// `IF(cond_1, value_1, ..., else)` branch pruning.
pub struct IfPruning;

impl IfPruning {
    fn prune(node: &FormulaItem) -> Option<FormulaItem> {
        let call = node.kind.as_func_call()?;
        if call.name != "if" || call.args.len() < 3 || call.args.len() % 2 == 0 {
            return None;
        }

        let (else_value, pairs) = call.args.split_last()?;
        let branches = pairs.chunks_exact(2).map(|c| (&c[0], &c[1]));
        let (kept, else_value) = prune_branches(branches, else_value, const_condition)?;

        if kept.is_empty() {
            return Some(else_value);
        }
        let mut args = kept;
        args.push(else_value);
        Some(FormulaItem::func("if", args).with_span(node.span))
    }
}

impl Rule for IfPruning {
    fn name(&self) -> &'static str {
        "if_pruning"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::prune(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        Self::prune(node).unwrap_or_else(|| node.clone())
    }
}

/// `CASE(expr, when_1, then_1, ..., else)` branch pruning, for a literal `expr`.
pub struct CasePruning;

/// Whether two literals are equal, as far as it can be told at compile time.
fn literals_equal(a: &Literal, b: &Literal) -> Option<bool> {
    match (a, b) {
        (Literal::Null, _) | (_, Literal::Null) => Some(false),
        (a, b) if a.is_numeric() && b.is_numeric() => Some(a.as_f64()? == b.as_f64()?),
        (a, b) if a.same_type(b) => Some(a == b),
        _ => None,
    }
}

impl CasePruning {
    fn prune(node: &FormulaItem) -> Option<FormulaItem> {
        let call = node.kind.as_func_call()?;
        if call.name != "case" || call.args.len() < 4 || call.args.len() % 2 == 1 {
            return None;
        }

        let case_value = as_literal(&call.args[0])?;
        let (else_value, pairs) = call.args[1..].split_last()?;
        let branches = pairs.chunks_exact(2).map(|c| (&c[0], &c[1]));
        let decide = |when: &FormulaItem| literals_equal(case_value, as_literal(when)?);
        let (kept, else_value) = prune_branches(branches, else_value, decide)?;

        if kept.is_empty() {
            return Some(else_value);
        }
        let mut args = vec![call.args[0].clone()];
        args.extend(kept);
        args.push(else_value);
        Some(FormulaItem::func("case", args).with_span(node.span))
    }
}

impl Rule for CasePruning {
    fn name(&self) -> &'static str {
        "case_pruning"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::prune(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        Self::prune(node).unwrap_or_else(|| node.clone())
    }
}

/// `ISNULL(literal)` into a boolean.
pub struct IsNullFolding;

impl IsNullFolding {
    fn evaluate(node: &FormulaItem) -> Option<bool> {
        let call = node.kind.as_func_call()?;
        if call.name != "isnull" || call.args.len() != 1 {
            return None;
        }
        as_literal(&call.args[0]).map(|lit| lit.is_null())
    }
}

impl Rule for IsNullFolding {
    fn name(&self) -> &'static str {
        "isnull_folding"
    }

    fn match_node(&self, node: &FormulaItem, _: &[&FormulaItem]) -> bool {
        Self::evaluate(node).is_some()
    }

    fn make_replacement(&self, node: &FormulaItem, _: &[&FormulaItem]) -> FormulaItem {
        Self::evaluate(node).map_or_else(|| node.clone(), boolean)
    }
}
