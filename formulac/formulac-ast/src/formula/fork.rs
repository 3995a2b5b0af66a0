use enum_as_inner::EnumAsInner;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FormulaItem;

/// A sub-expression that is evaluated at a different grouping granularity
/// than the query it appears in, then joined back by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct QueryFork {
    pub result_expr: FormulaItem,
    pub joining: Vec<JoinCondition>,
    pub lod: LodSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum JoinCondition {
    /// Equi-join on the same expression in both queries.
    SelfEq(FormulaItem),

    /// Join the outer `expr` to `fork_expr`, where `fork_expr` is evaluated
    /// over the columns of the forked query.
    Bin {
        expr: FormulaItem,
        fork_expr: FormulaItem,
    },
}

#[derive(Debug, EnumAsInner, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum LodSpec {
    Fixed(Vec<FormulaItem>),
    Include(Vec<FormulaItem>),
    Exclude(Vec<FormulaItem>),
    /// Group by whatever the enclosing query groups by.
    Inherited,
}

impl JoinCondition {
    /// The expression evaluated in the consuming query.
    pub fn expr(&self) -> &FormulaItem {
        match self {
            JoinCondition::SelfEq(expr) => expr,
            JoinCondition::Bin { expr, .. } => expr,
        }
    }
}

impl LodSpec {
    pub fn dimensions(&self) -> &[FormulaItem] {
        match self {
            LodSpec::Fixed(dims) | LodSpec::Include(dims) | LodSpec::Exclude(dims) => dims,
            LodSpec::Inherited => &[],
        }
    }
}

impl QueryFork {
    /// All direct sub-expressions, in a fixed order: result, joining, LOD dimensions.
    pub fn children(&self) -> Vec<&FormulaItem> {
        let mut res = vec![&self.result_expr];
        for cond in &self.joining {
            match cond {
                JoinCondition::SelfEq(expr) => res.push(expr),
                JoinCondition::Bin { expr, fork_expr } => {
                    res.push(expr);
                    res.push(fork_expr);
                }
            }
        }
        res.extend(self.lod.dimensions());
        res
    }

    /// Rebuilds the fork from a list of children in the order returned by
    /// [QueryFork::children].
    pub fn with_children(&self, children: Vec<FormulaItem>) -> QueryFork {
        let mut iter = children.into_iter();
        let mut next = |old: &FormulaItem| iter.next().unwrap_or_else(|| old.clone());

        let result_expr = next(&self.result_expr);
        let joining = self
            .joining
            .iter()
            .map(|cond| match cond {
                JoinCondition::SelfEq(expr) => JoinCondition::SelfEq(next(expr)),
                JoinCondition::Bin { expr, fork_expr } => JoinCondition::Bin {
                    expr: next(expr),
                    fork_expr: next(fork_expr),
                },
            })
            .collect();
        let lod = match &self.lod {
            LodSpec::Fixed(dims) => LodSpec::Fixed(dims.iter().map(&mut next).collect()),
            LodSpec::Include(dims) => LodSpec::Include(dims.iter().map(&mut next).collect()),
            LodSpec::Exclude(dims) => LodSpec::Exclude(dims.iter().map(&mut next).collect()),
            LodSpec::Inherited => LodSpec::Inherited,
        };
        QueryFork {
            result_expr,
            joining,
            lod,
        }
    }
}
