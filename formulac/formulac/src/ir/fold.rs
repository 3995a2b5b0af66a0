/// A trait to "fold" a compiled plan, so we can transitively apply some logic
/// to every formula of every query by just defining how we want to handle each
/// type.
use itertools::Itertools;

use super::*;
use crate::{FormulaItem, Result};

// For some functions, we want to call a default impl, because copying &
// pasting everything apart from a specific match is lots of repetition. So
// we define a function outside the trait, by default call it, and let
// implementors override the default while calling the function directly for
// some cases. Ref https://stackoverflow.com/a/66077767/3064736
pub trait PlanFold {
    fn fold_plan(&mut self, plan: CompiledMultiLevelQuery) -> Result<CompiledMultiLevelQuery> {
        fold_plan(self, plan)
    }
    fn fold_level(&mut self, level: CompiledLevel) -> Result<CompiledLevel> {
        fold_level(self, level)
    }
    fn fold_query(&mut self, query: CompiledQuery) -> Result<CompiledQuery> {
        fold_query(self, query)
    }
    fn fold_formula_info(&mut self, info: CompiledFormulaInfo) -> Result<CompiledFormulaInfo> {
        fold_formula_info(self, info)
    }
    fn fold_formula(&mut self, formula: FormulaItem) -> Result<FormulaItem> {
        Ok(formula)
    }
}

pub fn fold_plan<F: ?Sized + PlanFold>(
    fold: &mut F,
    plan: CompiledMultiLevelQuery,
) -> Result<CompiledMultiLevelQuery> {
    Ok(CompiledMultiLevelQuery {
        levels: plan
            .levels
            .into_iter()
            .map(|l| fold.fold_level(l))
            .try_collect()?,
    })
}

pub fn fold_level<F: ?Sized + PlanFold>(fold: &mut F, level: CompiledLevel) -> Result<CompiledLevel> {
    Ok(CompiledLevel {
        level_type: level.level_type,
        queries: level
            .queries
            .into_iter()
            .map(|q| fold.fold_query(q))
            .try_collect()?,
    })
}

pub fn fold_query<F: ?Sized + PlanFold>(fold: &mut F, query: CompiledQuery) -> Result<CompiledQuery> {
    Ok(CompiledQuery {
        select: fold_formula_infos(fold, query.select)?,
        group_by: fold_formula_infos(fold, query.group_by)?,
        filters: fold_formula_infos(fold, query.filters)?,
        order_by: query
            .order_by
            .into_iter()
            .map(|o| -> Result<_> {
                Ok(CompiledOrderByFormulaInfo {
                    info: fold.fold_formula_info(o.info)?,
                    direction: o.direction,
                })
            })
            .try_collect()?,
        join_on: query
            .join_on
            .into_iter()
            .map(|j| -> Result<_> {
                Ok(CompiledJoinOnFormulaInfo {
                    info: fold.fold_formula_info(j.info)?,
                    ..j
                })
            })
            .try_collect()?,
        ..query
    })
}

fn fold_formula_infos<F: ?Sized + PlanFold>(
    fold: &mut F,
    infos: Vec<CompiledFormulaInfo>,
) -> Result<Vec<CompiledFormulaInfo>> {
    infos
        .into_iter()
        .map(|i| fold.fold_formula_info(i))
        .try_collect()
}

pub fn fold_formula_info<F: ?Sized + PlanFold>(
    fold: &mut F,
    info: CompiledFormulaInfo,
) -> Result<CompiledFormulaInfo> {
    Ok(CompiledFormulaInfo {
        formula: fold.fold_formula(info.formula)?,
        ..info
    })
}
