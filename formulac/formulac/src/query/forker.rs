//! Extracts sub-queries that evaluate at a different grouping granularity.
//!
//! Every [QueryFork] node in a query becomes a sibling query on the same
//! level, placed right before its consumer. The consumer reads the fork's
//! result through a left join on the fork's joining conditions, and the fork
//! node is replaced with a reference to the result column.

use std::collections::{BTreeSet, HashMap};

use crate::ir::fold::{fold_query, PlanFold};
use crate::ir::{
    CompiledFormulaInfo, CompiledJoinOnFormulaInfo, CompiledLevel, CompiledMultiLevelQuery,
    CompiledQuery, FromColumn, FromObject, Id, JoinType, JoinedFromObject, SubqueryFromObject,
};
use crate::utils::ForkIdGenerator;
use crate::{
    Error, ErrorSource, FormulaItem, FormulaOrigin, ItemKind, JoinCondition, LodSpec, QueryFork,
    Reason, Result, WithErrorInfo,
};

/// Replaces fork nodes of every query of the plan with references to newly
/// synthesized sibling queries.
///
/// Forks nested in the result of another fork end up in the synthesized query
/// and are extracted from there, so siblings of siblings come first.
pub fn scan_and_fork_multi_query(plan: CompiledMultiLevelQuery) -> Result<CompiledMultiLevelQuery> {
    let mut forker = QueryForker {
        ids: ForkIdGenerator::load(&plan),
    };

    let mut levels = Vec::with_capacity(plan.levels.len());
    for level in plan.levels {
        let mut queries = Vec::with_capacity(level.queries.len());
        for query in level.queries {
            queries.extend(forker.fork_query(query)?);
        }
        levels.push(CompiledLevel {
            level_type: level.level_type,
            queries,
        });
    }
    Ok(CompiledMultiLevelQuery { levels })
}

struct QueryForker {
    ids: ForkIdGenerator,
}

impl QueryForker {
    /// Returns the synthesized queries in dependency order, followed by the
    /// rewritten `query`.
    fn fork_query(&mut self, query: CompiledQuery) -> Result<Vec<CompiledQuery>> {
        if !has_forks(&query) {
            return Ok(vec![query]);
        }

        // siblings are built from the query as it was before any rewrite
        let base = query.clone();
        let mut scope = ForkScope {
            base: &base,
            forks: HashMap::new(),
            siblings: Vec::new(),
            new_joins: Vec::new(),
            new_froms: Vec::new(),
        };

        let mut query = query;
        // joining expressions may themselves contain forks, which only show
        // up in the query after the first round
        while has_forks(&query) {
            let mut rewriter = ForkRewriter {
                ids: &mut self.ids,
                scope: &mut scope,
            };
            query = fold_query(&mut rewriter, query)?;

            query.join_on.append(&mut scope.new_joins);
            query.joined_from.froms.append(&mut scope.new_froms);
        }

        let mut res = Vec::new();
        for sibling in scope.siblings {
            res.extend(self.fork_query(sibling)?);
        }
        res.push(query);
        Ok(res)
    }
}

fn has_forks(query: &CompiledQuery) -> bool {
    query
        .all_formulas()
        .iter()
        .any(|(_, info)| info.formula.contains_fork())
}

/// Reference to a synthesized query.
#[derive(Debug, Clone)]
struct Sibling {
    id: Id,
    result_alias: String,
}

/// State of forking one consumer query.
struct ForkScope<'a> {
    base: &'a CompiledQuery,

    /// Equal forks of one query are computed once.
    forks: HashMap<QueryFork, Sibling>,
    siblings: Vec<CompiledQuery>,

    new_joins: Vec<CompiledJoinOnFormulaInfo>,
    new_froms: Vec<FromObject>,
}

struct ForkRewriter<'s, 'a> {
    ids: &'s mut ForkIdGenerator,
    scope: &'s mut ForkScope<'a>,
}

impl PlanFold for ForkRewriter<'_, '_> {
    fn fold_formula_info(&mut self, mut info: CompiledFormulaInfo) -> Result<CompiledFormulaInfo> {
        if !info.formula.contains_fork() {
            return Ok(info);
        }

        let origin = FormulaOrigin {
            alias: Some(info.alias.clone()),
            field_id: info.original_field_id.clone(),
        };
        let mut used = Vec::new();
        info.formula = self
            .replace_forks(info.formula, &mut used)
            .with_source(ErrorSource::Forker)
            .with_origin(origin)?;
        info.avatar_ids.extend(used);
        Ok(info)
    }
}

impl ForkRewriter<'_, '_> {
    /// Replaces the outermost forks of `item`, collecting ids of the queries
    /// that now provide their values.
    fn replace_forks(&mut self, item: FormulaItem, used: &mut Vec<Id>) -> Result<FormulaItem> {
        let span = item.span;
        match item.kind {
            ItemKind::Fork(fork) => {
                let sibling = self.sibling_for(*fork).with_span_fallback(span)?;
                used.push(sibling.id);
                Ok(FormulaItem::field(sibling.result_alias).with_span(span))
            }
            kind => {
                let item = FormulaItem { kind, span };
                if !item.contains_fork() {
                    return Ok(item);
                }
                let mut children = Vec::new();
                for child in item.children() {
                    children.push(self.replace_forks(child.clone(), used)?);
                }
                Ok(item.with_children(children))
            }
        }
    }

    fn sibling_for(&mut self, fork: QueryFork) -> Result<Sibling> {
        if let Some(sibling) = self.scope.forks.get(&fork) {
            return Ok(sibling.clone());
        }

        let base = self.scope.base;
        let id = self.ids.gen(&base.id);
        let alias = |index: usize| format!("{id}_{index}");
        let sources = &base.joined_from;
        let require = |expr: &FormulaItem| require_sources(expr, sources, &base.id);

        let mut columns = Columns::default();
        let mut join_keys = Vec::with_capacity(fork.joining.len());
        for cond in &fork.joining {
            match cond {
                JoinCondition::SelfEq(expr) => {
                    require(expr)?;
                    let column = FormulaItem::field(alias(columns.insert(expr)));
                    join_keys.push((expr.clone(), column));
                }
                JoinCondition::Bin { expr, fork_expr } => {
                    require(expr)?;
                    require(fork_expr)?;
                    let remapped = remap_fields(fork_expr, &mut |name| {
                        FormulaItem::field(alias(columns.insert(&FormulaItem::field(name))))
                    });
                    join_keys.push((expr.clone(), remapped));
                }
            }
        }

        let dims: Vec<FormulaItem> = match &fork.lod {
            LodSpec::Fixed(dims) => dims.clone(),
            // grouping items that hold forks themselves cannot be inherited
            LodSpec::Inherited => base
                .group_by
                .iter()
                .filter(|g| !g.formula.contains_fork())
                .map(|g| g.formula.clone())
                .collect(),
            LodSpec::Include(_) | LodSpec::Exclude(_) => {
                return Err(Error::new(Reason::Expected {
                    who: Some("fork".to_string()),
                    expected: "a FIXED or inherited level of detail".to_string(),
                    found: fork.lod.to_string(),
                })
                .push_hint("INCLUDE and EXCLUDE must be resolved into FIXED dimensions before forking"));
            }
        };
        let group_by = dims
            .iter()
            .map(|dim| {
                CompiledFormulaInfo::new(alias(columns.insert(dim)), dim.clone())
                    .with_avatar_ids(source_refs(dim, sources))
            })
            .collect();

        let mut select: Vec<CompiledFormulaInfo> = columns
            .items
            .iter()
            .enumerate()
            .map(|(index, expr)| {
                CompiledFormulaInfo::new(alias(index), expr.clone())
                    .with_avatar_ids(source_refs(expr, sources))
            })
            .collect();
        let result_alias = alias(select.len());
        select.push(
            CompiledFormulaInfo::new(result_alias.clone(), fork.result_expr.clone())
                .with_avatar_ids(source_refs(&fork.result_expr, sources)),
        );

        let columns = select
            .iter()
            .map(|s| FromColumn {
                id: s.alias.clone(),
                name: s.alias.clone(),
            })
            .collect();

        let sibling_query = CompiledQuery {
            id: id.clone(),
            level_type: base.level_type,
            select,
            group_by,
            filters: base
                .filters
                .iter()
                .filter(|f| !f.formula.contains_fork())
                .cloned()
                .collect(),
            order_by: Vec::new(),
            join_on: base
                .join_on
                .iter()
                .filter(|j| !j.info.formula.contains_fork())
                .cloned()
                .collect(),
            joined_from: base.joined_from.clone(),
            limit: None,
            offset: None,
        };

        let join = join_back(base, &id, join_keys);
        log::debug!(
            "forked `{fork}` of query `{}` into `{id}`, joined on `{}`",
            base.id,
            join.info.formula
        );

        let sibling = Sibling { id, result_alias };
        self.scope.new_froms.push(FromObject::Subquery(SubqueryFromObject {
            id: sibling.id.clone(),
            alias: sibling.id.clone(),
            query_id: sibling.id.clone(),
            columns,
        }));
        self.scope.new_joins.push(join);
        self.scope.siblings.push(sibling_query);
        self.scope.forks.insert(fork, sibling.clone());
        Ok(sibling)
    }
}

/// Left join of the consumer to the fork on `outer _== inner` for every key.
/// A fork without joining conditions yields a single row and joins on `TRUE`.
fn join_back(
    base: &CompiledQuery,
    sibling_id: &str,
    keys: Vec<(FormulaItem, FormulaItem)>,
) -> CompiledJoinOnFormulaInfo {
    let mut avatar_ids = BTreeSet::from([sibling_id.to_string()]);
    let mut predicate: Option<FormulaItem> = None;
    for (outer, inner) in keys {
        avatar_ids.extend(source_refs(&outer, &base.joined_from));
        let eq = FormulaItem::binary("_==", outer, inner);
        predicate = Some(match predicate {
            Some(acc) => FormulaItem::binary("and", acc, eq),
            None => eq,
        });
    }

    CompiledJoinOnFormulaInfo {
        info: CompiledFormulaInfo {
            alias: format!("{sibling_id}_join"),
            formula: predicate.unwrap_or_else(|| FormulaItem::literal(true)),
            avatar_ids,
            original_field_id: None,
        },
        left_id: base
            .joined_from
            .root_id()
            .unwrap_or(base.id.as_str())
            .to_string(),
        right_id: sibling_id.to_string(),
        join_type: JoinType::Left,
    }
}

/// Distinct expressions selected by a synthesized query, in order of first use.
#[derive(Default)]
struct Columns {
    items: Vec<FormulaItem>,
}

impl Columns {
    /// Position of `expr`, appending it if it's new.
    fn insert(&mut self, expr: &FormulaItem) -> usize {
        if let Some(index) = self.items.iter().position(|c| c == expr) {
            return index;
        }
        self.items.push(expr.clone());
        self.items.len() - 1
    }
}

fn remap_fields(item: &FormulaItem, f: &mut dyn FnMut(&str) -> FormulaItem) -> FormulaItem {
    match &item.kind {
        ItemKind::Field(name) => f(name).with_span(item.span),
        _ => {
            let children = item.children().into_iter().map(|c| remap_fields(c, f)).collect();
            item.with_children(children)
        }
    }
}

/// Joining conditions must only read columns of the consumer's sources.
fn require_sources(expr: &FormulaItem, sources: &JoinedFromObject, query_id: &str) -> Result<()> {
    for name in expr.used_fields() {
        if sources.resolve(name).is_none() {
            return Err(Error::new(Reason::UnresolvedForkReference {
                name: name.to_string(),
                query_id: query_id.to_string(),
            })
            .with_span(expr.span)
            .with_code("E0101"));
        }
    }
    Ok(())
}

/// Avatar references of the sources `expr` reads. Unknown names are skipped.
fn source_refs(expr: &FormulaItem, sources: &JoinedFromObject) -> BTreeSet<Id> {
    expr.used_fields()
        .into_iter()
        .filter_map(|name| sources.resolve(name))
        .map(|from| from.avatar_ref().to_string())
        .collect()
}
