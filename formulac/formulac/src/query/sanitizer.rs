//! Removes select columns of intermediate queries that nothing reads.

use std::collections::{HashMap, HashSet};

use crate::ir::{CompiledMultiLevelQuery, CompiledQuery, Id};

/// Drops unused select columns from every query except the top-level ones.
///
/// A column is used when some live formula of a query that reads it (per
/// `avatar_ids`) references its alias. All formulas of top-level queries are
/// live, as are all group by, filter, order by and join formulas. Queries
/// are never removed, even when none of their columns survive.
pub fn sanitize_multi_query(mut plan: CompiledMultiLevelQuery) -> CompiledMultiLevelQuery {
    let mut used: HashMap<Id, HashSet<String>> = HashMap::new();
    let top = plan.levels.len().saturating_sub(1);

    // consumers come after their dependencies, so walk the plan backwards
    for (level_index, level) in plan.levels.iter_mut().enumerate().rev() {
        for query in level.queries.iter_mut().rev() {
            if level_index != top {
                prune_select(query, used.get(&query.id));
            }
            collect_used(query, &mut used);
        }
    }
    plan
}

fn prune_select(query: &mut CompiledQuery, used: Option<&HashSet<String>>) {
    let before = query.select.len();
    query
        .select
        .retain(|s| used.is_some_and(|used| used.contains(&s.alias)));

    if query.select.len() != before {
        log::debug!(
            "pruned {} unused columns of query `{}`",
            before - query.select.len(),
            query.id
        );
    }
}

fn collect_used(query: &CompiledQuery, used: &mut HashMap<Id, HashSet<String>>) {
    for (_, info) in query.all_formulas() {
        let fields = info.formula.used_fields();
        for avatar_id in &info.avatar_ids {
            let names = used.entry(avatar_id.clone()).or_default();
            names.extend(fields.iter().map(|f| f.to_string()));
        }
    }
}
