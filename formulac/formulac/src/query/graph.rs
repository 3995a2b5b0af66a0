use std::collections::BTreeSet;

use itertools::Itertools;
use serde::Serialize;

use crate::ir::{CompiledMultiLevelQuery, FromObject, Id};

/// A consumer query reading the output of a dependency query.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Dependency {
    pub consumer: Id,
    pub dependency: Id,
}

/// Edges between queries of the plan, from subquery sources and from formula
/// `avatar_ids`. Edges to base avatars are omitted.
pub fn dependencies(plan: &CompiledMultiLevelQuery) -> Vec<Dependency> {
    let ids: BTreeSet<&str> = plan.query_ids().into_iter().collect();

    let mut res = BTreeSet::new();
    for query in plan.iter_queries() {
        let from_subqueries = query.joined_from.froms.iter().filter_map(|f| match f {
            FromObject::Subquery(s) => Some(s.query_id.as_str()),
            FromObject::Avatar(_) => None,
        });
        let from_formulas = query
            .all_formulas()
            .into_iter()
            .flat_map(|(_, info)| info.avatar_ids.iter().map(String::as_str));

        for dependency in from_subqueries.chain(from_formulas) {
            if ids.contains(dependency) && dependency != query.id {
                res.insert(Dependency {
                    consumer: query.id.clone(),
                    dependency: dependency.to_string(),
                });
            }
        }
    }
    res.into_iter().collect()
}

/// One line per query: `level: id <- dependencies`.
pub fn render_dependencies(plan: &CompiledMultiLevelQuery) -> String {
    let edges = dependencies(plan);
    let mut lines = Vec::new();
    for (level_index, level) in plan.levels.iter().enumerate() {
        for query in &level.queries {
            let deps = edges
                .iter()
                .filter(|e| e.consumer == query.id)
                .map(|e| e.dependency.as_str())
                .join(", ");
            if deps.is_empty() {
                lines.push(format!("{level_index}: {}", query.id));
            } else {
                lines.push(format!("{level_index}: {} <- {deps}", query.id));
            }
        }
    }
    lines.join("\n")
}
