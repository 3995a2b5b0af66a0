use std::collections::HashSet;

use super::strip_fork_suffix;
use crate::ir::CompiledMultiLevelQuery;

/// Generates ids of forked queries, of form `{prefix}_f{n}`.
///
/// `n` is the lowest ordinal not taken by any query of the plan the
/// generator was loaded from, or by an id it produced earlier.
#[derive(Debug, Clone, Default)]
pub struct ForkIdGenerator {
    taken: HashSet<String>,
}

impl ForkIdGenerator {
    /// Returns a new id generator aware of all query ids of the plan.
    pub fn load(plan: &CompiledMultiLevelQuery) -> Self {
        ForkIdGenerator {
            taken: plan.query_ids().into_iter().map(str::to_string).collect(),
        }
    }

    pub fn gen(&mut self, consumer_id: &str) -> String {
        let prefix = strip_fork_suffix(consumer_id);
        let mut n = 0;
        loop {
            let id = format!("{prefix}_f{n}");
            if self.taken.insert(id.clone()) {
                return id;
            }
            n += 1;
        }
    }
}
