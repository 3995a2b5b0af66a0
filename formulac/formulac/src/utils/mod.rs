mod id_gen;

use std::sync::OnceLock;

pub use id_gen::ForkIdGenerator;
use regex::Regex;

fn fork_suffix() -> &'static Regex {
    static FORK_SUFFIX: OnceLock<Regex> = OnceLock::new();
    FORK_SUFFIX.get_or_init(|| {
        Regex::new(r"^(?P<prefix>.*)_f\d+$").unwrap_or_else(|e| unreachable!("bad regex: {e}"))
    })
}

/// Whether `id` looks like the id of a query synthesized by the forker.
pub(crate) fn is_fork_id(id: &str) -> bool {
    fork_suffix().is_match(id)
}

/// Strips a `_f<n>` suffix, so forks of forks get ids derived from the
/// original query rather than piling up suffixes.
pub(crate) fn strip_fork_suffix(id: &str) -> &str {
    fork_suffix()
        .captures(id)
        .and_then(|c| c.name("prefix"))
        .map_or(id, |m| m.as_str())
}
