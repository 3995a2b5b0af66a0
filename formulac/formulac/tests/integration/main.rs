//! End-to-end tests of the public API and of the `formulac` binary.

use formulac::ir::{
    AvatarFromObject, CompiledFormulaInfo, CompiledLevel, CompiledMultiLevelQuery, CompiledQuery,
    ExecutionLevel, FromColumn, FromObject, JoinedFromObject, SubqueryFromObject,
};
use formulac::{FormulaItem, JoinCondition, LodSpec, QueryFork};

mod cli;
mod forker;
mod optimizer;
mod sanitizer;
mod translation;

pub fn field(name: &str) -> FormulaItem {
    FormulaItem::field(name)
}

fn columns(names: &[&str]) -> Vec<FromColumn> {
    names
        .iter()
        .map(|c| FromColumn {
            id: c.to_string(),
            name: c.to_string(),
        })
        .collect()
}

/// The `orders` table with `region`, `product` and `amount` columns.
pub fn orders() -> JoinedFromObject {
    JoinedFromObject {
        root_from_id: Some("orders".to_string()),
        froms: vec![FromObject::Avatar(AvatarFromObject {
            id: "orders".to_string(),
            alias: "orders".to_string(),
            avatar_id: "ava_orders".to_string(),
            source_id: "src".to_string(),
            columns: columns(&["region", "product", "amount"]),
        })],
    }
}

/// Reads all columns of the lower-level query `query_id`.
pub fn subquery(query_id: &str, names: &[&str]) -> JoinedFromObject {
    JoinedFromObject {
        root_from_id: Some(format!("{query_id}_from")),
        froms: vec![FromObject::Subquery(SubqueryFromObject {
            id: format!("{query_id}_from"),
            alias: query_id.to_string(),
            query_id: query_id.to_string(),
            columns: columns(names),
        })],
    }
}

pub fn info(alias: &str, formula: FormulaItem, reads: &[&str]) -> CompiledFormulaInfo {
    CompiledFormulaInfo::new(alias, formula).with_avatar_ids(reads.iter().copied())
}

pub fn level(level_type: ExecutionLevel, queries: Vec<CompiledQuery>) -> CompiledLevel {
    CompiledLevel {
        level_type,
        queries,
    }
}

/// `SUM(amount)` per region, joined back on the region.
pub fn region_total() -> FormulaItem {
    FormulaItem::fork(QueryFork {
        result_expr: FormulaItem::func("sum", vec![field("amount")]),
        joining: vec![JoinCondition::SelfEq(field("region"))],
        lod: LodSpec::Fixed(vec![field("region")]),
    })
}

/// A source-db query over `orders`, and a compeng query computing each
/// region's share of the region total.
pub fn share_plan() -> CompiledMultiLevelQuery {
    let q0 = CompiledQuery {
        select: vec![
            info("region", field("region"), &["ava_orders"]),
            info("product", field("product"), &["ava_orders"]),
            info("amount", field("amount"), &["ava_orders"]),
        ],
        joined_from: orders(),
        ..CompiledQuery::new("q0", ExecutionLevel::SourceDb)
    };
    let q1 = CompiledQuery {
        select: vec![
            info("q1_0", field("region"), &["q0"]).with_original_field_id("region"),
            info(
                "q1_1",
                FormulaItem::binary("/", field("amount"), region_total()),
                &["q0"],
            )
            .with_original_field_id("share"),
        ],
        joined_from: subquery("q0", &["region", "product", "amount"]),
        ..CompiledQuery::new("q1", ExecutionLevel::Compeng)
    };
    CompiledMultiLevelQuery::new(vec![
        level(ExecutionLevel::SourceDb, vec![q0]),
        level(ExecutionLevel::Compeng, vec![q1]),
    ])
}

/// Ids of the plan's queries, one level per line.
pub fn layout(plan: &CompiledMultiLevelQuery) -> String {
    plan.levels
        .iter()
        .map(|l| {
            l.queries
                .iter()
                .map(|q| format!("{} [{}]", q.id, q.select_aliases().join(", ")))
                .collect::<Vec<_>>()
                .join("; ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
