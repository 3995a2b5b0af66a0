use insta::assert_snapshot;
use similar_asserts::assert_eq;

use formulac::ir::{CompiledMultiLevelQuery, CompiledQuery, ExecutionLevel};
use formulac::query::{render_dependencies, sanitize_multi_query};
use formulac::{compile_plan, FormulaItem, Options};

use crate::{field, info, layout, level, orders, share_plan, subquery};

/// `q_0` selects `q_0_0` and `q_0_1`; `q_1` only reads `q_0_0`.
fn two_level_plan() -> CompiledMultiLevelQuery {
    let q0 = CompiledQuery {
        select: vec![
            info("q_0_0", field("region"), &["ava_orders"]),
            info("q_0_1", field("amount"), &["ava_orders"]),
        ],
        group_by: vec![info("q_0_g", field("region"), &["ava_orders"])],
        filters: vec![info(
            "q_0_f",
            FormulaItem::binary(">", field("amount"), FormulaItem::literal(0)),
            &["ava_orders"],
        )],
        joined_from: orders(),
        ..CompiledQuery::new("q_0", ExecutionLevel::SourceDb)
    };
    let q1 = CompiledQuery {
        select: vec![info("q_1_0", FormulaItem::func("upper", vec![field("q_0_0")]), &["q_0"])],
        joined_from: subquery("q_0", &["q_0_0", "q_0_1"]),
        ..CompiledQuery::new("q_1", ExecutionLevel::Compeng)
    };
    CompiledMultiLevelQuery::new(vec![
        level(ExecutionLevel::SourceDb, vec![q0]),
        level(ExecutionLevel::Compeng, vec![q1]),
    ])
}

#[test]
fn test_unread_column_is_dropped() {
    let plan = sanitize_multi_query(two_level_plan());
    assert_snapshot!(layout(&plan), @r"
    q_0 [q_0_0]
    q_1 [q_1_0]
    ");
}

#[test]
fn test_top_level_is_untouched() {
    let before = two_level_plan();
    let after = sanitize_multi_query(before.clone());
    assert_eq!(before.top_queries(), after.top_queries());
}

#[test]
fn test_structural_parts_are_kept() {
    let before = two_level_plan();
    let after = sanitize_multi_query(before.clone());
    for (b, a) in before.iter_queries().zip(after.iter_queries()) {
        assert_eq!(b.group_by, a.group_by);
        assert_eq!(b.filters, a.filters);
        assert_eq!(b.join_on, a.join_on);
        assert_eq!(b.joined_from, a.joined_from);
    }
}

#[test]
fn test_idempotence() {
    for plan in [two_level_plan(), share_plan()] {
        let plan = compile_plan(plan, &Options::default().with_sanitize(false)).unwrap();
        let once = sanitize_multi_query(plan);
        let twice = sanitize_multi_query(once.clone());
        assert_eq!(once, twice);
    }
}

#[test]
fn test_columns_read_by_forks_survive() {
    let plan = compile_plan(share_plan(), &Options::default()).unwrap();

    // `product` is read by nobody, `region` and `amount` by the consumer and
    // by its fork
    assert_eq!(plan.levels[0].queries[0].select_aliases(), vec!["region", "amount"]);
    assert_snapshot!(render_dependencies(&plan), @r"
    0: q0
    1: q1_f0 <- q0
    1: q1 <- q0, q1_f0
    ");
}

#[test]
fn test_unread_query_is_kept() {
    let mut plan = two_level_plan();
    plan.levels[0].queries.push(CompiledQuery {
        select: vec![info("q_2_0", field("product"), &["ava_orders"])],
        joined_from: orders(),
        ..CompiledQuery::new("q_2", ExecutionLevel::SourceDb)
    });

    let plan = sanitize_multi_query(plan);
    let orphan = plan.query_by_id("q_2").unwrap();
    assert!(orphan.select.is_empty());
    assert_eq!(plan.query_ids(), vec!["q_0", "q_2", "q_1"]);
}
