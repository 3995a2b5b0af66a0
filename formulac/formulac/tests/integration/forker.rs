use insta::assert_snapshot;

use formulac::ir::{
    CompiledJoinOnFormulaInfo, CompiledMultiLevelQuery, CompiledQuery, ExecutionLevel, FromObject,
    JoinType,
};
use formulac::query::scan_and_fork_multi_query;
use formulac::{
    compile_plan, DisplayOptions, ErrorClass, ErrorSource, FormulaItem, JoinCondition, LodSpec,
    Options, QueryFork,
};

use crate::{field, info, layout, level, orders, region_total, share_plan, subquery};

fn options() -> Options {
    Options::default().with_display(DisplayOptions::Plain)
}

fn has_forks(plan: &CompiledMultiLevelQuery) -> bool {
    plan.iter_queries()
        .flat_map(|q| q.all_formulas())
        .any(|(_, info)| info.formula.contains_fork())
}

/// Number of queries that join the output of `id`.
fn consumers_of(plan: &CompiledMultiLevelQuery, id: &str) -> usize {
    plan.iter_queries()
        .filter(|q| {
            q.joined_from.froms.iter().any(|f| match f {
                FromObject::Subquery(s) => s.query_id == id,
                FromObject::Avatar(_) => false,
            })
        })
        .count()
}

#[test]
fn test_compile_share_plan() {
    let plan = compile_plan(share_plan(), &options()).unwrap();

    assert!(!has_forks(&plan));
    assert_snapshot!(layout(&plan), @r"
    q0 [region, amount]
    q1_f0 [q1_f0_0, q1_f0_1]; q1 [q1_0, q1_1]
    ");

    let sibling = plan.query_by_id("q1_f0").unwrap();
    assert_eq!(sibling.level_type, ExecutionLevel::Compeng);
    assert_snapshot!(sibling.select[1].formula, @"SUM([amount])");
    assert_snapshot!(sibling.group_by[0].formula, @"[region]");
    assert_eq!(sibling.joined_from, subquery("q0", &["region", "product", "amount"]));

    let consumer = plan.query_by_id("q1").unwrap();
    assert_snapshot!(consumer.select[1].formula, @"([amount] / [q1_f0_1])");
    assert!(consumer.select[1].avatar_ids.contains("q1_f0"));

    let join = &consumer.join_on[0];
    assert_snapshot!(join.info.formula, @"([region] _== [q1_f0_0])");
    assert_eq!(join.join_type, JoinType::Left);
    assert_eq!(join.left_id, "q0_from");
    assert_eq!(join.right_id, "q1_f0");

    assert_eq!(consumers_of(&plan, "q1_f0"), 1);
}

#[test]
fn test_equal_forks_share_one_query() {
    let q1 = CompiledQuery {
        select: vec![
            info("q1_0", region_total(), &["ava_orders"]),
            info(
                "q1_1",
                FormulaItem::binary("*", region_total(), FormulaItem::literal(2)),
                &["ava_orders"],
            ),
        ],
        joined_from: orders(),
        ..CompiledQuery::new("q1", ExecutionLevel::SourceDb)
    };
    let plan = CompiledMultiLevelQuery::new(vec![level(ExecutionLevel::SourceDb, vec![q1])]);

    let plan = scan_and_fork_multi_query(plan).unwrap();
    assert_eq!(plan.query_ids(), vec!["q1_f0", "q1"]);

    let consumer = plan.query_by_id("q1").unwrap();
    assert_snapshot!(consumer.select[0].formula, @"[q1_f0_1]");
    assert_snapshot!(consumer.select[1].formula, @"([q1_f0_1] * 2)");
    assert_eq!(consumer.join_on.len(), 1);
}

#[test]
fn test_forks_are_not_shared_across_queries() {
    let query = |id: &str| CompiledQuery {
        select: vec![info(&format!("{id}_0"), region_total(), &["ava_orders"])],
        joined_from: orders(),
        ..CompiledQuery::new(id, ExecutionLevel::SourceDb)
    };
    let plan = CompiledMultiLevelQuery::new(vec![level(
        ExecutionLevel::SourceDb,
        vec![query("q1"), query("q2")],
    )]);

    let plan = scan_and_fork_multi_query(plan).unwrap();
    assert_eq!(plan.query_ids(), vec!["q1_f0", "q1", "q2_f0", "q2"]);
    assert_eq!(consumers_of(&plan, "q1_f0"), 1);
    assert_eq!(consumers_of(&plan, "q2_f0"), 1);
    plan.validate().unwrap();
}

#[test]
fn test_fork_in_filter() {
    // orders with an amount above the average of their region
    let average = FormulaItem::fork(QueryFork {
        result_expr: FormulaItem::func("avg", vec![field("amount")]),
        joining: vec![JoinCondition::SelfEq(field("region"))],
        lod: LodSpec::Fixed(vec![field("region")]),
    });
    let q1 = CompiledQuery {
        select: vec![info("q1_0", field("product"), &["ava_orders"])],
        filters: vec![info(
            "q1_filter",
            FormulaItem::binary(">", field("amount"), average),
            &["ava_orders"],
        )],
        joined_from: orders(),
        ..CompiledQuery::new("q1", ExecutionLevel::SourceDb)
    };
    let plan = CompiledMultiLevelQuery::new(vec![level(ExecutionLevel::SourceDb, vec![q1])]);

    let plan = compile_plan(plan, &options()).unwrap();
    let sibling = plan.query_by_id("q1_f0").unwrap();
    // the filter reads the fork, so it cannot be evaluated by the fork itself
    assert!(sibling.filters.is_empty());

    let consumer = plan.query_by_id("q1").unwrap();
    assert_snapshot!(consumer.filters[0].formula, @"([amount] > [q1_f0_1])");
}

#[test]
fn test_unresolved_fork_reference() {
    let mut plan = share_plan();
    let fork = FormulaItem::fork(QueryFork {
        result_expr: FormulaItem::func("sum", vec![field("amount")]),
        joining: vec![JoinCondition::SelfEq(field("country"))],
        lod: LodSpec::Fixed(vec![field("country")]),
    });
    plan.levels[1].queries[0].select[1].formula = fork;

    let err = compile_plan(plan, &options()).unwrap_err();
    let message = &err.inner[0];
    assert_eq!(message.class, ErrorClass::UnresolvedForkReference);
    assert_eq!(message.source, ErrorSource::Forker);
    assert_eq!(message.code.as_deref(), Some("E0101"));

    let origin = message.origin.as_ref().unwrap();
    assert_eq!(origin.alias.as_deref(), Some("q1_1"));
    assert_eq!(origin.field_id.as_deref(), Some("share"));

    let text = err.to_string();
    assert!(text.starts_with(
        "[E0101] Error: fork references `country`, which is not available in query `q1`"
    ));
    assert!(text.contains("formula `q1_1` of field `share`"));
    assert!(!text.contains('\x1b'));
}

#[test]
fn test_fork_in_join_condition() {
    // orders joined only when above the total of their region
    let q1 = CompiledQuery {
        select: vec![info("q1_0", field("product"), &["ava_orders"])],
        join_on: vec![CompiledJoinOnFormulaInfo {
            info: info(
                "q1_join",
                FormulaItem::binary(">", field("amount"), region_total()),
                &["ava_orders"],
            ),
            left_id: "orders".to_string(),
            right_id: "orders".to_string(),
            join_type: JoinType::Inner,
        }],
        joined_from: orders(),
        ..CompiledQuery::new("q1", ExecutionLevel::SourceDb)
    };
    let plan = CompiledMultiLevelQuery::new(vec![level(ExecutionLevel::SourceDb, vec![q1])]);

    let plan = scan_and_fork_multi_query(plan).unwrap();
    assert!(!has_forks(&plan));
    assert_eq!(plan.query_ids(), vec!["q1_f0", "q1"]);

    let sibling = plan.query_by_id("q1_f0").unwrap();
    assert!(sibling.join_on.is_empty());

    let consumer = plan.query_by_id("q1").unwrap();
    assert_snapshot!(consumer.join_on[0].info.formula, @"([amount] > [q1_f0_1])");
    assert_eq!(consumer.join_on[1].right_id, "q1_f0");
    assert_eq!(consumers_of(&plan, "q1_f0"), 1);
}

#[test]
fn test_inherited_fork_in_grouping() {
    let inherited = FormulaItem::fork(QueryFork {
        result_expr: FormulaItem::func("sum", vec![field("amount")]),
        joining: vec![JoinCondition::SelfEq(field("region"))],
        lod: LodSpec::Inherited,
    });
    let q1 = CompiledQuery {
        select: vec![info("q1_0", field("product"), &["ava_orders"])],
        group_by: vec![
            info("q1_g0", inherited, &["ava_orders"]),
            info("q1_g1", field("product"), &["ava_orders"]),
        ],
        joined_from: orders(),
        ..CompiledQuery::new("q1", ExecutionLevel::SourceDb)
    };
    let plan = CompiledMultiLevelQuery::new(vec![level(ExecutionLevel::SourceDb, vec![q1])]);

    let plan = scan_and_fork_multi_query(plan).unwrap();
    assert!(!has_forks(&plan));
    assert_eq!(plan.query_ids(), vec!["q1_f0", "q1"]);

    // only the fork-free grouping is inherited
    let sibling = plan.query_by_id("q1_f0").unwrap();
    assert_eq!(sibling.group_by.len(), 1);
    assert_snapshot!(sibling.group_by[0].formula, @"[product]");

    let consumer = plan.query_by_id("q1").unwrap();
    assert_snapshot!(consumer.group_by[0].formula, @"[q1_f0_2]");
}

#[test]
fn test_forking_disabled() {
    let plan = compile_plan(share_plan(), &options().with_fork(false)).unwrap();
    assert!(has_forks(&plan));
    assert_eq!(plan.query_ids(), vec!["q0", "q1"]);
}
