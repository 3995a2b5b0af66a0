use insta::assert_snapshot;
use rstest::rstest;

use formulac::ir::{CompiledMultiLevelQuery, CompiledQuery, ExecutionLevel};
use formulac::translation::{registry, translate_formula, DialectSet, TranslatedQuery};
use formulac::{
    compile_plan, optimize_formula, translate_plan, DisplayOptions, ErrorClass, ErrorSource,
    FormulaItem, Options,
};

use crate::{field, info, level, orders, share_plan};

fn options(dialect: DialectSet) -> Options {
    Options::default()
        .with_dialect(dialect)
        .with_display(DisplayOptions::Plain)
}

fn by_id<'a>(queries: &'a [TranslatedQuery], id: &str) -> &'a TranslatedQuery {
    queries.iter().find(|q| q.id == id).unwrap()
}

fn sqls(query: &TranslatedQuery) -> Vec<&str> {
    query.select.iter().map(|c| c.sql.as_str()).collect()
}

/// A single source-db query selecting `formula` from `orders`.
fn single(formula: FormulaItem) -> CompiledMultiLevelQuery {
    let q0 = CompiledQuery {
        select: vec![info("q0_0", formula, &["ava_orders"]).with_original_field_id("f")],
        joined_from: orders(),
        ..CompiledQuery::new("q0", ExecutionLevel::SourceDb)
    };
    CompiledMultiLevelQuery::new(vec![level(ExecutionLevel::SourceDb, vec![q0])])
}

#[test]
fn test_share_plan() {
    let options = options(DialectSet::POSTGRESQL_9_4);
    let plan = compile_plan(share_plan(), &options).unwrap();
    let queries = translate_plan(&plan, &options).unwrap();

    let ids: Vec<_> = queries.iter().map(|q| (q.id.as_str(), q.level)).collect();
    assert_eq!(ids, vec![("q0", 0), ("q1_f0", 1), ("q1", 1)]);

    let q0 = by_id(&queries, "q0");
    assert_eq!(q0.dialect, "POSTGRESQL_9_4");
    assert_eq!(sqls(q0), vec![r#""region""#, r#""amount""#]);

    // compeng queries are rendered for the computation engine
    let fork = by_id(&queries, "q1_f0");
    assert_eq!(fork.dialect, "COMPENG");
    assert_eq!(sqls(fork), vec![r#""region""#, r#"SUM("amount")"#]);
    assert_eq!(fork.group_by, vec![r#""region""#]);

    let q1 = by_id(&queries, "q1");
    assert_snapshot!(q1.select[1].sql, @r#"(CAST("amount" AS DOUBLE PRECISION) / "q1_f0_1")"#);
    assert_eq!(q1.joins.len(), 1);
    assert_snapshot!(q1.joins[0].on, @r#"("region" IS NOT DISTINCT FROM "q1_f0_0")"#);
    assert_eq!(q1.joins[0].right_id, "q1_f0");
}

#[rstest]
#[case::sqlite(DialectSet::SQLITE, r#"(LENGTH("product") > 3)"#)]
#[case::mssql(DialectSet::MSSQLSRV, r#"(LEN("product") > 3)"#)]
#[case::clickhouse(DialectSet::CLICKHOUSE_21_8, "(lengthUTF8(`product`) > 3)")]
#[case::clickhouse_family(DialectSet::CLICKHOUSE, "(lengthUTF8(`product`) > 3)")]
fn test_dialect_variants(#[case] dialect: DialectSet, #[case] expected: &str) {
    let formula = FormulaItem::binary(
        ">",
        FormulaItem::func("len", vec![field("product")]),
        FormulaItem::literal(3),
    );
    let queries = translate_plan(&single(formula), &options(dialect)).unwrap();
    assert_eq!(queries[0].select[0].sql, expected);
    assert_eq!(queries[0].dialect, dialect.to_string());
}

#[test]
fn test_unavailable_function() {
    let formula = FormulaItem::func(
        "db_cast",
        vec![field("amount"), FormulaItem::literal("integer")],
    );
    let err = translate_plan(&single(formula), &options(DialectSet::SQLITE)).unwrap_err();

    let message = &err.inner[0];
    assert_eq!(message.class, ErrorClass::Translation);
    assert_eq!(message.source, ErrorSource::Translator);
    assert_eq!(message.code.as_deref(), Some("E0201"));
    assert_eq!(message.hints, vec!["it is not available on SQLITE"]);
    assert_eq!(message.origin.as_ref().unwrap().field_id.as_deref(), Some("f"));
}

#[test]
fn test_wrong_arity() {
    let formula = FormulaItem::func("upper", vec![field("region"), field("product")]);
    let err = translate_plan(&single(formula), &options(DialectSet::SQLITE)).unwrap_err();

    let message = &err.inner[0];
    assert_eq!(message.class, ErrorClass::ArityOrShape);
    assert_eq!(message.code.as_deref(), Some("E0202"));
}

#[rstest]
#[case::if_without_branches(FormulaItem::func("if", vec![field("amount")]))]
#[case::case_without_branches(FormulaItem::func("case", vec![FormulaItem::literal(1), field("amount")]))]
fn test_malformed_conditional_reaches_translation(#[case] item: FormulaItem) {
    let optimized = optimize_formula(&item, &Options::default()).unwrap();
    assert_eq!(optimized, item);

    let err = translate_formula(&optimized, DialectSet::SQLITE, registry()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::ArityOrShape);
    assert_eq!(err.code, Some("E0202"));
    assert_eq!(err.source, ErrorSource::Translator);
}

#[test]
fn test_fork_is_not_translated() {
    let options = options(DialectSet::SQLITE).with_fork(false);
    let plan = compile_plan(share_plan(), &options).unwrap();

    let err = translate_plan(&plan, &options).unwrap_err();
    let message = &err.inner[0];
    assert_eq!(message.class, ErrorClass::Translation);
    assert_eq!(message.reason, "cannot translate a query fork");
    assert_eq!(message.origin.as_ref().unwrap().alias.as_deref(), Some("q1_1"));
}
