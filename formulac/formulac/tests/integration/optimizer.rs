use insta::assert_snapshot;
use rstest::rstest;

use formulac::ir::{CompiledMultiLevelQuery, CompiledQuery, ExecutionLevel};
use formulac::{
    compile_plan, optimize_formula, DisplayOptions, ErrorClass, ErrorSource, FormulaItem, Options,
};

use crate::{field, info, level, orders};

fn lit(value: i64) -> FormulaItem {
    FormulaItem::literal(value)
}

fn bin(op: &str, left: FormulaItem, right: FormulaItem) -> FormulaItem {
    FormulaItem::binary(op, left, right)
}

fn optimized(item: FormulaItem) -> FormulaItem {
    optimize_formula(&item, &Options::default()).unwrap()
}

/// `1 + 1 + ... + 1`, which takes `terms - 1` replacements to fold.
fn long_sum(terms: usize) -> FormulaItem {
    (1..terms).fold(lit(1), |acc, _| bin("+", acc, lit(1)))
}

#[test]
fn test_constants() {
    assert_snapshot!(optimized(bin("==", lit(2), lit(2))), @"TRUE");
    assert_snapshot!(optimized(long_sum(10)), @"10");
    // left to the database
    assert_snapshot!(optimized(bin("/", field("x"), bin("-", lit(1), lit(1)))), @"([x] / 0)");
}

#[test]
fn test_boolean_comparison() {
    let item = bin("==", bin(">", field("A"), field("B")), lit(0));
    assert_snapshot!(optimized(item), @"([A] <= [B])");
}

#[test]
fn test_branches() {
    let item = FormulaItem::func(
        "if",
        vec![
            bin("==", lit(1), lit(2)),
            field("a"),
            FormulaItem::func("isnull", vec![FormulaItem::null()]),
            field("b"),
            field("c"),
        ],
    );
    assert_snapshot!(optimized(item), @"[b]");
}

#[rstest]
#[case::comparison(bin("!=", bin("<=", field("a"), lit(3)), lit(1)))]
#[case::nested(bin("and", bin("or", field("p"), FormulaItem::literal(false)), bin("+", lit(1), lit(2))))]
#[case::case_expr(FormulaItem::func("case", vec![lit(1), lit(2), field("a"), field("b")]))]
#[case::untouched(FormulaItem::func("sum", vec![field("amount")]))]
fn test_idempotence(#[case] item: FormulaItem) {
    let once = optimized(item);
    let twice = optimized(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn test_disabled() {
    let item = bin("==", lit(2), lit(2));
    let res = optimize_formula(&item, &Options::default().no_optimize()).unwrap();
    assert_eq!(res, item);
}

#[test]
fn test_iteration_cap() {
    let options = Options::default()
        .with_max_mutation_iterations(5)
        .with_display(DisplayOptions::Plain);

    let err = optimize_formula(&long_sum(20), &options).unwrap_err();
    let message = &err.inner[0];
    assert_eq!(message.class, ErrorClass::Internal);
    assert_eq!(message.source, ErrorSource::Optimizer);
    assert!(message.reason.contains("after 5 replacements"));

    // the cap applies per formula
    assert_snapshot!(optimize_formula(&long_sum(5), &options).unwrap(), @"5");
}

#[test]
fn test_plan_formulas_are_optimized() {
    let q0 = CompiledQuery {
        select: vec![info(
            "q0_0",
            bin("*", field("amount"), bin("+", lit(1), lit(1))),
            &["ava_orders"],
        )],
        filters: vec![info(
            "q0_f",
            bin("and", bin(">", field("amount"), lit(0)), FormulaItem::literal(true)),
            &["ava_orders"],
        )],
        joined_from: orders(),
        ..CompiledQuery::new("q0", ExecutionLevel::SourceDb)
    };
    let plan = CompiledMultiLevelQuery::new(vec![level(ExecutionLevel::SourceDb, vec![q0])]);

    let plan = compile_plan(plan, &Options::default()).unwrap();
    let query = &plan.levels[0].queries[0];
    assert_snapshot!(query.select[0].formula, @"([amount] * 2)");
    assert_snapshot!(query.filters[0].formula, @"([amount] > 0)");
}
