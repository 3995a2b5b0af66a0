//! Rendering formulas into SQL expressions of a target dialect.
//!
//! Operators and functions are looked up in a [Registry] by name, argument
//! count and dialect; literals and field references are rendered directly.

mod builtin;
mod dialect;
mod registry;
mod translators;

use chrono::{NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use dialect::{Dialect, DialectSet};
pub use registry::{registry, Arity, Registry, RegistryBuilder, Translator};
pub use translators::{
    Arg, CaseTranslator, CastType, DbCastTranslator, Function, IfTranslator, Template,
    TranslateOp, TranslationContext,
};

use crate::ir::{
    CompiledFormulaInfo, CompiledMultiLevelQuery, CompiledQuery, ExecutionLevel, Id, JoinType,
    OrderDirection,
};
use crate::{
    Error, ErrorSource, FormulaItem, FormulaOrigin, ItemKind, Literal, Reason, Result,
    WithErrorInfo,
};

/// Renders `item` as a SQL expression valid on all of `dialects`.
pub fn translate_formula(
    item: &FormulaItem,
    dialects: DialectSet,
    registry: &Registry,
) -> Result<String> {
    let ctx = TranslationContext { dialects };
    translate_item(item, &ctx, registry)
        .with_source(ErrorSource::Translator)
        .with_span_fallback(item.span)
}

fn translate_item(
    item: &FormulaItem,
    ctx: &TranslationContext,
    registry: &Registry,
) -> Result<String> {
    let (name, args): (&str, Vec<&FormulaItem>) = match &item.kind {
        ItemKind::Literal(literal) => return translate_literal(literal, ctx.dialects),
        ItemKind::Field(name) => return Ok(quote_ident(name, ctx.dialects)),
        ItemKind::Unary(u) => (u.op.as_str(), vec![&*u.expr]),
        ItemKind::Binary(b) => (b.op.as_str(), vec![&*b.left, &*b.right]),
        ItemKind::FuncCall(c) => (c.name.as_str(), c.args.iter().collect()),
        ItemKind::Fork(_) => {
            return Err(Error::new_simple("cannot translate a query fork")
                .push_hint("forks are extracted into separate queries before translation"));
        }
    };

    let translator = registry
        .resolve_call(name, args.len(), ctx.dialects)
        .with_span(item.span)?;

    let mut rendered = Vec::with_capacity(args.len());
    for arg in args {
        let sql = translate_item(arg, ctx, registry).with_span_fallback(arg.span)?;
        rendered.push(Arg { item: arg, sql });
    }
    translator
        .op
        .translate(ctx, &rendered)
        .with_span_fallback(item.span)
}

fn translate_literal(literal: &Literal, dialects: DialectSet) -> Result<String> {
    let no_booleans = !dialects.is_empty()
        && (DialectSet::MSSQLSRV | DialectSet::ORACLE).contains(dialects);
    let clickhouse = !dialects.is_empty() && DialectSet::CLICKHOUSE.contains(dialects);

    Ok(match literal {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(b) if no_booleans => (if *b { "1" } else { "0" }).to_string(),
        Literal::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) if !f.is_finite() => {
            return Err(Error::new(Reason::Unexpected {
                found: format!("non-finite number `{f}`"),
            }));
        }
        Literal::Float(_) => literal.to_string(),
        Literal::String(s) => quote_string(s),
        Literal::Date(s) => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                Error::new(Reason::Expected {
                    who: Some("date literal".to_string()),
                    expected: "YYYY-MM-DD".to_string(),
                    found: format!("`{s}`"),
                })
            })?;
            let text = quote_string(&date.format("%Y-%m-%d").to_string());
            if clickhouse {
                format!("toDate({text})")
            } else {
                format!("DATE {text}")
            }
        }
        Literal::Datetime(s) => {
            let datetime = parse_datetime(s).ok_or_else(|| {
                Error::new(Reason::Expected {
                    who: Some("datetime literal".to_string()),
                    expected: "YYYY-MM-DD HH:MM:SS".to_string(),
                    found: format!("`{s}`"),
                })
            })?;
            let text = quote_string(&datetime.format("%Y-%m-%d %H:%M:%S").to_string());
            if clickhouse {
                format!("toDateTime({text})")
            } else {
                format!("TIMESTAMP {text}")
            }
        }
    })
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn quote_ident(name: &str, dialects: DialectSet) -> String {
    let quote = dialects.ident_quote();
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}

/// A query of the plan with every formula rendered as SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TranslatedQuery {
    pub id: Id,
    pub level: usize,
    pub level_type: ExecutionLevel,
    /// Dialects the expressions were rendered for.
    pub dialect: String,
    pub select: Vec<TranslatedColumn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<TranslatedOrder>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<TranslatedJoin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TranslatedColumn {
    pub alias: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TranslatedOrder {
    pub sql: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TranslatedJoin {
    pub left_id: Id,
    pub right_id: Id,
    pub join_type: JoinType,
    pub on: String,
}

/// Translates every query of the plan.
///
/// Queries of the [ExecutionLevel::Compeng] level are rendered for the
/// computation engine, all others for `dialects`.
pub fn translate_plan(
    plan: &CompiledMultiLevelQuery,
    dialects: DialectSet,
    registry: &Registry,
) -> Result<Vec<TranslatedQuery>> {
    let mut res = Vec::new();
    for (level_index, level) in plan.levels.iter().enumerate() {
        for query in &level.queries {
            let query_dialects = match query.level_type {
                ExecutionLevel::Compeng => DialectSet::COMPENG,
                ExecutionLevel::SourceDb => dialects,
            };
            res.push(translate_query(query, level_index, query_dialects, registry)?);
        }
    }
    Ok(res)
}

fn translate_query(
    query: &CompiledQuery,
    level: usize,
    dialects: DialectSet,
    registry: &Registry,
) -> Result<TranslatedQuery> {
    let translate = |info: &CompiledFormulaInfo| -> Result<String> {
        translate_formula(&info.formula, dialects, registry).with_origin(FormulaOrigin {
            alias: Some(info.alias.clone()),
            field_id: info.original_field_id.clone(),
        })
    };

    let mut select = Vec::with_capacity(query.select.len());
    for info in &query.select {
        select.push(TranslatedColumn {
            alias: info.alias.clone(),
            sql: translate(info)?,
        });
    }
    let group_by = query.group_by.iter().map(&translate).collect::<Result<_>>()?;
    let filters = query.filters.iter().map(&translate).collect::<Result<_>>()?;

    let mut order_by = Vec::with_capacity(query.order_by.len());
    for order in &query.order_by {
        order_by.push(TranslatedOrder {
            sql: translate(&order.info)?,
            direction: order.direction,
        });
    }
    let mut joins = Vec::with_capacity(query.join_on.len());
    for join in &query.join_on {
        joins.push(TranslatedJoin {
            left_id: join.left_id.clone(),
            right_id: join.right_id.clone(),
            join_type: join.join_type,
            on: translate(&join.info)?,
        });
    }

    log::debug!("translated query `{}` for {dialects}", query.id);
    Ok(TranslatedQuery {
        id: query.id.clone(),
        level,
        level_type: query.level_type,
        dialect: dialects.to_string(),
        select,
        group_by,
        filters,
        order_by,
        joins,
        limit: query.limit,
        offset: query.offset,
    })
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;
    use crate::ErrorClass;

    fn f(name: &str) -> FormulaItem {
        FormulaItem::field(name)
    }

    fn sql(item: &FormulaItem, dialects: DialectSet) -> String {
        translate_formula(item, dialects, registry()).unwrap()
    }

    #[test]
    fn test_operators() {
        let item = FormulaItem::binary(
            "and",
            FormulaItem::binary(">", f("price"), FormulaItem::literal(10)),
            FormulaItem::unary("not", FormulaItem::func("isnull", vec![f("name")])),
        );
        assert_snapshot!(sql(&item, DialectSet::SQLITE), @r#"(("price" > 10) AND (NOT ("name" IS NULL)))"#);
    }

    #[rstest]
    #[case(DialectSet::POSTGRESQL_9_4, r#"("a" IS NOT DISTINCT FROM "b")"#)]
    #[case(DialectSet::MYSQL_8_0_12, "(`a` <=> `b`)")]
    #[case(DialectSet::CLICKHOUSE_22_10, "((`a` = `b`) OR (`a` IS NULL AND `b` IS NULL))")]
    fn test_null_safe_equality(#[case] dialects: DialectSet, #[case] expected: &str) {
        let item = FormulaItem::binary("_==", f("a"), f("b"));
        assert_eq!(sql(&item, dialects), expected);
    }

    #[test]
    fn test_literals() {
        let item = FormulaItem::func(
            "concat",
            vec![
                FormulaItem::literal("it's"),
                FormulaItem::literal(Literal::Date("2024-02-29".to_string())),
                FormulaItem::literal(Literal::Datetime("2024-02-29T10:00:00".to_string())),
                FormulaItem::literal(true),
                FormulaItem::literal(1.5),
                FormulaItem::null(),
            ],
        );
        assert_snapshot!(sql(&item, DialectSet::POSTGRESQL_9_4), @"CONCAT('it''s', DATE '2024-02-29', TIMESTAMP '2024-02-29 10:00:00', TRUE, 1.5, NULL)");

        let item = FormulaItem::func("ifnull", vec![f("flag"), FormulaItem::literal(false)]);
        assert_snapshot!(sql(&item, DialectSet::MSSQLSRV), @r#"COALESCE("flag", 0)"#);
    }

    #[test]
    fn test_invalid_date() {
        let item = FormulaItem::literal(Literal::Date("2023-02-30".to_string()));
        let err = translate_formula(&item, DialectSet::SQLITE, registry()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Translation);
        assert_snapshot!(err.reason, @"date literal expected YYYY-MM-DD, but found `2023-02-30`");
    }

    #[test]
    fn test_conditionals() {
        let item = FormulaItem::func(
            "if",
            vec![
                FormulaItem::binary("==", f("x"), FormulaItem::literal(1)),
                FormulaItem::literal("one"),
                FormulaItem::literal("other"),
            ],
        );
        assert_snapshot!(sql(&item, DialectSet::SQLITE), @r#"CASE WHEN ("x" = 1) THEN 'one' ELSE 'other' END"#);

        let item = FormulaItem::binary(
            "in",
            f("x"),
            FormulaItem::func("__list", vec![FormulaItem::literal(1), FormulaItem::literal(2)]),
        );
        assert_snapshot!(sql(&item, DialectSet::SQLITE), @r#"("x" IN (1, 2))"#);
    }

    #[test]
    fn test_dialect_variants() {
        let item = FormulaItem::func("str", vec![f("x")]);
        assert_snapshot!(sql(&item, DialectSet::COMPENG), @r#"CAST("x" AS TEXT)"#);
        assert_snapshot!(sql(&item, DialectSet::CLICKHOUSE_21_8), @"toString(`x`)");
        assert_snapshot!(sql(&item, DialectSet::ORACLE), @r#"CAST("x" AS VARCHAR)"#);
    }

    #[test]
    fn test_db_cast() {
        let item = FormulaItem::func(
            "db_cast",
            vec![
                f("x"),
                FormulaItem::literal("numeric"),
                FormulaItem::literal(12),
                FormulaItem::literal(4),
            ],
        );
        assert_snapshot!(sql(&item, DialectSet::POSTGRESQL_9_3), @r#"CAST("x" AS NUMERIC(12, 4))"#);

        let err = translate_formula(&item, DialectSet::SQLITE, registry()).unwrap_err();
        assert_eq!(err.code, Some("E0201"));
        assert_eq!(err.class(), ErrorClass::Translation);
    }

    #[test]
    fn test_arity_error() {
        let item = FormulaItem::func("upper", vec![f("a"), f("b")]);
        let err = translate_formula(&item, DialectSet::SQLITE, registry()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::ArityOrShape);
        assert_eq!(err.source, ErrorSource::Translator);
        assert_snapshot!(err.reason, @"function `UPPER` expects 1 arguments, but got 2");
    }

    #[test]
    fn test_fork_is_rejected() {
        let item = FormulaItem::fork(crate::QueryFork {
            result_expr: f("x"),
            joining: vec![],
            lod: crate::LodSpec::Fixed(vec![]),
        });
        let err = translate_formula(&item, DialectSet::SQLITE, registry()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Translation);
    }
}
