//! Built-in translations of formula operators and functions.

use super::dialect::DialectSet as D;
use super::registry::{Arity, Registry, Translator};
use super::translators::{
    CaseTranslator, CastType, DbCastTranslator, Function, IfTranslator, Template,
};
use crate::Result;

const PG_FAMILY: D = D::POSTGRESQL.union(D::COMPENG);

fn template(name: &str, dialects: D, arity: Arity, sql: &str) -> Translator {
    Translator::new(name, dialects, arity, Template::new(sql))
}

fn function(name: &str, dialects: D, arity: Arity, sql_name: &str) -> Translator {
    Translator::new(name, dialects, arity, Function::new(sql_name))
}

fn binary(name: &str, sql: &str) -> Translator {
    template(name, D::ANY, Arity::Exact(2), sql)
}

pub fn builtin_registry() -> Result<Registry> {
    Registry::builder()
        .register_all(operators())
        .register_all(functions())
        .register_all(casts())
        .build()
}

fn operators() -> Vec<Translator> {
    vec![
        binary("+", "({0} + {1})"),
        binary("-", "({0} - {1})"),
        binary("*", "({0} * {1})"),
        binary("/", "({0} / {1})"),
        template("/", PG_FAMILY, Arity::Exact(2), "(CAST({0} AS DOUBLE PRECISION) / {1})"),
        binary("%", "({0} % {1})"),
        binary("==", "({0} = {1})"),
        binary("!=", "({0} != {1})"),
        binary("<", "({0} < {1})"),
        binary(">", "({0} > {1})"),
        binary("<=", "({0} <= {1})"),
        binary(">=", "({0} >= {1})"),
        binary("_==", "({0} IS NOT DISTINCT FROM {1})"),
        template("_==", D::MYSQL, Arity::Exact(2), "({0} <=> {1})"),
        template("_==", D::CLICKHOUSE | D::MSSQLSRV, Arity::Exact(2),
            "(({0} = {1}) OR ({0} IS NULL AND {1} IS NULL))"),
        binary("_!=", "({0} IS DISTINCT FROM {1})"),
        template("_!=", D::MYSQL, Arity::Exact(2), "(NOT ({0} <=> {1}))"),
        template("_!=", D::CLICKHOUSE | D::MSSQLSRV, Arity::Exact(2),
            "(NOT (({0} = {1}) OR ({0} IS NULL AND {1} IS NULL)))"),
        binary("and", "({0} AND {1})"),
        binary("or", "({0} OR {1})"),
        binary("in", "({0} IN {1})"),
        binary("notin", "({0} NOT IN {1})"),
        binary("like", "({0} LIKE {1})"),
        binary("notlike", "({0} NOT LIKE {1})"),
        template("not", D::ANY, Arity::Exact(1), "(NOT {0})"),
        template("neg", D::ANY, Arity::Exact(1), "(-{0})"),
        // right-hand side of IN
        function("__list", D::ANY, Arity::AtLeast(1), ""),
    ]
}

fn functions() -> Vec<Translator> {
    vec![
        Translator::new("if", D::ANY, Arity::Odd(3), IfTranslator),
        Translator::new("case", D::ANY, Arity::Even(4), CaseTranslator),
        template("isnull", D::ANY, Arity::Exact(1), "({0} IS NULL)"),
        function("ifnull", D::ANY, Arity::Exact(2), "COALESCE"),
        function("coalesce", D::ANY, Arity::AtLeast(1), "COALESCE"),
        // aggregations
        function("sum", D::ANY, Arity::Exact(1), "SUM"),
        function("avg", D::ANY, Arity::Exact(1), "AVG"),
        function("min", D::ANY, Arity::Exact(1), "MIN"),
        function("max", D::ANY, Arity::Exact(1), "MAX"),
        template("count", D::ANY, Arity::Exact(0), "COUNT(*)"),
        function("count", D::ANY, Arity::Exact(1), "COUNT"),
        template("countd", D::ANY, Arity::Exact(1), "COUNT(DISTINCT {0})"),
        template("countd", D::CLICKHOUSE, Arity::Exact(1), "uniqExact({0})"),
        // strings
        function("upper", D::ANY, Arity::Exact(1), "UPPER"),
        function("lower", D::ANY, Arity::Exact(1), "LOWER"),
        function("len", D::ANY, Arity::Exact(1), "LENGTH"),
        function("len", D::MSSQLSRV, Arity::Exact(1), "LEN"),
        function("len", D::CLICKHOUSE, Arity::Exact(1), "lengthUTF8"),
        function("concat", D::ANY, Arity::AtLeast(1), "CONCAT"),
        template("concat", D::SQLITE, Arity::Exact(2), "({0} || {1})"),
        template("str", D::ANY, Arity::Exact(1), "CAST({0} AS VARCHAR)"),
        template("str", PG_FAMILY, Arity::Exact(1), "CAST({0} AS TEXT)"),
        template("str", D::MYSQL, Arity::Exact(1), "CAST({0} AS CHAR)"),
        function("str", D::CLICKHOUSE, Arity::Exact(1), "toString"),
        // numbers
        function("abs", D::ANY, Arity::Exact(1), "ABS"),
        function("round", D::ANY, Arity::Range(1, 2), "ROUND"),
        function("sqrt", D::ANY, Arity::Exact(1), "SQRT"),
        // dates
        template("today", D::ANY, Arity::Exact(0), "CURRENT_DATE"),
        function("today", D::MSSQLSRV, Arity::Exact(0), "GETDATE"),
        template("year", D::ANY, Arity::Exact(1), "EXTRACT(YEAR FROM {0})"),
        function("year", D::CLICKHOUSE, Arity::Exact(1), "toYear"),
        function("year", D::MSSQLSRV, Arity::Exact(1), "YEAR"),
    ]
}

fn casts() -> Vec<Translator> {
    let pg = DbCastTranslator::new(vec![
        CastType::new("SMALLINT", 0),
        CastType::new("INTEGER", 0),
        CastType::new("BIGINT", 0),
        CastType::new("REAL", 0),
        CastType::new("DOUBLE PRECISION", 0),
        CastType::new("NUMERIC", 2),
        CastType::new("TEXT", 0),
        CastType::new("CHARACTER", 1),
        CastType::new("CHAR", 1),
        CastType::new("CHARACTER VARYING", 1),
        CastType::new("VARCHAR", 1),
        CastType::new("DATE", 0),
        CastType::new("TIMESTAMP", 0),
    ]);
    let mysql = DbCastTranslator::new(vec![
        CastType::new("SIGNED", 0),
        CastType::new("UNSIGNED", 0),
        CastType::new("DECIMAL", 2),
        CastType::new("CHAR", 1),
        CastType::new("DATE", 0),
        CastType::new("DATETIME", 0),
    ]);
    let clickhouse = DbCastTranslator::new(vec![
        CastType::new("Int32", 0),
        CastType::new("Int64", 0),
        CastType::new("UInt64", 0),
        CastType::new("Float64", 0),
        CastType::new("Decimal", 2),
        CastType::new("String", 0),
        CastType::new("Date", 0),
        CastType::new("DateTime", 0),
    ]);

    let arity = Arity::Range(2, 4);
    vec![
        Translator::new("db_cast", PG_FAMILY, arity, pg),
        Translator::new("db_cast", D::MYSQL, arity, mysql),
        Translator::new("db_cast", D::CLICKHOUSE, arity, clickhouse),
    ]
}
