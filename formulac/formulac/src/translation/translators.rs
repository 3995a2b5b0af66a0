//! Ways of rendering an operation call into SQL.

use std::fmt::Debug;
use std::sync::OnceLock;

use itertools::Itertools;
use regex::Regex;

use super::dialect::DialectSet;
use crate::{Error, ErrorSource, FormulaItem, Literal, Reason, Result, WithErrorInfo};

/// An argument of a call: its formula and its rendered SQL.
#[derive(Debug, Clone)]
pub struct Arg<'a> {
    pub item: &'a FormulaItem,
    pub sql: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TranslationContext {
    /// Dialects the output must be valid on.
    pub dialects: DialectSet,
}

pub trait TranslateOp: Send + Sync + Debug {
    /// Renders a call. `args` was already checked against the variant's arity.
    fn translate(&self, ctx: &TranslationContext, args: &[Arg]) -> Result<String>;

    /// Short human readable form, used by listings.
    fn describe(&self) -> String;
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{(\d+)\}").unwrap_or_else(|e| unreachable!("bad regex: {e}"))
    })
}

/// SQL text with `{N}` placeholders for the rendered arguments.
#[derive(Debug, Clone)]
pub struct Template {
    template: String,
}

impl Template {
    pub fn new(template: &str) -> Self {
        Template {
            template: template.to_string(),
        }
    }
}

impl TranslateOp for Template {
    fn translate(&self, _ctx: &TranslationContext, args: &[Arg]) -> Result<String> {
        for captures in placeholder().captures_iter(&self.template) {
            let index: usize = captures[1].parse().unwrap_or(usize::MAX);
            if index >= args.len() {
                return Err(Error::new_assert(format!(
                    "template `{}` refers to argument {index} of {}",
                    self.template,
                    args.len()
                )));
            }
        }

        let res = placeholder().replace_all(&self.template, |captures: &regex::Captures| {
            let index: usize = captures[1].parse().unwrap_or_default();
            args.get(index).map_or("", |a| a.sql.as_str()).to_string()
        });
        Ok(res.into_owned())
    }

    fn describe(&self) -> String {
        self.template.clone()
    }
}

/// `NAME(arg, ...)`. With an empty name, renders a parenthesized list.
#[derive(Debug, Clone)]
pub struct Function {
    sql_name: String,
}

impl Function {
    pub fn new(sql_name: &str) -> Self {
        Function {
            sql_name: sql_name.to_string(),
        }
    }
}

impl TranslateOp for Function {
    fn translate(&self, _ctx: &TranslationContext, args: &[Arg]) -> Result<String> {
        Ok(format!(
            "{}({})",
            self.sql_name,
            args.iter().map(|a| &a.sql).join(", ")
        ))
    }

    fn describe(&self) -> String {
        format!("{}(...)", self.sql_name)
    }
}

/// `IF(cond, then, [cond, then, ...], else)` as a searched CASE.
#[derive(Debug, Clone, Copy)]
pub struct IfTranslator;

impl TranslateOp for IfTranslator {
    fn translate(&self, _ctx: &TranslationContext, args: &[Arg]) -> Result<String> {
        let Some((otherwise, branches)) = args.split_last() else {
            return Err(Error::new_assert("IF without arguments"));
        };
        let mut res = "CASE".to_string();
        for (cond, value) in branches.iter().tuples() {
            res += &format!(" WHEN {} THEN {}", cond.sql, value.sql);
        }
        res += &format!(" ELSE {} END", otherwise.sql);
        Ok(res)
    }

    fn describe(&self) -> String {
        "CASE WHEN ... THEN ... ELSE ... END".to_string()
    }
}

/// `CASE(expr, when, then, [when, then, ...], else)` as a simple CASE.
#[derive(Debug, Clone, Copy)]
pub struct CaseTranslator;

impl TranslateOp for CaseTranslator {
    fn translate(&self, _ctx: &TranslationContext, args: &[Arg]) -> Result<String> {
        let [subject, rest @ ..] = args else {
            return Err(Error::new_assert("CASE without arguments"));
        };
        let Some((otherwise, branches)) = rest.split_last() else {
            return Err(Error::new_assert("CASE without a default value"));
        };
        let mut res = format!("CASE {}", subject.sql);
        for (when, then) in branches.iter().tuples() {
            res += &format!(" WHEN {} THEN {}", when.sql, then.sql);
        }
        res += &format!(" ELSE {} END", otherwise.sql);
        Ok(res)
    }

    fn describe(&self) -> String {
        "CASE ... WHEN ... THEN ... ELSE ... END".to_string()
    }
}

/// A native type that `DB_CAST` may target.
#[derive(Debug, Clone)]
pub struct CastType {
    /// Spelling used in the output. Matched case-insensitively.
    pub name: &'static str,
    /// Number of integer parameters, like the precision and scale of `numeric`.
    pub params: usize,
}

impl CastType {
    pub const fn new(name: &'static str, params: usize) -> Self {
        CastType { name, params }
    }
}

/// `DB_CAST(expr, native_type, [param, ...])`: a cast to a type of the target
/// database, restricted to a whitelist.
#[derive(Debug, Clone)]
pub struct DbCastTranslator {
    types: Vec<CastType>,
}

impl DbCastTranslator {
    pub fn new(types: Vec<CastType>) -> Self {
        DbCastTranslator { types }
    }
}

impl TranslateOp for DbCastTranslator {
    fn translate(&self, ctx: &TranslationContext, args: &[Arg]) -> Result<String> {
        let [expr, native_type, params @ ..] = args else {
            return Err(Error::new_assert("DB_CAST with fewer than 2 arguments"));
        };

        let type_name = match native_type.item.kind.as_literal() {
            Some(Literal::String(name)) => name.trim(),
            _ => {
                return Err(Error::new(Reason::Expected {
                    who: Some("DB_CAST".to_string()),
                    expected: "a string literal naming the native type".to_string(),
                    found: native_type.item.to_string(),
                })
                .with_span(native_type.item.span)
                .with_source(ErrorSource::Translator));
            }
        };

        let cast_type = self
            .types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(type_name))
            .ok_or_else(|| {
                Error::new(Reason::UnsupportedCast {
                    native_type: type_name.to_string(),
                    dialect: ctx.dialects.to_string(),
                })
                .push_hint(format!(
                    "supported types: {}",
                    self.types.iter().map(|t| t.name).join(", ")
                ))
                .with_span(native_type.item.span)
                .with_code("E0203")
                .with_source(ErrorSource::Translator)
            })?;

        if params.len() != cast_type.params {
            return Err(Error::new(Reason::Expected {
                who: Some(format!("native type `{}`", cast_type.name)),
                expected: format!("{} parameters", cast_type.params),
                found: params.len().to_string(),
            })
            .with_code("E0203")
            .with_source(ErrorSource::Translator));
        }

        let mut rendered_params = Vec::with_capacity(params.len());
        for param in params {
            match param.item.kind.as_literal() {
                Some(Literal::Integer(value)) => rendered_params.push(value.to_string()),
                _ => {
                    return Err(Error::new(Reason::Expected {
                        who: Some(format!("parameter of native type `{}`", cast_type.name)),
                        expected: "an integer literal".to_string(),
                        found: param.item.to_string(),
                    })
                    .with_span(param.item.span)
                    .with_code("E0203")
                    .with_source(ErrorSource::Translator));
                }
            }
        }

        let target = cast_type.name;
        if rendered_params.is_empty() {
            Ok(format!("CAST({} AS {target})", expr.sql))
        } else {
            Ok(format!(
                "CAST({} AS {target}({}))",
                expr.sql,
                rendered_params.join(", ")
            ))
        }
    }

    fn describe(&self) -> String {
        format!(
            "CAST(... AS <{}>)",
            self.types.iter().map(|t| t.name).join(" | ")
        )
    }
}
