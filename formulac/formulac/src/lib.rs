//! # formulac
//!
//! Compiler for BI formulas. Takes formula trees and multi-level query plans
//! built from them, and makes them ready for SQL generation.
//!
//! The passes, in order:
//! ```ascii
//!      FormulaItem / CompiledMultiLevelQuery
//!
//!             │
//!  (optimize) │ mutation::optimize_plan
//!             ▼
//!      plan with simplified formulas
//!             │
//!      (fork) │ query::scan_and_fork_multi_query
//!             ▼
//!      plan without QueryFork nodes
//!             │
//!  (sanitize) │ query::sanitize_multi_query
//!             ▼
//!      plan without unused columns
//!             │
//! (translate) │ translation::translate_plan
//!             ▼
//!
//!      SQL expression text per dialect
//! ```
//!
//! [compile_plan] runs the first three, [translate_plan] the last one.
//!
//! Formula source text is not parsed here: callers bring their own parser
//! through the [FormulaParser] trait.
//!
//! ## Common use-cases
//!
//! - Simplify a formula:
//!
//!   ```
//!   # fn main() -> Result<(), formulac::ErrorMessages> {
//!   use formulac::{FormulaItem, Options};
//!
//!   let formula = FormulaItem::binary("+", FormulaItem::literal(1), FormulaItem::literal(2));
//!   let optimized = formulac::optimize_formula(&formula, &Options::default())?;
//!   assert_eq!(optimized.to_string(), "3");
//!   # Ok(())
//!   # }
//!   ```
//!
//! - Compile and translate a plan from the command line:
//!
//!   ```sh
//!   $ formulac compile plan.json | formulac translate --dialect POSTGRESQL_9_4
//!   ```
//!
//! ## Feature flags
//!
//! * `cli`: enables the `formulac` CLI binary. This is enabled by default. When
//!   consuming this crate from another rust library, it can be disabled.

#![forbid(unsafe_code)]
// Our error type carries several strings and the formula origin. We're not
// that performance sensitive, so large `Err` variants are fine.
#![allow(clippy::result_large_err)]

use std::sync::OnceLock;

use semver::Version;
use serde::{Deserialize, Serialize};

pub use error_message::{ErrorMessage, ErrorMessages};
pub use formulac_ast as ast;
pub use formulac_ast::error::{
    Error, ErrorClass, ErrorSource, Errors, FormulaOrigin, MessageKind, Reason, WithErrorInfo,
};
pub use formulac_ast::formula::{
    BinaryExpr, FuncCall, ItemKind, JoinCondition, Literal, LodSpec, QueryFork, UnaryExpr,
};
pub use formulac_ast::span::Span;
pub use formulac_ast::FormulaItem;

pub mod debug;
mod error_message;
pub mod ir;
pub mod mutation;
pub mod query;
pub mod translation;
mod utils;

use crate::debug::{DebugEntryKind, Stage};
use crate::ir::CompiledMultiLevelQuery;
use crate::mutation::{default_rules, Mutator, DEFAULT_MAX_ITERATIONS};
use crate::translation::{DialectSet, TranslatedQuery};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Get the version of the compiler. This is determined by, in order:
/// - An optional environment variable `FORMULAC_VERSION_OVERRIDE`. Note that
///   this needs to be set the first time this function is called, since it's
///   stored in a static.
/// - The version in the cargo manifest
pub fn compiler_version() -> &'static Version {
    static COMPILER_VERSION: OnceLock<Version> = OnceLock::new();
    COMPILER_VERSION.get_or_init(|| {
        if let Ok(version_override) = std::env::var("FORMULAC_VERSION_OVERRIDE") {
            match Version::parse(&version_override) {
                Ok(version) => return version,
                Err(e) => log::warn!("Could not parse formulac version {version_override}\n{e}"),
            }
        }
        let cargo_version = env!("CARGO_PKG_VERSION");
        Version::parse(cargo_version).unwrap_or_else(|e| {
            log::warn!("Could not parse formulac version number {cargo_version}\n{e}");
            Version::new(0, 0, 0)
        })
    })
}

/// Simplifies a single formula with the default optimization rules.
///
/// Returns the formula unchanged when [Options::optimize] is off.
pub fn optimize_formula(item: &FormulaItem, options: &Options) -> Result<FormulaItem, ErrorMessages> {
    if !options.optimize {
        return Ok(item.clone());
    }
    Mutator::new(default_rules())
        .with_max_iterations(options.max_mutation_iterations)
        .apply(item)
        .with_source(ErrorSource::Optimizer)
        .map_err(|e| ErrorMessages::from(e).composed(&options.display))
}

/// Compiles a plan: optimizes every formula, forks off the [QueryFork]s into
/// sibling queries and prunes columns nobody reads.
///
/// Each pass can be switched off through [Options]. The input plan is
/// validated first and the output plan once more at the end.
pub fn compile_plan(
    plan: CompiledMultiLevelQuery,
    options: &Options,
) -> Result<CompiledMultiLevelQuery, ErrorMessages> {
    compile_plan_inner(plan, options).map_err(|e| ErrorMessages::from(e).composed(&options.display))
}

fn compile_plan_inner(
    mut plan: CompiledMultiLevelQuery,
    options: &Options,
) -> Result<CompiledMultiLevelQuery> {
    debug::log_stage(Stage::Initial);
    debug::log_entry(|| DebugEntryKind::ReprPlan(plan.clone()));
    plan.validate()?;

    if options.optimize {
        debug::log_stage(Stage::Optimization);
        plan = mutation::optimize_plan(plan, options.max_mutation_iterations)
            .with_source(ErrorSource::Optimizer)?;
        debug::log_entry(|| DebugEntryKind::ReprPlan(plan.clone()));
    }

    if options.fork {
        debug::log_stage(Stage::Forking);
        plan = query::scan_and_fork_multi_query(plan).with_source(ErrorSource::Forker)?;
        debug::log_entry(|| DebugEntryKind::ReprPlan(plan.clone()));
    }

    if options.sanitize {
        debug::log_stage(Stage::Sanitization);
        plan = query::sanitize_multi_query(plan);
        debug::log_entry(|| DebugEntryKind::ReprPlan(plan.clone()));
    }

    plan.validate()?;
    Ok(plan)
}

/// Translates every formula of every query into SQL expression text for
/// [Options::dialect], using the built-in translations.
pub fn translate_plan(
    plan: &CompiledMultiLevelQuery,
    options: &Options,
) -> Result<Vec<TranslatedQuery>, ErrorMessages> {
    debug::log_stage(Stage::Translation);
    let translated = translation::translate_plan(plan, options.dialect, translation::registry())
        .with_source(ErrorSource::Translator)
        .map_err(|e| ErrorMessages::from(e).composed(&options.display))?;
    debug::log_entry(|| DebugEntryKind::ReprTranslated(translated.clone()));
    Ok(translated)
}

/// Turns formula source text into a [FormulaItem].
///
/// Parsing is not part of this crate; implement this for the formula
/// language at hand.
pub trait FormulaParser {
    fn parse(&self, text: &str) -> Result<FormulaItem>;
}

/// Parses a formula and optimizes it.
pub fn parse_and_optimize<P: FormulaParser + ?Sized>(
    parser: &P,
    text: &str,
    options: &Options,
) -> Result<FormulaItem, ErrorMessages> {
    let item = parser
        .parse(text)
        .with_source(ErrorSource::Parser)
        .map_err(|e| ErrorMessages::from(e).composed(&options.display))?;
    optimize_formula(&item, options)
}

/// Compilation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Dialects to translate source-db queries for.
    ///
    /// Defaults to all dialects, which picks the generic translations.
    pub dialect: DialectSet,

    /// Simplify formulas before forking.
    ///
    /// Defaults to true.
    pub optimize: bool,

    /// Split query forks into sibling queries.
    ///
    /// Defaults to true. Plans that still contain forks cannot be translated.
    pub fork: bool,

    /// Remove select columns that no consumer reads.
    ///
    /// Defaults to true.
    pub sanitize: bool,

    /// Upper bound of rewrite iterations per formula.
    pub max_mutation_iterations: usize,

    /// Whether to use ANSI colors in error messages.
    pub display: DisplayOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dialect: DialectSet::ANY,
            optimize: true,
            fork: true,
            sanitize: true,
            max_mutation_iterations: DEFAULT_MAX_ITERATIONS,
            display: DisplayOptions::AnsiColor,
        }
    }
}

impl Options {
    pub fn with_dialect(mut self, dialect: DialectSet) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn no_optimize(self) -> Self {
        self.with_optimize(false)
    }

    pub fn with_fork(mut self, fork: bool) -> Self {
        self.fork = fork;
        self
    }

    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn with_max_mutation_iterations(mut self, max_mutation_iterations: usize) -> Self {
        self.max_mutation_iterations = max_mutation_iterations;
        self
    }

    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum DisplayOptions {
    /// Plain text
    Plain,
    /// With ANSI colors
    AnsiColor,
}

/// JSON serialization and deserialization functions
pub mod json {
    use super::*;

    /// JSON serialization
    pub fn from_formula(item: &FormulaItem) -> Result<String, ErrorMessages> {
        serde_json::to_string(item).map_err(convert_json_err)
    }

    /// JSON deserialization
    pub fn to_formula(json: &str) -> Result<FormulaItem, ErrorMessages> {
        serde_json::from_str(json).map_err(convert_json_err)
    }

    /// JSON serialization
    pub fn from_plan(plan: &CompiledMultiLevelQuery) -> Result<String, ErrorMessages> {
        serde_json::to_string(plan).map_err(convert_json_err)
    }

    /// JSON deserialization
    pub fn to_plan(json: &str) -> Result<CompiledMultiLevelQuery, ErrorMessages> {
        serde_json::from_str(json).map_err(convert_json_err)
    }

    fn convert_json_err(err: serde_json::Error) -> ErrorMessages {
        ErrorMessages::from(Error::new_simple(err.to_string()))
    }
}
