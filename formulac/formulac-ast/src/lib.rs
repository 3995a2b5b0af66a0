//! The formula tree and the error types shared by all stages of formulac.
//!
//! Parsing formula source text is not part of this crate; parsers produce a
//! [FormulaItem] and hand it over to the compiler.

pub mod error;
pub mod formula;
pub mod span;

pub use error::{
    Error, ErrorClass, ErrorSource, Errors, FormulaOrigin, MessageKind, Reason, WithErrorInfo,
};
pub use formula::*;
pub use span::Span;
