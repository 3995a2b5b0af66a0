//! Intermediate representation of compiled query plans.

pub mod fold;
mod query;

pub use query::*;
