mod log;

pub use crate::debug::log::*;
