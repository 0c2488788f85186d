//! CLI command implementations.

pub mod inspect;
pub mod migrate;
pub mod simulate;
