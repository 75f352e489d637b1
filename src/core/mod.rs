//! Core row types, error taxonomy, configuration, money rounding and the
//! Indian state tables.
//!
//! Every stage of the pipeline is a total function from one row type to
//! the next: `CanonicalRow` → `EnrichedRow` → `PricedRow` → `PivotRow`.

mod config;
mod error;
pub mod money;
pub mod states;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;
