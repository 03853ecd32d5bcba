//! Core data types, enums, and market metadata.
//!
//! Symbols are carried as unified `BASE/QUOTE:SETTLE` strings everywhere in
//! the engine; only adapters see exchange-native ids.

pub mod enums;
pub mod symbol;
pub mod trading;

pub use enums::*;
pub use symbol::*;
pub use trading::*;
