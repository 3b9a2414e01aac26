//! Mana host runtime.
//!
//! Provides the native functions JIT-compiled Mana code links against:
//! - `mana_print` backing the `print` builtin
//! - output capture for embedding and tests

pub mod builtins;
pub mod output;
pub mod value;

pub use builtins::{PRINT_SYMBOL, host_symbols, mana_print};
pub use output::capture_output;
pub use value::ValueTag;
