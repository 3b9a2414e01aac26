//! Mana to Rust transpiler
//!
//! [`transpile`] renders a Mana program as a single self-contained Rust
//! source file that behaves like the JIT-compiled program: same output,
//! same exit status. The file carries its own tiny runtime module for
//! `print` and `nil`, and needs nothing beyond `std`.

mod emitter;
mod names;

pub use emitter::transpile;
pub use names::{function_name, local_name};
