//! Mapping of Mana identifiers to Rust identifiers.

use mana_ast::{ENTRY_POINT, RESERVED_PREFIX};

/// Keywords that are usable as raw identifiers (`r#kw`).
const RAW_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do", "dyn",
    "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in", "let",
    "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return",
    "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized", "use",
    "virtual", "where", "while", "yield",
];

/// Names that cannot be raw identifiers, or that a `let` would parse as a
/// pattern instead of a fresh binding.
const PREFIXED: &[&str] = &[
    "_", "crate", "self", "Self", "super", "Some", "None", "Ok", "Err",
];

/// Rust spelling of a variable or parameter name.
pub fn local_name(name: &str) -> String {
    if PREFIXED.contains(&name) {
        format!("{RESERVED_PREFIX}_{name}")
    } else if RAW_KEYWORDS.contains(&name) {
        format!("r#{name}")
    } else {
        name.to_string()
    }
}

/// Rust spelling of a function name. The Mana entry point is renamed so that
/// the generated file can provide its own `fn main`.
pub fn function_name(name: &str) -> String {
    if name == ENTRY_POINT {
        format!("{RESERVED_PREFIX}_{ENTRY_POINT}")
    } else {
        local_name(name)
    }
}
