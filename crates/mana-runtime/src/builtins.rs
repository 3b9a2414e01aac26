//! Builtin functions called from JIT-compiled code.

use tracing::warn;

use crate::output::write_line;
use crate::value::{ValueTag, render};

/// Symbol name generated code imports for printing.
pub const PRINT_SYMBOL: &str = "mana_print";

/// Print a tagged value followed by a newline.
///
/// # Safety
/// When `tag` is [`ValueTag::Str`], `bits` must be null or the address of a
/// NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mana_print(tag: i32, bits: i64) {
    let Some(tag) = ValueTag::from_raw(tag) else {
        warn!(tag, "mana_print called with an unknown value tag");
        return;
    };
    // SAFETY: forwarded from the caller.
    let line = unsafe { render(tag, bits) };
    write_line(&line);
}

/// Every symbol the host process exposes to generated code.
pub fn host_symbols() -> Vec<(&'static str, *const u8)> {
    vec![(PRINT_SYMBOL, mana_print as *const u8)]
}
