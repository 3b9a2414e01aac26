//! Destination for text printed by generated code.
//!
//! Output goes to the process stdout unless the current thread is inside
//! [`capture_output`], in which case it is collected into a buffer. JIT code
//! runs on the invoking thread, so capturing around an invocation observes
//! exactly what that invocation printed.

use std::cell::RefCell;
use std::io::{self, Write};

thread_local! {
    static CAPTURE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Restores the previous capture buffer even if the captured closure panics.
struct CaptureGuard {
    previous: Option<Option<String>>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CAPTURE.with(|capture| *capture.borrow_mut() = previous);
        }
    }
}

/// Run `f`, returning its result together with everything printed on this
/// thread while it ran. Captures nest.
pub fn capture_output<R>(f: impl FnOnce() -> R) -> (R, String) {
    let previous = CAPTURE.with(|capture| capture.replace(Some(String::new())));
    let mut guard = CaptureGuard {
        previous: Some(previous),
    };

    let result = f();

    let previous = guard.previous.take().unwrap_or_default();
    let captured = CAPTURE
        .with(|capture| capture.replace(previous))
        .unwrap_or_default();
    (result, captured)
}

pub(crate) fn write_line(line: &str) {
    let captured = CAPTURE.with(|capture| match capture.borrow_mut().as_mut() {
        Some(buffer) => {
            buffer.push_str(line);
            buffer.push('\n');
            true
        }
        None => false,
    });

    if !captured {
        let mut stdout = io::stdout().lock();
        // A closed stdout is not an error for the running program.
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }
}
