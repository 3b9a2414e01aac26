//! Value tags shared between generated code and the host runtime.
//!
//! Generated code passes every printable value as a `(tag, bits)` pair; the
//! numeric tag values are part of the ABI and must match what the code
//! generator emits.

use std::ffi::{CStr, c_char};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Int = 0,
    Float = 1,
    Bool = 2,
    Str = 3,
    Nil = 4,
}

impl ValueTag {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ValueTag::Int),
            1 => Some(ValueTag::Float),
            2 => Some(ValueTag::Bool),
            3 => Some(ValueTag::Str),
            4 => Some(ValueTag::Nil),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Render a tagged payload the way the `print` builtin displays it.
///
/// # Safety
/// For [`ValueTag::Str`], `bits` must be null or point to a NUL-terminated
/// string that stays alive for the duration of the call.
pub unsafe fn render(tag: ValueTag, bits: i64) -> String {
    match tag {
        ValueTag::Int => (bits as i32).to_string(),
        ValueTag::Float => f64::from_bits(bits as u64).to_string(),
        ValueTag::Bool => (bits != 0).to_string(),
        ValueTag::Str => {
            let ptr = bits as usize as *const c_char;
            if ptr.is_null() {
                return String::new();
            }
            // SAFETY: guaranteed by the caller.
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
        ValueTag::Nil => "nil".to_string(),
    }
}
