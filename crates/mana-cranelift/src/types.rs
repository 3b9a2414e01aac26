//! Type system for Mana → Cranelift compilation
//!
//! Values are untagged in generated code: each expression's type is tracked
//! statically during lowering and only the `print` builtin receives a
//! runtime tag.

use cranelift_codegen::ir::types::{F64, I8, I32, I64, Type};
use cranelift_codegen::ir::{AbiParam, Signature};
use derive_more::Display;
use mana_runtime::ValueTag;

use crate::target::TargetInfo;

/// Source-level type of a lowered value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ValueType {
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("bool")]
    Bool,
    #[display("string")]
    Str,
    #[display("nil")]
    Nil,
}

impl ValueType {
    pub fn clif_type(self, target: &TargetInfo) -> Type {
        match self {
            ValueType::Int => ManaTypes::int_type(),
            ValueType::Float => ManaTypes::float_type(),
            ValueType::Bool => ManaTypes::bool_type(),
            ValueType::Str | ValueType::Nil => target.pointer_type(),
        }
    }

    pub fn tag(self) -> ValueTag {
        match self {
            ValueType::Int => ValueTag::Int,
            ValueType::Float => ValueTag::Float,
            ValueType::Bool => ValueTag::Bool,
            ValueType::Str => ValueTag::Str,
            ValueType::Nil => ValueTag::Nil,
        }
    }
}

/// Cranelift types used in Mana compilation
pub struct ManaTypes;

impl ManaTypes {
    /// Size in bytes of every variable slot; large enough for any value type.
    pub const SLOT_SIZE: u32 = 8;

    /// log2 of the slot alignment.
    pub const SLOT_ALIGN_SHIFT: u8 = 3;

    pub fn int_type() -> Type {
        I32
    }

    pub fn float_type() -> Type {
        F64
    }

    /// Booleans are 0 or 1 in a byte.
    pub fn bool_type() -> Type {
        I8
    }

    /// Type of the tag argument passed to the print builtin.
    pub fn tag_type() -> Type {
        I32
    }

    /// Type of the payload argument passed to the print builtin.
    pub fn payload_type() -> Type {
        I64
    }

    /// Every user function takes and returns `int`.
    pub fn function_signature(target: &TargetInfo, arity: usize) -> Signature {
        let mut sig = Signature::new(target.call_conv());
        sig.params
            .extend(std::iter::repeat_n(AbiParam::new(Self::int_type()), arity));
        sig.returns.push(AbiParam::new(Self::int_type()));
        sig
    }

    /// `(tag, payload) -> ()`, shared by the builtin and the host symbol.
    pub fn print_signature(target: &TargetInfo) -> Signature {
        let mut sig = Signature::new(target.call_conv());
        sig.params.push(AbiParam::new(Self::tag_type()));
        sig.params.push(AbiParam::new(Self::payload_type()));
        sig
    }
}
