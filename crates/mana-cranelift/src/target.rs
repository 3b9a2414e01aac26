//! Target description and Cranelift settings
//!
//! [`TargetInfo`] is the "data layout" a compilation unit is generated for:
//! triple, pointer type, default calling convention and byte order. The
//! execution engine refuses units generated for a different target.

use std::fmt;

use cranelift_codegen::ir::Type;
use cranelift_codegen::isa::{self, CallConv, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use target_lexicon::{Endianness, Triple};

use crate::errors::TargetError;

/// Cranelift optimization level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Settings for the code generator backing an execution engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub opt_level: OptLevel,
    /// Run the Cranelift verifier while compiling each function.
    pub verify: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verify: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetInfo {
    triple: Triple,
    pointer_type: Type,
    call_conv: CallConv,
    endianness: Endianness,
}

impl TargetInfo {
    /// Describe the machine this process runs on.
    pub fn host() -> Result<Self, TargetError> {
        Self::from_triple(Triple::host())
    }

    pub fn from_triple(triple: Triple) -> Result<Self, TargetError> {
        let unsupported = |reason: &str| TargetError::Unsupported {
            triple: triple.to_string(),
            reason: reason.to_string(),
        };

        triple
            .pointer_width()
            .map_err(|()| unsupported("unknown pointer width"))?;
        let endianness = triple
            .endianness()
            .map_err(|()| unsupported("unknown byte order"))?;
        isa::lookup(triple.clone()).map_err(|e| unsupported(&e.to_string()))?;

        Ok(Self {
            pointer_type: Type::triple_pointer_type(&triple),
            call_conv: CallConv::triple_default(&triple),
            endianness,
            triple,
        })
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer_type
    }

    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Build an ISA for this target.
    pub fn isa(&self, config: &EngineConfig) -> Result<OwnedTargetIsa, TargetError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false")?;
        flag_builder.set("is_pic", "false")?;
        flag_builder.set("opt_level", config.opt_level.as_setting())?;
        flag_builder.set(
            "enable_verifier",
            if config.verify { "true" } else { "false" },
        )?;

        let isa_builder = isa::lookup(self.triple.clone()).map_err(|e| TargetError::Unsupported {
            triple: self.triple.to_string(),
            reason: e.to_string(),
        })?;

        Ok(isa_builder.finish(settings::Flags::new(flag_builder))?)
    }
}

impl fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)
    }
}
