//! Core abstraction layer for "classic ARM" (ARMv4/ARMv5-family) targets.
//!
//! The central type is [`ArmCore`], the host-side model of one halted core:
//! it owns a lazily filled register cache, resolves logical register numbers
//! through the per-mode banking table, and tracks the processor mode and
//! instruction-set state. Hardware access goes through a caller-supplied
//! [`DebugTransport`].
//!
//! On top of the core model sit two target-side execution facilities:
//! [`ArmCore::run_algorithm`] injects and runs an arbitrary instruction
//! sequence with full state save/restore, and the [`checksum`] module uses it
//! to verify and blank-check memory without pulling it over the debug link.
//!
//! ```no_run
//! use arm_classic_core::{ArmCore, ArmCoreMode, CoreVariant};
//! # fn demo<T: arm_classic_core::DebugTransport>(transport: T) -> Result<(), arm_classic_core::ArmError> {
//! let mut core = ArmCore::new(transport, CoreVariant::Standard);
//! core.full_context_refresh()?;
//! let sp = core.register(13, ArmCoreMode::Irq)?;
//! let value = core.read_register(sp)?;
//! # let _ = value; Ok(()) }
//! ```

pub mod algorithm;
pub mod checksum;
pub mod core;
pub mod error;
pub mod transport;

pub use crate::algorithm::{AlgorithmRunRequest, MemoryParam, ParamDirection, RegisterParam};
pub use crate::checksum::{blank_check_memory, checksum_memory};
pub use crate::core::mode::{ArmCoreMode, ArmCoreState};
pub use crate::core::registers::{
    CoreVariant, RegisterCache, RegisterDescriptor, RegisterSlot, RegisterView,
};
pub use crate::core::{ArmCore, DebugModule, TraceModule};
pub use crate::error::{ArmError, TransportError};
pub use crate::transport::{BreakpointHandle, DebugTransport};
