//! Processor modes, instruction-set states and the register banking table of
//! "classic ARM" (ARMv4/ARMv5-family) cores.
//!
//! Everything in this module is pure and safe to call before any target
//! connection exists.

use crate::error::ArmError;

/// Processor modes of classic ARM cores.
///
/// The discriminants match the five low bits of the PSR registers, which build
/// on the ARMv4 processor modes and register set. [`ArmCoreMode::Any`] is a
/// sentinel meaning "mode independent / use the current mode" and is never a
/// mode the core can actually be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ArmCoreMode {
    /// User mode.
    Usr = 0x10,
    /// Fast interrupt mode.
    Fiq = 0x11,
    /// Interrupt mode.
    Irq = 0x12,
    /// Supervisor mode.
    Svc = 0x13,
    /// Abort mode.
    Abt = 0x17,
    /// Secure monitor mode (cores with security extensions only).
    Mon = 0x1a,
    /// Undefined instruction mode.
    Und = 0x1b,
    /// System mode.
    Sys = 0x1f,
    /// Sentinel: mode independent / use the current mode.
    Any = 0xff,
}

impl ArmCoreMode {
    /// Compact index of this mode, used to address the banking table.
    ///
    /// Total for all real modes; [`ArmCoreMode::Any`] has no index.
    pub fn to_index(self) -> Result<usize, ArmError> {
        match self {
            ArmCoreMode::Usr => Ok(0),
            ArmCoreMode::Fiq => Ok(1),
            ArmCoreMode::Irq => Ok(2),
            ArmCoreMode::Svc => Ok(3),
            ArmCoreMode::Abt => Ok(4),
            ArmCoreMode::Und => Ok(5),
            ArmCoreMode::Sys => Ok(6),
            ArmCoreMode::Mon => Ok(7),
            ArmCoreMode::Any => Err(ArmError::InvalidMode(ArmCoreMode::Any as u32)),
        }
    }

    /// Exact inverse of [`ArmCoreMode::to_index`].
    pub fn from_index(index: usize) -> Result<Self, ArmError> {
        match index {
            0 => Ok(ArmCoreMode::Usr),
            1 => Ok(ArmCoreMode::Fiq),
            2 => Ok(ArmCoreMode::Irq),
            3 => Ok(ArmCoreMode::Svc),
            4 => Ok(ArmCoreMode::Abt),
            5 => Ok(ArmCoreMode::Und),
            6 => Ok(ArmCoreMode::Sys),
            7 => Ok(ArmCoreMode::Mon),
            _ => Err(ArmError::InvalidIndex(index)),
        }
    }

    /// Decode the mode field of a PSR value.
    pub fn from_psr(psr: u32) -> Result<Self, ArmError> {
        match psr & 0x1f {
            0x10 => Ok(ArmCoreMode::Usr),
            0x11 => Ok(ArmCoreMode::Fiq),
            0x12 => Ok(ArmCoreMode::Irq),
            0x13 => Ok(ArmCoreMode::Svc),
            0x17 => Ok(ArmCoreMode::Abt),
            0x1a => Ok(ArmCoreMode::Mon),
            0x1b => Ok(ArmCoreMode::Und),
            0x1f => Ok(ArmCoreMode::Sys),
            bits => Err(ArmError::InvalidMode(bits)),
        }
    }

    /// Whether `bits` is one of the eight real PSR mode encodings.
    pub fn is_valid_mode(bits: u32) -> bool {
        Self::from_psr(bits).is_ok()
    }

    /// The PSR mode field encoding of this mode.
    pub fn psr_bits(self) -> u32 {
        self as u32 & 0x1f
    }

    /// Stable display name, unique per mode. Diagnostics only.
    pub fn name(self) -> &'static str {
        match self {
            ArmCoreMode::Usr => "User",
            ArmCoreMode::Fiq => "FIQ",
            ArmCoreMode::Irq => "IRQ",
            ArmCoreMode::Svc => "Supervisor",
            ArmCoreMode::Abt => "Abort",
            ArmCoreMode::Mon => "Secure Monitor",
            ArmCoreMode::Und => "Undefined instruction",
            ArmCoreMode::Sys => "System",
            ArmCoreMode::Any => "<any>",
        }
    }
}

impl std::fmt::Display for ArmCoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction-set states of classic ARM cores, defined by the PSR "T" and
/// "J" bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmCoreState {
    /// 32-bit ARM instructions.
    Arm,
    /// 16-bit Thumb instructions.
    Thumb,
    /// Jazelle bytecode execution.
    Jazelle,
    /// ThumbEE instructions.
    ThumbEe,
}

impl ArmCoreState {
    /// Decode the state from the PSR T and J bits.
    pub fn from_bits(t: bool, j: bool) -> Self {
        match (j, t) {
            (false, false) => ArmCoreState::Arm,
            (false, true) => ArmCoreState::Thumb,
            (true, false) => ArmCoreState::Jazelle,
            (true, true) => ArmCoreState::ThumbEe,
        }
    }

    /// Stable display name.
    pub fn name(self) -> &'static str {
        match self {
            ArmCoreState::Arm => "ARM",
            ArmCoreState::Thumb => "Thumb",
            ArmCoreState::Jazelle => "Jazelle",
            ArmCoreState::ThumbEe => "ThumbEE",
        }
    }
}

impl std::fmt::Display for ArmCoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The register banking table.
///
/// Indexed by `[mode index][logical register number 0..=16]`, yields the
/// physical register cache slot holding that register in that mode. Column 16
/// is the PSR: the CPSR for User/System, the mode's SPSR otherwise. This is
/// the single source of truth for "which physical register is rN in mode M".
///
/// Slot layout: r0..r12 = 0..12, sp_usr = 13, lr_usr = 14, pc = 15,
/// r8_fiq..r12_fiq = 16..20, sp/lr per exception mode = 21..30, cpsr = 31,
/// spsr_fiq..spsr_und = 32..36, sp_mon = 37, lr_mon = 38, spsr_mon = 39.
#[rustfmt::skip]
pub(crate) const REGISTER_MAP: [[usize; 17]; 8] = [
    // USR
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 13, 14, 15, 31],
    // FIQ
    [0, 1, 2, 3, 4, 5, 6, 7, 16, 17, 18, 19, 20, 21, 22, 15, 32],
    // IRQ
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 23, 24, 15, 33],
    // SVC
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 25, 26, 15, 34],
    // ABT
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 27, 28, 15, 35],
    // UND
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 29, 30, 15, 36],
    // SYS
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 13, 14, 15, 31],
    // MON
    [0, 1, 2, 3, 4, 5, 6, 7,  8,  9, 10, 11, 12, 37, 38, 15, 39],
];
