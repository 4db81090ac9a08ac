//! Fixed-function instruction encoders used to synthesize injected code.
//!
//! Each function maps operand fields straight into one instruction template.
//! No operand range validation is performed: these are hot-path helpers for
//! assembling known-good algorithm bodies, not a general assembler, and an
//! out-of-range operand silently produces a malformed instruction. Callers
//! supply legal values.

/// ARM (32-bit) instruction templates.
pub mod arm {
    /// No operation (`mov r8, r8`).
    pub const NOP: u32 = 0xe1a0_8008;

    /// Store multiple, increment after. `s` stores user-mode registers from a
    /// privileged mode; `w` writes the updated base back to `rn`.
    pub fn stmia(rn: u16, list: u16, s: bool, w: bool) -> u32 {
        0xe880_0000 | u32::from(s) << 22 | u32::from(w) << 21 | u32::from(rn) << 16 | u32::from(list)
    }

    /// Load multiple, increment after.
    pub fn ldmia(rn: u16, list: u16, s: bool, w: bool) -> u32 {
        0xe890_0000 | u32::from(s) << 22 | u32::from(w) << 21 | u32::from(rn) << 16 | u32::from(list)
    }

    /// Move PSR to register. `spsr` selects the SPSR over the CPSR.
    pub fn mrs(rd: u16, spsr: bool) -> u32 {
        0xe10f_0000 | u32::from(spsr) << 22 | u32::from(rd) << 12
    }

    /// Move register to PSR fields. `fields` is the PSR field mask
    /// (1 control, 2 extension, 4 status, 8 flags).
    pub fn msr_register(rm: u16, fields: u8, spsr: bool) -> u32 {
        0xe120_f000 | u32::from(spsr) << 22 | u32::from(fields) << 16 | u32::from(rm)
    }

    /// Move a rotated 8-bit immediate to PSR fields.
    pub fn msr_immediate(imm: u8, rotate: u8, fields: u8, spsr: bool) -> u32 {
        0xe320_f000
            | u32::from(spsr) << 22
            | u32::from(fields) << 16
            | u32::from(rotate) << 8
            | u32::from(imm)
    }

    /// Store `rd` at `[rn]`.
    pub fn str(rd: u16, rn: u16) -> u32 {
        0xe580_0000 | u32::from(rd) << 12 | u32::from(rn) << 16
    }

    /// Load `rd` from `[rn]`.
    pub fn ldr(rd: u16, rn: u16) -> u32 {
        0xe590_0000 | u32::from(rd) << 12 | u32::from(rn) << 16
    }

    /// Load halfword, post-indexed (`ldrh rd, [rn], #2`).
    pub fn ldrh_post_index(rd: u16, rn: u16) -> u32 {
        0xe0d0_00b2 | u32::from(rd) << 12 | u32::from(rn) << 16
    }

    /// Load byte, post-indexed (`ldrb rd, [rn], #1`).
    pub fn ldrb_post_index(rd: u16, rn: u16) -> u32 {
        0xe4d0_0001 | u32::from(rd) << 12 | u32::from(rn) << 16
    }

    /// Store halfword, post-indexed (`strh rd, [rn], #2`).
    pub fn strh_post_index(rd: u16, rn: u16) -> u32 {
        0xe0c0_00b2 | u32::from(rd) << 12 | u32::from(rn) << 16
    }

    /// Store byte, post-indexed (`strb rd, [rn], #1`).
    pub fn strb_post_index(rd: u16, rn: u16) -> u32 {
        0xe4c0_0001 | u32::from(rd) << 12 | u32::from(rn) << 16
    }

    /// Branch (and link). `offset` is the signed word offset from PC+8,
    /// already masked to the 24-bit field.
    pub fn branch(offset: u32, link: bool) -> u32 {
        0xea00_0000 | u32::from(link) << 24 | (offset & 0x00ff_ffff)
    }

    /// Branch and exchange to the address in `rm`.
    pub fn bx(rm: u16) -> u32 {
        0xe12f_ff10 | u32::from(rm)
    }

    /// Move register to register.
    pub fn mov(rd: u16, rm: u16) -> u32 {
        0xe1a0_0000 | u32::from(rd) << 12 | u32::from(rm)
    }

    /// Move an 8-bit immediate to a register.
    pub fn mov_immediate(rd: u16, imm: u8) -> u32 {
        0xe3a0_0000 | u32::from(rd) << 12 | u32::from(imm)
    }

    /// Move to register from coprocessor (MRC).
    pub fn mrc(cp_num: u8, op1: u8, rd: u16, crn: u8, crm: u8, op2: u8) -> u32 {
        0xee10_0010
            | u32::from(op1) << 21
            | u32::from(crn) << 16
            | u32::from(rd) << 12
            | u32::from(cp_num) << 8
            | u32::from(op2) << 5
            | u32::from(crm)
    }

    /// Move to coprocessor from register (MCR).
    pub fn mcr(cp_num: u8, op1: u8, rd: u16, crn: u8, crm: u8, op2: u8) -> u32 {
        0xee00_0010
            | u32::from(op1) << 21
            | u32::from(crn) << 16
            | u32::from(rd) << 12
            | u32::from(cp_num) << 8
            | u32::from(op2) << 5
            | u32::from(crm)
    }

    /// Breakpoint with a 16-bit immediate (ARMv5).
    pub fn bkpt(imm: u16) -> u32 {
        0xe120_0070 | (u32::from(imm) & 0xfff0) << 8 | u32::from(imm) & 0xf
    }
}

/// Thumb (16-bit) instruction templates.
///
/// Every encoder returns the halfword duplicated into both halves of the
/// returned word, so the stream can be injected with word-aligned writes
/// regardless of which halfword the target fetches first.
pub mod thumb {
    fn duplicate(half: u32) -> u32 {
        half | half << 16
    }

    /// No operation (`mov r8, r8`).
    pub const NOP: u32 = 0x46c0_46c0;

    /// Store `rd` at `[rn]`.
    pub fn str(rd: u16, rn: u16) -> u32 {
        duplicate(0x6000 | u32::from(rn) << 3 | u32::from(rd))
    }

    /// Load `rd` from `[rn]`.
    pub fn ldr(rd: u16, rn: u16) -> u32 {
        duplicate(0x6800 | u32::from(rn) << 3 | u32::from(rd))
    }

    /// Load multiple, increment after.
    pub fn ldmia(rn: u16, list: u8) -> u32 {
        duplicate(0xc800 | u32::from(rn) << 8 | u32::from(list))
    }

    /// Load `rd` PC-relative.
    pub fn ldr_pc_relative(rd: u16) -> u32 {
        duplicate(0x4800 | u32::from(rd) << 8)
    }

    /// Move between registers, high registers included.
    pub fn mov(rd: u16, rm: u16) -> u32 {
        let rd = u32::from(rd);
        let rm = u32::from(rm);
        duplicate(0x4600 | (rd & 0x7) | (rd & 0x8) << 4 | (rm & 0x7) << 3 | (rm & 0x8) << 3)
    }

    /// Move an 8-bit immediate to a low register.
    pub fn mov_immediate(rd: u16, imm: u8) -> u32 {
        duplicate(0x2000 | u32::from(rd) << 8 | u32::from(imm))
    }

    /// Branch and exchange to the address in `rm`.
    pub fn bx(rm: u16) -> u32 {
        duplicate(0x4700 | u32::from(rm) << 3)
    }

    /// Unconditional branch. `offset` is the signed halfword offset from
    /// PC+4, already masked to the 11-bit field.
    pub fn b(offset: u16) -> u32 {
        duplicate(0xe000 | u32::from(offset) & 0x7ff)
    }

    /// Breakpoint with an 8-bit immediate (ARMv5).
    pub fn bkpt(imm: u8) -> u32 {
        duplicate(0xbe00 | u32::from(imm))
    }
}
