//! Target-side checksum and erase-check routines.
//!
//! Both drivers assemble a small ARM-state routine, inject it into
//! caller-provided scratch RAM and run it through
//! [`ArmCore::run_algorithm`](crate::core::ArmCore::run_algorithm). Running
//! the loop on the target is orders of magnitude faster than pulling the
//! whole region over the debug link byte by byte.

use std::time::Duration;

use crate::algorithm::{AlgorithmRunRequest, ParamDirection, RegisterParam};
use crate::core::instructions::arm;
use crate::core::mode::{ArmCoreMode, ArmCoreState};
use crate::core::ArmCore;
use crate::error::ArmError;
use crate::transport::DebugTransport;

/// Byte offset of the checksum routine's final self-loop, where the exit
/// breakpoint is armed.
const CHECKSUM_EXIT_OFFSET: u32 = 68;

/// CRC-32 with the standard polynomial, fed MSB-first with no bit reversal
/// and no final inversion. Matches the venerable on-target routine used by
/// flash verification, not the zlib variant.
fn checksum_body() -> Vec<u32> {
    vec![
        arm::mov(2, 0),            // address out of the way of the accumulator
        0xe3e0_0000,               // mvn r0, #0           acc = 0xffffffff
        arm::mov(3, 1),            // byte count
        arm::mov_immediate(4, 0),  // byte index
        0xe59f_7030,               // ldr r7, [pc, #0x30]  polynomial (last word)
        arm::branch(8, false),     // b ncomp
        // nbyte:
        0xe7d2_1004,               // ldrb r1, [r2, r4]
        0xe020_0c01,               // eor r0, r0, r1, lsl #24
        arm::mov_immediate(5, 8),  // bit count
        // loop:
        0xe310_0102,               // tst r0, #0x80000000
        0xe1a0_0080,               // mov r0, r0, lsl #1
        0x1020_0007,               // eorne r0, r0, r7
        0xe255_5001,               // subs r5, r5, #1
        0x1aff_fffa,               // bne loop
        0xe284_4001,               // add r4, r4, #1
        // ncomp:
        0xe154_0003,               // cmp r4, r3
        0x1aff_fff4,               // bne nbyte
        arm::branch(0x00ff_fffe, false), // b . (exit point)
        0x04c1_1db7,               // polynomial
    ]
}

/// Byte offset of the erase-check routine's final self-loop.
const BLANK_CHECK_EXIT_OFFSET: u32 = 16;

/// AND every byte of the range into the pattern register.
fn blank_check_body() -> Vec<u32> {
    vec![
        arm::ldrb_post_index(3, 0), // ldrb r3, [r0], #1
        0xe002_2003,                // and r2, r2, r3
        0xe251_1001,                // subs r1, r1, #1
        0x1aff_fffb,                // bne 0
        arm::branch(0x00ff_fffe, false), // b . (exit point)
    ]
}

/// Checksum `count` bytes of target memory starting at `address`.
///
/// The routine is placed in `scratch`, which must hold at least the routine
/// itself (80 bytes) and must not overlap the region being summed. Returns
/// the CRC-32 value computed on the target.
pub fn checksum_memory<T: DebugTransport>(
    core: &mut ArmCore<T>,
    scratch: u32,
    address: u32,
    count: u32,
    timeout: Duration,
) -> Result<u32, ArmError> {
    let body = checksum_body();
    core.transport_mut().write_32(scratch, &body)?;
    tracing::debug!(
        "checksumming {count} bytes at {address:#010x} via scratch {scratch:#010x}"
    );

    let mut request = AlgorithmRunRequest {
        entry_point: scratch,
        exit_point: scratch + CHECKSUM_EXIT_OFFSET,
        timeout,
        core_mode: ArmCoreMode::Svc,
        core_state: ArmCoreState::Arm,
        memory_params: vec![],
        register_params: vec![
            // r0 carries the address in and the checksum out.
            RegisterParam {
                num: 0,
                value: address,
                direction: ParamDirection::InOut,
            },
            RegisterParam {
                num: 1,
                value: count,
                direction: ParamDirection::In,
            },
        ],
    };
    core.run_algorithm(&mut request)?;
    Ok(request.register_params[0].value)
}

/// Check whether `count` bytes at `address` all hold `erased_value`.
///
/// The routine is placed in `scratch` (20 bytes minimum), which must not
/// overlap the checked region. Returns `true` when the whole range is blank.
pub fn blank_check_memory<T: DebugTransport>(
    core: &mut ArmCore<T>,
    scratch: u32,
    address: u32,
    count: u32,
    erased_value: u8,
    timeout: Duration,
) -> Result<bool, ArmError> {
    let body = blank_check_body();
    core.transport_mut().write_32(scratch, &body)?;
    tracing::debug!(
        "blank-checking {count} bytes at {address:#010x} against {erased_value:#04x}"
    );

    let mut request = AlgorithmRunRequest {
        entry_point: scratch,
        exit_point: scratch + BLANK_CHECK_EXIT_OFFSET,
        timeout,
        core_mode: ArmCoreMode::Svc,
        core_state: ArmCoreState::Arm,
        memory_params: vec![],
        register_params: vec![
            RegisterParam {
                num: 0,
                value: address,
                direction: ParamDirection::In,
            },
            RegisterParam {
                num: 1,
                value: count,
                direction: ParamDirection::In,
            },
            // r2 starts as the erased pattern and accumulates the AND of
            // every byte in the range.
            RegisterParam {
                num: 2,
                value: u32::from(erased_value),
                direction: ParamDirection::InOut,
            },
        ],
    };
    core.run_algorithm(&mut request)?;
    Ok(request.register_params[2].value == u32::from(erased_value))
}
