//! The boundary between the core model and the physical debug link.
//!
//! A [`DebugTransport`] is implemented once per concrete core variant (e.g. an
//! ARM7TDMI JTAG driver) and supplied to
//! [`ArmCore::new`](crate::core::ArmCore::new). It is the only way this layer
//! touches hardware: register and memory access, run control and breakpoints
//! all go through it. Register access is addressed by physical cache slot
//! ([`RegisterSlot`]); the driver is responsible for whatever mode switching
//! is needed to reach a banked register.

use std::time::Duration;

use crate::core::registers::RegisterSlot;
use crate::error::TransportError;

/// Handle to a breakpoint installed via [`DebugTransport::set_breakpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHandle(pub u32);

/// Operations the core layer consumes from the debug link.
///
/// All calls are blocking with a transport-level default timeout; only
/// [`poll_halted`](DebugTransport::poll_halted) takes an explicit bound.
/// Implementations surface failures instead of hanging indefinitely.
pub trait DebugTransport {
    /// Read a physical core register.
    fn read_register(&mut self, slot: RegisterSlot) -> Result<u32, TransportError>;

    /// Write a physical core register.
    fn write_register(&mut self, slot: RegisterSlot, value: u32) -> Result<(), TransportError>;

    /// Read a block of bytes from target memory.
    fn read_8(&mut self, address: u32, data: &mut [u8]) -> Result<(), TransportError>;

    /// Write a block of bytes to target memory.
    fn write_8(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError>;

    /// Read a block of 32-bit words from target memory.
    fn read_32(&mut self, address: u32, data: &mut [u32]) -> Result<(), TransportError>;

    /// Write a block of 32-bit words to target memory.
    fn write_32(&mut self, address: u32, data: &[u32]) -> Result<(), TransportError>;

    /// Install a breakpoint at `address`.
    fn set_breakpoint(&mut self, address: u32) -> Result<BreakpointHandle, TransportError>;

    /// Remove a previously installed breakpoint.
    fn remove_breakpoint(&mut self, handle: BreakpointHandle) -> Result<(), TransportError>;

    /// Resume execution.
    fn resume(&mut self) -> Result<(), TransportError>;

    /// Request a halt and wait for it to take effect.
    fn halt(&mut self) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the core to halt. Returns `Ok(true)` once the
    /// core is halted, `Ok(false)` if the timeout elapsed with the core still
    /// running.
    fn poll_halted(&mut self, timeout: Duration) -> Result<bool, TransportError>;

    /// Read a coprocessor register (MRC).
    fn read_coprocessor(
        &mut self,
        cp_num: u8,
        op1: u8,
        op2: u8,
        crn: u8,
        crm: u8,
    ) -> Result<u32, TransportError>;

    /// Write a coprocessor register (MCR).
    fn write_coprocessor(
        &mut self,
        cp_num: u8,
        op1: u8,
        op2: u8,
        crn: u8,
        crm: u8,
        value: u32,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! A scripted transport used by the unit tests.

    use std::collections::HashMap;
    use std::time::Duration;

    use anyhow::anyhow;

    use super::{BreakpointHandle, DebugTransport};
    use crate::core::registers::RegisterSlot;
    use crate::error::TransportError;

    /// What the mock target does when it is resumed.
    #[derive(Debug, Clone)]
    pub(crate) enum RunScript {
        /// Halt at `pc`, applying the given (slot, value) register effects.
        HaltAt { pc: u32, effects: Vec<(u16, u32)> },
        /// Never halt on its own; only `halt()` stops the core.
        Never,
        /// Behave like the injected checksum body: read r0/r1, accumulate the
        /// reference CRC over memory and halt at the armed breakpoint with the
        /// result in r0.
        EmulateChecksum,
        /// Behave like the injected blank-check body: AND every byte of the
        /// range into r2 and halt at the armed breakpoint.
        EmulateBlankCheck,
    }

    #[derive(Debug)]
    pub(crate) struct MockTransport {
        pub regs: [u32; 40],
        pub memory: HashMap<u32, u8>,
        pub breakpoints: Vec<(u32, u32)>,
        pub script: RunScript,
        pub halted: bool,
        pub register_reads: usize,
        pub register_writes: usize,
        pub fail_register_reads: bool,
        pub fail_breakpoint_setup: bool,
        pub fail_register_writes: bool,
        next_breakpoint: u32,
        halt_pending: bool,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            let mut regs = [0u32; 40];
            // Halted in Supervisor mode, ARM state, IRQ/FIQ masked.
            regs[31] = 0xd3;
            Self {
                regs,
                memory: HashMap::new(),
                breakpoints: Vec::new(),
                script: RunScript::HaltAt {
                    pc: 0,
                    effects: Vec::new(),
                },
                halted: true,
                register_reads: 0,
                register_writes: 0,
                fail_register_reads: false,
                fail_breakpoint_setup: false,
                fail_register_writes: false,
                next_breakpoint: 0,
                halt_pending: false,
            }
        }

        pub(crate) fn load_bytes(&mut self, address: u32, data: &[u8]) {
            for (offset, byte) in data.iter().enumerate() {
                self.memory.insert(address + offset as u32, *byte);
            }
        }

        fn byte_at(&self, address: u32) -> u8 {
            *self.memory.get(&address).unwrap_or(&0)
        }

        /// Reference implementation of the injected checksum body.
        pub(crate) fn reference_checksum(data: &[u8]) -> u32 {
            let mut acc: u32 = 0xffff_ffff;
            for byte in data {
                acc ^= u32::from(*byte) << 24;
                for _ in 0..8 {
                    if acc & 0x8000_0000 != 0 {
                        acc = (acc << 1) ^ 0x04c1_1db7;
                    } else {
                        acc <<= 1;
                    }
                }
            }
            acc
        }

        fn run_script(&mut self) {
            match self.script.clone() {
                RunScript::HaltAt { pc, effects } => {
                    for (slot, value) in effects {
                        self.regs[slot as usize] = value;
                    }
                    self.regs[15] = pc;
                    self.halt_pending = true;
                }
                RunScript::Never => {}
                RunScript::EmulateChecksum => {
                    let address = self.regs[0];
                    let count = self.regs[1];
                    let data: Vec<u8> = (0..count).map(|i| self.byte_at(address + i)).collect();
                    self.regs[0] = Self::reference_checksum(&data);
                    self.regs[15] = self.breakpoints.last().map(|(_, a)| *a).unwrap_or(0);
                    self.halt_pending = true;
                }
                RunScript::EmulateBlankCheck => {
                    let address = self.regs[0];
                    let count = self.regs[1];
                    let mut acc = self.regs[2];
                    for i in 0..count {
                        acc &= u32::from(self.byte_at(address + i));
                    }
                    self.regs[1] = 0;
                    self.regs[2] = acc;
                    self.regs[15] = self.breakpoints.last().map(|(_, a)| *a).unwrap_or(0);
                    self.halt_pending = true;
                }
            }
        }
    }

    impl DebugTransport for MockTransport {
        fn read_register(&mut self, slot: RegisterSlot) -> Result<u32, TransportError> {
            if self.fail_register_reads {
                return Err(TransportError::Other(anyhow!("scripted read failure")));
            }
            self.register_reads += 1;
            self.regs
                .get(slot.0 as usize)
                .copied()
                .ok_or_else(|| TransportError::Other(anyhow!("bad register slot {}", slot.0)))
        }

        fn write_register(&mut self, slot: RegisterSlot, value: u32) -> Result<(), TransportError> {
            if self.fail_register_writes {
                return Err(TransportError::Other(anyhow!("scripted write failure")));
            }
            self.register_writes += 1;
            match self.regs.get_mut(slot.0 as usize) {
                Some(reg) => {
                    *reg = value;
                    Ok(())
                }
                None => Err(TransportError::Other(anyhow!(
                    "bad register slot {}",
                    slot.0
                ))),
            }
        }

        fn read_8(&mut self, address: u32, data: &mut [u8]) -> Result<(), TransportError> {
            for (offset, byte) in data.iter_mut().enumerate() {
                *byte = self.byte_at(address + offset as u32);
            }
            Ok(())
        }

        fn write_8(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError> {
            self.load_bytes(address, data);
            Ok(())
        }

        fn read_32(&mut self, address: u32, data: &mut [u32]) -> Result<(), TransportError> {
            for (offset, word) in data.iter_mut().enumerate() {
                let base = address + 4 * offset as u32;
                *word = u32::from_le_bytes([
                    self.byte_at(base),
                    self.byte_at(base + 1),
                    self.byte_at(base + 2),
                    self.byte_at(base + 3),
                ]);
            }
            Ok(())
        }

        fn write_32(&mut self, address: u32, data: &[u32]) -> Result<(), TransportError> {
            for (offset, word) in data.iter().enumerate() {
                self.load_bytes(address + 4 * offset as u32, &word.to_le_bytes());
            }
            Ok(())
        }

        fn set_breakpoint(&mut self, address: u32) -> Result<BreakpointHandle, TransportError> {
            if self.fail_breakpoint_setup {
                return Err(TransportError::Other(anyhow!("scripted breakpoint failure")));
            }
            let handle = self.next_breakpoint;
            self.next_breakpoint += 1;
            self.breakpoints.push((handle, address));
            Ok(BreakpointHandle(handle))
        }

        fn remove_breakpoint(&mut self, handle: BreakpointHandle) -> Result<(), TransportError> {
            let index = self
                .breakpoints
                .iter()
                .position(|(h, _)| *h == handle.0)
                .ok_or_else(|| TransportError::Other(anyhow!("unknown breakpoint {}", handle.0)))?;
            self.breakpoints.remove(index);
            Ok(())
        }

        fn resume(&mut self) -> Result<(), TransportError> {
            self.halted = false;
            self.run_script();
            Ok(())
        }

        fn halt(&mut self) -> Result<(), TransportError> {
            self.halted = true;
            self.halt_pending = false;
            Ok(())
        }

        fn poll_halted(&mut self, timeout: Duration) -> Result<bool, TransportError> {
            if self.halt_pending {
                self.halt_pending = false;
                self.halted = true;
                return Ok(true);
            }
            if self.halted {
                return Ok(true);
            }
            std::thread::sleep(timeout);
            Ok(false)
        }

        fn read_coprocessor(
            &mut self,
            cp_num: u8,
            _op1: u8,
            _op2: u8,
            crn: u8,
            crm: u8,
        ) -> Result<u32, TransportError> {
            // Deterministic value derived from the operand fields.
            Ok(u32::from(cp_num) << 16 | u32::from(crn) << 8 | u32::from(crm))
        }

        fn write_coprocessor(
            &mut self,
            _cp_num: u8,
            _op1: u8,
            _op2: u8,
            _crn: u8,
            _crm: u8,
            _value: u32,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }
}
