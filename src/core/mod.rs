//! The live, mutable model of one classic ARM core.

pub mod instructions;
pub mod mode;
pub mod registers;

use bitfield::bitfield;

use crate::core::mode::{ArmCoreMode, ArmCoreState, REGISTER_MAP};
use crate::core::registers::{
    build_register_cache, CoreVariant, RegisterCache, RegisterDescriptor, RegisterSlot,
    RegisterView, CPSR_SLOT, PSR_NUM,
};
use crate::error::ArmError;
use crate::transport::DebugTransport;

bitfield! {
    /// The PSR fields this layer decodes.
    struct Psr(u32);
    impl Debug;
    mode, _: 4, 0;
    t, _: 5;
    j, _: 24;
}

/// Opaque handle to a debug power-management collaborator. Owned by the
/// embedding host; this layer only stores it.
pub trait DebugModule: std::fmt::Debug {}

/// Opaque handle to an embedded trace collaborator. Owned by the embedding
/// host; this layer only stores it.
pub trait TraceModule: std::fmt::Debug {}

/// One classic ARM core as seen through a debug transport.
///
/// Owns the register cache and the transport, and records the current
/// processor mode and instruction-set state. Mode and state are mutated only
/// by the explicit transition operations ([`set_mode`](ArmCore::set_mode),
/// [`set_state`](ArmCore::set_state), [`set_cpsr`](ArmCore::set_cpsr)), never
/// inferred elsewhere.
///
/// All operations on one core must be serialized; the debug transport is an
/// exclusive, non-reentrant resource. Independent cores may be driven
/// concurrently, each with its own `ArmCore` and transport.
#[derive(Debug)]
pub struct ArmCore<T: DebugTransport> {
    transport: T,
    cache: RegisterCache,
    variant: CoreVariant,
    core_mode: ArmCoreMode,
    core_state: ArmCoreState,
    debug_module: Option<Box<dyn DebugModule>>,
    trace_module: Option<Box<dyn TraceModule>>,
}

impl<T: DebugTransport> ArmCore<T> {
    /// Construct the core model for one target attach.
    ///
    /// The bookkeeping starts out as Supervisor mode, ARM state; call
    /// [`set_cpsr`](ArmCore::set_cpsr) or
    /// [`full_context_refresh`](ArmCore::full_context_refresh) after the
    /// first halt to synchronize with hardware.
    pub fn new(transport: T, variant: CoreVariant) -> Self {
        Self {
            transport,
            cache: build_register_cache(variant),
            variant,
            core_mode: ArmCoreMode::Svc,
            core_state: ArmCoreState::Arm,
            debug_module: None,
            trace_module: None,
        }
    }

    /// The register set variant of this core.
    pub fn variant(&self) -> CoreVariant {
        self.variant
    }

    /// The current processor mode.
    pub fn core_mode(&self) -> ArmCoreMode {
        self.core_mode
    }

    /// The current instruction-set state.
    pub fn core_state(&self) -> ArmCoreState {
        self.core_state
    }

    /// Direct access to the underlying debug transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Attach a debug power-management collaborator.
    pub fn set_debug_module(&mut self, module: Box<dyn DebugModule>) {
        self.debug_module = Some(module);
    }

    /// The attached debug power-management collaborator, if any.
    pub fn debug_module(&self) -> Option<&dyn DebugModule> {
        self.debug_module.as_deref()
    }

    /// Attach a trace collaborator.
    pub fn set_trace_module(&mut self, module: Box<dyn TraceModule>) {
        self.trace_module = Some(module);
    }

    /// The attached trace collaborator, if any.
    pub fn trace_module(&self) -> Option<&dyn TraceModule> {
        self.trace_module.as_deref()
    }

    fn check_mode_supported(&self, mode: ArmCoreMode) -> Result<(), ArmError> {
        if mode == ArmCoreMode::Mon && self.variant == CoreVariant::Standard {
            return Err(ArmError::InvalidMode(mode.psr_bits()));
        }
        Ok(())
    }

    /// Record a mode transition. Pure bookkeeping; does not touch hardware.
    ///
    /// Fails with [`ArmError::InvalidMode`] for [`ArmCoreMode::Any`] or for
    /// Secure Monitor on a core without monitor banking, leaving the state
    /// unchanged.
    pub fn set_mode(&mut self, mode: ArmCoreMode) -> Result<(), ArmError> {
        if mode == ArmCoreMode::Any {
            return Err(ArmError::InvalidMode(ArmCoreMode::Any as u32));
        }
        self.check_mode_supported(mode)?;
        if self.core_mode != mode {
            tracing::debug!("core mode: {} -> {}", self.core_mode, mode);
            self.core_mode = mode;
        }
        Ok(())
    }

    /// Record an instruction-set state transition. Pure bookkeeping.
    pub fn set_state(&mut self, state: ArmCoreState) {
        if self.core_state != state {
            tracing::debug!("core state: {} -> {}", self.core_state, state);
            self.core_state = state;
        }
    }

    /// Resolve a logical register number through the banking table for an
    /// explicit mode. [`ArmCoreMode::Any`] resolves in the current mode.
    pub fn register(&self, num: u16, mode: ArmCoreMode) -> Result<RegisterView, ArmError> {
        if num > 16 {
            return Err(ArmError::InvalidRegisterNumber(num));
        }
        let mode = if mode == ArmCoreMode::Any {
            self.core_mode
        } else {
            mode
        };
        self.check_mode_supported(mode)?;
        let slot = REGISTER_MAP[mode.to_index()?][num as usize];
        Ok(RegisterView { num, mode, slot })
    }

    /// Resolve a logical register number in the *current* mode. This is the
    /// one place mode banking is applied implicitly.
    pub fn current_register(&self, num: u16) -> Result<RegisterView, ArmError> {
        self.register(num, self.core_mode)
    }

    /// Handle to the CPSR entry; valid in every mode.
    pub fn cpsr(&self) -> RegisterView {
        RegisterView {
            num: PSR_NUM,
            mode: ArmCoreMode::Any,
            slot: CPSR_SLOT,
        }
    }

    /// Handle to the SPSR of the current mode, if the mode has one.
    pub fn spsr(&self) -> Option<RegisterView> {
        match self.core_mode {
            ArmCoreMode::Usr | ArmCoreMode::Sys => None,
            mode => self.register(PSR_NUM, mode).ok(),
        }
    }

    /// Read a banked register, serving from the cache when the entry is
    /// valid and falling back to the transport otherwise.
    pub fn read_register(&mut self, view: RegisterView) -> Result<u32, ArmError> {
        let entry = self.cache.entry(view.slot);
        if entry.valid {
            return Ok(entry.value);
        }
        let value = self.transport.read_register(view.slot())?;
        let entry = self.cache.entry_mut(view.slot);
        entry.value = value;
        entry.valid = true;
        tracing::debug!("read {} = {:#010x}", entry.name, value);
        Ok(value)
    }

    /// Write a banked register host-side. The entry becomes valid and dirty;
    /// nothing reaches hardware until [`flush_registers`](ArmCore::flush_registers).
    pub fn write_register(&mut self, view: RegisterView, value: u32) -> Result<(), ArmError> {
        let entry = self.cache.entry_mut(view.slot);
        entry.value = value;
        entry.valid = true;
        entry.dirty = true;
        tracing::debug!("write {} = {:#010x} (cached)", entry.name, value);
        Ok(())
    }

    /// Push every dirty cache entry to the target. Must be called before the
    /// core is resumed; flushing is never implicit.
    pub fn flush_registers(&mut self) -> Result<(), ArmError> {
        for slot in 0..self.cache.len() {
            let (value, dirty) = {
                let entry = self.cache.entry(slot);
                (entry.value, entry.dirty)
            };
            if !dirty {
                continue;
            }
            self.transport
                .write_register(RegisterSlot(slot as u16), value)?;
            self.cache.entry_mut(slot).dirty = false;
        }
        Ok(())
    }

    /// Re-read every physical register from the target.
    ///
    /// On success every cache entry is valid and the mode/state bookkeeping
    /// is re-synchronized from the CPSR. On failure the cache keeps its
    /// previous valid/invalid state; callers must not assume partial success.
    pub fn full_context_refresh(&mut self) -> Result<(), ArmError> {
        let count = self.cache.len();
        let mut values = Vec::with_capacity(count);
        for slot in 0..count {
            values.push(self.transport.read_register(RegisterSlot(slot as u16))?);
        }
        for (slot, entry) in self.cache.entries_mut() {
            entry.value = values[slot];
            entry.valid = true;
            entry.dirty = false;
        }
        self.set_cpsr(values[CPSR_SLOT])
    }

    /// Apply one raw CPSR value read from hardware: decodes and records the
    /// mode, decodes and records the T/J state bits, and updates the CPSR
    /// cache entry, as a single atomic update. An unrecognized mode field
    /// aborts the whole update with [`ArmError::InvalidMode`].
    pub fn set_cpsr(&mut self, value: u32) -> Result<(), ArmError> {
        let psr = Psr(value);
        let mode = ArmCoreMode::from_psr(psr.mode())?;
        self.check_mode_supported(mode)?;
        let state = ArmCoreState::from_bits(psr.t(), psr.j());

        self.core_mode = mode;
        self.core_state = state;
        let entry = self.cache.entry_mut(CPSR_SLOT);
        entry.value = value;
        entry.valid = true;
        entry.dirty = false;
        tracing::debug!("cpsr {:#010x}: mode {}, state {}", value, mode, state);
        Ok(())
    }

    /// Read a coprocessor register. Coprocessor registers are not part of the
    /// banked cache; this is an uncached pass-through.
    pub fn mrc(&mut self, cp_num: u8, op1: u8, op2: u8, crn: u8, crm: u8) -> Result<u32, ArmError> {
        Ok(self.transport.read_coprocessor(cp_num, op1, op2, crn, crm)?)
    }

    /// Write a coprocessor register. Uncached pass-through.
    pub fn mcr(
        &mut self,
        cp_num: u8,
        op1: u8,
        op2: u8,
        crn: u8,
        crm: u8,
        value: u32,
    ) -> Result<(), ArmError> {
        Ok(self
            .transport
            .write_coprocessor(cp_num, op1, op2, crn, crm, value)?)
    }

    /// Ordered register descriptors for remote-protocol consumers.
    pub fn register_list(&self) -> Vec<RegisterDescriptor> {
        self.cache.descriptors()
    }

    /// Write a snapshotted value straight to the target and settle the cache
    /// entry to match. Used when rolling back after an algorithm run.
    pub(crate) fn restore_register(
        &mut self,
        view: RegisterView,
        value: u32,
    ) -> Result<(), ArmError> {
        self.transport.write_register(view.slot(), value)?;
        let entry = self.cache.entry_mut(view.slot);
        entry.value = value;
        entry.valid = true;
        entry.dirty = false;
        Ok(())
    }

    /// Drop all cached register values, e.g. after the target halted with
    /// unknown effects. Unflushed host-side writes are discarded.
    pub(crate) fn invalidate_cache(&mut self) {
        for (_, entry) in self.cache.entries_mut() {
            entry.valid = false;
            entry.dirty = false;
        }
    }

    #[cfg(test)]
    pub(crate) fn cache_valid_flags(&self) -> Vec<bool> {
        (0..self.cache.len())
            .map(|slot| self.cache.entry(slot).valid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::transport::mock::MockTransport;

    fn core(variant: CoreVariant) -> ArmCore<MockTransport> {
        ArmCore::new(MockTransport::new(), variant)
    }

    #[test]
    fn current_register_applies_banking() {
        let mut core = core(CoreVariant::Standard);
        core.set_mode(ArmCoreMode::Svc).unwrap();
        assert_eq!(core.current_register(13).unwrap().slot().0, 25);
        core.set_mode(ArmCoreMode::Fiq).unwrap();
        assert_eq!(core.current_register(13).unwrap().slot().0, 21);
        assert_eq!(core.current_register(8).unwrap().slot().0, 16);
        // Unbanked registers resolve to the shared slot in every mode.
        assert_eq!(core.current_register(0).unwrap().slot().0, 0);
        assert_eq!(core.current_register(15).unwrap().slot().0, 15);
    }

    #[test]
    fn register_numbers_above_16_are_rejected() {
        let core = core(CoreVariant::Standard);
        assert!(matches!(
            core.register(17, ArmCoreMode::Any),
            Err(ArmError::InvalidRegisterNumber(17))
        ));
    }

    #[test]
    fn monitor_mode_needs_monitor_banking() {
        let mut standard = core(CoreVariant::Standard);
        assert!(matches!(
            standard.set_mode(ArmCoreMode::Mon),
            Err(ArmError::InvalidMode(_))
        ));
        assert_eq!(standard.core_mode(), ArmCoreMode::Svc);

        let mut monitor = core(CoreVariant::Monitor);
        monitor.set_mode(ArmCoreMode::Mon).unwrap();
        assert_eq!(monitor.current_register(13).unwrap().slot().0, 37);
        assert_eq!(monitor.spsr().unwrap().slot().0, 39);
    }

    #[test]
    fn set_mode_rejects_the_any_sentinel() {
        let mut core = core(CoreVariant::Standard);
        assert!(matches!(
            core.set_mode(ArmCoreMode::Any),
            Err(ArmError::InvalidMode(_))
        ));
    }

    #[test_case(0x10, ArmCoreMode::Usr, ArmCoreState::Arm; "usr arm")]
    #[test_case(0x31, ArmCoreMode::Fiq, ArmCoreState::Thumb; "fiq thumb")]
    #[test_case(0x0100_0013, ArmCoreMode::Svc, ArmCoreState::Jazelle; "svc jazelle")]
    #[test_case(0x0100_003f, ArmCoreMode::Sys, ArmCoreState::ThumbEe; "sys thumbee")]
    fn set_cpsr_decodes_mode_and_state(value: u32, mode: ArmCoreMode, state: ArmCoreState) {
        let mut core = core(CoreVariant::Standard);
        core.set_cpsr(value).unwrap();
        assert_eq!(core.core_mode(), mode);
        assert_eq!(core.core_state(), state);
        assert_eq!(core.read_register(core.cpsr()).unwrap(), value);
    }

    #[test]
    fn set_cpsr_with_bad_mode_is_a_no_op() {
        let mut core = core(CoreVariant::Standard);
        core.set_cpsr(0xd1).unwrap();
        assert!(matches!(core.set_cpsr(0x15), Err(ArmError::InvalidMode(_))));
        assert_eq!(core.core_mode(), ArmCoreMode::Fiq);
        assert_eq!(core.read_register(core.cpsr()).unwrap(), 0xd1);
    }

    #[test]
    fn register_reads_are_lazy() {
        let mut core = core(CoreVariant::Standard);
        core.transport_mut().regs[2] = 0x1234_5678;
        let view = core.register(2, ArmCoreMode::Any).unwrap();

        assert_eq!(core.read_register(view).unwrap(), 0x1234_5678);
        assert_eq!(core.read_register(view).unwrap(), 0x1234_5678);
        assert_eq!(core.transport_mut().register_reads, 1);
    }

    #[test]
    fn writes_stay_cached_until_flushed() {
        let mut core = core(CoreVariant::Standard);
        let view = core.register(4, ArmCoreMode::Any).unwrap();

        core.write_register(view, 0xdead_beef).unwrap();
        assert_eq!(core.transport_mut().regs[4], 0);
        assert!(core.register_list()[4].dirty);

        core.flush_registers().unwrap();
        assert_eq!(core.transport_mut().regs[4], 0xdead_beef);
        assert!(!core.register_list()[4].dirty);
    }

    #[test]
    fn full_context_refresh_is_idempotent() {
        let mut core = core(CoreVariant::Standard);
        core.transport_mut().regs[7] = 0xaaaa_5555;

        core.full_context_refresh().unwrap();
        let first = core.register_list();
        core.full_context_refresh().unwrap();
        assert_eq!(core.register_list(), first);
        assert!(core.cache_valid_flags().iter().all(|valid| *valid));
    }

    #[test]
    fn failed_refresh_leaves_the_cache_untouched() {
        let mut core = core(CoreVariant::Standard);
        core.transport_mut().regs[3] = 77;
        core.full_context_refresh().unwrap();

        core.transport_mut().regs[3] = 88;
        core.transport_mut().fail_register_reads = true;
        assert!(core.full_context_refresh().is_err());

        let view = core.register(3, ArmCoreMode::Any).unwrap();
        assert_eq!(core.read_register(view).unwrap(), 77);
        assert!(core.cache_valid_flags().iter().all(|valid| *valid));
    }

    #[test]
    fn spsr_handles_follow_the_mode() {
        let mut core = core(CoreVariant::Standard);
        core.set_mode(ArmCoreMode::Usr).unwrap();
        assert!(core.spsr().is_none());
        core.set_mode(ArmCoreMode::Irq).unwrap();
        assert_eq!(core.spsr().unwrap().slot().0, 33);
    }

    #[test]
    fn coprocessor_access_is_a_pass_through() {
        let mut core = core(CoreVariant::Standard);
        let value = core.mrc(15, 0, 0, 1, 0).unwrap();
        assert_eq!(value, 15 << 16 | 1 << 8);
        core.mcr(15, 0, 0, 1, 0, 0x5555).unwrap();
    }
}
