//! The physical register cache of a classic ARM core.
//!
//! The cache holds one entry per physical register slot implied by the
//! banking table: the standard 37-register set, extended by three when the
//! core banks registers for Secure Monitor mode. Each entry carries separate
//! `valid` and `dirty` flags; `valid` means the cached value reflects
//! hardware, `dirty` means the value has been written host-side but not yet
//! flushed to the target. The two must stay distinct: a "written but not yet
//! flushed" entry is both valid and dirty.

use crate::core::mode::ArmCoreMode;

/// Slot count of the standard classic ARM register set.
pub const STANDARD_REGISTER_COUNT: usize = 37;

/// Slot count when Secure Monitor banking is present (sp_mon, lr_mon,
/// spsr_mon).
pub const MONITOR_REGISTER_COUNT: usize = 40;

/// Cache slot of the CPSR.
pub(crate) const CPSR_SLOT: usize = 31;

/// Logical register number of the PSR column in the banking table.
pub(crate) const PSR_NUM: u16 = 16;

/// Stable names of the physical register slots, in slot order.
static REGISTER_NAMES: [&str; MONITOR_REGISTER_COUNT] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp_usr",
    "lr_usr", "pc", "r8_fiq", "r9_fiq", "r10_fiq", "r11_fiq", "r12_fiq", "sp_fiq", "lr_fiq",
    "sp_irq", "lr_irq", "sp_svc", "lr_svc", "sp_abt", "lr_abt", "sp_und", "lr_und", "cpsr",
    "spsr_fiq", "spsr_irq", "spsr_svc", "spsr_abt", "spsr_und", "sp_mon", "lr_mon", "spsr_mon",
];

/// Which register set a concrete core implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreVariant {
    /// The standard 37-register set, e.g. ARM7TDMI.
    Standard,
    /// Three more registers are banked for Secure Monitor mode.
    Monitor,
}

impl CoreVariant {
    pub(crate) fn register_count(self) -> usize {
        match self {
            CoreVariant::Standard => STANDARD_REGISTER_COUNT,
            CoreVariant::Monitor => MONITOR_REGISTER_COUNT,
        }
    }
}

/// Physical register address on the debug transport: the cache slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterSlot(pub u16);

/// One cached physical register.
#[derive(Debug)]
pub(crate) struct CachedRegister {
    pub name: &'static str,
    pub value: u32,
    pub valid: bool,
    pub dirty: bool,
}

/// Snapshot of one cache entry, in the shape remote-protocol register-list
/// consumers expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDescriptor {
    /// Stable register name.
    pub name: &'static str,
    /// Register width in bits.
    pub size_in_bits: usize,
    /// The cached value. Meaningful only while the entry is valid.
    pub value: u32,
    /// Whether the entry holds a host-side write not yet flushed.
    pub dirty: bool,
}

/// The register cache of one core. Construction is all-or-nothing; an
/// allocation failure aborts.
#[derive(Debug)]
pub struct RegisterCache {
    entries: Vec<CachedRegister>,
}

/// Build the register cache for a core descriptor: 37 entries, or 40 when the
/// descriptor indicates Secure Monitor banking.
pub fn build_register_cache(variant: CoreVariant) -> RegisterCache {
    let entries = REGISTER_NAMES[..variant.register_count()]
        .iter()
        .map(|name| CachedRegister {
            name,
            value: 0,
            valid: false,
            dirty: false,
        })
        .collect();

    RegisterCache { entries }
}

impl RegisterCache {
    /// Number of physical slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries. Never true for a built cache.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entry(&self, slot: usize) -> &CachedRegister {
        &self.entries[slot]
    }

    pub(crate) fn entry_mut(&mut self, slot: usize) -> &mut CachedRegister {
        &mut self.entries[slot]
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (usize, &mut CachedRegister)> {
        self.entries.iter_mut().enumerate()
    }

    /// Flattened, ordered register list for remote-protocol serialization.
    /// Ordering is stable and matches the banking-table slot layout, so
    /// external tooling can rely on positional indices.
    pub fn descriptors(&self) -> Vec<RegisterDescriptor> {
        self.entries
            .iter()
            .map(|entry| RegisterDescriptor {
                name: entry.name,
                size_in_bits: 32,
                value: entry.value,
                dirty: entry.dirty,
            })
            .collect()
    }
}

/// A lightweight, non-owning reference to one banked register: a logical
/// register number resolved through the banking table for a specific mode.
///
/// Views are plain values; the owning [`ArmCore`](crate::core::ArmCore) must
/// outlive them, and a view must be re-resolved after any mode or state
/// transition rather than cached long-term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterView {
    pub(crate) num: u16,
    pub(crate) mode: ArmCoreMode,
    pub(crate) slot: usize,
}

impl RegisterView {
    /// The logical register number (0..=15, or 16 for the PSR).
    pub fn num(&self) -> u16 {
        self.num
    }

    /// The mode this view was resolved in.
    pub fn mode(&self) -> ArmCoreMode {
        self.mode
    }

    /// The physical slot the view is bound to.
    pub fn slot(&self) -> RegisterSlot {
        RegisterSlot(self.slot as u16)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn standard_cache_has_37_entries() {
        let cache = build_register_cache(CoreVariant::Standard);
        assert_eq!(cache.len(), STANDARD_REGISTER_COUNT);
    }

    #[test]
    fn monitor_cache_has_40_entries() {
        let cache = build_register_cache(CoreVariant::Monitor);
        assert_eq!(cache.len(), MONITOR_REGISTER_COUNT);
        let descriptors = cache.descriptors();
        assert_eq!(descriptors[37].name, "sp_mon");
        assert_eq!(descriptors[38].name, "lr_mon");
        assert_eq!(descriptors[39].name, "spsr_mon");
    }

    #[test]
    fn entries_start_invalid_and_clean() {
        let cache = build_register_cache(CoreVariant::Standard);
        for slot in 0..cache.len() {
            let entry = cache.entry(slot);
            assert!(!entry.valid);
            assert!(!entry.dirty);
        }
    }

    #[test]
    fn descriptor_order_matches_slot_layout() {
        let cache = build_register_cache(CoreVariant::Standard);
        let descriptors = cache.descriptors();
        assert_eq!(descriptors[0].name, "r0");
        assert_eq!(descriptors[13].name, "sp_usr");
        assert_eq!(descriptors[15].name, "pc");
        assert_eq!(descriptors[21].name, "sp_fiq");
        assert_eq!(descriptors[31].name, "cpsr");
        assert_eq!(descriptors[36].name, "spsr_und");
        assert!(descriptors.iter().all(|d| d.size_in_bits == 32));
    }
}
