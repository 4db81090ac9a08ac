//! Running injected code on the live target.
//!
//! [`ArmCore::run_algorithm`] temporarily repurposes the core to execute a
//! caller-supplied instruction sequence and must always hand back a
//! consistent core, whatever happens mid-run. The protocol is:
//! snapshot the registers the run will touch, install memory and register
//! parameters, arm a one-shot breakpoint at the exit address, resume at the
//! entry address, poll for a halt within the caller's timeout, harvest the
//! output parameters, and finally restore the snapshot and remove the
//! breakpoint. The restore step runs on every exit path.

use std::time::Duration;

use crate::core::mode::{ArmCoreMode, ArmCoreState};
use crate::core::registers::{RegisterView, CPSR_SLOT};
use crate::core::ArmCore;
use crate::error::ArmError;
use crate::transport::{BreakpointHandle, DebugTransport};

/// Which way a parameter travels between host and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    /// Written to the target before the run.
    In,
    /// Read back from the target after a successful run.
    Out,
    /// Both written before and read back after.
    InOut,
}

impl ParamDirection {
    fn is_input(self) -> bool {
        matches!(self, ParamDirection::In | ParamDirection::InOut)
    }

    fn is_output(self) -> bool {
        matches!(self, ParamDirection::Out | ParamDirection::InOut)
    }
}

/// A block of target memory exchanged with the algorithm. The buffer length
/// determines the transfer size in both directions.
#[derive(Debug, Clone)]
pub struct MemoryParam {
    /// Target address of the block.
    pub address: u32,
    /// Host-side buffer.
    pub value: Vec<u8>,
    /// Transfer direction.
    pub direction: ParamDirection,
}

/// A core register exchanged with the algorithm, addressed by logical
/// register number in the run's mode.
#[derive(Debug, Clone, Copy)]
pub struct RegisterParam {
    /// Logical register number (0..=15).
    pub num: u16,
    /// Host-side value.
    pub value: u32,
    /// Transfer direction.
    pub direction: ParamDirection,
}

/// One algorithm execution. Constructed by the caller and consumed
/// synchronously by [`ArmCore::run_algorithm`]; output parameter values are
/// written back in place.
#[derive(Debug, Clone)]
pub struct AlgorithmRunRequest {
    /// Address execution starts at.
    pub entry_point: u32,
    /// Address the run is expected to halt at; armed as a one-shot
    /// breakpoint.
    pub exit_point: u32,
    /// How long the run may take before it is forcibly halted.
    pub timeout: Duration,
    /// Mode the algorithm runs in; [`ArmCoreMode::Any`] keeps the current
    /// mode.
    pub core_mode: ArmCoreMode,
    /// Instruction-set state of the injected code; decides ARM vs Thumb
    /// entry.
    pub core_state: ArmCoreState,
    /// Memory parameters, installed in the order given.
    pub memory_params: Vec<MemoryParam>,
    /// Register parameters, installed in the order given after the memory
    /// parameters. Callers must order dependent registers themselves (e.g.
    /// the stack pointer before values spilled relative to it).
    pub register_params: Vec<RegisterParam>,
}

impl<T: DebugTransport> ArmCore<T> {
    /// Execute an injected instruction sequence on the target.
    ///
    /// On success, `Out`/`InOut` parameters in `request` hold the harvested
    /// results. [`ArmError::TargetFault`] reports a halt away from the exit
    /// point; [`ArmError::ExecutionTimeout`] reports that the run had to be
    /// forcibly halted. On every outcome the exit breakpoint is removed and
    /// the snapshotted registers are restored before this returns.
    pub fn run_algorithm(&mut self, request: &mut AlgorithmRunRequest) -> Result<(), ArmError> {
        let run_mode = if request.core_mode == ArmCoreMode::Any {
            self.core_mode()
        } else {
            request.core_mode
        };

        // Snapshot every register the run will write: the register
        // parameters, plus PC and CPSR which the executor itself touches.
        // Nothing is mutated until the snapshot is complete.
        let mut views: Vec<RegisterView> = Vec::new();
        for param in &request.register_params {
            views.push(self.register(param.num, run_mode)?);
        }
        views.push(self.register(15, run_mode)?);
        views.push(self.cpsr());

        let mut save_list: Vec<(RegisterView, u32)> = Vec::new();
        for view in views {
            if save_list.iter().any(|(saved, _)| saved.slot == view.slot) {
                continue;
            }
            let value = self
                .read_register(view)
                .map_err(|error| ArmError::PrepareFailed(Box::new(error)))?;
            save_list.push((view, value));
        }
        let saved_cpsr = save_list
            .iter()
            .find(|(view, _)| view.slot == CPSR_SLOT)
            .map(|(_, value)| *value)
            .unwrap_or_default();

        tracing::debug!(
            "running algorithm {:#010x}..{:#010x} in {} mode, {} state",
            request.entry_point,
            request.exit_point,
            run_mode,
            request.core_state
        );

        let mut breakpoint = None;
        let outcome = self.algorithm_body(request, run_mode, saved_cpsr, &mut breakpoint);
        let cleanup = self.algorithm_cleanup(breakpoint, &save_list);

        match (outcome, cleanup) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(cleanup_error)) => Err(cleanup_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(cleanup_error)) => {
                // The primary failure wins; the restore failure is already
                // logged entry by entry.
                tracing::error!("state restore after a failed run also failed: {cleanup_error}");
                Err(error)
            }
        }
    }

    fn algorithm_body(
        &mut self,
        request: &mut AlgorithmRunRequest,
        run_mode: ArmCoreMode,
        saved_cpsr: u32,
        breakpoint: &mut Option<BreakpointHandle>,
    ) -> Result<(), ArmError> {
        let t_bit = match request.core_state {
            ArmCoreState::Arm => false,
            ArmCoreState::Thumb => true,
            state => return Err(ArmError::UnsupportedState(state)),
        };

        // Install memory parameters, then register parameters, in the order
        // supplied.
        for param in &request.memory_params {
            if param.direction.is_input() {
                self.transport_mut().write_8(param.address, &param.value)?;
            }
        }
        for param in &request.register_params {
            if param.direction.is_input() {
                let view = self.register(param.num, run_mode)?;
                self.write_register(view, param.value)?;
            }
        }

        // Entry state: the mode field and T bit of the CPSR carry the run
        // mode and instruction-set state; the PC itself stays even.
        let run_cpsr =
            (saved_cpsr & !(0x1f | 1 << 5 | 1 << 24)) | run_mode.psr_bits() | u32::from(t_bit) << 5;
        self.write_register(self.cpsr(), run_cpsr)?;
        let pc = self.register(15, run_mode)?;
        self.write_register(pc, request.entry_point & !1)?;

        // Arm the exit breakpoint before anything reaches hardware, so a
        // failure here only needs the register snapshot rolled back.
        *breakpoint = Some(
            self.transport_mut()
                .set_breakpoint(request.exit_point & !1)
                .map_err(|error| ArmError::BreakpointSetupFailed {
                    address: request.exit_point,
                    source: Box::new(ArmError::Transport(error)),
                })?,
        );

        // Resume.
        self.flush_registers()?;
        self.set_mode(run_mode)?;
        self.set_state(request.core_state);
        self.transport_mut().resume()?;

        // Await completion.
        let halted = self.transport_mut().poll_halted(request.timeout)?;
        if !halted {
            tracing::warn!(
                "algorithm did not halt within {:?}, forcing a halt",
                request.timeout
            );
            self.transport_mut().halt()?;
            self.invalidate_cache();
            return Err(ArmError::ExecutionTimeout {
                timeout: request.timeout,
            });
        }
        self.invalidate_cache();

        let stopped_at = self.read_register(pc)?;
        if stopped_at != request.exit_point & !1 {
            tracing::warn!(
                "target halted at {:#010x}, expected exit at {:#010x}",
                stopped_at,
                request.exit_point
            );
            return Err(ArmError::TargetFault {
                address: stopped_at,
            });
        }

        // Harvest output parameters.
        for param in &mut request.memory_params {
            if param.direction.is_output() {
                self.transport_mut().read_8(param.address, &mut param.value)?;
            }
        }
        for param in &mut request.register_params {
            if param.direction.is_output() {
                let view = self.register(param.num, run_mode)?;
                param.value = self.read_register(view)?;
            }
        }

        Ok(())
    }

    /// Remove the exit breakpoint and put every snapshotted register back.
    /// Every restore is attempted even if one fails; failures are logged and
    /// summarized in the returned error.
    fn algorithm_cleanup(
        &mut self,
        breakpoint: Option<BreakpointHandle>,
        save_list: &[(RegisterView, u32)],
    ) -> Result<(), ArmError> {
        let mut failures: Vec<ArmError> = Vec::new();

        if let Some(handle) = breakpoint {
            if let Err(error) = self.transport_mut().remove_breakpoint(handle) {
                tracing::error!("failed to remove the exit breakpoint: {error}");
                failures.push(ArmError::Transport(error));
            }
        }

        // The CPSR sits at the end of the save list, so banked slots are
        // restored before the mode is.
        for (view, value) in save_list {
            if let Err(error) = self.restore_register(*view, *value) {
                tracing::error!(
                    "failed to restore r{} ({} mode): {error}",
                    view.num(),
                    view.mode()
                );
                failures.push(error);
            }
        }

        // Re-synchronize the cached mode/state with hardware truth.
        if let Err(error) = self.full_context_refresh() {
            tracing::error!("context refresh after algorithm run failed: {error}");
            failures.push(error);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            let count = failures.len();
            Err(ArmError::CleanupFailed {
                failures: count,
                source: Box::new(failures.swap_remove(0)),
            })
        }
    }
}
