use std::fmt;

use log::{debug, info};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::fault::{PageFaultHandler, Resolution};
use crate::memory::{MemoryState, PageRef, Pfn, Pid, Vpn};
use crate::translation::{Access, FaultKind, Mmu, SimpleTranslator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Part 1: fixed arithmetic mapping, every access hits.
    SimpleTranslation,
    /// Part 2: page tables, faults and swap.
    DemandPaging,
}

impl Mode {
    pub fn from_part(part: usize) -> Option<Mode> {
        match part {
            1 => Some(Mode::SimpleTranslation),
            2 => Some(Mode::DemandPaging),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::SimpleTranslation => write!(f, "simple translation"),
            Mode::DemandPaging => write!(f, "demand paging"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Engine {
    Simple(SimpleTranslator),
    Demand(MemoryState),
}

/// A fault waiting for the user to pick a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFault {
    pub pid: Pid,
    pub page: Vpn,
    pub kind: FaultKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub accesses: u64,
    pub hits: u64,
    pub faults: u64,
    pub cold_starts: u64,
    pub swap_ins: u64,
    pub swap_outs: u64,
    pub failed_resolutions: u64,
}

impl SessionStats {
    pub fn hit_rate(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            (self.hits as f64 / self.accesses as f64) * 100.0
        }
    }
}

/// A frame the user may pick to resolve a fault, with its current
/// occupant if picking it means a swap-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChoice {
    pub frame: Pfn,
    pub occupant: Option<PageRef>,
}

/// One run of the simulator, from a reset to the next one.
///
/// At most one fault is in flight: while it is pending, further accesses
/// and context switches are refused until it is resolved or cancelled.
#[derive(Debug, Clone)]
pub struct Session {
    mode: Mode,
    engine: Engine,
    active: Pid,
    pending: Option<PendingFault>,
    stats: SessionStats,
}

impl Session {
    pub fn new(mode: Mode, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        info!(
            "session reset: {}, {} processes, {} RAM frames, {} swap blocks",
            mode, config.process_count, config.ram_frames, config.swap_blocks
        );

        let engine = match mode {
            Mode::SimpleTranslation => Engine::Simple(SimpleTranslator::new(config)),
            Mode::DemandPaging => Engine::Demand(MemoryState::new(config)?),
        };

        Ok(Session {
            mode,
            engine,
            active: Pid(1),
            pending: None,
            stats: SessionStats::default(),
        })
    }

    /// Throw the whole session away and start over in `mode` with the
    /// same configuration.
    pub fn reset(&mut self, mode: Mode) -> SimResult<()> {
        *self = Session::new(mode, self.config().clone())?;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &SimConfig {
        match &self.engine {
            Engine::Simple(translator) => translator.config(),
            Engine::Demand(state) => state.config(),
        }
    }

    /// Paging state; `None` in simple-translation mode, which has none.
    pub fn memory(&self) -> Option<&MemoryState> {
        match &self.engine {
            Engine::Simple(_) => None,
            Engine::Demand(state) => Some(state),
        }
    }

    pub fn active_pid(&self) -> Pid {
        self.active
    }

    pub fn pending(&self) -> Option<&PendingFault> {
        self.pending.as_ref()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn ensure_idle(&self) -> SimResult<()> {
        match self.pending {
            Some(fault) => Err(SimError::FaultPending { pid: fault.pid, page: fault.page }),
            None => Ok(()),
        }
    }

    fn check_pid(&self, pid: Pid) -> SimResult<()> {
        if pid.0 == 0 || pid.0 > self.config().process_count {
            return Err(SimError::NotFound { pid });
        }
        Ok(())
    }

    /// Context switch to `pid`.
    pub fn select_process(&mut self, pid: Pid) -> SimResult<()> {
        self.check_pid(pid)?;
        self.ensure_idle()?;
        debug!("context switch {} -> {}", self.active, pid);
        self.active = pid;
        Ok(())
    }

    /// Access `page` of `pid`, which must be the active process. A fault
    /// becomes the pending fault.
    pub fn access(&mut self, pid: Pid, page: Vpn) -> SimResult<Access> {
        self.check_pid(pid)?;
        self.ensure_idle()?;
        if pid != self.active {
            return Err(SimError::ProcessNotActive { pid, active: self.active });
        }

        let access = match &self.engine {
            Engine::Simple(translator) => translator.access(pid, page)?,
            Engine::Demand(state) => Mmu::new(state).access(pid, page)?,
        };

        self.stats.accesses += 1;
        match access {
            Access::Hit { .. } => self.stats.hits += 1,
            Access::Fault(kind) => {
                self.stats.faults += 1;
                self.pending = Some(PendingFault { pid, page, kind });
            }
        }
        Ok(access)
    }

    /// Access a page of the active process.
    pub fn access_variable(&mut self, page: Vpn) -> SimResult<Access> {
        self.access(self.active, page)
    }

    /// Resolve the pending fault into `frame`. On failure the fault stays
    /// pending so another frame can be tried.
    pub fn resolve(&mut self, frame: Pfn) -> SimResult<Resolution> {
        let fault = self.pending.ok_or(SimError::NoPendingFault)?;
        let Engine::Demand(state) = &mut self.engine else {
            return Err(SimError::NoPendingFault);
        };

        match PageFaultHandler::new(state).resolve(fault.pid, fault.page, frame) {
            Ok(resolution) => {
                self.pending = None;
                match resolution.kind {
                    FaultKind::ColdStart => self.stats.cold_starts += 1,
                    FaultKind::SwapIn(_) => self.stats.swap_ins += 1,
                }
                if resolution.evicted.is_some() {
                    self.stats.swap_outs += 1;
                }
                Ok(resolution)
            }
            Err(e) => {
                self.stats.failed_resolutions += 1;
                Err(e)
            }
        }
    }

    /// Drop the pending fault. Nothing was mutated for it, so nothing needs
    /// undoing.
    pub fn cancel(&mut self) -> Option<PendingFault> {
        let fault = self.pending.take();
        if let Some(fault) = fault {
            debug!("fault for {} page {} cancelled", fault.pid, fault.page);
        }
        fault
    }

    /// Frames to offer for the pending fault: the free user frames, or
    /// every user frame as a swap-out victim once RAM is full.
    pub fn frame_choices(&self) -> Vec<FrameChoice> {
        let Some(state) = self.memory() else {
            return Vec::new();
        };

        let free = state.free_user_frames();
        if !free.is_empty() {
            return free
                .into_iter()
                .map(|frame| FrameChoice { frame, occupant: None })
                .collect();
        }

        state
            .ram()
            .iter()
            .skip(state.config().user_ram_start)
            .map(|(i, owner)| FrameChoice { frame: Pfn(i), occupant: owner.page() })
            .collect()
    }
}
