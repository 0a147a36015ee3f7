use thiserror::Error;

use crate::memory::{PageRef, Pfn, Pid, ReservedRegion, Vpn};

/// Errors returned by the simulator.
///
/// Every failure is local to the call that produced it: no variant is
/// returned after a partial mutation, so the session stays usable and a
/// failed resolution can simply be retried with another frame.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("process {pid} does not exist")]
    NotFound { pid: Pid },

    #[error("page {page} is outside the address space of {pid} ({pages} pages)")]
    InvalidAddress { pid: Pid, page: Vpn, pages: usize },

    #[error("frame {frame} is protected ({region})")]
    ProtectionViolation { frame: Pfn, region: ReservedRegion },

    #[error("frame {frame} does not exist (RAM has {frames} frames)")]
    InvalidFrame { frame: Pfn, frames: usize },

    #[error("swap space is full, cannot evict {victim}")]
    SwapExhausted { victim: PageRef },

    #[error("{pid} page {page} is already resident in frame {frame}")]
    AlreadyResident { pid: Pid, page: Vpn, frame: Pfn },

    #[error("{pid} is not on the CPU (active process is {active})")]
    ProcessNotActive { pid: Pid, active: Pid },

    #[error("page fault for {pid} page {page} must be resolved or cancelled first")]
    FaultPending { pid: Pid, page: Vpn },

    #[error("no page fault is pending")]
    NoPendingFault,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("memory state is inconsistent: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
