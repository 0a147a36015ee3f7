pub mod config;
pub mod constants;
pub mod error;
pub mod fault;
pub mod io;
pub mod logger;
pub mod memory;
pub mod session;
pub mod translation;

// Re-export commonly used items for convenience
pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use fault::{PageFaultHandler, Resolution};
pub use memory::{MemoryState, PageRef, Pfn, Pid, SwapSlot, Vpn};
pub use session::{Mode, Session};
pub use translation::{Access, FaultKind, Mmu};
