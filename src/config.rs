use crate::constants::*;
use crate::error::{SimError, SimResult};
use crate::memory::ReservedRegion;

/// A RAM frame permanently owned by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedFrame {
    pub frame: usize,
    pub region: ReservedRegion,
}

/// Machine geometry. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub process_count: usize,
    pub pages_per_process: usize,
    pub ram_frames: usize,
    pub swap_blocks: usize,
    pub reserved: Vec<ReservedFrame>,
    /// First frame that may be handed to a user page. Everything below is
    /// protected, reserved or not.
    pub user_ram_start: usize,
    pub page_size: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            process_count: PROCESS_COUNT,
            pages_per_process: PAGES_PER_PROCESS,
            ram_frames: RAM_FRAMES,
            swap_blocks: SWAP_BLOCKS,
            reserved: vec![
                ReservedFrame { frame: FRAME_KERNEL, region: ReservedRegion::Kernel },
                ReservedFrame { frame: FRAME_TABLES, region: ReservedRegion::PageTables },
            ],
            user_ram_start: USER_RAM_START,
            page_size: PAGE_SIZE,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.process_count == 0 {
            return Err(SimError::Config("process count must be at least 1".to_string()));
        }
        if self.pages_per_process == 0 {
            return Err(SimError::Config("pages per process must be at least 1".to_string()));
        }
        if self.swap_blocks == 0 {
            return Err(SimError::Config("swap must have at least one block".to_string()));
        }
        if self.user_ram_start >= self.ram_frames {
            return Err(SimError::Config(format!(
                "user RAM starts at frame {} but RAM only has {} frames",
                self.user_ram_start, self.ram_frames
            )));
        }
        if !self.page_size.is_power_of_two() {
            return Err(SimError::Config(format!(
                "page size {} is not a power of two",
                self.page_size
            )));
        }
        let span = (self.pages_per_process as u64).checked_mul(self.page_size as u64);
        if span.is_none_or(|span| span > u64::from(u32::MAX)) {
            return Err(SimError::Config(format!(
                "{} pages of {} bytes do not fit a 32-bit virtual address",
                self.pages_per_process, self.page_size
            )));
        }

        for (i, reserved) in self.reserved.iter().enumerate() {
            if reserved.frame >= self.user_ram_start {
                return Err(SimError::Config(format!(
                    "reserved frame {} lies in user RAM (starts at {})",
                    reserved.frame, self.user_ram_start
                )));
            }
            if self.reserved[..i].iter().any(|r| r.frame == reserved.frame) {
                return Err(SimError::Config(format!(
                    "frame {} is reserved twice",
                    reserved.frame
                )));
            }
        }

        Ok(())
    }

    /// Number of frames user pages can occupy.
    pub fn user_frames(&self) -> usize {
        self.ram_frames - self.user_ram_start
    }

    /// The system region a frame below `user_ram_start` belongs to.
    pub fn region_of(&self, frame: usize) -> Option<ReservedRegion> {
        if frame >= self.user_ram_start {
            return None;
        }
        let region = self
            .reserved
            .iter()
            .find(|r| r.frame == frame)
            .map(|r| r.region)
            .unwrap_or(ReservedRegion::System);
        Some(region)
    }

    pub fn offset_bits(&self) -> u32 {
        self.page_size.trailing_zeros()
    }
}
