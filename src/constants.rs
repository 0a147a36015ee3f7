// Default machine: 4 processes x 4 pages = 16 pages competing for 14 user
// frames, so demand paging has to swap.
pub const PROCESS_COUNT: usize = 4;
pub const PAGES_PER_PROCESS: usize = 4;

pub const RAM_FRAMES: usize = 16;
pub const SWAP_BLOCKS: usize = 32;

pub const FRAME_KERNEL: usize = 0;
pub const FRAME_TABLES: usize = 1;
pub const USER_RAM_START: usize = 2;

pub const OFFSET_BITS: u32 = 10;
pub const PAGE_SIZE: usize = 1 << OFFSET_BITS;

/// Offsets of the demo variables, one per page, cycled when a process
/// has more pages than entries here.
pub const VARIABLE_OFFSETS: [u32; 4] = [100, 200, 50, 300];
