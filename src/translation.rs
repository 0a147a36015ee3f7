use std::fmt;

use log::debug;

use crate::config::SimConfig;
use crate::constants::VARIABLE_OFFSETS;
use crate::error::{SimError, SimResult};
use crate::memory::{MemoryState, PageTableEntry, Pfn, Pid, SwapSlot, Vpn};

/// A logical address split into page number and offset within the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub raw: u32,
    pub page: Vpn,
    pub offset: u32,
}

impl VirtualAddress {
    /// Decompose a raw address for pages of `1 << offset_bits` bytes.
    pub fn from_raw(raw: u32, offset_bits: u32) -> Self {
        let mask = (1u32 << offset_bits) - 1;
        VirtualAddress {
            raw,
            page: Vpn((raw >> offset_bits) as usize),
            offset: raw & mask,
        }
    }

    pub fn new(page: Vpn, offset: u32, offset_bits: u32) -> Self {
        let mask = (1u32 << offset_bits) - 1;
        let offset = offset & mask;
        VirtualAddress {
            raw: ((page.0 as u32) << offset_bits) | offset,
            page,
            offset,
        }
    }

    /// Address of the demo variable living on `page`.
    pub fn for_variable(page: Vpn, config: &SimConfig) -> Self {
        let offset = VARIABLE_OFFSETS[page.0 % VARIABLE_OFFSETS.len()];
        Self::new(page, offset, config.offset_bits())
    }

    /// Physical address once the page sits in `frame`.
    #[inline]
    pub fn physical(&self, frame: Pfn, page_size: usize) -> usize {
        frame.0 * page_size + self.offset as usize
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VA {:#06X} (page={}, offset={})",
            self.raw, self.page, self.offset
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The page was never allocated; it gets a zero-filled frame.
    ColdStart,
    /// The page exists but was evicted to the given swap block.
    SwapIn(SwapSlot),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::ColdStart => write!(f, "COLD_START"),
            FaultKind::SwapIn(slot) => write!(f, "SWAP_IN from block {}", slot),
        }
    }
}

/// Outcome of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Hit {
        frame: Pfn,
        address: VirtualAddress,
        physical: usize,
    },
    Fault(FaultKind),
}

impl Access {
    pub fn is_hit(&self) -> bool {
        matches!(self, Access::Hit { .. })
    }

    pub fn frame(&self) -> Option<Pfn> {
        match self {
            Access::Hit { frame, .. } => Some(*frame),
            Access::Fault(_) => None,
        }
    }
}

/// Demand-paging MMU. Borrows the memory state immutably, so it can only
/// decide, never change anything.
pub struct Mmu<'a> {
    state: &'a MemoryState,
}

impl<'a> Mmu<'a> {
    pub fn new(state: &'a MemoryState) -> Self {
        Mmu { state }
    }

    pub fn access(&self, pid: Pid, page: Vpn) -> SimResult<Access> {
        let entry = self.state.entry(pid, page)?;
        let config = self.state.config();

        let access = match entry {
            PageTableEntry::Resident(frame) => {
                let address = VirtualAddress::for_variable(page, config);
                Access::Hit {
                    frame,
                    address,
                    physical: address.physical(frame, config.page_size),
                }
            }
            PageTableEntry::Invalid => Access::Fault(FaultKind::ColdStart),
            PageTableEntry::Swapped(slot) => Access::Fault(FaultKind::SwapIn(slot)),
        };

        debug!("access {} page {}: {:?}", pid, page, access);
        Ok(access)
    }
}

/// Fixed arithmetic mapping with no page tables behind it: every valid
/// address hits, on frame `(pid * 2 + page) % ram_frames`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTranslator {
    config: SimConfig,
}

impl SimpleTranslator {
    pub fn new(config: SimConfig) -> Self {
        SimpleTranslator { config }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn access(&self, pid: Pid, page: Vpn) -> SimResult<Access> {
        if pid.0 == 0 || pid.0 > self.config.process_count {
            return Err(SimError::NotFound { pid });
        }
        if page.0 >= self.config.pages_per_process {
            return Err(SimError::InvalidAddress {
                pid,
                page,
                pages: self.config.pages_per_process,
            });
        }

        let frame = Pfn((pid.0 * 2 + page.0) % self.config.ram_frames);
        let address = VirtualAddress::for_variable(page, &self.config);
        debug!("simple translation {} page {} -> frame {}", pid, page, frame);

        Ok(Access::Hit {
            frame,
            address,
            physical: address.physical(frame, self.config.page_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Owner, PageRef};

    #[test]
    fn test_va_decomposition() {
        // Page 1, offset 200 with 1 KiB pages
        let va = VirtualAddress::from_raw(1224, 10);
        assert_eq!(va.page, Vpn(1));
        assert_eq!(va.offset, 200);

        let va = VirtualAddress::from_raw(3372, 10);
        assert_eq!(va.page, Vpn(3));
        assert_eq!(va.offset, 300);
    }

    #[test]
    fn test_va_reconstruction() {
        for &raw in &[0, 100, 1224, 2098, 3372, 4095] {
            let va = VirtualAddress::from_raw(raw, 10);
            assert_eq!(VirtualAddress::new(va.page, va.offset, 10), va);
        }
    }

    #[test]
    fn test_variable_addresses() {
        let config = SimConfig::default();
        let raws: Vec<u32> = (0..4)
            .map(|p| VirtualAddress::for_variable(Vpn(p), &config).raw)
            .collect();
        assert_eq!(raws, vec![100, 1224, 2098, 3372]);
    }

    #[test]
    fn test_variable_offset_fits_small_pages() {
        let config = SimConfig { page_size: 64, ..SimConfig::default() };
        let va = VirtualAddress::for_variable(Vpn(0), &config);
        assert!(va.offset < 64);
    }

    #[test]
    fn test_physical_address() {
        let va = VirtualAddress::new(Vpn(1), 200, 10);
        assert_eq!(va.physical(Pfn(8), 1024), 8 * 1024 + 200);
    }

    #[test]
    fn test_display() {
        let va = VirtualAddress::from_raw(1224, 10);
        let display = format!("{}", va);
        assert!(display.contains("page=1"));
        assert!(display.contains("offset=200"));
    }

    #[test]
    fn test_mmu_cold_start() {
        let state = MemoryState::new(SimConfig::default()).unwrap();
        let access = Mmu::new(&state).access(Pid(1), Vpn(0)).unwrap();
        assert_eq!(access, Access::Fault(FaultKind::ColdStart));
    }

    #[test]
    fn test_mmu_hit_and_swap_in() {
        let mut state = MemoryState::new(SimConfig::default()).unwrap();
        let resident = PageRef::new(Pid(2), Vpn(1));
        state.set_ram(Pfn(9), Owner::Page(resident));
        state.set_entry(resident, PageTableEntry::Resident(Pfn(9)));
        let swapped = PageRef::new(Pid(2), Vpn(2));
        state.set_swap(SwapSlot(4), Owner::Page(swapped));
        state.set_entry(swapped, PageTableEntry::Swapped(SwapSlot(4)));

        let mmu = Mmu::new(&state);
        let hit = mmu.access(Pid(2), Vpn(1)).unwrap();
        assert_eq!(hit.frame(), Some(Pfn(9)));
        assert!(matches!(hit, Access::Hit { physical, .. } if physical == 9 * 1024 + 200));

        let fault = mmu.access(Pid(2), Vpn(2)).unwrap();
        assert_eq!(fault, Access::Fault(FaultKind::SwapIn(SwapSlot(4))));
    }

    #[test]
    fn test_mmu_hit_is_idempotent() {
        let mut state = MemoryState::new(SimConfig::default()).unwrap();
        let page = PageRef::new(Pid(1), Vpn(3));
        state.set_ram(Pfn(5), Owner::Page(page));
        state.set_entry(page, PageTableEntry::Resident(Pfn(5)));
        let before = state.clone();

        for _ in 0..5 {
            let access = Mmu::new(&state).access(Pid(1), Vpn(3)).unwrap();
            assert_eq!(access.frame(), Some(Pfn(5)));
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_mmu_rejects_bad_addresses() {
        let state = MemoryState::new(SimConfig::default()).unwrap();
        let mmu = Mmu::new(&state);
        assert!(matches!(mmu.access(Pid(9), Vpn(0)), Err(SimError::NotFound { .. })));
        assert!(matches!(
            mmu.access(Pid(1), Vpn(4)),
            Err(SimError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_simple_translation() {
        let translator = SimpleTranslator::new(SimConfig::default());

        let access = translator.access(Pid(1), Vpn(0)).unwrap();
        assert_eq!(access.frame(), Some(Pfn(2)));

        let access = translator.access(Pid(4), Vpn(3)).unwrap();
        assert_eq!(access.frame(), Some(Pfn(11)));

        // Wraps around RAM
        let config = SimConfig { process_count: 8, ..SimConfig::default() };
        let translator = SimpleTranslator::new(config);
        assert_eq!(translator.access(Pid(8), Vpn(1)).unwrap().frame(), Some(Pfn(1)));
    }

    #[test]
    fn test_simple_translation_rejects_out_of_range_page() {
        let translator = SimpleTranslator::new(SimConfig::default());
        assert!(matches!(
            translator.access(Pid(1), Vpn(4)),
            Err(SimError::InvalidAddress { .. })
        ));
        assert!(matches!(
            translator.access(Pid(0), Vpn(0)),
            Err(SimError::NotFound { .. })
        ));
    }
}
