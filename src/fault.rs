use log::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::memory::{MemoryState, Owner, PageRef, PageTableEntry, Pfn, Pid, SwapSlot, Vpn};
use crate::translation::FaultKind;

/// A resident page pushed out to swap to make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub victim: PageRef,
    pub slot: SwapSlot,
}

/// What a successful resolution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub page: PageRef,
    pub frame: Pfn,
    /// `SwapIn` carries the block the page came from, now free again.
    pub kind: FaultKind,
    pub evicted: Option<Eviction>,
}

/// The only writer of `MemoryState`.
///
/// Resolution is split in two: `plan` checks every precondition and picks
/// the swap block without touching anything, `apply` performs the writes
/// and cannot fail. A rejected request therefore leaves the state exactly
/// as it was.
pub struct PageFaultHandler<'a> {
    state: &'a mut MemoryState,
}

impl<'a> PageFaultHandler<'a> {
    pub fn new(state: &'a mut MemoryState) -> Self {
        PageFaultHandler { state }
    }

    /// Bring `(pid, page)` into `target`, evicting whatever user page
    /// lives there.
    pub fn resolve(&mut self, pid: Pid, page: Vpn, target: Pfn) -> SimResult<Resolution> {
        let resolution = match self.plan(pid, page, target) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("cannot resolve fault for {} page {} into frame {}: {}", pid, page, target, e);
                return Err(e);
            }
        };
        self.apply(&resolution);
        info!("{} mapped into frame {}", resolution.page, resolution.frame);
        Ok(resolution)
    }

    fn plan(&self, pid: Pid, page: Vpn, target: Pfn) -> SimResult<Resolution> {
        let kind = match self.state.entry(pid, page)? {
            PageTableEntry::Invalid => FaultKind::ColdStart,
            PageTableEntry::Swapped(slot) => FaultKind::SwapIn(slot),
            PageTableEntry::Resident(frame) => {
                return Err(SimError::AlreadyResident { pid, page, frame });
            }
        };

        let config = self.state.config();
        if target.0 >= config.ram_frames {
            return Err(SimError::InvalidFrame { frame: target, frames: config.ram_frames });
        }
        if let Some(region) = config.region_of(target.0) {
            return Err(SimError::ProtectionViolation { frame: target, region });
        }

        let evicted = match self.state.ram_owner(target) {
            Some(Owner::Page(victim)) => {
                let slot = self
                    .state
                    .find_free_swap_slot()
                    .ok_or(SimError::SwapExhausted { victim })?;
                Some(Eviction { victim, slot })
            }
            Some(Owner::Reserved(region)) => {
                return Err(SimError::ProtectionViolation { frame: target, region });
            }
            Some(Owner::Free) | None => None,
        };

        Ok(Resolution {
            page: PageRef::new(pid, page),
            frame: target,
            kind,
            evicted,
        })
    }

    fn apply(&mut self, resolution: &Resolution) {
        if let Some(Eviction { victim, slot }) = resolution.evicted {
            debug!("swap-out {} from frame {} to block {}", victim, resolution.frame, slot);
            self.state.set_entry(victim, PageTableEntry::Swapped(slot));
            self.state.set_swap(slot, Owner::Page(victim));
        }

        match resolution.kind {
            FaultKind::SwapIn(slot) => {
                debug!("swap-in {} from block {}", resolution.page, slot);
                self.state.set_swap(slot, Owner::Free);
            }
            FaultKind::ColdStart => {
                debug!("zero-fill frame {} for {}", resolution.frame, resolution.page);
            }
        }

        self.state.set_ram(resolution.frame, Owner::Page(resolution.page));
        self.state
            .set_entry(resolution.page, PageTableEntry::Resident(resolution.frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::memory::{PageState, ReservedRegion};
    use crate::translation::{Access, Mmu};

    fn state() -> MemoryState {
        MemoryState::new(SimConfig::default()).unwrap()
    }

    /// Maps 14 distinct pages onto frames 2..16: P1..P4 pages 0..3, minus
    /// P4 pages 2 and 3.
    fn fill_ram(state: &mut MemoryState) {
        let mut frame = 2;
        for pid in 1..=4 {
            for page in 0..4 {
                if frame == 16 {
                    return;
                }
                PageFaultHandler::new(state)
                    .resolve(Pid(pid), Vpn(page), Pfn(frame))
                    .unwrap();
                frame += 1;
            }
        }
    }

    #[test]
    fn test_cold_start_resolution() {
        let mut state = state();
        let resolution = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(2))
            .unwrap();

        assert_eq!(resolution.frame, Pfn(2));
        assert_eq!(resolution.kind, FaultKind::ColdStart);
        assert_eq!(resolution.evicted, None);
        assert_eq!(
            state.ram_owner(Pfn(2)),
            Some(Owner::Page(PageRef::new(Pid(1), Vpn(0))))
        );
        assert_eq!(state.entry(Pid(1), Vpn(0)).unwrap(), PageTableEntry::Resident(Pfn(2)));
        assert!(state.check_consistency().is_ok());
    }

    #[test]
    fn test_protection_violation_on_reserved_frames() {
        let mut state = state();
        let before = state.clone();

        let err = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(0))
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::ProtectionViolation { region: ReservedRegion::Kernel, .. }
        ));

        let err = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(1))
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::ProtectionViolation { region: ReservedRegion::PageTables, .. }
        ));

        assert_eq!(state, before);
    }

    #[test]
    fn test_protection_violation_on_unlabeled_low_frame() {
        let config = SimConfig { user_ram_start: 3, ..SimConfig::default() };
        let mut state = MemoryState::new(config).unwrap();
        let err = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(2))
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::ProtectionViolation { region: ReservedRegion::System, .. }
        ));
    }

    #[test]
    fn test_invalid_frame_index() {
        let mut state = state();
        let before = state.clone();
        let err = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(16))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidFrame { frames: 16, .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_rejects_resident_page() {
        let mut state = state();
        PageFaultHandler::new(&mut state).resolve(Pid(1), Vpn(0), Pfn(2)).unwrap();
        let before = state.clone();

        let err = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(3))
            .unwrap_err();
        assert!(matches!(err, SimError::AlreadyResident { frame: Pfn(2), .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_rejects_unknown_process_and_page() {
        let mut state = state();
        assert!(matches!(
            PageFaultHandler::new(&mut state).resolve(Pid(5), Vpn(0), Pfn(2)),
            Err(SimError::NotFound { .. })
        ));
        assert!(matches!(
            PageFaultHandler::new(&mut state).resolve(Pid(1), Vpn(7), Pfn(2)),
            Err(SimError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_swap_out_swap_in_round_trip() {
        let mut state = state();
        fill_ram(&mut state);
        assert!(state.free_user_frames().is_empty());

        // P4 page 2 faults; evict P2 page 1 from frame 7
        let victim = PageRef::new(Pid(2), Vpn(1));
        assert_eq!(state.ram_owner(Pfn(7)), Some(Owner::Page(victim)));

        let resolution = PageFaultHandler::new(&mut state)
            .resolve(Pid(4), Vpn(2), Pfn(7))
            .unwrap();
        let slot = SwapSlot(0);
        assert_eq!(resolution.evicted, Some(Eviction { victim, slot }));
        assert_eq!(state.entry(Pid(2), Vpn(1)).unwrap(), PageTableEntry::Swapped(slot));
        assert_eq!(state.swap_owner(slot), Some(Owner::Page(victim)));
        assert_eq!(state.entry(Pid(4), Vpn(2)).unwrap(), PageTableEntry::Resident(Pfn(7)));
        assert!(state.check_consistency().is_ok());

        let access = Mmu::new(&state).access(Pid(2), Vpn(1)).unwrap();
        assert_eq!(access, Access::Fault(FaultKind::SwapIn(slot)));

        // Bring it back over P1 page 0; that page goes to block 1, block 0 frees
        let resolution = PageFaultHandler::new(&mut state)
            .resolve(Pid(2), Vpn(1), Pfn(2))
            .unwrap();
        assert_eq!(resolution.kind, FaultKind::SwapIn(slot));
        assert_eq!(
            resolution.evicted,
            Some(Eviction { victim: PageRef::new(Pid(1), Vpn(0)), slot: SwapSlot(1) })
        );
        assert_eq!(state.swap_owner(slot), Some(Owner::Free));
        assert_eq!(state.entry(Pid(2), Vpn(1)).unwrap(), PageTableEntry::Resident(Pfn(2)));
        assert!(state.check_consistency().is_ok());
    }

    #[test]
    fn test_swap_in_into_free_frame_frees_block() {
        let mut state = state();
        PageFaultHandler::new(&mut state).resolve(Pid(1), Vpn(0), Pfn(2)).unwrap();
        PageFaultHandler::new(&mut state).resolve(Pid(2), Vpn(0), Pfn(2)).unwrap();
        assert_eq!(state.entry(Pid(1), Vpn(0)).unwrap().state(), PageState::Swapped);

        let resolution = PageFaultHandler::new(&mut state)
            .resolve(Pid(1), Vpn(0), Pfn(9))
            .unwrap();
        assert_eq!(resolution.evicted, None);
        assert_eq!(state.swap().free_count(), 32);
        assert!(state.check_consistency().is_ok());
    }

    #[test]
    fn test_victim_from_same_process() {
        let mut state = state();
        PageFaultHandler::new(&mut state).resolve(Pid(3), Vpn(0), Pfn(4)).unwrap();
        let resolution = PageFaultHandler::new(&mut state)
            .resolve(Pid(3), Vpn(1), Pfn(4))
            .unwrap();

        assert_eq!(resolution.evicted.map(|e| e.victim), Some(PageRef::new(Pid(3), Vpn(0))));
        assert_eq!(state.entry(Pid(3), Vpn(0)).unwrap().state(), PageState::Swapped);
        assert_eq!(state.entry(Pid(3), Vpn(1)).unwrap(), PageTableEntry::Resident(Pfn(4)));
        assert!(state.check_consistency().is_ok());
    }

    #[test]
    fn test_swap_exhausted_leaves_state_untouched() {
        let config = SimConfig { swap_blocks: 2, ..SimConfig::default() };
        let mut state = MemoryState::new(config).unwrap();
        fill_ram(&mut state);

        // Use up both swap blocks
        PageFaultHandler::new(&mut state).resolve(Pid(4), Vpn(2), Pfn(2)).unwrap();
        PageFaultHandler::new(&mut state).resolve(Pid(4), Vpn(3), Pfn(3)).unwrap();
        assert_eq!(state.find_free_swap_slot(), None);

        let before = state.clone();
        // P1 page 0 is swapped out and wants back in; every target is occupied
        for frame in 2..16 {
            let err = PageFaultHandler::new(&mut state)
                .resolve(Pid(1), Vpn(0), Pfn(frame))
                .unwrap_err();
            assert!(matches!(err, SimError::SwapExhausted { .. }));
            assert_eq!(state, before);
        }
        assert!(state.check_consistency().is_ok());
    }

    #[test]
    fn test_state_machine_never_skips_states() {
        let mut state = state();
        let page = (Pid(1), Vpn(2));
        assert_eq!(state.entry(page.0, page.1).unwrap().state(), PageState::Invalid);

        PageFaultHandler::new(&mut state).resolve(page.0, page.1, Pfn(6)).unwrap();
        assert_eq!(state.entry(page.0, page.1).unwrap().state(), PageState::Resident);

        PageFaultHandler::new(&mut state).resolve(Pid(2), Vpn(0), Pfn(6)).unwrap();
        assert_eq!(state.entry(page.0, page.1).unwrap().state(), PageState::Swapped);

        PageFaultHandler::new(&mut state).resolve(page.0, page.1, Pfn(7)).unwrap();
        assert_eq!(state.entry(page.0, page.1).unwrap().state(), PageState::Resident);
    }
}
