use std::fmt;

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};

/// Process id. Valid ids are `1..=process_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub usize);

/// Virtual page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vpn(pub usize);

/// Physical frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pfn(pub usize);

/// Index of a block in swap space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(pub usize);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl fmt::Display for Vpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (process, page) pair, the unit of ownership for frames and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageRef {
    pub pid: Pid,
    pub page: Vpn,
}

impl PageRef {
    pub fn new(pid: Pid, page: Vpn) -> Self {
        PageRef { pid, page }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} page {}", self.pid, self.page)
    }
}

/// What a protected low frame is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedRegion {
    Kernel,
    PageTables,
    /// Below user RAM but not labeled by the configuration.
    System,
}

impl fmt::Display for ReservedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservedRegion::Kernel => write!(f, "kernel"),
            ReservedRegion::PageTables => write!(f, "page tables"),
            ReservedRegion::System => write!(f, "system"),
        }
    }
}

/// Ownership record of a RAM frame or a swap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Free,
    Reserved(ReservedRegion),
    Page(PageRef),
}

impl Owner {
    pub fn is_free(&self) -> bool {
        matches!(self, Owner::Free)
    }

    pub fn page(&self) -> Option<PageRef> {
        match self {
            Owner::Page(page) => Some(*page),
            _ => None,
        }
    }
}

/// Fixed-size table of ownership records, used for both RAM and swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTable {
    slots: Vec<Owner>,
}

impl OwnershipTable {
    pub fn new(len: usize) -> Self {
        OwnershipTable { slots: vec![Owner::Free; len] }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Owner> {
        self.slots.get(index).copied()
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, owner: Owner) {
        self.slots[index] = owner;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Owner)> + '_ {
        self.slots.iter().copied().enumerate()
    }

    /// Lowest free index at or above `start`.
    pub fn first_free(&self, start: usize) -> Option<usize> {
        self.slots
            .iter()
            .skip(start)
            .position(|owner| owner.is_free())
            .map(|i| i + start)
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|owner| owner.is_free()).count()
    }

    fn reset(&mut self) {
        self.slots.fill(Owner::Free);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Invalid,
    Resident,
    Swapped,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageState::Invalid => f.pad("INVALID"),
            PageState::Resident => f.pad("RESIDENT"),
            PageState::Swapped => f.pad("SWAPPED"),
        }
    }
}

/// Page table entry. The location lives inside the variant so an entry
/// can never point somewhere its state does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageTableEntry {
    #[default]
    Invalid,
    Resident(Pfn),
    Swapped(SwapSlot),
}

impl PageTableEntry {
    pub fn state(&self) -> PageState {
        match self {
            PageTableEntry::Invalid => PageState::Invalid,
            PageTableEntry::Resident(_) => PageState::Resident,
            PageTableEntry::Swapped(_) => PageState::Swapped,
        }
    }

    /// Frame or block index, -1 for an invalid page.
    pub fn location(&self) -> i64 {
        match self {
            PageTableEntry::Invalid => -1,
            PageTableEntry::Resident(frame) => frame.0 as i64,
            PageTableEntry::Swapped(slot) => slot.0 as i64,
        }
    }
}

/// Per-process page table, indexed directly by page number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    pub fn new(page_count: usize) -> Self {
        PageTable { entries: vec![PageTableEntry::Invalid; page_count] }
    }

    #[inline]
    pub fn get(&self, page: Vpn) -> Option<PageTableEntry> {
        self.entries.get(page.0).copied()
    }

    #[inline]
    pub(crate) fn set(&mut self, page: Vpn, entry: PageTableEntry) {
        self.entries[page.0] = entry;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Vpn, PageTableEntry)> + '_ {
        self.entries.iter().enumerate().map(|(i, entry)| (Vpn(i), *entry))
    }

    pub fn resident_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state() == PageState::Resident)
            .count()
    }
}

/// All mutable paging state of a demand-paging session: RAM ownership,
/// swap ownership and one page table per process.
///
/// Nothing here keeps the tables consistent with each other; that is the
/// page fault handler's job. `check_consistency` verifies it after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryState {
    config: SimConfig,
    ram: OwnershipTable,
    swap: OwnershipTable,
    page_tables: Vec<PageTable>,
}

impl MemoryState {
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let mut state = MemoryState {
            ram: OwnershipTable::new(config.ram_frames),
            swap: OwnershipTable::new(config.swap_blocks),
            page_tables: Vec::new(),
            config,
        };
        state.initialize();
        Ok(state)
    }

    /// Frees every frame except the reserved ones, empties swap and marks
    /// every page of every process invalid.
    pub fn initialize(&mut self) {
        self.ram.reset();
        for reserved in &self.config.reserved {
            self.ram.set(reserved.frame, Owner::Reserved(reserved.region));
        }
        self.swap.reset();
        self.page_tables = (0..self.config.process_count)
            .map(|_| PageTable::new(self.config.pages_per_process))
            .collect();
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ram(&self) -> &OwnershipTable {
        &self.ram
    }

    pub fn swap(&self) -> &OwnershipTable {
        &self.swap
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> {
        (1..=self.config.process_count).map(Pid)
    }

    pub fn check_pid(&self, pid: Pid) -> SimResult<()> {
        if pid.0 == 0 || pid.0 > self.config.process_count {
            return Err(SimError::NotFound { pid });
        }
        Ok(())
    }

    pub fn page_table(&self, pid: Pid) -> SimResult<&PageTable> {
        self.check_pid(pid)?;
        Ok(&self.page_tables[pid.0 - 1])
    }

    /// Entry for `(pid, page)`, with both halves of the address checked.
    pub fn entry(&self, pid: Pid, page: Vpn) -> SimResult<PageTableEntry> {
        let table = self.page_table(pid)?;
        table.get(page).ok_or(SimError::InvalidAddress {
            pid,
            page,
            pages: table.len(),
        })
    }

    pub fn ram_owner(&self, frame: Pfn) -> Option<Owner> {
        self.ram.get(frame.0)
    }

    pub fn swap_owner(&self, slot: SwapSlot) -> Option<Owner> {
        self.swap.get(slot.0)
    }

    /// Lowest-indexed free swap block. Does not claim it.
    pub fn find_free_swap_slot(&self) -> Option<SwapSlot> {
        self.swap.first_free(0).map(SwapSlot)
    }

    pub fn free_user_frames(&self) -> Vec<Pfn> {
        self.ram
            .iter()
            .skip(self.config.user_ram_start)
            .filter(|(_, owner)| owner.is_free())
            .map(|(i, _)| Pfn(i))
            .collect()
    }

    pub(crate) fn set_ram(&mut self, frame: Pfn, owner: Owner) {
        self.ram.set(frame.0, owner);
    }

    pub(crate) fn set_swap(&mut self, slot: SwapSlot, owner: Owner) {
        self.swap.set(slot.0, owner);
    }

    pub(crate) fn set_entry(&mut self, page: PageRef, entry: PageTableEntry) {
        self.page_tables[page.pid.0 - 1].set(page.page, entry);
    }

    /// Entry of the page an ownership record names. A record naming a page
    /// outside every table is itself an inconsistency.
    fn claimed_entry(&self, page: PageRef, kind: &str, index: usize) -> SimResult<PageTableEntry> {
        self.entry(page.pid, page.page).map_err(|_| {
            SimError::Inconsistent(format!("{} {} belongs to nonexistent {}", kind, index, page))
        })
    }

    /// Verifies that page tables and ownership tables agree: every
    /// resident or swapped entry is pointed back at by exactly the slot it
    /// names, no slot is owned by a page that does not claim it, and the
    /// reserved frames are untouched.
    pub fn check_consistency(&self) -> SimResult<()> {
        for reserved in &self.config.reserved {
            match self.ram.get(reserved.frame) {
                Some(Owner::Reserved(region)) if region == reserved.region => {}
                other => {
                    return Err(SimError::Inconsistent(format!(
                        "reserved frame {} holds {:?}",
                        reserved.frame, other
                    )));
                }
            }
        }

        for (frame, owner) in self.ram.iter() {
            match owner {
                Owner::Reserved(_) if frame >= self.config.user_ram_start => {
                    return Err(SimError::Inconsistent(format!(
                        "user frame {} is marked reserved",
                        frame
                    )));
                }
                Owner::Page(r) => {
                    if frame < self.config.user_ram_start {
                        return Err(SimError::Inconsistent(format!(
                            "{} occupies protected frame {}",
                            r, frame
                        )));
                    }
                    let entry = self.claimed_entry(r, "frame", frame)?;
                    if entry != PageTableEntry::Resident(Pfn(frame)) {
                        return Err(SimError::Inconsistent(format!(
                            "frame {} belongs to {} but its entry disagrees",
                            frame, r
                        )));
                    }
                }
                _ => {}
            }
        }

        for (slot, owner) in self.swap.iter() {
            match owner {
                Owner::Reserved(_) => {
                    return Err(SimError::Inconsistent(format!(
                        "swap block {} is marked reserved",
                        slot
                    )));
                }
                Owner::Page(r) => {
                    let entry = self.claimed_entry(r, "swap block", slot)?;
                    if entry != PageTableEntry::Swapped(SwapSlot(slot)) {
                        return Err(SimError::Inconsistent(format!(
                            "swap block {} belongs to {} but its entry disagrees",
                            slot, r
                        )));
                    }
                }
                Owner::Free => {}
            }
        }

        for pid in self.pids() {
            for (page, entry) in self.page_table(pid)?.iter() {
                let here = Owner::Page(PageRef::new(pid, page));
                let owned = match entry {
                    PageTableEntry::Invalid => true,
                    PageTableEntry::Resident(frame) => self.ram.get(frame.0) == Some(here),
                    PageTableEntry::Swapped(slot) => self.swap.get(slot.0) == Some(here),
                };
                if !owned {
                    return Err(SimError::Inconsistent(format!(
                        "{} page {} is {} at {} but nothing points back",
                        pid,
                        page,
                        entry.state(),
                        entry.location()
                    )));
                }
            }
        }

        Ok(())
    }
}
