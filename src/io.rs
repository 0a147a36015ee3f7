use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{SimError, SimResult};
use crate::fault::Resolution;
use crate::memory::{MemoryState, Owner, PageTableEntry, Pfn, Pid, Vpn};
use crate::session::{Mode, Session};
use crate::translation::{Access, FaultKind};

/// One line of a session script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Mode(Mode),
    Process(Pid),
    Access(Vpn),
    Frame(Pfn),
    Cancel,
    Show,
    Stats,
}

impl Command {
    /// Parse one line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str, line_no: usize) -> SimResult<Option<Command>> {
        let line = line.split('#').next().unwrap_or("").trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&keyword, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let error = |message: String| SimError::Parse { line: line_no, message };
        let number = |args: &[&str]| -> SimResult<usize> {
            match args {
                [value] => value
                    .parse()
                    .map_err(|_| error(format!("invalid number: {}", value))),
                _ => Err(error(format!("{} takes exactly one argument", keyword))),
            }
        };
        let bare = |command: Command| -> SimResult<Command> {
            if args.is_empty() {
                Ok(command)
            } else {
                Err(error(format!("{} takes no arguments", keyword)))
            }
        };

        let command = match keyword {
            "mode" => {
                let part = number(args)?;
                let mode = Mode::from_part(part)
                    .ok_or_else(|| error(format!("unknown mode: {} (expected 1 or 2)", part)))?;
                Command::Mode(mode)
            }
            "process" => Command::Process(Pid(number(args)?)),
            "access" => Command::Access(Vpn(number(args)?)),
            "frame" => Command::Frame(Pfn(number(args)?)),
            "cancel" => bare(Command::Cancel)?,
            "show" => bare(Command::Show)?,
            "stats" => bare(Command::Stats)?,
            other => return Err(error(format!("unknown command: {}", other))),
        };
        Ok(Some(command))
    }
}

/// Parse a whole script, keeping line numbers for diagnostics.
pub fn parse_script(content: &str) -> SimResult<Vec<(usize, Command)>> {
    let mut commands = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if let Some(command) = Command::parse(line, i + 1)? {
            commands.push((i + 1, command));
        }
    }
    Ok(commands)
}

pub fn read_script<P: AsRef<Path>>(path: P) -> SimResult<Vec<(usize, Command)>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_script(&content)
}

/// Run one command against the session and describe what happened.
pub fn execute(session: &mut Session, command: Command) -> SimResult<String> {
    match command {
        Command::Mode(mode) => {
            session.reset(mode)?;
            let config = session.config();
            Ok(format!(
                "> System reset. Mode: {}. {} processes loaded. RAM: {} frames.\n",
                mode, config.process_count, config.ram_frames
            ))
        }
        Command::Process(pid) => {
            session.select_process(pid)?;
            Ok(format!("> Context switched to {}.\n", pid))
        }
        Command::Access(page) => {
            let pid = session.active_pid();
            let access = session.access(pid, page)?;
            let mut out = describe_access(pid, page, &access);
            if !access.is_hit() {
                out.push_str(&describe_choices(session));
            }
            Ok(out)
        }
        Command::Frame(frame) => {
            let resolution = session.resolve(frame)?;
            Ok(describe_resolution(&resolution))
        }
        Command::Cancel => match session.cancel() {
            Some(_) => Ok("> [ABORT] Operation cancelled by user.\n".to_string()),
            None => Err(SimError::NoPendingFault),
        },
        Command::Show => render_session(session),
        Command::Stats => {
            let stats = session.stats();
            Ok(format!(
                "accesses={} hits={} faults={} cold_starts={} swap_ins={} swap_outs={} failed={} hit_rate={:.2}%\n",
                stats.accesses,
                stats.hits,
                stats.faults,
                stats.cold_starts,
                stats.swap_ins,
                stats.swap_outs,
                stats.failed_resolutions,
                stats.hit_rate()
            ))
        }
    }
}

pub fn describe_access(pid: Pid, page: Vpn, access: &Access) -> String {
    let mut out = format!("> Access: {}, page {}\n", pid, page);
    match access {
        Access::Hit { frame, address, physical } => {
            let _ = writeln!(out, "  [HIT] Page is in RAM (frame {}).", frame);
            let _ = writeln!(out, "  {} -> physical {:#06X}", address, physical);
        }
        Access::Fault(kind) => {
            let _ = writeln!(out, "  [MISS] Page is not in RAM (valid bit = 0).");
            let _ = writeln!(out, "  Raising PAGE FAULT ({}).", kind);
        }
    }
    out
}

fn describe_choices(session: &Session) -> String {
    let choices = session.frame_choices();
    let full = choices.iter().all(|c| c.occupant.is_some());
    let mut out = if full {
        format!(
            "  RAM FULL ({} user frames)! Choose a victim to swap out:",
            session.config().user_frames()
        )
    } else {
        "  Choose a free frame:".to_string()
    };
    for choice in choices {
        match choice.occupant {
            Some(page) => {
                let _ = write!(out, " {}({}-{})", choice.frame, page.pid, page.page);
            }
            None => {
                let _ = write!(out, " {}", choice.frame);
            }
        }
    }
    out.push('\n');
    out
}

pub fn describe_resolution(resolution: &Resolution) -> String {
    let mut out = format!(
        "> Resolving page fault for {} in frame {}...\n",
        resolution.page, resolution.frame
    );
    if let Some(eviction) = resolution.evicted {
        let _ = writeln!(out, "  ! Conflict: frame occupied by {}.", eviction.victim);
        let _ = writeln!(out, "  -> Victim moved to swap (block {}).", eviction.slot);
    }
    match resolution.kind {
        FaultKind::SwapIn(slot) => {
            let _ = writeln!(out, "  -> Brought in from swap (block {}).", slot);
        }
        FaultKind::ColdStart => {
            let _ = writeln!(out, "  -> Zero-filled new page.");
        }
    }
    let _ = writeln!(out, "  [SUCCESS] Page mapped into frame {}.", resolution.frame);
    out
}

fn owner_label(owner: Owner) -> String {
    match owner {
        Owner::Free => "free".to_string(),
        Owner::Reserved(region) => region.to_string(),
        Owner::Page(page) => format!("{} pg {}", page.pid, page.page),
    }
}

pub fn render_ram(state: &MemoryState) -> String {
    let page_size = state.config().page_size;
    let mut out = format!("--- RAM ({} frames) ---\n", state.ram().len());
    for (i, owner) in state.ram().iter() {
        let _ = writeln!(out, "Q{:<3} ({:#07X}): {}", i, i * page_size, owner_label(owner));
    }
    out
}

pub fn render_swap(state: &MemoryState) -> String {
    let mut out = format!(
        "--- Swap ({} blocks, {} free) ---\n",
        state.swap().len(),
        state.swap().free_count()
    );
    for (i, owner) in state.swap().iter().filter(|(_, owner)| !owner.is_free()) {
        let _ = writeln!(out, "B{:<3}: {}", i, owner_label(owner));
    }
    out
}

pub fn render_page_table(state: &MemoryState, pid: Pid) -> SimResult<String> {
    let table = state.page_table(pid)?;
    let mut out = format!(
        "--- Page table of {} ({} of {} resident) ---\n",
        pid,
        table.resident_count(),
        table.len()
    );
    for (page, entry) in table.iter() {
        let location = match entry {
            PageTableEntry::Invalid => "-".to_string(),
            PageTableEntry::Resident(frame) => format!("frame {}", frame),
            PageTableEntry::Swapped(slot) => format!("block {}", slot),
        };
        let _ = writeln!(out, "page {}: {:<8} {}", page, entry.state(), location);
    }
    Ok(out)
}

fn render_session(session: &Session) -> SimResult<String> {
    let mut out = format!("Mode: {}. Active process: {}.\n", session.mode(), session.active_pid());
    match session.memory() {
        Some(state) => {
            out.push_str(&render_ram(state));
            out.push_str(&render_swap(state));
            out.push_str(&render_page_table(state, session.active_pid())?);
        }
        None => out.push_str("No page tables in simple translation mode.\n"),
    }
    if let Some(fault) = session.pending() {
        let _ = writeln!(out, "Pending fault: {} page {} ({}).", fault.pid, fault.page, fault.kind);
    }
    Ok(out)
}
