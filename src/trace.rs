// cycle-by-cycle trace output

use std::io::{self, Write};

use crate::bus::{Bus, BusCmd};
use crate::commons::BUBBLE;
use crate::core::Core;

fn fmt_pc(pc: u32) -> String {
    if pc == BUBBLE {
        "---".to_string()
    } else {
        format!("{:03X}", pc)
    }
}

/// One core trace line: cycle, the pc in each stage (`---` for an empty
/// slot), then R2 through R15.
pub fn core_line(cycle: u64, core: &Core) -> String {
    let pcs = core.stage_pcs();
    let mut line = format!(
        "{} {} {} {} {} {}",
        cycle,
        fmt_pc(pcs[0]),
        fmt_pc(pcs[1]),
        fmt_pc(pcs[2]),
        fmt_pc(pcs[3]),
        fmt_pc(pcs[4]),
    );
    for r in 2..16 {
        line.push_str(&format!(" {:08X}", core.register(r)));
    }
    line
}

/// One bus trace line, or None on a cycle without a fresh transaction.
/// Continuing words of a block flush are not repeated. Valid after the
/// cycle's commit: the shared column is the value the line held during
/// the cycle, not the one just latched.
pub fn bus_line(cycle: u64, bus: &Bus) -> Option<String> {
    if !bus.new_grant || bus.cmd == BusCmd::None {
        return None;
    }
    Some(format!(
        "{} {} {} {:05X} {:08X} {}",
        cycle,
        bus.origin,
        bus.cmd.code(),
        bus.addr.0,
        bus.data,
        bus.shared_observed
    ))
}

/// Owns the per-core and bus trace writers for a run.
pub struct Tracer<W: Write> {
    core_out: Vec<W>,
    bus_out: W,
}

impl<W: Write> Tracer<W> {
    pub fn new(core_out: Vec<W>, bus_out: W) -> Self {
        Tracer { core_out, bus_out }
    }

    /// Record the pre-clock state of every still-running core.
    pub fn trace_cores(&mut self, cycle: u64, cores: &[Core]) -> io::Result<()> {
        for (core, out) in cores.iter().zip(&mut self.core_out) {
            if core.done() {
                continue;
            }
            writeln!(out, "{}", core_line(cycle, core))?;
        }
        Ok(())
    }

    /// Record the transaction driven in `cycle`, if any.
    pub fn trace_bus(&mut self, cycle: u64, bus: &Bus) -> io::Result<()> {
        if let Some(line) = bus_line(cycle, bus) {
            writeln!(self.bus_out, "{}", line)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        for out in &mut self.core_out {
            out.flush()?;
        }
        self.bus_out.flush()
    }
}
