// shared bus: one winner per cycle among 4 cores + memory

use log::{debug, trace};

use crate::commons::{Addr, BLOCK_WORDS, BUS_GRANT_DELAY, MEM_ORIGIN, NUM_CORES};
use crate::register::Dff;

/// Bus commands of the MESI protocol.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusCmd {
    None,
    Rd,
    RdX,
    Flush,
}

impl BusCmd {
    /// Wire encoding used in the bus trace.
    pub fn code(self) -> u32 {
        match self {
            BusCmd::None => 0,
            BusCmd::Rd => 1,
            BusCmd::RdX => 2,
            BusCmd::Flush => 3,
        }
    }
}

#[derive(Clone, Copy)]
struct Request {
    cmd: BusCmd,
    addr: Addr,
    data: u32,
}

/// A round-robin winner waiting out the arbitration delay.
#[derive(Clone, Copy)]
struct PendingGrant {
    origin: usize,
    cmd: BusCmd,
    addr: Addr,
    data: u32,
    cycles_left: u32,
}

/// The arbitrated bus. The `cmd`/`origin`/`addr`/`data` lines behave as
/// per-cycle wires: exactly one transaction (or idle) is visible each
/// cycle. The shared line is a clocked cell instead — it stays asserted
/// across a whole block transfer and is cleared only when the transfer's
/// flush sequence completes.
pub struct Bus {
    pub origin: usize,
    pub cmd: BusCmd,
    pub addr: Addr,
    pub data: u32,
    pub shared: Dff,
    /// A fresh grant or the first word of a flush sequence; continuing
    /// flush words do not set this. Consumed by the bus trace.
    pub new_grant: bool,
    /// Shared-line value during the last committed cycle. The trace is
    /// written after the clock edge but must show the in-cycle value.
    pub shared_observed: u32,

    busy: bool,
    flush_count: usize,
    last_granted: usize,
    /// Next word address expected while a block transfer is in flight.
    expected_flush: Addr,
    pending: Option<PendingGrant>,
    requests: [Option<Request>; NUM_CORES + 1],
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            origin: 0,
            cmd: BusCmd::None,
            addr: Addr(0),
            data: 0,
            shared: Dff::new(),
            new_grant: false,
            shared_observed: 0,
            busy: false,
            flush_count: 0,
            last_granted: NUM_CORES - 1,
            expected_flush: Addr(0),
            pending: None,
            requests: [None; NUM_CORES + 1],
        }
    }

    /// Latch a request on `origin`'s request line (0-3 cores, 4 memory).
    /// A line holds one request; re-requesting overwrites it.
    pub fn request(&mut self, origin: usize, cmd: BusCmd, addr: Addr, data: u32) {
        self.requests[origin] = Some(Request { cmd, addr, data });
    }

    /// Assert the sticky shared line (visible from the next cycle on).
    pub fn set_shared(&mut self) {
        self.shared.set_next(1);
    }

    pub fn shared_asserted(&self) -> bool {
        self.shared.q() != 0
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Commit step for the registered shared line, called once per tick by
    /// the orchestrator. Latches the pre-edge value for the trace.
    pub fn commit(&mut self) {
        self.shared_observed = self.shared.q();
        self.shared.commit();
    }

    fn drive(&mut self, origin: usize, cmd: BusCmd, addr: Addr, data: u32) {
        self.origin = origin;
        self.cmd = cmd;
        self.addr = addr;
        self.data = data;
    }

    /// Arbitrate and drive the lines for this cycle.
    ///
    /// Priority: a pending delayed grant completes first; then any Flush is
    /// served (one word per cycle, deferred only while the bus is busy with
    /// a different block's sequence); a busy bus grants nothing new; else
    /// round-robin over the cores with a fixed arbitration delay.
    pub fn clock(&mut self) {
        // wire semantics: idle unless something is driven below
        self.cmd = BusCmd::None;
        self.new_grant = false;

        if let Some(mut grant) = self.pending.take() {
            grant.cycles_left -= 1;
            if grant.cycles_left > 0 {
                self.pending = Some(grant);
                return;
            }
            // delay complete, drive the transaction
            self.drive(grant.origin, grant.cmd, grant.addr, grant.data);
            // a request restated during the delay window is already served
            self.requests[grant.origin] = None;
            self.busy = true;
            self.flush_count = 0;
            self.expected_flush = grant.addr.block();
            self.new_grant = true;
            debug!(
                "bus: grant {:?} origin {} addr {:#07x}",
                grant.cmd, grant.origin, grant.addr.0
            );
            return;
        }

        // priority 1: flush, cores and memory alike
        for origin in 0..=MEM_ORIGIN {
            let req = match self.requests[origin] {
                Some(req) if req.cmd == BusCmd::Flush => req,
                _ => continue,
            };
            if self.busy && req.addr != self.expected_flush {
                // mid-transfer of another block, defer this flush
                continue;
            }
            self.requests[origin] = None;
            self.drive(origin, BusCmd::Flush, req.addr, req.data);
            self.new_grant = req.addr.offset() == 0;
            if self.busy {
                self.expected_flush = Addr(req.addr.0 + 1);
                self.flush_count += 1;
                if self.flush_count == BLOCK_WORDS {
                    // block transfer complete
                    self.busy = false;
                    self.flush_count = 0;
                    self.shared.set_next(0);
                }
            }
            trace!(
                "bus: flush word origin {} addr {:#07x} data {:#010x}",
                origin,
                req.addr.0,
                req.data
            );
            return;
        }

        if self.busy {
            return;
        }

        // round-robin over the cores, starting after the last winner
        for k in 0..NUM_CORES {
            let origin = (self.last_granted + 1 + k) % NUM_CORES;
            let req = match self.requests[origin] {
                Some(req) if req.cmd != BusCmd::Flush => req,
                _ => continue,
            };
            self.requests[origin] = None;
            self.last_granted = origin;
            self.pending = Some(PendingGrant {
                origin,
                cmd: req.cmd,
                addr: req.addr,
                data: req.data,
                cycles_left: BUS_GRANT_DELAY,
            });
            return;
        }
    }

    #[cfg(test)]
    pub(crate) fn last_granted(&self) -> usize {
        self.last_granted
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new()
    }
}
