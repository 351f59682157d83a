// per-core direct-mapped data cache with the MESI coherency engine

use log::{debug, trace};

use crate::bus::{Bus, BusCmd};
use crate::commons::{Addr, BLOCK_WORDS, CACHE_WORDS, NUM_LINES};

/// MESI line states.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MesiState {
    Invalid,
    Shared,
    Exclusive,
    Modified,
}

impl MesiState {
    /// Encoding used in the tag-store dump: `(state << 12) | tag`.
    pub fn code(self) -> u32 {
        match self {
            MesiState::Invalid => 0,
            MesiState::Shared => 1,
            MesiState::Exclusive => 2,
            MesiState::Modified => 3,
        }
    }
}

#[derive(Clone, Copy)]
struct LineTag {
    tag: u32,
    state: MesiState,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct CacheStats {
    pub read_hit: u64,
    pub write_hit: u64,
    pub read_miss: u64,
    pub write_miss: u64,
}

/// An outstanding Rd/RdX waiting for its fill. `write` holds the store
/// data to apply once the block arrives.
#[derive(Clone, Copy)]
struct PendingFill {
    addr: Addr,
    write: Option<u32>,
}

/// An outbound flush of one block, one word per cycle. Used both for the
/// snoop response (supplying a Modified block to a peer) and for the
/// victim write-back before replacement. Progress advances only when the
/// cache sees its own word driven on the bus, so a deferred word is
/// simply re-sent.
#[derive(Clone, Copy)]
struct BlockFlush {
    base: Addr,
    sent: usize,
}

pub struct Cache {
    pub id: usize,
    dsram: [u32; CACHE_WORDS],
    tsram: [LineTag; NUM_LINES],
    pending: Option<PendingFill>,
    /// The bus currently carries (or carried) this cache's own Rd/RdX.
    is_mine: bool,
    /// Snoop response in progress for a peer's Rd/RdX.
    snoop_flush: Option<BlockFlush>,
    /// Victim write-back in progress ahead of a replacement.
    writeback: Option<BlockFlush>,
    /// Block of the in-flight miss already counted, so the post-writeback
    /// reissue and the post-fill retry hit are not counted again.
    counted: Option<Addr>,
    pub stats: CacheStats,
}

impl Cache {
    pub fn new(id: usize) -> Self {
        Cache {
            id,
            dsram: [0; CACHE_WORDS],
            tsram: [LineTag {
                tag: 0,
                state: MesiState::Invalid,
            }; NUM_LINES],
            pending: None,
            is_mine: false,
            snoop_flush: None,
            writeback: None,
            counted: None,
            stats: CacheStats::default(),
        }
    }

    fn word(&self, index: usize, offset: usize) -> u32 {
        self.dsram[index * BLOCK_WORDS + offset]
    }

    fn word_mut(&mut self, index: usize, offset: usize) -> &mut u32 {
        &mut self.dsram[index * BLOCK_WORDS + offset]
    }

    fn is_hit(&self, addr: Addr) -> bool {
        let line = &self.tsram[addr.index()];
        line.state != MesiState::Invalid && line.tag == addr.tag()
    }

    /// Busy with an earlier transaction; the caller must retry.
    fn is_busy(&self) -> bool {
        self.pending.is_some() || self.snoop_flush.is_some()
    }

    // Each request is classified exactly once: a hit that completes a
    // previously counted miss is the same request retried, not a new one.

    fn note_hit(&mut self, addr: Addr, write: bool) {
        if self.counted == Some(addr.block()) {
            self.counted = None;
            return;
        }
        if write {
            self.stats.write_hit += 1;
        } else {
            self.stats.read_hit += 1;
        }
    }

    fn note_miss(&mut self, addr: Addr, write: bool) {
        if self.counted == Some(addr.block()) {
            return;
        }
        self.counted = Some(addr.block());
        if write {
            self.stats.write_miss += 1;
        } else {
            self.stats.read_miss += 1;
        }
    }

    /// Core-side read. `(Some(word), true)` on a hit; `(None, false)` while
    /// the miss (or an earlier transaction) is in flight.
    pub fn read(&mut self, bus: &mut Bus, addr: Addr) -> (Option<u32>, bool) {
        if self.is_busy() {
            return (None, false);
        }
        if self.is_hit(addr) {
            let data = self.word(addr.index(), addr.offset());
            self.note_hit(addr, false);
            self.is_mine = false;
            return (Some(data), true);
        }
        self.miss(bus, addr, None);
        (None, false)
    }

    /// Core-side write. `true` once the word is committed to the line.
    pub fn write(&mut self, bus: &mut Bus, addr: Addr, data: u32) -> bool {
        if self.is_busy() {
            return false;
        }
        if self.is_hit(addr) {
            match self.tsram[addr.index()].state {
                MesiState::Modified | MesiState::Exclusive => {
                    *self.word_mut(addr.index(), addr.offset()) = data;
                    self.tsram[addr.index()].state = MesiState::Modified;
                    self.note_hit(addr, true);
                    self.is_mine = false;
                    return true;
                }
                MesiState::Shared => {
                    // shared line: exclusive ownership must be acquired
                    // first, so this counts as a miss until the upgrade
                    // fill completes
                    self.note_miss(addr, true);
                    self.pending = Some(PendingFill {
                        addr,
                        write: Some(data),
                    });
                    bus.request(self.id, BusCmd::RdX, addr, 0);
                    debug!("cache {}: write upgrade RdX {:#07x}", self.id, addr.0);
                    return false;
                }
                MesiState::Invalid => unreachable!("hit on an invalid line"),
            }
        }
        self.miss(bus, addr, Some(data));
        false
    }

    /// Shared miss path for reads and writes. Reentrant: while a victim
    /// write-back is in progress, each call drives the next word of the
    /// flush instead of starting a new request.
    fn miss(&mut self, bus: &mut Bus, addr: Addr, write: Option<u32>) {
        if let Some(wb) = self.writeback {
            let data = self.word(wb.base.index(), wb.sent);
            bus.request(self.id, BusCmd::Flush, Addr(wb.base.0 + wb.sent as u32), data);
            return;
        }

        let index = addr.index();
        let victim = self.tsram[index];
        if victim.state == MesiState::Modified {
            // dirty victim: write the block back before replacing it
            self.note_miss(addr, write.is_some());
            let base = Addr::from_line(victim.tag, index);
            self.writeback = Some(BlockFlush { base, sent: 0 });
            let data = self.word(index, 0);
            bus.request(self.id, BusCmd::Flush, base, data);
            debug!(
                "cache {}: miss {:#07x}, writing back victim {:#07x}",
                self.id, addr.0, base.0
            );
            return;
        }

        self.note_miss(addr, write.is_some());
        self.pending = Some(PendingFill { addr, write });
        let cmd = if write.is_some() {
            BusCmd::RdX
        } else {
            BusCmd::Rd
        };
        bus.request(self.id, cmd, addr, 0);
        debug!("cache {}: miss, request {:?} {:#07x}", self.id, cmd, addr.0);
    }

    /// Observe the bus transaction of this cycle. Every cache snoops every
    /// transaction; a cache's own Rd/RdX only records ownership, while its
    /// own Flush words confirm outbound flush progress.
    pub fn snoop(&mut self, bus: &mut Bus) {
        match bus.cmd {
            BusCmd::None => return,
            BusCmd::Rd | BusCmd::RdX if bus.origin == self.id => {
                self.is_mine = true;
                return;
            }
            BusCmd::Flush if bus.origin == self.id => {
                let block = bus.addr.block();
                if let Some(wb) = &mut self.writeback {
                    if wb.base == block {
                        wb.sent += 1;
                        if wb.sent == BLOCK_WORDS {
                            self.tsram[block.index()].state = MesiState::Invalid;
                            self.writeback = None;
                            trace!("cache {}: victim {:#07x} written back", self.id, block.0);
                        }
                        return;
                    }
                }
                if let Some(sf) = &mut self.snoop_flush {
                    if sf.base == block {
                        sf.sent += 1;
                        if sf.sent == BLOCK_WORDS {
                            self.snoop_flush = None;
                        }
                    }
                }
                return;
            }
            _ => {}
        }

        // a peer's transaction: react if we hold the block
        let index = bus.addr.index();
        let tag = bus.addr.tag();
        if self.tsram[index].state == MesiState::Invalid || self.tsram[index].tag != tag {
            return;
        }
        match bus.cmd {
            BusCmd::Rd => match self.tsram[index].state {
                MesiState::Modified => {
                    // supply our modified copy and keep a shared one
                    bus.set_shared();
                    self.snoop_flush = Some(BlockFlush {
                        base: bus.addr.block(),
                        sent: 0,
                    });
                    self.tsram[index].state = MesiState::Shared;
                    debug!(
                        "cache {}: supplying modified block {:#07x} to core {}",
                        self.id,
                        bus.addr.block().0,
                        bus.origin
                    );
                }
                MesiState::Exclusive => {
                    self.tsram[index].state = MesiState::Shared;
                    bus.set_shared();
                }
                MesiState::Shared => bus.set_shared(),
                MesiState::Invalid => {}
            },
            BusCmd::RdX => {
                if self.tsram[index].state == MesiState::Modified {
                    self.snoop_flush = Some(BlockFlush {
                        base: bus.addr.block(),
                        sent: 0,
                    });
                }
                self.tsram[index].state = MesiState::Invalid;
            }
            BusCmd::Flush | BusCmd::None => {}
        }
    }

    /// Consume fill words for this cache's own pending request. The fill
    /// finishes on the block's last word: the tag is set, a held write is
    /// applied (final state Modified), otherwise the sticky shared line
    /// decides Exclusive vs Shared.
    pub fn handle_bus_response(&mut self, bus: &Bus) {
        if !self.is_mine || bus.cmd != BusCmd::Flush {
            return;
        }
        let pending = match self.pending {
            Some(p) => p,
            None => return,
        };
        if bus.addr.block() != pending.addr.block() {
            return;
        }

        let index = bus.addr.index();
        let offset = bus.addr.offset();
        *self.word_mut(index, offset) = bus.data;

        if offset == BLOCK_WORDS - 1 {
            self.tsram[index].tag = bus.addr.tag();
            self.tsram[index].state = match pending.write {
                Some(data) => {
                    *self.word_mut(index, pending.addr.offset()) = data;
                    MesiState::Modified
                }
                None if bus.shared_asserted() => MesiState::Shared,
                None => MesiState::Exclusive,
            };
            self.pending = None;
            trace!(
                "cache {}: fill complete {:#07x} -> {:?}",
                self.id,
                pending.addr.block().0,
                self.tsram[index].state
            );
        }
    }

    /// Per-cycle request driver: one outbound snoop-flush word, or a
    /// restatement of the pending Rd/RdX while it has not been driven yet.
    pub fn clock(&mut self, bus: &mut Bus) {
        if let Some(sf) = self.snoop_flush {
            let data = self.word(sf.base.index(), sf.sent);
            bus.request(self.id, BusCmd::Flush, Addr(sf.base.0 + sf.sent as u32), data);
            return;
        }
        if let Some(p) = self.pending {
            if !self.is_mine {
                let cmd = if p.write.is_some() {
                    BusCmd::RdX
                } else {
                    BusCmd::Rd
                };
                bus.request(self.id, cmd, p.addr, 0);
            }
        }
    }

    /// MESI state of the line holding `addr`, Invalid on a tag mismatch.
    pub fn state_of(&self, addr: Addr) -> MesiState {
        let line = &self.tsram[addr.index()];
        if line.tag == addr.tag() {
            line.state
        } else {
            MesiState::Invalid
        }
    }

    /// Packed tag-store entry for the dump files: `(state << 12) | tag`.
    pub fn line_dump(&self, index: usize) -> u32 {
        let line = &self.tsram[index];
        (line.state.code() << 12) | line.tag
    }

    pub fn dsram(&self) -> &[u32; CACHE_WORDS] {
        &self.dsram
    }

    #[cfg(test)]
    pub(crate) fn preload_line(&mut self, base: Addr, state: MesiState, words: [u32; BLOCK_WORDS]) {
        let index = base.index();
        self.tsram[index] = LineTag {
            tag: base.tag(),
            state,
        };
        self.dsram[index * BLOCK_WORDS..index * BLOCK_WORDS + BLOCK_WORDS]
            .copy_from_slice(&words);
    }
}
