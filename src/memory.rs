// main memory behind the bus, with a fixed response latency

use log::{debug, trace};

use crate::bus::{Bus, BusCmd};
use crate::commons::{Addr, BLOCK_WORDS, MEM_ORIGIN, MEM_RESPONSE_DELAY, MEM_WORDS};

const ADDR_MASK: usize = MEM_WORDS - 1;

/// A granted Rd/RdX that memory will answer with a block flush once the
/// response delay has elapsed.
#[derive(Clone, Copy)]
struct PendingResponse {
    base: Addr,
    wait: u32,
    next_word: usize,
}

/// Word-addressed main memory. It observes the bus lines of the previous
/// cycle: every flush word driven by a cache is absorbed (write-backs and
/// cache-to-cache supplies alike keep memory current), and every granted
/// Rd/RdX arms a delayed block response. If a cache supplies the block
/// first, the armed response is dropped.
pub struct MainMemory {
    data: Vec<u32>,
    pending: Option<PendingResponse>,
}

impl MainMemory {
    pub fn new() -> Self {
        MainMemory {
            data: vec![0; MEM_WORDS],
            pending: None,
        }
    }

    pub fn from_image(image: Vec<u32>) -> Self {
        let mut data = image;
        data.resize(MEM_WORDS, 0);
        MainMemory {
            data,
            pending: None,
        }
    }

    pub fn read(&self, addr: Addr) -> u32 {
        self.data[addr.0 as usize & ADDR_MASK]
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn clock(&mut self, bus: &mut Bus) {
        match bus.cmd {
            BusCmd::Flush if bus.origin != MEM_ORIGIN => {
                self.data[bus.addr.0 as usize & ADDR_MASK] = bus.data;
                if let Some(p) = self.pending {
                    if p.base == bus.addr.block() {
                        // a cache is supplying this block, stand down
                        debug!("memory: response for {:#07x} cancelled", p.base.0);
                        self.pending = None;
                    }
                }
                return;
            }
            BusCmd::Rd | BusCmd::RdX => {
                self.pending = Some(PendingResponse {
                    base: bus.addr.block(),
                    wait: MEM_RESPONSE_DELAY,
                    next_word: 0,
                });
                trace!("memory: armed response for {:#07x}", bus.addr.block().0);
                return;
            }
            _ => {}
        }

        if let Some(p) = &mut self.pending {
            if p.wait > 0 {
                p.wait -= 1;
                return;
            }
            let addr = Addr(p.base.0 + p.next_word as u32);
            let data = self.data[addr.0 as usize & ADDR_MASK];
            bus.request(MEM_ORIGIN, BusCmd::Flush, addr, data);
            p.next_word += 1;
            if p.next_word == BLOCK_WORDS {
                self.pending = None;
            }
        }
    }
}

impl Default for MainMemory {
    fn default() -> Self {
        MainMemory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(base: Addr, words: [u32; BLOCK_WORDS]) -> MainMemory {
        let mut mem = MainMemory::new();
        for (w, &v) in words.iter().enumerate() {
            mem.data[base.0 as usize + w] = v;
        }
        mem
    }

    #[test]
    fn response_arrives_after_the_delay_and_spans_the_block() {
        let mut bus = Bus::new();
        let mut mem = memory_with(Addr(0x100), [1, 2, 3, 4]);

        bus.request(0, BusCmd::Rd, Addr(0x102), 0);
        bus.clock();
        bus.clock();
        assert_eq!(bus.cmd, BusCmd::Rd);

        let mut served = Vec::new();
        for _ in 0..(MEM_RESPONSE_DELAY + 8) {
            mem.clock(&mut bus);
            bus.clock();
            if bus.cmd == BusCmd::Flush {
                served.push((bus.addr, bus.data));
            }
        }
        assert_eq!(
            served,
            vec![
                (Addr(0x100), 1),
                (Addr(0x101), 2),
                (Addr(0x102), 3),
                (Addr(0x103), 4)
            ]
        );
        assert!(!bus.is_busy());
    }

    #[test]
    fn flush_words_are_absorbed_into_memory() {
        let mut bus = Bus::new();
        let mut mem = MainMemory::new();

        bus.request(1, BusCmd::Flush, Addr(0x80), 0xBEEF);
        bus.clock();
        assert_eq!(bus.cmd, BusCmd::Flush);
        mem.clock(&mut bus);
        assert_eq!(mem.read(Addr(0x80)), 0xBEEF);
    }

    #[test]
    fn cache_supplied_block_cancels_the_armed_response() {
        let mut bus = Bus::new();
        let mut mem = memory_with(Addr(0x40), [1, 1, 1, 1]);

        bus.request(0, BusCmd::Rd, Addr(0x40), 0);
        bus.clock();
        bus.clock();
        assert_eq!(bus.cmd, BusCmd::Rd);
        mem.clock(&mut bus);
        assert!(mem.pending.is_some());

        // the owning cache streams the block before memory's delay elapses
        for w in 0..BLOCK_WORDS as u32 {
            bus.request(2, BusCmd::Flush, Addr(0x40 + w), 7);
            bus.clock();
            assert_eq!(bus.cmd, BusCmd::Flush);
            mem.clock(&mut bus);
        }
        assert!(mem.pending.is_none());
        assert_eq!(mem.read(Addr(0x43)), 7);

        // memory stays silent afterwards
        for _ in 0..(MEM_RESPONSE_DELAY + 4) {
            mem.clock(&mut bus);
            bus.clock();
            assert_eq!(bus.cmd, BusCmd::None);
        }
    }
}
