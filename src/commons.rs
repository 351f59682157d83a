// system geometry and the shared address vocabulary

/// Words per cache block.
pub const BLOCK_WORDS: usize = 4;
/// Cache data store size in words.
pub const CACHE_WORDS: usize = 256;
/// Number of direct-mapped lines (CACHE_WORDS / BLOCK_WORDS).
pub const NUM_LINES: usize = CACHE_WORDS / BLOCK_WORDS;
/// Private instruction memory size in words.
pub const IMEM_WORDS: usize = 1024;
/// Main memory size in words.
pub const MEM_WORDS: usize = 1 << 20;
/// Cycles between a granted Rd/RdX and the first word of memory's response.
pub const MEM_RESPONSE_DELAY: u32 = 14;
/// Arbitration delay between a round-robin grant and the drive cycle.
pub const BUS_GRANT_DELAY: u32 = 1;

/// Number of cores on the bus.
pub const NUM_CORES: usize = 4;
/// Bus origin id used by main memory.
pub const MEM_ORIGIN: usize = 4;

/// Sentinel PC meaning "no instruction in this stage".
pub const BUBBLE: u32 = u32::MAX;

const OFFSET_BITS: u32 = 2;
const INDEX_BITS: u32 = 6;
const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

// addresses

/// A word address, decomposed as tag | index | block-offset.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Addr(pub u32);

impl Addr {
    pub fn tag(self) -> u32 {
        self.0 >> (OFFSET_BITS + INDEX_BITS)
    }
    pub fn index(self) -> usize {
        ((self.0 >> OFFSET_BITS) & INDEX_MASK) as usize
    }
    pub fn offset(self) -> usize {
        (self.0 & OFFSET_MASK) as usize
    }
    /// Block-aligned base address.
    pub fn block(self) -> Addr {
        Addr(self.0 & !OFFSET_MASK)
    }
    /// Reassemble a block base address from a line's tag and index.
    pub fn from_line(tag: u32, index: usize) -> Addr {
        Addr((tag << (OFFSET_BITS + INDEX_BITS)) | ((index as u32) << OFFSET_BITS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_decomposition() {
        let a = Addr(0x123);
        // 0x123 = 0b1_0010_0011: offset 3, index 0b001000 = 8, tag 1
        assert_eq!(a.offset(), 3);
        assert_eq!(a.index(), 8);
        assert_eq!(a.tag(), 1);
        assert_eq!(a.block(), Addr(0x120));
    }

    #[test]
    fn addr_roundtrip_through_line() {
        let a = Addr(0x0F5C);
        assert_eq!(Addr::from_line(a.tag(), a.index()), a.block());
    }
}
