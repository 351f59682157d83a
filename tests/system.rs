// whole-machine scenarios: programs on several cores sharing memory

use mcsim::memory::MainMemory;
use mcsim::{Addr, MesiState, Simulator};

fn encode(op: u8, rd: usize, rs: usize, rt: usize, imm: u32) -> u32 {
    ((op as u32) << 24)
        | ((rd as u32) << 20)
        | ((rs as u32) << 16)
        | ((rt as u32) << 12)
        | (imm & 0xFFF)
}

const OP_ADD: u8 = 0;
const OP_LW: u8 = 16;
const OP_SW: u8 = 17;
const OP_HALT: u8 = 20;

fn halt() -> u32 {
    encode(OP_HALT, 0, 0, 0, 0)
}

fn halt_only() -> Vec<u32> {
    vec![halt()]
}

/// `add R0, R0, R0`: retires without effect.
fn nop() -> u32 {
    encode(OP_ADD, 0, 0, 0, 0)
}

/// Prepend `n` nops, delaying a program's real work.
fn delayed(n: usize, body: Vec<u32>) -> Vec<u32> {
    let mut program = vec![nop(); n];
    program.extend(body);
    program
}

#[test]
fn all_cores_halt_and_the_run_terminates() {
    let programs = [halt_only(), halt_only(), halt_only(), halt_only()];
    let mut sim = Simulator::new(programs, MainMemory::new());
    assert!(sim.run(100));
    assert_eq!(sim.cycle(), 5);
    for core in &sim.cores {
        assert_eq!(core.stats.instructions, 1);
        assert_eq!(core.stats.decode_stalls, 0);
        assert_eq!(core.stats.mem_stalls, 0);
    }
}

#[test]
fn modified_block_is_supplied_cache_to_cache() {
    let addr = Addr(0x200);
    // core 0 stores 55 early; core 1 loads it well after the store
    // completed, pulling the block out of core 0's cache
    let programs = [
        vec![
            encode(OP_ADD, 2, 1, 0, 55),
            encode(OP_SW, 2, 1, 0, 0x200),
            halt(),
        ],
        delayed(60, vec![encode(OP_LW, 3, 1, 0, 0x200), halt()]),
        halt_only(),
        halt_only(),
    ];
    let mut sim = Simulator::new(programs, MainMemory::new());

    // one writable copy at most, at every single cycle
    for _ in 0..20_000 {
        if sim.done() {
            break;
        }
        sim.step();
        let owners = sim
            .cores
            .iter()
            .filter(|c| {
                matches!(
                    c.cache.state_of(addr),
                    MesiState::Modified | MesiState::Exclusive
                )
            })
            .count();
        let sharers = sim
            .cores
            .iter()
            .filter(|c| c.cache.state_of(addr) == MesiState::Shared)
            .count();
        assert!(owners <= 1);
        assert!(owners == 0 || sharers == 0);
    }
    assert!(sim.done());

    assert_eq!(sim.cores[1].register(3), 55);
    assert_eq!(sim.cores[0].cache.state_of(addr), MesiState::Shared);
    assert_eq!(sim.cores[1].cache.state_of(addr), MesiState::Shared);
    // the supplying flush also refreshed main memory
    assert_eq!(sim.memory.read(addr), 55);
}

#[test]
fn write_to_a_modified_peer_block_invalidates_the_owner() {
    let addr = Addr(0x300);
    let programs = [
        vec![
            encode(OP_ADD, 2, 1, 0, 1),
            encode(OP_SW, 2, 1, 0, 0x300),
            halt(),
        ],
        delayed(
            60,
            vec![
                encode(OP_ADD, 2, 1, 0, 2),
                encode(OP_SW, 2, 1, 0, 0x300),
                halt(),
            ],
        ),
        halt_only(),
        halt_only(),
    ];
    let mut sim = Simulator::new(programs, MainMemory::new());
    assert!(sim.run(20_000));

    assert_eq!(sim.cores[0].cache.state_of(addr), MesiState::Invalid);
    assert_eq!(sim.cores[1].cache.state_of(addr), MesiState::Modified);
    // core 1's copy carries its own store
    let word = sim.cores[1].cache.dsram()[addr.index() * 4 + addr.offset()];
    assert_eq!(word, 2);
    // core 0's value reached memory through the supplying flush
    assert_eq!(sim.memory.read(addr), 1);
}

#[test]
fn replacing_a_dirty_line_writes_the_victim_back() {
    // 0x000 and 0x400 map to the same line; the dirty first block must
    // land in memory when the second one replaces it
    let programs = [
        vec![
            encode(OP_ADD, 2, 1, 0, 7),
            encode(OP_SW, 2, 1, 0, 0x000),
            encode(OP_LW, 4, 1, 0, 0x400),
            halt(),
        ],
        halt_only(),
        halt_only(),
        halt_only(),
    ];
    let mut image = vec![0; 0x500];
    image[0x400] = 123;
    let mut sim = Simulator::new(programs, MainMemory::from_image(image));
    assert!(sim.run(20_000));

    let core = &sim.cores[0];
    assert_eq!(core.register(4), 123);
    assert_eq!(sim.memory.read(Addr(0x000)), 7);
    assert_eq!(core.cache.state_of(Addr(0x400)), MesiState::Exclusive);
    assert_eq!(core.cache.state_of(Addr(0x000)), MesiState::Invalid);
    // one write miss for the store, one read miss for the replacement
    assert_eq!(core.cache.stats.write_miss, 1);
    assert_eq!(core.cache.stats.read_miss, 1);
}

#[test]
fn four_cores_counting_on_private_blocks_do_not_interfere() {
    // each core increments its own memory word a few times
    fn counter_program(base: u32) -> Vec<u32> {
        let mut p = Vec::new();
        for _ in 0..3 {
            p.push(encode(OP_LW, 2, 1, 0, base)); // R2 = mem[base]
            p.push(encode(OP_ADD, 3, 2, 1, 1)); // R3 = R2 + 1
            p.push(encode(OP_SW, 3, 1, 0, base)); // mem[base] = R3
        }
        p.push(halt());
        p
    }
    let programs = [
        counter_program(0x100),
        counter_program(0x140),
        counter_program(0x180),
        counter_program(0x1C0),
    ];
    let mut sim = Simulator::new(programs, MainMemory::new());
    assert!(sim.run(50_000));

    for (i, base) in [0x100u32, 0x140, 0x180, 0x1C0].iter().enumerate() {
        let core = &sim.cores[i];
        let addr = Addr(*base);
        assert_eq!(core.cache.state_of(addr), MesiState::Modified);
        let word = core.cache.dsram()[addr.index() * 4 + addr.offset()];
        assert_eq!(word, 3, "core {} final count", i);
        // only the first load misses, everything after hits
        assert_eq!(core.cache.stats.read_miss, 1);
        assert_eq!(core.cache.stats.read_hit, 2);
        assert_eq!(core.cache.stats.write_hit, 3);
        assert_eq!(core.cache.stats.write_miss, 0);
    }
}
