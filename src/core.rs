// one processor core: 5-stage in-order pipeline over a private cache

use log::{debug, trace};

use crate::alu;
use crate::bus::Bus;
use crate::cache::Cache;
use crate::commons::{Addr, BUBBLE, IMEM_WORDS, MEM_WORDS};
use crate::pipeline::{ExMem, IdEx, IfId, MemWb, PipelineRegs};
use crate::register::Dff;

const OP_JAL: u8 = 15;
const OP_LW: u8 = 16;
const OP_SW: u8 = 17;
const OP_HALT: u8 = 20;
const PC_MASK: u32 = (IMEM_WORDS - 1) as u32;
const WORD_ADDR_MASK: u32 = (MEM_WORDS - 1) as u32;

fn sign_extend12(imm: u32) -> u32 {
    (((imm << 20) as i32) >> 20) as u32
}

/// Runtime counters, dumped at the end of the run.
#[derive(Clone, Copy, Default, Debug)]
pub struct CoreStats {
    pub cycles: u64,
    pub instructions: u64,
    pub decode_stalls: u64,
    pub mem_stalls: u64,
}

/// A single core. Stages run once per cycle in reverse order, so each
/// stage reads the latch values its predecessor committed on the previous
/// edge. There is no forwarding: data hazards resolve by stalling in
/// decode, memory stalls freeze everything upstream of writeback.
pub struct Core {
    pub id: usize,
    pc: Dff,
    registers: [Dff; 16],
    imem: Vec<u32>,
    pub pipe: PipelineRegs,
    pub cache: Cache,
    halted: bool,
    /// Decode redirected the pc this cycle; fetch must not advance it.
    redirect: bool,
    pub stats: CoreStats,
}

impl Core {
    pub fn new(id: usize, image: Vec<u32>) -> Self {
        let mut imem = image;
        imem.resize(IMEM_WORDS, 0);
        Core {
            id,
            pc: Dff::new(),
            registers: Default::default(),
            imem,
            pipe: PipelineRegs::new(),
            cache: Cache::new(id),
            halted: false,
            redirect: false,
            stats: CoreStats::default(),
        }
    }

    pub fn register(&self, i: usize) -> u32 {
        self.registers[i].q()
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// The core is finished once halt has been decoded and every younger
    /// in-flight instruction has drained.
    pub fn done(&self) -> bool {
        self.halted && self.pipe.is_empty()
    }

    /// Per-stage pcs for the trace line, fetch through writeback.
    pub fn stage_pcs(&self) -> [u32; 5] {
        [
            if self.halted { BUBBLE } else { self.pc.q() },
            self.pipe.if_id.q().pc,
            self.pipe.id_ex.q().pc,
            self.pipe.ex_mem.q().pc,
            self.pipe.mem_wb.q().pc,
        ]
    }

    /// One processor cycle. The cache's bus-side duties (snoop, fill,
    /// request restating) are clocked separately by the system.
    pub fn clock(&mut self, bus: &mut Bus) {
        if self.done() {
            return;
        }
        self.stats.cycles += 1;

        self.pipe.enable_all();
        self.pc.set_enable(true);

        self.writeback();
        let stalled = self.memory(bus);
        if !stalled {
            self.execute();
            self.decode();
            self.fetch();
        }

        self.pipe.commit_all();
        self.pc.commit();
        for r in &mut self.registers {
            r.commit();
        }
    }

    fn writeback(&mut self) {
        let wb = self.pipe.mem_wb.q();
        if wb.pc == BUBBLE {
            return;
        }
        if wb.write_reg && wb.rd >= 2 {
            self.registers[wb.rd].set_next(wb.value);
        }
        self.stats.instructions += 1;
        trace!("core {}: retired pc {:#05x}", self.id, wb.pc);
    }

    /// Returns true when the cache kept the stage waiting; everything
    /// upstream freezes for this cycle.
    fn memory(&mut self, bus: &mut Bus) -> bool {
        let ex = self.pipe.ex_mem.q();
        if ex.pc == BUBBLE {
            self.pipe.mem_wb.set_next(MemWb::default());
            return false;
        }

        let addr = Addr(ex.alu_result & WORD_ADDR_MASK);
        if ex.is_load {
            let (data, ready) = self.cache.read(bus, addr);
            if !ready {
                return self.mem_stall();
            }
            self.pipe.mem_wb.set_next(MemWb {
                pc: ex.pc,
                rd: ex.rd,
                value: data.unwrap_or(0),
                write_reg: true,
            });
        } else if ex.is_store {
            if !self.cache.write(bus, addr, ex.store_value) {
                return self.mem_stall();
            }
            self.pipe.mem_wb.set_next(MemWb {
                pc: ex.pc,
                rd: ex.rd,
                value: 0,
                write_reg: false,
            });
        } else {
            self.pipe.mem_wb.set_next(MemWb {
                pc: ex.pc,
                rd: ex.rd,
                value: ex.alu_result,
                write_reg: ex.write_reg,
            });
        }
        false
    }

    fn mem_stall(&mut self) -> bool {
        self.stats.mem_stalls += 1;
        self.pipe.mem_wb.set_next(MemWb::default());
        self.pipe.ex_mem.set_enable(false);
        self.pipe.id_ex.set_enable(false);
        self.pipe.if_id.set_enable(false);
        self.pc.set_enable(false);
        true
    }

    fn execute(&mut self) {
        let id = self.pipe.id_ex.q();
        if id.pc == BUBBLE {
            self.pipe.ex_mem.set_next(ExMem::default());
            return;
        }
        let mut out = ExMem {
            pc: id.pc,
            alu_result: 0,
            rd: id.rd,
            store_value: 0,
            is_load: false,
            is_store: false,
            write_reg: id.write_reg,
        };
        match id.opcode {
            OP_JAL => {
                // link value, the jump itself happened in decode
                out.alu_result = id.pc.wrapping_add(1);
            }
            OP_LW => {
                out.alu_result = id.rs_value.wrapping_add(id.rt_value);
                out.is_load = true;
            }
            OP_SW => {
                out.alu_result = id.rs_value.wrapping_add(id.rt_value);
                out.store_value = id.rd_value;
                out.is_store = true;
            }
            op if op <= 8 => {
                out.alu_result = alu::execute(op, id.rs_value, id.rt_value);
            }
            // branches and halt pass through as no-ops
            _ => {}
        }
        self.pipe.ex_mem.set_next(out);
    }

    /// Source registers an instruction reads in decode. Branches and jal
    /// read rd for the jump target, sw reads rd for the store data.
    /// Reserved opcodes read nothing and never stall.
    fn source_regs(opcode: u8, rd: usize, rs: usize, rt: usize) -> [Option<usize>; 3] {
        match opcode {
            0..=8 | OP_LW => [Some(rs), Some(rt), None],
            9..=14 | OP_SW => [Some(rs), Some(rt), Some(rd)],
            OP_JAL => [Some(rd), None, None],
            _ => [None, None, None],
        }
    }

    /// True if any in-flight instruction still has a pending write to
    /// `src`. R0 and R1 never hazard.
    fn hazard_on(&self, src: usize) -> bool {
        if src < 2 {
            return false;
        }
        let id = self.pipe.id_ex.q();
        let ex = self.pipe.ex_mem.q();
        let wb = self.pipe.mem_wb.q();
        (id.pc != BUBBLE && id.write_reg && id.rd == src)
            || (ex.pc != BUBBLE && ex.write_reg && ex.rd == src)
            || (wb.pc != BUBBLE && wb.write_reg && wb.rd == src)
    }

    fn decode(&mut self) {
        let if_id = self.pipe.if_id.q();
        if if_id.pc == BUBBLE {
            self.pipe.id_ex.set_next(IdEx::default());
            return;
        }

        let instr = if_id.instruction;
        let opcode = (instr >> 24) as u8;
        let rd = ((instr >> 20) & 0xF) as usize;
        let rs = ((instr >> 16) & 0xF) as usize;
        let rt = ((instr >> 12) & 0xF) as usize;
        let imm = instr & 0xFFF;

        // R1 is the combinational immediate-scratch register
        self.registers[1].poke(sign_extend12(imm));

        let blocked = Self::source_regs(opcode, rd, rs, rt)
            .iter()
            .flatten()
            .any(|&src| self.hazard_on(src));
        if blocked {
            self.stats.decode_stalls += 1;
            self.pipe.id_ex.set_next(IdEx::default());
            self.pipe.if_id.set_enable(false);
            self.pc.set_enable(false);
            return;
        }

        let rs_value = self.registers[rs].q();
        let rt_value = self.registers[rt].q();
        let rd_value = self.registers[rd].q();

        let mut out = IdEx {
            pc: if_id.pc,
            opcode,
            rd,
            rs_value,
            rt_value,
            rd_value,
            write_reg: false,
        };

        match opcode {
            OP_HALT => {
                self.halted = true;
                debug!("core {}: halt at pc {:#05x}", self.id, if_id.pc);
            }
            9..=14 => {
                let taken = match opcode {
                    9 => rs_value == rt_value,
                    10 => rs_value != rt_value,
                    11 => (rs_value as i32) < (rt_value as i32),
                    12 => (rs_value as i32) > (rt_value as i32),
                    13 => (rs_value as i32) <= (rt_value as i32),
                    _ => (rs_value as i32) >= (rt_value as i32),
                };
                if taken {
                    self.pc.set_next(rd_value & PC_MASK);
                    self.redirect = true;
                }
            }
            OP_JAL => {
                self.pc.set_next(rd_value & PC_MASK);
                self.redirect = true;
                out.rd = 15;
                out.write_reg = true;
            }
            OP_LW => out.write_reg = true,
            OP_SW => {}
            op if op <= 8 => out.write_reg = true,
            // reserved opcodes travel as no-ops
            _ => {}
        }
        self.pipe.id_ex.set_next(out);
    }

    fn fetch(&mut self) {
        if self.halted {
            self.pipe.if_id.set_next(IfId::default());
            return;
        }
        let pc = self.pc.q();
        self.pipe.if_id.set_next(IfId {
            pc,
            instruction: self.imem[(pc & PC_MASK) as usize],
        });
        if self.redirect {
            // the slot after the branch still executes; the redirect
            // only suppresses the pc increment, decode already set it
            self.redirect = false;
        } else {
            self.pc.set_next((pc + 1) & PC_MASK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(op: u8, rd: usize, rs: usize, rt: usize, imm: u32) -> u32 {
        ((op as u32) << 24)
            | ((rd as u32) << 20)
            | ((rs as u32) << 16)
            | ((rt as u32) << 12)
            | (imm & 0xFFF)
    }

    fn run(program: Vec<u32>) -> Core {
        let mut core = Core::new(0, program);
        let mut bus = Bus::new();
        for _ in 0..1000 {
            if core.done() {
                break;
            }
            core.clock(&mut bus);
        }
        assert!(core.done(), "program did not halt");
        core
    }

    #[test]
    fn halt_alone_drains_in_five_cycles() {
        let core = run(vec![encode(OP_HALT, 0, 0, 0, 0)]);
        assert_eq!(core.stats.cycles, 5);
        assert_eq!(core.stats.instructions, 1);
    }

    #[test]
    fn immediate_moves_through_r1() {
        // add R2, R1, R0 with imm 7
        let core = run(vec![
            encode(0, 2, 1, 0, 7),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(2), 7);
    }

    #[test]
    fn r0_stays_zero() {
        let core = run(vec![
            encode(0, 0, 1, 0, 123),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(0), 0);
    }

    #[test]
    fn dependent_pair_stalls_three_cycles() {
        // add R2, R1, R0 (imm 7); add R5, R2, R1 (imm 3)
        let core = run(vec![
            encode(0, 2, 1, 0, 7),
            encode(0, 5, 2, 1, 3),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(2), 7);
        assert_eq!(core.register(5), 10);
        assert_eq!(core.stats.decode_stalls, 3);
        assert_eq!(core.stats.instructions, 3);
    }

    #[test]
    fn negative_immediate_sign_extends() {
        // add R2, R1, R0 with imm -1
        let core = run(vec![
            encode(0, 2, 1, 0, 0xFFF),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(2), u32::MAX);
    }

    #[test]
    fn taken_branch_executes_the_delay_slot_then_jumps() {
        // beq R0, R0 -> target in R1 (imm 4); the instruction after the
        // branch is already fetched and still executes, the ones past it
        // are never reached
        let core = run(vec![
            encode(9, 1, 0, 0, 4),
            encode(0, 3, 1, 0, 0xAA),
            encode(0, 3, 1, 0, 0xBB),
            encode(0, 3, 1, 0, 0xCC),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(3), 0xAA);
        // branch, delay slot and halt retire
        assert_eq!(core.stats.instructions, 3);
    }

    #[test]
    fn untaken_branch_falls_through() {
        let core = run(vec![
            encode(10, 1, 0, 0, 4), // bne R0, R0 never taken
            encode(0, 3, 1, 0, 0x55),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(3), 0x55);
    }

    #[test]
    fn jal_links_in_r15_and_jumps() {
        // jal with target in R1 (imm 3): link is pc + 1 = 1; the slot
        // after the jump executes, the one past it is skipped
        let core = run(vec![
            encode(OP_JAL, 1, 0, 0, 3),
            encode(0, 4, 1, 0, 0x11),
            encode(0, 4, 1, 0, 0x22),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(15), 1);
        assert_eq!(core.register(4), 0x11);
    }

    #[test]
    fn signed_compare_branches() {
        // R2 = -1; blt R2, R0 -> taken (target 5 in R1); a nop sits in
        // the slot after the branch
        let core = run(vec![
            encode(0, 2, 1, 0, 0xFFF),
            encode(11, 1, 2, 0, 5),
            encode(0, 0, 0, 0, 0),
            encode(0, 6, 1, 0, 0x77),
            encode(0, 6, 1, 0, 0x77),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(6), 0);
    }

    #[test]
    fn reserved_opcode_retires_without_touching_registers() {
        // opcode 18 is undefined: rd survives, nothing stalls on it
        let core = run(vec![
            encode(0, 2, 1, 0, 5),
            encode(18, 2, 2, 2, 0),
            encode(OP_HALT, 0, 0, 0, 0),
        ]);
        assert_eq!(core.register(2), 5);
        assert_eq!(core.stats.decode_stalls, 0);
        assert_eq!(core.stats.instructions, 3);
    }
}
