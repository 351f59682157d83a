// inter-stage pipeline latches

use crate::commons::BUBBLE;
use crate::register::Latch;

/// Fetched instruction on its way to decode. `pc == BUBBLE` marks an
/// empty stage slot.
#[derive(Clone, Copy, Debug)]
pub struct IfId {
    pub pc: u32,
    pub instruction: u32,
}

impl Default for IfId {
    fn default() -> Self {
        IfId {
            pc: BUBBLE,
            instruction: 0,
        }
    }
}

/// Decoded operands headed for execute. Register reads happen in decode,
/// so only values travel past this point; `rd` is kept as an index for
/// the eventual writeback.
#[derive(Clone, Copy, Debug)]
pub struct IdEx {
    pub pc: u32,
    pub opcode: u8,
    pub rd: usize,
    pub rs_value: u32,
    pub rt_value: u32,
    /// Value of the rd register, used as the store data for sw.
    pub rd_value: u32,
    pub write_reg: bool,
}

impl Default for IdEx {
    fn default() -> Self {
        IdEx {
            pc: BUBBLE,
            opcode: 0,
            rd: 0,
            rs_value: 0,
            rt_value: 0,
            rd_value: 0,
            write_reg: false,
        }
    }
}

/// ALU result headed for the memory stage. For lw/sw the result is the
/// effective address.
#[derive(Clone, Copy, Debug)]
pub struct ExMem {
    pub pc: u32,
    pub alu_result: u32,
    pub rd: usize,
    pub store_value: u32,
    pub is_load: bool,
    pub is_store: bool,
    pub write_reg: bool,
}

impl Default for ExMem {
    fn default() -> Self {
        ExMem {
            pc: BUBBLE,
            alu_result: 0,
            rd: 0,
            store_value: 0,
            is_load: false,
            is_store: false,
            write_reg: false,
        }
    }
}

/// Writeback payload.
#[derive(Clone, Copy, Debug)]
pub struct MemWb {
    pub pc: u32,
    pub rd: usize,
    pub value: u32,
    pub write_reg: bool,
}

impl Default for MemWb {
    fn default() -> Self {
        MemWb {
            pc: BUBBLE,
            rd: 0,
            value: 0,
            write_reg: false,
        }
    }
}

/// The four latches between the five stages.
#[derive(Default)]
pub struct PipelineRegs {
    pub if_id: Latch<IfId>,
    pub id_ex: Latch<IdEx>,
    pub ex_mem: Latch<ExMem>,
    pub mem_wb: Latch<MemWb>,
}

impl PipelineRegs {
    pub fn new() -> Self {
        PipelineRegs::default()
    }

    /// Stages re-disable latches selectively after this during stalls.
    pub fn enable_all(&mut self) {
        self.if_id.set_enable(true);
        self.id_ex.set_enable(true);
        self.ex_mem.set_enable(true);
        self.mem_wb.set_enable(true);
    }

    pub fn commit_all(&mut self) {
        self.if_id.commit();
        self.id_ex.commit();
        self.ex_mem.commit();
        self.mem_wb.commit();
    }

    /// True when no instruction occupies any of the latched stages.
    pub fn is_empty(&self) -> bool {
        self.if_id.q().pc == BUBBLE
            && self.id_ex.q().pc == BUBBLE
            && self.ex_mem.q().pc == BUBBLE
            && self.mem_wb.q().pc == BUBBLE
    }
}
