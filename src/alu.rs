// combinational ALU

/// Arithmetic operations, decoded from opcodes 0..=8.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Mul,
    Sll,
    Sra,
    Srl,
}

impl AluOp {
    pub fn from_opcode(opcode: u8) -> Option<AluOp> {
        match opcode {
            0 => Some(AluOp::Add),
            1 => Some(AluOp::Sub),
            2 => Some(AluOp::And),
            3 => Some(AluOp::Or),
            4 => Some(AluOp::Xor),
            5 => Some(AluOp::Mul),
            6 => Some(AluOp::Sll),
            7 => Some(AluOp::Sra),
            8 => Some(AluOp::Srl),
            _ => None,
        }
    }
}

/// Stateless ALU evaluation. An opcode outside the ALU range drives 0,
/// like a datapath with an undefined function code.
pub fn execute(opcode: u8, a: u32, b: u32) -> u32 {
    let op = match AluOp::from_opcode(opcode) {
        Some(op) => op,
        None => return 0,
    };
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Mul => a.wrapping_mul(b),
        // shift distance is the low 5 bits only
        AluOp::Sll => a << (b & 0x1F),
        AluOp::Sra => ((a as i32) >> (b & 0x1F)) as u32,
        AluOp::Srl => a >> (b & 0x1F),
    }
}
