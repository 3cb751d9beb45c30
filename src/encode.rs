//! Instruction-word constructors. Tests and the built-in demos build
//! guest programs out of these instead of hand-assembled hex. Each
//! mnemonic gets a macro (`addi!`, `beq!`, ...) taking register names
//! written as identifiers (`x0`-`x31`).

use crate::utils::{extract_field, interpret_i32_as_unsigned};

pub use crate::opcodes::*;

/// Make an I-type instruction. Only produces a valid I-type
/// instruction if the arguments are in range.
pub fn itype(imm: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    imm << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
}

/// Make an U- or J-type instruction (if you are making a J-type
/// instruction, construct the immediate field with jtype_imm_field)
pub fn ujtype(imm: u32, rd: u32, opcode: u32) -> u32 {
    imm << 12 | rd << 7 | opcode
}

/// Make an R- or S-type instruction. These instructions have the same
/// number of fields of the same size. The meaning of a and b is:
///
/// R-type: a = funct7, b = rd
/// S-type: a = imm[11:5], b = imm[4:0]
pub fn rstype(a: u32, rs2: u32, rs1: u32, funct3: u32, b: u32, opcode: u32) -> u32 {
    a << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | b << 7 | opcode
}

/// Convert a RISC-V register name (e.g. x3) to the register value
/// (e.g. 3)
pub fn reg_num_impl(reg_name: &str) -> Result<u32, &'static str> {
    if reg_name.len() != 2 && reg_name.len() != 3 {
        return Err("register name must be exactly two or three characters");
    }
    let mut characters = reg_name.chars();
    if characters.next().unwrap() != 'x' {
        return Err("register name must begin with x");
    }
    let n = characters
        .collect::<String>()
        .parse::<u32>()
        .map_err(|_| "final one or two digits of register name should be numbers")?;
    if n >= 32 {
        return Err("register number must be below 32");
    }
    Ok(n)
}

#[macro_export]
macro_rules! reg_num {
    ($reg:expr) => {
        reg_num_impl(std::stringify!($reg))?
    };
}
pub use reg_num;

/// The shift-by-immediate instructions use I-type, but with a special
/// encoding of the immediate that uses the lower 5 bits for the shift
/// amount (shamt) and the upper 7 bits to distinguish between
/// arithmetical and logical right shift
pub fn shifts_imm_field(shamt: u32, upper: u32) -> u32 {
    let shamt = extract_field(shamt, 4, 0);
    (upper << 5) | shamt
}

/// Takes an immediate and shuffles it into the format required for the
/// 20-bit field of the U-type instruction (making it J-type)
pub fn jtype_imm_field(imm: i32) -> u32 {
    let imm = interpret_i32_as_unsigned(imm);
    let imm20 = extract_field(imm, 20, 20);
    let imm19_12 = extract_field(imm, 19, 12);
    let imm11 = extract_field(imm, 11, 11);
    let imm10_1 = extract_field(imm, 10, 1);
    (imm20 << 19) | (imm10_1 << 9) | (imm11 << 8) | imm19_12
}

/// Returns (a, b) suitable for use with rstype for the conditional
/// branch instructions (btype)
pub fn btype_imm_fields(imm: i32) -> (u32, u32) {
    let imm = interpret_i32_as_unsigned(imm);
    let imm12 = extract_field(imm, 12, 12);
    let imm11 = extract_field(imm, 11, 11);
    let imm10_5 = extract_field(imm, 10, 5);
    let imm4_1 = extract_field(imm, 4, 1);
    let a = (imm12 << 6) | imm10_5;
    let b = (imm4_1 << 1) | imm11;
    (a, b)
}

macro_rules! itype_instr {
    ($instruction:ident, $funct3:expr, $opcode:expr) => {
        #[macro_export]
        macro_rules! $instruction {
            ($rd:ident, $rs1:expr, $imm:expr) => {{
                use crate::utils::interpret_i32_as_unsigned;
                let rd = reg_num!($rd);
                let rs1 = reg_num!($rs1);
                let imm = interpret_i32_as_unsigned($imm.into());
                itype(imm, rs1, $funct3, rd, $opcode)
            }};
        }
        pub use $instruction;
    };
}

macro_rules! shift_instr {
    ($instruction:ident, $upper:expr, $funct3:expr, $opcode:expr) => {
        #[macro_export]
        macro_rules! $instruction {
            ($rd:ident, $rs1:expr, $imm:expr) => {{
                let rd = reg_num!($rd);
                let rs1 = reg_num!($rs1);
                let imm = shifts_imm_field($imm, $upper);
                itype(imm, rs1, $funct3, rd, $opcode)
            }};
        }
        pub use $instruction;
    };
}

macro_rules! rtype_instr {
    ($instruction:ident, $funct7:expr, $funct3:expr, $opcode:expr) => {
        #[macro_export]
        macro_rules! $instruction {
            ($rd:ident, $rs1:expr, $rs2:expr) => {{
                let rd = reg_num!($rd);
                let rs1 = reg_num!($rs1);
                let rs2 = reg_num!($rs2);
                rstype($funct7, rs2, rs1, $funct3, rd, $opcode)
            }};
        }
        pub use $instruction;
    };
}

macro_rules! stype_instr {
    ($instruction:ident, $funct3:expr, $opcode:expr) => {
        #[macro_export]
        macro_rules! $instruction {
            ($rs2:expr, $rs1:expr, $imm:expr) => {{
                use crate::utils::{extract_field, interpret_i32_as_unsigned};
                let rs1 = reg_num!($rs1);
                let rs2 = reg_num!($rs2);
                let imm = interpret_i32_as_unsigned($imm);
                let imm11_5 = extract_field(imm, 11, 5);
                let imm4_0 = extract_field(imm, 4, 0);
                rstype(imm11_5, rs2, rs1, $funct3, imm4_0, $opcode)
            }};
        }
        pub use $instruction;
    };
}

macro_rules! btype_instr {
    ($instruction:ident, $funct3:expr, $opcode:expr) => {
        #[macro_export]
        macro_rules! $instruction {
            ($rs1:expr, $rs2:expr, $imm:expr) => {{
                let rs1 = reg_num!($rs1);
                let rs2 = reg_num!($rs2);
                let (a, b) = btype_imm_fields($imm);
                rstype(a, rs2, rs1, $funct3, b, $opcode)
            }};
        }
        pub use $instruction;
    };
}

/// Note: in these instructions (LUI and AUIPC), the immediate imm is
/// already the upper 20 bits that will be loaded -- it will not be
/// shifted up.
macro_rules! utype_instr {
    ($instruction:ident, $opcode:expr) => {
        #[macro_export]
        macro_rules! $instruction {
            ($rd:expr, $imm:expr) => {{
                use crate::utils::interpret_i32_as_unsigned;
                let rd = reg_num!($rd);
                let imm = interpret_i32_as_unsigned($imm);
                ujtype(imm, rd, $opcode)
            }};
        }
        pub use $instruction;
    };
}

#[macro_export]
macro_rules! jal {
    ($rd:expr, $imm:expr) => {{
        let rd = reg_num!($rd);
        let imm = jtype_imm_field($imm);
        ujtype(imm, rd, OP_JAL)
    }};
}
pub use jal;

#[macro_export]
macro_rules! ecall {
    () => {
        $crate::opcodes::ECALL
    };
}
pub use ecall;

#[macro_export]
macro_rules! ebreak {
    () => {
        $crate::opcodes::EBREAK
    };
}
pub use ebreak;

utype_instr!(lui, OP_LUI);
utype_instr!(auipc, OP_AUIPC);
// jal is defined above
itype_instr!(jalr, 0b000, OP_JALR);

// Conditional branches
btype_instr!(beq, FUNCT3_BEQ, OP_BRANCH);
btype_instr!(bne, FUNCT3_BNE, OP_BRANCH);
btype_instr!(blt, FUNCT3_BLT, OP_BRANCH);
btype_instr!(bge, FUNCT3_BGE, OP_BRANCH);
btype_instr!(bltu, FUNCT3_BLTU, OP_BRANCH);
btype_instr!(bgeu, FUNCT3_BGEU, OP_BRANCH);

// Word load and store
itype_instr!(lw, FUNCT3_W, OP_LOAD);
stype_instr!(sw, FUNCT3_W, OP_STORE);

// Integer register-immediate instructions
itype_instr!(addi, FUNCT3_ADDI, OP_IMM);
itype_instr!(slti, FUNCT3_SLTI, OP_IMM);
itype_instr!(sltiu, FUNCT3_SLTIU, OP_IMM);
itype_instr!(xori, FUNCT3_XORI, OP_IMM);
itype_instr!(ori, FUNCT3_ORI, OP_IMM);
itype_instr!(andi, FUNCT3_ANDI, OP_IMM);
shift_instr!(slli, 0b0000000, FUNCT3_SLLI, OP_IMM);
shift_instr!(srli, 0b0000000, FUNCT3_SRLI, OP_IMM);
shift_instr!(srai, 0b0100000, FUNCT3_SRLI, OP_IMM);

// Integer register-register instructions
rtype_instr!(add, 0b0000000, FUNCT3_ADD, OP);
rtype_instr!(sub, FUNCT7_SUB, FUNCT3_ADD, OP);
rtype_instr!(sll, 0b0000000, FUNCT3_SLL, OP);
rtype_instr!(slt, 0b0000000, FUNCT3_SLT, OP);
rtype_instr!(sltu, 0b0000000, FUNCT3_SLTU, OP);
rtype_instr!(xor, 0b0000000, FUNCT3_XOR, OP);
rtype_instr!(srl, 0b0000000, FUNCT3_SRL, OP);
rtype_instr!(sra, FUNCT7_SRA, FUNCT3_SRL, OP);
rtype_instr!(or, 0b0000000, FUNCT3_OR, OP);
rtype_instr!(and, 0b0000000, FUNCT3_AND, OP);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{imm_b, imm_i, imm_j, imm_s};
    use crate::utils::interpret_i32_as_unsigned;

    #[test]
    fn check_known_words() -> Result<(), &'static str> {
        assert_eq!(addi!(x1, x0, 5), 0x0050_0093);
        assert_eq!(addi!(x2, x1, 10), 0x00a0_8113);
        assert_eq!(ecall!(), 0x0000_0073);
        assert_eq!(ebreak!(), 0x0010_0073);
        Ok(())
    }

    #[test]
    fn check_btype_shuffle_round_trips() -> Result<(), &'static str> {
        for offset in [-4096, -8, -2, 0, 2, 16, 4094] {
            let word = beq!(x1, x2, offset);
            assert_eq!(imm_b(word), interpret_i32_as_unsigned(offset));
        }
        Ok(())
    }

    #[test]
    fn check_jtype_shuffle_round_trips() -> Result<(), &'static str> {
        for offset in [-1048576, -16, -2, 0, 2, 2048, 1048574] {
            let word = jal!(x1, offset);
            assert_eq!(imm_j(word), interpret_i32_as_unsigned(offset));
        }
        Ok(())
    }

    #[test]
    fn check_stype_shuffle_round_trips() -> Result<(), &'static str> {
        for offset in [-2048, -16, -1, 0, 1, 16, 2047] {
            let word = sw!(x1, x2, offset);
            assert_eq!(imm_s(word), interpret_i32_as_unsigned(offset));
        }
        Ok(())
    }

    #[test]
    fn check_itype_immediate_round_trips() -> Result<(), &'static str> {
        for imm in [-2048i32, -23, 0, 5, 2047] {
            let word = addi!(x1, x2, imm);
            assert_eq!(imm_i(word), interpret_i32_as_unsigned(imm));
        }
        Ok(())
    }

    #[test]
    fn check_register_name_parsing() {
        assert_eq!(reg_num_impl("x0"), Ok(0));
        assert_eq!(reg_num_impl("x31"), Ok(31));
        assert!(reg_num_impl("t0").is_err());
        assert!(reg_num_impl("x32").is_err());
    }
}
