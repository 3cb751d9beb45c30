//! # Hart (execution context)
//!
//! One hart is one thread of guest execution: the 32-entry register
//! file, the program counter, retirement/cycle counters, and the
//! cooperative-scheduling state (quantum, in-slice counter, yield
//! flag). Several harts may share one address space; the driver decides
//! the interleaving by choosing which hart to step.
//!
//! The step primitive executes exactly one instruction. Every abnormal
//! condition is absorbed inside it: a fault records a [`Trap`] on the
//! hart, raises the halted flag, and surfaces as the
//! [`StepOutcome::Halted`] variant. A faulting instruction does not
//! retire; the program counter and both counters keep the values they
//! had on entry, and further step calls return immediately.

use crate::fields::{funct3, funct7, imm_b, imm_i, imm_j, imm_s, imm_u, opcode, rd, rs1, rs2};
use crate::mem::{AddressSpace, MemFault};
use crate::opcodes::*;
use crate::registers::Registers;
use crate::syscall::handle_ecall;
use crate::utils::{interpret_i32_as_unsigned, interpret_u32_as_signed};

/// Abnormal condition that halted a hart. Terminal: a trapped hart
/// never resumes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    #[default]
    None,
    Illegal,
    MisalignedLoad,
    MisalignedStore,
    AccessFault,
    Breakpoint,
}

impl From<MemFault> for Trap {
    fn from(fault: MemFault) -> Self {
        match fault {
            MemFault::MisalignedLoad(_) => Trap::MisalignedLoad,
            MemFault::MisalignedStore(_) => Trap::MisalignedStore,
            MemFault::AccessFault(_) => Trap::AccessFault,
        }
    }
}

/// What one call to [`Hart::step`] did. `Halted(Trap::None)` is a
/// clean exit through the exit environment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Ran,
    Yielded,
    Halted(Trap),
}

/// Estimated instruction costs, in ticks. Fixed constants: the timer
/// tests depend on them.
pub const COST_ALU: u32 = 1;
pub const COST_MEM: u32 = 3;
pub const COST_JUMP: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct Hart {
    registers: Registers,
    pc: u32,
    halted: bool,
    exit_code: u32,
    instret: u64,
    cycles: u64,
    quantum: u32,
    slice_count: u32,
    yielded: bool,
    last_trap: Trap,
    tid: u32,
    prio: u32,
}

impl Hart {
    pub fn new(pc: u32) -> Self {
        Self {
            pc,
            prio: 1,
            ..Self::default()
        }
    }

    pub fn x(&self, which: u8) -> u32 {
        self.registers.read(which)
    }

    pub fn set_x(&mut self, which: u8, value: u32) {
        self.registers.write(which, value)
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn exit_code(&self) -> u32 {
        self.exit_code
    }

    pub fn instret(&self) -> u64 {
        self.instret
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn yielded(&self) -> bool {
        self.yielded
    }

    pub fn last_trap(&self) -> Trap {
        self.last_trap
    }

    /// Instructions the hart may retire before being flagged as
    /// yielded; 0 disables preemption
    pub fn set_quantum(&mut self, quantum: u32) {
        self.quantum = quantum;
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    pub fn slice_count(&self) -> u32 {
        self.slice_count
    }

    pub fn set_tid(&mut self, tid: u32) {
        self.tid = tid;
    }

    pub fn tid(&self) -> u32 {
        self.tid
    }

    /// Advisory only; the core never reorders harts by priority
    pub fn set_prio(&mut self, prio: u32) {
        self.prio = prio;
    }

    pub fn prio(&self) -> u32 {
        self.prio
    }

    /// Stop the hart with an exit code (exit call, unknown call id)
    pub(crate) fn halt(&mut self, exit_code: u32) {
        self.halted = true;
        self.exit_code = exit_code;
    }

    /// Ask the driver to rotate to another hart after this step
    pub(crate) fn set_yielded(&mut self) {
        self.yielded = true;
    }

    /// Record a trap and halt. The faulting instruction does not
    /// retire: pc and counters keep their entry values.
    fn trap(&mut self, trap: Trap) -> StepOutcome {
        self.last_trap = trap;
        self.exit_code = interpret_i32_as_unsigned(-1);
        self.halted = true;
        StepOutcome::Halted(trap)
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self, mem: &mut AddressSpace) -> StepOutcome {
        if self.halted {
            return StepOutcome::Halted(self.last_trap);
        }
        self.yielded = false;

        let instr = match mem.load32(self.pc) {
            Ok(instr) => instr,
            Err(fault) => return self.trap(Trap::from(fault)),
        };

        let mut next_pc = self.pc.wrapping_add(4);
        let mut cost = COST_ALU;

        match opcode(instr) {
            OP_IMM => {
                let src = self.x(rs1(instr));
                let imm = imm_i(instr);
                let value = match funct3(instr) {
                    FUNCT3_ADDI => src.wrapping_add(imm),
                    FUNCT3_SLTI => {
                        (interpret_u32_as_signed(src) < interpret_u32_as_signed(imm)) as u32
                    }
                    FUNCT3_SLTIU => (src < imm) as u32,
                    FUNCT3_XORI => src ^ imm,
                    FUNCT3_ORI => src | imm,
                    FUNCT3_ANDI => src & imm,
                    FUNCT3_SLLI => {
                        if funct7(instr) != 0 {
                            return self.trap(Trap::Illegal);
                        }
                        src << (imm & 0x1f)
                    }
                    FUNCT3_SRLI => match funct7(instr) {
                        0 => src >> (imm & 0x1f),
                        FUNCT7_SRA => {
                            interpret_i32_as_unsigned(interpret_u32_as_signed(src) >> (imm & 0x1f))
                        }
                        _ => return self.trap(Trap::Illegal),
                    },
                    _ => return self.trap(Trap::Illegal),
                };
                self.set_x(rd(instr), value);
            }
            OP => {
                let src1 = self.x(rs1(instr));
                let src2 = self.x(rs2(instr));
                let value = match (funct3(instr), funct7(instr)) {
                    (FUNCT3_ADD, 0) => src1.wrapping_add(src2),
                    (FUNCT3_ADD, FUNCT7_SUB) => src1.wrapping_sub(src2),
                    (FUNCT3_SLL, 0) => src1 << (src2 & 0x1f),
                    (FUNCT3_SLT, 0) => {
                        (interpret_u32_as_signed(src1) < interpret_u32_as_signed(src2)) as u32
                    }
                    (FUNCT3_SLTU, 0) => (src1 < src2) as u32,
                    (FUNCT3_XOR, 0) => src1 ^ src2,
                    (FUNCT3_SRL, 0) => src1 >> (src2 & 0x1f),
                    (FUNCT3_SRL, FUNCT7_SRA) => {
                        interpret_i32_as_unsigned(interpret_u32_as_signed(src1) >> (src2 & 0x1f))
                    }
                    (FUNCT3_OR, 0) => src1 | src2,
                    (FUNCT3_AND, 0) => src1 & src2,
                    _ => return self.trap(Trap::Illegal),
                };
                self.set_x(rd(instr), value);
            }
            OP_LUI => self.set_x(rd(instr), imm_u(instr)),
            OP_AUIPC => self.set_x(rd(instr), self.pc.wrapping_add(imm_u(instr))),
            OP_LOAD => {
                if funct3(instr) != FUNCT3_W {
                    return self.trap(Trap::Illegal);
                }
                let addr = self.x(rs1(instr)).wrapping_add(imm_i(instr));
                match mem.load32(addr) {
                    Ok(value) => self.set_x(rd(instr), value),
                    Err(fault) => return self.trap(Trap::from(fault)),
                }
                cost = COST_MEM;
            }
            OP_STORE => {
                if funct3(instr) != FUNCT3_W {
                    return self.trap(Trap::Illegal);
                }
                let addr = self.x(rs1(instr)).wrapping_add(imm_s(instr));
                if let Err(fault) = mem.store32(addr, self.x(rs2(instr))) {
                    return self.trap(Trap::from(fault));
                }
                cost = COST_MEM;
            }
            OP_BRANCH => {
                let src1 = self.x(rs1(instr));
                let src2 = self.x(rs2(instr));
                let taken = match funct3(instr) {
                    FUNCT3_BEQ => src1 == src2,
                    FUNCT3_BNE => src1 != src2,
                    FUNCT3_BLT => interpret_u32_as_signed(src1) < interpret_u32_as_signed(src2),
                    FUNCT3_BGE => interpret_u32_as_signed(src1) >= interpret_u32_as_signed(src2),
                    FUNCT3_BLTU => src1 < src2,
                    FUNCT3_BGEU => src1 >= src2,
                    _ => return self.trap(Trap::Illegal),
                };
                if taken {
                    next_pc = self.pc.wrapping_add(imm_b(instr));
                }
            }
            OP_JAL => {
                // Return-address writeback first, with the original pc
                self.set_x(rd(instr), self.pc.wrapping_add(4));
                next_pc = self.pc.wrapping_add(imm_j(instr));
                cost = COST_JUMP;
            }
            OP_JALR => {
                if funct3(instr) != 0 {
                    return self.trap(Trap::Illegal);
                }
                let target = self.x(rs1(instr)).wrapping_add(imm_i(instr)) & !1;
                self.set_x(rd(instr), self.pc.wrapping_add(4));
                next_pc = target;
                cost = COST_JUMP;
            }
            OP_SYSTEM => match instr {
                ECALL => handle_ecall(self, mem),
                EBREAK => return self.trap(Trap::Breakpoint),
                _ => return self.trap(Trap::Illegal),
            },
            _ => return self.trap(Trap::Illegal),
        }

        self.pc = next_pc;
        self.instret += 1;
        self.cycles += u64::from(cost);
        mem.tick(cost);

        if self.quantum > 0 {
            self.slice_count += 1;
            if self.slice_count >= self.quantum {
                self.slice_count = 0;
                self.yielded = true;
            }
        }

        if self.halted {
            StepOutcome::Halted(self.last_trap)
        } else if self.yielded {
            StepOutcome::Yielded
        } else {
            StepOutcome::Ran
        }
    }
}
