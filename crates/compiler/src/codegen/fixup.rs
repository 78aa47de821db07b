//! Operand legalization
//!
//! x86-64 refuses several operand combinations the naive lowering
//! produces, most importantly memory-to-memory forms. This pass rewrites
//! each offending instruction through the scratch registers: `%r10d` for
//! sources, `%r11d` for destinations, and `%ecx` for shift counts.

use super::asm::{BinaryOp, Instruction, Operand, Reg, RegWidth};

pub(super) fn legalize(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        match instruction {
            Instruction::Mov { src, dst } if src.is_memory() && dst.is_memory() => {
                out.push(Instruction::Mov {
                    src,
                    dst: Operand::reg(Reg::R10),
                });
                out.push(Instruction::Mov {
                    src: Operand::reg(Reg::R10),
                    dst,
                });
            }
            // idiv cannot take an immediate.
            Instruction::Idiv(src @ Operand::Imm(_)) => {
                out.push(Instruction::Mov {
                    src,
                    dst: Operand::reg(Reg::R10),
                });
                out.push(Instruction::Idiv(Operand::reg(Reg::R10)));
            }
            Instruction::Cmp { src, dst } if src.is_memory() && dst.is_memory() => {
                out.push(Instruction::Mov {
                    src,
                    dst: Operand::reg(Reg::R10),
                });
                out.push(Instruction::Cmp {
                    src: Operand::reg(Reg::R10),
                    dst,
                });
            }
            // The second cmp operand cannot be a literal.
            Instruction::Cmp {
                src,
                dst: dst @ Operand::Imm(_),
            } => {
                out.push(Instruction::Mov {
                    src: dst,
                    dst: Operand::reg(Reg::R11),
                });
                out.push(Instruction::Cmp {
                    src,
                    dst: Operand::reg(Reg::R11),
                });
            }
            Instruction::Binary { op, src, dst } if op.is_shift() && src.is_memory() => {
                // A variable shift count only works out of %cl.
                out.push(Instruction::Mov {
                    src,
                    dst: Operand::reg(Reg::CX),
                });
                out.push(Instruction::Binary {
                    op,
                    src: Operand::Reg(Reg::CX, RegWidth::One),
                    dst,
                });
            }
            Instruction::Binary {
                op: BinaryOp::Mult,
                src,
                dst,
            } if dst.is_memory() => {
                // imul cannot write to memory.
                out.push(Instruction::Mov {
                    src: dst.clone(),
                    dst: Operand::reg(Reg::R11),
                });
                out.push(Instruction::Binary {
                    op: BinaryOp::Mult,
                    src,
                    dst: Operand::reg(Reg::R11),
                });
                out.push(Instruction::Mov {
                    src: Operand::reg(Reg::R11),
                    dst,
                });
            }
            Instruction::Binary { op, src, dst } if src.is_memory() && dst.is_memory() => {
                out.push(Instruction::Mov {
                    src,
                    dst: Operand::reg(Reg::R10),
                });
                out.push(Instruction::Binary {
                    op,
                    src: Operand::reg(Reg::R10),
                    dst,
                });
            }
            other => out.push(other),
        }
    }

    out
}
