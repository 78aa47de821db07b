//! Pseudo-register elimination
//!
//! Scans a function's instructions in order and replaces every pseudo
//! operand with a 4-byte stack slot at a negative offset from `%rbp`.
//! The first pseudo seen lands at -4, the next at -8, and so on; a
//! pseudo seen again reuses its slot.

use super::asm::{AsmFunction, Instruction, Operand};
use std::collections::HashMap;

/// Rewrite pseudos in place and return the total slot bytes used.
pub(super) fn assign_stack_slots(function: &mut AsmFunction) -> i64 {
    let mut slots: HashMap<String, i64> = HashMap::new();

    for instruction in &mut function.instructions {
        match instruction {
            Instruction::Mov { src, dst }
            | Instruction::Binary { src, dst, .. }
            | Instruction::Cmp { src, dst } => {
                replace(src, &mut slots);
                replace(dst, &mut slots);
            }
            Instruction::Unary { operand, .. }
            | Instruction::Idiv(operand)
            | Instruction::SetCC { operand, .. }
            | Instruction::Push(operand) => replace(operand, &mut slots),
            Instruction::Cdq
            | Instruction::Jmp(_)
            | Instruction::JmpCC { .. }
            | Instruction::Label(_)
            | Instruction::Call { .. }
            | Instruction::Ret
            | Instruction::AllocateStack(_)
            | Instruction::DeallocateStack(_) => {}
        }
    }

    slots.len() as i64 * 4
}

fn replace(operand: &mut Operand, slots: &mut HashMap<String, i64>) {
    if let Operand::Pseudo(name) = operand {
        let next = -4 * (slots.len() as i64 + 1);
        let offset = *slots.entry(name.clone()).or_insert(next);
        *operand = Operand::Stack(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::super::asm::*;
    use super::*;

    fn pseudo(name: &str) -> Operand {
        Operand::Pseudo(name.to_string())
    }

    #[test]
    fn test_slots_assigned_in_first_use_order() {
        let mut function = AsmFunction {
            name: "f".to_string(),
            instructions: vec![
                Instruction::Mov {
                    src: Operand::Imm(1),
                    dst: pseudo("a.0"),
                },
                Instruction::Mov {
                    src: pseudo("a.0"),
                    dst: pseudo("tmp.0"),
                },
                Instruction::Unary {
                    op: UnaryOp::Neg,
                    operand: pseudo("tmp.0"),
                },
            ],
        };
        let size = assign_stack_slots(&mut function);
        assert_eq!(size, 8);
        assert_eq!(
            function.instructions,
            vec![
                Instruction::Mov {
                    src: Operand::Imm(1),
                    dst: Operand::Stack(-4),
                },
                Instruction::Mov {
                    src: Operand::Stack(-4),
                    dst: Operand::Stack(-8),
                },
                Instruction::Unary {
                    op: UnaryOp::Neg,
                    operand: Operand::Stack(-8),
                },
            ]
        );
    }

    #[test]
    fn test_no_pseudos_no_slots() {
        let mut function = AsmFunction {
            name: "f".to_string(),
            instructions: vec![
                Instruction::Mov {
                    src: Operand::Imm(2),
                    dst: Operand::reg(Reg::AX),
                },
                Instruction::Ret,
            ],
        };
        assert_eq!(assign_stack_slots(&mut function), 0);
    }
}
