//! Code generation
//!
//! Lowers three-address IR to abstract x86-64 assembly in three steps
//! per function:
//!
//! 1. instruction selection with pseudo operands (this module),
//! 2. pseudo-to-stack-slot assignment plus the frame allocation
//!    ([`stack`]),
//! 3. operand legalization ([`fixup`]).
//!
//! Argument passing follows the System V AMD64 convention: the first six
//! integer arguments in `%edi %esi %edx %ecx %r8d %r9d`, the rest pushed
//! right to left with the stack kept 16-byte aligned at the call.

pub mod asm;
mod fixup;
mod stack;

use crate::sema::{Symbol, Symbols};
use crate::tacky::{self, Instruction as Ir, TackyProgram, Value};
use asm::{
    AsmFunction, AsmProgram, BinaryOp, CondCode, Instruction, Operand, Reg, RegWidth, UnaryOp,
};
use std::collections::HashSet;
use std::fmt;

/// An unexpected shape in the incoming IR, or a formatting failure while
/// assembling output text. The IR cases are unreachable for programs
/// that passed semantic analysis.
#[derive(Debug)]
pub enum CodegenError {
    Invariant(String),
    Format(fmt::Error),
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::Invariant(message) => {
                write!(f, "codegen invariant violated: {}", message)
            }
            CodegenError::Format(e) => write!(f, "assembly formatting error: {}", e),
        }
    }
}

impl std::error::Error for CodegenError {}

impl From<fmt::Error> for CodegenError {
    fn from(e: fmt::Error) -> Self {
        CodegenError::Format(e)
    }
}

const ARG_REGISTERS: [Reg; 6] = [Reg::DI, Reg::SI, Reg::DX, Reg::CX, Reg::R8, Reg::R9];

pub struct CodeGen {
    /// Functions defined in this translation unit; calls to anything
    /// else are external and go through the PLT.
    defined: HashSet<String>,
}

impl CodeGen {
    pub fn new(symbols: &Symbols) -> Self {
        let defined = symbols
            .iter()
            .filter(|(_, symbol)| matches!(symbol, Symbol::Function { defined: true, .. }))
            .map(|(name, _)| name.clone())
            .collect();
        CodeGen { defined }
    }

    pub fn generate(&self, program: &TackyProgram) -> Result<AsmProgram, CodegenError> {
        let mut functions = Vec::new();
        for function in &program.functions {
            let mut lowered = self.lower_function(function)?;
            let slot_bytes = stack::assign_stack_slots(&mut lowered);
            // Keep %rsp 16-byte aligned for any call in the body.
            let frame = (slot_bytes + 15) / 16 * 16;
            lowered
                .instructions
                .insert(0, Instruction::AllocateStack(frame));
            lowered.instructions = fixup::legalize(std::mem::take(&mut lowered.instructions));
            functions.push(lowered);
        }
        Ok(AsmProgram { functions })
    }

    fn lower_function(
        &self,
        function: &tacky::TackyFunction,
    ) -> Result<AsmFunction, CodegenError> {
        let mut instructions = Vec::new();

        // Registers first, then the caller's stack starting just above
        // the saved %rbp and return address.
        for (i, param) in function.params.iter().enumerate() {
            let src = if i < ARG_REGISTERS.len() {
                Operand::reg(ARG_REGISTERS[i])
            } else {
                Operand::Stack(16 + 8 * (i as i64 - ARG_REGISTERS.len() as i64))
            };
            instructions.push(Instruction::Mov {
                src,
                dst: Operand::Pseudo(param.clone()),
            });
        }

        for instruction in &function.body {
            self.lower_instruction(instruction, &mut instructions)?;
        }

        Ok(AsmFunction {
            name: function.name.clone(),
            instructions,
        })
    }

    fn lower_instruction(
        &self,
        instruction: &Ir,
        out: &mut Vec<Instruction>,
    ) -> Result<(), CodegenError> {
        match instruction {
            Ir::Return(value) => {
                out.push(Instruction::Mov {
                    src: operand(value),
                    dst: Operand::reg(Reg::AX),
                });
                out.push(Instruction::Ret);
            }
            Ir::Unary {
                op: tacky::UnaryOp::Not,
                src,
                dst,
            } => {
                let dst = destination(dst)?;
                out.push(Instruction::Cmp {
                    src: Operand::Imm(0),
                    dst: operand(src),
                });
                out.push(Instruction::Mov {
                    src: Operand::Imm(0),
                    dst: dst.clone(),
                });
                out.push(Instruction::SetCC {
                    cc: CondCode::E,
                    operand: dst,
                });
            }
            Ir::Unary { op, src, dst } => {
                let dst = destination(dst)?;
                out.push(Instruction::Mov {
                    src: operand(src),
                    dst: dst.clone(),
                });
                out.push(Instruction::Unary {
                    op: match op {
                        tacky::UnaryOp::Complement => UnaryOp::Not,
                        tacky::UnaryOp::Negate => UnaryOp::Neg,
                        tacky::UnaryOp::Not => unreachable!("handled above"),
                    },
                    operand: dst,
                });
            }
            Ir::Binary {
                op: op @ (tacky::BinaryOp::Divide | tacky::BinaryOp::Remainder),
                src1,
                src2,
                dst,
            } => {
                // Signed division puts the quotient in %eax and the
                // remainder in %edx.
                let result = match op {
                    tacky::BinaryOp::Divide => Reg::AX,
                    _ => Reg::DX,
                };
                out.push(Instruction::Mov {
                    src: operand(src1),
                    dst: Operand::reg(Reg::AX),
                });
                out.push(Instruction::Cdq);
                out.push(Instruction::Idiv(operand(src2)));
                out.push(Instruction::Mov {
                    src: Operand::reg(result),
                    dst: destination(dst)?,
                });
            }
            Ir::Binary {
                op,
                src1,
                src2,
                dst,
            } if op.is_relational() => {
                let dst = destination(dst)?;
                out.push(Instruction::Cmp {
                    src: operand(src2),
                    dst: operand(src1),
                });
                out.push(Instruction::Mov {
                    src: Operand::Imm(0),
                    dst: dst.clone(),
                });
                out.push(Instruction::SetCC {
                    cc: condition_code(*op),
                    operand: dst,
                });
            }
            Ir::Binary {
                op,
                src1,
                src2,
                dst,
            } => {
                let dst = destination(dst)?;
                out.push(Instruction::Mov {
                    src: operand(src1),
                    dst: dst.clone(),
                });
                out.push(Instruction::Binary {
                    op: binary_op(*op)?,
                    src: operand(src2),
                    dst,
                });
            }
            Ir::Copy { src, dst } => {
                out.push(Instruction::Mov {
                    src: operand(src),
                    dst: destination(dst)?,
                });
            }
            Ir::Jump(target) => out.push(Instruction::Jmp(target.clone())),
            Ir::JumpIfZero { condition, target } => {
                out.push(Instruction::Cmp {
                    src: Operand::Imm(0),
                    dst: operand(condition),
                });
                out.push(Instruction::JmpCC {
                    cc: CondCode::E,
                    target: target.clone(),
                });
            }
            Ir::JumpIfNotZero { condition, target } => {
                out.push(Instruction::Cmp {
                    src: Operand::Imm(0),
                    dst: operand(condition),
                });
                out.push(Instruction::JmpCC {
                    cc: CondCode::Ne,
                    target: target.clone(),
                });
            }
            Ir::Label(label) => out.push(Instruction::Label(label.clone())),
            Ir::FunCall { name, args, dst } => self.lower_call(name, args, dst, out)?,
        }
        Ok(())
    }

    fn lower_call(
        &self,
        name: &str,
        args: &[Value],
        dst: &Value,
        out: &mut Vec<Instruction>,
    ) -> Result<(), CodegenError> {
        let register_args = &args[..args.len().min(ARG_REGISTERS.len())];
        let stack_args = &args[register_args.len()..];

        // Each stack argument is 8 bytes; an odd count would leave the
        // stack misaligned at the call.
        let padding = if stack_args.len() % 2 == 1 { 8 } else { 0 };
        if padding != 0 {
            out.push(Instruction::AllocateStack(padding));
        }

        for (i, arg) in register_args.iter().enumerate() {
            out.push(Instruction::Mov {
                src: operand(arg),
                dst: Operand::reg(ARG_REGISTERS[i]),
            });
        }

        for arg in stack_args.iter().rev() {
            match operand(arg) {
                imm @ Operand::Imm(_) => out.push(Instruction::Push(imm)),
                other => {
                    // An 8-byte push of a 4-byte slot would read past the
                    // value, so stage it through %eax.
                    out.push(Instruction::Mov {
                        src: other,
                        dst: Operand::reg(Reg::AX),
                    });
                    out.push(Instruction::Push(Operand::Reg(Reg::AX, RegWidth::Eight)));
                }
            }
        }

        out.push(Instruction::Call {
            name: name.to_string(),
            external: !self.defined.contains(name),
        });

        let cleanup = 8 * stack_args.len() as i64 + padding;
        if cleanup != 0 {
            out.push(Instruction::DeallocateStack(cleanup));
        }

        out.push(Instruction::Mov {
            src: Operand::reg(Reg::AX),
            dst: destination(dst)?,
        });
        Ok(())
    }
}

fn operand(value: &Value) -> Operand {
    match value {
        Value::Constant(v) => Operand::Imm(*v),
        Value::Var(name) => Operand::Pseudo(name.clone()),
    }
}

fn destination(value: &Value) -> Result<Operand, CodegenError> {
    match value {
        Value::Var(name) => Ok(Operand::Pseudo(name.clone())),
        Value::Constant(v) => Err(CodegenError::Invariant(format!(
            "constant {} used as a destination",
            v
        ))),
    }
}

fn condition_code(op: tacky::BinaryOp) -> CondCode {
    match op {
        tacky::BinaryOp::Equal => CondCode::E,
        tacky::BinaryOp::NotEqual => CondCode::Ne,
        tacky::BinaryOp::LessThan => CondCode::L,
        tacky::BinaryOp::LessOrEqual => CondCode::Le,
        tacky::BinaryOp::GreaterThan => CondCode::G,
        tacky::BinaryOp::GreaterOrEqual => CondCode::Ge,
        _ => unreachable!("only relational operators have condition codes"),
    }
}

fn binary_op(op: tacky::BinaryOp) -> Result<BinaryOp, CodegenError> {
    let mapped = match op {
        tacky::BinaryOp::Add => BinaryOp::Add,
        tacky::BinaryOp::Subtract => BinaryOp::Sub,
        tacky::BinaryOp::Multiply => BinaryOp::Mult,
        tacky::BinaryOp::BitAnd => BinaryOp::And,
        tacky::BinaryOp::BitOr => BinaryOp::Or,
        tacky::BinaryOp::BitXor => BinaryOp::Xor,
        // Both left-shift flavors assemble to the same instruction; the
        // arithmetic/logical distinction is real only when shifting
        // right.
        tacky::BinaryOp::LeftShiftLogical | tacky::BinaryOp::LeftShiftArithmetic => BinaryOp::Shl,
        tacky::BinaryOp::RightShiftLogical => BinaryOp::Shr,
        tacky::BinaryOp::RightShiftArithmetic => BinaryOp::Sar,
        other => {
            return Err(CodegenError::Invariant(format!(
                "operator {:?} cannot lower to a single instruction",
                other
            )));
        }
    };
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::sema;
    use crate::tacky::TackyGen;

    fn generate(source: &str) -> AsmProgram {
        let tokens = Lexer::new(source).lex().unwrap();
        let ast = Parser::new(tokens).parse().unwrap();
        let (ast, symbols) = sema::validate(ast).unwrap();
        let ir = TackyGen::new().generate(&ast);
        CodeGen::new(&symbols).generate(&ir).unwrap()
    }

    fn has_pseudo(instruction: &Instruction) -> bool {
        let operands: Vec<&Operand> = match instruction {
            Instruction::Mov { src, dst }
            | Instruction::Binary { src, dst, .. }
            | Instruction::Cmp { src, dst } => vec![src, dst],
            Instruction::Unary { operand, .. }
            | Instruction::Idiv(operand)
            | Instruction::SetCC { operand, .. }
            | Instruction::Push(operand) => vec![operand],
            _ => vec![],
        };
        operands.iter().any(|o| matches!(o, Operand::Pseudo(_)))
    }

    #[test]
    fn test_no_pseudos_survive() {
        let program = generate(
            "int main(void) { int a = 1; int b = 2; return a + b * 3; }",
        );
        for function in &program.functions {
            for instruction in &function.instructions {
                assert!(!has_pseudo(instruction), "pseudo left in {:?}", instruction);
            }
        }
    }

    #[test]
    fn test_frame_is_rounded_to_sixteen() {
        let program = generate("int main(void) { int a = 1; return a; }");
        // One 4-byte slot rounds up to a 16-byte frame.
        assert_eq!(
            program.functions[0].instructions[0],
            Instruction::AllocateStack(16)
        );
    }

    #[test]
    fn test_empty_frame_allocates_zero() {
        let program = generate("int main(void) { return 2; }");
        assert_eq!(
            program.functions[0].instructions[0],
            Instruction::AllocateStack(0)
        );
    }

    #[test]
    fn test_return_moves_into_eax() {
        let program = generate("int main(void) { return 2; }");
        let instructions = &program.functions[0].instructions;
        assert_eq!(
            instructions[1],
            Instruction::Mov {
                src: Operand::Imm(2),
                dst: Operand::reg(Reg::AX),
            }
        );
        assert_eq!(instructions[2], Instruction::Ret);
    }

    #[test]
    fn test_parameters_arrive_from_argument_registers() {
        let program = generate("int add(int a, int b) { return a + b; } int main(void) { return add(1, 2); }");
        let add = &program.functions[0];
        // After AllocateStack: moves from %edi and %esi into the slots.
        assert_eq!(
            add.instructions[1],
            Instruction::Mov {
                src: Operand::reg(Reg::DI),
                dst: Operand::Stack(-4),
            }
        );
        assert_eq!(
            add.instructions[2],
            Instruction::Mov {
                src: Operand::reg(Reg::SI),
                dst: Operand::Stack(-8),
            }
        );
    }

    #[test]
    fn test_seventh_parameter_comes_from_caller_stack() {
        let program = generate(
            "int f(int a, int b, int c, int d, int e, int g, int h) { return h; }
             int main(void) { return f(1, 2, 3, 4, 5, 6, 7); }",
        );
        let f = &program.functions[0];
        // The seventh parameter is read from 16(%rbp); it lands in the
        // seventh slot at -28, via %r10d since both sides are memory.
        assert!(f.instructions.contains(&Instruction::Mov {
            src: Operand::Stack(16),
            dst: Operand::reg(Reg::R10),
        }));
        assert!(f.instructions.contains(&Instruction::Mov {
            src: Operand::reg(Reg::R10),
            dst: Operand::Stack(-28),
        }));
    }

    #[test]
    fn test_call_with_stack_arguments_aligns_and_cleans_up() {
        let program = generate(
            "int f(int a, int b, int c, int d, int e, int g, int h) { return a; }
             int main(void) { return f(1, 2, 3, 4, 5, 6, 7); }",
        );
        let main = &program.functions[1];
        // One stack argument: 8 bytes of alignment padding, the push,
        // then 16 bytes of cleanup.
        assert!(main.instructions.contains(&Instruction::AllocateStack(8)));
        assert!(main.instructions.contains(&Instruction::Push(Operand::Imm(7))));
        assert!(main
            .instructions
            .contains(&Instruction::DeallocateStack(16)));
        let call_position = main
            .instructions
            .iter()
            .position(|i| matches!(i, Instruction::Call { .. }))
            .unwrap();
        assert_eq!(
            main.instructions[call_position],
            Instruction::Call {
                name: "f".to_string(),
                external: false,
            }
        );
    }

    #[test]
    fn test_register_arguments_in_convention_order() {
        let program = generate(
            "int f(int a, int b, int c); int main(void) { return f(1, 2, 3); }",
        );
        let main = &program.functions[0];
        let moves: Vec<&Instruction> = main
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Mov { dst: Operand::Reg(..), .. }))
            .collect();
        assert_eq!(
            moves[0],
            &Instruction::Mov {
                src: Operand::Imm(1),
                dst: Operand::reg(Reg::DI),
            }
        );
        assert_eq!(
            moves[1],
            &Instruction::Mov {
                src: Operand::Imm(2),
                dst: Operand::reg(Reg::SI),
            }
        );
        assert_eq!(
            moves[2],
            &Instruction::Mov {
                src: Operand::Imm(3),
                dst: Operand::reg(Reg::DX),
            }
        );
    }

    #[test]
    fn test_undefined_function_call_is_external() {
        let program =
            generate("int putchar(int c); int main(void) { return putchar(65); }");
        let main = &program.functions[0];
        assert!(main.instructions.contains(&Instruction::Call {
            name: "putchar".to_string(),
            external: true,
        }));
    }

    #[test]
    fn test_division_uses_cdq_idiv() {
        let program = generate("int main(void) { int a = 10; int b = 3; return a / b; }");
        let main = &program.functions[0];
        assert!(main.instructions.contains(&Instruction::Cdq));
        assert!(main
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Idiv(Operand::Stack(_)))));
    }

    #[test]
    fn test_remainder_reads_edx() {
        let program = generate("int main(void) { int a = 10; return a % 3; }");
        let main = &program.functions[0];
        let idiv_position = main
            .instructions
            .iter()
            .position(|i| matches!(i, Instruction::Idiv(_)))
            .unwrap();
        assert!(matches!(
            main.instructions[idiv_position + 1],
            Instruction::Mov {
                src: Operand::Reg(Reg::DX, RegWidth::Four),
                ..
            }
        ));
    }

    #[test]
    fn test_relational_compare_sets_byte() {
        let program = generate("int main(void) { int a = 1; return a < 2; }");
        let main = &program.functions[0];
        assert!(main.instructions.iter().any(|i| matches!(
            i,
            Instruction::SetCC {
                cc: CondCode::L,
                ..
            }
        )));
    }
}
