//! Assembly text emission
//!
//! Serializes the legalized instruction list to GNU assembler input in
//! AT&T syntax. Every function gets a `.global` directive, the standard
//! prologue after its label, and an epilogue expanded at each `ret`.
//! Local jump targets are prefixed `.L` so the assembler keeps them out
//! of the symbol table.

use crate::codegen::CodegenError;
use crate::codegen::asm::{
    AsmFunction, AsmProgram, BinaryOp, Instruction, Operand, RegWidth, UnaryOp,
};
use std::fmt::Write;

pub fn emit(program: &AsmProgram) -> Result<String, CodegenError> {
    let mut out = String::new();

    writeln!(out, "    .text")?;
    for function in &program.functions {
        writeln!(out, "    .global {}", function.name)?;
    }
    for function in &program.functions {
        emit_function(&mut out, function)?;
    }
    writeln!(out, "    .section .note.GNU-stack,\"\",@progbits")?;

    Ok(out)
}

fn emit_function(out: &mut String, function: &AsmFunction) -> Result<(), CodegenError> {
    writeln!(out)?;
    writeln!(out, "{}:", function.name)?;
    writeln!(out, "    pushq %rbp")?;
    writeln!(out, "    movq %rsp, %rbp")?;
    for instruction in &function.instructions {
        emit_instruction(out, instruction)?;
    }
    Ok(())
}

fn emit_instruction(out: &mut String, instruction: &Instruction) -> Result<(), CodegenError> {
    match instruction {
        Instruction::Mov { src, dst } => {
            writeln!(out, "    movl {}, {}", operand(src)?, operand(dst)?)?;
        }
        Instruction::Unary { op, operand: o } => {
            let mnemonic = match op {
                UnaryOp::Neg => "negl",
                UnaryOp::Not => "notl",
            };
            writeln!(out, "    {} {}", mnemonic, operand(o)?)?;
        }
        Instruction::Binary { op, src, dst } => {
            writeln!(out, "    {} {}, {}", binary_mnemonic(*op), operand(src)?, operand(dst)?)?;
        }
        Instruction::Cmp { src, dst } => {
            writeln!(out, "    cmpl {}, {}", operand(src)?, operand(dst)?)?;
        }
        Instruction::Idiv(o) => writeln!(out, "    idivl {}", operand(o)?)?,
        Instruction::Cdq => writeln!(out, "    cdq")?,
        Instruction::Jmp(target) => writeln!(out, "    jmp .L{}", target)?,
        Instruction::JmpCC { cc, target } => {
            writeln!(out, "    j{} .L{}", cc.suffix(), target)?;
        }
        Instruction::SetCC { cc, operand: o } => {
            // set<cc> writes a single byte.
            let target = match o {
                Operand::Reg(reg, _) => reg.name(RegWidth::One).to_string(),
                other => operand(other)?,
            };
            writeln!(out, "    set{} {}", cc.suffix(), target)?;
        }
        Instruction::Label(label) => writeln!(out, ".L{}:", label)?,
        Instruction::Push(o) => writeln!(out, "    pushq {}", operand(o)?)?,
        Instruction::Call { name, external } => {
            if *external {
                writeln!(out, "    call {}@PLT", name)?;
            } else {
                writeln!(out, "    call {}", name)?;
            }
        }
        Instruction::Ret => {
            writeln!(out, "    movq %rbp, %rsp")?;
            writeln!(out, "    popq %rbp")?;
            writeln!(out, "    ret")?;
        }
        Instruction::AllocateStack(bytes) => writeln!(out, "    subq ${}, %rsp", bytes)?,
        Instruction::DeallocateStack(bytes) => writeln!(out, "    addq ${}, %rsp", bytes)?,
    }
    Ok(())
}

fn binary_mnemonic(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "addl",
        BinaryOp::Sub => "subl",
        BinaryOp::Mult => "imull",
        BinaryOp::And => "andl",
        BinaryOp::Or => "orl",
        BinaryOp::Xor => "xorl",
        BinaryOp::Shl => "shll",
        BinaryOp::Shr => "shrl",
        BinaryOp::Sar => "sarl",
    }
}

fn operand(operand: &Operand) -> Result<String, CodegenError> {
    match operand {
        Operand::Imm(value) => Ok(format!("${}", value)),
        Operand::Reg(reg, width) => Ok(reg.name(*width).to_string()),
        Operand::Stack(offset) => Ok(format!("{}(%rbp)", offset)),
        Operand::Pseudo(name) => Err(CodegenError::Invariant(format!(
            "pseudo operand '{}' reached emission",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::asm::{CondCode, Reg};

    fn program(instructions: Vec<Instruction>) -> AsmProgram {
        AsmProgram {
            functions: vec![AsmFunction {
                name: "main".to_string(),
                instructions,
            }],
        }
    }

    #[test]
    fn test_emit_minimal_function() {
        let text = emit(&program(vec![
            Instruction::AllocateStack(0),
            Instruction::Mov {
                src: Operand::Imm(2),
                dst: Operand::reg(Reg::AX),
            },
            Instruction::Ret,
        ]))
        .unwrap();

        let expected = [
            "    .text",
            "    .global main",
            "",
            "main:",
            "    pushq %rbp",
            "    movq %rsp, %rbp",
            "    subq $0, %rsp",
            "    movl $2, %eax",
            "    movq %rbp, %rsp",
            "    popq %rbp",
            "    ret",
            "    .section .note.GNU-stack,\"\",@progbits",
            "",
        ]
        .join("\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn test_stack_operands_and_binary_ops() {
        let text = emit(&program(vec![
            Instruction::Mov {
                src: Operand::Imm(1),
                dst: Operand::Stack(-4),
            },
            Instruction::Binary {
                op: BinaryOp::Add,
                src: Operand::reg(Reg::R10),
                dst: Operand::Stack(-4),
            },
            Instruction::Binary {
                op: BinaryOp::Sar,
                src: Operand::Reg(Reg::CX, RegWidth::One),
                dst: Operand::Stack(-4),
            },
        ]))
        .unwrap();
        assert!(text.contains("    movl $1, -4(%rbp)\n"));
        assert!(text.contains("    addl %r10d, -4(%rbp)\n"));
        assert!(text.contains("    sarl %cl, -4(%rbp)\n"));
    }

    #[test]
    fn test_jumps_and_labels_use_local_prefix() {
        let text = emit(&program(vec![
            Instruction::Jmp("_IF_END_0_".to_string()),
            Instruction::JmpCC {
                cc: CondCode::Ne,
                target: "_AND_FALSE_0_".to_string(),
            },
            Instruction::Label("_IF_END_0_".to_string()),
        ]))
        .unwrap();
        assert!(text.contains("    jmp .L_IF_END_0_\n"));
        assert!(text.contains("    jne .L_AND_FALSE_0_\n"));
        assert!(text.contains(".L_IF_END_0_:\n"));
    }

    #[test]
    fn test_setcc_uses_byte_register() {
        let text = emit(&program(vec![Instruction::SetCC {
            cc: CondCode::E,
            operand: Operand::reg(Reg::AX),
        }]))
        .unwrap();
        assert!(text.contains("    sete %al\n"));
    }

    #[test]
    fn test_call_plt_suffix() {
        let text = emit(&program(vec![
            Instruction::Call {
                name: "putchar".to_string(),
                external: true,
            },
            Instruction::Call {
                name: "helper".to_string(),
                external: false,
            },
        ]))
        .unwrap();
        assert!(text.contains("    call putchar@PLT\n"));
        assert!(text.contains("    call helper\n"));
    }

    #[test]
    fn test_push_and_stack_adjustment() {
        let text = emit(&program(vec![
            Instruction::AllocateStack(8),
            Instruction::Push(Operand::Reg(Reg::AX, RegWidth::Eight)),
            Instruction::Push(Operand::Imm(7)),
            Instruction::DeallocateStack(16),
        ]))
        .unwrap();
        assert!(text.contains("    subq $8, %rsp\n"));
        assert!(text.contains("    pushq %rax\n"));
        assert!(text.contains("    pushq $7\n"));
        assert!(text.contains("    addq $16, %rsp\n"));
    }

    #[test]
    fn test_pseudo_operand_is_an_error() {
        let err = emit(&program(vec![Instruction::Mov {
            src: Operand::Pseudo("tmp.0".to_string()),
            dst: Operand::reg(Reg::AX),
        }]))
        .unwrap_err();
        assert!(matches!(err, CodegenError::Invariant(_)));
    }

    #[test]
    fn test_gnu_stack_marker_is_last_line() {
        let text = emit(&program(vec![Instruction::Ret])).unwrap();
        assert!(text.ends_with("    .section .note.GNU-stack,\"\",@progbits\n"));
    }
}
