//! End-to-end pipeline tests
//!
//! Drives whole programs through the library API and checks the emitted
//! assembly and the representation invariants that every stage promises.

use mcc::codegen::asm::{AsmProgram, Instruction as AsmInstruction, Operand};
use mcc::tacky::{Instruction, TackyProgram, Value};
use mcc::{CompileError, Lexer, Parser, SemanticError, TackyGen, compile_to_assembly, sema};
use std::collections::HashSet;

fn assembly(source: &str) -> String {
    compile_to_assembly(source).unwrap()
}

fn tacky(source: &str) -> TackyProgram {
    let tokens = Lexer::new(source).lex().unwrap();
    let ast = Parser::new(tokens).parse().unwrap();
    let (ast, _) = sema::validate(ast).unwrap();
    TackyGen::new().generate(&ast)
}

fn asm_program(source: &str) -> AsmProgram {
    let tokens = Lexer::new(source).lex().unwrap();
    let ast = Parser::new(tokens).parse().unwrap();
    let (ast, symbols) = sema::validate(ast).unwrap();
    let ir = TackyGen::new().generate(&ast);
    mcc::CodeGen::new(&symbols).generate(&ir).unwrap()
}

fn semantic_error(source: &str) -> SemanticError {
    match compile_to_assembly(source).unwrap_err() {
        CompileError::Semantic(e) => e,
        other => panic!("expected a semantic error, got {}", other),
    }
}

// ----------------------------------------------------------------------
// Accepted programs
// ----------------------------------------------------------------------

#[test]
fn test_return_constant_program() {
    let asm = assembly("int main(void) { return 42; }");
    assert!(asm.contains("    .global main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("    movl $42, %eax"));
    assert!(asm.ends_with("    .section .note.GNU-stack,\"\",@progbits\n"));
}

#[test]
fn test_arithmetic_with_locals() {
    // a + b * 3 with a = 1, b = 2.
    let asm = assembly("int main(void) { int a = 1; int b = 2; return a + b * 3; }");
    assert!(asm.contains("imull"));
    assert!(asm.contains("addl"));
    // Locals live in the frame.
    assert!(asm.contains("-4(%rbp)"));
    assert!(asm.contains("-8(%rbp)"));
}

#[test]
fn test_division_and_remainder() {
    let asm = assembly("int main(void) { int a = 10; int b = 3; return a / b * 10 + a % b; }");
    assert!(asm.contains("cdq"));
    assert!(asm.contains("idivl"));
}

#[test]
fn test_for_loop_accumulates() {
    let asm = assembly(
        "int main(void) { int x = 0; for (int i = 0; i < 5; i = i + 1) x = x + i; return x; }",
    );
    assert!(asm.contains(".L_FOR_LOOP_0_START:"));
    assert!(asm.contains(".L_FOR_LOOP_0_CONTINUE:"));
    assert!(asm.contains(".L_FOR_LOOP_0_BREAK:"));
    assert!(asm.contains("    jmp .L_FOR_LOOP_0_START"));
}

#[test]
fn test_switch_dispatch() {
    let asm = assembly(
        "int main(void) { int x = 3; switch(x) { case 1: return 1; case 3: return 30; default: return 99; } }",
    );
    // Two case comparisons, a default jump, and the case labels.
    assert!(asm.contains(".L_CASE_1:"));
    assert!(asm.contains(".L_CASE_2:"));
    assert!(asm.contains(".L_DEFAULT_3:"));
    assert!(asm.contains("    jmp .L_DEFAULT_3"));
    assert!(asm.contains(".L_SWITCH_0_BREAK:"));
}

#[test]
fn test_nested_function_calls() {
    let asm =
        assembly("int add(int a, int b){ return a+b; } int main(void){ return add(2, add(3, 4)); }");
    assert!(asm.contains("    .global add"));
    assert!(asm.contains("    .global main"));
    // Both calls resolve within the translation unit, so no PLT.
    assert!(asm.contains("    call add\n"));
    assert!(!asm.contains("@PLT"));
}

#[test]
fn test_external_call_goes_through_plt() {
    let asm = assembly("int putchar(int c); int main(void) { putchar(65); return 0; }");
    assert!(asm.contains("    call putchar@PLT"));
    // Declarations produce no code.
    assert!(!asm.contains("putchar:"));
}

#[test]
fn test_short_circuit_and_conditional() {
    let asm = assembly(
        "int main(void) { int a = 1; int b = 0; return a && b ? 10 : a || b ? 20 : 30; }",
    );
    assert!(asm.contains(".L_AND_FALSE_0_:"));
    assert!(asm.contains(".L_OR_TRUE_0_:"));
    assert!(asm.contains(".L_CONDITIONAL_ELSE_0_:"));
}

#[test]
fn test_goto_label_round_trip() {
    let asm = assembly("int main(void) { goto skip; return 1; skip: return 2; }");
    assert!(asm.contains("    jmp .Lskip"));
    assert!(asm.contains(".Lskip:"));
}

#[test]
fn test_compound_assignment_and_increments() {
    let asm = assembly(
        "int main(void) { int a = 1; a += 2; a <<= 1; a--; ++a; return a; }",
    );
    assert!(asm.contains("addl"));
    assert!(asm.contains("shll"));
    assert!(asm.contains("subl"));
}

#[test]
fn test_arithmetic_right_shift_of_negated_value() {
    let asm = assembly("int main(void) { int a = 8; return -a >> 2; }");
    assert!(asm.contains("sarl"));

    let asm = assembly("int main(void) { int a = 8; return a >> 2; }");
    assert!(asm.contains("shrl"));
}

// ----------------------------------------------------------------------
// Representation invariants
// ----------------------------------------------------------------------

const COMPLEX_PROGRAM: &str = "
    int helper(int a, int b, int c, int d, int e, int f, int g);
    int twice(int x) { return x * 2; }
    int main(void) {
        int total = 0;
        for (int i = 0; i < 10; i++) {
            if (i % 2 == 0) continue;
            total += twice(i);
        }
        switch (total) {
            case 0: total = 1; break;
            case 50: total /= 2; break;
            default: total = helper(1, 2, 3, 4, 5, 6, 7);
        }
        while (total > 100) total--;
        do total++; while (total < 3);
        return total > 0 && total < 50 ? total : -total;
    }
";

#[test]
fn test_temporaries_assigned_exactly_once() {
    let program = tacky(COMPLEX_PROGRAM);
    for function in &program.functions {
        let mut assigned = HashSet::new();
        for instruction in &function.body {
            let dst = match instruction {
                Instruction::Unary { dst, .. }
                | Instruction::Binary { dst, .. }
                | Instruction::FunCall { dst, .. } => Some(dst),
                _ => None,
            };
            if let Some(Value::Var(name)) = dst
                && name.starts_with("tmp.")
            {
                assert!(
                    assigned.insert(name.clone()),
                    "{}: temporary {} assigned twice",
                    function.name,
                    name
                );
            }
        }
    }
}

#[test]
fn test_every_jump_targets_one_defined_label() {
    let program = tacky(COMPLEX_PROGRAM);
    for function in &program.functions {
        let mut defined = HashSet::new();
        for instruction in &function.body {
            if let Instruction::Label(label) = instruction {
                assert!(
                    defined.insert(label.clone()),
                    "{}: label {} defined twice",
                    function.name,
                    label
                );
            }
        }
        for instruction in &function.body {
            let target = match instruction {
                Instruction::Jump(t)
                | Instruction::JumpIfZero { target: t, .. }
                | Instruction::JumpIfNotZero { target: t, .. } => Some(t),
                _ => None,
            };
            if let Some(target) = target {
                assert!(
                    defined.contains(target),
                    "{}: jump to undefined label {}",
                    function.name,
                    target
                );
            }
        }
    }
}

#[test]
fn test_every_function_body_ends_with_return() {
    let program = tacky(COMPLEX_PROGRAM);
    for function in &program.functions {
        assert!(
            matches!(function.body.last(), Some(Instruction::Return(_))),
            "{} does not end with a return",
            function.name
        );
    }
}

#[test]
fn test_no_pseudo_operands_after_codegen() {
    let program = asm_program(COMPLEX_PROGRAM);
    for function in &program.functions {
        for instruction in &function.instructions {
            let operands: Vec<&Operand> = match instruction {
                AsmInstruction::Mov { src, dst }
                | AsmInstruction::Binary { src, dst, .. }
                | AsmInstruction::Cmp { src, dst } => vec![src, dst],
                AsmInstruction::Unary { operand, .. }
                | AsmInstruction::Idiv(operand)
                | AsmInstruction::SetCC { operand, .. }
                | AsmInstruction::Push(operand) => vec![operand],
                _ => vec![],
            };
            for operand in operands {
                assert!(
                    !matches!(operand, Operand::Pseudo(_)),
                    "{}: pseudo operand in {:?}",
                    function.name,
                    instruction
                );
            }
        }
    }
}

#[test]
fn test_stack_slots_are_consecutive_four_byte_offsets() {
    let program = asm_program(COMPLEX_PROGRAM);
    for function in &program.functions {
        let mut offsets = HashSet::new();
        for instruction in &function.instructions {
            let operands: Vec<&Operand> = match instruction {
                AsmInstruction::Mov { src, dst }
                | AsmInstruction::Binary { src, dst, .. }
                | AsmInstruction::Cmp { src, dst } => vec![src, dst],
                AsmInstruction::Unary { operand, .. }
                | AsmInstruction::Idiv(operand)
                | AsmInstruction::SetCC { operand, .. }
                | AsmInstruction::Push(operand) => vec![operand],
                _ => vec![],
            };
            for operand in operands {
                if let Operand::Stack(offset) = operand
                    && *offset < 0
                {
                    offsets.insert(*offset);
                }
            }
        }
        let mut sorted: Vec<i64> = offsets.into_iter().collect();
        sorted.sort_unstable_by_key(|o| -o);
        for (i, offset) in sorted.iter().enumerate() {
            assert_eq!(
                *offset,
                -4 * (i as i64 + 1),
                "{}: slot offsets not consecutive: {:?}",
                function.name,
                sorted
            );
        }
    }
}

#[test]
fn test_frame_allocation_is_multiple_of_sixteen() {
    let program = asm_program(COMPLEX_PROGRAM);
    for function in &program.functions {
        let AsmInstruction::AllocateStack(bytes) = &function.instructions[0] else {
            panic!("{}: body does not start with the frame allocation", function.name);
        };
        assert_eq!(bytes % 16, 0, "{}: frame of {} bytes", function.name, bytes);
    }
}

#[test]
fn test_prologue_and_epilogue_balance_in_text() {
    let asm = assembly(COMPLEX_PROGRAM);
    let lines: Vec<&str> = asm.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        // A function label: not a directive, not a local label.
        if line.ends_with(':') && !line.starts_with('.') && !line.starts_with(' ') {
            assert_eq!(lines[i + 1], "    pushq %rbp", "after {}", line);
            assert_eq!(lines[i + 2], "    movq %rsp, %rbp", "after {}", line);
            assert!(
                lines[i + 3].starts_with("    subq $"),
                "no frame allocation after {}",
                line
            );
        }
        if *line == "    ret" {
            assert_eq!(lines[i - 2], "    movq %rbp, %rsp", "before ret");
            assert_eq!(lines[i - 1], "    popq %rbp", "before ret");
        }
    }
}

// ----------------------------------------------------------------------
// Rejected programs
// ----------------------------------------------------------------------

#[test]
fn test_undeclared_variable_is_rejected() {
    assert_eq!(
        semantic_error("int main(void) { return a; }"),
        SemanticError::UndeclaredVariable("a".to_string())
    );
}

#[test]
fn test_redeclaration_is_rejected() {
    assert_eq!(
        semantic_error("int main(void) { int a; int a; return 0; }"),
        SemanticError::DuplicateDeclaration("a".to_string())
    );
}

#[test]
fn test_assignment_to_constant_is_rejected() {
    assert_eq!(
        semantic_error("int main(void) { 1 = 2; return 0; }"),
        SemanticError::InvalidLvalue
    );
}

#[test]
fn test_break_outside_loop_is_rejected() {
    assert_eq!(
        semantic_error("int main(void) { break; }"),
        SemanticError::BreakOutsideLoop
    );
}

#[test]
fn test_duplicate_case_is_rejected() {
    assert_eq!(
        semantic_error("int main(void) { switch(1) { case 1: ; case 1: ; } return 0; }"),
        SemanticError::DuplicateCase(1)
    );
}

#[test]
fn test_lex_error_is_reported_as_such() {
    let err = compile_to_assembly("int main(void) { return $1; }").unwrap_err();
    assert!(matches!(err, CompileError::Lex(_)));
}

#[test]
fn test_parse_error_carries_expected_and_got() {
    let err = compile_to_assembly("int main(void) { return ; }").unwrap_err();
    let CompileError::Parse(parse_error) = err else {
        panic!("expected a parse error");
    };
    assert_eq!(parse_error.expected, "expression");
    assert!(parse_error.got.is_some());
}
