//! Property and end-to-end tests for the whole machine.

use dcpu::asm::assemble;
use dcpu::cpu::decode::{decode, encode, fields, DecodeError, Instruction, Opcode, Operand};
use dcpu::cpu::{Cpu, Register, Word};
use dcpu::Computer;
use proptest::prelude::*;

fn op(opcode: Opcode, a: Operand, b: Operand) -> Word {
    encode(&Instruction { opcode, a, b })
}

/// Run a two-register ALU op on fresh values; returns (A, EX).
fn alu(opcode: Opcode, a: Word, b: Word) -> (Word, Word) {
    let mut cpu = Cpu::new();
    cpu.load_program(&[op(opcode, Operand::Register(Register::A), Operand::Register(Register::B))])
        .unwrap();
    cpu.regs.set(Register::A, a);
    cpu.regs.set(Register::B, b);
    cpu.step().unwrap();
    (cpu.regs.get(Register::A), cpu.regs.ex)
}

const LOW_MNEMONICS: [(&str, u8); 15] = [
    ("SET", 0x01),
    ("ADD", 0x02),
    ("SUB", 0x03),
    ("MUL", 0x04),
    ("MLI", 0x05),
    ("DIV", 0x06),
    ("DVI", 0x07),
    ("MOD", 0x08),
    ("MDI", 0x09),
    ("AND", 0x0A),
    ("BOR", 0x0B),
    ("XOR", 0x0C),
    ("SHR", 0x0D),
    ("ASR", 0x0E),
    ("SHL", 0x0F),
];

proptest! {
    #[test]
    fn property_stack_push_pop_is_lifo(values in prop::collection::vec(any::<u16>(), 1..32)) {
        let mut program = Vec::new();
        for &v in &values {
            program.push(op(Opcode::Set, Operand::Stack, Operand::NextLiteral));
            program.push(v);
        }
        for _ in &values {
            program.push(op(Opcode::Set, Operand::Register(Register::B), Operand::Stack));
        }

        let mut cpu = Cpu::new();
        cpu.load_program(&program).unwrap();

        cpu.exec(values.len() as u64).unwrap();
        prop_assert_eq!(usize::from(cpu.regs.sp), 0xFFFF - values.len());
        prop_assert_eq!(cpu.mem.peek(usize::from(cpu.regs.sp)).unwrap(), *values.last().unwrap());

        for &v in values.iter().rev() {
            cpu.step().unwrap();
            prop_assert_eq!(cpu.regs.get(Register::B), v);
        }
        prop_assert_eq!(cpu.regs.sp, 0xFFFF);
    }

    #[test]
    fn property_encoding_matches_assembled_operands(
        mnemonic in 0usize..LOW_MNEMONICS.len(),
        reg in 0u8..8,
        literal in any::<u16>(),
    ) {
        let (name, value) = LOW_MNEMONICS[mnemonic];
        let register = Register::from_index(reg);
        let words = assemble(&format!("{name} {register}, {literal}")).unwrap();

        let (opcode, a, b) = fields(words[0]);
        prop_assert_eq!(opcode, value);
        prop_assert_eq!(a, reg);
        if literal <= 0x1F {
            prop_assert_eq!(b, 0x20 + literal as u8);
            prop_assert_eq!(words.len(), 1);
        } else {
            prop_assert_eq!(b, 0x1F);
            prop_assert_eq!(&words[1..], &[literal]);
        }
    }

    #[test]
    fn property_add_carry(a in any::<u16>(), b in any::<u16>()) {
        let sum = u32::from(a) + u32::from(b);
        prop_assert_eq!(alu(Opcode::Add, a, b), ((sum & 0xFFFF) as Word, Word::from(sum > 0xFFFF)));
    }

    #[test]
    fn property_sub_borrow(a in any::<u16>(), b in any::<u16>()) {
        let expected_ex = if a < b { 0xFFFF } else { 0 };
        prop_assert_eq!(alu(Opcode::Sub, a, b), (a.wrapping_sub(b), expected_ex));
    }

    #[test]
    fn property_mul_splits_product(a in any::<u16>(), b in any::<u16>()) {
        let product = u32::from(a) * u32::from(b);
        prop_assert_eq!(alu(Opcode::Mul, a, b), (product as Word, (product >> 16) as Word));
    }

    #[test]
    fn property_div_quotient(a in any::<u16>(), b in 1u16..) {
        let (quotient, _) = alu(Opcode::Div, a, b);
        prop_assert_eq!(quotient, a / b);
    }

    #[test]
    fn property_decode_total(word in any::<u16>()) {
        match decode(word) {
            Ok(instr) => prop_assert_eq!(encode(&instr), word),
            Err(DecodeError::UnknownOpcode(op)) => prop_assert!(matches!(op, 0x07..=0x09)),
        }
    }

    #[test]
    fn property_masked_interrupt_changes_nothing(pc in any::<u16>(), a in any::<u16>(), msg in any::<u16>()) {
        let mut cpu = Cpu::new();
        cpu.regs.pc = pc;
        cpu.regs.set(Register::A, a);
        let before = cpu.regs.clone();

        prop_assert!(!cpu.interrupt(msg).unwrap());
        prop_assert_eq!(cpu.regs, before);
    }

    #[test]
    fn property_interrupt_pushes_pc_then_a(
        pc in any::<u16>(),
        a in any::<u16>(),
        ia in 1u16..,
        msg in any::<u16>(),
    ) {
        let mut cpu = Cpu::new();
        cpu.regs.pc = pc;
        cpu.regs.ia = ia;
        cpu.regs.set(Register::A, a);

        prop_assert!(cpu.interrupt(msg).unwrap());
        prop_assert_eq!(cpu.regs.sp, 0xFFFD);
        prop_assert_eq!(cpu.mem.peek(0xFFFE).unwrap(), pc);
        prop_assert_eq!(cpu.mem.peek(0xFFFD).unwrap(), a);
        prop_assert_eq!(cpu.regs.pc, ia);
        prop_assert_eq!(cpu.regs.get(Register::A), msg);
    }
}

#[test]
fn keyboard_buffer_read_through_program() {
    let mut computer = Computer::new().unwrap();
    computer
        .load_assembly(
            "
            SET A, [0xF010]   ; X
            SET B, [0xF010]   ; Y
            SET C, [0xF010]   ; empty
            SET X, [0xF011]   ; last key
            SET Y, [0xF012]   ; held
            ",
        )
        .unwrap();

    computer.key_down(Word::from(b'X')).unwrap();
    computer.key_up(Word::from(b'X'));
    computer.key_down(Word::from(b'Y')).unwrap();
    computer.run(5).unwrap();

    let regs = computer.registers();
    assert_eq!(regs.get(Register::A), Word::from(b'X'));
    assert_eq!(regs.get(Register::B), Word::from(b'Y'));
    assert_eq!(regs.get(Register::C), 0);
    assert_eq!(regs.get(Register::X), Word::from(b'Y'));
    assert_eq!(regs.get(Register::Y), 1);
}

#[test]
fn keyboard_interrupt_runs_handler() {
    let source = "
        SET [0xF010], 0x1F   ; keyboard interrupt message
        SET PC, idle
    :idle
        SET PC, idle
    :handler
        SET B, [0xF010]      ; take the key
        SET A, POP           ; restore A
        SET PC, POP          ; return
    ";
    let program = dcpu::asm::assemble_program(source).unwrap();
    let handler = program.labels["handler"];
    let idle = program.labels["idle"];

    let mut computer = Computer::new().unwrap();
    computer.load_image(&program.words).unwrap();
    computer.run(3).unwrap();

    // Masked: nothing happens.
    computer.key_down(0x41).unwrap();
    assert_eq!(computer.registers().pc, idle);
    computer.key_up(0x41);

    computer.cpu.regs.ia = handler;
    computer.key_down(0x42).unwrap();
    assert_eq!(computer.registers().pc, handler);
    assert_eq!(computer.registers().get(Register::A), 0x1F);

    computer.run(3).unwrap();
    // The masked key was buffered too, so the handler reads it first.
    assert_eq!(computer.registers().get(Register::B), 0x41);
    assert_eq!(computer.registers().get(Register::A), 0);
    assert_eq!(computer.registers().pc, idle);
    assert_eq!(computer.registers().sp, 0xFFFF);
}

#[test]
fn write_guard_surfaces_through_computer() {
    let mut computer = Computer::new().unwrap();
    computer.load_assembly("SET A, 9\nSET 5, A").unwrap();
    computer.run(1).unwrap();
    let before = computer.registers().clone();

    assert!(computer.run(1).is_err());
    assert_eq!(computer.registers(), &before);
}

#[test]
fn display_vram_window_follows_base() {
    let source = "
        SET [0xF020], 0x8000
        SET [0x8010], 1
        SET [0xF020], 0x9000
        SET [0x8010], 2
        SET [0x9000], 3
    ";
    let mut computer = Computer::new().unwrap();
    computer.load_assembly(source).unwrap();

    computer.run(1).unwrap();
    assert!(computer.take_frame_dirty());
    computer.run(1).unwrap();
    assert!(computer.take_frame_dirty());

    computer.run(1).unwrap();
    assert!(computer.take_frame_dirty());
    // The old window no longer reports writes.
    computer.run(1).unwrap();
    assert!(!computer.take_frame_dirty());
    computer.run(1).unwrap();
    assert!(computer.take_frame_dirty());
}
