use anyhow::{Result, bail};

use super::trace::TraceEvent;
use super::{
    FLAG_CARRY, FLAG_DECIMAL, FLAG_INTERRUPT, FLAG_NEGATIVE, FLAG_OVERFLOW, FLAG_ZERO, Nes,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

#[derive(Clone, Copy)]
struct Opcode {
    op: Op,
    mode: Mode,
    cycles: u8,
    /// Reads through an indexed mode pay one extra cycle on a page cross;
    /// writes never do.
    page_penalty: bool,
}

const fn opcode(op: Op, mode: Mode, cycles: u8, page_penalty: bool) -> Option<Opcode> {
    Some(Opcode {
        op,
        mode,
        cycles,
        page_penalty,
    })
}

/// Dense decode table: one entry per opcode byte, `None` for bytes outside
/// the official instruction set. Decoding is a single indexed load; a `None`
/// hit is the execution-fatal path.
static OPCODES: [Option<Opcode>; 256] = {
    use Mode::*;
    use Op::*;
    let mut t: [Option<Opcode>; 256] = [None; 256];

    t[0xA9] = opcode(Lda, Immediate, 2, false);
    t[0xA5] = opcode(Lda, ZeroPage, 3, false);
    t[0xB5] = opcode(Lda, ZeroPageX, 4, false);
    t[0xAD] = opcode(Lda, Absolute, 4, false);
    t[0xBD] = opcode(Lda, AbsoluteX, 4, true);
    t[0xB9] = opcode(Lda, AbsoluteY, 4, true);
    t[0xA1] = opcode(Lda, IndirectX, 6, false);
    t[0xB1] = opcode(Lda, IndirectY, 5, true);

    t[0xA2] = opcode(Ldx, Immediate, 2, false);
    t[0xA6] = opcode(Ldx, ZeroPage, 3, false);
    t[0xB6] = opcode(Ldx, ZeroPageY, 4, false);
    t[0xAE] = opcode(Ldx, Absolute, 4, false);
    t[0xBE] = opcode(Ldx, AbsoluteY, 4, true);

    t[0xA0] = opcode(Ldy, Immediate, 2, false);
    t[0xA4] = opcode(Ldy, ZeroPage, 3, false);
    t[0xB4] = opcode(Ldy, ZeroPageX, 4, false);
    t[0xAC] = opcode(Ldy, Absolute, 4, false);
    t[0xBC] = opcode(Ldy, AbsoluteX, 4, true);

    t[0x85] = opcode(Sta, ZeroPage, 3, false);
    t[0x95] = opcode(Sta, ZeroPageX, 4, false);
    t[0x8D] = opcode(Sta, Absolute, 4, false);
    t[0x9D] = opcode(Sta, AbsoluteX, 5, false);
    t[0x99] = opcode(Sta, AbsoluteY, 5, false);
    t[0x81] = opcode(Sta, IndirectX, 6, false);
    t[0x91] = opcode(Sta, IndirectY, 6, false);

    t[0x86] = opcode(Stx, ZeroPage, 3, false);
    t[0x96] = opcode(Stx, ZeroPageY, 4, false);
    t[0x8E] = opcode(Stx, Absolute, 4, false);

    t[0x84] = opcode(Sty, ZeroPage, 3, false);
    t[0x94] = opcode(Sty, ZeroPageX, 4, false);
    t[0x8C] = opcode(Sty, Absolute, 4, false);

    t[0x69] = opcode(Adc, Immediate, 2, false);
    t[0x65] = opcode(Adc, ZeroPage, 3, false);
    t[0x75] = opcode(Adc, ZeroPageX, 4, false);
    t[0x6D] = opcode(Adc, Absolute, 4, false);
    t[0x7D] = opcode(Adc, AbsoluteX, 4, true);
    t[0x79] = opcode(Adc, AbsoluteY, 4, true);
    t[0x61] = opcode(Adc, IndirectX, 6, false);
    t[0x71] = opcode(Adc, IndirectY, 5, true);

    t[0xE9] = opcode(Sbc, Immediate, 2, false);
    t[0xE5] = opcode(Sbc, ZeroPage, 3, false);
    t[0xF5] = opcode(Sbc, ZeroPageX, 4, false);
    t[0xED] = opcode(Sbc, Absolute, 4, false);
    t[0xFD] = opcode(Sbc, AbsoluteX, 4, true);
    t[0xF9] = opcode(Sbc, AbsoluteY, 4, true);
    t[0xE1] = opcode(Sbc, IndirectX, 6, false);
    t[0xF1] = opcode(Sbc, IndirectY, 5, true);

    t[0x29] = opcode(And, Immediate, 2, false);
    t[0x25] = opcode(And, ZeroPage, 3, false);
    t[0x35] = opcode(And, ZeroPageX, 4, false);
    t[0x2D] = opcode(And, Absolute, 4, false);
    t[0x3D] = opcode(And, AbsoluteX, 4, true);
    t[0x39] = opcode(And, AbsoluteY, 4, true);
    t[0x21] = opcode(And, IndirectX, 6, false);
    t[0x31] = opcode(And, IndirectY, 5, true);

    t[0x09] = opcode(Ora, Immediate, 2, false);
    t[0x05] = opcode(Ora, ZeroPage, 3, false);
    t[0x15] = opcode(Ora, ZeroPageX, 4, false);
    t[0x0D] = opcode(Ora, Absolute, 4, false);
    t[0x1D] = opcode(Ora, AbsoluteX, 4, true);
    t[0x19] = opcode(Ora, AbsoluteY, 4, true);
    t[0x01] = opcode(Ora, IndirectX, 6, false);
    t[0x11] = opcode(Ora, IndirectY, 5, true);

    t[0x49] = opcode(Eor, Immediate, 2, false);
    t[0x45] = opcode(Eor, ZeroPage, 3, false);
    t[0x55] = opcode(Eor, ZeroPageX, 4, false);
    t[0x4D] = opcode(Eor, Absolute, 4, false);
    t[0x5D] = opcode(Eor, AbsoluteX, 4, true);
    t[0x59] = opcode(Eor, AbsoluteY, 4, true);
    t[0x41] = opcode(Eor, IndirectX, 6, false);
    t[0x51] = opcode(Eor, IndirectY, 5, true);

    t[0xC9] = opcode(Cmp, Immediate, 2, false);
    t[0xC5] = opcode(Cmp, ZeroPage, 3, false);
    t[0xD5] = opcode(Cmp, ZeroPageX, 4, false);
    t[0xCD] = opcode(Cmp, Absolute, 4, false);
    t[0xDD] = opcode(Cmp, AbsoluteX, 4, true);
    t[0xD9] = opcode(Cmp, AbsoluteY, 4, true);
    t[0xC1] = opcode(Cmp, IndirectX, 6, false);
    t[0xD1] = opcode(Cmp, IndirectY, 5, true);

    t[0xE0] = opcode(Cpx, Immediate, 2, false);
    t[0xE4] = opcode(Cpx, ZeroPage, 3, false);
    t[0xEC] = opcode(Cpx, Absolute, 4, false);

    t[0xC0] = opcode(Cpy, Immediate, 2, false);
    t[0xC4] = opcode(Cpy, ZeroPage, 3, false);
    t[0xCC] = opcode(Cpy, Absolute, 4, false);

    t[0x24] = opcode(Bit, ZeroPage, 3, false);
    t[0x2C] = opcode(Bit, Absolute, 4, false);

    t[0x0A] = opcode(Asl, Accumulator, 2, false);
    t[0x06] = opcode(Asl, ZeroPage, 5, false);
    t[0x16] = opcode(Asl, ZeroPageX, 6, false);
    t[0x0E] = opcode(Asl, Absolute, 6, false);
    t[0x1E] = opcode(Asl, AbsoluteX, 7, false);

    t[0x4A] = opcode(Lsr, Accumulator, 2, false);
    t[0x46] = opcode(Lsr, ZeroPage, 5, false);
    t[0x56] = opcode(Lsr, ZeroPageX, 6, false);
    t[0x4E] = opcode(Lsr, Absolute, 6, false);
    t[0x5E] = opcode(Lsr, AbsoluteX, 7, false);

    t[0x2A] = opcode(Rol, Accumulator, 2, false);
    t[0x26] = opcode(Rol, ZeroPage, 5, false);
    t[0x36] = opcode(Rol, ZeroPageX, 6, false);
    t[0x2E] = opcode(Rol, Absolute, 6, false);
    t[0x3E] = opcode(Rol, AbsoluteX, 7, false);

    t[0x6A] = opcode(Ror, Accumulator, 2, false);
    t[0x66] = opcode(Ror, ZeroPage, 5, false);
    t[0x76] = opcode(Ror, ZeroPageX, 6, false);
    t[0x6E] = opcode(Ror, Absolute, 6, false);
    t[0x7E] = opcode(Ror, AbsoluteX, 7, false);

    t[0xE6] = opcode(Inc, ZeroPage, 5, false);
    t[0xF6] = opcode(Inc, ZeroPageX, 6, false);
    t[0xEE] = opcode(Inc, Absolute, 6, false);
    t[0xFE] = opcode(Inc, AbsoluteX, 7, false);

    t[0xC6] = opcode(Dec, ZeroPage, 5, false);
    t[0xD6] = opcode(Dec, ZeroPageX, 6, false);
    t[0xCE] = opcode(Dec, Absolute, 6, false);
    t[0xDE] = opcode(Dec, AbsoluteX, 7, false);

    t[0xE8] = opcode(Inx, Implied, 2, false);
    t[0xC8] = opcode(Iny, Implied, 2, false);
    t[0xCA] = opcode(Dex, Implied, 2, false);
    t[0x88] = opcode(Dey, Implied, 2, false);

    t[0x10] = opcode(Bpl, Relative, 2, false);
    t[0x30] = opcode(Bmi, Relative, 2, false);
    t[0x50] = opcode(Bvc, Relative, 2, false);
    t[0x70] = opcode(Bvs, Relative, 2, false);
    t[0x90] = opcode(Bcc, Relative, 2, false);
    t[0xB0] = opcode(Bcs, Relative, 2, false);
    t[0xD0] = opcode(Bne, Relative, 2, false);
    t[0xF0] = opcode(Beq, Relative, 2, false);

    t[0x4C] = opcode(Jmp, Absolute, 3, false);
    t[0x6C] = opcode(Jmp, Indirect, 5, false);
    t[0x20] = opcode(Jsr, Absolute, 6, false);
    t[0x60] = opcode(Rts, Implied, 6, false);
    t[0x00] = opcode(Brk, Implied, 7, false);
    t[0x40] = opcode(Rti, Implied, 6, false);

    t[0x48] = opcode(Pha, Implied, 3, false);
    t[0x08] = opcode(Php, Implied, 3, false);
    t[0x68] = opcode(Pla, Implied, 4, false);
    t[0x28] = opcode(Plp, Implied, 4, false);

    t[0x18] = opcode(Clc, Implied, 2, false);
    t[0x38] = opcode(Sec, Implied, 2, false);
    t[0x58] = opcode(Cli, Implied, 2, false);
    t[0x78] = opcode(Sei, Implied, 2, false);
    t[0xD8] = opcode(Cld, Implied, 2, false);
    t[0xF8] = opcode(Sed, Implied, 2, false);
    t[0xB8] = opcode(Clv, Implied, 2, false);

    t[0xAA] = opcode(Tax, Implied, 2, false);
    t[0xA8] = opcode(Tay, Implied, 2, false);
    t[0xBA] = opcode(Tsx, Implied, 2, false);
    t[0x8A] = opcode(Txa, Implied, 2, false);
    t[0x9A] = opcode(Txs, Implied, 2, false);
    t[0x98] = opcode(Tya, Implied, 2, false);

    t[0xEA] = opcode(Nop, Implied, 2, false);

    t
};

fn page_crossed(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}

impl Nes {
    /// Fetches, decodes, and executes exactly one instruction, charging its
    /// base cycle cost plus any branch or page-cross penalty.
    ///
    /// An opcode byte with no table entry is fatal: continuing past it would
    /// desynchronize all subsequent timing, so the machine refuses to.
    pub fn execute_instruction(&mut self) -> Result<()> {
        let pc = self.pc;
        let opcode_byte = self.fetch_byte();

        if let Some(sink) = self.trace.as_mut() {
            sink.record(&TraceEvent {
                pc,
                opcode: opcode_byte,
                a: self.a,
                x: self.x,
                y: self.y,
                p: self.p,
                sp: self.sp,
                cycle: self.cycle,
            });
        }

        let Some(entry) = OPCODES[opcode_byte as usize] else {
            bail!("invalid opcode ${opcode_byte:02X} at ${pc:04X}");
        };

        self.cycle += entry.cycles as i64;

        match entry.op {
            Op::Lda => {
                let value = self.read_operand(entry);
                self.a = value;
                self.update_zn(value);
            }
            Op::Ldx => {
                let value = self.read_operand(entry);
                self.x = value;
                self.update_zn(value);
            }
            Op::Ldy => {
                let value = self.read_operand(entry);
                self.y = value;
                self.update_zn(value);
            }
            Op::Sta => {
                let addr = self.operand_address(entry.mode);
                self.write_byte(addr, self.a);
            }
            Op::Stx => {
                let addr = self.operand_address(entry.mode);
                self.write_byte(addr, self.x);
            }
            Op::Sty => {
                let addr = self.operand_address(entry.mode);
                self.write_byte(addr, self.y);
            }
            Op::Adc => {
                let value = self.read_operand(entry);
                self.add_with_carry(value);
            }
            Op::Sbc => {
                // Subtraction is addition of the operand's complement.
                let value = self.read_operand(entry);
                self.add_with_carry(!value);
            }
            Op::And => {
                let value = self.read_operand(entry);
                self.a &= value;
                self.update_zn(self.a);
            }
            Op::Ora => {
                let value = self.read_operand(entry);
                self.a |= value;
                self.update_zn(self.a);
            }
            Op::Eor => {
                let value = self.read_operand(entry);
                self.a ^= value;
                self.update_zn(self.a);
            }
            Op::Cmp => {
                let value = self.read_operand(entry);
                self.compare(self.a, value);
            }
            Op::Cpx => {
                let value = self.read_operand(entry);
                self.compare(self.x, value);
            }
            Op::Cpy => {
                let value = self.read_operand(entry);
                self.compare(self.y, value);
            }
            Op::Bit => {
                // Zero comes from the masked AND, negative/overflow from
                // bits 7/6 of the operand itself.
                let value = self.read_operand(entry);
                self.set_flag(FLAG_ZERO, self.a & value == 0);
                self.set_flag(FLAG_NEGATIVE, value & 0x80 != 0);
                self.set_flag(FLAG_OVERFLOW, value & 0x40 != 0);
            }
            Op::Asl => self.read_modify_write(entry.mode, Nes::shift_left),
            Op::Lsr => self.read_modify_write(entry.mode, Nes::shift_right),
            Op::Rol => self.read_modify_write(entry.mode, Nes::rotate_left),
            Op::Ror => self.read_modify_write(entry.mode, Nes::rotate_right),
            Op::Inc => self.read_modify_write(entry.mode, Nes::increment),
            Op::Dec => self.read_modify_write(entry.mode, Nes::decrement),
            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }
            Op::Bpl => self.branch(!self.get_flag(FLAG_NEGATIVE)),
            Op::Bmi => self.branch(self.get_flag(FLAG_NEGATIVE)),
            Op::Bvc => self.branch(!self.get_flag(FLAG_OVERFLOW)),
            Op::Bvs => self.branch(self.get_flag(FLAG_OVERFLOW)),
            Op::Bcc => self.branch(!self.get_flag(FLAG_CARRY)),
            Op::Bcs => self.branch(self.get_flag(FLAG_CARRY)),
            Op::Bne => self.branch(!self.get_flag(FLAG_ZERO)),
            Op::Beq => self.branch(self.get_flag(FLAG_ZERO)),
            Op::Jmp => {
                self.pc = if entry.mode == Mode::Indirect {
                    let ptr = self.fetch_word();
                    self.read_u16_wrapped(ptr)
                } else {
                    self.fetch_word()
                };
            }
            Op::Jsr => {
                let target = self.fetch_word();
                self.push_u16(self.pc.wrapping_sub(1));
                self.pc = target;
            }
            Op::Rts => {
                self.pc = self.pull_u16().wrapping_add(1);
            }
            Op::Brk => {
                self.push_u16(self.pc);
                self.push(self.p);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = self.read_u16(0xFFFE);
            }
            Op::Rti => {
                // Flags first, then the return address.
                self.p = self.pull();
                self.pc = self.pull_u16();
            }
            Op::Pha => self.push(self.a),
            Op::Php => self.push(self.p),
            Op::Pla => {
                self.a = self.pull();
                self.update_zn(self.a);
            }
            Op::Plp => self.p = self.pull(),
            Op::Clc => self.set_flag(FLAG_CARRY, false),
            Op::Sec => self.set_flag(FLAG_CARRY, true),
            Op::Cli => self.set_flag(FLAG_INTERRUPT, false),
            Op::Sei => self.set_flag(FLAG_INTERRUPT, true),
            Op::Cld => self.set_flag(FLAG_DECIMAL, false),
            Op::Sed => self.set_flag(FLAG_DECIMAL, true),
            Op::Clv => self.set_flag(FLAG_OVERFLOW, false),
            Op::Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Op::Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Op::Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
            }
            Op::Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Op::Txs => self.sp = self.x,
            Op::Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }
            Op::Nop => {}
        }

        Ok(())
    }

    fn read_operand(&mut self, entry: Opcode) -> u8 {
        if entry.mode == Mode::Immediate {
            return self.fetch_byte();
        }
        let (addr, crossed) = self.resolve_address(entry.mode);
        if entry.page_penalty && crossed {
            self.cycle += 1;
        }
        self.read_byte(addr)
    }

    fn operand_address(&mut self, mode: Mode) -> u16 {
        self.resolve_address(mode).0
    }

    fn resolve_address(&mut self, mode: Mode) -> (u16, bool) {
        match mode {
            Mode::ZeroPage => (self.fetch_byte() as u16, false),
            Mode::ZeroPageX => (self.fetch_byte().wrapping_add(self.x) as u16, false),
            Mode::ZeroPageY => (self.fetch_byte().wrapping_add(self.y) as u16, false),
            Mode::Absolute => (self.fetch_word(), false),
            Mode::AbsoluteX => {
                let base = self.fetch_word();
                let addr = base.wrapping_add(self.x as u16);
                (addr, page_crossed(base, addr))
            }
            Mode::AbsoluteY => {
                let base = self.fetch_word();
                let addr = base.wrapping_add(self.y as u16);
                (addr, page_crossed(base, addr))
            }
            Mode::IndirectX => {
                // Pre-indexing happens inside page zero, so no cross is
                // possible.
                let ptr = self.fetch_byte().wrapping_add(self.x);
                (self.read_zero_page_u16(ptr), false)
            }
            Mode::IndirectY => {
                let ptr = self.fetch_byte();
                let base = self.read_zero_page_u16(ptr);
                let addr = base.wrapping_add(self.y as u16);
                (addr, page_crossed(base, addr))
            }
            // Remaining modes carry no memory operand; the table never
            // pairs them with an address-taking operation.
            _ => (0, false),
        }
    }

    fn read_zero_page_u16(&mut self, addr: u8) -> u16 {
        let lo = self.read_byte(addr as u16) as u16;
        let hi = self.read_byte(addr.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    fn read_modify_write(&mut self, mode: Mode, apply: fn(&mut Nes, u8) -> u8) {
        if mode == Mode::Accumulator {
            let result = apply(self, self.a);
            self.a = result;
        } else {
            let addr = self.operand_address(mode);
            let value = self.read_byte(addr);
            let result = apply(self, value);
            self.write_byte(addr, result);
        }
    }

    fn branch(&mut self, condition: bool) {
        let offset = self.fetch_byte() as i8;
        if condition {
            self.cycle += 1;
            let previous = self.pc;
            self.pc = previous.wrapping_add(offset as i16 as u16);
            if page_crossed(previous, self.pc) {
                self.cycle += 1;
            }
        }
    }

    pub(crate) fn add_with_carry(&mut self, operand: u8) {
        let carry_in = u16::from(self.get_flag(FLAG_CARRY));
        let wide = self.a as u16 + operand as u16 + carry_in;
        let result = wide as u8;

        // Carry-out and signed overflow come from the sign bits, not a
        // magnitude comparison.
        self.set_flag(FLAG_CARRY, wide > 0xFF);
        self.set_flag(
            FLAG_OVERFLOW,
            (self.a ^ result) & (operand ^ result) & 0x80 != 0,
        );

        self.a = result;
        self.update_zn(result);
    }

    pub(crate) fn compare(&mut self, register: u8, operand: u8) {
        self.set_flag(FLAG_CARRY, register >= operand);
        self.update_zn(register.wrapping_sub(operand));
    }

    fn shift_left(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, value & 0x80 != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn shift_right(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, value & 0x01 != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rotate_left(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.get_flag(FLAG_CARRY));
        self.set_flag(FLAG_CARRY, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn rotate_right(&mut self, value: u8) -> u8 {
        let carry_in = if self.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, value & 0x01 != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn increment(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.update_zn(result);
        result
    }

    fn decrement(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.update_zn(result);
        result
    }
}
