//! Flag-setting arithmetic/logic/shift primitives shared by the unprefixed
//! and `CB`-prefixed opcode tables.
//!
//! Grounded on the teacher's per-opcode files under
//! `core/src/parts/cpu/sm83/insn/exec/{add,adc,sub,sbc,and,or,xor,cp,inc,
//! dec,incw,decw,daa,cpl,scf,rlca,rrca,rla,rra,rr,rlc,rrc,sra,srl,swap,bit,
//! res}.rs` — the flag formulas here are the same ones, collapsed from the
//! teacher's per-instruction `Fetch`/`Execute` stage enums into plain
//! functions since this core executes a whole instruction per [`super::Cpu::step`]
//! call.

use super::{Cpu, Flag};

pub fn add8(cpu: &mut Cpu, rhs: u8) {
    let acc = cpu.reg.a;
    let (res, carry) = acc.overflowing_add(rhs);
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, (acc & 0x0f) + (rhs & 0x0f) > 0x0f);
    Flag::C.set(&mut cpu.reg.f, carry);
}

pub fn adc8(cpu: &mut Cpu, rhs: u8) {
    let acc = cpu.reg.a;
    let carry_in = u8::from(Flag::C.get(cpu.reg.f));
    let res = acc.wrapping_add(rhs).wrapping_add(carry_in);
    let carry = u16::from(acc) + u16::from(rhs) + u16::from(carry_in) > 0xff;
    let half = (acc & 0x0f) + (rhs & 0x0f) + carry_in > 0x0f;
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, half);
    Flag::C.set(&mut cpu.reg.f, carry);
}

pub fn sub8(cpu: &mut Cpu, rhs: u8) {
    let acc = cpu.reg.a;
    let (res, borrow) = acc.overflowing_sub(rhs);
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, true);
    Flag::H.set(&mut cpu.reg.f, (acc & 0x0f) < (rhs & 0x0f));
    Flag::C.set(&mut cpu.reg.f, borrow);
}

pub fn sbc8(cpu: &mut Cpu, rhs: u8) {
    let acc = cpu.reg.a;
    let carry_in = u8::from(Flag::C.get(cpu.reg.f));
    let res = acc.wrapping_sub(rhs).wrapping_sub(carry_in);
    let borrow = i16::from(acc) - i16::from(rhs) - i16::from(carry_in) < 0;
    let half = i16::from(acc & 0x0f) - i16::from(rhs & 0x0f) - i16::from(carry_in) < 0;
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, true);
    Flag::H.set(&mut cpu.reg.f, half);
    Flag::C.set(&mut cpu.reg.f, borrow);
}

pub fn and8(cpu: &mut Cpu, rhs: u8) {
    let res = cpu.reg.a & rhs;
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, true);
    Flag::C.set(&mut cpu.reg.f, false);
}

pub fn or8(cpu: &mut Cpu, rhs: u8) {
    let res = cpu.reg.a | rhs;
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, false);
}

pub fn xor8(cpu: &mut Cpu, rhs: u8) {
    let res = cpu.reg.a ^ rhs;
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, false);
}

pub fn cp8(cpu: &mut Cpu, rhs: u8) {
    let acc = cpu.reg.a;
    sub8(cpu, rhs);
    cpu.reg.a = acc;
}

pub fn inc8(cpu: &mut Cpu, value: u8) -> u8 {
    let res = value.wrapping_add(1);
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, value & 0x0f == 0x0f);
    res
}

pub fn dec8(cpu: &mut Cpu, value: u8) -> u8 {
    let res = value.wrapping_sub(1);
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, true);
    Flag::H.set(&mut cpu.reg.f, value & 0x0f == 0);
    res
}

pub fn add16_hl(cpu: &mut Cpu, rhs: u16) {
    let hl = cpu.reg.hl();
    let (res, carry) = hl.overflowing_add(rhs);
    cpu.reg.set_hl(res);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, (hl & 0x0fff) + (rhs & 0x0fff) > 0x0fff);
    Flag::C.set(&mut cpu.reg.f, carry);
}

/// `ADD SP, e8` / `LD HL, SP+e8`: both use the same flag formula, computed
/// on the low byte of `SP` as if it were an 8-bit add against the unsigned
/// byte representation of the signed offset.
pub fn add_sp_e8(cpu: &mut Cpu, offset: i8) -> u16 {
    let sp = cpu.reg.sp;
    let rhs = offset as i16 as u16;
    let res = sp.wrapping_add(rhs);
    Flag::Z.set(&mut cpu.reg.f, false);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, (sp & 0x000f) + (rhs & 0x000f) > 0x000f);
    Flag::C.set(&mut cpu.reg.f, (sp & 0x00ff) + (rhs & 0x00ff) > 0x00ff);
    res
}

pub fn daa(cpu: &mut Cpu) {
    let sub = Flag::N.get(cpu.reg.f);
    let half = Flag::H.get(cpu.reg.f);
    let mut carry = Flag::C.get(cpu.reg.f);
    let mut adj = 0i16;
    let acc = cpu.reg.a;
    if half || (!sub && (acc & 0x0f) > 0x09) {
        adj |= 0x06;
    }
    if carry || (!sub && acc > 0x99) {
        adj |= 0x60;
        carry = true;
    }
    let adj = if sub { -adj } else { adj };
    let res = (i16::from(acc) + adj) as u8;
    cpu.reg.a = res;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, carry);
}

pub fn cpl(cpu: &mut Cpu) {
    cpu.reg.a = !cpu.reg.a;
    Flag::N.set(&mut cpu.reg.f, true);
    Flag::H.set(&mut cpu.reg.f, true);
}

pub fn scf(cpu: &mut Cpu) {
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, true);
}

pub fn ccf(cpu: &mut Cpu) {
    let carry = Flag::C.get(cpu.reg.f);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, !carry);
}

/// Rotate left, carry out to bit 0, through the carry flag (`RLC`/`RLCA`).
pub fn rlc(cpu: &mut Cpu, value: u8, clear_z: bool) -> u8 {
    let carry = value & 0x80 != 0;
    let res = value.rotate_left(1);
    set_rotate_flags(cpu, res, carry, clear_z);
    res
}

/// Rotate right, carry out to bit 7 (`RRC`/`RRCA`).
pub fn rrc(cpu: &mut Cpu, value: u8, clear_z: bool) -> u8 {
    let carry = value & 0x01 != 0;
    let res = value.rotate_right(1);
    set_rotate_flags(cpu, res, carry, clear_z);
    res
}

/// Rotate left through the carry flag (`RL`/`RLA`).
pub fn rl(cpu: &mut Cpu, value: u8, clear_z: bool) -> u8 {
    let carry_in = u8::from(Flag::C.get(cpu.reg.f));
    let carry_out = value & 0x80 != 0;
    let res = (value << 1) | carry_in;
    set_rotate_flags(cpu, res, carry_out, clear_z);
    res
}

/// Rotate right through the carry flag (`RR`/`RRA`).
pub fn rr(cpu: &mut Cpu, value: u8, clear_z: bool) -> u8 {
    let carry_in = u8::from(Flag::C.get(cpu.reg.f));
    let carry_out = value & 0x01 != 0;
    let res = (value >> 1) | (carry_in << 7);
    set_rotate_flags(cpu, res, carry_out, clear_z);
    res
}

fn set_rotate_flags(cpu: &mut Cpu, res: u8, carry: bool, clear_z: bool) {
    Flag::Z.set(&mut cpu.reg.f, !clear_z && res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, carry);
}

pub fn sla(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x80 != 0;
    let res = value << 1;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, carry);
    res
}

pub fn sra(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x01 != 0;
    let res = (value >> 1) | (value & 0x80);
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, carry);
    res
}

pub fn srl(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = value & 0x01 != 0;
    let res = value >> 1;
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, carry);
    res
}

pub fn swap(cpu: &mut Cpu, value: u8) -> u8 {
    let res = value.rotate_left(4);
    Flag::Z.set(&mut cpu.reg.f, res == 0);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, false);
    Flag::C.set(&mut cpu.reg.f, false);
    res
}

pub fn bit(cpu: &mut Cpu, value: u8, bit: u8) {
    let set = value & (1 << bit) != 0;
    Flag::Z.set(&mut cpu.reg.f, !set);
    Flag::N.set(&mut cpu.reg.f, false);
    Flag::H.set(&mut cpu.reg.f, true);
}

#[must_use]
pub fn res(value: u8, bit: u8) -> u8 {
    value & !(1 << bit)
}

#[must_use]
pub fn set(value: u8, bit: u8) -> u8 {
    value | (1 << bit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_sets_borrow_and_half_borrow() {
        let mut cpu = Cpu::new();
        cpu.reg.a = 0x00;
        sub8(&mut cpu, 0x01);
        assert_eq!(cpu.reg.a, 0xff);
        assert!(Flag::C.get(cpu.reg.f));
        assert!(Flag::H.get(cpu.reg.f));
        assert!(Flag::N.get(cpu.reg.f));
    }

    #[test]
    fn daa_corrects_bcd_addition() {
        let mut cpu = Cpu::new();
        cpu.reg.a = 0x09;
        add8(&mut cpu, 0x09); // 0x12, H set
        daa(&mut cpu);
        assert_eq!(cpu.reg.a, 0x18);
    }

    #[test]
    fn rlca_rotates_bit7_into_carry_and_bit0() {
        let mut cpu = Cpu::new();
        let res = rlc(&mut cpu, 0b1000_0001, true);
        assert_eq!(res, 0b0000_0011);
        assert!(Flag::C.get(cpu.reg.f));
        assert!(!Flag::Z.get(cpu.reg.f));
    }

    #[test]
    fn bit_sets_zero_flag_when_clear() {
        let mut cpu = Cpu::new();
        bit(&mut cpu, 0b0000_0000, 3);
        assert!(Flag::Z.get(cpu.reg.f));
        assert!(Flag::H.get(cpu.reg.f));
    }
}
