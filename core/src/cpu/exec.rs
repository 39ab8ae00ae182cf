//! Unprefixed opcode dispatch table.
//!
//! Grounded on `examples/kaplanz-rugby/core/src/parts/cpu/sm83/insn/{mod,
//! table,exec/*}.rs`: the opcode-to-operation mapping and `r8`/`r16`
//! encodings are the same ones the teacher's decode table uses, collapsed
//! from per-instruction `Fetch`/`Execute` stage enums into one function per
//! opcode, since a whole instruction now runs per [`super::Cpu::step`] call.

use super::{alu, Bus, Cpu, Flag, Reg16, Reg8};

/// Executes one unprefixed instruction, returning the number of M-cycles it
/// consumed.
pub fn exec(cpu: &mut Cpu, bus: &mut impl Bus, op: u8) -> u32 {
    match op {
        0x00 => 1, // NOP

        0x10 => {
            // STOP has a mandatory (and, on DMG, ignored) operand byte. A
            // pending CGB double-speed switch is armed by `Machine` before
            // issuing the opcode (it owns the `KEY1` register) by calling
            // `Cpu::request_speed_switch`.
            let arm_speed_switch = std::mem::take(&mut cpu.speed_switch_requested);
            let _ = cpu.fetchbyte(bus);
            cpu.stop(arm_speed_switch);
            2
        }

        0x76 => {
            cpu.halt(bus);
            1
        }

        0x40..=0x7f => ld_r8_r8(cpu, bus, op),

        0x01 | 0x11 | 0x21 | 0x31 => {
            let rr = Reg16::decode(op >> 4);
            let value = cpu.fetchword(bus);
            cpu.reg.set16(rr, value);
            3
        }
        0x03 | 0x13 | 0x23 | 0x33 => {
            let rr = Reg16::decode(op >> 4);
            let old = cpu.reg.get16(rr);
            if rr == Reg16::HL {
                bus.notify_oam_pointer(old, true);
            }
            cpu.reg.set16(rr, old.wrapping_add(1));
            bus.tick();
            2
        }
        0x0b | 0x1b | 0x2b | 0x3b => {
            let rr = Reg16::decode(op >> 4);
            let old = cpu.reg.get16(rr);
            if rr == Reg16::HL {
                bus.notify_oam_pointer(old, true);
            }
            cpu.reg.set16(rr, old.wrapping_sub(1));
            bus.tick();
            2
        }
        0x09 | 0x19 | 0x29 | 0x39 => {
            let rr = Reg16::decode(op >> 4);
            let rhs = cpu.reg.get16(rr);
            alu::add16_hl(cpu, rhs);
            bus.tick();
            2
        }

        0x02 => {
            bus.write(cpu.reg.bc(), cpu.reg.a);
            2
        }
        0x12 => {
            bus.write(cpu.reg.de(), cpu.reg.a);
            2
        }
        0x22 => {
            let hl = cpu.reg.hl();
            bus.write(hl, cpu.reg.a);
            cpu.reg.set_hl(hl.wrapping_add(1));
            2
        }
        0x32 => {
            let hl = cpu.reg.hl();
            bus.write(hl, cpu.reg.a);
            cpu.reg.set_hl(hl.wrapping_sub(1));
            2
        }
        0x0a => {
            cpu.reg.a = bus.read(cpu.reg.bc());
            2
        }
        0x1a => {
            cpu.reg.a = bus.read(cpu.reg.de());
            2
        }
        0x2a => {
            let hl = cpu.reg.hl();
            cpu.reg.a = bus.read(hl);
            cpu.reg.set_hl(hl.wrapping_add(1));
            2
        }
        0x3a => {
            let hl = cpu.reg.hl();
            cpu.reg.a = bus.read(hl);
            cpu.reg.set_hl(hl.wrapping_sub(1));
            2
        }

        0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x3c => {
            let r = Reg8::decode(op >> 3);
            let v = cpu.get8(bus, r);
            let res = alu::inc8(cpu, v);
            cpu.set8(bus, r, res);
            1
        }
        0x34 => {
            let v = cpu.readbyte(bus);
            let res = alu::inc8(cpu, v);
            cpu.writebyte(bus, res);
            3
        }
        0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x3d => {
            let r = Reg8::decode(op >> 3);
            let v = cpu.get8(bus, r);
            let res = alu::dec8(cpu, v);
            cpu.set8(bus, r, res);
            1
        }
        0x35 => {
            let v = cpu.readbyte(bus);
            let res = alu::dec8(cpu, v);
            cpu.writebyte(bus, res);
            3
        }

        0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x3e => {
            let r = Reg8::decode(op >> 3);
            let v = cpu.fetchbyte(bus);
            cpu.set8(bus, r, v);
            if r == Reg8::HlInd {
                3
            } else {
                2
            }
        }
        0x36 => {
            let v = cpu.fetchbyte(bus);
            cpu.writebyte(bus, v);
            3
        }

        0x07 => {
            let res = alu::rlc(cpu, cpu.reg.a, true);
            cpu.reg.a = res;
            1
        }
        0x0f => {
            let res = alu::rrc(cpu, cpu.reg.a, true);
            cpu.reg.a = res;
            1
        }
        0x17 => {
            let res = alu::rl(cpu, cpu.reg.a, true);
            cpu.reg.a = res;
            1
        }
        0x1f => {
            let res = alu::rr(cpu, cpu.reg.a, true);
            cpu.reg.a = res;
            1
        }
        0x27 => {
            alu::daa(cpu);
            1
        }
        0x2f => {
            alu::cpl(cpu);
            1
        }
        0x37 => {
            alu::scf(cpu);
            1
        }
        0x3f => {
            alu::ccf(cpu);
            1
        }

        0x08 => {
            let addr = cpu.fetchword(bus);
            let [lo, hi] = cpu.reg.sp.to_le_bytes();
            bus.write(addr, lo);
            bus.write(addr.wrapping_add(1), hi);
            5
        }

        0x18 => {
            jr(cpu, bus, true)
        }
        0x20 => jr(cpu, bus, !Flag::Z.get(cpu.reg.f)),
        0x28 => jr(cpu, bus, Flag::Z.get(cpu.reg.f)),
        0x30 => jr(cpu, bus, !Flag::C.get(cpu.reg.f)),
        0x38 => jr(cpu, bus, Flag::C.get(cpu.reg.f)),

        0xc2 => jp(cpu, bus, !Flag::Z.get(cpu.reg.f)),
        0xca => jp(cpu, bus, Flag::Z.get(cpu.reg.f)),
        0xd2 => jp(cpu, bus, !Flag::C.get(cpu.reg.f)),
        0xda => jp(cpu, bus, Flag::C.get(cpu.reg.f)),
        0xc3 => jp(cpu, bus, true),
        0xe9 => {
            cpu.reg.pc = cpu.reg.hl();
            1
        }

        0xc4 => call(cpu, bus, !Flag::Z.get(cpu.reg.f)),
        0xcc => call(cpu, bus, Flag::Z.get(cpu.reg.f)),
        0xd4 => call(cpu, bus, !Flag::C.get(cpu.reg.f)),
        0xdc => call(cpu, bus, Flag::C.get(cpu.reg.f)),
        0xcd => call(cpu, bus, true),

        0xc0 => ret(cpu, bus, !Flag::Z.get(cpu.reg.f), true),
        0xc8 => ret(cpu, bus, Flag::Z.get(cpu.reg.f), true),
        0xd0 => ret(cpu, bus, !Flag::C.get(cpu.reg.f), true),
        0xd8 => ret(cpu, bus, Flag::C.get(cpu.reg.f), true),
        0xc9 => ret(cpu, bus, true, false),
        0xd9 => {
            let cycles = ret(cpu, bus, true, false);
            cpu.enable_interrupts_immediate();
            cycles
        }

        0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
            bus.tick();
            cpu.pushword(bus, cpu.reg.pc);
            cpu.reg.pc = u16::from(op & 0x38);
            4
        }

        0xc1 | 0xd1 | 0xe1 | 0xf1 => {
            let value = cpu.popword(bus);
            match op {
                0xc1 => cpu.reg.set_bc(value),
                0xd1 => cpu.reg.set_de(value),
                0xe1 => cpu.reg.set_hl(value),
                _ => cpu.reg.set_af(value),
            }
            3
        }
        0xc5 | 0xd5 | 0xe5 | 0xf5 => {
            bus.tick();
            let value = match op {
                0xc5 => cpu.reg.bc(),
                0xd5 => cpu.reg.de(),
                0xe5 => cpu.reg.hl(),
                _ => cpu.reg.af(),
            };
            cpu.pushword(bus, value);
            4
        }

        0x80..=0x87 => alu_op(cpu, bus, op, alu::add8),
        0x88..=0x8f => alu_op(cpu, bus, op, alu::adc8),
        0x90..=0x97 => alu_op(cpu, bus, op, alu::sub8),
        0x98..=0x9f => alu_op(cpu, bus, op, alu::sbc8),
        0xa0..=0xa7 => alu_op(cpu, bus, op, alu::and8),
        0xa8..=0xaf => alu_op(cpu, bus, op, alu::xor8),
        0xb0..=0xb7 => alu_op(cpu, bus, op, alu::or8),
        0xb8..=0xbf => alu_op(cpu, bus, op, alu::cp8),

        0xc6 => imm_alu_op(cpu, bus, alu::add8),
        0xce => imm_alu_op(cpu, bus, alu::adc8),
        0xd6 => imm_alu_op(cpu, bus, alu::sub8),
        0xde => imm_alu_op(cpu, bus, alu::sbc8),
        0xe6 => imm_alu_op(cpu, bus, alu::and8),
        0xee => imm_alu_op(cpu, bus, alu::xor8),
        0xf6 => imm_alu_op(cpu, bus, alu::or8),
        0xfe => imm_alu_op(cpu, bus, alu::cp8),

        0xe0 => {
            let off = cpu.fetchbyte(bus);
            bus.write(0xff00 | u16::from(off), cpu.reg.a);
            3
        }
        0xf0 => {
            let off = cpu.fetchbyte(bus);
            cpu.reg.a = bus.read(0xff00 | u16::from(off));
            3
        }
        0xe2 => {
            bus.write(0xff00 | u16::from(cpu.reg.c), cpu.reg.a);
            2
        }
        0xf2 => {
            cpu.reg.a = bus.read(0xff00 | u16::from(cpu.reg.c));
            2
        }
        0xea => {
            let addr = cpu.fetchword(bus);
            bus.write(addr, cpu.reg.a);
            4
        }
        0xfa => {
            let addr = cpu.fetchword(bus);
            cpu.reg.a = bus.read(addr);
            4
        }

        0xe8 => {
            let off = cpu.fetchbyte(bus) as i8;
            let res = alu::add_sp_e8(cpu, off);
            bus.tick();
            bus.tick();
            cpu.reg.sp = res;
            4
        }
        0xf8 => {
            let off = cpu.fetchbyte(bus) as i8;
            let res = alu::add_sp_e8(cpu, off);
            bus.tick();
            cpu.reg.set_hl(res);
            3
        }
        0xf9 => {
            cpu.reg.sp = cpu.reg.hl();
            bus.tick();
            2
        }

        0xf3 => {
            cpu.disable_interrupts();
            1
        }
        0xfb => {
            cpu.enable_interrupts_delayed();
            1
        }

        // Unused opcodes (0xd3, 0xdb, 0xdd, 0xe3, 0xe4, 0xeb..0xed, 0xf4,
        // 0xfc, 0xfd): real hardware locks up. We treat them as a one-cycle
        // no-op rather than hanging the emulator.
        _ => 1,
    }
}

fn ld_r8_r8(cpu: &mut Cpu, bus: &mut impl Bus, op: u8) -> u32 {
    let dst = Reg8::decode(op >> 3);
    let src = Reg8::decode(op);
    let value = cpu.get8(bus, src);
    cpu.set8(bus, dst, value);
    if dst == Reg8::HlInd || src == Reg8::HlInd {
        2
    } else {
        1
    }
}

fn alu_op(cpu: &mut Cpu, bus: &mut impl Bus, op: u8, f: fn(&mut Cpu, u8)) -> u32 {
    let src = Reg8::decode(op);
    let value = cpu.get8(bus, src);
    f(cpu, value);
    if src == Reg8::HlInd {
        2
    } else {
        1
    }
}

fn imm_alu_op(cpu: &mut Cpu, bus: &mut impl Bus, f: fn(&mut Cpu, u8)) -> u32 {
    let value = cpu.fetchbyte(bus);
    f(cpu, value);
    2
}

fn jr(cpu: &mut Cpu, bus: &mut impl Bus, cond: bool) -> u32 {
    let off = cpu.fetchbyte(bus) as i8;
    if cond {
        bus.tick();
        cpu.reg.pc = cpu.reg.pc.wrapping_add(off as i16 as u16);
        3
    } else {
        2
    }
}

fn jp(cpu: &mut Cpu, bus: &mut impl Bus, cond: bool) -> u32 {
    let addr = cpu.fetchword(bus);
    if cond {
        bus.tick();
        cpu.reg.pc = addr;
        4
    } else {
        3
    }
}

fn call(cpu: &mut Cpu, bus: &mut impl Bus, cond: bool) -> u32 {
    let addr = cpu.fetchword(bus);
    if cond {
        bus.tick();
        cpu.pushword(bus, cpu.reg.pc);
        cpu.reg.pc = addr;
        6
    } else {
        3
    }
}

fn ret(cpu: &mut Cpu, bus: &mut impl Bus, cond: bool, conditional: bool) -> u32 {
    if conditional {
        bus.tick();
    }
    if cond {
        let addr = cpu.popword(bus);
        cpu.reg.pc = addr;
        bus.tick();
        if conditional {
            5
        } else {
            4
        }
    } else {
        2
    }
}
