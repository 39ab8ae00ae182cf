//! `CB`-prefixed opcode dispatch table.
//!
//! Grounded on the teacher's `core/src/parts/cpu/sm83/insn/exec/{rlc,rrc,
//! rl,rr,sla,sra,swap,srl,bit,res,set,prefix}.rs`: the same `r8`/bit-index
//! encoding (`aabbbrrr`: `aa` selects rotate/shift vs `BIT`/`RES`/`SET`,
//! `bbb` the sub-operation or bit index, `rrr` the operand register).

use super::{alu, Bus, Cpu, Reg8};

/// Executes one `CB`-prefixed instruction, returning the number of M-cycles
/// it consumed.
pub fn exec(cpu: &mut Cpu, bus: &mut impl Bus, op: u8) -> u32 {
    let reg = Reg8::decode(op);
    let indirect = reg == Reg8::HlInd;

    match op >> 6 {
        0b00 => {
            let value = cpu.get8(bus, reg);
            let res = match (op >> 3) & 0x7 {
                0b000 => alu::rlc(cpu, value, false),
                0b001 => alu::rrc(cpu, value, false),
                0b010 => alu::rl(cpu, value, false),
                0b011 => alu::rr(cpu, value, false),
                0b100 => alu::sla(cpu, value),
                0b101 => alu::sra(cpu, value),
                0b110 => alu::swap(cpu, value),
                _ => alu::srl(cpu, value),
            };
            cpu.set8(bus, reg, res);
            if indirect {
                4
            } else {
                2
            }
        }
        0b01 => {
            let value = cpu.get8(bus, reg);
            let bit = (op >> 3) & 0x7;
            alu::bit(cpu, value, bit);
            if indirect {
                3
            } else {
                2
            }
        }
        0b10 => {
            let value = cpu.get8(bus, reg);
            let bit = (op >> 3) & 0x7;
            let res = alu::res(value, bit);
            cpu.set8(bus, reg, res);
            if indirect {
                4
            } else {
                2
            }
        }
        _ => {
            let value = cpu.get8(bus, reg);
            let bit = (op >> 3) & 0x7;
            let res = alu::set(value, bit);
            cpu.set8(bus, reg, res);
            if indirect {
                4
            } else {
                2
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat(Vec<u8>);

    impl Bus for Flat {
        fn read(&mut self, addr: u16) -> u8 {
            self.0[usize::from(addr)]
        }
        fn write(&mut self, addr: u16, value: u8) {
            self.0[usize::from(addr)] = value;
        }
        fn tick(&mut self) {}
    }

    #[test]
    fn cb_swap_swaps_nibbles() {
        let mut cpu = Cpu::new();
        cpu.reg.a = 0x12;
        let mut bus = Flat(vec![0u8; 0x1_0000]);
        let cycles = exec(&mut cpu, &mut bus, 0x37); // SWAP A
        assert_eq!(cpu.reg.a, 0x21);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn cb_bit_on_hl_costs_three_cycles() {
        let mut cpu = Cpu::new();
        cpu.reg.set_hl(0x8000);
        let mut bus = Flat(vec![0u8; 0x1_0000]);
        let cycles = exec(&mut cpu, &mut bus, 0x46); // BIT 0, (HL)
        assert_eq!(cycles, 3);
    }
}
