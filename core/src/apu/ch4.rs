//! Channel 4: noise.
//!
//! Grounded on the teacher's `core/src/parts/apu/ch4.rs`.

use bitfield_struct::bitfield;
use log::{debug, trace};

use super::reg::{Nr41, Nr43, NrX2, NrX4};
use super::Envelope;

/// Linear feedback shift register.
#[bitfield(u16, order = msb)]
struct Lfsr {
    #[bits(1)]
    gen_hi: bool,
    #[bits(7)]
    __: u8,
    #[bits(1)]
    gen_lo: bool,
    #[bits(5)]
    __: u8,
    #[bits(1)]
    xor_hi: bool,
    #[bits(1)]
    xor_lo: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Channel {
    pub nr41: Nr41,
    pub nr42: NrX2,
    pub nr43: Nr43,
    pub nr44: NrX4,
    out: f32,
    ena: bool,
    clk: u16,
    len: u8,
    env: Envelope,
    lfsr: Lfsr,
}

impl Channel {
    #[must_use]
    pub fn out(&self) -> f32 {
        self.out
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.ena
    }

    pub fn write_nr44(&mut self, value: NrX4) {
        self.nr44 = value;
        if value.trigger() {
            self.trigger();
        }
    }

    fn trigger(&mut self) {
        debug!("ch4: trigger");
        self.nr44.set_trigger(false);

        self.ena = true;
        self.clk = self.frequency_timer();
        self.len = 0x40 - self.nr41.step();
        self.env.len = self.nr42.pace();
        self.env.vol = self.nr42.ivol();
        self.lfsr = Lfsr::default();
    }

    pub fn length(&mut self) {
        if !self.nr44.length() {
            return;
        }
        let Some(len) = self.len.checked_sub(1) else { return };
        trace!("ch4: length -> {len}");
        self.len = len;
        if len == 0 {
            debug!("ch4: disable (length timeout)");
            self.ena = false;
        }
    }

    pub fn volume(&mut self) {
        if self.nr42.pace() == 0 {
            return;
        }
        match self.env.len.checked_sub(1) {
            Some(len @ 1..) => {
                self.env.len = len;
                return;
            }
            _ => self.env.len = self.nr42.pace(),
        }
        let vol = if self.nr42.sign() {
            self.env.vol.saturating_add(1)
        } else {
            self.env.vol.saturating_sub(1)
        }
        .clamp(0, 15);
        self.env.vol = vol;
    }

    fn shift_random(&mut self) -> bool {
        let rand = !(self.lfsr.xor_hi() ^ self.lfsr.xor_lo());
        self.lfsr.set_gen_hi(rand);
        if self.nr43.width() {
            self.lfsr.set_gen_lo(rand);
        }
        self.lfsr.0 = self.lfsr.0.rotate_right(1);
        self.lfsr.gen_hi()
    }

    fn frequency_timer(&self) -> u16 {
        u16::from(match self.nr43.divide() {
            0 => 8,
            x => x << 4,
        }) << self.nr43.shift()
    }

    pub fn cycle(&mut self) {
        self.clk = match self.clk.checked_sub(1) {
            None | Some(0) => {
                self.shift_random();
                self.frequency_timer()
            }
            Some(clk) => clk,
        };

        let dac_on = self.nr42.ivol() > 0 || self.nr42.sign();
        self.out = if dac_on && self.ena {
            let amp = u8::from(self.lfsr.gen_hi()) * self.env.vol;
            (f32::from(amp) / 7.5) - 1.0
        } else {
            0.0
        };
    }

    pub fn reset(&mut self) {
        let regs = (self.nr41, self.nr42, self.nr43, self.nr44);
        *self = Self::default();
        (self.nr41, self.nr42, self.nr43, self.nr44) = regs;
    }
}
