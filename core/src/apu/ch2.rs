//! Channel 2: pulse.
//!
//! Grounded on the teacher's `core/src/parts/apu/ch2.rs`.

use log::{debug, trace};

use super::reg::{NrX1, NrX2, NrX3, NrX4};
use super::{Envelope, WAVE};

#[derive(Clone, Copy, Debug, Default)]
pub struct Channel {
    pub nr21: NrX1,
    pub nr22: NrX2,
    pub nr23: NrX3,
    pub nr24: NrX4,
    out: f32,
    ena: bool,
    clk: u16,
    len: u8,
    env: Envelope,
    pos: u8,
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

    pub fn write_nr24(&mut self, value: NrX4) {
        self.nr24 = value;
        if value.trigger() {
            self.trigger();
        }
    }

    fn trigger(&mut self) {
        debug!("ch2: trigger");
        self.nr24.set_trigger(false);

        self.ena = true;
        self.clk = u16::from(self.nr23.clk_lo()) | (u16::from(self.nr24.clk_hi()) << 8);
        self.len = 0x40 - self.nr21.step();
        self.env.len = self.nr22.pace();
        self.env.vol = self.nr22.ivol();
        if self.pos == 0 {
            self.pos = 0b1000_0000;
        }
    }

    pub fn length(&mut self) {
        if !self.nr24.length() {
            return;
        }
        let Some(len) = self.len.checked_sub(1) else { return };
        trace!("ch2: length -> {len}");
        self.len = len;
        if len == 0 {
            debug!("ch2: disable (length timeout)");
            self.ena = false;
        }
    }

    pub fn volume(&mut self) {
        if self.nr22.pace() == 0 {
            return;
        }
        match self.env.len.checked_sub(1) {
            Some(len @ 1..) => {
                self.env.len = len;
                return;
            }
            _ => self.env.len = self.nr22.pace(),
        }
        let vol = if self.nr22.sign() {
            self.env.vol.saturating_add(1)
        } else {
            self.env.vol.saturating_sub(1)
        }
        .clamp(0, 15);
        self.env.vol = vol;
    }

    pub fn cycle(&mut self) {
        self.clk = match self.clk.wrapping_add(1) {
            0x800.. => {
                self.pos = self.pos.rotate_right(1);
                u16::from(self.nr23.clk_lo()) | (u16::from(self.nr24.clk_hi()) << 8)
            }
            x => x,
        };

        let dac_on = self.nr22.ivol() > 0 || self.nr22.sign();
        self.out = if dac_on && self.ena {
            let level = (WAVE[self.nr21.duty() as usize] & self.pos) != 0;
            let amp = u8::from(level) * self.env.vol;
            (f32::from(amp) / 7.5) - 1.0
        } else {
            0.0
        };
    }

    pub fn reset(&mut self) {
        let regs = (self.nr21, self.nr22, self.nr23, self.nr24);
        *self = Self::default();
        (self.nr21, self.nr22, self.nr23, self.nr24) = regs;
    }
}
