//! Audio register bitfields.
//!
//! Grounded on the field names the teacher's (unfinished)
//! `core/src/parts/apu/{ch1,ch2,ch3,ch4}.rs` already reference (`duty`,
//! `pace`, `step`, `sign`, `ivol`, `clk_lo`, `clk_hi`, `trigger`, `length`,
//! `dac`, `vol`, `width`, `divide`, `shift`) and its `reg.rs` idiom of
//! `#[bitfield(u8, order = msb)]` via `bitfield_struct`; the teacher never
//! actually defines `Nr10`-`Nr44`, so their bit layouts here follow the
//! standard Game Boy audio register map.

use bitfield_struct::bitfield;

/// `$FF10`: CH1 period sweep.
#[bitfield(u8, order = msb)]
pub struct Nr10 {
    #[bits(1)]
    __: bool,
    #[bits(3)]
    pub pace: u8,
    #[bits(1)]
    pub sign: bool,
    #[bits(3)]
    pub step: u8,
}

/// `$FF11`/`$FF16`: length timer & duty cycle (shared layout for CH1/CH2).
#[bitfield(u8, order = msb)]
pub struct NrX1 {
    #[bits(2)]
    pub duty: usize,
    #[bits(6)]
    pub step: u8,
}

/// `$FF12`/`$FF17`/`$FF21`: volume & envelope (shared layout for CH1/CH2/CH4).
#[bitfield(u8, order = msb)]
pub struct NrX2 {
    #[bits(4)]
    pub ivol: u8,
    #[bits(1)]
    pub sign: bool,
    #[bits(3)]
    pub pace: u8,
}

/// `$FF13`/`$FF18`/`$FF1D`: period low (write-only, shared CH1/CH2/CH3).
#[bitfield(u8, order = msb)]
pub struct NrX3 {
    #[bits(8)]
    pub clk_lo: u8,
}

/// `$FF14`/`$FF19`/`$FF1E`/`$FF23`: period high & control (shared CH1-4).
#[bitfield(u8, order = msb)]
pub struct NrX4 {
    #[bits(1)]
    pub trigger: bool,
    #[bits(1)]
    pub length: bool,
    #[bits(3)]
    __: u8,
    #[bits(3)]
    pub clk_hi: u8,
}

/// `$FF1A`: CH3 DAC enable.
#[bitfield(u8, order = msb)]
pub struct Nr30 {
    #[bits(1)]
    pub dac: bool,
    #[bits(7)]
    __: u8,
}

/// `$FF1B`: CH3 length timer.
#[bitfield(u8, order = msb)]
pub struct Nr31 {
    #[bits(8)]
    pub step: u8,
}

/// `$FF1C`: CH3 output level.
#[bitfield(u8, order = msb)]
pub struct Nr32 {
    #[bits(1)]
    __: bool,
    #[bits(2)]
    pub vol: u8,
    #[bits(5)]
    __: u8,
}

/// `$FF20`: CH4 length timer.
#[bitfield(u8, order = msb)]
pub struct Nr41 {
    #[bits(2)]
    __: u8,
    #[bits(6)]
    pub step: u8,
}

/// `$FF22`: CH4 frequency & randomness.
#[bitfield(u8, order = msb)]
pub struct Nr43 {
    #[bits(4)]
    pub shift: u8,
    #[bits(1)]
    pub width: bool,
    #[bits(3)]
    pub divide: u8,
}

/// `$FF26`: Audio master control.
#[bitfield(u8, order = msb)]
pub struct Nr52 {
    #[bits(1)]
    pub enable: bool,
    #[bits(3)]
    __: u8,
    #[bits(1)]
    pub ch4_on: bool,
    #[bits(1)]
    pub ch3_on: bool,
    #[bits(1)]
    pub ch2_on: bool,
    #[bits(1)]
    pub ch1_on: bool,
}

/// `$FF25`: Sound panning.
#[bitfield(u8, order = msb)]
pub struct Nr51 {
    #[bits(1)]
    pub ch4_l: bool,
    #[bits(1)]
    pub ch3_l: bool,
    #[bits(1)]
    pub ch2_l: bool,
    #[bits(1)]
    pub ch1_l: bool,
    #[bits(1)]
    pub ch4_r: bool,
    #[bits(1)]
    pub ch3_r: bool,
    #[bits(1)]
    pub ch2_r: bool,
    #[bits(1)]
    pub ch1_r: bool,
}

/// `$FF24`: Master volume & VIN panning.
#[bitfield(u8, order = msb)]
pub struct Nr50 {
    #[bits(1)]
    pub vin_l: bool,
    #[bits(3)]
    pub vol_l: u8,
    #[bits(1)]
    pub vin_r: bool,
    #[bits(3)]
    pub vol_r: u8,
}
