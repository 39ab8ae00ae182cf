//! Picture processing unit.
//!
//! Grounded on the teacher's `core/src/parts/ppu/mod.rs`, with the
//! `Shared<RefCell<_>>` register file and the `Bank`'s shared VRAM/OAM
//! replaced by plain fields owned directly by [`Ppu`] (`SPEC_FULL.md` §A),
//! and the mode/fetcher/FIFO submodules reassembled from
//! `core/src/parts/ppu/{exec,blk,meta}/*.rs` into `mode.rs`/`fetch.rs`/
//! `fifo.rs`/`sprite.rs`/`lcd.rs`.
//!
//! CGB VRAM banking and the BG/OBJ palette RAM (`BCPS`/`BCPD`/`OCPS`/`OCPD`)
//! are modeled as addressable registers (`spec.md`'s PPU module covers both
//! DMG and CGB systems); full per-tile CGB attribute-driven compositing in
//! the fetcher is not — see `DESIGN.md`.

mod fetch;
mod fifo;
mod lcd;
mod mode;
mod sprite;

use gb_arch::{Bitmask, Byte};

use crate::api::video::{Video, HEIGHT, WIDTH};
use crate::model::{ColorCorrection, Model};
use crate::pic::Pic;

pub use self::lcd::{Color, Frame, Palette, RATE};
pub use self::mode::Mode;

/// Video RAM: 8 KiB per bank, 2 banks on CGB.
pub type Vram = [u8; 0x2000];
/// Object attribute memory.
pub type Oam = [u8; 0xa0];

/// `LCDC` control bits.
#[derive(Clone, Copy, Debug)]
enum Lcdc {
    Enable = 0b1000_0000,
    WinMap = 0b0100_0000,
    WinEnable = 0b0010_0000,
    BgWinData = 0b0001_0000,
    BgMap = 0b0000_1000,
    ObjSize = 0b0000_0100,
    ObjEnable = 0b0000_0010,
    BgWinEnable = 0b0000_0001,
}

impl From<Lcdc> for Byte {
    fn from(bit: Lcdc) -> Self {
        bit as Byte
    }
}

/// `$FF40`-`$FF4B`/`$FF4F`/`$FF68`-`$FF6B` register select.
#[derive(Clone, Copy, Debug)]
pub enum Select {
    Lcdc,
    Stat,
    Scy,
    Scx,
    Ly,
    Lyc,
    Bgp,
    Obp0,
    Obp1,
    Wy,
    Wx,
    Vbk,
    Bcps,
    Bcpd,
    Ocps,
    Ocpd,
}

/// Picture processing unit.
#[derive(Debug)]
pub struct Ppu {
    model: Model,

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// `$FF4F`: VRAM bank select (CGB only; bit 0).
    vbk: u8,
    /// `$FF68`: BG palette index/auto-increment.
    bcps: u8,
    /// 8 palettes x 4 colors x 2 bytes (RGB555), CGB only.
    bg_pal: [u8; 64],
    /// `$FF6A`: OBJ palette index/auto-increment.
    ocps: u8,
    obj_pal: [u8; 64],

    vram: [Vram; 2],
    oam: Oam,

    dot: u16,
    ywin: u8,
    mode: Mode,
    buf: Frame,

    /// Level of the combined STAT-interrupt source line as of the last
    /// `dot == 0` check, so [`mode::Mode::exec`] can raise on a 0→1
    /// transition instead of re-raising every line a source stays high
    /// (`spec.md` §8 invariant 6).
    stat_line: bool,

    /// Host-supplied override for the four DMG shades, set via
    /// `Machine::set_palette` (`spec.md` §6). `None` uses [`Color::dmg_rgb`].
    custom_palette: Option<[(u8, u8, u8); 4]>,

    /// Set via `Machine::set_rendering_disabled`. Mode timing and interrupts
    /// run unchanged; only [`Ppu::encode`]'s output is suppressed
    /// (`spec.md` §4.5, "Failure modes").
    rendering_disabled: bool,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new(Model::Dmg)
    }
}

impl Ppu {
    #[must_use]
    pub fn new(model: Model) -> Self {
        Self {
            model,
            lcdc: 0x91,
            stat: 0x85,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0xfc,
            obp0: 0xff,
            obp1: 0xff,
            wy: 0,
            wx: 0,
            vbk: 0,
            bcps: 0,
            bg_pal: [0xff; 64],
            ocps: 0,
            obj_pal: [0xff; 64],
            vram: [[0; 0x2000]; 2],
            oam: [0; 0xa0],
            dot: 0,
            ywin: 0,
            mode: Mode::default(),
            buf: mode::blank_frame(),
            stat_line: false,
            custom_palette: None,
            rendering_disabled: false,
        }
    }

    /// Overrides the four DMG shades used by [`Ppu::encode`]; `None`
    /// restores the built-in greenish-gray palette.
    pub fn set_custom_palette(&mut self, palette: Option<[(u8, u8, u8); 4]>) {
        self.custom_palette = palette;
    }

    /// Suppresses [`Ppu::encode`]'s framebuffer output while leaving mode
    /// timing and interrupts untouched.
    pub fn set_rendering_disabled(&mut self, disabled: bool) {
        self.rendering_disabled = disabled;
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.lcdc(Lcdc::Enable)
    }

    #[must_use]
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    #[must_use]
    pub fn screen(&self) -> &Frame {
        &self.buf
    }

    fn lcdc(&self, bit: Lcdc) -> bool {
        self.lcdc.test(bit)
    }

    /// Reads a VRAM byte from a specific bank (used by the fetcher, which
    /// always targets bank 0 on DMG).
    pub(crate) fn vram_fetch(&self, addr: u16) -> u8 {
        self.vram[0][usize::from(addr)]
    }

    /// CPU/DMA-facing VRAM access. Blocked (returns `0xff`) during mode 3,
    /// matching the teacher's bus-level blocking behaviour.
    #[must_use]
    pub fn read_vram(&self, addr: u16) -> u8 {
        if matches!(self.mode, Mode::Draw(_)) {
            return 0xff;
        }
        self.vram[usize::from(self.vbk & 0x01)][usize::from(addr)]
    }

    pub fn write_vram(&mut self, addr: u16, value: u8) {
        if matches!(self.mode, Mode::Draw(_)) {
            return;
        }
        self.vram[usize::from(self.vbk & 0x01)][usize::from(addr)] = value;
    }

    /// Raw VRAM write used by HDMA/general DMA, targeting the currently
    /// selected bank and never blocked by mode (the DMA controller owns
    /// the VRAM bus for the duration of its transfer).
    pub fn write_vram_raw(&mut self, addr: u16, value: u8) {
        let bank = usize::from(self.vbk & 0x01);
        self.vram[bank][usize::from(addr)] = value;
    }

    #[must_use]
    pub fn read_oam(&self, addr: u8) -> u8 {
        if matches!(self.mode, Mode::Scan(_) | Mode::Draw(_)) {
            return 0xff;
        }
        self.oam[usize::from(addr)]
    }

    pub fn write_oam(&mut self, addr: u8, value: u8) {
        if matches!(self.mode, Mode::Scan(_) | Mode::Draw(_)) {
            return;
        }
        self.oam[usize::from(addr)] = value;
    }

    /// Direct OAM access for [`crate::dma::OamDma`], which bypasses mode
    /// blocking (the DMA controller, not the CPU, owns the bus during a
    /// transfer).
    pub fn oam_mut(&mut self) -> &mut Oam {
        &mut self.oam
    }

    /// DMG-only OAM row-corruption glitch (`spec.md` §4.1's "OAM bug"): a
    /// 16-bit register pointing into OAM during mode 2 scrambles the
    /// addressed row with a `(b&c)|(a&(b^c))` mix of its two predecessor
    /// rows. `row` is a 0-19 index (`addr / 8`); `four_source` selects the
    /// INC/DEC-on-HL "read-increase" variant, which additionally folds the
    /// mix back into the row two behind.
    pub(crate) fn corrupt_oam_row(&mut self, row: usize, four_source: bool) {
        const ROWS: usize = 0xa0 / 8;
        if !matches!(self.mode, Mode::Scan(_)) || row < 2 || row >= ROWS {
            return;
        }
        let read_row = |oam: &Oam, r: usize| -> [u8; 8] {
            let mut out = [0u8; 8];
            out.copy_from_slice(&oam[r * 8..r * 8 + 8]);
            out
        };
        let mix = |a: u8, b: u8, c: u8| (b & c) | (a & (b ^ c));

        let prev2 = read_row(&self.oam, row - 2);
        let prev1 = read_row(&self.oam, row - 1);
        let cur = read_row(&self.oam, row);

        let mut glitched = [0u8; 8];
        for i in 0..8 {
            glitched[i] = mix(prev2[i], prev1[i], cur[i]);
        }
        self.oam[row * 8..row * 8 + 8].copy_from_slice(&glitched);

        if four_source {
            let mut glitched2 = [0u8; 8];
            for i in 0..8 {
                glitched2[i] = mix(cur[i], prev1[i], prev2[i]);
            }
            self.oam[(row - 2) * 8..(row - 2) * 8 + 8].copy_from_slice(&glitched2);
        }
    }

    /// Unblocked, unmediated OAM access for `Machine::direct_access`.
    #[must_use]
    pub fn oam(&self) -> &Oam {
        &self.oam
    }

    /// Unblocked, unmediated access to one VRAM bank, for
    /// `Machine::direct_access`. Bank 1 only exists on CGB.
    #[must_use]
    pub fn vram_bank(&self, bank: usize) -> &Vram {
        &self.vram[bank & 0x01]
    }

    /// The 64-byte `BCPD`-addressed BG palette RAM, for
    /// `Machine::direct_access`.
    #[must_use]
    pub fn bg_palette_ram(&self) -> &[u8; 64] {
        &self.bg_pal
    }

    /// The 64-byte `OCPD`-addressed OBJ palette RAM, for
    /// `Machine::direct_access`.
    #[must_use]
    pub fn obj_palette_ram(&self) -> &[u8; 64] {
        &self.obj_pal
    }

    fn recolor(&self, pixel: &fifo::Pixel) -> Color {
        let pal = match pixel.meta.pal {
            Palette::BgWin => self.bgp,
            Palette::Obp0 => self.obp0,
            Palette::Obp1 => self.obp1,
        };
        pixel.col.recolor(pal)
    }

    /// Converts the monochrome framebuffer into host RGB pixels, applying
    /// the configured CGB color-correction curve to `bgp`-style shades.
    #[must_use]
    pub fn encode(&self, correction: ColorCorrection) -> [u32; WIDTH * HEIGHT] {
        // Full per-tile CGB palette compositing is not wired into the
        // fetcher yet (see module doc), so CGB frames still render through
        // the DMG shade table regardless of `correction`.
        let _ = correction;
        if self.rendering_disabled {
            let (r, g, b) = Color::C0.dmg_rgb();
            return [(u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b); WIDTH * HEIGHT];
        }
        let mut out = [0u32; WIDTH * HEIGHT];
        for (slot, color) in out.iter_mut().zip(self.buf.iter()) {
            let (r, g, b) = match self.custom_palette {
                Some(shades) => shades[color.shade_index()],
                None => color.dmg_rgb(),
            };
            *slot = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        }
        out
    }

    pub fn read(&self, reg: Select) -> u8 {
        match reg {
            Select::Lcdc => self.lcdc,
            Select::Stat => self.stat | 0x80,
            Select::Scy => self.scy,
            Select::Scx => self.scx,
            Select::Ly => self.ly,
            Select::Lyc => self.lyc,
            Select::Bgp => self.bgp,
            Select::Obp0 => self.obp0,
            Select::Obp1 => self.obp1,
            Select::Wy => self.wy,
            Select::Wx => self.wx,
            Select::Vbk => self.vbk | 0xfe,
            Select::Bcps => self.bcps,
            Select::Bcpd => self.bg_pal[usize::from(self.bcps & 0x3f)],
            Select::Ocps => self.ocps,
            Select::Ocpd => self.obj_pal[usize::from(self.ocps & 0x3f)],
        }
    }

    pub fn write(&mut self, reg: Select, value: u8) {
        match reg {
            Select::Lcdc => self.lcdc = value,
            // Mode bits and the LYC=LY flag are read-only; only the
            // interrupt-source bits are writable.
            Select::Stat => self.stat = (self.stat & 0x07) | (value & 0x78),
            Select::Scy => self.scy = value,
            Select::Scx => self.scx = value,
            Select::Ly => {}
            Select::Lyc => self.lyc = value,
            Select::Bgp => self.bgp = value,
            Select::Obp0 => self.obp0 = value,
            Select::Obp1 => self.obp1 = value,
            Select::Wy => self.wy = value,
            Select::Wx => self.wx = value,
            Select::Vbk => self.vbk = value & 0x01,
            Select::Bcps => self.bcps = value & 0xbf,
            Select::Bcpd => {
                let idx = usize::from(self.bcps & 0x3f);
                self.bg_pal[idx] = value;
                if self.bcps & 0x80 != 0 {
                    self.bcps = 0x80 | ((self.bcps + 1) & 0x3f);
                }
            }
            Select::Ocps => self.ocps = value & 0xbf,
            Select::Ocpd => {
                let idx = usize::from(self.ocps & 0x3f);
                self.obj_pal[idx] = value;
                if self.ocps & 0x80 != 0 {
                    self.ocps = 0x80 | ((self.ocps + 1) & 0x3f);
                }
            }
        }
    }

    /// Whether the current frame is ready to be delivered to the host
    /// (`spec.md` §4.5's vblank-callback condition).
    #[must_use]
    fn vsync(&self) -> bool {
        self.enabled()
            && matches!(self.mode, Mode::VBlank(_))
            && u16::from(self.ly) == HEIGHT as u16 + 10 - 1
            && self.dot == lcd::DOTS_PER_LINE - 1
    }

    /// Advances the PPU by one T-cycle. Calls back into `video` at the
    /// moment a frame becomes ready.
    pub fn cycle(&mut self, pic: &mut Pic, video: &mut dyn Video, correction: ColorCorrection) {
        if !self.enabled() {
            // LCD off: timing free-runs but nothing is scanned or drawn;
            // the host still receives a steady cadence of blank frames.
            self.dot += 1;
            if u32::from(self.dot) + u32::from(self.ly) * u32::from(lcd::DOTS_PER_LINE) >= RATE {
                self.dot = 0;
                self.ly = 0;
                video.vblank(&self.encode(correction));
            }
            return;
        }

        self.mode = std::mem::take(&mut self.mode).exec(self, pic);

        if self.vsync() {
            video.vblank(&self.encode(correction));
        }
    }

    pub fn reset(&mut self) {
        let model = self.model;
        let palette = self.custom_palette;
        let rendering_disabled = self.rendering_disabled;
        *self = Self::new(model);
        self.custom_palette = palette;
        self.rendering_disabled = rendering_disabled;
    }
}

impl gb_arch::Block for Ppu {
    fn reset(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pic::Interrupt;

    #[derive(Default)]
    struct CountSink(u32);

    impl Video for CountSink {
        fn vblank(&mut self, _frame: &[u32; WIDTH * HEIGHT]) {
            self.0 += 1;
        }
    }

    #[test]
    fn mode_cycles_scan_draw_hblank_over_one_scanline() {
        let mut ppu = Ppu::new(Model::Dmg);
        let mut pic = Pic::default();
        let mut sink = CountSink::default();

        for _ in 0..80 {
            assert!(matches!(ppu.mode(), Mode::Scan(_)));
            ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
        }
        assert!(matches!(ppu.mode(), Mode::Draw(_)));

        // Draw mode always runs at least 172 dots; run comfortably past
        // the worst case (172 + up to 11 scx-discard + sprite stalls).
        for _ in 0..200 {
            if matches!(ppu.mode(), Mode::HBlank(_)) {
                break;
            }
            ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
        }
        assert!(matches!(ppu.mode(), Mode::HBlank(_)));
    }

    #[test]
    fn full_frame_triggers_exactly_one_vblank_callback() {
        let mut ppu = Ppu::new(Model::Dmg);
        let mut pic = Pic::default();
        let mut sink = CountSink::default();

        for _ in 0..RATE {
            ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
        }
        assert_eq!(sink.0, 1);
    }

    #[test]
    fn stat_interrupt_fires_on_mode2_entry_when_enabled() {
        let mut ppu = Ppu::new(Model::Dmg);
        ppu.write(Select::Stat, 0b0010_0000); // enable OAM (mode 2) source
        let mut pic = Pic::default();
        let mut sink = CountSink::default();

        // The PPU starts in mode 2 at dot 0, so the very first cycle
        // should immediately latch the STAT interrupt.
        ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
        assert!(pic.read_if() & Interrupt::LcdStat as u8 != 0);
    }

    #[test]
    fn disabled_lcd_still_produces_blank_frames_on_cadence() {
        let mut ppu = Ppu::new(Model::Dmg);
        ppu.write(Select::Lcdc, 0x00); // LCD off
        let mut pic = Pic::default();
        let mut sink = CountSink::default();

        for _ in 0..RATE {
            ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
        }
        assert_eq!(sink.0, 1);
        assert!(ppu.screen().iter().all(|c| *c == Color::C0));
    }

    #[test]
    fn bcpd_auto_increments_when_top_bit_set() {
        let mut ppu = Ppu::new(Model::Cgb);
        ppu.write(Select::Bcps, 0x80); // index 0, auto-increment
        ppu.write(Select::Bcpd, 0x34);
        ppu.write(Select::Bcpd, 0x12);
        assert_eq!(ppu.bg_pal[0], 0x34);
        assert_eq!(ppu.bg_pal[1], 0x12);
        assert_eq!(ppu.read(Select::Bcps) & 0x3f, 2);
    }

    /// `spec.md` §8's S3 scenario: with only the LY=LYC source enabled,
    /// stepping across that line's transition from the line before it
    /// raises the STAT interrupt exactly once, not once per T-cycle the
    /// condition happens to still read true.
    #[test]
    fn ly_eq_lyc_raises_stat_interrupt_exactly_once_across_the_line() {
        let mut ppu = Ppu::new(Model::Dmg);
        ppu.write(Select::Stat, 0b0100_0000); // enable only the LY=LYC source
        ppu.write(Select::Lyc, 0x8f);
        let mut pic = Pic::default();
        let mut sink = CountSink::default();

        // Run until LY reaches the line before the target, so the whole
        // 0x8e -> 0x8f transition (and the full 0x8f line after it) is
        // observed below.
        while ppu.ly != 0x8e {
            ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
        }

        let mut raises = 0;
        for _ in 0..u32::from(lcd::DOTS_PER_LINE) * 2 {
            let was_pending = pic.read_if() & Interrupt::LcdStat as u8 != 0;
            ppu.cycle(&mut pic, &mut sink, ColorCorrection::Disabled);
            let now_pending = pic.read_if() & Interrupt::LcdStat as u8 != 0;
            if now_pending && !was_pending {
                raises += 1;
            }
        }
        assert_eq!(raises, 1);
        assert_eq!(ppu.ly, 0x90);
    }
}
