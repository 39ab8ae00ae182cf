//! The four-mode scanline state machine.
//!
//! Grounded on the teacher's `core/src/parts/ppu/exec/{mod,scan,draw,hblank,
//! vblank}.rs`, with the `Shared<Byte>` register loads replaced by plain
//! field reads on [`Ppu`] and the interrupt line replaced by an explicit
//! `&mut Pic` threaded through [`Mode::exec`].

use log::{debug, trace};

use super::fetch::{Layer, Pipeline};
use super::lcd::{Color, DOTS_PER_LINE, LINES_PER_FRAME};
use super::sprite::Sprite;
use super::{Lcdc, Ppu};
use crate::api::video::{HEIGHT, WIDTH};
use crate::pic::{Interrupt, Pic};

/// Mode 2: scan OAM for up to 10 visible sprites.
#[derive(Clone, Debug, Default)]
pub struct Scan {
    addr: u16,
    objs: Vec<Sprite>,
}

impl Scan {
    fn exec(mut self, ppu: &mut Ppu) -> Mode {
        // One 4-byte OAM entry is scanned every 2 dots (the PPU has a
        // 16-bit-wide path to OAM).
        if ppu.dot % 2 == 0 {
            let objs_enabled = ppu.lcdc(Lcdc::ObjEnable);
            let not_at_limit = self.objs.len() < 10;
            if objs_enabled && not_at_limit {
                let bytes = [0, 1, 2, 3].map(|i| ppu.oam[usize::from(self.addr + i)]);
                let obj = Sprite::from(bytes);
                let not_hidden = obj.xpos != 0;
                let is_visible = {
                    let size = if ppu.lcdc(Lcdc::ObjSize) { 16 } else { 8 };
                    let line = ppu.ly.saturating_add(16);
                    (obj.ypos..obj.ypos.saturating_add(size)).contains(&line)
                };
                if not_hidden && is_visible {
                    trace!("ppu: scanned sprite {obj:?}");
                    self.objs.push(obj);
                }
            }
        }
        self.addr += 2;

        if ppu.dot + 1 < 80 {
            Mode::Scan(self)
        } else {
            debug!("ppu: entered mode 3 (draw)");
            Mode::Draw(Draw {
                objs: self.objs,
                ..Draw::default()
            })
        }
    }
}

/// Mode 3: push pixels through the fetcher/FIFO pipeline into the
/// framebuffer.
#[derive(Clone, Debug, Default)]
pub struct Draw {
    pipe: Pipeline,
    objs: Vec<Sprite>,
}

impl Draw {
    fn exec(mut self, ppu: &mut Ppu) -> Mode {
        if !self.pipe.ready {
            self.pipe.scroll = ppu.scx % 8;
        }

        self.pipe.fetch(ppu, &self.objs);

        if let Some(pixel) = self.pipe.shift(ppu) {
            let ly = u16::from(ppu.ly);
            let lx = u16::from(self.pipe.lx);
            let color = ppu.recolor(&pixel);
            let idx = usize::from(ly * WIDTH as u16 + lx);
            if let Some(slot) = ppu.buf.get_mut(idx) {
                *slot = color;
            }
            self.pipe.lx += 1;
        }

        if u16::from(self.pipe.lx) < WIDTH as u16 {
            Mode::Draw(self)
        } else {
            if self.pipe.bgwin.layer == Layer::Window {
                ppu.ywin += 1;
            }
            debug!("ppu: entered mode 0 (hblank)");
            Mode::HBlank(HBlank)
        }
    }
}

/// Mode 0: horizontal blank, filling out the remainder of the scanline.
#[derive(Clone, Debug, Default)]
pub struct HBlank;

impl HBlank {
    fn exec(self, ppu: &mut Ppu, pic: &mut Pic) -> Mode {
        if ppu.dot + 1 < DOTS_PER_LINE {
            Mode::HBlank(self)
        } else {
            ppu.ly += 1;
            if u16::from(ppu.ly) < HEIGHT as u16 {
                Mode::Scan(Scan::default())
            } else {
                ppu.ywin = 0;
                pic.raise(Interrupt::VBlank);
                debug!("ppu: entered mode 1 (vblank)");
                Mode::VBlank(VBlank)
            }
        }
    }
}

/// Mode 1: vertical blank, lines 144-153.
#[derive(Clone, Debug, Default)]
pub struct VBlank;

impl VBlank {
    fn exec(self, ppu: &mut Ppu) -> Mode {
        if ppu.dot + 1 < DOTS_PER_LINE {
            Mode::VBlank(self)
        } else {
            ppu.ly += 1;
            if u16::from(ppu.ly) < LINES_PER_FRAME {
                Mode::VBlank(self)
            } else {
                ppu.ly = 0;
                debug!("ppu: entered mode 2 (scan)");
                Mode::Scan(Scan::default())
            }
        }
    }
}

/// Current scanline mode.
#[derive(Clone, Debug)]
pub enum Mode {
    Scan(Scan),
    Draw(Draw),
    HBlank(HBlank),
    VBlank(VBlank),
}

impl Default for Mode {
    fn default() -> Self {
        Self::Scan(Scan::default())
    }
}

impl Mode {
    #[must_use]
    pub fn value(&self) -> u8 {
        match self {
            Mode::Scan(_) => 0b10,
            Mode::Draw(_) => 0b11,
            Mode::HBlank(_) => 0b00,
            Mode::VBlank(_) => 0b01,
        }
    }

    pub(super) fn exec(self, ppu: &mut Ppu, pic: &mut Pic) -> Self {
        let ly = ppu.ly;
        let lyc = ppu.lyc;
        ppu.stat = (ppu.stat & !0x07) | self.value() | (u8::from(ly == lyc) << 2);

        if ppu.dot == 0 {
            let mut sources = 0u8;
            sources |= u8::from(lyc == ly) << 6;
            sources |= u8::from(matches!(self, Mode::Scan(_))) << 5;
            sources |= u8::from(matches!(self, Mode::VBlank(_))) << 4;
            sources |= u8::from(matches!(self, Mode::HBlank(_))) << 3;
            let line = sources & (ppu.stat & 0x78) != 0;
            if line && !ppu.stat_line {
                pic.raise(Interrupt::LcdStat);
            }
            ppu.stat_line = line;
        }

        let next = match self {
            Mode::Scan(scan) => scan.exec(ppu),
            Mode::Draw(draw) => draw.exec(ppu),
            Mode::HBlank(hblank) => hblank.exec(ppu, pic),
            Mode::VBlank(vblank) => vblank.exec(ppu),
        };

        ppu.dot += 1;
        ppu.dot %= DOTS_PER_LINE;

        next
    }
}

/// Solid white, used to paint a disabled LCD's frame.
#[must_use]
pub fn blank_frame() -> super::lcd::Frame {
    [Color::C0; WIDTH * HEIGHT]
}
