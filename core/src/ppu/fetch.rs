//! The pixel fetcher state machine and the two-channel pixel pipeline.
//!
//! Grounded on the teacher's `core/src/parts/ppu/blk/{pipe.rs,fetch/*.rs}`,
//! with the separate `bgw`/`obj` fetchers collapsed into one [`Fetcher`]
//! keyed by [`Layer`] (this core has no per-layer file split).

use log::trace;

use super::fifo::{Fifo, Meta, Row};
use super::sprite::Sprite;
use super::{Lcdc, Ppu};

/// Which of the three graphics layers a fetch belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Layer {
    #[default]
    Background,
    Window,
    Sprite,
}

/// Fetcher step.
#[derive(Clone, Debug, Default)]
pub enum Step {
    #[default]
    Fetch,
    Read0 {
        tdat: u16,
    },
    Read1 {
        tdat: u16,
        data: u8,
    },
    Push {
        data: [u8; 2],
    },
}

impl Ppu {
    /// Tile data base address for the configured addressing mode.
    pub(super) fn tile_base(&self, layer: Layer) -> u16 {
        match layer {
            Layer::Background | Layer::Window => {
                if self.lcdc(Lcdc::BgWinData) {
                    0x0000
                } else {
                    0x1000
                }
            }
            Layer::Sprite => 0x0000,
        }
    }

    pub(super) fn tile_index(&self, layer: Layer, tnum: u8) -> u16 {
        let base = self.tile_base(layer);
        let tnum = match layer {
            Layer::Background | Layer::Window if !self.lcdc(Lcdc::BgWinData) => tnum as i8 as u16,
            _ => u16::from(tnum),
        };
        base.wrapping_add(tnum << 4)
    }

    pub(super) fn tile_offset(&self, layer: Layer, yoff: u8) -> u16 {
        u16::from(match layer {
            Layer::Background => self.ly.wrapping_add(yoff),
            Layer::Window => self.ywin,
            Layer::Sprite => self.ly.wrapping_sub(yoff),
        }) % 8
    }

    pub(super) fn tile_data_addr(&self, layer: Layer, tnum: u8, yoff: u8) -> u16 {
        let tidx = self.tile_index(layer, tnum);
        let toff = self.tile_offset(layer, yoff) * 2;
        tidx | toff
    }
}

/// A pixel fetcher, shared between the background/window channel and the
/// sprite channel.
#[derive(Clone, Debug, Default)]
pub struct Fetcher {
    pub fifo: Fifo,
    pub step: Step,
    /// Background/window tile column counter (unused for sprites).
    pub xpos: u8,
}

impl Fetcher {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn exec_bgwin(&mut self, ppu: &mut Ppu, layer: Layer) {
        self.step = match std::mem::take(&mut self.step) {
            Step::Fetch => {
                let tmap: u16 = if self.lcdc_tilemap(ppu, layer) { 0x1c00 } else { 0x1800 };
                let (row, col) = match layer {
                    Layer::Background => (
                        ppu.ly.wrapping_add(ppu.scy) / 8,
                        (self.xpos.wrapping_add(ppu.scx / 8)) & 0x1f,
                    ),
                    Layer::Window => (ppu.ywin / 8, self.xpos),
                    Layer::Sprite => unreachable!(),
                };
                let toff = (32 * u16::from(row) + u16::from(col)) & 0x03ff;
                let addr = tmap + toff;
                let tnum = ppu.vram_fetch(addr);
                trace!("ppu: tile index VRAM[${addr:04x}] -> #{tnum}");
                let tdat = ppu.tile_data_addr(layer, tnum, ppu.scy);
                Step::Read0 { tdat }
            }
            Step::Read0 { tdat } => {
                let data = ppu.vram_fetch(tdat);
                Step::Read1 { tdat: tdat + 1, data }
            }
            Step::Read1 { tdat, data } => {
                let data1 = ppu.vram_fetch(tdat);
                Step::Push { data: [data, data1] }
            }
            Step::Push { data } => {
                if self.fifo.is_empty() {
                    let row = Row::from(data);
                    trace!("ppu: pushed bg/win row {row:?}");
                    self.fifo.push(row, Meta::bgwin());
                    self.xpos = self.xpos.wrapping_add(1);
                    Step::Fetch
                } else {
                    Step::Push { data }
                }
            }
        };
    }

    fn lcdc_tilemap(&self, ppu: &Ppu, layer: Layer) -> bool {
        match layer {
            Layer::Background => ppu.lcdc(Lcdc::BgMap),
            Layer::Window => ppu.lcdc(Lcdc::WinMap),
            Layer::Sprite => unreachable!(),
        }
    }

    fn exec_sprite(&mut self, ppu: &mut Ppu, obj: &Sprite) {
        self.step = match std::mem::take(&mut self.step) {
            Step::Fetch => {
                let tnum = if ppu.lcdc(Lcdc::ObjSize) {
                    let upper = {
                        let line = ppu.ly.saturating_add(16);
                        (obj.ypos..obj.ypos.saturating_add(8)).contains(&line)
                    };
                    if upper ^ obj.attr.yflip {
                        obj.tnum & 0b1111_1110
                    } else {
                        obj.tnum | 0b0000_0001
                    }
                } else {
                    obj.tnum
                };
                let mut tdat = ppu.tile_data_addr(Layer::Sprite, tnum, obj.ypos);
                if obj.attr.yflip {
                    tdat ^= 0b0000_1110;
                }
                Step::Read0 { tdat }
            }
            Step::Read0 { tdat } => {
                let data = ppu.vram_fetch(tdat);
                Step::Read1 { tdat: tdat + 1, data }
            }
            Step::Read1 { tdat, data } => {
                let data1 = ppu.vram_fetch(tdat);
                Step::Push { data: [data, data1] }
            }
            Step::Push { data } => {
                let mut row = Row::from(data);
                if obj.attr.xflip {
                    row.xflip();
                }
                trace!("ppu: pushed sprite row {row:?}");
                self.fifo.push(row, obj.meta());
                Step::Fetch
            }
        };
    }
}

/// One side of the pixel pipeline: a fetch location, its fetcher, and FIFO.
#[derive(Clone, Debug, Default)]
pub struct Channel {
    pub layer: Layer,
    pub fetch: Fetcher,
}

/// The two-channel pixel pipeline driving mode 3.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    pub ready: bool,
    pub scroll: u8,
    pub lx: u8,
    pub bgwin: Channel,
    pub sprite: Channel,
}

impl Pipeline {
    /// Performs one fetch cycle into the appropriate FIFO.
    pub fn fetch(&mut self, ppu: &mut Ppu, objs: &[Sprite]) {
        if let Some(obj) = objs.iter().find(|obj| obj.xpos == self.lx + 8) {
            if self.sprite.fetch.fifo.is_empty() {
                self.sprite.fetch.exec_sprite(ppu, obj);
                return; // stall the background fetcher for this dot
            }
        }

        self.bgwin.fetch.exec_bgwin(ppu, self.bgwin.layer);

        // The warm-up fetch (the one that runs before the first pixel is
        // shifted out) completes once the background fetcher reaches its
        // first `Push` step; only then do the two channels settle into
        // their steady-state layers.
        let done_warmup = !self.ready && matches!(self.bgwin.fetch.step, Step::Push { .. });
        if done_warmup {
            trace!("ppu: pipeline warmup complete");
            self.bgwin.layer = Layer::Background;
            self.sprite.layer = Layer::Sprite;
            self.ready = true;
        }

        let window_reached = {
            let win_enabled = ppu.lcdc(Lcdc::WinEnable);
            let fetch_at_bg = self.bgwin.layer == Layer::Background;
            let y_below_win = ppu.wy <= ppu.ly;
            let x_right_win = ppu.wx <= self.lx + 7;
            win_enabled && fetch_at_bg && y_below_win && x_right_win
        };
        if window_reached {
            self.bgwin.layer = Layer::Window;
        }

        if done_warmup || window_reached {
            self.bgwin.fetch.reset();
        }
    }

    /// Shifts a blended pixel out of the FIFOs, if ready.
    pub fn shift(&mut self, ppu: &Ppu) -> Option<super::fifo::Pixel> {
        if !matches!(self.sprite.fetch.step, Step::Fetch) {
            return None;
        }

        let mut bgwin = self.bgwin.fetch.fifo.pop()?;

        if !ppu.lcdc(Lcdc::BgWinEnable) {
            bgwin.col = super::lcd::Color::C0;
        }

        let pixel = match self.sprite.fetch.fifo.pop() {
            Some(sprite) => super::fifo::Pixel::blend(bgwin, sprite),
            None => bgwin,
        };
        Some(pixel)
    }
}
