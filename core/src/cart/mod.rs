//! Game cartridge: header, memory bank controller, and battery-backed save
//! data.
//!
//! Grounded on the teacher's `core/src/parts/cart/mod.rs`, but without its
//! `Shared<RefCell<_>>`/`Mmio`-attach plumbing — `Cartridge` owns its
//! header and [`Mbc`] directly, and `Machine` dispatches to it by address
//! range the same way it dispatches to every other sub-scheduler.

pub mod header;
pub mod mbc;
pub mod rtc;

use header::{Header, Info};
use mbc::Mbc;

/// A loaded game cartridge.
#[derive(Debug)]
pub struct Cartridge {
    header: Header,
    mbc: Mbc,
}

impl Cartridge {
    /// Parses a header from `rom` and constructs the matching [`Mbc`].
    ///
    /// ROM is padded up to a power-of-two size with `0xff`, and truncated
    /// with a warning if it's larger than the header's declared size
    /// (`spec.md` §6, "Cartridge loader").
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed or fails its checksum.
    pub fn new(rom: Vec<u8>) -> header::Result<Self> {
        let header = Header::new(&rom)?;
        let rom = Self::reconcile_rom(rom, header.romsz);
        let ram = vec![0u8; header.ramsz].into_boxed_slice();
        let mbc = Mbc::new(header.info, rom, ram);
        Ok(Self { header, mbc })
    }

    /// Constructs a cartridge directly from already-assembled ROM bytes
    /// (used by the ISX loader, which builds a ROM image out of typed
    /// records rather than a single flat buffer) together with a parsed
    /// header.
    #[must_use]
    pub fn from_parts(header: Header, rom: Vec<u8>) -> Self {
        let rom = Self::reconcile_rom(rom, header.romsz);
        let ram = vec![0u8; header.ramsz].into_boxed_slice();
        let mbc = Mbc::new(header.info, rom, ram);
        Self { header, mbc }
    }

    /// A cartridge-slot-empty placeholder: an all-`0xff` 32 KiB ROM-only
    /// cartridge.
    #[must_use]
    pub fn blank() -> Self {
        let header = Header::blank();
        let rom = vec![0xffu8; header.romsz];
        Self::from_parts(header, rom)
    }

    fn reconcile_rom(mut rom: Vec<u8>, declared: usize) -> Box<[u8]> {
        let target = declared.max(rom.len()).next_power_of_two();
        match rom.len().cmp(&target) {
            std::cmp::Ordering::Less => {
                log::debug!(
                    "padding ROM from {:#x} to {:#x} bytes with 0xff",
                    rom.len(),
                    target
                );
                rom.resize(target, 0xff);
            }
            std::cmp::Ordering::Greater => {
                log::warn!(
                    "truncating oversized ROM from {:#x} to {:#x} bytes",
                    rom.len(),
                    target
                );
                rom.truncate(target);
            }
            std::cmp::Ordering::Equal => {}
        }
        rom.into_boxed_slice()
    }

    /// Parsed header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Hardware/sideband information (battery, RTC, rumble, ...).
    #[must_use]
    pub fn info(&self) -> &Info {
        &self.header.info
    }

    /// Mutable access to the controller, for the camera capture callback
    /// and tests.
    pub fn mbc_mut(&mut self) -> &mut Mbc {
        &mut self.mbc
    }

    /// Reads from the ROM window (`$0000-$7FFF`).
    #[must_use]
    pub fn read_rom(&self, addr: u16) -> u8 {
        self.mbc.read_rom(addr)
    }

    /// Writes to the ROM window (control writes only — the MBC decodes
    /// these into its internal bank latches).
    pub fn write_rom(&mut self, addr: u16, value: u8) {
        self.mbc.write_rom(addr, value);
    }

    /// Reads from the cartridge-RAM window (`$A000-$BFFF`).
    #[must_use]
    pub fn read_ram(&self, addr: u16) -> u8 {
        self.mbc.read_ram(addr)
    }

    /// Writes to the cartridge-RAM window.
    pub fn write_ram(&mut self, addr: u16, value: u8) {
        self.mbc.write_ram(addr, value);
    }

    /// Advances any RTC by wall-clock `now` (epoch seconds).
    pub fn tick_rtc(&mut self, now: u64) {
        self.mbc.tick_rtc(now);
    }

    /// The full ROM image, for `Machine::direct_access`.
    #[must_use]
    pub fn rom(&self) -> &[u8] {
        self.mbc.rom()
    }

    /// Battery-backed cartridge RAM, if any, for `Machine::direct_access`.
    #[must_use]
    pub fn ram(&self) -> Option<&[u8]> {
        self.mbc.battery_ram()
    }

    /// Serializes battery-backed SRAM, optionally followed by an RTC tail,
    /// per `spec.md` §6 "Battery save". Carts with no battery save nothing.
    #[must_use]
    pub fn save_battery(&self) -> Vec<u8> {
        let Some(ram) = self.mbc.battery_ram() else {
            return Vec::new();
        };
        let mut buf = ram.to_vec();
        if let Some(rtc) = self.mbc.rtc() {
            buf.extend_from_slice(&rtc_tail(rtc));
        }
        buf
    }

    /// Restores battery-backed SRAM (and RTC registers, if present) from a
    /// save-file buffer. Tolerates a tail-less buffer, a 13-byte VBA tail,
    /// or a 17-byte BGB/HuC3 tail (`spec.md` §6).
    pub fn load_battery(&mut self, data: &[u8]) {
        let Some(ram_len) = self.mbc.battery_ram().map(<[u8]>::len) else {
            return;
        };
        let ram = &data[..data.len().min(ram_len)];
        self.mbc.load_battery_ram(ram);

        if self.mbc.rtc().is_none() {
            return;
        }
        let tail = &data[data.len().min(ram_len)..];
        if let Some(rtc) = parse_rtc_tail(tail) {
            self.mbc.load_rtc(rtc);
        } else if !tail.is_empty() {
            log::warn!("unrecognized RTC tail length {} bytes; ignoring", tail.len());
        }
    }
}

/// Serializes `rtc` as a 17-byte (BGB-shaped) tail: 5 register bytes
/// (seconds, minutes, hours, day-low, day-high), 4 reserved zero bytes, and
/// an 8-byte little-endian last-tick epoch timestamp.
///
/// The real VBA/BGB on-disk layouts aren't in this core's reference corpus;
/// this shape is this repo's own choice, self-consistent across
/// save/load — not a byte-exact match to either external tool. Noted in
/// `DESIGN.md`.
fn rtc_tail(rtc: &rtc::Rtc) -> [u8; 17] {
    let mut buf = [0u8; 17];
    buf[0..5].copy_from_slice(&rtc.dump_live());
    buf[9..17].copy_from_slice(&rtc.last_tick().to_le_bytes());
    buf
}

/// Parses a save-file RTC tail of 13 (VBA) or 17 (BGB/HuC3) bytes; returns
/// `None` for any other length (including zero, the tail-less case).
fn parse_rtc_tail(tail: &[u8]) -> Option<rtc::Rtc> {
    let (regs, stamp): ([u8; 5], u64) = match tail.len() {
        13 => (
            tail[0..5].try_into().ok()?,
            u64::from_le_bytes(tail[5..13].try_into().ok()?),
        ),
        17 => (
            tail[0..5].try_into().ok()?,
            u64::from_le_bytes(tail[9..17].try_into().ok()?),
        ),
        _ => return None,
    };
    let mut rtc = rtc::Rtc::new();
    rtc.load_live(regs);
    rtc.set_last_tick(stamp);
    Some(rtc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rom(kind: u8, ramsz_byte: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x104..0x134].copy_from_slice(&header::LOGO);
        rom[0x147] = kind;
        rom[0x148] = 0x00;
        rom[0x149] = ramsz_byte;
        let hchk = rom[0x134..=0x14c]
            .iter()
            .copied()
            .fold(0u8, |acc, b| acc.wrapping_sub(b).wrapping_sub(1));
        rom[0x14d] = hchk;
        rom
    }

    #[test]
    fn round_trips_battery_sram_without_rtc() {
        let rom = minimal_rom(0x03, 0x02); // MBC1+RAM+BATTERY, 8 KiB RAM
        let mut cart = Cartridge::new(rom).unwrap();
        cart.write_rom(0x0000, 0x0a); // enable RAM
        cart.write_ram(0xa000, 0x42);
        let saved = cart.save_battery();
        assert_eq!(saved.len(), 0x2000);

        let rom2 = minimal_rom(0x03, 0x02);
        let mut cart2 = Cartridge::new(rom2).unwrap();
        cart2.load_battery(&saved);
        cart2.write_rom(0x0000, 0x0a);
        assert_eq!(cart2.read_ram(0xa000), 0x42);
    }

    #[test]
    fn round_trips_mbc3_rtc_tail() {
        let rom = minimal_rom(0x10, 0x02); // MBC3+RAM+BATTERY+RTC
        let mut cart = Cartridge::new(rom).unwrap();
        cart.write_rom(0x0000, 0x0a);
        cart.tick_rtc(65);
        let saved = cart.save_battery();
        assert_eq!(saved.len(), 0x2000 + 17);

        let rom2 = minimal_rom(0x10, 0x02);
        let mut cart2 = Cartridge::new(rom2).unwrap();
        cart2.load_battery(&saved);
        cart2.write_rom(0x0000, 0x0a);
        cart2.write_rom(0x6000, 0x00);
        cart2.write_rom(0x6000, 0x01);
        cart2.write_rom(0x4000, 0x08);
        assert_eq!(cart2.read_ram(0xa000), 5); // 65s -> 1m5s
    }

    #[test]
    fn blank_cartridge_reads_all_ff() {
        let cart = Cartridge::blank();
        assert_eq!(cart.read_rom(0x0150), 0xff);
    }
}
