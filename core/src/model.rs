//! Hardware model selection.

/// Which physical console the core emulates.
///
/// Selects power-on RAM patterns, which bus the WRAM sits on, whether the
/// double-speed/HDMA/infrared hardware exists, and the boot ROM overlay
/// range (`spec.md` §4.1, "Invariants").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Model {
    /// Original DMG (and, functionally, MGB/SGB from the core's point of
    /// view — `spec.md` explicitly excludes the SGB SNES co-processor, but
    /// the DMG-compatible core behaviour is the same).
    Dmg,
    /// Game Boy Color, revision C or later (`spec.md` §1 Non-goals excludes
    /// faithful emulation of CGB revisions older than C).
    Cgb,
}

impl Model {
    /// Whether this model is CGB (and thus has double-speed, HDMA, the
    /// extended WRAM/VRAM banks, and the CGB-only OBJ priority mode).
    #[must_use]
    pub fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Dmg
    }
}

/// Tunable engine configuration, set once at construction or adjusted live
/// via the `Machine::set_*` operations in `spec.md` §6.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Which console to emulate.
    pub model: Model,
    /// Audio sample rate, in Hz, the host wants from [`Audio::sample`]
    /// (`crate::api::audio::Audio`).
    pub sample_rate: u32,
    /// APU output highpass behaviour.
    pub highpass: crate::apu::Highpass,
    /// CGB palette color-correction behaviour.
    pub color_correction: ColorCorrection,
    /// Speed multiplier applied to `advance_cycles` (for fast-forward).
    pub clock_multiplier: f64,
    /// When set, the PPU still runs its full timing but does not write into
    /// the framebuffer (`spec.md` §4.5, "Failure modes").
    pub rendering_disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Model::default(),
            sample_rate: 48_000,
            highpass: crate::apu::Highpass::Accurate,
            color_correction: ColorCorrection::Modern,
            clock_multiplier: 1.0,
            rendering_disabled: false,
        }
    }
}

/// CGB RGB555 -> RGB888 palette color-correction mode.
///
/// Supplements `spec.md` §6's `set_color_correction_mode`, which names the
/// operation but not its modes; grounded on SameBoy's `display.c`
/// `GB_convert_rgb15`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorCorrection {
    /// Pass channels through, scaled linearly 5-bit -> 8-bit.
    Disabled,
    /// Emulate the non-linear response curve of the real CGB LCD.
    Modern,
}
