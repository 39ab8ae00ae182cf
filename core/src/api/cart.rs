//! Cartridge side-band surfaces (camera, infrared, rumble).
//!
//! Most cartridges need none of these; they are only consulted by the
//! `Mbc::Camera`, `Mbc::HuC3`, and MBC5-rumble variants.

/// Implemented by the host to supply live camera frames to a Pocket Camera
/// cartridge (`spec.md` §4.2, "Camera").
pub trait Camera {
    /// Samples the camera sensor at sensor-space `(x, y)`, `x < 128`,
    /// `y < 112`, returning a linear light intensity in `0..=255`.
    fn sample(&mut self, x: u8, y: u8) -> u8;

    /// Requests the host refresh its live preview, called once per capture.
    fn request_update(&mut self) {}
}

/// Implemented by the host to receive/drive the infrared port.
pub trait Infrared {
    /// Sets the IR LED on/off as driven by the cartridge or CPU.
    fn set_state(&mut self, lit: bool);

    /// Polls whether an external IR signal is currently being received.
    fn read_state(&mut self) -> bool {
        false
    }
}

/// Implemented by the host to actuate the cartridge's rumble motor.
pub trait Rumble {
    /// Sets rumble motor amplitude, `0.0..=1.0`.
    fn set_amplitude(&mut self, amplitude: f32);
}
