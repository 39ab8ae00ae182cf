//! Host-facing interfaces.
//!
//! The core never performs host I/O itself (no file access, no rendering,
//! no audio device, no input polling — see `spec.md` §1, "Out of scope").
//! Instead it calls back into small traits the host implements, and exposes
//! plain getters the host polls. This module holds those seams.

pub mod audio;
pub mod cart;
pub mod joypad;
pub mod serial;
pub mod video;
