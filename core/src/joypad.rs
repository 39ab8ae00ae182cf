//! Joypad input register.

use std::collections::HashSet;

use crate::api::joypad::{Button, Event, State};
use crate::pic::{Interrupt, Pic};

/// Which button group(s) the game has selected for reading via `$FF00`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Select {
    #[default]
    None,
    DPad,
    Keys,
    Both,
}

impl Select {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Select::Both,
            0b01 => Select::Keys,
            0b10 => Select::DPad,
            0b11 => Select::None,
            _ => unreachable!(),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Select::Both => 0b00,
            Select::Keys => 0b01,
            Select::DPad => 0b10,
            Select::None => 0b11,
        }
    }
}

/// Joypad state: selected group plus the set of currently-held buttons.
#[derive(Clone, Debug, Default)]
pub struct Joypad {
    select: Select,
    held: HashSet<Button>,
}

impl Joypad {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a host input event, raising the joypad interrupt on any
    /// button press (`spec.md` §4.9: "a press always raises the interrupt,
    /// regardless of which group is currently selected").
    pub fn input(&mut self, event: Event, pic: &mut Pic) {
        match event.state {
            State::Down => {
                self.held.insert(event.button);
                pic.raise(Interrupt::Joypad);
            }
            State::Up => {
                self.held.remove(&event.button);
            }
        }
    }

    #[must_use]
    pub fn read(&self) -> u8 {
        let mut value = 0b1100_0000 | self.select.to_bits();
        let groups: &[Select] = match self.select {
            Select::Both => &[Select::DPad, Select::Keys],
            Select::DPad | Select::Keys => std::slice::from_ref(&self.select),
            Select::None => &[],
        };
        for &group in groups {
            for &button in &self.held {
                if button.group() == group_bits(group) {
                    value &= !button.key();
                }
            }
        }
        value
    }

    pub fn write(&mut self, value: u8) {
        self.select = Select::from_bits(value >> 4);
    }

    pub fn reset(&mut self) {
        self.held.clear();
        self.select = Select::default();
    }
}

impl gb_arch::Block for Joypad {
    fn reset(&mut self) {
        self.reset();
    }
}

fn group_bits(select: Select) -> u8 {
    match select {
        Select::DPad => 0b0001_0000,
        Select::Keys => 0b0010_0000,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_raises_interrupt() {
        let mut pic = Pic::default();
        let mut pad = Joypad::new();
        pad.input(Event { button: Button::A, state: State::Down }, &mut pic);
        assert!(pic.iflag & Interrupt::Joypad as u8 != 0);
    }

    #[test]
    fn select_filters_group() {
        let mut pic = Pic::default();
        let mut pad = Joypad::new();
        pad.input(Event { button: Button::A, state: State::Down }, &mut pic);
        pad.input(Event { button: Button::Up, state: State::Down }, &mut pic);

        pad.write(0b0010_0000); // select d-pad only
        let dpad = pad.read();
        assert_eq!(dpad & 0b0000_0100, 0); // Up bit cleared (pressed)

        pad.write(0b0001_0000); // select keys only
        let keys = pad.read();
        assert_eq!(keys & 0b0000_0001, 0); // A bit cleared (pressed)
    }
}
