//! IO device interface
use crate::{vm::Hz, DisplayBuffer};

/// Hooks for the output devices fed by the cycle loop.
///
/// The VM publishes to these once per tick, after the instruction
/// batch and timer update. How pixels are painted and how the tone is
/// synthesized is entirely the implementation's concern; the VM only
/// hands over boolean pixel state and an on/off signal.
pub trait Devices {
    /// Blit the display buffer to screen output.
    fn draw(&mut self, display: DisplayBuffer<'_>);

    /// Drive the tone generator: `Some` turns the buzzer on at the
    /// given frequency, `None` turns it off.
    fn buzz(&mut self, tone: Option<Hz>);
}

/// Output sink that discards everything. Useful for tests, benchmarks
/// and headless runs.
pub struct NullDevices;

impl Devices for NullDevices {
    fn draw(&mut self, _display: DisplayBuffer<'_>) {}

    fn buzz(&mut self, _tone: Option<Hz>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = InvalidKeyCode;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(InvalidKeyCode),
        }
    }
}

#[derive(Debug)]
pub struct InvalidKeyCode;

impl std::error::Error for InvalidKeyCode {}

impl std::fmt::Display for InvalidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "keycode must be in range 0 <= keycode < 16")
    }
}
