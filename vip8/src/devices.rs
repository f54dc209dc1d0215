//! Host device interfaces.
//!
//! The engine never talks to a rendering or input backend directly. Hosts
//! implement these capability traits and bridge them to whatever windowing,
//! terminal or test harness they run under.
use crate::constants::DISPLAY_BUFFER_SIZE;

/// Receiver for display output.
pub trait DisplaySink {
    /// Called by the host with the framebuffer after it observed the
    /// display-dirty flag.
    fn blit(&mut self, framebuffer: &[bool; DISPLAY_BUFFER_SIZE]);
}

/// Source of keypad press/release edges.
pub trait KeyEventSource {
    /// Remove and return one pending key edge, or `None` when no input is
    /// waiting.
    fn poll_key(&mut self) -> Option<(KeyCode, bool)>;
}

/// Logical keypad index.
///
/// The mapping from physical input device codes to these sixteen slots is
/// host policy; the engine only ever sees a `KeyCode`.
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
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "k{:x}", self.as_u8())
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
