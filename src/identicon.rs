/// Deterministic visual fingerprint of (full name, master password).
///
/// Shown before any credential is derived so the user can spot a mistyped
/// master password. The glyph tables and their order are a compatibility
/// surface shared with other implementations.
use std::fmt;

use crate::crypto::hash;
use crate::error::Result;

const LEFT_ARMS: &[&str] = &["╔", "╚", "╰", "═"];
const BODIES: &[&str] = &["█", "░", "▒", "▓", "☺", "☻"];
const RIGHT_ARMS: &[&str] = &["╗", "╝", "╯", "═"];
const ACCESSORIES: &[&str] = &[
    "◈", "◎", "◐", "◑", "◒", "◓", "☀", "☁", "☂", "☃", "☄", "★", "☆", "☎", "☏", "⎈", "⌂", "☘",
    "☢", "☣", "☕", "⌚", "⌛", "⏰", "⚡", "⛄", "⛅", "☔", "♔", "♕", "♖", "♗", "♘", "♙", "♚", "♛",
    "♜", "♝", "♞", "♟", "♨", "♩", "♪", "♫", "⚐", "⚑", "⚔", "⚖", "⚙", "⚠", "⌘", "⏎", "✄", "✆",
    "✈", "✉", "✌",
];

/// One of the seven ANSI foreground colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdenticonColor {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

const COLORS: [IdenticonColor; 7] = [
    IdenticonColor::Red,
    IdenticonColor::Green,
    IdenticonColor::Yellow,
    IdenticonColor::Blue,
    IdenticonColor::Magenta,
    IdenticonColor::Cyan,
    IdenticonColor::White,
];

impl IdenticonColor {
    pub fn ansi_code(self) -> u8 {
        match self {
            IdenticonColor::Red => 31,
            IdenticonColor::Green => 32,
            IdenticonColor::Yellow => 33,
            IdenticonColor::Blue => 34,
            IdenticonColor::Magenta => 35,
            IdenticonColor::Cyan => 36,
            IdenticonColor::White => 37,
        }
    }
}

/// A 4-glyph colored fingerprint: `<leftArm><body><rightArm><accessory>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identicon {
    pub left_arm: &'static str,
    pub body: &'static str,
    pub right_arm: &'static str,
    pub accessory: &'static str,
    pub color: IdenticonColor,
}

impl Identicon {
    pub fn from_credentials(full_name: &str, master_password: &str) -> Result<Self> {
        let seed = hash::hmac_sha256(master_password.as_bytes(), full_name.as_bytes())?;
        Ok(Self {
            left_arm: LEFT_ARMS[seed[0] as usize % LEFT_ARMS.len()],
            body: BODIES[seed[1] as usize % BODIES.len()],
            right_arm: RIGHT_ARMS[seed[2] as usize % RIGHT_ARMS.len()],
            accessory: ACCESSORIES[seed[3] as usize % ACCESSORIES.len()],
            color: COLORS[seed[4] as usize % COLORS.len()],
        })
    }

    /// The glyphs without color escapes.
    pub fn plain(&self) -> String {
        format!("{}{}{}{}", self.left_arm, self.body, self.right_arm, self.accessory)
    }

    /// The glyphs wrapped in ANSI color escapes for terminal display.
    pub fn colored(&self) -> String {
        format!("\x1b[{}m{}\x1b[0m", self.color.ansi_code(), self.plain())
    }
}

impl fmt::Display for Identicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identicon_deterministic() {
        let a = Identicon::from_credentials("Robert Lee Mitchell", "banana colored duckling").unwrap();
        let b = Identicon::from_credentials("Robert Lee Mitchell", "banana colored duckling").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.plain(), "╚☻╯⛄");
        assert_eq!(a.color, IdenticonColor::Green);
    }

    #[test]
    fn test_identicon_tracks_password() {
        let a = Identicon::from_credentials("Robert Lee Mitchell", "banana colored duckling").unwrap();
        let b = Identicon::from_credentials("Robert Lee Mitchell", "banana colored duck").unwrap();
        assert_ne!(a.plain(), b.plain());
    }

    #[test]
    fn test_identicon_shape() {
        let identicon =
            Identicon::from_credentials("Robert Lee Mitchell", "banana colored duckling").unwrap();
        assert_eq!(identicon.plain().chars().count(), 4);
        assert!(identicon.colored().starts_with("\x1b["));
        assert!(identicon.colored().ends_with("\x1b[0m"));
    }

    #[test]
    fn test_table_sizes() {
        // Published table dimensions.
        assert_eq!(LEFT_ARMS.len(), 4);
        assert_eq!(BODIES.len(), 6);
        assert_eq!(RIGHT_ARMS.len(), 4);
        assert_eq!(ACCESSORIES.len(), 57);
    }
}
