//! Hex color parsing

use std::fmt;
use std::str::FromStr;

use crate::error::CompositeError;

/// An sRGB color with 8-bit channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` or `RRGGBB`. Surrounding whitespace is ignored.
    pub fn from_hex(input: &str) -> Result<Self, CompositeError> {
        let trimmed = input.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CompositeError::InvalidColor(input.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| CompositeError::InvalidColor(input.to_string()))
        };

        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    /// Channels in the 0-1 range used by PDF color operators
    pub fn to_pdf(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

impl FromStr for Rgb {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::from_hex(s)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: every displayed color parses back to itself
        #[test]
        fn display_parses_back(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let color = Rgb::new(r, g, b);
            prop_assert_eq!(Rgb::from_hex(&color.to_string()).unwrap(), color);
        }

        /// Property: strings with a non-hex character never parse
        #[test]
        fn non_hex_rejected(s in "[g-zG-Z]{6}") {
            prop_assert!(Rgb::from_hex(&s).is_err());
        }
    }
}
