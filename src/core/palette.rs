// (C) 2025 - Enzo Lombardi

//! 16-color console palette and the packed cell attribute byte.
//!
//! Mirrors the Windows console attribute layout `condrv.h` assumes:
//! low nibble = foreground (bit 3 = intensity), high nibble = background
//! (bit 3 = intensity). `conhost.c`'s `set_tty_attr` maps these directly to
//! SGR 30-37/90-97 (foreground) and 40-47/100-107 (background) without ever
//! going through an RGB color space, so this module does the same instead
//! of reusing the teacher's `crossterm::style::Color` round-trip.

/// One of the 16 console colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TvColor {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

impl TvColor {
    pub fn from_u8(n: u8) -> Self {
        match n & 0x0F {
            0 => TvColor::Black,
            1 => TvColor::Blue,
            2 => TvColor::Green,
            3 => TvColor::Cyan,
            4 => TvColor::Red,
            5 => TvColor::Magenta,
            6 => TvColor::Brown,
            7 => TvColor::LightGray,
            8 => TvColor::DarkGray,
            9 => TvColor::LightBlue,
            10 => TvColor::LightGreen,
            11 => TvColor::LightCyan,
            12 => TvColor::LightRed,
            13 => TvColor::LightMagenta,
            14 => TvColor::Yellow,
            15 => TvColor::White,
            _ => unreachable!("n & 0x0F is always < 16"),
        }
    }

    /// `true` for the bright half of the palette (bit 3 set).
    pub fn is_intense(self) -> bool {
        (self as u8) & 0x08 != 0
    }

    /// SGR parameter for this color used as a foreground (30-37 or 90-97).
    pub fn fg_sgr(self) -> u32 {
        let base = (self as u32) & 0x07;
        if self.is_intense() { 90 + base } else { 30 + base }
    }

    /// SGR parameter for this color used as a background (40-47 or 100-107).
    pub fn bg_sgr(self) -> u32 {
        let base = (self as u32) & 0x07;
        if self.is_intense() { 100 + base } else { 40 + base }
    }
}

/// Packed foreground/background attribute, as stored in a [`super::cell::Cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub fg: TvColor,
    pub bg: TvColor,
}

impl Attr {
    pub const fn new(fg: TvColor, bg: TvColor) -> Self {
        Self { fg, bg }
    }

    /// Default console attribute: light gray on black (`0x07`).
    pub const DEFAULT: Attr = Attr::new(TvColor::LightGray, TvColor::Black);

    pub fn from_u16(word: u16) -> Self {
        Self {
            fg: TvColor::from_u8(word as u8 & 0x0F),
            bg: TvColor::from_u8((word >> 4) as u8 & 0x0F),
        }
    }

    pub const fn to_u16(self) -> u16 {
        (self.fg as u16) | ((self.bg as u16) << 4)
    }
}

/// Palette entries of a screen buffer: 16 RGB-ish color table slots,
/// stored as the console API does (`0x00bbggrr`) but otherwise opaque to
/// this crate — only `SET_OUTPUT_INFO`/`GET_OUTPUT_INFO` copy them around.
pub type ColorMap = [u32; 16];

/// The console's built-in default color table, matching the classic
/// 16-color CGA/EGA palette in the order `TvColor` enumerates it.
pub const DEFAULT_COLOR_MAP: ColorMap = [
    0x00_00_00, 0xAA_00_00, 0x00_AA_00, 0xAA_AA_00, 0x00_00_AA, 0xAA_00_AA, 0x00_55_AA, 0xAA_AA_AA,
    0x55_55_55, 0xFF_55_55, 0x55_FF_55, 0xFF_FF_55, 0x55_55_FF, 0xFF_55_FF, 0x55_FF_FF, 0xFF_FF_FF,
];
