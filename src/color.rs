//! Channel ordering and sample precision for strand pixels.
//!
//! Addressable LEDs disagree about the order in which they expect color
//! channels on the wire: WS2812 parts want green first, many SK6812 RGBW
//! parts want green, red, blue and then white. [`ColorOrder`] records that
//! order so the rest of the crate can keep talking in logical red, green,
//! blue and white terms.
//!
//! Pixel values are stored either at 8-bit precision (plain encoding) or at
//! 16-bit precision (gamma/dither pipeline). The [`Sample`] trait abstracts
//! over the two.

use core::str::FromStr;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use smart_leds::{RGB, RGB8};

/// A logical color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Red
    Red = 0,
    /// Green
    Green = 1,
    /// Blue
    Blue = 2,
    /// White (RGBW parts only)
    White = 3,
}

impl Channel {
    /// All channels, in logical order.
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::White];

    /// Index of this channel in logical (R, G, B, W) order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    const fn from_letter(letter: u8) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            b'R' => Some(Channel::Red),
            b'G' => Some(Channel::Green),
            b'B' => Some(Channel::Blue),
            b'W' => Some(Channel::White),
            _ => None,
        }
    }
}

/// Error returned when a color order string is not a permutation of `RGB`
/// or `RGBW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[display("color order must be a permutation of RGB or RGBW")]
pub struct ParseColorOrderError;

/// Order in which a strand expects its channels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ColorOrder {
    wire: [Channel; 4],
    channels: u8,
}

impl ColorOrder {
    /// Red, green, blue.
    pub const RGB: Self = Self::rgb(Channel::Red, Channel::Green, Channel::Blue);
    /// Green, red, blue (WS2812 and most clones).
    pub const GRB: Self = Self::rgb(Channel::Green, Channel::Red, Channel::Blue);
    /// Blue, red, green.
    pub const BRG: Self = Self::rgb(Channel::Blue, Channel::Red, Channel::Green);
    /// Red, green, blue, white.
    pub const RGBW: Self =
        Self::rgbw(Channel::Red, Channel::Green, Channel::Blue, Channel::White);
    /// Green, red, blue, white (SK6812 RGBW).
    pub const GRBW: Self =
        Self::rgbw(Channel::Green, Channel::Red, Channel::Blue, Channel::White);

    const fn rgb(first: Channel, second: Channel, third: Channel) -> Self {
        Self {
            wire: [first, second, third, Channel::White],
            channels: 3,
        }
    }

    const fn rgbw(first: Channel, second: Channel, third: Channel, fourth: Channel) -> Self {
        Self {
            wire: [first, second, third, fourth],
            channels: 4,
        }
    }

    /// Number of channels per pixel on the wire (3 or 4).
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels as usize
    }

    /// Whether the strand carries a white channel.
    #[must_use]
    pub const fn has_white(&self) -> bool {
        self.channels == 4
    }

    /// The logical channel transmitted at `wire` position within a pixel.
    ///
    /// Positions past [`channels`](Self::channels) report [`Channel::White`].
    #[must_use]
    pub const fn channel_at(&self, wire: usize) -> Channel {
        if wire < self.channels as usize {
            self.wire[wire]
        } else {
            Channel::White
        }
    }

    /// The wire position of a logical channel, if the strand carries it.
    #[must_use]
    pub fn offset_of(&self, channel: Channel) -> Option<usize> {
        self.wire[..self.channels()]
            .iter()
            .position(|&c| c == channel)
    }
}

impl FromStr for ColorOrder {
    type Err = ParseColorOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let letters = s.trim().as_bytes();
        if letters.len() != 3 && letters.len() != 4 {
            return Err(ParseColorOrderError);
        }
        let mut wire = [Channel::White; 4];
        let mut seen = [false; 4];
        for (slot, &letter) in wire.iter_mut().zip(letters) {
            let channel = Channel::from_letter(letter).ok_or(ParseColorOrderError)?;
            if seen[channel.index()] {
                return Err(ParseColorOrderError);
            }
            seen[channel.index()] = true;
            *slot = channel;
        }
        // three letters must be exactly R, G and B
        if letters.len() == 3 && seen[Channel::White.index()] {
            return Err(ParseColorOrderError);
        }
        Ok(Self {
            wire,
            channels: letters.len() as u8,
        })
    }
}

/// Precision of a stored channel value.
///
/// Implemented for `u8` (plain encoding) and `u16` (gamma/dither pipeline).
pub trait Sample: Copy + Default + PartialEq + core::fmt::Debug {
    /// Channel fully off.
    const ZERO: Self;
    /// Channel fully on.
    const MAX: Self;

    /// Widen or keep an 8-bit value.
    fn from_u8(value: u8) -> Self;
    /// Narrow or keep a 16-bit value.
    fn from_u16(value: u16) -> Self;
    /// The value at 8-bit precision.
    fn to_u8(self) -> u8;
    /// The value at 16-bit precision.
    fn to_u16(self) -> u16;
    /// Midpoint of two samples, rounding down.
    #[must_use]
    fn blend(self, other: Self) -> Self;
}

impl Sample for u8 {
    const ZERO: Self = 0;
    const MAX: Self = u8::MAX;

    #[inline]
    fn from_u8(value: u8) -> Self {
        value
    }

    #[inline]
    fn from_u16(value: u16) -> Self {
        (value >> 8) as u8
    }

    #[inline]
    fn to_u8(self) -> u8 {
        self
    }

    #[inline]
    fn to_u16(self) -> u16 {
        u16::from(self) * 257
    }

    #[inline]
    fn blend(self, other: Self) -> Self {
        ((u16::from(self) + u16::from(other)) >> 1) as u8
    }
}

impl Sample for u16 {
    const ZERO: Self = 0;
    const MAX: Self = u16::MAX;

    #[inline]
    fn from_u8(value: u8) -> Self {
        u16::from(value) * 257
    }

    #[inline]
    fn from_u16(value: u16) -> Self {
        value
    }

    #[inline]
    fn to_u8(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline]
    fn to_u16(self) -> u16 {
        self
    }

    #[inline]
    fn blend(self, other: Self) -> Self {
        ((u32::from(self) + u32::from(other)) >> 1) as u16
    }
}

/// A logical pixel color, independent of wire order.
///
/// `w` is ignored by strands without a white channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgbw<S> {
    /// Red
    pub r: S,
    /// Green
    pub g: S,
    /// Blue
    pub b: S,
    /// White
    pub w: S,
}

impl<S: Sample> Rgbw<S> {
    /// All channels off.
    pub const BLACK: Self = Self::new(S::ZERO, S::ZERO, S::ZERO, S::ZERO);

    /// Build a color from its four channels.
    pub const fn new(r: S, g: S, b: S, w: S) -> Self {
        Self { r, g, b, w }
    }

    /// Build a color without a white component.
    pub const fn rgb(r: S, g: S, b: S) -> Self {
        Self::new(r, g, b, S::ZERO)
    }

    /// Value of one logical channel.
    #[must_use]
    pub const fn get(&self, channel: Channel) -> S {
        match channel {
            Channel::Red => self.r,
            Channel::Green => self.g,
            Channel::Blue => self.b,
            Channel::White => self.w,
        }
    }

    /// Set one logical channel.
    pub fn set(&mut self, channel: Channel, value: S) {
        match channel {
            Channel::Red => self.r = value,
            Channel::Green => self.g = value,
            Channel::Blue => self.b = value,
            Channel::White => self.w = value,
        }
    }

    /// Unpack a `0xWWRRGGBB` value, widening each byte to `S`.
    #[must_use]
    pub fn from_packed(packed: u32) -> Self {
        let [w, r, g, b] = packed.to_be_bytes();
        Self::new(
            S::from_u8(r),
            S::from_u8(g),
            S::from_u8(b),
            S::from_u8(w),
        )
    }

    /// Pack as `0xWWRRGGBB`, keeping the top 8 bits of each channel.
    #[must_use]
    pub fn to_packed(&self) -> u32 {
        u32::from_be_bytes([self.w.to_u8(), self.r.to_u8(), self.g.to_u8(), self.b.to_u8()])
    }
}

impl<S: Sample> From<RGB8> for Rgbw<S> {
    fn from(color: RGB8) -> Self {
        Self::rgb(S::from_u8(color.r), S::from_u8(color.g), S::from_u8(color.b))
    }
}

impl<S: Sample> From<RGB<u16>> for Rgbw<S> {
    fn from(color: RGB<u16>) -> Self {
        Self::rgb(S::from_u16(color.r), S::from_u16(color.g), S::from_u16(color.b))
    }
}

impl<S: Sample> From<Rgb888> for Rgbw<S> {
    fn from(color: Rgb888) -> Self {
        Self::rgb(S::from_u8(color.r()), S::from_u8(color.g()), S::from_u8(color.b()))
    }
}

impl<S: Sample> From<Rgbw<S>> for RGB8 {
    fn from(color: Rgbw<S>) -> Self {
        RGB8::new(color.r.to_u8(), color.g.to_u8(), color.b.to_u8())
    }
}
