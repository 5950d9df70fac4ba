//! Temporal dithering.
//!
//! The wire carries 8 bits per channel, the pipeline works with 16. The
//! sequencer keeps `bits` of the dropped precision alive by adding a
//! different rounding offset on each refresh. Over one full period of
//! `2^bits` refreshes every offset is used exactly once, so the average
//! output equals the input at `8 + bits` bits of precision.
//!
//! Offsets are visited in bit-reversed order so that consecutive frames
//! alternate between high and low offsets, which keeps the flicker frequency
//! as high as possible.

/// Largest supported number of dither bits.
pub const MAX_DITHER_BITS: u8 = 8;

/// Cycles through the rounding offsets for temporal dithering.
#[derive(Clone, PartialEq, Eq)]
pub struct DitherSequencer {
    bits: u8,
    index: u16,
    offsets: [u8; 1 << MAX_DITHER_BITS],
}

impl DitherSequencer {
    /// A sequencer recovering `bits` extra bits of precision.
    ///
    /// `bits` is clamped to [`MAX_DITHER_BITS`]; 0 disables dithering.
    #[must_use]
    pub fn new(bits: u8) -> Self {
        let bits = bits.min(MAX_DITHER_BITS);
        let mut offsets = [0; 1 << MAX_DITHER_BITS];
        if bits > 0 {
            for (i, offset) in offsets.iter_mut().enumerate().take(1 << bits) {
                *offset = (i as u8).reverse_bits() >> (MAX_DITHER_BITS - bits);
            }
        }
        Self {
            bits,
            index: 0,
            offsets,
        }
    }

    /// Number of dither bits.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Number of refreshes before the offsets repeat.
    #[must_use]
    pub const fn period(&self) -> u16 {
        1 << self.bits
    }

    /// Position within the current period.
    #[must_use]
    pub const fn index(&self) -> u16 {
        self.index
    }

    /// Rounding offset for the current refresh.
    #[must_use]
    pub const fn offset(&self) -> u8 {
        self.offsets[self.index as usize]
    }

    /// Move to the next refresh's offset.
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.period();
    }

    /// Restart the sequence.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Reduce a 16-bit linear value to the 8 bits the wire carries, applying
    /// the current offset.
    ///
    /// 0 always maps to 0 and `u16::MAX` always maps to 255.
    #[must_use]
    #[inline]
    pub fn quantize(&self, linear: u16) -> u8 {
        let kept = u32::from(linear) >> (MAX_DITHER_BITS - self.bits);
        let rounded = (kept + u32::from(self.offset())) >> self.bits;
        rounded.min(u32::from(u8::MAX)) as u8
    }
}

impl Default for DitherSequencer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl core::fmt::Debug for DitherSequencer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DitherSequencer")
            .field("bits", &self.bits)
            .field("index", &self.index)
            .field("offset", &self.offset())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DitherSequencer {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "DitherSequencer bits: {} index: {}",
            self.bits,
            self.index
        );
    }
}
