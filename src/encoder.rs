//! Pixel store to waveform transposition.
//!
//! Each strand sends the same sequence of wire bytes: pixel by pixel,
//! channel by channel in wire order. Because all strands are clocked
//! together, wire byte `k` of every strand goes out at the same time in the
//! same eight bit slots. The encoder therefore walks the wire bytes once,
//! collects byte `k` of every enabled strand, maps it through the output
//! pipeline and spreads its bits across the eight slots, setting each
//! strand's lane bit where that strand sends a 1.
//!
//! The pixel store is only read. Only the middle (data) byte of each slot is
//! written; the framing bytes are left as [`WaveformBuffer::format`] set
//! them.

use crate::color::{Channel, Sample};
use crate::dither::DitherSequencer;
use crate::gamma::GammaTable;
use crate::store::PixelStore;
use crate::strand::StrandSet;
use crate::waveform::WaveformBuffer;
use crate::STRAND_COUNT;

/// Turns a stored sample into the byte sent on the wire.
pub trait ChannelMap<S> {
    /// Wire byte for `value` on `channel`.
    fn map(&self, channel: Channel, value: S) -> u8;
}

/// Global brightness scaling for 8-bit pixels.
///
/// Stored as a factor from 1 to 256 so that full brightness leaves values
/// untouched: the wire byte is the top 8 bits of `value × factor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Brightness(u16);

impl Brightness {
    /// Values pass through unchanged.
    pub const FULL: Self = Self(256);

    /// Brightness for a 0-255 level.
    #[must_use]
    pub const fn from_level(level: u8) -> Self {
        Self(level as u16 + 1)
    }

    /// The 0-255 level this brightness was built from.
    #[must_use]
    pub const fn level(self) -> u8 {
        (self.0 - 1) as u8
    }

    /// Internal 1-256 multiplier.
    #[must_use]
    pub const fn factor(self) -> u16 {
        self.0
    }

    /// Scale one channel value.
    #[must_use]
    #[inline]
    pub const fn scale(self, value: u8) -> u8 {
        ((value as u16 * self.0) >> 8) as u8
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Self::FULL
    }
}

impl ChannelMap<u8> for Brightness {
    #[inline]
    fn map(&self, _channel: Channel, value: u8) -> u8 {
        self.scale(value)
    }
}

/// Gamma correction followed by temporal dithering for 16-bit pixels.
#[derive(Debug, Clone, Copy)]
pub struct GammaDither<'a> {
    table: &'a GammaTable,
    dither: &'a DitherSequencer,
}

impl<'a> GammaDither<'a> {
    /// Map through `table`, then quantize with `dither`'s current offset.
    #[must_use]
    pub const fn new(table: &'a GammaTable, dither: &'a DitherSequencer) -> Self {
        Self { table, dither }
    }
}

impl ChannelMap<u16> for GammaDither<'_> {
    #[inline]
    fn map(&self, channel: Channel, value: u16) -> u8 {
        self.dither.quantize(self.table.lookup(channel, value))
    }
}

/// Writes pixel data into waveform buffers for a fixed set of strands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameEncoder {
    strands: StrandSet,
}

impl FrameEncoder {
    /// An encoder driving the enabled strands of `strands`.
    #[must_use]
    pub const fn new(strands: StrandSet) -> Self {
        Self { strands }
    }

    /// The strands this encoder writes.
    #[must_use]
    pub const fn strands(&self) -> &StrandSet {
        &self.strands
    }

    /// Encode `store` into `buffer`, mapping every sample through `map`.
    ///
    /// Disabled strands contribute nothing. `buffer` must hold
    /// `LEN × CH × 8` bit slots; extra slots are left as they are and
    /// missing ones truncate the frame.
    pub fn encode<S, M, const LEN: usize, const CH: usize, const BITS: usize>(
        &self,
        store: &PixelStore<S, LEN, CH>,
        map: &M,
        buffer: &mut WaveformBuffer<BITS>,
    ) where
        S: Sample,
        M: ChannelMap<S> + ?Sized,
    {
        debug_assert_eq!(BITS, crate::compute_bit_count(LEN, CH));

        let mut lanes = [(0u8, 0usize); STRAND_COUNT];
        let mut enabled = 0;
        for strand in self.strands.enabled() {
            lanes[enabled] = (strand.bitmask(), strand.index());
            enabled += 1;
        }
        let lanes = &lanes[..enabled];

        let order = store.order();
        let mut wire_bytes = buffer.slots_mut().chunks_exact_mut(8);
        for pixel in 0..LEN {
            for wire in 0..CH {
                let Some(slots) = wire_bytes.next() else {
                    return;
                };
                let channel = order.channel_at(wire);
                let mut values = [0u8; STRAND_COUNT];
                for (value, &(_, strand)) in values.iter_mut().zip(lanes) {
                    *value = map.map(channel, store.sample(strand, pixel, wire));
                }
                let values = &values[..enabled];

                for (bit, slot) in slots.iter_mut().enumerate() {
                    let bit_mask = 0x80 >> bit;
                    let data = lanes
                        .iter()
                        .zip(values)
                        .filter(|(_, value)| **value & bit_mask != 0)
                        .fold(0, |data, (&(mask, _), _)| data | mask);
                    slot.set_data(data);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::color::ColorOrder;
    use crate::compute_bit_count;
    use crate::strand::DirectLanes;

    const LEN: usize = 10;
    const BITS: usize = compute_bit_count(LEN, 3);

    fn all_strands() -> StrandSet {
        let pins = [Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), Some(6), Some(7)];
        StrandSet::resolve(&pins, &mut DirectLanes)
    }

    /// Reassemble the byte the strand on lane `mask` sends at wire position `k`.
    fn wire_byte<const B: usize>(buffer: &WaveformBuffer<B>, mask: u8, k: usize) -> u8 {
        buffer.slots()[k * 8..k * 8 + 8]
            .iter()
            .fold(0, |byte, slot| (byte << 1) | u8::from(slot.data() & mask != 0))
    }

    #[test]
    fn test_brightness_scaling() {
        assert_eq!(Brightness::from_level(255), Brightness::FULL);
        assert_eq!(Brightness::FULL.scale(0xFF), 0xFF);
        assert_eq!(Brightness::from_level(0).scale(0xFF), 0);
        assert_eq!(Brightness::from_level(128).factor(), 129);
        assert_eq!(Brightness::from_level(128).scale(0xFF), ((0xFF * 129) >> 8) as u8);
        for level in 0..=255 {
            assert_eq!(Brightness::from_level(level).level(), level);
        }
    }

    #[test]
    fn test_half_brightness_red_on_strand_zero() {
        let mut store = PixelStore::<u8, LEN, 3>::new(ColorOrder::RGB);
        store.set_packed(0, 0x00FF0000);
        let mut buffer = WaveformBuffer::<BITS>::new();
        FrameEncoder::new(all_strands()).encode(&store, &Brightness::from_level(128), &mut buffer);

        let expected = ((0xFFu16 * 129) >> 8) as u8;
        assert_eq!(expected, 0x80);
        assert_eq!(wire_byte(&buffer, 0x01, 0), expected);
        for slot in &buffer.slots()[..8] {
            assert_eq!(slot.data() & 0xFE, 0, "strands 1-7 must stay dark");
        }
        assert!(buffer.slots()[8..].iter().all(|slot| slot.data() == 0));
        assert!(buffer.is_formatted());
    }

    #[test]
    fn test_bits_match_source_for_every_strand() {
        let mut store = PixelStore::<u8, LEN, 3>::new(ColorOrder::GRB);
        for n in 0..store.len() {
            let seed = (n as u32).wrapping_mul(2_654_435_761);
            store.set_packed(n, seed & 0x00FF_FFFF);
        }
        let mut buffer = WaveformBuffer::<BITS>::new();
        FrameEncoder::new(all_strands()).encode(&store, &Brightness::FULL, &mut buffer);

        for strand in 0..8 {
            let pixels = store.strand(strand).unwrap();
            for (k, &byte) in pixels.iter().flatten().enumerate() {
                assert_eq!(wire_byte(&buffer, 1 << strand, k), byte, "strand {strand} byte {k}");
            }
        }
    }

    #[test]
    fn test_brightness_is_not_destructive() {
        let mut store = PixelStore::<u8, LEN, 3>::new(ColorOrder::RGB);
        store.set_packed(5, 0x00123456);
        let encoder = FrameEncoder::new(all_strands());
        let mut buffer = WaveformBuffer::<BITS>::new();
        for level in [0, 17, 128, 255, 3] {
            encoder.encode(&store, &Brightness::from_level(level), &mut buffer);
            assert_eq!(store.packed(5), 0x00123456);
        }
        let brightness = Brightness::from_level(3);
        assert_eq!(wire_byte(&buffer, 1, 15), brightness.scale(0x12));
    }

    #[test]
    fn test_disabled_strands_stay_dark() {
        let pins = [Some(0), None, Some(2), Some(99), None, None, None, Some(7)];
        let strands = StrandSet::resolve(&pins, &mut DirectLanes);
        let mut store = PixelStore::<u8, LEN, 3>::new(ColorOrder::RGB);
        store.fill(crate::color::Rgbw::rgb(0xFF, 0xFF, 0xFF));
        let mut buffer = WaveformBuffer::<BITS>::new();
        FrameEncoder::new(strands).encode(&store, &Brightness::FULL, &mut buffer);
        for slot in buffer.slots() {
            assert_eq!(slot.data(), 0b1000_0101);
        }
    }

    #[test]
    fn test_reencode_clears_old_bits() {
        let mut store = PixelStore::<u8, LEN, 3>::new(ColorOrder::RGB);
        store.fill(crate::color::Rgbw::rgb(0xFF, 0xFF, 0xFF));
        let encoder = FrameEncoder::new(all_strands());
        let mut buffer = WaveformBuffer::<BITS>::new();
        encoder.encode(&store, &Brightness::FULL, &mut buffer);
        store.clear();
        encoder.encode(&store, &Brightness::FULL, &mut buffer);
        assert!(buffer.slots().iter().all(|slot| slot.data() == 0));
    }

    #[test]
    fn test_remapped_lanes() {
        // strand 0 wired to lane 7, strand 1 to lane 0
        let pins = [Some(10), Some(11), None, None, None, None, None, None];
        let strands = StrandSet::resolve(&pins, &mut |pin: u8| match pin {
            10 => 0x80,
            11 => 0x01,
            _ => 0,
        });
        let mut store = PixelStore::<u8, 1, 3>::new(ColorOrder::RGB);
        store.set_packed(0, 0x00F00000);
        store.set_packed(1, 0x000F0000);
        let mut buffer = WaveformBuffer::<{ compute_bit_count(1, 3) }>::new();
        FrameEncoder::new(strands).encode(&store, &Brightness::FULL, &mut buffer);
        assert_eq!(wire_byte(&buffer, 0x80, 0), 0xF0);
        assert_eq!(wire_byte(&buffer, 0x01, 0), 0x0F);
    }

    #[test]
    fn test_gamma_dither_extremes() {
        let table = GammaTable::uniform(u16::MAX, 2.6);
        let mut dither = DitherSequencer::new(4);
        let mut store = PixelStore::<u16, 2, 3>::new(ColorOrder::RGB);
        store.set_rgb(0, u16::MAX, 0, u16::MAX);
        let encoder = FrameEncoder::new(all_strands());
        let mut buffer = WaveformBuffer::<{ compute_bit_count(2, 3) }>::new();
        for _ in 0..dither.period() {
            encoder.encode(&store, &GammaDither::new(&table, &dither), &mut buffer);
            assert_eq!(wire_byte(&buffer, 1, 0), 0xFF);
            assert_eq!(wire_byte(&buffer, 1, 1), 0x00);
            assert_eq!(wire_byte(&buffer, 1, 2), 0xFF);
            dither.advance();
        }
    }

    #[test]
    fn test_gamma_dither_average() {
        let table = GammaTable::uniform(u16::MAX, 2.6);
        let mut dither = DitherSequencer::new(4);
        let mut store = PixelStore::<u16, 1, 3>::new(ColorOrder::RGB);
        store.set_rgb(0, 0x9000, 0x2000, 0xC3A1);
        let encoder = FrameEncoder::new(all_strands());
        let mut buffer = WaveformBuffer::<{ compute_bit_count(1, 3) }>::new();

        let mut sums = [0u32; 3];
        for _ in 0..dither.period() {
            encoder.encode(&store, &GammaDither::new(&table, &dither), &mut buffer);
            for (k, sum) in sums.iter_mut().enumerate() {
                *sum += u32::from(wire_byte(&buffer, 1, k));
            }
            dither.advance();
        }
        for (k, (&sum, value)) in sums.iter().zip([0x9000u16, 0x2000, 0xC3A1]).enumerate() {
            let channel = ColorOrder::RGB.channel_at(k);
            let ideal = f64::from(table.lookup(channel, value)) / 256.0;
            let average = f64::from(sum) / f64::from(dither.period());
            assert!((average - ideal).abs() <= 1.0 / 16.0, "{k}: {average} vs {ideal}");
        }
    }
}
