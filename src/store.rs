//! Logical pixel state for a strand group.
//!
//! The store keeps every strand's pixels in wire order, so encoding never has
//! to reorder channels. Pixels are addressed with a single global index in
//! `0..LEN * 8`: index `n` is pixel `n % LEN` of strand `n / LEN`, exactly as
//! if the eight strands were one long strip.
//!
//! Writes outside the store are ignored and reads outside it return black.

use crate::color::{ColorOrder, Rgbw, Sample};
use crate::STRAND_COUNT;

/// Per-pixel color state for eight strands of `LEN` pixels with `CH`
/// channels each.
#[derive(Clone, PartialEq)]
pub struct PixelStore<S, const LEN: usize, const CH: usize> {
    strands: [[[S; CH]; LEN]; STRAND_COUNT],
    order: ColorOrder,
}

impl<S: Sample, const LEN: usize, const CH: usize> PixelStore<S, LEN, CH> {
    /// An all-black store laid out for `order`.
    pub const fn new(order: ColorOrder) -> Self {
        Self {
            strands: [[[S::ZERO; CH]; LEN]; STRAND_COUNT],
            order,
        }
    }

    /// Channel order the store is laid out for.
    pub const fn order(&self) -> ColorOrder {
        self.order
    }

    /// Total number of pixels across all strands.
    #[must_use]
    pub const fn len(&self) -> usize {
        LEN * STRAND_COUNT
    }

    /// Whether the store holds no pixels at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        LEN == 0
    }

    /// Pixels per strand.
    #[must_use]
    pub const fn strand_len(&self) -> usize {
        LEN
    }

    fn locate(n: usize) -> Option<(usize, usize)> {
        if LEN == 0 || n >= LEN * STRAND_COUNT {
            return None;
        }
        Some((n / LEN, n % LEN))
    }

    /// Set pixel `n` to a logical color.
    pub fn set_pixel(&mut self, n: usize, color: impl Into<Rgbw<S>>) {
        let Some((strand, pixel)) = Self::locate(n) else {
            return;
        };
        let color = color.into();
        let order = self.order;
        let wire = &mut self.strands[strand][pixel];
        for (position, sample) in wire.iter_mut().enumerate() {
            *sample = color.get(order.channel_at(position));
        }
    }

    /// Set pixel `n` from separate red, green and blue values.
    pub fn set_rgb(&mut self, n: usize, r: S, g: S, b: S) {
        self.set_pixel(n, Rgbw::rgb(r, g, b));
    }

    /// Set pixel `n` from separate red, green, blue and white values.
    pub fn set_rgbw(&mut self, n: usize, r: S, g: S, b: S, w: S) {
        self.set_pixel(n, Rgbw::new(r, g, b, w));
    }

    /// Set pixel `n` from a packed `0xWWRRGGBB` value.
    pub fn set_packed(&mut self, n: usize, packed: u32) {
        self.set_pixel(n, Rgbw::<S>::from_packed(packed));
    }

    /// Logical color of pixel `n`.
    #[must_use]
    pub fn pixel(&self, n: usize) -> Rgbw<S> {
        let Some((strand, pixel)) = Self::locate(n) else {
            return Rgbw::BLACK;
        };
        let mut color = Rgbw::BLACK;
        for (position, &sample) in self.strands[strand][pixel].iter().enumerate() {
            color.set(self.order.channel_at(position), sample);
        }
        color
    }

    /// Pixel `n` packed as `0xWWRRGGBB` at 8-bit precision.
    #[must_use]
    pub fn packed(&self, n: usize) -> u32 {
        self.pixel(n).to_packed()
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: impl Into<Rgbw<S>>) {
        let color = color.into();
        let mut wire = [S::ZERO; CH];
        for (position, sample) in wire.iter_mut().enumerate() {
            *sample = color.get(self.order.channel_at(position));
        }
        for strand in &mut self.strands {
            strand.fill(wire);
        }
    }

    /// Set every pixel to black.
    pub fn clear(&mut self) {
        for strand in &mut self.strands {
            strand.fill([S::ZERO; CH]);
        }
    }

    /// Overwrite this store with `other`.
    pub fn copy_from(&mut self, other: &Self) {
        self.strands.copy_from_slice(&other.strands);
    }

    /// Move every sample half-way towards the matching sample of `other`.
    pub fn blend_from(&mut self, other: &Self) {
        let ours = self.strands.iter_mut().flatten().flatten();
        let theirs = other.strands.iter().flatten().flatten();
        for (sample, target) in ours.zip(theirs) {
            *sample = sample.blend(*target);
        }
    }

    /// Wire-ordered pixels of one strand.
    #[must_use]
    pub fn strand(&self, strand: usize) -> Option<&[[S; CH]; LEN]> {
        self.strands.get(strand)
    }

    /// Wire-ordered pixels of one strand, mutably.
    pub fn strand_mut(&mut self, strand: usize) -> Option<&mut [[S; CH]; LEN]> {
        self.strands.get_mut(strand)
    }

    /// Wire-ordered sample `wire` of `pixel` on `strand`.
    #[inline]
    pub(crate) fn sample(&self, strand: usize, pixel: usize, wire: usize) -> S {
        self.strands[strand][pixel][wire]
    }
}

impl<S: Sample, const LEN: usize, const CH: usize> core::fmt::Debug for PixelStore<S, LEN, CH> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PixelStore")
            .field("strand_len", &LEN)
            .field("channels", &CH)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::color::Channel;

    type Store = PixelStore<u8, 10, 3>;

    #[test]
    fn test_global_index_maps_to_strands() {
        let mut store = Store::new(ColorOrder::RGB);
        assert_eq!(store.len(), 80);
        store.set_packed(0, 0x00FF0000);
        store.set_packed(10, 0x0000FF00);
        store.set_packed(79, 0x000000FF);
        assert_eq!(store.strand(0).unwrap()[0], [0xFF, 0, 0]);
        assert_eq!(store.strand(1).unwrap()[0], [0, 0xFF, 0]);
        assert_eq!(store.strand(7).unwrap()[9], [0, 0, 0xFF]);
    }

    #[test]
    fn test_wire_order_follows_color_order() {
        let mut store = Store::new(ColorOrder::GRB);
        store.set_rgb(3, 1, 2, 3);
        assert_eq!(store.strand(0).unwrap()[3], [2, 1, 3]);
        assert_eq!(store.pixel(3), Rgbw::rgb(1, 2, 3));
        assert_eq!(store.packed(3), 0x0001_0203);
    }

    #[test]
    fn test_white_channel() {
        let mut store = PixelStore::<u8, 4, 4>::new(ColorOrder::GRBW);
        store.set_rgbw(0, 10, 20, 30, 40);
        assert_eq!(store.strand(0).unwrap()[0], [20, 10, 30, 40]);
        assert_eq!(store.pixel(0).get(Channel::White), 40);
        assert_eq!(store.packed(0), 0x280A141E);
    }

    #[test]
    fn test_white_ignored_without_white_channel() {
        let mut store = Store::new(ColorOrder::RGB);
        store.set_packed(0, 0xFF_01_02_03);
        assert_eq!(store.packed(0), 0x00_01_02_03);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut store = Store::new(ColorOrder::RGB);
        let before = store.clone();
        store.set_packed(80, 0x00FFFFFF);
        store.set_packed(usize::MAX, 0x00FFFFFF);
        assert_eq!(store, before);
        assert_eq!(store.pixel(80), Rgbw::BLACK);
    }

    #[test]
    fn test_fill_and_clear() {
        let mut store = Store::new(ColorOrder::GRB);
        store.fill(Rgbw::rgb(9, 8, 7));
        for n in 0..store.len() {
            assert_eq!(store.pixel(n), Rgbw::rgb(9, 8, 7));
        }
        store.clear();
        for n in 0..store.len() {
            assert_eq!(store.packed(n), 0);
        }
    }

    #[test]
    fn test_blend_from_moves_half_way() {
        let mut shown = PixelStore::<u16, 2, 3>::new(ColorOrder::RGB);
        let mut next = PixelStore::<u16, 2, 3>::new(ColorOrder::RGB);
        next.set_rgb(0, 1000, 0, u16::MAX);
        shown.set_rgb(0, 0, 2000, u16::MAX);
        shown.blend_from(&next);
        assert_eq!(shown.pixel(0), Rgbw::rgb(500, 1000, u16::MAX));
        shown.copy_from(&next);
        assert_eq!(shown, next);
    }

    #[test]
    fn test_wide_store_accepts_eight_bit_colors() {
        let mut store = PixelStore::<u16, 2, 3>::new(ColorOrder::RGB);
        store.set_packed(1, 0x00FF8000);
        assert_eq!(store.pixel(1), Rgbw::rgb(u16::MAX, 0x8080, 0));
        assert_eq!(store.packed(1), 0x00FF8000);
    }
}
