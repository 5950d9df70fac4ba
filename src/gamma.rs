//! Per-channel gamma lookup.
//!
//! Maps a 16-bit logical brightness to a 16-bit linear duty cycle. Each
//! channel has 256 entries built from
//! `peak × (index / 255) ^ gamma`; values between entries are linearly
//! interpolated, so the full 16-bit input range stays monotonic.

use crate::color::Channel;

/// Entries per channel.
pub const GAMMA_ENTRIES: usize = 256;

/// Exponent used when none is configured.
pub const DEFAULT_GAMMA: f32 = 2.6;

/// Gamma lookup table for up to four channels.
#[derive(Clone, PartialEq)]
pub struct GammaTable {
    entries: [[u16; GAMMA_ENTRIES]; 4],
    peaks: [u16; 4],
    gamma: f32,
}

impl GammaTable {
    /// Build a table with a separate peak per logical channel (R, G, B, W).
    #[must_use]
    pub fn new(peaks: [u16; 4], gamma: f32) -> Self {
        let mut table = Self {
            entries: [[0; GAMMA_ENTRIES]; 4],
            peaks,
            gamma: 1.0,
        };
        table.rebuild(peaks, gamma);
        table
    }

    /// Build a table with the same peak on every channel.
    #[must_use]
    pub fn uniform(peak: u16, gamma: f32) -> Self {
        Self::new([peak; 4], gamma)
    }

    /// Recompute every entry.
    ///
    /// A gamma that is not a positive finite number is treated as 1.0
    /// (linear).
    pub fn rebuild(&mut self, peaks: [u16; 4], gamma: f32) {
        let gamma = if gamma.is_finite() && gamma > 0.0 {
            gamma
        } else {
            1.0
        };
        self.peaks = peaks;
        self.gamma = gamma;
        for (entries, &peak) in self.entries.iter_mut().zip(&peaks) {
            let peak = f32::from(peak);
            for (i, entry) in entries.iter_mut().enumerate() {
                let level = i as f32 / (GAMMA_ENTRIES - 1) as f32;
                let value = libm::roundf(peak * libm::powf(level, gamma));
                *entry = value.clamp(0.0, f32::from(u16::MAX)) as u16;
            }
        }
    }

    /// Per-channel peaks the table was built with.
    #[must_use]
    pub const fn peaks(&self) -> [u16; 4] {
        self.peaks
    }

    /// Exponent the table was built with.
    #[must_use]
    pub const fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Raw table entry.
    #[must_use]
    pub const fn entry(&self, channel: Channel, index: u8) -> u16 {
        self.entries[channel.index()][index as usize]
    }

    /// Linear duty cycle for a 16-bit logical value.
    #[must_use]
    #[inline]
    pub fn lookup(&self, channel: Channel, value: u16) -> u16 {
        let entries = &self.entries[channel.index()];
        let scaled = u32::from(value) * (GAMMA_ENTRIES as u32 - 1);
        let index = (scaled / u32::from(u16::MAX)) as usize;
        let frac = scaled % u32::from(u16::MAX);
        let lo = u32::from(entries[index]);
        let hi = u32::from(entries[(index + 1).min(GAMMA_ENTRIES - 1)]);
        (lo + (hi.saturating_sub(lo) * frac) / u32::from(u16::MAX)) as u16
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::uniform(u16::MAX, DEFAULT_GAMMA)
    }
}

impl core::fmt::Debug for GammaTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GammaTable")
            .field("peaks", &self.peaks)
            .field("gamma", &self.gamma)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for GammaTable {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "GammaTable peaks: {} gamma: {}", self.peaks, self.gamma);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn test_linear_table_is_identity() {
        let table = GammaTable::uniform(u16::MAX, 1.0);
        for value in (0..=u16::MAX).step_by(97).chain([u16::MAX]) {
            assert_eq!(table.lookup(Channel::Red, value), value, "{value}");
        }
    }

    #[test]
    fn test_endpoints() {
        let table = GammaTable::default();
        for channel in Channel::ALL {
            assert_eq!(table.lookup(channel, 0), 0);
            assert_eq!(table.lookup(channel, u16::MAX), u16::MAX);
        }
    }

    #[test]
    fn test_monotonic() {
        let table = GammaTable::uniform(40_000, 2.6);
        let mut previous = 0;
        for value in 0..=u16::MAX {
            let out = table.lookup(Channel::Green, value);
            assert!(out >= previous, "{value}");
            previous = out;
        }
        assert_eq!(previous, 40_000);
    }

    #[test]
    fn test_gamma_darkens_midtones() {
        let table = GammaTable::default();
        let mid = table.lookup(Channel::Blue, 0x8000);
        // 0.5 ^ 2.6 ≈ 0.165
        assert!(mid > 10_000 && mid < 11_500, "{mid}");
    }

    #[test]
    fn test_per_channel_peaks() {
        let table = GammaTable::new([u16::MAX, 30_000, 0, 1000], 1.0);
        assert_eq!(table.lookup(Channel::Red, u16::MAX), u16::MAX);
        assert_eq!(table.lookup(Channel::Green, u16::MAX), 30_000);
        assert_eq!(table.lookup(Channel::Blue, u16::MAX), 0);
        assert_eq!(table.lookup(Channel::White, u16::MAX), 1000);
        assert_eq!(table.entry(Channel::Green, 255), 30_000);
    }

    #[test]
    fn test_invalid_gamma_is_linear() {
        for gamma in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let table = GammaTable::uniform(u16::MAX, gamma);
            assert_eq!(table.gamma(), 1.0);
            assert_eq!(table.lookup(Channel::Red, 0x1234), 0x1234);
        }
    }

    #[test]
    fn test_rebuild_replaces_entries() {
        let mut table = GammaTable::default();
        table.rebuild([1000; 4], 1.0);
        assert_eq!(table.peaks(), [1000; 4]);
        assert_eq!(table.lookup(Channel::Red, u16::MAX), 1000);
    }
}
