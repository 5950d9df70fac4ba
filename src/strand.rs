//! Strand to output-lane resolution.
//!
//! Every strand is driven by one lane of the output peripheral. Which lane a
//! pin lands on is a property of the hardware, so it is looked up once at
//! initialization through a [`PinMap`]. A pin the peripheral cannot drive
//! resolves to a bitmask of 0 and its strand stays silent.

use crate::STRAND_COUNT;

/// Resolves a logical pin number to its lane bitmask in the output
/// peripheral.
///
/// Returns 0 when the pin cannot be driven by the peripheral.
pub trait PinMap {
    /// Bitmask of the lane `pin` drives, or 0 if unsupported.
    fn bitmask(&mut self, pin: u8) -> u8;
}

impl<F> PinMap for F
where
    F: FnMut(u8) -> u8,
{
    fn bitmask(&mut self, pin: u8) -> u8 {
        self(pin)
    }
}

/// Pin map for peripherals where pin `n` drives lane `n` directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirectLanes;

impl PinMap for DirectLanes {
    fn bitmask(&mut self, pin: u8) -> u8 {
        if usize::from(pin) < STRAND_COUNT {
            1 << pin
        } else {
            0
        }
    }
}

/// One output strand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Strand {
    index: u8,
    pin: Option<u8>,
    bitmask: u8,
}

impl Strand {
    const fn silent(index: u8) -> Self {
        Self {
            index,
            pin: None,
            bitmask: 0,
        }
    }

    /// Strand index, 0-7.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    /// The pin this strand was configured with.
    #[must_use]
    pub const fn pin(&self) -> Option<u8> {
        self.pin
    }

    /// Lane bitmask within each waveform data byte.
    #[must_use]
    pub const fn bitmask(&self) -> u8 {
        self.bitmask
    }

    /// Whether this strand produces any output.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.bitmask != 0
    }
}

/// The eight strands of a strand group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StrandSet {
    strands: [Strand; STRAND_COUNT],
}

impl StrandSet {
    /// A set with every strand disabled.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            strands: [
                Strand::silent(0),
                Strand::silent(1),
                Strand::silent(2),
                Strand::silent(3),
                Strand::silent(4),
                Strand::silent(5),
                Strand::silent(6),
                Strand::silent(7),
            ],
        }
    }

    /// Look up every configured pin in `map`.
    pub fn resolve<M: PinMap + ?Sized>(pins: &[Option<u8>; STRAND_COUNT], map: &mut M) -> Self {
        let mut set = Self::silent();
        for (strand, pin) in set.strands.iter_mut().zip(pins) {
            strand.pin = *pin;
            strand.bitmask = pin.map_or(0, |pin| map.bitmask(pin));
        }
        set
    }

    /// All eight strands, enabled or not.
    pub fn iter(&self) -> impl Iterator<Item = &Strand> {
        self.strands.iter()
    }

    /// Only the strands that produce output.
    pub fn enabled(&self) -> impl Iterator<Item = &Strand> {
        self.strands.iter().filter(|strand| strand.is_enabled())
    }

    /// Strand by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Strand> {
        self.strands.get(index)
    }

    /// Whether at least one strand produces output.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.strands.iter().any(Strand::is_enabled)
    }

    /// Union of every enabled strand's lane bitmask.
    #[must_use]
    pub fn output_mask(&self) -> u8 {
        self.strands
            .iter()
            .fold(0, |mask, strand| mask | strand.bitmask)
    }
}

impl Default for StrandSet {
    fn default() -> Self {
        Self::silent()
    }
}
