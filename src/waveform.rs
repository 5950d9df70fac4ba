//! DMA-transferable waveform buffer for eight parallel strands.
//!
//! The output peripheral shifts one byte onto the eight output lanes every
//! transfer clock, one bit per lane. Every protocol bit is stretched over
//! three transfers:
//!
//! ```text
//!   transfer   0           1           2
//!   lanes   ┌──────┐ ┌───────────┐
//!   bit = 1 │ HIGH │ │   HIGH    │    LOW
//!   bit = 0 │ HIGH │     LOW         LOW
//! ```
//!
//! The first byte of each slot is always [`BIT_START`](crate::BIT_START) (all
//! lanes high), the last byte is always zero, and only the middle byte
//! differs per lane: a lane's bit is set there when that strand sends a 1.
//! At a 2.4 MHz transfer clock that produces the 800 kHz WS2812 bit rate.
//!
//! The buffer starts with [`HEADER_PADDING`](crate::HEADER_PADDING) zero
//! bytes so the lanes sit low while the DMA engine gets going.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────┬─────────────┬─────────────┬─────┬──────────────────┐
//! │ header (6×0) │ slot 0      │ slot 1      │ ... │ slot BITS-1      │
//! │              │ FF  dd  00  │ FF  dd  00  │     │ FF  dd  00       │
//! └──────────────┴─────────────┴─────────────┴─────┴──────────────────┘
//! ```
//!
//! Slots run pixel by pixel, channel by channel in wire order, most
//! significant bit first, exactly as each strand expects them.
//!
//! # Safety
//! The buffer is handed to DMA hardware through [`ReadBuffer`]. It must stay
//! where it is and must not be written while a transfer reads it; the
//! [`BufferScheduler`](crate::scheduler::BufferScheduler) enforces both.

use crate::{compute_buffer_bytes, BIT_START, HEADER_PADDING};
#[cfg(not(feature = "esp-dma"))]
use embedded_dma::ReadBuffer;
#[cfg(feature = "esp-dma")]
use esp_hal::dma::ReadBuffer;

/// One protocol bit: start, data and end transfer bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Slot {
    start: u8,
    data: u8,
    end: u8,
}

impl Slot {
    /// A slot sending 0 on every lane.
    pub const IDLE: Self = Self {
        start: BIT_START,
        data: 0,
        end: 0,
    };

    /// Lanes sending a 1 in this slot.
    #[must_use]
    pub const fn data(&self) -> u8 {
        self.data
    }

    #[inline]
    pub(crate) fn set_data(&mut self, lanes: u8) {
        self.data = lanes;
    }

    /// Whether the fixed start and end bytes are intact.
    #[must_use]
    pub const fn is_framed(&self) -> bool {
        self.start == BIT_START && self.end == 0
    }

    /// The three transfer bytes, in order.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 3] {
        [self.start, self.data, self.end]
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Waveform buffer holding `BITS` protocol bits for all eight strands.
///
/// Use [`compute_bit_count`](crate::compute_bit_count) to size it for a
/// strand length and channel count.
///
/// # Example
/// ```rust
/// use parallel_strands::{compute_bit_count, compute_buffer_bytes};
/// use parallel_strands::waveform::WaveformBuffer;
///
/// const LEN: usize = 30;
/// const BITS: usize = compute_bit_count(LEN, 3);
///
/// let buffer = WaveformBuffer::<BITS>::new();
/// assert_eq!(buffer.len(), compute_buffer_bytes(BITS));
/// ```
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
#[repr(align(4))]
pub struct WaveformBuffer<const BITS: usize> {
    header: [u8; HEADER_PADDING],
    slots: [Slot; BITS],
}

impl<const BITS: usize> Default for WaveformBuffer<BITS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BITS: usize> WaveformBuffer<BITS> {
    /// A formatted buffer sending 0 on every lane.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            header: [0; HEADER_PADDING],
            slots: [Slot::IDLE; BITS],
        }
    }

    /// Restore the header and every slot's start and end bytes, and clear all
    /// data bytes.
    pub fn format(&mut self) {
        self.header = [0; HEADER_PADDING];
        self.slots.fill(Slot::IDLE);
    }

    /// Clear the data bytes only, leaving the framing in place.
    ///
    /// Much cheaper than [`format`](Self::format) and enough to blank all
    /// strands on the next transfer.
    pub fn erase(&mut self) {
        for slot in &mut self.slots {
            slot.data = 0;
        }
    }

    /// Number of bytes a transfer of this buffer moves.
    #[must_use]
    pub const fn len(&self) -> usize {
        compute_buffer_bytes(BITS)
    }

    /// Whether the buffer holds no slots.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        BITS == 0
    }

    /// Number of protocol bit slots.
    #[must_use]
    pub const fn bit_count(&self) -> usize {
        BITS
    }

    /// All bit slots, in transmission order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Lanes sending a 1 in bit slot `bit`.
    #[must_use]
    pub fn data(&self, bit: usize) -> Option<u8> {
        self.slots.get(bit).map(Slot::data)
    }

    /// Whether the header is zero and every slot's framing bytes are intact.
    #[must_use]
    pub fn is_formatted(&self) -> bool {
        self.header.iter().all(|&b| b == 0) && self.slots.iter().all(Slot::is_framed)
    }

    /// The bytes a transfer of this buffer sends, header included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `#[repr(C)]` places `slots` right after the 6-byte header and
        // `Slot` is three `u8`s with alignment 1, so the first `len()` bytes are
        // initialized and contiguous.
        unsafe { core::slice::from_raw_parts(core::ptr::from_ref(self).cast::<u8>(), self.len()) }
    }
}

unsafe impl<const BITS: usize> ReadBuffer for WaveformBuffer<BITS> {
    #[cfg(not(feature = "esp-dma"))]
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let bytes = self.as_bytes();
        (bytes.as_ptr(), bytes.len())
    }
}

unsafe impl<const BITS: usize> ReadBuffer for &mut WaveformBuffer<BITS> {
    #[cfg(not(feature = "esp-dma"))]
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let bytes = self.as_bytes();
        (bytes.as_ptr(), bytes.len())
    }
}

impl<const BITS: usize> core::fmt::Debug for WaveformBuffer<BITS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaveformBuffer")
            .field("bits", &BITS)
            .field("size", &self.len())
            .field("header", &HEADER_PADDING)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const BITS: usize> defmt::Format for WaveformBuffer<BITS> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "WaveformBuffer<{}>", BITS);
        defmt::write!(f, " size: {}", self.len());
    }
}
