//! DMA waveform encoder for eight parallel addressable-LED strands.
//!
//! ## How the LEDs are driven
//!
//! WS2812-style LEDs take a single-wire serial signal at 800 kbit/s. Every
//! bit is a high pulse followed by a low one, and only the length of the
//! high pulse tells a 0 from a 1:
//!
//! ```text
//!        ┌──┐                         ┌────────┐
//!   0:   │  │________       1:        │        │__
//!        └──┘                         └────────┘
//!        ⅓ high, ⅔ low                ⅔ high, ⅓ low
//! ```
//!
//! Clocking a byte out of an 8-bit port every 1/2.4 MHz splits each bit into
//! three equal thirds. The first third is always high, the last always low,
//! and the middle third is high only for a 1. One byte drives all eight
//! port lanes at once, so a single transfer carries eight strands:
//!
//! ```text
//!   slot for bit k:  [ 0xFF ][ lanes sending a 1 ][ 0x00 ]
//! ```
//!
//! A DMA channel paced by a timer pattern generator, a PIO state machine or
//! a parallel-output bus moves the bytes without the CPU touching every
//! bit. After the last bit, the line must stay low for the latch interval
//! before the LEDs show the frame.
//!
//! ## Layout of this crate
//!
//! - [`store::PixelStore`]: logical pixels for all eight strands, 8 or 16
//!   bits per channel.
//! - [`encoder::FrameEncoder`]: transposes the pixels into a
//!   [`waveform::WaveformBuffer`], applying brightness or gamma and dither on
//!   the way.
//! - [`scheduler::BufferScheduler`]: single or double buffering, latch timing
//!   and the transfer watchdog.
//! - [`engine`]: the [`engine::TransferEngine`] trait and the pattern
//!   generator, PIO and parallel-bus engines built on a
//!   [`engine::DmaChannel`].
//! - [`strands::Strands`]: 8-bit front end with global brightness.
//! - [`hdr`]: 16-bit front end split between an application side and a
//!   refresh side, with gamma correction and temporal dithering.
//! - [`config`]: [`StrandConfig`] and its JSON loader.
//! - [`layout`]: strands folded into a matrix, drawable with
//!   `embedded-graphics`.
//!
//! ## Sizing buffers
//!
//! Buffer sizes are compile-time constants so the waveform buffers can live
//! in `static` memory reachable by DMA:
//!
//! ```rust
//! use parallel_strands::{compute_bit_count, compute_buffer_bytes, WaveformBuffer};
//!
//! const LEN: usize = 100;
//! const BITS: usize = compute_bit_count(LEN, 3);
//!
//! static mut BUFFERS: [WaveformBuffer<BITS>; 2] = [WaveformBuffer::new(), WaveformBuffer::new()];
//!
//! assert_eq!(compute_buffer_bytes(BITS), 7_206);
//! ```
//!
//! ## Available Feature Flags
//!
//! ### `esp-dma` Feature
//! Switches the `ReadBuffer` implementation of [`WaveformBuffer`] from
//! `embedded-dma` to `esp-hal::dma`. Use one of `esp32`, `esp32s3` or
//! `esp32c6` to pick the chip.
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the plain data types and emits `defmt`
//! log records on initialization, configuration fallback and transfer
//! errors.
//!
//! ### `embassy-time` Feature
//! Provides [`clock::EmbassyClock`], a [`clock::MicrosClock`] backed by
//! `embassy-time`.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod clock;
pub mod color;
pub mod config;
pub mod dither;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod gamma;
pub mod hdr;
pub mod layout;
pub mod scheduler;
pub mod store;
pub mod strand;
pub mod strands;
pub mod waveform;

#[cfg(test)]
mod testing;

pub use config::{load_config, read_extras, StrandConfig};
pub use error::{InitError, ShowError};
pub use hdr::{HdrStrands, Refresher, SharedFrame};
pub use scheduler::{BufferScheduler, Phase, StageOutcome};
pub use strands::Strands;
pub use waveform::WaveformBuffer;

/// Number of strands driven in parallel.
pub const STRAND_COUNT: usize = 8;

/// Zero bytes sent ahead of the first bit while the DMA settles.
pub const HEADER_PADDING: usize = 6;

/// Bytes per protocol bit.
pub const SLOT_BYTES: usize = 3;

/// First byte of every bit slot: all lanes high.
pub const BIT_START: u8 = 0xFF;

/// Bit rate of the LED protocol.
pub const PROTOCOL_BIT_RATE_HZ: u32 = 800_000;

/// Rate at which waveform bytes are clocked out.
pub const TRANSFER_RATE_HZ: u32 = PROTOCOL_BIT_RATE_HZ * SLOT_BYTES as u32;

/// Computes the number of bit slots per strand
///
/// # Arguments
///
/// * `len` - Pixels per strand
/// * `channels` - Channels per pixel (3 or 4)
///
/// # Returns
///
/// The `BITS` parameter for [`WaveformBuffer`]
#[must_use]
pub const fn compute_bit_count(len: usize, channels: usize) -> usize {
    len * channels * 8
}

/// Computes the size in bytes of a waveform buffer with `bits` bit slots,
/// header included
#[must_use]
pub const fn compute_buffer_bytes(bits: usize) -> usize {
    HEADER_PADDING + SLOT_BYTES * bits
}
