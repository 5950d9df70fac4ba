//! Transfer engine interface.
//!
//! The crate never touches peripheral registers. It hands a prepared
//! [`WaveformBuffer`] to a [`TransferEngine`] and watches a
//! [`TransferSignal`] for completion. Three engines are provided, one per
//! family of output hardware:
//!
//! - [`PatternGeneratorEngine`]: a timer's pattern generator, fed one byte
//!   per tick into a fixed data register.
//! - [`PioEngine`]: a programmable I/O state machine, fed through its TX FIFO.
//! - [`ParallelEngine`]: a parallel-output peripheral (LCD/camera or I2S
//!   parallel mode) fed by a general-purpose DMA controller.
//!
//! All three drive a [`DmaChannel`], the minimal DMA interface this crate
//! needs from a HAL, plus the peripheral trait for their output block.
//!
//! # Completion
//!
//! The channel's interrupt handler must call
//! [`TransferSignal::complete`] with the current microsecond time once the
//! last byte has left. Channels without an interrupt can do the same from
//! [`DmaChannel::poll`], which the scheduler calls while it waits.

use bitfield::bitfield;
#[cfg(not(feature = "esp-dma"))]
use embedded_dma::ReadBuffer;
#[cfg(feature = "esp-dma")]
use esp_hal::dma::ReadBuffer;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::waveform::WaveformBuffer;

mod parallel;
mod pattern;
mod pio;

pub use parallel::{ParallelEngine, ParallelOutput};
pub use pattern::{PatternGenerator, PatternGeneratorEngine};
pub use pio::{PioEngine, PioStateMachine};

/// Completion state of the transfer engine.
///
/// This is the context token handed to the DMA completion interrupt. It
/// replaces a process-wide "transfer in progress" flag, so more than one
/// strand group can run at once.
#[derive(Debug, Default)]
pub struct TransferSignal {
    busy: AtomicBool,
    completed: AtomicBool,
    completed_at: AtomicU32,
}

impl TransferSignal {
    /// A signal with no transfer in flight and none completed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            completed_at: AtomicU32::new(0),
        }
    }

    /// Mark a transfer as started.
    pub fn arm(&self) {
        self.busy.store(true, Ordering::Release);
    }

    /// Mark the running transfer as finished at `now_micros`.
    ///
    /// Safe to call from interrupt context.
    pub fn complete(&self, now_micros: u32) {
        self.completed_at.store(now_micros, Ordering::Relaxed);
        self.completed.store(true, Ordering::Relaxed);
        self.busy.store(false, Ordering::Release);
    }

    /// Drop a transfer that never started, without recording a completion.
    pub fn cancel(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Whether a transfer is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// When the last transfer finished, if any has.
    #[must_use]
    pub fn last_completion(&self) -> Option<u32> {
        if self.completed.load(Ordering::Acquire) {
            Some(self.completed_at.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

/// Size of each DMA read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeatSize {
    /// 8 bits
    Byte = 0,
    /// 16 bits
    HalfWord = 1,
    /// 32 bits
    Word = 2,
}

impl BeatSize {
    /// Bytes moved per beat.
    #[must_use]
    pub const fn bytes(self) -> usize {
        1 << self as usize
    }
}

bitfield! {
    /// 16-bit control word of a DMA block descriptor.
    ///
    /// The bit layout is as follows:
    /// - Bit 11: Increment destination address
    /// - Bit 10: Increment source address
    /// - Bits 9-8: Beat size (0 = byte, 1 = half-word, 2 = word)
    /// - Bit 0: Descriptor valid
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct BlockControl(u16);
    impl Debug;
    pub destination_increment, set_destination_increment: 11;
    pub source_increment, set_source_increment: 10;
    pub u8, beat_size, set_beat_size: 9, 8;
    pub valid, set_valid: 0;
}

/// Parameters of one memory-to-peripheral transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferConfig {
    /// Address of the peripheral register or FIFO.
    pub destination: usize,
    /// Bytes to move.
    pub byte_count: usize,
    /// Size of each beat.
    pub beat: BeatSize,
    /// Advance the source address after each beat.
    pub increment_source: bool,
    /// Advance the destination address after each beat.
    pub increment_destination: bool,
}

impl TransferConfig {
    /// A byte-wide transfer streaming memory into a fixed peripheral address.
    #[must_use]
    pub const fn to_peripheral(destination: usize, byte_count: usize) -> Self {
        Self {
            destination,
            byte_count,
            beat: BeatSize::Byte,
            increment_source: true,
            increment_destination: false,
        }
    }

    /// Number of beats the transfer takes.
    #[must_use]
    pub const fn beat_count(&self) -> usize {
        self.byte_count / self.beat.bytes()
    }

    /// The transfer as a descriptor control word.
    #[must_use]
    pub fn control(&self) -> BlockControl {
        let mut control = BlockControl(0);
        control.set_valid(true);
        control.set_beat_size(self.beat as u8);
        control.set_source_increment(self.increment_source);
        control.set_destination_increment(self.increment_destination);
        control
    }
}

/// A DMA channel, as provided by the HAL.
pub trait DmaChannel {
    /// Error raised by the channel.
    type Error: core::fmt::Debug;

    /// Claim the channel.
    fn allocate(&mut self) -> Result<(), Self::Error>;

    /// Prepare a transfer from `source`.
    ///
    /// `control` is `config` packed into a descriptor control word, ready
    /// for channels programmed through block descriptors.
    ///
    /// # Safety
    /// `source` must stay valid and unmodified for `config.byte_count` bytes
    /// until the transfer completes or is aborted.
    unsafe fn configure_transfer(
        &mut self,
        source: *const u8,
        config: &TransferConfig,
        control: BlockControl,
    ) -> Result<(), Self::Error>;

    /// Signal to complete from the transfer-complete interrupt.
    fn register_completion(&mut self, signal: &'static TransferSignal);

    /// Enable the channel.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Software-trigger the first beat.
    fn trigger(&mut self);

    /// Stop any transfer immediately.
    fn abort(&mut self);

    /// Check for completion without an interrupt.
    fn poll(&mut self) {}
}

/// Moves waveform buffers to the output lanes.
pub trait TransferEngine {
    /// Error raised by the engine.
    type Error: core::fmt::Debug;

    /// Claim the hardware, set the transfer clock and enable the outputs in
    /// `output_mask`.
    fn begin(&mut self, output_mask: u8) -> Result<(), Self::Error>;

    /// Completion state of the running transfer.
    fn completion(&self) -> &TransferSignal;

    /// Start sending `buffer`.
    ///
    /// # Safety
    /// `buffer` must not move or be written until
    /// [`completion`](Self::completion) reports the transfer done or
    /// [`abort`](Self::abort) has been called.
    unsafe fn transmit<const BITS: usize>(
        &mut self,
        buffer: &WaveformBuffer<BITS>,
    ) -> Result<(), Self::Error>;

    /// Give a polled engine a chance to notice completion.
    fn poll(&mut self) {}

    /// Stop the running transfer.
    fn abort(&mut self);
}

/// Claim `channel` and route its completion to `signal`.
pub(crate) fn claim<D: DmaChannel>(
    channel: &mut D,
    signal: &'static TransferSignal,
) -> Result<(), D::Error> {
    channel.allocate()?;
    channel.register_completion(signal);
    Ok(())
}

/// Stream `buffer` into the peripheral register at `destination`.
///
/// # Safety
/// See [`TransferEngine::transmit`].
pub(crate) unsafe fn stream_to<D: DmaChannel, const BITS: usize>(
    channel: &mut D,
    destination: usize,
    buffer: &WaveformBuffer<BITS>,
) -> Result<(), D::Error> {
    let (source, byte_count) = buffer.read_buffer();
    let config = TransferConfig::to_peripheral(destination, byte_count);
    channel.configure_transfer(source, &config, config.control())?;
    channel.start()?;
    channel.trigger();
    Ok(())
}
