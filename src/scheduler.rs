//! Waveform buffer hand-off between the encoder and the transfer engine.
//!
//! A frame moves through five phases:
//!
//! ```text
//! Idle ──stage──▶ Encoding ──▶ Ready ──show──▶ Transferring ──irq──▶ Latching ──latch──▶ Idle
//! ```
//!
//! The latch phase ends lazily: nothing wakes up when it is over, the next
//! `show` simply checks the elapsed time against the configured latch
//! interval before starting the next transfer.
//!
//! With one buffer, staging waits for the running transfer to finish. With
//! two or more, buffers rotate and a frame can be encoded while the previous
//! one is still on the wire. Either way, at most one transfer is in flight
//! and the buffer it reads is never written.

use crate::clock::{elapsed_micros, MicrosClock};
use crate::engine::TransferEngine;
use crate::error::{InitError, ShowError};
use crate::waveform::WaveformBuffer;

/// Where the scheduler is in the frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Nothing staged, nothing sending, latch interval over.
    Idle,
    /// A frame is being written into a waveform buffer.
    ///
    /// Encoding runs inside `stage_with`/`show_with`, which hold the
    /// scheduler mutably, so [`BufferScheduler::phase`] never returns this
    /// to a caller. It completes the cycle for code matching on `Phase`.
    Encoding,
    /// A frame is staged and waiting to be shown.
    Ready,
    /// A transfer is in flight.
    Transferring,
    /// The last transfer finished less than the latch interval ago.
    Latching,
}

/// Result of asking for a frame to be staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StageOutcome {
    /// A frame was encoded into a waveform buffer.
    Staged,
    /// A frame was already staged; nothing was done.
    AlreadyStaged,
    /// Staging is done elsewhere in this pipeline; nothing was done.
    NotApplicable,
}

/// Owns the waveform buffers and sequences their transfers.
///
/// The buffers must be `'static` because the transfer engine reads them
/// behind the borrow checker's back. Dropping the scheduler aborts any
/// transfer still in flight.
pub struct BufferScheduler<E: TransferEngine, C: MicrosClock, const BITS: usize> {
    engine: E,
    clock: C,
    buffers: &'static mut [WaveformBuffer<BITS>],
    latch_micros: u32,
    timeout_micros: Option<u32>,
    initialized: bool,
    staged: Option<usize>,
    in_flight: Option<usize>,
    next: usize,
    started_at: u32,
}

impl<E: TransferEngine, C: MicrosClock, const BITS: usize> BufferScheduler<E, C, BITS> {
    /// Build a scheduler over one (single-buffered) or more (rotating)
    /// waveform buffers.
    ///
    /// `latch_micros` is the idle time the LEDs need after a frame before
    /// they accept the next one. It depends on the LED vendor; WS2812B parts
    /// want at least 280 µs.
    ///
    /// # Errors
    /// [`InitError::MissingBuffer`] if `buffers` is empty.
    pub fn new(
        engine: E,
        clock: C,
        buffers: &'static mut [WaveformBuffer<BITS>],
        latch_micros: u32,
    ) -> Result<Self, InitError> {
        if buffers.is_empty() {
            return Err(InitError::MissingBuffer);
        }
        Ok(Self {
            engine,
            clock,
            buffers,
            latch_micros,
            timeout_micros: None,
            initialized: false,
            staged: None,
            in_flight: None,
            next: 0,
            started_at: 0,
        })
    }

    /// Abort a transfer that has not completed within `micros`.
    #[must_use]
    pub fn with_timeout(mut self, micros: u32) -> Self {
        self.timeout_micros = Some(micros);
        self
    }

    /// Format every buffer and start the transfer engine.
    ///
    /// # Errors
    /// [`InitError::Engine`] if the engine refuses to start.
    pub fn begin(&mut self, output_mask: u8) -> Result<(), InitError> {
        for buffer in self.buffers.iter_mut() {
            buffer.format();
        }
        if let Err(_error) = self.engine.begin(output_mask) {
            #[cfg(feature = "defmt")]
            defmt::warn!("transfer engine failed to start: {}", defmt::Debug2Format(&_error));
            return Err(InitError::Engine);
        }
        self.initialized = true;
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "scheduler ready: {} buffer(s) of {} bytes, outputs {=u8:#b}",
            self.buffers.len(),
            crate::compute_buffer_bytes(BITS),
            output_mask
        );
        Ok(())
    }

    /// Whether [`begin`](Self::begin) succeeded.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a frame can be encoded while another is on the wire.
    #[must_use]
    pub fn is_double_buffered(&self) -> bool {
        self.buffers.len() > 1
    }

    /// Number of waveform buffers in rotation.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Required idle time between frames.
    #[must_use]
    pub const fn latch_micros(&self) -> u32 {
        self.latch_micros
    }

    /// Transfer watchdog limit, if enabled.
    #[must_use]
    pub const fn timeout_micros(&self) -> Option<u32> {
        self.timeout_micros
    }

    /// The transfer engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The time source.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The staged frame's waveform, if one is staged.
    #[must_use]
    pub fn staged_buffer(&self) -> Option<&WaveformBuffer<BITS>> {
        self.staged.and_then(|slot| self.buffers.get(slot))
    }

    /// Current phase of the frame cycle.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.engine.completion().is_busy() {
            Phase::Transferring
        } else if !self.latch_elapsed(self.clock.now_micros()) {
            Phase::Latching
        } else if self.staged.is_some() {
            Phase::Ready
        } else {
            Phase::Idle
        }
    }

    /// Whether at least the latch interval has passed at `now` since the
    /// last transfer completed. Always true before the first transfer.
    #[must_use]
    pub fn latch_elapsed(&self, now: u32) -> bool {
        self.engine
            .completion()
            .last_completion()
            .is_none_or(|done| elapsed_micros(done, now) >= self.latch_micros)
    }

    /// Whether [`stage_with`](Self::stage_with) would encode right away
    /// without waiting.
    #[must_use]
    pub fn can_stage(&self) -> bool {
        self.initialized
            && self.staged.is_none()
            && (self.is_double_buffered() || !self.engine.completion().is_busy())
    }

    /// Whether [`show_with`](Self::show_with) would start a transfer right
    /// away without waiting.
    #[must_use]
    pub fn can_show(&self) -> bool {
        self.initialized
            && !self.engine.completion().is_busy()
            && self.latch_elapsed(self.clock.now_micros())
    }

    /// Let a polled engine notice completion.
    pub fn poll(&mut self) {
        self.engine.poll();
        if self.in_flight.is_some() && !self.engine.completion().is_busy() {
            self.in_flight = None;
        }
    }

    /// Encode the next frame with `encode` unless one is already staged.
    ///
    /// With a single buffer this first waits for the running transfer.
    ///
    /// # Errors
    /// [`ShowError::NotInitialized`] before [`begin`](Self::begin);
    /// [`ShowError::TransferTimeout`] if the wait for the running transfer
    /// trips the watchdog.
    pub fn stage_with<F>(&mut self, encode: F) -> Result<StageOutcome, ShowError>
    where
        F: FnOnce(&mut WaveformBuffer<BITS>),
    {
        if !self.initialized {
            return Err(ShowError::NotInitialized);
        }
        if self.staged.is_some() {
            return Ok(StageOutcome::AlreadyStaged);
        }
        let slot = self.next;
        if self.in_flight == Some(slot) {
            self.wait_transfer()?;
        }
        encode(&mut self.buffers[slot]);
        self.staged = Some(slot);
        Ok(StageOutcome::Staged)
    }

    /// Send the staged frame, staging one with `encode` first if needed.
    ///
    /// Waits for the running transfer and then for the latch interval before
    /// handing the buffer to the engine.
    ///
    /// # Errors
    /// See [`stage_with`](Self::stage_with); additionally
    /// [`ShowError::Engine`] if the engine refuses the transfer. The staged
    /// frame is kept on every error so a later call can retry it.
    pub fn show_with<F>(&mut self, encode: F) -> Result<(), ShowError>
    where
        F: FnOnce(&mut WaveformBuffer<BITS>),
    {
        self.stage_with(encode)?;
        let Some(slot) = self.staged else {
            return Err(ShowError::NotInitialized);
        };
        self.wait_transfer()?;
        self.wait_latch();

        self.engine.completion().arm();
        let now = self.clock.now_micros();
        // SAFETY: the buffer is `'static` and stays untouched until the
        // signal reports completion or `abort` runs: staging skips the
        // in-flight slot and `Drop` aborts.
        if let Err(_error) = unsafe { self.engine.transmit(&self.buffers[slot]) } {
            self.engine.completion().cancel();
            #[cfg(feature = "defmt")]
            defmt::warn!("transfer rejected: {}", defmt::Debug2Format(&_error));
            return Err(ShowError::Engine);
        }
        self.started_at = now;
        self.in_flight = Some(slot);
        self.staged = None;
        self.next = (slot + 1) % self.buffers.len();
        Ok(())
    }

    /// Block until no transfer is in flight.
    ///
    /// # Errors
    /// [`ShowError::TransferTimeout`] if the watchdog trips; the transfer is
    /// aborted and its completion recorded at the current time.
    pub fn wait_transfer(&mut self) -> Result<(), ShowError> {
        loop {
            self.engine.poll();
            if !self.engine.completion().is_busy() {
                self.in_flight = None;
                return Ok(());
            }
            if let Some(limit) = self.timeout_micros {
                let now = self.clock.now_micros();
                if elapsed_micros(self.started_at, now) > limit {
                    self.engine.abort();
                    self.engine.completion().complete(now);
                    self.in_flight = None;
                    #[cfg(feature = "defmt")]
                    defmt::warn!("transfer still busy after {} us, aborted", limit);
                    return Err(ShowError::TransferTimeout);
                }
            }
            core::hint::spin_loop();
        }
    }

    fn wait_latch(&mut self) {
        while !self.latch_elapsed(self.clock.now_micros()) {
            core::hint::spin_loop();
        }
    }
}

impl<E: TransferEngine, C: MicrosClock, const BITS: usize> Drop for BufferScheduler<E, C, BITS> {
    fn drop(&mut self) {
        if self.engine.completion().is_busy() {
            self.engine.abort();
            self.engine.completion().cancel();
        }
    }
}

impl<E: TransferEngine, C: MicrosClock, const BITS: usize> core::fmt::Debug
    for BufferScheduler<E, C, BITS>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferScheduler")
            .field("buffers", &self.buffers.len())
            .field("bits", &BITS)
            .field("latch_micros", &self.latch_micros)
            .field("timeout_micros", &self.timeout_micros)
            .field("initialized", &self.initialized)
            .field("staged", &self.staged)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
