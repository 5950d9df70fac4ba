//! Eight strands driven as one unit.
//!
//! [`Strands`] is the front end for 8-bit pixels: user code writes pixels,
//! sets a global brightness and calls [`show`](Strands::show). Brightness is
//! applied while encoding, so stored pixels always read back exactly as
//! written.
//!
//! # Example
//! ```rust,ignore
//! use parallel_strands::{compute_bit_count, StrandConfig, Strands, WaveformBuffer};
//! use parallel_strands::color::ColorOrder;
//! use parallel_strands::strand::DirectLanes;
//!
//! const LEN: usize = 60;
//! const BITS: usize = compute_bit_count(LEN, 3);
//!
//! static mut BUFFERS: [WaveformBuffer<BITS>; 2] = [WaveformBuffer::new(), WaveformBuffer::new()];
//!
//! let config = StrandConfig::new(LEN, 300).with_order(ColorOrder::GRB);
//! let buffers = unsafe { &mut *core::ptr::addr_of_mut!(BUFFERS) };
//! let mut strands: Strands<_, _, LEN, 3, BITS> = Strands::new(&config, engine, clock, buffers)?;
//! strands.begin(&mut DirectLanes)?;
//! strands.set_packed(0, 0x00FF_0000);
//! strands.show()?;
//! ```

use smart_leds::{SmartLedsWrite, RGB8};

use crate::clock::MicrosClock;
use crate::color::Rgbw;
use crate::config::StrandConfig;
use crate::encoder::{Brightness, FrameEncoder};
use crate::engine::TransferEngine;
use crate::error::{InitError, ShowError};
use crate::layout::{Canvas, Layout};
use crate::scheduler::{BufferScheduler, Phase, StageOutcome};
use crate::store::PixelStore;
use crate::strand::{PinMap, StrandSet};
use crate::waveform::WaveformBuffer;
use crate::{compute_bit_count, STRAND_COUNT};

/// Check that `config` fits storage of `LEN` pixels with `CH` channels and
/// buffers of `BITS` slots.
pub(crate) fn check_dimensions<const LEN: usize, const CH: usize, const BITS: usize>(
    config: &StrandConfig,
) -> Result<(), InitError> {
    if config.strand_len != LEN {
        return Err(InitError::LengthMismatch {
            expected: LEN,
            actual: config.strand_len,
        });
    }
    if config.order.channels() != CH {
        return Err(InitError::ColorOrderMismatch {
            channels: config.order.channels(),
        });
    }
    if BITS != compute_bit_count(LEN, CH) {
        return Err(InitError::BufferMismatch {
            expected: compute_bit_count(LEN, CH),
            actual: BITS,
        });
    }
    Ok(())
}

/// Build the scheduler `config` asks for.
pub(crate) fn build_scheduler<E: TransferEngine, C: MicrosClock, const BITS: usize>(
    config: &StrandConfig,
    engine: E,
    clock: C,
    buffers: &'static mut [WaveformBuffer<BITS>],
) -> Result<BufferScheduler<E, C, BITS>, InitError> {
    let scheduler = BufferScheduler::new(engine, clock, buffers, config.latch_micros)?;
    Ok(match config.transfer_timeout_micros {
        Some(limit) => scheduler.with_timeout(limit),
        None => scheduler,
    })
}

/// Resolve the configured pins, refusing a group where nothing can be
/// driven.
pub(crate) fn resolve_strands<M: PinMap + ?Sized>(
    pins: &[Option<u8>; STRAND_COUNT],
    map: &mut M,
) -> Result<StrandSet, InitError> {
    let strands = StrandSet::resolve(pins, map);
    if !strands.any_enabled() {
        #[cfg(feature = "defmt")]
        defmt::warn!("none of the configured pins can be driven");
        return Err(InitError::NoValidChannels);
    }
    #[cfg(feature = "defmt")]
    defmt::debug!("strand outputs {=u8:#b}", strands.output_mask());
    Ok(strands)
}

/// Eight strands of `LEN` 8-bit pixels with `CH` channels each.
///
/// # Type Parameters
/// - `E`: transfer engine feeding the output peripheral
/// - `C`: microsecond time source
/// - `LEN`: pixels per strand
/// - `CH`: channels per pixel (3 or 4)
/// - `BITS`: bit slots per waveform buffer, see [`compute_bit_count`]
pub struct Strands<
    E: TransferEngine,
    C: MicrosClock,
    const LEN: usize,
    const CH: usize,
    const BITS: usize,
> {
    store: PixelStore<u8, LEN, CH>,
    encoder: FrameEncoder,
    brightness: Brightness,
    pins: [Option<u8>; STRAND_COUNT],
    layout: Option<Layout>,
    scheduler: BufferScheduler<E, C, BITS>,
}

impl<E: TransferEngine, C: MicrosClock, const LEN: usize, const CH: usize, const BITS: usize>
    Strands<E, C, LEN, CH, BITS>
{
    /// Set up a strand group; nothing is sent until [`begin`](Self::begin).
    ///
    /// Pass one buffer for single buffering or two to encode the next frame
    /// while the previous one is being sent.
    ///
    /// # Errors
    /// [`InitError::LengthMismatch`], [`InitError::ColorOrderMismatch`] or
    /// [`InitError::BufferMismatch`] if `config` does not fit the type
    /// parameters; [`InitError::MissingBuffer`] if `buffers` is empty.
    pub fn new(
        config: &StrandConfig,
        engine: E,
        clock: C,
        buffers: &'static mut [WaveformBuffer<BITS>],
    ) -> Result<Self, InitError> {
        check_dimensions::<LEN, CH, BITS>(config)?;
        Ok(Self {
            store: PixelStore::new(config.order),
            encoder: FrameEncoder::new(StrandSet::silent()),
            brightness: Brightness::from_level(config.brightness),
            pins: config.pins,
            layout: config.layout,
            scheduler: build_scheduler(config, engine, clock, buffers)?,
        })
    }

    /// Resolve pins through `pins` and start the transfer engine.
    ///
    /// Strands whose pin cannot be driven stay dark.
    ///
    /// # Errors
    /// [`InitError::NoValidChannels`] if no strand can be driven;
    /// [`InitError::Engine`] if the engine fails to start.
    pub fn begin<M: PinMap + ?Sized>(&mut self, pins: &mut M) -> Result<(), InitError> {
        let strands = resolve_strands(&self.pins, pins)?;
        self.encoder = FrameEncoder::new(strands);
        self.scheduler.begin(strands.output_mask())
    }

    /// Total number of pixels across all strands.
    #[must_use]
    pub const fn num_pixels(&self) -> usize {
        self.store.len()
    }

    /// Set pixel `n`.
    #[inline]
    pub fn set_pixel(&mut self, n: usize, color: impl Into<Rgbw<u8>>) {
        self.store.set_pixel(n, color);
    }

    /// Set pixel `n` from red, green and blue.
    pub fn set_rgb(&mut self, n: usize, r: u8, g: u8, b: u8) {
        self.store.set_rgb(n, r, g, b);
    }

    /// Set pixel `n` from red, green, blue and white.
    pub fn set_rgbw(&mut self, n: usize, r: u8, g: u8, b: u8, w: u8) {
        self.store.set_rgbw(n, r, g, b, w);
    }

    /// Set pixel `n` from `0xWWRRGGBB`.
    pub fn set_packed(&mut self, n: usize, packed: u32) {
        self.store.set_packed(n, packed);
    }

    /// Pixel `n` as last written, unaffected by brightness.
    #[must_use]
    pub fn pixel(&self, n: usize) -> Rgbw<u8> {
        self.store.pixel(n)
    }

    /// Pixel `n` as `0xWWRRGGBB`.
    #[must_use]
    pub fn packed(&self, n: usize) -> u32 {
        self.store.packed(n)
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: impl Into<Rgbw<u8>>) {
        self.store.fill(color);
    }

    /// Turn every pixel off.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// The pixel store.
    #[must_use]
    pub const fn pixels(&self) -> &PixelStore<u8, LEN, CH> {
        &self.store
    }

    /// The pixel store, mutably.
    pub fn pixels_mut(&mut self) -> &mut PixelStore<u8, LEN, CH> {
        &mut self.store
    }

    /// Draw on the strands through the configured layout, or as one row per
    /// strand without one.
    ///
    /// # Errors
    /// [`InitError::LengthMismatch`] if the layout does not cover the strand.
    pub fn canvas(&mut self) -> Result<Canvas<'_, u8, LEN, CH>, InitError> {
        let layout = self
            .layout
            .unwrap_or(Layout::new(u16::try_from(LEN).unwrap_or(u16::MAX), 1, false));
        Canvas::new(&mut self.store, layout)
    }

    /// Scale output by `level` (0-255) from the next encode on.
    ///
    /// Stored pixels are not touched.
    pub fn set_brightness(&mut self, level: u8) {
        self.brightness = Brightness::from_level(level);
    }

    /// Level last passed to [`set_brightness`](Self::set_brightness).
    #[must_use]
    pub const fn brightness(&self) -> u8 {
        self.brightness.level()
    }

    /// Encode the current pixels into a waveform buffer now.
    ///
    /// # Errors
    /// See [`BufferScheduler::stage_with`].
    pub fn stage(&mut self) -> Result<StageOutcome, ShowError> {
        let Self {
            store,
            encoder,
            brightness,
            scheduler,
            ..
        } = self;
        scheduler.stage_with(|buffer| encoder.encode(store, &*brightness, buffer))
    }

    /// Send the current pixels, staging them first if needed.
    ///
    /// # Errors
    /// See [`BufferScheduler::show_with`].
    pub fn show(&mut self) -> Result<(), ShowError> {
        let Self {
            store,
            encoder,
            brightness,
            scheduler,
            ..
        } = self;
        scheduler.show_with(|buffer| encoder.encode(store, &*brightness, buffer))
    }

    /// Whether [`stage`](Self::stage) would run without waiting.
    #[must_use]
    pub fn can_stage(&self) -> bool {
        self.scheduler.can_stage()
    }

    /// Whether [`show`](Self::show) would start sending without waiting.
    #[must_use]
    pub fn can_show(&self) -> bool {
        self.scheduler.can_show()
    }

    /// Current phase of the frame cycle.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    /// Let a polled engine notice completion.
    pub fn poll(&mut self) {
        self.scheduler.poll();
    }

    /// The strands resolved by [`begin`](Self::begin).
    #[must_use]
    pub const fn strands(&self) -> &StrandSet {
        self.encoder.strands()
    }

    /// The buffer scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &BufferScheduler<E, C, BITS> {
        &self.scheduler
    }
}

impl<E: TransferEngine, C: MicrosClock, const LEN: usize, const CH: usize, const BITS: usize>
    SmartLedsWrite for Strands<E, C, LEN, CH, BITS>
{
    type Error = ShowError;
    type Color = RGB8;

    /// Fill pixels from the start of strand 0 onwards and show them.
    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for (n, color) in iterator.into_iter().take(self.store.len()).enumerate() {
            let color: RGB8 = color.into();
            self.store.set_pixel(n, color);
        }
        self.show()
    }
}

impl<E: TransferEngine, C: MicrosClock, const LEN: usize, const CH: usize, const BITS: usize>
    core::fmt::Debug for Strands<E, C, LEN, CH, BITS>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Strands")
            .field("strands", self.encoder.strands())
            .field("brightness", &self.brightness)
            .field("layout", &self.layout)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
