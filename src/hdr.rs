//! 16-bit pipeline with gamma correction and temporal dithering.
//!
//! The work is split between two execution contexts:
//!
//! - the application writes 16-bit pixels into its own [`HdrStrands`] draft
//!   and publishes them with [`HdrStrands::show`];
//! - a [`Refresher`], ideally on its own core or a high-priority task, calls
//!   [`Refresher::refresh`] as often as it can. Every refresh picks up newly
//!   published pixels, maps them through the [`GammaTable`], applies the
//!   next [`DitherSequencer`] offset and sends the result.
//!
//! The two sides only meet in a [`SharedFrame`], which holds the published
//! pixels, a "new pixels" flag and a pending brightness change behind a
//! critical-section mutex. Everything else belongs to one side.
//!
//! Because a refresh sends a frame even when nothing changed, the dither
//! offset keeps rotating and the LEDs average out to the full 16-bit value.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::HistoryBuffer;

use crate::clock::{elapsed_micros, MicrosClock};
use crate::color::{ColorOrder, Rgbw};
use crate::config::StrandConfig;
use crate::dither::DitherSequencer;
use crate::encoder::{FrameEncoder, GammaDither};
use crate::engine::TransferEngine;
use crate::error::{InitError, ShowError};
use crate::gamma::GammaTable;
use crate::layout::{Canvas, Layout};
use crate::scheduler::{BufferScheduler, Phase, StageOutcome};
use crate::store::PixelStore;
use crate::strand::{PinMap, StrandSet};
use crate::strands::{build_scheduler, check_dimensions, resolve_strands};
use crate::waveform::WaveformBuffer;
use crate::STRAND_COUNT;

/// How a newly published frame replaces the one on display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Blend {
    /// Switch to the new frame at once.
    #[default]
    Off,
    /// Show the midpoint of old and new for one refresh, then the new frame.
    Midpoint,
}

/// A brightness change waiting for the refresh side.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BrightnessRequest {
    /// Peak duty cycle per logical channel (R, G, B, W)
    pub peaks: [u16; 4],
    /// New gamma exponent, or `None` to keep the current one
    pub gamma: Option<f32>,
}

/// What a refresh did with the published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameUpdate {
    /// Nothing new was published.
    Unchanged,
    /// The new frame replaced the displayed one.
    Cut,
    /// The displayed frame moved half-way to the new one.
    Blended,
    /// A blend finished: the displayed frame caught up with the new one.
    Settled,
}

struct Published<const LEN: usize, const CH: usize> {
    pixels: PixelStore<u16, LEN, CH>,
    fresh: bool,
    brightness: Option<BrightnessRequest>,
    peaks: [u16; 4],
}

/// State shared between the application and the refresh context.
///
/// Meant to live in a `static`:
///
/// ```rust
/// use parallel_strands::color::ColorOrder;
/// use parallel_strands::hdr::SharedFrame;
///
/// static FRAME: SharedFrame<30, 3> = SharedFrame::new(ColorOrder::GRB);
/// assert!(!FRAME.is_pending());
/// ```
pub struct SharedFrame<const LEN: usize, const CH: usize> {
    inner: Mutex<RefCell<Published<LEN, CH>>>,
}

impl<const LEN: usize, const CH: usize> SharedFrame<LEN, CH> {
    /// An all-black frame laid out for `order`.
    #[must_use]
    pub const fn new(order: ColorOrder) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Published {
                pixels: PixelStore::new(order),
                fresh: false,
                brightness: None,
                peaks: [u16::MAX; 4],
            })),
        }
    }

    /// Channel order of the published pixels.
    #[must_use]
    pub fn order(&self) -> ColorOrder {
        critical_section::with(|cs| self.inner.borrow_ref(cs).pixels.order())
    }

    /// Replace the published pixels with `pixels` and flag them as new.
    pub fn publish(&self, pixels: &PixelStore<u16, LEN, CH>) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.pixels.copy_from(pixels);
            inner.fresh = true;
        });
    }

    /// Whether published pixels have not been picked up yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).fresh)
    }

    /// Queue a brightness change, replacing any change still queued.
    pub fn request_brightness(&self, request: BrightnessRequest) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.peaks = request.peaks;
            inner.brightness = Some(request);
        });
    }

    /// Peaks last requested, or the refresh side's starting peaks if none
    /// were.
    #[must_use]
    pub fn brightness_peaks(&self) -> [u16; 4] {
        critical_section::with(|cs| self.inner.borrow_ref(cs).peaks)
    }

    /// Record the peaks the refresh side starts with, unless a request is
    /// already queued.
    fn seed_brightness(&self, peaks: [u16; 4]) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.brightness.is_none() {
                inner.peaks = peaks;
            }
        });
    }

    /// Take the queued brightness change, if any.
    pub fn take_brightness(&self) -> Option<BrightnessRequest> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).brightness.take())
    }

    /// Bring `displayed` up to date with the published pixels.
    ///
    /// New pixels are copied or blended according to `blend`. Without new
    /// pixels, `settle` copies the published frame to finish an earlier
    /// blend.
    pub fn exchange(
        &self,
        displayed: &mut PixelStore<u16, LEN, CH>,
        blend: Blend,
        settle: bool,
    ) -> FrameUpdate {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.fresh {
                inner.fresh = false;
                match blend {
                    Blend::Off => {
                        displayed.copy_from(&inner.pixels);
                        FrameUpdate::Cut
                    }
                    Blend::Midpoint => {
                        displayed.blend_from(&inner.pixels);
                        FrameUpdate::Blended
                    }
                }
            } else if settle {
                displayed.copy_from(&inner.pixels);
                FrameUpdate::Settled
            } else {
                FrameUpdate::Unchanged
            }
        })
    }
}

impl<const LEN: usize, const CH: usize> core::fmt::Debug for SharedFrame<LEN, CH> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedFrame")
            .field("len", &LEN)
            .field("channels", &CH)
            .finish_non_exhaustive()
    }
}

/// Application side of the 16-bit pipeline.
///
/// Pixels are drawn into a private draft; [`show`](Self::show) publishes
/// the draft and returns immediately.
pub struct HdrStrands<'a, const LEN: usize, const CH: usize> {
    draft: PixelStore<u16, LEN, CH>,
    shared: &'a SharedFrame<LEN, CH>,
}

impl<'a, const LEN: usize, const CH: usize> HdrStrands<'a, LEN, CH> {
    /// A writer publishing into `shared`.
    #[must_use]
    pub fn new(shared: &'a SharedFrame<LEN, CH>) -> Self {
        Self {
            draft: PixelStore::new(shared.order()),
            shared,
        }
    }

    /// Total number of pixels across all strands.
    #[must_use]
    pub const fn num_pixels(&self) -> usize {
        self.draft.len()
    }

    /// Set pixel `n`.
    #[inline]
    pub fn set_pixel(&mut self, n: usize, color: impl Into<Rgbw<u16>>) {
        self.draft.set_pixel(n, color);
    }

    /// Set pixel `n` from 16-bit red, green and blue.
    pub fn set_rgb(&mut self, n: usize, r: u16, g: u16, b: u16) {
        self.draft.set_rgb(n, r, g, b);
    }

    /// Set pixel `n` from 16-bit red, green, blue and white.
    pub fn set_rgbw(&mut self, n: usize, r: u16, g: u16, b: u16, w: u16) {
        self.draft.set_rgbw(n, r, g, b, w);
    }

    /// Set pixel `n` from 8-bit `0xWWRRGGBB`, widened to 16 bits.
    pub fn set_packed(&mut self, n: usize, packed: u32) {
        self.draft.set_packed(n, packed);
    }

    /// Pixel `n` of the draft.
    #[must_use]
    pub fn pixel(&self, n: usize) -> Rgbw<u16> {
        self.draft.pixel(n)
    }

    /// Pixel `n` of the draft as 8-bit `0xWWRRGGBB`.
    #[must_use]
    pub fn packed(&self, n: usize) -> u32 {
        self.draft.packed(n)
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: impl Into<Rgbw<u16>>) {
        self.draft.fill(color);
    }

    /// Turn every pixel off.
    pub fn clear(&mut self) {
        self.draft.clear();
    }

    /// The draft pixels.
    #[must_use]
    pub const fn pixels(&self) -> &PixelStore<u16, LEN, CH> {
        &self.draft
    }

    /// The draft pixels, mutably.
    pub fn pixels_mut(&mut self) -> &mut PixelStore<u16, LEN, CH> {
        &mut self.draft
    }

    /// Draw on the draft through `layout`.
    ///
    /// # Errors
    /// [`InitError::LengthMismatch`] if `layout` does not cover the strand.
    pub fn canvas(&mut self, layout: Layout) -> Result<Canvas<'_, u16, LEN, CH>, InitError> {
        Canvas::new(&mut self.draft, layout)
    }

    /// Publish the draft for the next refresh.
    pub fn show(&mut self) {
        self.shared.publish(&self.draft);
    }

    /// Encoding happens on the refresh side; this does nothing.
    #[allow(clippy::unused_self)]
    pub fn stage(&mut self) -> StageOutcome {
        StageOutcome::NotApplicable
    }

    /// Always true: publishing never waits.
    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn can_stage(&self) -> bool {
        true
    }

    /// Whether the last published frame has been picked up.
    #[must_use]
    pub fn can_show(&self) -> bool {
        !self.shared.is_pending()
    }

    /// Same peak for every channel from a 0-255 level; gamma unchanged.
    pub fn set_brightness(&mut self, level: u8) {
        self.set_brightness_peaks([u16::from(level) * 257; 4], None);
    }

    /// Same 16-bit peak for every channel with a new gamma exponent.
    pub fn set_brightness_gamma(&mut self, peak: u16, gamma: f32) {
        self.set_brightness_peaks([peak; 4], Some(gamma));
    }

    /// Separate 16-bit peaks for red, green and blue; white follows red.
    pub fn set_brightness_rgb(&mut self, r: u16, g: u16, b: u16, gamma: Option<f32>) {
        self.set_brightness_peaks([r, g, b, r], gamma);
    }

    /// Separate 16-bit peaks for R, G, B and W.
    ///
    /// The refresh side rebuilds its gamma table before its next encode.
    pub fn set_brightness_peaks(&mut self, peaks: [u16; 4], gamma: Option<f32>) {
        self.shared.request_brightness(BrightnessRequest { peaks, gamma });
    }

    /// Peaks last requested, or the configured brightness before any
    /// request.
    #[must_use]
    pub fn brightness_peaks(&self) -> [u16; 4] {
        self.shared.brightness_peaks()
    }

    /// Red peak from [`brightness_peaks`](Self::brightness_peaks) as 0-255.
    #[must_use]
    pub fn brightness(&self) -> u8 {
        (self.brightness_peaks()[0] >> 8) as u8
    }
}

impl<const LEN: usize, const CH: usize> core::fmt::Debug for HdrStrands<'_, LEN, CH> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HdrStrands")
            .field("draft", &self.draft)
            .field("peaks", &self.brightness_peaks())
            .finish_non_exhaustive()
    }
}

/// Number of intervals averaged by [`FrameRate`].
pub const FRAME_RATE_WINDOW: usize = 16;

/// Rolling refresh rate estimate.
#[derive(Debug, Clone)]
pub struct FrameRate {
    intervals: HistoryBuffer<u32, FRAME_RATE_WINDOW>,
    last: Option<u32>,
}

impl FrameRate {
    /// No refreshes seen yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            intervals: HistoryBuffer::new(),
            last: None,
        }
    }

    /// Note a refresh at `now`.
    pub fn record(&mut self, now: u32) {
        if let Some(last) = self.last {
            self.intervals.write(elapsed_micros(last, now));
        }
        self.last = Some(now);
    }

    /// Refreshes per second over the last [`FRAME_RATE_WINDOW`] intervals,
    /// or 0 before two refreshes were seen.
    #[must_use]
    pub fn fps(&self) -> f32 {
        let intervals = self.intervals.as_slice();
        if intervals.is_empty() {
            return 0.0;
        }
        let total: u64 = intervals.iter().map(|&micros| u64::from(micros)).sum();
        if total == 0 {
            return 0.0;
        }
        (intervals.len() as f32 * 1_000_000.0) / total as f32
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new()
    }
}

/// Refresh side of the 16-bit pipeline.
///
/// Owns the displayed pixels, the gamma table, the dither sequencer and the
/// waveform buffers. None of these are touched by the application side.
pub struct Refresher<
    'a,
    E: TransferEngine,
    C: MicrosClock,
    const LEN: usize,
    const CH: usize,
    const BITS: usize,
> {
    shared: &'a SharedFrame<LEN, CH>,
    displayed: PixelStore<u16, LEN, CH>,
    table: GammaTable,
    dither: DitherSequencer,
    blend: Blend,
    settling: bool,
    rate: FrameRate,
    pins: [Option<u8>; STRAND_COUNT],
    encoder: FrameEncoder,
    scheduler: BufferScheduler<E, C, BITS>,
}

impl<
        'a,
        E: TransferEngine,
        C: MicrosClock,
        const LEN: usize,
        const CH: usize,
        const BITS: usize,
    > Refresher<'a, E, C, LEN, CH, BITS>
{
    /// Set up the refresh side; nothing is sent until
    /// [`begin`](Self::begin).
    ///
    /// The gamma table starts at `config.brightness` on every channel with
    /// `config.pipeline.gamma`.
    ///
    /// # Errors
    /// As [`Strands::new`](crate::strands::Strands::new); additionally
    /// [`InitError::ColorOrderMismatch`] if `shared` was built for a
    /// different channel count than `config.order`.
    pub fn new(
        config: &StrandConfig,
        shared: &'a SharedFrame<LEN, CH>,
        engine: E,
        clock: C,
        buffers: &'static mut [WaveformBuffer<BITS>],
    ) -> Result<Self, InitError> {
        check_dimensions::<LEN, CH, BITS>(config)?;
        let order = shared.order();
        if order != config.order {
            return Err(InitError::ColorOrderMismatch {
                channels: order.channels(),
            });
        }
        let peak = u16::from(config.brightness) * 257;
        shared.seed_brightness([peak; 4]);
        Ok(Self {
            shared,
            displayed: PixelStore::new(order),
            table: GammaTable::uniform(peak, config.pipeline.gamma),
            dither: DitherSequencer::new(config.pipeline.dither_bits),
            blend: config.pipeline.blend,
            settling: false,
            rate: FrameRate::new(),
            pins: config.pins,
            encoder: FrameEncoder::new(StrandSet::silent()),
            scheduler: build_scheduler(config, engine, clock, buffers)?,
        })
    }

    /// Resolve pins through `pins` and start the transfer engine.
    ///
    /// # Errors
    /// [`InitError::NoValidChannels`] if no strand can be driven;
    /// [`InitError::Engine`] if the engine fails to start.
    pub fn begin<M: PinMap + ?Sized>(&mut self, pins: &mut M) -> Result<(), InitError> {
        let strands = resolve_strands(&self.pins, pins)?;
        self.encoder = FrameEncoder::new(strands);
        self.scheduler.begin(strands.output_mask())
    }

    /// Send one dithered frame.
    ///
    /// Applies a queued brightness change, picks up newly published pixels,
    /// encodes with the current dither offset and hands the frame to the
    /// scheduler, waiting for the previous frame and the latch interval.
    /// The dither offset advances even when sending fails.
    ///
    /// # Errors
    /// See [`BufferScheduler::show_with`].
    pub fn refresh(&mut self) -> Result<FrameUpdate, ShowError> {
        self.rate.record(self.scheduler.clock().now_micros());

        if let Some(request) = self.shared.take_brightness() {
            let gamma = request.gamma.unwrap_or(self.table.gamma());
            self.table.rebuild(request.peaks, gamma);
            #[cfg(feature = "defmt")]
            defmt::debug!("gamma table rebuilt: peaks {}, gamma {}", request.peaks, gamma);
        }

        let update = self
            .shared
            .exchange(&mut self.displayed, self.blend, self.settling);
        self.settling = update == FrameUpdate::Blended;

        let Self {
            displayed,
            table,
            dither,
            encoder,
            scheduler,
            ..
        } = self;
        let map = GammaDither::new(table, dither);
        let result = scheduler.show_with(|buffer| encoder.encode(displayed, &map, buffer));
        self.dither.advance();
        result.map(|()| update)
    }

    /// Estimated refreshes per second.
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.rate.fps()
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

    /// Pixels currently on display.
    #[must_use]
    pub const fn displayed(&self) -> &PixelStore<u16, LEN, CH> {
        &self.displayed
    }

    /// The gamma table in use.
    #[must_use]
    pub const fn gamma_table(&self) -> &GammaTable {
        &self.table
    }

    /// The dither sequencer.
    #[must_use]
    pub const fn dither(&self) -> &DitherSequencer {
        &self.dither
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
    core::fmt::Debug for Refresher<'_, E, C, LEN, CH, BITS>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Refresher")
            .field("table", &self.table)
            .field("dither", &self.dither)
            .field("blend", &self.blend)
            .field("strands", self.encoder.strands())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::boxed::Box;

    use super::*;
    use crate::color::Channel;
    use crate::compute_bit_count;
    use crate::config::PipelineConfig;
    use crate::strand::DirectLanes;
    use crate::testing::{leak_buffers, wire_byte, SimClock, SimEngine};

    const LEN: usize = 4;
    const BITS: usize = compute_bit_count(LEN, 3);

    type TestRefresher = Refresher<'static, SimEngine, SimClock, LEN, 3, BITS>;

    fn shared() -> &'static SharedFrame<LEN, 3> {
        Box::leak(Box::new(SharedFrame::new(ColorOrder::RGB)))
    }

    fn config(blend: Blend) -> StrandConfig {
        StrandConfig::new(LEN, 100)
            .with_order(ColorOrder::RGB)
            .with_pipeline(PipelineConfig {
                gamma: 2.6,
                dither_bits: 4,
                blend,
            })
    }

    fn refresher(shared: &'static SharedFrame<LEN, 3>, blend: Blend) -> TestRefresher {
        let clock = SimClock::starting_at(0);
        let engine = SimEngine::new(clock.clone(), 30);
        let mut refresher =
            Refresher::new(&config(blend), shared, engine, clock, leak_buffers(2)).unwrap();
        refresher.begin(&mut DirectLanes).unwrap();
        refresher
    }

    /// First wire byte of strand 0 in every frame sent so far.
    fn first_bytes(refresher: &TestRefresher) -> std::vec::Vec<u8> {
        refresher
            .scheduler()
            .engine()
            .transmissions
            .iter()
            .map(|t| wire_byte(&t.bytes, 0x01, 0))
            .collect()
    }

    #[test]
    fn test_publish_and_cut() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        let mut refresher = refresher(shared, Blend::Off);

        app.set_rgb(1, 1000, 2000, 3000);
        assert!(app.can_show());
        app.show();
        assert!(shared.is_pending());
        assert!(!app.can_show());

        assert_eq!(refresher.refresh(), Ok(FrameUpdate::Cut));
        assert!(!shared.is_pending());
        assert_eq!(refresher.displayed().pixel(1), Rgbw::rgb(1000, 2000, 3000));
        assert_eq!(refresher.refresh(), Ok(FrameUpdate::Unchanged));
    }

    #[test]
    fn test_blend_then_settle() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        let mut refresher = refresher(shared, Blend::Midpoint);

        app.set_rgb(0, 40_000, 0, 2);
        app.show();
        assert_eq!(refresher.refresh(), Ok(FrameUpdate::Blended));
        assert_eq!(refresher.displayed().pixel(0), Rgbw::rgb(20_000, 0, 1));
        assert_eq!(refresher.refresh(), Ok(FrameUpdate::Settled));
        assert_eq!(refresher.displayed().pixel(0), Rgbw::rgb(40_000, 0, 2));
        assert_eq!(refresher.refresh(), Ok(FrameUpdate::Unchanged));
    }

    #[test]
    fn test_stage_not_applicable() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        assert_eq!(app.stage(), StageOutcome::NotApplicable);
        assert!(app.can_stage());
        assert!(!shared.is_pending());
    }

    #[test]
    fn test_brightness_queued_until_refresh() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        let mut refresher = refresher(shared, Blend::Off);

        app.set_brightness(128);
        assert_eq!(app.brightness(), 128);
        assert_eq!(refresher.gamma_table().peaks(), [u16::MAX; 4]);
        refresher.refresh().unwrap();
        assert_eq!(refresher.gamma_table().peaks(), [128 * 257; 4]);
        assert!((refresher.gamma_table().gamma() - 2.6).abs() < 1e-6);

        app.set_brightness_rgb(1000, 2000, 3000, Some(2.2));
        refresher.refresh().unwrap();
        assert_eq!(refresher.gamma_table().peaks(), [1000, 2000, 3000, 1000]);
        assert!((refresher.gamma_table().gamma() - 2.2).abs() < 1e-6);
        assert_eq!(shared.take_brightness(), None);
    }

    #[test]
    fn test_brightness_reported_from_config() {
        let shared = shared();
        let app = HdrStrands::new(shared);
        assert_eq!(app.brightness(), 255);

        let clock = SimClock::starting_at(0);
        let engine = SimEngine::new(clock.clone(), 30);
        let config = config(Blend::Off).with_brightness(100);
        let refresher =
            Refresher::new(&config, shared, engine, clock, leak_buffers::<BITS>(1)).unwrap();
        assert_eq!(refresher.gamma_table().peaks(), [100 * 257; 4]);
        assert_eq!(app.brightness(), 100);
        assert_eq!(app.brightness_peaks(), [100 * 257; 4]);
    }

    #[test]
    fn test_queued_brightness_survives_refresher_setup() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        app.set_brightness(20);

        let clock = SimClock::starting_at(0);
        let engine = SimEngine::new(clock.clone(), 30);
        let config = config(Blend::Off).with_brightness(100);
        let mut refresher =
            Refresher::new(&config, shared, engine, clock, leak_buffers::<BITS>(1)).unwrap();
        refresher.begin(&mut DirectLanes).unwrap();
        assert_eq!(app.brightness(), 20);
        refresher.refresh().unwrap();
        assert_eq!(refresher.gamma_table().peaks(), [20 * 257; 4]);
    }

    #[test]
    fn test_extremes_have_no_dither_variance() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        let mut refresher = refresher(shared, Blend::Off);

        app.set_rgb(0, u16::MAX, 0, 0);
        app.show();
        for _ in 0..16 {
            refresher.refresh().unwrap();
        }
        let frames = &refresher.scheduler().engine().transmissions;
        assert_eq!(frames.len(), 16);
        for frame in frames {
            assert_eq!(wire_byte(&frame.bytes, 0x01, 0), 0xFF);
            assert_eq!(wire_byte(&frame.bytes, 0x01, 1), 0);
        }
    }

    #[test]
    fn test_dither_average_matches_gamma_output() {
        let shared = shared();
        let mut app = HdrStrands::new(shared);
        let mut refresher = refresher(shared, Blend::Off);

        let logical = 0x9000;
        app.set_rgb(0, logical, 0, 0);
        app.show();
        for _ in 0..16 {
            refresher.refresh().unwrap();
        }
        let linear = GammaTable::uniform(u16::MAX, 2.6).lookup(Channel::Red, logical);
        let sum: u32 = first_bytes(&refresher).iter().map(|&b| u32::from(b)).sum();
        // 16 frames at 4 dither bits recover linear >> 4 exactly
        assert_eq!(sum, u32::from(linear) >> 4);
        let bytes = first_bytes(&refresher);
        assert!(bytes.iter().max().unwrap() - bytes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_dither_advances_on_every_refresh() {
        let shared = shared();
        let mut refresher = refresher(shared, Blend::Off);
        for expected in 1..=3 {
            refresher.refresh().unwrap();
            assert_eq!(refresher.dither().index(), expected);
        }
    }

    #[test]
    fn test_order_mismatch_with_shared_frame() {
        let shared: &'static SharedFrame<LEN, 3> =
            Box::leak(Box::new(SharedFrame::new(ColorOrder::GRB)));
        let clock = SimClock::starting_at(0);
        let result = Refresher::<_, _, LEN, 3, BITS>::new(
            &config(Blend::Off),
            shared,
            SimEngine::new(clock.clone(), 30),
            clock,
            leak_buffers(1),
        );
        assert_eq!(
            result.err(),
            Some(InitError::ColorOrderMismatch { channels: 3 })
        );
    }

    #[test]
    fn test_frame_rate() {
        let mut rate = FrameRate::new();
        assert!(rate.fps().abs() < f32::EPSILON);
        rate.record(u32::MAX - 4_999);
        assert!(rate.fps().abs() < f32::EPSILON);
        // across the counter wrap
        rate.record(5_000);
        rate.record(15_000);
        assert!((rate.fps() - 100.0).abs() < 0.01);
        for step in 0..40 {
            rate.record(15_000 + (step + 1) * 4_000);
        }
        assert!((rate.fps() - 250.0).abs() < 0.01);
    }

    #[test]
    fn test_refresher_tracks_fps() {
        let shared = shared();
        let mut refresher = refresher(shared, Blend::Off);
        refresher.refresh().unwrap();
        refresher.refresh().unwrap();
        assert!(refresher.fps() > 0.0);
    }
}
