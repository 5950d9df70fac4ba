//! Strand group configuration.
//!
//! [`StrandConfig`] is a plain struct that can be built in code or read from
//! a small JSON document:
//!
//! ```json
//! {
//!   "pins": [16, 17, 18, 19, 20, 21, 22, -1],
//!   "order": "GRBW",
//!   "cols": 32,
//!   "rowsPerPin": 2,
//!   "layout": 1,
//!   "dither": 4,
//!   "latch": 300
//! }
//! ```
//!
//! Every key is optional; missing keys keep the compiled-in defaults. A pin
//! of `-1` (or any value outside `0..=255`) leaves its strand unused, and
//! only the first eight entries of `pins` are read. An unknown `order` keeps
//! the default order. [`load_config`] never fails: a missing or broken
//! document falls back to the defaults and reports why in a [`ConfigStatus`].
//!
//! Applications can keep their own string settings in the same document and
//! pick them up with [`read_extras`].

use core::fmt::{self, Write};

use heapless::Vec;
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use crate::color::ColorOrder;
use crate::dither::MAX_DITHER_BITS;
use crate::gamma::DEFAULT_GAMMA;
use crate::hdr::Blend;
use crate::layout::Layout;
use crate::STRAND_COUNT;

/// Longest message kept from a parse error.
pub const MESSAGE_CAPACITY: usize = 20;

/// Short human-readable description of a configuration problem.
pub type StatusMessage = heapless::String<MESSAGE_CAPACITY>;

/// Longest value kept for an [`Extra`].
pub const EXTRA_CAPACITY: usize = 32;

/// Value of an application-defined setting.
pub type ExtraValue = heapless::String<EXTRA_CAPACITY>;

/// Settings for the gamma/dither pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipelineConfig {
    /// Gamma exponent
    pub gamma: f32,
    /// Extra bits of precision recovered by temporal dithering
    pub dither_bits: u8,
    /// How a newly published frame replaces the one on display
    pub blend: Blend,
}

impl PipelineConfig {
    /// Gamma 2.6, 4 dither bits, hard cuts.
    pub const DEFAULT: Self = Self {
        gamma: DEFAULT_GAMMA,
        dither_bits: 4,
        blend: Blend::Off,
    };
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Everything needed to bring up a strand group.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StrandConfig {
    /// Pin driving each strand; `None` leaves the strand unused
    pub pins: [Option<u8>; STRAND_COUNT],
    /// Pixels per strand
    pub strand_len: usize,
    /// Channel order on the wire
    pub order: ColorOrder,
    /// Idle time after a frame before the LEDs accept the next one
    pub latch_micros: u32,
    /// Abort a transfer still running after this long
    pub transfer_timeout_micros: Option<u32>,
    /// Initial 0-255 brightness
    pub brightness: u8,
    /// Gamma/dither settings
    pub pipeline: PipelineConfig,
    /// Matrix arrangement of the strands, if any
    pub layout: Option<Layout>,
}

impl StrandConfig {
    /// Eight GRB strands of `strand_len` pixels on pins 0 to 7 at full
    /// brightness.
    ///
    /// There is no default latch time: it depends on the LED vendor and must
    /// be chosen by the caller (WS2812B parts need at least 280 µs, older
    /// WS2812 parts 50 µs).
    #[must_use]
    pub const fn new(strand_len: usize, latch_micros: u32) -> Self {
        Self {
            pins: [
                Some(0),
                Some(1),
                Some(2),
                Some(3),
                Some(4),
                Some(5),
                Some(6),
                Some(7),
            ],
            strand_len,
            order: ColorOrder::GRB,
            latch_micros,
            transfer_timeout_micros: None,
            brightness: u8::MAX,
            pipeline: PipelineConfig::DEFAULT,
            layout: None,
        }
    }

    /// Use `pins` for strands 0 to 7.
    #[must_use]
    pub const fn with_pins(mut self, pins: [Option<u8>; STRAND_COUNT]) -> Self {
        self.pins = pins;
        self
    }

    /// Use `order` on the wire.
    #[must_use]
    pub const fn with_order(mut self, order: ColorOrder) -> Self {
        self.order = order;
        self
    }

    /// Start at `brightness`.
    #[must_use]
    pub const fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    /// Abort transfers running longer than `micros`.
    #[must_use]
    pub const fn with_timeout(mut self, micros: u32) -> Self {
        self.transfer_timeout_micros = Some(micros);
        self
    }

    /// Use `pipeline` for the gamma/dither front end.
    #[must_use]
    pub const fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Arrange the strands as `layout`; the strand length follows from it.
    #[must_use]
    pub const fn with_layout(mut self, layout: Layout) -> Self {
        self.strand_len = layout.strand_len();
        self.layout = Some(layout);
        self
    }

    /// Read a JSON document on top of `defaults`.
    ///
    /// An `order` that is not a permutation of `RGB`/`RGBW` is skipped; the
    /// other keys still apply.
    ///
    /// # Errors
    /// [`ConfigError::Json`] if the document does not parse,
    /// [`ConfigError::InvalidLength`] if `cols` and `rowsPerPin` describe an
    /// empty strand.
    pub fn from_json(document: &[u8], defaults: &Self) -> Result<Self, ConfigError> {
        let (document, _) = serde_json_core::from_slice::<Document<'_>>(document).map_err(
            |error| ConfigError::Json {
                message: short_message(&error),
            },
        )?;

        let mut config = *defaults;
        if let Some(PinList(pins)) = &document.pins {
            for (slot, &pin) in config.pins.iter_mut().zip(pins) {
                *slot = pin;
            }
        }
        if let Some(order) = document.order {
            match order.parse::<ColorOrder>() {
                Ok(order) => config.order = order,
                Err(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("unknown color order {=str}, keeping default", order);
                }
            }
        }
        if let Some(bits) = document.dither {
            config.pipeline.dither_bits = bits.min(MAX_DITHER_BITS);
        }
        if let Some(gamma) = document.gamma {
            config.pipeline.gamma = gamma;
        }
        if let Some(blend) = document.blend {
            config.pipeline.blend = if blend { Blend::Midpoint } else { Blend::Off };
        }
        if let Some(latch) = document.latch {
            config.latch_micros = latch;
        }
        if let Some(timeout) = document.timeout {
            config.transfer_timeout_micros = Some(timeout);
        }
        if let Some(brightness) = document.brightness {
            config.brightness = brightness;
        }

        if document.cols.is_some() || document.rows_per_pin.is_some() || document.layout.is_some()
        {
            let base = defaults.layout.unwrap_or(Layout::new(
                u16::try_from(defaults.strand_len).unwrap_or(u16::MAX),
                1,
                false,
            ));
            let layout = Layout::new(
                document.cols.unwrap_or(base.cols),
                document.rows_per_pin.unwrap_or(base.rows_per_strand),
                document.layout.map_or(base.zigzag, |layout| layout == 1),
            );
            if layout.strand_len() == 0 {
                return Err(ConfigError::InvalidLength);
            }
            config = config.with_layout(layout);
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document<'a> {
    pins: Option<PinList>,
    #[serde(borrow)]
    order: Option<&'a str>,
    dither: Option<u8>,
    cols: Option<u16>,
    #[serde(rename = "rowsPerPin", alias = "rowsPer")]
    rows_per_pin: Option<u16>,
    layout: Option<u8>,
    latch: Option<u32>,
    timeout: Option<u32>,
    gamma: Option<f32>,
    brightness: Option<u8>,
    blend: Option<bool>,
}

/// The first [`STRAND_COUNT`] entries of a `pins` array; the rest are
/// skipped.
#[derive(Debug, Default)]
struct PinList(Vec<Option<u8>, STRAND_COUNT>);

impl<'de> Deserialize<'de> for PinList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(PinListVisitor)
    }
}

struct PinListVisitor;

impl<'de> Visitor<'de> for PinListVisitor {
    type Value = PinList;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of pin numbers")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PinList, A::Error> {
        let mut pins = Vec::new();
        while !pins.is_full() {
            let Some(pin) = seq.next_element::<i64>()? else {
                return Ok(PinList(pins));
            };
            // room was checked above
            let _ = pins.push(u8::try_from(pin).ok());
        }
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(PinList(pins))
    }
}

/// An application-defined string setting read by [`read_extras`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extra<'k> {
    /// Key looked up in the document
    pub key: &'k str,
    /// Value found under `key`, truncated to [`EXTRA_CAPACITY`] bytes;
    /// left as is when the key is absent or not a string
    pub value: ExtraValue,
}

impl<'k> Extra<'k> {
    /// A setting under `key` with an empty value.
    #[must_use]
    pub const fn new(key: &'k str) -> Self {
        Self {
            key,
            value: ExtraValue::new(),
        }
    }

    /// A setting under `key` that keeps `default` unless the document has a
    /// string for it.
    #[must_use]
    pub fn with_default(key: &'k str, default: &str) -> Self {
        Self {
            key,
            value: truncated(&default),
        }
    }
}

/// Fill `extras` from the string values of the same keys in `document`.
///
/// Keys not listed in `extras` are ignored, as are non-string values.
///
/// # Errors
/// [`ConfigError::Json`] if the document does not parse; values read before
/// the error are kept.
pub fn read_extras(document: &[u8], extras: &mut [Extra<'_>]) -> Result<(), ConfigError> {
    let mut deserializer = serde_json_core::de::Deserializer::new(document, None);
    ExtrasSeed(extras)
        .deserialize(&mut deserializer)
        .and_then(|()| deserializer.end().map(|_| ()))
        .map_err(|error| ConfigError::Json {
            message: short_message(&error),
        })
}

struct ExtrasSeed<'x, 'k>(&'x mut [Extra<'k>]);

impl<'de> DeserializeSeed<'de> for ExtrasSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ExtrasSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a configuration object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<&'de str>()? {
            match self.0.iter_mut().find(|extra| extra.key == key) {
                Some(extra) => {
                    if let Some(value) = map.next_value_seed(StringValue)? {
                        extra.value = truncated(&value);
                    }
                }
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

/// A value that is kept only if it is a string.
struct StringValue;

impl<'de> DeserializeSeed<'de> for StringValue {
    type Value = Option<&'de str>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_ignored_any(self)
    }
}

impl<'de> Visitor<'de> for StringValue {
    type Value = Option<&'de str>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any value")
    }

    fn visit_borrowed_str<E>(self, value: &'de str) -> Result<Self::Value, E> {
        Ok(Some(value))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// A configuration document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has a key of the wrong type.
    #[display("{message}")]
    Json {
        /// Parser message, truncated
        message: StatusMessage,
    },
    /// The layout describes strands without pixels.
    #[display("empty strand layout")]
    InvalidLength,
}

/// Outcome of [`load_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStatus {
    /// The document was applied.
    Ok,
    /// No document was supplied; defaults are in use.
    Missing,
    /// The document was rejected; defaults are in use.
    Invalid(ConfigError),
}

impl ConfigStatus {
    /// Numeric status: 0 ok, 1 bad value, 3 no document, 4 bad JSON.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            ConfigStatus::Ok => 0,
            ConfigStatus::Invalid(ConfigError::Json { .. }) => 4,
            ConfigStatus::Invalid(_) => 1,
            ConfigStatus::Missing => 3,
        }
    }

    /// Whether the document was applied.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, ConfigStatus::Ok)
    }

    /// Short description, at most [`MESSAGE_CAPACITY`] bytes.
    #[must_use]
    pub fn message(&self) -> StatusMessage {
        match self {
            ConfigStatus::Ok => short_message(&"OK"),
            ConfigStatus::Missing => short_message(&"no config document"),
            ConfigStatus::Invalid(error) => short_message(error),
        }
    }
}

/// Apply `document` on top of `defaults`, falling back to `defaults` on any
/// problem.
pub fn load_config(
    document: Option<&[u8]>,
    defaults: &StrandConfig,
) -> (StrandConfig, ConfigStatus) {
    let Some(document) = document else {
        #[cfg(feature = "defmt")]
        defmt::debug!("no config document, using defaults");
        return (*defaults, ConfigStatus::Missing);
    };
    match StrandConfig::from_json(document, defaults) {
        Ok(config) => (config, ConfigStatus::Ok),
        Err(error) => {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "config rejected, using defaults: {}",
                defmt::Debug2Format(&error)
            );
            (*defaults, ConfigStatus::Invalid(error))
        }
    }
}

struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn truncated<const N: usize>(text: &dyn fmt::Display) -> heapless::String<N> {
    let mut out = heapless::String::new();
    // the writer never fails, it stops at capacity
    let _ = write!(Truncating(&mut out), "{text}");
    out
}

fn short_message(text: &dyn fmt::Display) -> StatusMessage {
    truncated(text)
}
