//! Timer pattern-generator output.
//!
//! Timers with a pattern generator (SAMD21/SAMD51 TCC) can override their
//! waveform outputs with the bits of a pattern value register. Writing one
//! waveform byte into that register per timer period drives all eight lanes
//! at once. The DMA channel is triggered by the timer overflow, one beat per
//! period.

use super::{claim, stream_to, DmaChannel, TransferEngine, TransferSignal};
use crate::waveform::WaveformBuffer;
use crate::TRANSFER_RATE_HZ;

/// A timer with a pattern generator.
pub trait PatternGenerator {
    /// Address of the pattern value register.
    fn value_register(&self) -> usize;

    /// Set the timer period so it overflows `hz` times per second.
    fn set_overflow_hz(&mut self, hz: u32);

    /// Write the pattern value directly.
    fn set_value(&mut self, value: u8);

    /// Let the pattern drive the outputs in `mask`.
    fn enable_outputs(&mut self, mask: u8);
}

/// Transfer engine for a timer pattern generator.
#[derive(Debug)]
pub struct PatternGeneratorEngine<D, P> {
    channel: D,
    generator: P,
    signal: &'static TransferSignal,
}

impl<D: DmaChannel, P: PatternGenerator> PatternGeneratorEngine<D, P> {
    /// Build an engine from a DMA channel triggered by the timer overflow.
    pub fn new(channel: D, generator: P, signal: &'static TransferSignal) -> Self {
        Self {
            channel,
            generator,
            signal,
        }
    }

    /// Give the channel and timer back.
    pub fn release(self) -> (D, P) {
        (self.channel, self.generator)
    }
}

impl<D: DmaChannel, P: PatternGenerator> TransferEngine for PatternGeneratorEngine<D, P> {
    type Error = D::Error;

    fn begin(&mut self, output_mask: u8) -> Result<(), Self::Error> {
        claim(&mut self.channel, self.signal)?;
        self.generator.set_overflow_hz(TRANSFER_RATE_HZ);
        // lanes low before the pattern takes over
        self.generator.set_value(0);
        self.generator.enable_outputs(output_mask);
        Ok(())
    }

    fn completion(&self) -> &TransferSignal {
        self.signal
    }

    unsafe fn transmit<const BITS: usize>(
        &mut self,
        buffer: &WaveformBuffer<BITS>,
    ) -> Result<(), Self::Error> {
        let destination = self.generator.value_register();
        stream_to(&mut self.channel, destination, buffer)
    }

    fn poll(&mut self) {
        self.channel.poll();
    }

    fn abort(&mut self) {
        self.channel.abort();
        self.generator.set_value(0);
    }
}
