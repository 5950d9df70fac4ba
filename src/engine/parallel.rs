//! Parallel-output peripheral driven by a general-purpose DMA controller.
//!
//! Chips without a pattern generator or PIO usually have an 8-bit parallel
//! bus (LCD/camera controller, I2S in LCD mode) whose FIFO a GDMA channel can
//! feed. The bus clock replaces the timer: one waveform byte is latched onto
//! the data lanes per bus clock.

use super::{claim, stream_to, DmaChannel, TransferEngine, TransferSignal};
use crate::waveform::WaveformBuffer;
use crate::TRANSFER_RATE_HZ;

/// An 8-bit parallel output bus.
pub trait ParallelOutput {
    /// Address the DMA channel writes into.
    fn fifo_address(&self) -> usize;

    /// Set the bus clock.
    fn set_bus_hz(&mut self, hz: u32);

    /// Route the data lanes in `mask` to their pins.
    fn enable_lanes(&mut self, mask: u8);

    /// Start clocking out whatever the DMA channel delivers.
    fn start(&mut self);

    /// Stop the bus clock.
    fn stop(&mut self);
}

/// Transfer engine for a GDMA-fed parallel bus.
#[derive(Debug)]
pub struct ParallelEngine<D, P> {
    channel: D,
    bus: P,
    signal: &'static TransferSignal,
}

impl<D: DmaChannel, P: ParallelOutput> ParallelEngine<D, P> {
    /// Build an engine from a GDMA channel connected to the bus.
    pub fn new(channel: D, bus: P, signal: &'static TransferSignal) -> Self {
        Self {
            channel,
            bus,
            signal,
        }
    }

    /// Give the channel and bus back.
    pub fn release(self) -> (D, P) {
        (self.channel, self.bus)
    }
}

impl<D: DmaChannel, P: ParallelOutput> TransferEngine for ParallelEngine<D, P> {
    type Error = D::Error;

    fn begin(&mut self, output_mask: u8) -> Result<(), Self::Error> {
        claim(&mut self.channel, self.signal)?;
        self.bus.set_bus_hz(TRANSFER_RATE_HZ);
        self.bus.enable_lanes(output_mask);
        Ok(())
    }

    fn completion(&self) -> &TransferSignal {
        self.signal
    }

    unsafe fn transmit<const BITS: usize>(
        &mut self,
        buffer: &WaveformBuffer<BITS>,
    ) -> Result<(), Self::Error> {
        let fifo = self.bus.fifo_address();
        stream_to(&mut self.channel, fifo, buffer)?;
        // the bus only pulls once the descriptor chain is live
        self.bus.start();
        Ok(())
    }

    fn poll(&mut self) {
        self.channel.poll();
    }

    fn abort(&mut self) {
        self.bus.stop();
        self.channel.abort();
    }
}
