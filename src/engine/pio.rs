//! Programmable I/O output.
//!
//! A PIO state machine running an `out pins, 8` loop shifts one waveform
//! byte onto eight consecutive pins per cycle. The DMA channel is paced by
//! the state machine's TX FIFO data request.

use super::{claim, stream_to, DmaChannel, TransferEngine, TransferSignal};
use crate::waveform::WaveformBuffer;
use crate::TRANSFER_RATE_HZ;

/// A PIO state machine loaded with an eight-pin output program.
pub trait PioStateMachine {
    /// Address of the state machine's TX FIFO.
    fn tx_fifo(&self) -> usize;

    /// Set the clock divider so the program outputs `hz` bytes per second.
    fn set_output_hz(&mut self, hz: u32);

    /// Hand the pins in `mask` to the state machine as outputs, driven low.
    fn claim_pins(&mut self, mask: u8);

    /// Start or stop the state machine.
    fn set_enabled(&mut self, enabled: bool);
}

/// Transfer engine for a PIO state machine.
#[derive(Debug)]
pub struct PioEngine<D, S> {
    channel: D,
    machine: S,
    signal: &'static TransferSignal,
}

impl<D: DmaChannel, S: PioStateMachine> PioEngine<D, S> {
    /// Build an engine from a DMA channel paced by the state machine's TX
    /// FIFO.
    pub fn new(channel: D, machine: S, signal: &'static TransferSignal) -> Self {
        Self {
            channel,
            machine,
            signal,
        }
    }

    /// Give the channel and state machine back.
    pub fn release(mut self) -> (D, S) {
        self.machine.set_enabled(false);
        (self.channel, self.machine)
    }
}

impl<D: DmaChannel, S: PioStateMachine> TransferEngine for PioEngine<D, S> {
    type Error = D::Error;

    fn begin(&mut self, output_mask: u8) -> Result<(), Self::Error> {
        claim(&mut self.channel, self.signal)?;
        self.machine.set_output_hz(TRANSFER_RATE_HZ);
        self.machine.claim_pins(output_mask);
        self.machine.set_enabled(true);
        Ok(())
    }

    fn completion(&self) -> &TransferSignal {
        self.signal
    }

    unsafe fn transmit<const BITS: usize>(
        &mut self,
        buffer: &WaveformBuffer<BITS>,
    ) -> Result<(), Self::Error> {
        let fifo = self.machine.tx_fifo();
        stream_to(&mut self.channel, fifo, buffer)
    }

    fn poll(&mut self) {
        self.channel.poll();
    }

    fn abort(&mut self) {
        self.channel.abort();
    }
}
