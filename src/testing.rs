//! Simulated hardware for unit tests.

extern crate std;

use std::boxed::Box;
use std::rc::Rc;
use std::vec::Vec;

use core::cell::Cell;

use crate::clock::MicrosClock;
use crate::engine::{BlockControl, DmaChannel, TransferConfig, TransferEngine, TransferSignal};
use crate::waveform::WaveformBuffer;

/// A signal that lives for the rest of the test binary.
pub fn leak_signal() -> &'static TransferSignal {
    Box::leak(Box::new(TransferSignal::new()))
}

/// Waveform buffers that live for the rest of the test binary.
pub fn leak_buffers<const BITS: usize>(count: usize) -> &'static mut [WaveformBuffer<BITS>] {
    let buffers: Vec<WaveformBuffer<BITS>> = (0..count).map(|_| WaveformBuffer::new()).collect();
    Box::leak(buffers.into_boxed_slice())
}

/// Shared simulated microsecond counter.
///
/// Every read advances time by `step`, so busy-wait loops always make
/// progress.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
    step: u32,
}

impl SimClock {
    pub fn starting_at(micros: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(micros)),
            step: 1,
        }
    }

    pub fn frozen(micros: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(micros)),
            step: 0,
        }
    }

    pub fn peek(&self) -> u32 {
        self.now.get()
    }

    pub fn advance(&self, micros: u32) {
        self.now.set(self.now.get().wrapping_add(micros));
    }
}

impl MicrosClock for SimClock {
    fn now_micros(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

/// One transfer seen by [`SimEngine`].
#[derive(Debug, Clone)]
pub struct Transmission {
    pub source: usize,
    pub started_at: u32,
    pub bytes: Vec<u8>,
    pub completed_at: Option<u32>,
    pub bytes_at_completion: Option<Vec<u8>>,
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

/// Transfer engine that "sends" a buffer in `transfer_micros` of simulated
/// time and records everything it sent.
#[derive(Debug)]
pub struct SimEngine {
    signal: TransferSignal,
    clock: SimClock,
    transfer_micros: u32,
    source: Option<(*const u8, usize)>,
    pub output_mask: Option<u8>,
    pub stall: bool,
    pub reject: bool,
    pub transmissions: Vec<Transmission>,
    aborts: Rc<Cell<usize>>,
}

impl SimEngine {
    pub fn new(clock: SimClock, transfer_micros: u32) -> Self {
        Self {
            signal: TransferSignal::new(),
            clock,
            transfer_micros,
            source: None,
            output_mask: None,
            stall: false,
            reject: false,
            transmissions: Vec::new(),
            aborts: Rc::new(Cell::new(0)),
        }
    }

    pub fn aborts(&self) -> usize {
        self.aborts.get()
    }

    /// Abort count that outlives the engine.
    pub fn abort_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.aborts)
    }

    /// Transfers currently in flight according to the signal.
    pub fn in_flight(&self) -> usize {
        usize::from(self.signal.is_busy())
    }
}

impl TransferEngine for SimEngine {
    type Error = SimError;

    fn begin(&mut self, output_mask: u8) -> Result<(), Self::Error> {
        self.output_mask = Some(output_mask);
        Ok(())
    }

    fn completion(&self) -> &TransferSignal {
        &self.signal
    }

    unsafe fn transmit<const BITS: usize>(
        &mut self,
        buffer: &WaveformBuffer<BITS>,
    ) -> Result<(), Self::Error> {
        if self.reject {
            return Err(SimError);
        }
        assert!(self.signal.is_busy(), "signal must be armed before transmit");
        assert!(
            self.transmissions.iter().all(|t| t.completed_at.is_some()),
            "two transfers in flight"
        );
        let bytes = buffer.as_bytes();
        self.source = Some((bytes.as_ptr(), bytes.len()));
        self.transmissions.push(Transmission {
            source: bytes.as_ptr() as usize,
            started_at: self.clock.peek(),
            bytes: bytes.to_vec(),
            completed_at: None,
            bytes_at_completion: None,
            aborted: false,
        });
        Ok(())
    }

    fn poll(&mut self) {
        if self.stall || !self.signal.is_busy() {
            return;
        }
        let now = self.clock.now_micros();
        let Some(current) = self.transmissions.last_mut() else {
            return;
        };
        if now.wrapping_sub(current.started_at) < self.transfer_micros {
            return;
        }
        if let Some((ptr, len)) = self.source.take() {
            // SAFETY: the scheduler keeps the buffer alive and unwritten until
            // the signal reports completion, which only happens below.
            let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
            current.bytes_at_completion = Some(bytes.to_vec());
        }
        current.completed_at = Some(now);
        self.signal.complete(now);
    }

    fn abort(&mut self) {
        self.aborts.set(self.aborts.get() + 1);
        self.source = None;
        let now = self.clock.peek();
        if let Some(current) = self.transmissions.last_mut() {
            if current.completed_at.is_none() {
                current.completed_at = Some(now);
                current.aborted = true;
            }
        }
    }
}

/// A DMA channel call seen by [`RecordingChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Allocate,
    RegisterCompletion,
    Configure {
        source: usize,
        config: TransferConfig,
        control: BlockControl,
    },
    Start,
    Trigger,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelError;

/// DMA channel that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub calls: Vec<Call>,
    pub fail_allocate: bool,
    pub fail_configure: bool,
    pub signal: Option<&'static TransferSignal>,
}

impl DmaChannel for RecordingChannel {
    type Error = ChannelError;

    fn allocate(&mut self) -> Result<(), Self::Error> {
        if self.fail_allocate {
            return Err(ChannelError);
        }
        self.calls.push(Call::Allocate);
        Ok(())
    }

    unsafe fn configure_transfer(
        &mut self,
        source: *const u8,
        config: &TransferConfig,
        control: BlockControl,
    ) -> Result<(), Self::Error> {
        if self.fail_configure {
            return Err(ChannelError);
        }
        self.calls.push(Call::Configure {
            source: source as usize,
            config: *config,
            control,
        });
        Ok(())
    }

    fn register_completion(&mut self, signal: &'static TransferSignal) {
        self.signal = Some(signal);
        self.calls.push(Call::RegisterCompletion);
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        self.calls.push(Call::Start);
        Ok(())
    }

    fn trigger(&mut self) {
        self.calls.push(Call::Trigger);
    }

    fn abort(&mut self) {
        self.calls.push(Call::Abort);
    }
}

/// Reassemble the byte the strand on lane `mask` sends at wire position `k`
/// from a raw waveform image.
pub fn wire_byte(bytes: &[u8], mask: u8, k: usize) -> u8 {
    (0..8).fold(0, |byte, bit| {
        let data = bytes[crate::HEADER_PADDING + (k * 8 + bit) * crate::SLOT_BYTES + 1];
        (byte << 1) | u8::from(data & mask != 0)
    })
}
