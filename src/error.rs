//! Error types.

/// Initialization failed; the strand group cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// None of the configured pins can be driven by the output peripheral.
    #[display("no configured pin can be driven by the output peripheral")]
    NoValidChannels,
    /// The configured strand length does not match the pixel storage.
    #[display("strand length {actual} does not match storage for {expected} pixels")]
    LengthMismatch {
        /// Pixels per strand the storage was built for
        expected: usize,
        /// Pixels per strand requested
        actual: usize,
    },
    /// The waveform buffers hold the wrong number of bit slots.
    #[display("waveform buffer holds {actual} bit slots, {expected} needed")]
    BufferMismatch {
        /// Bit slots the strand length needs
        expected: usize,
        /// Bit slots the buffer holds
        actual: usize,
    },
    /// No waveform buffer was supplied.
    #[display("at least one waveform buffer is required")]
    MissingBuffer,
    /// The color order's channel count does not match the pixel storage.
    #[display("color order with {channels} channels does not match pixel storage")]
    ColorOrderMismatch {
        /// Channels in the configured color order
        channels: usize,
    },
    /// The transfer engine refused to start.
    #[display("transfer engine failed to start")]
    Engine,
}

/// A frame could not be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShowError {
    /// `begin` has not completed successfully.
    #[display("strands not initialized")]
    NotInitialized,
    /// The previous transfer never completed and was aborted.
    #[display("transfer did not complete in time and was aborted")]
    TransferTimeout,
    /// The transfer engine refused the transfer.
    #[display("transfer engine rejected the transfer")]
    Engine,
}
