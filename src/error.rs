use core::fmt;

use embedded_hal::spi::ErrorKind;

/// Errors reported by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The bus transfer failed. This is never retried internally.
    Bus(ErrorKind),
    /// The coprocessor has no room for another outgoing frame. Retry later.
    BusBusy,
    /// The coprocessor refused to reserve a request buffer.
    RequestRejected(u8),
    /// An event with an opcode we don't know arrived.
    UnknownOpcode(u8),
    /// The payload of an event was shorter than its opcode requires.
    MalformedEvent(u8),
    /// A new frame was announced, before the previous one was drained.
    ProtocolDesync,
    /// No state change arrived, while waiting for the association.
    ConnectTimeout,
    /// The coprocessor didn't answer a request in time.
    Timeout,
    /// The coprocessor reported the association as failed, with the contained reason code.
    ConnectFailed(u8),
    /// The scan result index is outside of the last scan.
    InvalidIndex,
    /// A scan is already running.
    ScanInProgress,
    /// [WiFi::init](crate::WiFi::init) wasn't called yet.
    NotInitialized,
    /// The operation isn't possible in the current connection state.
    InvalidState,
    /// There is no association to tear down.
    NotConnected,
    /// The frame doesn't fit into a single coprocessor buffer.
    FrameTooLarge,
    /// An argument is outside of the range accepted by the coprocessor.
    InvalidArgument,
}
impl Error {
    pub(crate) fn bus(err: impl embedded_hal::spi::Error) -> Self {
        Self::Bus(err.kind())
    }
    /// Check if retrying the same call later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BusBusy | Self::Timeout | Self::ConnectTimeout | Self::ScanInProgress
        )
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(kind) => write!(f, "bus transfer failed: {kind}"),
            Self::BusBusy => f.write_str("coprocessor TX buffer is full"),
            Self::RequestRejected(status) => {
                write!(f, "coprocessor rejected the request with status {status}")
            }
            Self::UnknownOpcode(opcode) => write!(f, "unknown HIF opcode {opcode}"),
            Self::MalformedEvent(opcode) => write!(f, "truncated payload for opcode {opcode}"),
            Self::ProtocolDesync => f.write_str("frame announced while another one was pending"),
            Self::ConnectTimeout => f.write_str("association timed out"),
            Self::Timeout => f.write_str("request timed out"),
            Self::ConnectFailed(reason) => write!(f, "association failed with reason {reason}"),
            Self::InvalidIndex => f.write_str("scan result index out of range"),
            Self::ScanInProgress => f.write_str("a scan is already in progress"),
            Self::NotInitialized => f.write_str("driver not initialized"),
            Self::InvalidState => f.write_str("operation not possible in the current state"),
            Self::NotConnected => f.write_str("not connected"),
            Self::FrameTooLarge => f.write_str("frame too large"),
            Self::InvalidArgument => f.write_str("invalid argument"),
        }
    }
}

pub type WiFiResult<T> = Result<T, Error>;
