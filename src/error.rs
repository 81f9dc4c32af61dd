use thiserror::Error;

use crate::{
    buffer::TxBuf,
    regs::OpMode,
    timing::{CanClock, CanSpeed},
};

pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Driver error. `E` is the error type of the underlying
/// [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The byte exchange with the chip failed.
    #[error("transport failure: {0:?}")]
    Transport(E),
    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// All three Tx buffers have a transmission pending. Retry later.
    #[error("all transmit buffers are busy")]
    AllBuffersBusy,
    /// The chip reported an abort, lost arbitration or a bus error for the
    /// frame just queued.
    #[error("transmission via {0:?} failed")]
    TxFailed(TxBuf),
    /// `CANSTAT` never reported the requested mode.
    #[error("controller did not enter {0:?} mode")]
    ModeTransitionTimeout(OpMode),
    /// The bit timing table has no entry for this speed/oscillator pair.
    #[error("{0:?} is not supported with a {1:?} oscillator")]
    UnsupportedBitrate(CanSpeed, CanClock),
    /// No Rx buffer holds a frame. Not a failure.
    #[error("no message available")]
    NoMessage,
    /// A step of [`MCP2515::init`](crate::MCP2515::init) failed.
    #[error("initialization failed while {0}")]
    Initialization(InitStep),
}

/// Errors raised by the [frame codec](crate::codec).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum FrameError {
    /// Frame length above 8 on encode.
    #[error("frame length {0} exceeds 8 bytes")]
    TooLong(u8),
    /// Data length code above 8 in the received register bytes.
    #[error("received data length code {0} exceeds 8")]
    InvalidDlc(u8),
    /// Fewer register bytes than the header and its data length code need.
    #[error("register image truncated to {0} bytes")]
    Truncated(usize),
}

/// Steps of the initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum InitStep {
    Reset,
    ClearBuffers,
    Interrupts,
    RxBufferModes,
    Filters,
    Masks,
    Bitrate,
    ClockOut,
}

impl core::fmt::Display for InitStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            InitStep::Reset => "resetting",
            InitStep::ClearBuffers => "clearing buffers",
            InitStep::Interrupts => "enabling interrupts",
            InitStep::RxBufferModes => "configuring receive buffers",
            InitStep::Filters => "clearing filters",
            InitStep::Masks => "clearing masks",
            InitStep::Bitrate => "setting the bitrate",
            InitStep::ClockOut => "configuring CLKOUT",
        })
    }
}

impl<E> Error<E> {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::AllBuffersBusy | Error::NoMessage | Error::ModeTransitionTimeout(_)
        )
    }
}

impl<E: core::fmt::Debug> embedded_hal::can::Error for Error<E> {
    fn kind(&self) -> embedded_hal::can::ErrorKind {
        use embedded_hal::can::ErrorKind;

        match self {
            Error::TxFailed(_) => ErrorKind::Acknowledge,
            Error::Frame(FrameError::InvalidDlc(_)) => ErrorKind::Form,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::can::{Error as _, ErrorKind};

    #[test]
    fn frame_errors_convert() {
        let err: Error<()> = FrameError::TooLong(9).into();
        assert_eq!(err, Error::Frame(FrameError::TooLong(9)));
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_errors() {
        assert!(Error::<()>::AllBuffersBusy.is_transient());
        assert!(Error::<()>::NoMessage.is_transient());
        assert!(!Error::Transport(()).is_transient());
    }

    #[test]
    fn hal_error_kinds() {
        assert_eq!(Error::<()>::TxFailed(TxBuf::B1).kind(), ErrorKind::Acknowledge);
        assert_eq!(
            Error::<()>::Frame(FrameError::InvalidDlc(12)).kind(),
            ErrorKind::Form
        );
        assert_eq!(Error::<()>::NoMessage.kind(), ErrorKind::Other);
    }

    #[test]
    fn display_names_init_step() {
        let err = Error::<()>::Initialization(InitStep::Masks);
        assert_eq!(err.to_string(), "initialization failed while clearing masks");
    }
}
