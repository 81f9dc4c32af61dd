#![cfg_attr(not(test), no_std)]

#[macro_use]
pub(crate) mod macros;

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod filter;
pub mod frame;
pub mod mode;
pub mod regs;
pub mod stat;
pub mod timing;
pub mod transport;

#[cfg(test)]
pub(crate) mod mocks;

use embedded_hal::{
    blocking::{self, delay::DelayMs},
    can::{ExtendedId, Id, StandardId},
};

pub use crate::{
    buffer::{RxBuf, TxBuf},
    error::{Error, FrameError, InitStep, Result},
    filter::{RxFilter, RxMask},
    frame::CanFrame,
    regs::{ClkPre, ErrorFlags, OpMode},
    stat::{RxStatus, Status},
    timing::{CanClock, CanSpeed},
    transport::{SpiError, SpiTransport, Transport},
};
use crate::{
    buffer::BufferAllocator,
    channel::RegisterChannel,
    codec::HEADER_LEN,
    frame::MAX_DLC,
    mode::ModeController,
    regs::{
        CanCtrl, CanInte, CanIntf, Cnf3, FilterHit, RecvBufOpMode, Register, Rxb0Ctrl, Rxb1Ctrl,
        TxbCtrl,
    },
};

/// Settings used to initialize the MCP2515.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct Settings {
    /// Device CAN speed.
    pub can_speed: CanSpeed,
    /// Device oscillator speed. Should match the clock speed of the oscillator
    /// attached to the MCP2515.
    pub clock: CanClock,
    /// CLKOUT prescaler, or `None` to disable the CLKOUT pin.
    pub clkout: Option<ClkPre>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            can_speed: CanSpeed::Kbps500,
            clock: CanClock::MHz16,
            clkout: None,
        }
    }
}

/// What the driver last observed about the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerState {
    /// Last operation mode confirmed through `CANSTAT`.
    pub mode: OpMode,
    /// Tx buffers seen with a transmission pending, indexed like [`TxBuf`].
    pub tx_busy: [bool; 3],
    /// Last `EFLG` value read by [`MCP2515::error_flags`].
    pub error_flags: u8,
}

/// Delay after a reset before the chip accepts instructions. It may need to
/// come out of sleep first.
const RESET_DELAY_MS: u8 = 10;

/// MCP2515 driver.
pub struct MCP2515<T, D> {
    channel: RegisterChannel<T>,
    delay: D,
    modes: ModeController,
    buffers: BufferAllocator,
    error_flags: u8,
}

impl<T, D> MCP2515<T, D>
where
    T: Transport,
    D: DelayMs<u8>,
{
    /// Creates a new MCP2515 driver. Nothing is sent to the chip until
    /// [`init`](Self::init) or another call.
    ///
    /// # Parameters
    ///
    /// * `transport` - Byte transport to the chip, usually a [`SpiTransport`].
    /// * `delay` - Delay interface from downstream HAL, used after reset and
    ///   while waiting for mode changes.
    pub fn new(transport: T, delay: D) -> Self {
        Self {
            channel: RegisterChannel::new(transport),
            delay,
            modes: ModeController::new(),
            buffers: BufferAllocator::new(),
            error_flags: 0,
        }
    }

    /// Gives back the transport and the delay.
    pub fn release(self) -> (T, D) {
        (self.channel.release(), self.delay)
    }

    /// Copy of what the driver last observed.
    pub fn state(&self) -> ControllerState {
        ControllerState {
            mode: self.modes.mode(),
            tx_busy: self.buffers.busy(),
            error_flags: self.error_flags,
        }
    }

    /// Last operation mode confirmed by the chip.
    #[inline]
    pub fn mode(&self) -> OpMode {
        self.modes.mode()
    }

    /// Resets the MCP2515. It comes back in configuration mode with every
    /// register at its reset value.
    pub fn reset(&mut self) -> Result<(), T::Error> {
        self.channel.reset()?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.modes.assume_reset();
        self.buffers.clear();
        self.error_flags = 0;
        Ok(())
    }

    /// Initializes the MCP2515. This should be called once at the start of the
    /// program.
    ///
    /// Resets the chip, clears every buffer, filter and mask so that all
    /// frames are accepted, enables the receive and error interrupts and
    /// applies `settings`. The chip is left in configuration mode; use
    /// [`set_mode`](Self::set_mode) to go on the bus.
    ///
    /// A failing step is reported as [`Error::Initialization`].
    pub fn init(&mut self, settings: Settings) -> Result<(), T::Error> {
        self.reset().map_err(failed_at(InitStep::Reset))?;
        self.clear_buffers()
            .map_err(failed_at(InitStep::ClearBuffers))?;

        // Enable interrupts for Rx buffer full, error and message errors.
        self.channel
            .write(
                CanInte::new()
                    .with_rx0ie(true)
                    .with_rx1ie(true)
                    .with_errie(true)
                    .with_merre(true),
            )
            .map_err(failed_at(InitStep::Interrupts))?;

        self.configure_rx_buffers()
            .map_err(failed_at(InitStep::RxBufferModes))?;

        // Clear all Rx filters and set all to standard EXCEPT for F1 which will be
        // extended filter.
        for filt in RxFilter::ALL {
            let id = if filt == RxFilter::F1 {
                Id::Extended(ExtendedId::ZERO)
            } else {
                Id::Standard(StandardId::ZERO)
            };
            filter::write_filter(&mut self.channel, filt, id)
                .map_err(failed_at(InitStep::Filters))?;
        }

        // Clear all Rx masks and allow extended IDs.
        for mask in RxMask::ALL {
            filter::write_mask(&mut self.channel, mask, Id::Extended(ExtendedId::ZERO))
                .map_err(failed_at(InitStep::Masks))?;
        }

        self.set_bitrate(settings.can_speed, settings.clock)
            .map_err(failed_at(InitStep::Bitrate))?;
        self.apply_clkout(settings.clkout)
            .map_err(failed_at(InitStep::ClockOut))?;

        debug!("initialized");
        Ok(())
    }

    /// Zeroes the control, header and data registers of the Tx buffers and the
    /// control registers of the Rx buffers.
    fn clear_buffers(&mut self) -> Result<(), T::Error> {
        let zeros = [0u8; 1 + HEADER_LEN + MAX_DLC as usize];
        for buf in TxBuf::ALL {
            self.channel.write_registers(buf.registers().ctrl, &zeros)?;
        }
        for buf in RxBuf::ALL {
            self.channel.write_register(buf.registers().ctrl, 0)?;
        }
        self.buffers.clear();
        Ok(())
    }

    /// Receive all messages that have a standard or extended identifier, with
    /// RXB0 rolling over into RXB1 when full.
    fn configure_rx_buffers(&mut self) -> Result<(), T::Error> {
        self.channel.modify(
            Rxb0Ctrl::new()
                .with_rxm(RecvBufOpMode::FilterOn)
                .with_bukt(true)
                .with_filhit0(false),
            Rxb0Ctrl::MASK_RXM | Rxb0Ctrl::MASK_BUKT | Rxb0Ctrl::MASK_FILHIT0,
        )?;
        self.channel.modify(
            Rxb1Ctrl::new()
                .with_rxm(RecvBufOpMode::FilterOn)
                .with_filhit(FilterHit::Filter1),
            Rxb1Ctrl::MASK_RXM | Rxb1Ctrl::MASK_FILHIT,
        )
    }

    /// Configures the MCP2515 to operate at a certain CAN bitrate.
    ///
    /// The chip is switched to configuration mode and stays there.
    ///
    /// # Parameters
    ///
    /// * `can_speed` - CAN speed to operate at.
    /// * `clock` - Clock speed of the MCP2515.
    pub fn set_bitrate(&mut self, can_speed: CanSpeed, clock: CanClock) -> Result<(), T::Error> {
        self.modes
            .configure_bitrate(&mut self.channel, &mut self.delay, can_speed, clock)
            .map(drop)
    }

    /// [`set_bitrate`](Self::set_bitrate) with a 16 MHz oscillator.
    #[inline]
    pub fn set_bitrate_default_clock(&mut self, can_speed: CanSpeed) -> Result<(), T::Error> {
        self.set_bitrate(can_speed, CanClock::MHz16)
    }

    /// Set the operation mode of the device.
    ///
    /// This will wake the device if necessary. The stored mode only changes
    /// once the chip confirms it.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<(), T::Error> {
        self.modes.request(&mut self.channel, &mut self.delay, mode)
    }

    fn enter_configuration(&mut self) -> Result<(), T::Error> {
        self.set_mode(OpMode::Configuration)
    }

    /// Enables the `CLKOUT` pin with a prescaler, or disables it and outputs
    /// the start-of-frame signal on the pin instead.
    ///
    /// Switches to configuration mode.
    pub fn set_clkout(&mut self, clkout: Option<ClkPre>) -> Result<(), T::Error> {
        self.enter_configuration()?;
        self.apply_clkout(clkout)
    }

    fn apply_clkout(&mut self, clkout: Option<ClkPre>) -> Result<(), T::Error> {
        match clkout {
            Some(prescaler) => {
                self.channel.modify(
                    CanCtrl::new().with_clken(true).with_clkpre(prescaler),
                    CanCtrl::MASK_CLKEN | CanCtrl::MASK_CLKPRE,
                )?;
                self.channel.modify(Cnf3::new(), Cnf3::MASK_SOF)
            }
            None => {
                self.channel.modify(CanCtrl::new(), CanCtrl::MASK_CLKEN)?;
                self.channel
                    .modify(Cnf3::new().with_sof(true), Cnf3::MASK_SOF)
            }
        }
    }

    /// Sets a receive filter. Switches to configuration mode.
    ///
    /// # Parameters
    ///
    /// * `filter` - The filter to action on.
    /// * `id` - The actual ID filter to apply to `filter`.
    pub fn set_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), T::Error> {
        self.enter_configuration()?;
        filter::write_filter(&mut self.channel, filter, id)
    }

    /// Sets a receive mask. Switches to configuration mode.
    ///
    /// # Parameters
    ///
    /// * `mask` - The mask to action on.
    /// * `id` - The actual ID mask to apply to `mask`.
    pub fn set_mask(&mut self, mask: RxMask, id: Id) -> Result<(), T::Error> {
        self.enter_configuration()?;
        filter::write_mask(&mut self.channel, mask, id)
    }

    /// Sends a CAN frame over the CAN bus via the first idle Tx buffer.
    ///
    /// # Returns
    ///
    /// The buffer the frame was queued in. [`Error::AllBuffersBusy`] if every
    /// buffer still has a transmission pending.
    pub fn send(&mut self, frame: &CanFrame) -> Result<TxBuf, T::Error> {
        let encoded = codec::encode(frame)?;
        let buf = self.buffers.acquire_tx_buffer(&mut self.channel)?;
        self.queue(buf, encoded.as_bytes())
    }

    /// Sends a CAN frame over the CAN bus via a specific Tx buffer, whether or
    /// not it is idle.
    pub fn send_via(&mut self, buf: TxBuf, frame: &CanFrame) -> Result<(), T::Error> {
        let encoded = codec::encode(frame)?;
        self.queue(buf, encoded.as_bytes()).map(drop)
    }

    /// Writes an encoded frame into `buf`, requests transmission and checks
    /// the buffer's failure flags.
    fn queue(&mut self, buf: TxBuf, encoded: &[u8]) -> Result<TxBuf, T::Error> {
        let regs = buf.registers();
        self.channel.write_registers(regs.sidh, encoded)?;
        self.channel.modify_register(
            regs.ctrl,
            TxbCtrl::MASK_TXREQ.into_bytes()[0],
            TxbCtrl::new().with_txreq(true).into_bytes()[0],
        )?;
        self.buffers.mark_busy(buf);

        let ctrl = BufferAllocator::read_ctrl(&mut self.channel, buf)?;
        self.buffers.record(buf, ctrl);
        if ctrl.failed() {
            warn!("transmission via {:?} failed", buf);
            return Err(Error::TxFailed(buf));
        }
        trace!("queued {} bytes in {:?}", encoded.len(), buf);
        Ok(buf)
    }

    /// Reads a message from the MCP2515 Rx buffers, `RXB0` first.
    ///
    /// [`Error::NoMessage`] when both are empty.
    pub fn receive(&mut self) -> Result<CanFrame, T::Error> {
        let status = self.channel.read_status()?;
        let buf = BufferAllocator::pending_rx_buffer(&status).ok_or(Error::NoMessage)?;
        self.read_rx_buffer(buf)
    }

    /// Reads a message from a specific Rx buffer.
    pub fn receive_from(&mut self, buf: RxBuf) -> Result<CanFrame, T::Error> {
        let status = self.channel.read_status()?;
        if !buf.is_full(&status) {
            return Err(Error::NoMessage);
        }
        self.read_rx_buffer(buf)
    }

    fn read_rx_buffer(&mut self, buf: RxBuf) -> Result<CanFrame, T::Error> {
        let regs = buf.registers();
        let mut header = [0u8; HEADER_LEN];
        self.channel.read_registers(regs.sidh, &mut header)?;

        let header = match codec::decode_header(header) {
            Ok(header) => header,
            Err(err) => {
                // Drop the frame so it does not block the buffer forever.
                warn!("dropping undecodable frame in {:?}", buf);
                self.channel.modify(CanIntf::new(), regs.intf)?;
                return Err(err.into());
            }
        };

        let mut data = [0u8; MAX_DLC as usize];
        let data = &mut data[..header.payload_len()];
        if !data.is_empty() {
            self.channel.read_registers(regs.data, data)?;
        }
        let frame = header.into_frame(data)?;

        // Clear Rx interrupt flag
        self.channel.modify(CanIntf::new(), regs.intf)?;
        Ok(frame)
    }

    /// Reads the raw `EFLG` register and remembers it in the
    /// [`ControllerState`].
    pub fn error_flags(&mut self) -> Result<u8, T::Error> {
        self.error_flags = self.channel.read_register(Register::EFLG)?;
        Ok(self.error_flags)
    }

    /// Whether either Rx buffer holds a frame.
    pub fn check_receive(&mut self) -> Result<bool, T::Error> {
        Ok(self.channel.read_status()?.rx_pending())
    }

    /// Whether `EFLG` reports a receive overflow, an error-passive state or
    /// bus-off. Warning levels alone do not count.
    pub fn check_error(&mut self) -> Result<bool, T::Error> {
        let flags = ErrorFlags::from_bits_truncate(self.error_flags()?);
        Ok(flags.intersects(ErrorFlags::ERRORS))
    }

    /// Reads the status register.
    #[inline]
    pub fn read_status(&mut self) -> Result<Status, T::Error> {
        self.channel.read_status()
    }

    /// Issues the `RX STATUS` instruction.
    #[inline]
    pub fn read_rx_status(&mut self) -> Result<RxStatus, T::Error> {
        self.channel.read_rx_status()
    }

    /// Transmit and receive error counters (`TEC`, `REC`).
    pub fn error_counters(&mut self) -> Result<(u8, u8), T::Error> {
        let mut counters = [0u8; 2];
        self.channel.read_registers(Register::TEC, &mut counters)?;
        Ok((counters[0], counters[1]))
    }
}

/// Maps any error of an init step to [`Error::Initialization`], logging the
/// underlying cause first.
fn failed_at<E: core::fmt::Debug>(step: InitStep) -> impl FnOnce(Error<E>) -> Error<E> {
    move |cause| {
        #[cfg(feature = "defmt")]
        ::defmt::warn!(
            "initialization failed while {}: {:?}",
            step,
            ::defmt::Debug2Format(&cause)
        );
        #[cfg(feature = "log")]
        ::log::warn!("initialization failed while {}: {:?}", step, cause);
        let _ = cause;
        Error::Initialization(step)
    }
}

impl<T, D> blocking::can::Can for MCP2515<T, D>
where
    T: Transport,
    D: DelayMs<u8>,
{
    type Frame = CanFrame;
    type Error = Error<T::Error>;

    #[inline]
    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), T::Error> {
        self.send(frame).map(drop)
    }

    #[inline]
    fn receive(&mut self) -> Result<Self::Frame, T::Error> {
        MCP2515::receive(self)
    }
}

/// `AllBuffersBusy` and `NoMessage` mean "try again later".
fn nb_error<E>(err: Error<E>) -> nb::Error<Error<E>> {
    match err {
        Error::AllBuffersBusy | Error::NoMessage => nb::Error::WouldBlock,
        other => nb::Error::Other(other),
    }
}

impl<T, D> embedded_hal::can::nb::Can for MCP2515<T, D>
where
    T: Transport,
    D: DelayMs<u8>,
{
    type Frame = CanFrame;
    type Error = Error<T::Error>;

    /// Never replaces a pending frame, so `Ok` always carries `None`.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        self.send(frame).map(|_| None).map_err(nb_error)
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        MCP2515::receive(self).map_err(nb_error)
    }
}
