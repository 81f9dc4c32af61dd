//! Operation mode state machine and bit timing configuration.

use embedded_hal::blocking::delay::DelayMs;

use crate::{
    channel::RegisterChannel,
    error::{Error, Result},
    regs::{CanCtrl, CanInte, CanIntf, CanStat, OpMode},
    timing::{self, BitTiming, CanClock, CanSpeed},
    transport::Transport,
};

/// Tracks the operation mode of the chip and moves it between modes.
///
/// The stored mode only changes once `CANSTAT` confirms the transition, so it
/// always reflects the last mode the chip reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeController {
    mode: OpMode,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    /// Number of `CANSTAT` reads before a transition is given up on.
    pub const POLL_ATTEMPTS: u8 = 10;
    /// Delay between two `CANSTAT` reads.
    pub const POLL_DELAY_MS: u8 = 10;

    /// Starts in configuration mode, which is where the chip comes out of
    /// reset.
    pub const fn new() -> Self {
        Self {
            mode: OpMode::Configuration,
        }
    }

    /// Last mode confirmed by the chip.
    #[inline]
    pub fn mode(&self) -> OpMode {
        self.mode
    }

    /// Records that the chip was reset and is back in configuration mode.
    pub fn assume_reset(&mut self) {
        self.mode = OpMode::Configuration;
    }

    /// Moves the chip into `target`, waking it first if it is asleep.
    ///
    /// Waking sets `WAKIF` (with `WAKIE` temporarily enabled) and passes
    /// through listen-only mode, as the chip wakes into it.
    pub fn request<T: Transport>(
        &mut self,
        channel: &mut RegisterChannel<T>,
        delay: &mut impl DelayMs<u8>,
        target: OpMode,
    ) -> Result<(), T::Error> {
        let stat: CanStat = channel.read()?;
        if stat.opmod_or_err() == Ok(OpMode::Sleep) && target != OpMode::Sleep {
            self.wake(channel, delay)?;
        }

        // Clear wake flag and actually set the new mode
        channel.modify(CanIntf::new(), CanIntf::MASK_WAKIF)?;
        self.request_no_wake(channel, delay, target)
    }

    fn wake<T: Transport>(
        &mut self,
        channel: &mut RegisterChannel<T>,
        delay: &mut impl DelayMs<u8>,
    ) -> Result<(), T::Error> {
        debug!("waking controller");
        let inte: CanInte = channel.read()?;
        let int_enabled = inte.wakie();
        if !int_enabled {
            channel.modify(CanInte::new().with_wakie(true), CanInte::MASK_WAKIE)?;
        }

        channel.modify(CanIntf::new().with_wakif(true), CanIntf::MASK_WAKIF)?;
        let woke = self.request_no_wake(channel, delay, OpMode::ListenOnly);

        // Disable the interrupt if it was originally disabled
        if !int_enabled {
            channel.modify(CanInte::new(), CanInte::MASK_WAKIE)?;
        }
        woke
    }

    /// Requests `target` through `CANCTRL.REQOP` and polls `CANSTAT.OPMOD`
    /// until it matches.
    fn request_no_wake<T: Transport>(
        &mut self,
        channel: &mut RegisterChannel<T>,
        delay: &mut impl DelayMs<u8>,
        target: OpMode,
    ) -> Result<(), T::Error> {
        channel.modify(CanCtrl::new().with_reqop(target), CanCtrl::MASK_REQOP)?;

        for attempt in 0..Self::POLL_ATTEMPTS {
            if attempt > 0 {
                delay.delay_ms(Self::POLL_DELAY_MS);
            }
            let stat: CanStat = channel.read()?;
            if stat.opmod_or_err() == Ok(target) {
                debug!("mode {:?} -> {:?}", self.mode, target);
                self.mode = target;
                return Ok(());
            }
        }

        warn!("controller did not confirm mode {:?}", target);
        Err(Error::ModeTransitionTimeout(target))
    }

    /// Enters configuration mode and writes the bit timing for `speed` on a
    /// `clock` oscillator. The chip is left in configuration mode.
    pub fn configure_bitrate<T: Transport>(
        &mut self,
        channel: &mut RegisterChannel<T>,
        delay: &mut impl DelayMs<u8>,
        speed: CanSpeed,
        clock: CanClock,
    ) -> Result<BitTiming, T::Error> {
        self.request(channel, delay, OpMode::Configuration)?;

        let timing = timing::lookup(clock, speed).ok_or(Error::UnsupportedBitrate(speed, clock))?;
        let (cnf1, cnf2, cnf3) = timing.registers();
        channel.write(cnf1)?;
        channel.write(cnf2)?;
        channel.write(cnf3)?;
        debug!(
            "bitrate {:?} @ {:?}: CNF1={:#X} CNF2={:#X} CNF3={:#X}",
            speed, clock, timing.cnf1, timing.cnf2, timing.cnf3
        );
        Ok(timing)
    }
}
