//! Byte transport between the driver and the chip.
//!
//! The driver only depends on [`Transport`]. [`SpiTransport`] implements it for
//! an `embedded-hal` SPI bus plus a chip-select pin, which is how the MCP2515
//! is wired in practice.

use core::fmt::Debug;

use embedded_hal::{blocking::spi::Transfer, digital::v2::OutputPin};
use thiserror::Error;

use crate::regs::Register;

/// SPI instruction set of the MCP2515.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum Instruction {
    Write = 0b0000_0010,
    Read = 0b0000_0011,
    BitModify = 0b0000_0101,
    ReadStatus = 0b1010_0000,
    RxStatus = 0b1011_0000,
    Reset = 0b1100_0000,
}

/// A device that can exchange instruction frames with the chip.
///
/// One call is one chip-select cycle: the instruction byte, the address byte
/// when `address` is `Some`, every byte of `tx`, then `rx.len()` bytes clocked
/// back into `rx`. Implementations report failures and never retry.
pub trait Transport {
    type Error: Debug;

    fn exchange(
        &mut self,
        instruction: Instruction,
        address: Option<Register>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    #[inline]
    fn exchange(
        &mut self,
        instruction: Instruction,
        address: Option<Register>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error> {
        T::exchange(&mut **self, instruction, address, tx, rx)
    }
}

/// Errors from [`SpiTransport`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiError<SPIE, CSE> {
    /// The SPI transfer failed.
    #[error("SPI transfer failed: {0:?}")]
    Spi(SPIE),
    /// Driving the chip-select pin failed.
    #[error("chip select failed: {0:?}")]
    Hal(CSE),
}

/// [`Transport`] over a blocking SPI bus and a dedicated chip-select pin.
///
/// The MCP2515 requires MSB-first data order and SPI mode 0 (or 3). Half of
/// the oscillator frequency is a safe bus clock.
pub struct SpiTransport<SPI, CS> {
    /// SPI interface to interact with the MCP2515.
    spi: SPI,
    /// Chip select pin to select the MCP2515.
    cs: CS,
}

impl<SPI, CS, SPIE, CSE> SpiTransport<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    /// Wraps the bus and chip select, deselecting the chip.
    pub fn new(spi: SPI, mut cs: CS) -> Result<Self, SpiError<SPIE, CSE>> {
        cs.set_high().map_err(SpiError::Hal)?;
        Ok(Self { spi, cs })
    }

    /// Gives back the bus and the chip-select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Calls a function `f` after bringing the chip select pin low, restoring
    /// it to high after the function has finished.
    fn with_cs<T>(&mut self, f: impl FnOnce(&mut SPI) -> T) -> Result<T, SpiError<SPIE, CSE>> {
        self.cs.set_low().map_err(SpiError::Hal)?;
        let result = f(&mut self.spi);
        self.cs.set_high().map_err(SpiError::Hal)?;
        Ok(result)
    }
}

impl<SPI, CS, SPIE, CSE> Transport for SpiTransport<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    type Error = SpiError<SPIE, CSE>;

    fn exchange(
        &mut self,
        instruction: Instruction,
        address: Option<Register>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), Self::Error> {
        let mut hdr = [instruction as u8, 0];
        let hdr_len = match address {
            Some(reg) => {
                hdr[1] = reg.addr();
                2
            }
            None => 1,
        };

        self.with_cs(|spi| -> Result<(), SPIE> {
            spi.transfer(&mut hdr[..hdr_len])?;
            for byte in tx {
                let mut data = [*byte];
                spi.transfer(&mut data)?;
            }
            if !rx.is_empty() {
                // The MCP2515 ignores MOSI while shifting out a response, so
                // the buffer is zeroed and transferred in place.
                rx.iter_mut().for_each(|b| *b = 0);
                spi.transfer(rx)?;
            }
            Ok(())
        })?
        .map_err(SpiError::Spi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::{cell::RefCell, rc::Rc};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Select,
        Deselect,
        Byte(u8),
    }

    type Trace = Rc<RefCell<Vec<Event>>>;

    /// SPI double that answers every clocked byte with `reply`.
    struct FakeSpi {
        trace: Trace,
        reply: u8,
    }

    impl Transfer<u8> for FakeSpi {
        type Error = ();

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], ()> {
            for word in words.iter_mut() {
                self.trace.borrow_mut().push(Event::Byte(*word));
                *word = self.reply;
            }
            Ok(words)
        }
    }

    struct FakePin {
        trace: Trace,
    }

    impl OutputPin for FakePin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.trace.borrow_mut().push(Event::Select);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.trace.borrow_mut().push(Event::Deselect);
            Ok(())
        }
    }

    fn transport(reply: u8) -> (SpiTransport<FakeSpi, FakePin>, Trace) {
        let trace = Trace::default();
        let spi = FakeSpi {
            trace: trace.clone(),
            reply,
        };
        let cs = FakePin {
            trace: trace.clone(),
        };
        let transport = SpiTransport::new(spi, cs).unwrap();
        trace.borrow_mut().clear();
        (transport, trace)
    }

    #[test]
    fn bit_modify_frames_mask_then_data() {
        let (mut spi, trace) = transport(0);
        spi.exchange(
            Instruction::BitModify,
            Some(Register::CANCTRL),
            &[0xE0, 0x40],
            &mut [],
        )
        .unwrap();
        assert_eq!(
            *trace.borrow(),
            vec![
                Event::Select,
                Event::Byte(0x05),
                Event::Byte(0x0F),
                Event::Byte(0xE0),
                Event::Byte(0x40),
                Event::Deselect,
            ]
        );
    }

    #[test]
    fn status_read_has_no_address_byte() {
        let (mut spi, trace) = transport(0x81);
        let mut rx = [0xAA];
        spi.exchange(Instruction::ReadStatus, None, &[], &mut rx)
            .unwrap();
        assert_eq!(rx, [0x81]);
        assert_eq!(
            *trace.borrow(),
            vec![
                Event::Select,
                Event::Byte(0xA0),
                Event::Byte(0x00),
                Event::Deselect,
            ]
        );
    }

    #[test]
    fn reset_is_a_single_byte() {
        let (mut spi, trace) = transport(0);
        spi.exchange(Instruction::Reset, None, &[], &mut []).unwrap();
        assert_eq!(
            *trace.borrow(),
            vec![Event::Select, Event::Byte(0xC0), Event::Deselect]
        );
    }

    #[test]
    fn spi_failure_is_reported() {
        struct BrokenSpi;
        impl Transfer<u8> for BrokenSpi {
            type Error = u8;
            fn transfer<'w>(&mut self, _: &'w mut [u8]) -> Result<&'w [u8], u8> {
                Err(7)
            }
        }
        let pin = FakePin {
            trace: Trace::default(),
        };
        let mut spi = SpiTransport::new(BrokenSpi, pin).unwrap();
        let err = spi
            .exchange(Instruction::Read, Some(Register::EFLG), &[], &mut [0])
            .unwrap_err();
        assert_eq!(err, SpiError::Spi(7));
    }
}
