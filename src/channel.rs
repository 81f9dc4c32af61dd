//! Instruction-level access to the MCP2515 register file.

use crate::{
    error::{Error, Result},
    regs::{BitModifiable, Reg, Register},
    stat::{RxStatus, Status},
    transport::{Instruction, Transport},
};

/// Frames MCP2515 instructions over a [`Transport`].
///
/// The channel knows the instruction set but not what the registers mean.
/// Each call is exactly one exchange; transport failures are returned as
/// [`Error::Transport`].
pub struct RegisterChannel<T> {
    transport: T,
}

impl<T: Transport> RegisterChannel<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Gives back the underlying transport.
    pub fn release(self) -> T {
        self.transport
    }

    #[inline]
    fn exchange(
        &mut self,
        instruction: Instruction,
        address: Option<Register>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), T::Error> {
        self.transport
            .exchange(instruction, address, tx, rx)
            .map_err(Error::Transport)
    }

    /// Sends the `RESET` instruction. The chip comes back in configuration
    /// mode with every register at its reset value.
    pub fn reset(&mut self) -> Result<(), T::Error> {
        self.exchange(Instruction::Reset, None, &[], &mut [])
    }

    /// Reads a single register.
    pub fn read_register(&mut self, reg: Register) -> Result<u8, T::Error> {
        let mut ret = [0u8; 1];
        self.exchange(Instruction::Read, Some(reg), &[], &mut ret)?;
        Ok(ret[0])
    }

    /// Reads registers starting from `reg` sequentially, moving on to the next
    /// address until `ret` is full.
    pub fn read_registers(&mut self, reg: Register, ret: &mut [u8]) -> Result<(), T::Error> {
        self.exchange(Instruction::Read, Some(reg), &[], ret)
    }

    /// Writes a single register.
    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<(), T::Error> {
        self.exchange(Instruction::Write, Some(reg), &[value], &mut [])
    }

    /// Writes to sequential registers. Writing will start at `reg` and continue
    /// sequentially until `data` is empty.
    pub fn write_registers(&mut self, reg: Register, data: &[u8]) -> Result<(), T::Error> {
        self.exchange(Instruction::Write, Some(reg), data, &mut [])
    }

    /// Changes the bits of `reg` selected by `mask` to the matching bits of
    /// `value`. The read-modify-write happens inside the chip.
    ///
    /// Only some registers support this; see the datasheet register map.
    pub fn modify_register(&mut self, reg: Register, mask: u8, value: u8) -> Result<(), T::Error> {
        self.exchange(Instruction::BitModify, Some(reg), &[mask, value], &mut [])
    }

    /// Reads the status byte (`READ STATUS` instruction).
    pub fn read_status(&mut self) -> Result<Status, T::Error> {
        let mut ret = [0u8; 1];
        self.exchange(Instruction::ReadStatus, None, &[], &mut ret)?;
        Ok(Status::from_bytes(ret))
    }

    /// Reads the receive status byte (`RX STATUS` instruction).
    pub fn read_rx_status(&mut self) -> Result<RxStatus, T::Error> {
        let mut ret = [0u8; 1];
        self.exchange(Instruction::RxStatus, None, &[], &mut ret)?;
        Ok(RxStatus::from_bytes(ret))
    }

    /// Read a register via a register object.
    #[inline]
    pub fn read<R: Reg>(&mut self) -> Result<R, T::Error> {
        self.read_register(R::ADDRESS).map(R::from_byte)
    }

    /// Write to a register using a register object.
    #[inline]
    pub fn write<R: Reg>(&mut self, reg: R) -> Result<(), T::Error> {
        self.write_register(R::ADDRESS, reg.into_byte())
    }

    /// Modifies a register.
    ///
    /// # Parameters
    ///
    /// * `reg` - New register content.
    /// * `mask` - Mask register. The bits must be 1 in the positions you want
    ///   to modify.
    #[inline]
    pub fn modify<R: BitModifiable>(&mut self, reg: R, mask: R) -> Result<(), T::Error> {
        self.modify_register(R::ADDRESS, mask.into_byte(), reg.into_byte())
    }
}
