//! Acceptance filters and masks.
//!
//! Every filter and mask is four registers, `SIDH`, `SIDL`, `EID8` and `EID0`,
//! using the same identifier layout as the buffers (see [`crate::codec`]). A
//! received frame is accepted by a filter when every identifier bit selected
//! by the buffer's mask matches the filter.

use embedded_hal::can::Id;

use crate::{
    channel::RegisterChannel, codec::IdentRegs, error::Result, regs::Register,
    transport::Transport,
};

crate::resource_def! {
    /// Receive filters. `RXF0` and `RXF1` belong to `RXB0`, the rest to `RXB1`.
    RxFilter(Register) => {
        /// RXF0
        F0 = 0 => Register::RXF0SIDH,
        /// RXF1
        F1 = 1 => Register::RXF1SIDH,
        /// RXF2
        F2 = 2 => Register::RXF2SIDH,
        /// RXF3
        F3 = 3 => Register::RXF3SIDH,
        /// RXF4
        F4 = 4 => Register::RXF4SIDH,
        /// RXF5
        F5 = 5 => Register::RXF5SIDH
    }
}

crate::resource_def! {
    /// Receive masks. `RXM0` applies to `RXB0`, `RXM1` to `RXB1`.
    RxMask(Register) => {
        /// Mask 0
        Mask0 = 0 => Register::RXM0SIDH,
        /// Mask 1
        Mask1 = 1 => Register::RXM1SIDH
    }
}

/// Writes the four identifier registers starting at `sidh`.
///
/// The chip only accepts filter and mask writes in configuration mode; that
/// is up to the caller.
pub fn write_ident<T: Transport>(
    channel: &mut RegisterChannel<T>,
    sidh: Register,
    id: Id,
) -> Result<(), T::Error> {
    let regs = IdentRegs::from_id(id);
    trace!("writing identifier {:#X} at {:#X}", regs.sid(), sidh.addr());
    channel.write_registers(sidh, &regs.to_chip_order())
}

/// Programs one acceptance filter.
#[inline]
pub fn write_filter<T: Transport>(
    channel: &mut RegisterChannel<T>,
    filter: RxFilter,
    id: Id,
) -> Result<(), T::Error> {
    write_ident(channel, filter.registers(), id)
}

/// Programs one acceptance mask. Set bits must match the filter; clear bits
/// are ignored.
#[inline]
pub fn write_mask<T: Transport>(
    channel: &mut RegisterChannel<T>,
    mask: RxMask,
    id: Id,
) -> Result<(), T::Error> {
    write_ident(channel, mask.registers(), id)
}
