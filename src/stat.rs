//! Responses to the `READ STATUS` and `RX STATUS` instructions.

use modular_bitfield::prelude::*;

/// Response to the `READ STATUS` instruction: receive full flags and transmit
/// request/empty flags for every buffer, in one byte.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    #[skip(setters)]
    pub rx0if: bool,
    #[skip(setters)]
    pub rx1if: bool,
    #[skip(setters)]
    pub tx0req: bool,
    #[skip(setters)]
    pub tx0if: bool,
    #[skip(setters)]
    pub tx1req: bool,
    #[skip(setters)]
    pub tx1if: bool,
    #[skip(setters)]
    pub tx2req: bool,
    #[skip(setters)]
    pub tx2if: bool,
}

impl Status {
    /// Whether either receive buffer holds a frame.
    #[inline]
    pub fn rx_pending(&self) -> bool {
        self.rx0if() || self.rx1if()
    }
}

/// Response to the `RX STATUS` instruction.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStatus {
    /// Filter that matched the most recent frame. 0-5 are `RXF0`-`RXF5`, 6 and
    /// 7 are `RXF0`/`RXF1` rolled over into `RXB1`.
    #[skip(setters)]
    pub filter_match: B3,
    /// The most recent frame was a remote frame.
    #[skip(setters)]
    pub remote: bool,
    /// The most recent frame had an extended identifier.
    #[skip(setters)]
    pub extended: bool,
    #[skip]
    __: B1,
    /// `RXB0` holds a frame.
    #[skip(setters)]
    pub rxb0: bool,
    /// `RXB1` holds a frame.
    #[skip(setters)]
    pub rxb1: bool,
}
