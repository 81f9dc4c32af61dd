//! MCP2515 registers.

use core::ops::BitOr;

use bitflags::bitflags;
use modular_bitfield::prelude::*;

/// Register addresses, as listed in the MCP2515 datasheet register map.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum Register {
    RXF0SIDH = 0x00,
    RXF0SIDL = 0x01,
    RXF0EID8 = 0x02,
    RXF0EID0 = 0x03,
    RXF1SIDH = 0x04,
    RXF1SIDL = 0x05,
    RXF1EID8 = 0x06,
    RXF1EID0 = 0x07,
    RXF2SIDH = 0x08,
    RXF2SIDL = 0x09,
    RXF2EID8 = 0x0A,
    RXF2EID0 = 0x0B,
    CANSTAT = 0x0E,
    CANCTRL = 0x0F,
    RXF3SIDH = 0x10,
    RXF3SIDL = 0x11,
    RXF3EID8 = 0x12,
    RXF3EID0 = 0x13,
    RXF4SIDH = 0x14,
    RXF4SIDL = 0x15,
    RXF4EID8 = 0x16,
    RXF4EID0 = 0x17,
    RXF5SIDH = 0x18,
    RXF5SIDL = 0x19,
    RXF5EID8 = 0x1A,
    RXF5EID0 = 0x1B,
    /// Transmit error counter.
    TEC = 0x1C,
    /// Receive error counter.
    REC = 0x1D,
    RXM0SIDH = 0x20,
    RXM0SIDL = 0x21,
    RXM0EID8 = 0x22,
    RXM0EID0 = 0x23,
    RXM1SIDH = 0x24,
    RXM1SIDL = 0x25,
    RXM1EID8 = 0x26,
    RXM1EID0 = 0x27,
    CNF3 = 0x28,
    CNF2 = 0x29,
    CNF1 = 0x2A,
    CANINTE = 0x2B,
    CANINTF = 0x2C,
    EFLG = 0x2D,
    TXB0CTRL = 0x30,
    TXB0SIDH = 0x31,
    TXB0SIDL = 0x32,
    TXB0EID8 = 0x33,
    TXB0EID0 = 0x34,
    TXB0DLC = 0x35,
    TXB0DATA = 0x36,
    TXB1CTRL = 0x40,
    TXB1SIDH = 0x41,
    TXB1SIDL = 0x42,
    TXB1EID8 = 0x43,
    TXB1EID0 = 0x44,
    TXB1DLC = 0x45,
    TXB1DATA = 0x46,
    TXB2CTRL = 0x50,
    TXB2SIDH = 0x51,
    TXB2SIDL = 0x52,
    TXB2EID8 = 0x53,
    TXB2EID0 = 0x54,
    TXB2DLC = 0x55,
    TXB2DATA = 0x56,
    RXB0CTRL = 0x60,
    RXB0SIDH = 0x61,
    RXB0SIDL = 0x62,
    RXB0EID8 = 0x63,
    RXB0EID0 = 0x64,
    RXB0DLC = 0x65,
    RXB0DATA = 0x66,
    RXB1CTRL = 0x70,
    RXB1SIDH = 0x71,
    RXB1SIDL = 0x72,
    RXB1EID8 = 0x73,
    RXB1EID0 = 0x74,
    RXB1DLC = 0x75,
    RXB1DATA = 0x76,
}

impl Register {
    /// Raw 8-bit address sent after the instruction byte.
    #[inline]
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// A single-byte register with a fixed address.
pub trait Reg: Copy {
    /// Address of the register.
    const ADDRESS: Register;

    /// Read the register from its raw content.
    fn from_byte(content: u8) -> Self;

    /// Raw content of the register.
    fn into_byte(self) -> u8;
}

/// Marker trait implemented on registers which accept the BIT MODIFY
/// instruction.
pub trait BitModifiable: Reg {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanCtrl {
    /// CLKOUT Prescaler
    pub clkpre: ClkPre,
    /// CLKOUT Enable
    pub clken: bool,
    /// One-shot Mode
    pub osm: bool,
    /// Abort All Pending Transmission
    pub abat: bool,
    /// Request Operation Mode
    pub reqop: OpMode,
}

impl CanCtrl {
    /// Mask to modify the `reqop` bits.
    pub const MASK_REQOP: Self = Self::from_bytes([0b1110_0000]);
    /// Mask to modify the `clken` bit.
    pub const MASK_CLKEN: Self = Self::from_bytes([0b0000_0100]);
    /// Mask to modify the `clkpre` bits.
    pub const MASK_CLKPRE: Self = Self::from_bytes([0b0000_0011]);
}

impl BitModifiable for CanCtrl {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanStat {
    #[skip]
    __: B1,
    #[skip(setters)]
    pub icod: IntFlagCode,
    #[skip]
    __: B1,
    #[skip(setters)]
    pub opmod: OpMode,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanIntf {
    pub rx0if: bool,
    pub rx1if: bool,
    pub tx0if: bool,
    pub tx1if: bool,
    pub tx2if: bool,
    pub errif: bool,
    pub wakif: bool,
    pub merrf: bool,
}

impl CanIntf {
    pub const MASK_RX0IF: Self = Self::from_bytes([0b0000_0001]);
    pub const MASK_RX1IF: Self = Self::from_bytes([0b0000_0010]);
    pub const MASK_TX0IF: Self = Self::from_bytes([0b0000_0100]);
    pub const MASK_TX1IF: Self = Self::from_bytes([0b0000_1000]);
    pub const MASK_TX2IF: Self = Self::from_bytes([0b0001_0000]);
    pub const MASK_ERRIF: Self = Self::from_bytes([0b0010_0000]);
    pub const MASK_WAKIF: Self = Self::from_bytes([0b0100_0000]);
    pub const MASK_MERRF: Self = Self::from_bytes([0b1000_0000]);
}

impl BitModifiable for CanIntf {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanInte {
    pub rx0ie: bool,
    pub rx1ie: bool,
    pub tx0ie: bool,
    pub tx1ie: bool,
    pub tx2ie: bool,
    pub errie: bool,
    pub wakie: bool,
    pub merre: bool,
}

impl CanInte {
    pub const MASK_WAKIE: Self = Self::from_bytes([0b0100_0000]);
}

impl BitModifiable for CanInte {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cnf1 {
    pub brp: B6,
    pub sjw: SyncJumpWidth,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cnf2 {
    pub prseg: B3,
    pub phseg1: B3,
    pub sam: bool,
    pub btlmode: bool,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cnf3 {
    pub phseg2: B3,
    #[skip]
    __: B3,
    pub wakfil: bool,
    /// Start-of-frame signal on the CLKOUT pin (only when `clken` is clear).
    pub sof: bool,
}

impl Cnf3 {
    pub const MASK_SOF: Self = Self::from_bytes([0b1000_0000]);
}

impl BitModifiable for Cnf3 {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rxb0Ctrl {
    /// Filter hit.
    pub filhit0: bool,
    /// Read-Only copy of BUKT bit (used internally by MCP2515).
    #[skip(setters)]
    pub bukt1: bool,
    /// Rollover enable.
    pub bukt: bool,
    /// Received remote transfer request.
    #[skip(setters)]
    pub rxrtr: bool,
    #[skip]
    __: B1,
    /// Receive buffer operating mode.
    pub rxm: RecvBufOpMode,
    #[skip]
    __: B1,
}

impl Rxb0Ctrl {
    pub const MASK_RXM: Self = Self::from_bytes([0b0110_0000]);
    pub const MASK_BUKT: Self = Self::from_bytes([0b0000_0100]);
    pub const MASK_FILHIT0: Self = Self::from_bytes([0b0000_0001]);
}

impl BitModifiable for Rxb0Ctrl {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rxb1Ctrl {
    /// Filter hit.
    pub filhit: FilterHit,
    /// Received remote transfer request.
    #[skip(setters)]
    pub rxrtr: bool,
    #[skip]
    __: B1,
    /// Receive buffer operating mode.
    pub rxm: RecvBufOpMode,
    #[skip]
    __: B1,
}

impl Rxb1Ctrl {
    pub const MASK_RXM: Self = Self::from_bytes([0b0110_0000]);
    pub const MASK_FILHIT: Self = Self::from_bytes([0b0000_0111]);
}

impl BitModifiable for Rxb1Ctrl {}

/// `TXBnCTRL`. Not a [`Reg`], as there is one per Tx buffer; see
/// [`TxBuf::registers`](crate::buffer::TxBuf::registers).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxbCtrl {
    pub txp: TxBufPriority,
    #[skip]
    __: B1,
    pub txreq: bool,
    #[skip(setters)]
    pub txerr: bool,
    #[skip(setters)]
    pub mloa: bool,
    #[skip(setters)]
    pub abtf: bool,
    #[skip]
    __: B1,
}

impl TxbCtrl {
    pub const MASK_TXP: Self = Self::from_bytes([0b0000_0011]);
    pub const MASK_TXREQ: Self = Self::from_bytes([0b0000_1000]);

    /// Whether the last transmission was aborted, lost arbitration or hit a
    /// bus error.
    #[inline]
    pub fn failed(&self) -> bool {
        self.abtf() || self.mloa() || self.txerr()
    }
}

bitflags! {
    /// Contents of the `EFLG` error flag register.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ErrorFlags: u8 {
        /// Error warning (TEC or REC >= 96).
        const EWARN = 0b0000_0001;
        /// Receive error warning (REC >= 96).
        const RXWAR = 0b0000_0010;
        /// Transmit error warning (TEC >= 96).
        const TXWAR = 0b0000_0100;
        /// Receive error-passive (REC >= 128).
        const RXEP = 0b0000_1000;
        /// Transmit error-passive (TEC >= 128).
        const TXEP = 0b0001_0000;
        /// Bus-off (TEC reached 255).
        const TXBO = 0b0010_0000;
        /// Receive buffer 0 overflow.
        const RX0OVR = 0b0100_0000;
        /// Receive buffer 1 overflow.
        const RX1OVR = 0b1000_0000;
        /// Flags that mean frames are being lost or the node is off the bus.
        const ERRORS = Self::RXEP.bits | Self::TXEP.bits | Self::TXBO.bits
            | Self::RX0OVR.bits | Self::RX1OVR.bits;
    }
}

///////////////////
// Enums
///////////////////

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 2]
pub enum TxBufPriority {
    Low,
    LowIntermediate,
    HighIntermediate,
    High,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 3]
pub enum FilterHit {
    /// Acceptance filter 0 (only if the BUKT bit is set in RXB0CTRL).
    Filter0,
    /// Acceptance filter 1 (only if the BUKT bit is set in RXB0CTRL).
    Filter1,
    /// Acceptance filter 2.
    Filter2,
    /// Acceptance filter 3.
    Filter3,
    /// Acceptance filter 4.
    Filter4,
    /// Acceptance filter 5.
    Filter5,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 2]
pub enum RecvBufOpMode {
    /// Receives all valid messages using either Standard or Extended
    /// Identifiers that meet filter criteria; Extended ID Filter registers,
    /// RXFnEID8:RXFnEID0, are applied to the first two bytes of data in the
    /// messages with standard IDs.
    FilterOn = 0x0,
    /// Turns masks/filters off; receives any message.
    FilterOff = 0x3,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 2]
pub enum SyncJumpWidth {
    Tq1,
    Tq2,
    Tq3,
    Tq4,
}

/// Operation mode, as requested through `CANCTRL.REQOP` and reported by
/// `CANSTAT.OPMOD`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 3]
pub enum OpMode {
    Normal,
    Sleep,
    Loopback,
    ListenOnly,
    Configuration,
}

/// CLKOUT pin prescaler.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 2]
pub enum ClkPre {
    Div1,
    Div2,
    Div4,
    Div8,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 3]
pub enum IntFlagCode {
    None,
    Error,
    WakeUp,
    TXB0,
    TXB1,
    TXB2,
    RXB0,
    RXB1,
}

macro_rules! reg {
    ($($s:ty => $reg:expr),*) => {
        $(
            impl Reg for $s {
                const ADDRESS: Register = $reg;

                #[inline]
                fn from_byte(content: u8) -> Self {
                    Self::from_bytes([content])
                }

                #[inline]
                fn into_byte(self) -> u8 {
                    self.into_bytes()[0]
                }
            }

            impl BitOr for $s {
                type Output = Self;

                fn bitor(self, rhs: Self) -> Self::Output {
                    Self::from_bytes([
                        self.into_bytes()[0] | rhs.into_bytes()[0]
                    ])
                }
            }
        )*
    };
}

reg! {
    CanCtrl => Register::CANCTRL,
    CanStat => Register::CANSTAT,
    CanIntf => Register::CANINTF,
    CanInte => Register::CANINTE,
    Cnf1 => Register::CNF1,
    Cnf2 => Register::CNF2,
    Cnf3 => Register::CNF3,
    Rxb0Ctrl => Register::RXB0CTRL,
    Rxb1Ctrl => Register::RXB1CTRL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqop_lands_in_top_three_bits() {
        let modes = [
            (OpMode::Normal, 0x00),
            (OpMode::Sleep, 0x20),
            (OpMode::Loopback, 0x40),
            (OpMode::ListenOnly, 0x60),
            (OpMode::Configuration, 0x80),
        ];
        for (mode, byte) in modes {
            assert_eq!(CanCtrl::new().with_reqop(mode).into_byte(), byte);
            assert_eq!(CanStat::from_byte(byte).opmod_or_err().ok(), Some(mode));
        }
    }

    #[test]
    fn unknown_opmod_is_an_error_not_a_panic() {
        // 0b111 is the power-up state, which has no `OpMode`.
        assert!(CanStat::from_byte(0xE0).opmod_or_err().is_err());
    }

    #[test]
    fn txb_ctrl_failure_bits() {
        assert!(!TxbCtrl::from_bytes([0b0000_1000]).failed());
        assert!(TxbCtrl::from_bytes([0b0100_0000]).failed());
        assert!(TxbCtrl::from_bytes([0b0010_0000]).failed());
        assert!(TxbCtrl::from_bytes([0b0001_0000]).failed());
        assert!(TxbCtrl::from_bytes([0b0000_1000]).txreq());
    }

    #[test]
    fn receive_buffer_control_masks() {
        assert_eq!(Rxb0Ctrl::MASK_RXM.into_byte(), 0x60);
        assert_eq!(Rxb1Ctrl::MASK_RXM.into_byte(), 0x60);
        let rxb0 = Rxb0Ctrl::new()
            .with_rxm(RecvBufOpMode::FilterOn)
            .with_bukt(true);
        assert_eq!(rxb0.into_byte(), 0x04);
        let rxb1 = Rxb1Ctrl::new().with_filhit(FilterHit::Filter1);
        assert_eq!(rxb1.into_byte(), 0x01);
    }

    #[test]
    fn error_mask_excludes_warnings() {
        let flags = ErrorFlags::from_bits_truncate(0b0000_0111);
        assert!(!flags.intersects(ErrorFlags::ERRORS));
        assert!(ErrorFlags::TXBO.intersects(ErrorFlags::ERRORS));
        assert_eq!(ErrorFlags::ERRORS.bits(), 0xF8);
    }
}
