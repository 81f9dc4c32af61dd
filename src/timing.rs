//! CAN bit timing (`CNF1`, `CNF2`, `CNF3`) for supported oscillator and bus
//! speed combinations.

use crate::regs::{Cnf1, Cnf2, Cnf3};

/// Speed the CAN bus is operating at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanSpeed {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps31_25,
    Kbps33_3,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps83_3,
    Kbps95,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    Kbps500,
    Kbps666,
    Kbps1000,
}

/// Frequency of the oscillator attached to the MCP2515.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanClock {
    MHz8,
    MHz16,
}

/// Values for the three bit timing configuration registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub struct BitTiming {
    pub cnf1: u8,
    pub cnf2: u8,
    pub cnf3: u8,
}

impl BitTiming {
    const fn new(cnf1: u8, cnf2: u8, cnf3: u8) -> Self {
        Self { cnf1, cnf2, cnf3 }
    }

    /// The three values as register objects.
    pub fn registers(self) -> (Cnf1, Cnf2, Cnf3) {
        (
            Cnf1::from_bytes([self.cnf1]),
            Cnf2::from_bytes([self.cnf2]),
            Cnf3::from_bytes([self.cnf3]),
        )
    }
}

use CanClock::*;
use CanSpeed::*;

// 8 MHz has no 1 Mbps entry: it would need a single-quantum PHSEG2, which the
// datasheet forbids (minimum 2 TQ).
const TABLE: [(CanClock, CanSpeed, BitTiming); 27] = [
    (MHz8, Kbps5, BitTiming::new(0xA7, 0xF6, 0x84)),
    (MHz8, Kbps10, BitTiming::new(0x93, 0xF6, 0x84)),
    (MHz8, Kbps20, BitTiming::new(0x89, 0xF6, 0x84)),
    (MHz8, Kbps31_25, BitTiming::new(0x87, 0xE5, 0x83)),
    (MHz8, Kbps33_3, BitTiming::new(0x85, 0xF6, 0x84)),
    (MHz8, Kbps40, BitTiming::new(0x84, 0xF6, 0x84)),
    (MHz8, Kbps50, BitTiming::new(0x84, 0xE5, 0x83)),
    (MHz8, Kbps80, BitTiming::new(0x84, 0xD3, 0x81)),
    (MHz8, Kbps100, BitTiming::new(0x81, 0xF6, 0x84)),
    (MHz8, Kbps125, BitTiming::new(0x81, 0xE5, 0x83)),
    (MHz8, Kbps200, BitTiming::new(0x80, 0xF6, 0x84)),
    (MHz8, Kbps250, BitTiming::new(0x80, 0xE5, 0x83)),
    (MHz8, Kbps500, BitTiming::new(0x00, 0xD1, 0x81)),
    (MHz16, Kbps5, BitTiming::new(0x3F, 0xFF, 0x87)),
    (MHz16, Kbps10, BitTiming::new(0x1F, 0xFF, 0x87)),
    (MHz16, Kbps20, BitTiming::new(0x0F, 0xFF, 0x87)),
    (MHz16, Kbps33_3, BitTiming::new(0x4E, 0xF1, 0x85)),
    (MHz16, Kbps40, BitTiming::new(0x07, 0xFF, 0x87)),
    (MHz16, Kbps50, BitTiming::new(0x07, 0xFA, 0x87)),
    (MHz16, Kbps80, BitTiming::new(0x03, 0xFF, 0x87)),
    (MHz16, Kbps83_3, BitTiming::new(0x03, 0xBE, 0x07)),
    (MHz16, Kbps100, BitTiming::new(0x03, 0xFA, 0x87)),
    (MHz16, Kbps125, BitTiming::new(0x03, 0xF0, 0x86)),
    (MHz16, Kbps200, BitTiming::new(0x01, 0xFA, 0x87)),
    (MHz16, Kbps250, BitTiming::new(0x41, 0xF1, 0x85)),
    (MHz16, Kbps500, BitTiming::new(0x00, 0xF0, 0x86)),
    (MHz16, Kbps1000, BitTiming::new(0x00, 0xD0, 0x82)),
];

/// Looks up the timing for a bus speed on a given oscillator.
///
/// Returns `None` for combinations that are not in the table. There is no
/// fallback to a nearby speed.
pub fn lookup(clock: CanClock, speed: CanSpeed) -> Option<BitTiming> {
    TABLE
        .iter()
        .find(|(c, s, _)| *c == clock && *s == speed)
        .map(|(_, _, timing)| *timing)
}
