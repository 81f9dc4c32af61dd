//! A simulated MCP2515 for tests.

use embedded_hal::blocking::delay::DelayMs;

use crate::{
    regs::{OpMode, Register},
    transport::{Instruction, Transport},
};

const CANSTAT: usize = Register::CANSTAT as usize;
const CANCTRL: usize = Register::CANCTRL as usize;
const CANINTF: usize = Register::CANINTF as usize;
const EFLG: usize = Register::EFLG as usize;
const RXB0CTRL: usize = Register::RXB0CTRL as usize;
const TXB_CTRL: [usize; 3] = [0x30, 0x40, 0x50];
const RXB_CTRL: [usize; 2] = [0x60, 0x70];

const TXREQ: u8 = 0b0000_1000;
const TXERR: u8 = 0b0001_0000;
const TX_READ_ONLY: u8 = 0b0111_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// One recorded instruction frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub instruction: Instruction,
    pub address: Option<u8>,
    pub tx: Vec<u8>,
}

/// Delay that returns immediately.
pub struct NoDelay;

impl DelayMs<u8> for NoDelay {
    fn delay_ms(&mut self, _: u8) {}
}

/// Register file with just enough behaviour to drive the controller through
/// mode changes, transmissions and loopback reception.
pub struct MockChip {
    regs: [u8; 128],
    exchanges: Vec<Exchange>,
    fail_after: Option<usize>,
    fail_at: Option<u8>,
    refused: Option<OpMode>,
    hold_tx: bool,
    tx_error: bool,
}

impl MockChip {
    pub fn new() -> Self {
        let mut chip = Self {
            regs: [0; 128],
            exchanges: Vec::new(),
            fail_after: None,
            fail_at: None,
            refused: None,
            hold_tx: false,
            tx_error: false,
        };
        chip.power_on();
        chip
    }

    fn power_on(&mut self) {
        self.regs = [0; 128];
        self.regs[CANSTAT] = 0x80;
        self.regs[CANCTRL] = 0x87;
    }

    /// Sets a register directly, bypassing any side effect.
    pub fn set(&mut self, reg: Register, value: u8) {
        self.regs[reg as usize] = value;
    }

    pub fn get(&self, reg: Register) -> u8 {
        self.regs[reg as usize]
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn clear_exchanges(&mut self) {
        self.exchanges.clear();
    }

    /// Lets `n` more exchanges through, then fails every one after.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    /// Fails every exchange addressed to `reg`.
    pub fn fail_at(&mut self, reg: Register) {
        self.fail_at = Some(reg.addr());
    }

    /// Keeps `CANSTAT` in its current mode when `mode` is requested.
    pub fn refuse_mode(&mut self, mode: OpMode) {
        self.refused = Some(mode);
    }

    /// Leaves `TXREQ` set on every transmission, as if the bus never
    /// acknowledged.
    pub fn hold_tx(&mut self, hold: bool) {
        self.hold_tx = hold;
    }

    /// Flags a bus error on every transmission.
    pub fn tx_error(&mut self, error: bool) {
        self.tx_error = error;
    }

    fn mode(&self) -> u8 {
        self.regs[CANSTAT] >> 5
    }

    fn store(&mut self, addr: usize, value: u8) {
        match addr {
            CANSTAT => {}
            CANCTRL => {
                self.regs[CANCTRL] = value;
                let requested = value >> 5;
                if self.refused.map(|m| m as u8) != Some(requested) {
                    self.regs[CANSTAT] = (self.regs[CANSTAT] & 0x1F) | (requested << 5);
                }
            }
            _ if TXB_CTRL.contains(&addr) => {
                let old = self.regs[addr];
                self.regs[addr] = (old & TX_READ_ONLY) | (value & !TX_READ_ONLY);
                if value & TXREQ != 0 && old & TXREQ == 0 {
                    self.transmit(addr);
                }
            }
            _ => self.regs[addr] = value,
        }
    }

    fn transmit(&mut self, ctrl: usize) {
        let n = (ctrl >> 4) - 3;
        self.regs[ctrl] &= !TX_READ_ONLY;
        if self.tx_error {
            self.regs[ctrl] |= TXERR;
            return;
        }
        let mode = self.mode();
        let sending = mode == OpMode::Normal as u8 || mode == OpMode::Loopback as u8;
        if self.hold_tx || !sending {
            return;
        }
        if mode == OpMode::Loopback as u8 {
            self.loop_back(ctrl);
        }
        self.regs[ctrl] &= !TXREQ;
        self.regs[CANINTF] |= 0b0000_0100 << n;
    }

    fn loop_back(&mut self, tx_ctrl: usize) {
        let intf = self.regs[CANINTF];
        let rollover = self.regs[RXB0CTRL] & 0b0000_0100 != 0;
        let (rx, flag) = if intf & 0b01 == 0 {
            (0, 0b01)
        } else if rollover && intf & 0b10 == 0 {
            (1, 0b10)
        } else {
            self.regs[EFLG] |= 0b0100_0000;
            return;
        };
        let dlc = self.regs[tx_ctrl + 5];
        // Remote frames put no data on the bus.
        let len = if dlc & 0b0100_0000 != 0 {
            5
        } else {
            5 + usize::from(dlc & 0x0F).min(8)
        };
        let src = tx_ctrl + 1;
        self.regs.copy_within(src..src + len, RXB_CTRL[rx] + 1);
        self.regs[CANINTF] |= flag;
    }

    fn status(&self) -> u8 {
        let intf = self.regs[CANINTF];
        let mut status = intf & 0b11;
        for (n, ctrl) in TXB_CTRL.into_iter().enumerate() {
            if self.regs[ctrl] & TXREQ != 0 {
                status |= 0b0100 << (2 * n);
            }
            if intf & (0b0100 << n) != 0 {
                status |= 0b1000 << (2 * n);
            }
        }
        status
    }

    fn rx_status(&self) -> u8 {
        let full = self.regs[CANINTF] & 0b11;
        let shown = match full {
            0 => return 0,
            1 | 3 => RXB_CTRL[0],
            _ => RXB_CTRL[1],
        };
        let sidl = self.regs[shown + 2];
        let dlc = self.regs[shown + 5];
        let extended = sidl & 0b0000_1000 != 0;
        let remote = dlc & 0b0100_0000 != 0 || (!extended && sidl & 0b0001_0000 != 0);
        (full << 6) | (u8::from(extended) << 4) | (u8::from(remote) << 3)
    }
}

impl Default for MockChip {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockChip {
    type Error = MockError;

    fn exchange(
        &mut self,
        instruction: Instruction,
        address: Option<Register>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), MockError> {
        let address = address.map(Register::addr);
        match self.fail_after {
            Some(0) => return Err(MockError),
            Some(n) => self.fail_after = Some(n - 1),
            None => {}
        }
        if address.is_some() && address == self.fail_at {
            return Err(MockError);
        }
        self.exchanges.push(Exchange {
            instruction,
            address,
            tx: tx.to_vec(),
        });

        let start = usize::from(address.unwrap_or(0));
        match instruction {
            Instruction::Reset => self.power_on(),
            Instruction::Read => {
                for (i, byte) in rx.iter_mut().enumerate() {
                    *byte = self.regs[(start + i) & 0x7F];
                }
            }
            Instruction::Write => {
                for (i, byte) in tx.iter().enumerate() {
                    self.store((start + i) & 0x7F, *byte);
                }
            }
            Instruction::BitModify => {
                let (mask, value) = (tx[0], tx[1]);
                let merged = (self.regs[start] & !mask) | (value & mask);
                self.store(start, merged);
            }
            Instruction::ReadStatus => rx.fill(self.status()),
            Instruction::RxStatus => rx.fill(self.rx_status()),
        }
        Ok(())
    }
}
