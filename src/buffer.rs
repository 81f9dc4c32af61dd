//! Transmit and receive buffers, and the policy for picking one.

use crate::{
    channel::RegisterChannel,
    error::{Error, Result},
    regs::{CanIntf, Register, TxbCtrl},
    stat::Status,
    transport::Transport,
};

/// Registers of one Tx buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxBufRegs {
    /// `TXBnCTRL`.
    pub ctrl: Register,
    /// `TXBnSIDH`, first register of the frame image. Header and data are
    /// written from here in one sequential write.
    pub sidh: Register,
}

/// Registers of one Rx buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxBufRegs {
    /// `RXBnCTRL`.
    pub ctrl: Register,
    /// `RXBnSIDH`, first register of the frame image.
    pub sidh: Register,
    /// `RXBnD0`.
    pub data: Register,
    /// Interrupt flag raised while the buffer holds a frame.
    pub intf: CanIntf,
}

crate::resource_def! {
    /// Transmit buffer. Lower index means higher priority when picking a free
    /// buffer.
    TxBuf(TxBufRegs) => {
        /// Tx buffer 0.
        B0 = 0 => TxBufRegs {
            ctrl: Register::TXB0CTRL,
            sidh: Register::TXB0SIDH,
        },
        /// Tx buffer 1.
        B1 = 1 => TxBufRegs {
            ctrl: Register::TXB1CTRL,
            sidh: Register::TXB1SIDH,
        },
        /// Tx buffer 2.
        B2 = 2 => TxBufRegs {
            ctrl: Register::TXB2CTRL,
            sidh: Register::TXB2SIDH,
        }
    }
}

crate::resource_def! {
    /// Receive buffer.
    RxBuf(RxBufRegs) => {
        /// Rx buffer 0.
        B0 = 0 => RxBufRegs {
            ctrl: Register::RXB0CTRL,
            sidh: Register::RXB0SIDH,
            data: Register::RXB0DATA,
            intf: CanIntf::MASK_RX0IF,
        },
        /// Rx buffer 1.
        B1 = 1 => RxBufRegs {
            ctrl: Register::RXB1CTRL,
            sidh: Register::RXB1SIDH,
            data: Register::RXB1DATA,
            intf: CanIntf::MASK_RX1IF,
        }
    }
}

impl RxBuf {
    /// Whether `status` reports this buffer as full.
    #[inline]
    pub fn is_full(self, status: &Status) -> bool {
        match self {
            RxBuf::B0 => status.rx0if(),
            RxBuf::B1 => status.rx1if(),
        }
    }
}

/// Tracks which Tx buffers the chip last reported busy and picks buffers for
/// sending and receiving.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferAllocator {
    busy: [bool; 3],
}

impl BufferAllocator {
    pub const fn new() -> Self {
        Self { busy: [false; 3] }
    }

    /// Tx buffers seen with a transmission pending, as of the last scan or
    /// send.
    pub fn busy(&self) -> [bool; 3] {
        self.busy
    }

    /// Reads the `CTRL` register of a Tx buffer.
    pub fn read_ctrl<T: Transport>(
        channel: &mut RegisterChannel<T>,
        buf: TxBuf,
    ) -> Result<TxbCtrl, T::Error> {
        channel
            .read_register(buf.registers().ctrl)
            .map(|b| TxbCtrl::from_bytes([b]))
    }

    /// Finds a free Tx buffer, scanning `TXB0`, `TXB1`, `TXB2` in that order.
    ///
    /// Every buffer up to and including the free one is read, so the
    /// recorded busy set is refreshed along the way.
    pub fn acquire_tx_buffer<T: Transport>(
        &mut self,
        channel: &mut RegisterChannel<T>,
    ) -> Result<TxBuf, T::Error> {
        for buf in TxBuf::ALL {
            let ctrl = Self::read_ctrl(channel, buf)?;
            self.busy[buf.index()] = ctrl.txreq();
            if !ctrl.txreq() {
                return Ok(buf);
            }
        }
        Err(Error::AllBuffersBusy)
    }

    /// Records that a transmission was requested on `buf`.
    pub fn mark_busy(&mut self, buf: TxBuf) {
        self.busy[buf.index()] = true;
    }

    /// Records the `TXREQ` state read back from `buf`.
    pub fn record(&mut self, buf: TxBuf, ctrl: TxbCtrl) {
        self.busy[buf.index()] = ctrl.txreq();
    }

    /// Forgets every recorded transmission, e.g. after a reset.
    pub fn clear(&mut self) {
        self.busy = [false; 3];
    }

    /// The Rx buffer to read next: `RXB0` if full, else `RXB1` if full.
    pub fn pending_rx_buffer(status: &Status) -> Option<RxBuf> {
        RxBuf::ALL.into_iter().find(|buf| buf.is_full(status))
    }
}
