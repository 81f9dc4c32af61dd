//! Conversion between [`CanFrame`] and the chip's buffer register layout.
//!
//! Transmit buffers, receive buffers, filters and masks all store an
//! identifier in four consecutive registers, `SIDH`, `SIDL`, `EID8`, `EID0`:
//!
//! ```text
//! SIDH  SID10 SID9 SID8 SID7 SID6 SID5 SID4 SID3
//! SIDL  SID2  SID1 SID0 SRR  EXIDE  -  EID17 EID16
//! EID8  EID15 ...                          EID8
//! EID0  EID7  ...                          EID0
//! ```
//!
//! A standard identifier fills `SID`. An extended identifier puts its upper
//! 11 bits in `SID` and its lower 18 bits in `EID`, with `EXIDE` set. Buffers
//! follow the identifier with `DLC` (length in bits 3:0, RTR in bit 6) and up
//! to 8 data bytes.

use embedded_hal::can::{ExtendedId, Frame, Id, StandardId};
use modular_bitfield::prelude::*;

use crate::{
    error::FrameError,
    frame::{CanFrame, MAX_DLC},
};

/// Registers from `SIDH` to `DLC`.
pub const HEADER_LEN: usize = 5;
/// Header plus a full payload.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_DLC as usize;

/// Identifier registers.
///
/// Bytes are packed least significant first, i.e. `[EID0, EID8, SIDL, SIDH]`.
/// Use [`IdentRegs::to_chip_order`] for the order the registers are addressed
/// in.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IdentRegs {
    /// Extended identifier.
    pub eid: B18,
    #[skip]
    __: B1,
    /// Extended identifier enable.
    pub exide: bool,
    /// Standard remote request. Only ever set by the chip, in receive buffers.
    pub srr: bool,
    /// Standard identifier.
    pub sid: B11,
}

impl IdentRegs {
    /// Packs a CAN bus ID.
    pub fn from_id(id: Id) -> Self {
        match id {
            Id::Standard(id) => IdentRegs::new().with_exide(false).with_sid(id.as_raw()),
            Id::Extended(id) => IdentRegs::new()
                .with_exide(true)
                .with_eid(id.as_raw() & 0x3FFFF) // Lower 18 bits in EID
                .with_sid((id.as_raw() >> 18) as u16), // Upper 11 bits in SID
        }
    }

    /// Unpacks the CAN bus ID.
    pub fn id(&self) -> Id {
        if self.exide() {
            let raw = (u32::from(self.sid()) << 18) | self.eid();
            // 11 + 18 bits always fit a 29-bit identifier.
            Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::MAX))
        } else {
            Id::Standard(StandardId::new(self.sid()).unwrap_or(StandardId::MAX))
        }
    }

    /// `[SIDH, SIDL, EID8, EID0]`.
    pub fn to_chip_order(self) -> [u8; 4] {
        let mut bytes = self.into_bytes();
        bytes.reverse();
        bytes
    }

    /// Inverse of [`IdentRegs::to_chip_order`].
    pub fn from_chip_order(mut bytes: [u8; 4]) -> Self {
        bytes.reverse();
        Self::from_bytes(bytes)
    }
}

/// Data length code register.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DlcReg {
    /// Size of data packet. Only 0-8 are accepted here.
    pub dlc: B4,
    #[skip]
    __: B2,
    /// Remote transmission request.
    pub rtr: bool,
    #[skip]
    __: B1,
}

/// Decoded `SIDH`..`DLC` registers of a buffer, before the payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: Id,
    pub rtr: bool,
    pub dlc: u8,
}

impl FrameHeader {
    /// Number of data bytes that follow the header on the wire. Remote
    /// frames carry none, whatever their DLC says.
    #[inline]
    pub fn payload_len(&self) -> usize {
        if self.rtr {
            0
        } else {
            self.dlc as usize
        }
    }

    /// Attaches the payload. `data` must hold at least
    /// [`payload_len`](Self::payload_len) bytes; a remote frame ignores it
    /// and reads back as zeroes.
    pub fn into_frame(self, data: &[u8]) -> Result<CanFrame, FrameError> {
        let len = self.payload_len();
        let payload = data.get(..len).ok_or(FrameError::Truncated(HEADER_LEN + data.len()))?;
        let mut frame = CanFrame {
            id: self.id,
            rtr: self.rtr,
            dlc: self.dlc,
            data: [0; 8],
        };
        frame.data[..len].copy_from_slice(payload);
        Ok(frame)
    }
}

/// Register image of a frame, ready to be written from `TXBnSIDH` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl EncodedFrame {
    /// Header plus `dlc` data bytes, or the header alone for a remote frame.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Packs the identifier and DLC registers of a frame.
pub fn encode_header(frame: &CanFrame) -> Result<[u8; HEADER_LEN], FrameError> {
    if frame.dlc > MAX_DLC {
        return Err(FrameError::TooLong(frame.dlc));
    }
    let ident = IdentRegs::from_id(frame.id).to_chip_order();
    let dlc = DlcReg::new().with_dlc(frame.dlc).with_rtr(frame.rtr);
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&ident);
    header[4] = dlc.into_bytes()[0];
    Ok(header)
}

/// Encodes a frame into transmit buffer register order: `SIDH`, `SIDL`,
/// `EID8`, `EID0`, `DLC`, then `dlc` data bytes. Remote frames stop after
/// `DLC`.
pub fn encode(frame: &CanFrame) -> Result<EncodedFrame, FrameError> {
    let header = encode_header(frame)?;
    let mut bytes = [0u8; MAX_FRAME_LEN];
    bytes[..HEADER_LEN].copy_from_slice(&header);
    let data = if frame.rtr { &[][..] } else { frame.data() };
    bytes[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);
    Ok(EncodedFrame {
        bytes,
        len: HEADER_LEN + data.len(),
    })
}

/// Unpacks the identifier and DLC registers of a buffer.
pub fn decode_header(bytes: [u8; HEADER_LEN]) -> Result<FrameHeader, FrameError> {
    let ident = IdentRegs::from_chip_order([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let dlc = DlcReg::from_bytes([bytes[4]]);
    if dlc.dlc() > MAX_DLC {
        return Err(FrameError::InvalidDlc(dlc.dlc()));
    }
    // The chip flags standard remote frames through SRR rather than the DLC
    // register's RTR bit.
    let rtr = dlc.rtr() || (!ident.exide() && ident.srr());
    Ok(FrameHeader {
        id: ident.id(),
        rtr,
        dlc: dlc.dlc(),
    })
}

/// Decodes a buffer register image, laid out as produced by [`encode`].
///
/// Bytes beyond the header and `dlc` data bytes are ignored.
pub fn decode(bytes: &[u8]) -> Result<CanFrame, FrameError> {
    let header: [u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(FrameError::Truncated(bytes.len()))?;
    let header = decode_header(header)?;
    header
        .into_frame(&bytes[HEADER_LEN..])
        .map_err(|_| FrameError::Truncated(bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, extended: bool, data: &[u8]) -> CanFrame {
        CanFrame::from_raw(id, extended, data).unwrap()
    }

    #[test]
    fn standard_id_layout() {
        let bytes = encode(&frame(0x123, false, &[0xAA])).unwrap();
        // 0x123 = 001_0010_0011: SIDH = 0010_0100, SIDL = 011_00000
        assert_eq!(bytes.as_bytes(), &[0x24, 0x60, 0x00, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn extended_id_layout() {
        let bytes = encode(&frame(0x1234_5678, true, &[])).unwrap();
        // SID = 0x48D (id >> 18), EID = 0x05678 | (0b00 << 16)
        // SIDH = 0x48D >> 3 = 0x91, SIDL = (0x48D & 7) << 5 | EXIDE | eid[17:16]
        assert_eq!(bytes.as_bytes(), &[0x91, 0xA8, 0x56, 0x78, 0x00]);
    }

    #[test]
    fn rtr_lives_in_dlc_bit_6() {
        let remote = CanFrame::new_remote(StandardId::new(0x7FF).unwrap(), 4).unwrap();
        let bytes = encode(&remote).unwrap();
        assert_eq!(bytes.as_bytes(), &[0xFF, 0xE0, 0x00, 0x00, 0x44]);
        assert_eq!(decode(bytes.as_bytes()).unwrap(), remote);
    }

    #[test]
    fn remote_frame_ignores_trailing_data_bytes() {
        let bytes = [0x24, 0x60, 0x00, 0x00, 0x43, 0xAA, 0xBB, 0xCC];
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.is_remote_frame());
        assert_eq!(decoded.data(), &[0, 0, 0]);
        assert_eq!(
            decoded,
            CanFrame::new_remote(StandardId::new(0x123).unwrap(), 3).unwrap()
        );

        let header = decode_header([0x24, 0x60, 0x00, 0x00, 0x43]).unwrap();
        assert_eq!(header.payload_len(), 0);
        assert_eq!(header.into_frame(&[]).unwrap(), decoded);
    }

    #[test]
    fn every_standard_id_round_trips() {
        let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        for id in 0..(1u32 << 11) {
            let len = (id % 9) as usize;
            let original = frame(id, false, &data[..len]);
            let bytes = encode(&original).unwrap();
            assert_eq!(bytes.as_bytes().len(), HEADER_LEN + len);
            assert_eq!(decode(bytes.as_bytes()).unwrap(), original, "id {:#x}", id);
        }
    }

    #[test]
    fn extended_ids_round_trip() {
        // Walk every bit position plus a spread of mixed values.
        let mut ids = std::vec::Vec::new();
        for bit in 0..29 {
            ids.push(1u32 << bit);
            ids.push(0x1FFF_FFFF ^ (1u32 << bit));
        }
        ids.extend((0..(1u32 << 29)).step_by(104_729).take(5000));
        ids.push(0);
        ids.push(0x1FFF_FFFF);
        for (n, id) in ids.into_iter().enumerate() {
            let len = n % 9;
            let original = frame(id, true, &[0xC3; 8][..len]);
            let decoded = decode(encode(&original).unwrap().as_bytes()).unwrap();
            assert_eq!(decoded, original, "id {:#x}", id);
        }
    }

    #[test]
    fn encode_rejects_long_frames() {
        let mut bad = frame(1, false, &[]);
        bad.dlc = 9;
        assert_eq!(encode(&bad), Err(FrameError::TooLong(9)));
    }

    #[test]
    fn decode_rejects_invalid_dlc() {
        let bytes = [0x24, 0x60, 0x00, 0x00, 0x0F, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode(&bytes), Err(FrameError::InvalidDlc(15)));
        assert_eq!(
            decode_header([0, 0, 0, 0, 0x49]),
            Err(FrameError::InvalidDlc(9))
        );
    }

    #[test]
    fn decode_rejects_short_input() {
        assert_eq!(decode(&[0x24, 0x60]), Err(FrameError::Truncated(2)));
        // DLC says 3 but only 2 data bytes follow.
        assert_eq!(
            decode(&[0x24, 0x60, 0x00, 0x00, 0x03, 1, 2]),
            Err(FrameError::Truncated(7))
        );
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let bytes = [0x24, 0x60, 0x00, 0x00, 0x01, 0xAA, 0xBB, 0xCC];
        assert_eq!(decode(&bytes).unwrap().data(), &[0xAA]);
    }

    #[test]
    fn received_standard_remote_frame_uses_srr() {
        // SIDL with SRR (bit 4) set, DLC RTR clear.
        let header = decode_header([0x24, 0x70, 0x00, 0x00, 0x00]).unwrap();
        assert!(header.rtr);
        assert_eq!(header.id, Id::Standard(StandardId::new(0x123).unwrap()));
    }
}
