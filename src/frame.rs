use embedded_hal::can::{ExtendedId, Frame, Id, StandardId};

/// Maximum payload of a classic CAN frame.
pub const MAX_DLC: u8 = 8;

/// CAN frame.
#[derive(Debug, Clone, Copy)]
pub struct CanFrame {
    /// ID of CAN frame.
    pub(crate) id: Id,
    /// Whether the frame is an RTR frame.
    pub(crate) rtr: bool,
    /// Length of data in CAN frame.
    pub(crate) dlc: u8,
    /// Data, maximum 8 bytes.
    pub(crate) data: [u8; 8],
}

impl CanFrame {
    /// Builds a frame from a raw identifier. `extended` selects the 29-bit
    /// identifier space.
    ///
    /// Returns `None` if the identifier does not fit its space or `data` is
    /// longer than 8 bytes.
    pub fn from_raw(identifier: u32, extended: bool, data: &[u8]) -> Option<Self> {
        Self::new(raw_id(identifier, extended)?, data)
    }

    /// Raw identifier value, without any flag bits.
    #[inline]
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }
}

/// Builds an [`Id`] from a raw value, checking it fits 11 or 29 bits.
pub fn raw_id(identifier: u32, extended: bool) -> Option<Id> {
    if extended {
        ExtendedId::new(identifier).map(Id::Extended)
    } else {
        u16::try_from(identifier)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    }
}

impl PartialEq for CanFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.rtr == other.rtr
            && self.dlc == other.dlc
            && self.data() == other.data()
    }
}

impl Eq for CanFrame {}

#[cfg(feature = "defmt")]
impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        // [`Id`] does not implement `defmt::Format`
        #[derive(defmt::Format)]
        enum InnerId {
            Standard(u16),
            Extended(u32),
        }

        defmt::write!(
            fmt,
            "CanFrame {{ id: {:#X}, rtr: {}, dlc: {:#X}, data: {:#X} }}",
            match self.id {
                Id::Standard(id) => InnerId::Standard(id.as_raw()),
                Id::Extended(id) => InnerId::Extended(id.as_raw()),
            },
            self.rtr,
            self.dlc,
            self.data()
        );
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DLC as usize {
            return None;
        }
        let mut frame = CanFrame {
            id: id.into(),
            rtr: false,
            dlc: data.len() as u8, // Already asserted data.len() <= 8
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DLC as usize {
            return None;
        }
        Some(CanFrame {
            id: id.into(),
            rtr: true,
            dlc: dlc as u8, // Already asserted dlc <= 8
            data: [0; 8],
        })
    }

    #[inline]
    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    #[inline]
    fn id(&self) -> Id {
        self.id
    }

    #[inline]
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    #[inline]
    fn data(&self) -> &[u8] {
        // Clamp so a corrupted `dlc` can never index past the payload.
        &self.data[..self.dlc().min(self.data.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ids_are_limited_to_11_bits() {
        assert!(CanFrame::from_raw(0x7FF, false, &[]).is_some());
        assert!(CanFrame::from_raw(0x800, false, &[]).is_none());
        assert!(CanFrame::from_raw(0x1FFF_FFFF, true, &[]).is_some());
        assert!(CanFrame::from_raw(0x2000_0000, true, &[]).is_none());
    }

    #[test]
    fn payload_is_limited_to_8_bytes() {
        assert!(CanFrame::from_raw(1, false, &[0; 9]).is_none());
        assert!(CanFrame::new_remote(StandardId::ZERO, 9).is_none());
        let frame = CanFrame::from_raw(1, false, &[1, 2, 3]).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert_eq!(frame.dlc(), 3);
    }

    #[test]
    fn equality_ignores_bytes_past_dlc() {
        let a = CanFrame::from_raw(0x10, false, &[1, 2]).unwrap();
        let mut b = a;
        b.data[5] = 0xFF;
        assert_eq!(a, b);
        b.data[1] = 0xFF;
        assert_ne!(a, b);
    }

    #[test]
    fn raw_id_round_trips() {
        let frame = CanFrame::from_raw(0x1ABC_DEF0, true, &[]).unwrap();
        assert!(frame.is_extended());
        assert_eq!(frame.raw_id(), 0x1ABC_DEF0);
    }
}
