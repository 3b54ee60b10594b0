/// Floppy controller status flags carried by recorded sectors
///
/// EDSK stores both status registers verbatim. IMD only records
/// "deleted" and "read error", which map onto CM and DE/DD.
use std::fmt;

/// FDC Status Register 1 (ST1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdcStatus1(pub u8);

impl FdcStatus1 {
    /// End of Cylinder (EN) - bit 7
    pub const EN: u8 = 0x80;
    /// Data Error (DE) - bit 5, CRC error in the ID or data field
    pub const DE: u8 = 0x20;
    /// Overrun (OR) - bit 4
    pub const OR: u8 = 0x10;
    /// No Data (ND) - bit 2
    pub const ND: u8 = 0x04;
    /// Not Writable (NW) - bit 1
    pub const NW: u8 = 0x02;
    /// Missing Address Mark (MA) - bit 0
    pub const MA: u8 = 0x01;

    const NAMES: [(u8, &'static str); 6] = [
        (Self::EN, "EN"),
        (Self::DE, "DE"),
        (Self::OR, "OR"),
        (Self::ND, "ND"),
        (Self::NW, "NW"),
        (Self::MA, "MA"),
    ];

    /// Wrap a raw register value
    #[inline]
    pub fn new(value: u8) -> Self {
        FdcStatus1(value)
    }

    /// CRC error flagged
    #[inline]
    pub fn data_error(&self) -> bool {
        self.0 & Self::DE != 0
    }

    /// Any flag set
    #[inline]
    pub fn has_error(&self) -> bool {
        self.0 != 0
    }
}

/// FDC Status Register 2 (ST2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdcStatus2(pub u8);

impl FdcStatus2 {
    /// Control Mark (CM) - bit 6, deleted data address mark
    pub const CM: u8 = 0x40;
    /// Data Error in Data Field (DD) - bit 5
    pub const DD: u8 = 0x20;
    /// Wrong Cylinder (WC) - bit 4
    pub const WC: u8 = 0x10;
    /// Bad Cylinder (BC) - bit 1
    pub const BC: u8 = 0x02;
    /// Missing Address Mark in Data Field (MD) - bit 0
    pub const MD: u8 = 0x01;

    const NAMES: [(u8, &'static str); 5] = [
        (Self::CM, "CM"),
        (Self::DD, "DD"),
        (Self::WC, "WC"),
        (Self::BC, "BC"),
        (Self::MD, "MD"),
    ];

    /// Wrap a raw register value
    #[inline]
    pub fn new(value: u8) -> Self {
        FdcStatus2(value)
    }

    /// Deleted data address mark
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.0 & Self::CM != 0
    }

    /// CRC error in the data field
    #[inline]
    pub fn data_field_error(&self) -> bool {
        self.0 & Self::DD != 0
    }

    /// Any flag other than the deleted mark
    #[inline]
    pub fn has_error(&self) -> bool {
        self.0 & !Self::CM != 0
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, value: u8, names: &[(u8, &str)]) -> fmt::Result {
    if value == 0 {
        return write!(f, "OK");
    }
    let flags: Vec<&str> = names
        .iter()
        .filter(|(bit, _)| value & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    write!(f, "{}", flags.join("|"))
}

impl fmt::Display for FdcStatus1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_flags(f, self.0, &Self::NAMES)
    }
}

impl fmt::Display for FdcStatus2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_flags(f, self.0, &Self::NAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status1_flags() {
        let st1 = FdcStatus1(FdcStatus1::EN | FdcStatus1::DE);
        assert!(st1.data_error());
        assert!(st1.has_error());
        assert!(!FdcStatus1::default().has_error());
    }

    #[test]
    fn test_deleted_is_not_an_error() {
        let st2 = FdcStatus2(FdcStatus2::CM);
        assert!(st2.is_deleted());
        assert!(!st2.has_error());
        assert!(FdcStatus2(FdcStatus2::DD).data_field_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(FdcStatus1(0x80 | 0x04).to_string(), "EN|ND");
        assert_eq!(FdcStatus1(0).to_string(), "OK");
        assert_eq!(FdcStatus2(0x40 | 0x02).to_string(), "CM|BC");
    }
}
