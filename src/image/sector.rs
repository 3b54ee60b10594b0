/// Sector data structures

use crate::fdc::{FdcStatus1, FdcStatus2};
use crate::format::constants::fdc_size_to_bytes;

/// Sector ID (CHRN) as recorded in the sector's address field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorId {
    /// C - Cylinder/Track number
    pub track: u8,
    /// H - Head/Side number
    pub side: u8,
    /// R - Sector ID/Record number
    pub sector: u8,
    /// N - Size code (0=128, 1=256, 2=512, 3=1024, ...)
    pub size_code: u8,
}

impl SectorId {
    /// Create a new sector ID
    pub fn new(track: u8, side: u8, sector: u8, size_code: u8) -> Self {
        Self {
            track,
            side,
            sector,
            size_code,
        }
    }

    /// Declared sector size in bytes
    pub fn size_bytes(&self) -> usize {
        fdc_size_to_bytes(self.size_code)
    }
}

/// What a sector's content looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorStatus {
    /// No data was recorded for the sector
    Unavailable,
    /// Contains only the track filler byte
    Filler,
    /// Contains a single repeated byte other than the filler
    OddFiller,
    /// Contains data
    InUse,
}

impl std::fmt::Display for SectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectorStatus::Unavailable => write!(f, "Unavailable"),
            SectorStatus::Filler => write!(f, "Filler"),
            SectorStatus::OddFiller => write!(f, "Odd Filler"),
            SectorStatus::InUse => write!(f, "In Use"),
        }
    }
}

/// A disk sector and its controller flags
///
/// The stored data may be longer than the declared size when several
/// copies of a weak sector were captured, or empty when the source
/// recorded no data at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sector {
    /// Address field (CHRN)
    pub id: SectorId,
    /// FDC Status Register 1
    pub fdc_status1: FdcStatus1,
    /// FDC Status Register 2
    pub fdc_status2: FdcStatus2,
    data: Vec<u8>,
}

impl Sector {
    /// Create a sector of its declared size filled with `filler`
    pub fn new(id: SectorId, filler: u8) -> Self {
        let size = id.size_bytes();
        Self::with_data(id, vec![filler; size])
    }

    /// Create a sector with specific data
    pub fn with_data(id: SectorId, data: Vec<u8>) -> Self {
        Self::with_status(id, FdcStatus1::default(), FdcStatus2::default(), data)
    }

    /// Create a sector with FDC status
    pub fn with_status(
        id: SectorId,
        fdc_status1: FdcStatus1,
        fdc_status2: FdcStatus2,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id,
            fdc_status1,
            fdc_status2,
            data,
        }
    }

    /// Stored bytes (all copies for weak sectors)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable stored bytes
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Replace the stored bytes
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Declared size from the size code
    pub fn declared_size(&self) -> usize {
        self.id.size_bytes()
    }

    /// Number of stored bytes
    pub fn data_length(&self) -> usize {
        self.data.len()
    }

    /// Number of stored copies; 0 when no data was recorded
    pub fn copies(&self) -> usize {
        if self.data.is_empty() {
            0
        } else {
            (self.data.len() / self.declared_size()).max(1)
        }
    }

    /// More than one copy is stored
    pub fn is_weak(&self) -> bool {
        self.copies() > 1
    }

    /// Any FDC error flag is set
    pub fn has_error(&self) -> bool {
        self.fdc_status1.has_error() || self.fdc_status2.has_error()
    }

    /// Written with a deleted data address mark
    pub fn is_deleted(&self) -> bool {
        self.fdc_status2.is_deleted()
    }

    /// Classify the sector content against the track filler
    pub fn status(&self, filler_byte: u8) -> SectorStatus {
        let Some(&first) = self.data.first() else {
            return SectorStatus::Unavailable;
        };
        if self.data.iter().any(|&b| b != first) {
            SectorStatus::InUse
        } else if first == filler_byte {
            SectorStatus::Filler
        } else {
            SectorStatus::OddFiller
        }
    }

    /// The sector holds something other than the filler byte
    pub fn in_use(&self, filler_byte: u8) -> bool {
        matches!(self.status(filler_byte), SectorStatus::InUse | SectorStatus::OddFiller)
    }

    /// Fill every stored byte with `byte`
    pub fn fill(&mut self, byte: u8) {
        self.data.fill(byte);
    }

    /// Resize the stored data
    pub fn resize(&mut self, new_size: usize, fill_byte: u8) {
        self.data.resize(new_size, fill_byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_id_size() {
        assert_eq!(SectorId::new(0, 0, 1, 1).size_bytes(), 256);
        assert_eq!(SectorId::new(0, 0, 1, 0).size_bytes(), 128);
    }

    #[test]
    fn test_new_sector_filled() {
        let sector = Sector::new(SectorId::new(3, 0, 5, 1), 0xE5);
        assert_eq!(sector.data_length(), 256);
        assert_eq!(sector.copies(), 1);
        assert_eq!(sector.status(0xE5), SectorStatus::Filler);
        assert!(!sector.in_use(0xE5));
    }

    #[test]
    fn test_weak_sector_copies() {
        let sector = Sector::with_data(SectorId::new(0, 0, 2, 2), vec![0x11; 512 * 3]);
        assert_eq!(sector.copies(), 3);
        assert!(sector.is_weak());
        assert_eq!(sector.status(0xE5), SectorStatus::OddFiller);
    }

    #[test]
    fn test_unavailable_sector() {
        let sector = Sector::with_data(SectorId::new(0, 0, 1, 1), Vec::new());
        assert_eq!(sector.copies(), 0);
        assert_eq!(sector.status(0xE5), SectorStatus::Unavailable);
    }

    #[test]
    fn test_error_and_deleted_flags() {
        let sector = Sector::with_status(
            SectorId::new(0, 0, 1, 1),
            FdcStatus1::new(FdcStatus1::DE),
            FdcStatus2::new(FdcStatus2::CM | FdcStatus2::DD),
            vec![0; 256],
        );
        assert!(sector.has_error());
        assert!(sector.is_deleted());
    }

    #[test]
    fn test_in_use() {
        let mut sector = Sector::new(SectorId::new(0, 0, 1, 0), 0xE5);
        sector.data_mut()[10] = 0x42;
        assert_eq!(sector.status(0xE5), SectorStatus::InUse);
        sector.fill(0xE5);
        assert!(!sector.in_use(0xE5));
    }
}
