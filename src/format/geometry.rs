/// Disk geometry and logical sector addressing
use crate::error::{DiskError, Result};

/// Linear sector number for a (track, side, sector) triple.
///
/// `LSN = track * sides * spt + side * spt + sector`
#[inline]
pub fn lsn_from_chs(sides: u8, sectors_per_track: u8, track: u8, side: u8, sector: u8) -> u32 {
    let sides = sides as u32;
    let spt = sectors_per_track as u32;
    track as u32 * sides * spt + side as u32 * spt + sector as u32
}

/// Inverse of [`lsn_from_chs`]. Returns `(track, side, sector)`.
#[inline]
pub fn chs_from_lsn(sides: u8, sectors_per_track: u8, lsn: u32) -> (u32, u8, u8) {
    let spt = sectors_per_track.max(1) as u32;
    let per_cylinder = spt * sides.max(1) as u32;
    let track = lsn / per_cylinder;
    let side = (lsn % per_cylinder) / spt;
    let sector = (lsn % per_cylinder) % spt;
    (track, side as u8, sector as u8)
}

/// Nominal geometry of a disk image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of sides (1 or 2)
    pub sides: u8,
    /// Number of tracks per side
    pub tracks: u8,
    /// Sectors per track
    pub sectors_per_track: u8,
    /// Sector size in bytes
    pub sector_size: u16,
    /// ID of the first sector on each track
    pub first_sector_id: u8,
    /// Filler byte for formatting
    pub filler_byte: u8,
    /// GAP#3 length
    pub gap3_length: u8,
}

impl Geometry {
    /// Create a geometry with sector IDs starting at 1 and 0xE5 filler
    pub fn new(tracks: u8, sides: u8, sectors_per_track: u8, sector_size: u16) -> Self {
        Self {
            sides,
            tracks,
            sectors_per_track,
            sector_size,
            first_sector_id: 1,
            filler_byte: 0xE5,
            gap3_length: 0x4E,
        }
    }

    /// Same geometry with a different first sector ID
    pub fn with_first_sector_id(mut self, id: u8) -> Self {
        self.first_sector_id = id;
        self
    }

    /// Same geometry with a different filler byte
    pub fn with_filler(mut self, filler: u8) -> Self {
        self.filler_byte = filler;
        self
    }

    /// Dragon DragonDOS single sided, 40 tracks
    pub fn dragon_ss40() -> Self {
        Self::new(40, 1, 18, 256)
    }

    /// Dragon DragonDOS single sided, 80 tracks
    pub fn dragon_ss80() -> Self {
        Self::new(80, 1, 18, 256)
    }

    /// Dragon DragonDOS double sided, 40 tracks
    pub fn dragon_ds40() -> Self {
        Self::new(40, 2, 18, 256)
    }

    /// Dragon DragonDOS double sided, 80 tracks
    pub fn dragon_ds80() -> Self {
        Self::new(80, 2, 18, 256)
    }

    /// Tandy CoCo 35 track disk
    pub fn coco_35() -> Self {
        Self::new(35, 1, 18, 256)
    }

    /// PC 360K (40 tracks, 2 sides, 9 x 512)
    pub fn pc_360k() -> Self {
        Self::new(40, 2, 9, 512).with_filler(0xF6)
    }

    /// PC 720K (80 tracks, 2 sides, 9 x 512)
    pub fn pc_720k() -> Self {
        Self::new(80, 2, 9, 512).with_filler(0xF6)
    }

    /// PC 1.44M (80 tracks, 2 sides, 18 x 512)
    pub fn pc_1440k() -> Self {
        Self::new(80, 2, 18, 512).with_filler(0xF6)
    }

    /// Acorn DFS single sided 40 track (.ssd)
    pub fn acorn_ssd40() -> Self {
        Self::new(40, 1, 10, 256).with_first_sector_id(0)
    }

    /// Acorn DFS single sided 80 track (.ssd)
    pub fn acorn_ssd80() -> Self {
        Self::new(80, 1, 10, 256).with_first_sector_id(0)
    }

    /// SWTPC DOS68 5.25" 35 track disk
    pub fn dos68_35() -> Self {
        Self::new(35, 1, 18, 128).with_first_sector_id(0)
    }

    /// SWTPC DOS68 5.25" 40 track disk
    pub fn dos68_40() -> Self {
        Self::new(40, 1, 18, 128).with_first_sector_id(0)
    }

    /// SWTPC DOS68 8" 77 track disk
    pub fn dos68_77() -> Self {
        Self::new(77, 1, 18, 128).with_first_sector_id(0)
    }

    /// Logical sector number of a (track, side, sector index)
    #[inline]
    pub fn lsn(&self, track: u8, side: u8, sector: u8) -> u32 {
        lsn_from_chs(self.sides, self.sectors_per_track, track, side, sector)
    }

    /// (track, side, sector index) of a logical sector number
    pub fn chs(&self, lsn: u32) -> Result<(u8, u8, u8)> {
        if lsn >= self.total_sectors() {
            return Err(DiskError::geometry(format!(
                "LSN {} beyond last sector {}",
                lsn,
                self.total_sectors().saturating_sub(1)
            )));
        }
        let (track, side, sector) = chs_from_lsn(self.sides, self.sectors_per_track, lsn);
        Ok((track as u8, side, sector))
    }

    /// Total number of sectors on the disk
    #[inline]
    pub fn total_sectors(&self) -> u32 {
        self.sides as u32 * self.tracks as u32 * self.sectors_per_track as u32
    }

    /// Bytes in one track
    #[inline]
    pub fn track_size(&self) -> usize {
        self.sectors_per_track as usize * self.sector_size as usize
    }

    /// Bytes in the whole disk
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_sectors() as usize * self.sector_size as usize
    }

    /// FDC size code (`sector_size == 128 << code`)
    pub fn size_code(&self) -> Option<u8> {
        crate::format::bytes_to_fdc_size(self.sector_size as usize)
    }

    /// Reject geometries no supported container can describe
    pub fn validate(&self) -> Result<()> {
        if self.sides == 0 || self.sides > 2 {
            return Err(DiskError::geometry(format!("{} sides", self.sides)));
        }
        if self.tracks == 0 || self.sectors_per_track == 0 {
            return Err(DiskError::geometry("empty disk"));
        }
        match self.size_code() {
            Some(code) if code <= 6 => Ok(()),
            _ => Err(DiskError::geometry(format!(
                "sector size {} is not 128 << n",
                self.sector_size
            ))),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::dragon_ss40()
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tracks, {} side(s), {} sectors of {} bytes",
            self.tracks, self.sides, self.sectors_per_track, self.sector_size
        )
    }
}
