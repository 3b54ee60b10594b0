/// In-memory disk image model shared by every container format

/// Image builder for creating blank images
pub mod builder;
/// Disk side structure
pub mod disk;
/// Sector definition and status
pub mod sector;
/// Track definition and data rate
pub mod track;

pub use builder::DiskImageBuilder;
pub use disk::Disk;
pub use sector::{Sector, SectorId, SectorStatus};
pub use track::{DataRate, RecordingMode, Track};

use crate::error::{DiskError, Result};
use crate::format::{DiskImageFormat, Geometry};
use log::{debug, warn};
use std::path::Path;

/// Container details that the sector model does not capture, kept so that
/// saving an image in its own format reproduces its header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatData {
    /// Headerless dump
    Raw,
    /// EDSK disk information block fields
    Edsk {
        /// "EXTENDED" signature rather than "MV - CPC"
        extended: bool,
        /// 14-byte creator string
        creator: [u8; 14],
    },
    /// IMD signature line and comment, everything before the 0x1A terminator
    Imd {
        /// Raw header and comment bytes
        comment: Vec<u8>,
    },
    /// JVC header
    Jvc {
        /// Header length as found (file size mod 256)
        header_len: usize,
        /// Sector attribute flag (header byte 4)
        attribute_flag: u8,
        /// Header bytes beyond the five defined fields
        extra: Vec<u8>,
        /// Per-sector attribute bytes in LSN order when the flag is set
        attributes: Vec<u8>,
    },
    /// VDK header
    Vdk {
        /// Format version
        version: u8,
        /// Backwards compatibility version
        compat: u8,
        /// Identity of the program that wrote the file
        source_id: u8,
        /// Version of that program
        source_version: u8,
        /// Write protect and lock flags
        flags: u8,
        /// Disk name
        name: Vec<u8>,
        /// Header bytes between the name and the data
        extra: Vec<u8>,
    },
}

/// Summary of one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    /// Physical track number
    pub track_number: u8,
    /// Physical side number
    pub side_number: u8,
    /// Track was formatted
    pub formatted: bool,
    /// Number of sectors on the track
    pub sectors_num: usize,
    /// Sum of declared sector sizes
    pub data_size: usize,
}

/// Summary of one sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorInfo {
    /// Address field
    pub id: SectorId,
    /// Size from the size code
    pub declared_size: usize,
    /// Stored bytes
    pub data_length: usize,
    /// Any FDC error flag set
    pub has_errors: bool,
    /// Deleted data address mark
    pub is_deleted: bool,
    /// Several copies stored
    pub is_weak: bool,
    /// Number of stored copies
    pub copies: usize,
    /// Holds something other than the filler byte
    pub in_use: bool,
}

/// A disk image: one [`Disk`] per side plus its container format
#[derive(Debug, Clone)]
pub struct DiskImage {
    pub(crate) format: DiskImageFormat,
    pub(crate) geometry: Geometry,
    pub(crate) disks: Vec<Disk>,
    pub(crate) metadata: FormatData,
    pub(crate) changed: bool,
    pub(crate) filename: Option<String>,
}

impl DiskImage {
    /// Open an image, trying each registered codec in turn
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::io::ImageRegistry::default().load(path)
    }

    /// Open an image with one specific codec
    pub fn open_as<P: AsRef<Path>>(format: DiskImageFormat, path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut image = crate::io::codec_for(format).decode(&bytes)?;
        image.filename = Some(path.display().to_string());
        Ok(image)
    }

    /// Decode an in-memory image, trying each registered codec in turn
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        crate::io::ImageRegistry::default().load_bytes(bytes)
    }

    /// Create a blank image of the given container format
    pub fn create(format: DiskImageFormat, geometry: Geometry) -> Result<Self> {
        crate::io::codec_for(format).create(&geometry)
    }

    /// Create a new builder for constructing blank images
    pub fn builder() -> DiskImageBuilder {
        DiskImageBuilder::new()
    }

    /// Build an image from per-side track lists, deriving the nominal
    /// geometry from the first formatted track
    pub(crate) fn from_disks(
        format: DiskImageFormat,
        mut disks: Vec<Disk>,
        metadata: FormatData,
    ) -> Result<Self> {
        if disks.is_empty() || disks.len() > 2 {
            return Err(DiskError::invalid_format(format!("{} sides", disks.len())));
        }
        let tracks = disks.iter().map(|d| d.track_count()).max().unwrap_or(0);
        if tracks == 0 || tracks > u8::MAX as usize {
            return Err(DiskError::invalid_format(format!("{} tracks", tracks)));
        }
        for disk in &mut disks {
            disk.ensure_track_count(tracks);
        }

        let mut geometry = Geometry::new(tracks as u8, disks.len() as u8, 0, 256);
        if let Some(track) = disks
            .iter()
            .flat_map(|d| d.tracks())
            .find(|t| t.is_formatted() && !t.is_empty())
        {
            geometry.sectors_per_track = track.sector_count().min(u8::MAX as usize) as u8;
            geometry.sector_size = track.sectors()[0].declared_size() as u16;
            geometry.first_sector_id = track.sectors().iter().map(|s| s.id.sector).min().unwrap_or(1);
            geometry.filler_byte = track.filler_byte;
            geometry.gap3_length = track.gap3_length;
        }

        Ok(Self {
            format,
            geometry,
            disks,
            metadata,
            changed: false,
            filename: None,
        })
    }

    /// Build an image from sector bytes laid out in LSN order
    pub(crate) fn from_linear(
        format: DiskImageFormat,
        geometry: Geometry,
        metadata: FormatData,
        bytes: &[u8],
    ) -> Result<Self> {
        geometry.validate()?;
        let size_code = geometry.size_code().unwrap_or(1);
        let sector_size = geometry.sector_size as usize;
        if bytes.len() < geometry.total_bytes() {
            warn!(
                "{} image holds {} bytes, {} expected; padding with 0x{:02X}",
                format,
                bytes.len(),
                geometry.total_bytes(),
                geometry.filler_byte
            );
        }

        let mut disks: Vec<Disk> = (0..geometry.sides)
            .map(|side| Disk::with_capacity(side, geometry.tracks as usize))
            .collect();
        let mut offset = 0usize;
        for track_num in 0..geometry.tracks {
            for (side, disk) in disks.iter_mut().enumerate() {
                let mut track = Track::new(track_num, side as u8);
                track.filler_byte = geometry.filler_byte;
                track.gap3_length = geometry.gap3_length;
                for index in 0..geometry.sectors_per_track {
                    let id = SectorId::new(
                        track_num,
                        side as u8,
                        geometry.first_sector_id.wrapping_add(index),
                        size_code,
                    );
                    let mut data = vec![geometry.filler_byte; sector_size];
                    if offset < bytes.len() {
                        let end = (offset + sector_size).min(bytes.len());
                        data[..end - offset].copy_from_slice(&bytes[offset..end]);
                    }
                    offset += sector_size;
                    track.add_sector(Sector::with_data(id, data));
                }
                disk.add_track(track);
            }
        }

        Ok(Self {
            format,
            geometry,
            disks,
            metadata,
            changed: false,
            filename: None,
        })
    }

    /// Get the container format
    pub fn format(&self) -> DiskImageFormat {
        self.format
    }

    /// Switch the container format used by [`DiskImage::save`], resetting
    /// the container metadata to that format's defaults
    pub fn set_format(&mut self, format: DiskImageFormat) {
        if format != self.format {
            self.format = format;
            self.metadata = builder::default_metadata(format, &self.geometry);
            self.changed = true;
        }
    }

    /// Get the nominal geometry
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Get the container metadata
    pub fn metadata(&self) -> &FormatData {
        &self.metadata
    }

    /// Get mutable container metadata
    pub fn metadata_mut(&mut self) -> &mut FormatData {
        self.changed = true;
        &mut self.metadata
    }

    /// Get the original filename if loaded from disk
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Get all disks (sides)
    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    /// Get a mutable reference to all disks
    pub fn disks_mut(&mut self) -> &mut [Disk] {
        self.changed = true;
        &mut self.disks
    }

    /// Get a disk by side number
    pub fn get_disk(&self, side: u8) -> Option<&Disk> {
        self.disks.get(side as usize)
    }

    /// Number of sides
    pub fn sides(&self) -> u8 {
        self.disks.len() as u8
    }

    /// Number of tracks per side
    pub fn tracks(&self) -> u8 {
        self.geometry.tracks
    }

    /// Nominal sectors per track
    pub fn sectors_per_track(&self) -> u8 {
        self.geometry.sectors_per_track
    }

    /// Headerless images cannot describe their own geometry
    pub fn need_manual_setup(&self) -> bool {
        self.format == DiskImageFormat::Raw
    }

    /// Reslice the image bytes under a new geometry. Only meaningful for
    /// headerless images whose geometry was guessed.
    pub fn set_geometry(&mut self, geometry: Geometry) -> Result<()> {
        if !self.need_manual_setup() {
            return Err(DiskError::UnsupportedFormat(format!(
                "{} images describe their own geometry",
                self.format
            )));
        }
        let bytes = self.linear_bytes();
        let filename = self.filename.take();
        *self = Self::from_linear(self.format, geometry, FormatData::Raw, &bytes)?;
        self.filename = filename;
        self.changed = true;
        debug!("geometry set to {}", geometry);
        Ok(())
    }

    /// Get a track
    pub fn track(&self, track: u8, side: u8) -> Result<&Track> {
        let max = self.geometry.tracks.saturating_sub(1);
        self.disks
            .get(side as usize)
            .and_then(|d| d.get_track(track))
            .ok_or(DiskError::InvalidTrack { track, side, max })
    }

    /// Get a mutable track
    pub fn track_mut(&mut self, track: u8, side: u8) -> Result<&mut Track> {
        let max = self.geometry.tracks.saturating_sub(1);
        self.changed = true;
        self.disks
            .get_mut(side as usize)
            .and_then(|d| d.get_track_mut(track))
            .ok_or(DiskError::InvalidTrack { track, side, max })
    }

    /// Sector at a physical index
    pub fn sector(&self, track: u8, side: u8, index: u8) -> Result<&[u8]> {
        let sector = self
            .track(track, side)?
            .get_sector_by_index(index as usize)
            .ok_or(DiskError::InvalidSector { track, side, id: index })?;
        Ok(first_copy(sector))
    }

    /// Mutable sector at a physical index
    pub fn sector_mut(&mut self, track: u8, side: u8, index: u8) -> Result<&mut [u8]> {
        let sector = self
            .track_mut(track, side)?
            .get_sector_by_index_mut(index as usize)
            .ok_or(DiskError::InvalidSector { track, side, id: index })?;
        Ok(first_copy_mut(sector))
    }

    /// Sector with a given ID
    pub fn sector_by_id(&self, track: u8, side: u8, id: u8) -> Result<&[u8]> {
        let sector = self
            .track(track, side)?
            .get_sector(id)
            .ok_or(DiskError::InvalidSector { track, side, id })?;
        Ok(first_copy(sector))
    }

    /// Mutable sector with a given ID
    pub fn sector_by_id_mut(&mut self, track: u8, side: u8, id: u8) -> Result<&mut [u8]> {
        let sector = self
            .track_mut(track, side)?
            .get_sector_mut(id)
            .ok_or(DiskError::InvalidSector { track, side, id })?;
        Ok(first_copy_mut(sector))
    }

    /// The `n`th sector of a track in ID order
    pub fn logical_sector(&self, track: u8, side: u8, n: u8) -> Result<&[u8]> {
        let track_ref = self.track(track, side)?;
        let sector = track_ref
            .logical_index(n)
            .and_then(|index| track_ref.get_sector_by_index(index))
            .ok_or(DiskError::InvalidSector { track, side, id: n })?;
        Ok(first_copy(sector))
    }

    /// Mutable `n`th sector of a track in ID order
    pub fn logical_sector_mut(&mut self, track: u8, side: u8, n: u8) -> Result<&mut [u8]> {
        let track_ref = self.track_mut(track, side)?;
        let sector = match track_ref.logical_index(n) {
            Some(index) => track_ref.get_sector_by_index_mut(index),
            None => None,
        }
        .ok_or(DiskError::InvalidSector { track, side, id: n })?;
        Ok(first_copy_mut(sector))
    }

    /// Declared size of a sector at a physical index
    pub fn sector_size(&self, track: u8, side: u8, index: u8) -> Result<usize> {
        self.track(track, side)?
            .get_sector_by_index(index as usize)
            .map(|s| s.declared_size())
            .ok_or(DiskError::InvalidSector { track, side, id: index })
    }

    /// Read a sector by logical sector number
    pub fn read_lsn(&self, lsn: u32) -> Result<&[u8]> {
        let (track, side, sector) = self.geometry.chs(lsn)?;
        self.logical_sector(track, side, sector)
    }

    /// Read a sector that must hold the geometry's full sector size
    ///
    /// Returns exactly `sector_size` bytes. Records stored without data or
    /// with fewer bytes, such as IMD "unavailable" sectors, are an error.
    pub fn read_full_lsn(&self, lsn: u32) -> Result<&[u8]> {
        let size = self.geometry.sector_size as usize;
        let data = self.read_lsn(lsn)?;
        data.get(..size).ok_or_else(|| {
            DiskError::invalid_format(format!(
                "LSN {} holds {} of {} bytes",
                lsn,
                data.len(),
                size
            ))
        })
    }

    /// Overwrite the start of a sector addressed by logical sector number
    pub fn write_lsn(&mut self, lsn: u32, data: &[u8]) -> Result<()> {
        let (track, side, sector) = self.geometry.chs(lsn)?;
        let target = self.logical_sector_mut(track, side, sector)?;
        if data.len() > target.len() {
            return Err(DiskError::InvalidSector { track, side, id: sector });
        }
        target[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Summary of a track
    pub fn track_info(&self, track: u8, side: u8) -> Result<TrackInfo> {
        let t = self.track(track, side)?;
        Ok(TrackInfo {
            track_number: t.track_number,
            side_number: t.side_number,
            formatted: t.is_formatted(),
            sectors_num: t.sector_count(),
            data_size: t.declared_data_size(),
        })
    }

    /// Summary of a sector at a physical index
    pub fn sector_info(&self, track: u8, side: u8, index: u8) -> Result<SectorInfo> {
        let t = self.track(track, side)?;
        let s = t
            .get_sector_by_index(index as usize)
            .ok_or(DiskError::InvalidSector { track, side, id: index })?;
        Ok(SectorInfo {
            id: s.id,
            declared_size: s.declared_size(),
            data_length: s.data_length(),
            has_errors: s.has_error(),
            is_deleted: s.is_deleted(),
            is_weak: s.is_weak(),
            copies: s.copies(),
            in_use: s.in_use(t.filler_byte),
        })
    }

    /// Sum of declared sector sizes over every formatted track
    pub fn total_bytes(&self) -> usize {
        self.disks
            .iter()
            .flat_map(|d| d.tracks())
            .map(|t| t.declared_data_size())
            .sum()
    }

    /// Every sector in LSN order, each cut or padded to the nominal size
    ///
    /// Tracks are read cylinder by cylinder with the sides interleaved and
    /// sectors taken in ID order, as a controller stepping through the disk
    /// would see them.
    pub fn linear_bytes(&self) -> Vec<u8> {
        let sector_size = self.geometry.sector_size as usize;
        let mut data = Vec::with_capacity(self.geometry.total_bytes());
        for track in 0..self.geometry.tracks {
            for side in 0..self.sides() {
                for n in 0..self.geometry.sectors_per_track {
                    let start = data.len();
                    if let Ok(sector) = self.logical_sector(track, side, n) {
                        data.extend_from_slice(&sector[..sector.len().min(sector_size)]);
                    }
                    data.resize(start + sector_size, self.geometry.filler_byte);
                }
            }
        }
        data
    }

    /// Encode the image with its own codec
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        crate::io::codec_for(self.format).encode(self)
    }

    /// Save the image with its own codec
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        self.filename = Some(path.display().to_string());
        self.changed = false;
        Ok(())
    }

    /// Check if the image has been modified
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Mark the image as unchanged
    pub fn mark_unchanged(&mut self) {
        self.changed = false;
    }
}

fn first_copy(sector: &Sector) -> &[u8] {
    let len = sector.data_length().min(sector.declared_size());
    &sector.data()[..len]
}

fn first_copy_mut(sector: &mut Sector) -> &mut [u8] {
    let len = sector.data_length().min(sector.declared_size());
    &mut sector.data_mut()[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dragon_image() -> DiskImage {
        DiskImage::builder()
            .format(DiskImageFormat::Vdk)
            .geometry(Geometry::dragon_ds40())
            .build()
            .unwrap()
    }

    #[test]
    fn test_geometry_accessors() {
        let image = dragon_image();
        assert_eq!(image.sides(), 2);
        assert_eq!(image.tracks(), 40);
        assert_eq!(image.sectors_per_track(), 18);
        assert_eq!(image.total_bytes(), 40 * 2 * 18 * 256);
        assert!(!image.need_manual_setup());
    }

    #[test]
    fn test_lsn_read_write() {
        let mut image = dragon_image();
        image.write_lsn(720, &[1, 2, 3]).unwrap();
        assert_eq!(&image.read_lsn(720).unwrap()[..3], &[1, 2, 3]);
        assert_eq!(image.sector_by_id(20, 0, 1).unwrap()[0], 1);
        assert!(image.is_changed());
        assert!(image.read_lsn(40 * 36).is_err());
    }

    #[test]
    fn test_read_full_lsn_rejects_missing_data() {
        let mut image = dragon_image();
        assert_eq!(image.read_full_lsn(5).unwrap().len(), 256);
        let track = image.track_mut(0, 0).unwrap();
        let index = track.logical_index(5).unwrap();
        track.sectors_mut()[index].set_data(vec![0; 100]);
        assert_eq!(image.read_lsn(5).unwrap().len(), 100);
        assert!(matches!(
            image.read_full_lsn(5),
            Err(DiskError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_write_lsn_too_long() {
        let mut image = dragon_image();
        assert!(image.write_lsn(0, &[0u8; 257]).is_err());
    }

    #[test]
    fn test_sector_lookup_errors() {
        let image = dragon_image();
        assert!(matches!(
            image.sector(40, 0, 0),
            Err(DiskError::InvalidTrack { track: 40, .. })
        ));
        assert!(matches!(
            image.sector_by_id(0, 0, 0),
            Err(DiskError::InvalidSector { id: 0, .. })
        ));
        assert!(image.sector(0, 2, 0).is_err());
    }

    #[test]
    fn test_track_and_sector_info() {
        let mut image = dragon_image();
        image.sector_mut(3, 1, 4).unwrap()[0] = 0x12;
        let info = image.track_info(3, 1).unwrap();
        assert!(info.formatted);
        assert_eq!(info.sectors_num, 18);
        assert_eq!(info.data_size, 18 * 256);

        let sector = image.sector_info(3, 1, 4).unwrap();
        assert_eq!(sector.id.sector, 5);
        assert_eq!(sector.copies, 1);
        assert!(sector.in_use);
        assert!(!image.sector_info(3, 1, 5).unwrap().in_use);
    }

    #[test]
    fn test_linear_round_trip() {
        let geometry = Geometry::new(2, 2, 4, 128);
        let bytes: Vec<u8> = (0..geometry.total_bytes()).map(|i| (i / 128) as u8).collect();
        let image =
            DiskImage::from_linear(DiskImageFormat::Raw, geometry, FormatData::Raw, &bytes).unwrap();
        assert_eq!(image.sector(0, 1, 0).unwrap()[0], 4);
        assert_eq!(image.sector(1, 0, 0).unwrap()[0], 8);
        assert_eq!(image.linear_bytes(), bytes);
    }

    #[test]
    fn test_set_geometry_only_for_raw() {
        let mut image = dragon_image();
        assert!(image.set_geometry(Geometry::dragon_ss80()).is_err());

        image.set_format(DiskImageFormat::Raw);
        image.set_geometry(Geometry::dragon_ss80()).unwrap();
        assert_eq!(image.sides(), 1);
        assert_eq!(image.tracks(), 80);
    }
}
