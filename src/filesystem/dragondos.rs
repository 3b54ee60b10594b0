/// DragonDOS filesystem
///
/// Track 20 holds everything: two bitmap sectors (one bit per LSN, set when
/// free) with the geometry signature at the end of the first, then sixteen
/// sectors of 25-byte directory entries. Each change to track 20 is copied
/// to track 16.

use crate::error::{DiskError, Result};
use crate::filesystem::{
    join_name, split_name, DirectoryEntry, FileAttributes, FileInfo, FileSystem, FileSystemType,
    MountError, MountResult,
};
use crate::image::DiskImage;
use log::{debug, warn};
use std::collections::HashSet;

/// Directory track
pub const DIR_TRACK: u8 = 20;
/// Backup copy of the directory track
pub const MIRROR_TRACK: u8 = 16;
/// Sectors per track on every DragonDOS disk
pub const SECTORS_PER_TRACK: u8 = 18;
/// Sector size
pub const SECTOR_SIZE: usize = 256;
/// Directory entry size
pub const ENTRY_SIZE: usize = 25;
/// Directory entries per sector
pub const ENTRIES_PER_SECTOR: usize = 10;
/// First directory sector on the directory track
pub const DIR_START_SECTOR: usize = 2;
/// Directory capacity
pub const MAX_ENTRIES: usize = 160;
/// LSNs covered by one bitmap sector
pub const LSNS_PER_BITMAP_SECTOR: usize = 0x5A0;
/// Largest file, header included
pub const MAX_FILE_SIZE: usize = 0xFFFF;
/// Binary/BASIC header length
pub const HEADER_SIZE: usize = 9;

/// Entry may be reused
pub const FLAG_DELETED: u8 = 0x80;
/// Byte 24 gives the next entry of this file
pub const FLAG_CONTINUED: u8 = 0x20;
/// No further entries need scanning
pub const FLAG_END_OF_DIR: u8 = 0x08;
/// File should not be overwritten
pub const FLAG_PROTECTED: u8 = 0x02;
/// Entry is a continuation block
pub const FLAG_CONTINUATION: u8 = 0x01;

/// BASIC program file type
pub const FILETYPE_BASIC: u8 = 0x01;
/// Machine code file type
pub const FILETYPE_BINARY: u8 = 0x02;

const HEADER_FABS: usize = 4;
const CONTINUATION_FABS: usize = 7;
const HEADER_FAB_OFFSET: usize = 12;
const CONTINUATION_FAB_OFFSET: usize = 1;
const LINK_OFFSET: usize = 24;
const SIGNATURE_OFFSET: usize = 0xFC;
const MAX_BITMAP_LSNS: usize = 2 * LSNS_PER_BITMAP_SECTOR;

/// The 9-byte header at the start of BASIC and binary files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    /// 1 for BASIC, 2 for binary
    pub file_type: u8,
    /// Load address
    pub load: u16,
    /// Length of the data after the header
    pub length: u16,
    /// Execution address
    pub exec: u16,
}

impl BinaryHeader {
    /// Header for machine code loaded at `load`
    pub fn binary(load: u16, length: u16, exec: u16) -> Self {
        Self {
            file_type: FILETYPE_BINARY,
            load,
            length,
            exec,
        }
    }

    /// The header as stored on disk
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [lh, ll] = self.load.to_be_bytes();
        let [nh, nl] = self.length.to_be_bytes();
        let [eh, el] = self.exec.to_be_bytes();
        [0x55, self.file_type, lh, ll, nh, nl, eh, el, 0xAA]
    }
}

/// Header of a BASIC or binary file, if `data` starts with one
pub fn binary_header(data: &[u8]) -> Option<BinaryHeader> {
    if data.len() < HEADER_SIZE || data[0] != 0x55 || data[8] != 0xAA {
        return None;
    }
    Some(BinaryHeader {
        file_type: data[1],
        load: u16::from_be_bytes([data[2], data[3]]),
        length: u16::from_be_bytes([data[4], data[5]]),
        exec: u16::from_be_bytes([data[6], data[7]]),
    })
}

/// A contiguous run of sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fab {
    lsn: u16,
    count: u8,
}

impl Fab {
    fn lsns(&self) -> std::ops::Range<u32> {
        self.lsn as u32..self.lsn as u32 + self.count as u32
    }
}

/// One file as listed in the directory
#[derive(Debug, Clone)]
pub struct DragonDosFile {
    /// "NAME.EXT"
    pub name: String,
    /// Protect flag
    pub protected: bool,
    /// Stored size in bytes, header included
    pub size: usize,
    /// Header found at the start of the data
    pub header: Option<BinaryHeader>,
    slots: Vec<usize>,
    fabs: Vec<Fab>,
}

impl DragonDosFile {
    /// Three-letter type shown by DIR
    pub fn type_name(&self) -> &'static str {
        match self.header.map(|h| h.file_type) {
            Some(FILETYPE_BASIC) => "BAS",
            Some(FILETYPE_BINARY) => "BIN",
            _ => "DAT",
        }
    }
}

/// The 18 sectors of the directory track, edited in memory and written
/// back in one go
struct DirectoryTrack {
    bytes: Vec<u8>,
}

impl DirectoryTrack {
    fn blank() -> Self {
        Self {
            bytes: vec![0; SECTORS_PER_TRACK as usize * SECTOR_SIZE],
        }
    }

    fn read(image: &DiskImage) -> Result<Self> {
        let mut bytes = Vec::with_capacity(SECTORS_PER_TRACK as usize * SECTOR_SIZE);
        for n in 0..SECTORS_PER_TRACK {
            bytes.extend_from_slice(image.read_full_lsn(image.geometry().lsn(DIR_TRACK, 0, n))?);
        }
        Ok(Self { bytes })
    }

    /// Write to the directory track, then copy it to the mirror track
    fn write(&self, image: &mut DiskImage) -> Result<()> {
        for (n, sector) in self.bytes.chunks(SECTOR_SIZE).enumerate() {
            let lsn = image.geometry().lsn(DIR_TRACK, 0, n as u8);
            image.write_lsn(lsn, sector)?;
        }
        for (n, sector) in self.bytes.chunks(SECTOR_SIZE).enumerate() {
            let lsn = image.geometry().lsn(MIRROR_TRACK, 0, n as u8);
            if let Err(e) = image.write_lsn(lsn, sector) {
                warn!("directory mirror not written: {}", e);
                break;
            }
        }
        Ok(())
    }

    fn signature(&self) -> &[u8] {
        &self.bytes[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4]
    }

    fn bit(lsn: usize) -> Option<(usize, u8)> {
        if lsn >= MAX_BITMAP_LSNS {
            return None;
        }
        let sector = lsn / LSNS_PER_BITMAP_SECTOR;
        let offset = lsn % LSNS_PER_BITMAP_SECTOR;
        Some((sector * SECTOR_SIZE + offset / 8, 1 << (offset % 8)))
    }

    fn is_free(&self, lsn: usize) -> bool {
        Self::bit(lsn).is_some_and(|(byte, mask)| self.bytes[byte] & mask != 0)
    }

    fn set_free(&mut self, lsn: usize, free: bool) {
        if let Some((byte, mask)) = Self::bit(lsn) {
            if free {
                self.bytes[byte] |= mask;
            } else {
                self.bytes[byte] &= !mask;
            }
        }
    }

    fn entry_offset(slot: usize) -> usize {
        (DIR_START_SECTOR + slot / ENTRIES_PER_SECTOR) * SECTOR_SIZE
            + (slot % ENTRIES_PER_SECTOR) * ENTRY_SIZE
    }

    fn entry(&self, slot: usize) -> &[u8] {
        let offset = Self::entry_offset(slot);
        &self.bytes[offset..offset + ENTRY_SIZE]
    }

    fn entry_mut(&mut self, slot: usize) -> &mut [u8] {
        let offset = Self::entry_offset(slot);
        &mut self.bytes[offset..offset + ENTRY_SIZE]
    }

    /// Index of the first entry flagged end-of-directory
    fn end(&self) -> usize {
        (0..MAX_ENTRIES)
            .find(|&slot| self.entry(slot)[0] & FLAG_END_OF_DIR != 0)
            .unwrap_or(MAX_ENTRIES)
    }
}

/// A directory entry before continuation chains are followed
struct RawEntry {
    flags: u8,
    name: String,
    fabs: Vec<Fab>,
    link: u8,
}

impl RawEntry {
    fn parse(entry: &[u8]) -> Self {
        let flags = entry[0];
        let (fab_offset, fab_count) = if flags & FLAG_CONTINUATION != 0 {
            (CONTINUATION_FAB_OFFSET, CONTINUATION_FABS)
        } else {
            (HEADER_FAB_OFFSET, HEADER_FABS)
        };
        let name = if flags & FLAG_CONTINUATION == 0 {
            let text = |bytes: &[u8]| {
                bytes
                    .iter()
                    .filter(|&&b| b != 0)
                    .map(|&b| b as char)
                    .collect::<String>()
            };
            join_name(&text(&entry[1..9]), &text(&entry[9..12]))
        } else {
            String::new()
        };
        let fabs = (0..fab_count)
            .map(|i| {
                let o = fab_offset + i * 3;
                Fab {
                    lsn: u16::from_be_bytes([entry[o], entry[o + 1]]),
                    count: entry[o + 2],
                }
            })
            .filter(|f| f.count != 0)
            .collect();
        Self {
            flags,
            name,
            fabs,
            link: entry[LINK_OFFSET],
        }
    }
}

/// DragonDOS driver
pub struct DragonDosFileSystem {
    image: DiskImage,
    files: Vec<DragonDosFile>,
    root: DirectoryEntry,
}

impl DragonDosFileSystem {
    /// Files in directory order
    pub fn files(&self) -> &[DragonDosFile] {
        &self.files
    }

    fn check_geometry(image: &DiskImage) -> Result<()> {
        let geometry = image.geometry();
        if geometry.sectors_per_track != SECTORS_PER_TRACK
            || geometry.sector_size as usize != SECTOR_SIZE
        {
            return Err(DiskError::GeometryMismatch(format!(
                "DragonDOS needs 18 sectors of 256 bytes, not {}",
                geometry
            )));
        }
        if geometry.tracks <= DIR_TRACK {
            return Err(DiskError::GeometryMismatch(format!(
                "{} tracks leave no directory track",
                geometry.tracks
            )));
        }
        Ok(())
    }

    fn read_catalog(image: &DiskImage) -> Result<Vec<DragonDosFile>> {
        Self::check_geometry(image)?;
        let track = DirectoryTrack::read(image)?;

        let sig = track.signature();
        let (tracks, spt) = (sig[0], sig[1]);
        if sig[2] != !tracks || sig[3] != !spt {
            return Err(DiskError::invalid_format("no DragonDOS geometry signature"));
        }
        if spt != SECTORS_PER_TRACK * image.sides() || tracks > image.tracks() {
            return Err(DiskError::GeometryMismatch(format!(
                "signature says {} tracks of {} sectors",
                tracks, spt
            )));
        }

        let raw: Vec<RawEntry> = (0..track.end())
            .map(|slot| RawEntry::parse(track.entry(slot)))
            .collect();
        let total = image.geometry().total_sectors();

        let mut files = Vec::new();
        for (slot, entry) in raw.iter().enumerate() {
            if entry.flags & (FLAG_DELETED | FLAG_CONTINUATION) != 0 {
                continue;
            }
            let mut slots = vec![slot];
            let mut fabs = entry.fabs.clone();
            let mut visited = HashSet::from([slot]);
            let mut current = entry;
            while current.flags & FLAG_CONTINUED != 0 {
                let next = current.link as usize;
                if !visited.insert(next) {
                    warn!("continuation cycle in {}", entry.name);
                    return Err(DiskError::integrity(format!(
                        "continuation cycle at entry {}",
                        next
                    )));
                }
                current = raw
                    .get(next)
                    .filter(|e| e.flags & FLAG_CONTINUATION != 0)
                    .ok_or_else(|| {
                        DiskError::integrity(format!(
                            "{} continues at invalid entry {}",
                            entry.name, next
                        ))
                    })?;
                slots.push(next);
                fabs.extend_from_slice(&current.fabs);
            }

            if let Some(fab) = fabs.iter().find(|f| f.lsns().end > total) {
                return Err(DiskError::integrity(format!(
                    "{} uses sectors {}..{} beyond the disk",
                    entry.name,
                    fab.lsn,
                    fab.lsns().end
                )));
            }

            let sectors: usize = fabs.iter().map(|f| f.count as usize).sum();
            let last = if current.link == 0 { SECTOR_SIZE } else { current.link as usize };
            let size = if sectors == 0 { 0 } else { (sectors - 1) * SECTOR_SIZE + last };
            let header = match fabs.first() {
                Some(fab) => binary_header(image.read_full_lsn(fab.lsn as u32)?),
                None => None,
            };

            files.push(DragonDosFile {
                name: entry.name.clone(),
                protected: entry.flags & FLAG_PROTECTED != 0,
                size,
                header,
                slots,
                fabs,
            });
        }
        Ok(files)
    }

    fn build_root(files: &[DragonDosFile]) -> DirectoryEntry {
        let mut root = DirectoryEntry::root("DragonDOS Disk");
        for file in files {
            root.add_child(DirectoryEntry::file(file.name.clone()));
        }
        root
    }

    fn reload(&mut self) -> Result<()> {
        self.files = Self::read_catalog(&self.image)?;
        self.root = Self::build_root(&self.files);
        Ok(())
    }

    fn find(&self, name: &str) -> Result<&DragonDosFile> {
        let wanted = name.trim().trim_end_matches('.');
        self.files
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DiskError::FileNotFound(name.to_string()))
    }

    /// Sectors the bitmap can describe on this disk
    fn bitmap_lsns(&self) -> usize {
        (self.image.geometry().total_sectors() as usize).min(MAX_BITMAP_LSNS)
    }

    /// Byte-aligned first fit, or any free sectors when no aligned run
    /// is long enough
    fn allocate(&self, track: &DirectoryTrack, needed: usize) -> Result<Vec<usize>> {
        let limit = self.bitmap_lsns();
        let free: Vec<usize> = (0..limit).filter(|&l| track.is_free(l)).collect();
        if free.len() < needed {
            return Err(DiskError::DiskFull);
        }
        if needed == 0 {
            return Ok(Vec::new());
        }
        let span = needed.div_ceil(8) * 8;
        if let Some(start) = (0..limit)
            .step_by(8)
            .find(|&start| start + needed <= limit && (start..start + span).all(|l| track.is_free(l)))
        {
            return Ok((start..start + needed).collect());
        }
        debug!("no aligned run of {} sectors, scattering", needed);
        Ok(free[..needed].to_vec())
    }

    /// First `count` usable directory slots. Everything from the
    /// end-of-directory marker on is usable.
    fn free_slots(track: &DirectoryTrack, count: usize) -> Result<Vec<usize>> {
        let end = track.end();
        let slots: Vec<usize> = (0..MAX_ENTRIES)
            .filter(|&slot| slot >= end || track.entry(slot)[0] & FLAG_DELETED != 0)
            .take(count)
            .collect();
        if slots.len() < count {
            return Err(DiskError::DirectoryFull);
        }
        Ok(slots)
    }
}

/// Group sorted LSNs into runs of at most 255 sectors
fn runs(lsns: &[usize]) -> Vec<Fab> {
    let mut fabs: Vec<Fab> = Vec::new();
    for &lsn in lsns {
        match fabs.last_mut() {
            Some(fab) if fab.lsns().end as usize == lsn && fab.count < u8::MAX => fab.count += 1,
            _ => fabs.push(Fab {
                lsn: lsn as u16,
                count: 1,
            }),
        }
    }
    fabs
}

fn entries_needed(fabs: usize) -> usize {
    1 + fabs.saturating_sub(HEADER_FABS).div_ceil(CONTINUATION_FABS)
}

impl FileSystem for DragonDosFileSystem {
    fn load(image: DiskImage) -> MountResult<Self> {
        match Self::read_catalog(&image) {
            Ok(files) => {
                let root = Self::build_root(&files);
                Ok(Self { image, files, root })
            }
            Err(error) => Err(MountError::new(error, image)),
        }
    }

    fn probe(image: &DiskImage) -> Result<()> {
        Self::read_catalog(image).map(|_| ())
    }

    fn init_disk(image: &mut DiskImage) -> Result<()> {
        Self::check_geometry(image)?;
        let geometry = *image.geometry();
        let mut track = DirectoryTrack::blank();

        let total = (geometry.total_sectors() as usize).min(MAX_BITMAP_LSNS);
        for lsn in 0..total {
            track.set_free(lsn, true);
        }
        for t in [MIRROR_TRACK, DIR_TRACK] {
            for n in 0..SECTORS_PER_TRACK {
                track.set_free(geometry.lsn(t, 0, n) as usize, false);
            }
        }

        let spt = SECTORS_PER_TRACK * geometry.sides;
        track.bytes[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(&[
            geometry.tracks,
            spt,
            !geometry.tracks,
            !spt,
        ]);
        for slot in 0..MAX_ENTRIES {
            track.entry_mut(slot)[0] = FLAG_DELETED | FLAG_END_OF_DIR | FLAG_CONTINUATION;
        }
        track.write(image)
    }

    fn fs_type(&self) -> FileSystemType {
        FileSystemType::DragonDos
    }

    fn volume_label(&self) -> String {
        "DragonDOS Disk".to_string()
    }

    fn files_num(&self) -> usize {
        self.files.len()
    }

    fn file_info(&self, index: usize) -> Option<FileInfo> {
        self.files.get(index).map(|f| FileInfo {
            name: f.name.clone(),
            size: f.size,
            attributes: FileAttributes {
                directory: false,
                protected: f.protected,
            },
            ok: true,
        })
    }

    fn free_size(&self) -> usize {
        match DirectoryTrack::read(&self.image) {
            Ok(track) => {
                (0..self.bitmap_lsns()).filter(|&l| track.is_free(l)).count() * SECTOR_SIZE
            }
            Err(_) => 0,
        }
    }

    fn root(&self) -> &DirectoryEntry {
        &self.root
    }

    fn extract_file(&self, name: &str, with_header: bool) -> Result<Vec<u8>> {
        let file = self.find(name)?;
        let mut data = Vec::with_capacity(file.size);
        for fab in &file.fabs {
            for lsn in fab.lsns() {
                data.extend_from_slice(self.image.read_full_lsn(lsn)?);
            }
        }
        data.truncate(file.size);

        let strip = match file.header.map(|h| h.file_type) {
            Some(FILETYPE_BASIC) => true,
            Some(FILETYPE_BINARY) => !with_header,
            _ => false,
        };
        if strip {
            data.drain(..HEADER_SIZE.min(data.len()));
        }
        Ok(data)
    }

    fn insert_file(&mut self, name: &str, data: &[u8], binary: bool) -> Result<()> {
        let (stem, ext) = split_name(name, 8, 3)?;
        let display = join_name(&stem, &ext);
        if self.find(&display).is_ok() {
            return Err(DiskError::filesystem(format!("{} already exists", display)));
        }

        let payload = if binary && binary_header(data).is_none() {
            let length = u16::try_from(data.len())
                .ok()
                .filter(|&l| l as usize + HEADER_SIZE <= MAX_FILE_SIZE)
                .ok_or_else(|| DiskError::filesystem("file too large for DragonDOS"))?;
            let mut payload = BinaryHeader::binary(0, length, 0).to_bytes().to_vec();
            payload.extend_from_slice(data);
            payload
        } else {
            data.to_vec()
        };
        if payload.len() > MAX_FILE_SIZE {
            return Err(DiskError::filesystem("file too large for DragonDOS"));
        }

        let mut track = DirectoryTrack::read(&self.image)?;
        let lsns = self.allocate(&track, payload.len().div_ceil(SECTOR_SIZE))?;
        let fabs = runs(&lsns);
        let end = track.end();
        let slots = Self::free_slots(&track, entries_needed(fabs.len()))?;

        for (lsn, chunk) in lsns.iter().zip(payload.chunks(SECTOR_SIZE)) {
            let mut sector = chunk.to_vec();
            sector.resize(SECTOR_SIZE, 0);
            self.image.write_lsn(*lsn as u32, &sector)?;
            track.set_free(*lsn, false);
        }

        let last_size = (payload.len() % SECTOR_SIZE) as u8;
        let mut remaining = fabs.as_slice();
        for (k, &slot) in slots.iter().enumerate() {
            let more = k + 1 < slots.len();
            let entry = track.entry_mut(slot);
            entry.fill(0);
            let (offset, capacity) = if k == 0 {
                entry[1..1 + stem.len()].copy_from_slice(stem.as_bytes());
                entry[9..9 + ext.len()].copy_from_slice(ext.as_bytes());
                (HEADER_FAB_OFFSET, HEADER_FABS)
            } else {
                entry[0] = FLAG_CONTINUATION;
                (CONTINUATION_FAB_OFFSET, CONTINUATION_FABS)
            };
            let (these, rest) = remaining.split_at(capacity.min(remaining.len()));
            for (i, fab) in these.iter().enumerate() {
                let o = offset + i * 3;
                entry[o..o + 2].copy_from_slice(&fab.lsn.to_be_bytes());
                entry[o + 2] = fab.count;
            }
            remaining = rest;
            if more {
                entry[0] |= FLAG_CONTINUED;
                entry[LINK_OFFSET] = slots[k + 1] as u8;
            } else {
                entry[LINK_OFFSET] = last_size;
            }
        }

        // a slot taken from beyond the old end needs a new end marker after it
        if let Some(&last) = slots.last() {
            if last >= end && last + 1 < MAX_ENTRIES {
                track.entry_mut(last + 1)[0] = FLAG_DELETED | FLAG_END_OF_DIR | FLAG_CONTINUATION;
            }
        }

        track.write(&mut self.image)?;
        self.reload()
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        let file = self.find(name)?.clone();
        let mut track = DirectoryTrack::read(&self.image)?;
        for &slot in &file.slots {
            track.entry_mut(slot)[0] = FLAG_DELETED | FLAG_CONTINUATION;
        }
        for fab in &file.fabs {
            for lsn in fab.lsns() {
                track.set_free(lsn as usize, true);
            }
        }
        track.write(&mut self.image)?;
        self.reload()
    }

    fn image(&self) -> &DiskImage {
        &self.image
    }

    fn image_mut(&mut self) -> &mut DiskImage {
        &mut self.image
    }

    fn into_image(self: Box<Self>) -> DiskImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DiskImageFormat, Geometry};

    fn blank(geometry: Geometry) -> DragonDosFileSystem {
        let mut image = DiskImage::create(DiskImageFormat::Vdk, geometry).unwrap();
        DragonDosFileSystem::init_disk(&mut image).unwrap();
        DragonDosFileSystem::load(image).unwrap()
    }

    #[test]
    fn test_init_disk() {
        let fs = blank(Geometry::dragon_ss40());
        assert_eq!(fs.files_num(), 0);
        // 720 sectors less tracks 16 and 20
        assert_eq!(fs.free_size(), (720 - 36) * 256);
        let sig = &fs.image().read_lsn(360).unwrap()[0xFC..];
        assert_eq!(sig, &[40, 18, !40, !18]);

        let ds = blank(Geometry::dragon_ds80());
        assert_eq!(ds.free_size(), (2880 - 36) * 256);
    }

    #[test]
    fn test_insert_binary_and_extract() {
        let mut fs = blank(Geometry::dragon_ss40());
        let free = fs.free_size();
        let data: Vec<u8> = (0..600).map(|i| (i % 256) as u8).collect();
        fs.insert_file("test.bin", &data, true).unwrap();

        assert_eq!(fs.files_num(), 1);
        assert_eq!(fs.file_name(0).as_deref(), Some("TEST.BIN"));
        assert_eq!(fs.file_size(0), Some(609));
        assert_eq!(fs.files()[0].type_name(), "BIN");
        assert_eq!(fs.extract_file("TEST.BIN", false).unwrap(), data);

        let with_header = fs.extract_file("Test.Bin", true).unwrap();
        assert_eq!(with_header.len(), 609);
        assert_eq!(
            binary_header(&with_header),
            Some(BinaryHeader::binary(0, 600, 0))
        );

        fs.delete_file("TEST.BIN").unwrap();
        assert_eq!(fs.files_num(), 0);
        assert_eq!(fs.free_size(), free);
    }

    #[test]
    fn test_data_file_and_names() {
        let mut fs = blank(Geometry::dragon_ss40());
        fs.insert_file("readme", b"hello", false).unwrap();
        assert_eq!(fs.file_name(0).as_deref(), Some("README"));
        assert_eq!(fs.extract_file("readme.", false).unwrap(), b"hello");
        assert_eq!(fs.files()[0].type_name(), "DAT");
        assert!(fs.insert_file("README", b"again", false).is_err());
        assert!(matches!(
            fs.extract_file("MISSING", false),
            Err(DiskError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_basic_header_always_stripped() {
        let mut fs = blank(Geometry::dragon_ss40());
        let mut program = vec![0x55, FILETYPE_BASIC, 0x1E, 0x01, 0, 4, 0x8B, 0x8D, 0xAA];
        program.extend_from_slice(&[1, 2, 3, 4]);
        fs.insert_file("PROG.BAS", &program, false).unwrap();
        assert_eq!(fs.extract_file("PROG.BAS", true).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(fs.files()[0].type_name(), "BAS");
    }

    #[test]
    fn test_directory_mirrored() {
        let mut fs = blank(Geometry::dragon_ss40());
        fs.insert_file("A.DAT", &[7; 300], false).unwrap();
        let geometry = *fs.image().geometry();
        for n in 0..18 {
            assert_eq!(
                fs.image().read_lsn(geometry.lsn(16, 0, n)).unwrap(),
                fs.image().read_lsn(geometry.lsn(20, 0, n)).unwrap()
            );
        }
    }

    #[test]
    fn test_scattered_allocation_uses_continuations() {
        let mut fs = blank(Geometry::dragon_ss40());
        // take one sector out of every bitmap byte so no aligned run exists
        let mut track = DirectoryTrack::read(&fs.image).unwrap();
        for lsn in (0..720).step_by(8) {
            track.set_free(lsn, false);
        }
        track.write(&mut fs.image).unwrap();
        fs.reload().unwrap();

        let data: Vec<u8> = (0..40 * 256).map(|i| (i / 256) as u8).collect();
        fs.insert_file("BIG.DAT", &data, false).unwrap();
        let file = &fs.files()[0];
        assert!(file.fabs.len() > HEADER_FABS);
        assert_eq!(file.slots.len(), 2);
        assert_eq!(fs.extract_file("BIG.DAT", false).unwrap(), data);

        let free = fs.free_size();
        fs.delete_file("BIG.DAT").unwrap();
        assert_eq!(fs.free_size(), free + 40 * 256);
    }

    #[test]
    fn test_protected_flag() {
        let mut fs = blank(Geometry::dragon_ss40());
        fs.insert_file("LOCKED", &[1], false).unwrap();
        let mut track = DirectoryTrack::read(&fs.image).unwrap();
        track.entry_mut(0)[0] |= FLAG_PROTECTED;
        track.write(&mut fs.image).unwrap();
        fs.reload().unwrap();
        assert!(fs.file_info(0).unwrap().attributes.protected);
    }

    #[test]
    fn test_disk_full() {
        let mut fs = blank(Geometry::dragon_ss40());
        let big = vec![0u8; MAX_FILE_SIZE];
        let mut inserted = 0;
        let result = loop {
            match fs.insert_file(&format!("F{}", inserted), &big, false) {
                Ok(()) => inserted += 1,
                Err(e) => break e,
            }
        };
        assert!(matches!(result, DiskError::DiskFull));
        assert_eq!(fs.files_num(), inserted);
        assert!(fs.insert_file("HUGE", &vec![0u8; 0x10000], false).is_err());
    }

    #[test]
    fn test_rejects() {
        let image = DiskImage::create(DiskImageFormat::Vdk, Geometry::dragon_ss40()).unwrap();
        assert!(DragonDosFileSystem::probe(&image).is_err());
        let err = DragonDosFileSystem::load(image).err().unwrap();
        assert_eq!(err.into_image().tracks(), 40);

        let mut pc = DiskImage::create(DiskImageFormat::Raw, Geometry::pc_360k()).unwrap();
        assert!(matches!(
            DragonDosFileSystem::init_disk(&mut pc),
            Err(DiskError::GeometryMismatch(_))
        ));

        // a signature for two sides on a single sided image
        let mut fs = blank(Geometry::dragon_ss40());
        let mut track = DirectoryTrack::read(&fs.image).unwrap();
        track.bytes[SIGNATURE_OFFSET + 1] = 36;
        track.bytes[SIGNATURE_OFFSET + 3] = !36;
        track.write(&mut fs.image).unwrap();
        assert!(fs.reload().is_err());
    }

    #[test]
    fn test_continuation_cycle_detected() {
        let mut fs = blank(Geometry::dragon_ss40());
        fs.insert_file("LOOP", &[1; 10], false).unwrap();
        let mut track = DirectoryTrack::read(&fs.image).unwrap();
        track.entry_mut(0)[0] |= FLAG_CONTINUED;
        track.entry_mut(0)[LINK_OFFSET] = 1;
        track.entry_mut(1)[0] = FLAG_CONTINUATION | FLAG_CONTINUED;
        track.entry_mut(1)[LINK_OFFSET] = 1;
        track.write(&mut fs.image).unwrap();
        assert!(matches!(fs.reload(), Err(DiskError::IntegrityError(_))));
    }

    #[test]
    fn test_missing_directory_data() {
        let mut image = DiskImage::create(DiskImageFormat::Vdk, Geometry::dragon_ss40()).unwrap();
        DragonDosFileSystem::init_disk(&mut image).unwrap();
        crate::filesystem::clear_sector_data(&mut image, 361);
        assert!(matches!(
            DragonDosFileSystem::probe(&image),
            Err(DiskError::InvalidFormat(_))
        ));
        assert!(DragonDosFileSystem::load(image).is_err());
    }

    #[test]
    fn test_dotted_name_keeps_last_extension() {
        let mut fs = blank(Geometry::dragon_ss40());
        fs.insert_file("hello.world.bin", b"data", false).unwrap();
        assert_eq!(fs.file_name(0).as_deref(), Some("HELLOWOR.BIN"));
        assert_eq!(fs.extract_file("HELLOWOR.BIN", false).unwrap(), b"data");
    }
}
