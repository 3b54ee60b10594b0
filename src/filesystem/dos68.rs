/// Smoke Signal Broadcasting DOS68
///
/// Single sided disks of 18 sectors of 128 bytes, addressed by (track,
/// sector) pairs. Every sector starts with next and previous links; data
/// sectors carry 124 bytes after them. Free sectors form one doubly
/// linked list whose head, tail and length live in the disk information
/// block at the start of the first directory sector.

use crate::error::{DiskError, Result};
use crate::filesystem::{
    join_name, split_name, DirectoryEntry, FileAttributes, FileInfo, FileSystem, FileSystemType,
    MountError, MountResult,
};
use crate::image::DiskImage;
use log::{debug, warn};
use std::collections::HashSet;

/// Sectors per track
pub const SECTORS_PER_TRACK: u8 = 18;
/// Sector size
pub const SECTOR_SIZE: usize = 128;
/// Payload bytes in a data sector
pub const SECTOR_DATA_SIZE: usize = 124;
/// File information block size
pub const FIB_SIZE: usize = 24;
/// File information blocks per directory sector
pub const FIBS_PER_SECTOR: usize = 5;
/// Disk type bit: double sided
pub const DISK_TYPE_DOUBLE_SIDED: u8 = 1 << 0;
/// Disk type bit: 8 inch media
pub const DISK_TYPE_8_INCH: u8 = 1 << 1;
/// Disk type bit: double density
pub const DISK_TYPE_DOUBLE_DENSITY: u8 = 1 << 2;
/// Disk type bit: 96 tpi
pub const DISK_TYPE_96_TPI: u8 = 1 << 3;
/// Disk type bit: protected master disk
pub const DISK_TYPE_PROTECTED: u8 = 1 << 7;
/// Sequential ASCII file
pub const FILE_TYPE_ASCII: u8 = 1;
/// Sequential binary file
pub const FILE_TYPE_BINARY: u8 = 2;

const LINK_HEADER_SIZE: usize = 4;
const DIR_HEADER_SIZE: usize = 8;
const TRACK_MASK: u8 = 0x7F;
const SECTOR_MASK: u8 = 0x1F;
const TRACK_MARK: u8 = 0x80;
const SECTOR_MARK: u8 = 0x40;
const FIRST_DIR_SECTOR: Ts = Ts { track: 0, sector: 1 };

/// A (track, sector) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ts {
    /// Track
    pub track: u8,
    /// Sector index on the track, from 0
    pub sector: u8,
}

impl Ts {
    const NONE: Ts = Ts { track: 0, sector: 0 };

    fn read(bytes: &[u8]) -> Self {
        Self {
            track: bytes[0] & TRACK_MASK,
            sector: bytes[1] & SECTOR_MASK,
        }
    }

    fn write(self, bytes: &mut [u8]) {
        if self.is_none() {
            bytes[..2].fill(0);
        } else {
            bytes[0] = self.track | TRACK_MARK;
            bytes[1] = self.sector | SECTOR_MARK;
        }
    }

    fn is_none(self) -> bool {
        self == Ts::NONE
    }
}

/// Disk information block, FIB 0 of the first directory sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInfo {
    /// Disk type bits
    pub disk_type: u8,
    /// Head of the free list
    pub next_free: Ts,
    /// Tail of the free list
    pub last_free: Ts,
    /// Sectors in the free list
    pub available: u16,
}

impl DiskInfo {
    const OFFSET: usize = DIR_HEADER_SIZE + 10;

    fn read(sector: &[u8]) -> Self {
        let b = &sector[Self::OFFSET..];
        Self {
            disk_type: b[0],
            next_free: Ts::read(&b[1..3]),
            last_free: Ts::read(&b[3..5]),
            available: u16::from_be_bytes([b[5], b[6]]),
        }
    }

    /// Media description from the disk type bits
    pub fn media(&self) -> String {
        let flag = |mask: u8, set: &str, clear: &str| {
            let text = if self.disk_type & mask != 0 { set } else { clear };
            text.to_string()
        };
        let mut parts = vec![
            flag(DISK_TYPE_8_INCH, "8 inch", "5.25 inch"),
            flag(DISK_TYPE_DOUBLE_SIDED, "double sided", "single sided"),
            flag(DISK_TYPE_DOUBLE_DENSITY, "double density", "single density"),
            flag(DISK_TYPE_96_TPI, "96 tpi", "48 tpi"),
        ];
        if self.disk_type & DISK_TYPE_PROTECTED != 0 {
            parts.push("protected".to_string());
        }
        parts.join(", ")
    }

    fn write(&self, sector: &mut [u8]) {
        let b = &mut sector[Self::OFFSET..];
        b[0] = self.disk_type;
        self.next_free.write(&mut b[1..3]);
        self.last_free.write(&mut b[3..5]);
        b[5..7].copy_from_slice(&self.available.to_be_bytes());
    }
}

/// File information block
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fib {
    name: String,
    ext: String,
    file_type: u8,
    first: Ts,
    last: Ts,
    sectors: u16,
    location: (Ts, usize),
}

impl Fib {
    fn parse(raw: &[u8], location: (Ts, usize)) -> Self {
        let text = |b: &[u8]| {
            b.iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as char)
                .collect::<String>()
        };
        Self {
            name: text(&raw[0..6]),
            ext: text(&raw[6..9]),
            file_type: raw[9],
            first: Ts::read(&raw[11..13]),
            last: Ts::read(&raw[13..15]),
            sectors: u16::from_be_bytes([raw[15], raw[16]]),
            location,
        }
    }

    fn write(&self, raw: &mut [u8]) {
        raw.fill(0);
        raw[..self.name.len()].copy_from_slice(self.name.as_bytes());
        raw[6..6 + self.ext.len()].copy_from_slice(self.ext.as_bytes());
        raw[9] = self.file_type;
        raw[10] = 0;
        self.first.write(&mut raw[11..13]);
        self.last.write(&mut raw[13..15]);
        raw[15..17].copy_from_slice(&self.sectors.to_be_bytes());
        raw[17..23].fill(0x55);
        raw[23] = 0xAA;
    }

    fn display_name(&self) -> String {
        join_name(&self.name, &self.ext)
    }
}

struct Catalog {
    info: DiskInfo,
    directory: Vec<Ts>,
    fibs: Vec<Fib>,
}

/// Sector access in (track, sector) terms
struct Disk<'a> {
    image: &'a DiskImage,
}

impl<'a> Disk<'a> {
    fn check(&self, ts: Ts) -> Result<()> {
        if ts.track >= self.image.tracks() || ts.sector >= SECTORS_PER_TRACK {
            return Err(DiskError::integrity(format!(
                "link to track {} sector {} is off the disk",
                ts.track, ts.sector
            )));
        }
        Ok(())
    }

    /// The 128 data bytes of a sector; shorter records are rejected
    fn sector(&self, ts: Ts) -> Result<&'a [u8]> {
        self.check(ts)?;
        let data = self.image.logical_sector(ts.track, 0, ts.sector)?;
        data.get(..SECTOR_SIZE).ok_or_else(|| {
            DiskError::invalid_format(format!(
                "track {} sector {} holds {} of {} bytes",
                ts.track,
                ts.sector,
                data.len(),
                SECTOR_SIZE
            ))
        })
    }

    /// Follow next links for `count` sectors from `start`
    fn chain(&self, start: Ts, count: usize) -> Result<Vec<Ts>> {
        let mut sectors = Vec::with_capacity(count);
        let mut visited = HashSet::new();
        let mut current = start;
        while sectors.len() < count {
            if current.is_none() {
                return Err(DiskError::integrity(format!(
                    "chain from {:?} ends after {} of {} sectors",
                    start,
                    sectors.len(),
                    count
                )));
            }
            if !visited.insert(current) {
                warn!("sector chain from {:?} loops at {:?}", start, current);
                return Err(DiskError::integrity(format!("sector chain loops at {:?}", current)));
            }
            let data = self.sector(current)?;
            sectors.push(current);
            current = Ts::read(&data[0..2]);
        }
        Ok(sectors)
    }
}

impl Catalog {
    fn read(image: &DiskImage) -> Result<Self> {
        let geometry = image.geometry();
        if geometry.sectors_per_track != SECTORS_PER_TRACK
            || geometry.sector_size as usize != SECTOR_SIZE
            || geometry.sides != 1
        {
            return Err(DiskError::geometry(format!(
                "DOS68 needs single sided 18x128 tracks, not {}",
                geometry
            )));
        }
        let disk = Disk { image };
        let total = image.geometry().total_sectors();

        let first = disk.sector(FIRST_DIR_SECTOR)?;
        let info = DiskInfo::read(first);
        if info.available as u32 > total {
            return Err(DiskError::invalid_format(format!(
                "{} free sectors on a {} sector disk",
                info.available, total
            )));
        }
        if info.available > 0 {
            disk.check(info.next_free)?;
            disk.check(info.last_free)?;
        }

        let mut directory = Vec::new();
        let mut fibs = Vec::new();
        let mut visited = HashSet::new();
        let mut current = FIRST_DIR_SECTOR;
        while !current.is_none() {
            if !visited.insert(current) {
                return Err(DiskError::integrity(format!(
                    "directory chain loops at {:?}",
                    current
                )));
            }
            let data = disk.sector(current)?;
            let start = if directory.is_empty() { 1 } else { 0 };
            for index in start..FIBS_PER_SECTOR {
                let offset = DIR_HEADER_SIZE + index * FIB_SIZE;
                let raw = &data[offset..offset + FIB_SIZE];
                if raw[0] != 0 {
                    fibs.push(Fib::parse(raw, (current, index)));
                }
            }
            directory.push(current);
            current = Ts::read(&data[0..2]);
        }
        debug!("DOS68 directory spans {} sectors", directory.len());
        Ok(Self {
            info,
            directory,
            fibs,
        })
    }
}

/// DOS68 driver
pub struct Dos68FileSystem {
    image: DiskImage,
    catalog: Catalog,
    root: DirectoryEntry,
}

impl Dos68FileSystem {
    /// The disk information block
    pub fn disk_info(&self) -> DiskInfo {
        self.catalog.info
    }

    fn from_catalog(image: DiskImage, catalog: Catalog) -> Self {
        let mut fs = Self {
            image,
            catalog,
            root: DirectoryEntry::default(),
        };
        fs.build_tree();
        fs
    }

    fn build_tree(&mut self) {
        let mut root = DirectoryEntry::root(self.volume_label());
        for fib in &self.catalog.fibs {
            root.add_child(DirectoryEntry::file(fib.display_name()));
        }
        self.root = root;
    }

    fn reload(&mut self) -> Result<()> {
        self.catalog = Catalog::read(&self.image)?;
        self.build_tree();
        Ok(())
    }

    fn find(&self, name: &str) -> Result<&Fib> {
        let wanted = name.trim().trim_end_matches('.');
        self.catalog
            .fibs
            .iter()
            .find(|f| f.display_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DiskError::FileNotFound(name.to_string()))
    }

    fn sector_mut(&mut self, ts: Ts) -> Result<&mut [u8]> {
        Disk { image: &self.image }.sector(ts)?;
        let data = self.image.logical_sector_mut(ts.track, 0, ts.sector)?;
        Ok(&mut data[..SECTOR_SIZE])
    }

    fn write_links(&mut self, ts: Ts, next: Ts, prev: Ts) -> Result<()> {
        let sector = self.sector_mut(ts)?;
        next.write(&mut sector[0..2]);
        prev.write(&mut sector[2..4]);
        Ok(())
    }

    /// Take `count` sectors from the head of the free list
    fn take_free(&mut self, info: &mut DiskInfo, count: usize) -> Result<Vec<Ts>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if count > info.available as usize {
            return Err(DiskError::DiskFull);
        }
        let taken = Disk { image: &self.image }.chain(info.next_free, count)?;
        let last = taken[count - 1];
        let after = Ts::read(&Disk { image: &self.image }.sector(last)?[0..2]);
        info.available -= count as u16;
        if info.available == 0 {
            info.next_free = Ts::NONE;
            info.last_free = Ts::NONE;
        } else {
            info.next_free = after;
            let next_free = info.next_free;
            let sector = self.sector_mut(next_free)?;
            Ts::NONE.write(&mut sector[2..4]);
        }
        Ok(taken)
    }

    fn write_info(&mut self, info: DiskInfo) -> Result<()> {
        let sector = self.sector_mut(FIRST_DIR_SECTOR)?;
        info.write(sector);
        Ok(())
    }
}

impl FileSystem for Dos68FileSystem {
    fn load(image: DiskImage) -> MountResult<Self> {
        match Catalog::read(&image) {
            Ok(catalog) => Ok(Self::from_catalog(image, catalog)),
            Err(error) => Err(MountError::new(error, image)),
        }
    }

    fn probe(image: &DiskImage) -> Result<()> {
        Catalog::read(image).map(|_| ())
    }

    fn init_disk(image: &mut DiskImage) -> Result<()> {
        let geometry = *image.geometry();
        if geometry.sectors_per_track != SECTORS_PER_TRACK
            || geometry.sector_size as usize != SECTOR_SIZE
            || geometry.sides != 1
        {
            return Err(DiskError::geometry(format!(
                "DOS68 needs single sided 18x128 tracks, not {}",
                geometry
            )));
        }
        let free: Vec<Ts> = (0..geometry.tracks)
            .flat_map(|track| (0..SECTORS_PER_TRACK).map(move |sector| Ts { track, sector }))
            .skip(2)
            .collect();
        let available = u16::try_from(free.len())
            .map_err(|_| DiskError::geometry("too many sectors for DOS68"))?;

        let blank = [0u8; SECTOR_SIZE];
        image.write_lsn(0, &blank)?;

        for (i, &ts) in free.iter().enumerate() {
            let mut sector = blank;
            free.get(i + 1).copied().unwrap_or(Ts::NONE).write(&mut sector[0..2]);
            let prev = if i == 0 { Ts::NONE } else { free[i - 1] };
            prev.write(&mut sector[2..4]);
            image.write_lsn(geometry.lsn(ts.track, 0, ts.sector), &sector)?;
        }

        let info = DiskInfo {
            // 77 track media is 8 inch
            disk_type: if geometry.tracks >= 77 { DISK_TYPE_8_INCH } else { 0 },
            next_free: free.first().copied().unwrap_or(Ts::NONE),
            last_free: free.last().copied().unwrap_or(Ts::NONE),
            available,
        };
        let mut directory = blank;
        info.write(&mut directory);
        image.write_lsn(
            geometry.lsn(FIRST_DIR_SECTOR.track, 0, FIRST_DIR_SECTOR.sector),
            &directory,
        )?;
        Ok(())
    }

    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Dos68
    }

    fn volume_label(&self) -> String {
        "DOS68 Disk".to_string()
    }

    fn variant(&self) -> String {
        self.catalog.info.media()
    }

    fn files_num(&self) -> usize {
        self.catalog.fibs.len()
    }

    fn file_info(&self, index: usize) -> Option<FileInfo> {
        self.catalog.fibs.get(index).map(|fib| FileInfo {
            name: fib.display_name(),
            size: fib.sectors as usize * SECTOR_DATA_SIZE,
            attributes: FileAttributes::default(),
            ok: true,
        })
    }

    fn free_size(&self) -> usize {
        self.catalog.info.available as usize * SECTOR_DATA_SIZE
    }

    fn root(&self) -> &DirectoryEntry {
        &self.root
    }

    fn extract_file(&self, name: &str, _with_header: bool) -> Result<Vec<u8>> {
        let fib = self.find(name)?;
        let disk = Disk { image: &self.image };
        let mut data = Vec::with_capacity(fib.sectors as usize * SECTOR_DATA_SIZE);
        for ts in disk.chain(fib.first, fib.sectors as usize)? {
            data.extend_from_slice(&disk.sector(ts)?[LINK_HEADER_SIZE..]);
        }
        Ok(data)
    }

    fn insert_file(&mut self, name: &str, data: &[u8], binary: bool) -> Result<()> {
        let (stem, ext) = split_name(name, 6, 3)?;
        let display = join_name(&stem, &ext);
        if self.find(&display).is_ok() {
            return Err(DiskError::filesystem(format!("{} already exists", display)));
        }
        let count = data.len().div_ceil(SECTOR_DATA_SIZE);

        let mut slot = None;
        for (n, &ts) in self.catalog.directory.iter().enumerate() {
            let sector = Disk { image: &self.image }.sector(ts)?;
            let start = if n == 0 { 1 } else { 0 };
            slot = (start..FIBS_PER_SECTOR)
                .find(|i| sector[DIR_HEADER_SIZE + i * FIB_SIZE] == 0)
                .map(|i| (ts, i));
            if slot.is_some() {
                break;
            }
        }
        let needs_dir_sector = slot.is_none();
        let mut info = self.catalog.info;
        if count + needs_dir_sector as usize > info.available as usize {
            return Err(DiskError::DiskFull);
        }

        let slot = match slot {
            Some(slot) => slot,
            None => {
                let new_dir = self.take_free(&mut info, 1)?[0];
                let last_dir = *self
                    .catalog
                    .directory
                    .last()
                    .ok_or_else(|| DiskError::integrity("empty directory chain"))?;
                debug!("directory full, chaining a new sector at {:?}", new_dir);
                let sector = self.sector_mut(new_dir)?;
                sector.fill(0);
                last_dir.write(&mut sector[2..4]);
                let sector = self.sector_mut(last_dir)?;
                new_dir.write(&mut sector[0..2]);
                (new_dir, 0)
            }
        };

        let sectors = self.take_free(&mut info, count)?;
        for (i, (&ts, chunk)) in sectors.iter().zip(data.chunks(SECTOR_DATA_SIZE)).enumerate() {
            let next = sectors.get(i + 1).copied().unwrap_or(Ts::NONE);
            let prev = if i == 0 { Ts::NONE } else { sectors[i - 1] };
            let sector = self.sector_mut(ts)?;
            sector.fill(0);
            sector[LINK_HEADER_SIZE..LINK_HEADER_SIZE + chunk.len()].copy_from_slice(chunk);
            next.write(&mut sector[0..2]);
            prev.write(&mut sector[2..4]);
        }

        let fib = Fib {
            name: stem,
            ext,
            file_type: if binary { FILE_TYPE_BINARY } else { FILE_TYPE_ASCII },
            first: sectors.first().copied().unwrap_or(Ts::NONE),
            last: sectors.last().copied().unwrap_or(Ts::NONE),
            sectors: count as u16,
            location: slot,
        };
        let (dir_ts, index) = slot;
        let offset = DIR_HEADER_SIZE + index * FIB_SIZE;
        fib.write(&mut self.sector_mut(dir_ts)?[offset..offset + FIB_SIZE]);

        self.write_info(info)?;
        self.reload()
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        let fib = self.find(name)?.clone();
        let sectors = Disk { image: &self.image }.chain(fib.first, fib.sectors as usize)?;
        let mut info = self.catalog.info;

        if let Some(&first) = sectors.first() {
            let tail = info.last_free;
            for (i, &ts) in sectors.iter().enumerate() {
                let next = sectors.get(i + 1).copied().unwrap_or(Ts::NONE);
                let prev = if i == 0 {
                    if info.available == 0 { Ts::NONE } else { tail }
                } else {
                    sectors[i - 1]
                };
                self.sector_mut(ts)?.fill(0);
                self.write_links(ts, next, prev)?;
            }
            if info.available == 0 {
                info.next_free = first;
            } else {
                let sector = self.sector_mut(tail)?;
                first.write(&mut sector[0..2]);
            }
            info.last_free = sectors[sectors.len() - 1];
            info.available = info
                .available
                .checked_add(sectors.len() as u16)
                .ok_or_else(|| DiskError::integrity("free sector count overflows"))?;
        }

        let (dir_ts, index) = fib.location;
        let offset = DIR_HEADER_SIZE + index * FIB_SIZE;
        self.sector_mut(dir_ts)?[offset..offset + FIB_SIZE].fill(0);
        self.write_info(info)?;
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
    use crate::filesystem::FileSystemRegistry;
    use crate::format::{DiskImageFormat, Geometry};

    fn blank(geometry: Geometry) -> Dos68FileSystem {
        let mut image = DiskImage::create(DiskImageFormat::Raw, geometry).unwrap();
        Dos68FileSystem::init_disk(&mut image).unwrap();
        Dos68FileSystem::load(image).unwrap()
    }

    fn free_list(fs: &Dos68FileSystem) -> Vec<Ts> {
        let info = fs.disk_info();
        Disk { image: &fs.image }
            .chain(info.next_free, info.available as usize)
            .unwrap()
    }

    #[test]
    fn test_init() {
        let fs = blank(Geometry::dos68_35());
        let info = fs.disk_info();
        assert_eq!(info.available, 35 * 18 - 2);
        assert_eq!(info.next_free, Ts { track: 0, sector: 2 });
        assert_eq!(info.last_free, Ts { track: 34, sector: 17 });
        assert_eq!(fs.free_size(), 628 * 124);
        assert_eq!(fs.files_num(), 0);
        assert_eq!(fs.volume_label(), "DOS68 Disk");
        assert_eq!(fs.name(), "Smoke Signal Broadcasting DOS68 filesystem");
        // the list runs in physical order and its tail links nowhere
        let list = free_list(&fs);
        assert_eq!(list[16], Ts { track: 1, sector: 0 });
        assert_eq!(*list.last().unwrap(), info.last_free);
    }

    #[test]
    fn test_disk_type() {
        let small = blank(Geometry::dos68_35());
        assert_eq!(small.disk_info().disk_type, 0);
        assert_eq!(small.variant(), "5.25 inch, single sided, single density, 48 tpi");

        let large = blank(Geometry::dos68_77());
        assert_eq!(large.disk_info().disk_type, DISK_TYPE_8_INCH);
        assert!(large.variant().starts_with("8 inch, single sided"));

        let info = DiskInfo {
            disk_type: DISK_TYPE_DOUBLE_SIDED | DISK_TYPE_PROTECTED,
            ..large.disk_info()
        };
        assert!(info.media().contains("double sided"));
        assert!(info.media().ends_with("protected"));
    }

    #[test]
    fn test_insert_extract_delete() {
        let mut fs = blank(Geometry::dos68_35());
        let free = fs.free_size();
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        fs.insert_file("hello.txt", &data, false).unwrap();

        assert_eq!(fs.files_num(), 1);
        let info = fs.file_info(0).unwrap();
        assert_eq!(info.name, "HELLO.TXT");
        assert_eq!(info.size, 3 * 124);
        assert_eq!(fs.catalog.fibs[0].file_type, FILE_TYPE_ASCII);
        let out = fs.extract_file("Hello.Txt", false).unwrap();
        assert_eq!(out.len(), 3 * 124);
        assert_eq!(&out[..300], &data[..]);
        assert!(out[300..].iter().all(|&b| b == 0));
        assert_eq!(fs.free_size(), free - 3 * 124);
        assert_eq!(fs.disk_info().next_free, Ts { track: 0, sector: 5 });

        // the FIB carries marked links and the reserved trailer
        let dir = fs.image.logical_sector(0, 0, 1).unwrap();
        let fib = &dir[DIR_HEADER_SIZE + FIB_SIZE..DIR_HEADER_SIZE + 2 * FIB_SIZE];
        assert_eq!(&fib[11..13], &[0x80, 0x42]);
        assert_eq!(&fib[17..24], &[0x55, 0x55, 0x55, 0x55, 0x55, 0x55, 0xAA]);

        fs.delete_file("HELLO.TXT").unwrap();
        assert_eq!(fs.files_num(), 0);
        assert_eq!(fs.free_size(), free);
        // freed sectors go to the tail
        assert_eq!(fs.disk_info().last_free, Ts { track: 0, sector: 4 });
        assert_eq!(free_list(&fs).len(), fs.disk_info().available as usize);
    }

    #[test]
    fn test_directory_grows() {
        let mut fs = blank(Geometry::dos68_35());
        for n in 0..4 {
            fs.insert_file(&format!("F{}", n), b"x", true).unwrap();
        }
        assert_eq!(fs.catalog.directory.len(), 1);
        let before = fs.disk_info().available;

        fs.insert_file("F4", b"y", true).unwrap();
        assert_eq!(fs.catalog.directory.len(), 2);
        // one data sector and the new directory sector
        assert_eq!(fs.disk_info().available, before - 2);
        assert_eq!(fs.files_num(), 5);
        assert_eq!(fs.catalog.fibs[4].file_type, FILE_TYPE_BINARY);
        assert_eq!(fs.extract_file("F4", false).unwrap()[0], b'y');
    }

    #[test]
    fn test_disk_full() {
        let mut fs = blank(Geometry::dos68_35());
        let too_big = vec![0u8; fs.free_size() + 1];
        assert!(matches!(
            fs.insert_file("BIG", &too_big, false),
            Err(DiskError::DiskFull)
        ));
        let exact = vec![7u8; fs.free_size()];
        fs.insert_file("BIG", &exact, false).unwrap();
        assert_eq!(fs.free_size(), 0);
        assert_eq!(fs.disk_info().next_free, Ts::NONE);
        fs.delete_file("BIG").unwrap();
        assert_eq!(fs.disk_info().next_free, Ts { track: 0, sector: 2 });
    }

    #[test]
    fn test_rejects() {
        let image = DiskImage::create(DiskImageFormat::Raw, Geometry::dos68_40()).unwrap();
        assert!(Dos68FileSystem::probe(&image).is_err());
        let dragon = DiskImage::create(DiskImageFormat::Raw, Geometry::dragon_ss40()).unwrap();
        assert!(matches!(
            Dos68FileSystem::probe(&dragon),
            Err(DiskError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_unavailable_sectors_after_imd() {
        let mut image = DiskImage::create(DiskImageFormat::Raw, Geometry::dos68_35()).unwrap();
        Dos68FileSystem::init_disk(&mut image).unwrap();
        for lsn in 1..18 {
            crate::filesystem::clear_sector_data(&mut image, lsn);
        }
        let codec = crate::io::codec_for(DiskImageFormat::Imd);
        let image = DiskImage::from_bytes(&codec.encode(&image).unwrap()).unwrap();
        assert_eq!(image.format(), DiskImageFormat::Imd);

        assert!(matches!(
            Dos68FileSystem::probe(&image),
            Err(DiskError::InvalidFormat(_))
        ));
        assert!(FileSystemRegistry::default().mount(image).is_err());
    }

    #[test]
    fn test_missing_chain_data() {
        let mut fs = blank(Geometry::dos68_35());
        fs.insert_file("DATA", &[7u8; 300], true).unwrap();
        let first = fs.catalog.fibs[0].first;
        let lsn = fs.image.geometry().lsn(first.track, 0, first.sector);
        crate::filesystem::clear_sector_data(&mut fs.image, lsn);
        assert!(matches!(
            fs.extract_file("DATA", false),
            Err(DiskError::InvalidFormat(_))
        ));
    }
}
