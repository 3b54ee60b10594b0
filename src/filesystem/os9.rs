/// OS-9 Random Block File manager
///
/// LSN 0 is the identification sector, the allocation bitmap follows it
/// (one bit per cluster, set when used), and every file, directories
/// included, is reached through a file descriptor sector listing up to 48
/// contiguous segments. All multi-byte fields are big-endian.

use crate::error::{DiskError, Result};
use crate::filesystem::{
    path_tokens, DirectoryEntry, FileAttributes, FileInfo, FileSystem, FileSystemType,
    MountError, MountResult,
};
use crate::image::DiskImage;
use chrono::{Datelike, Local, Timelike};
use log::{debug, warn};
use std::collections::HashSet;

/// Directory entry size
pub const DIR_ENTRY_SIZE: usize = 32;
/// Name field of a directory entry
pub const DIR_NAME_SIZE: usize = 28;
/// Offset of the descriptor LSN in a directory entry
const DIR_LSN_OFFSET: usize = 29;

/// Offset of the segment list in a file descriptor
const FD_SEGMENTS_OFFSET: usize = 0x10;
/// Segment list capacity
pub const MAX_SEGMENTS: usize = 48;
const SEGMENT_SIZE: usize = 5;

/// Descriptor attribute: directory
pub const ATTR_DIRECTORY: u8 = 0x80;
/// Descriptor attribute: owner may write
pub const ATTR_WRITE: u8 = 0x02;
/// Attributes given to inserted files
const FILE_ATTRIBUTES: u8 = 0x1B;
/// Attributes of a freshly formatted root directory
const ROOT_ATTRIBUTES: u8 = 0xBF;

const ROOT_DIR_SECTORS: u32 = 8;
const MAX_DEPTH: usize = 16;
const INIT_NAME: &str = "RETRODISK";

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be24(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([0, data[offset], data[offset + 1], data[offset + 2]])
}

fn put_be24(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 3].copy_from_slice(&value.to_be_bytes()[1..]);
}

/// Read a name whose last character carries the high bit
fn read_name(bytes: &[u8]) -> String {
    let mut name = String::new();
    for &b in bytes {
        if b == 0 {
            break;
        }
        name.push((b & 0x7F) as char);
        if b & 0x80 != 0 {
            break;
        }
    }
    name
}

fn write_name(field: &mut [u8], name: &str) {
    field.fill(0);
    let bytes = name.as_bytes();
    field[..bytes.len()].copy_from_slice(bytes);
    if let Some(last) = field[..bytes.len()].last_mut() {
        *last |= 0x80;
    }
}

/// Five byte Y M D H M stamp, years counted from 1900
fn os9_date() -> [u8; 5] {
    let now = Local::now();
    [
        (now.year() - 1900).clamp(0, 255) as u8,
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
    ]
}

/// Identification sector (LSN 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSector {
    /// DD_TOT, sectors on the media
    pub total_sectors: u32,
    /// DD_TKS, sectors per track
    pub track_sectors: u8,
    /// DD_MAP, bytes in the allocation bitmap
    pub map_bytes: u16,
    /// DD_BIT, sectors per bitmap bit
    pub cluster_sectors: u16,
    /// DD_DIR, LSN of the root directory descriptor
    pub root_fd: u32,
    /// DD_OWN
    pub owner: u16,
    /// DD_ATT
    pub attributes: u8,
    /// DD_DSK
    pub disk_id: u16,
    /// DD_FMT, density and sides
    pub format: u8,
    /// DD_SPT
    pub sectors_per_track: u16,
    /// DD_BT, bootstrap LSN
    pub boot_lsn: u32,
    /// DD_BSZ, bootstrap size
    pub boot_size: u16,
    /// DD_DAT, creation date
    pub date: [u8; 5],
    /// DD_NAM, volume name
    pub name: String,
    /// DD_LSNSize as stored, where 0 means 256
    pub lsn_size: u16,
}

impl IdSector {
    /// Parse LSN 0
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 0x6A {
            return Err(DiskError::parse(0, "identification sector too short"));
        }
        let mut date = [0u8; 5];
        date.copy_from_slice(&data[0x1A..0x1F]);
        Ok(Self {
            total_sectors: be24(data, 0x00),
            track_sectors: data[0x03],
            map_bytes: be16(data, 0x04),
            cluster_sectors: be16(data, 0x06),
            root_fd: be24(data, 0x08),
            owner: be16(data, 0x0B),
            attributes: data[0x0D],
            disk_id: be16(data, 0x0E),
            format: data[0x10],
            sectors_per_track: be16(data, 0x11),
            boot_lsn: be24(data, 0x15),
            boot_size: be16(data, 0x18),
            date,
            name: read_name(&data[0x1F..0x3F]),
            lsn_size: be16(data, 0x68),
        })
    }

    fn write(&self, data: &mut [u8]) {
        put_be24(data, 0x00, self.total_sectors);
        data[0x03] = self.track_sectors;
        data[0x04..0x06].copy_from_slice(&self.map_bytes.to_be_bytes());
        data[0x06..0x08].copy_from_slice(&self.cluster_sectors.to_be_bytes());
        put_be24(data, 0x08, self.root_fd);
        data[0x0B..0x0D].copy_from_slice(&self.owner.to_be_bytes());
        data[0x0D] = self.attributes;
        data[0x0E..0x10].copy_from_slice(&self.disk_id.to_be_bytes());
        data[0x10] = self.format;
        data[0x11..0x13].copy_from_slice(&self.sectors_per_track.to_be_bytes());
        put_be24(data, 0x15, self.boot_lsn);
        data[0x18..0x1A].copy_from_slice(&self.boot_size.to_be_bytes());
        data[0x1A..0x1F].copy_from_slice(&self.date);
        write_name(&mut data[0x1F..0x3F], &self.name);
        data[0x68..0x6A].copy_from_slice(&self.lsn_size.to_be_bytes());
    }

    /// Logical sector size in bytes
    pub fn sector_size(&self) -> usize {
        if self.lsn_size == 0 {
            256
        } else {
            self.lsn_size as usize
        }
    }

    /// Bitmap bits that describe real clusters
    fn cluster_count(&self) -> usize {
        let clusters = self.total_sectors.div_ceil(self.cluster_sectors.max(1) as u32) as usize;
        clusters.min(self.map_bytes as usize * 8)
    }
}

/// One contiguous run of sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First sector
    pub lsn: u32,
    /// Sectors in the run
    pub count: u16,
}

impl Segment {
    fn lsns(&self) -> std::ops::Range<u32> {
        self.lsn..self.lsn + self.count as u32
    }
}

/// File descriptor sector
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileDescriptor {
    lsn: u32,
    attributes: u8,
    size: u32,
    segments: Vec<Segment>,
}

impl FileDescriptor {
    fn read(image: &DiskImage, lsn: u32, total: u32) -> Result<Self> {
        if lsn == 0 || lsn >= total {
            return Err(DiskError::integrity(format!("file descriptor LSN {} out of range", lsn)));
        }
        let data = image.read_full_lsn(lsn)?;
        let mut segments = Vec::new();
        for raw in data[FD_SEGMENTS_OFFSET..]
            .chunks_exact(SEGMENT_SIZE)
            .take(MAX_SEGMENTS)
        {
            let segment = Segment {
                lsn: be24(raw, 0),
                count: be16(raw, 3),
            };
            if segment.lsn == 0 || segment.count == 0 {
                break;
            }
            if segment.lsn + segment.count as u32 > total {
                return Err(DiskError::integrity(format!(
                    "segment at LSN {} runs past the disk",
                    segment.lsn
                )));
            }
            segments.push(segment);
        }
        Ok(Self {
            lsn,
            attributes: data[0],
            size: u32::from_be_bytes([data[9], data[10], data[11], data[12]]),
            segments,
        })
    }

    fn to_sector(&self, sector_size: usize, link: u8) -> Vec<u8> {
        let mut data = vec![0u8; sector_size];
        let date = os9_date();
        data[0] = self.attributes;
        data[3..8].copy_from_slice(&date);
        data[8] = link;
        data[9..13].copy_from_slice(&self.size.to_be_bytes());
        data[13..16].copy_from_slice(&date[..3]);
        for (segment, raw) in self
            .segments
            .iter()
            .zip(data[FD_SEGMENTS_OFFSET..].chunks_exact_mut(SEGMENT_SIZE))
        {
            put_be24(raw, 0, segment.lsn);
            raw[3..5].copy_from_slice(&segment.count.to_be_bytes());
        }
        data
    }

    fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    fn allocated_sectors(&self) -> u32 {
        self.segments.iter().map(|s| s.count as u32).sum()
    }

    /// Sectors in file order
    fn lsns(&self) -> impl Iterator<Item = u32> + '_ {
        self.segments.iter().flat_map(|s| s.lsns())
    }
}

/// A named descriptor and where its directory entry sits
#[derive(Debug, Clone)]
struct Os9Node {
    name: String,
    fd: FileDescriptor,
    entry_location: (u32, usize),
    children: Vec<Os9Node>,
}

struct Catalog {
    id: IdSector,
    bitmap: Vec<u8>,
    root: FileDescriptor,
    nodes: Vec<Os9Node>,
}

impl Catalog {
    fn read(image: &DiskImage) -> Result<Self> {
        let id = IdSector::parse(image.read_full_lsn(0)?)?;
        let geometry = image.geometry();
        let expected = geometry.sides as u32 * geometry.tracks as u32 * geometry.sectors_per_track as u32;
        if id.total_sectors != expected {
            return Err(DiskError::geometry(format!(
                "DD_TOT {} for an image of {} sectors",
                id.total_sectors, expected
            )));
        }
        if id.track_sectors != geometry.sectors_per_track {
            return Err(DiskError::geometry(format!(
                "DD_TKS {} for {} sectors per track",
                id.track_sectors, geometry.sectors_per_track
            )));
        }
        if id.sector_size() != geometry.sector_size as usize {
            return Err(DiskError::geometry(format!(
                "logical sector size {} on {}-byte sectors",
                id.sector_size(),
                geometry.sector_size
            )));
        }
        if id.map_bytes == 0 || id.cluster_sectors == 0 {
            return Err(DiskError::invalid_format("empty allocation map"));
        }

        let sector_size = id.sector_size();
        let map_sectors = (id.map_bytes as usize).div_ceil(sector_size) as u32;
        if 1 + map_sectors > id.total_sectors {
            return Err(DiskError::invalid_format("allocation map runs past the disk"));
        }
        let mut bitmap = Vec::with_capacity(map_sectors as usize * sector_size);
        for lsn in 1..=map_sectors {
            bitmap.extend_from_slice(image.read_full_lsn(lsn)?);
        }
        bitmap.truncate(id.map_bytes as usize);

        let root = FileDescriptor::read(image, id.root_fd, id.total_sectors)?;
        if !root.is_directory() {
            return Err(DiskError::invalid_format("root descriptor is not a directory"));
        }
        let mut visited = HashSet::from([root.lsn]);
        let nodes = read_directory(image, &root, id.total_sectors, 0, &mut visited)?;
        Ok(Self {
            id,
            bitmap,
            root,
            nodes,
        })
    }

    fn is_used(&self, cluster: usize) -> bool {
        self.bitmap[cluster / 8] & (0x80 >> (cluster % 8)) != 0
    }

    fn set_used(&mut self, cluster: usize, used: bool) {
        let mask = 0x80 >> (cluster % 8);
        if used {
            self.bitmap[cluster / 8] |= mask;
        } else {
            self.bitmap[cluster / 8] &= !mask;
        }
    }

    /// Mark every cluster touched by `segment`
    fn mark(&mut self, segment: Segment, used: bool) {
        let bit = self.id.cluster_sectors as u32;
        let first = segment.lsn / bit;
        let last = (segment.lsn + segment.count as u32).div_ceil(bit);
        for cluster in first..last.min(self.id.cluster_count() as u32) {
            self.set_used(cluster as usize, used);
        }
    }

    fn free_clusters(&self) -> usize {
        (0..self.id.cluster_count()).filter(|&c| !self.is_used(c)).count()
    }

    /// Runs of free clusters as (first, length)
    fn free_runs(&self) -> Vec<(usize, usize)> {
        let mut runs: Vec<(usize, usize)> = Vec::new();
        for cluster in 0..self.id.cluster_count() {
            if self.is_used(cluster) {
                continue;
            }
            match runs.last_mut() {
                Some((start, len)) if *start + *len == cluster => *len += 1,
                _ => runs.push((cluster, 1)),
            }
        }
        runs
    }

    /// Claim `sectors` sectors as one segment if a run is long enough,
    /// else as several
    fn allocate(&mut self, sectors: u32) -> Result<Vec<Segment>> {
        if sectors == 0 {
            return Ok(Vec::new());
        }
        let bit = self.id.cluster_sectors as usize;
        let clusters = (sectors as usize).div_ceil(bit);
        let runs = self.free_runs();
        let picked: Vec<(usize, usize)> = match runs.iter().find(|(_, len)| *len >= clusters) {
            Some(&(start, _)) => vec![(start, clusters)],
            None => {
                debug!("no run of {} clusters, splitting the file", clusters);
                let mut remaining = clusters;
                let mut picked = Vec::new();
                for &(start, len) in &runs {
                    if remaining == 0 {
                        break;
                    }
                    let take = len.min(remaining);
                    picked.push((start, take));
                    remaining -= take;
                }
                if remaining > 0 {
                    return Err(DiskError::DiskFull);
                }
                picked
            }
        };

        let mut remaining = sectors;
        let mut segments = Vec::new();
        for (start, len) in picked {
            let mut lsn = (start * bit) as u32;
            let mut run = ((len * bit) as u32).min(remaining);
            remaining -= run;
            while run > 0 {
                let count = run.min(u16::MAX as u32);
                segments.push(Segment {
                    lsn,
                    count: count as u16,
                });
                lsn += count;
                run -= count;
            }
        }
        if segments.len() > MAX_SEGMENTS {
            return Err(DiskError::filesystem("file too fragmented for one descriptor"));
        }
        for segment in &segments {
            self.mark(*segment, true);
        }
        Ok(segments)
    }
}

fn read_directory(
    image: &DiskImage,
    dir: &FileDescriptor,
    total: u32,
    depth: usize,
    visited: &mut HashSet<u32>,
) -> Result<Vec<Os9Node>> {
    let sector_size = image.geometry().sector_size as usize;
    let entries_per_sector = sector_size / DIR_ENTRY_SIZE;
    let entries = dir.size as usize / DIR_ENTRY_SIZE;
    let mut nodes = Vec::new();

    for (n, lsn) in dir.lsns().enumerate() {
        if n * entries_per_sector >= entries {
            break;
        }
        let data = image.read_full_lsn(lsn)?;
        for (i, raw) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
            if n * entries_per_sector + i >= entries {
                break;
            }
            if raw[0] == 0 {
                continue;
            }
            let name = read_name(&raw[..DIR_NAME_SIZE]);
            if name == "." || name == ".." {
                continue;
            }
            let fd = FileDescriptor::read(image, be24(raw, DIR_LSN_OFFSET), total)?;
            let mut node = Os9Node {
                name,
                fd,
                entry_location: (lsn, i * DIR_ENTRY_SIZE),
                children: Vec::new(),
            };
            if node.fd.is_directory() {
                if depth >= MAX_DEPTH || !visited.insert(node.fd.lsn) {
                    warn!("directory {} loops back or nests too deep, not descending", node.name);
                } else {
                    node.children = read_directory(image, &node.fd, total, depth + 1, visited)?;
                }
            }
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// OS-9 RBF driver
pub struct Os9FileSystem {
    image: DiskImage,
    catalog: Catalog,
    files: Vec<(String, Os9Node)>,
    root: DirectoryEntry,
}

impl Os9FileSystem {
    /// The parsed identification sector
    pub fn id_sector(&self) -> &IdSector {
        &self.catalog.id
    }

    fn from_catalog(image: DiskImage, catalog: Catalog) -> Self {
        let mut fs = Self {
            image,
            catalog,
            files: Vec::new(),
            root: DirectoryEntry::default(),
        };
        fs.index();
        fs
    }

    fn index(&mut self) {
        fn walk(
            nodes: &[Os9Node],
            prefix: &str,
            files: &mut Vec<(String, Os9Node)>,
            parent: &mut DirectoryEntry,
        ) {
            for node in nodes {
                let path = if prefix.is_empty() {
                    node.name.clone()
                } else {
                    format!("{}/{}", prefix, node.name)
                };
                files.push((path.clone(), node.clone()));
                if node.fd.is_directory() {
                    let mut dir = DirectoryEntry::directory(node.name.clone());
                    walk(&node.children, &path, files, &mut dir);
                    parent.add_child(dir);
                } else {
                    parent.add_child(DirectoryEntry::file(node.name.clone()));
                }
            }
        }
        let mut files = Vec::new();
        let mut root = DirectoryEntry::root(self.catalog.id.name.clone());
        walk(&self.catalog.nodes, "", &mut files, &mut root);
        self.files = files;
        self.root = root;
    }

    fn reload(&mut self) -> Result<()> {
        self.catalog = Catalog::read(&self.image)?;
        self.index();
        Ok(())
    }

    fn find(&self, path: &str) -> Result<&Os9Node> {
        let wanted = path_tokens(path).join("/");
        self.files
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(&wanted))
            .map(|(_, node)| node)
            .ok_or_else(|| DiskError::FileNotFound(path.to_string()))
    }

    fn write_bitmap(&mut self) -> Result<()> {
        let sector_size = self.catalog.id.sector_size();
        let chunks: Vec<Vec<u8>> = self
            .catalog
            .bitmap
            .chunks(sector_size)
            .map(|c| c.to_vec())
            .collect();
        for (n, chunk) in chunks.into_iter().enumerate() {
            let lsn = 1 + n as u32;
            let mut sector = self.image.read_full_lsn(lsn)?.to_vec();
            sector[..chunk.len()].copy_from_slice(&chunk);
            self.image.write_lsn(lsn, &sector)?;
        }
        Ok(())
    }

    /// First unused directory slot: (sector, offset, index)
    fn free_slot(&self, dir: &FileDescriptor) -> Result<(u32, usize, usize)> {
        let sector_size = self.catalog.id.sector_size();
        let per_sector = sector_size / DIR_ENTRY_SIZE;
        let used = dir.size as usize / DIR_ENTRY_SIZE;
        for (n, lsn) in dir.lsns().enumerate() {
            let data = self.image.read_full_lsn(lsn)?;
            for (i, raw) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
                let index = n * per_sector + i;
                if index >= used || raw[0] == 0 {
                    return Ok((lsn, i * DIR_ENTRY_SIZE, index));
                }
            }
        }
        Err(DiskError::DirectoryFull)
    }
}

impl FileSystem for Os9FileSystem {
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
        let sector_size = geometry.sector_size as usize;
        if sector_size < 128 {
            return Err(DiskError::geometry("sectors too small for OS-9"));
        }
        let total = geometry.total_sectors();
        if total >= 1 << 24 {
            return Err(DiskError::geometry("disk too large for 24-bit LSNs"));
        }

        let mut cluster_sectors: u32 = 1;
        while total.div_ceil(cluster_sectors).div_ceil(8) > u16::MAX as u32 {
            cluster_sectors *= 2;
        }
        let clusters = total.div_ceil(cluster_sectors);
        let map_bytes = clusters.div_ceil(8);
        let map_sectors = map_bytes.div_ceil(sector_size as u32);
        let root_fd = 1 + map_sectors;
        let root_data = root_fd + 1;
        if root_data + ROOT_DIR_SECTORS > total {
            return Err(DiskError::DiskFull);
        }

        let mut format = 0x02;
        if geometry.sides == 2 {
            format |= 0x01;
        }
        if geometry.tracks > 40 {
            format |= 0x04;
        }
        let id = IdSector {
            total_sectors: total,
            track_sectors: geometry.sectors_per_track,
            map_bytes: map_bytes as u16,
            cluster_sectors: cluster_sectors as u16,
            root_fd,
            owner: 0,
            attributes: 0xFF,
            disk_id: (Local::now().timestamp() & 0xFFFF) as u16,
            format,
            sectors_per_track: geometry.sectors_per_track as u16,
            boot_lsn: 0,
            boot_size: 0,
            date: os9_date(),
            name: INIT_NAME.to_string(),
            lsn_size: if sector_size == 256 { 0 } else { sector_size as u16 },
        };
        let mut sector = vec![0u8; sector_size];
        id.write(&mut sector);
        image.write_lsn(0, &sector)?;

        let mut bitmap = vec![0u8; (map_sectors as usize) * sector_size];
        let used_clusters = (root_data + ROOT_DIR_SECTORS).div_ceil(cluster_sectors);
        for cluster in (0..used_clusters).chain(clusters..map_bytes * 8) {
            bitmap[cluster as usize / 8] |= 0x80 >> (cluster % 8);
        }
        for (n, chunk) in bitmap.chunks(sector_size).enumerate() {
            image.write_lsn(1 + n as u32, chunk)?;
        }

        let root = FileDescriptor {
            lsn: root_fd,
            attributes: ROOT_ATTRIBUTES,
            size: 2 * DIR_ENTRY_SIZE as u32,
            segments: vec![Segment {
                lsn: root_data,
                count: ROOT_DIR_SECTORS as u16,
            }],
        };
        image.write_lsn(root_fd, &root.to_sector(sector_size, 1))?;

        let mut dir = vec![0u8; sector_size];
        for (slot, name) in [".", ".."].iter().enumerate() {
            let entry = &mut dir[slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE];
            write_name(&mut entry[..DIR_NAME_SIZE], name);
            put_be24(entry, DIR_LSN_OFFSET, root_fd);
        }
        image.write_lsn(root_data, &dir)?;
        let blank = vec![0u8; sector_size];
        for lsn in root_data + 1..root_data + ROOT_DIR_SECTORS {
            image.write_lsn(lsn, &blank)?;
        }
        Ok(())
    }

    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Os9Rbf
    }

    fn volume_label(&self) -> String {
        self.catalog.id.name.clone()
    }

    fn files_num(&self) -> usize {
        self.files.len()
    }

    fn file_info(&self, index: usize) -> Option<FileInfo> {
        self.files.get(index).map(|(path, node)| FileInfo {
            name: path.clone(),
            size: node.fd.size as usize,
            attributes: FileAttributes {
                directory: node.fd.is_directory(),
                protected: node.fd.attributes & ATTR_WRITE == 0,
            },
            ok: node.fd.allocated_sectors() as usize * self.catalog.id.sector_size()
                >= node.fd.size as usize,
        })
    }

    fn free_size(&self) -> usize {
        self.catalog.free_clusters()
            * self.catalog.id.cluster_sectors as usize
            * self.catalog.id.sector_size()
    }

    fn root(&self) -> &DirectoryEntry {
        &self.root
    }

    fn extract_file(&self, name: &str, _with_header: bool) -> Result<Vec<u8>> {
        let node = self.find(name)?;
        if node.fd.is_directory() {
            return Err(DiskError::filesystem(format!("{} is a directory", name)));
        }
        let size = node.fd.size as usize;
        let mut data = Vec::with_capacity(size);
        for lsn in node.fd.lsns() {
            if data.len() >= size {
                break;
            }
            data.extend_from_slice(self.image.read_full_lsn(lsn)?);
        }
        if data.len() < size {
            return Err(DiskError::integrity(format!(
                "{} is {} bytes but only {} are allocated",
                name,
                size,
                data.len()
            )));
        }
        data.truncate(size);
        Ok(data)
    }

    fn insert_file(&mut self, name: &str, data: &[u8], _binary: bool) -> Result<()> {
        let tokens = path_tokens(name);
        let (file_name, parents) = tokens
            .split_last()
            .ok_or_else(|| DiskError::InvalidFilename(name.to_string()))?;
        if file_name.len() > DIR_NAME_SIZE
            || !file_name.is_ascii()
            || *file_name == "."
            || *file_name == ".."
        {
            return Err(DiskError::InvalidFilename(name.to_string()));
        }
        if self.find(name).is_ok() {
            return Err(DiskError::filesystem(format!("{} already exists", name)));
        }
        let size = u32::try_from(data.len()).map_err(|_| DiskError::DiskFull)?;

        let parent = if parents.is_empty() {
            self.catalog.root.clone()
        } else {
            let node = self.find(&parents.join("/"))?;
            if !node.fd.is_directory() {
                return Err(DiskError::filesystem(format!("{} is not a directory", parents.join("/"))));
            }
            node.fd.clone()
        };
        let (slot_lsn, slot_offset, slot_index) = self.free_slot(&parent)?;

        let sector_size = self.catalog.id.sector_size();
        let sectors = data.len().div_ceil(sector_size) as u32;
        if (1 + sectors as usize).div_ceil(self.catalog.id.cluster_sectors as usize)
            > self.catalog.free_clusters()
        {
            return Err(DiskError::DiskFull);
        }
        let fd_segment = self.catalog.allocate(1)?;
        let segments = match self.catalog.allocate(sectors) {
            Ok(segments) => segments,
            Err(e) => {
                self.catalog.mark(fd_segment[0], false);
                return Err(e);
            }
        };
        let fd = FileDescriptor {
            lsn: fd_segment[0].lsn,
            attributes: FILE_ATTRIBUTES,
            size,
            segments,
        };

        for (lsn, chunk) in fd.lsns().zip(data.chunks(sector_size)) {
            let mut sector = chunk.to_vec();
            sector.resize(sector_size, 0);
            self.image.write_lsn(lsn, &sector)?;
        }
        self.image.write_lsn(fd.lsn, &fd.to_sector(sector_size, 1))?;

        let mut sector = self.image.read_full_lsn(slot_lsn)?.to_vec();
        let entry = &mut sector[slot_offset..slot_offset + DIR_ENTRY_SIZE];
        entry.fill(0);
        write_name(&mut entry[..DIR_NAME_SIZE], file_name);
        put_be24(entry, DIR_LSN_OFFSET, fd.lsn);
        self.image.write_lsn(slot_lsn, &sector)?;

        let needed = ((slot_index + 1) * DIR_ENTRY_SIZE) as u32;
        if needed > parent.size {
            let mut fd_sector = self.image.read_full_lsn(parent.lsn)?.to_vec();
            fd_sector[9..13].copy_from_slice(&needed.to_be_bytes());
            self.image.write_lsn(parent.lsn, &fd_sector)?;
        }

        self.write_bitmap()?;
        self.reload()
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        let node = self.find(name)?.clone();
        if node.fd.is_directory() {
            return Err(DiskError::filesystem(format!("{} is a directory", name)));
        }
        for segment in &node.fd.segments {
            self.catalog.mark(*segment, false);
        }
        self.catalog.mark(
            Segment {
                lsn: node.fd.lsn,
                count: 1,
            },
            false,
        );
        self.write_bitmap()?;

        let (lsn, offset) = node.entry_location;
        let mut sector = self.image.read_full_lsn(lsn)?.to_vec();
        sector[offset] = 0;
        self.image.write_lsn(lsn, &sector)?;
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
