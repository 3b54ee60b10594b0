/// FAT12 filesystem for 512-byte sector PC disks
///
/// Layout: boot sector with the BIOS parameter block, one or more copies of
/// the packed 12-bit FAT, a fixed root directory, then the cluster area.

use crate::error::{DiskError, Result};
use crate::filesystem::{
    join_name, path_tokens, split_name, DirectoryEntry, FileAttributes, FileInfo, FileSystem,
    FileSystemType, MountError, MountResult,
};
use crate::image::DiskImage;
use crate::io::read_u16_le;
use chrono::{Datelike, Local, Timelike};
use log::{trace, warn};
use std::collections::HashSet;

/// The only sector size FAT12 disks use here
pub const SECTOR_SIZE: usize = 512;
/// Directory entry size
pub const ENTRY_SIZE: usize = 32;
/// Cells at or above this end a chain
pub const END_OF_CHAIN: u16 = 0xFF0;

/// Read-only attribute
pub const ATTR_READ_ONLY: u8 = 0x01;
/// Volume label attribute
pub const ATTR_VOLUME_LABEL: u8 = 0x08;
/// Subdirectory attribute
pub const ATTR_DIRECTORY: u8 = 0x10;
/// Archive attribute
pub const ATTR_ARCHIVE: u8 = 0x20;
/// Attribute combination marking a long file name fragment
pub const ATTR_LONG_NAME: u8 = 0x0F;

const DELETED_MARK: u8 = 0xE5;
const MAX_DEPTH: usize = 16;
const INIT_LABEL: &str = "RETRODISK";

/// BIOS parameter block fields from the boot sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    /// Bytes per sector
    pub bytes_per_sector: u16,
    /// Sectors per cluster
    pub sectors_per_cluster: u8,
    /// Sectors before the first FAT
    pub reserved_sectors: u16,
    /// Number of FAT copies
    pub fat_count: u8,
    /// Root directory capacity
    pub root_entries: u16,
    /// Sectors on the volume
    pub total_sectors: u16,
    /// Media descriptor
    pub media: u8,
    /// Sectors per FAT copy
    pub sectors_per_fat: u16,
    /// Sectors per track
    pub sectors_per_track: u16,
    /// Heads
    pub heads: u16,
    /// Volume label from the extended block, if present
    pub volume_label: String,
    /// Filesystem type string from the extended block, if present
    pub fs_type: String,
}

impl BiosParameterBlock {
    /// Parse a boot sector
    pub fn parse(boot: &[u8]) -> Result<Self> {
        if boot.len() < SECTOR_SIZE {
            return Err(DiskError::parse(0, "boot sector too short"));
        }
        let text = |range: std::ops::Range<usize>| {
            String::from_utf8_lossy(&boot[range]).trim_end().to_string()
        };
        let extended = boot[38] == 0x29;
        Ok(Self {
            bytes_per_sector: read_u16_le(boot, 11),
            sectors_per_cluster: boot[13],
            reserved_sectors: read_u16_le(boot, 14),
            fat_count: boot[16],
            root_entries: read_u16_le(boot, 17),
            total_sectors: read_u16_le(boot, 19),
            media: boot[21],
            sectors_per_fat: read_u16_le(boot, 22),
            sectors_per_track: read_u16_le(boot, 24),
            heads: read_u16_le(boot, 26),
            volume_label: if extended { text(43..54) } else { String::new() },
            fs_type: if extended { text(54..62) } else { String::new() },
        })
    }

    /// Fill in a boot sector
    fn write(&self, boot: &mut [u8], volume_id: u32) {
        boot[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        boot[3..11].copy_from_slice(b"RETRODSK");
        boot[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        boot[13] = self.sectors_per_cluster;
        boot[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        boot[16] = self.fat_count;
        boot[17..19].copy_from_slice(&self.root_entries.to_le_bytes());
        boot[19..21].copy_from_slice(&self.total_sectors.to_le_bytes());
        boot[21] = self.media;
        boot[22..24].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        boot[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        boot[26..28].copy_from_slice(&self.heads.to_le_bytes());
        boot[38] = 0x29;
        boot[39..43].copy_from_slice(&volume_id.to_le_bytes());
        boot[43..54].copy_from_slice(format!("{:<11}", self.volume_label).as_bytes());
        boot[54..62].copy_from_slice(format!("{:<8}", self.fs_type).as_bytes());
        boot[510] = 0x55;
        boot[511] = 0xAA;
    }

    /// First sector of the root directory
    pub fn root_start(&self) -> u32 {
        self.reserved_sectors as u32 + self.fat_count as u32 * self.sectors_per_fat as u32
    }

    /// Sectors occupied by the root directory
    pub fn root_sectors(&self) -> u32 {
        (self.root_entries as u32 * ENTRY_SIZE as u32).div_ceil(SECTOR_SIZE as u32)
    }

    /// First sector of cluster 2
    pub fn data_start(&self) -> u32 {
        self.root_start() + self.root_sectors()
    }

    /// Highest valid cluster number
    pub fn max_cluster(&self) -> u16 {
        let data = (self.total_sectors as u32).saturating_sub(self.data_start());
        (data / self.sectors_per_cluster.max(1) as u32 + 1) as u16
    }

    /// Bytes per cluster
    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    /// Parameters for formatting a disk of the given shape
    pub fn for_geometry(tracks: u8, sides: u8, spt: u8) -> Self {
        let total = tracks as u16 * sides as u16 * spt as u16;
        let (sectors_per_cluster, root_entries, sectors_per_fat, media) = match (tracks, sides, spt) {
            (40, 2, 9) => (2, 112, 2, 0xFD),
            (80, 2, 9) => (2, 112, 3, 0xF9),
            (80, 2, 18) => (1, 224, 9, 0xF0),
            _ => Self::derive_layout(total),
        };
        Self {
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster,
            reserved_sectors: 1,
            fat_count: 2,
            root_entries,
            total_sectors: total,
            media,
            sectors_per_fat,
            sectors_per_track: spt as u16,
            heads: sides as u16,
            volume_label: INIT_LABEL.to_string(),
            fs_type: "FAT12".to_string(),
        }
    }

    fn derive_layout(total: u16) -> (u8, u16, u16, u8) {
        let mut spc: u8 = 1;
        while total as u32 / spc as u32 >= 4085 && spc < 64 {
            spc *= 2;
        }
        let root_entries: u16 = if total >= 2880 { 224 } else if total >= 720 { 112 } else { 64 };
        let root_sectors = (root_entries as u32 * ENTRY_SIZE as u32).div_ceil(SECTOR_SIZE as u32);
        let mut spf: u32 = 1;
        loop {
            let data = (total as u32).saturating_sub(1 + 2 * spf + root_sectors);
            let clusters = data / spc as u32;
            if ((clusters + 2) * 3).div_ceil(2) <= spf * SECTOR_SIZE as u32 {
                break;
            }
            spf += 1;
        }
        (spc, root_entries, spf as u16, 0xF0)
    }
}

/// Unpack FAT bytes into 12-bit cells, two cells per three bytes
pub fn unpack_fat(bytes: &[u8]) -> Vec<u16> {
    let mut cells = Vec::with_capacity(bytes.len() * 2 / 3);
    for triple in bytes.chunks_exact(3) {
        let (b0, b1, b2) = (triple[0] as u16, triple[1] as u16, triple[2] as u16);
        cells.push(b0 | ((b1 & 0x0F) << 8));
        cells.push((b1 >> 4) | (b2 << 4));
    }
    cells
}

/// Pack 12-bit cells into `len` FAT bytes
pub fn pack_fat(cells: &[u16], len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    for (pair, out) in cells.chunks(2).zip(bytes.chunks_mut(3)) {
        let a = pair[0] & 0x0FFF;
        let b = pair.get(1).copied().unwrap_or(0) & 0x0FFF;
        let packed = [a as u8, ((a >> 8) as u8) | ((b << 4) as u8), (b >> 4) as u8];
        let n = out.len();
        out.copy_from_slice(&packed[..n]);
    }
    bytes
}

/// DOS (time, date) words for now
fn dos_timestamp() -> (u16, u16) {
    let now = Local::now();
    let time = ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    let year = (now.year() - 1980).clamp(0, 127) as u16;
    let date = (year << 9) | ((now.month() as u16) << 5) | now.day() as u16;
    (time, date)
}

/// A parsed directory entry
#[derive(Debug, Clone)]
struct FatEntry {
    name: String,
    attributes: u8,
    first_cluster: u16,
    size: u32,
    /// Sector and byte offset of the entry, for rewriting it
    location: (u32, usize),
    children: Vec<FatEntry>,
}

impl FatEntry {
    fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }
}

/// One line of the flattened listing
#[derive(Debug, Clone)]
struct FatFile {
    path: String,
    entry: FatEntry,
}

struct Catalog {
    bpb: BiosParameterBlock,
    fat: Vec<u16>,
    entries: Vec<FatEntry>,
    label: Option<String>,
}

impl Catalog {
    fn read(image: &DiskImage) -> Result<Self> {
        if image.geometry().sector_size as usize != SECTOR_SIZE {
            return Err(DiskError::GeometryMismatch(format!(
                "FAT12 needs 512-byte sectors, not {}",
                image.geometry().sector_size
            )));
        }
        let bpb = BiosParameterBlock::parse(image.read_full_lsn(0)?)?;
        if bpb.bytes_per_sector as usize != SECTOR_SIZE
            || bpb.sectors_per_cluster == 0
            || bpb.fat_count == 0
            || bpb.sectors_per_fat == 0
            || bpb.root_entries == 0
        {
            return Err(DiskError::invalid_format("no FAT12 parameter block"));
        }
        if bpb.heads != image.sides() as u16 {
            return Err(DiskError::GeometryMismatch(format!(
                "{} heads on a {} sided image",
                bpb.heads,
                image.sides()
            )));
        }
        if bpb.total_sectors as u32 > image.geometry().total_sectors()
            || bpb.data_start() >= bpb.total_sectors as u32
        {
            return Err(DiskError::GeometryMismatch(format!(
                "{} sectors on a {} sector image",
                bpb.total_sectors,
                image.geometry().total_sectors()
            )));
        }

        let mut packed = Vec::with_capacity(bpb.sectors_per_fat as usize * SECTOR_SIZE);
        for s in 0..bpb.sectors_per_fat as u32 {
            packed.extend_from_slice(image.read_full_lsn(bpb.reserved_sectors as u32 + s)?);
        }
        let fat = unpack_fat(&packed);
        if fat.len() <= bpb.max_cluster() as usize {
            return Err(DiskError::invalid_format("FAT too small for the volume"));
        }

        let mut catalog = Self {
            bpb,
            fat,
            entries: Vec::new(),
            label: None,
        };
        let root_sectors: Vec<u32> =
            (catalog.bpb.root_start()..catalog.bpb.data_start()).collect();
        let mut visited = HashSet::new();
        catalog.entries = catalog.read_directory(image, &root_sectors, 0, &mut visited)?;
        Ok(catalog)
    }

    fn cluster_sectors(&self, cluster: u16) -> std::ops::Range<u32> {
        let start = self.bpb.data_start() + (cluster as u32 - 2) * self.bpb.sectors_per_cluster as u32;
        start..start + self.bpb.sectors_per_cluster as u32
    }

    /// Clusters of the chain starting at `start`
    fn chain(&self, start: u16) -> Result<Vec<u16>> {
        let mut clusters = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;
        while (2..END_OF_CHAIN).contains(&current) {
            if current > self.bpb.max_cluster() {
                return Err(DiskError::integrity(format!(
                    "cluster {} beyond the volume",
                    current
                )));
            }
            if !visited.insert(current) {
                warn!("FAT chain from cluster {} loops at {}", start, current);
                return Err(DiskError::integrity(format!(
                    "FAT chain from cluster {} loops at {}",
                    start, current
                )));
            }
            clusters.push(current);
            current = self.fat[current as usize];
        }
        if current < 2 && !clusters.is_empty() {
            return Err(DiskError::integrity(format!(
                "FAT chain from cluster {} runs into a free cell",
                start
            )));
        }
        Ok(clusters)
    }

    fn read_directory(
        &mut self,
        image: &DiskImage,
        sectors: &[u32],
        depth: usize,
        visited: &mut HashSet<u16>,
    ) -> Result<Vec<FatEntry>> {
        let mut entries = Vec::new();
        'sectors: for &lsn in sectors {
            let data = image.read_full_lsn(lsn)?;
            for (i, raw) in data.chunks_exact(ENTRY_SIZE).enumerate() {
                match raw[0] {
                    0 => break 'sectors,
                    DELETED_MARK | b'.' => continue,
                    _ => {}
                }
                let attributes = raw[11];
                if attributes & ATTR_LONG_NAME == ATTR_LONG_NAME {
                    continue;
                }
                let text = |b: &[u8]| String::from_utf8_lossy(b).trim_end().to_string();
                if attributes & ATTR_VOLUME_LABEL != 0 {
                    if depth == 0 {
                        self.label = Some(format!("{}{}", text(&raw[0..8]), text(&raw[8..11])));
                    }
                    continue;
                }
                entries.push(FatEntry {
                    name: join_name(&text(&raw[0..8]), &text(&raw[8..11])),
                    attributes,
                    first_cluster: read_u16_le(raw, 26),
                    size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
                    location: (lsn, i * ENTRY_SIZE),
                    children: Vec::new(),
                });
            }
        }

        for entry in entries.iter_mut().filter(|e| e.is_directory()) {
            if depth >= MAX_DEPTH || !visited.insert(entry.first_cluster) {
                warn!("skipping directory {} (loop or too deep)", entry.name);
                continue;
            }
            let clusters = self.chain(entry.first_cluster)?;
            let sectors: Vec<u32> = clusters
                .iter()
                .flat_map(|&c| self.cluster_sectors(c))
                .collect();
            trace!("directory {} spans {} sectors", entry.name, sectors.len());
            entry.children = self.read_directory(image, &sectors, depth + 1, visited)?;
        }
        Ok(entries)
    }
}

/// FAT12 driver
pub struct Fat12FileSystem {
    image: DiskImage,
    catalog: Catalog,
    files: Vec<FatFile>,
    root: DirectoryEntry,
}

impl Fat12FileSystem {
    /// The parsed BIOS parameter block
    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.catalog.bpb
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
        fn walk(entries: &[FatEntry], prefix: &str, files: &mut Vec<FatFile>, node: &mut DirectoryEntry) {
            for entry in entries {
                let path = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", prefix, entry.name)
                };
                files.push(FatFile {
                    path: path.clone(),
                    entry: entry.clone(),
                });
                if entry.is_directory() {
                    let mut dir = DirectoryEntry::directory(entry.name.clone());
                    walk(&entry.children, &path, files, &mut dir);
                    node.add_child(dir);
                } else {
                    node.add_child(DirectoryEntry::file(entry.name.clone()));
                }
            }
        }
        let mut files = Vec::new();
        let mut root = DirectoryEntry::root(self.volume_label());
        walk(&self.catalog.entries, "", &mut files, &mut root);
        self.files = files;
        self.root = root;
    }

    fn reload(&mut self) -> Result<()> {
        self.catalog = Catalog::read(&self.image)?;
        self.index();
        Ok(())
    }

    fn find(&self, name: &str) -> Result<&FatFile> {
        let wanted = path_tokens(name).join("/");
        self.files
            .iter()
            .find(|f| f.path.eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| DiskError::FileNotFound(name.to_string()))
    }

    fn write_fats(&mut self, cells: &[u16]) -> Result<()> {
        let bpb = &self.catalog.bpb;
        let bytes = pack_fat(cells, bpb.sectors_per_fat as usize * SECTOR_SIZE);
        let (reserved, spf, copies) = (
            bpb.reserved_sectors as u32,
            bpb.sectors_per_fat as u32,
            bpb.fat_count as u32,
        );
        for copy in 0..copies {
            for (s, sector) in bytes.chunks(SECTOR_SIZE).enumerate() {
                self.image.write_lsn(reserved + copy * spf + s as u32, sector)?;
            }
        }
        Ok(())
    }

    fn patch_sector(&mut self, lsn: u32, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut sector = self.image.read_full_lsn(lsn)?.to_vec();
        sector[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.image.write_lsn(lsn, &sector)
    }
}

impl FileSystem for Fat12FileSystem {
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
        if geometry.sector_size as usize != SECTOR_SIZE {
            return Err(DiskError::GeometryMismatch(format!(
                "FAT12 needs 512-byte sectors, not {}",
                geometry.sector_size
            )));
        }
        if geometry.total_sectors() > u16::MAX as u32 {
            return Err(DiskError::GeometryMismatch("volume too large for FAT12".to_string()));
        }
        let bpb = BiosParameterBlock::for_geometry(
            geometry.tracks,
            geometry.sides,
            geometry.sectors_per_track,
        );

        let mut boot = vec![0u8; SECTOR_SIZE];
        let volume_id = Local::now().timestamp() as u32;
        bpb.write(&mut boot, volume_id);
        image.write_lsn(0, &boot)?;

        let zero = vec![0u8; SECTOR_SIZE];
        for lsn in bpb.reserved_sectors as u32..bpb.data_start() {
            image.write_lsn(lsn, &zero)?;
        }
        let mut first = zero.clone();
        first[0..3].copy_from_slice(&[bpb.media, 0xFF, 0xFF]);
        for copy in 0..bpb.fat_count as u32 {
            image.write_lsn(bpb.reserved_sectors as u32 + copy * bpb.sectors_per_fat as u32, &first)?;
        }

        let mut root = zero;
        root[0..11].copy_from_slice(format!("{:<11}", INIT_LABEL).as_bytes());
        root[11] = ATTR_VOLUME_LABEL;
        let (time, date) = dos_timestamp();
        root[22..24].copy_from_slice(&time.to_le_bytes());
        root[24..26].copy_from_slice(&date.to_le_bytes());
        image.write_lsn(bpb.root_start(), &root)
    }

    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Fat12
    }

    fn variant(&self) -> String {
        self.catalog.bpb.fs_type.clone()
    }

    fn volume_label(&self) -> String {
        self.catalog
            .label
            .clone()
            .filter(|l| !l.is_empty())
            .or_else(|| Some(self.catalog.bpb.volume_label.clone()).filter(|l| !l.is_empty()))
            .unwrap_or_else(|| "FAT12 Disk".to_string())
    }

    fn files_num(&self) -> usize {
        self.files.len()
    }

    fn file_info(&self, index: usize) -> Option<FileInfo> {
        self.files.get(index).map(|f| FileInfo {
            name: f.path.clone(),
            size: f.entry.size as usize,
            attributes: FileAttributes {
                directory: f.entry.is_directory(),
                protected: f.entry.attributes & ATTR_READ_ONLY != 0,
            },
            ok: true,
        })
    }

    fn free_size(&self) -> usize {
        let max = self.catalog.bpb.max_cluster() as usize;
        let free = self.catalog.fat[2..=max].iter().filter(|&&c| c == 0).count();
        free * self.catalog.bpb.cluster_size()
    }

    fn root(&self) -> &DirectoryEntry {
        &self.root
    }

    fn extract_file(&self, name: &str, _with_header: bool) -> Result<Vec<u8>> {
        let file = self.find(name)?;
        if file.entry.is_directory() {
            return Err(DiskError::filesystem(format!("{} is a directory", file.path)));
        }
        let size = file.entry.size as usize;
        let mut data = Vec::with_capacity(size);
        for cluster in self.catalog.chain(file.entry.first_cluster)? {
            for lsn in self.catalog.cluster_sectors(cluster) {
                data.extend_from_slice(self.image.read_full_lsn(lsn)?);
            }
            if data.len() >= size {
                break;
            }
        }
        if data.len() < size {
            return Err(DiskError::integrity(format!(
                "{} has {} bytes allocated for {} bytes",
                file.path,
                data.len(),
                size
            )));
        }
        data.truncate(size);
        Ok(data)
    }

    fn insert_file(&mut self, name: &str, data: &[u8], _binary: bool) -> Result<()> {
        if path_tokens(name).len() != 1 {
            return Err(DiskError::filesystem("files can only be added to the root directory"));
        }
        let (stem, ext) = split_name(name, 8, 3)?;
        let display = join_name(&stem, &ext);
        if self.find(&display).is_ok() {
            return Err(DiskError::filesystem(format!("{} already exists", display)));
        }
        let size = u32::try_from(data.len()).map_err(|_| DiskError::DiskFull)?;

        let bpb = self.catalog.bpb.clone();
        let needed = data.len().div_ceil(bpb.cluster_size());
        let clusters: Vec<u16> = (2..=bpb.max_cluster())
            .filter(|&c| self.catalog.fat[c as usize] == 0)
            .take(needed)
            .collect();
        if clusters.len() < needed {
            return Err(DiskError::DiskFull);
        }

        // first unused root slot; a 0 slot is the end marker and moves down
        let mut slot = None;
        'search: for lsn in bpb.root_start()..bpb.data_start() {
            let sector = self.image.read_full_lsn(lsn)?;
            for (i, raw) in sector.chunks_exact(ENTRY_SIZE).enumerate() {
                if raw[0] == 0 || raw[0] == DELETED_MARK {
                    slot = Some((lsn, i * ENTRY_SIZE, raw[0] == 0));
                    break 'search;
                }
            }
        }
        let (slot_lsn, slot_offset, was_end) = slot.ok_or(DiskError::DirectoryFull)?;

        for (&cluster, chunk) in clusters.iter().zip(data.chunks(bpb.cluster_size())) {
            for (lsn, part) in self.catalog.cluster_sectors(cluster).zip(chunk.chunks(SECTOR_SIZE)) {
                let mut sector = part.to_vec();
                sector.resize(SECTOR_SIZE, 0);
                self.image.write_lsn(lsn, &sector)?;
            }
        }

        let mut cells = self.catalog.fat.clone();
        for pair in clusters.windows(2) {
            cells[pair[0] as usize] = pair[1];
        }
        if let Some(&last) = clusters.last() {
            cells[last as usize] = 0xFFF;
        }
        self.write_fats(&cells)?;

        let mut entry = [0u8; ENTRY_SIZE];
        entry[0..11].copy_from_slice(format!("{:<8}{:<3}", stem, ext).as_bytes());
        entry[11] = ATTR_ARCHIVE;
        let (time, date) = dos_timestamp();
        for offset in [14, 22] {
            entry[offset..offset + 2].copy_from_slice(&time.to_le_bytes());
            entry[offset + 2..offset + 4].copy_from_slice(&date.to_le_bytes());
        }
        entry[18..20].copy_from_slice(&date.to_le_bytes());
        entry[26..28].copy_from_slice(&clusters.first().copied().unwrap_or(0).to_le_bytes());
        entry[28..32].copy_from_slice(&size.to_le_bytes());
        self.patch_sector(slot_lsn, slot_offset, &entry)?;

        if was_end {
            let next = slot_offset + ENTRY_SIZE;
            if next < SECTOR_SIZE {
                self.patch_sector(slot_lsn, next, &[0])?;
            } else if slot_lsn + 1 < bpb.data_start() {
                self.patch_sector(slot_lsn + 1, 0, &[0])?;
            }
        }
        self.reload()
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        let file = self.find(name)?.clone();
        if file.entry.is_directory() {
            return Err(DiskError::filesystem(format!("{} is a directory", file.path)));
        }
        let mut cells = self.catalog.fat.clone();
        for cluster in self.catalog.chain(file.entry.first_cluster)? {
            cells[cluster as usize] = 0;
        }
        self.write_fats(&cells)?;
        let (lsn, offset) = file.entry.location;
        self.patch_sector(lsn, offset, &[DELETED_MARK])?;
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
    use proptest::prelude::*;

    fn blank(geometry: Geometry) -> Fat12FileSystem {
        let mut image = DiskImage::create(DiskImageFormat::Raw, geometry).unwrap();
        Fat12FileSystem::init_disk(&mut image).unwrap();
        Fat12FileSystem::load(image).unwrap()
    }

    /// Add a subdirectory holding one file by writing the sectors directly
    fn add_subdirectory(fs: &mut Fat12FileSystem) {
        let bpb = fs.bpb().clone();
        let mut cells = fs.catalog.fat.clone();
        // cluster 10 holds the directory, 11 the file
        cells[10] = 0xFFF;
        cells[11] = 0xFFF;
        fs.write_fats(&cells).unwrap();

        let mut dir = vec![0u8; bpb.cluster_size()];
        dir[0..11].copy_from_slice(b".          ");
        dir[11] = ATTR_DIRECTORY;
        dir[32..43].copy_from_slice(b"..         ");
        dir[43] = ATTR_DIRECTORY;
        dir[64..75].copy_from_slice(b"NOTES   TXT");
        dir[75] = ATTR_ARCHIVE | ATTR_READ_ONLY;
        dir[90..92].copy_from_slice(&11u16.to_le_bytes());
        dir[92..96].copy_from_slice(&5u32.to_le_bytes());
        let sectors: Vec<u32> = fs.catalog.cluster_sectors(10).collect();
        for (lsn, chunk) in sectors.iter().zip(dir.chunks(SECTOR_SIZE)) {
            fs.image.write_lsn(*lsn, chunk).unwrap();
        }
        let mut data = b"hello".to_vec();
        data.resize(SECTOR_SIZE, 0);
        let first = fs.catalog.cluster_sectors(11).start;
        fs.image.write_lsn(first, &data).unwrap();

        let mut entry = [0u8; ENTRY_SIZE];
        entry[0..11].copy_from_slice(b"DOCS       ");
        entry[11] = ATTR_DIRECTORY;
        entry[26..28].copy_from_slice(&10u16.to_le_bytes());
        // slot 1 of the root, after the volume label
        fs.patch_sector(bpb.root_start(), ENTRY_SIZE, &entry).unwrap();
        fs.reload().unwrap();
    }

    #[test]
    fn test_init_layout() {
        let fs = blank(Geometry::pc_360k());
        let bpb = fs.bpb();
        assert_eq!(bpb.sectors_per_cluster, 2);
        assert_eq!(bpb.root_entries, 112);
        assert_eq!(bpb.sectors_per_fat, 2);
        assert_eq!(bpb.total_sectors, 720);
        assert_eq!(bpb.data_start(), 1 + 4 + 7);
        assert_eq!(fs.volume_label(), "RETRODISK");
        assert_eq!(fs.variant(), "FAT12");
        assert_eq!(fs.files_num(), 0);
        assert_eq!(fs.free_size(), (bpb.max_cluster() as usize - 1) * 1024);
        assert_eq!(&fs.image().read_lsn(0).unwrap()[510..], &[0x55, 0xAA]);

        let hd = blank(Geometry::pc_1440k());
        assert_eq!(hd.bpb().sectors_per_fat, 9);
        assert_eq!(hd.bpb().root_entries, 224);
    }

    #[test]
    fn test_derived_layout_fits() {
        let bpb = BiosParameterBlock::for_geometry(40, 1, 9);
        let needed = ((bpb.max_cluster() as usize + 1) * 3).div_ceil(2);
        assert!(needed <= bpb.sectors_per_fat as usize * SECTOR_SIZE);
    }

    #[test]
    fn test_insert_extract_delete() {
        let mut fs = blank(Geometry::pc_720k());
        let free = fs.free_size();
        let data: Vec<u8> = (0..3000).map(|i| (i * 7) as u8).collect();
        fs.insert_file("report.txt", &data, false).unwrap();

        assert_eq!(fs.files_num(), 1);
        let info = fs.file_info(0).unwrap();
        assert_eq!(info.name, "REPORT.TXT");
        assert_eq!(info.size, 3000);
        assert_eq!(fs.extract_file("/report.TXT", false).unwrap(), data);
        assert_eq!(fs.free_size(), free - 3 * 1024);

        // both FAT copies agree
        let bpb = fs.bpb().clone();
        for s in 0..bpb.sectors_per_fat as u32 {
            assert_eq!(
                fs.image().read_lsn(1 + s).unwrap(),
                fs.image().read_lsn(1 + bpb.sectors_per_fat as u32 + s).unwrap()
            );
        }

        fs.delete_file("REPORT.TXT").unwrap();
        assert_eq!(fs.files_num(), 0);
        assert_eq!(fs.free_size(), free);
        assert!(fs.insert_file("DIR/NESTED.TXT", b"x", false).is_err());
    }

    #[test]
    fn test_subdirectory_walk() {
        let mut fs = blank(Geometry::pc_360k());
        add_subdirectory(&mut fs);
        assert_eq!(fs.files_num(), 2);
        assert_eq!(fs.root().file_paths(), vec!["DOCS/NOTES.TXT"]);
        assert!(fs.root().find("docs").unwrap().is_directory);
        assert_eq!(fs.extract_file("DOCS/NOTES.TXT", false).unwrap(), b"hello");
        assert!(fs.file_info(1).unwrap().attributes.protected);
        assert!(fs.extract_file("DOCS", false).is_err());
        assert!(fs.delete_file("DOCS").is_err());
        fs.delete_file("docs/notes.txt").unwrap();
        assert_eq!(fs.files_num(), 1);
    }

    #[test]
    fn test_chain_cycle_is_an_error() {
        let mut fs = blank(Geometry::pc_360k());
        fs.insert_file("LOOP.BIN", &[1u8; 3000], false).unwrap();
        let first = fs.files[0].entry.first_cluster;
        let mut cells = fs.catalog.fat.clone();
        cells[first as usize + 1] = first;
        fs.write_fats(&cells).unwrap();
        fs.reload().unwrap();
        assert!(matches!(
            fs.extract_file("LOOP.BIN", false),
            Err(DiskError::IntegrityError(_))
        ));
    }

    #[test]
    fn test_rejects() {
        let image = DiskImage::create(DiskImageFormat::Raw, Geometry::pc_720k()).unwrap();
        assert!(Fat12FileSystem::probe(&image).is_err());
        let dragon = DiskImage::create(DiskImageFormat::Raw, Geometry::dragon_ss40()).unwrap();
        assert!(matches!(
            Fat12FileSystem::probe(&dragon),
            Err(DiskError::GeometryMismatch(_))
        ));
    }

    proptest! {
        #[test]
        fn fat_cells_survive_packing(cells in proptest::collection::vec(0u16..0x1000, 0..64)) {
            let mut cells = cells;
            if cells.len() % 2 == 1 {
                cells.push(0);
            }
            let bytes = pack_fat(&cells, cells.len() / 2 * 3);
            prop_assert_eq!(unpack_fat(&bytes), cells);
        }
    }

    #[test]
    fn test_missing_boot_and_fat_data() {
        let mut image = DiskImage::create(DiskImageFormat::Raw, Geometry::pc_720k()).unwrap();
        Fat12FileSystem::init_disk(&mut image).unwrap();
        let mut no_fat = image.clone();
        crate::filesystem::clear_sector_data(&mut no_fat, 1);
        assert!(matches!(
            Fat12FileSystem::probe(&no_fat),
            Err(DiskError::InvalidFormat(_))
        ));

        crate::filesystem::clear_sector_data(&mut image, 0);
        assert!(Fat12FileSystem::load(image).is_err());
    }
}
