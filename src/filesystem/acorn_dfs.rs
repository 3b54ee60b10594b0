/// Acorn DFS
///
/// The catalogue fills sectors 0 and 1 of track 0. Files are contiguous
/// and the catalogue lists them by descending start sector.

use crate::error::{DiskError, Result};
use crate::filesystem::{
    DirectoryEntry, FileAttributes, FileInfo, FileSystem, FileSystemType, MountError,
    MountResult,
};
use crate::image::DiskImage;
use log::debug;

/// Sector size
pub const SECTOR_SIZE: usize = 256;
/// Sectors per track
pub const SECTORS_PER_TRACK: u8 = 10;
/// Catalogue capacity
pub const MAX_FILES: usize = 31;
/// Catalogue size in bytes
pub const CATALOG_SIZE: usize = 2 * SECTOR_SIZE;
/// Longest file name
pub const MAX_NAME_LEN: usize = 7;
/// Largest sector count the catalogue can express
pub const MAX_SECTORS: u16 = 0x3FF;

const LOCKED: u8 = 0x80;

/// Name of a `*OPT 4` boot option
pub fn boot_option_name(option: u8) -> &'static str {
    match option & 3 {
        0 => "None",
        1 => "*LOAD",
        2 => "*RUN",
        _ => "*EXEC",
    }
}

/// One catalogue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfsEntry {
    /// Name without the directory, at most 7 characters
    pub name: String,
    /// Directory character
    pub directory: char,
    /// Locked against deletion
    pub locked: bool,
    /// Load address, 18 bits
    pub load: u32,
    /// Execution address, 18 bits
    pub exec: u32,
    /// Length in bytes, 18 bits
    pub length: u32,
    /// First sector
    pub start_sector: u16,
}

impl DfsEntry {
    /// "D.NAME"
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.directory, self.name)
    }

    /// Sectors the file occupies
    pub fn sectors(&self) -> u16 {
        self.length.div_ceil(SECTOR_SIZE as u32) as u16
    }

    fn matches(&self, directory: char, name: &str) -> bool {
        self.directory.eq_ignore_ascii_case(&directory) && self.name.eq_ignore_ascii_case(name)
    }
}

/// Split "D.NAME" or "NAME" into directory and name
fn parse_name(name: &str) -> (char, &str) {
    let bytes = name.as_bytes();
    if bytes.len() > 2 && bytes[1] == b'.' {
        (bytes[0] as char, &name[2..])
    } else {
        ('$', name)
    }
}

/// Catalogue of a DFS disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfsCatalog {
    /// Disk title, up to 12 characters
    pub title: String,
    /// Write cycle number
    pub cycle: u8,
    /// Boot option, 0 to 3
    pub boot_option: u8,
    /// Sectors on the disk
    pub sectors: u16,
    /// Files by descending start sector
    pub entries: Vec<DfsEntry>,
}

impl DfsCatalog {
    /// Empty catalogue for a disk of `sectors` sectors
    pub fn new(sectors: u16) -> Self {
        Self {
            title: String::new(),
            cycle: 0,
            boot_option: 0,
            sectors,
            entries: Vec::new(),
        }
    }

    /// Parse the first two sectors of a disk
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CATALOG_SIZE {
            return Err(DiskError::parse(data.len(), "catalogue needs two sectors"));
        }
        let (s0, s1) = (&data[..SECTOR_SIZE], &data[SECTOR_SIZE..CATALOG_SIZE]);
        if s1[5] % 8 != 0 || s1[5] as usize / 8 > MAX_FILES {
            return Err(DiskError::parse(SECTOR_SIZE + 5, format!("bad file count byte {:#04x}", s1[5])));
        }
        let text = |b: &[u8]| -> String {
            b.iter()
                .map(|&c| (c & 0x7F) as char)
                .collect::<String>()
                .trim_end_matches(['\0', ' '])
                .to_string()
        };
        let mut title_bytes = s0[..8].to_vec();
        title_bytes.extend_from_slice(&s1[..4]);

        let count = s1[5] as usize / 8;
        let entries = (0..count)
            .map(|i| {
                let n = &s0[8 + i * 8..16 + i * 8];
                let a = &s1[8 + i * 8..16 + i * 8];
                let mixed = a[6] as u32;
                DfsEntry {
                    name: text(&n[..7]),
                    directory: (n[7] & 0x7F) as char,
                    locked: n[7] & LOCKED != 0,
                    load: u16::from_le_bytes([a[0], a[1]]) as u32 | ((mixed >> 2) & 3) << 16,
                    exec: u16::from_le_bytes([a[2], a[3]]) as u32 | ((mixed >> 6) & 3) << 16,
                    length: u16::from_le_bytes([a[4], a[5]]) as u32 | ((mixed >> 4) & 3) << 16,
                    start_sector: (((mixed & 3) << 8) | a[7] as u32) as u16,
                }
            })
            .collect();

        Ok(Self {
            title: text(&title_bytes),
            cycle: s1[4],
            boot_option: (s1[6] >> 4) & 3,
            sectors: (((s1[6] & 3) as u16) << 8) | s1[7] as u16,
            entries,
        })
    }

    /// Serialise into the two catalogue sectors
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; CATALOG_SIZE];
        let title = self.title.as_bytes();
        for (i, &b) in title.iter().take(12).enumerate() {
            let offset = if i < 8 { i } else { SECTOR_SIZE + i - 8 };
            data[offset] = b;
        }
        let (s0, s1) = data.split_at_mut(SECTOR_SIZE);
        s1[4] = self.cycle;
        s1[5] = (self.entries.len() * 8) as u8;
        s1[6] = ((self.boot_option & 3) << 4) | ((self.sectors >> 8) & 3) as u8;
        s1[7] = self.sectors as u8;
        for (i, entry) in self.entries.iter().enumerate() {
            let n = &mut s0[8 + i * 8..16 + i * 8];
            n[..7].fill(b' ');
            n[..entry.name.len().min(7)].copy_from_slice(&entry.name.as_bytes()[..entry.name.len().min(7)]);
            n[7] = (entry.directory as u8 & 0x7F) | if entry.locked { LOCKED } else { 0 };

            let a = &mut s1[8 + i * 8..16 + i * 8];
            a[0..2].copy_from_slice(&(entry.load as u16).to_le_bytes());
            a[2..4].copy_from_slice(&(entry.exec as u16).to_le_bytes());
            a[4..6].copy_from_slice(&(entry.length as u16).to_le_bytes());
            a[6] = ((entry.start_sector >> 8) & 3) as u8
                | (((entry.load >> 16) & 3) << 2) as u8
                | (((entry.length >> 16) & 3) << 4) as u8
                | (((entry.exec >> 16) & 3) << 6) as u8;
            a[7] = entry.start_sector as u8;
        }
        data
    }

    /// Check every file lies within the disk
    pub fn validate(&self, image_sectors: u32) -> Result<()> {
        if self.sectors < 2 || self.sectors as u32 > image_sectors {
            return Err(DiskError::geometry(format!(
                "catalogue claims {} sectors on a {} sector image",
                self.sectors, image_sectors
            )));
        }
        for entry in &self.entries {
            let end = entry.start_sector as u32 + entry.sectors() as u32;
            if entry.start_sector < 2 || end > self.sectors as u32 {
                return Err(DiskError::integrity(format!(
                    "{} lies outside sectors 2..{}",
                    entry.full_name(),
                    self.sectors
                )));
            }
        }
        Ok(())
    }

    /// Index of a file by "D.NAME" or "NAME"
    pub fn find(&self, name: &str) -> Option<usize> {
        let (directory, name) = parse_name(name.trim());
        self.entries.iter().position(|e| e.matches(directory, name))
    }

    /// Sectors taken by files
    pub fn used_sectors(&self) -> u32 {
        self.entries.iter().map(|e| e.sectors() as u32).sum()
    }

    /// Lowest start sector of a gap of `needed` sectors
    fn find_gap(&self, needed: u16) -> Option<u16> {
        let mut files: Vec<(u16, u16)> = self
            .entries
            .iter()
            .map(|e| (e.start_sector, e.sectors()))
            .collect();
        files.sort_unstable();
        let mut cursor = 2u16;
        for (start, sectors) in files {
            if start >= cursor && start - cursor >= needed {
                return Some(cursor);
            }
            cursor = cursor.max(start + sectors);
        }
        (self.sectors.saturating_sub(cursor) >= needed).then_some(cursor)
    }

    /// Insert keeping start sectors in descending order
    fn insert_sorted(&mut self, entry: DfsEntry) {
        let at = self
            .entries
            .iter()
            .position(|e| e.start_sector < entry.start_sector)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
    }

    fn bump_cycle(&mut self) {
        self.cycle = self.cycle.wrapping_add(1);
    }
}

/// Acorn DFS driver
pub struct AcornDfsFileSystem {
    image: DiskImage,
    catalog: DfsCatalog,
    root: DirectoryEntry,
}

impl AcornDfsFileSystem {
    /// The parsed catalogue
    pub fn catalog(&self) -> &DfsCatalog {
        &self.catalog
    }

    fn read_catalog(image: &DiskImage) -> Result<DfsCatalog> {
        let geometry = image.geometry();
        if geometry.sectors_per_track != SECTORS_PER_TRACK
            || geometry.sector_size as usize != SECTOR_SIZE
            || geometry.sides != 1
        {
            return Err(DiskError::geometry(format!(
                "DFS needs single sided 10x256 tracks, not {}",
                geometry
            )));
        }
        let mut data = image.read_full_lsn(0)?.to_vec();
        data.extend_from_slice(image.read_full_lsn(1)?);
        let catalog = DfsCatalog::parse(&data)?;
        catalog.validate(geometry.total_sectors())?;
        Ok(catalog)
    }

    fn from_catalog(image: DiskImage, catalog: DfsCatalog) -> Self {
        let mut fs = Self {
            image,
            catalog,
            root: DirectoryEntry::default(),
        };
        fs.build_tree();
        fs
    }

    fn build_tree(&mut self) {
        let mut root = DirectoryEntry::root(self.catalog.title.clone());
        for entry in &self.catalog.entries {
            root.add_child(DirectoryEntry::file(entry.full_name()));
        }
        self.root = root;
    }

    /// Write the catalogue and re-read it
    fn commit(&mut self, catalog: DfsCatalog) -> Result<()> {
        let bytes = catalog.to_bytes();
        self.image.write_lsn(0, &bytes[..SECTOR_SIZE])?;
        self.image.write_lsn(1, &bytes[SECTOR_SIZE..])?;
        self.catalog = Self::read_catalog(&self.image)?;
        self.build_tree();
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.catalog
            .find(name)
            .ok_or_else(|| DiskError::FileNotFound(name.to_string()))
    }

    /// Move files down so the free space is one block at the end
    pub fn compact(&mut self) -> Result<()> {
        let mut catalog = self.catalog.clone();
        let mut order: Vec<usize> = (0..catalog.entries.len()).collect();
        order.sort_by_key(|&i| catalog.entries[i].start_sector);

        let mut cursor = 2u16;
        for i in order {
            let entry = &mut catalog.entries[i];
            if entry.start_sector != cursor {
                debug!("moving {} from sector {} to {}", entry.full_name(), entry.start_sector, cursor);
                for n in 0..entry.sectors() as u32 {
                    let sector = self.image.read_full_lsn(entry.start_sector as u32 + n)?.to_vec();
                    self.image.write_lsn(cursor as u32 + n, &sector)?;
                }
                entry.start_sector = cursor;
            }
            cursor += entry.sectors();
        }
        catalog
            .entries
            .sort_by(|a, b| b.start_sector.cmp(&a.start_sector));
        catalog.bump_cycle();
        self.commit(catalog)
    }

    /// Set or clear the lock bit of a file
    pub fn lock(&mut self, name: &str, locked: bool) -> Result<()> {
        let index = self.index_of(name)?;
        let mut catalog = self.catalog.clone();
        catalog.entries[index].locked = locked;
        catalog.bump_cycle();
        self.commit(catalog)
    }

    /// Set the `*OPT 4` boot option
    pub fn set_boot_option(&mut self, option: u8) -> Result<()> {
        if option > 3 {
            return Err(DiskError::filesystem(format!("boot option {} out of range", option)));
        }
        let mut catalog = self.catalog.clone();
        catalog.boot_option = option;
        self.commit(catalog)
    }

    /// Rename the disk, truncating to 12 characters
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        if !title.is_ascii() {
            return Err(DiskError::InvalidFilename(title.to_string()));
        }
        let mut catalog = self.catalog.clone();
        catalog.title = title.chars().take(12).collect();
        self.commit(catalog)
    }
}

impl FileSystem for AcornDfsFileSystem {
    fn load(image: DiskImage) -> MountResult<Self> {
        match Self::read_catalog(&image) {
            Ok(catalog) => Ok(Self::from_catalog(image, catalog)),
            Err(error) => Err(MountError::new(error, image)),
        }
    }

    fn probe(image: &DiskImage) -> Result<()> {
        Self::read_catalog(image).map(|_| ())
    }

    fn init_disk(image: &mut DiskImage) -> Result<()> {
        let geometry = *image.geometry();
        if geometry.sectors_per_track != SECTORS_PER_TRACK
            || geometry.sector_size as usize != SECTOR_SIZE
            || geometry.sides != 1
        {
            return Err(DiskError::geometry(format!(
                "DFS needs single sided 10x256 tracks, not {}",
                geometry
            )));
        }
        let sectors = geometry.total_sectors().min(MAX_SECTORS as u32) as u16;
        let bytes = DfsCatalog::new(sectors).to_bytes();
        image.write_lsn(0, &bytes[..SECTOR_SIZE])?;
        image.write_lsn(1, &bytes[SECTOR_SIZE..])
    }

    fn fs_type(&self) -> FileSystemType {
        FileSystemType::AcornDfs
    }

    fn variant(&self) -> String {
        format!("Boot option {}", self.catalog.boot_option)
    }

    fn volume_label(&self) -> String {
        self.catalog.title.clone()
    }

    fn files_num(&self) -> usize {
        self.catalog.entries.len()
    }

    fn file_info(&self, index: usize) -> Option<FileInfo> {
        self.catalog.entries.get(index).map(|e| FileInfo {
            name: e.full_name(),
            size: e.length as usize,
            attributes: FileAttributes {
                directory: false,
                protected: e.locked,
            },
            ok: true,
        })
    }

    fn free_size(&self) -> usize {
        let free = (self.catalog.sectors as u32)
            .saturating_sub(2)
            .saturating_sub(self.catalog.used_sectors());
        free as usize * SECTOR_SIZE
    }

    fn root(&self) -> &DirectoryEntry {
        &self.root
    }

    fn extract_file(&self, name: &str, _with_header: bool) -> Result<Vec<u8>> {
        let entry = &self.catalog.entries[self.index_of(name)?];
        let mut data = Vec::with_capacity(entry.sectors() as usize * SECTOR_SIZE);
        for n in 0..entry.sectors() as u32 {
            data.extend_from_slice(self.image.read_full_lsn(entry.start_sector as u32 + n)?);
        }
        data.truncate(entry.length as usize);
        Ok(data)
    }

    fn insert_file(&mut self, name: &str, data: &[u8], _binary: bool) -> Result<()> {
        let (directory, stem) = parse_name(name.trim());
        let stem: String = stem.chars().take(MAX_NAME_LEN).collect();
        if stem.is_empty()
            || !stem.is_ascii()
            || !directory.is_ascii_graphic()
            || stem.contains(|c: char| c.is_ascii_whitespace() || c == '.' || c.is_ascii_control())
        {
            return Err(DiskError::InvalidFilename(name.to_string()));
        }
        if self.catalog.entries.iter().any(|e| e.matches(directory, &stem)) {
            return Err(DiskError::filesystem(format!("{}.{} already exists", directory, stem)));
        }
        if self.catalog.entries.len() >= MAX_FILES {
            return Err(DiskError::DirectoryFull);
        }
        if data.len() > 0x3FFFF {
            return Err(DiskError::DiskFull);
        }

        let length = data.len() as u32;
        let needed = length.div_ceil(SECTOR_SIZE as u32) as u16;
        let start = self.catalog.find_gap(needed).ok_or(DiskError::DiskFull)?;
        for (n, chunk) in data.chunks(SECTOR_SIZE).enumerate() {
            let mut sector = chunk.to_vec();
            sector.resize(SECTOR_SIZE, 0);
            self.image.write_lsn(start as u32 + n as u32, &sector)?;
        }

        let mut catalog = self.catalog.clone();
        catalog.insert_sorted(DfsEntry {
            name: stem,
            directory,
            locked: false,
            load: 0,
            exec: 0,
            length,
            start_sector: start,
        });
        catalog.bump_cycle();
        self.commit(catalog)
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        let index = self.index_of(name)?;
        let mut catalog = self.catalog.clone();
        catalog.entries.remove(index);
        catalog.bump_cycle();
        self.commit(catalog)
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

    fn blank() -> AcornDfsFileSystem {
        let mut image = DiskImage::create(DiskImageFormat::Raw, Geometry::acorn_ssd80()).unwrap();
        AcornDfsFileSystem::init_disk(&mut image).unwrap();
        AcornDfsFileSystem::load(image).unwrap()
    }

    #[test]
    fn test_parse_catalog_bytes() {
        let mut data = vec![0u8; CATALOG_SIZE];
        data[..8].copy_from_slice(b"GAMESDIS");
        data[256..260].copy_from_slice(b"K\0\0\0");
        data[256 + 4] = 0x12;
        data[256 + 5] = 8;
        data[256 + 6] = 0x33; // boot 3, sectors high 3
        data[256 + 7] = 0x20;
        data[8..16].copy_from_slice(b"ELITE  \xA4");
        // load 0x31900, exec 0x38023, length 0x12345, start 0x2A5
        data[264..272].copy_from_slice(&[0x00, 0x19, 0x23, 0x80, 0x45, 0x23, 0xDE, 0xA5]);

        let catalog = DfsCatalog::parse(&data).unwrap();
        assert_eq!(catalog.title, "GAMESDISK");
        assert_eq!(catalog.cycle, 0x12);
        assert_eq!(catalog.boot_option, 3);
        assert_eq!(catalog.sectors, 0x320);
        let entry = &catalog.entries[0];
        assert_eq!(entry.full_name(), "$.ELITE");
        assert!(entry.locked);
        assert_eq!(entry.load, 0x31900);
        assert_eq!(entry.exec, 0x38023);
        assert_eq!(entry.length, 0x12345);
        assert_eq!(entry.start_sector, 0x2A5);
        assert_eq!(catalog.to_bytes(), data);

        data[256 + 5] = 7;
        assert!(DfsCatalog::parse(&data).is_err());
    }

    #[test]
    fn test_init() {
        let fs = blank();
        assert_eq!(fs.catalog().sectors, 800);
        assert_eq!(fs.free_size(), 798 * 256);
        assert_eq!(fs.variant(), "Boot option 0");
        assert_eq!(fs.name(), "Acorn DFS");
        assert_eq!(fs.files_num(), 0);
    }

    #[test]
    fn test_insert_extract_delete() {
        let mut fs = blank();
        let cycle = fs.catalog().cycle;
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 3) as u8).collect();
        fs.insert_file("GAME", &data, true).unwrap();
        fs.insert_file("B.LOADER", &[1u8; 300], false).unwrap();

        assert_eq!(fs.files_num(), 2);
        // descending start sectors
        assert_eq!(fs.file_name(0).unwrap(), "B.LOADER");
        assert_eq!(fs.catalog().entries[0].start_sector, 6);
        assert_eq!(fs.file_name(1).unwrap(), "$.GAME");
        assert_eq!(fs.catalog().entries[1].start_sector, 2);
        assert_eq!(fs.catalog().cycle, cycle.wrapping_add(2));
        assert_eq!(fs.extract_file("game", false).unwrap(), data);
        assert_eq!(fs.extract_file("$.GAME", false).unwrap(), data);
        assert_eq!(fs.free_size(), (798 - 6) * 256);
        assert!(fs.insert_file("$.game", b"x", false).is_err());

        fs.delete_file("GAME").unwrap();
        assert_eq!(fs.files_num(), 1);
        assert_eq!(fs.free_size(), (798 - 2) * 256);
        // the hole at sector 2 is reused
        fs.insert_file("SMALL", &[2u8; 512], false).unwrap();
        assert_eq!(fs.catalog().entries[1].start_sector, 2);
    }

    #[test]
    fn test_compact() {
        let mut fs = blank();
        fs.insert_file("A", &[1u8; 512], false).unwrap();
        fs.insert_file("B", &[2u8; 512], false).unwrap();
        fs.insert_file("C", &[3u8; 700], false).unwrap();
        fs.delete_file("A").unwrap();
        fs.delete_file("B").unwrap();
        assert_eq!(fs.catalog().entries[0].start_sector, 6);

        fs.compact().unwrap();
        assert_eq!(fs.catalog().entries[0].start_sector, 2);
        assert_eq!(fs.extract_file("C", false).unwrap(), vec![3u8; 700]);
    }

    #[test]
    fn test_lock_and_boot_option() {
        let mut fs = blank();
        fs.insert_file("PROG", b"10 PRINT", false).unwrap();
        fs.lock("prog", true).unwrap();
        assert!(fs.file_info(0).unwrap().attributes.protected);
        assert_eq!(fs.image().read_lsn(0).unwrap()[15], b'$' | 0x80);
        fs.lock("PROG", false).unwrap();
        assert!(!fs.file_info(0).unwrap().attributes.protected);

        fs.set_boot_option(3).unwrap();
        assert_eq!(fs.variant(), "Boot option 3");
        assert!(fs.set_boot_option(4).is_err());
        fs.set_title("MY DISC").unwrap();
        assert_eq!(fs.volume_label(), "MY DISC");
        assert_eq!(boot_option_name(3), "*EXEC");
    }

    #[test]
    fn test_directory_full_and_disk_full() {
        let mut fs = blank();
        for n in 0..MAX_FILES {
            fs.insert_file(&format!("F{}", n), b"x", false).unwrap();
        }
        assert!(matches!(
            fs.insert_file("EXTRA", b"x", false),
            Err(DiskError::DirectoryFull)
        ));

        let mut fs = blank();
        assert!(matches!(
            fs.insert_file("HUGE", &vec![0u8; 799 * 256], false),
            Err(DiskError::DiskFull)
        ));
    }

    #[test]
    fn test_rejects_bad_catalogue() {
        let mut image = DiskImage::create(DiskImageFormat::Raw, Geometry::acorn_ssd40()).unwrap();
        let mut catalog = DfsCatalog::new(400);
        catalog.entries.push(DfsEntry {
            name: "BAD".to_string(),
            directory: '$',
            locked: false,
            load: 0,
            exec: 0,
            length: 1024,
            start_sector: 399,
        });
        let bytes = catalog.to_bytes();
        image.write_lsn(0, &bytes[..256]).unwrap();
        image.write_lsn(1, &bytes[256..]).unwrap();
        assert!(matches!(
            AcornDfsFileSystem::probe(&image),
            Err(DiskError::IntegrityError(_))
        ));

        catalog.entries.clear();
        catalog.sectors = 800;
        let bytes = catalog.to_bytes();
        image.write_lsn(0, &bytes[..256]).unwrap();
        image.write_lsn(1, &bytes[256..]).unwrap();
        assert!(matches!(
            AcornDfsFileSystem::probe(&image),
            Err(DiskError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_missing_catalogue_data() {
        let mut image = DiskImage::create(DiskImageFormat::Raw, Geometry::acorn_ssd80()).unwrap();
        AcornDfsFileSystem::init_disk(&mut image).unwrap();
        crate::filesystem::clear_sector_data(&mut image, 1);
        assert!(matches!(
            AcornDfsFileSystem::probe(&image),
            Err(DiskError::InvalidFormat(_))
        ));
        assert!(AcornDfsFileSystem::load(image).is_err());
    }

    #[test]
    fn test_dotted_name_rejected() {
        let mut fs = blank();
        assert!(matches!(
            fs.insert_file("$.A.B", b"data", false),
            Err(DiskError::InvalidFilename(_))
        ));
        assert!(matches!(
            fs.insert_file("hello.world", b"data", false),
            Err(DiskError::InvalidFilename(_))
        ));
        assert_eq!(fs.files_num(), 0);
    }
}
