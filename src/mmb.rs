/// MMB containers: many 200 KB single sided DFS disks in one file
///
/// A container is a sequence of chunks. Each chunk starts with an 8 KB
/// directory of 16-byte entries (one header entry plus one per slot)
/// followed by up to 511 disk images. Only the last chunk may hold fewer
/// than 511 disks. Every operation seeks straight to the bytes it touches;
/// the disk data is never held in memory as a whole.

use crate::error::{DiskError, Result};
use crate::filesystem::acorn_dfs::{self, DfsCatalog};
use crate::format::{DiskImageFormat, Geometry};
use crate::image::{DiskImage, FormatData};
use log::{debug, info};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Length of a slot name
pub const NAME_LEN: usize = 12;
/// Slots per chunk
pub const SLOTS_PER_CHUNK: usize = 511;
/// Directory bytes at the start of each chunk
pub const DIRECTORY_SIZE: u64 = 8192;
/// Directory entry size
pub const ENTRY_SIZE: u64 = 16;
/// Bytes per disk slot
pub const DISK_SIZE: u64 = 200 * 1024;
/// Bytes in a full chunk
pub const CHUNK_SIZE: u64 = DIRECTORY_SIZE + SLOTS_PER_CHUNK as u64 * DISK_SIZE;

const ATTR_LOCKED: u8 = 0x00;
const ATTR_UNLOCKED: u8 = 0x0F;
const ATTR_UNFORMATTED: u8 = 0xF0;
const ATTR_INVALID: u8 = 0xFF;

/// State of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAttribute {
    /// Holds a disk, write protected
    Locked,
    /// Holds a disk
    Unlocked,
    /// Empty
    Unformatted,
    /// Not part of the container
    Invalid,
}

impl SlotAttribute {
    /// Decode the attribute byte; unknown values count as invalid
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            ATTR_LOCKED => SlotAttribute::Locked,
            ATTR_UNLOCKED => SlotAttribute::Unlocked,
            ATTR_UNFORMATTED => SlotAttribute::Unformatted,
            _ => SlotAttribute::Invalid,
        }
    }

    /// Attribute byte
    pub fn to_byte(self) -> u8 {
        match self {
            SlotAttribute::Locked => ATTR_LOCKED,
            SlotAttribute::Unlocked => ATTR_UNLOCKED,
            SlotAttribute::Unformatted => ATTR_UNFORMATTED,
            SlotAttribute::Invalid => ATTR_INVALID,
        }
    }

    /// Slot holds a disk
    pub fn is_formatted(self) -> bool {
        matches!(self, SlotAttribute::Locked | SlotAttribute::Unlocked)
    }
}

impl fmt::Display for SlotAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotAttribute::Locked => "locked",
            SlotAttribute::Unlocked => "unlocked",
            SlotAttribute::Unformatted => "unformatted",
            SlotAttribute::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Directory entry of one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmbEntry {
    /// Disk name, normally the DFS title
    pub name: String,
    /// Slot state
    pub attribute: SlotAttribute,
}

impl MmbEntry {
    fn parse(bytes: &[u8]) -> Self {
        let name = bytes[..NAME_LEN]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| (b & 0x7F) as char)
            .collect::<String>()
            .trim_end()
            .to_string();
        Self {
            name,
            attribute: SlotAttribute::from_byte(bytes[ENTRY_SIZE as usize - 1]),
        }
    }
}

fn entry_bytes(name: &[u8], attribute: SlotAttribute) -> [u8; ENTRY_SIZE as usize] {
    let mut entry = [0u8; ENTRY_SIZE as usize];
    let len = name.len().min(NAME_LEN);
    entry[..len].copy_from_slice(&name[..len]);
    entry[ENTRY_SIZE as usize - 1] = attribute.to_byte();
    entry
}

fn chunk_base(chunk: usize) -> u64 {
    chunk as u64 * CHUNK_SIZE
}

fn entry_offset(slot: usize) -> u64 {
    chunk_base(slot / SLOTS_PER_CHUNK) + (slot % SLOTS_PER_CHUNK + 1) as u64 * ENTRY_SIZE
}

fn data_offset(slot: usize) -> u64 {
    chunk_base(slot / SLOTS_PER_CHUNK)
        + DIRECTORY_SIZE
        + (slot % SLOTS_PER_CHUNK) as u64 * DISK_SIZE
}

/// File length of a container with `slots` disks
pub fn container_len(slots: usize) -> u64 {
    let full = slots / SLOTS_PER_CHUNK;
    let rest = slots % SLOTS_PER_CHUNK;
    let mut len = chunk_base(full);
    if rest > 0 {
        len += DIRECTORY_SIZE + rest as u64 * DISK_SIZE;
    }
    len
}

/// Number of slots a container of `len` bytes holds
pub fn slots_for_len(len: u64) -> Result<usize> {
    let full = (len / CHUNK_SIZE) as usize;
    let rest = len % CHUNK_SIZE;
    let partial = if rest == 0 {
        0
    } else if rest >= DIRECTORY_SIZE + DISK_SIZE && (rest - DIRECTORY_SIZE) % DISK_SIZE == 0 {
        ((rest - DIRECTORY_SIZE) / DISK_SIZE) as usize
    } else {
        return Err(DiskError::invalid_format(format!(
            "{} bytes is not 8 KB plus a whole number of 200 KB disks per chunk",
            len
        )));
    };
    let slots = full * SLOTS_PER_CHUNK + partial;
    if slots == 0 {
        return Err(DiskError::invalid_format("MMB file holds no disks"));
    }
    Ok(slots)
}

/// Build the directory of a chunk with `usable` slots
fn directory_bytes(header: [u8; ENTRY_SIZE as usize], usable: usize) -> Vec<u8> {
    let mut dir = Vec::with_capacity(DIRECTORY_SIZE as usize);
    dir.extend_from_slice(&header);
    for slot in 0..SLOTS_PER_CHUNK {
        let attribute = if slot < usable {
            SlotAttribute::Unformatted
        } else {
            SlotAttribute::Invalid
        };
        dir.extend_from_slice(&entry_bytes(&[], attribute));
    }
    dir
}

fn boot_header(boot: [u16; 4]) -> [u8; ENTRY_SIZE as usize] {
    let mut header = [0u8; ENTRY_SIZE as usize];
    for (drive, slot) in boot.iter().enumerate() {
        header[drive] = *slot as u8;
        header[drive + 4] = (*slot >> 8) as u8;
    }
    header
}

/// An open MMB container
#[derive(Debug)]
pub struct MmbFile {
    file: File,
    path: PathBuf,
    slots: usize,
    entries: Vec<MmbEntry>,
    boot: [u16; 4],
}

impl MmbFile {
    /// Create a container with `slots` empty disks, replacing any existing file
    pub fn create<P: AsRef<Path>>(path: P, slots: usize) -> Result<Self> {
        let path = path.as_ref();
        if slots == 0 {
            return Err(DiskError::invalid_format("MMB file needs at least one slot"));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let chunks = slots.div_ceil(SLOTS_PER_CHUNK);
        for chunk in 0..chunks {
            let usable = (slots - chunk * SLOTS_PER_CHUNK).min(SLOTS_PER_CHUNK);
            let header = if chunk == 0 {
                boot_header([0, 1, 2, 3])
            } else {
                [0u8; ENTRY_SIZE as usize]
            };
            file.seek(SeekFrom::Start(chunk_base(chunk)))?;
            file.write_all(&directory_bytes(header, usable))?;
        }
        file.set_len(container_len(slots))?;
        file.flush()?;
        info!("created {} with {} slots", path.display(), slots);
        drop(file);

        Self::open(path)
    }

    /// Open an existing container for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let slots = slots_for_len(file.metadata()?.len())?;

        let mut entries = Vec::with_capacity(slots);
        let mut boot = [0u16; 4];
        let mut dir = vec![0u8; DIRECTORY_SIZE as usize];
        for chunk in 0..slots.div_ceil(SLOTS_PER_CHUNK) {
            file.seek(SeekFrom::Start(chunk_base(chunk)))?;
            file.read_exact(&mut dir)?;
            if chunk == 0 {
                for (drive, slot) in boot.iter_mut().enumerate() {
                    *slot = u16::from_le_bytes([dir[drive], dir[drive + 4]]);
                }
            }
            let usable = (slots - chunk * SLOTS_PER_CHUNK).min(SLOTS_PER_CHUNK);
            entries.extend(
                dir[ENTRY_SIZE as usize..]
                    .chunks_exact(ENTRY_SIZE as usize)
                    .take(usable)
                    .map(MmbEntry::parse),
            );
        }
        info!("opened {} with {} slots", path.display(), slots);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            slots,
            entries,
            boot,
        })
    }

    /// Path of the container
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of slots
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Directory entry of a slot
    pub fn entry(&self, slot: usize) -> Result<&MmbEntry> {
        self.check_slot(slot)?;
        Ok(&self.entries[slot])
    }

    /// Every directory entry, indexed by slot
    pub fn entries(&self) -> &[MmbEntry] {
        &self.entries
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.slots {
            return Err(DiskError::SlotOutOfRange {
                slot,
                max: self.slots - 1,
            });
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn set_attribute(&mut self, slot: usize, attribute: SlotAttribute) -> Result<()> {
        self.write_at(entry_offset(slot) + ENTRY_SIZE - 1, &[attribute.to_byte()])?;
        self.entries[slot].attribute = attribute;
        Ok(())
    }

    /// Store a disk image in a slot, zero padded to 200 KB
    ///
    /// The slot is named after the DFS title held in the image.
    pub fn insert_image(&mut self, slot: usize, bytes: &[u8]) -> Result<()> {
        self.check_slot(slot)?;
        if bytes.len() as u64 > DISK_SIZE {
            return Err(DiskError::invalid_format(format!(
                "disk image is {} bytes, a slot holds {}",
                bytes.len(),
                DISK_SIZE
            )));
        }
        let mut data = bytes.to_vec();
        data.resize(DISK_SIZE as usize, 0);

        let mut name = [0u8; NAME_LEN];
        name[..8].copy_from_slice(&data[..8]);
        name[8..].copy_from_slice(&data[256..260]);
        let entry = entry_bytes(&name, SlotAttribute::Unlocked);

        debug!("writing {} bytes to slot {}", bytes.len(), slot);
        self.write_at(entry_offset(slot), &entry)?;
        self.write_at(data_offset(slot), &data)?;
        self.file.flush()?;
        self.entries[slot] = MmbEntry::parse(&entry);
        Ok(())
    }

    /// Store the contents of an image file in a slot
    pub fn insert_image_file<P: AsRef<Path>>(&mut self, slot: usize, path: P) -> Result<()> {
        let bytes = std::fs::read(path)?;
        self.insert_image(slot, &bytes)
    }

    /// Read the 200 KB of a slot
    pub fn extract_image(&mut self, slot: usize) -> Result<Vec<u8>> {
        self.check_slot(slot)?;
        self.read_at(data_offset(slot), DISK_SIZE as usize)
    }

    /// Write the 200 KB of a slot to a file
    pub fn extract_image_file<P: AsRef<Path>>(&mut self, slot: usize, path: P) -> Result<()> {
        let data = self.extract_image(slot)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Empty a slot, zeroing its data
    pub fn remove(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        let entry = entry_bytes(&[], SlotAttribute::Unformatted);
        self.write_at(entry_offset(slot), &entry)?;
        self.write_at(data_offset(slot), &vec![0u8; DISK_SIZE as usize])?;
        self.file.flush()?;
        self.entries[slot] = MmbEntry::parse(&entry);
        Ok(())
    }

    fn set_lock(&mut self, slot: usize, attribute: SlotAttribute) -> Result<()> {
        self.check_slot(slot)?;
        if !self.entries[slot].attribute.is_formatted() {
            return Err(DiskError::filesystem(format!(
                "slot {} is {}",
                slot, self.entries[slot].attribute
            )));
        }
        self.set_attribute(slot, attribute)
    }

    /// Write protect the disk in a slot
    pub fn lock(&mut self, slot: usize) -> Result<()> {
        self.set_lock(slot, SlotAttribute::Locked)
    }

    /// Clear the write protection of a slot
    pub fn unlock(&mut self, slot: usize) -> Result<()> {
        self.set_lock(slot, SlotAttribute::Unlocked)
    }

    /// Slots loaded into drives 0 to 3 at boot
    pub fn boot_slots(&self) -> [usize; 4] {
        self.boot.map(usize::from)
    }

    /// Choose the slot loaded into `drive` at boot
    pub fn set_boot_slot(&mut self, drive: usize, slot: usize) -> Result<()> {
        if drive >= 4 {
            return Err(DiskError::filesystem(format!("drive {} out of range (max: 3)", drive)));
        }
        self.check_slot(slot)?;
        let slot = u16::try_from(slot).map_err(|_| DiskError::SlotOutOfRange {
            slot,
            max: u16::MAX as usize,
        })?;
        self.write_at(drive as u64, &[slot as u8])?;
        self.write_at(drive as u64 + 4, &[(slot >> 8) as u8])?;
        self.file.flush()?;
        self.boot[drive] = slot;
        Ok(())
    }

    /// Grow the container to `new_slots`, keeping every stored disk
    pub fn resize(&mut self, new_slots: usize) -> Result<()> {
        if new_slots < self.slots {
            return Err(DiskError::invalid_format(format!(
                "cannot shrink from {} to {} slots",
                self.slots, new_slots
            )));
        }
        if new_slots == self.slots {
            return Ok(());
        }
        let old_slots = self.slots;
        self.file.set_len(container_len(new_slots))?;

        // slots that were invalid in the last existing chunk
        let chunk_end = old_slots.div_ceil(SLOTS_PER_CHUNK) * SLOTS_PER_CHUNK;
        let unformatted = entry_bytes(&[], SlotAttribute::Unformatted);
        for slot in old_slots..new_slots.min(chunk_end) {
            self.write_at(entry_offset(slot), &unformatted)?;
        }

        let old_chunks = old_slots.div_ceil(SLOTS_PER_CHUNK);
        let new_chunks = new_slots.div_ceil(SLOTS_PER_CHUNK);
        for chunk in old_chunks..new_chunks {
            let usable = (new_slots - chunk * SLOTS_PER_CHUNK).min(SLOTS_PER_CHUNK);
            let dir = directory_bytes([0u8; ENTRY_SIZE as usize], usable);
            self.write_at(chunk_base(chunk), &dir)?;
        }
        self.file.flush()?;

        self.entries.resize(
            new_slots,
            MmbEntry {
                name: String::new(),
                attribute: SlotAttribute::Unformatted,
            },
        );
        self.slots = new_slots;
        info!("resized {} from {} to {} slots", self.path.display(), old_slots, new_slots);
        Ok(())
    }

    /// Set or clear the lock bit of the `index`th file in a slot's catalogue
    pub fn lock_file(&mut self, slot: usize, index: usize, locked: bool) -> Result<()> {
        self.check_slot(slot)?;
        let catalog = self.catalog(slot)?;
        if index >= catalog.entries.len() {
            return Err(DiskError::FileNotFound(format!("file {} in slot {}", index, slot)));
        }
        let offset = data_offset(slot) + ((index + 1) * 8 + 7) as u64;
        let byte = self.read_at(offset, 1)?[0];
        let byte = if locked { byte | 0x80 } else { byte & 0x7F };
        self.write_at(offset, &[byte])?;
        self.file.flush()?;
        Ok(())
    }

    /// DFS catalogue of the disk in a slot
    pub fn catalog(&mut self, slot: usize) -> Result<DfsCatalog> {
        self.check_slot(slot)?;
        let data = self.read_at(data_offset(slot), acorn_dfs::CATALOG_SIZE)?;
        DfsCatalog::parse(&data)
    }

    /// The disk in a slot as an 80 track single sided image
    pub fn disk_image(&mut self, slot: usize) -> Result<DiskImage> {
        let data = self.extract_image(slot)?;
        DiskImage::from_linear(
            DiskImageFormat::Raw,
            Geometry::acorn_ssd80(),
            FormatData::Raw,
            &data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{AcornDfsFileSystem, FileSystem};
    use tempfile::TempDir;

    fn dfs_disk(title: &str, file: &str, data: &[u8]) -> Vec<u8> {
        let mut image = DiskImage::create(DiskImageFormat::Raw, Geometry::acorn_ssd80()).unwrap();
        AcornDfsFileSystem::init_disk(&mut image).unwrap();
        let mut fs = AcornDfsFileSystem::load(image).unwrap();
        fs.set_title(title).unwrap();
        fs.insert_file(file, data, true).unwrap();
        fs.image().linear_bytes()
    }

    #[test]
    fn test_lengths() {
        assert_eq!(container_len(1), 8192 + 204800);
        assert_eq!(container_len(511), CHUNK_SIZE);
        assert_eq!(container_len(512), CHUNK_SIZE + 8192 + 204800);
        assert_eq!(slots_for_len(container_len(3)).unwrap(), 3);
        assert_eq!(slots_for_len(container_len(1022)).unwrap(), 1022);
        assert!(slots_for_len(0).is_err());
        assert!(slots_for_len(8192).is_err());
        assert!(slots_for_len(container_len(3) + 1).is_err());
        assert!(slots_for_len(CHUNK_SIZE + 8192).is_err());
        assert_eq!(data_offset(511), CHUNK_SIZE + DIRECTORY_SIZE);
        assert_eq!(entry_offset(512), CHUNK_SIZE + 2 * ENTRY_SIZE);
    }

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mmb");
        let mmb = MmbFile::create(&path, 5).unwrap();
        assert_eq!(mmb.slots(), 5);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), container_len(5));
        assert_eq!(mmb.boot_slots(), [0, 1, 2, 3]);
        assert!(mmb
            .entries()
            .iter()
            .all(|e| e.attribute == SlotAttribute::Unformatted));

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..8], &[0, 1, 2, 3, 0, 0, 0, 0]);
        assert_eq!(raw[16 * 6 - 1], 0xF0);
        assert_eq!(raw[16 * 7 - 1], 0xFF);
        assert!(matches!(
            mmb.entry(5),
            Err(DiskError::SlotOutOfRange { slot: 5, max: 4 })
        ));
    }

    #[test]
    fn test_open_rejects_bad_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.mmb");
        std::fs::write(&path, vec![0u8; 8192 + 1000]).unwrap();
        assert!(matches!(
            MmbFile::open(&path),
            Err(DiskError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_insert_extract_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mmb");
        let mut mmb = MmbFile::create(&path, 4).unwrap();
        let disk = dfs_disk("ELITE", "ELITE", &[7u8; 2000]);

        mmb.insert_image(2, &disk).unwrap();
        assert_eq!(mmb.entry(2).unwrap().name, "ELITE");
        assert_eq!(mmb.entry(2).unwrap().attribute, SlotAttribute::Unlocked);
        assert_eq!(mmb.extract_image(2).unwrap(), disk);

        // reopened from disk
        let mut mmb = MmbFile::open(&path).unwrap();
        assert_eq!(mmb.entry(2).unwrap().name, "ELITE");
        assert_eq!(mmb.catalog(2).unwrap().entries[0].name, "ELITE");

        let out = dir.path().join("slot2.ssd");
        mmb.extract_image_file(2, &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), disk);

        mmb.remove(2).unwrap();
        assert_eq!(mmb.entry(2).unwrap().attribute, SlotAttribute::Unformatted);
        assert_eq!(mmb.entry(2).unwrap().name, "");
        assert!(mmb.extract_image(2).unwrap().iter().all(|&b| b == 0));

        assert!(mmb.insert_image(1, &vec![0u8; DISK_SIZE as usize + 1]).is_err());
        assert!(matches!(
            mmb.insert_image(4, &disk),
            Err(DiskError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn test_short_image_is_padded() {
        let dir = TempDir::new().unwrap();
        let mut mmb = MmbFile::create(dir.path().join("t.mmb"), 1).unwrap();
        let disk = dfs_disk("SHORT", "A", b"hello");
        mmb.insert_image(0, &disk[..40 * 10 * 256]).unwrap();
        let back = mmb.extract_image(0).unwrap();
        assert_eq!(back.len(), DISK_SIZE as usize);
        assert_eq!(&back[..102400], &disk[..102400]);
        assert!(back[102400..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_lock_unlock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mmb");
        let mut mmb = MmbFile::create(&path, 2).unwrap();
        assert!(mmb.lock(0).is_err());

        mmb.insert_image(0, &dfs_disk("GAMES", "X", b"x")).unwrap();
        mmb.lock(0).unwrap();
        assert_eq!(mmb.entry(0).unwrap().attribute, SlotAttribute::Locked);
        assert_eq!(std::fs::read(&path).unwrap()[31], 0x00);
        mmb.unlock(0).unwrap();
        assert_eq!(MmbFile::open(&path).unwrap().entry(0).unwrap().attribute, SlotAttribute::Unlocked);
    }

    #[test]
    fn test_boot_slots() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mmb");
        let mut mmb = MmbFile::create(&path, 300).unwrap();
        mmb.set_boot_slot(1, 299).unwrap();
        assert!(mmb.set_boot_slot(4, 0).is_err());
        assert!(mmb.set_boot_slot(0, 300).is_err());

        let mmb = MmbFile::open(&path).unwrap();
        assert_eq!(mmb.boot_slots(), [0, 299, 2, 3]);
    }

    #[test]
    fn test_resize_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.mmb");
        let mut mmb = MmbFile::create(&path, 2).unwrap();
        let disk = dfs_disk("KEEP", "K", &[9u8; 600]);
        mmb.insert_image(1, &disk).unwrap();

        mmb.resize(515).unwrap();
        assert!(mmb.resize(3).is_err());
        assert_eq!(mmb.slots(), 515);

        let mut mmb = MmbFile::open(&path).unwrap();
        assert_eq!(mmb.slots(), 515);
        assert_eq!(mmb.extract_image(1).unwrap(), disk);
        assert_eq!(mmb.entry(1).unwrap().name, "KEEP");
        assert_eq!(mmb.entry(300).unwrap().attribute, SlotAttribute::Unformatted);
        assert_eq!(mmb.entry(514).unwrap().attribute, SlotAttribute::Unformatted);
        mmb.insert_image(514, &disk).unwrap();
        assert_eq!(mmb.extract_image(514).unwrap(), disk);
    }

    #[test]
    fn test_file_lock_and_disk_image() {
        let dir = TempDir::new().unwrap();
        let mut mmb = MmbFile::create(dir.path().join("t.mmb"), 1).unwrap();
        mmb.insert_image(0, &dfs_disk("DISC", "PROG", b"10 GOTO 10")).unwrap();

        mmb.lock_file(0, 0, true).unwrap();
        assert!(mmb.catalog(0).unwrap().entries[0].locked);
        assert!(mmb.lock_file(0, 1, true).is_err());

        let fs = AcornDfsFileSystem::load(mmb.disk_image(0).unwrap()).unwrap();
        assert_eq!(fs.volume_label(), "DISC");
        assert!(fs.file_info(0).unwrap().attributes.protected);
        assert_eq!(fs.extract_file("PROG", false).unwrap(), b"10 GOTO 10");

        mmb.lock_file(0, 0, false).unwrap();
        assert!(!mmb.catalog(0).unwrap().entries[0].locked);
    }
}
