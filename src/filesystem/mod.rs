/// Filesystem drivers working on top of a [`DiskImage`]

/// Acorn DFS
pub mod acorn_dfs;
/// Smoke Signal Broadcasting DOS68
pub mod dos68;
/// DragonDOS
pub mod dragondos;
/// FAT12
pub mod fat12;
/// OS-9 Random Block File manager
pub mod os9;
/// Driver-independent directory tree
pub mod tree;

pub use acorn_dfs::{AcornDfsFileSystem, DfsCatalog, DfsEntry};
pub use dos68::Dos68FileSystem;
pub use dragondos::{binary_header, BinaryHeader, DragonDosFileSystem};
pub use fat12::Fat12FileSystem;
pub use os9::Os9FileSystem;
pub use tree::DirectoryEntry;

use crate::error::{DiskError, Result};
use crate::image::DiskImage;
use log::{debug, info};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// File attributes common to every driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes {
    /// Entry is a directory
    pub directory: bool,
    /// Entry is write protected or locked
    pub protected: bool,
}

/// Listing details for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File name as the driver displays it
    pub name: String,
    /// Size in bytes
    pub size: usize,
    /// Attributes
    pub attributes: FileAttributes,
    /// The entry parsed cleanly
    pub ok: bool,
}

/// A driver that rejected an image hands it back with the reason
#[derive(Error)]
#[error("{error}")]
pub struct MountError {
    error: DiskError,
    image: DiskImage,
}

impl MountError {
    /// Pair a rejection with the image it applies to
    pub fn new(error: DiskError, image: DiskImage) -> Self {
        Self { error, image }
    }

    /// Why the image was rejected
    pub fn error(&self) -> &DiskError {
        &self.error
    }

    /// Take the untouched image back
    pub fn into_image(self) -> DiskImage {
        self.image
    }

    /// Split into reason and image
    pub fn into_parts(self) -> (DiskError, DiskImage) {
        (self.error, self.image)
    }
}

impl fmt::Debug for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountError")
            .field("error", &self.error)
            .field("format", &self.image.format())
            .finish()
    }
}

impl From<MountError> for DiskError {
    fn from(e: MountError) -> Self {
        e.error
    }
}

/// Result of mounting, carrying the image back on failure
pub type MountResult<T> = std::result::Result<T, MountError>;

/// A legacy filesystem mounted on an owned disk image
///
/// Every mutating call rewrites the sectors involved in the image and then
/// re-reads the catalogue, so listings always reflect the last change.
/// Nothing reaches a file until [`FileSystem::save`].
pub trait FileSystem {
    /// Mount the filesystem on `image`, or hand the image back
    fn load(image: DiskImage) -> MountResult<Self>
    where
        Self: Sized;

    /// Check whether `image` holds this filesystem without taking it
    fn probe(image: &DiskImage) -> Result<()>
    where
        Self: Sized;

    /// Write an empty filesystem onto `image`
    fn init_disk(image: &mut DiskImage) -> Result<()>
    where
        Self: Sized;

    /// Which driver this is
    fn fs_type(&self) -> FileSystemType;

    /// Full filesystem name
    fn name(&self) -> &'static str {
        self.fs_type().name()
    }

    /// Variant or option string, empty when the filesystem has none
    fn variant(&self) -> String {
        String::new()
    }

    /// Volume label
    fn volume_label(&self) -> String;

    /// Number of files, directories included for hierarchical drivers
    fn files_num(&self) -> usize;

    /// Name of the file at `index`
    fn file_name(&self, index: usize) -> Option<String> {
        self.file_info(index).map(|i| i.name)
    }

    /// Size of the file at `index`
    fn file_size(&self, index: usize) -> Option<usize> {
        self.file_info(index).map(|i| i.size)
    }

    /// Listing details of the file at `index`
    fn file_info(&self, index: usize) -> Option<FileInfo>;

    /// Unallocated space in bytes
    fn free_size(&self) -> usize;

    /// Directory tree of the volume
    fn root(&self) -> &DirectoryEntry;

    /// Read a file. `with_header` keeps a DragonDOS binary header in place
    /// and is ignored elsewhere.
    fn extract_file(&self, name: &str, with_header: bool) -> Result<Vec<u8>>;

    /// Write a new file. `binary` selects the binary file type where the
    /// filesystem records one.
    fn insert_file(&mut self, name: &str, data: &[u8], binary: bool) -> Result<()>;

    /// Remove a file and release its space
    fn delete_file(&mut self, name: &str) -> Result<()>;

    /// The mounted image
    fn image(&self) -> &DiskImage;

    /// Mutable access to the mounted image
    fn image_mut(&mut self) -> &mut DiskImage;

    /// Unmount, returning the image
    fn into_image(self: Box<Self>) -> DiskImage;

    /// Save the image in its own container format
    fn save(&mut self, path: &Path) -> Result<()> {
        self.image_mut().save(path)
    }
}

/// Supported filesystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSystemType {
    /// Dragon 32/64 DragonDOS
    DragonDos,
    /// PC FAT12
    Fat12,
    /// Microware OS-9 RBF
    Os9Rbf,
    /// Smoke Signal Broadcasting DOS68
    Dos68,
    /// Acorn DFS
    AcornDfs,
}

impl FileSystemType {
    /// Every driver in default probe order
    pub const ALL: [FileSystemType; 5] = [
        FileSystemType::DragonDos,
        FileSystemType::Os9Rbf,
        FileSystemType::Fat12,
        FileSystemType::AcornDfs,
        FileSystemType::Dos68,
    ];

    /// Full filesystem name
    pub fn name(&self) -> &'static str {
        match self {
            FileSystemType::DragonDos => "DragonDOS",
            FileSystemType::Fat12 => "12-bit File Allocation Table (FAT12)",
            FileSystemType::Os9Rbf => "OS-9 RBF",
            FileSystemType::Dos68 => "Smoke Signal Broadcasting DOS68 filesystem",
            FileSystemType::AcornDfs => "Acorn DFS",
        }
    }

    /// Short keyword accepted by [`FileSystemType::from_name`]
    pub fn keyword(&self) -> &'static str {
        match self {
            FileSystemType::DragonDos => "dragondos",
            FileSystemType::Fat12 => "fat12",
            FileSystemType::Os9Rbf => "os9",
            FileSystemType::Dos68 => "dos68",
            FileSystemType::AcornDfs => "dfs",
        }
    }

    /// Look up a driver by keyword, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.keyword().eq_ignore_ascii_case(name))
    }

    /// Check whether `image` holds this filesystem
    pub fn probe(&self, image: &DiskImage) -> Result<()> {
        match self {
            FileSystemType::DragonDos => DragonDosFileSystem::probe(image),
            FileSystemType::Fat12 => Fat12FileSystem::probe(image),
            FileSystemType::Os9Rbf => Os9FileSystem::probe(image),
            FileSystemType::Dos68 => Dos68FileSystem::probe(image),
            FileSystemType::AcornDfs => AcornDfsFileSystem::probe(image),
        }
    }

    /// Mount this driver on `image`
    pub fn mount(&self, image: DiskImage) -> MountResult<Box<dyn FileSystem>> {
        fn boxed<F: FileSystem + 'static>(image: DiskImage) -> MountResult<Box<dyn FileSystem>> {
            F::load(image).map(|fs| Box::new(fs) as Box<dyn FileSystem>)
        }
        match self {
            FileSystemType::DragonDos => boxed::<DragonDosFileSystem>(image),
            FileSystemType::Fat12 => boxed::<Fat12FileSystem>(image),
            FileSystemType::Os9Rbf => boxed::<Os9FileSystem>(image),
            FileSystemType::Dos68 => boxed::<Dos68FileSystem>(image),
            FileSystemType::AcornDfs => boxed::<AcornDfsFileSystem>(image),
        }
    }

    /// Format `image` with an empty filesystem of this type
    pub fn init(&self, image: &mut DiskImage) -> Result<()> {
        match self {
            FileSystemType::DragonDos => DragonDosFileSystem::init_disk(image),
            FileSystemType::Fat12 => Fat12FileSystem::init_disk(image),
            FileSystemType::Os9Rbf => Os9FileSystem::init_disk(image),
            FileSystemType::Dos68 => Dos68FileSystem::init_disk(image),
            FileSystemType::AcornDfs => AcornDfsFileSystem::init_disk(image),
        }
    }
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered list of drivers tried against an image; the first that accepts
/// it wins
#[derive(Debug, Clone)]
pub struct FileSystemRegistry {
    types: Vec<FileSystemType>,
}

impl FileSystemRegistry {
    /// Registry with the given drivers, in order
    pub fn with_order(types: &[FileSystemType]) -> Self {
        Self {
            types: types.to_vec(),
        }
    }

    /// Append a driver
    pub fn register(&mut self, fs_type: FileSystemType) {
        self.types.push(fs_type);
    }

    /// Registered drivers in probe order
    pub fn types(&self) -> &[FileSystemType] {
        &self.types
    }

    /// First driver that recognises `image`
    pub fn identify(&self, image: &DiskImage) -> Result<FileSystemType> {
        for fs_type in &self.types {
            match fs_type.probe(image) {
                Ok(()) => return Ok(*fs_type),
                Err(e) => debug!("{} rejected image: {}", fs_type, e),
            }
        }
        Err(DiskError::NoMatchingFormat("filesystem".to_string()))
    }

    /// Mount the first driver that accepts `image`
    pub fn mount(&self, mut image: DiskImage) -> MountResult<Box<dyn FileSystem>> {
        for fs_type in &self.types {
            match fs_type.mount(image) {
                Ok(fs) => {
                    info!("mounted {}", fs_type);
                    return Ok(fs);
                }
                Err(e) => {
                    debug!("{} rejected image: {}", fs_type, e);
                    image = e.into_image();
                }
            }
        }
        Err(MountError::new(
            DiskError::NoMatchingFormat("filesystem".to_string()),
            image,
        ))
    }
}

impl Default for FileSystemRegistry {
    fn default() -> Self {
        Self::with_order(&FileSystemType::ALL)
    }
}

/// Path components of "/DIR/FILE" or "DIR/FILE"
pub(crate) fn path_tokens(path: &str) -> Vec<&str> {
    path.split('/').filter(|t| !t.is_empty()).collect()
}

/// Upper-case `name` and split it at the last dot into a stem and extension
/// truncated to the given lengths. Earlier dots are dropped from the stem.
pub(crate) fn split_name(name: &str, stem_len: usize, ext_len: usize) -> Result<(String, String)> {
    let upper = name.trim().to_ascii_uppercase();
    if !upper.is_ascii() || upper.contains('/') {
        return Err(DiskError::InvalidFilename(name.to_string()));
    }
    let (stem, ext) = match upper.rfind('.') {
        Some(dot) => (&upper[..dot], &upper[dot + 1..]),
        None => (upper.as_str(), ""),
    };
    let stem: String = stem.chars().filter(|&c| c != '.').take(stem_len).collect();
    if stem.is_empty() {
        return Err(DiskError::InvalidFilename(name.to_string()));
    }
    Ok((stem, ext.chars().take(ext_len).collect()))
}

/// "STEM.EXT", or just "STEM" when there is no extension
pub(crate) fn join_name(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, ext)
    }
}

/// Drop the recorded bytes of a sector, as an IMD "unavailable" record does
#[cfg(test)]
pub(crate) fn clear_sector_data(image: &mut DiskImage, lsn: u32) {
    let (track, side, n) = image.geometry().chs(lsn).unwrap();
    let track = image.track_mut(track, side).unwrap();
    let index = track.logical_index(n).unwrap();
    track.get_sector_by_index_mut(index).unwrap().set_data(Vec::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DiskImageFormat, Geometry};

    #[test]
    fn test_default_order() {
        assert_eq!(
            FileSystemRegistry::default().types(),
            &[
                FileSystemType::DragonDos,
                FileSystemType::Os9Rbf,
                FileSystemType::Fat12,
                FileSystemType::AcornDfs,
                FileSystemType::Dos68,
            ]
        );
        assert_eq!(FileSystemType::from_name("OS9"), Some(FileSystemType::Os9Rbf));
        assert_eq!(FileSystemType::from_name("cpm"), None);
    }

    #[test]
    fn test_mount_returns_image_on_failure() {
        let image = DiskImage::create(DiskImageFormat::Vdk, Geometry::dragon_ss40()).unwrap();
        let err = FileSystemRegistry::default().mount(image).err().unwrap();
        assert!(matches!(err.error(), DiskError::NoMatchingFormat(_)));
        let image = err.into_image();
        assert_eq!(image.format(), DiskImageFormat::Vdk);
        assert_eq!(image.tracks(), 40);
    }

    #[test]
    fn test_identify_each_driver() {
        let cases = [
            (FileSystemType::DragonDos, Geometry::dragon_ss40()),
            (FileSystemType::Fat12, Geometry::pc_360k()),
            (FileSystemType::Os9Rbf, Geometry::dragon_ds40()),
            (FileSystemType::AcornDfs, Geometry::acorn_ssd80()),
            (FileSystemType::Dos68, Geometry::dos68_77()),
        ];
        let registry = FileSystemRegistry::default();
        for (fs_type, geometry) in cases {
            let mut image = DiskImage::create(DiskImageFormat::Raw, geometry).unwrap();
            fs_type.init(&mut image).unwrap();
            assert_eq!(registry.identify(&image).unwrap(), fs_type, "{}", fs_type);
            let fs = registry.mount(image).unwrap();
            assert_eq!(fs.fs_type(), fs_type);
            assert_eq!(fs.files_num(), 0);
        }
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("hello.world.bin", 8, 3).unwrap(),
            ("HELLOWOR".to_string(), "BIN".to_string())
        );
        assert_eq!(
            split_name("longfilename.text", 8, 3).unwrap(),
            ("LONGFILE".to_string(), "TEX".to_string())
        );
        assert_eq!(split_name("README", 8, 3).unwrap().1, "");
        assert_eq!(
            split_name("a.b.c", 6, 3).unwrap(),
            ("AB".to_string(), "C".to_string())
        );
        assert!(split_name(".bin", 8, 3).is_err());
        assert!(split_name("...", 8, 3).is_err());
        assert!(split_name("", 8, 3).is_err());
        assert_eq!(join_name("A", ""), "A");
        assert_eq!(join_name("A", "B"), "A.B");
    }
}
