/*!
# retrodisk

A Rust library for reading and writing 8-bit floppy disk images and the
filesystems stored on them.

## Features

- RAW, EDSK, IMD, JVC and VDK containers behind one sector model
- Logical sector (LSN) addressing over any geometry
- DragonDOS, FAT12, OS-9 RBF, DOS68 and Acorn DFS filesystems
- A directory tree view shared by every filesystem driver
- MMB containers holding hundreds of DFS disks in one file

## Quick Start

```rust,no_run
use retrodisk::{DiskImage, FileSystem, FileSystemRegistry};

// Open an image, letting each codec try in turn
let image = DiskImage::open("game.vdk")?;
println!("{}", image.geometry());

// Mount whichever filesystem accepts it
let mut fs = FileSystemRegistry::default()
    .mount(image)
    .map_err(|e| e.into_parts().0)?;
for index in 0..fs.files_num() {
    if let Some(info) = fs.file_info(index) {
        println!("{:12} {:>7}", info.name, info.size);
    }
}

// Copy a file out and back in under a new name
let data = fs.extract_file("GAME.BIN", false)?;
fs.insert_file("COPY.BIN", &data, true)?;
fs.save("game.vdk".as_ref())?;
# Ok::<(), retrodisk::DiskError>(())
```

## Modules

- `format`: container types, geometry and constants
- `image`: in-memory image model (DiskImage, Track, Sector)
- `io`: container codecs and the codec registry
- `filesystem`: filesystem drivers and the directory tree
- `mmb`: MMB multi-disk containers
- `fdc`: FDC status registers kept with recorded sectors
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Error types and Result alias
pub mod error;
/// FDC (Floppy Disk Controller) status codes
pub mod fdc;
/// Filesystem drivers and the directory tree
pub mod filesystem;
/// Container types, geometry and constants
pub mod format;
/// Core image data structures (DiskImage, Track, Sector)
pub mod image;
/// Container codecs for reading and writing image files
pub mod io;
/// MMB multi-disk containers
pub mod mmb;

// Re-export common types
pub use error::{DiskError, Result};
pub use fdc::{FdcStatus1, FdcStatus2};
pub use filesystem::{
    AcornDfsFileSystem, DirectoryEntry, Dos68FileSystem, DragonDosFileSystem, Fat12FileSystem,
    FileAttributes, FileInfo, FileSystem, FileSystemRegistry, FileSystemType, MountError,
    MountResult, Os9FileSystem,
};
pub use format::{DiskImageFormat, Geometry};
pub use image::{
    DataRate, Disk, DiskImage, DiskImageBuilder, FormatData, RecordingMode, Sector, SectorId,
    SectorStatus, Track,
};
pub use io::{ImageCodec, ImageRegistry};
pub use mmb::{MmbEntry, MmbFile, SlotAttribute};
