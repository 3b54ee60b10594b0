/// Disk image container formats, geometry and constants

/// Format constants
pub mod constants;
/// Geometry and LSN addressing
pub mod geometry;

pub use constants::*;
pub use geometry::{chs_from_lsn, lsn_from_chs, Geometry};

use std::path::Path;

/// Disk image container type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskImageFormat {
    /// Headerless sector dump in LSN order
    Raw,
    /// CPCEMU DSK, normal or extended
    Edsk,
    /// ImageDisk
    Imd,
    /// Jeff Vavasour CoCo image with size-derived header
    Jvc,
    /// PC-Dragon VDK
    Vdk,
}

impl DiskImageFormat {
    /// All formats in default registry order
    pub const ALL: [DiskImageFormat; 5] = [
        DiskImageFormat::Edsk,
        DiskImageFormat::Imd,
        DiskImageFormat::Vdk,
        DiskImageFormat::Jvc,
        DiskImageFormat::Raw,
    ];

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            DiskImageFormat::Raw => "RAW",
            DiskImageFormat::Edsk => "EDSK",
            DiskImageFormat::Imd => "IMD",
            DiskImageFormat::Jvc => "JVC",
            DiskImageFormat::Vdk => "VDK",
        }
    }

    /// Usual file extensions
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            DiskImageFormat::Raw => &["dsk", "img", "ima", "ssd", "bin", "raw", "dos"],
            DiskImageFormat::Edsk => &["dsk", "edsk"],
            DiskImageFormat::Imd => &["imd"],
            DiskImageFormat::Jvc => &["jvc", "dsk"],
            DiskImageFormat::Vdk => &["vdk"],
        }
    }

    /// Parse a format name as typed by a user ("edsk", "IMD", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.name().eq_ignore_ascii_case(name))
    }

    /// Format implied by a file extension, used only to pick an output codec
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "imd" => Some(DiskImageFormat::Imd),
            "vdk" => Some(DiskImageFormat::Vdk),
            "jvc" => Some(DiskImageFormat::Jvc),
            "edsk" => Some(DiskImageFormat::Edsk),
            "img" | "ima" | "ssd" | "raw" | "bin" => Some(DiskImageFormat::Raw),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiskImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect a self-describing container from its leading bytes
pub fn detect_format(magic: &[u8]) -> Option<DiskImageFormat> {
    if magic.starts_with(b"EXTENDED") || magic.starts_with(b"MV - CPC") {
        Some(DiskImageFormat::Edsk)
    } else if magic.starts_with(IMD_SIGNATURE) {
        Some(DiskImageFormat::Imd)
    } else if magic.starts_with(VDK_SIGNATURE) {
        Some(DiskImageFormat::Vdk)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_edsk() {
        assert_eq!(detect_format(EDSK_NORMAL_SIGNATURE), Some(DiskImageFormat::Edsk));
        assert_eq!(detect_format(EDSK_EXTENDED_SIGNATURE), Some(DiskImageFormat::Edsk));
    }

    #[test]
    fn test_detect_other() {
        assert_eq!(detect_format(b"IMD 1.18: 01/01/2000"), Some(DiskImageFormat::Imd));
        assert_eq!(detect_format(b"dk\x0c\x00"), Some(DiskImageFormat::Vdk));
        assert_eq!(detect_format(b"INVALID DATA"), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(DiskImageFormat::from_name("imd"), Some(DiskImageFormat::Imd));
        assert_eq!(DiskImageFormat::from_name("floppy"), None);
        assert_eq!(
            DiskImageFormat::from_extension("games/chuckie.vdk"),
            Some(DiskImageFormat::Vdk)
        );
        assert_eq!(DiskImageFormat::from_extension("disk.dsk"), None);
    }
}
