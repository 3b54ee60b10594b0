/// Container signatures, block sizes and layout offsets

// EDSK

/// Normal EDSK signature ("MV - CPC" prefix is what identifies it)
pub const EDSK_NORMAL_SIGNATURE: &[u8] = b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n";

/// Extended EDSK signature
pub const EDSK_EXTENDED_SIGNATURE: &[u8] = b"EXTENDED CPC DSK File\r\nDisk-Info\r\n";

/// Track-Info block marker
pub const TRACK_INFO_MARKER: &[u8] = b"Track-Info\r\n";

/// Creator field written into new images (14 bytes)
pub const CREATOR_SIGNATURE: &[u8; 14] = b"retrodisk 0.1\0";

/// Size of the disk information block
pub const DISK_INFO_BLOCK_SIZE: usize = 256;

/// Size of a track information block header including its sector list
pub const TRACK_INFO_BLOCK_SIZE: usize = 256;

/// Size of one sector information list descriptor
pub const SECTOR_INFO_SIZE: usize = 8;

/// Offset of the sector information list inside a track information block
pub const SECTOR_INFO_LIST_OFFSET: usize = 0x18;

/// Sector descriptors that fit in one track information block
pub const MAX_SECTORS_PER_TRACK: usize = (TRACK_INFO_BLOCK_SIZE - SECTOR_INFO_LIST_OFFSET) / SECTOR_INFO_SIZE;

/// Offset of creator in disk info block
pub const DISK_INFO_CREATOR_OFFSET: usize = 34;

/// Offset of track count in disk info block
pub const DISK_INFO_TRACK_COUNT_OFFSET: usize = 0x30;

/// Offset of side count in disk info block
pub const DISK_INFO_SIDE_COUNT_OFFSET: usize = 0x31;

/// Offset of track size in disk info block (normal images)
pub const DISK_INFO_TRACK_SIZE_OFFSET: usize = 0x32;

/// Offset of the track size table in disk info block (extended images)
pub const DISK_INFO_EXT_TRACK_SIZE_OFFSET: usize = 0x34;

/// Track size table entries that fit in the disk info block
pub const MAX_TRACK_TABLE_ENTRIES: usize = DISK_INFO_BLOCK_SIZE - DISK_INFO_EXT_TRACK_SIZE_OFFSET;

// IMD

/// Leading signature of an ImageDisk file
pub const IMD_SIGNATURE: &[u8] = b"IMD ";

/// Version written into new IMD headers
pub const IMD_VERSION: &str = "1.18";

/// Comment terminator
pub const IMD_COMMENT_TERMINATOR: u8 = 0x1A;

/// Track header flag: a cylinder map follows the numbering map
pub const IMD_CYLINDER_MAP_FLAG: u8 = 0x80;

/// Track header flag: a head map follows
pub const IMD_HEAD_MAP_FLAG: u8 = 0x40;

/// Highest recording mode value
pub const IMD_MAX_MODE: u8 = 5;

/// Largest sector size exponent (8192 bytes)
pub const IMD_MAX_SIZE_CODE: u8 = 6;

// JVC

/// Number of meaningful JVC header bytes
pub const JVC_HEADER_FIELDS: usize = 5;

/// Largest JVC sector size
pub const JVC_MAX_SECTOR_SIZE: usize = 1024;

// VDK

/// VDK signature
pub const VDK_SIGNATURE: &[u8; 2] = b"dk";

/// Fixed part of a VDK header
pub const VDK_HEADER_SIZE: usize = 12;

/// VDK format version written
pub const VDK_VERSION: u8 = 0x10;

/// Source identifier written into new VDK headers
pub const VDK_SOURCE_ID: u8 = b'P';

/// Source version written into new VDK headers
pub const VDK_SOURCE_VERSION: u8 = 0x26;

/// Longest VDK disk name
pub const VDK_MAX_NAME: usize = 31;

/// VDK sectors per track
pub const VDK_SECTORS_PER_TRACK: u8 = 18;

/// VDK sector size
pub const VDK_SECTOR_SIZE: usize = 256;

/// Filler used by freshly created images
pub const EMPTY_SECTOR_FILL: u8 = 0xE5;

/// FDC sector size code to byte size mapping
pub const FDC_SECTOR_SIZES: [usize; 9] = [128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768];

/// Convert FDC size code to actual byte size
#[inline]
pub fn fdc_size_to_bytes(size_code: u8) -> usize {
    FDC_SECTOR_SIZES
        .get(size_code as usize)
        .copied()
        .unwrap_or(FDC_SECTOR_SIZES[FDC_SECTOR_SIZES.len() - 1])
}

/// Convert byte size to FDC size code
#[inline]
pub fn bytes_to_fdc_size(bytes: usize) -> Option<u8> {
    FDC_SECTOR_SIZES
        .iter()
        .position(|&size| size == bytes)
        .map(|code| code as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fdc_size_to_bytes() {
        assert_eq!(fdc_size_to_bytes(0), 128);
        assert_eq!(fdc_size_to_bytes(1), 256);
        assert_eq!(fdc_size_to_bytes(6), 8192);
        assert_eq!(fdc_size_to_bytes(200), 32768);
    }

    #[test]
    fn test_bytes_to_fdc_size() {
        assert_eq!(bytes_to_fdc_size(128), Some(0));
        assert_eq!(bytes_to_fdc_size(1024), Some(3));
        assert_eq!(bytes_to_fdc_size(1000), None);
    }

    #[test]
    fn test_sector_list_capacity() {
        assert_eq!(MAX_SECTORS_PER_TRACK, 29);
        assert_eq!(MAX_TRACK_TABLE_ENTRIES, 204);
    }
}
