use thiserror::Error;

/// Result type alias for disk image and filesystem operations
pub type Result<T> = std::result::Result<T, DiskError>;

/// Errors that can occur when working with disk images, filesystems and containers
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error occurred while reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes do not match the layout a codec or driver expects
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Invalid track number specified
    #[error("Invalid track {track} on side {side} (max: {max})")]
    InvalidTrack {
        /// Track number
        track: u8,
        /// Side number
        side: u8,
        /// Maximum allowed track number
        max: u8,
    },

    /// Sector not present on the addressed track
    #[error("Invalid sector: {id} on track {track}, side {side}")]
    InvalidSector {
        /// Track number
        track: u8,
        /// Side number
        side: u8,
        /// Sector ID or index
        id: u8,
    },

    /// Recognised but unsupported variant
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Parse error at specific offset
    #[error("Parse error at offset {offset}: {message}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Error message
        message: String,
    },

    /// Filesystem-related error
    #[error("Filesystem error: {0}")]
    FileSystemError(String),

    /// On-disk structures are inconsistent (chain cycles, out of range pointers)
    #[error("Data integrity error: {0}")]
    IntegrityError(String),

    /// File not found in filesystem
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Disk is full, no free space
    #[error("Disk full: no free space available")]
    DiskFull,

    /// No free directory slot left
    #[error("Directory full: no free entry available")]
    DirectoryFull,

    /// Invalid filename
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Filesystem geometry disagrees with the image geometry
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// MMB slot index outside the container
    #[error("Slot {slot} out of range (max: {max})")]
    SlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Highest valid slot
        max: usize,
    },

    /// Every registered candidate rejected the input
    #[error("No matching {0} found")]
    NoMatchingFormat(String),
}

impl DiskError {
    /// Create a parse error with context
    pub fn parse<S: Into<String>>(offset: usize, message: S) -> Self {
        DiskError::ParseError {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        DiskError::InvalidFormat(message.into())
    }

    /// Create a filesystem error
    pub fn filesystem<S: Into<String>>(message: S) -> Self {
        DiskError::FileSystemError(message.into())
    }

    /// Create an integrity error
    pub fn integrity<S: Into<String>>(message: S) -> Self {
        DiskError::IntegrityError(message.into())
    }

    /// Create a geometry mismatch error
    pub fn geometry<S: Into<String>>(message: S) -> Self {
        DiskError::GeometryMismatch(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiskError::InvalidTrack {
            track: 50,
            side: 0,
            max: 39,
        };
        assert_eq!(err.to_string(), "Invalid track 50 on side 0 (max: 39)");
    }

    #[test]
    fn test_parse_error() {
        let err = DiskError::parse(256, "Track-Info signature missing");
        assert_eq!(
            err.to_string(),
            "Parse error at offset 256: Track-Info signature missing"
        );
    }

    #[test]
    fn test_slot_error() {
        let err = DiskError::SlotOutOfRange { slot: 600, max: 510 };
        assert_eq!(err.to_string(), "Slot 600 out of range (max: 510)");
    }
}
