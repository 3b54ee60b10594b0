/// Container codecs translating between file bytes and [`DiskImage`]

/// CPCEMU DSK (normal and extended)
pub mod edsk;
/// ImageDisk
pub mod imd;
/// JVC
pub mod jvc;
/// Headerless sector dumps
pub mod raw;
/// Ordered trial-parse registry
pub mod registry;
/// PC-Dragon VDK
pub mod vdk;

pub use edsk::EdskCodec;
pub use imd::ImdCodec;
pub use jvc::JvcCodec;
pub use raw::RawCodec;
pub use registry::ImageRegistry;
pub use vdk::VdkCodec;

use crate::error::Result;
use crate::format::{DiskImageFormat, Geometry};
use crate::image::DiskImage;

/// A disk image container codec
///
/// `decode` is also the format check: it must reject input that is not
/// laid out the way the container requires, so that a registry can move on
/// to the next candidate.
pub trait ImageCodec {
    /// The container this codec handles
    fn format(&self) -> DiskImageFormat;

    /// Human readable container name
    fn name(&self) -> &'static str {
        self.format().name()
    }

    /// Parse container bytes into an image
    fn decode(&self, data: &[u8]) -> Result<DiskImage>;

    /// Serialize an image into container bytes
    fn encode(&self, image: &DiskImage) -> Result<Vec<u8>>;

    /// Create a blank, formatted image
    fn create(&self, geometry: &Geometry) -> Result<DiskImage>;
}

/// Codec instance for a container format
pub fn codec_for(format: DiskImageFormat) -> Box<dyn ImageCodec> {
    match format {
        DiskImageFormat::Raw => Box::new(RawCodec),
        DiskImageFormat::Edsk => Box::new(EdskCodec),
        DiskImageFormat::Imd => Box::new(ImdCodec),
        DiskImageFormat::Jvc => Box::new(JvcCodec),
        DiskImageFormat::Vdk => Box::new(VdkCodec),
    }
}

#[inline]
pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}
