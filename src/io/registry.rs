/// Ordered list of codecs consulted by trial parsing

use crate::error::{DiskError, Result};
use crate::format::DiskImageFormat;
use crate::image::DiskImage;
use crate::io::{codec_for, ImageCodec};
use log::{debug, info};
use std::path::Path;

/// Resolves bytes to a container format by decoding with each registered
/// codec in order; the first success wins
pub struct ImageRegistry {
    codecs: Vec<Box<dyn ImageCodec>>,
}

impl ImageRegistry {
    /// Registry with no codecs
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Registry with the given formats, in order
    pub fn with_order(formats: &[DiskImageFormat]) -> Self {
        Self {
            codecs: formats.iter().map(|&f| codec_for(f)).collect(),
        }
    }

    /// Append a codec
    pub fn register(&mut self, codec: Box<dyn ImageCodec>) {
        self.codecs.push(codec);
    }

    /// Registered formats in trial order
    pub fn formats(&self) -> Vec<DiskImageFormat> {
        self.codecs.iter().map(|c| c.format()).collect()
    }

    /// Registered codec for a format
    pub fn codec(&self, format: DiskImageFormat) -> Option<&dyn ImageCodec> {
        self.codecs
            .iter()
            .find(|c| c.format() == format)
            .map(|c| c.as_ref())
    }

    /// Decode in-memory bytes
    pub fn load_bytes(&self, data: &[u8]) -> Result<DiskImage> {
        for codec in &self.codecs {
            match codec.decode(data) {
                Ok(image) => {
                    info!("identified {} image", codec.name());
                    return Ok(image);
                }
                Err(e) => debug!("{} rejected image: {}", codec.name(), e),
            }
        }
        Err(DiskError::NoMatchingFormat("disk image format".to_string()))
    }

    /// Read and decode a file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<DiskImage> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let mut image = self.load_bytes(&data)?;
        image.filename = Some(path.display().to_string());
        Ok(image)
    }
}

impl Default for ImageRegistry {
    fn default() -> Self {
        Self::with_order(&DiskImageFormat::ALL)
    }
}
