/// Builder for blank disk images

use crate::error::Result;
use crate::format::{DiskImageFormat, Geometry, CREATOR_SIGNATURE, IMD_VERSION, VDK_SOURCE_ID, VDK_SOURCE_VERSION, VDK_VERSION};
use crate::image::{DiskImage, FormatData};

/// Builder for constructing blank images of any container format
#[derive(Debug, Clone)]
pub struct DiskImageBuilder {
    format: DiskImageFormat,
    geometry: Geometry,
}

impl DiskImageBuilder {
    /// Create a new builder with default values (extended EDSK, Dragon SS40)
    pub fn new() -> Self {
        Self {
            format: DiskImageFormat::Edsk,
            geometry: Geometry::default(),
        }
    }

    /// Set the container format
    pub fn format(mut self, format: DiskImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the whole geometry
    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the number of sides
    pub fn sides(mut self, sides: u8) -> Self {
        self.geometry.sides = sides;
        self
    }

    /// Set the number of tracks
    pub fn tracks(mut self, tracks: u8) -> Self {
        self.geometry.tracks = tracks;
        self
    }

    /// Set sectors per track
    pub fn sectors_per_track(mut self, sectors_per_track: u8) -> Self {
        self.geometry.sectors_per_track = sectors_per_track;
        self
    }

    /// Set sector size
    pub fn sector_size(mut self, sector_size: u16) -> Self {
        self.geometry.sector_size = sector_size;
        self
    }

    /// Set the ID of the first sector on each track
    pub fn first_sector_id(mut self, id: u8) -> Self {
        self.geometry.first_sector_id = id;
        self
    }

    /// Set the byte every sector is filled with
    pub fn filler(mut self, filler: u8) -> Self {
        self.geometry.filler_byte = filler;
        self
    }

    /// Build the image with every sector filled
    pub fn build(self) -> Result<DiskImage> {
        let metadata = default_metadata(self.format, &self.geometry);
        let mut image = DiskImage::from_linear(self.format, self.geometry, metadata, &[])?;
        image.changed = true;
        Ok(image)
    }
}

impl Default for DiskImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Header metadata a freshly created image of `format` starts with
pub(crate) fn default_metadata(format: DiskImageFormat, geometry: &Geometry) -> FormatData {
    match format {
        DiskImageFormat::Raw => FormatData::Raw,
        DiskImageFormat::Edsk => FormatData::Edsk {
            extended: true,
            creator: *CREATOR_SIGNATURE,
        },
        DiskImageFormat::Imd => {
            let stamp = chrono::Local::now().format("%d/%m/%Y %H:%M:%S");
            let comment = format!(
                "IMD {}: {}\r\nCreated by retrodisk ({})",
                IMD_VERSION, stamp, geometry
            );
            FormatData::Imd {
                comment: comment.into_bytes(),
            }
        }
        DiskImageFormat::Jvc => FormatData::Jvc {
            header_len: crate::format::JVC_HEADER_FIELDS,
            attribute_flag: 0,
            extra: Vec::new(),
            attributes: Vec::new(),
        },
        DiskImageFormat::Vdk => FormatData::Vdk {
            version: VDK_VERSION,
            compat: VDK_VERSION,
            source_id: VDK_SOURCE_ID,
            source_version: VDK_SOURCE_VERSION,
            flags: 0,
            name: Vec::new(),
            extra: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let image = DiskImageBuilder::new().build().unwrap();
        assert_eq!(image.format(), DiskImageFormat::Edsk);
        assert_eq!(image.sides(), 1);
        assert_eq!(image.tracks(), 40);
        assert!(image.is_changed());
    }

    #[test]
    fn test_builder_custom() {
        let image = DiskImageBuilder::new()
            .format(DiskImageFormat::Imd)
            .sides(2)
            .tracks(80)
            .sectors_per_track(9)
            .sector_size(512)
            .first_sector_id(1)
            .filler(0xF6)
            .build()
            .unwrap();

        assert_eq!(image.disks().len(), 2);
        assert_eq!(image.geometry().sector_size, 512);
        assert_eq!(image.sector_by_id(79, 1, 9).unwrap(), &[0xF6; 512][..]);
        match image.metadata() {
            FormatData::Imd { comment } => assert!(comment.starts_with(b"IMD 1.18: ")),
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_builder_rejects_bad_geometry() {
        assert!(DiskImageBuilder::new().sides(3).build().is_err());
        assert!(DiskImageBuilder::new().sector_size(100).build().is_err());
    }

    #[test]
    fn test_builder_sector_ids() {
        let image = DiskImageBuilder::new()
            .geometry(Geometry::acorn_ssd80())
            .build()
            .unwrap();
        let track = image.track(5, 0).unwrap();
        assert_eq!(track.sector_ids(), (0..10).collect::<Vec<u8>>());
    }
}
