/// PC-Dragon VDK codec
///
/// A 12-byte header, an optional disk name and further header bytes, then
/// 18 sectors of 256 bytes per track in track/side order.

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::format::{DiskImageFormat, Geometry};
use crate::image::{DiskImage, DiskImageBuilder, FormatData};
use crate::io::{read_u16_le, ImageCodec};
use log::{debug, warn};

/// VDK container codec
#[derive(Debug, Clone, Copy, Default)]
pub struct VdkCodec;

impl ImageCodec for VdkCodec {
    fn format(&self) -> DiskImageFormat {
        DiskImageFormat::Vdk
    }

    fn decode(&self, data: &[u8]) -> Result<DiskImage> {
        if data.len() < VDK_HEADER_SIZE || &data[0..2] != VDK_SIGNATURE {
            return Err(DiskError::invalid_format("missing VDK signature"));
        }
        let header_len = read_u16_le(data, 2) as usize;
        let (version, compat, source_id, source_version) = (data[4], data[5], data[6], data[7]);
        let (tracks, sides, flags, compression) = (data[8], data[9], data[10], data[11]);

        if header_len < VDK_HEADER_SIZE || header_len > data.len() {
            return Err(DiskError::parse(2, format!("header length {}", header_len)));
        }
        if compression & 0x07 != 0 {
            return Err(DiskError::UnsupportedFormat("compressed VDK".to_string()));
        }
        if tracks == 0 || sides == 0 || sides > 2 {
            return Err(DiskError::invalid_format(format!(
                "{} tracks, {} sides",
                tracks, sides
            )));
        }

        let name_len = (compression >> 3) as usize;
        let name_end = VDK_HEADER_SIZE + name_len;
        if name_end > header_len {
            return Err(DiskError::parse(11, "disk name overruns header"));
        }

        let geometry = Geometry::new(tracks, sides, VDK_SECTORS_PER_TRACK, VDK_SECTOR_SIZE as u16);
        let body = &data[header_len..];
        if body.len() != geometry.total_bytes() {
            return Err(DiskError::invalid_format(format!(
                "{} data bytes for {} tracks and {} sides",
                body.len(),
                tracks,
                sides
            )));
        }
        if version != VDK_VERSION {
            warn!("VDK version 0x{:02X}, expected 0x{:02X}", version, VDK_VERSION);
        }
        debug!("VDK image: {}", geometry);

        let metadata = FormatData::Vdk {
            version,
            compat,
            source_id,
            source_version,
            flags,
            name: data[VDK_HEADER_SIZE..name_end].to_vec(),
            extra: data[name_end..header_len].to_vec(),
        };
        DiskImage::from_linear(DiskImageFormat::Vdk, geometry, metadata, body)
    }

    fn encode(&self, image: &DiskImage) -> Result<Vec<u8>> {
        let geometry = image.geometry();
        if geometry.sectors_per_track != VDK_SECTORS_PER_TRACK
            || geometry.sector_size as usize != VDK_SECTOR_SIZE
        {
            return Err(DiskError::UnsupportedFormat(format!(
                "VDK holds 18 x 256 tracks, not {}",
                geometry
            )));
        }

        let default = crate::image::builder::default_metadata(DiskImageFormat::Vdk, geometry);
        let metadata = match image.metadata() {
            meta @ FormatData::Vdk { .. } => meta,
            _ => &default,
        };
        let FormatData::Vdk {
            version,
            compat,
            source_id,
            source_version,
            flags,
            name,
            extra,
        } = metadata
        else {
            return Err(DiskError::invalid_format("VDK metadata"));
        };

        let name = &name[..name.len().min(VDK_MAX_NAME)];
        let header_len = VDK_HEADER_SIZE + name.len() + extra.len();
        let header_len = u16::try_from(header_len)
            .map_err(|_| DiskError::UnsupportedFormat("VDK header too long".to_string()))?;

        let mut out = Vec::with_capacity(header_len as usize + geometry.total_bytes());
        out.extend_from_slice(VDK_SIGNATURE);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&[
            *version,
            *compat,
            *source_id,
            *source_version,
            geometry.tracks,
            geometry.sides,
            *flags,
            (name.len() as u8) << 3,
        ]);
        out.extend_from_slice(name);
        out.extend_from_slice(extra);
        out.extend_from_slice(&image.linear_bytes());
        Ok(out)
    }

    fn create(&self, geometry: &Geometry) -> Result<DiskImage> {
        let geometry = geometry.with_first_sector_id(1).with_filler(EMPTY_SECTOR_FILL);
        DiskImageBuilder::new()
            .format(DiskImageFormat::Vdk)
            .geometry(geometry)
            .build()
    }
}

/// Disk name stored in a VDK header, if the image carries one
pub fn disk_name(image: &DiskImage) -> Option<String> {
    match image.metadata() {
        FormatData::Vdk { name, .. } if !name.is_empty() => {
            Some(String::from_utf8_lossy(name).into_owned())
        }
        _ => None,
    }
}

/// Set the disk name stored in a VDK header
pub fn set_disk_name(image: &mut DiskImage, new_name: &str) -> Result<()> {
    if new_name.len() > VDK_MAX_NAME {
        return Err(DiskError::InvalidFilename(new_name.to_string()));
    }
    match image.metadata_mut() {
        FormatData::Vdk { name, .. } => {
            *name = new_name.as_bytes().to_vec();
            Ok(())
        }
        _ => Err(DiskError::UnsupportedFormat(
            "only VDK images carry a disk name".to_string(),
        )),
    }
}
