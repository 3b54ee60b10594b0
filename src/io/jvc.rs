/// JVC codec: sector dump preceded by a short header whose length is the
/// file size modulo 256

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::format::{DiskImageFormat, Geometry};
use crate::image::{DiskImage, DiskImageBuilder, FormatData};
use crate::io::ImageCodec;
use log::debug;

/// Header field values assumed when the header is shorter than five bytes
const DEFAULT_FIELDS: [u8; JVC_HEADER_FIELDS] = [18, 1, 1, 1, 0];

/// JVC container codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JvcCodec;

impl ImageCodec for JvcCodec {
    fn format(&self) -> DiskImageFormat {
        DiskImageFormat::Jvc
    }

    fn decode(&self, data: &[u8]) -> Result<DiskImage> {
        let header_len = data.len() % 256;
        if header_len == 0 {
            return Err(DiskError::invalid_format("no JVC header"));
        }
        let header = &data[..header_len];
        let field = |i: usize| header.get(i).copied().unwrap_or(DEFAULT_FIELDS[i]);
        let (spt, sides, size_code, first_id, attribute_flag) =
            (field(0), field(1), field(2), field(3), field(4));

        if spt == 0 || sides == 0 || sides > 2 {
            return Err(DiskError::invalid_format(format!(
                "{} sectors per track, {} sides",
                spt, sides
            )));
        }
        let sector_size = fdc_size_to_bytes(size_code);
        if sector_size > JVC_MAX_SECTOR_SIZE {
            return Err(DiskError::invalid_format(format!("sector size code {}", size_code)));
        }

        let stride = sector_size + usize::from(attribute_flag != 0);
        let body = &data[header_len..];
        let track_bytes = spt as usize * sides as usize * stride;
        let tracks = body.len() / track_bytes;
        if tracks == 0 || tracks > u8::MAX as usize || body.len() % track_bytes != 0 {
            return Err(DiskError::invalid_format(format!(
                "{} data bytes do not make whole tracks of {}",
                body.len(),
                track_bytes
            )));
        }

        let mut attributes = Vec::new();
        let linear: Vec<u8> = if attribute_flag != 0 {
            let mut linear = Vec::with_capacity(body.len());
            for chunk in body.chunks_exact(stride) {
                attributes.push(chunk[0]);
                linear.extend_from_slice(&chunk[1..]);
            }
            linear
        } else {
            body.to_vec()
        };

        debug!(
            "JVC header of {} bytes: {} tracks, {} sides, {} x {}",
            header_len, tracks, sides, spt, sector_size
        );
        let geometry = Geometry::new(tracks as u8, sides, spt, sector_size as u16)
            .with_first_sector_id(first_id);
        let metadata = FormatData::Jvc {
            header_len,
            attribute_flag,
            extra: header.get(JVC_HEADER_FIELDS..).unwrap_or_default().to_vec(),
            attributes,
        };
        DiskImage::from_linear(DiskImageFormat::Jvc, geometry, metadata, &linear)
    }

    fn encode(&self, image: &DiskImage) -> Result<Vec<u8>> {
        let geometry = image.geometry();
        let size_code = geometry
            .size_code()
            .filter(|_| geometry.sector_size as usize <= JVC_MAX_SECTOR_SIZE)
            .ok_or_else(|| {
                DiskError::UnsupportedFormat(format!("JVC sector size {}", geometry.sector_size))
            })?;

        let (header_len, attribute_flag, extra, attributes) = match image.metadata() {
            FormatData::Jvc {
                header_len,
                attribute_flag,
                extra,
                attributes,
            } => (*header_len, *attribute_flag, extra.as_slice(), attributes.as_slice()),
            _ => (JVC_HEADER_FIELDS, 0, &[][..], &[][..]),
        };

        let fields = [
            geometry.sectors_per_track,
            geometry.sides,
            size_code,
            geometry.first_sector_id,
            attribute_flag,
        ];
        // a short header may only omit fields that hold their default
        let needed = fields
            .iter()
            .zip(DEFAULT_FIELDS.iter())
            .rposition(|(value, default)| value != default)
            .map_or(1, |i| i + 1);
        let mut header = fields.to_vec();
        header.extend_from_slice(extra);
        header.truncate(header_len.max(needed));
        if header.len() >= 256 {
            return Err(DiskError::UnsupportedFormat("JVC header too long".to_string()));
        }

        let linear = image.linear_bytes();
        let mut out = header;
        if attribute_flag != 0 {
            let sector_size = geometry.sector_size as usize;
            for (i, sector) in linear.chunks(sector_size).enumerate() {
                out.push(attributes.get(i).copied().unwrap_or(0));
                out.extend_from_slice(sector);
            }
        } else {
            out.extend_from_slice(&linear);
        }
        Ok(out)
    }

    fn create(&self, geometry: &Geometry) -> Result<DiskImage> {
        DiskImageBuilder::new()
            .format(DiskImageFormat::Jvc)
            .geometry(geometry.with_filler(0))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_byte_header() {
        let mut bytes = vec![10, 2, 1, 1, 0];
        bytes.extend((0..40 * 2 * 10).flat_map(|lsn| vec![(lsn % 251) as u8; 256]));
        let image = JvcCodec.decode(&bytes).unwrap();
        assert_eq!(image.tracks(), 40);
        assert_eq!(image.sides(), 2);
        assert_eq!(image.sectors_per_track(), 10);
        assert_eq!(image.read_lsn(13).unwrap()[0], 13);
        assert_eq!(image.sector_by_id(0, 1, 4).unwrap()[0], 13);
        assert_eq!(JvcCodec.encode(&image).unwrap(), bytes);
    }

    #[test]
    fn test_short_header_uses_defaults() {
        let mut bytes = vec![18];
        bytes.extend(vec![0u8; 35 * 18 * 256]);
        let image = JvcCodec.decode(&bytes).unwrap();
        assert_eq!(image.tracks(), 35);
        assert_eq!(image.sides(), 1);
        assert_eq!(image.geometry().first_sector_id, 1);
        assert_eq!(JvcCodec.encode(&image).unwrap().len(), bytes.len());
    }

    #[test]
    fn test_attribute_bytes_round_trip() {
        // 256 sectors of 129 bytes keep the body a multiple of 256
        let mut bytes = vec![16, 1, 0, 1, 1];
        for lsn in 0..256usize {
            bytes.push(0x80 ^ lsn as u8);
            bytes.extend(vec![lsn as u8; 128]);
        }
        let image = JvcCodec.decode(&bytes).unwrap();
        assert_eq!(image.tracks(), 16);
        assert_eq!(image.read_lsn(3).unwrap(), &[3u8; 128][..]);
        match image.metadata() {
            FormatData::Jvc { attributes, .. } => assert_eq!(attributes[3], 0x83),
            other => panic!("unexpected metadata {:?}", other),
        }
        assert_eq!(JvcCodec.encode(&image).unwrap(), bytes);
    }

    #[test]
    fn test_extra_header_bytes_kept() {
        let mut bytes = vec![18, 1, 1, 1, 0, 0xAA, 0xBB];
        bytes.extend(vec![0u8; 18 * 256]);
        let image = JvcCodec.decode(&bytes).unwrap();
        assert_eq!(&JvcCodec.encode(&image).unwrap()[..7], &bytes[..7]);
    }

    #[test]
    fn test_rejects() {
        assert!(JvcCodec.decode(&vec![0u8; 184320]).is_err());
        let mut three_sides = vec![18, 3];
        three_sides.extend(vec![0u8; 3 * 18 * 256]);
        assert!(JvcCodec.decode(&three_sides).is_err());
        let mut big_sectors = vec![9, 1, 4];
        big_sectors.extend(vec![0u8; 9 * 2048]);
        assert!(JvcCodec.decode(&big_sectors).is_err());
    }

    #[test]
    fn test_create_is_zero_filled() {
        let image = JvcCodec.create(&Geometry::coco_35()).unwrap();
        let bytes = JvcCodec.encode(&image).unwrap();
        assert_eq!(bytes.len(), 5 + 35 * 18 * 256);
        assert_eq!(&bytes[..5], &[18, 1, 1, 1, 0]);
        assert!(bytes[5..].iter().all(|&b| b == 0));
    }
}
