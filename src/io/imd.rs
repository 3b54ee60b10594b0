/// ImageDisk (IMD) codec
///
/// Compressed sectors are expanded on load and always written back in full,
/// so a load/save cycle grows such files but never changes their content.

use crate::error::{DiskError, Result};
use crate::fdc::{FdcStatus1, FdcStatus2};
use crate::format::constants::*;
use crate::format::{DiskImageFormat, Geometry};
use crate::image::{Disk, DiskImage, DiskImageBuilder, FormatData, RecordingMode, Sector, SectorId, Track};
use crate::io::ImageCodec;
use log::trace;

/// Sector record type tags
mod sector_type {
    pub const UNAVAILABLE: u8 = 0;
    pub const COMPRESSED: u8 = 0x01;
    pub const DELETED: u8 = 0x02;
    pub const ERROR: u8 = 0x04;
    pub const LAST: u8 = 8;
}

/// IMD container codec
#[derive(Debug, Clone, Copy, Default)]
pub struct ImdCodec;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let slice = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or_else(|| DiskError::parse(self.pos, format!("{} truncated", what)))?;
        self.pos += len;
        Ok(slice)
    }

    fn byte(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}

impl ImageCodec for ImdCodec {
    fn format(&self) -> DiskImageFormat {
        DiskImageFormat::Imd
    }

    fn decode(&self, data: &[u8]) -> Result<DiskImage> {
        if !data.starts_with(IMD_SIGNATURE) {
            return Err(DiskError::invalid_format("missing IMD signature"));
        }
        let comment_end = data
            .iter()
            .position(|&b| b == IMD_COMMENT_TERMINATOR)
            .ok_or_else(|| DiskError::parse(0, "comment terminator not found"))?;
        let comment = data[..comment_end].to_vec();

        let mut cursor = Cursor {
            data,
            pos: comment_end + 1,
        };
        let mut disks = vec![Disk::new(0), Disk::new(1)];
        let mut sides_used = 0u8;
        let mut records = 0usize;

        while !cursor.at_end() {
            let header_pos = cursor.pos;
            let header = cursor.take(5, "track header")?;
            let (mode, cylinder, head, spt, size_code) =
                (header[0], header[1], header[2], header[3], header[4]);
            let side = head & !(IMD_CYLINDER_MAP_FLAG | IMD_HEAD_MAP_FLAG);

            if mode > IMD_MAX_MODE {
                return Err(DiskError::parse(header_pos, format!("mode {}", mode)));
            }
            if side > 1 {
                return Err(DiskError::parse(header_pos + 2, format!("head {}", side)));
            }
            if size_code == 0xFF {
                return Err(DiskError::UnsupportedFormat(
                    "IMD variable sector size tables".to_string(),
                ));
            }
            if size_code > IMD_MAX_SIZE_CODE {
                return Err(DiskError::parse(header_pos + 4, format!("sector size code {}", size_code)));
            }

            let numbering = cursor.take(spt as usize, "sector numbering map")?;
            let cylinder_map = if head & IMD_CYLINDER_MAP_FLAG != 0 {
                Some(cursor.take(spt as usize, "cylinder map")?)
            } else {
                None
            };
            let head_map = if head & IMD_HEAD_MAP_FLAG != 0 {
                Some(cursor.take(spt as usize, "head map")?)
            } else {
                None
            };

            let size = 128usize << size_code;
            let mut track = Track::new(cylinder, side);
            track.mode = mode;
            track.recording_mode = if mode < 3 {
                RecordingMode::FM
            } else {
                RecordingMode::MFM
            };

            for i in 0..spt as usize {
                let id = SectorId::new(
                    cylinder_map.map_or(cylinder, |m| m[i]),
                    head_map.map_or(side, |m| m[i]),
                    numbering[i],
                    size_code,
                );
                let type_pos = cursor.pos;
                let kind = cursor.byte("sector record")?;
                let sector = match kind {
                    sector_type::UNAVAILABLE => Sector::with_data(id, Vec::new()),
                    1..=sector_type::LAST => {
                        let flags = kind - 1;
                        let data = if flags & sector_type::COMPRESSED != 0 {
                            vec![cursor.byte("compressed sector")?; size]
                        } else {
                            cursor.take(size, "sector data")?.to_vec()
                        };
                        let error = flags & sector_type::ERROR != 0;
                        let deleted = flags & sector_type::DELETED != 0;
                        let st1 = if error { FdcStatus1::DE } else { 0 };
                        let st2 = (if error { FdcStatus2::DD } else { 0 })
                            | (if deleted { FdcStatus2::CM } else { 0 });
                        Sector::with_status(id, FdcStatus1::new(st1), FdcStatus2::new(st2), data)
                    }
                    _ => {
                        return Err(DiskError::parse(type_pos, format!("sector type {}", kind)));
                    }
                };
                track.add_sector(sector);
            }

            trace!("IMD track {} side {}: {} sectors of {}", cylinder, side, spt, size);
            disks[side as usize].set_track(track);
            sides_used = sides_used.max(side + 1);
            records += 1;
        }

        if records == 0 {
            return Err(DiskError::invalid_format("no track records"));
        }
        disks.truncate(sides_used as usize);
        DiskImage::from_disks(DiskImageFormat::Imd, disks, FormatData::Imd { comment })
    }

    fn encode(&self, image: &DiskImage) -> Result<Vec<u8>> {
        let mut out = match image.metadata() {
            FormatData::Imd { comment } => comment.clone(),
            _ => match crate::image::builder::default_metadata(DiskImageFormat::Imd, image.geometry()) {
                FormatData::Imd { comment } => comment,
                _ => Vec::new(),
            },
        };
        out.push(IMD_COMMENT_TERMINATOR);

        for track_num in 0..image.tracks() {
            for side in 0..image.sides() {
                let track = image.track(track_num, side)?;
                if track.is_formatted() {
                    encode_track(track, &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn create(&self, geometry: &Geometry) -> Result<DiskImage> {
        DiskImageBuilder::new()
            .format(DiskImageFormat::Imd)
            .geometry(*geometry)
            .build()
    }
}

fn encode_track(track: &Track, out: &mut Vec<u8>) -> Result<()> {
    let sectors = track.sectors();
    let size_code = sectors.first().map_or(0, |s| s.id.size_code);
    if sectors.iter().any(|s| s.id.size_code != size_code) {
        return Err(DiskError::UnsupportedFormat(format!(
            "track {} side {} mixes sector sizes",
            track.track_number, track.side_number
        )));
    }
    if size_code > IMD_MAX_SIZE_CODE || sectors.len() > u8::MAX as usize {
        return Err(DiskError::UnsupportedFormat(format!(
            "track {} side {} cannot be expressed in IMD",
            track.track_number, track.side_number
        )));
    }

    let need_cylinder_map = sectors.iter().any(|s| s.id.track != track.track_number);
    let need_head_map = sectors.iter().any(|s| s.id.side != track.side_number);
    let mut head = track.side_number;
    if need_cylinder_map {
        head |= IMD_CYLINDER_MAP_FLAG;
    }
    if need_head_map {
        head |= IMD_HEAD_MAP_FLAG;
    }

    out.extend_from_slice(&[
        track.mode.min(IMD_MAX_MODE),
        track.track_number,
        head,
        sectors.len() as u8,
        size_code,
    ]);
    out.extend(sectors.iter().map(|s| s.id.sector));
    if need_cylinder_map {
        out.extend(sectors.iter().map(|s| s.id.track));
    }
    if need_head_map {
        out.extend(sectors.iter().map(|s| s.id.side));
    }

    let size = 128usize << size_code;
    for sector in sectors {
        if sector.data().is_empty() {
            out.push(sector_type::UNAVAILABLE);
            continue;
        }
        let error = sector.fdc_status1.data_error() || sector.fdc_status2.data_field_error();
        let mut kind = 1;
        if sector.is_deleted() {
            kind += sector_type::DELETED;
        }
        if error {
            kind += sector_type::ERROR;
        }
        out.push(kind);
        let data = sector.data();
        let stored = data.len().min(size);
        out.extend_from_slice(&data[..stored]);
        out.resize(out.len() + (size - stored), track.filler_byte);
    }
    Ok(())
}
