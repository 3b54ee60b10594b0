/// CPCEMU DSK codec, normal ("MV - CPC") and extended ("EXTENDED") layouts

use crate::error::{DiskError, Result};
use crate::fdc::{FdcStatus1, FdcStatus2};
use crate::format::constants::*;
use crate::format::{DiskImageFormat, Geometry};
use crate::image::{DataRate, Disk, DiskImage, DiskImageBuilder, FormatData, RecordingMode, Sector, SectorId, Track};
use crate::io::{read_u16_le, ImageCodec};
use log::{debug, trace, warn};

/// EDSK container codec
#[derive(Debug, Clone, Copy, Default)]
pub struct EdskCodec;

impl ImageCodec for EdskCodec {
    fn format(&self) -> DiskImageFormat {
        DiskImageFormat::Edsk
    }

    fn decode(&self, data: &[u8]) -> Result<DiskImage> {
        if data.len() < DISK_INFO_BLOCK_SIZE {
            return Err(DiskError::parse(0, "shorter than a disk information block"));
        }
        let extended = if data.starts_with(b"EXTENDED") {
            true
        } else if data.starts_with(b"MV - CPC") {
            false
        } else {
            return Err(DiskError::invalid_format("missing DSK signature"));
        };

        let num_tracks = data[DISK_INFO_TRACK_COUNT_OFFSET];
        let num_sides = data[DISK_INFO_SIDE_COUNT_OFFSET];
        let track_size = read_u16_le(data, DISK_INFO_TRACK_SIZE_OFFSET) as usize;
        if num_sides == 0 || num_sides > 2 || num_tracks == 0 {
            return Err(DiskError::invalid_format(format!(
                "{} tracks, {} sides",
                num_tracks, num_sides
            )));
        }
        if extended && num_tracks as usize * num_sides as usize > MAX_TRACK_TABLE_ENTRIES {
            return Err(DiskError::invalid_format("track size table overflows header"));
        }
        if !extended && track_size < TRACK_INFO_BLOCK_SIZE {
            return Err(DiskError::invalid_format(format!("track size {}", track_size)));
        }

        let mut creator = [0u8; 14];
        creator.copy_from_slice(&data[DISK_INFO_CREATOR_OFFSET..DISK_INFO_CREATOR_OFFSET + 14]);

        let mut disks: Vec<Disk> = (0..num_sides)
            .map(|side| Disk::with_capacity(side, num_tracks as usize))
            .collect();
        let mut offset = DISK_INFO_BLOCK_SIZE;

        // blocks are stored cylinder by cylinder, sides interleaved
        for track_num in 0..num_tracks {
            for side in 0..num_sides {
                let block_size = if extended {
                    let entry = track_num as usize * num_sides as usize + side as usize;
                    data[DISK_INFO_EXT_TRACK_SIZE_OFFSET + entry] as usize * 256
                } else {
                    track_size
                };

                let disk = &mut disks[side as usize];
                if block_size == 0 {
                    trace!("track {} side {} unformatted", track_num, side);
                    disk.add_track(Track::unformatted(track_num, side));
                    continue;
                }
                if offset >= data.len() {
                    warn!(
                        "image ends before track {} side {}, treating it as unformatted",
                        track_num, side
                    );
                    disk.add_track(Track::unformatted(track_num, side));
                    continue;
                }

                let end = (offset + block_size).min(data.len());
                let track = parse_track(&data[offset..end], offset, track_num, side, extended)?;
                disk.add_track(track);
                offset += block_size;
            }
        }

        DiskImage::from_disks(
            DiskImageFormat::Edsk,
            disks,
            FormatData::Edsk { extended, creator },
        )
    }

    fn encode(&self, image: &DiskImage) -> Result<Vec<u8>> {
        let (extended, creator) = match image.metadata() {
            FormatData::Edsk { extended, creator } => (*extended, *creator),
            _ => (true, *CREATOR_SIGNATURE),
        };
        let num_tracks = image.tracks();
        let num_sides = image.sides();
        // A normal DSK has no way to mark a track unformatted
        let has_unformatted = (0..num_tracks)
            .flat_map(|t| (0..num_sides).map(move |s| (t, s)))
            .any(|(t, s)| image.track(t, s).is_ok_and(|track| !track.is_formatted()));
        if !extended && has_unformatted {
            debug!("writing extended DSK to keep unformatted tracks");
        }
        let extended = extended || has_unformatted;
        if extended && num_tracks as usize * num_sides as usize > MAX_TRACK_TABLE_ENTRIES {
            return Err(DiskError::UnsupportedFormat(format!(
                "{} tracks x {} sides do not fit an extended track table",
                num_tracks, num_sides
            )));
        }

        let mut blocks: Vec<Option<Vec<u8>>> = Vec::new();
        for track_num in 0..num_tracks {
            for side in 0..num_sides {
                let track = image.track(track_num, side)?;
                if !track.is_formatted() && extended {
                    blocks.push(None);
                } else {
                    blocks.push(Some(encode_track(track, extended)?));
                }
            }
        }

        let mut out = vec![0u8; DISK_INFO_BLOCK_SIZE];
        let signature = if extended {
            EDSK_EXTENDED_SIGNATURE
        } else {
            EDSK_NORMAL_SIGNATURE
        };
        out[..signature.len()].copy_from_slice(signature);
        out[DISK_INFO_CREATOR_OFFSET..DISK_INFO_CREATOR_OFFSET + 14].copy_from_slice(&creator);
        out[DISK_INFO_TRACK_COUNT_OFFSET] = num_tracks;
        out[DISK_INFO_SIDE_COUNT_OFFSET] = num_sides;

        if extended {
            for (entry, block) in blocks.iter().enumerate() {
                let units = block.as_ref().map_or(0, |b| b.len() / 256);
                if units > u8::MAX as usize {
                    return Err(DiskError::UnsupportedFormat(format!(
                        "track block of {} bytes exceeds the track size table",
                        units * 256
                    )));
                }
                out[DISK_INFO_EXT_TRACK_SIZE_OFFSET + entry] = units as u8;
            }
            for block in blocks.into_iter().flatten() {
                out.extend_from_slice(&block);
            }
        } else {
            let track_size = blocks
                .iter()
                .flatten()
                .map(|b| b.len())
                .max()
                .unwrap_or(TRACK_INFO_BLOCK_SIZE);
            if track_size > u16::MAX as usize {
                return Err(DiskError::UnsupportedFormat(format!(
                    "track size {} too large for a normal DSK",
                    track_size
                )));
            }
            out[DISK_INFO_TRACK_SIZE_OFFSET..DISK_INFO_TRACK_SIZE_OFFSET + 2]
                .copy_from_slice(&(track_size as u16).to_le_bytes());
            for mut block in blocks.into_iter().flatten() {
                block.resize(track_size, 0);
                out.extend_from_slice(&block);
            }
        }
        Ok(out)
    }

    fn create(&self, geometry: &Geometry) -> Result<DiskImage> {
        DiskImageBuilder::new()
            .format(DiskImageFormat::Edsk)
            .geometry(*geometry)
            .build()
    }
}

/// Parse one Track Information Block and the sector data that follows it
fn parse_track(block: &[u8], base: usize, track_num: u8, side: u8, extended: bool) -> Result<Track> {
    if block.len() < SECTOR_INFO_LIST_OFFSET || !block.starts_with(TRACK_INFO_MARKER) {
        return Err(DiskError::parse(base, "Track-Info block expected"));
    }
    if block[0x10] != track_num || block[0x11] != side {
        trace!(
            "track block at {} claims track {} side {}, stored as {} / {}",
            base, block[0x10], block[0x11], track_num, side
        );
    }

    let num_sectors = block[0x15] as usize;
    if num_sectors > MAX_SECTORS_PER_TRACK {
        return Err(DiskError::parse(
            base + 0x15,
            format!("{} sectors do not fit a track information block", num_sectors),
        ));
    }

    let mut track = Track::new(track_num, side);
    track.data_rate = DataRate::from(block[0x12]);
    track.recording_mode = RecordingMode::from(block[0x13]);
    track.gap3_length = block[0x16];
    track.filler_byte = block[0x17];

    let mut data_offset = TRACK_INFO_BLOCK_SIZE;
    for i in 0..num_sectors {
        let sib_offset = SECTOR_INFO_LIST_OFFSET + i * SECTOR_INFO_SIZE;
        let Some(sib) = block.get(sib_offset..sib_offset + SECTOR_INFO_SIZE) else {
            return Err(DiskError::parse(base + sib_offset, "sector information list truncated"));
        };

        let id = SectorId::new(sib[0], sib[1], sib[2], sib[3]);
        let length = if extended {
            read_u16_le(sib, 6) as usize
        } else {
            id.size_bytes()
        };

        let mut sector_data = block
            .get(data_offset.min(block.len())..(data_offset + length).min(block.len()))
            .unwrap_or_default()
            .to_vec();
        if sector_data.len() < length {
            warn!(
                "sector {} on track {} side {} is short by {} bytes, padding with 0x{:02X}",
                id.sector,
                track_num,
                side,
                length - sector_data.len(),
                track.filler_byte
            );
            sector_data.resize(length, track.filler_byte);
        }
        data_offset += length;

        track.add_sector(Sector::with_status(
            id,
            FdcStatus1::new(sib[4]),
            FdcStatus2::new(sib[5]),
            sector_data,
        ));
    }

    Ok(track)
}

/// Serialize a track as a Track Information Block plus data, padded to 256
fn encode_track(track: &Track, extended: bool) -> Result<Vec<u8>> {
    if track.sector_count() > MAX_SECTORS_PER_TRACK {
        return Err(DiskError::UnsupportedFormat(format!(
            "track {} side {} has {} sectors, at most {} fit",
            track.track_number,
            track.side_number,
            track.sector_count(),
            MAX_SECTORS_PER_TRACK
        )));
    }

    let mut block = vec![0u8; TRACK_INFO_BLOCK_SIZE];
    block[..TRACK_INFO_MARKER.len()].copy_from_slice(TRACK_INFO_MARKER);
    block[0x10] = track.track_number;
    block[0x11] = track.side_number;
    block[0x12] = track.data_rate.into();
    block[0x13] = track.recording_mode.into();
    block[0x14] = track.sectors().first().map_or(2, |s| s.id.size_code);
    block[0x15] = track.sector_count() as u8;
    block[0x16] = track.gap3_length;
    block[0x17] = track.filler_byte;

    for (i, sector) in track.sectors().iter().enumerate() {
        let stored: Vec<u8> = if extended {
            sector.data().to_vec()
        } else {
            let mut data = sector.data().to_vec();
            data.resize(sector.declared_size(), track.filler_byte);
            data
        };
        let length = if extended { stored.len() } else { 0 };
        if length > u16::MAX as usize {
            return Err(DiskError::UnsupportedFormat(format!(
                "sector {} holds {} bytes",
                sector.id.sector,
                stored.len()
            )));
        }

        let sib = SECTOR_INFO_LIST_OFFSET + i * SECTOR_INFO_SIZE;
        block[sib] = sector.id.track;
        block[sib + 1] = sector.id.side;
        block[sib + 2] = sector.id.sector;
        block[sib + 3] = sector.id.size_code;
        block[sib + 4] = sector.fdc_status1.0;
        block[sib + 5] = sector.fdc_status2.0;
        block[sib + 6..sib + 8].copy_from_slice(&(length as u16).to_le_bytes());
        block.extend_from_slice(&stored);
    }

    let padded = block.len().div_ceil(256) * 256;
    block.resize(padded, 0);
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_image(extended: bool) -> DiskImage {
        let mut image = EdskCodec
            .create(&Geometry::new(3, 2, 9, 512).with_first_sector_id(0xC1))
            .unwrap();
        if let FormatData::Edsk { extended: flag, .. } = image.metadata_mut() {
            *flag = extended;
        }
        image
    }

    #[test]
    fn test_encoded_layout() {
        let image = small_image(true);
        let bytes = EdskCodec.encode(&image).unwrap();
        assert!(bytes.starts_with(EDSK_EXTENDED_SIGNATURE));
        assert_eq!(bytes[DISK_INFO_TRACK_COUNT_OFFSET], 3);
        assert_eq!(bytes[DISK_INFO_SIDE_COUNT_OFFSET], 2);
        // 256 byte header plus 9 * 512 of data is 19 units of 256
        assert_eq!(bytes[DISK_INFO_EXT_TRACK_SIZE_OFFSET], 19);
        assert_eq!(bytes.len(), 256 + 6 * 19 * 256);
        assert!(bytes[256..].starts_with(TRACK_INFO_MARKER));
        assert_eq!(bytes.len() % 256, 0);
    }

    #[test]
    fn test_round_trip_extended() {
        let mut image = small_image(true);
        image.sector_by_id_mut(2, 1, 0xC5).unwrap()[0] = 0x42;
        let decoded = EdskCodec.decode(&EdskCodec.encode(&image).unwrap()).unwrap();
        assert_eq!(decoded.disks(), image.disks());
        assert_eq!(decoded.geometry().first_sector_id, 0xC1);
        assert_eq!(decoded.sector_by_id(2, 1, 0xC5).unwrap()[0], 0x42);
    }

    #[test]
    fn test_round_trip_normal() {
        let image = small_image(false);
        let bytes = EdskCodec.encode(&image).unwrap();
        assert!(bytes.starts_with(b"MV - CPC"));
        assert_eq!(read_u16_le(&bytes, DISK_INFO_TRACK_SIZE_OFFSET), 256 + 9 * 512);
        let decoded = EdskCodec.decode(&bytes).unwrap();
        assert_eq!(decoded.disks(), image.disks());
        assert_eq!(decoded.metadata(), image.metadata());
    }

    #[test]
    fn test_unformatted_track_is_skipped() {
        let mut image = small_image(true);
        image.disks_mut()[0].set_track(Track::unformatted(1, 0));
        let bytes = EdskCodec.encode(&image).unwrap();
        assert_eq!(bytes[DISK_INFO_EXT_TRACK_SIZE_OFFSET + 2], 0);
        assert_eq!(bytes.len(), 256 + 5 * 19 * 256);

        let decoded = EdskCodec.decode(&bytes).unwrap();
        let info = decoded.track_info(1, 0).unwrap();
        assert!(!info.formatted);
        assert_eq!(info.sectors_num, 0);
        assert!(decoded.track_info(1, 1).unwrap().formatted);
    }

    #[test]
    fn test_normal_image_with_unformatted_track_writes_extended() {
        let mut image = small_image(false);
        image.disks_mut()[1].set_track(Track::unformatted(2, 1));
        let bytes = EdskCodec.encode(&image).unwrap();
        assert!(bytes.starts_with(EDSK_EXTENDED_SIGNATURE));
        assert_eq!(bytes[DISK_INFO_EXT_TRACK_SIZE_OFFSET + 5], 0);

        let decoded = EdskCodec.decode(&bytes).unwrap();
        assert!(!decoded.track_info(2, 1).unwrap().formatted);
        assert!(decoded.track_info(2, 0).unwrap().formatted);
        assert_eq!(decoded.disks(), image.disks());
    }

    #[test]
    fn test_weak_sector_copies() {
        let mut image = small_image(true);
        let track = image.track_mut(0, 0).unwrap();
        let sector = track.get_sector_mut(0xC2).unwrap();
        sector.set_data(vec![0x33; 512 * 3]);

        let decoded = EdskCodec.decode(&EdskCodec.encode(&image).unwrap()).unwrap();
        let info = decoded.sector_info(0, 0, 1).unwrap();
        assert_eq!(info.copies, 3);
        assert!(info.is_weak);
        assert_eq!(info.data_length, 1536);
        assert_eq!(decoded.sector(0, 0, 1).unwrap().len(), 512);
    }

    #[test]
    fn test_truncated_sector_data_is_padded() {
        let image = small_image(true);
        let mut bytes = EdskCodec.encode(&image).unwrap();
        bytes.truncate(bytes.len() - 1000);
        let decoded = EdskCodec.decode(&bytes).unwrap();
        let last = decoded.sector_by_id(2, 1, 0xC9).unwrap();
        assert_eq!(last.len(), 512);
        assert!(last.iter().all(|&b| b == 0xE5));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(EdskCodec.decode(b"EXTENDED").is_err());
        assert!(EdskCodec.decode(&[0u8; 512]).is_err());

        let image = small_image(true);
        let mut bytes = EdskCodec.encode(&image).unwrap();
        bytes[256..266].copy_from_slice(b"Garbage!!!");
        assert!(matches!(
            EdskCodec.decode(&bytes),
            Err(DiskError::ParseError { offset: 256, .. })
        ));
    }
}
