/// Headerless sector dumps
///
/// The file carries no geometry, so decoding guesses one from boot sector
/// contents and the file size. Callers that know better use
/// [`DiskImage::set_geometry`].

use crate::error::{DiskError, Result};
use crate::format::{DiskImageFormat, Geometry};
use crate::image::{DiskImage, DiskImageBuilder, FormatData};
use crate::io::{read_u16_le, ImageCodec};
use log::debug;

/// Sizes with one obvious geometry
fn known_sizes() -> [(usize, Geometry); 10] {
    [
        (184_320, Geometry::dragon_ss40()),
        (368_640, Geometry::dragon_ds40()),
        (737_280, Geometry::dragon_ds80()),
        (204_800, Geometry::acorn_ssd80()),
        (102_400, Geometry::acorn_ssd40()),
        (161_280, Geometry::coco_35()),
        (1_474_560, Geometry::pc_1440k()),
        (80_640, Geometry::dos68_35()),
        (92_160, Geometry::dos68_40()),
        (177_408, Geometry::dos68_77()),
    ]
}

/// Sectors-per-track counts tried, most common first, when the size is
/// not in the table
const FALLBACK_SPT: [u8; 5] = [18, 16, 10, 9, 8];

/// Headerless image codec
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ImageCodec for RawCodec {
    fn format(&self) -> DiskImageFormat {
        DiskImageFormat::Raw
    }

    fn decode(&self, data: &[u8]) -> Result<DiskImage> {
        let geometry = infer_geometry(data).ok_or_else(|| {
            DiskError::invalid_format(format!("no geometry fits {} bytes", data.len()))
        })?;
        DiskImage::from_linear(DiskImageFormat::Raw, geometry, FormatData::Raw, data)
    }

    fn encode(&self, image: &DiskImage) -> Result<Vec<u8>> {
        Ok(image.linear_bytes())
    }

    fn create(&self, geometry: &Geometry) -> Result<DiskImage> {
        DiskImageBuilder::new()
            .format(DiskImageFormat::Raw)
            .geometry(*geometry)
            .build()
    }
}

/// Best guess at the geometry of a headerless dump
pub fn infer_geometry(data: &[u8]) -> Option<Geometry> {
    if data.is_empty() {
        return None;
    }
    if let Some(geometry) = fat_boot_sector(data) {
        debug!("raw geometry from FAT boot sector: {}", geometry);
        return Some(geometry);
    }
    if let Some(geometry) = dragondos_signature(data) {
        debug!("raw geometry from DragonDOS signature: {}", geometry);
        return Some(geometry);
    }
    if let Some((_, geometry)) = known_sizes().into_iter().find(|(size, _)| *size == data.len()) {
        debug!("raw geometry from file size: {}", geometry);
        return Some(geometry);
    }
    let geometry = fallback(data.len())?;
    debug!("raw geometry guessed: {}", geometry);
    Some(geometry)
}

/// BIOS parameter block of a PC boot sector, if it describes this file
fn fat_boot_sector(data: &[u8]) -> Option<Geometry> {
    if data.len() < 512 || read_u16_le(data, 11) != 512 {
        return None;
    }
    let total = read_u16_le(data, 19) as usize;
    let spt = read_u16_le(data, 24) as usize;
    let heads = read_u16_le(data, 26) as usize;
    if !(1..=63).contains(&spt) || !(1..=2).contains(&heads) {
        return None;
    }
    if total * 512 != data.len() || total % (spt * heads) != 0 {
        return None;
    }
    let tracks = u8::try_from(total / (spt * heads)).ok()?;
    Some(Geometry::new(tracks, heads as u8, spt as u8, 512).with_filler(0xF6))
}

/// DragonDOS writes tracks, sectors per side and their complements at the
/// end of the first sector of track 20; the offset depends on the sides
fn dragondos_signature(data: &[u8]) -> Option<Geometry> {
    [
        Geometry::dragon_ss40(),
        Geometry::dragon_ss80(),
        Geometry::dragon_ds40(),
        Geometry::dragon_ds80(),
    ]
    .into_iter()
    .filter(|g| g.total_bytes() == data.len())
    .find(|g| {
        let offset = g.lsn(20, 0, 0) as usize * 256 + 0xFC;
        let spt = g.sectors_per_track * g.sides;
        data.get(offset..offset + 4) == Some(&[g.tracks, spt, !g.tracks, !spt][..])
    })
}

fn fallback(len: usize) -> Option<Geometry> {
    let sector_size = if len % 256 == 0 {
        256
    } else if len % 128 == 0 {
        128
    } else {
        return None;
    };
    let sectors = len / sector_size;
    FALLBACK_SPT.iter().find_map(|&spt| {
        if sectors % spt as usize != 0 {
            return None;
        }
        let tracks = sectors / spt as usize;
        if let Ok(tracks) = u8::try_from(tracks) {
            Some(Geometry::new(tracks, 1, spt, sector_size as u16))
        } else if tracks % 2 == 0 {
            let tracks = u8::try_from(tracks / 2).ok()?;
            Some(Geometry::new(tracks, 2, spt, sector_size as u16))
        } else {
            None
        }
    })
}
