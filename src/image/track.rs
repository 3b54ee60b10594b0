/// Track data structures

use crate::image::sector::Sector;
use std::collections::HashMap;

/// Recording mode stored in EDSK track blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordingMode {
    /// Not recorded
    #[default]
    Unknown,
    /// FM (single density)
    FM,
    /// MFM (double density)
    MFM,
}

impl From<u8> for RecordingMode {
    fn from(value: u8) -> Self {
        match value {
            1 => RecordingMode::FM,
            2 => RecordingMode::MFM,
            _ => RecordingMode::Unknown,
        }
    }
}

impl From<RecordingMode> for u8 {
    fn from(mode: RecordingMode) -> Self {
        match mode {
            RecordingMode::Unknown => 0,
            RecordingMode::FM => 1,
            RecordingMode::MFM => 2,
        }
    }
}

/// Data rate stored in EDSK track blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataRate {
    /// Not recorded
    #[default]
    Unknown,
    /// Single/Double Density
    SingleDouble,
    /// High Density
    High,
    /// Extended Density
    Extended,
}

impl From<u8> for DataRate {
    fn from(value: u8) -> Self {
        match value {
            1 => DataRate::SingleDouble,
            2 => DataRate::High,
            3 => DataRate::Extended,
            _ => DataRate::Unknown,
        }
    }
}

impl From<DataRate> for u8 {
    fn from(rate: DataRate) -> Self {
        match rate {
            DataRate::Unknown => 0,
            DataRate::SingleDouble => 1,
            DataRate::High => 2,
            DataRate::Extended => 3,
        }
    }
}

/// One physical track on one side
///
/// An unformatted track is distinct from a formatted track that happens to
/// carry no sectors: only the former is skipped when saving extended images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Physical track number
    pub track_number: u8,
    /// Physical side number (0 or 1)
    pub side_number: u8,
    /// GAP#3 length
    pub gap3_length: u8,
    /// Filler byte used for formatting
    pub filler_byte: u8,
    /// Data rate
    pub data_rate: DataRate,
    /// Recording mode
    pub recording_mode: RecordingMode,
    /// IMD mode byte (0-2 FM, 3-5 MFM at 500/300/250 kbps)
    pub mode: u8,
    formatted: bool,
    sectors: Vec<Sector>,
    sector_map: HashMap<u8, usize>,
}

impl Track {
    /// Create a formatted track with no sectors yet
    pub fn new(track_number: u8, side_number: u8) -> Self {
        Self {
            track_number,
            side_number,
            gap3_length: 0x4E,
            filler_byte: 0xE5,
            data_rate: DataRate::Unknown,
            recording_mode: RecordingMode::Unknown,
            mode: 5,
            formatted: true,
            sectors: Vec::new(),
            sector_map: HashMap::new(),
        }
    }

    /// Create an unformatted track
    pub fn unformatted(track_number: u8, side_number: u8) -> Self {
        Self {
            formatted: false,
            ..Self::new(track_number, side_number)
        }
    }

    /// Whether the track was formatted at all
    pub fn is_formatted(&self) -> bool {
        self.formatted
    }

    /// Add a sector to this track
    pub fn add_sector(&mut self, sector: Sector) {
        self.formatted = true;
        let index = self.sectors.len();
        // duplicate IDs resolve to the first occurrence
        self.sector_map.entry(sector.id.sector).or_insert(index);
        self.sectors.push(sector);
    }

    /// Sectors in physical order
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Mutable sectors in physical order
    pub fn sectors_mut(&mut self) -> &mut [Sector] {
        &mut self.sectors
    }

    /// Get a sector by its ID
    pub fn get_sector(&self, sector_id: u8) -> Option<&Sector> {
        self.sector_map
            .get(&sector_id)
            .and_then(|&idx| self.sectors.get(idx))
    }

    /// Get a mutable reference to a sector by its ID
    pub fn get_sector_mut(&mut self, sector_id: u8) -> Option<&mut Sector> {
        self.sector_map
            .get(&sector_id)
            .and_then(|&idx| self.sectors.get_mut(idx))
    }

    /// Get a sector by its physical index
    pub fn get_sector_by_index(&self, index: usize) -> Option<&Sector> {
        self.sectors.get(index)
    }

    /// Get a mutable sector by its physical index
    pub fn get_sector_by_index_mut(&mut self, index: usize) -> Option<&mut Sector> {
        self.sectors.get_mut(index)
    }

    /// Physical index of the `n`th logical sector: the one whose ID is the
    /// lowest ID plus `n`, or physical index `n` when numbering has gaps.
    pub fn logical_index(&self, n: u8) -> Option<usize> {
        let lowest = self.sectors.iter().map(|s| s.id.sector).min()?;
        lowest
            .checked_add(n)
            .and_then(|id| self.sector_map.get(&id).copied())
            .or_else(|| (usize::from(n) < self.sectors.len()).then_some(n as usize))
    }

    /// Number of sectors in this track
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Check if this track has any sectors
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// Sum of declared sector sizes
    pub fn declared_data_size(&self) -> usize {
        self.sectors.iter().map(|s| s.declared_size()).sum()
    }

    /// Sum of stored sector bytes
    pub fn total_data_size(&self) -> usize {
        self.sectors.iter().map(|s| s.data_length()).sum()
    }

    /// Declared size shared by every sector, if uniform
    pub fn uniform_sector_size(&self) -> Option<usize> {
        let first = self.sectors.first()?.declared_size();
        self.sectors
            .iter()
            .all(|s| s.declared_size() == first)
            .then_some(first)
    }

    /// Sector IDs in physical order
    pub fn sector_ids(&self) -> Vec<u8> {
        self.sectors.iter().map(|s| s.id.sector).collect()
    }

    /// Check if this track contains a sector with the given ID
    pub fn has_sector(&self, sector_id: u8) -> bool {
        self.sector_map.contains_key(&sector_id)
    }
}
