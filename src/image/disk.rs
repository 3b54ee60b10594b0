/// One side of a disk

use crate::image::track::Track;

/// A disk side holding its tracks in track-number order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    /// Side number (0 or 1)
    pub side_number: u8,
    tracks: Vec<Track>,
}

impl Disk {
    /// Create a new disk side
    pub fn new(side_number: u8) -> Self {
        Self {
            side_number,
            tracks: Vec::new(),
        }
    }

    /// Create a new disk side with preallocated tracks
    pub fn with_capacity(side_number: u8, num_tracks: usize) -> Self {
        Self {
            side_number,
            tracks: Vec::with_capacity(num_tracks),
        }
    }

    /// Append a track
    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Store a track at its own track number, padding any gap with
    /// unformatted tracks
    pub fn set_track(&mut self, track: Track) {
        let index = track.track_number as usize;
        self.ensure_track_count(index + 1);
        self.tracks[index] = track;
    }

    /// Get a reference to all tracks
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Get a mutable reference to all tracks
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Get a track by its track number
    pub fn get_track(&self, track_number: u8) -> Option<&Track> {
        self.tracks.get(track_number as usize)
    }

    /// Get a mutable reference to a track by its track number
    pub fn get_track_mut(&mut self, track_number: u8) -> Option<&mut Track> {
        self.tracks.get_mut(track_number as usize)
    }

    /// Number of tracks on this side
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Check if this side has any tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of formatted tracks
    pub fn formatted_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_formatted()).count()
    }

    /// Stored bytes across every track
    pub fn total_size(&self) -> usize {
        self.tracks.iter().map(|t| t.total_data_size()).sum()
    }

    /// Pad with unformatted tracks up to `num_tracks`
    pub fn ensure_track_count(&mut self, num_tracks: usize) {
        while self.tracks.len() < num_tracks {
            let track_number = self.tracks.len() as u8;
            self.tracks
                .push(Track::unformatted(track_number, self.side_number));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::sector::{Sector, SectorId};

    #[test]
    fn test_new_disk() {
        let disk = Disk::new(1);
        assert_eq!(disk.side_number, 1);
        assert!(disk.is_empty());
    }

    #[test]
    fn test_set_track_pads_with_unformatted() {
        let mut disk = Disk::new(0);
        let mut track = Track::new(3, 0);
        track.add_sector(Sector::new(SectorId::new(3, 0, 1, 1), 0xE5));
        disk.set_track(track);

        assert_eq!(disk.track_count(), 4);
        assert_eq!(disk.formatted_count(), 1);
        assert!(!disk.get_track(1).unwrap().is_formatted());
        assert_eq!(disk.get_track(3).unwrap().sector_count(), 1);
        assert_eq!(disk.total_size(), 256);
    }

    #[test]
    fn test_ensure_track_count() {
        let mut disk = Disk::with_capacity(0, 40);
        disk.add_track(Track::new(0, 0));
        disk.ensure_track_count(5);
        assert_eq!(disk.track_count(), 5);
        assert_eq!(disk.get_track(4).unwrap().track_number, 4);
        disk.ensure_track_count(2);
        assert_eq!(disk.track_count(), 5);
    }
}
