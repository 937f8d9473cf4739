use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: f32 = 0.3;

/// One discovered audio resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Candidate name it was discovered under, e.g. `music2.mp3`.
    pub name: String,
    /// Sequence number embedded in the name, if it has one.
    pub ordinal: Option<u32>,
    pub location: PathBuf,
}

/// Which track the output currently holds, and under which load id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loaded {
    pub index: usize,
    pub load_id: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSnapshot {
    pub has_playlist: bool,
    pub enabled: bool,
    pub current_index: usize,
    pub track_count: usize,
    pub volume: f32,
    pub current_track: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaylistState {
    tracks: Vec<Track>,
    current_index: usize,
    enabled: bool,
    volume: f32,
    loaded: Option<Loaded>,
    next_load_id: u64,
}

impl PlaylistState {
    pub fn new(tracks: Vec<Track>, volume: f32) -> Self {
        Self {
            tracks,
            current_index: 0,
            enabled: false,
            volume: clamp_volume(volume),
            loaded: None,
            next_load_id: 1,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn has_playlist(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns false when enabling was refused because there is nothing to play.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if enabled && self.tracks.is_empty() {
            return false;
        }
        self.enabled = enabled;
        true
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = clamp_volume(volume);
        self.volume
    }

    /// Moves to the next track, wrapping. The new track has to be loaded
    /// from its start.
    pub fn advance(&mut self) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        self.current_index = (self.current_index + 1) % self.tracks.len();
        self.loaded = None;
        Some(self.current_index)
    }

    /// User skip: same as [`advance`](Self::advance) but refused with fewer than two tracks.
    pub fn skip_next(&mut self) -> Option<usize> {
        if self.tracks.len() < 2 {
            return None;
        }
        self.advance()
    }

    pub fn loaded(&self) -> Option<Loaded> {
        self.loaded
    }

    pub fn needs_load(&self) -> bool {
        self.has_playlist()
            && self
                .loaded
                .map_or(true, |loaded| loaded.index != self.current_index)
    }

    /// Assigns a fresh load id to the current track.
    pub fn begin_load(&mut self) -> Option<(PathBuf, u64)> {
        let location = self.current()?.location.clone();
        let load_id = self.next_load_id;
        self.next_load_id += 1;
        self.loaded = Some(Loaded {
            index: self.current_index,
            load_id,
        });
        Some((location, load_id))
    }

    pub fn clear_loaded(&mut self) {
        self.loaded = None;
    }

    pub fn is_current_load(&self, load_id: u64) -> bool {
        self.loaded.is_some_and(|loaded| loaded.load_id == load_id)
    }

    pub fn snapshot(&self) -> PlaylistSnapshot {
        PlaylistSnapshot {
            has_playlist: self.has_playlist(),
            enabled: self.enabled,
            current_index: self.current_index,
            track_count: self.tracks.len(),
            volume: self.volume,
            current_track: self.current().map(|track| track.name.clone()),
        }
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
pub(crate) fn numbered_tracks(count: u32) -> Vec<Track> {
    (1..=count)
        .map(|ordinal| Track {
            name: format!("music{ordinal}.mp3"),
            ordinal: Some(ordinal),
            location: PathBuf::from(format!("/music/music{ordinal}.mp3")),
        })
        .collect()
}
