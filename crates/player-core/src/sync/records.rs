//! Typed records the player keeps in sync across tabs.

use crate::error::{PlayerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub name: String,
    pub artist: String,
    /// Playback URL; local files use `blob:` URLs that die with their tab.
    pub url: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
}

impl Song {
    /// Key under which this song's comments are stored.
    pub fn song_id(&self) -> String {
        song_id(&self.name, &self.artist)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PlayerError::validation("songs", "song name is empty"));
        }
        if self.url.trim().is_empty() {
            return Err(PlayerError::validation(
                "songs",
                format!("song {} has no url", self.name),
            ));
        }
        Ok(())
    }
}

pub fn song_id(name: &str, artist: &str) -> String {
    format!("{}_{}", name, artist)
}

/// A listener's comment on a song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub author: String,
    /// Display timestamp as written by the commenting tab.
    pub timestamp: String,
}

/// Comments keyed by song id.
pub type Comments = BTreeMap<String, Vec<Comment>>;

/// Output equalizer preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    #[default]
    Normal,
    Treble,
    Bass,
    Earphones,
    Tv,
    #[serde(rename = "carradio")]
    CarRadio,
    Bluetooth,
}

impl AudioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioMode::Normal => "normal",
            AudioMode::Treble => "treble",
            AudioMode::Bass => "bass",
            AudioMode::Earphones => "earphones",
            AudioMode::Tv => "tv",
            AudioMode::CarRadio => "carradio",
            AudioMode::Bluetooth => "bluetooth",
        }
    }
}

impl std::fmt::Display for AudioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which record a sync key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Songs,
    Comments,
    AudioMode,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Songs, RecordKind::Comments, RecordKind::AudioMode];

    /// Unprefixed storage key.
    pub fn key(&self) -> &'static str {
        match self {
            RecordKind::Songs => "songs",
            RecordKind::Comments => "comments",
            RecordKind::AudioMode => "audioMode",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

/// A validated value for one of the player's sync keys.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRecord {
    Songs(Vec<Song>),
    Comments(Comments),
    AudioMode(AudioMode),
}

impl SyncRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            SyncRecord::Songs(_) => RecordKind::Songs,
            SyncRecord::Comments(_) => RecordKind::Comments,
            SyncRecord::AudioMode(_) => RecordKind::AudioMode,
        }
    }

    pub fn key(&self) -> &'static str {
        self.kind().key()
    }

    /// Deserialize and validate a value stored under `kind`'s key.
    pub fn decode(kind: RecordKind, value: Value, max_songs: usize) -> Result<Self> {
        let record = match kind {
            RecordKind::Songs => SyncRecord::Songs(serde_json::from_value(value)?),
            RecordKind::Comments => SyncRecord::Comments(serde_json::from_value(value)?),
            RecordKind::AudioMode => SyncRecord::AudioMode(serde_json::from_value(value)?),
        };
        record.validate(max_songs)?;
        Ok(record)
    }

    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            SyncRecord::Songs(songs) => serde_json::to_value(songs)?,
            SyncRecord::Comments(comments) => serde_json::to_value(comments)?,
            SyncRecord::AudioMode(mode) => serde_json::to_value(mode)?,
        };
        Ok(value)
    }

    pub fn validate(&self, max_songs: usize) -> Result<()> {
        match self {
            SyncRecord::Songs(songs) => {
                if songs.len() > max_songs {
                    return Err(PlayerError::validation(
                        "songs",
                        format!("{} songs exceeds the limit of {}", songs.len(), max_songs),
                    ));
                }
                songs.iter().try_for_each(Song::validate)
            }
            SyncRecord::Comments(comments) => {
                for (id, list) in comments {
                    if list.iter().any(|c| c.text.trim().is_empty()) {
                        return Err(PlayerError::validation(
                            "comments",
                            format!("empty comment on {}", id),
                        ));
                    }
                }
                Ok(())
            }
            SyncRecord::AudioMode(_) => Ok(()),
        }
    }
}
