//! Core types for playback state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback state
///
/// Providers may report every variant. The player facade never exposes
/// `Loading` or `Stalled`; see [`crate::normalize_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// Nothing loaded or playback not started
    Idle,

    /// Waiting for data (canonical form of `Loading`/`Stalled`)
    Buffering,

    /// Provider is loading the media
    Loading,

    /// Provider ran out of data mid-playback
    Stalled,

    /// Currently playing
    Playing,

    /// Paused mid-item
    Paused,

    /// Reached the end of the item
    Complete,

    /// Provider reported a fatal error
    Error,
}

impl PlayerState {
    /// Lowercase name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Buffering => "buffering",
            PlayerState::Loading => "loading",
            PlayerState::Stalled => "stalled",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Complete => "complete",
            PlayerState::Error => "error",
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playable rendition of a playlist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Location of the media
    pub file: String,

    /// Explicit media type or mimetype (e.g. "hls", "video/mp4")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Human readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Source {
    /// Create a source with no explicit type
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: None,
            label: None,
        }
    }

    /// Create a source with an explicit type
    pub fn with_kind(file: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: Some(kind.into()),
            label: None,
        }
    }

    /// Media type used for provider matching
    ///
    /// The explicit type wins; otherwise the file extension (lowercased,
    /// query string stripped) is used.
    pub fn media_type(&self) -> Option<String> {
        if let Some(kind) = &self.kind {
            return Some(kind.to_lowercase());
        }

        let path = self.file.split(['?', '#']).next().unwrap_or_default();
        let name = path.rsplit('/').next().unwrap_or_default();
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.media_type() {
            Some(kind) => write!(f, "{} ({})", self.file, kind),
            None => f.write_str(&self.file),
        }
    }
}

/// A media item as loaded into a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistItem {
    /// Media identifier, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mediaid: Option<String>,

    /// Title for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Playable renditions, in preference order
    pub sources: Vec<Source>,

    /// Start position in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starttime: Option<f64>,

    /// Known duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl PlaylistItem {
    /// Item with a single source
    pub fn from_source(source: Source) -> Self {
        Self {
            sources: vec![source],
            ..Default::default()
        }
    }

    /// Source used for provider selection
    pub fn primary_source(&self) -> Option<&Source> {
        self.sources.first()
    }
}

/// Quality level reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Display label ("720p", "Auto")
    pub label: String,

    /// Bitrate in bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl QualityLevel {
    /// Level with only a label
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bitrate: None,
            width: None,
            height: None,
        }
    }
}

/// Alternate audio track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AudioTrack {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: None,
        }
    }
}

/// Rendition currently being displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualQuality {
    /// "auto" or "manual"
    pub mode: String,

    /// Why the rendition changed ("initial choice", "bandwidth", "api")
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<QualityLevel>,
}

/// Opaque render target a provider draws into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaContainer {
    pub id: String,
}

impl MediaContainer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Runtime environment the player is embedded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Full desktop runtime
    #[default]
    Desktop,

    /// Constrained mobile runtime (no autostart)
    Mobile,
}

impl Environment {
    /// Whether playback may start without a user gesture
    pub fn allows_autostart(&self) -> bool {
        matches!(self, Environment::Desktop)
    }
}
