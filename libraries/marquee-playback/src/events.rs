//! Event types
//!
//! Three streams flow through the core:
//! - [`ProviderEvent`]: raw events emitted by a playback engine
//! - [`ModelEvent`]: attribute changes plus republished provider events, emitted
//!   by media models and the player facade
//! - [`InstreamEvent`]: the outward stream of an ad-break session
//!
//! Each stream has a matching kind enum used for topic matching in the
//! [`Emitter`](crate::emitter::Emitter).

use crate::attributes::{AttrKey, AttrValue};
use crate::emitter::Event;
use crate::types::{AudioTrack, PlayerState, QualityLevel, VisualQuality};
use serde::{Deserialize, Serialize};

/// Raw event emitted by a provider
///
/// Serializes with the event name under `type`, next to the payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProviderEvent {
    /// Plugin content was blocked by the host
    FlashBlocked,

    FlashUnblocked,

    Volume { volume: f64 },

    Mute { mute: bool },

    /// "audio" or "video"
    #[serde(rename_all = "camelCase")]
    MediaType { media_type: String },

    /// Engine state transition
    #[serde(rename_all = "camelCase")]
    PlayerState { new_state: PlayerState },

    /// Buffered percentage changed
    #[serde(rename_all = "camelCase")]
    BufferProgress {
        buffer_percent: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },

    /// Metadata parsed from the media
    #[serde(rename = "meta")]
    MediaMeta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        #[serde(default)]
        metadata: serde_json::Value,
    },

    /// Enough data is buffered to start playback
    BufferFull,

    /// Playback position update
    #[serde(rename = "time")]
    MediaTime { position: f64, duration: f64 },

    /// The engine behind the provider changed
    ProviderChanged,

    /// Available quality levels
    #[serde(rename_all = "camelCase")]
    Levels {
        current_quality: i32,
        levels: Vec<QualityLevel>,
    },

    #[serde(rename_all = "camelCase")]
    LevelsChanged {
        current_quality: i32,
        levels: Vec<QualityLevel>,
    },

    /// Available audio tracks
    #[serde(rename_all = "camelCase")]
    AudioTracks {
        current_track: i32,
        tracks: Vec<AudioTrack>,
    },

    #[serde(rename_all = "camelCase")]
    AudioTrackChanged {
        current_track: i32,
        tracks: Vec<AudioTrack>,
    },

    VisualQuality(VisualQuality),

    /// Native fullscreen toggled by the engine
    FullscreenChange { fullscreen: bool },

    Seek { position: f64, offset: f64 },

    Seeked,

    Complete,

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },

    /// Anything else an engine reports; forwarded untouched
    Custom {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

/// Kind of a [`ProviderEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    FlashBlocked,
    FlashUnblocked,
    Volume,
    Mute,
    MediaType,
    PlayerState,
    BufferProgress,
    MediaMeta,
    BufferFull,
    MediaTime,
    ProviderChanged,
    Levels,
    LevelsChanged,
    AudioTracks,
    AudioTrackChanged,
    VisualQuality,
    FullscreenChange,
    Seek,
    Seeked,
    Complete,
    Error,
    Custom,
}

impl Event for ProviderEvent {
    type Kind = ProviderEventKind;

    fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::FlashBlocked => ProviderEventKind::FlashBlocked,
            ProviderEvent::FlashUnblocked => ProviderEventKind::FlashUnblocked,
            ProviderEvent::Volume { .. } => ProviderEventKind::Volume,
            ProviderEvent::Mute { .. } => ProviderEventKind::Mute,
            ProviderEvent::MediaType { .. } => ProviderEventKind::MediaType,
            ProviderEvent::PlayerState { .. } => ProviderEventKind::PlayerState,
            ProviderEvent::BufferProgress { .. } => ProviderEventKind::BufferProgress,
            ProviderEvent::MediaMeta { .. } => ProviderEventKind::MediaMeta,
            ProviderEvent::BufferFull => ProviderEventKind::BufferFull,
            ProviderEvent::MediaTime { .. } => ProviderEventKind::MediaTime,
            ProviderEvent::ProviderChanged => ProviderEventKind::ProviderChanged,
            ProviderEvent::Levels { .. } => ProviderEventKind::Levels,
            ProviderEvent::LevelsChanged { .. } => ProviderEventKind::LevelsChanged,
            ProviderEvent::AudioTracks { .. } => ProviderEventKind::AudioTracks,
            ProviderEvent::AudioTrackChanged { .. } => ProviderEventKind::AudioTrackChanged,
            ProviderEvent::VisualQuality(_) => ProviderEventKind::VisualQuality,
            ProviderEvent::FullscreenChange { .. } => ProviderEventKind::FullscreenChange,
            ProviderEvent::Seek { .. } => ProviderEventKind::Seek,
            ProviderEvent::Seeked => ProviderEventKind::Seeked,
            ProviderEvent::Complete => ProviderEventKind::Complete,
            ProviderEvent::Error { .. } => ProviderEventKind::Error,
            ProviderEvent::Custom { .. } => ProviderEventKind::Custom,
        }
    }
}

/// Event emitted by a media model or the player facade
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// An attribute changed value
    Change {
        key: AttrKey,
        value: AttrValue,
        previous: AttrValue,
    },

    /// A provider event republished by the model
    Provider(ProviderEvent),

    /// A media item was loaded and its provider constructed
    MediaItemSet,

    /// Playback was requested for the loaded item
    PlayAttempt,

    /// Fullscreen toggled on the player
    Fullscreen { fullscreen: bool },
}

impl ModelEvent {
    /// Attribute change notifications are internal and never forwarded
    pub fn is_change(&self) -> bool {
        matches!(self, ModelEvent::Change { .. })
    }
}

/// Kind of a [`ModelEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelEventKind {
    /// Change of one specific attribute
    Change(AttrKey),
    Provider(ProviderEventKind),
    MediaItemSet,
    PlayAttempt,
    Fullscreen,
}

impl Event for ModelEvent {
    type Kind = ModelEventKind;

    fn kind(&self) -> ModelEventKind {
        match self {
            ModelEvent::Change { key, .. } => ModelEventKind::Change(key.clone()),
            ModelEvent::Provider(event) => ModelEventKind::Provider(event.kind()),
            ModelEvent::MediaItemSet => ModelEventKind::MediaItemSet,
            ModelEvent::PlayAttempt => ModelEventKind::PlayAttempt,
            ModelEvent::Fullscreen { .. } => ModelEventKind::Fullscreen,
        }
    }
}

/// Outward event of an ad-break session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InstreamEvent {
    /// Provider event forwarded with its type annotated
    Provider { event: ProviderEvent },

    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },

    /// Ad model state changed
    #[serde(rename_all = "camelCase")]
    StateChanged {
        new_state: PlayerState,
        old_state: Option<PlayerState>,
    },

    Fullscreen { fullscreen: bool },
}

/// Kind of an [`InstreamEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstreamEventKind {
    Provider,
    Error,
    StateChanged,
    Fullscreen,
}

impl Event for InstreamEvent {
    type Kind = InstreamEventKind;

    fn kind(&self) -> InstreamEventKind {
        match self {
            InstreamEvent::Provider { .. } => InstreamEventKind::Provider,
            InstreamEvent::Error { .. } => InstreamEventKind::Error,
            InstreamEvent::StateChanged { .. } => InstreamEventKind::StateChanged,
            InstreamEvent::Fullscreen { .. } => InstreamEventKind::Fullscreen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_events_carry_type_tag() {
        let event = ProviderEvent::MediaTime {
            position: 3.0,
            duration: 60.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "time");
        assert_eq!(json["position"], 3.0);

        let state = ProviderEvent::PlayerState {
            new_state: PlayerState::Stalled,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "playerState");
        assert_eq!(json["newState"], "stalled");
    }

    #[test]
    fn provider_events_parse_from_wire() {
        let event: ProviderEvent =
            serde_json::from_str(r#"{"type":"bufferProgress","bufferPercent":42.0}"#).unwrap();
        assert_eq!(
            event,
            ProviderEvent::BufferProgress {
                buffer_percent: 42.0,
                duration: None
            }
        );
        assert_eq!(event.kind(), ProviderEventKind::BufferProgress);
    }

    #[test]
    fn model_event_kinds() {
        let change = ModelEvent::Change {
            key: AttrKey::State,
            value: AttrValue::State(PlayerState::Playing),
            previous: AttrValue::Null,
        };
        assert!(change.is_change());
        assert_eq!(change.kind(), ModelEventKind::Change(AttrKey::State));

        let forwarded = ModelEvent::Provider(ProviderEvent::Complete);
        assert!(!forwarded.is_change());
        assert_eq!(
            forwarded.kind(),
            ModelEventKind::Provider(ProviderEventKind::Complete)
        );
    }
}
