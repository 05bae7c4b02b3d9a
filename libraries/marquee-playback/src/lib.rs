//! Marquee - Playback State Core
//!
//! Platform-agnostic playback state for the Marquee embeddable video player.
//!
//! This crate provides:
//! - Per-item media models that own one provider and normalize its events
//! - A player facade mirroring the active media model
//! - State normalization (loading/stalled collapse to buffering)
//! - Play gating (play starts once both intent and a full buffer are seen)
//! - Ad-break sessions with deterministic teardown
//!
//! # Architecture
//!
//! `marquee-playback` knows nothing about decoding or rendering:
//! - Playback engines plug in through the [`Provider`] trait
//! - Engines are selected per source through a [`ProviderRegistry`]
//! - Persisted settings come in through a [`SettingsStore`]
//!
//! Everything is single-threaded. Components register on each other's
//! [`Emitter`]s, and deliveries wait in per-component mailboxes until the
//! owner calls `process_events()`.
//!
//! # Example: Loading an Item
//!
//! ```rust
//! use marquee_playback::test_utils::{item, RecordingFactory};
//! use marquee_playback::{AttrKey, PlayerConfig, PlayerModel, PlayerState, ProviderEvent};
//! use std::rc::Rc;
//!
//! let factory = Rc::new(RecordingFactory::new("html5", &["mp4"]));
//!
//! let mut player = PlayerModel::new();
//! player.register_provider(factory.clone());
//! player.setup(PlayerConfig::with_id("player-1"));
//!
//! let model = player.create_media_controller(item("/media/clip.mp4")).unwrap();
//! player.set_active_media_controller(model);
//!
//! // The engine reports a transient state; the facade shows buffering
//! let engine = factory.last().unwrap();
//! engine.emit(ProviderEvent::PlayerState { new_state: PlayerState::Loading });
//! player.process_events();
//!
//! assert_eq!(player.state(), Some(PlayerState::Buffering));
//! assert_eq!(player.attributes().get_text(&AttrKey::Provider).as_deref(), Some("html5"));
//! ```
//!
//! # Example: Ad Break
//!
//! ```rust
//! use marquee_playback::test_utils::{item, RecordingFactory};
//! use marquee_playback::{InstreamSession, InstreamState, PlayerConfig, PlayerModel};
//! use std::rc::Rc;
//!
//! let factory = Rc::new(RecordingFactory::new("html5", &["mp4"]));
//! let mut player = PlayerModel::new();
//! player.register_provider(factory.clone());
//! player.setup(PlayerConfig::default());
//!
//! let mut session = InstreamSession::new();
//! session.init(&player);
//! session.load(item("/ads/preroll.mp4")).unwrap();
//! assert_eq!(session.state(), InstreamState::Active);
//!
//! session.instream_destroy();
//! session.instream_destroy(); // no-op
//! assert_eq!(factory.last().unwrap().destroy_count(), 1);
//! ```

mod attributes;
mod config;
mod emitter;
mod error;
mod events;
mod instream;
mod media_model;
mod player_model;
mod provider;
mod storage;
pub mod test_utils;
pub mod types;

// Public exports
pub use attributes::{AttrKey, AttrValue, Attributes, Snapshot};
pub use config::PlayerConfig;
pub use emitter::{Emitter, Event, ListenerId, Owner, Topic, MAX_MAILBOX_LEN};
pub use error::{PlayerError, Result};
pub use events::{
    InstreamEvent, InstreamEventKind, ModelEvent, ModelEventKind, ProviderEvent,
    ProviderEventKind,
};
pub use instream::{InstreamSession, InstreamState};
pub use media_model::{MediaModel, PlayGate};
pub use player_model::{normalize_state, PlayerModel, MIRRORED_ATTRIBUTES, MIRROR_LISTENER_COUNT};
pub use provider::{
    same_provider, share, Provider, ProviderFactory, ProviderRegistry, SharedProvider,
    TypedProviderFactory,
};
pub use storage::{JsonFileStore, MemoryStore, SettingsStore};
pub use types::{
    AudioTrack, Environment, MediaContainer, PlayerState, PlaylistItem, QualityLevel, Source,
    VisualQuality,
};
