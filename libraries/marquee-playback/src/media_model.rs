//! Media state model - one loaded item's playback session
//!
//! A `MediaModel` owns at most one provider at a time, translates the
//! provider's raw events into canonical attributes, and republishes every raw
//! event except `PlayerState` (the player facade derives its own state event).

use crate::attributes::{AttrKey, AttrValue, Attributes};
use crate::emitter::{Emitter, Event, ListenerId, Owner, Topic};
use crate::error::{PlayerError, Result};
use crate::events::{ModelEvent, ModelEventKind, ProviderEvent};
use crate::provider::{Provider, ProviderFactory, ProviderRegistry, SharedProvider};
use crate::types::{AudioTrack, PlayerState, PlaylistItem, QualityLevel};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Upper bound on drain rounds per `process_events` call
///
/// A provider that answers every call with another event would otherwise
/// keep the loop alive forever.
const MAX_EVENT_ROUNDS: usize = 64;

/// Rendezvous between "intent to play" and "buffer ready"
///
/// Whichever side arrives second opens the gate. The gate opens at most once
/// until it is reset for the next item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayGate {
    intent: bool,
    buffer_ready: bool,
    consumed: bool,
}

impl PlayGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the intent to play
    ///
    /// Returns true if this call opened the gate.
    pub fn mark_intent(&mut self) -> bool {
        self.intent = true;
        self.try_open()
    }

    /// Record that the provider buffered enough to play
    ///
    /// Returns true if this call opened the gate.
    pub fn mark_buffer_full(&mut self) -> bool {
        self.buffer_ready = true;
        self.try_open()
    }

    /// Whether the gate has already opened
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn try_open(&mut self) -> bool {
        if self.intent && self.buffer_ready && !self.consumed {
            self.consumed = true;
            return true;
        }
        false
    }
}

/// What a registration on the owning player's attributes is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerBinding {
    Volume,
    Mute,
    Container,
}

/// Per-item playback session
pub struct MediaModel {
    owner: Owner,
    attrs: Attributes,
    player: Attributes,
    item: Option<PlaylistItem>,

    provider: Option<SharedProvider>,
    provider_events: Option<Emitter<ProviderEvent>>,
    provider_live: bool,

    player_bindings: Vec<(ListenerId, PlayerBinding)>,
    gate: PlayGate,
}

impl std::fmt::Debug for MediaModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaModel")
            .field("owner", &self.owner)
            .field("attrs", &self.attrs)
            .field("provider", &self.provider_name())
            .field("provider_live", &self.provider_live)
            .field("gate", &self.gate)
            .finish()
    }
}

impl MediaModel {
    /// Create a model bound to the attributes of its owning player
    ///
    /// The player's attributes supply the configuration handed to providers,
    /// the render container, and ambient volume/mute.
    pub fn new(player: Attributes) -> Self {
        Self {
            owner: Owner::next(),
            attrs: Attributes::new(),
            player,
            item: None,
            provider: None,
            provider_events: None,
            provider_live: false,
            player_bindings: Vec::new(),
            gate: PlayGate::new(),
        }
    }

    /// Initialize attributes: caller values first, then the fixed defaults
    pub fn setup<I>(&mut self, seed: I) -> &mut Self
    where
        I: IntoIterator<Item = (AttrKey, AttrValue)>,
    {
        self.attrs.extend(seed);
        self.attrs.extend([
            (AttrKey::State, AttrValue::State(PlayerState::Idle)),
            (AttrKey::Duration, AttrValue::Number(0.0)),
            (AttrKey::Position, AttrValue::Number(0.0)),
            (AttrKey::Buffer, AttrValue::Number(0.0)),
            (AttrKey::Active, AttrValue::Bool(false)),
        ]);
        self
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    /// Registry for this model's change notifications and republished events
    pub fn events(&self) -> &Emitter<ModelEvent> {
        self.attrs.events()
    }

    pub fn get(&self, key: &AttrKey) -> Option<AttrValue> {
        self.attrs.get(key)
    }

    pub fn set(&self, key: AttrKey, value: impl Into<AttrValue>) -> bool {
        self.attrs.set(key, value)
    }

    /// Item most recently passed to `load_media_item`
    pub fn item(&self) -> Option<&PlaylistItem> {
        self.item.as_ref()
    }

    /// The provider currently referenced by this model
    pub fn get_video(&self) -> Option<SharedProvider> {
        self.provider.clone()
    }

    /// Whether the referenced provider has not been destroyed yet
    pub fn has_live_provider(&self) -> bool {
        self.provider.is_some() && self.provider_live
    }

    pub fn provider_name(&self) -> Option<String> {
        self.provider
            .as_ref()
            .map(|p| p.borrow().name().to_string())
    }

    /// Store `item` and construct a provider able to play it
    ///
    /// An item without sources is stored and nothing else happens. A
    /// previously held provider is fully released before the new one is built.
    ///
    /// # Errors
    /// Returns `NoSuitableProvider` if no registered provider supports the
    /// item's source.
    pub fn load_media_item(&mut self, item: PlaylistItem, registry: &ProviderRegistry) -> Result<()> {
        self.item = Some(item.clone());

        let Some(source) = item.primary_source() else {
            debug!("Item has no playable source, nothing to load");
            return Ok(());
        };

        let factory = self
            .choose_provider(source, registry)
            .ok_or_else(|| PlayerError::no_suitable_provider(source.to_string()))?;

        if self.provider.is_some() {
            self.destroy();
            self.reset_provider();
        }

        self.gate.reset();
        self.attrs.set(AttrKey::PlayAttempt, false);
        self.attrs.set(AttrKey::BufferFull, false);

        let provider = self.init_provider(factory.as_ref());
        provider.borrow_mut().init(&item);

        self.attrs.emit(ModelEvent::MediaItemSet);
        Ok(())
    }

    /// Same as `load_media_item`; used when an item is (re)activated
    pub fn set_active_item(&mut self, item: PlaylistItem, registry: &ProviderRegistry) -> Result<()> {
        self.load_media_item(item, registry)
    }

    /// Pick the factory for a source
    pub fn choose_provider(
        &self,
        source: &crate::types::Source,
        registry: &ProviderRegistry,
    ) -> Option<Rc<dyn ProviderFactory>> {
        registry.choose(source)
    }

    /// Construct and wire a provider
    ///
    /// Does not release a previously held provider; callers do that first.
    pub fn init_provider(&mut self, factory: &dyn ProviderFactory) -> SharedProvider {
        let id = self
            .attrs
            .get_text(&AttrKey::Id)
            .or_else(|| self.player.get_text(&AttrKey::Id))
            .unwrap_or_default();

        let provider = factory.create(&id, &self.player.snapshot());
        let name = provider.borrow().name().to_string();
        debug!(provider = %name, player = %id, "Constructed provider");

        {
            let mut p = provider.borrow_mut();

            match self.player.get(&AttrKey::MediaContainer) {
                Some(AttrValue::Container(container)) => p.set_container(&container),
                _ => {
                    let id = self.player.events().once(
                        self.owner,
                        Topic::Only(ModelEventKind::Change(AttrKey::MediaContainer)),
                    );
                    self.player_bindings.push((id, PlayerBinding::Container));
                }
            }

            if let Some(volume) = self.player.get_f64(&AttrKey::Volume) {
                p.set_volume(volume);
            }
            p.set_mute(self.player.get_bool(&AttrKey::Mute));
        }

        self.attrs.set(AttrKey::Provider, name);

        let events = provider.borrow().events().clone();
        events.on(self.owner, Topic::All);

        for (key, binding) in [
            (AttrKey::Mute, PlayerBinding::Mute),
            (AttrKey::Volume, PlayerBinding::Volume),
        ] {
            let id = self
                .player
                .events()
                .on(self.owner, Topic::Only(ModelEventKind::Change(key)));
            self.player_bindings.push((id, binding));
        }

        self.provider = Some(Rc::clone(&provider));
        self.provider_events = Some(events);
        self.provider_live = true;
        provider
    }

    /// Unsubscribe from the provider and destroy it
    ///
    /// The reference is kept until `reset_provider`. No-op without a live
    /// provider.
    pub fn destroy(&mut self) {
        if !self.has_live_provider() {
            return;
        }

        if let Some(events) = &self.provider_events {
            events.off_owner(self.owner);
        }
        self.player.events().off_owner(self.owner);
        self.player_bindings.clear();

        if let Some(provider) = &self.provider {
            let mut provider = provider.borrow_mut();
            debug!(provider = %provider.name(), "Destroying provider");
            provider.destroy();
        }
        self.provider_live = false;
    }

    /// Drop the provider reference without destroying it
    ///
    /// The model's registrations on the provider go with it.
    pub fn reset_provider(&mut self) {
        if let Some(events) = self.provider_events.take() {
            events.off_owner(self.owner);
        }
        self.provider = None;
        self.provider_live = false;
    }

    /// Request playback of the loaded item
    ///
    /// Playback itself starts once the provider reports a full buffer.
    pub fn load_video(&mut self) -> Result<()> {
        let provider = self.provider.clone().ok_or(PlayerError::NoProvider)?;
        let item = self.item.clone().unwrap_or_default();

        self.attrs.set(AttrKey::PlayAttempt, true);
        self.attrs.emit(ModelEvent::PlayAttempt);

        let position = item
            .starttime
            .filter(|t| *t != 0.0)
            .or_else(|| self.attrs.get_f64(&AttrKey::Position))
            .unwrap_or(0.0);
        let duration = item
            .duration
            .filter(|d| *d != 0.0)
            .or_else(|| self.attrs.get_f64(&AttrKey::Duration))
            .unwrap_or(0.0);
        self.attrs.set(AttrKey::Position, position);
        self.attrs.set(AttrKey::Duration, duration);

        provider.borrow_mut().load(&item);

        if self.gate.mark_intent() {
            self.start_playback();
        }
        Ok(())
    }

    pub fn play_video(&mut self) -> Result<()> {
        self.with_provider(|p| p.play())
    }

    pub fn pause_video(&mut self) -> Result<()> {
        self.with_provider(|p| p.pause())
    }

    pub fn stop_video(&mut self) -> Result<()> {
        self.with_provider(|p| p.stop())
    }

    pub fn seek(&mut self, position: f64) -> Result<()> {
        self.with_provider(|p| p.seek(position))
    }

    pub fn set_current_quality(&mut self, index: i32) -> Result<()> {
        self.with_provider(|p| p.set_current_quality(index))
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Result<()> {
        self.with_provider(|p| p.set_fullscreen(fullscreen))
    }

    /// Select a subtitle track
    ///
    /// The index is recorded even when the provider cannot switch subtitles.
    pub fn set_video_subtitle_track(&mut self, index: i32) -> Result<()> {
        self.attrs.set(AttrKey::CaptionsIndex, index);
        self.with_provider(|p| p.set_subtitles_track(index))
    }

    /// Apply the quality-level selection policy
    pub fn set_quality_level(&self, quality: i32, levels: &[QualityLevel]) {
        let authoritative = self
            .provider
            .as_ref()
            .is_some_and(|p| p.borrow().reports_own_quality());

        if quality > -1 && levels.len() > 1 && !authoritative {
            self.attrs.set(AttrKey::CurrentLevel, quality);
        }
    }

    /// Apply the audio-track selection policy
    pub fn set_current_audio_track(&self, current: i32, tracks: &[AudioTrack]) {
        if current > -1 && tracks.len() > 1 {
            self.attrs.set(AttrKey::CurrentAudioTrack, current);
        }
    }

    /// Drain pending provider and player notifications
    ///
    /// Returns the number of notifications handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;

        for _ in 0..MAX_EVENT_ROUNDS {
            let mut round = 0;

            for (id, event) in self.player.events().drain(self.owner) {
                round += 1;
                self.handle_player_change(id, event);
            }

            let pending = self
                .provider_events
                .as_ref()
                .map(|events| events.drain(self.owner))
                .unwrap_or_default();
            for (_, event) in pending {
                round += 1;
                self.handle_provider_event(event);
            }

            if round == 0 {
                return handled;
            }
            handled += round;
        }

        warn!(handled, "Media model event processing did not settle");
        handled
    }

    /// Translate one raw provider event
    pub fn handle_provider_event(&mut self, event: ProviderEvent) {
        trace!(event = ?event.kind(), "Provider event");

        match &event {
            ProviderEvent::FlashBlocked => {
                self.attrs.set(AttrKey::FlashBlocked, true);
            }
            ProviderEvent::FlashUnblocked => {
                self.attrs.set(AttrKey::FlashBlocked, false);
            }
            ProviderEvent::Volume { volume } => {
                self.attrs.set(AttrKey::Volume, *volume);
            }
            ProviderEvent::Mute { mute } => {
                self.attrs.set(AttrKey::Mute, *mute);
            }
            ProviderEvent::MediaType { media_type } => {
                self.attrs.set(AttrKey::MediaType, media_type.as_str());
            }
            ProviderEvent::PlayerState { new_state } => {
                // The facade derives and emits its own state event
                self.attrs.set(AttrKey::State, *new_state);
                return;
            }
            ProviderEvent::BufferProgress {
                buffer_percent,
                duration,
            } => {
                self.attrs.set(AttrKey::Buffer, *buffer_percent);
                if let Some(duration) = duration {
                    self.attrs.set(AttrKey::Duration, *duration);
                }
            }
            ProviderEvent::MediaMeta { duration, .. } => {
                if let Some(duration) = duration {
                    self.attrs.set(AttrKey::Duration, *duration);
                }
            }
            ProviderEvent::BufferFull => {
                self.attrs.set(AttrKey::BufferFull, true);
                if self.gate.mark_buffer_full() {
                    self.start_playback();
                }
            }
            ProviderEvent::MediaTime { position, duration } => {
                self.attrs.set(AttrKey::Position, *position);
                self.attrs.set(AttrKey::Duration, *duration);
            }
            ProviderEvent::ProviderChanged => {
                if let Some(name) = self.provider_name() {
                    self.attrs.set(AttrKey::Provider, name);
                }
            }
            ProviderEvent::Levels {
                current_quality,
                levels,
            } => {
                self.set_quality_level(*current_quality, levels);
                self.attrs
                    .set(AttrKey::Levels, AttrValue::Levels(levels.clone()));
            }
            ProviderEvent::LevelsChanged {
                current_quality,
                levels,
            } => {
                self.set_quality_level(*current_quality, levels);
            }
            ProviderEvent::AudioTracks {
                current_track,
                tracks,
            } => {
                self.set_current_audio_track(*current_track, tracks);
                self.attrs
                    .set(AttrKey::AudioTracks, AttrValue::AudioTracks(tracks.clone()));
            }
            ProviderEvent::AudioTrackChanged {
                current_track,
                tracks,
            } => {
                self.set_current_audio_track(*current_track, tracks);
            }
            ProviderEvent::VisualQuality(quality) => {
                self.attrs
                    .set(AttrKey::VisualQuality, AttrValue::VisualQuality(quality.clone()));
            }
            _ => {}
        }

        self.attrs.emit(ModelEvent::Provider(event));
    }

    fn handle_player_change(&mut self, id: ListenerId, event: ModelEvent) {
        let Some(binding) = self
            .player_bindings
            .iter()
            .find(|(listener, _)| *listener == id)
            .map(|(_, binding)| *binding)
        else {
            return;
        };
        let ModelEvent::Change { value, .. } = event else {
            return;
        };
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let mut provider = provider.borrow_mut();

        match binding {
            PlayerBinding::Volume => {
                if let Some(volume) = value.as_f64() {
                    provider.set_volume(volume);
                }
            }
            PlayerBinding::Mute => provider.set_mute(value.is_truthy()),
            PlayerBinding::Container => {
                if let Some(container) = value.as_container() {
                    provider.set_container(container);
                }
                self.player_bindings.retain(|(listener, _)| *listener != id);
            }
        }
    }

    fn start_playback(&mut self) {
        debug!("Intent and buffer ready, starting playback");
        if let Err(e) = self.play_video() {
            warn!("Could not start playback: {}", e);
        }
    }

    fn with_provider(&mut self, f: impl FnOnce(&mut dyn Provider)) -> Result<()> {
        let provider = self.provider.as_ref().ok_or(PlayerError::NoProvider)?;
        f(&mut *provider.borrow_mut());
        Ok(())
    }
}

impl Drop for MediaModel {
    // Drop registrations only; the provider may have been handed elsewhere
    fn drop(&mut self) {
        self.player.events().off_owner(self.owner);
        if let Some(events) = &self.provider_events {
            events.off_owner(self.owner);
        }
    }
}
