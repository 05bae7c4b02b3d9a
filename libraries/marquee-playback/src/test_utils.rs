//! Test utilities
//!
//! A provider that records every call it receives and lets a test emit raw
//! engine events, plus a factory that keeps a probe for every provider it
//! builds.

use crate::attributes::Snapshot;
use crate::emitter::Emitter;
use crate::events::ProviderEvent;
use crate::provider::{share, Provider, ProviderFactory, SharedProvider, TypedProviderFactory};
use crate::types::{MediaContainer, PlaylistItem, Source};
use std::cell::RefCell;
use std::rc::Rc;

/// A call received by a [`RecordingProvider`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Init(PlaylistItem),
    Load(PlaylistItem),
    Play,
    Pause,
    Stop,
    Seek(f64),
    Destroy,
    AttachMedia,
    DetachMedia,
    SetContainer(MediaContainer),
    Volume(f64),
    Mute(bool),
    CurrentQuality(i32),
    Fullscreen(bool),
    SubtitlesTrack(i32),
}

/// Test-side view of a [`RecordingProvider`]
///
/// Stays usable after the provider itself has been handed to the core.
#[derive(Clone)]
pub struct ProviderProbe {
    name: String,
    player_id: String,
    calls: Rc<RefCell<Vec<ProviderCall>>>,
    events: Emitter<ProviderEvent>,
}

impl ProviderProbe {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Player id the provider was constructed with
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &ProviderCall) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn play_count(&self) -> usize {
        self.count(&ProviderCall::Play)
    }

    pub fn destroy_count(&self) -> usize {
        self.count(&ProviderCall::Destroy)
    }

    pub fn last_volume(&self) -> Option<f64> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            ProviderCall::Volume(v) => Some(*v),
            _ => None,
        })
    }

    pub fn last_mute(&self) -> Option<bool> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            ProviderCall::Mute(m) => Some(*m),
            _ => None,
        })
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Emit a raw engine event, as the engine would
    pub fn emit(&self, event: ProviderEvent) {
        self.events.emit(event);
    }

    /// Registrations currently held on the provider's event registry
    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }
}

/// Provider that records calls instead of playing anything
pub struct RecordingProvider {
    probe: ProviderProbe,
    own_quality: bool,
}

impl RecordingProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self::for_player(name, "")
    }

    pub fn for_player(name: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            probe: ProviderProbe {
                name: name.into(),
                player_id: player_id.into(),
                calls: Rc::new(RefCell::new(Vec::new())),
                events: Emitter::new(),
            },
            own_quality: false,
        }
    }

    /// Mark the provider as the authority for its own level reports
    pub fn with_own_quality(mut self) -> Self {
        self.own_quality = true;
        self
    }

    pub fn probe(&self) -> ProviderProbe {
        self.probe.clone()
    }

    fn record(&self, call: ProviderCall) {
        self.probe.calls.borrow_mut().push(call);
    }
}

impl Provider for RecordingProvider {
    fn name(&self) -> &str {
        &self.probe.name
    }

    fn events(&self) -> &Emitter<ProviderEvent> {
        &self.probe.events
    }

    fn init(&mut self, item: &PlaylistItem) {
        self.record(ProviderCall::Init(item.clone()));
    }

    fn load(&mut self, item: &PlaylistItem) {
        self.record(ProviderCall::Load(item.clone()));
    }

    fn play(&mut self) {
        self.record(ProviderCall::Play);
    }

    fn pause(&mut self) {
        self.record(ProviderCall::Pause);
    }

    fn stop(&mut self) {
        self.record(ProviderCall::Stop);
    }

    fn seek(&mut self, position: f64) {
        self.record(ProviderCall::Seek(position));
    }

    fn destroy(&mut self) {
        self.record(ProviderCall::Destroy);
    }

    fn attach_media(&mut self) {
        self.record(ProviderCall::AttachMedia);
    }

    fn detach_media(&mut self) {
        self.record(ProviderCall::DetachMedia);
    }

    fn set_container(&mut self, container: &MediaContainer) {
        self.record(ProviderCall::SetContainer(container.clone()));
    }

    fn set_volume(&mut self, volume: f64) {
        self.record(ProviderCall::Volume(volume));
    }

    fn set_mute(&mut self, mute: bool) {
        self.record(ProviderCall::Mute(mute));
    }

    fn set_current_quality(&mut self, index: i32) {
        self.record(ProviderCall::CurrentQuality(index));
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.record(ProviderCall::Fullscreen(fullscreen));
    }

    fn set_subtitles_track(&mut self, index: i32) {
        self.record(ProviderCall::SubtitlesTrack(index));
    }

    fn reports_own_quality(&self) -> bool {
        self.own_quality
    }
}

/// Factory building [`RecordingProvider`]s and keeping their probes
pub struct RecordingFactory {
    typed: TypedProviderFactory,
    created: Rc<RefCell<Vec<ProviderProbe>>>,
}

impl RecordingFactory {
    pub fn new(name: &str, media_types: &[&str]) -> Self {
        Self::build(name, media_types, false)
    }

    /// Factory whose providers report their own quality levels
    pub fn with_own_quality(name: &str, media_types: &[&str]) -> Self {
        Self::build(name, media_types, true)
    }

    fn build(name: &str, media_types: &[&str], own_quality: bool) -> Self {
        let created = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&created);
        let provider_name = name.to_string();

        let typed = TypedProviderFactory::new(name, media_types, move |player_id, _config| {
            let mut provider = RecordingProvider::for_player(provider_name.clone(), player_id);
            if own_quality {
                provider = provider.with_own_quality();
            }
            sink.borrow_mut().push(provider.probe());
            share(provider)
        });

        Self { typed, created }
    }

    /// Probes of every provider built so far, oldest first
    pub fn created(&self) -> Vec<ProviderProbe> {
        self.created.borrow().clone()
    }

    /// Probe of the most recently built provider
    pub fn last(&self) -> Option<ProviderProbe> {
        self.created.borrow().last().cloned()
    }

    /// Shared handle onto the list of built providers
    pub fn created_handle(&self) -> Rc<RefCell<Vec<ProviderProbe>>> {
        Rc::clone(&self.created)
    }
}

impl ProviderFactory for RecordingFactory {
    fn name(&self) -> &str {
        self.typed.name()
    }

    fn supports(&self, source: &Source) -> bool {
        self.typed.supports(source)
    }

    fn create(&self, player_id: &str, config: &Snapshot) -> SharedProvider {
        self.typed.create(player_id, config)
    }
}

/// Shorthand for [`RecordingFactory::new`]
pub fn recording_factory(name: &str, media_types: &[&str]) -> RecordingFactory {
    RecordingFactory::new(name, media_types)
}

/// Item with a single source of the given file
pub fn item(file: &str) -> PlaylistItem {
    PlaylistItem::from_source(Source::new(file))
}
