//! Ad-break session
//!
//! Runs ad content on a private media model next to the main player and tears
//! down without leaving registrations or providers behind.
//!
//! Lifecycle: `Uninitialized -> Ready (init) -> Active (load) -> TornDown
//! (instream_destroy)`. A new `init` starts a fresh cycle.

use crate::attributes::{AttrKey, AttrValue, Attributes};
use crate::emitter::{Emitter, Event, ListenerId, Owner, Topic};
use crate::error::{PlayerError, Result};
use crate::events::{
    InstreamEvent, ModelEvent, ModelEventKind, ProviderEvent, ProviderEventKind,
};
use crate::media_model::MediaModel;
use crate::player_model::PlayerModel;
use crate::provider::{same_provider, ProviderRegistry, SharedProvider};
use crate::types::{PlayerState, PlaylistItem};
use std::rc::Rc;
use tracing::{debug, trace, warn};

const MAX_EVENT_ROUNDS: usize = 64;

/// Lifecycle state of an [`InstreamSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstreamState {
    #[default]
    Uninitialized,
    Ready,
    Active,
    TornDown,
}

/// Role of a registration on the attached provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderBinding {
    Forward,
    Error,
    BufferFull,
    State,
}

pub struct InstreamSession {
    owner: Owner,
    state: InstreamState,

    main: Option<Attributes>,
    controller: Option<Emitter<ModelEvent>>,
    registry: Option<Rc<ProviderRegistry>>,

    ad_model: Option<MediaModel>,
    ad_error_listener: Option<ListenerId>,
    ad_state_listener: Option<ListenerId>,

    current: Option<SharedProvider>,
    current_events: Option<Emitter<ProviderEvent>>,
    provider_bindings: Vec<(ListenerId, ProviderBinding)>,
    ambient_listeners: Vec<ListenerId>,

    events: Emitter<InstreamEvent>,
}

impl std::fmt::Debug for InstreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstreamSession")
            .field("state", &self.state)
            .field("ad_model", &self.ad_model)
            .field(
                "current",
                &self.current.as_ref().map(|p| p.borrow().name().to_string()),
            )
            .field("provider_bindings", &self.provider_bindings.len())
            .finish_non_exhaustive()
    }
}

impl Default for InstreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl InstreamSession {
    pub fn new() -> Self {
        Self {
            owner: Owner::next(),
            state: InstreamState::Uninitialized,
            main: None,
            controller: None,
            registry: None,
            ad_model: None,
            ad_error_listener: None,
            ad_state_listener: None,
            current: None,
            current_events: None,
            provider_bindings: Vec::new(),
            ambient_listeners: Vec::new(),
            events: Emitter::new(),
        }
    }

    pub fn state(&self) -> InstreamState {
        self.state
    }

    /// Outward event stream of the session
    pub fn events(&self) -> &Emitter<InstreamEvent> {
        &self.events
    }

    /// Private media model for the ad content
    pub fn ad_model(&self) -> Option<&MediaModel> {
        self.ad_model.as_ref()
    }

    /// Provider the session is currently attached to
    pub fn current_provider(&self) -> Option<SharedProvider> {
        self.current.clone()
    }

    /// Prepare a session against the main player
    ///
    /// The private model starts from the main player's id, volume, fullscreen
    /// and mute values.
    pub fn init(&mut self, player: &PlayerModel) {
        if self.ad_model.is_some() {
            self.instream_destroy();
        }

        let main = player.attributes().clone();
        let controller = player.media_controller().clone();
        controller.on(self.owner, Topic::Only(ModelEventKind::Fullscreen));

        let seed: Vec<(AttrKey, AttrValue)> =
            [AttrKey::Id, AttrKey::Volume, AttrKey::Fullscreen, AttrKey::Mute]
                .into_iter()
                .map(|key| {
                    let value = main.get(&key).unwrap_or_default();
                    (key, value)
                })
                .chain([(AttrKey::InstreamMode, AttrValue::Bool(true))])
                .collect();

        let ad_player = Attributes::new();
        ad_player.extend(seed.clone());
        let mut ad_model = MediaModel::new(ad_player);
        ad_model.setup(seed);

        self.main = Some(main);
        self.controller = Some(controller);
        self.registry = Some(player.get_providers());
        self.ad_model = Some(ad_model);
        self.state = InstreamState::Ready;
        debug!("Instream session initialized");
    }

    /// Load an ad item on the private model
    ///
    /// Provider readiness arrives later through the normal event path.
    pub fn load(&mut self, item: PlaylistItem) -> Result<()> {
        let registry = self
            .registry
            .clone()
            .ok_or(PlayerError::NotInitialized("instream session"))?;
        let ad_model = self
            .ad_model
            .as_mut()
            .ok_or(PlayerError::NotInitialized("instream session"))?;

        ad_model.set(AttrKey::Item, 0);
        ad_model.set(AttrKey::PlaylistItem, item.clone());
        ad_model.set_active_item(item, &registry)?;

        self.check_provider(None);

        if let Some(ad_model) = self.ad_model.as_mut() {
            let events = ad_model.events();
            if let Some(id) = self.ad_error_listener.take() {
                events.off(id);
            }
            self.ad_error_listener = Some(events.on(
                self.owner,
                Topic::Only(ModelEventKind::Provider(ProviderEventKind::Error)),
            ));

            if ad_model.get_video().is_some() {
                ad_model.load_video()?;
            }
        }

        self.state = InstreamState::Active;
        Ok(())
    }

    /// Attach the session to `provider`, which may have been built elsewhere
    ///
    /// Rebinds error forwarding. The main player's volume and mute govern
    /// whichever provider is attached.
    pub fn apply_provider_listeners(&mut self, provider: SharedProvider) {
        self.check_provider(Some(Rc::clone(&provider)));

        let events = provider.borrow().events().clone();
        events.off_topic(&Topic::Only(ProviderEventKind::Error));
        self.provider_bindings
            .retain(|(_, binding)| *binding != ProviderBinding::Error);
        let id = events.on(self.owner, Topic::Only(ProviderEventKind::Error));
        self.provider_bindings.push((id, ProviderBinding::Error));
    }

    /// Apply the main player's volume and mute to `provider`
    pub fn update_volume(&self, provider: &SharedProvider) {
        let Some(main) = &self.main else {
            return;
        };

        let mut provider = provider.borrow_mut();
        if let Some(volume) = main.get_f64(&AttrKey::Volume) {
            provider.set_volume(volume);
        }
        provider.set_mute(main.get_bool(&AttrKey::Mute));
    }

    pub fn instream_play(&mut self) {
        if let Some(video) = self.ad_model.as_ref().and_then(MediaModel::get_video) {
            video.borrow_mut().play();
        }
    }

    pub fn instream_pause(&mut self) {
        if let Some(video) = self.ad_model.as_ref().and_then(MediaModel::get_video) {
            video.borrow_mut().pause();
        }
    }

    /// Tear the session down
    ///
    /// Only a provider created by the private model is destroyed; a provider
    /// handed in through `apply_provider_listeners` is detached and left alive.
    /// Calling this again is a no-op.
    pub fn instream_destroy(&mut self) {
        let Some(mut ad_model) = self.ad_model.take() else {
            return;
        };

        ad_model.events().clear();
        self.ad_error_listener = None;
        self.ad_state_listener = None;

        self.events.clear();

        if let Some(provider) = self.current.take() {
            provider.borrow_mut().detach_media();
            provider.borrow().events().clear();
        }
        self.current_events = None;
        self.provider_bindings.clear();

        // The private model only ever holds a provider it built itself
        if ad_model.has_live_provider() {
            ad_model.destroy();
        }
        drop(ad_model);

        if let Some(main) = &self.main {
            main.events().off_owner(self.owner);
        }
        self.ambient_listeners.clear();

        if let Some(controller) = self.controller.take() {
            controller.off_owner(self.owner);
        }

        self.state = InstreamState::TornDown;
        debug!("Instream session destroyed");
    }

    /// Drain every session mailbox
    ///
    /// Returns the number of notifications handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;

        for _ in 0..MAX_EVENT_ROUNDS {
            let mut round = 0;

            if let Some(ad_model) = self.ad_model.as_mut() {
                round += ad_model.process_events();
            }

            let pending = self
                .controller
                .as_ref()
                .map(|c| c.drain(self.owner))
                .unwrap_or_default();
            for (_, event) in pending {
                round += 1;
                if let ModelEvent::Fullscreen { fullscreen } = event {
                    self.events.emit(InstreamEvent::Fullscreen { fullscreen });
                }
            }

            let pending = self
                .main
                .as_ref()
                .map(|m| m.events().drain(self.owner))
                .unwrap_or_default();
            for (_, event) in pending {
                round += 1;
                self.handle_ambient_change(event);
            }

            let pending = self
                .current_events
                .as_ref()
                .map(|e| e.drain(self.owner))
                .unwrap_or_default();
            for (id, event) in pending {
                round += 1;
                self.handle_provider_event(id, event);
            }

            let pending = self
                .ad_model
                .as_ref()
                .map(|m| m.events().drain(self.owner))
                .unwrap_or_default();
            for (_, event) in pending {
                round += 1;
                self.handle_ad_model_event(event);
            }

            if round == 0 {
                return handled;
            }
            handled += round;
        }

        warn!(handled, "Instream event processing did not settle");
        handled
    }

    /// Start following a new provider; no-op if it is the one already tracked
    fn check_provider(&mut self, handed: Option<SharedProvider>) {
        let provider = handed.or_else(|| self.ad_model.as_ref().and_then(MediaModel::get_video));

        let unchanged = match (&self.current, &provider) {
            (Some(current), Some(next)) => same_provider(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(previous) = self.current_events.take() {
            previous.off_owner(self.owner);
        }
        self.provider_bindings.clear();
        if let Some(previous) = self.current.take() {
            previous.borrow_mut().detach_media();
        }
        self.current = provider.clone();

        let Some(provider) = provider else {
            return;
        };
        debug!(provider = %provider.borrow().name(), "Instream attached to provider");

        let events = provider.borrow().events().clone();
        events.clear();

        for (topic, binding) in [
            (Topic::All, ProviderBinding::Forward),
            (Topic::Only(ProviderEventKind::Error), ProviderBinding::Error),
            (Topic::Only(ProviderEventKind::BufferFull), ProviderBinding::BufferFull),
            (Topic::Only(ProviderEventKind::PlayerState), ProviderBinding::State),
        ] {
            let id = events.on(self.owner, topic);
            self.provider_bindings.push((id, binding));
        }
        self.current_events = Some(events);

        provider.borrow_mut().attach_media();
        self.update_volume(&provider);
        self.follow_main_volume();

        if let Some(ad_model) = &self.ad_model {
            if self.ad_state_listener.is_none() {
                self.ad_state_listener = Some(ad_model.events().on(
                    self.owner,
                    Topic::Only(ModelEventKind::Change(AttrKey::State)),
                ));
            }
        }
    }

    /// Track the main player's volume and mute, once per session cycle
    fn follow_main_volume(&mut self) {
        if !self.ambient_listeners.is_empty() {
            return;
        }
        let Some(main) = &self.main else {
            return;
        };
        for key in [AttrKey::Volume, AttrKey::Mute] {
            let id = main
                .events()
                .on(self.owner, Topic::Only(ModelEventKind::Change(key)));
            self.ambient_listeners.push(id);
        }
    }

    fn handle_provider_event(&mut self, id: ListenerId, event: ProviderEvent) {
        let Some(binding) = self
            .provider_bindings
            .iter()
            .find(|(listener, _)| *listener == id)
            .map(|(_, binding)| *binding)
        else {
            return;
        };

        match binding {
            ProviderBinding::Forward => {
                if event.kind() == ProviderEventKind::Error {
                    return;
                }
                if let ProviderEvent::FullscreenChange { fullscreen } = &event {
                    self.native_fullscreen(*fullscreen, &event);
                }
                trace!(event = ?event.kind(), "Forwarding instream provider event");
                self.events.emit(InstreamEvent::Provider { event });
            }
            ProviderBinding::Error => {
                if let ProviderEvent::Error { message, code } = event {
                    self.events.emit(InstreamEvent::Error { message, code });
                }
            }
            ProviderBinding::BufferFull => {
                if let Some(video) = self.ad_model.as_ref().and_then(MediaModel::get_video) {
                    video.borrow_mut().play();
                }
            }
            ProviderBinding::State => {
                if let ProviderEvent::PlayerState { new_state } = event {
                    if matches!(new_state, PlayerState::Playing | PlayerState::Paused) {
                        if let Some(ad_model) = &self.ad_model {
                            ad_model.set(AttrKey::State, new_state);
                        }
                    }
                }
            }
        }
    }

    fn native_fullscreen(&self, fullscreen: bool, event: &ProviderEvent) {
        if let Some(main) = &self.main {
            main.emit(ModelEvent::Provider(event.clone()));
        }
        self.events.emit(InstreamEvent::Fullscreen { fullscreen });
    }

    fn handle_ambient_change(&mut self, event: ModelEvent) {
        let ModelEvent::Change { key, value, .. } = event else {
            return;
        };
        let Some(provider) = &self.current else {
            return;
        };

        let mut provider = provider.borrow_mut();
        match key {
            AttrKey::Volume => {
                if let Some(volume) = value.as_f64() {
                    provider.set_volume(volume);
                }
            }
            AttrKey::Mute => provider.set_mute(value.is_truthy()),
            _ => {}
        }
    }

    fn handle_ad_model_event(&mut self, event: ModelEvent) {
        match event {
            ModelEvent::Change {
                key: AttrKey::State,
                value,
                previous,
            } => {
                if let Some(new_state) = value.as_state() {
                    self.events.emit(InstreamEvent::StateChanged {
                        new_state,
                        old_state: previous.as_state(),
                    });
                }
            }
            ModelEvent::Provider(ProviderEvent::Error { message, code }) => {
                self.events.emit(InstreamEvent::Error { message, code });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::provider::ProviderFactory;
    use crate::test_utils::{item, ProviderCall, RecordingFactory, RecordingProvider};

    fn main_player() -> (PlayerModel, Rc<RecordingFactory>) {
        let factory = Rc::new(RecordingFactory::new("html5", &["mp4"]));
        let mut player = PlayerModel::new();
        player.register_provider(Rc::clone(&factory) as Rc<dyn ProviderFactory>);
        let mut config = PlayerConfig::with_id("main");
        config.volume = 60;
        player.setup(config);
        (player, factory)
    }

    fn outward(session: &InstreamSession, observer: Owner) -> Vec<InstreamEvent> {
        session
            .events()
            .drain(observer)
            .into_iter()
            .map(|(_, e)| e)
            .collect()
    }

    #[test]
    fn init_seeds_private_model() {
        let (player, _) = main_player();
        let mut session = InstreamSession::new();
        assert_eq!(session.state(), InstreamState::Uninitialized);

        session.init(&player);

        let ad = session.ad_model().unwrap();
        assert_eq!(session.state(), InstreamState::Ready);
        assert_eq!(ad.get(&AttrKey::Id), Some(AttrValue::from("main")));
        assert_eq!(ad.attributes().get_f64(&AttrKey::Volume), Some(60.0));
        assert!(ad.attributes().get_bool(&AttrKey::InstreamMode));
        assert_eq!(ad.attributes().get_state(), Some(PlayerState::Idle));
    }

    #[test]
    fn load_requires_init() {
        let mut session = InstreamSession::new();
        assert!(matches!(
            session.load(item("ad.mp4")),
            Err(PlayerError::NotInitialized(_))
        ));
    }

    #[test]
    fn load_attaches_and_plays_on_buffer_full() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("ad.mp4")).unwrap();

        assert_eq!(session.state(), InstreamState::Active);
        let probe = factory.last().unwrap();
        assert_eq!(probe.count(&ProviderCall::AttachMedia), 1);
        assert_eq!(probe.last_volume(), Some(60.0));
        assert_eq!(probe.count(&ProviderCall::Load(item("ad.mp4"))), 1);

        probe.emit(ProviderEvent::BufferFull);
        session.process_events();
        assert_eq!(probe.play_count(), 1);
    }

    #[test]
    fn provider_state_maps_playing_and_paused_only() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("ad.mp4")).unwrap();

        let observer = Owner::next();
        session
            .events()
            .on(observer, Topic::Only(crate::events::InstreamEventKind::StateChanged));

        let probe = factory.last().unwrap();
        probe.emit(ProviderEvent::PlayerState {
            new_state: PlayerState::Loading,
        });
        probe.emit(ProviderEvent::PlayerState {
            new_state: PlayerState::Playing,
        });
        session.process_events();

        assert_eq!(
            outward(&session, observer),
            vec![InstreamEvent::StateChanged {
                new_state: PlayerState::Playing,
                old_state: Some(PlayerState::Idle),
            }]
        );
    }

    #[test]
    fn provider_errors_are_forwarded_once() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("ad.mp4")).unwrap();

        let observer = Owner::next();
        session.events().on(observer, Topic::All);

        factory.last().unwrap().emit(ProviderEvent::Error {
            message: "decode failed".to_string(),
            code: Some(224003),
        });
        factory.last().unwrap().emit(ProviderEvent::Complete);
        session.process_events();

        assert_eq!(
            outward(&session, observer),
            vec![
                InstreamEvent::Error {
                    message: "decode failed".to_string(),
                    code: Some(224003),
                },
                InstreamEvent::Provider {
                    event: ProviderEvent::Complete
                },
            ]
        );
    }

    #[test]
    fn main_volume_governs_handed_provider() {
        let (player, _) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);

        let handed = RecordingProvider::new("vpaid");
        let probe = handed.probe();
        session.apply_provider_listeners(crate::provider::share(handed));
        assert_eq!(probe.last_volume(), Some(60.0));

        player.set(AttrKey::Volume, 30u8);
        player.set(AttrKey::Mute, true);
        session.process_events();

        assert_eq!(probe.last_volume(), Some(30.0));
        assert_eq!(probe.last_mute(), Some(true));
    }

    #[test]
    fn main_volume_governs_loaded_provider() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("preroll.mp4")).unwrap();

        player.set(AttrKey::Volume, 25u8);
        player.set(AttrKey::Mute, true);
        session.process_events();

        let probe = factory.last().unwrap();
        assert_eq!(probe.last_volume(), Some(25.0));
        assert_eq!(probe.last_mute(), Some(true));
    }

    #[test]
    fn teardown_after_hand_over_destroys_only_own_provider() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("preroll.mp4")).unwrap();
        let own = factory.last().unwrap();

        let handed = RecordingProvider::new("vpaid");
        let handed_probe = handed.probe();
        session.apply_provider_listeners(crate::provider::share(handed));
        assert_eq!(own.count(&ProviderCall::DetachMedia), 1);

        player.set(AttrKey::Volume, 40u8);
        session.process_events();
        assert_eq!(handed_probe.last_volume(), Some(40.0));

        session.instream_destroy();

        assert_eq!(own.destroy_count(), 1);
        assert_eq!(own.listener_count(), 0);
        assert_eq!(handed_probe.destroy_count(), 0);
        assert_eq!(handed_probe.count(&ProviderCall::DetachMedia), 1);
        assert_eq!(handed_probe.listener_count(), 0);
        assert_eq!(player.attributes().events().listener_count(), 0);
    }

    #[test]
    fn handed_provider_survives_teardown() {
        let (player, _) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);

        let handed = RecordingProvider::new("vpaid");
        let probe = handed.probe();
        session.apply_provider_listeners(crate::provider::share(handed));
        session.instream_destroy();

        assert_eq!(probe.count(&ProviderCall::DetachMedia), 1);
        assert_eq!(probe.destroy_count(), 0);
        assert_eq!(probe.listener_count(), 0);
        assert_eq!(player.attributes().events().listener_count(), 0);
    }

    #[test]
    fn destroy_twice_is_a_noop() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("ad.mp4")).unwrap();

        session.instream_destroy();
        session.instream_destroy();

        let probe = factory.last().unwrap();
        assert_eq!(probe.destroy_count(), 1);
        assert_eq!(probe.count(&ProviderCall::DetachMedia), 1);
        assert_eq!(session.state(), InstreamState::TornDown);
        assert!(session.ad_model().is_none());
        assert_eq!(player.media_controller().listener_count(), 0);
    }

    #[test]
    fn destroy_without_provider_destroys_nothing() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.instream_destroy();

        assert!(factory.created().is_empty());
        assert_eq!(session.state(), InstreamState::TornDown);
    }

    #[test]
    fn play_and_pause_need_a_provider() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.instream_play();
        session.init(&player);
        session.instream_pause();

        session.load(item("ad.mp4")).unwrap();
        session.instream_pause();
        session.instream_play();

        let probe = factory.last().unwrap();
        assert_eq!(probe.count(&ProviderCall::Pause), 1);
        assert_eq!(probe.play_count(), 1);
    }

    #[test]
    fn controller_fullscreen_is_forwarded() {
        let (mut player, _) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);

        let observer = Owner::next();
        session.events().on(observer, Topic::All);

        player.set_fullscreen(true);
        session.process_events();

        assert_eq!(
            outward(&session, observer),
            vec![InstreamEvent::Fullscreen { fullscreen: true }]
        );
    }

    #[test]
    fn native_fullscreen_reaches_main_player() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("ad.mp4")).unwrap();

        let main_observer = Owner::next();
        player.attributes().events().on(
            main_observer,
            Topic::Only(ModelEventKind::Provider(ProviderEventKind::FullscreenChange)),
        );
        let observer = Owner::next();
        session
            .events()
            .on(observer, Topic::Only(crate::events::InstreamEventKind::Fullscreen));

        factory
            .last()
            .unwrap()
            .emit(ProviderEvent::FullscreenChange { fullscreen: true });
        session.process_events();

        assert_eq!(player.attributes().events().drain(main_observer).len(), 1);
        assert_eq!(
            outward(&session, observer),
            vec![InstreamEvent::Fullscreen { fullscreen: true }]
        );
    }

    #[test]
    fn reinit_starts_a_fresh_cycle() {
        let (player, factory) = main_player();
        let mut session = InstreamSession::new();
        session.init(&player);
        session.load(item("ad.mp4")).unwrap();
        session.instream_destroy();

        session.init(&player);
        assert_eq!(session.state(), InstreamState::Ready);
        session.load(item("second-ad.mp4")).unwrap();

        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].destroy_count(), 1);
        assert_eq!(created[1].destroy_count(), 0);
    }
}
